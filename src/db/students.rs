use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::escape_like;
use crate::models::{Student, StudentChanges};

const STUDENT_COLUMNS: &str = "id, name, email, password_hash, created_at";

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}

pub async fn insert_student(
    db: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<Student, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO students (id, name, email, password_hash, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Student {
        id,
        name: name.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        created_at: now,
    })
}

pub async fn find_student_by_id(db: &SqlitePool, id: &str) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_student_by_email(
    db: &SqlitePool,
    email: &str,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE email = ?"
    ))
    .bind(email)
    .fetch_optional(db)
    .await
}

/// Newest first. `q` matches name or email, case-insensitively.
pub async fn list_students(db: &SqlitePool, q: Option<&str>) -> Result<Vec<Student>, sqlx::Error> {
    let pattern = q
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", escape_like(q)));

    sqlx::query_as::<_, Student>(&format!(
        r#"
        SELECT {STUDENT_COLUMNS}
        FROM students
        WHERE ?1 IS NULL OR name LIKE ?1 ESCAPE '\' OR email LIKE ?1 ESCAPE '\'
        ORDER BY created_at DESC
        "#
    ))
    .bind(pattern)
    .fetch_all(db)
    .await
}

pub async fn update_student(
    db: &SqlitePool,
    id: &str,
    changes: &StudentChanges,
) -> Result<Option<Student>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE students
        SET name = COALESCE(?1, name),
            email = COALESCE(?2, email)
        WHERE id = ?3
        "#,
    )
    .bind(&changes.name)
    .bind(&changes.email)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    if result == 0 {
        return Ok(None);
    }
    find_student_by_id(db, id).await
}

pub async fn delete_student(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

pub async fn count_students(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM students")
        .fetch_one(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn test_insert_and_find_student() {
        let pool = connect_in_memory().await.expect("Failed to create test db");

        let student = insert_student(&pool, "Ana", "ana@example.com", "hash")
            .await
            .expect("Failed to insert student");

        let by_id = find_student_by_id(&pool, &student.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ana@example.com");

        let by_email = find_student_by_email(&pool, "ana@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, student.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        insert_student(&pool, "Ana", "ana@example.com", "hash").await.unwrap();

        let err = insert_student(&pool, "Other Ana", "ana@example.com", "hash")
            .await
            .expect_err("duplicate email accepted");
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_list_students_search() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        insert_student(&pool, "Ana", "ana@example.com", "hash").await.unwrap();
        insert_student(&pool, "Luis", "luis@example.com", "hash").await.unwrap();

        assert_eq!(list_students(&pool, None).await.unwrap().len(), 2);
        assert_eq!(list_students(&pool, Some("  ")).await.unwrap().len(), 2);

        let found = list_students(&pool, Some("LUIS")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Luis");
    }

    #[tokio::test]
    async fn test_update_and_delete_student() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let student = insert_student(&pool, "Ana", "ana@example.com", "hash").await.unwrap();

        let changes = StudentChanges {
            name: Some("Ana Maria".to_string()),
            email: None,
        };
        let updated = update_student(&pool, &student.id, &changes).await.unwrap().unwrap();
        assert_eq!(updated.name, "Ana Maria");
        assert_eq!(updated.email, "ana@example.com");

        assert!(update_student(&pool, "missing", &changes).await.unwrap().is_none());

        assert!(delete_student(&pool, &student.id).await.unwrap());
        assert!(!delete_student(&pool, &student.id).await.unwrap());
        assert_eq!(count_students(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_students_wildcards_are_literal() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        insert_student(&pool, "Ana", "ana@example.com", "hash").await.unwrap();
        insert_student(&pool, "Luis", "luis_g@example.com", "hash").await.unwrap();

        assert!(list_students(&pool, Some("%")).await.unwrap().is_empty());

        let found = list_students(&pool, Some("_")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Luis");
    }
}
