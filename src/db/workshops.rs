use std::collections::HashMap;

use chrono::Utc;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::escape_like;
use crate::models::{NewWorkshop, Registration, Workshop, WorkshopChanges, WorkshopFilter};

const WORKSHOP_COLUMNS: &str = "id, name, description, date, time, location, category, kind, \
    instructor, rating, capacity, created_at, updated_at";

const SEARCH_COLUMNS: [&str; 5] = ["name", "description", "location", "kind", "instructor"];

#[derive(FromRow)]
struct RegistrationRow {
    workshop_id: String,
    #[sqlx(flatten)]
    registration: Registration,
}

pub async fn find_workshop_by_id(db: &SqlitePool, id: &str) -> Result<Option<Workshop>, sqlx::Error> {
    let workshop = sqlx::query_as::<_, Workshop>(&format!(
        "SELECT {WORKSHOP_COLUMNS} FROM workshops WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;

    match workshop {
        Some(mut w) => {
            w.registrations = fetch_registrations(db, &w.id).await?;
            Ok(Some(w))
        }
        None => Ok(None),
    }
}

pub async fn fetch_registrations(
    db: &SqlitePool,
    workshop_id: &str,
) -> Result<Vec<Registration>, sqlx::Error> {
    sqlx::query_as::<_, Registration>(
        r#"
        SELECT student_id, student_name, student_email, registered_at
        FROM registrations
        WHERE workshop_id = ?
        ORDER BY seq
        "#,
    )
    .bind(workshop_id)
    .fetch_all(db)
    .await
}

/// Loads the registration lists of several workshops with one query.
async fn attach_registrations(
    db: &SqlitePool,
    workshops: &mut [Workshop],
) -> Result<(), sqlx::Error> {
    if workshops.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT workshop_id, student_id, student_name, student_email, registered_at \
         FROM registrations WHERE workshop_id IN (",
    );
    let mut ids = qb.separated(", ");
    for w in workshops.iter() {
        ids.push_bind(w.id.clone());
    }
    qb.push(") ORDER BY seq");

    let rows = qb.build_query_as::<RegistrationRow>().fetch_all(db).await?;

    let mut by_workshop: HashMap<String, Vec<Registration>> = HashMap::new();
    for row in rows {
        by_workshop
            .entry(row.workshop_id)
            .or_default()
            .push(row.registration);
    }
    for w in workshops.iter_mut() {
        w.registrations = by_workshop.remove(&w.id).unwrap_or_default();
    }
    Ok(())
}

pub async fn list_workshops(
    db: &SqlitePool,
    filter: &WorkshopFilter,
) -> Result<Vec<Workshop>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {WORKSHOP_COLUMNS} FROM workshops WHERE 1 = 1"
    ));

    if let Some(q) = non_empty(&filter.q) {
        let pattern = format!("%{}%", escape_like(q));
        qb.push(" AND (");
        for (i, column) in SEARCH_COLUMNS.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column)
                .push(" LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
    if let Some(category) = non_empty(&filter.category) {
        qb.push(" AND category = ").push_bind(category.to_string());
    }
    // dates are stored as YYYY-MM-DD, so string comparison is chronological
    if let Some(from) = non_empty(&filter.date_from) {
        qb.push(" AND date >= ").push_bind(from.to_string());
    }
    if let Some(to) = non_empty(&filter.date_to) {
        qb.push(" AND date <= ").push_bind(to.to_string());
    }

    let direction = match filter.order.as_deref() {
        Some("desc") => "DESC",
        _ => "ASC",
    };
    let column = match filter.sort.as_deref() {
        Some("rating") => "rating",
        Some("created_at") => "created_at",
        _ => "date",
    };
    qb.push(format!(" ORDER BY {column} {direction}, time {direction}"));

    if let Some(limit) = filter.limit.filter(|l| *l > 0) {
        qb.push(" LIMIT ").push_bind(limit);
    }

    let mut workshops = qb.build_query_as::<Workshop>().fetch_all(db).await?;
    attach_registrations(db, &mut workshops).await?;
    Ok(workshops)
}

pub async fn list_workshops_for_student(
    db: &SqlitePool,
    student_id: &str,
) -> Result<Vec<Workshop>, sqlx::Error> {
    let mut workshops = sqlx::query_as::<_, Workshop>(&format!(
        r#"
        SELECT {WORKSHOP_COLUMNS}
        FROM workshops
        WHERE id IN (SELECT workshop_id FROM registrations WHERE student_id = ?)
        ORDER BY date, time
        "#
    ))
    .bind(student_id)
    .fetch_all(db)
    .await?;

    attach_registrations(db, &mut workshops).await?;
    Ok(workshops)
}

pub async fn insert_workshop(db: &SqlitePool, new: NewWorkshop) -> Result<Workshop, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO workshops
            (id, name, description, date, time, location, category, kind,
            instructor, rating, capacity, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL)
        "#,
    )
    .bind(&id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.date)
    .bind(&new.time)
    .bind(&new.location)
    .bind(&new.category)
    .bind(&new.kind)
    .bind(&new.instructor)
    .bind(new.rating)
    .bind(new.capacity)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Workshop {
        id,
        name: new.name,
        description: new.description,
        date: new.date,
        time: new.time,
        location: new.location,
        category: new.category,
        kind: new.kind,
        instructor: new.instructor,
        rating: new.rating,
        capacity: new.capacity,
        created_at: now,
        updated_at: None,
        registrations: Vec::new(),
    })
}

/// Applies `changes` in one statement. A capacity change only lands when it
/// is not below the registration count at the moment of the write. Returns
/// whether a row was updated.
pub async fn update_workshop_guarded(
    db: &SqlitePool,
    id: &str,
    changes: &WorkshopChanges,
    updated_at: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE workshops
        SET name = COALESCE(?1, name),
            description = COALESCE(?2, description),
            date = COALESCE(?3, date),
            time = COALESCE(?4, time),
            location = COALESCE(?5, location),
            category = COALESCE(?6, category),
            kind = COALESCE(?7, kind),
            instructor = COALESCE(?8, instructor),
            rating = COALESCE(?9, rating),
            capacity = COALESCE(?10, capacity),
            updated_at = ?11
        WHERE id = ?12
          AND (?10 IS NULL
               OR ?10 >= (SELECT COUNT(*) FROM registrations WHERE workshop_id = ?12))
        "#,
    )
    .bind(&changes.name)
    .bind(&changes.description)
    .bind(&changes.date)
    .bind(&changes.time)
    .bind(&changes.location)
    .bind(&changes.category)
    .bind(&changes.kind)
    .bind(&changes.instructor)
    .bind(changes.rating)
    .bind(changes.capacity)
    .bind(updated_at)
    .bind(id)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn delete_workshop(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM workshops WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Appends `registration` only if the workshop exists, still has a free
/// seat and does not list this student yet. The check and the insert are a
/// single statement, so concurrent callers cannot both take the last seat.
pub async fn push_registration_if_open(
    db: &SqlitePool,
    workshop_id: &str,
    registration: &Registration,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO registrations
            (workshop_id, student_id, student_name, student_email, registered_at)
        SELECT w.id, ?2, ?3, ?4, ?5
        FROM workshops w
        WHERE w.id = ?1
          AND (SELECT COUNT(*) FROM registrations r WHERE r.workshop_id = w.id) < w.capacity
          AND NOT EXISTS (
              SELECT 1 FROM registrations r
              WHERE r.workshop_id = w.id AND r.student_id = ?2
          )
        "#,
    )
    .bind(workshop_id)
    .bind(&registration.student_id)
    .bind(&registration.student_name)
    .bind(&registration.student_email)
    .bind(&registration.registered_at)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn pull_registration(
    db: &SqlitePool,
    workshop_id: &str,
    student_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM registrations WHERE workshop_id = ? AND student_id = ?")
        .bind(workshop_id)
        .bind(student_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected())
}

pub async fn pull_student_registrations(
    db: &SqlitePool,
    student_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM registrations WHERE student_id = ?")
        .bind(student_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected())
}

pub async fn count_workshops(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM workshops")
        .fetch_one(db)
        .await
}

pub async fn count_registrations(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM registrations")
        .fetch_one(db)
        .await
}

pub async fn fetch_categories(db: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT category FROM workshops WHERE category <> '' ORDER BY category",
    )
    .fetch_all(db)
    .await
}

/// Inserts a couple of sample workshops into an empty table.
pub async fn seed_sample_workshops(db: &SqlitePool) -> Result<usize, sqlx::Error> {
    if count_workshops(db).await? > 0 {
        return Ok(0);
    }

    let now = Utc::now();
    let date = now.date_naive().format("%Y-%m-%d").to_string();
    let time = now.format("%H:%M").to_string();

    let samples = [
        NewWorkshop {
            name: "Introduction to Python".to_string(),
            description: "Python fundamentals.".to_string(),
            date: date.clone(),
            time: time.clone(),
            location: "Room 101".to_string(),
            category: "technology".to_string(),
            kind: "technical course".to_string(),
            instructor: "Ana Perez".to_string(),
            rating: 4.8,
            capacity: 30,
        },
        NewWorkshop {
            name: "Soft Skills".to_string(),
            description: "Communication and teamwork.".to_string(),
            date,
            time,
            location: "Workshop Room 2".to_string(),
            category: "soft-skills".to_string(),
            kind: "training".to_string(),
            instructor: "Luis Gomez".to_string(),
            rating: 4.6,
            capacity: 25,
        },
    ];

    let count = samples.len();
    for sample in samples {
        insert_workshop(db, sample).await?;
    }
    Ok(count)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn new_workshop(name: &str, date: &str, category: &str, capacity: i64) -> NewWorkshop {
        NewWorkshop {
            name: name.to_string(),
            description: "A workshop".to_string(),
            date: date.to_string(),
            time: "10:00".to_string(),
            location: "Room 101".to_string(),
            category: category.to_string(),
            kind: "course".to_string(),
            instructor: "Ana Perez".to_string(),
            rating: 4.0,
            capacity,
        }
    }

    fn registration(student_id: &str) -> Registration {
        Registration {
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            student_email: format!("{student_id}@example.com"),
            registered_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_workshop() {
        let pool = connect_in_memory().await.expect("Failed to create test db");

        let created = insert_workshop(&pool, new_workshop("Rust 101", "2025-03-01", "technology", 10))
            .await
            .expect("Failed to insert workshop");
        assert!(created.updated_at.is_none());

        let found = find_workshop_by_id(&pool, &created.id)
            .await
            .expect("Failed to fetch workshop")
            .expect("Workshop not found");
        assert_eq!(found.name, "Rust 101");
        assert_eq!(found.capacity, 10);
        assert!(found.registrations.is_empty());

        let missing = find_workshop_by_id(&pool, "nope").await.expect("query failed");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_push_respects_capacity_and_uniqueness() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let w = insert_workshop(&pool, new_workshop("Rust 101", "2025-03-01", "technology", 2))
            .await
            .expect("Failed to insert workshop");

        assert!(push_registration_if_open(&pool, &w.id, &registration("a")).await.unwrap());
        assert!(!push_registration_if_open(&pool, &w.id, &registration("a")).await.unwrap());
        assert!(push_registration_if_open(&pool, &w.id, &registration("b")).await.unwrap());
        assert!(!push_registration_if_open(&pool, &w.id, &registration("c")).await.unwrap());
        assert!(!push_registration_if_open(&pool, "missing", &registration("d")).await.unwrap());

        let found = find_workshop_by_id(&pool, &w.id).await.unwrap().unwrap();
        let ids: Vec<_> = found.registrations.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_guarded_update_rejects_capacity_below_enrollment() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let w = insert_workshop(&pool, new_workshop("Rust 101", "2025-03-01", "technology", 5))
            .await
            .unwrap();
        push_registration_if_open(&pool, &w.id, &registration("a")).await.unwrap();
        push_registration_if_open(&pool, &w.id, &registration("b")).await.unwrap();

        let now = Utc::now().to_rfc3339();
        let lowered = WorkshopChanges {
            name: Some("Renamed".to_string()),
            capacity: Some(1),
            ..WorkshopChanges::default()
        };
        assert!(!update_workshop_guarded(&pool, &w.id, &lowered, &now).await.unwrap());

        let unchanged = find_workshop_by_id(&pool, &w.id).await.unwrap().unwrap();
        assert_eq!(unchanged.capacity, 5);
        assert_eq!(unchanged.name, "Rust 101");

        let exact = WorkshopChanges::capacity_only(2);
        assert!(update_workshop_guarded(&pool, &w.id, &exact, &now).await.unwrap());
        let updated = find_workshop_by_id(&pool, &w.id).await.unwrap().unwrap();
        assert_eq!(updated.capacity, 2);
        assert_eq!(updated.updated_at.as_deref(), Some(now.as_str()));
    }

    #[tokio::test]
    async fn test_list_filters_and_sorting() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        insert_workshop(&pool, new_workshop("Rust 101", "2025-03-01", "technology", 10)).await.unwrap();
        insert_workshop(&pool, new_workshop("Public speaking", "2025-02-01", "soft-skills", 10)).await.unwrap();
        insert_workshop(&pool, new_workshop("Advanced Rust", "2025-04-01", "technology", 10)).await.unwrap();

        let all = list_workshops(&pool, &WorkshopFilter::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["Public speaking", "Rust 101", "Advanced Rust"]);

        let search = WorkshopFilter {
            q: Some("rust".to_string()),
            order: Some("desc".to_string()),
            ..WorkshopFilter::default()
        };
        let found = list_workshops(&pool, &search).await.unwrap();
        let names: Vec<_> = found.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["Advanced Rust", "Rust 101"]);

        let ranged = WorkshopFilter {
            category: Some("technology".to_string()),
            date_from: Some("2025-03-15".to_string()),
            ..WorkshopFilter::default()
        };
        let found = list_workshops(&pool, &ranged).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Advanced Rust");

        let limited = WorkshopFilter { limit: Some(1), ..WorkshopFilter::default() };
        assert_eq!(list_workshops(&pool, &limited).await.unwrap().len(), 1);

        let categories = fetch_categories(&pool).await.unwrap();
        assert_eq!(categories, ["soft-skills", "technology"]);
    }

    #[tokio::test]
    async fn test_like_wildcards_are_literal() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        insert_workshop(&pool, new_workshop("100% Rust", "2025-03-01", "technology", 10)).await.unwrap();
        insert_workshop(&pool, new_workshop("1000 Rust tips", "2025-03-01", "technology", 10)).await.unwrap();

        let filter = WorkshopFilter { q: Some("0%".to_string()), ..WorkshopFilter::default() };
        let found = list_workshops(&pool, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "100% Rust");
    }

    #[tokio::test]
    async fn test_delete_workshop_drops_registrations() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        let w = insert_workshop(&pool, new_workshop("Rust 101", "2025-03-01", "technology", 3))
            .await
            .unwrap();
        push_registration_if_open(&pool, &w.id, &registration("a")).await.unwrap();

        assert!(delete_workshop(&pool, &w.id).await.unwrap());
        assert!(!delete_workshop(&pool, &w.id).await.unwrap());
        assert_eq!(count_registrations(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_only_fills_empty_table() {
        let pool = connect_in_memory().await.expect("Failed to create test db");
        assert_eq!(seed_sample_workshops(&pool).await.unwrap(), 2);
        assert_eq!(seed_sample_workshops(&pool).await.unwrap(), 0);
        assert_eq!(count_workshops(&pool).await.unwrap(), 2);
    }
}
