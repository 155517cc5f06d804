use axum::Json;
use axum::extract::State;
use tracing::info;

use super::{ApiJson, ApiPath, ApiQuery, MessageResponse, parse_id};
use crate::auth::AdminSession;
use crate::db::students;
use crate::error::AppError;
use crate::models::{StudentFilter, StudentView, UpdateStudentRequest};
use crate::state::AppState;

pub async fn list_students(
    State(state): State<AppState>,
    _admin: AdminSession,
    ApiQuery(filter): ApiQuery<StudentFilter>,
) -> Result<Json<Vec<StudentView>>, AppError> {
    let list = students::list_students(&state.db, filter.q.as_deref()).await?;
    Ok(Json(list.into_iter().map(StudentView::from).collect()))
}

pub async fn get_student(
    State(state): State<AppState>,
    _admin: AdminSession,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<StudentView>, AppError> {
    let id = parse_id(&id)?;
    let student = students::find_student_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound("Student"))?;
    Ok(Json(student.into()))
}

/// Name and email edits. Registration snapshots keep the values they were
/// taken with.
pub async fn update_student(
    State(state): State<AppState>,
    admin: AdminSession,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateStudentRequest>,
) -> Result<Json<StudentView>, AppError> {
    let id = parse_id(&id)?;
    let changes = req.validate()?;

    let student = students::update_student(&state.db, &id, &changes)
        .await
        .map_err(|e| {
            if students::is_unique_violation(&e) {
                AppError::Conflict("email already in use".to_string())
            } else {
                AppError::from(e)
            }
        })?
        .ok_or(AppError::NotFound("Student"))?;

    info!(student_id = %id, admin = %admin.username, "student updated");
    Ok(Json(student.into()))
}

pub async fn delete_student(
    State(state): State<AppState>,
    admin: AdminSession,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&id)?;
    state.engine.delete_student_cascade(&id).await?;

    info!(student_id = %id, admin = %admin.username, "student removed by admin");
    Ok(MessageResponse::new("student deleted"))
}
