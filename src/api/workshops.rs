use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::info;

use super::{ApiJson, ApiPath, ApiQuery, MessageResponse, parse_id};
use crate::auth::{AdminSession, StudentSession};
use crate::db::workshops;
use crate::error::AppError;
use crate::models::{NewWorkshopRequest, UpdateWorkshopRequest, WorkshopFilter, WorkshopView};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub message: String,
    pub workshop: WorkshopView,
}

pub async fn list_workshops(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<WorkshopFilter>,
) -> Result<Json<Vec<WorkshopView>>, AppError> {
    let list = workshops::list_workshops(&state.db, &filter).await?;
    Ok(Json(list.into_iter().map(WorkshopView::from).collect()))
}

pub async fn get_workshop(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<WorkshopView>, AppError> {
    let id = parse_id(&id)?;
    let workshop = workshops::find_workshop_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound("Workshop"))?;
    Ok(Json(workshop.into()))
}

pub async fn create_workshop(
    State(state): State<AppState>,
    admin: AdminSession,
    ApiJson(req): ApiJson<NewWorkshopRequest>,
) -> Result<(StatusCode, Json<WorkshopView>), AppError> {
    let new = req.validate()?;
    let workshop = workshops::insert_workshop(&state.db, new).await?;

    info!(workshop_id = %workshop.id, admin = %admin.username, "workshop created");
    Ok((StatusCode::CREATED, Json(workshop.into())))
}

pub async fn update_workshop(
    State(state): State<AppState>,
    _admin: AdminSession,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateWorkshopRequest>,
) -> Result<Json<WorkshopView>, AppError> {
    let id = parse_id(&id)?;
    let changes = req.validate()?;
    let workshop = state.engine.update_workshop(&id, &changes).await?;
    Ok(Json(workshop.into()))
}

pub async fn delete_workshop(
    State(state): State<AppState>,
    admin: AdminSession,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = parse_id(&id)?;
    if !workshops::delete_workshop(&state.db, &id).await? {
        return Err(AppError::NotFound("Workshop"));
    }

    info!(workshop_id = %id, admin = %admin.username, "workshop deleted");
    Ok(MessageResponse::new("workshop deleted"))
}

pub async fn enroll(
    State(state): State<AppState>,
    StudentSession(student): StudentSession,
    ApiPath(id): ApiPath<String>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let id = parse_id(&id)?;
    let workshop = state.engine.enroll(&id, &student).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            message: "registration successful".to_string(),
            workshop: workshop.into(),
        }),
    ))
}

pub async fn withdraw(
    State(state): State<AppState>,
    StudentSession(student): StudentSession,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let id = parse_id(&id)?;
    let workshop = state.engine.withdraw(&id, &student.id).await?;
    Ok(Json(RegistrationResponse {
        message: "registration cancelled".to_string(),
        workshop: workshop.into(),
    }))
}

pub async fn my_registrations(
    State(state): State<AppState>,
    StudentSession(student): StudentSession,
) -> Result<Json<Vec<WorkshopView>>, AppError> {
    let list = workshops::list_workshops_for_student(&state.db, &student.id).await?;
    Ok(Json(list.into_iter().map(WorkshopView::from).collect()))
}
