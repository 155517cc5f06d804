use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{info, warn};

use super::ApiJson;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::{Role, StudentSession, Subject, TokenPair, TokenType};
use crate::db::students;
use crate::error::AppError;
use crate::models::{
    AdminLoginRequest, RefreshRequest, SignUpRequest, StudentLoginRequest, StudentView,
    normalize_email,
};
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "invalid credentials";

pub async fn admin_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AdminLoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    if username != state.config.admin_user || password != state.config.admin_password {
        warn!(username = %username, "admin login failed");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    info!(username = %username, "admin logged in");
    let pair = state.tokens.issue_pair(&Subject::admin(&username))?;
    Ok(Json(pair))
}

pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> Result<(StatusCode, Json<TokenPair>), AppError> {
    let new = req.validate()?;
    let hash = hash_password_blocking(new.password).await?;

    let student = students::insert_student(&state.db, &new.name, &new.email, &hash)
        .await
        .map_err(|e| {
            if students::is_unique_violation(&e) {
                AppError::Conflict("email already registered".to_string())
            } else {
                AppError::from(e)
            }
        })?;

    info!(student_id = %student.id, "student signed up");
    let mut pair = state.tokens.issue_pair(&Subject::student(&student))?;
    pair.student = Some(StudentView::from(student));
    Ok((StatusCode::CREATED, Json(pair)))
}

pub async fn student_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StudentLoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let email = normalize_email(&req.email.unwrap_or_default());
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let Some(student) = students::find_student_by_email(&state.db, &email).await? else {
        warn!("student login failed: unknown email");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    };
    if !verify_password_blocking(password, student.password_hash.clone()).await? {
        warn!(student_id = %student.id, "student login failed: wrong password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    info!(student_id = %student.id, "student logged in");
    let mut pair = state.tokens.issue_pair(&Subject::student(&student))?;
    pair.student = Some(StudentView::from(student));
    Ok(Json(pair))
}

pub async fn me(
    State(state): State<AppState>,
    StudentSession(identity): StudentSession,
) -> Result<Json<StudentView>, AppError> {
    let student = students::find_student_by_id(&state.db, &identity.id)
        .await?
        .ok_or(AppError::NotFound("Student"))?;
    Ok(Json(StudentView::from(student)))
}

/// Trades a refresh token for a fresh pair. Student tokens are only
/// renewed while the account exists.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("refresh_token is required".to_string()))?;
    let claims = state.tokens.verify(token.trim(), TokenType::Refresh)?;

    let pair = match claims.role {
        Role::Admin => state.tokens.issue_pair(&Subject::admin(&claims.sub))?,
        Role::Student => {
            let student = students::find_student_by_id(&state.db, &claims.sub)
                .await?
                .ok_or_else(|| AppError::Unauthorized("student not found".to_string()))?;
            let mut pair = state.tokens.issue_pair(&Subject::student(&student))?;
            pair.student = Some(StudentView::from(student));
            pair
        }
    };
    Ok(Json(pair))
}
