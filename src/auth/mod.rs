pub mod password;
pub mod token;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::db::students;
use crate::error::AppError;
use crate::services::StudentIdentity;
use crate::state::AppState;

pub use token::{Claims, Role, Subject, TokenKeys, TokenPair, TokenType};

/// Caller authenticated with an admin access token.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub username: String,
}

/// Caller authenticated with a student access token whose account still
/// exists. Carries the current name and email from the store.
#[derive(Debug, Clone)]
pub struct StudentSession(pub StudentIdentity);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(parts: &Parts, state: &AppState, role: Role) -> Result<Claims, AppError> {
    let token = bearer_token(parts)
        .ok_or_else(|| AppError::Unauthorized("authorization token required".to_string()))?;
    let claims = state.tokens.verify(token, TokenType::Access)?;

    if claims.role != role {
        let needed = match role {
            Role::Admin => "admin",
            Role::Student => "student",
        };
        return Err(AppError::Forbidden(format!("{needed} role required")));
    }
    Ok(claims)
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = authenticate(parts, state, Role::Admin)?;
        Ok(Self {
            username: claims.sub,
        })
    }
}

impl FromRequestParts<AppState> for StudentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = authenticate(parts, state, Role::Student)?;
        let student = students::find_student_by_id(&state.db, &claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("student not found".to_string()))?;

        Ok(Self(StudentIdentity {
            id: student.id,
            name: student.name,
            email: student.email,
        }))
    }
}
