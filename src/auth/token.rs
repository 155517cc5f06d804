//! HS256 access/refresh token issuance and verification.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AppError;
use crate::models::{Student, StudentView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Student id, or the admin username.
    pub sub: String,
    pub role: Role,
    pub typ: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Who a token pair is issued for.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: String,
    pub role: Role,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Subject {
    pub fn admin(username: &str) -> Self {
        Self {
            id: username.to_string(),
            role: Role::Admin,
            email: None,
            name: None,
        }
    }

    pub fn student(student: &Student) -> Self {
        Self {
            id: student.id.clone(),
            role: Role::Student,
            email: Some(student.email.clone()),
            name: Some(student.name.clone()),
        }
    }
}

/// Response body of every endpoint that hands out tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp).
    pub expires_at: i64,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentView>,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, subject: &Subject, typ: TokenType) -> Result<(String, i64), AppError> {
        let now = Utc::now().timestamp();
        let ttl = match typ {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: subject.id.clone(),
            role: subject.role,
            typ,
            email: subject.email.clone(),
            name: subject.name.clone(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| {
                error!("failed to sign token: {}", e);
                AppError::InternalServerError
            })?;
        Ok((token, claims.exp))
    }

    pub fn issue_pair(&self, subject: &Subject) -> Result<TokenPair, AppError> {
        let (token, expires_at) = self.issue(subject, TokenType::Access)?;
        let (refresh_token, _) = self.issue(subject, TokenType::Refresh)?;
        Ok(TokenPair {
            token,
            refresh_token,
            expires_at,
            token_type: "Bearer".to_string(),
            student: None,
        })
    }

    /// Checks signature and expiry, and that the token is of the expected type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("session expired".to_string())
                }
                _ => AppError::Unauthorized("invalid token".to_string()),
            })?;

        if claims.typ != expected {
            return Err(AppError::Unauthorized("invalid token".to_string()));
        }
        Ok(claims)
    }
}
