use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

#[derive(Debug, Clone, FromRow)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl From<Student> for StudentView {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            name: s.name,
            email: s.email,
            created_at: s.created_at,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignUpRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Sign-up data that passed validation. The password is still plaintext.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignUpRequest {
    pub fn validate(self) -> Result<NewStudent, AppError> {
        let name = self.name.unwrap_or_default().trim().to_string();
        let email = normalize_email(&self.email.unwrap_or_default());
        let password = self.password.unwrap_or_default();

        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AppError::BadRequest(
                "name, email and password are required".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(AppError::BadRequest("invalid email format".to_string()));
        }

        Ok(NewStudent {
            name,
            email,
            password,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentLoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminLoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UpdateStudentRequest {
    pub fn validate(self) -> Result<StudentChanges, AppError> {
        let name = self.name.map(|n| n.trim().to_string());
        if name.as_deref() == Some("") {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        let email = match self.email {
            Some(email) => {
                let email = normalize_email(&email);
                if !EMAIL_RE.is_match(&email) {
                    return Err(AppError::BadRequest("invalid email".to_string()));
                }
                Some(email)
            }
            None => None,
        };

        let changes = StudentChanges { name, email };
        if changes == StudentChanges::default() {
            return Err(AppError::BadRequest("nothing to update".to_string()));
        }
        Ok(changes)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentFilter {
    pub q: Option<String>,
}
