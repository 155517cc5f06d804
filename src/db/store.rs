use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{students, workshops};
use crate::error::AppError;
use crate::models::{Registration, Workshop, WorkshopChanges};

/// Store primitives the registration engine is built on. Every mutating
/// method is a single atomic statement against the backing store.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn find_workshop(&self, workshop_id: &str) -> Result<Option<Workshop>, AppError>;

    /// Conditional push: appends only when the workshop exists, has a free
    /// seat and does not already hold an entry for the same student.
    async fn push_registration(
        &self,
        workshop_id: &str,
        registration: &Registration,
    ) -> Result<bool, AppError>;

    async fn pull_registration(&self, workshop_id: &str, student_id: &str) -> Result<u64, AppError>;

    async fn pull_registrations_everywhere(&self, student_id: &str) -> Result<u64, AppError>;

    /// Field set guarded by "new capacity >= current registrations".
    async fn set_fields_guarded(
        &self,
        workshop_id: &str,
        changes: &WorkshopChanges,
        updated_at: &str,
    ) -> Result<bool, AppError>;

    async fn delete_student(&self, student_id: &str) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RegistrationStore for SqliteStore {
    async fn find_workshop(&self, workshop_id: &str) -> Result<Option<Workshop>, AppError> {
        Ok(workshops::find_workshop_by_id(&self.db, workshop_id).await?)
    }

    async fn push_registration(
        &self,
        workshop_id: &str,
        registration: &Registration,
    ) -> Result<bool, AppError> {
        match workshops::push_registration_if_open(&self.db, workshop_id, registration).await {
            Ok(pushed) => Ok(pushed),
            // the unique index caught a duplicate the guard did not see
            Err(e) if students::is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_registration(&self, workshop_id: &str, student_id: &str) -> Result<u64, AppError> {
        Ok(workshops::pull_registration(&self.db, workshop_id, student_id).await?)
    }

    async fn pull_registrations_everywhere(&self, student_id: &str) -> Result<u64, AppError> {
        Ok(workshops::pull_student_registrations(&self.db, student_id).await?)
    }

    async fn set_fields_guarded(
        &self,
        workshop_id: &str,
        changes: &WorkshopChanges,
        updated_at: &str,
    ) -> Result<bool, AppError> {
        Ok(workshops::update_workshop_guarded(&self.db, workshop_id, changes, updated_at).await?)
    }

    async fn delete_student(&self, student_id: &str) -> Result<bool, AppError> {
        Ok(students::delete_student(&self.db, student_id).await?)
    }
}
