use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::db::RegistrationStore;
use crate::error::AppError;
use crate::models::{Registration, Workshop, WorkshopChanges, compute_availability};

/// A guarded write can lose to a concurrent change that makes it valid
/// again (a seat freed by a withdrawal); it is retried this many times.
const MAX_GUARDED_ATTEMPTS: usize = 3;

/// Identity snapshot copied into a registration entry.
#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Capacity and uniqueness rules for workshop registrations.
#[derive(Clone)]
pub struct RegistrationEngine {
    store: Arc<dyn RegistrationStore>,
    store_timeout: Duration,
}

impl RegistrationEngine {
    pub fn new(store: Arc<dyn RegistrationStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    pub fn compute_availability(workshop: &Workshop) -> i64 {
        compute_availability(workshop.capacity, workshop.registrations.len())
    }

    /// Registers `student` on the workshop and returns the refreshed
    /// workshop. The seat check and the append happen in one store call.
    ///
    /// The read-back is a separate bounded call. If it times out after the
    /// append committed, the caller gets `StoreUnavailable` while the seat
    /// is taken, and a retry reports `AlreadyRegistered`.
    pub async fn enroll(
        &self,
        workshop_id: &str,
        student: &StudentIdentity,
    ) -> Result<Workshop, AppError> {
        let registration = Registration {
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            student_email: student.email.clone(),
            registered_at: Utc::now().to_rfc3339(),
        };

        for _ in 0..MAX_GUARDED_ATTEMPTS {
            if self
                .bounded(self.store.push_registration(workshop_id, &registration))
                .await?
            {
                info!(workshop_id, student_id = %student.id, "student enrolled");
                return self.fetch_workshop(workshop_id).await;
            }

            // the push was refused; work out which rule refused it
            let workshop = self.fetch_workshop(workshop_id).await?;
            if workshop.registrations.len() as i64 >= workshop.capacity {
                warn!(workshop_id, student_id = %student.id, "enrollment rejected: workshop full");
                return Err(AppError::CapacityExceeded);
            }
            if workshop.is_registered(&student.id) {
                warn!(workshop_id, student_id = %student.id, "enrollment rejected: already registered");
                return Err(AppError::AlreadyRegistered);
            }
        }

        warn!(workshop_id, student_id = %student.id, "enrollment kept losing to concurrent updates");
        Err(AppError::CapacityExceeded)
    }

    /// Removes the student's entry if present. Withdrawing twice is not an
    /// error; only a missing workshop is. As with `enroll`, a timed-out
    /// read-back can report `StoreUnavailable` for a removal that committed;
    /// retrying is safe.
    pub async fn withdraw(&self, workshop_id: &str, student_id: &str) -> Result<Workshop, AppError> {
        let removed = self
            .bounded(self.store.pull_registration(workshop_id, student_id))
            .await?;
        let workshop = self.fetch_workshop(workshop_id).await?;

        if removed > 0 {
            info!(workshop_id, student_id, "student withdrew");
        }
        Ok(workshop)
    }

    pub async fn set_capacity(&self, workshop_id: &str, new_capacity: i64) -> Result<Workshop, AppError> {
        self.update_workshop(workshop_id, &WorkshopChanges::capacity_only(new_capacity))
            .await
    }

    /// Applies an admin edit. When the edit includes a capacity, the whole
    /// edit is rejected if that capacity is below the current enrollment.
    pub async fn update_workshop(
        &self,
        workshop_id: &str,
        changes: &WorkshopChanges,
    ) -> Result<Workshop, AppError> {
        if changes.is_empty() {
            return Err(AppError::BadRequest("nothing to update".to_string()));
        }

        if let Some(capacity) = changes.capacity.filter(|c| *c < 0) {
            let workshop = self.fetch_workshop(workshop_id).await?;
            warn!(workshop_id, capacity, "negative capacity rejected");
            return Err(AppError::InvalidCapacity {
                current: workshop.registrations.len() as i64,
            });
        }

        for _ in 0..MAX_GUARDED_ATTEMPTS {
            let now = Utc::now().to_rfc3339();
            if self
                .bounded(self.store.set_fields_guarded(workshop_id, changes, &now))
                .await?
            {
                info!(workshop_id, "workshop updated");
                return self.fetch_workshop(workshop_id).await;
            }

            let workshop = self.fetch_workshop(workshop_id).await?;
            let current = workshop.registrations.len() as i64;
            if let Some(capacity) = changes.capacity.filter(|c| *c < current) {
                warn!(workshop_id, capacity, current, "capacity below enrollment rejected");
                return Err(AppError::InvalidCapacity { current });
            }
        }

        let workshop = self.fetch_workshop(workshop_id).await?;
        Err(AppError::InvalidCapacity {
            current: workshop.registrations.len() as i64,
        })
    }

    /// Pulls the student's entries from every workshop, then removes the
    /// student record. The two steps are not atomic; a failure in between
    /// leaves the record without registrations, never the reverse.
    pub async fn delete_student_cascade(&self, student_id: &str) -> Result<(), AppError> {
        let pulled = self
            .bounded(self.store.pull_registrations_everywhere(student_id))
            .await?;
        let deleted = self.bounded(self.store.delete_student(student_id)).await?;

        if !deleted {
            return Err(AppError::NotFound("Student"));
        }
        info!(student_id, registrations_removed = pulled, "student deleted");
        Ok(())
    }

    async fn fetch_workshop(&self, workshop_id: &str) -> Result<Workshop, AppError> {
        self.bounded(self.store.find_workshop(workshop_id))
            .await?
            .ok_or(AppError::NotFound("Workshop"))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                error!("store call exceeded {:?}", self.store_timeout);
                Err(AppError::StoreUnavailable)
            }
        }
    }
}
