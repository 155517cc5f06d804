use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Seats left on a workshop. Never negative, even for legacy rows that
/// hold more registrations than their capacity.
pub fn compute_availability(capacity: i64, registered: usize) -> i64 {
    let registered = i64::try_from(registered).unwrap_or(i64::MAX);
    capacity.saturating_sub(registered).max(0)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workshop {
    pub id: String,
    pub name: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub instructor: String,
    pub rating: f64,
    pub capacity: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
    /// Enrollment order.
    #[sqlx(skip)]
    pub registrations: Vec<Registration>,
}

impl Workshop {
    pub fn available_seats(&self) -> i64 {
        compute_availability(self.capacity, self.registrations.len())
    }

    pub fn is_registered(&self, student_id: &str) -> bool {
        self.registrations.iter().any(|r| r.student_id == student_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub student_id: String,
    #[serde(rename = "name")]
    pub student_name: String,
    #[serde(rename = "email")]
    pub student_email: String,
    pub registered_at: String,
}

/// Outward representation of a workshop, including the derived seat count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkshopView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub instructor: String,
    pub rating: f64,
    pub capacity: i64,
    pub available_seats: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub registrations: Vec<Registration>,
}

impl From<Workshop> for WorkshopView {
    fn from(w: Workshop) -> Self {
        let available_seats = w.available_seats();
        Self {
            id: w.id,
            name: w.name,
            description: w.description,
            date: w.date,
            time: w.time,
            location: w.location,
            category: w.category,
            kind: w.kind,
            instructor: w.instructor,
            rating: w.rating,
            capacity: w.capacity,
            available_seats,
            created_at: w.created_at,
            updated_at: w.updated_at,
            registrations: w.registrations,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkshopRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub instructor: Option<String>,
    pub rating: Option<f64>,
    pub capacity: Option<i64>,
}

/// A creation request that passed validation.
#[derive(Debug, Clone)]
pub struct NewWorkshop {
    pub name: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub category: String,
    pub kind: String,
    pub instructor: String,
    pub rating: f64,
    pub capacity: i64,
}

impl NewWorkshopRequest {
    pub fn validate(self) -> Result<NewWorkshop, AppError> {
        let mut missing = Vec::new();
        let mut required = |field: &'static str, value: Option<String>| -> String {
            let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
            if value.is_empty() {
                missing.push(field);
            }
            value
        };

        let name = required("name", self.name);
        let description = required("description", self.description);
        let date = required("date", self.date);
        let time = required("time", self.time);
        let location = required("location", self.location);
        let category = required("category", self.category);
        let kind = required("type", self.kind);
        if self.capacity.is_none() {
            missing.push("capacity");
        }
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "missing fields: {}",
                missing.join(", ")
            )));
        }

        validate_date(&date)?;
        let capacity = validate_capacity(self.capacity.unwrap_or_default())?;
        let rating = match self.rating {
            Some(r) => validate_rating(r)?,
            None => 0.0,
        };

        Ok(NewWorkshop {
            name,
            description,
            date,
            time,
            location,
            category,
            kind,
            instructor: self.instructor.unwrap_or_default().trim().to_string(),
            rating,
            capacity,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWorkshopRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub instructor: Option<String>,
    pub rating: Option<f64>,
    pub capacity: Option<i64>,
}

/// Validated partial update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkshopChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub kind: Option<String>,
    pub instructor: Option<String>,
    pub rating: Option<f64>,
    pub capacity: Option<i64>,
}

impl WorkshopChanges {
    pub fn capacity_only(capacity: i64) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl UpdateWorkshopRequest {
    pub fn validate(self) -> Result<WorkshopChanges, AppError> {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string());

        let date = trim(self.date);
        if let Some(date) = &date {
            validate_date(date)?;
        }
        let rating = self.rating.map(validate_rating).transpose()?;
        let capacity = self.capacity.map(validate_capacity).transpose()?;

        let changes = WorkshopChanges {
            name: trim(self.name),
            description: trim(self.description),
            date,
            time: trim(self.time),
            location: trim(self.location),
            category: trim(self.category),
            kind: trim(self.kind),
            instructor: trim(self.instructor),
            rating,
            capacity,
        };
        if changes.is_empty() {
            return Err(AppError::BadRequest("nothing to update".to_string()));
        }
        Ok(changes)
    }
}

/// Query parameters accepted by the workshop listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkshopFilter {
    pub q: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
}

fn validate_date(date: &str) -> Result<(), AppError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| AppError::BadRequest("date must be formatted as YYYY-MM-DD".to_string()))
}

fn validate_capacity(capacity: i64) -> Result<i64, AppError> {
    if capacity < 0 {
        return Err(AppError::BadRequest(
            "capacity must be a non-negative integer".to_string(),
        ));
    }
    Ok(capacity)
}

fn validate_rating(rating: f64) -> Result<f64, AppError> {
    if !(0.0..=5.0).contains(&rating) {
        return Err(AppError::BadRequest(
            "rating must be a number between 0 and 5".to_string(),
        ));
    }
    Ok(rating)
}
