mod auth;
mod students;
mod workshops;

use axum::extract::{FromRequest, FromRequestParts, State};
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::db::{students as student_repo, workshops as workshop_repo};
use crate::error::AppError;
use crate::rate_limit::rate_limit;
use crate::state::AppState;

/// JSON body extractor that reports malformed payloads as `AppError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query-string extractor that reports bad parameters as `AppError`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub workshops: i64,
    pub students: i64,
    pub registrations: i64,
}

pub fn router(state: AppState) -> Router {
    let security_headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi))
        .route("/stats", get(stats))
        .route("/categories", get(categories))
        .route("/auth/login", post(auth::admin_login))
        .route("/auth/students/register", post(auth::sign_up))
        .route("/auth/students/login", post(auth::student_login))
        .route("/auth/students/me", get(auth::me))
        .route("/auth/refresh", post(auth::refresh))
        .route(
            "/workshops",
            get(workshops::list_workshops).post(workshops::create_workshop),
        )
        .route(
            "/workshops/{id}",
            get(workshops::get_workshop)
                .put(workshops::update_workshop)
                .delete(workshops::delete_workshop),
        )
        .route(
            "/workshops/{id}/register",
            post(workshops::enroll).delete(workshops::withdraw),
        )
        .route("/registrations/me", get(workshops::my_registrations))
        .route("/students", get(students::list_students))
        .route(
            "/students/{id}",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(security_headers)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Path ids are UUIDs; anything else is rejected before touching the store.
fn parse_id(raw: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| AppError::BadRequest("invalid id".to_string()))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Workshop registration API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "workshops": "/workshops",
            "auth": "/auth/login",
            "refresh": "/auth/refresh",
            "stats": "/stats",
            "categories": "/categories",
            "openapi": "/openapi.json",
        }
    }))
}

/// Minimal OpenAPI document naming every route and operation.
async fn openapi() -> Json<Value> {
    let paths: Map<String, Value> = [
        ("/", json!({ "get": { "summary": "Service information" } })),
        ("/health", json!({ "get": { "summary": "Liveness and store check" } })),
        ("/stats", json!({ "get": { "summary": "Workshop, student and registration counts" } })),
        ("/categories", json!({ "get": { "summary": "Distinct workshop categories" } })),
        ("/auth/login", json!({ "post": { "summary": "Admin login" } })),
        ("/auth/students/register", json!({ "post": { "summary": "Student sign-up" } })),
        ("/auth/students/login", json!({ "post": { "summary": "Student login" } })),
        ("/auth/students/me", json!({ "get": { "summary": "Current student" } })),
        ("/auth/refresh", json!({ "post": { "summary": "Exchange a refresh token" } })),
        (
            "/workshops",
            json!({
                "get": { "summary": "List workshops" },
                "post": { "summary": "Create a workshop (admin)" },
            }),
        ),
        (
            "/workshops/{id}",
            json!({
                "get": { "summary": "Get a workshop" },
                "put": { "summary": "Update a workshop (admin)" },
                "delete": { "summary": "Delete a workshop (admin)" },
            }),
        ),
        (
            "/workshops/{id}/register",
            json!({
                "post": { "summary": "Register for a workshop (student)" },
                "delete": { "summary": "Cancel a registration (student)" },
            }),
        ),
        ("/registrations/me", json!({ "get": { "summary": "Workshops the student is registered on" } })),
        ("/students", json!({ "get": { "summary": "List students (admin)" } })),
        (
            "/students/{id}",
            json!({
                "get": { "summary": "Get a student (admin)" },
                "put": { "summary": "Update a student (admin)" },
                "delete": { "summary": "Delete a student and their registrations (admin)" },
            }),
        ),
    ]
    .into_iter()
    .map(|(path, ops)| (path.to_string(), ops))
    .collect();

    Json(json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Workshop registration API",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(Json(json!({
        "ok": true,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    Ok(Json(Stats {
        workshops: workshop_repo::count_workshops(&state.db).await?,
        students: student_repo::count_students(&state.db).await?,
        registrations: workshop_repo::count_registrations(&state.db).await?,
    }))
}

async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let categories = workshop_repo::fetch_categories(&state.db).await?;
    Ok(Json(categories))
}

async fn not_found() -> AppError {
    AppError::NotFound("Endpoint")
}
