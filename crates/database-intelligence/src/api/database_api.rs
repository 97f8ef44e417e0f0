//! Registry of target databases

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use super::error_response;
use crate::schema_index::ConnectionProfile;
use crate::shared_state::AppState;

/// Profile as returned to clients: the password is replaced by a flag.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: ConnectionProfile,
    pub has_password: bool,
}

impl From<ConnectionProfile> for ProfileView {
    fn from(profile: ConnectionProfile) -> Self {
        let has_password = profile.has_password();
        Self { profile, has_password }
    }
}

fn validate(profile: &ConnectionProfile) -> Result<(), String> {
    if profile.name.trim().is_empty() {
        return Err("name is required".into());
    }
    if profile.database.trim().is_empty() {
        return Err("databaseName is required".into());
    }
    Ok(())
}

/// POST /databases
pub async fn create_database(
    State(state): State<AppState>,
    Json(mut profile): Json<ConnectionProfile>,
) -> Response {
    if let Err(message) = validate(&profile) {
        return error_response(StatusCode::BAD_REQUEST, message);
    }
    match state.profiles.find_by_name(&profile.name).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Database with name '{}' already exists", profile.name),
            )
        }
        Ok(None) => {}
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    profile.id = 0;
    match state.profiles.save(profile).await {
        Ok(saved) => {
            info!("Registered database '{}' (id {}, password set: {})", saved.name, saved.id, saved.has_password());
            (StatusCode::CREATED, Json(ProfileView::from(saved))).into_response()
        }
        Err(e) => {
            warn!("Failed to save database profile: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /databases
pub async fn list_databases(State(state): State<AppState>) -> Response {
    match state.profiles.find_all().await {
        Ok(profiles) => {
            let views: Vec<ProfileView> = profiles.into_iter().map(ProfileView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /databases/:id
pub async fn get_database(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.profiles.find_by_id(id).await {
        Ok(Some(profile)) => (StatusCode::OK, Json(ProfileView::from(profile))).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Database not found with ID: {}", id)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// PUT /databases/:id
///
/// A missing password in the body keeps the stored one.
pub async fn update_database(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut profile): Json<ConnectionProfile>,
) -> Response {
    if let Err(message) = validate(&profile) {
        return error_response(StatusCode::BAD_REQUEST, message);
    }
    let existing = match state.profiles.find_by_id(id).await {
        Ok(Some(existing)) => existing,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("Database not found with ID: {}", id)),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    profile.id = id;
    if profile.password.is_none() {
        profile.password = existing.password;
    }
    match state.profiles.save(profile).await {
        Ok(saved) => (StatusCode::OK, Json(ProfileView::from(saved))).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /databases/:id
pub async fn delete_database(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.profiles.delete(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("Database not found with ID: {}", id)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
