//! Course waitlist handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use ts_rs::TS;

use crate::data::courses;
use crate::data::models::WaitlistEntry;
use crate::data::waitlist::{self, WaitlistListItem};
use crate::registrar::RegistrarError;
use crate::state::AppState;
use crate::web::auth::extractors::ApiClient;
use crate::web::error::{ApiError, db_error, registrar_error};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct JoinWaitlistBody {
    pub student_id: i32,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WaitlistResponse {
    pub course_id: i32,
    pub entries: Vec<WaitlistListItem>,
}

/// Where a student stands in a course's queue.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WaitlistPosition {
    pub course_id: i32,
    pub student_id: i32,
    pub position: i32,
    pub waiting_count: i32,
}

/// `GET /api/courses/{id}/waitlist`
#[instrument(skip_all, fields(course_id = course_id))]
pub async fn list_waitlist(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(course_id): Path<i32>,
) -> Result<Json<WaitlistResponse>, ApiError> {
    courses::get(&state.db_pool, course_id)
        .await
        .map_err(|e| db_error("list waitlist", e))?
        .ok_or(RegistrarError::CourseNotFound(course_id))?;

    let entries = waitlist::list_for_course(&state.db_pool, course_id)
        .await
        .map_err(|e| db_error("list waitlist", e))?;
    Ok(Json(WaitlistResponse { course_id, entries }))
}

/// `POST /api/courses/{id}/waitlist`
///
/// Only allowed while the course is full; otherwise the client gets a 409
/// `seats_available` and should enroll instead.
#[instrument(skip_all, fields(course_id = course_id, student_id = body.student_id))]
pub async fn join_waitlist(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(course_id): Path<i32>,
    Json(body): Json<JoinWaitlistBody>,
) -> Result<(StatusCode, Json<WaitlistEntry>), ApiError> {
    let entry = waitlist::join(&state.db_pool, course_id, body.student_id)
        .await
        .map_err(|e| registrar_error("join waitlist", e))?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /api/courses/{id}/waitlist/{student_id}`
#[instrument(skip_all, fields(course_id = course_id, student_id = student_id))]
pub async fn get_position(
    _client: ApiClient,
    State(state): State<AppState>,
    Path((course_id, student_id)): Path<(i32, i32)>,
) -> Result<Json<WaitlistPosition>, ApiError> {
    let course = courses::get(&state.db_pool, course_id)
        .await
        .map_err(|e| db_error("waitlist position", e))?
        .ok_or(RegistrarError::CourseNotFound(course_id))?;

    let entry = waitlist::find_waiting(&state.db_pool, course_id, student_id)
        .await
        .map_err(|e| db_error("waitlist position", e))?
        .ok_or_else(|| ApiError::from(RegistrarError::NotWaitlisted))?;

    Ok(Json(WaitlistPosition {
        course_id,
        student_id,
        position: entry.position,
        waiting_count: course.waitlist_count as i32,
    }))
}

/// `DELETE /api/courses/{id}/waitlist/{student_id}`
#[instrument(skip_all, fields(course_id = course_id, student_id = student_id))]
pub async fn leave_waitlist(
    _client: ApiClient,
    State(state): State<AppState>,
    Path((course_id, student_id)): Path<(i32, i32)>,
) -> Result<Json<WaitlistEntry>, ApiError> {
    let entry = waitlist::leave(&state.db_pool, course_id, student_id)
        .await
        .map_err(|e| registrar_error("leave waitlist", e))?;
    Ok(Json(entry))
}
