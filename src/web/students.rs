//! Student directory handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::enrollments::{self, StudentEnrollmentItem};
use crate::data::models::{EnrollmentStatus, Student, StudentStatus};
use crate::data::students::{self, NewStudent, StudentListParams, StudentListResponse, StudentSummary};
use crate::data::waitlist::{self, PromotionOutcome, StudentWaitlistItem};
use crate::state::AppState;
use crate::web::auth::extractors::{AdminClient, ApiClient};
use crate::web::error::{ApiError, OptionNotFoundExt, db_error, registrar_error};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateStudentBody {
    pub status: StudentStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentStatusFilter {
    pub status: Option<EnrollmentStatus>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeleteStudentResponse {
    pub deleted: bool,
    /// Promotion passes run for courses where the student held a seat or a place in line.
    pub promotions: Vec<PromotionOutcome>,
}

/// `GET /api/students`
#[instrument(skip_all)]
pub async fn list_students(
    _client: ApiClient,
    State(state): State<AppState>,
    Query(params): Query<StudentListParams>,
) -> Result<Json<StudentListResponse>, ApiError> {
    let response = students::list(&state.db_pool, &params)
        .await
        .map_err(|e| db_error("list students", e))?;
    Ok(Json(response))
}

/// `POST /api/students`
#[instrument(skip_all)]
pub async fn create_student(
    _client: ApiClient,
    State(state): State<AppState>,
    Json(body): Json<NewStudent>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let student = students::create(&state.db_pool, body)
        .await
        .map_err(|e| registrar_error("create student", e))?;

    info!(student_id = student.id, student_number = %student.student_number, "student created");
    Ok((StatusCode::CREATED, Json(student)))
}

/// `GET /api/students/{id}`
#[instrument(skip_all, fields(student_id = id))]
pub async fn get_student(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Student>, ApiError> {
    let student = students::get(&state.db_pool, id)
        .await
        .map_err(|e| db_error("get student", e))?
        .or_not_found("Student", id)?;
    Ok(Json(student))
}

/// `PATCH /api/students/{id}` -- Change academic status.
#[instrument(skip_all, fields(student_id = id))]
pub async fn update_student(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateStudentBody>,
) -> Result<Json<Student>, ApiError> {
    let student = students::update_status(&state.db_pool, id, body.status)
        .await
        .map_err(|e| db_error("update student", e))?
        .or_not_found("Student", id)?;

    info!(student_id = id, status = ?body.status, "student status updated");
    Ok(Json(student))
}

/// `DELETE /api/students/{id}`
///
/// Freed seats in the student's courses go to the next in line as part of
/// the same delete.
#[instrument(skip_all, fields(student_id = id))]
pub async fn delete_student(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DeleteStudentResponse>, ApiError> {
    let promotions = students::delete(&state.db_pool, id)
        .await
        .map_err(|e| registrar_error("delete student", e))?
        .or_not_found("Student", id)?;

    info!(student_id = id, courses = promotions.len(), "student deleted");
    Ok(Json(DeleteStudentResponse {
        deleted: true,
        promotions,
    }))
}

/// `GET /api/students/{id}/summary`
#[instrument(skip_all, fields(student_id = id))]
pub async fn student_summary(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<StudentSummary>, ApiError> {
    let summary = students::summary(&state.db_pool, id)
        .await
        .map_err(|e| db_error("student summary", e))?
        .or_not_found("Student", id)?;
    Ok(Json(summary))
}

/// `GET /api/students/{id}/enrollments`
#[instrument(skip_all, fields(student_id = id))]
pub async fn student_enrollments(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(filter): Query<EnrollmentStatusFilter>,
) -> Result<Json<Vec<StudentEnrollmentItem>>, ApiError> {
    students::require(&state.db_pool, id)
        .await
        .map_err(|e| registrar_error("student enrollments", e))?;
    let rows = enrollments::list_for_student(&state.db_pool, id, filter.status)
        .await
        .map_err(|e| db_error("student enrollments", e))?;
    Ok(Json(rows))
}

/// `GET /api/students/{id}/waitlist`
#[instrument(skip_all, fields(student_id = id))]
pub async fn student_waitlist(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<StudentWaitlistItem>>, ApiError> {
    students::require(&state.db_pool, id)
        .await
        .map_err(|e| registrar_error("student waitlist", e))?;
    let rows = waitlist::list_for_student(&state.db_pool, id)
        .await
        .map_err(|e| db_error("student waitlist", e))?;
    Ok(Json(rows))
}
