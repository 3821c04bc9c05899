//! Enrollment handlers nested under a course.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::instrument;
use ts_rs::TS;

use crate::data::courses;
use crate::data::enrollments::{
    self, CourseEnrollmentItem, EnrollOutcome, EnrollRequest, SeatReleased,
};
use crate::data::models::Enrollment;
use crate::registrar::Grade;
use crate::state::AppState;
use crate::web::auth::extractors::{AdminClient, ApiClient};
use crate::web::error::{ApiError, OptionNotFoundExt, db_error, registrar_error};
use crate::web::students::EnrollmentStatusFilter;

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GradeBody {
    pub grade: String,
}

impl GradeBody {
    fn parse(&self) -> Result<Grade, ApiError> {
        self.grade
            .parse::<Grade>()
            .map_err(ApiError::from)
    }
}

/// `GET /api/courses/{id}/enrollments`
#[instrument(skip_all, fields(course_id = course_id))]
pub async fn list_course_enrollments(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(course_id): Path<i32>,
    Query(filter): Query<EnrollmentStatusFilter>,
) -> Result<Json<Vec<CourseEnrollmentItem>>, ApiError> {
    courses::get(&state.db_pool, course_id)
        .await
        .map_err(|e| db_error("course enrollments", e))?
        .or_not_found("Course", course_id)?;

    let rows = enrollments::list_for_course(&state.db_pool, course_id, filter.status)
        .await
        .map_err(|e| db_error("course enrollments", e))?;
    Ok(Json(rows))
}

/// `POST /api/courses/{id}/enrollments`
///
/// 201 when the student got a seat, 202 when they were placed on the waitlist
/// (`waitlistIfFull`), 409 `course_full` otherwise.
#[instrument(skip_all, fields(course_id = course_id, student_id = body.student_id))]
pub async fn enroll(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(course_id): Path<i32>,
    Json(body): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrollOutcome>), ApiError> {
    let outcome = enrollments::enroll(&state.db_pool, course_id, &body)
        .await
        .map_err(|e| registrar_error("enroll", e))?;

    let status = match outcome {
        EnrollOutcome::Enrolled { .. } => StatusCode::CREATED,
        EnrollOutcome::Waitlisted { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}

/// `DELETE /api/courses/{id}/enrollments/{student_id}`
#[instrument(skip_all, fields(course_id = course_id, student_id = student_id))]
pub async fn unenroll(
    _client: ApiClient,
    State(state): State<AppState>,
    Path((course_id, student_id)): Path<(i32, i32)>,
) -> Result<Json<SeatReleased>, ApiError> {
    let released = enrollments::unenroll(&state.db_pool, course_id, student_id)
        .await
        .map_err(|e| registrar_error("unenroll", e))?;
    Ok(Json(released))
}

/// `POST /api/courses/{id}/enrollments/{student_id}/complete`
#[instrument(skip_all, fields(course_id = course_id, student_id = student_id))]
pub async fn complete_enrollment(
    _client: ApiClient,
    State(state): State<AppState>,
    Path((course_id, student_id)): Path<(i32, i32)>,
    Json(body): Json<GradeBody>,
) -> Result<Json<SeatReleased>, ApiError> {
    let grade = body.parse()?;
    let released = enrollments::complete(&state.db_pool, course_id, student_id, grade)
        .await
        .map_err(|e| registrar_error("complete enrollment", e))?;
    Ok(Json(released))
}

/// `PUT /api/courses/{id}/enrollments/{student_id}/grade`
#[instrument(skip_all, fields(course_id = course_id, student_id = student_id))]
pub async fn set_grade(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path((course_id, student_id)): Path<(i32, i32)>,
    Json(body): Json<GradeBody>,
) -> Result<Json<Enrollment>, ApiError> {
    let grade = body.parse()?;
    let enrollment = enrollments::set_grade(&state.db_pool, course_id, student_id, grade)
        .await
        .map_err(|e| registrar_error("set grade", e))?;
    Ok(Json(enrollment))
}
