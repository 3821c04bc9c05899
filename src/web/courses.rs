//! Course catalog handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::courses::{self, CourseListParams, CourseUpdate, NewCourse};
use crate::data::models::CourseWithCounts;
use crate::data::waitlist::PromotionOutcome;
use crate::state::AppState;
use crate::web::auth::extractors::{AdminClient, ApiClient};
use crate::web::error::{ApiError, OptionNotFoundExt, db_error, registrar_error};

/// Course detail as returned by the API.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseResponse {
    #[serde(flatten)]
    pub course: CourseWithCounts,
    #[ts(type = "number")]
    pub available_seats: i64,
}

impl From<CourseWithCounts> for CourseResponse {
    fn from(course: CourseWithCounts) -> Self {
        Self {
            available_seats: course.available_seats(),
            course,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateCourseResponse {
    pub course: CourseResponse,
    /// Present when a capacity increase triggered waitlist promotion.
    pub promotion: Option<PromotionOutcome>,
}

/// `GET /api/courses`
#[instrument(skip_all)]
pub async fn list_courses(
    _client: ApiClient,
    State(state): State<AppState>,
    Query(params): Query<CourseListParams>,
) -> Result<Json<Vec<CourseResponse>>, ApiError> {
    let rows = courses::list(&state.db_pool, &params)
        .await
        .map_err(|e| db_error("list courses", e))?;
    Ok(Json(rows.into_iter().map(CourseResponse::from).collect()))
}

/// `POST /api/courses`
#[instrument(skip_all)]
pub async fn create_course(
    _admin: AdminClient,
    State(state): State<AppState>,
    Json(body): Json<NewCourse>,
) -> Result<(StatusCode, Json<CourseResponse>), ApiError> {
    let course = courses::create(&state.db_pool, body)
        .await
        .map_err(|e| registrar_error("create course", e))?;

    info!(
        course_id = course.course.id,
        code = %course.course.code,
        capacity = course.course.max_students,
        "course created"
    );
    Ok((StatusCode::CREATED, Json(course.into())))
}

/// `GET /api/courses/{id}`
#[instrument(skip_all, fields(course_id = id))]
pub async fn get_course(
    _client: ApiClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<CourseResponse>, ApiError> {
    let course = courses::get(&state.db_pool, id)
        .await
        .map_err(|e| db_error("get course", e))?
        .or_not_found("Course", id)?;
    Ok(Json(course.into()))
}

/// `PATCH /api/courses/{id}`
///
/// Raising `maxStudents` promotes waiting students into the new seats;
/// lowering it below the current enrollment is a 409.
#[instrument(skip_all, fields(course_id = id))]
pub async fn update_course(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<CourseUpdate>,
) -> Result<Json<UpdateCourseResponse>, ApiError> {
    let (course, promotion) = courses::update(&state.db_pool, id, body)
        .await
        .map_err(|e| registrar_error("update course", e))?;

    Ok(Json(UpdateCourseResponse {
        course: course.into(),
        promotion,
    }))
}

/// `DELETE /api/courses/{id}`
#[instrument(skip_all, fields(course_id = id))]
pub async fn delete_course(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let deleted = courses::delete(&state.db_pool, id)
        .await
        .map_err(|e| db_error("delete course", e))?;
    if !deleted {
        return Err(ApiError::not_found(format!("Course {id} not found")));
    }

    info!(course_id = id, "course deleted");
    Ok(StatusCode::NO_CONTENT)
}
