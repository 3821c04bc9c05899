//! Admin API handlers.
//!
//! All endpoints require the `AdminClient` extractor, returning 401/403 as needed.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, trace};

use crate::data::{audit, waitlist};
use crate::data::waitlist::PromotionOutcome;
use crate::state::AppState;
use crate::web::audit::{AuditLogParams, AuditLogResponse, EnrollmentEvent};
use crate::web::auth::extractors::AdminClient;
use crate::web::error::{ApiError, db_error, registrar_error};

/// `POST /api/admin/courses/{id}/waitlist/process` -- Run promotion now.
#[instrument(skip_all, fields(course_id = course_id))]
pub async fn process_waitlist(
    _admin: AdminClient,
    State(state): State<AppState>,
    Path(course_id): Path<i32>,
) -> Result<Json<PromotionOutcome>, ApiError> {
    let outcome = waitlist::process(&state.db_pool, course_id)
        .await
        .map_err(|e| registrar_error("process waitlist", e))?;

    info!(
        course_id,
        promoted = outcome.promoted.len(),
        remaining = outcome.remaining_waiting,
        "waitlist processed on request"
    );
    Ok(Json(outcome))
}

/// Format a `DateTime<Utc>` as an HTTP-date for Last-Modified headers.
fn to_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_if_modified_since(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let val = headers.get(header::IF_MODIFIED_SINCE)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(val)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `GET /api/admin/audit-log` -- Recent enrollment events, newest first.
///
/// Supports `If-Modified-Since`: returns 304 when the newest event hasn't changed.
#[instrument(skip_all)]
pub async fn list_audit_log(
    _admin: AdminClient,
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(params): Query<AuditLogParams>,
) -> Result<Response, ApiError> {
    let rows = audit::list_filtered(
        &state.db_pool,
        params.since,
        params.course_id,
        params.student_id,
        params.limit(),
    )
    .await
    .map_err(|e| db_error("list audit log", e))?;

    let latest = rows.first().map(|r| r.created_at);

    if let (Some(since), Some(latest_ts)) = (parse_if_modified_since(&headers), latest) {
        // HTTP dates have second precision
        if latest_ts.timestamp() <= since.timestamp() {
            trace!("audit log not modified, returning 304");
            let mut resp = StatusCode::NOT_MODIFIED.into_response();
            if let Ok(val) = to_http_date(&latest_ts).parse() {
                resp.headers_mut().insert(header::LAST_MODIFIED, val);
            }
            return Ok(resp);
        }
    }

    let entries: Vec<EnrollmentEvent> = rows.into_iter().map(EnrollmentEvent::from).collect();
    trace!(count = entries.len(), "listed audit log entries");

    let mut resp = Json(AuditLogResponse { entries }).into_response();
    if let Some(latest_ts) = latest
        && let Ok(val) = to_http_date(&latest_ts).parse()
    {
        resp.headers_mut().insert(header::LAST_MODIFIED, val);
    }
    Ok(resp)
}
