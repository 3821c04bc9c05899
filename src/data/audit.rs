//! Database query functions for the enrollment event log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::data::models::{EnrollmentEventKind, EnrollmentEventRow};

const EVENT_SELECT: &str = "SELECT ev.id, ev.course_id, ev.student_id, ev.kind, ev.detail, ev.created_at, \
            c.code AS course_code, s.student_number \
     FROM enrollment_events ev \
     LEFT JOIN courses c ON c.id = ev.course_id \
     LEFT JOIN students s ON s.id = ev.student_id";

/// Append an event. Must run on the connection of the transaction that made the change.
pub async fn record(
    conn: &mut PgConnection,
    course_id: i32,
    student_id: Option<i32>,
    kind: EnrollmentEventKind,
    detail: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO enrollment_events (course_id, student_id, kind, detail) VALUES ($1, $2, $3, $4)",
    )
    .bind(course_id)
    .bind(student_id)
    .bind(kind)
    .bind(detail)
    .execute(conn)
    .await
    .context("failed to record enrollment event")?;
    Ok(())
}

/// Fetch events with optional filters applied in SQL, newest first.
///
/// All filter parameters are nullable -- passing `None` disables that filter.
pub async fn list_filtered(
    pool: &PgPool,
    since: Option<DateTime<Utc>>,
    course_id: Option<i32>,
    student_id: Option<i32>,
    limit: i64,
) -> Result<Vec<EnrollmentEventRow>> {
    let rows: Vec<EnrollmentEventRow> = sqlx::query_as(&format!(
        "{EVENT_SELECT} \
         WHERE ($1::timestamptz IS NULL OR ev.created_at > $1) \
           AND ($2::int IS NULL OR ev.course_id = $2) \
           AND ($3::int IS NULL OR ev.student_id = $3) \
         ORDER BY ev.created_at DESC, ev.id DESC LIMIT $4"
    ))
    .bind(since)
    .bind(course_id)
    .bind(student_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list enrollment events")?;
    Ok(rows)
}
