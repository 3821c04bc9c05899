//! Course waitlists: joining, leaving, listing, and seat promotion.
//!
//! Every mutating function here runs under the course row lock taken by
//! [`courses::lock`]. Functions suffixed `_locked` expect the caller to hold
//! that lock inside an open transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::{debug, info};
use ts_rs::TS;

use crate::data::models::{Course, EnrollmentEventKind, WaitlistEntry, WaitlistStatus};
use crate::data::{audit, courses, enrollments, students};
use crate::registrar::promotion::{self, WaitingCandidate};
use crate::registrar::{RegistrarError, plan_promotion};

/// A student moved from the waitlist into an enrolled seat.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PromotedStudent {
    pub student_id: i32,
    pub waitlist_entry_id: i32,
    pub former_position: i32,
}

/// Result of one promotion pass over a course's waitlist.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PromotionOutcome {
    pub course_id: i32,
    /// Seats that were free before the pass.
    pub available_seats: u32,
    pub promoted: Vec<PromotedStudent>,
    /// Stale entries closed because the student already held a seat.
    pub withdrawn: u32,
    pub remaining_waiting: u32,
}

/// A waiting entry with the student's display fields, for course rosters.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WaitlistListItem {
    pub id: i32,
    pub student_id: i32,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub position: i32,
    pub added_at: DateTime<Utc>,
}

/// A student's waiting entry with the course's display fields.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentWaitlistItem {
    pub id: i32,
    pub course_id: i32,
    pub course_code: String,
    pub course_name: String,
    pub position: i32,
    pub added_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: i32,
    student_id: i32,
    position: i32,
    added_at: DateTime<Utc>,
    student_active: bool,
    already_enrolled: bool,
}

impl From<CandidateRow> for WaitingCandidate {
    fn from(row: CandidateRow) -> Self {
        Self {
            entry_id: row.id,
            student_id: row.student_id,
            position: row.position,
            added_at: row.added_at,
            student_active: row.student_active,
            already_enrolled: row.already_enrolled,
        }
    }
}

/// Snapshot of a course's `waiting` entries in queue order.
async fn load_waiting(conn: &mut PgConnection, course_id: i32) -> Result<Vec<WaitingCandidate>> {
    let rows: Vec<CandidateRow> = sqlx::query_as(
        r#"
        SELECT w.id, w.student_id, w.position, w.added_at,
               s.status = 'active' AS student_active,
               EXISTS (
                   SELECT 1 FROM enrollments e
                   WHERE e.student_id = w.student_id
                     AND e.course_id = w.course_id
                     AND e.status IN ('enrolled', 'completed')
               ) AS already_enrolled
        FROM waitlist_entries w
        JOIN students s ON s.id = w.student_id
        WHERE w.course_id = $1 AND w.status = 'waiting'
        ORDER BY w.position, w.added_at, w.id
        "#,
    )
    .bind(course_id)
    .fetch_all(conn)
    .await
    .context("failed to load waitlist")?;

    Ok(rows.into_iter().map(WaitingCandidate::from).collect())
}

/// Write new positions for entries that stay waiting. Unchanged rows are skipped.
async fn apply_positions(conn: &mut PgConnection, positions: &[(i32, i32)]) -> Result<()> {
    if positions.is_empty() {
        return Ok(());
    }
    let ids: Vec<i32> = positions.iter().map(|(id, _)| *id).collect();
    let new_positions: Vec<i32> = positions.iter().map(|(_, p)| *p).collect();

    sqlx::query(
        r#"
        UPDATE waitlist_entries w SET position = data.position
        FROM (SELECT UNNEST($1::int[]) AS id, UNNEST($2::int[]) AS position) data
        WHERE w.id = data.id AND w.position <> data.position
        "#,
    )
    .bind(&ids)
    .bind(&new_positions)
    .execute(conn)
    .await
    .context("failed to renumber waitlist")?;
    Ok(())
}

/// Close entries with a final status.
async fn resolve_entries(
    conn: &mut PgConnection,
    entry_ids: &[i32],
    status: WaitlistStatus,
) -> Result<()> {
    if entry_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE waitlist_entries SET status = $2, resolved_at = now() WHERE id = ANY($1)",
    )
    .bind(entry_ids)
    .bind(status)
    .execute(conn)
    .await
    .context("failed to resolve waitlist entries")?;
    Ok(())
}

/// Fill a locked course's free seats from its waitlist.
///
/// Promoted students get an `enrolled` row (a dropped row is reactivated),
/// their entries become `enrolled`, and the rest of the queue is renumbered
/// from 1. Runs inside the caller's transaction; nothing is committed here.
pub async fn promote_locked(conn: &mut PgConnection, course: &Course) -> Result<PromotionOutcome> {
    let enrolled = enrollments::count_enrolled(&mut *conn, course.id).await?;
    let waiting = load_waiting(conn, course.id).await?;
    let plan = plan_promotion(course.max_students, enrolled, waiting);

    let withdrawn_ids: Vec<i32> = plan.withdrawn.iter().map(|c| c.entry_id).collect();
    resolve_entries(conn, &withdrawn_ids, WaitlistStatus::Left).await?;

    let mut promoted = Vec::with_capacity(plan.promoted.len());
    for candidate in &plan.promoted {
        enrollments::upsert_enrolled(&mut *conn, candidate.student_id, course.id).await?;
        audit::record(
            conn,
            course.id,
            Some(candidate.student_id),
            EnrollmentEventKind::Promoted,
            json!({ "fromPosition": candidate.position }),
        )
        .await?;
        promoted.push(PromotedStudent {
            student_id: candidate.student_id,
            waitlist_entry_id: candidate.entry_id,
            former_position: candidate.position,
        });
    }
    let promoted_ids: Vec<i32> = promoted.iter().map(|p| p.waitlist_entry_id).collect();
    resolve_entries(conn, &promoted_ids, WaitlistStatus::Enrolled).await?;

    apply_positions(conn, &plan.renumbered).await?;

    if plan.is_noop() {
        debug!(
            course_id = course.id,
            available = plan.available,
            waiting = plan.renumbered.len(),
            "waitlist promotion found nothing to do"
        );
    } else {
        info!(
            course_id = course.id,
            available = plan.available,
            promoted = promoted.len(),
            withdrawn = withdrawn_ids.len(),
            remaining = plan.renumbered.len(),
            "waitlist promoted"
        );
    }

    Ok(PromotionOutcome {
        course_id: course.id,
        available_seats: plan.available,
        promoted,
        withdrawn: withdrawn_ids.len() as u32,
        remaining_waiting: plan.renumbered.len() as u32,
    })
}

/// Explicitly run promotion for a course in its own transaction.
pub async fn process(pool: &PgPool, course_id: i32) -> Result<PromotionOutcome> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let course = courses::lock(&mut tx, course_id).await?;
    let outcome = promote_locked(&mut tx, &course).await?;
    tx.commit().await.context("failed to commit waitlist promotion")?;
    Ok(outcome)
}

/// Append a student to a locked course's waitlist.
///
/// The caller has already checked that the student is active and not enrolled.
pub async fn append_locked(
    conn: &mut PgConnection,
    course_id: i32,
    student_id: i32,
) -> Result<WaitlistEntry> {
    if find_waiting(&mut *conn, course_id, student_id)
        .await?
        .is_some()
    {
        return Err(RegistrarError::AlreadyWaitlisted.into());
    }

    let entry = sqlx::query_as::<_, WaitlistEntry>(
        r#"
        INSERT INTO waitlist_entries (student_id, course_id, position)
        VALUES ($1, $2, (
            SELECT COUNT(*) + 1 FROM waitlist_entries
            WHERE course_id = $2 AND status = 'waiting'
        ))
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await
    .context("failed to insert waitlist entry")?;

    audit::record(
        conn,
        course_id,
        Some(student_id),
        EnrollmentEventKind::Waitlisted,
        json!({ "position": entry.position }),
    )
    .await?;

    Ok(entry)
}

/// Put a student on a course's waitlist.
///
/// Rejected when the course still has free seats, or when the student is
/// inactive, enrolled, already finished the course, or already waiting.
pub async fn join(pool: &PgPool, course_id: i32, student_id: i32) -> Result<WaitlistEntry> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let course = courses::lock(&mut tx, course_id).await?;
    let student = students::require(&mut *tx, student_id).await?;
    students::ensure_active(&student)?;
    enrollments::ensure_not_holding_seat(&mut tx, course_id, student_id).await?;

    let enrolled = enrollments::count_enrolled(&mut *tx, course_id).await?;
    let available = promotion::available_seats(course.max_students, enrolled);
    if available > 0 {
        return Err(RegistrarError::SeatsAvailable {
            available: i64::from(available),
        }
        .into());
    }

    let entry = append_locked(&mut tx, course_id, student_id).await?;
    tx.commit().await.context("failed to commit waitlist join")?;

    info!(
        course_id,
        student_id,
        position = entry.position,
        "student joined waitlist"
    );
    Ok(entry)
}

/// Take a student off a course's waitlist and close the gap they leave.
pub async fn leave(pool: &PgPool, course_id: i32, student_id: i32) -> Result<WaitlistEntry> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    courses::lock(&mut tx, course_id).await?;

    let entry = sqlx::query_as::<_, WaitlistEntry>(
        r#"
        UPDATE waitlist_entries SET status = 'left', resolved_at = now()
        WHERE course_id = $1 AND student_id = $2 AND status = 'waiting'
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to leave waitlist")?
    .ok_or(RegistrarError::NotWaitlisted)?;

    let remaining = load_waiting(&mut tx, course_id).await?;
    apply_positions(&mut tx, &promotion::renumber(&remaining)).await?;

    audit::record(
        &mut tx,
        course_id,
        Some(student_id),
        EnrollmentEventKind::WaitlistLeft,
        json!({ "position": entry.position }),
    )
    .await?;

    tx.commit().await.context("failed to commit waitlist leave")?;

    info!(
        course_id,
        student_id,
        former_position = entry.position,
        "student left waitlist"
    );
    Ok(entry)
}

/// The student's current `waiting` entry for a course, if any.
pub async fn find_waiting<'e>(
    executor: impl PgExecutor<'e>,
    course_id: i32,
    student_id: i32,
) -> Result<Option<WaitlistEntry>> {
    sqlx::query_as::<_, WaitlistEntry>(
        "SELECT * FROM waitlist_entries WHERE course_id = $1 AND student_id = $2 AND status = 'waiting'",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch waitlist entry")
}

/// Waiting entries for a course in position order.
pub async fn list_for_course(pool: &PgPool, course_id: i32) -> Result<Vec<WaitlistListItem>> {
    sqlx::query_as::<_, WaitlistListItem>(
        r#"
        SELECT w.id, w.student_id, s.student_number, s.first_name, s.last_name,
               w.position, w.added_at
        FROM waitlist_entries w
        JOIN students s ON s.id = w.student_id
        WHERE w.course_id = $1 AND w.status = 'waiting'
        ORDER BY w.position, w.added_at, w.id
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("failed to list course waitlist")
}

/// Courses a student is currently waiting for.
pub async fn list_for_student(pool: &PgPool, student_id: i32) -> Result<Vec<StudentWaitlistItem>> {
    sqlx::query_as::<_, StudentWaitlistItem>(
        r#"
        SELECT w.id, w.course_id, c.code AS course_code, c.name AS course_name,
               w.position, w.added_at
        FROM waitlist_entries w
        JOIN courses c ON c.id = w.course_id
        WHERE w.student_id = $1 AND w.status = 'waiting'
        ORDER BY w.added_at
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
    .context("failed to list student waitlist entries")
}
