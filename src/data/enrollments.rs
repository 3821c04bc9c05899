//! Enrollment lifecycle: enroll, drop, complete, and grade.
//!
//! Seat-affecting operations lock the course row first (see [`courses::lock`])
//! and run waitlist promotion before committing, so a freed seat is always
//! offered to the queue in the same transaction that freed it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::info;
use ts_rs::TS;

use crate::data::models::{
    Enrollment, EnrollmentEventKind, EnrollmentStatus, WaitlistEntry,
};
use crate::data::waitlist::{self, PromotionOutcome};
use crate::data::{audit, courses, students};
use crate::registrar::promotion::available_seats;
use crate::registrar::{Grade, RegistrarError};

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EnrollRequest {
    pub student_id: i32,
    /// Join the waitlist instead of failing when the course is full.
    #[serde(default)]
    pub waitlist_if_full: bool,
}

/// What an enroll request ended up doing.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "outcome", rename_all = "camelCase")]
#[ts(export)]
pub enum EnrollOutcome {
    Enrolled {
        enrollment: Enrollment,
        promotion: PromotionOutcome,
    },
    Waitlisted {
        entry: WaitlistEntry,
    },
}

/// An enrollment followed by the promotion pass it triggered.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SeatReleased {
    pub enrollment: Enrollment,
    pub promotion: PromotionOutcome,
}

/// Course roster row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseEnrollmentItem {
    pub id: i32,
    pub student_id: i32,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub status: EnrollmentStatus,
    pub enrollment_date: DateTime<Utc>,
    pub grade: Option<String>,
}

/// Student schedule/transcript row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentEnrollmentItem {
    pub id: i32,
    pub course_id: i32,
    pub course_code: String,
    pub course_name: String,
    pub credits: i32,
    pub semester: String,
    pub status: EnrollmentStatus,
    pub enrollment_date: DateTime<Utc>,
    pub grade: Option<String>,
}

pub async fn count_enrolled<'e>(executor: impl PgExecutor<'e>, course_id: i32) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND status = 'enrolled'",
    )
    .bind(course_id)
    .fetch_one(executor)
    .await
    .context("failed to count enrollments")?;
    Ok(count)
}

pub async fn find<'e>(
    executor: impl PgExecutor<'e>,
    course_id: i32,
    student_id: i32,
) -> Result<Option<Enrollment>> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE course_id = $1 AND student_id = $2",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
    .context("failed to fetch enrollment")
}

/// Fail if the student is enrolled in, or has completed, the course.
pub async fn ensure_not_holding_seat(
    conn: &mut PgConnection,
    course_id: i32,
    student_id: i32,
) -> Result<()> {
    match find(conn, course_id, student_id).await?.map(|e| e.status) {
        Some(EnrollmentStatus::Enrolled) => Err(RegistrarError::AlreadyEnrolled.into()),
        Some(EnrollmentStatus::Completed) => Err(RegistrarError::AlreadyCompleted.into()),
        Some(EnrollmentStatus::Dropped) | None => Ok(()),
    }
}

/// Insert an `enrolled` row, or reactivate the student's dropped row.
///
/// Callers hold the course lock and have already checked for a free seat.
pub async fn upsert_enrolled<'e>(
    executor: impl PgExecutor<'e>,
    student_id: i32,
    course_id: i32,
) -> Result<Enrollment> {
    sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (student_id, course_id, status)
        VALUES ($1, $2, 'enrolled')
        ON CONFLICT (student_id, course_id) DO UPDATE SET
            status = 'enrolled',
            enrollment_date = now(),
            grade = NULL,
            updated_at = now()
        WHERE enrollments.status = 'dropped'
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await
    .context("failed to upsert enrollment")?
    .ok_or_else(|| RegistrarError::AlreadyEnrolled.into())
}

/// Enroll a student in a course.
///
/// The waitlist is served first: promotion runs before the requester is
/// considered, so a direct request never takes a seat from someone already
/// in line. If no seat is left the request fails with
/// [`RegistrarError::CourseFull`], or joins the waitlist when
/// `waitlist_if_full` is set.
pub async fn enroll(
    pool: &PgPool,
    course_id: i32,
    request: &EnrollRequest,
) -> Result<EnrollOutcome> {
    let student_id = request.student_id;
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let course = courses::lock(&mut tx, course_id).await?;
    let student = students::require(&mut *tx, student_id).await?;
    students::ensure_active(&student)?;
    ensure_not_holding_seat(&mut tx, course_id, student_id).await?;

    let promotion = waitlist::promote_locked(&mut tx, &course).await?;

    // An active student waiting in line is promoted by the pass above whenever a seat exists.
    if promotion.promoted.iter().any(|p| p.student_id == student_id) {
        let enrollment = find(&mut *tx, course_id, student_id)
            .await?
            .context("promoted enrollment vanished")?;
        tx.commit().await.context("failed to commit enrollment")?;
        info!(course_id, student_id, "student enrolled from waitlist");
        return Ok(EnrollOutcome::Enrolled {
            enrollment,
            promotion,
        });
    }

    let enrolled = count_enrolled(&mut *tx, course_id).await?;
    if available_seats(course.max_students, enrolled) == 0 {
        if !request.waitlist_if_full {
            // Keep whatever the promotion pass did; only the requester is turned away.
            tx.commit().await.context("failed to commit waitlist promotion")?;
            return Err(RegistrarError::CourseFull {
                course_id,
                capacity: course.max_students,
            }
            .into());
        }
        let entry = waitlist::append_locked(&mut tx, course_id, student_id).await?;
        tx.commit().await.context("failed to commit waitlist join")?;
        info!(
            course_id,
            student_id,
            position = entry.position,
            "course full, student waitlisted"
        );
        return Ok(EnrollOutcome::Waitlisted { entry });
    }

    let enrollment = upsert_enrolled(&mut *tx, student_id, course_id).await?;
    audit::record(
        &mut tx,
        course_id,
        Some(student_id),
        EnrollmentEventKind::Enrolled,
        json!({}),
    )
    .await?;
    tx.commit().await.context("failed to commit enrollment")?;

    info!(course_id, student_id, "student enrolled");
    Ok(EnrollOutcome::Enrolled {
        enrollment,
        promotion,
    })
}

/// Move an `enrolled` row to `next` under the course lock, then promote.
async fn release_seat(
    pool: &PgPool,
    course_id: i32,
    student_id: i32,
    next: EnrollmentStatus,
    grade: Option<Grade>,
) -> Result<SeatReleased> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let course = courses::lock(&mut tx, course_id).await?;

    let current = find(&mut *tx, course_id, student_id)
        .await?
        .ok_or(RegistrarError::NotEnrolled)?;
    if !current.status.can_transition_to(next) {
        return Err(RegistrarError::NotEnrolled.into());
    }

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        UPDATE enrollments SET status = $2, grade = COALESCE($3, grade), updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(current.id)
    .bind(next)
    .bind(grade.map(|g| g.as_str()))
    .fetch_one(&mut *tx)
    .await
    .context("failed to update enrollment status")?;

    let kind = match next {
        EnrollmentStatus::Completed => EnrollmentEventKind::Completed,
        _ => EnrollmentEventKind::Dropped,
    };
    audit::record(
        &mut tx,
        course_id,
        Some(student_id),
        kind,
        json!({ "grade": enrollment.grade }),
    )
    .await?;

    let promotion = waitlist::promote_locked(&mut tx, &course).await?;
    tx.commit().await.context("failed to commit enrollment change")?;

    info!(
        course_id,
        student_id,
        status = ?next,
        promoted = promotion.promoted.len(),
        "enrollment seat released"
    );
    Ok(SeatReleased {
        enrollment,
        promotion,
    })
}

/// Drop an enrolled student and offer the seat to the waitlist.
pub async fn unenroll(pool: &PgPool, course_id: i32, student_id: i32) -> Result<SeatReleased> {
    release_seat(pool, course_id, student_id, EnrollmentStatus::Dropped, None).await
}

/// Mark an enrollment completed with a final grade. The seat is released.
pub async fn complete(
    pool: &PgPool,
    course_id: i32,
    student_id: i32,
    grade: Grade,
) -> Result<SeatReleased> {
    release_seat(
        pool,
        course_id,
        student_id,
        EnrollmentStatus::Completed,
        Some(grade),
    )
    .await
}

/// Correct the grade of a completed enrollment.
pub async fn set_grade(
    pool: &PgPool,
    course_id: i32,
    student_id: i32,
    grade: Grade,
) -> Result<Enrollment> {
    let current = find(pool, course_id, student_id)
        .await?
        .ok_or(RegistrarError::NotEnrolled)?;
    if current.status != EnrollmentStatus::Completed {
        let status = serde_json::to_value(current.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        return Err(RegistrarError::NotGradable { status }.into());
    }

    sqlx::query_as::<_, Enrollment>(
        "UPDATE enrollments SET grade = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(current.id)
    .bind(grade.as_str())
    .fetch_one(pool)
    .await
    .context("failed to set grade")
}

pub async fn list_for_course(
    pool: &PgPool,
    course_id: i32,
    status: Option<EnrollmentStatus>,
) -> Result<Vec<CourseEnrollmentItem>> {
    sqlx::query_as::<_, CourseEnrollmentItem>(
        r#"
        SELECT e.id, e.student_id, s.student_number, s.first_name, s.last_name,
               e.status, e.enrollment_date, e.grade
        FROM enrollments e
        JOIN students s ON s.id = e.student_id
        WHERE e.course_id = $1 AND ($2::enrollment_status IS NULL OR e.status = $2)
        ORDER BY s.last_name, s.first_name, s.id
        "#,
    )
    .bind(course_id)
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list course enrollments")
}

pub async fn list_for_student(
    pool: &PgPool,
    student_id: i32,
    status: Option<EnrollmentStatus>,
) -> Result<Vec<StudentEnrollmentItem>> {
    sqlx::query_as::<_, StudentEnrollmentItem>(
        r#"
        SELECT e.id, e.course_id, c.code AS course_code, c.name AS course_name,
               c.credits, c.semester, e.status, e.enrollment_date, e.grade
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.student_id = $1 AND ($2::enrollment_status IS NULL OR e.status = $2)
        ORDER BY c.semester DESC, c.code
        "#,
    )
    .bind(student_id)
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list student enrollments")
}
