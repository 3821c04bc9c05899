//! Course catalog operations and the course row lock that serializes seat changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::info;
use ts_rs::TS;

use crate::data::models::{Course, CourseWithCounts, EnrollmentEventKind};
use crate::data::waitlist::{self, PromotionOutcome};
use crate::data::{audit, enrollments, unique_violation};
use crate::registrar::RegistrarError;

const COURSE_WITH_COUNTS_SELECT: &str = r#"
    SELECT c.*,
        (SELECT COUNT(*) FROM enrollments e
          WHERE e.course_id = c.id AND e.status = 'enrolled') AS enrolled_count,
        (SELECT COUNT(*) FROM waitlist_entries w
          WHERE w.course_id = c.id AND w.status = 'waiting') AS waitlist_count
    FROM courses c
"#;

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub max_students: i32,
    pub department: Option<String>,
    pub teacher: Option<String>,
    pub semester: String,
}

impl NewCourse {
    pub fn normalized(self) -> Result<Self, RegistrarError> {
        let course = Self {
            code: self.code.trim().to_uppercase(),
            name: self.name.trim().to_owned(),
            department: non_blank(self.department),
            teacher: non_blank(self.teacher),
            semester: self.semester.trim().to_lowercase(),
            ..self
        };
        if course.code.is_empty() || course.code.len() > 32 {
            return Err(RegistrarError::validation("code", "must be 1-32 characters"));
        }
        if course.name.is_empty() {
            return Err(RegistrarError::validation("name", "must not be empty"));
        }
        if course.semester.is_empty() {
            return Err(RegistrarError::validation("semester", "must not be empty"));
        }
        validate_credits(course.credits)?;
        validate_capacity(course.max_students)?;
        Ok(course)
    }
}

/// Partial update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseUpdate {
    pub name: Option<String>,
    pub credits: Option<i32>,
    pub max_students: Option<i32>,
    pub department: Option<String>,
    pub teacher: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseListParams {
    pub semester: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub open_only: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn validate_credits(credits: i32) -> Result<(), RegistrarError> {
    if !(1..=30).contains(&credits) {
        return Err(RegistrarError::validation("credits", "must be between 1 and 30"));
    }
    Ok(())
}

fn validate_capacity(max_students: i32) -> Result<(), RegistrarError> {
    if !(0..=10_000).contains(&max_students) {
        return Err(RegistrarError::validation(
            "maxStudents",
            "must be between 0 and 10000",
        ));
    }
    Ok(())
}

/// Lock a course row for the rest of the transaction.
///
/// Every operation that reads seat counts and then changes enrollments or
/// waitlist entries takes this lock first, so concurrent requests against the
/// same course run one after another.
pub async fn lock(conn: &mut PgConnection, course_id: i32) -> Result<Course> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .fetch_optional(conn)
        .await
        .context("failed to lock course")?
        .ok_or_else(|| RegistrarError::CourseNotFound(course_id).into())
}

pub async fn create(pool: &PgPool, new: NewCourse) -> Result<CourseWithCounts> {
    let new = new.normalized()?;
    let result = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (code, name, credits, max_students, department, teacher, semester)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&new.code)
    .bind(&new.name)
    .bind(new.credits)
    .bind(new.max_students)
    .bind(&new.department)
    .bind(&new.teacher)
    .bind(&new.semester)
    .fetch_one(pool)
    .await;

    match result {
        Ok(course) => Ok(CourseWithCounts {
            course,
            enrolled_count: 0,
            waitlist_count: 0,
        }),
        Err(e) if unique_violation(&e).is_some() => {
            Err(RegistrarError::Duplicate { field: "code" }.into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to insert course")),
    }
}

pub async fn get<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<Option<CourseWithCounts>> {
    sqlx::query_as::<_, CourseWithCounts>(&format!("{COURSE_WITH_COUNTS_SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch course")
}

pub async fn list(pool: &PgPool, params: &CourseListParams) -> Result<Vec<CourseWithCounts>> {
    let semester = non_blank(params.semester.clone()).map(|s| s.to_lowercase());
    let department = non_blank(params.department.clone());

    let rows = sqlx::query_as::<_, CourseWithCounts>(&format!(
        r#"
        SELECT * FROM ({COURSE_WITH_COUNTS_SELECT}
            WHERE ($1::text IS NULL OR c.semester = $1)
              AND ($2::text IS NULL OR c.department = $2)) listed
        WHERE NOT $3 OR listed.enrolled_count < listed.max_students
        ORDER BY listed.code
        "#
    ))
    .bind(semester)
    .bind(department)
    .bind(params.open_only)
    .fetch_all(pool)
    .await
    .context("failed to list courses")?;
    Ok(rows)
}

/// Apply a partial update.
///
/// A capacity change is checked against the current enrollment under the
/// course lock: shrinking below the enrolled count is rejected, growing runs
/// waitlist promotion in the same transaction.
pub async fn update(
    pool: &PgPool,
    id: i32,
    update: CourseUpdate,
) -> Result<(CourseWithCounts, Option<PromotionOutcome>)> {
    if let Some(credits) = update.credits {
        validate_credits(credits)?;
    }
    if let Some(max_students) = update.max_students {
        validate_capacity(max_students)?;
    }
    let name = update.name.map(|n| n.trim().to_owned());
    if name.as_deref() == Some("") {
        return Err(RegistrarError::validation("name", "must not be empty").into());
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let course = lock(&mut tx, id).await?;

    if let Some(requested) = update.max_students {
        let enrolled = enrollments::count_enrolled(&mut *tx, id).await?;
        if i64::from(requested) < enrolled {
            return Err(RegistrarError::CapacityBelowEnrollment {
                requested,
                enrolled,
            }
            .into());
        }
    }

    let updated = sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses SET
            name = COALESCE($2, name),
            credits = COALESCE($3, credits),
            max_students = COALESCE($4, max_students),
            department = COALESCE($5, department),
            teacher = COALESCE($6, teacher),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(update.credits)
    .bind(update.max_students)
    .bind(non_blank(update.department))
    .bind(non_blank(update.teacher))
    .fetch_one(&mut *tx)
    .await
    .context("failed to update course")?;

    let mut promotion = None;
    if updated.max_students != course.max_students {
        audit::record(
            &mut tx,
            id,
            None,
            EnrollmentEventKind::CapacityChanged,
            json!({ "from": course.max_students, "to": updated.max_students }),
        )
        .await?;

        if updated.max_students > course.max_students {
            promotion = Some(waitlist::promote_locked(&mut tx, &updated).await?);
        }

        info!(
            course_id = id,
            from = course.max_students,
            to = updated.max_students,
            "course capacity changed"
        );
    }

    let refreshed = get(&mut *tx, id)
        .await?
        .ok_or(RegistrarError::CourseNotFound(id))?;
    tx.commit().await.context("failed to commit course update")?;

    Ok((refreshed, promotion))
}

/// Delete a course and, by cascade, its enrollments, waitlist, and events.
pub async fn delete(pool: &PgPool, id: i32) -> Result<bool> {
    let result = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete course")?;
    Ok(result.rows_affected() > 0)
}
