//! Student records: creation, lookup, directory listing, and academic summaries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use ts_rs::TS;

use crate::data::models::{Student, StudentStatus};
use crate::data::waitlist::{self, PromotionOutcome};
use crate::data::{courses, page_bounds, unique_violation};
use crate::registrar::{Grade, RegistrarError, compute_gpa};

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NewStudent {
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl NewStudent {
    /// Trim fields and check the obvious shape rules.
    pub fn normalized(self) -> Result<Self, RegistrarError> {
        let student = Self {
            student_number: self.student_number.trim().to_owned(),
            first_name: self.first_name.trim().to_owned(),
            last_name: self.last_name.trim().to_owned(),
            email: self.email.trim().to_lowercase(),
        };
        if student.student_number.is_empty() || student.student_number.len() > 32 {
            return Err(RegistrarError::validation(
                "studentNumber",
                "must be 1-32 characters",
            ));
        }
        if student.first_name.is_empty() {
            return Err(RegistrarError::validation("firstName", "must not be empty"));
        }
        if student.last_name.is_empty() {
            return Err(RegistrarError::validation("lastName", "must not be empty"));
        }
        let valid_email = student
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(RegistrarError::validation(
                "email",
                "must be a valid email address",
            ));
        }
        Ok(student)
    }
}

#[derive(Debug, Default, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentListParams {
    pub status: Option<StudentStatus>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i32,
    #[serde(default = "default_per_page")]
    pub per_page: i32,
}

fn default_page() -> i32 {
    1
}
fn default_per_page() -> i32 {
    50
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentListResponse {
    pub students: Vec<Student>,
    #[ts(as = "i32")]
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
}

/// Enrollment totals and GPA for a single student.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentSummary {
    pub student: Student,
    #[ts(as = "i32")]
    pub enrolled_courses: i64,
    #[ts(as = "i32")]
    pub waitlisted_courses: i64,
    #[ts(as = "i32")]
    pub completed_credits: i64,
    pub gpa: Option<f64>,
}

/// Insert a student. Duplicate student numbers and emails fail with
/// [`RegistrarError::Duplicate`].
pub async fn create(pool: &PgPool, new: NewStudent) -> Result<Student> {
    let new = new.normalized()?;
    let result = sqlx::query_as::<_, Student>(
        r#"
        INSERT INTO students (student_number, first_name, last_name, email)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&new.student_number)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.email)
    .fetch_one(pool)
    .await;

    match result {
        Ok(student) => Ok(student),
        Err(e) => match unique_violation(&e) {
            Some("students_email_key") => Err(RegistrarError::Duplicate { field: "email" }.into()),
            Some(_) => Err(RegistrarError::Duplicate {
                field: "studentNumber",
            }
            .into()),
            None => Err(anyhow::Error::new(e).context("failed to insert student")),
        },
    }
}

pub async fn get<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<Option<Student>> {
    sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch student")
}

/// Like [`get`], but a missing student is a [`RegistrarError::StudentNotFound`].
pub async fn require<'e>(executor: impl PgExecutor<'e>, id: i32) -> Result<Student> {
    get(executor, id)
        .await?
        .ok_or_else(|| RegistrarError::StudentNotFound(id).into())
}

/// Fail unless the student may enroll or join a waitlist.
pub fn ensure_active(student: &Student) -> Result<(), RegistrarError> {
    if student.status == StudentStatus::Active {
        return Ok(());
    }
    let status = serde_json::to_value(student.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default();
    Err(RegistrarError::StudentInactive {
        student_id: student.id,
        status,
    })
}

/// Paginated directory listing with optional status filter and name/number search.
pub async fn list(pool: &PgPool, params: &StudentListParams) -> Result<StudentListResponse> {
    let (limit, offset) = page_bounds(params.page, params.per_page);
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let filter = r#"
        WHERE ($1::student_status IS NULL OR status = $1)
          AND ($2::text IS NULL
               OR (first_name || ' ' || last_name) ILIKE $2
               OR student_number ILIKE $2
               OR email ILIKE $2)
    "#;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM students {filter}"))
        .bind(params.status)
        .bind(search.as_deref())
        .fetch_one(pool)
        .await
        .context("failed to count students")?;

    let students = sqlx::query_as::<_, Student>(&format!(
        "SELECT * FROM students {filter} ORDER BY last_name, first_name, id LIMIT $3 OFFSET $4"
    ))
    .bind(params.status)
    .bind(search.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("failed to list students")?;

    Ok(StudentListResponse {
        students,
        total,
        page: params.page.max(1),
        per_page: limit as i32,
    })
}

/// Change a student's academic status. Returns `None` if the student doesn't exist.
pub async fn update_status(pool: &PgPool, id: i32, status: StudentStatus) -> Result<Option<Student>> {
    sqlx::query_as::<_, Student>("UPDATE students SET status = $2 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await
        .context("failed to update student status")
}

/// Delete a student and, by cascade, their enrollments and waitlist entries.
///
/// Every course where the student held a seat or a waitlist place is locked
/// (ascending id) before the delete and promoted after it, all in one
/// transaction, so the freed seats and the renumbered queues commit together
/// with the delete. Returns `None` if the student doesn't exist.
pub async fn delete(pool: &PgPool, id: i32) -> Result<Option<Vec<PromotionOutcome>>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let course_ids: Vec<i32> = sqlx::query_scalar(
        r#"
        SELECT course_id FROM enrollments WHERE student_id = $1 AND status = 'enrolled'
        UNION
        SELECT course_id FROM waitlist_entries WHERE student_id = $1 AND status = 'waiting'
        ORDER BY 1
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to fetch student's seat-holding courses")?;

    let mut locked = Vec::with_capacity(course_ids.len());
    for course_id in course_ids {
        locked.push(courses::lock(&mut tx, course_id).await?);
    }

    let deleted = sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("failed to delete student")?;

    if deleted.rows_affected() == 0 {
        return Ok(None);
    }

    let mut promotions = Vec::with_capacity(locked.len());
    for course in &locked {
        promotions.push(waitlist::promote_locked(&mut tx, course).await?);
    }

    tx.commit().await.context("failed to commit student delete")?;
    Ok(Some(promotions))
}

/// Enrollment counts, completed credits, and GPA for a student.
pub async fn summary(pool: &PgPool, id: i32) -> Result<Option<StudentSummary>> {
    let Some(student) = get(pool, id).await? else {
        return Ok(None);
    };

    let (enrolled_courses, completed_credits): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE e.status = 'enrolled'),
            COALESCE(SUM(c.credits) FILTER (WHERE e.status = 'completed'), 0)::bigint
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.student_id = $1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .context("failed to aggregate student enrollments")?;

    let (waitlisted_courses,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM waitlist_entries WHERE student_id = $1 AND status = 'waiting'",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .context("failed to count student waitlist entries")?;

    let graded: Vec<(String, i32)> = sqlx::query_as(
        r#"
        SELECT e.grade, c.credits
        FROM enrollments e
        JOIN courses c ON c.id = e.course_id
        WHERE e.student_id = $1 AND e.status = 'completed' AND e.grade IS NOT NULL
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to fetch graded enrollments")?;

    // Grades are validated on write; anything unparseable is skipped rather than failing the summary.
    let gpa = compute_gpa(
        graded
            .iter()
            .filter_map(|(grade, credits)| grade.parse::<Grade>().ok().map(|g| (g, *credits))),
    );

    Ok(Some(StudentSummary {
        student,
        enrolled_courses,
        waitlisted_courses,
        completed_credits,
        gpa,
    }))
}

/// Escape SQL LIKE metacharacters so user input matches literally.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
