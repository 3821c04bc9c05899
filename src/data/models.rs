//! Database row types and the Postgres enums they carry.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Academic standing of a student. Only `Active` students may enroll or wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "student_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StudentStatus {
    Active,
    Suspended,
    Graduated,
    Withdrawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "enrollment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum EnrollmentStatus {
    Enrolled,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    /// Whether a row may move from `self` to `next`.
    ///
    /// Completed enrollments are terminal; a dropped enrollment can only be
    /// reactivated by enrolling again.
    pub fn can_transition_to(self, next: EnrollmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Enrolled, Self::Dropped)
                | (Self::Enrolled, Self::Completed)
                | (Self::Dropped, Self::Enrolled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "waitlist_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum WaitlistStatus {
    Waiting,
    Enrolled,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "enrollment_event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum EnrollmentEventKind {
    Enrolled,
    Dropped,
    Completed,
    Waitlisted,
    WaitlistLeft,
    Promoted,
    CapacityChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Student {
    pub id: i32,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: StudentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Course {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub max_students: i32,
    pub department: Option<String>,
    pub teacher: Option<String>,
    pub semester: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A course together with its live seat counts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CourseWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub course: Course,
    #[ts(type = "number")]
    pub enrolled_count: i64,
    #[ts(type = "number")]
    pub waitlist_count: i64,
}

impl CourseWithCounts {
    pub fn available_seats(&self) -> i64 {
        (i64::from(self.course.max_students) - self.enrolled_count).max(0)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Enrollment {
    pub id: i32,
    pub student_id: i32,
    pub course_id: i32,
    pub status: EnrollmentStatus,
    pub enrollment_date: DateTime<Utc>,
    pub grade: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct WaitlistEntry {
    pub id: i32,
    pub student_id: i32,
    pub course_id: i32,
    pub position: i32,
    pub status: WaitlistStatus,
    pub added_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Invoice {
    pub id: i32,
    pub student_id: i32,
    pub description: String,
    #[ts(type = "number")]
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Payment {
    pub id: i32,
    pub invoice_id: i32,
    #[ts(type = "number")]
    pub amount_cents: i64,
    pub method: String,
    pub paid_at: DateTime<Utc>,
}

/// An enrollment event joined with course and student display fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnrollmentEventRow {
    pub id: i32,
    pub course_id: i32,
    pub student_id: Option<i32>,
    pub kind: EnrollmentEventKind,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub course_code: Option<String>,
    pub student_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_transitions() {
        use EnrollmentStatus::*;
        assert!(Enrolled.can_transition_to(Dropped));
        assert!(Enrolled.can_transition_to(Completed));
        assert!(Dropped.can_transition_to(Enrolled));
        assert!(!Completed.can_transition_to(Enrolled));
        assert!(!Completed.can_transition_to(Dropped));
        assert!(!Dropped.can_transition_to(Completed));
        assert!(!Enrolled.can_transition_to(Enrolled));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(StudentStatus::Graduated).unwrap(),
            "graduated"
        );
        assert_eq!(
            serde_json::to_value(EnrollmentEventKind::WaitlistLeft).unwrap(),
            "waitlist_left"
        );
    }
}
