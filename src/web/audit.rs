//! Enrollment event DTOs for the admin audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::data::models::{EnrollmentEventKind, EnrollmentEventRow};

const DEFAULT_LIMIT: i64 = 200;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EnrollmentEvent {
    pub id: i32,
    pub course_id: i32,
    pub course_code: Option<String>,
    pub student_id: Option<i32>,
    pub student_number: Option<String>,
    pub kind: EnrollmentEventKind,
    pub detail: serde_json::Value,
    pub timestamp: String,
}

impl From<EnrollmentEventRow> for EnrollmentEvent {
    fn from(row: EnrollmentEventRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            course_code: row.course_code,
            student_id: row.student_id,
            student_number: row.student_number,
            kind: row.kind,
            detail: row.detail,
            timestamp: row.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditLogResponse {
    pub entries: Vec<EnrollmentEvent>,
}

/// Query filters for `GET /api/admin/audit-log`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogParams {
    pub since: Option<DateTime<Utc>>,
    pub course_id: Option<i32>,
    pub student_id: Option<i32>,
    pub limit: Option<i64>,
}

impl AuditLogParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}
