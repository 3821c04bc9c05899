//! Domain errors for enrollment, waitlist, and billing operations.

/// Failures the data layer raises when a request would break a registrar rule.
///
/// Returned inside `anyhow::Error`; the web layer downcasts to this type to
/// choose an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrarError {
    #[error("student {0} not found")]
    StudentNotFound(i32),
    #[error("course {0} not found")]
    CourseNotFound(i32),
    #[error("invoice {0} not found")]
    InvoiceNotFound(i32),
    #[error("student {student_id} is {status} and cannot register")]
    StudentInactive { student_id: i32, status: String },
    #[error("course {course_id} is full ({capacity} seats)")]
    CourseFull { course_id: i32, capacity: i32 },
    #[error("student is already enrolled in this course")]
    AlreadyEnrolled,
    #[error("student has already completed this course")]
    AlreadyCompleted,
    #[error("student is not enrolled in this course")]
    NotEnrolled,
    #[error("student is already on the waitlist for this course")]
    AlreadyWaitlisted,
    #[error("student is not on the waitlist for this course")]
    NotWaitlisted,
    #[error("course has {available} open seat(s); enroll directly instead")]
    SeatsAvailable { available: i64 },
    #[error("capacity {requested} is below the {enrolled} students currently enrolled")]
    CapacityBelowEnrollment { requested: i32, enrolled: i64 },
    #[error("enrollment is {status} and cannot be graded")]
    NotGradable { status: String },
    #[error("invalid grade '{0}'")]
    InvalidGrade(String),
    #[error("invoice is {status} and cannot accept payments")]
    InvoiceClosed { status: String },
    #[error("payment of {amount_cents} exceeds the remaining balance of {balance_cents}")]
    Overpayment { amount_cents: i64, balance_cents: i64 },
    #[error("invoice has payments and cannot be voided")]
    InvoiceHasPayments,
    #[error("{field} is already in use")]
    Duplicate { field: &'static str },
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
}

impl RegistrarError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrar_error_downcast() {
        let err: anyhow::Error = RegistrarError::AlreadyEnrolled.into();
        assert_eq!(
            err.downcast_ref::<RegistrarError>(),
            Some(&RegistrarError::AlreadyEnrolled)
        );
    }

    #[test]
    fn test_downcast_survives_context() {
        let err = anyhow::Error::from(RegistrarError::CourseNotFound(7)).context("enroll");
        assert_eq!(
            err.downcast_ref::<RegistrarError>(),
            Some(&RegistrarError::CourseNotFound(7))
        );
    }

    #[test]
    fn test_messages() {
        let err = RegistrarError::CourseFull {
            course_id: 3,
            capacity: 30,
        };
        assert_eq!(err.to_string(), "course 3 is full (30 seats)");
    }
}
