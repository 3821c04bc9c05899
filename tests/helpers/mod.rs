#![allow(dead_code)]

use registrar::data::courses::{self, NewCourse};
use registrar::data::enrollments::{self, EnrollOutcome, EnrollRequest};
use registrar::data::models::Student;
use registrar::data::students::{self, NewStudent};
use registrar::registrar::RegistrarError;
use sqlx::PgPool;

pub async fn student(pool: &PgPool, n: u32) -> Student {
    students::create(
        pool,
        NewStudent {
            student_number: format!("S{n:05}"),
            first_name: format!("First{n}"),
            last_name: format!("Last{n}"),
            email: format!("student{n}@example.edu"),
        },
    )
    .await
    .expect("create student")
}

/// Create `count` students numbered from `first`.
pub async fn students(pool: &PgPool, first: u32, count: u32) -> Vec<Student> {
    let mut out = Vec::with_capacity(count as usize);
    for n in first..first + count {
        out.push(student(pool, n).await);
    }
    out
}

pub async fn course(pool: &PgPool, code: &str, capacity: i32) -> i32 {
    courses::create(
        pool,
        NewCourse {
            code: code.to_owned(),
            name: format!("{code} Lecture"),
            credits: 3,
            max_students: capacity,
            department: Some("CS".to_owned()),
            teacher: None,
            semester: "fall-2026".to_owned(),
        },
    )
    .await
    .expect("create course")
    .course
    .id
}

pub async fn enroll(pool: &PgPool, course_id: i32, student_id: i32) -> anyhow::Result<EnrollOutcome> {
    enrollments::enroll(
        pool,
        course_id,
        &EnrollRequest {
            student_id,
            waitlist_if_full: false,
        },
    )
    .await
}

pub async fn enroll_or_wait(pool: &PgPool, course_id: i32, student_id: i32) -> EnrollOutcome {
    enrollments::enroll(
        pool,
        course_id,
        &EnrollRequest {
            student_id,
            waitlist_if_full: true,
        },
    )
    .await
    .expect("enroll or waitlist")
}

pub fn domain_error(err: &anyhow::Error) -> Option<&RegistrarError> {
    err.downcast_ref::<RegistrarError>()
}

/// Student ids currently waiting for a course, in position order, with positions.
pub async fn waiting(pool: &PgPool, course_id: i32) -> Vec<(i32, i32)> {
    sqlx::query_as(
        "SELECT student_id, position FROM waitlist_entries \
         WHERE course_id = $1 AND status = 'waiting' ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .expect("list waiting")
}

pub async fn enrolled_students(pool: &PgPool, course_id: i32) -> Vec<i32> {
    sqlx::query_scalar(
        "SELECT student_id FROM enrollments \
         WHERE course_id = $1 AND status = 'enrolled' ORDER BY student_id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .expect("list enrolled")
}

/// Check the seat and queue invariants that must hold after any operation.
pub async fn assert_course_invariants(pool: &PgPool, course_id: i32) {
    let (capacity,): (i32,) = sqlx::query_as("SELECT max_students FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_one(pool)
        .await
        .expect("fetch capacity");
    let enrolled = enrolled_students(pool, course_id).await;
    assert!(
        enrolled.len() as i64 <= i64::from(capacity),
        "course {course_id} has {} enrolled over capacity {capacity}",
        enrolled.len()
    );

    let waiting = waiting(pool, course_id).await;
    let positions: Vec<i32> = waiting.iter().map(|(_, p)| *p).collect();
    let expected: Vec<i32> = (1..=waiting.len() as i32).collect();
    assert_eq!(positions, expected, "waitlist positions must be 1..n");

    for (student_id, _) in &waiting {
        assert!(
            !enrolled.contains(student_id),
            "student {student_id} is both enrolled and waiting"
        );
    }
}
