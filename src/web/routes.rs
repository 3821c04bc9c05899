//! Web API router construction.

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    response::Response,
    routing::{get, post, put},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::security_headers::SecurityHeadersLayer;
use crate::web::{admin, courses, enrollments, invoices, status, students, waitlist};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache-Control for everything under `/api`: responses are per-caller and mutable.
static NO_STORE: HeaderValue = HeaderValue::from_static("private, no-store, must-revalidate");

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600))
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let public_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status));

    let registrar_router = Router::new()
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route(
            "/students/{id}",
            get(students::get_student)
                .patch(students::update_student)
                .delete(students::delete_student),
        )
        .route("/students/{id}/summary", get(students::student_summary))
        .route(
            "/students/{id}/enrollments",
            get(students::student_enrollments),
        )
        .route("/students/{id}/waitlist", get(students::student_waitlist))
        .route(
            "/students/{id}/invoices",
            get(invoices::list_student_invoices).post(invoices::create_invoice),
        )
        .route(
            "/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route(
            "/courses/{id}",
            get(courses::get_course)
                .patch(courses::update_course)
                .delete(courses::delete_course),
        )
        .route(
            "/courses/{id}/enrollments",
            get(enrollments::list_course_enrollments).post(enrollments::enroll),
        )
        .route(
            "/courses/{id}/enrollments/{student_id}",
            axum::routing::delete(enrollments::unenroll),
        )
        .route(
            "/courses/{id}/enrollments/{student_id}/complete",
            post(enrollments::complete_enrollment),
        )
        .route(
            "/courses/{id}/enrollments/{student_id}/grade",
            put(enrollments::set_grade),
        )
        .route(
            "/courses/{id}/waitlist",
            get(waitlist::list_waitlist).post(waitlist::join_waitlist),
        )
        .route(
            "/courses/{id}/waitlist/{student_id}",
            get(waitlist::get_position).delete(waitlist::leave_waitlist),
        )
        .route("/invoices/{id}", get(invoices::get_invoice))
        .route("/invoices/{id}/payments", post(invoices::record_payment))
        .route("/invoices/{id}/void", post(invoices::void_invoice));

    let admin_router = Router::new()
        .route(
            "/admin/courses/{id}/waitlist/process",
            post(admin::process_waitlist),
        )
        .route("/admin/audit-log", get(admin::list_audit_log));

    let api_router = Router::new()
        .merge(public_router)
        .merge(registrar_router)
        .merge(admin_router)
        .layer(axum::middleware::map_response(
            |mut resp: Response| async move {
                resp.headers_mut()
                    .insert(header::CACHE_CONTROL, NO_STORE.clone());
                resp
            },
        ));

    Router::new()
        .nest("/api", api_router)
        .with_state(app_state)
        .layer((
            // Outermost: per-request ID span + severity-proportional response logging.
            RequestIdLayer,
            SecurityHeadersLayer::json_api(),
            cors(),
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TimeoutLayer::new(REQUEST_TIMEOUT),
        ))
}
