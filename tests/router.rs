use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use registrar::state::{AppState, ServiceStatus};
use registrar::web::auth::AuthConfig;
use registrar::web::create_router;
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

const CLIENT: &str = "client-secret";
const ADMIN: &str = "admin-secret";

fn router_with(pool: PgPool) -> Router {
    create_router(AppState::new(pool, AuthConfig::new(CLIENT, ADMIN)))
}

/// A router whose pool never connects; fine for requests rejected before any query.
fn offline_router() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://registrar@127.0.0.1:1/unused")
        .unwrap();
    router_with(pool)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let response = offline_router()
        .oneshot(request(Method::GET, "/api/students", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let response = offline_router()
        .oneshot(request(Method::GET, "/api/courses", Some("guess"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn client_token_cannot_use_admin_routes() {
    let cases = [
        (Method::DELETE, "/api/courses/1"),
        (Method::DELETE, "/api/students/1"),
        (Method::POST, "/api/invoices/1/void"),
        (Method::POST, "/api/admin/courses/1/waitlist/process"),
        (Method::GET, "/api/admin/audit-log"),
    ];
    for (method, uri) in cases {
        let response = offline_router()
            .oneshot(request(method.clone(), uri, Some(CLIENT), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method} {uri}");
    }
}

#[tokio::test]
async fn status_is_public_and_tagged() {
    let response = offline_router()
        .oneshot(request(Method::GET, "/api/status", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(
        headers[header::CACHE_CONTROL],
        "private, no-store, must-revalidate"
    );

    let body = json_body(response).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptimeSecs"].is_u64());
}

#[tokio::test]
async fn status_reports_a_starting_web_service() {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://registrar@127.0.0.1:1/unused")
        .unwrap();
    let state = AppState::new(pool, AuthConfig::new(CLIENT, ADMIN));
    state.service_statuses.set("database", ServiceStatus::Connected);
    state.service_statuses.set("web", ServiceStatus::Starting);

    let response = create_router(state)
        .oneshot(request(Method::GET, "/api/status", None, None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "starting");
    assert_eq!(body["services"]["web"]["status"], "starting");
    assert_eq!(body["services"]["database"]["status"], "connected");
}

#[tokio::test]
async fn upstream_request_id_is_echoed() {
    let mut req = request(Method::GET, "/api/status", None, None);
    req.headers_mut()
        .insert("x-request-id", "lb-1234".parse().unwrap());
    let response = offline_router().oneshot(req).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "lb-1234");
}

#[tokio::test]
async fn invalid_grade_is_a_validation_error() {
    let response = offline_router()
        .oneshot(request(
            Method::POST,
            "/api/courses/1/enrollments/2/complete",
            Some(CLIENT),
            Some(json!({ "grade": "Z" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "validation_failed");
    assert!(body["fields"]["grade"].is_string());
}

#[sqlx::test]
async fn enroll_flow_over_http(pool: PgPool) {
    let app = router_with(pool);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/courses",
            Some(ADMIN),
            Some(json!({
                "code": "hist210",
                "name": "Modern Europe",
                "credits": 4,
                "maxStudents": 1,
                "semester": "Fall-2026",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let course = json_body(response).await;
    assert_eq!(course["code"], "HIST210");
    assert_eq!(course["availableSeats"], 1);
    let course_id = course["id"].as_i64().unwrap();

    let mut student_ids = Vec::new();
    for n in 1..=2 {
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/students",
                Some(CLIENT),
                Some(json!({
                    "studentNumber": format!("H{n}"),
                    "firstName": "Ada",
                    "lastName": format!("Student{n}"),
                    "email": format!("h{n}@example.edu"),
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        student_ids.push(json_body(response).await["id"].as_i64().unwrap());
    }

    let enroll_uri = format!("/api/courses/{course_id}/enrollments");
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &enroll_uri,
            Some(CLIENT),
            Some(json!({ "studentId": student_ids[0] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["outcome"], "enrolled");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &enroll_uri,
            Some(CLIENT),
            Some(json!({ "studentId": student_ids[1] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "course_full");

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            &enroll_uri,
            Some(CLIENT),
            Some(json!({ "studentId": student_ids[1], "waitlistIfFull": true })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let waitlisted = json_body(response).await;
    assert_eq!(waitlisted["outcome"], "waitlisted");
    assert_eq!(waitlisted["entry"]["position"], 1);

    let response = app
        .clone()
        .oneshot(request(
            Method::DELETE,
            &format!("{enroll_uri}/{}", student_ids[0]),
            Some(CLIENT),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let released = json_body(response).await;
    assert_eq!(released["promotion"]["promoted"][0]["studentId"], student_ids[1]);

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/courses/{course_id}/waitlist/{}", student_ids[1]),
            Some(CLIENT),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "not_waitlisted");

    let response = app
        .oneshot(request(Method::GET, "/api/admin/audit-log", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let log = json_body(response).await;
    let kinds: Vec<&str> = log["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"promoted"));
    assert!(kinds.contains(&"waitlisted"));
}

async fn create_via_http(app: &Router, uri: &str, token: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(request(Method::POST, uri, Some(token), Some(body)))
        .await
        .unwrap();
    assert!(response.status().is_success(), "POST {uri}: {}", response.status());
    json_body(response).await
}

#[sqlx::test]
async fn deleting_a_student_over_http_returns_promotions(pool: PgPool) {
    let app = router_with(pool);

    let course = create_via_http(
        &app,
        "/api/courses",
        ADMIN,
        json!({
            "code": "phil101",
            "name": "Logic",
            "credits": 3,
            "maxStudents": 1,
            "semester": "Fall-2026",
        }),
    )
    .await;
    let course_id = course["id"].as_i64().unwrap();

    let mut ids = Vec::new();
    for n in 1..=3 {
        let student = create_via_http(
            &app,
            "/api/students",
            CLIENT,
            json!({
                "studentNumber": format!("P{n}"),
                "firstName": "Kurt",
                "lastName": format!("Student{n}"),
                "email": format!("p{n}@example.edu"),
            }),
        )
        .await;
        ids.push(student["id"].as_i64().unwrap());
    }

    let enroll_uri = format!("/api/courses/{course_id}/enrollments");
    for id in &ids {
        create_via_http(
            &app,
            &enroll_uri,
            CLIENT,
            json!({ "studentId": id, "waitlistIfFull": true }),
        )
        .await;
    }

    let response = app
        .clone()
        .oneshot(request(
            Method::DELETE,
            &format!("/api/students/{}", ids[0]),
            Some(ADMIN),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["deleted"], true);
    let promotions = body["promotions"].as_array().unwrap();
    assert_eq!(promotions.len(), 1);
    assert_eq!(promotions[0]["courseId"], course_id);
    assert_eq!(promotions[0]["promoted"][0]["studentId"], ids[1]);
    assert_eq!(promotions[0]["remainingWaiting"], 1);

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/courses/{course_id}/waitlist/{}", ids[2]),
            Some(CLIENT),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let position = json_body(response).await;
    assert_eq!(position["position"], 1);
    assert_eq!(position["waitingCount"], 1);

    let response = app
        .oneshot(request(
            Method::DELETE,
            &format!("/api/students/{}", ids[0]),
            Some(ADMIN),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test]
async fn waitlist_position_on_missing_course_is_course_not_found(pool: PgPool) {
    let response = router_with(pool)
        .oneshot(request(
            Method::GET,
            "/api/courses/4242/waitlist/1",
            Some(CLIENT),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "course_not_found");
}
