use aerobook_api::{app, middleware::auth::AdminClaims, AppState, AuthConfig};
use aerobook_core::BookingPolicy;
use aerobook_store::MemoryLedgerStore;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

async fn test_app() -> Router {
    let store = Arc::new(MemoryLedgerStore::new(Duration::from_secs(2)));
    let state = AppState::new(
        store,
        BookingPolicy::default(),
        AuthConfig {
            secret: SECRET.to_string(),
        },
    );
    state.inventory.seed_sample_flights(Utc::now()).await.unwrap();
    app(state)
}

fn token(role: &str) -> String {
    let claims = AdminClaims {
        sub: "ops@aerobook.test".to_string(),
        role: role.to_string(),
        exp: (Utc::now() + ChronoDuration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin_get(uri: &str, role: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(role)))
        .body(Body::empty())
        .unwrap()
}

async fn flight_id(app: &Router, code: &str) -> i64 {
    let (_, flights) = send(app, get("/api/flights")).await;
    flights
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["code"] == code)
        .and_then(|f| f["id"].as_i64())
        .unwrap()
}

async fn small_flight(app: &Router, code: &str, capacity: i32) -> i64 {
    let depart = Utc::now() + ChronoDuration::days(3);
    let request = Request::builder()
        .method("POST")
        .uri("/api/admin/flights")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("ADMIN")))
        .body(Body::from(
            json!({
                "code": code,
                "origin": "Dhaka",
                "destination": "Cox's Bazar",
                "depart": depart,
                "arrive": depart + ChronoDuration::hours(1),
                "capacity": capacity,
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_and_flight_listing() {
    let app = test_app().await;

    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, flights) = send(&app, get("/api/flights")).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = flights
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, ["AA101", "BB202"]);
}

#[tokio::test]
async fn test_book_and_fetch() {
    let app = test_app().await;
    let flight = flight_id(&app, "AA101").await;

    let (status, body) = send(
        &app,
        post(
            "/api/book",
            json!({"flight_id": flight, "name": "Asha", "email": "asha@example.com", "seat_no": "3"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["seat_no"], 3);

    let booking_id = body["booking_id"].as_i64().unwrap();
    let (status, details) = send(&app, admin_get(&format!("/api/admin/bookings/{}", booking_id), "ADMIN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["booking"]["status"], "CONFIRMED");
    assert_eq!(details["passenger"]["email"], "asha@example.com");
    assert_eq!(details["payment"]["status"], "PAID");
    assert_eq!(details["payment"]["amount"], 100.0);
}

#[tokio::test]
async fn test_book_validation_and_not_found() {
    let app = test_app().await;

    let (status, body) = send(&app, post("/api/book", json!({"flight_id": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = send(&app, post("/api/book", json!({"flight_id": 999, "name": "Asha"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, body) = send(&app, post("/api/book", json!({"flight_id": 1.5, "name": "Asha"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert!(body["detail"].as_str().unwrap().contains("whole number"));

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/book")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_booking_of_last_seat() {
    let app = test_app().await;
    let flight = small_flight(&app, "CX001", 1).await;

    let (first, second) = tokio::join!(
        send(&app, post("/api/book", json!({"flight_id": flight, "name": "Asha"}))),
        send(&app, post("/api/book", json!({"flight_id": flight, "name": "Bilal"}))),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);

    let rejected = if first.0 == StatusCode::CONFLICT { first.1 } else { second.1 };
    assert_eq!(rejected["error"], "CAPACITY_EXCEEDED");
}

#[tokio::test]
async fn test_cancel_flow() {
    let app = test_app().await;
    let flight = flight_id(&app, "BB202").await;
    let (_, booked) = send(&app, post("/api/book", json!({"flight_id": flight, "name": "Asha"}))).await;
    let booking_id = booked["booking_id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        post("/api/cancel", json!({"booking_id": booking_id, "reason": "Illness"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["refund"], 50.0);

    let (_, details) = send(&app, admin_get(&format!("/api/admin/bookings/{}", booking_id), "ADMIN")).await;
    assert_eq!(details["booking"]["status"], "CANCELLED");
    assert_eq!(details["payment"]["status"], "REFUNDED");
    assert_eq!(details["cancellation"]["reason"], "Illness");

    let (status, body) = send(&app, post("/api/cancel", json!({"booking_id": booking_id}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ALREADY_CANCELLED");
}

#[tokio::test]
async fn test_cancel_errors() {
    let app = test_app().await;

    let (status, body) = send(&app, post("/api/cancel", json!({"reason": "n/a"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = send(&app, post("/api/cancel", json!({"booking_id": "12345"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, _) = send(&app, admin_get("/api/admin/bookings/12345", "ADMIN")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let app = test_app().await;

    let (status, body) = send(&app, get("/api/admin/dashboard")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AUTHENTICATION_ERROR");

    let (status, _) = send(&app, admin_get("/api/admin/dashboard", "CUSTOMER")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let forged = Request::builder()
        .uri("/api/admin/report")
        .header(header::AUTHORIZATION, "Bearer not.a.jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_reports() {
    let app = test_app().await;
    let flight = flight_id(&app, "AA101").await;

    for name in ["Asha", "Bilal"] {
        let (status, _) = send(&app, post("/api/book", json!({"flight_id": flight, "name": name}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, totals) = send(&app, admin_get("/api/admin/dashboard", "ADMIN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(totals["total_bookings"], 2);
    assert_eq!(totals["total_revenue"], 200.0);

    let (status, report) = send(&app, admin_get("/api/admin/report", "ADMIN")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = report.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["flight"]["code"], "AA101");
    assert_eq!(rows[0]["confirmed_bookings"], 2);
    assert_eq!(rows[1]["confirmed_bookings"], 0);
    assert_eq!(rows[1]["revenue"], 0.0);
}

#[tokio::test]
async fn test_admin_flight_validation() {
    let app = test_app().await;
    small_flight(&app, "CX002", 2).await;

    let depart = Utc::now();
    let request = |code: &str, capacity: i32| {
        Request::builder()
            .method("POST")
            .uri("/api/admin/flights")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token("ADMIN")))
            .body(Body::from(
                json!({
                    "code": code,
                    "origin": "Dhaka",
                    "destination": "Sylhet",
                    "depart": depart,
                    "arrive": depart + ChronoDuration::hours(1),
                    "capacity": capacity,
                })
                .to_string(),
            ))
            .unwrap()
    };

    let (status, _) = send(&app, request("CX002", 4)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, request("CX003", 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = send(&app, request(&"X".repeat(30), 4)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (_, flights) = send(&app, get("/api/flights")).await;
    assert_eq!(flights.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_oversized_payment_method_rejected() {
    let app = test_app().await;
    let flight = flight_id(&app, "AA101").await;

    let (status, body) = send(
        &app,
        post(
            "/api/book",
            json!({"flight_id": flight, "name": "Asha", "payment_method": "M".repeat(60)}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (_, totals) = send(&app, admin_get("/api/admin/dashboard", "ADMIN")).await;
    assert_eq!(totals["total_bookings"], 0);
}

#[tokio::test]
async fn test_booking_details_require_admin() {
    let app = test_app().await;
    let flight = flight_id(&app, "AA101").await;
    let (_, booked) = send(
        &app,
        post("/api/book", json!({"flight_id": flight, "name": "Asha", "passport": "P1234567"})),
    )
    .await;
    let booking_id = booked["booking_id"].as_i64().unwrap();

    let (status, body) = send(&app, get(&format!("/api/admin/bookings/{}", booking_id))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!body.to_string().contains("P1234567"));

    let (status, _) = send(
        &app,
        admin_get(&format!("/api/admin/bookings/{}", booking_id), "CUSTOMER"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No public route serves booking records.
    let (status, body) = send(&app, get(&format!("/api/bookings/{}", booking_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!body.to_string().contains("P1234567"));
}
