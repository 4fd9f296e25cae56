//! Integration tests for the producer HTTP surface.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use alert_api::config::Config;
use alert_api::db::LocationIndex;
use axum::http::StatusCode;
use axum_test::TestServer;
use geoalert_common::Coordinate;
use serde_json::json;

// =========================================================================
// GET /health
// =========================================================================

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = common::test_app(Config::default());
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body, json!({"status": "ok", "sessions": 0}));
}

// =========================================================================
// POST /api/v1/alerts
// =========================================================================

#[tokio::test]
async fn submit_alert_broadcasts_then_skips_duplicate() {
    let (app, ctx) = common::test_app(Config::default());
    let mut inbox = ctx.state.sessions.register("conn_phone");
    ctx.locations
        .upsert("conn_phone", Coordinate::new(12.34567, 76.54321).unwrap())
        .await
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let submission = json!({
        "alert": {"msg": "pothole", "severity": 1},
        "alert_latitude": 12.34567,
        "alert_longitude": 76.54321,
        "class": "road"
    });

    let resp = server.post("/api/v1/alerts").json(&submission).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "alert_broadcasted");
    assert_eq!(body["recipients"], 1);
    let key = body["key"].as_str().unwrap().to_string();

    let delivered = inbox.try_recv().expect("delivery queued");
    assert_eq!(delivered.alert, json!({"msg": "pothole", "severity": 1}));
    assert_eq!(delivered.class.as_deref(), Some("road"));
    assert_eq!(
        ctx.claims.delivered_to(&key).unwrap(),
        HashSet::from(["conn_phone".to_string()])
    );

    let resp = server.post("/api/v1/alerts").json(&submission).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body, json!({"status": "duplicate_alert_skipped", "key": key}));
    assert!(inbox.try_recv().is_err());
}

#[tokio::test]
async fn submit_alert_with_no_devices_reports_zero_recipients() {
    let (app, _) = common::test_app(Config::default());
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/alerts")
        .json(&json!({
            "alert": {"msg": "flood"},
            "alert_latitude": -33.87,
            "alert_longitude": 151.21,
            "alert_radius_km": 25.0,
            "alert_id": "flood-7"
        }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body, json!({"status": "alert_broadcasted", "recipients": 0, "key": "id:flood-7"}));
}

#[tokio::test]
async fn submit_alert_rejects_malformed_body() {
    let (app, _) = common::test_app(Config::default());
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/alerts")
        .json(&json!({"alert": {"msg": "x"}}))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "INVALID_FORMAT");
    assert_eq!(body["error"]["message"], "invalid message format");
}

#[tokio::test]
async fn submit_alert_rejects_invalid_values() {
    let (app, _) = common::test_app(Config::default());
    let server = TestServer::new(app).unwrap();

    for submission in [
        json!({"alert": {"msg": "x"}, "alert_latitude": 95.0, "alert_longitude": 0.0}),
        json!({"alert": {"msg": "x"}, "alert_latitude": 0.0, "alert_longitude": 0.0, "alert_radius_km": 0}),
        json!({"alert": null, "alert_latitude": 0.0, "alert_longitude": 0.0}),
    ] {
        let resp = server.post("/api/v1/alerts").json(&submission).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn expired_claim_allows_rebroadcast() {
    let config = Config {
        dedup_ttl: Duration::from_millis(100),
        ..Config::default()
    };
    let (app, _) = common::test_app(config);
    let server = TestServer::new(app).unwrap();
    let submission = json!({
        "alert": {"msg": "fog"},
        "alert_latitude": 51.5,
        "alert_longitude": -0.12,
        "alert_id": "fog-1"
    });

    let first: serde_json::Value = server.post("/api/v1/alerts").json(&submission).await.json();
    assert_eq!(first["status"], "alert_broadcasted");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second: serde_json::Value = server.post("/api/v1/alerts").json(&submission).await.json();
    assert_eq!(second["status"], "alert_broadcasted");
}
