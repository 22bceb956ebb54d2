use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    Json, Router,
};
use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use identifier_cell::handlers::*;
use identifier_cell::*;
use shared_models::error::AppError;
use shared_utils::test_utils::TestConfig;

struct TestApp {
    router: Router,
    state: Arc<IdentifierCellState>,
    entities: Arc<MemoryEntityStore>,
    config: TestConfig,
}

impl TestApp {
    fn new() -> Self {
        let config = TestConfig::default();
        let entities = Arc::new(MemoryEntityStore::new());
        let state = Arc::new(IdentifierCellState::new(
            config.to_arc(),
            Arc::new(MemoryCounterStore::default()),
            entities.clone(),
        ));

        Self {
            router: identifier_routes(state.clone()),
            state,
            entities,
            config,
        }
    }

    async fn post(&self, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn post_admin(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.config.admin_api_token.clone();
        self.post(uri, body, Some(&token)).await
    }
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.post("/identifiers/clinic", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_wrong_token_is_rejected() {
    let app = TestApp::new();

    let (status, _) = app
        .post("/identifiers/clinic", None, Some("not-the-admin-token"))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rejected_request_allocates_nothing() {
    let app = TestApp::new();

    app.post("/identifiers/clinic", None, None).await;
    let (_, body) = app.post_admin("/identifiers/clinic", None).await;

    assert_eq!(body["identifier"], "CL-00001");
}

#[tokio::test]
async fn test_issue_identifier_per_kind() {
    let app = TestApp::new();

    let (status, body) = app.post_admin("/identifiers/clinic", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "kind": "clinic", "identifier": "CL-00001" }));

    let (_, body) = app.post_admin("/identifiers/clinic", None).await;
    assert_eq!(body["identifier"], "CL-00002");

    let (_, body) = app.post_admin("/identifiers/patient", None).await;
    assert_eq!(body["identifier"], "PAT-000001");

    let (_, body) = app.post_admin("/identifiers/employee", None).await;
    assert_eq!(body["identifier"], "EMP-0001");
}

#[tokio::test]
async fn test_unknown_kind_is_bad_request() {
    let app = TestApp::new();

    let (status, body) = app.post_admin("/identifiers/nurse", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nurse"));
}

#[tokio::test]
async fn test_ticket_number_for_explicit_month() {
    let app = TestApp::new();

    let (status, body) = app
        .post_admin("/tickets/number", Some(json!({ "year": 2026, "month": 1 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number"], "DP-SUP-202601-000001");

    let (_, body) = app
        .post_admin("/tickets/number", Some(json!({ "year": 2026, "month": 2 })))
        .await;
    assert_eq!(body["number"], "DP-SUP-202602-000001");

    let (_, body) = app
        .post_admin("/tickets/number", Some(json!({ "year": 2026, "month": 1 })))
        .await;
    assert_eq!(body["number"], "DP-SUP-202601-000002");
}

#[tokio::test]
async fn test_ticket_number_defaults_to_current_month() {
    let app = TestApp::new();
    let before = Utc::now();

    let (status, body) = app.post_admin("/tickets/number", Some(json!({}))).await;
    let after = Utc::now();

    assert_eq!(status, StatusCode::OK);
    let number = body["number"].as_str().unwrap();
    let expected: Vec<String> = [before, after]
        .iter()
        .map(|t| format!("DP-SUP-{:04}{:02}-000001", t.year(), t.month()))
        .collect();
    assert!(expected.iter().any(|e| e == number), "unexpected {}", number);
}

#[tokio::test]
async fn test_ticket_number_without_body_uses_current_month() {
    let app = TestApp::new();
    let before = Utc::now();

    let (status, body) = app.post_admin("/tickets/number", None).await;
    let after = Utc::now();

    assert_eq!(status, StatusCode::OK);
    let number = body["number"].as_str().unwrap();
    assert!(
        [before, after]
            .iter()
            .any(|t| number == format!("DP-SUP-{:04}{:02}-000001", t.year(), t.month())),
        "unexpected {}",
        number
    );
}

#[tokio::test]
async fn test_ticket_number_rejects_bad_period() {
    let app = TestApp::new();

    let (status, _) = app
        .post_admin("/tickets/number", Some(json!({ "year": 2026, "month": 13 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_admin("/tickets/number", Some(json!({ "year": 2026 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Neither attempt consumed a number.
    let (_, body) = app
        .post_admin("/tickets/number", Some(json!({ "year": 2026, "month": 12 })))
        .await;
    assert_eq!(body["number"], "DP-SUP-202612-000001");
}

#[tokio::test]
async fn test_backfill_route_reports_assigned_rows() {
    let app = TestApp::new();
    app.entities.seed_unassigned(IdentifierKind::Doctor, 3).await;

    let (status, body) = app.post_admin("/backfill/doctor", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "kind": "doctor", "assigned": 3 }));

    let (_, body) = app.post_admin("/backfill/doctor", None).await;
    assert_eq!(body["assigned"], 0);

    let (_, body) = app.post_admin("/identifiers/doctor", None).await;
    assert_eq!(body["identifier"], "DOC-0004");
}

#[tokio::test]
async fn test_handlers_can_be_called_directly() {
    let app = TestApp::new();

    let Json(response) = issue_identifier(State(app.state.clone()), Path("doctor".to_string()))
        .await
        .unwrap();
    assert_eq!(response.kind, IdentifierKind::Doctor);
    assert_eq!(response.identifier, "DOC-0001");

    let result = run_backfill(State(app.state.clone()), Path("tickets".to_string())).await;
    assert_matches!(result, Err(AppError::BadRequest(_)));

    let result = issue_ticket_number(
        State(app.state.clone()),
        Some(Json(TicketNumberRequest {
            year: None,
            month: Some(4),
        })),
    )
    .await;
    assert_matches!(result, Err(AppError::BadRequest(_)));
}
