//! Decision API driven in-process through the axum router.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::response::IntoResponse;
use axum::Router;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use fourth_and_short::decision::{DecisionEngine, DecisionPolicy, DECISION_MODEL};
use fourth_and_short::models::ArtifactStore;
use fourth_and_short::servers::{ApiError, ApiFailure, DecisionApiConfig, DecisionApiServer};
use fourth_and_short::storage::Ledger;
use fourth_and_short::{DecisionServiceError, ModelRegistry, PlayCall};

fn engine_with(registry: &Arc<ModelRegistry>) -> DecisionEngine {
    DecisionEngine::new(Arc::clone(registry), DecisionPolicy::default())
}

fn warmed_registry() -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::default());
    registry
        .activate(DECISION_MODEL, common::fixed_classifier(DECISION_MODEL, "v1", PlayCall::Go, 1.5))
        .unwrap();
    registry
}

fn app(registry: &Arc<ModelRegistry>) -> Router {
    DecisionApiServer::new(DecisionApiConfig::default(), engine_with(registry)).router()
}

fn situation() -> Value {
    json!({
        "down": 4,
        "distance": 1,
        "field_position": 35,
        "score_diff": -3,
        "time_remaining": 120
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

#[tokio::test]
async fn test_recommend_returns_traced_decision() {
    let app = app(&warmed_registry());
    let (status, headers, body) = send(&app, post_json("/v1/recommend", &situation())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recommendation"], "GO");
    assert_eq!(body["model_version"], "v1");
    assert_eq!(body["low_confidence"], false);
    assert_eq!(body["probabilities"].as_array().unwrap().len(), 3);
    assert!(body["latency_ms"].as_f64().unwrap() >= 0.0);

    let trace_id = body["trace_id"].as_str().unwrap();
    assert_eq!(headers["x-trace-id"], trace_id);
    assert_eq!(headers["x-model-version"], "v1");
}

#[tokio::test]
async fn test_recommend_from_query_parameters() {
    let app = app(&warmed_registry());
    let (status, _, body) = send(
        &app,
        get("/v1/recommend?down=4&distance=2&field_position=40&time_remaining=600&home=true"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recommendation"], "GO");
}

#[tokio::test]
async fn test_out_of_range_field_is_named() {
    let app = app(&warmed_registry());
    let mut payload = situation();
    payload["down"] = json!(7);
    let (status, _, body) = send(&app, post_json("/v1/recommend", &payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["field"], "down");
    assert!(body["trace_id"].is_string());
}

#[tokio::test]
async fn test_missing_field_is_named() {
    let app = app(&warmed_registry());
    let (status, _, body) = send(
        &app,
        post_json("/v1/recommend", &json!({ "down": 4, "field_position": 35, "time_remaining": 60 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "distance");
}

#[tokio::test]
async fn test_no_model_is_not_ready() {
    let app = app(&Arc::new(ModelRegistry::default()));
    let (status, _, body) = send(&app, post_json("/v1/recommend", &situation())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["error"], "model_not_ready");
}

#[tokio::test]
async fn test_unknown_pinned_version_is_unavailable() {
    let app = app(&warmed_registry());
    let mut request = post_json("/v1/recommend", &situation());
    request
        .headers_mut()
        .insert("x-model-version", http::HeaderValue::from_static("v9"));
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["model"], "fourth_down@v9");
}

#[tokio::test]
async fn test_internal_defect_hides_artifact_identity() {
    let registry = Arc::new(ModelRegistry::default());
    let misfiled = common::fixed_regressor("expected_points", "20240101T000000Z-deadbeef", 1.0)
        .renamed(DECISION_MODEL);
    registry.activate(DECISION_MODEL, misfiled).unwrap();

    let (status, _, body) = send(&app(&registry), post_json("/v1/recommend", &situation())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");
    assert!(!body.to_string().contains("deadbeef"));
}

#[tokio::test]
async fn test_schema_mismatch_response_hides_versions() {
    let response = ApiError {
        trace_id: "trace".to_string(),
        failure: ApiFailure::Service(DecisionServiceError::SchemaMismatch {
            expected: 1,
            found: 2,
            artifact: "fourth_down@20240101T000000Z-deadbeef".to_string(),
        }),
    }
    .into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!text.contains("deadbeef"));
    assert!(!text.contains("20240101"));
    assert!(text.contains("\"trace_id\":\"trace\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_thousand_concurrent_callers() {
    let registry = warmed_registry();
    let app = app(&registry);

    let mut callers = tokio::task::JoinSet::new();
    for i in 0..1000 {
        let app = app.clone();
        callers.spawn(async move {
            let payload = json!({
                "down": 4,
                "distance": 1 + i % 10,
                "field_position": 20 + i % 70,
                "time_remaining": i % 1800,
            });
            let response = app.oneshot(post_json("/v1/recommend", &payload)).await.unwrap();
            (
                response.status(),
                response.headers().get("x-model-version").cloned(),
            )
        });
    }

    while let Some(joined) = callers.join_next().await {
        let (status, version) = joined.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(version.unwrap(), "v1");
    }
    assert_eq!(registry.get_active(DECISION_MODEL).unwrap().version(), "v1");

    let (_, _, metrics) = send(&app, get("/metrics")).await;
    assert_eq!(metrics["requests"], 1000);
    assert_eq!(metrics["successes"], 1000);
}

// ============================================================================
// BULK
// ============================================================================

#[tokio::test]
async fn test_bulk_answers_each_item() {
    let app = app(&warmed_registry());
    let mut bad = situation();
    bad["distance"] = json!(50);
    let (status, _, body) = send(
        &app,
        post_json("/v1/bulk", &json!({ "items": [situation(), bad, situation()] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["index"], 0);
    assert_eq!(results[0]["decision"]["recommendation"], "GO");
    assert_eq!(results[1]["error"]["field"], "distance");
    assert!(results[1].get("decision").is_none());
    assert_eq!(results[2]["index"], 2);
}

#[tokio::test]
async fn test_bulk_limit() {
    let registry = warmed_registry();
    let config = DecisionApiConfig {
        max_bulk_items: 2,
        ..DecisionApiConfig::default()
    };
    let app = DecisionApiServer::new(config, engine_with(&registry)).router();
    let items = vec![situation(); 3];
    let (status, _, body) = send(&app, post_json("/v1/bulk", &json!({ "items": items }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

// ============================================================================
// RESPONSE CACHE & PER-OPTION VALUES
// ============================================================================

#[tokio::test]
async fn test_repeated_situation_is_served_from_cache() {
    let registry = warmed_registry();
    let app = app(&registry);

    let (_, _, first) = send(&app, post_json("/v1/recommend", &situation())).await;
    let (status, _, second) = send(&app, post_json("/v1/recommend", &situation())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["probabilities"], first["probabilities"]);
    assert_eq!(second["model_version"], "v1");
    assert_ne!(second["trace_id"], first["trace_id"]);

    let (_, _, metrics) = send(&app, get("/metrics")).await;
    assert_eq!(metrics["cache_hits"], 1);
    assert_eq!(metrics["cache_misses"], 1);

    registry
        .activate(DECISION_MODEL, common::fixed_classifier(DECISION_MODEL, "v2", PlayCall::Punt, 1.5))
        .unwrap();
    let (_, _, third) = send(&app, post_json("/v1/recommend", &situation())).await;
    assert_eq!(third["model_version"], "v2");
    assert_eq!(third["recommendation"], "PUNT");
    let (_, _, metrics) = send(&app, get("/metrics")).await;
    assert_eq!(metrics["cache_hits"], 1);
    assert_eq!(metrics["cache_misses"], 2);
}

#[tokio::test]
async fn test_zero_capacity_disables_cache() {
    let registry = warmed_registry();
    let config = DecisionApiConfig {
        cache_capacity: 0,
        ..DecisionApiConfig::default()
    };
    let app = DecisionApiServer::new(config, engine_with(&registry)).router();
    for _ in 0..3 {
        let (status, _, _) = send(&app, post_json("/v1/recommend", &situation())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, _, metrics) = send(&app, get("/metrics")).await;
    assert_eq!(metrics["cache_hits"], 0);
    assert_eq!(metrics["cache_misses"], 0);
    assert_eq!(metrics["successes"], 3);
}

#[tokio::test]
async fn test_bulk_reuses_cached_decisions() {
    let app = app(&warmed_registry());
    send(&app, post_json("/v1/recommend", &situation())).await;
    let items = vec![situation(); 2];
    let (status, _, body) = send(&app, post_json("/v1/bulk", &json!({ "items": items }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][1]["decision"]["recommendation"], "GO");

    let (_, _, metrics) = send(&app, get("/metrics")).await;
    assert_eq!(metrics["cache_hits"], 2);
    assert_eq!(metrics["cache_misses"], 1);
}

#[tokio::test]
async fn test_expected_points_of_each_option() {
    let registry = warmed_registry();
    registry
        .activate("expected_points", common::fixed_regressor("expected_points", "v1", 2.5))
        .unwrap();
    let app = app(&registry);

    let (status, _, body) = send(&app, post_json("/v1/recommend", &situation())).await;
    assert_eq!(status, StatusCode::OK);
    let alternatives = body["alternatives"].as_array().unwrap();
    assert_eq!(alternatives.len(), 3);
    for option in alternatives {
        assert!(option["expected_points"].as_f64().unwrap().is_finite());
        assert!(option["delta_ep"].is_number());
        assert!(option["uncertainty"].as_f64().unwrap() >= 0.0);
    }
    let leaders = alternatives
        .iter()
        .filter(|o| o["delta_ep"].as_f64().unwrap() > 0.0)
        .count();
    assert_eq!(leaders, 1);
}

#[tokio::test]
async fn test_no_regressor_means_no_alternatives() {
    let app = app(&warmed_registry());
    let (_, _, body) = send(&app, post_json("/v1/recommend", &situation())).await;
    assert_eq!(body["alternatives"], json!([]));
}

// ============================================================================
// HEALTH, METRICS & ADMINISTRATION
// ============================================================================

#[tokio::test]
async fn test_health_and_readiness() {
    let registry = Arc::new(ModelRegistry::default());
    let app = app(&registry);

    let (status, _, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, body) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");

    registry
        .activate(DECISION_MODEL, common::fixed_classifier(DECISION_MODEL, "v1", PlayCall::Punt, 1.0))
        .unwrap();
    let (status, _, body) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v1");

    let (status, _, _) = send(&app, get("/readyz?model=expected_points")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_count_errors_by_kind() {
    let app = app(&Arc::new(ModelRegistry::default()));
    send(&app, post_json("/v1/recommend", &situation())).await;
    let mut bad = situation();
    bad["quarter"] = json!(9);
    send(&app, post_json("/v1/recommend", &bad)).await;

    let (status, _, body) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"], 2);
    assert_eq!(body["successes"], 0);
    assert_eq!(body["errors"]["model_unavailable"], 1);
    assert_eq!(body["errors"]["validation_error"], 1);
    let histogram: u64 = body["latency_histogram"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["count"].as_u64().unwrap())
        .sum();
    assert_eq!(histogram, 2);
}

#[tokio::test]
async fn test_rollback_over_http() {
    let registry = warmed_registry();
    let app = app(&registry);

    let (status, _, body) = send(&app, post_empty("/v1/models/fourth_down/rollback")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no_prior_version");

    registry
        .activate(DECISION_MODEL, common::fixed_classifier(DECISION_MODEL, "v2", PlayCall::Punt, 1.5))
        .unwrap();
    let (_, _, body) = send(&app, get("/v1/models/fourth_down")).await;
    assert_eq!(body["active_version"], "v2");
    assert_eq!(body["history"], json!(["v1"]));

    let (status, _, body) = send(&app, post_empty("/v1/models/fourth_down/rollback")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_version"], "v1");

    let (status, _, _) = send(&app, get("/v1/models/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reload_picks_up_stored_artifacts() {
    let registry = Arc::new(ModelRegistry::default());
    let without_store = app(&registry);
    let (status, _, _) = send(&without_store, post_empty("/v1/models/reload")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    store
        .save(&common::fixed_classifier(DECISION_MODEL, "20240101T000000Z-aaaaaaaa", PlayCall::Go, 1.0))
        .unwrap();
    let app = DecisionApiServer::new(DecisionApiConfig::default(), engine_with(&registry))
        .with_store(store)
        .router();

    let (status, _, body) = send(&app, post_empty("/v1/models/reload")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activated"][0]["model"], "fourth_down");
    assert!(registry.is_ready(DECISION_MODEL));

    let (_, _, body) = send(&app, post_empty("/v1/models/reload")).await;
    assert_eq!(body["activated"], json!([]));
}

#[tokio::test]
async fn test_requests_reach_the_ledger() {
    let registry = warmed_registry();
    let ledger = Ledger::in_memory().unwrap();
    let app = DecisionApiServer::new(DecisionApiConfig::default(), engine_with(&registry))
        .with_ledger(ledger.clone())
        .router();

    for _ in 0..5 {
        send(&app, post_json("/v1/recommend", &situation())).await;
    }

    let mut count = 0;
    for _ in 0..50 {
        count = ledger.request_count().unwrap();
        if count == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(count, 5);
    let recent = ledger.recent_requests(1).unwrap();
    assert_eq!(recent[0].outcome, "ok");
}
