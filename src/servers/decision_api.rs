use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;
use uuid::Uuid;

use crate::decision::{DecisionEngine, DecisionResult, ModelSnapshot};
use crate::game::{GameState, GameStatePayload};
use crate::models::ArtifactStore;
use crate::servers::api_error::{ApiError, ApiFailure, ErrorBody};
use crate::servers::latency::ServiceMetrics;
use crate::servers::response_cache::ResponseCache;
use crate::storage::{Ledger, RequestRecord};
use crate::{DecisionServiceError, Result as ServiceResult};

/// Header pinning a request to one model version
pub const MODEL_VERSION_HEADER: &str = "x-model-version";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

// Configuration du serveur de décision
#[derive(Debug, Clone)]
pub struct DecisionApiConfig {
    pub host: String,
    pub port: u16,
    /// Per-request scoring budget; overruns answer 504
    pub latency_budget: Duration,
    pub max_bulk_items: usize,
    /// Capacity of the request-ledger channel
    pub ledger_buffer: usize,
    /// Requests written to the ledger per transaction
    pub ledger_batch: usize,
    /// Recommendations kept in the response cache; 0 disables it
    pub cache_capacity: usize,
}

impl Default for DecisionApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            latency_budget: Duration::from_millis(250),
            max_bulk_items: 1000,
            ledger_buffer: 4096,
            ledger_batch: 256,
            cache_capacity: 10_000,
        }
    }
}

impl DecisionApiConfig {
    pub fn validate(&self) -> ServiceResult<()> {
        let invalid = |msg: String| Err(DecisionServiceError::InvalidConfig(msg));
        if self.host.trim().is_empty() {
            return invalid("host must not be empty".to_string());
        }
        if self.latency_budget.is_zero() {
            return invalid("latency_budget must be positive".to_string());
        }
        if self.max_bulk_items == 0 {
            return invalid("max_bulk_items must be at least 1".to_string());
        }
        if self.ledger_buffer == 0 || self.ledger_batch == 0 {
            return invalid(format!(
                "ledger_buffer and ledger_batch must be at least 1, got {} and {}",
                self.ledger_buffer, self.ledger_batch
            ));
        }
        Ok(())
    }
}

/// Shared state of the decision API
pub struct ApiState {
    engine: DecisionEngine,
    config: DecisionApiConfig,
    metrics: ServiceMetrics,
    cache: ResponseCache,
    store: Option<ArtifactStore>,
    ledger: Option<Ledger>,
    ledger_tx: Option<mpsc::Sender<RequestRecord>>,
}

impl ApiState {
    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Hand a request record to the ledger writer without waiting.
    fn forward(&self, record: RequestRecord) {
        if let Some(tx) = &self.ledger_tx {
            if let Err(e) = tx.try_send(record) {
                log::warn!("⚠️ Ledger queue full, dropping request record: {}", e);
            }
        }
    }

    fn finish<T: Serialize>(
        &self,
        trace_id: String,
        started: Instant,
        params_json: String,
        outcome: Result<(T, Option<String>), ApiFailure>,
    ) -> Response {
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        let label = match &outcome {
            Ok(_) => "ok",
            Err(failure) => failure.kind(),
        };
        match &outcome {
            Ok(_) => self.metrics.record_success(elapsed),
            Err(failure) => self.metrics.record_error(failure.kind(), elapsed),
        }
        self.forward(RequestRecord {
            trace_id: trace_id.clone(),
            params_json,
            latency_ms,
            outcome: label.to_string(),
            ts: chrono::Utc::now().to_rfc3339(),
        });

        match outcome {
            Ok((body, model_version)) => {
                let mut response = Json(Traced {
                    trace_id: trace_id.clone(),
                    latency_ms,
                    body,
                })
                .into_response();
                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&trace_id) {
                    headers.insert(TRACE_ID_HEADER, value);
                }
                if let Some(value) = model_version.and_then(|v| HeaderValue::from_str(&v).ok()) {
                    headers.insert(MODEL_VERSION_HEADER, value);
                }
                response
            }
            Err(failure) => ApiError { trace_id, failure }.into_response(),
        }
    }

    /// Cached answer for `state` under `snapshot`, with its freshness brought up to date.
    fn cached(&self, snapshot: &ModelSnapshot, state: &GameState) -> (Option<String>, Option<DecisionResult>) {
        let freshness = self.engine.freshness(snapshot.classifier());
        let Some(key) = self.cache.key(snapshot, state, freshness.stale) else {
            return (None, None);
        };
        let hit = self.cache.get(&key).map(|mut result| {
            result.freshness = freshness;
            result
        });
        self.metrics.record_cache(hit.is_some());
        (Some(key), hit)
    }

    /// Score one payload on the blocking pool under the latency budget.
    async fn recommend(
        &self,
        payload: GameStatePayload,
        pinned: Option<String>,
    ) -> Result<DecisionResult, ApiFailure> {
        let state = GameState::try_from(payload)?;
        let snapshot = self.engine.snapshot(pinned.as_deref())?;
        let (key, hit) = self.cached(&snapshot, &state);
        if let Some(result) = hit {
            return Ok(result);
        }

        let engine = self.engine.clone();
        let task = tokio::task::spawn_blocking(move || engine.decide_with(&state, &snapshot));
        let result = match tokio::time::timeout(self.config.latency_budget, task).await {
            Ok(Ok(result)) => result.map_err(ApiFailure::from)?,
            Ok(Err(join)) => return Err(ApiFailure::Internal(format!("scoring task failed: {}", join))),
            Err(_) => return Err(ApiFailure::Timeout(self.config.latency_budget)),
        };
        if let Some(key) = key {
            self.cache.put(key, result.clone());
        }
        Ok(result)
    }
}

/// Canonical JSON of the request parameters for the ledger.
fn ledger_params<T: Serialize>(trace_id: &str, params: &T) -> String {
    match serde_json::to_string(params) {
        Ok(json) => json,
        Err(e) => {
            log::warn!("⚠️ [{}] request parameters not recorded: {}", trace_id, e);
            "null".to_string()
        }
    }
}

#[derive(Serialize)]
struct Traced<T> {
    trace_id: String,
    latency_ms: f64,
    #[serde(flatten)]
    body: T,
}

// Serveur de décision principal
pub struct DecisionApiServer {
    config: DecisionApiConfig,
    engine: DecisionEngine,
    store: Option<ArtifactStore>,
    ledger: Option<Ledger>,
}

impl DecisionApiServer {
    pub fn new(config: DecisionApiConfig, engine: DecisionEngine) -> Self {
        Self {
            config,
            engine,
            store: None,
            ledger: None,
        }
    }

    /// Artifact directory used by `POST /v1/models/reload`
    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Ledger receiving request records and model status changes
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        self.config.validate()?;
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let port = self.config.port;
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        log::info!("🌐 Decision API listening on http://localhost:{}", port);

        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Build the router; spawns the ledger writer when a ledger is attached,
    /// so it must run inside a tokio runtime in that case.
    pub fn router(self) -> Router {
        let ledger_tx = self.ledger.as_ref().map(|ledger| {
            let (tx, rx) = mpsc::channel(self.config.ledger_buffer.max(1));
            tokio::spawn(ledger_writer(ledger.clone(), rx, self.config.ledger_batch.max(1)));
            tx
        });
        let cache = ResponseCache::new(self.config.cache_capacity);
        let state = Arc::new(ApiState {
            engine: self.engine,
            config: self.config,
            metrics: ServiceMetrics::new(),
            cache,
            store: self.store,
            ledger: self.ledger,
            ledger_tx,
        });
        create_router(state)
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/recommend", get(recommend_get).post(recommend_post))
        .route("/v1/bulk", post(bulk))
        .route("/v1/models/reload", post(reload_models))
        .route("/v1/models/{name}", get(model_status))
        .route("/v1/models/{name}/rollback", post(rollback_model))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Drain request records into the ledger in batches, off the request path.
async fn ledger_writer(ledger: Ledger, mut rx: mpsc::Receiver<RequestRecord>, batch_size: usize) {
    let mut batch = Vec::with_capacity(batch_size);
    while rx.recv_many(&mut batch, batch_size).await > 0 {
        let records = std::mem::take(&mut batch);
        let ledger = ledger.clone();
        match tokio::task::spawn_blocking(move || ledger.record_requests(&records)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("❌ Ledger write failed: {}", e),
            Err(e) => log::error!("❌ Ledger writer task failed: {}", e),
        }
    }
    log::debug!("Ledger writer stopped");
}

fn pinned_version(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MODEL_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// HANDLERS - RECOMMENDATIONS
// ============================================================================

async fn recommend_post(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<GameStatePayload>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let trace_id = new_trace_id();
    let (params_json, outcome) = match payload {
        Ok(Json(payload)) => (
            ledger_params(&trace_id, &payload),
            state.recommend(payload, pinned_version(&headers)).await,
        ),
        Err(rejection) => ("null".to_string(), Err(ApiFailure::malformed(rejection.body_text()))),
    };
    let outcome = outcome.map(|d| {
        let version = d.model_version.clone();
        (d, Some(version))
    });
    state.finish(trace_id, started, params_json, outcome)
}

async fn recommend_get(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    query: Result<Query<GameStatePayload>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let trace_id = new_trace_id();
    let (params_json, outcome) = match query {
        Ok(Query(payload)) => (
            ledger_params(&trace_id, &payload),
            state.recommend(payload, pinned_version(&headers)).await,
        ),
        Err(rejection) => ("null".to_string(), Err(ApiFailure::malformed(rejection.body_text()))),
    };
    let outcome = outcome.map(|d| {
        let version = d.model_version.clone();
        (d, Some(version))
    });
    state.finish(trace_id, started, params_json, outcome)
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    items: Vec<GameStatePayload>,
}

#[derive(Debug, Serialize)]
struct BulkItem {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<DecisionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct BulkResponse {
    results: Vec<BulkItem>,
}

async fn bulk(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<BulkRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let trace_id = new_trace_id();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let failure = ApiFailure::malformed(rejection.body_text());
            return state.finish::<BulkResponse>(trace_id, started, "null".into(), Err(failure));
        }
    };
    let params_json = format!("{{\"items\":{}}}", request.items.len());
    let outcome = run_bulk(&state, &trace_id, request).await;
    state.finish(trace_id, started, params_json, outcome.map(|r| (r, None)))
}

async fn run_bulk(
    state: &Arc<ApiState>,
    trace_id: &str,
    request: BulkRequest,
) -> Result<BulkResponse, ApiFailure> {
    let max = state.config.max_bulk_items;
    if request.items.len() > max {
        return Err(ApiFailure::BadRequest(format!(
            "{} items exceed the bulk limit of {}",
            request.items.len(),
            max
        )));
    }

    let mut results: Vec<BulkItem> = Vec::with_capacity(request.items.len());
    let mut valid: Vec<(usize, GameState)> = Vec::new();
    for (index, payload) in request.items.into_iter().enumerate() {
        match GameState::try_from(payload) {
            Ok(game_state) => valid.push((index, game_state)),
            Err(e) => results.push(BulkItem {
                index,
                decision: None,
                error: Some(ApiFailure::from(e).to_parts(trace_id).1),
            }),
        }
    }

    let snapshot = match state.engine.snapshot(None) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let error = ApiFailure::from(e).to_parts(trace_id).1;
            results.extend(valid.into_iter().map(|(index, _)| BulkItem {
                index,
                decision: None,
                error: Some(error.clone()),
            }));
            results.sort_by_key(|item| item.index);
            return Ok(BulkResponse { results });
        }
    };

    let mut pending: Vec<(usize, Option<String>, GameState)> = Vec::new();
    for (index, game_state) in valid {
        match state.cached(&snapshot, &game_state) {
            (_, Some(hit)) => results.push(BulkItem {
                index,
                decision: Some(hit),
                error: None,
            }),
            (key, None) => pending.push((index, key, game_state)),
        }
    }

    let engine = state.engine.clone();
    let states: Vec<GameState> = pending.iter().map(|(_, _, s)| s.clone()).collect();
    let task = tokio::task::spawn_blocking(move || engine.decide_many_with(&states, &snapshot));
    let decided = match tokio::time::timeout(state.config.latency_budget, task).await {
        Ok(Ok(decided)) => decided,
        Ok(Err(join)) => return Err(ApiFailure::Internal(format!("bulk scoring failed: {}", join))),
        Err(_) => return Err(ApiFailure::Timeout(state.config.latency_budget)),
    };

    for ((index, key, _), outcome) in pending.into_iter().zip(decided) {
        results.push(match outcome {
            Ok(decision) => {
                if let Some(key) = key {
                    state.cache.put(key, decision.clone());
                }
                BulkItem {
                    index,
                    decision: Some(decision),
                    error: None,
                }
            }
            Err(e) => BulkItem {
                index,
                decision: None,
                error: Some(ApiFailure::from(e).to_parts(trace_id).1),
            },
        });
    }
    results.sort_by_key(|item| item.index);
    Ok(BulkResponse { results })
}

// ============================================================================
// HANDLERS - HEALTH & METRICS
// ============================================================================

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": crate::NAME,
        "version": crate::VERSION,
    }))
}

#[derive(Debug, Deserialize)]
struct ReadyQuery {
    model: Option<String>,
}

async fn readyz(State(state): State<Arc<ApiState>>, Query(query): Query<ReadyQuery>) -> Response {
    let model = query
        .model
        .unwrap_or_else(|| state.engine.policy().decision_model.clone());
    match state.engine.registry().get_active(&model) {
        Some(active) => Json(serde_json::json!({
            "status": "ready",
            "model": model,
            "version": active.version(),
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "model": model,
            })),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

// ============================================================================
// HANDLERS - MODEL ADMINISTRATION
// ============================================================================

async fn model_status(State(state): State<Arc<ApiState>>, Path(name): Path<String>) -> Response {
    match state.engine.registry().status(&name) {
        Some(status) => Json(status).into_response(),
        None => ApiError {
            trace_id: new_trace_id(),
            failure: ApiFailure::NotFound(format!("no model named {}", name)),
        }
        .into_response(),
    }
}

async fn rollback_model(State(state): State<Arc<ApiState>>, Path(name): Path<String>) -> Response {
    let registry = state.engine.registry();
    let previous_version = registry.get_active(&name).map(|a| a.version().to_string());
    match registry.rollback(&name) {
        Ok(restored) => {
            if let (Some(ledger), Some(from)) = (state.ledger.clone(), previous_version) {
                let (name, to) = (name.clone(), restored.version().to_string());
                tokio::task::spawn_blocking(move || {
                    let result = ledger
                        .set_model_status(&name, &from, "rolled-back")
                        .and_then(|_| ledger.set_model_status(&name, &to, "accepted"));
                    if let Err(e) = result {
                        log::error!("❌ Ledger update after rollback failed: {}", e);
                    }
                });
            }
            match registry.status(&name) {
                Some(status) => Json(status).into_response(),
                None => StatusCode::NO_CONTENT.into_response(),
            }
        }
        Err(e) => ApiError {
            trace_id: new_trace_id(),
            failure: ApiFailure::from(e),
        }
        .into_response(),
    }
}

async fn reload_models(State(state): State<Arc<ApiState>>) -> Response {
    let trace_id = new_trace_id();
    let Some(store) = state.store.clone() else {
        return ApiError {
            trace_id,
            failure: ApiFailure::BadRequest("no artifact store configured".to_string()),
        }
        .into_response();
    };
    let registry = Arc::clone(state.engine.registry());
    match tokio::task::spawn_blocking(move || registry.sync_from_store(&store)).await {
        Ok(Ok(activated)) => {
            let activated: Vec<serde_json::Value> = activated
                .iter()
                .map(|a| serde_json::json!({ "model": a.name(), "version": a.version() }))
                .collect();
            log::info!("🔄 Reload activated {} artifact(s)", activated.len());
            Json(serde_json::json!({ "activated": activated })).into_response()
        }
        Ok(Err(e)) => ApiError {
            trace_id,
            failure: ApiFailure::from(e),
        }
        .into_response(),
        Err(e) => ApiError {
            trace_id,
            failure: ApiFailure::Internal(format!("reload task failed: {}", e)),
        }
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionPolicy;
    use crate::registry::ModelRegistry;

    #[test]
    fn test_decision_api_config_default() {
        let config = DecisionApiConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.latency_budget, Duration::from_millis(250));
        assert_eq!(config.max_bulk_items, 1000);
        assert_eq!(config.cache_capacity, 10_000);
    }

    #[test]
    fn test_config_validation() {
        assert!(DecisionApiConfig::default().validate().is_ok());
        let zero_budget = DecisionApiConfig {
            latency_budget: Duration::ZERO,
            ..DecisionApiConfig::default()
        };
        let no_bulk = DecisionApiConfig {
            max_bulk_items: 0,
            ..DecisionApiConfig::default()
        };
        let no_batch = DecisionApiConfig {
            ledger_batch: 0,
            ..DecisionApiConfig::default()
        };
        for config in [zero_budget, no_bulk, no_batch] {
            assert!(matches!(config.validate(), Err(DecisionServiceError::InvalidConfig(_))));
        }
        let uncached = DecisionApiConfig {
            cache_capacity: 0,
            ..DecisionApiConfig::default()
        };
        assert!(uncached.validate().is_ok());
    }

    #[test]
    fn test_ledger_params_are_canonical_json() {
        let payload = GameState::builder(4, 1, 35).build().unwrap().to_payload();
        let json = ledger_params("t", &payload);
        assert!(json.starts_with("{\"down\":4,"));

        let mut unserializable = std::collections::HashMap::new();
        unserializable.insert((1, 2), "tuple keys are not JSON object keys");
        assert_eq!(ledger_params("t", &unserializable), "null");
    }

    #[tokio::test]
    async fn test_start_refuses_invalid_config() {
        let engine = DecisionEngine::new(Arc::new(ModelRegistry::default()), DecisionPolicy::default());
        let config = DecisionApiConfig {
            port: 0,
            max_bulk_items: 0,
            ..DecisionApiConfig::default()
        };
        assert!(DecisionApiServer::new(config, engine).start().await.is_err());
    }

    #[test]
    fn test_pinned_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(pinned_version(&headers), None);
        headers.insert(MODEL_VERSION_HEADER, HeaderValue::from_static(" v1 "));
        assert_eq!(pinned_version(&headers).as_deref(), Some("v1"));
    }

    #[test]
    fn test_router_without_ledger_builds_outside_runtime() {
        let engine = DecisionEngine::new(Arc::new(ModelRegistry::default()), DecisionPolicy::default());
        let _router = DecisionApiServer::new(DecisionApiConfig::default(), engine).router();
    }
}
