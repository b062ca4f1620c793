//! Versegate API Gateway
//!
//! The HTTP entry point for live resource search, tool-call replay and
//! streamed conversation turns.
//! Handles:
//! - Rate limiting, request timeouts and body limits
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use versegate_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self, metric_name, PROVIDER_BUCKETS, REQUEST_BUCKETS},
    resources::{HttpTransport, ResourceTransport, ToolCallReplayer, ToolExecutor},
    stream::{ChatBackend, ChatClient, SessionRegistry},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transport: Arc<dyn ResourceTransport>,
    pub executor: ToolExecutor,
    pub replayer: ToolCallReplayer,
    pub chat: Arc<dyn ChatBackend>,
    pub sessions: SessionRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        transport: Arc<dyn ResourceTransport>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        let executor = ToolExecutor::standard(transport.clone(), &config.providers);
        let sessions =
            SessionRegistry::with_limits(config.chat.session_idle(), config.chat.max_sessions)
                .with_line_limit(config.chat.max_line_bytes);
        Self {
            replayer: ToolCallReplayer::new(executor.clone()),
            executor,
            config,
            transport,
            chat,
            sessions,
            started_at: Instant::now(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration; APP_CONFIG_FILE replaces the layered config/ lookup
    let config = match std::env::var("APP_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::load(),
    }
    .map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting Versegate API Gateway v{}",
        versegate_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    let config = Arc::new(config);
    let transport: Arc<dyn ResourceTransport> = Arc::new(HttpTransport::new(&config.providers)?);
    let chat: Arc<dyn ChatBackend> = Arc::new(ChatClient::new(&config.chat)?);

    info!(base_url = %config.providers.base_url, "Resource providers configured");

    let state = AppState::new(config.clone(), transport, chat);
    let shutdown = CancellationToken::new();
    spawn_session_sweeper(state.sessions.clone(), config.chat.session_idle(), shutdown.clone());

    // Build the router
    let app = create_router(state);

    // Start the server
    let host: std::net::IpAddr = config.server.host.parse().unwrap_or_else(|e| {
        warn!(host = %config.server.host, error = %e, "Invalid host, binding to all interfaces");
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::from((host, config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    let mut server = tokio::spawn(server);

    tokio::select! {
        finished = &mut server => {
            finished??;
            return Ok(());
        }
        _ = shutdown_signal() => shutdown.cancel(),
    }

    // In-flight requests get the shutdown timeout to drain
    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(finished) => finished??,
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Shutdown timed out, dropping open connections"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(metric_name("provider_duration_seconds")),
            PROVIDER_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(metric_name("request_duration_seconds")),
            REQUEST_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(metric_name("aggregation_duration_seconds")),
            REQUEST_BUCKETS,
        )?
        .install()?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Evict idle conversations until shutdown
fn spawn_session_sweeper(sessions: SessionRegistry, idle: Duration, shutdown: CancellationToken) {
    let period = (idle / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    sessions.evict_idle().await;
                }
            }
        }
    });
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Live resources
        .route("/search", post(handlers::search::search))
        .route("/passage", get(handlers::passage::get_passage))

        // Tool-call replay
        .route("/replay", post(handlers::replay::replay))

        // Conversations
        .route(
            "/conversations/{id}/turns",
            post(handlers::conversations::create_turn),
        )
        .route(
            "/conversations/{id}/answer",
            get(handlers::conversations::get_answer),
        );

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = middleware::rate_limit::RateLimitState::new(
            limits.requests_per_second,
            limits.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    let request_timeout = state.config.request_timeout();
    let max_body_bytes = state.config.server.max_body_bytes;

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use futures::{stream, StreamExt};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use versegate_common::{
        errors::Result,
        resources::MockTransport,
        stream::{ChatTurnRequest, ChunkStream},
    };

    /// Replays canned SSE chunks for every turn
    struct ScriptedChat(Vec<&'static str>);

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        async fn open(&self, _request: &ChatTurnRequest) -> Result<ChunkStream> {
            let chunks: Vec<Result<Vec<u8>>> =
                self.0.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    fn transport() -> MockTransport {
        MockTransport::new()
            .respond_json(
                "/api/fetch-scripture",
                &[("reference", "John 3:16")],
                json!({"scripture": [{"text": "For God so loved the world", "translation": "ULT"}]}),
            )
            .respond_json(
                "/api/fetch-scripture",
                &[("filter", "love")],
                json!({"results": [{"reference": "1 John 4:8", "text": "God is **love**"}]}),
            )
            .respond_json(
                "/api/translation-words",
                &[],
                json!({"words": [{"term": "love", "definition": "To act for the good of others"}]}),
            )
            .respond_json(
                "/api/fetch-scripture",
                &[("reference", "Jude 1:99")],
                json!({"scripture": []}),
            )
            .respond_status("/api/translation-notes", &[], 502)
    }

    fn config() -> AppConfig {
        serde_json::from_value(json!({})).unwrap()
    }

    fn app_with(transport: MockTransport, chat: ScriptedChat, rate_limit: bool) -> Router {
        let mut config = config();
        config.rate_limit.enabled = rate_limit;
        create_router(AppState::new(Arc::new(config), Arc::new(transport), Arc::new(chat)))
    }

    fn app() -> Router {
        app_with(transport(), ScriptedChat(vec!["data: [DONE]\n"]), false)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), get_request("/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], versegate_common::VERSION);
    }

    #[tokio::test]
    async fn test_ready_reports_providers() {
        let (status, body) = send(app(), get_request("/v1/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["activeConversations"], 0);
    }

    #[tokio::test]
    async fn test_ready_is_unavailable_when_upstream_unreachable() {
        let app = app_with(transport().unreachable(), ScriptedChat(vec![]), false);
        let (status, body) = send(app, get_request("/v1/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_search_accepts_all_kinds() {
        let request = post_json(
            "/v1/search",
            json!({"query": "love", "reference": "1 John", "resources": ["all"]}),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["results"]["scripture"]["totalCount"], 1);
        assert!(body["failedKinds"].as_array().is_some_and(|k| k.contains(&json!("notes"))));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = config();
        config.rate_limit.enabled = false;
        config.server.max_body_bytes = 64;
        let state = AppState::new(
            Arc::new(config),
            Arc::new(transport()),
            Arc::new(ScriptedChat(vec![])),
        );

        let request = post_json("/v1/search", json!({"query": "x".repeat(200)}));
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_responses_are_compressed_on_request() {
        let request = Request::get("/v1/health")
            .header("accept-encoding", "gzip")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-encoding"], "gzip");
    }

    #[tokio::test]
    async fn test_search_reports_failed_kinds_and_messages() {
        let request = post_json(
            "/v1/search",
            json!({
                "query": "love",
                "reference": "1 John",
                "resources": ["scripture", "notes", "words"],
                "presentation": "per_agent"
            }),
        );
        let (status, body) = send(app(), request).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["scopeType"], "book");
        assert_eq!(body["failedKinds"], json!(["notes"]));
        assert!(body["results"]["notes"].is_null());
        assert_eq!(body["results"]["scripture"]["totalCount"], 1);
        assert_eq!(body["toolCallsIssued"][0]["tool"], "search_biblical_resources");
        assert!(body["messages"].as_array().is_some_and(|m| m.len() == 2));
    }

    #[tokio::test]
    async fn test_search_all_providers_failed_is_bad_gateway() {
        let transport = MockTransport::new().respond_status("/api/translation-notes", &[], 500);
        let app = app_with(transport, ScriptedChat(vec![]), false);
        let request = post_json("/v1/search", json!({"query": "grace", "resources": ["notes"]}));

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "ALL_PROVIDERS_FAILED");
    }

    #[tokio::test]
    async fn test_search_rejects_unknown_kind_and_empty_input() {
        let request = post_json("/v1/search", json!({"query": "x", "resources": ["maps"]}));
        let (status, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app(), post_json("/v1/search", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_passage_lookup() {
        let request = get_request("/v1/passage?reference=John%203:16");
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["book"], "John");
        assert_eq!(body["rawContent"], "For God so loved the world");

        let request = get_request("/v1/passage?reference=Jude%201:99");
        let (status, _) = send(app(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_replay_skips_unknown_tools() {
        let request = post_json(
            "/v1/replay",
            json!({
                "toolCalls": [
                    {"name": "get_scripture_passage", "arguments": {"reference": "John 3:16"}},
                    {"name": "draw_map", "arguments": {}}
                ]
            }),
        );
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["calls"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["skipped"][0]["tool"], "draw_map");
    }

    #[tokio::test]
    async fn test_conversation_turn_replays_tool_calls() {
        let chat = ScriptedChat(vec![
            "data: {\"type\":\"content\",\"content\":\"See John 3:16 \"}\n",
            "data: {\"type\":\"tool_results\",\"results\":[{\"name\":\"get_scripture_passage\",",
            "\"arguments\":{\"reference\":\"John 3:16\"}}]}\n",
            "data: [DONE]\n",
        ]);
        let app = app_with(transport(), chat, false);

        let request = post_json(
            "/v1/conversations/conv-1/turns",
            json!({"message": "What does John 3:16 say?"}),
        );
        let (status, body) = send(app.clone(), request).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["answer"]["state"], "done");
        assert_eq!(body["answer"]["content"], "See John 3:16 ");
        assert_eq!(body["resources"]["calls"][0]["output"]["type"], "passage");

        let (status, body) = send(
            app.clone(),
            get_request("/v1/conversations/conv-1/answer"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "See John 3:16 ");

        let (status, _) = send(app, get_request("/v1/conversations/other/answer")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_excess() {
        let mut config = config();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let state = AppState::new(
            Arc::new(config),
            Arc::new(transport()),
            Arc::new(ScriptedChat(vec![])),
        );
        let app = create_router(state);

        let (first, _) = send(app.clone(), get_request("/v1/health")).await;
        let (second, body) = send(app, get_request("/v1/health")).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }
}
