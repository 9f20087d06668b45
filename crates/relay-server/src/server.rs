//! `RelayServer` — axum HTTP + WebSocket server.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{ErrorNotice, RelayError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span};

use crate::config::{RelayConfig, ServerConfig};
use crate::errors::ApiError;
use crate::health::{self, HealthResponse};
use crate::metrics::UPGRADES_REJECTED_TOTAL;
use crate::relay::Relay;
use crate::shutdown::ShutdownCoordinator;
use crate::transport::Transport;
use crate::transport::ws::WsTransport;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest request body accepted on plain HTTP routes.
const MAX_REQUEST_BODY: usize = 64 * 1024;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The relay core.
    pub relay: Arc<Relay>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Listener configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, relay: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
            relay: Arc::new(Relay::new(relay)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes and middleware.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        let http_routes = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TimeoutLayer::new(self.config.request_timeout));

        Router::new()
            .route("/connect", get(connect_handler))
            .merge(http_routes)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<axum::body::Body>| {
                            let request_id = request
                                .headers()
                                .get(REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");
                            info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id,
                            )
                        },
                    ))
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY)),
            )
    }

    /// Bind the listener and start serving plus the heartbeat sweeper.
    ///
    /// Returns the bound address and a handle that completes once the
    /// listener and sweeper have stopped (after [`ShutdownCoordinator::shutdown`]).
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();
        let sweeper = self.relay.sweeper().spawn(token.child_token());

        info!(%addr, "relay listening");

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
            if let Err(e) = sweeper.await {
                error!(error = %e, "heartbeat sweeper task failed");
            }
            info!("relay listener stopped");
        });

        Ok((addr, handle))
    }

    /// The relay core.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /connect — WebSocket upgrade into a relay session.
async fn connect_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if state.shutdown.is_shutting_down() {
        return Err(reject(RelayError::ShuttingDown));
    }
    let connections = state.relay.registry().len().await;
    if connections >= state.config.max_connections {
        return Err(reject(RelayError::AtCapacity(state.config.max_connections)));
    }

    let max = state.config.max_message_size;
    Ok(ws
        .max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| serve_socket(socket, state)))
}

fn reject(err: RelayError) -> ApiError {
    metrics::counter!(UPGRADES_REJECTED_TOTAL, "code" => err.code()).increment(1);
    debug!(code = err.code(), "upgrade rejected");
    ApiError(err)
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let shutdown = Arc::clone(&state.shutdown);
    shutdown
        .track(async move {
            let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(socket));
            let cancel = state.shutdown.session_token();

            // Handshake failures are logged by the handshake itself.
            if let Ok(identity) = state
                .relay
                .open_session_with_cancel(Arc::clone(&transport), &cancel)
                .await
            {
                let _ = state.relay.run_session(&cancel, identity, &transport).await;
            }
            transport.close().await;
        })
        .await;
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.relay.registry().len().await;
    Json(health::health_check(
        state.start_time,
        connections,
        state.shutdown.active_sessions(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(%detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorNotice::new("INTERNAL", "internal server error")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default(), RelayConfig::default())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert!(body.get("uptime_secs").is_some());
        assert!(body.get("active_sessions").is_some());
    }

    #[tokio::test]
    async fn health_reports_draining_after_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let (_, body) = get_json(server.router(), "/health").await;
        assert_eq!(body["status"], "draining");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders_text() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(crate::metrics::HANDSHAKES_TOTAL).increment(1);
        });
        let server = make_server().with_metrics(handle);

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("relay_handshakes_total"));
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() {
        let server = make_server();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        let id = resp.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn caller_request_id_is_kept() {
        let server = make_server();
        let req = Request::builder()
            .uri("/health")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn connect_without_upgrade_is_rejected() {
        let server = make_server();
        let req = Request::builder().uri("/connect").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn panic_response_is_500_json() {
        let resp = panic_response(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().graceful_shutdown(vec![handle], None).await;
        assert!(server.shutdown().is_shutting_down());
    }
}
