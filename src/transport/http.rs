//! JSON-over-HTTP transport.
//!
//! Endpoints:
//! - `POST /process` with `{utterance, session_id?}` returns the response
//! - `POST /sessions` creates a session
//! - `DELETE /sessions/{id}` deletes one and closes its connection
//! - `GET /health`
//!
//! When bearer tokens are configured every endpoint except `/health`
//! requires one.

use crate::auth::{AuthConfig, require_bearer};
use crate::error::{AppError, AppResult};
use crate::models::AgentResponse;
use crate::orchestrator::Orchestrator;
use crate::transport::{Transport, wait_for_signal};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub utterance: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// HTTP transport implementation.
pub struct HttpTransport {
    orchestrator: Arc<Orchestrator>,
    auth: Arc<AuthConfig>,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpTransport {
    pub fn new(orchestrator: Arc<Orchestrator>, host: impl Into<String>, port: u16) -> Self {
        Self {
            orchestrator,
            auth: Arc::new(AuthConfig::disabled()),
            host: host.into(),
            port,
        }
    }

    /// Require bearer tokens on every endpoint except `/health`.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Routes over a shared orchestrator.
pub fn router(orchestrator: Arc<Orchestrator>, auth: Arc<AuthConfig>) -> Router {
    let protected = Router::new()
        .route("/process", post(process))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", delete(delete_session))
        .route_layer(middleware::from_fn_with_state(auth, require_bearer));

    Router::new()
        .merge(protected)
        .route("/health", get(health))
        .with_state(orchestrator)
}

async fn process(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<AgentResponse>, (StatusCode, String)> {
    let utterance = request.utterance.trim();
    if utterance.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "utterance must not be empty".to_string()));
    }
    let response = orchestrator
        .process(utterance, request.session_id.as_deref())
        .await;
    Ok(Json(response))
}

async fn create_session(State(orchestrator): State<Arc<Orchestrator>>) -> (StatusCode, Json<SessionCreated>) {
    let session = orchestrator.create_session().await;
    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id,
        }),
    )
}

async fn delete_session(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> StatusCode {
    if orchestrator.delete_session(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

impl Transport for HttpTransport {
    async fn run(&self) -> AppResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting HTTP transport on {}", bind_addr);

        let app = router(self.orchestrator.clone(), self.auth.clone());
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            AppError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        // In-flight LLM calls can hold requests open for a while
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(AppError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.orchestrator.shutdown().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
