//! WebSocket and HTTP transport server using Axum.
//!
//! Every WebSocket text frame is handled on its own task, and responses are
//! funneled through one writer task, so replies may leave in a different
//! order than requests arrived.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

/// Implemented by whatever turns one message text into an optional reply.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one raw message. `None` means no reply is sent.
    fn handle_message(&self, text: String) -> impl Future<Output = Option<String>> + Send;

    /// Number of methods served, reported by `/health`.
    fn method_count(&self) -> usize {
        0
    }
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS (for browser clients)
    pub enable_cors: bool,
    /// Maximum concurrent WebSocket connections
    pub max_connections: Option<usize>,
    /// Log every message at info level
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_connections: Some(32),
            verbose_logging: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the transport server.
struct AppState<H: MessageHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    /// Connected WebSocket client count (for health check)
    client_count: Arc<AtomicUsize>,
}

/// The transport server — owns the listener task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given message handler.
    pub async fn start<H: MessageHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start with a handler that is also held elsewhere.
    pub async fn start_shared<H: MessageHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            client_count: Arc::new(AtomicUsize::new(0)),
        });

        let mut app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/rpc", post(http_rpc_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state);
        if config.enable_cors {
            app = app.layer(CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("JSON-RPC transport listening on {}:{} (/ws, /rpc)", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = served {
                error!("Transport server error: {e}");
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("JSON-RPC transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: MessageHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> Response {
    // The slot is taken before upgrading, so simultaneous upgrades cannot
    // overshoot the limit. A failed upgrade drops the closure and the slot.
    let Some(slot) = ConnectionSlot::acquire(&state.client_count, state.config.max_connections)
    else {
        warn!(
            "Connection rejected: max connections reached ({})",
            state.config.max_connections.unwrap_or_default()
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, slot))
        .into_response()
}

async fn http_rpc_handler<H: MessageHandler>(
    State(state): State<Arc<AppState<H>>>,
    body: String,
) -> Response {
    if state.config.verbose_logging {
        info!("HTTP <- {body}");
    }
    match state.handler.handle_message(body).await {
        Some(reply) => ([(header::CONTENT_TYPE, "application/json")], reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn health_handler<H: MessageHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Acquire),
        "methods": state.handler.method_count(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

/// One counted WebSocket client. Released on drop.
struct ConnectionSlot {
    count: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    /// Increment `count` unless it is already at `max`.
    fn acquire(count: &Arc<AtomicUsize>, max: Option<usize>) -> Option<Self> {
        count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match max {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            })
            .ok()?;
        Some(Self {
            count: count.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn handle_ws_connection<H: MessageHandler>(
    socket: WebSocket,
    state: Arc<AppState<H>>,
    slot: ConnectionSlot,
) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("Client connected: {client_id}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Single writer: in-flight requests send their replies here
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let writer_id = client_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = ws_tx.send(msg).await {
                error!("Failed to send to {writer_id}: {e}");
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if state.config.verbose_logging {
                    info!("{client_id} <- {}", text.as_str());
                }
                let handler = state.handler.clone();
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = handler.handle_message(text.to_string()).await {
                        let _ = out_tx.send(Message::Text(reply.into())).await;
                    }
                });
            }
            Ok(Message::Ping(data)) => {
                let _ = out_tx.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                debug!("Client closed: {client_id}");
                break;
            }
            Err(e) => {
                warn!("WebSocket error for {client_id}: {e}");
                break;
            }
            _ => {}
        }
    }

    // Replies still in flight keep their sender clones; the writer ends when
    // the last one is dropped.
    drop(out_tx);
    let _ = writer.await;

    drop(slot);
    info!(
        "Client disconnected: {client_id} (total: {})",
        state.client_count.load(Ordering::Acquire)
    );
}
