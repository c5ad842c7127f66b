//! HTTP listener and top-level server wiring.
//!
//! This module:
//! - Binds the configured address/port.
//! - Serves `GET /ws`, upgrading each request to a WebSocket.
//! - Spawns:
//!   - the single dispatcher task that drains the broadcast queue,
//!   - the health probe task (if enabled),
//!   - the HTTP server, which runs one reader per upgraded connection.
//!
//! Per-connection logic lives in `client`; the fan-out machinery lives
//! in `relay-core`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use relay_core::{BroadcastQueue, Dispatcher, Publisher, Registry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::client;
use crate::config::Config;
use crate::probe::{HealthProbe, HttpReachability};

/// Shared state handed to every upgrade.
#[derive(Clone)]
pub(crate) struct AppState {
    pub registry: Arc<Registry>,
    pub publisher: Publisher,
    pub max_clients: usize,
    pub idle_timeout: Option<Duration>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        // Any origin may connect.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// WebSocket upgrade handler. Failed handshakes are logged and never
/// reach the registry.
async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(%peer, error = %rejection, "WebSocket upgrade error");
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(move |e| warn!(%peer, error = %e, "WebSocket upgrade error"))
        .on_upgrade(move |socket| client::handle_socket(socket, peer, state))
}

/// Handle to a running server. Keeps its background tasks reachable.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    publisher: Publisher,
    server: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    probe: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// A publisher into the broadcast queue, for in-process producers.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Wait until the HTTP server task exits.
    pub async fn wait(self) -> anyhow::Result<()> {
        let result = self.server.await;
        self.dispatcher.abort();
        if let Some(probe) = self.probe {
            probe.abort();
        }
        result.context("server task failed")
    }

    /// Stop every task started by [`start`].
    pub fn shutdown(self) {
        self.server.abort();
        self.dispatcher.abort();
        if let Some(probe) = self.probe {
            probe.abort();
        }
    }
}

/// Bind and start serving. Binding is the only fatal failure.
pub async fn start(config: Config) -> anyhow::Result<ServerHandle> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "Listening");

    let registry = Arc::new(Registry::new());
    let (publisher, consumer) = match config.queue_capacity {
        Some(capacity) => BroadcastQueue::bounded(capacity),
        None => BroadcastQueue::unbounded(),
    };

    let dispatcher = tokio::spawn(
        Dispatcher::new(consumer, Arc::clone(&registry))
            .with_write_timeout(config.write_timeout)
            .run(),
    );

    let probe = if config.probe_enabled {
        let reachability = HttpReachability::new(config.probe_url.clone(), config.probe_timeout);
        let probe = HealthProbe::new(reachability, Arc::clone(&registry), publisher.clone())
            .with_interval(config.probe_interval);
        Some(tokio::spawn(probe.run()))
    } else {
        None
    };

    let state = AppState {
        registry: Arc::clone(&registry),
        publisher: publisher.clone(),
        max_clients: config.max_clients,
        idle_timeout: config.idle_timeout,
    };
    let router = build_router(state);

    let server = tokio::spawn(async move {
        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            error!(error = %e, "HTTP server stopped");
        }
    });

    Ok(ServerHandle {
        local_addr,
        registry,
        publisher,
        server,
        dispatcher,
        probe,
    })
}

/// Run the relay with the given configuration until the server exits.
pub async fn run(config: Config) -> anyhow::Result<()> {
    start(config).await?.wait().await
}
