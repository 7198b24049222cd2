// src/serve/mod.rs

//! Development HTTP server with live reload.
//!
//! Files come from [`ServeDir`]s chained in root order. [`livereload`] turns
//! build events into browser notifications and supplies the client that is
//! injected into HTML responses.
//!
//! The server subscribes to the engine's build-event channel; build errors
//! are logged and never take the server down.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::middleware::map_response;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::engine::BuildEvent;
use crate::errors::{AssetpipeError, Result};

pub mod livereload;

pub use livereload::{CLIENT_PATH, EVENTS_PATH, ReloadMessage, inject_client, reload_for};

/// What to serve and where.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directories searched in order; first match wins.
    pub roots: Vec<PathBuf>,
    /// Address to bind. Port 0 picks a free port.
    pub addr: SocketAddr,
    /// Inject the live-reload client into HTML responses.
    pub live_reload: bool,
}

impl DevServerConfig {
    pub fn new(roots: Vec<PathBuf>, port: u16) -> Self {
        Self {
            roots,
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            live_reload: true,
        }
    }

    pub fn live_reload(mut self, enabled: bool) -> Self {
        self.live_reload = enabled;
        self
    }
}

#[derive(Clone)]
struct ServerState {
    events: broadcast::Sender<BuildEvent>,
}

/// A running dev server.
#[derive(Debug)]
pub struct DevServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<std::io::Result<()>>,
}

impl DevServer {
    /// Bind and start serving in the background.
    pub async fn bind(config: DevServerConfig, events: broadcast::Sender<BuildEvent>) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(config.addr)
            .await
            .with_context(|| format!("binding dev server to {}", config.addr))?;
        let local_addr = listener.local_addr()?;

        let app = router(&config, ServerState { events });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(url = %format!("http://{local_addr}"), roots = ?config.roots, "dev server listening");
        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            join,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for the server task.
    ///
    /// Open live-reload streams are dropped rather than drained.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join.abort();
        match self.join.await {
            Ok(result) => Ok(result?),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(AssetpipeError::Other(anyhow::anyhow!("dev server task failed: {e}"))),
        }
    }
}

fn router(config: &DevServerConfig, state: ServerState) -> Router {
    let mut files = static_files(&config.roots);
    if config.live_reload {
        files = files.layer(map_response(inject_into_html));
    }
    Router::new()
        .route(EVENTS_PATH, get(events))
        .route(CLIENT_PATH, get(client_js))
        .with_state(state)
        .fallback_service(files)
        .layer(TraceLayer::new_for_http())
}

/// One [`ServeDir`] per root, each falling back to the next. A path none of
/// them has is a 404.
fn static_files(roots: &[PathBuf]) -> Router {
    roots.iter().rev().fold(Router::new(), |next, root| {
        Router::new().fallback_service(ServeDir::new(root).fallback(next))
    })
}

async fn events(State(state): State<ServerState>) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    debug!("live-reload client connected");
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|item| {
        let event = match item {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                warn!(missed, "live-reload client lagged behind build events");
                return None;
            }
        };
        let message = reload_for(&event)?;
        match Event::default().event("reload").json_data(&message) {
            Ok(sse) => Some(Ok(sse)),
            Err(err) => {
                warn!(error = %err, "could not encode reload message");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn client_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        livereload::CLIENT_JS,
    )
}

async fn inject_into_html(response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to read html response");
            return (StatusCode::INTERNAL_SERVER_ERROR, "read error").into_response();
        }
    };
    let html = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}
