//! Development server implementation.
//!
//! Serves a built output directory, watches it for changes, and pushes
//! reload messages to connected pages over a WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use crate::reload::{reload_client_script, ReloadHub, ReloadMessage};
use crate::watcher::{FileWatcher, WatchEvent};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Built output directory to serve
    pub serve_dir: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            serve_dir: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Shared server state.
struct ServerState {
    config: DevServerConfig,
    hub: ReloadHub,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self { config }
    }

    /// Start the development server.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                ServerError::BindError(
                    SocketAddr::from(([127, 0, 0, 1], self.config.port)),
                    format!("{e}"),
                )
            })?;

        let state = Arc::new(ServerState {
            config: self.config.clone(),
            hub: ReloadHub::new(),
        });

        // Watch the output directory; rebuilds landing there push reloads.
        let (watcher, mut rx) = FileWatcher::new(&[self.config.serve_dir.clone()])
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_watch_event(&state_clone, event);
            }
            // Keep watcher alive
            drop(watcher);
        });

        let serve_dir = self.config.serve_dir.clone();
        let app = Router::new()
            .route("/", get(index_handler))
            .route("/__reload", get(ws_handler))
            .route("/__reload.js", get(reload_script_handler))
            .nest_service("/js", ServeDir::new(serve_dir.join("js")))
            .nest_service("/css", ServeDir::new(serve_dir.join("css")))
            .nest_service("/images", ServeDir::new(serve_dir.join("images")))
            .fallback(get(file_handler))
            .with_state(state);

        tracing::info!("Starting dev server at http://{}", addr);

        if self.config.open {
            let url = format!("http://{}", addr);
            let _ = open::that(&url);
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

/// Map a watch event to a reload message.
fn handle_watch_event(state: &Arc<ServerState>, event: WatchEvent) {
    match event {
        WatchEvent::StyleModified(path) => {
            tracing::info!("stylesheet changed: {}", path.display());
            state.hub.send(ReloadMessage::RefreshStyles);
        }

        WatchEvent::PageModified(path) | WatchEvent::ScriptModified(path) => {
            tracing::info!("changed: {}", path.display());
            state.hub.send(ReloadMessage::Reload);
        }

        WatchEvent::Created(_) | WatchEvent::Deleted(_) | WatchEvent::Modified(_) => {
            state.hub.send(ReloadMessage::Reload);
        }
    }
}

/// Append the reload client to a served page.
fn with_reload_script(html: &str) -> String {
    let script = "<script src=\"/__reload.js\"></script>";
    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], script, &html[pos..]),
        None => format!("{html}{script}"),
    }
}

/// Handler for the site root.
async fn index_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    serve_page(&state, "index.html")
}

/// Serve an HTML page with the reload script, or a placeholder when the
/// output directory has not been built yet.
fn serve_page(state: &Arc<ServerState>, name: &str) -> Response {
    let path = state.config.serve_dir.join(name);

    match std::fs::read_to_string(&path) {
        Ok(html) => Html(with_reload_script(&html)).into_response(),
        Err(_) => Html(format!(
            "<h1>Not built yet</h1><p>No {} in {}. Run <code>lamina build</code> first.</p>\
             <script src=\"/__reload.js\"></script>",
            name,
            state.config.serve_dir.display()
        ))
        .into_response(),
    }
}

/// Fallback handler for root-level files (pages, favicon, reports).
async fn file_handler(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let trimmed = uri.path().trim_start_matches('/');

    // Reject anything that could escape the serve dir.
    if trimmed.is_empty() || trimmed.split('/').any(|c| c == "..") {
        return StatusCode::NOT_FOUND.into_response();
    }

    if trimmed.ends_with(".html") {
        return serve_page(&state, trimmed);
    }

    let path = state.config.serve_dir.join(trimmed);
    match std::fs::read(&path) {
        Ok(bytes) => {
            let content_type = content_type_for(trimmed);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "json" => "application/json",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hub.subscribe();

    let msg = match serde_json::to_string(&ReloadMessage::Connected) {
        Ok(msg) => msg,
        Err(_) => return,
    };
    if socket.send(Message::Text(msg.into())).await.is_err() {
        return;
    }

    // Forward reload messages to the page.
    while let Ok(reload_msg) = rx.recv().await {
        let Ok(json) = serde_json::to_string(&reload_msg) else {
            break;
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}

/// Handler for the reload client script.
async fn reload_script_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let script = reload_client_script(&format!(
        "ws://{}:{}/__reload",
        state.config.host, state.config.port
    ));
    ([(header::CONTENT_TYPE, "application/javascript")], script)
}
