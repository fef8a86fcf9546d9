//! Development server implementation.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use folio_content::{
    generate_routes_with, route_for, CancelToken, ContentParseError, LocaleIndex,
    LocalizationIndex, Pipeline, RouteTable, RouterError,
};
use folio_static::{LayoutEngine, RenderError, SiteInfo};

use crate::client::{client_script, script_tag};
use crate::config::{DevServerConfig, Mode};
use crate::files::{content_type, inject_script, is_html, resolve_public};
use crate::hmr::LiveUpdateContext;
use crate::protocol::{ClientMessage, CLIENT_SCRIPT_PATH, SOCKET_PATH};
use crate::watcher::{Change, ChangeBatch, IgnoreRules, WatchConfig, Watcher};

/// How long `stop` waits for open connections to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by request handlers and the watcher.
struct Shared {
    config: DevServerConfig,
    pages_root: PathBuf,
    public_root: PathBuf,
    layouts_root: Option<PathBuf>,
    site: SiteInfo,
    routes: ArcSwap<RouteTable>,
    layout: ArcSwap<Result<LayoutEngine, RenderError>>,
    hmr: Arc<LiveUpdateContext>,
    pipeline: Pipeline,
    localization: Arc<dyn LocalizationIndex>,
    cancel: CancelToken,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    pipeline: Pipeline,
    localization: Option<Arc<dyn LocalizationIndex>>,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            pipeline: Pipeline::new(),
            localization: None,
        }
    }

    /// Thread content through `pipeline` on every generation pass.
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Replace the default [`LocaleIndex`].
    pub fn with_localization(mut self, index: Arc<dyn LocalizationIndex>) -> Self {
        self.localization = Some(index);
        self
    }

    /// Bind the socket, build the route table and start serving.
    pub async fn start(self) -> Result<DevServerHandle, ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let localization: Arc<dyn LocalizationIndex> = match self.localization {
            Some(index) => index,
            None => Arc::new(LocaleIndex::new(self.config.default_locale.clone())),
        };
        let shared = Arc::new(Shared::new(self.config, self.pipeline, localization));

        match shared.regenerate().await {
            Ok(failures) if !failures.is_empty() => {
                tracing::warn!("{} content files were skipped", failures.len())
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Starting with an empty route table: {}", e),
        }

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&shared));
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let watcher = if shared.config.mode.is_development() {
            start_watcher(&shared)
        } else {
            None
        };

        tracing::info!(
            "Dev server running at http://{} ({})",
            local_addr,
            shared.config.mode
        );

        Ok(DevServerHandle {
            local_addr,
            shared,
            watcher,
            shutdown: Some(shutdown),
            server: Some(server),
        })
    }

    /// Start the server and run until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        let open = self.config.open;
        let mut handle = self.start().await?;

        if open {
            if let Err(e) = open::that(handle.url()) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        handle.stop().await
    }
}

/// A running development server.
pub struct DevServerHandle {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    watcher: Option<Watcher>,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl DevServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Current route table snapshot.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.shared.routes.load_full()
    }

    pub fn live_updates(&self) -> Arc<LiveUpdateContext> {
        Arc::clone(&self.shared.hmr)
    }

    /// Ask every connected client to reload.
    pub fn reload(&self) -> usize {
        self.shared.hmr.reload()
    }

    /// Process a batch exactly as a watcher flush would.
    pub async fn apply_changes(&self, batch: ChangeBatch) {
        self.shared.apply_changes(batch).await;
    }

    /// The request router, sharing this server's state.
    pub fn app(&self) -> Router {
        router(Arc::clone(&self.shared))
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Stop watching, close the live-update channel and release the socket.
    /// Idempotent.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        self.shared.cancel.cancel();
        self.shared.hmr.close();

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let Some(mut server) = self.server.take() else {
            return Ok(());
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
            Err(_) => {
                tracing::warn!("Connections still open after {:?}, aborting", SHUTDOWN_GRACE);
                server.abort();
            }
        }

        tracing::info!("Dev server stopped");
        Ok(())
    }
}

impl Drop for DevServerHandle {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        self.shared.hmr.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Shared {
    fn new(
        config: DevServerConfig,
        pipeline: Pipeline,
        localization: Arc<dyn LocalizationIndex>,
    ) -> Self {
        let layouts_root = config.layouts_dir.as_deref().map(canonical);
        let layout = load_layout(layouts_root.as_deref());

        Self {
            pages_root: canonical(&config.pages_dir),
            public_root: canonical(&config.public_dir),
            layouts_root,
            site: SiteInfo {
                title: config.title.clone(),
                styles: config.styles.clone(),
            },
            routes: ArcSwap::from_pointee(RouteTable::new()),
            layout: ArcSwap::from_pointee(layout),
            hmr: Arc::new(LiveUpdateContext::new()),
            pipeline,
            localization,
            cancel: CancelToken::new(),
            config,
        }
    }

    fn is_development(&self) -> bool {
        self.config.mode == Mode::Development
    }

    /// Rebuild the route table and swap it in.
    async fn regenerate(&self) -> Result<Vec<ContentParseError>, RouterError> {
        let generated = generate_routes_with(
            &self.pages_root,
            &self.pipeline,
            Some(self.localization.as_ref()),
            &self.cancel,
        )
        .await?;

        self.routes.store(Arc::new(generated.table));
        Ok(generated.failures)
    }

    /// Handle a flushed batch: content, then styles, then everything else.
    async fn apply_changes(&self, batch: ChangeBatch) {
        let ChangeBatch {
            content,
            styles,
            mut other,
        } = batch;

        // Markdown outside the pages root has no route of its own.
        let (pages, stray): (Vec<Change>, Vec<Change>) = content
            .into_iter()
            .partition(|change| change.path.starts_with(&self.pages_root));
        other.extend(stray);

        if !pages.is_empty() {
            self.refresh_content(&pages).await;
        }

        if !styles.is_empty() {
            let paths: Vec<String> = styles
                .iter()
                .map(|change| self.public_url(&change.path))
                .collect();
            tracing::info!("Styles changed: {}", paths.join(", "));
            self.hmr.style_update(paths);
        }

        if !other.is_empty() {
            let layout_changed = self
                .layouts_root
                .as_ref()
                .is_some_and(|dir| other.iter().any(|c| c.path.starts_with(dir)));
            if layout_changed {
                tracing::info!("Layouts changed, reloading templates");
                self.layout
                    .store(Arc::new(load_layout(self.layouts_root.as_deref())));
            }
            self.hmr.reload();
        }
    }

    async fn refresh_content(&self, changes: &[Change]) {
        match self.regenerate().await {
            Ok(failures) => {
                for failure in &failures {
                    if changes.iter().any(|c| c.path == failure.path()) {
                        self.hmr.error(failure.to_string());
                    }
                }
            }
            Err(RouterError::Cancelled) => return,
            Err(e) => {
                tracing::error!("Failed to regenerate routes: {}", e);
                self.hmr.error(e.to_string());
                return;
            }
        }

        let routes: BTreeSet<String> = changes
            .iter()
            .map(|c| route_for(&c.path, &self.pages_root))
            .collect();

        for route in routes {
            let announced = self.hmr.notify_update(&route);
            tracing::info!("Updated {} ({} modules)", route, announced.len());
        }
    }

    /// URL a changed stylesheet is served under.
    fn public_url(&self, path: &Path) -> String {
        let extra: Vec<PathBuf> = self.config.watch.iter().map(|p| canonical(p)).collect();
        let relative = std::iter::once(&self.public_root)
            .chain(extra.iter())
            .chain(std::iter::once(&self.pages_root))
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or_else(|| Path::new(path.file_name().unwrap_or_default()));

        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        format!("/{}", segments.join("/"))
    }

    fn render_route(&self, path: &str) -> Option<Result<String, String>> {
        let routes = self.routes.load_full();
        let record = routes.get(path)?;

        let layout = self.layout.load_full();
        let rendered = match &*layout {
            Ok(engine) => engine
                .render(record, &routes, &self.site)
                .map_err(|e| error_chain(&e)),
            Err(e) => Err(error_chain(e)),
        };
        Some(rendered)
    }

    fn html_response(&self, status: StatusCode, html: String) -> Response {
        let body = if self.is_development() {
            inject_script(&html, &script_tag()).into_owned()
        } else {
            html
        };

        (
            status,
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response()
    }

    fn not_found(&self) -> Response {
        self.html_response(
            StatusCode::NOT_FOUND,
            "<!DOCTYPE html>\n<html><head><title>404 Not Found</title></head><body><h1>404 Not Found</h1></body></html>"
                .to_string(),
        )
    }

    fn server_error(&self, detail: &str) -> Response {
        tracing::error!("{}", detail);

        if !self.is_development() {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                "Internal Server Error",
            )
                .into_response();
        }

        let html = format!(
            "<!DOCTYPE html>\n<html><head><title>500 Internal Server Error</title></head><body><h1>500 Internal Server Error</h1><pre>{}</pre></body></html>",
            escape_html(detail)
        );
        self.html_response(StatusCode::INTERNAL_SERVER_ERROR, html)
    }
}

fn router(shared: Arc<Shared>) -> Router {
    let mut app: Router<Arc<Shared>> = Router::new();

    if shared.is_development() {
        app = app
            .route(CLIENT_SCRIPT_PATH, get(client_script_handler))
            .route(SOCKET_PATH, get(ws_handler));
    }

    app.fallback(serve_request)
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

fn start_watcher(shared: &Arc<Shared>) -> Option<Watcher> {
    let config = &shared.config;

    let mut targets = vec![config.pages_dir.clone(), config.public_dir.clone()];
    targets.extend(config.layouts_dir.clone());
    targets.extend(config.watch.iter().cloned());

    let watch = WatchConfig {
        targets,
        ignore: IgnoreRules::new().with_dir(&config.output_dir),
        debounce: config.debounce,
    };

    let handler_state = Arc::clone(shared);
    let result = Watcher::start(watch, shared.cancel.clone(), move |batch| {
        let shared = Arc::clone(&handler_state);
        async move { shared.apply_changes(batch).await }
    });

    match result {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!("File watching disabled: {}", e);
            None
        }
    }
}

/// Single entry point for everything but the live-update endpoints.
async fn serve_request(State(shared): State<Arc<Shared>>, uri: Uri) -> Response {
    let Ok(decoded) = percent_decode_str(uri.path()).decode_utf8() else {
        return shared.not_found();
    };
    let path = decoded.as_ref();

    if let Some(rendered) = shared.render_route(path) {
        return match rendered {
            Ok(html) => shared.html_response(StatusCode::OK, html),
            Err(detail) => shared.server_error(&detail),
        };
    }

    let Some(file) = resolve_public(&shared.public_root, path) else {
        return shared.not_found();
    };

    match tokio::fs::read(&file).await {
        Ok(bytes) if is_html(&file) => {
            let html = String::from_utf8_lossy(&bytes).into_owned();
            shared.html_response(StatusCode::OK, html)
        }
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, content_type(&file)),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            bytes,
        )
            .into_response(),
        Err(source) => shared.server_error(&error_chain(&RenderError::Read { path: file, source })),
    }
}

async fn client_script_handler() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        client_script(),
    )
}

async fn ws_handler(ws: WebSocketUpgrade, State(shared): State<Arc<Shared>>) -> Response {
    let hmr = Arc::clone(&shared.hmr);
    ws.on_upgrade(move |socket| handle_socket(socket, hmr))
}

async fn handle_socket(mut socket: WebSocket, hmr: Arc<LiveUpdateContext>) {
    let Ok(mut subscription) = hmr.connect() else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    let id = subscription.id;

    loop {
        tokio::select! {
            outgoing = subscription.receiver.recv() => match outgoing {
                Some(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    // channel closed by the server
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Connect { id: page }) => {
                            tracing::debug!("Client {} viewing {}", id, page)
                        }
                        Err(e) => tracing::debug!("Ignoring client message: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hmr.disconnect(id);
}

fn load_layout(dir: Option<&Path>) -> Result<LayoutEngine, RenderError> {
    let result = match dir {
        Some(dir) => LayoutEngine::from_dir(dir),
        None => Ok(LayoutEngine::new()),
    };
    if let Err(e) = &result {
        tracing::error!("Failed to load layouts: {}", e);
    }
    result
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Render an error and its sources, one per line.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
