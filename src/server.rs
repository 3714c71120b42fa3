//! HTTP surface of the dashboard: one page plus a small JSON API.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::color::THEME;
use crate::data::loader::SourceFile;
use crate::error::{DashboardError, LoadError, SetupError};
use crate::state::{
    load_sheet_with_refs, ChartFigure, ChartHeight, ChartWidth, Dashboard, DashboardView,
    WindowAction,
};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server stopped: {0}")]
    Serve(#[source] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    dashboard: Arc<Mutex<Dashboard>>,
}

impl AppState {
    pub fn new(dashboard: Dashboard) -> Self {
        Self {
            dashboard: Arc::new(Mutex::new(dashboard)),
        }
    }

    // Poisoned locks are recovered; dashboard methods validate input before mutating.
    fn lock(&self) -> MutexGuard<'_, Dashboard> {
        self.dashboard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Errors as JSON responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        let status = match &err {
            DashboardError::NoFile
            | DashboardError::NoData
            | DashboardError::ChartLocked { .. }
            | DashboardError::SourceChanged => StatusCode::CONFLICT,
            DashboardError::InvalidWindow { .. } => StatusCode::BAD_REQUEST,
            DashboardError::UnknownChart(_) | DashboardError::UnknownPackage(_) => {
                StatusCode::NOT_FOUND
            }
            DashboardError::Load(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DashboardError::Setup(SetupError::EmptyName | SetupError::NothingSelected) => {
                StatusCode::BAD_REQUEST
            }
            DashboardError::Setup(SetupError::NotFound(_)) => StatusCode::NOT_FOUND,
            DashboardError::Setup(SetupError::Storage { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{}", self.message);
        } else {
            log::warn!("{}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UploadParams {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct SheetBody {
    sheet: String,
}

#[derive(Debug, Deserialize)]
struct SeriesBody {
    series: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct SizeBody {
    width: ChartWidth,
    height: ChartHeight,
}

#[derive(Debug, Deserialize)]
struct ZoomBody {
    x0: String,
    x1: String,
}

#[derive(Debug, Deserialize)]
struct PackageBody {
    num: String,
}

#[derive(Debug, Deserialize)]
struct TagBody {
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    unit: String,
}

#[derive(Debug, Deserialize)]
struct SetupBody {
    name: String,
}

#[derive(Debug, Serialize)]
struct SetupReply {
    message: String,
    state: DashboardView,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/theme.css", get(theme_css))
        .route("/api/state", get(get_state))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/sheet", post(select_sheet))
        .route("/api/charts", post(add_chart))
        .route("/api/charts/:id", delete(close_chart))
        .route("/api/charts/:id/figure", get(figure))
        .route("/api/charts/:id/series", put(set_series))
        .route("/api/charts/:id/size", put(set_size))
        .route("/api/charts/:id/window", post(window_action))
        .route("/api/charts/:id/zoom", post(zoom))
        .route("/api/charts/:id/sync", post(toggle_sync))
        .route("/api/package", post(load_package))
        .route("/api/tags/:code", put(set_tag))
        .route("/api/setups", get(list_setups).post(save_setup))
        .route("/api/setups/:name/load", post(load_setup))
        .route("/api/setups/:name", delete(delete_setup))
        .with_state(state)
}

/// Bind `addr`. Fails before any dashboard state is shared with a server.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

pub async fn serve(
    listener: TcpListener,
    dashboard: Dashboard,
    max_upload_bytes: usize,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("dashboard listening on http://{addr}/");
    }
    let app = router(AppState::new(dashboard), max_upload_bytes);
    axum::serve(listener, app).await.map_err(ServerError::Serve)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn theme_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], THEME.stylesheet())
}

async fn get_state(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.lock().view())
}

/// Parsing a sheet can take seconds; keep it off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("background load failed: {e}")))
}

async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<DashboardView> {
    log::info!("upload '{}' ({} bytes)", params.filename, body.len());
    let filename = params.filename;
    let parsed = blocking(move || {
        let source = SourceFile::from_bytes(filename, body)?;
        let sheet = source
            .default_sheet()
            .map(|name| load_sheet_with_refs(&source, name));
        Ok::<_, LoadError>((source, sheet))
    })
    .await?;

    let mut dash = state.lock();
    match parsed {
        Ok((source, sheet)) => {
            let generation = dash.upload(Ok(source))?;
            if let Some(sheet) = sheet {
                // a bad first sheet leaves the file loaded with its notice set
                let _ = dash.install_sheet(generation, sheet);
            }
        }
        Err(e) => {
            dash.upload(Err(e))?;
        }
    }
    Ok(Json(dash.view()))
}

async fn select_sheet(
    State(state): State<AppState>,
    Json(body): Json<SheetBody>,
) -> ApiResult<DashboardView> {
    let (generation, source) = state.lock().loaded_source().ok_or(DashboardError::NoFile)?;
    log::info!("select sheet '{}'", body.sheet);
    let parsed = blocking(move || load_sheet_with_refs(&source, &body.sheet)).await?;
    let mut dash = state.lock();
    dash.install_sheet(generation, parsed)?;
    Ok(Json(dash.view()))
}

async fn add_chart(State(state): State<AppState>) -> Json<DashboardView> {
    let mut dash = state.lock();
    dash.add_chart();
    Json(dash.view())
}

async fn close_chart(
    State(state): State<AppState>,
    Path(id): Path<usize>,
) -> ApiResult<DashboardView> {
    let mut dash = state.lock();
    dash.close_chart(id)?;
    Ok(Json(dash.view()))
}

async fn figure(State(state): State<AppState>, Path(id): Path<usize>) -> ApiResult<ChartFigure> {
    Ok(Json(state.lock().figure(id)?))
}

async fn set_series(
    State(state): State<AppState>,
    Path(id): Path<usize>,
    Json(body): Json<SeriesBody>,
) -> ApiResult<ChartFigure> {
    let mut dash = state.lock();
    dash.set_series(id, &body.series)?;
    Ok(Json(dash.figure(id)?))
}

async fn set_size(
    State(state): State<AppState>,
    Path(id): Path<usize>,
    Json(body): Json<SizeBody>,
) -> ApiResult<DashboardView> {
    let mut dash = state.lock();
    dash.set_size(id, body.width, body.height)?;
    Ok(Json(dash.view()))
}

async fn window_action(
    State(state): State<AppState>,
    Path(id): Path<usize>,
    Json(action): Json<WindowAction>,
) -> ApiResult<DashboardView> {
    let mut dash = state.lock();
    dash.window_action(id, &action)?;
    Ok(Json(dash.view()))
}

async fn zoom(
    State(state): State<AppState>,
    Path(id): Path<usize>,
    Json(body): Json<ZoomBody>,
) -> ApiResult<DashboardView> {
    let mut dash = state.lock();
    dash.zoom(id, &body.x0, &body.x1)?;
    Ok(Json(dash.view()))
}

async fn toggle_sync(
    State(state): State<AppState>,
    Path(id): Path<usize>,
) -> ApiResult<DashboardView> {
    let mut dash = state.lock();
    dash.toggle_sync(id)?;
    Ok(Json(dash.view()))
}

async fn load_package(
    State(state): State<AppState>,
    Json(body): Json<PackageBody>,
) -> ApiResult<DashboardView> {
    let mut dash = state.lock();
    dash.load_package(&body.num)?;
    Ok(Json(dash.view()))
}

async fn set_tag(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<TagBody>,
) -> Json<DashboardView> {
    let mut dash = state.lock();
    dash.set_tag_override(&code, &body.nickname, &body.unit);
    Json(dash.view())
}

async fn list_setups(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "setups": state.lock().setup_options() }))
}

async fn save_setup(
    State(state): State<AppState>,
    Json(body): Json<SetupBody>,
) -> ApiResult<SetupReply> {
    let mut dash = state.lock();
    let message = dash.save_setup(&body.name)?;
    Ok(Json(SetupReply {
        message,
        state: dash.view(),
    }))
}

async fn load_setup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<SetupReply> {
    let mut dash = state.lock();
    let message = dash.load_setup(&name)?;
    Ok(Json(SetupReply {
        message,
        state: dash.view(),
    }))
}

async fn delete_setup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<SetupReply> {
    let mut dash = state.lock();
    let message = dash.delete_setup(&name)?;
    Ok(Json(SetupReply {
        message,
        state: dash.view(),
    }))
}
