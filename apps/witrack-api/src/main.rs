use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, LOCATION};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;
use witrack_kernel::{KernelBuilder, TrackerQueryConfig, WitKernel};
use witrack_protocol::{IdentityId, TrackerQueryId, WitError, WorkItemId};

mod jsonapi;
mod seed;

use crate::jsonapi::{
    CreateTrackerQueryData, Document, EventResource, TrackerQueryResource, tracker_query_href,
};

const IDENTITY_HEADER: &str = "x-identity";

#[derive(Debug, Parser)]
#[command(name = "witrack-api")]
#[command(about = "Work item tracker API")]
struct Cli {
    #[arg(long, default_value = ".witrack")]
    root: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8788")]
    listen: SocketAddr,
    #[arg(
        long,
        env = "WITRACK_GITHUB_AUTH_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    github_auth_token: String,
    #[arg(
        long,
        env = "WITRACK_CACHE_CONTROL_TRACKER_QUERIES",
        default_value = "max-age=300"
    )]
    cache_control_tracker_queries: String,
}

impl Cli {
    fn tracker_query_config(&self) -> TrackerQueryConfig {
        TrackerQueryConfig {
            github_auth_token: self.github_auth_token.clone(),
            cache_control_tracker_queries: self.cache_control_tracker_queries.clone(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    kernel: WitKernel,
}

#[derive(Debug, Deserialize, Default)]
struct DeleteTrackerQueryParams {
    #[serde(default)]
    delete_wi: bool,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl From<WitError> for ApiError {
    fn from(error: WitError) -> Self {
        let status = match error.cause() {
            WitError::NotFound { .. } => StatusCode::NOT_FOUND,
            WitError::BadParameter { .. } => StatusCode::BAD_REQUEST,
            WitError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WitError::Forbidden(_) => StatusCode::FORBIDDEN,
            WitError::UnknownFieldType(_)
            | WitError::Cancelled
            | WitError::Internal(_)
            | WitError::Context { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(%error, "request failed");
        }
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let kernel = KernelBuilder::new(&cli.root)
        .config(cli.tracker_query_config())
        .build()
        .await?;
    kernel.start_scheduler().await;

    let app = router(AppState {
        kernel: kernel.clone(),
    });

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, root = %cli.root.display(), "witrack-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    kernel.shutdown();
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/workitems/{work_item_id}/events", get(list_events))
        .route("/trackerqueries", post(create_tracker_query))
        .route(
            "/trackerqueries/{query_id}",
            get(show_tracker_query).delete(delete_tracker_query),
        )
        .merge(seed::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "witrack-api"
    }))
}

async fn list_events(
    Path(work_item_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Document<Vec<EventResource>>>> {
    let work_item_id = WorkItemId(parse_uuid("work item", &work_item_id)?);
    let events = state.kernel.list_events(work_item_id).await?;
    Ok(Json(Document {
        data: events.into_iter().map(EventResource::from).collect(),
    }))
}

async fn create_tracker_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(document): Json<Document<CreateTrackerQueryData>>,
) -> ApiResult<Response> {
    let identity = identity_from_headers(&headers)?;
    let query = state
        .kernel
        .tracker_queries()
        .create(identity, document.data.into())
        .await?;

    let location = HeaderValue::from_str(&tracker_query_href(query.id))
        .map_err(|error| ApiError::from(WitError::Internal(format!("invalid location: {error}"))))?;
    let body = Document {
        data: TrackerQueryResource::from(query),
    };
    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(body)).into_response())
}

async fn show_tracker_query(
    Path(query_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let query_id = TrackerQueryId(parse_uuid("tracker query", &query_id)?);
    let tracker_queries = state.kernel.tracker_queries();
    let query = tracker_queries.show(query_id).await?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&tracker_queries.config().cache_control_tracker_queries)
    {
        headers.insert(CACHE_CONTROL, value);
    }
    let body = Document {
        data: TrackerQueryResource::from(query),
    };
    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

async fn delete_tracker_query(
    Path(query_id): Path<String>,
    Query(params): Query<DeleteTrackerQueryParams>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let query_id = TrackerQueryId(parse_uuid("tracker query", &query_id)?);
    let identity = identity_from_headers(&headers)?;
    state
        .kernel
        .tracker_queries()
        .delete(identity, query_id, params.delete_wi)
        .await?;
    Ok(StatusCode::OK)
}

fn parse_uuid(entity: &str, raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|error| ApiError::bad_request(format!("invalid {entity} id: {error}")))
}

/// The caller identity, `None` when the header is absent.
fn identity_from_headers(headers: &HeaderMap) -> ApiResult<Option<IdentityId>> {
    let Some(raw) = headers.get(IDENTITY_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .map(|uuid| Some(IdentityId(uuid)))
        .ok_or_else(|| ApiError::unauthorized(format!("invalid {IDENTITY_HEADER} header")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
