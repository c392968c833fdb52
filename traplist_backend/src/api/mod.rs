mod comments;
mod items;
mod search;

use crate::auth::Caller;
use crate::comments::CommentService;
use crate::config::TraplistConfig;
use crate::database::Database;
use crate::error::ServiceError;
use crate::items::ItemService;
use crate::profiles::ProfileService;
use crate::rate_limit::RateLimiter;
use crate::ratings::RatingAggregator;
use crate::search::SearchService;
use crate::utils::SharedClock;
use crate::votes::VoteLedger;
use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: TraplistConfig,
    pub database: Database,
    pub comments: CommentService,
    pub votes: VoteLedger,
    pub ratings: RatingAggregator,
    pub items: ItemService,
    pub search: SearchService,
    pub profiles: ProfileService,
}

impl AppState {
    pub fn new(config: TraplistConfig, database: Database, clock: SharedClock) -> Self {
        let limiter = RateLimiter::new(database.clone(), clock.clone(), config.limits.clone());
        Self {
            comments: CommentService::new(database.clone(), limiter.clone(), clock.clone()),
            votes: VoteLedger::new(database.clone(), limiter.clone(), clock.clone()),
            ratings: RatingAggregator::new(database.clone(), limiter, clock.clone()),
            items: ItemService::new(database.clone(), clock.clone()),
            search: SearchService::new(database.clone()),
            profiles: ProfileService::new(database.clone(), clock),
            config,
            database,
        }
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

/// JSON body extractor that rejects malformed input as `INVALID_ARGUMENT`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub(crate) struct ApiJson<T>(pub T);

/// Query string extractor with the same rejection shape as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub(crate) struct ApiQuery<T>(pub T);

pub(crate) fn caller(headers: &HeaderMap) -> Option<Caller> {
    Caller::from_headers(headers)
}

#[derive(Debug)]
pub struct ApiError(ServiceError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        let status = self.status();
        let code = self.0.code();
        let message = match self.0 {
            ServiceError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                "internal server error".to_string()
            }
            ServiceError::Unauthenticated(msg)
            | ServiceError::PermissionDenied(msg)
            | ServiceError::InvalidArgument(msg)
            | ServiceError::NotFound(msg)
            | ServiceError::FailedPrecondition(msg)
            | ServiceError::ResourceExhausted(msg)
            | ServiceError::AlreadyExists(msg) => msg,
        };
        (status, ErrorResponse { code, message })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(ServiceError::InvalidArgument(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(ServiceError::InvalidArgument(rejection.body_text()))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(ServiceError::Internal(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(items::health_handler))
        .route("/items", post(items::create_item))
        .route("/items/search", post(search::search_items))
        .route("/items/review", get(search::review_queue))
        .route("/items/:item_id", get(items::get_item))
        .route("/items/:item_id/status", put(items::set_item_status))
        .route("/items/:item_id/rating", put(items::set_rating))
        .route(
            "/items/:item_id/comments",
            get(comments::read_comments).post(comments::add_comment),
        )
        .route(
            "/items/:item_id/comments/:comment_id",
            put(comments::edit_comment).delete(comments::delete_comment),
        )
        .route(
            "/items/:item_id/comments/:comment_id/vote",
            put(comments::set_vote),
        )
        .route("/profiles/:user_id", get(items::get_profile).put(items::upsert_profile))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Tries to bind to the given port, or finds the next available port
async fn find_available_port(start_port: u16) -> Result<(TcpListener, u16)> {
    const MAX_PORT_ATTEMPTS: u16 = 100;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let port = start_port.saturating_add(offset);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => {
                if offset == 0 {
                    tracing::debug!(port, error = %e, "Port in use, trying next port");
                }
                continue;
            }
        }
    }

    anyhow::bail!(
        "Could not find available port in range {}-{}",
        start_port,
        start_port.saturating_add(MAX_PORT_ATTEMPTS - 1)
    )
}

pub async fn serve_http(config: TraplistConfig, database: Database, clock: SharedClock) -> Result<()> {
    let requested_port = config.api_port;
    let state = AppState::new(config, database, clock);
    let router = router(state);

    let (listener, actual_port) = find_available_port(requested_port).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], actual_port));

    if actual_port != requested_port {
        tracing::warn!(
            requested_port,
            actual_port,
            "Configured port was in use, bound to next available port"
        );
    }

    tracing::info!(?addr, "HTTP server listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
