use super::{caller, ApiJson, ApiResult, AppState};
use crate::items::{CreateItemInput, ItemView, SetItemStatusInput};
use crate::profiles::{AuthorView, UpsertProfileInput};
use crate::ratings::{RatingAggregate, SetRatingInput};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub(crate) async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub(crate) async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<CreateItemInput>,
) -> Result<(StatusCode, Json<ItemView>), super::ApiError> {
    let caller = caller(&headers);
    let item = state.items.create_item(caller.as_ref(), payload)?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub(crate) async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<ItemView> {
    Ok(Json(state.items.get_item(&item_id)?))
}

pub(crate) async fn set_item_status(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SetItemStatusInput>,
) -> ApiResult<ItemView> {
    let caller = caller(&headers);
    let item = state
        .items
        .set_item_status(&item_id, caller.as_ref(), payload)?;
    Ok(Json(item))
}

pub(crate) async fn set_rating(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SetRatingInput>,
) -> ApiResult<RatingAggregate> {
    let caller = caller(&headers);
    let aggregate = state
        .ratings
        .set_rating(&item_id, caller.as_ref(), payload)?;
    Ok(Json(aggregate))
}

pub(crate) async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<AuthorView> {
    Ok(Json(state.profiles.get(&user_id)?))
}

/// Pushed by the identity subsystem whenever a profile changes.
pub(crate) async fn upsert_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(payload): ApiJson<UpsertProfileInput>,
) -> ApiResult<AuthorView> {
    Ok(Json(state.profiles.upsert(&user_id, payload)?))
}
