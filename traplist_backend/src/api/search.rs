use super::{caller, ApiJson, ApiQuery, ApiResult, AppState};
use crate::items::ItemView;
use crate::search::SearchFilter;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct SearchResponse {
    items: Vec<ItemView>,
}

pub(crate) async fn search_items(
    State(state): State<AppState>,
    ApiJson(filter): ApiJson<SearchFilter>,
) -> ApiResult<SearchResponse> {
    let items = state.search.search(&filter)?;
    Ok(Json(SearchResponse { items }))
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ReviewQuery {
    text: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
}

pub(crate) async fn review_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(params): ApiQuery<ReviewQuery>,
) -> ApiResult<SearchResponse> {
    let caller = caller(&headers);
    let filter = SearchFilter {
        text: params.text,
        date_from: params.date_from,
        date_to: params.date_to,
        ..Default::default()
    };
    let items = state.search.review_queue(caller.as_ref(), &filter)?;
    Ok(Json(SearchResponse { items }))
}
