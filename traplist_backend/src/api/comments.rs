use super::{caller, ApiJson, ApiQuery, ApiResult, AppState};
use crate::comments::{AddCommentInput, AddCommentResult, CommentPage, EditCommentInput};
use crate::votes::{SetVoteInput, VoteTally};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct ReadCommentsQuery {
    page_size: Option<usize>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OkResponse {
    ok: bool,
}

pub(crate) async fn add_comment(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<AddCommentInput>,
) -> Result<(StatusCode, Json<AddCommentResult>), super::ApiError> {
    let caller = caller(&headers);
    let created = state
        .comments
        .add_comment(&item_id, caller.as_ref(), payload)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(crate) async fn edit_comment(
    State(state): State<AppState>,
    Path((item_id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<EditCommentInput>,
) -> ApiResult<OkResponse> {
    let caller = caller(&headers);
    state
        .comments
        .edit_comment(&item_id, &comment_id, caller.as_ref(), payload)?;
    Ok(Json(OkResponse { ok: true }))
}

pub(crate) async fn delete_comment(
    State(state): State<AppState>,
    Path((item_id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<OkResponse> {
    let caller = caller(&headers);
    state
        .comments
        .soft_delete_comment(&item_id, &comment_id, caller.as_ref())?;
    Ok(Json(OkResponse { ok: true }))
}

pub(crate) async fn set_vote(
    State(state): State<AppState>,
    Path((item_id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SetVoteInput>,
) -> ApiResult<VoteTally> {
    let caller = caller(&headers);
    let tally = state
        .votes
        .set_vote(&item_id, &comment_id, caller.as_ref(), payload)?;
    Ok(Json(tally))
}

pub(crate) async fn read_comments(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    ApiQuery(params): ApiQuery<ReadCommentsQuery>,
    headers: HeaderMap,
) -> ApiResult<CommentPage> {
    let viewer = caller(&headers);
    let page_size = params.page_size.unwrap_or(state.config.default_page_size);
    let page = state.comments.read_comments(
        &item_id,
        page_size,
        params.cursor.as_deref(),
        viewer.as_ref(),
    )?;
    Ok(Json(page))
}
