use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Visible,
    Edited,
    Deleted,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: String,
    pub item_id: String,
    pub author_id: String,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: String,
    pub last_activity_at: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub thread_id: String,
    pub depth: u8,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub dislike_count: i64,
    #[serde(default)]
    pub score: i64,
    pub status: CommentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorView {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPage {
    pub ids: Vec<String>,
    pub by_id: HashMap<String, CommentView>,
    pub has_more: bool,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub authors: HashMap<String, AuthorView>,
    #[serde(default)]
    pub my_votes: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentRequest {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCommentResponse {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditCommentRequest {
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteRequest {
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub like_count: i64,
    pub dislike_count: i64,
    pub score: i64,
    pub my_vote: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatingRequest {
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub average: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub date: String,
    pub status: String,
    #[serde(default)]
    pub comment_count: i64,
    pub rating: RatingAggregate,
    #[serde(default)]
    pub tier: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Date,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

/// Search payload. Field order is fixed, so its JSON form doubles as a cache
/// key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub items: Vec<ItemView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
