mod comments;
mod items;
mod profiles;
mod rate_limits;
mod ratings;
mod votes;

use super::models::{
    CommentRecord, CommentStatus, ItemRecord, ItemStatus, ProfileRecord, RateLimitRecord,
};
use anyhow::Result;
use rusqlite::Connection;

/// Keyset position of a root comment in (score DESC, created_at ASC, id ASC)
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPageKey {
    pub score: i64,
    pub created_at: String,
    pub id: String,
}

pub trait ItemRepository {
    fn create(&self, record: &ItemRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<ItemRecord>>;
    fn exists(&self, id: &str) -> Result<bool>;
    /// Items with `status`, optionally restricted to an inclusive date range.
    fn list_by_status(
        &self,
        status: ItemStatus,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Vec<ItemRecord>>;
    fn adjust_comment_count(&self, id: &str, delta: i64) -> Result<()>;
    fn set_rating(&self, id: &str, average: f64, count: i64) -> Result<()>;
    fn set_status(&self, id: &str, status: ItemStatus) -> Result<bool>;
}

pub trait CommentRepository {
    fn create(&self, record: &CommentRecord) -> Result<()>;
    /// Looks a comment up within one item; comments of other items are invisible.
    fn get(&self, item_id: &str, id: &str) -> Result<Option<CommentRecord>>;
    fn update_body(&self, id: &str, body: &str, status: CommentStatus, at: &str) -> Result<()>;
    fn set_status(&self, id: &str, status: CommentStatus, at: &str) -> Result<()>;
    fn record_reply(&self, root_id: &str, at: &str) -> Result<()>;
    fn touch_activity(&self, id: &str, at: &str) -> Result<()>;
    fn apply_vote_delta(&self, id: &str, like_delta: i64, dislike_delta: i64) -> Result<()>;
    /// Non-hidden roots after `after`, best first.
    fn list_roots(
        &self,
        item_id: &str,
        limit: usize,
        after: Option<&RootPageKey>,
    ) -> Result<Vec<CommentRecord>>;
    /// Non-hidden replies belonging to any of `thread_ids`, oldest first.
    fn list_replies(&self, item_id: &str, thread_ids: &[String]) -> Result<Vec<CommentRecord>>;
}

pub trait VoteRepository {
    fn get(&self, comment_id: &str, user_id: &str) -> Result<Option<i64>>;
    fn upsert(&self, comment_id: &str, user_id: &str, value: i64, at: &str) -> Result<()>;
    fn delete(&self, comment_id: &str, user_id: &str) -> Result<()>;
    fn list_for_user(&self, user_id: &str, comment_ids: &[String]) -> Result<Vec<(String, i64)>>;
}

pub trait RatingRepository {
    fn get(&self, item_id: &str, user_id: &str) -> Result<Option<i64>>;
    fn upsert(&self, item_id: &str, user_id: &str, value: i64, at: &str) -> Result<()>;
    fn list_values(&self, item_id: &str) -> Result<Vec<i64>>;
}

pub trait RateLimitRepository {
    fn get(&self, key: &str) -> Result<Option<RateLimitRecord>>;
    fn upsert(&self, record: &RateLimitRecord) -> Result<()>;
}

pub trait ProfileRepository {
    fn upsert(&self, record: &ProfileRecord) -> Result<()>;
    fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>>;
    fn get_many(&self, user_ids: &[String]) -> Result<Vec<ProfileRecord>>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn items(&self) -> impl ItemRepository + '_ {
        items::SqliteItemRepository { conn: self.conn }
    }

    pub fn comments(&self) -> impl CommentRepository + '_ {
        comments::SqliteCommentRepository { conn: self.conn }
    }

    pub fn votes(&self) -> impl VoteRepository + '_ {
        votes::SqliteVoteRepository { conn: self.conn }
    }

    pub fn ratings(&self) -> impl RatingRepository + '_ {
        ratings::SqliteRatingRepository { conn: self.conn }
    }

    pub fn rate_limits(&self) -> impl RateLimitRepository + '_ {
        rate_limits::SqliteRateLimitRepository { conn: self.conn }
    }

    pub fn profiles(&self) -> impl ProfileRepository + '_ {
        profiles::SqliteProfileRepository { conn: self.conn }
    }
}

/// Builds `?N, ?N+1, ...` placeholders for an IN clause starting at `first`.
pub(super) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ")
}
