//! Fixed-window, per-user, per-action request counter.
//!
//! Each `(user, action, window_start)` triple owns one row in `rate_limits`.
//! Rows are never cleaned up here; stale windows are simply never read again.

use crate::config::{ActionLimit, RateLimitConfig};
use crate::database::models::RateLimitRecord;
use crate::database::repositories::{RateLimitRepository, SqliteRepositories};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::utils::SharedClock;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddComment,
    EditComment,
    DeleteComment,
    SetVote,
    SetRating,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::AddComment => "add_comment",
            Action::EditComment => "edit_comment",
            Action::DeleteComment => "delete_comment",
            Action::SetVote => "set_vote",
            Action::SetRating => "set_rating",
        }
    }

    pub fn limit(self, config: &RateLimitConfig) -> ActionLimit {
        match self {
            Action::AddComment => config.add_comment,
            Action::EditComment => config.edit_comment,
            Action::DeleteComment => config.delete_comment,
            Action::SetVote => config.set_vote,
            Action::SetRating => config.set_rating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub remaining: u32,
    /// Epoch milliseconds at which the current window closes.
    pub reset_at: i64,
}

pub fn window_start(now_ms: i64, window_ms: i64) -> i64 {
    now_ms.div_euclid(window_ms) * window_ms
}

pub fn window_key(user_id: &str, action: &str, window_start: i64) -> String {
    format!("{user_id}_{action}_{window_start}")
}

#[derive(Clone)]
pub struct RateLimiter {
    database: Database,
    clock: SharedClock,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(database: Database, clock: SharedClock, config: RateLimitConfig) -> Self {
        Self {
            database,
            clock,
            config,
        }
    }

    /// Charges one request against the configured budget for `action`.
    pub fn check_action(&self, user_id: &str, action: Action) -> ServiceResult<RateLimitDecision> {
        self.check(user_id, action.as_str(), action.limit(&self.config))
    }

    pub fn check(
        &self,
        user_id: &str,
        action: &str,
        limit: ActionLimit,
    ) -> ServiceResult<RateLimitDecision> {
        let window_ms = (limit.window_seconds as i64).saturating_mul(1000).max(1);
        let now_ms = self.clock.now().timestamp_millis();
        let start = window_start(now_ms, window_ms);
        let key = window_key(user_id, action, start);

        self.database
            .with_transaction(|repos| charge(&repos, &key, user_id, action, start, limit))
            .map(|remaining| RateLimitDecision {
                remaining,
                reset_at: start + window_ms,
            })
    }
}

fn charge(
    repos: &SqliteRepositories<'_>,
    key: &str,
    user_id: &str,
    action: &str,
    window_start: i64,
    limit: ActionLimit,
) -> ServiceResult<u32> {
    let store = repos.rate_limits();
    let count = store.get(key)?.map(|record| record.count).unwrap_or(0);
    let next = count + 1;
    if next > i64::from(limit.limit) {
        warn!(user_id, action, limit = limit.limit, "rate limit exceeded");
        return Err(ServiceError::ResourceExhausted(format!(
            "too many {action} requests; try again later"
        )));
    }
    store.upsert(&RateLimitRecord {
        key: key.to_string(),
        user_id: user_id.to_string(),
        action: action.to_string(),
        window_start,
        count: next,
    })?;
    Ok((i64::from(limit.limit) - next).max(0) as u32)
}
