use crate::auth::{require_writer, Caller};
use crate::database::repositories::{CommentRepository, VoteRepository};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::rate_limit::{Action, RateLimiter};
use crate::utils::SharedClock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Clone)]
pub struct VoteLedger {
    database: Database,
    limiter: RateLimiter,
    clock: SharedClock,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetVoteInput {
    pub value: i64,
}

/// Counters of the comment after the vote was applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteTally {
    pub like_count: i64,
    pub dislike_count: i64,
    pub score: i64,
    pub my_vote: i64,
}

/// Net `(like_delta, dislike_delta)` of replacing `prior` with `next`.
pub fn vote_deltas(prior: i64, next: i64) -> (i64, i64) {
    let likes = |value: i64| i64::from(value == 1);
    let dislikes = |value: i64| i64::from(value == -1);
    (likes(next) - likes(prior), dislikes(next) - dislikes(prior))
}

impl VoteLedger {
    pub fn new(database: Database, limiter: RateLimiter, clock: SharedClock) -> Self {
        Self {
            database,
            limiter,
            clock,
        }
    }

    pub fn set_vote(
        &self,
        item_id: &str,
        comment_id: &str,
        caller: Option<&Caller>,
        input: SetVoteInput,
    ) -> ServiceResult<VoteTally> {
        let caller = require_writer(caller)?;
        let value = input.value;
        if !matches!(value, -1..=1) {
            return Err(ServiceError::invalid("vote must be 1, -1 or 0"));
        }
        self.limiter.check_action(&caller.user_id, Action::SetVote)?;

        let now = self.clock.now_iso();
        let tally = self.database.with_transaction::<_, ServiceError, _>(|repos| {
            let comments = repos.comments();
            let comment = comments.get(item_id, comment_id)?.ok_or_else(|| {
                ServiceError::not_found(format!("comment {comment_id} not found"))
            })?;
            let votes = repos.votes();
            let prior = votes.get(comment_id, &caller.user_id)?.unwrap_or(0);
            if prior == value {
                debug!(comment_id, user_id = %caller.user_id, "vote unchanged");
                return Ok(VoteTally {
                    like_count: comment.like_count,
                    dislike_count: comment.dislike_count,
                    score: comment.score,
                    my_vote: prior,
                });
            }

            let (like_delta, dislike_delta) = vote_deltas(prior, value);
            if value == 0 {
                votes.delete(comment_id, &caller.user_id)?;
            } else {
                votes.upsert(comment_id, &caller.user_id, value, &now)?;
            }
            comments.apply_vote_delta(comment_id, like_delta, dislike_delta)?;
            Ok(VoteTally {
                like_count: comment.like_count + like_delta,
                dislike_count: comment.dislike_count + dislike_delta,
                score: comment.score + (like_delta - dislike_delta),
                my_vote: value,
            })
        })?;

        info!(item_id, comment_id, user_id = %caller.user_id, value, "vote recorded");
        Ok(tally)
    }
}
