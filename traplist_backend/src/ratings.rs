use crate::auth::{require_writer, Caller};
use crate::database::repositories::{ItemRepository, RatingRepository};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::rate_limit::{Action, RateLimiter};
use crate::utils::SharedClock;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MAX_RATING: i64 = 6;

#[derive(Clone)]
pub struct RatingAggregator {
    database: Database,
    limiter: RateLimiter,
    clock: SharedClock,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetRatingInput {
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RatingAggregate {
    pub average: f64,
    pub count: i64,
}

/// Folds one user's rating into a running `{average, count}`.
///
/// `prior` is the user's previous value, if any. A prior value against a
/// non-positive count means the aggregate was corrupted; it restarts from the
/// new value alone.
pub fn fold_rating(current: RatingAggregate, prior: Option<i64>, value: i64) -> RatingAggregate {
    let value_f = value as f64;
    match prior {
        None => {
            let count = current.count.max(0) + 1;
            let total = current.average * current.count.max(0) as f64 + value_f;
            RatingAggregate {
                average: total / count as f64,
                count,
            }
        }
        Some(_) if current.count <= 0 => RatingAggregate {
            average: value_f,
            count: 1,
        },
        Some(old) if old == value => current,
        Some(old) => {
            let total = current.average * current.count as f64 - old as f64 + value_f;
            RatingAggregate {
                average: total / current.count as f64,
                count: current.count,
            }
        }
    }
}

impl RatingAggregator {
    pub fn new(database: Database, limiter: RateLimiter, clock: SharedClock) -> Self {
        Self {
            database,
            limiter,
            clock,
        }
    }

    pub fn set_rating(
        &self,
        item_id: &str,
        caller: Option<&Caller>,
        input: SetRatingInput,
    ) -> ServiceResult<RatingAggregate> {
        let caller = require_writer(caller)?;
        let value = input.value;
        if !(0..=MAX_RATING).contains(&value) {
            return Err(ServiceError::invalid(format!(
                "rating must be between 0 and {MAX_RATING}"
            )));
        }
        self.limiter
            .check_action(&caller.user_id, Action::SetRating)?;

        let now = self.clock.now_iso();
        let aggregate = self.database.with_transaction::<_, ServiceError, _>(|repos| {
            let items = repos.items();
            let item = items
                .get(item_id)?
                .ok_or_else(|| ServiceError::not_found(format!("item {item_id} not found")))?;
            let current = RatingAggregate {
                average: item.rating_average,
                count: item.rating_count,
            };
            let ratings = repos.ratings();
            let prior = ratings.get(item_id, &caller.user_id)?;
            if prior == Some(value) && current.count > 0 {
                return Ok(current);
            }
            let next = fold_rating(current, prior, value);
            ratings.upsert(item_id, &caller.user_id, value, &now)?;
            items.set_rating(item_id, next.average, next.count)?;
            Ok(next)
        })?;

        info!(
            item_id,
            user_id = %caller.user_id,
            value,
            average = aggregate.average,
            count = aggregate.count,
            "rating recorded"
        );
        Ok(aggregate)
    }

    pub fn get_rating(&self, item_id: &str) -> ServiceResult<RatingAggregate> {
        let item = self
            .database
            .with_repositories(|repos| repos.items().get(item_id))?;
        item.map(|item| RatingAggregate {
            average: item.rating_average,
            count: item.rating_count,
        })
        .ok_or_else(|| ServiceError::not_found(format!("item {item_id} not found")))
    }
}
