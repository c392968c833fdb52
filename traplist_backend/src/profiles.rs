use crate::database::models::ProfileRecord;
use crate::database::repositories::ProfileRepository;
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::utils::SharedClock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Local copy of identity data owned by the identity subsystem.
#[derive(Clone)]
pub struct ProfileService {
    database: Database,
    clock: SharedClock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertProfileInput {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorView {
    pub user_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub is_anonymous: bool,
}

impl AuthorView {
    pub fn from_record(record: ProfileRecord) -> Self {
        Self {
            user_id: record.user_id,
            display_name: record.display_name,
            photo_url: record.photo_url,
            is_anonymous: record.is_anonymous,
        }
    }
}

impl ProfileService {
    pub fn new(database: Database, clock: SharedClock) -> Self {
        Self { database, clock }
    }

    pub fn upsert(&self, user_id: &str, input: UpsertProfileInput) -> ServiceResult<AuthorView> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ServiceError::invalid("user id may not be empty"));
        }
        let record = ProfileRecord {
            user_id: user_id.to_string(),
            display_name: non_blank(input.display_name),
            photo_url: non_blank(input.photo_url),
            is_anonymous: input.is_anonymous,
            updated_at: self.clock.now_iso(),
        };
        self.database
            .with_repositories(|repos| repos.profiles().upsert(&record))?;
        info!(user_id = %record.user_id, "profile cached");
        Ok(AuthorView::from_record(record))
    }

    pub fn get(&self, user_id: &str) -> ServiceResult<AuthorView> {
        let record = self
            .database
            .with_repositories(|repos| repos.profiles().get(user_id))?;
        record
            .map(AuthorView::from_record)
            .ok_or_else(|| ServiceError::not_found(format!("profile {user_id} not found")))
    }
}

/// Profiles for the given authors, keyed by user id. Unknown authors are
/// left out.
pub fn authors_for<R: ProfileRepository>(
    repo: &R,
    author_ids: &[String],
) -> anyhow::Result<HashMap<String, AuthorView>> {
    Ok(repo
        .get_many(author_ids)?
        .into_iter()
        .map(|record| (record.user_id.clone(), AuthorView::from_record(record)))
        .collect())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
