use crate::auth::{require_writer, Caller};
use crate::database::models::{ItemRecord, ItemStatus};
use crate::database::repositories::ItemRepository;
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::ratings::RatingAggregate;
use crate::search::tier_for;
use crate::utils::SharedClock;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct ItemService {
    database: Database,
    clock: SharedClock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetItemStatusInput {
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub creators: Vec<String>,
    pub item_type: String,
    pub categories: Vec<String>,
    pub date: String,
    pub status: ItemStatus,
    pub comment_count: i64,
    pub rating: RatingAggregate,
    /// Letter grade of the average; absent while unrated.
    pub tier: Option<String>,
    pub created_at: String,
}

impl ItemView {
    pub fn from_record(record: ItemRecord) -> Self {
        let tier = tier_for(record.rating_average, record.rating_count).map(|tier| tier.to_string());
        Self {
            id: record.id,
            name: record.name,
            creators: record.creators,
            item_type: record.item_type,
            categories: record.categories,
            date: record.date,
            status: record.status,
            comment_count: record.comment_count,
            rating: RatingAggregate {
                average: record.rating_average,
                count: record.rating_count,
            },
            tier,
            created_at: record.created_at,
        }
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

impl ItemService {
    pub fn new(database: Database, clock: SharedClock) -> Self {
        Self { database, clock }
    }

    /// Registers a submitted item. Moderator submissions are published
    /// directly; everything else waits in review.
    pub fn create_item(
        &self,
        caller: Option<&Caller>,
        input: CreateItemInput,
    ) -> ServiceResult<ItemView> {
        let caller = require_writer(caller)?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::invalid("item name may not be empty"));
        }
        let date = input.date.trim().to_string();
        if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
            return Err(ServiceError::invalid("date must be formatted YYYY-MM-DD"));
        }
        let id = match input.id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        let status = if caller.is_moderator {
            ItemStatus::Approved
        } else {
            ItemStatus::InReview
        };
        let record = ItemRecord {
            id,
            name,
            creators: clean_list(input.creators),
            item_type: input.item_type.trim().to_string(),
            categories: clean_list(input.categories),
            date,
            status,
            comment_count: 0,
            rating_average: 0.0,
            rating_count: 0,
            created_at: self.clock.now_iso(),
        };

        self.database.with_transaction(|repos| {
            let items = repos.items();
            if items.exists(&record.id)? {
                return Err(ServiceError::AlreadyExists(format!(
                    "item {} already exists",
                    record.id
                )));
            }
            items.create(&record)?;
            Ok(())
        })?;

        info!(item_id = %record.id, user_id = %caller.user_id, status = record.status.as_str(), "item registered");
        Ok(ItemView::from_record(record))
    }

    pub fn get_item(&self, item_id: &str) -> ServiceResult<ItemView> {
        let record = self
            .database
            .with_repositories(|repos| repos.items().get(item_id))?;
        record
            .map(ItemView::from_record)
            .ok_or_else(|| ServiceError::not_found(format!("item {item_id} not found")))
    }

    pub fn set_item_status(
        &self,
        item_id: &str,
        caller: Option<&Caller>,
        input: SetItemStatusInput,
    ) -> ServiceResult<ItemView> {
        let caller = require_writer(caller)?;
        if !caller.is_moderator {
            return Err(ServiceError::PermissionDenied(
                "only moderators may change item status".into(),
            ));
        }
        let record = self.database.with_transaction(|repos| {
            let items = repos.items();
            if !items.set_status(item_id, input.status)? {
                return Err(ServiceError::not_found(format!("item {item_id} not found")));
            }
            items
                .get(item_id)?
                .ok_or_else(|| ServiceError::not_found(format!("item {item_id} not found")))
        })?;
        info!(item_id, status = input.status.as_str(), moderator = %caller.user_id, "item status changed");
        Ok(ItemView::from_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::system_clock;

    fn service() -> ItemService {
        ItemService::new(Database::open_in_memory().unwrap(), system_clock())
    }

    fn input(id: Option<&str>) -> CreateItemInput {
        CreateItemInput {
            id: id.map(str::to_string),
            name: " Bucket Trap ".into(),
            creators: vec!["  ".into(), "Jo".into()],
            item_type: "container".into(),
            categories: vec!["Rodent".into()],
            date: "2024-02-29".into(),
        }
    }

    #[test]
    fn submissions_wait_in_review_unless_moderator() {
        let service = service();
        let user_item = service
            .create_item(Some(&Caller::user("u-1")), input(Some("bucket")))
            .unwrap();
        assert_eq!(user_item.status, ItemStatus::InReview);
        assert_eq!(user_item.name, "Bucket Trap");
        assert_eq!(user_item.creators, vec!["Jo".to_string()]);
        assert_eq!(user_item.tier, None);

        let mod_item = service
            .create_item(Some(&Caller::moderator("m-1")), input(None))
            .unwrap();
        assert_eq!(mod_item.status, ItemStatus::Approved);
    }

    #[test]
    fn duplicate_id_already_exists() {
        let service = service();
        let caller = Caller::user("u-1");
        service.create_item(Some(&caller), input(Some("dup"))).unwrap();
        assert!(matches!(
            service.create_item(Some(&caller), input(Some("dup"))),
            Err(ServiceError::AlreadyExists(_))
        ));
    }

    #[test]
    fn bad_date_is_invalid() {
        let service = service();
        let mut bad = input(None);
        bad.date = "2024-13-01".into();
        assert!(matches!(
            service.create_item(Some(&Caller::user("u-1")), bad),
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn only_moderators_change_status() {
        let service = service();
        service
            .create_item(Some(&Caller::user("u-1")), input(Some("bucket")))
            .unwrap();
        let approve = || SetItemStatusInput {
            status: ItemStatus::Approved,
        };
        assert!(matches!(
            service.set_item_status("bucket", Some(&Caller::user("u-1")), approve()),
            Err(ServiceError::PermissionDenied(_))
        ));
        let approved = service
            .set_item_status("bucket", Some(&Caller::moderator("m-1")), approve())
            .unwrap();
        assert_eq!(approved.status, ItemStatus::Approved);
        assert_eq!(service.get_item("bucket").unwrap().status, ItemStatus::Approved);
        assert!(matches!(
            service.set_item_status("ghost", Some(&Caller::moderator("m-1")), approve()),
            Err(ServiceError::NotFound(_))
        ));
    }
}
