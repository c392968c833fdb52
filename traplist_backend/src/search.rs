//! Stateless filter/sort pipeline over item collections.
//!
//! Approved items are pre-filtered in SQL on status and date range before the
//! pipeline runs. The moderation queue has no such index and runs the whole
//! pipeline in memory.

use crate::auth::{require_writer, Caller};
use crate::database::models::{ItemRecord, ItemStatus};
use crate::database::repositories::ItemRepository;
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::items::ItemView;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    S,
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Tier {
    /// Letter for a rounded average on the 0..=6 scale.
    pub fn from_average(average: f64) -> Tier {
        let average = if average.is_nan() { 0.0 } else { average };
        match average.clamp(0.0, 6.0).round() as i64 {
            6 => Tier::S,
            5 => Tier::A,
            4 => Tier::B,
            3 => Tier::C,
            2 => Tier::D,
            1 => Tier::E,
            _ => Tier::F,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::S => "S",
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
            Tier::D => "D",
            Tier::E => "E",
            Tier::F => "F",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier of a rating aggregate. Unrated items have none.
pub fn tier_for(average: f64, count: i64) -> Option<Tier> {
    (count > 0).then(|| Tier::from_average(average))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Date,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Inclusive lower bound, `YYYY-MM-DD`.
    #[serde(default)]
    pub date_from: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`.
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

fn normalize_category(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SearchFilter {
    /// Runs the filters and then the optional sort.
    pub fn apply(&self, items: Vec<ItemRecord>) -> Vec<ItemRecord> {
        let needle = non_empty(&self.text).map(str::to_lowercase);
        let categories: HashSet<String> = self
            .categories
            .iter()
            .map(|c| normalize_category(c))
            .filter(|c| !c.is_empty())
            .collect();

        let mut matched: Vec<ItemRecord> = items
            .into_iter()
            .filter(|item| self.in_date_range(item))
            .filter(|item| needle.as_deref().map_or(true, |n| text_matches(item, n)))
            .filter(|item| {
                categories.is_empty()
                    || item
                        .categories
                        .iter()
                        .any(|c| categories.contains(&normalize_category(c)))
            })
            .filter(|item| {
                self.tiers.is_empty()
                    || tier_for(item.rating_average, item.rating_count)
                        .map_or(false, |tier| self.tiers.contains(&tier))
            })
            .collect();

        if let Some(sort) = self.sort {
            matched.sort_by(|a, b| {
                let ordering = match sort.field {
                    SortField::Date => a.date.cmp(&b.date),
                    SortField::Rating => a
                        .rating_average
                        .partial_cmp(&b.rating_average)
                        .unwrap_or(Ordering::Equal),
                };
                let ordering = ordering.then_with(|| a.id.cmp(&b.id));
                match sort.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        matched
    }

    fn in_date_range(&self, item: &ItemRecord) -> bool {
        let date = item.date.as_str();
        non_empty(&self.date_from).map_or(true, |from| date >= from)
            && non_empty(&self.date_to).map_or(true, |to| date <= to)
    }
}

fn text_matches(item: &ItemRecord, needle: &str) -> bool {
    let hit = |field: &str| field.to_lowercase().contains(needle);
    hit(&item.name)
        || item.creators.iter().any(|c| hit(c))
        || hit(&item.item_type)
        || item.categories.iter().any(|c| hit(c))
}

#[derive(Clone)]
pub struct SearchService {
    database: Database,
}

impl SearchService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Published items matching `filter`.
    pub fn search(&self, filter: &SearchFilter) -> ServiceResult<Vec<ItemView>> {
        let candidates = self.database.with_repositories(|repos| {
            repos.items().list_by_status(
                ItemStatus::Approved,
                non_empty(&filter.date_from),
                non_empty(&filter.date_to),
            )
        })?;
        Ok(filter
            .apply(candidates)
            .into_iter()
            .map(ItemView::from_record)
            .collect())
    }

    /// Items awaiting moderation, filtered entirely in memory.
    pub fn review_queue(
        &self,
        caller: Option<&Caller>,
        filter: &SearchFilter,
    ) -> ServiceResult<Vec<ItemView>> {
        let caller = require_writer(caller)?;
        if !caller.is_moderator {
            return Err(ServiceError::PermissionDenied(
                "the review queue is limited to moderators".into(),
            ));
        }
        let pending = self
            .database
            .with_repositories(|repos| repos.items().list_by_status(ItemStatus::InReview, None, None))?;
        Ok(filter
            .apply(pending)
            .into_iter()
            .map(ItemView::from_record)
            .collect())
    }
}
