use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Approved,
    InReview,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Approved => "approved",
            ItemStatus::InReview => "in_review",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "approved" => Some(ItemStatus::Approved),
            "in_review" => Some(ItemStatus::InReview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Visible,
    Edited,
    Deleted,
    Hidden,
}

impl CommentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentStatus::Visible => "visible",
            CommentStatus::Edited => "edited",
            CommentStatus::Deleted => "deleted",
            CommentStatus::Hidden => "hidden",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "visible" => Some(CommentStatus::Visible),
            "edited" => Some(CommentStatus::Edited),
            "deleted" => Some(CommentStatus::Deleted),
            "hidden" => Some(CommentStatus::Hidden),
            _ => None,
        }
    }

    /// Active comments accept replies and edits.
    pub fn is_active(self) -> bool {
        matches!(self, CommentStatus::Visible | CommentStatus::Edited)
    }
}

macro_rules! sql_text_enum {
    ($ty:ty, $label:literal) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                <$ty>::parse(raw).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} '{raw}'", $label).into())
                })
            }
        }
    };
}

sql_text_enum!(ItemStatus, "item status");
sql_text_enum!(CommentStatus, "comment status");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    pub creators: Vec<String>,
    pub item_type: String,
    pub categories: Vec<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    pub status: ItemStatus,
    pub comment_count: i64,
    pub rating_average: f64,
    pub rating_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentRecord {
    pub id: String,
    pub item_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: String,
    pub last_activity_at: String,
    pub parent_id: Option<String>,
    pub thread_id: String,
    pub depth: u8,
    pub reply_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub score: i64,
    pub status: CommentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub key: String,
    pub user_id: String,
    pub action: String,
    pub window_start: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRecord {
    pub user_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub is_anonymous: bool,
    pub updated_at: String,
}
