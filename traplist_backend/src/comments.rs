//! Two-level comment threads with running counters.
//!
//! Roots have `depth = 0` and are their own thread. Every reply has
//! `depth = 1` and points at the thread root through both `parent_id` and
//! `thread_id`; replying to a reply attaches to that reply's root.

use crate::auth::{require_writer, Caller};
use crate::config::MAX_PAGE_SIZE;
use crate::database::models::{CommentRecord, CommentStatus};
use crate::database::repositories::{
    CommentRepository, ItemRepository, RootPageKey, VoteRepository,
};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::profiles::{authors_for, AuthorView};
use crate::rate_limit::{Action, RateLimiter};
use crate::utils::SharedClock;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

pub const MAX_BODY_CHARS: usize = 2000;

#[derive(Clone)]
pub struct CommentService {
    database: Database,
    limiter: RateLimiter,
    clock: SharedClock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCommentInput {
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddCommentResult {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditCommentInput {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommentView {
    pub id: String,
    pub item_id: String,
    pub author_id: String,
    /// Withheld for deleted comments.
    pub body: Option<String>,
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

impl CommentView {
    pub fn from_record(record: CommentRecord) -> Self {
        let body = match record.status {
            CommentStatus::Deleted | CommentStatus::Hidden => None,
            CommentStatus::Visible | CommentStatus::Edited => Some(record.body),
        };
        Self {
            id: record.id,
            item_id: record.item_id,
            author_id: record.author_id,
            body,
            created_at: record.created_at,
            last_activity_at: record.last_activity_at,
            parent_id: record.parent_id,
            thread_id: record.thread_id,
            depth: record.depth,
            reply_count: record.reply_count,
            like_count: record.like_count,
            dislike_count: record.dislike_count,
            score: record.score,
            status: record.status,
        }
    }
}

/// One page of roots plus every reply of those roots. `ids` lists each root
/// directly followed by its replies.
#[derive(Debug, Clone, Serialize)]
pub struct CommentPage {
    pub ids: Vec<String>,
    pub by_id: HashMap<String, CommentView>,
    pub has_more: bool,
    pub cursor: Option<String>,
    pub authors: HashMap<String, AuthorView>,
    /// The viewer's own votes on comments in this page.
    pub my_votes: HashMap<String, i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    s: i64,
    c: String,
    i: String,
}

pub fn encode_cursor(key: &RootPageKey) -> String {
    let payload = CursorPayload {
        s: key.score,
        c: key.created_at.clone(),
        i: key.id.clone(),
    };
    // Serializing three plain fields cannot fail.
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

pub fn decode_cursor(raw: &str) -> ServiceResult<RootPageKey> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw.trim())
        .map_err(|_| ServiceError::invalid("malformed cursor"))?;
    let payload: CursorPayload =
        serde_json::from_slice(&bytes).map_err(|_| ServiceError::invalid("malformed cursor"))?;
    Ok(RootPageKey {
        score: payload.s,
        created_at: payload.c,
        id: payload.i,
    })
}

/// Trims and length-checks a comment body.
pub fn validate_body(raw: &str) -> ServiceResult<String> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars == 0 {
        return Err(ServiceError::invalid("comment body may not be empty"));
    }
    if chars > MAX_BODY_CHARS {
        return Err(ServiceError::invalid(format!(
            "comment body exceeds {MAX_BODY_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

impl CommentService {
    pub fn new(database: Database, limiter: RateLimiter, clock: SharedClock) -> Self {
        Self {
            database,
            limiter,
            clock,
        }
    }

    pub fn add_comment(
        &self,
        item_id: &str,
        caller: Option<&Caller>,
        input: AddCommentInput,
    ) -> ServiceResult<AddCommentResult> {
        let caller = require_writer(caller)?;
        let body = validate_body(&input.body)?;
        let parent_id = input
            .parent_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self.limiter
            .check_action(&caller.user_id, Action::AddComment)?;

        let now = self.clock.now_iso();
        let id = Uuid::new_v4().to_string();
        let result = self.database.with_transaction(|repos| {
            if !repos.items().exists(item_id)? {
                return Err(ServiceError::not_found(format!("item {item_id} not found")));
            }
            let comments = repos.comments();
            let (thread_id, depth) = match parent_id.as_deref() {
                Some(parent_id) => {
                    let parent = comments.get(item_id, parent_id)?.ok_or_else(|| {
                        ServiceError::not_found(format!("comment {parent_id} not found"))
                    })?;
                    if !parent.status.is_active() {
                        return Err(ServiceError::FailedPrecondition(
                            "cannot reply to a deleted or hidden comment".into(),
                        ));
                    }
                    let root = if parent.depth == 0 {
                        parent.id
                    } else {
                        parent.thread_id
                    };
                    (root, 1u8)
                }
                None => (id.clone(), 0u8),
            };

            comments.create(&CommentRecord {
                id: id.clone(),
                item_id: item_id.to_string(),
                author_id: caller.user_id.clone(),
                body,
                created_at: now.clone(),
                last_activity_at: now.clone(),
                parent_id: (depth == 1).then(|| thread_id.clone()),
                thread_id: thread_id.clone(),
                depth,
                reply_count: 0,
                like_count: 0,
                dislike_count: 0,
                score: 0,
                status: CommentStatus::Visible,
            })?;
            if depth == 1 {
                comments.record_reply(&thread_id, &now)?;
            }
            repos.items().adjust_comment_count(item_id, 1)?;
            Ok(AddCommentResult {
                id: id.clone(),
                thread_id,
            })
        })?;

        info!(
            item_id,
            comment_id = %result.id,
            thread_id = %result.thread_id,
            user_id = %caller.user_id,
            "comment added"
        );
        Ok(result)
    }

    pub fn edit_comment(
        &self,
        item_id: &str,
        comment_id: &str,
        caller: Option<&Caller>,
        input: EditCommentInput,
    ) -> ServiceResult<()> {
        let caller = require_writer(caller)?;
        let body = validate_body(&input.body)?;
        self.limiter
            .check_action(&caller.user_id, Action::EditComment)?;

        let now = self.clock.now_iso();
        self.database.with_transaction(|repos| {
            let comments = repos.comments();
            let existing = comments.get(item_id, comment_id)?.ok_or_else(|| {
                ServiceError::not_found(format!("comment {comment_id} not found"))
            })?;
            if existing.author_id != caller.user_id {
                return Err(ServiceError::PermissionDenied(
                    "only the author may edit this comment".into(),
                ));
            }
            if !existing.status.is_active() {
                return Err(ServiceError::FailedPrecondition(
                    "deleted comments cannot be edited".into(),
                ));
            }
            comments.update_body(comment_id, &body, CommentStatus::Edited, &now)?;
            if existing.depth == 1 {
                comments.touch_activity(&existing.thread_id, &now)?;
            }
            Ok(())
        })?;

        info!(item_id, comment_id, user_id = %caller.user_id, "comment edited");
        Ok(())
    }

    pub fn soft_delete_comment(
        &self,
        item_id: &str,
        comment_id: &str,
        caller: Option<&Caller>,
    ) -> ServiceResult<()> {
        let caller = require_writer(caller)?;
        self.limiter
            .check_action(&caller.user_id, Action::DeleteComment)?;

        let now = self.clock.now_iso();
        self.database.with_transaction(|repos| {
            let comments = repos.comments();
            let existing = comments.get(item_id, comment_id)?.ok_or_else(|| {
                ServiceError::not_found(format!("comment {comment_id} not found"))
            })?;
            if existing.author_id != caller.user_id && !caller.is_moderator {
                return Err(ServiceError::PermissionDenied(
                    "only the author or a moderator may delete this comment".into(),
                ));
            }
            if !existing.status.is_active() {
                return Ok(());
            }
            comments.set_status(comment_id, CommentStatus::Deleted, &now)?;
            if existing.depth == 1 {
                comments.touch_activity(&existing.thread_id, &now)?;
            }
            Ok(())
        })?;

        info!(
            item_id,
            comment_id,
            user_id = %caller.user_id,
            moderator = caller.is_moderator,
            "comment deleted"
        );
        Ok(())
    }

    pub fn read_comments(
        &self,
        item_id: &str,
        page_size: usize,
        cursor: Option<&str>,
        viewer: Option<&Caller>,
    ) -> ServiceResult<CommentPage> {
        if page_size == 0 {
            return Err(ServiceError::invalid("page_size must be positive"));
        }
        let page_size = page_size.min(MAX_PAGE_SIZE);
        let after = cursor
            .filter(|raw| !raw.trim().is_empty())
            .map(decode_cursor)
            .transpose()?;

        self.database.with_repositories(|repos| {
            if !repos.items().exists(item_id)? {
                return Err(ServiceError::not_found(format!("item {item_id} not found")));
            }
            let comments = repos.comments();
            let roots = comments.list_roots(item_id, page_size, after.as_ref())?;
            let has_more = roots.len() == page_size;
            let cursor = if has_more {
                roots.last().map(|last| {
                    encode_cursor(&RootPageKey {
                        score: last.score,
                        created_at: last.created_at.clone(),
                        id: last.id.clone(),
                    })
                })
            } else {
                None
            };

            let root_ids: Vec<String> = roots.iter().map(|root| root.id.clone()).collect();
            let mut replies_by_thread: HashMap<String, Vec<CommentRecord>> = HashMap::new();
            for reply in comments.list_replies(item_id, &root_ids)? {
                replies_by_thread
                    .entry(reply.thread_id.clone())
                    .or_default()
                    .push(reply);
            }

            let mut ids = Vec::new();
            let mut by_id = HashMap::new();
            let mut author_ids: Vec<String> = Vec::new();
            for root in roots {
                let replies = replies_by_thread.remove(&root.id).unwrap_or_default();
                for record in std::iter::once(root).chain(replies) {
                    if !author_ids.contains(&record.author_id) {
                        author_ids.push(record.author_id.clone());
                    }
                    ids.push(record.id.clone());
                    by_id.insert(record.id.clone(), CommentView::from_record(record));
                }
            }

            let authors = authors_for(&repos.profiles(), &author_ids)?;
            let my_votes = match viewer {
                Some(viewer) => repos
                    .votes()
                    .list_for_user(&viewer.user_id, &ids)?
                    .into_iter()
                    .collect(),
                None => HashMap::new(),
            };

            Ok(CommentPage {
                ids,
                by_id,
                has_more,
                cursor,
                authors,
                my_votes,
            })
        })
    }
}
