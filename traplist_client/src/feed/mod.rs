//! Local comment cache with optimistic mutations.
//!
//! Comments live in a flat arena (`by_id`) with two ordered id lists: the
//! roots in server order and, per root, its replies oldest first. Every
//! optimistic change is recorded as a pending mutation and later either
//! committed or rolled back when the server answers.

pub mod messages;
pub mod tasks;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ClientError;
use crate::models::{
    AddCommentResponse, AuthorView, CommentPage, CommentStatus, CommentView, VoteTally,
};

pub use messages::{FeedMessage, ItemMessage};

pub const TEMP_ID_PREFIX: &str = "temp-";
/// Same limit the server applies to comment bodies, in characters.
pub const MAX_BODY_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("comment {0} is not loaded")]
    UnknownComment(String),
    #[error("comment {0} has not been confirmed by the server yet")]
    NotYetCommitted(String),
    #[error("comment {0} is not active")]
    Inactive(String),
    #[error("mutation {0:?} is not pending")]
    NotPending(MutationId),
    #[error("comment body may not be empty")]
    EmptyBody,
    #[error("comment body exceeds {MAX_BODY_CHARS} characters")]
    BodyTooLong,
}

/// Issued for every read; only the newest ticket's response is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTicket {
    pub seq: u64,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTicket {
    pub mutation: MutationId,
    pub temp_id: String,
    /// Thread root the server should attach the reply to.
    pub parent_id: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone)]
enum Mutation {
    Add {
        temp_id: String,
        root_id: Option<String>,
    },
    Vote {
        comment_id: String,
        prior: i64,
        like_delta: i64,
        dislike_delta: i64,
    },
    Content {
        comment_id: String,
        snapshot: CommentView,
    },
}

impl Mutation {
    fn vote_target(&self) -> Option<&str> {
        match self {
            Mutation::Vote { comment_id, .. } => Some(comment_id),
            _ => None,
        }
    }

    fn content_target(&self) -> Option<&str> {
        match self {
            Mutation::Content { comment_id, .. } => Some(comment_id),
            _ => None,
        }
    }
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Server ordering of roots: score descending, then oldest first, then id.
pub fn compare_roots(a: &CommentView, b: &CommentView) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Trims `raw` and checks it against the server's body rules.
pub fn validate_body(raw: &str) -> Result<String, FeedError> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars == 0 {
        return Err(FeedError::EmptyBody);
    }
    if chars > MAX_BODY_CHARS {
        return Err(FeedError::BodyTooLong);
    }
    Ok(trimmed.to_string())
}

fn vote_deltas(prior: i64, next: i64) -> (i64, i64) {
    let likes = |value: i64| i64::from(value == 1);
    let dislikes = |value: i64| i64::from(value == -1);
    (likes(next) - likes(prior), dislikes(next) - dislikes(prior))
}

pub struct CommentFeed {
    item_id: String,
    author_id: String,
    by_id: HashMap<String, CommentView>,
    root_order: Vec<String>,
    thread_replies: HashMap<String, Vec<String>>,
    my_votes: HashMap<String, i64>,
    authors: HashMap<String, AuthorView>,
    comment_count: i64,
    cursor: Option<String>,
    has_more: bool,
    pages_loaded: usize,
    read_seq: u64,
    next_mutation: u64,
    pending: BTreeMap<MutationId, Mutation>,
    settled: HashMap<MutationId, MutationState>,
    /// Newest committed mutation per comment, for votes and content changes.
    committed_vote: HashMap<String, MutationId>,
    committed_content: HashMap<String, MutationId>,
}

impl CommentFeed {
    /// `author_id` is the signed-in user whose optimistic comments this feed
    /// synthesizes.
    pub fn new(item_id: impl Into<String>, author_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            author_id: author_id.into(),
            by_id: HashMap::new(),
            root_order: Vec::new(),
            thread_replies: HashMap::new(),
            my_votes: HashMap::new(),
            authors: HashMap::new(),
            comment_count: 0,
            cursor: None,
            has_more: true,
            pages_loaded: 0,
            read_seq: 0,
            next_mutation: 0,
            pending: BTreeMap::new(),
            settled: HashMap::new(),
            committed_vote: HashMap::new(),
            committed_content: HashMap::new(),
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn comment(&self, id: &str) -> Option<&CommentView> {
        self.by_id.get(id)
    }

    pub fn root_order(&self) -> &[String] {
        &self.root_order
    }

    pub fn replies(&self, root_id: &str) -> &[String] {
        self.thread_replies
            .get(root_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Each root followed by its replies.
    pub fn display_order(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.by_id.len());
        for root in &self.root_order {
            ids.push(root.clone());
            ids.extend(self.replies(root).iter().cloned());
        }
        ids
    }

    pub fn my_vote(&self, comment_id: &str) -> i64 {
        self.my_votes.get(comment_id).copied().unwrap_or(0)
    }

    pub fn author(&self, user_id: &str) -> Option<&AuthorView> {
        self.authors.get(user_id)
    }

    pub fn comment_count(&self) -> i64 {
        self.comment_count
    }

    pub fn set_comment_count(&mut self, count: i64) {
        self.comment_count = count;
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn mutation_state(&self, id: MutationId) -> Option<MutationState> {
        if self.pending.contains_key(&id) {
            return Some(MutationState::Pending);
        }
        self.settled.get(&id).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ---- reads -------------------------------------------------------------

    /// Ticket for the first page, or for the next page once one is loaded.
    /// `None` when the server reported no further pages.
    pub fn begin_load(&mut self) -> Option<ReadTicket> {
        if self.pages_loaded > 0 && !self.has_more {
            return None;
        }
        self.read_seq += 1;
        Some(ReadTicket {
            seq: self.read_seq,
            cursor: self.cursor.clone(),
        })
    }

    /// Applies a page if `ticket` is still the newest read. Ids already in
    /// the arena are left untouched, so repeated pages never duplicate or
    /// reorder anything.
    pub fn complete_load(
        &mut self,
        ticket: &ReadTicket,
        result: Result<CommentPage, ClientError>,
    ) -> bool {
        if ticket.seq != self.read_seq {
            info!("discarding stale comment page (seq {})", ticket.seq);
            return false;
        }
        let mut page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!("failed to load comments for {}: {err}", self.item_id);
                return false;
            }
        };

        for id in &page.ids {
            if self.by_id.contains_key(id) {
                continue;
            }
            let Some(view) = page.by_id.remove(id) else {
                continue;
            };
            if view.depth == 0 {
                self.root_order.push(id.clone());
            } else {
                let replies = self.thread_replies.entry(view.thread_id.clone()).or_default();
                if !replies.contains(id) {
                    replies.push(id.clone());
                }
            }
            if let Some(vote) = page.my_votes.get(id) {
                self.my_votes.insert(id.clone(), *vote);
            }
            self.by_id.insert(id.clone(), view);
        }
        self.authors.extend(page.authors);
        self.cursor = page.cursor;
        self.has_more = page.has_more;
        self.pages_loaded += 1;
        true
    }

    // ---- add ---------------------------------------------------------------

    /// Inserts an optimistic comment under a temporary id. Replies to a reply
    /// are attached to its thread root, matching the server.
    pub fn begin_add(
        &mut self,
        body: &str,
        parent_id: Option<&str>,
    ) -> Result<AddTicket, FeedError> {
        let body = validate_body(body)?;
        let root_id = match parent_id {
            Some(parent_id) => {
                let parent = self
                    .by_id
                    .get(parent_id)
                    .ok_or_else(|| FeedError::UnknownComment(parent_id.to_string()))?;
                if is_temp_id(&parent.id) || is_temp_id(&parent.thread_id) {
                    return Err(FeedError::NotYetCommitted(parent_id.to_string()));
                }
                if !matches!(parent.status, CommentStatus::Visible | CommentStatus::Edited) {
                    return Err(FeedError::Inactive(parent_id.to_string()));
                }
                Some(if parent.depth == 0 {
                    parent.id.clone()
                } else {
                    parent.thread_id.clone()
                })
            }
            None => None,
        };

        let temp_id = format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4());
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let view = CommentView {
            id: temp_id.clone(),
            item_id: self.item_id.clone(),
            author_id: self.author_id.clone(),
            body: Some(body.clone()),
            created_at: now.clone(),
            last_activity_at: now.clone(),
            parent_id: root_id.clone(),
            thread_id: root_id.clone().unwrap_or_else(|| temp_id.clone()),
            depth: u8::from(root_id.is_some()),
            reply_count: 0,
            like_count: 0,
            dislike_count: 0,
            score: 0,
            status: CommentStatus::Visible,
        };
        self.by_id.insert(temp_id.clone(), view);

        match &root_id {
            Some(root_id) => {
                self.thread_replies
                    .entry(root_id.clone())
                    .or_default()
                    .push(temp_id.clone());
                if let Some(root) = self.by_id.get_mut(root_id) {
                    root.reply_count += 1;
                    root.last_activity_at = now;
                }
            }
            None => {
                self.root_order.push(temp_id.clone());
                self.resort_roots();
            }
        }
        self.comment_count += 1;

        let mutation = self.record(Mutation::Add {
            temp_id: temp_id.clone(),
            root_id: root_id.clone(),
        });
        Ok(AddTicket {
            mutation,
            temp_id,
            parent_id: root_id,
            body,
        })
    }

    pub fn complete_add(
        &mut self,
        mutation: MutationId,
        result: Result<AddCommentResponse, ClientError>,
    ) -> Result<MutationState, FeedError> {
        let Some(Mutation::Add { temp_id, root_id }) = self.take_pending(mutation, |m| {
            matches!(m, Mutation::Add { .. })
        })?
        else {
            return Err(FeedError::NotPending(mutation));
        };

        match result {
            Ok(created) => {
                self.substitute_id(&temp_id, &created);
                Ok(self.settle(mutation, MutationState::Committed))
            }
            Err(err) => {
                warn!("rolling back optimistic comment {temp_id}: {err}");
                self.by_id.remove(&temp_id);
                match &root_id {
                    Some(root_id) => {
                        if let Some(replies) = self.thread_replies.get_mut(root_id) {
                            replies.retain(|id| id != &temp_id);
                        }
                        if let Some(root) = self.by_id.get_mut(root_id) {
                            root.reply_count -= 1;
                        }
                    }
                    None => self.root_order.retain(|id| id != &temp_id),
                }
                self.comment_count -= 1;
                Ok(self.settle(mutation, MutationState::RolledBack))
            }
        }
    }

    /// Replaces a temporary id by the canonical one in place. If the canonical
    /// comment already arrived through a page load, the temporary copy is
    /// dropped instead.
    fn substitute_id(&mut self, temp_id: &str, created: &AddCommentResponse) {
        let canonical = created.id.as_str();
        let Some(mut view) = self.by_id.remove(temp_id) else {
            return;
        };
        let already_loaded = self.by_id.contains_key(canonical);

        if view.depth == 0 {
            if already_loaded {
                self.root_order.retain(|id| id != temp_id);
            } else {
                for id in self.root_order.iter_mut().filter(|id| id.as_str() == temp_id) {
                    *id = canonical.to_string();
                }
            }
        } else if let Some(replies) = self.thread_replies.get_mut(&view.thread_id) {
            if already_loaded {
                replies.retain(|id| id != temp_id);
            } else {
                for id in replies.iter_mut().filter(|id| id.as_str() == temp_id) {
                    *id = canonical.to_string();
                }
            }
        }

        if !already_loaded {
            view.id = canonical.to_string();
            view.thread_id = created.thread_id.clone();
            if view.depth == 1 {
                view.parent_id = Some(created.thread_id.clone());
            }
            self.by_id.insert(canonical.to_string(), view);
        }
    }

    fn resort_roots(&mut self) {
        let by_id = &self.by_id;
        self.root_order.sort_by(|a, b| match (by_id.get(a), by_id.get(b)) {
            (Some(a), Some(b)) => compare_roots(a, b),
            _ => Ordering::Equal,
        });
    }

    // ---- votes -------------------------------------------------------------

    /// Applies the caller's vote locally. `None` when the vote is unchanged
    /// and nothing needs sending.
    pub fn begin_vote(
        &mut self,
        comment_id: &str,
        value: i64,
    ) -> Result<Option<MutationId>, FeedError> {
        if is_temp_id(comment_id) {
            return Err(FeedError::NotYetCommitted(comment_id.to_string()));
        }
        if !self.by_id.contains_key(comment_id) {
            return Err(FeedError::UnknownComment(comment_id.to_string()));
        }
        let value = value.clamp(-1, 1);
        let prior = self.my_vote(comment_id);
        if prior == value {
            return Ok(None);
        }
        let (like_delta, dislike_delta) = vote_deltas(prior, value);
        self.apply_vote(comment_id, like_delta, dislike_delta, value);
        Ok(Some(self.record(Mutation::Vote {
            comment_id: comment_id.to_string(),
            prior,
            like_delta,
            dislike_delta,
        })))
    }

    /// Completes a vote. The server tally is adopted only when no later vote
    /// on the comment is pending or committed. A failure never undoes a later
    /// vote the server already confirmed.
    pub fn complete_vote(
        &mut self,
        mutation: MutationId,
        result: Result<VoteTally, ClientError>,
    ) -> Result<MutationState, FeedError> {
        let Some(Mutation::Vote {
            comment_id,
            prior,
            like_delta,
            dislike_delta,
        }) = self.take_pending(mutation, |m| matches!(m, Mutation::Vote { .. }))?
        else {
            return Err(FeedError::NotPending(mutation));
        };

        match result {
            Ok(tally) => {
                let superseded = committed_after(&self.committed_vote, &comment_id, mutation)
                    || self
                        .next_pending_after(mutation, |m| {
                            m.vote_target() == Some(comment_id.as_str())
                        })
                        .is_some();
                if !superseded {
                    if let Some(view) = self.by_id.get_mut(&comment_id) {
                        view.like_count = tally.like_count;
                        view.dislike_count = tally.dislike_count;
                        view.score = tally.score;
                    }
                    if tally.my_vote == 0 {
                        self.my_votes.remove(&comment_id);
                    } else {
                        self.my_votes.insert(comment_id.clone(), tally.my_vote.clamp(-1, 1));
                    }
                }
                mark_committed(&mut self.committed_vote, &comment_id, mutation);
                Ok(self.settle(mutation, MutationState::Committed))
            }
            Err(err) => {
                warn!("rolling back vote on {comment_id}: {err}");
                if committed_after(&self.committed_vote, &comment_id, mutation) {
                    return Ok(self.settle(mutation, MutationState::RolledBack));
                }
                let later = self.next_pending_after(mutation, |m| {
                    m.vote_target() == Some(comment_id.as_str())
                });
                match later {
                    Some(later) => {
                        // The later vote now accounts for both changes.
                        if let Some(Mutation::Vote {
                            prior: later_prior,
                            like_delta: later_like,
                            dislike_delta: later_dislike,
                            ..
                        }) = self.pending.get_mut(&later)
                        {
                            *later_prior = prior;
                            *later_like += like_delta;
                            *later_dislike += dislike_delta;
                        }
                    }
                    None => self.apply_vote(&comment_id, -like_delta, -dislike_delta, prior),
                }
                Ok(self.settle(mutation, MutationState::RolledBack))
            }
        }
    }

    fn apply_vote(&mut self, comment_id: &str, like_delta: i64, dislike_delta: i64, vote: i64) {
        if let Some(view) = self.by_id.get_mut(comment_id) {
            view.like_count += like_delta;
            view.dislike_count += dislike_delta;
            view.score += like_delta - dislike_delta;
        }
        if vote == 0 {
            self.my_votes.remove(comment_id);
        } else {
            self.my_votes.insert(comment_id.to_string(), vote);
        }
    }

    // ---- edit / delete -----------------------------------------------------

    pub fn begin_edit(&mut self, comment_id: &str, body: &str) -> Result<MutationId, FeedError> {
        let body = validate_body(body)?;
        self.begin_content_change(comment_id, |view| {
            view.body = Some(body);
            view.status = CommentStatus::Edited;
        })
    }

    pub fn begin_delete(&mut self, comment_id: &str) -> Result<MutationId, FeedError> {
        self.begin_content_change(comment_id, |view| {
            view.body = None;
            view.status = CommentStatus::Deleted;
        })
    }

    fn begin_content_change<F>(&mut self, comment_id: &str, change: F) -> Result<MutationId, FeedError>
    where
        F: FnOnce(&mut CommentView),
    {
        if is_temp_id(comment_id) {
            return Err(FeedError::NotYetCommitted(comment_id.to_string()));
        }
        let view = self
            .by_id
            .get_mut(comment_id)
            .ok_or_else(|| FeedError::UnknownComment(comment_id.to_string()))?;
        if !matches!(view.status, CommentStatus::Visible | CommentStatus::Edited) {
            return Err(FeedError::Inactive(comment_id.to_string()));
        }
        let snapshot = view.clone();
        change(&mut *view);
        view.last_activity_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        Ok(self.record(Mutation::Content {
            comment_id: comment_id.to_string(),
            snapshot,
        }))
    }

    /// Completes an edit or a delete. On failure the snapshot is restored,
    /// unless a later edit/delete of the same comment already committed or is
    /// still in flight. A pending one inherits the snapshot instead.
    pub fn complete_content_change(
        &mut self,
        mutation: MutationId,
        result: Result<(), ClientError>,
    ) -> Result<MutationState, FeedError> {
        let Some(Mutation::Content {
            comment_id,
            snapshot,
        }) = self.take_pending(mutation, |m| matches!(m, Mutation::Content { .. }))?
        else {
            return Err(FeedError::NotPending(mutation));
        };

        if let Err(err) = result {
            warn!("rolling back change to {comment_id}: {err}");
            if committed_after(&self.committed_content, &comment_id, mutation) {
                return Ok(self.settle(mutation, MutationState::RolledBack));
            }
            let later = self.next_pending_after(mutation, |m| {
                m.content_target() == Some(comment_id.as_str())
            });
            match later.and_then(|later| self.pending.get_mut(&later)) {
                Some(Mutation::Content {
                    snapshot: later_snapshot,
                    ..
                }) => *later_snapshot = snapshot,
                _ => {
                    if let Some(view) = self.by_id.get_mut(&comment_id) {
                        // Counters belong to votes and replies; only the
                        // content fields go back.
                        view.body = snapshot.body;
                        view.status = snapshot.status;
                        view.last_activity_at = snapshot.last_activity_at;
                    }
                }
            }
            return Ok(self.settle(mutation, MutationState::RolledBack));
        }
        mark_committed(&mut self.committed_content, &comment_id, mutation);
        Ok(self.settle(mutation, MutationState::Committed))
    }

    // ---- bookkeeping -------------------------------------------------------

    fn record(&mut self, mutation: Mutation) -> MutationId {
        self.next_mutation += 1;
        let id = MutationId(self.next_mutation);
        self.pending.insert(id, mutation);
        id
    }

    fn take_pending<F>(&mut self, id: MutationId, is_kind: F) -> Result<Option<Mutation>, FeedError>
    where
        F: Fn(&Mutation) -> bool,
    {
        match self.pending.get(&id) {
            Some(mutation) if is_kind(mutation) => Ok(self.pending.remove(&id)),
            _ => Err(FeedError::NotPending(id)),
        }
    }

    fn next_pending_after<F>(&self, id: MutationId, matches: F) -> Option<MutationId>
    where
        F: Fn(&Mutation) -> bool,
    {
        self.pending
            .range(id..)
            .find(|(other, mutation)| **other != id && matches(*mutation))
            .map(|(other, _)| *other)
    }

    fn settle(&mut self, id: MutationId, state: MutationState) -> MutationState {
        self.settled.insert(id, state);
        state
    }
}

fn mark_committed(committed: &mut HashMap<String, MutationId>, comment_id: &str, id: MutationId) {
    let newest = committed.entry(comment_id.to_string()).or_insert(id);
    if *newest < id {
        *newest = id;
    }
}

fn committed_after(committed: &HashMap<String, MutationId>, comment_id: &str, id: MutationId) -> bool {
    committed.get(comment_id).is_some_and(|newest| *newest > id)
}

#[cfg(test)]
mod tests;
