use log::info;

use crate::error::ClientError;
use crate::models::{AddCommentResponse, CommentPage, ItemView, RatingAggregate, VoteTally};

use super::{CommentFeed, FeedError, MutationId, MutationState, ReadTicket};

/// Server answers for a comment feed, delivered from worker threads.
#[derive(Debug)]
pub enum FeedMessage {
    PageLoaded {
        ticket: ReadTicket,
        result: Result<CommentPage, ClientError>,
    },
    CommentAdded {
        mutation: MutationId,
        result: Result<AddCommentResponse, ClientError>,
    },
    CommentEdited {
        mutation: MutationId,
        result: Result<(), ClientError>,
    },
    CommentDeleted {
        mutation: MutationId,
        result: Result<(), ClientError>,
    },
    VoteSet {
        mutation: MutationId,
        result: Result<VoteTally, ClientError>,
    },
}

/// Item-level answers that do not touch the comment feed.
#[derive(Debug)]
pub enum ItemMessage {
    RatingSet {
        item_id: String,
        result: Result<RatingAggregate, ClientError>,
    },
    ItemLoaded {
        item_id: String,
        result: Result<ItemView, ClientError>,
    },
    SearchCompleted {
        key: String,
        result: Result<Vec<ItemView>, ClientError>,
    },
}

impl CommentFeed {
    /// Routes a worker answer to the matching completion. Returns `None` for a
    /// page load, which has no mutation state.
    pub fn handle(&mut self, message: FeedMessage) -> Result<Option<MutationState>, FeedError> {
        let state = match message {
            FeedMessage::PageLoaded { ticket, result } => {
                if self.complete_load(&ticket, result) {
                    info!(
                        "comment feed for {} now holds {} roots",
                        self.item_id(),
                        self.root_order().len()
                    );
                }
                return Ok(None);
            }
            FeedMessage::CommentAdded { mutation, result } => self.complete_add(mutation, result)?,
            FeedMessage::CommentEdited { mutation, result }
            | FeedMessage::CommentDeleted { mutation, result } => {
                self.complete_content_change(mutation, result)?
            }
            FeedMessage::VoteSet { mutation, result } => self.complete_vote(mutation, result)?,
        };
        Ok(Some(state))
    }
}
