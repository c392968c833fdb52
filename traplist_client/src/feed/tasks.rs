use std::sync::mpsc::Sender;
use std::thread;

use log::error;

use crate::api::ApiClient;
use crate::models::{AddCommentRequest, EditCommentRequest, SearchFilter};

use super::messages::{FeedMessage, ItemMessage};
use super::{AddTicket, MutationId, ReadTicket};

pub fn load_page(
    client: ApiClient,
    tx: Sender<FeedMessage>,
    item_id: String,
    page_size: usize,
    ticket: ReadTicket,
) {
    thread::spawn(move || {
        let result = client.read_comments(&item_id, page_size, ticket.cursor.as_deref());
        if tx.send(FeedMessage::PageLoaded { ticket, result }).is_err() {
            error!("failed to send PageLoaded message");
        }
    });
}

pub fn add_comment(client: ApiClient, tx: Sender<FeedMessage>, item_id: String, ticket: AddTicket) {
    thread::spawn(move || {
        let request = AddCommentRequest {
            body: ticket.body,
            parent_id: ticket.parent_id,
        };
        let result = client.add_comment(&item_id, &request);
        let message = FeedMessage::CommentAdded {
            mutation: ticket.mutation,
            result,
        };
        if tx.send(message).is_err() {
            error!("failed to send CommentAdded message");
        }
    });
}

pub fn edit_comment(
    client: ApiClient,
    tx: Sender<FeedMessage>,
    item_id: String,
    comment_id: String,
    mutation: MutationId,
    body: String,
) {
    thread::spawn(move || {
        let result = client.edit_comment(&item_id, &comment_id, &EditCommentRequest { body });
        if tx.send(FeedMessage::CommentEdited { mutation, result }).is_err() {
            error!("failed to send CommentEdited message");
        }
    });
}

pub fn delete_comment(
    client: ApiClient,
    tx: Sender<FeedMessage>,
    item_id: String,
    comment_id: String,
    mutation: MutationId,
) {
    thread::spawn(move || {
        let result = client.delete_comment(&item_id, &comment_id);
        if tx.send(FeedMessage::CommentDeleted { mutation, result }).is_err() {
            error!("failed to send CommentDeleted message");
        }
    });
}

pub fn set_vote(
    client: ApiClient,
    tx: Sender<FeedMessage>,
    item_id: String,
    comment_id: String,
    mutation: MutationId,
    value: i64,
) {
    thread::spawn(move || {
        let result = client.set_vote(&item_id, &comment_id, value);
        if tx.send(FeedMessage::VoteSet { mutation, result }).is_err() {
            error!("failed to send VoteSet message");
        }
    });
}

pub fn set_rating(client: ApiClient, tx: Sender<ItemMessage>, item_id: String, value: i64) {
    thread::spawn(move || {
        let result = client.set_rating(&item_id, value);
        if tx.send(ItemMessage::RatingSet { item_id, result }).is_err() {
            error!("failed to send RatingSet message");
        }
    });
}

pub fn load_item(client: ApiClient, tx: Sender<ItemMessage>, item_id: String) {
    thread::spawn(move || {
        let result = client.get_item(&item_id);
        if tx.send(ItemMessage::ItemLoaded { item_id, result }).is_err() {
            error!("failed to send ItemLoaded message");
        }
    });
}

/// `key` is the cache key the caller stores the results under.
pub fn search(client: ApiClient, tx: Sender<ItemMessage>, key: String, filter: SearchFilter) {
    thread::spawn(move || {
        let result = client.search(&filter);
        if tx.send(ItemMessage::SearchCompleted { key, result }).is_err() {
            error!("failed to send SearchCompleted message");
        }
    });
}
