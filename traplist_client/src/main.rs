use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use traplist_client::cache::SearchCache;
use traplist_client::feed::{tasks, FeedMessage, ItemMessage};
use traplist_client::models::SearchFilter;
use traplist_client::{ApiClient, CommentFeed, Identity};

const PAGE_SIZE: usize = 20;
const ANSWER_TIMEOUT: Duration = Duration::from_secs(10);

/// Prints an item's comment threads and a cached search for its name.
///
/// Usage: `traplist_client <item-id> [comment text]`. The server comes from
/// `TRAPLIST_URL` and the signed-in user from `TRAPLIST_USER`.
fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(item_id) = args.next() else {
        bail!("usage: traplist_client <item-id> [comment text]");
    };
    let comment = args.collect::<Vec<_>>().join(" ");

    let base_url = std::env::var("TRAPLIST_URL").unwrap_or_else(|_| "127.0.0.1:8080".into());
    let user = std::env::var("TRAPLIST_USER").ok();
    let mut client = ApiClient::new(base_url)?;
    if let Some(user) = &user {
        client = client.with_identity(Identity::user(user.clone()));
    }

    let (item_tx, item_rx) = mpsc::channel();
    tasks::load_item(client.clone(), item_tx.clone(), item_id.clone());
    let item = match item_rx.recv_timeout(ANSWER_TIMEOUT)? {
        ItemMessage::ItemLoaded { result, .. } => result?,
        other => bail!("unexpected answer {other:?}"),
    };
    info!("{} ({}), tier {:?}", item.name, item.status, item.tier);

    let (feed_tx, feed_rx) = mpsc::channel();
    let mut feed = CommentFeed::new(&item_id, user.clone().unwrap_or_default());
    feed.set_comment_count(item.comment_count);
    while let Some(ticket) = feed.begin_load() {
        tasks::load_page(client.clone(), feed_tx.clone(), item_id.clone(), PAGE_SIZE, ticket);
        match feed_rx.recv_timeout(ANSWER_TIMEOUT)? {
            FeedMessage::PageLoaded { ticket, result } => {
                if !feed.complete_load(&ticket, result) {
                    break;
                }
            }
            other => {
                feed.handle(other)?;
            }
        }
    }

    if !comment.is_empty() {
        let ticket = feed.begin_add(&comment, None)?;
        tasks::add_comment(client.clone(), feed_tx.clone(), item_id.clone(), ticket);
        let state = feed.handle(feed_rx.recv_timeout(ANSWER_TIMEOUT)?)?;
        info!("new comment settled as {state:?}");
    }

    for id in feed.display_order() {
        let view = feed.comment(&id).context("comment vanished from feed")?;
        let indent = if view.depth == 0 { "" } else { "    " };
        let author = feed
            .author(&view.author_id)
            .and_then(|author| author.display_name.clone())
            .unwrap_or_else(|| view.author_id.clone());
        println!(
            "{indent}[{:+}] {author}: {}",
            view.score,
            view.body.as_deref().unwrap_or("(removed)")
        );
    }

    let mut cache = SearchCache::new(chrono::Duration::minutes(5));
    let filter = SearchFilter {
        text: Some(item.name.clone()),
        ..Default::default()
    };
    let key = SearchCache::key_for(&filter);
    if cache.get_by_key(&key).is_none() {
        tasks::search(client, item_tx, key.clone(), filter);
        match item_rx.recv_timeout(ANSWER_TIMEOUT)? {
            ItemMessage::SearchCompleted { key, result } => match result {
                Ok(items) => cache.insert(key, items),
                Err(err) => warn!("search failed: {err}"),
            },
            other => bail!("unexpected answer {other:?}"),
        }
    }
    for found in cache.get_by_key(&key).unwrap_or_default() {
        println!("similar: {} {:?}", found.name, found.tier);
    }
    Ok(())
}
