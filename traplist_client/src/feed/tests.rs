use super::*;
use crate::error::ErrorCode;
use pretty_assertions::assert_eq;

fn root(id: &str, score: i64, created_at: &str) -> CommentView {
    CommentView {
        id: id.into(),
        item_id: "trap-1".into(),
        author_id: "someone".into(),
        body: Some(format!("body of {id}")),
        created_at: created_at.into(),
        last_activity_at: created_at.into(),
        parent_id: None,
        thread_id: id.into(),
        depth: 0,
        reply_count: 0,
        like_count: score.max(0),
        dislike_count: (-score).max(0),
        score,
        status: CommentStatus::Visible,
    }
}

fn reply(id: &str, root_id: &str, created_at: &str) -> CommentView {
    CommentView {
        parent_id: Some(root_id.into()),
        thread_id: root_id.into(),
        depth: 1,
        ..root(id, 0, created_at)
    }
}

fn page(views: Vec<CommentView>, has_more: bool, cursor: Option<&str>) -> CommentPage {
    CommentPage {
        ids: views.iter().map(|view| view.id.clone()).collect(),
        by_id: views.into_iter().map(|view| (view.id.clone(), view)).collect(),
        has_more,
        cursor: cursor.map(str::to_string),
        authors: HashMap::new(),
        my_votes: HashMap::new(),
    }
}

fn rejected(code: ErrorCode) -> ClientError {
    ClientError::Api {
        status: 400,
        code,
        message: "rejected".into(),
    }
}

fn loaded_feed(views: Vec<CommentView>) -> CommentFeed {
    let mut feed = CommentFeed::new("trap-1", "me");
    let ticket = feed.begin_load().expect("first ticket");
    assert!(feed.complete_load(&ticket, Ok(page(views, false, None))));
    feed
}

fn counters(feed: &CommentFeed, id: &str) -> (i64, i64, i64) {
    let view = feed.comment(id).expect("comment");
    (view.like_count, view.dislike_count, view.score)
}

#[test]
fn load_more_merges_only_unseen_ids() {
    let mut feed = CommentFeed::new("trap-1", "me");
    let first = feed.begin_load().unwrap();
    assert_eq!(first.cursor, None);
    let first_page = page(
        vec![
            root("a", 3, "2024-01-01T00:00:01.000000Z"),
            reply("a1", "a", "2024-01-01T00:00:05.000000Z"),
            root("b", 1, "2024-01-01T00:00:02.000000Z"),
        ],
        true,
        Some("cursor-1"),
    );
    assert!(feed.complete_load(&first, Ok(first_page.clone())));

    let second = feed.begin_load().unwrap();
    assert_eq!(second.cursor.as_deref(), Some("cursor-1"));
    let mut overlapping = page(
        vec![
            root("b", 1, "2024-01-01T00:00:02.000000Z"),
            root("c", 0, "2024-01-01T00:00:03.000000Z"),
        ],
        false,
        None,
    );
    overlapping.by_id.get_mut("b").unwrap().body = Some("changed".into());
    assert!(feed.complete_load(&second, Ok(overlapping)));

    assert_eq!(feed.display_order(), vec!["a", "a1", "b", "c"]);
    assert_eq!(
        feed.comment("b").unwrap().body.as_deref(),
        Some("body of b")
    );
    assert!(!feed.has_more());
    assert_eq!(feed.begin_load(), None);
}

#[test]
fn stale_read_is_discarded() {
    let mut feed = CommentFeed::new("trap-1", "me");
    let old = feed.begin_load().unwrap();
    let newer = feed.begin_load().unwrap();

    let stale = page(vec![root("old", 0, "2024-01-01T00:00:01.000000Z")], false, None);
    assert!(!feed.complete_load(&old, Ok(stale)));
    assert!(feed.comment("old").is_none());

    let fresh = page(vec![root("new", 0, "2024-01-01T00:00:01.000000Z")], false, None);
    assert!(feed.complete_load(&newer, Ok(fresh)));
    assert_eq!(feed.root_order(), ["new".to_string()]);
}

#[test]
fn optimistic_root_lands_in_server_order_and_keeps_slot_on_commit() {
    let mut feed = loaded_feed(vec![
        root("top", 5, "2024-01-01T00:00:01.000000Z"),
        root("zero", 0, "2024-01-01T00:00:02.000000Z"),
        root("sunk", -2, "2024-01-01T00:00:03.000000Z"),
    ]);
    feed.set_comment_count(3);

    let ticket = feed.begin_add("  fresh take ", None).unwrap();
    assert!(is_temp_id(&ticket.temp_id));
    assert_eq!(ticket.body, "fresh take");
    assert_eq!(
        feed.root_order(),
        [
            "top".to_string(),
            "zero".to_string(),
            ticket.temp_id.clone(),
            "sunk".to_string()
        ]
    );
    assert_eq!(feed.comment_count(), 4);
    assert_eq!(feed.mutation_state(ticket.mutation), Some(MutationState::Pending));

    let state = feed
        .complete_add(
            ticket.mutation,
            Ok(AddCommentResponse {
                id: "server-1".into(),
                thread_id: "server-1".into(),
            }),
        )
        .unwrap();
    assert_eq!(state, MutationState::Committed);
    assert_eq!(feed.root_order(), ["top", "zero", "server-1", "sunk"].map(String::from));
    let created = feed.comment("server-1").unwrap();
    assert_eq!(created.thread_id, "server-1");
    assert!(feed.comment(&ticket.temp_id).is_none());
    assert_eq!(feed.comment_count(), 4);
}

#[test]
fn reply_to_reply_is_flattened_and_rolled_back_on_failure() {
    let mut feed = loaded_feed(vec![
        root("x", 0, "2024-01-01T00:00:01.000000Z"),
        reply("y", "x", "2024-01-01T00:00:02.000000Z"),
    ]);
    feed.set_comment_count(2);

    let ticket = feed.begin_add("nested", Some("y")).unwrap();
    assert_eq!(ticket.parent_id.as_deref(), Some("x"));
    let optimistic = feed.comment(&ticket.temp_id).unwrap();
    assert_eq!(optimistic.depth, 1);
    assert_eq!(optimistic.thread_id, "x");
    assert_eq!(feed.replies("x"), ["y".to_string(), ticket.temp_id.clone()]);
    assert_eq!(feed.comment("x").unwrap().reply_count, 1);

    let state = feed
        .complete_add(ticket.mutation, Err(rejected(ErrorCode::ResourceExhausted)))
        .unwrap();
    assert_eq!(state, MutationState::RolledBack);
    assert_eq!(feed.replies("x"), ["y".to_string()]);
    assert_eq!(feed.comment("x").unwrap().reply_count, 0);
    assert_eq!(feed.comment_count(), 2);
    assert!(feed.comment(&ticket.temp_id).is_none());
}

#[test]
fn committed_reply_is_not_duplicated_when_page_already_has_it() {
    let mut feed = CommentFeed::new("trap-1", "me");
    let first = feed.begin_load().unwrap();
    feed.complete_load(
        &first,
        Ok(page(vec![root("x", 0, "2024-01-01T00:00:01.000000Z")], true, Some("c"))),
    );
    let ticket = feed.begin_add("hi", Some("x")).unwrap();

    // The canonical reply arrives through a page before the add completes.
    let more = feed.begin_load().unwrap();
    feed.complete_load(
        &more,
        Ok(page(vec![reply("real", "x", "2024-01-01T00:00:09.000000Z")], false, None)),
    );
    feed.complete_add(
        ticket.mutation,
        Ok(AddCommentResponse {
            id: "real".into(),
            thread_id: "x".into(),
        }),
    )
    .unwrap();

    assert_eq!(feed.replies("x"), ["real".to_string()]);
    assert_eq!(feed.display_order(), vec!["x", "real"]);
}

#[test]
fn rejected_vote_restores_exact_prior_state() {
    let mut feed = loaded_feed(vec![
        root("a", 2, "2024-01-01T00:00:01.000000Z"),
        root("b", 0, "2024-01-01T00:00:02.000000Z"),
    ]);
    let before = counters(&feed, "a");

    let flip = feed.begin_vote("a", 1).unwrap().expect("vote sent");
    assert_eq!(counters(&feed, "a"), (3, 0, 3));
    assert_eq!(feed.my_vote("a"), 1);

    // An unrelated vote commits in between.
    let other = feed.begin_vote("b", -1).unwrap().unwrap();
    feed.complete_vote(
        other,
        Ok(VoteTally {
            like_count: 4,
            dislike_count: 1,
            score: 3,
            my_vote: -1,
        }),
    )
    .unwrap();

    let state = feed
        .complete_vote(flip, Err(rejected(ErrorCode::ResourceExhausted)))
        .unwrap();
    assert_eq!(state, MutationState::RolledBack);
    assert_eq!(counters(&feed, "a"), before);
    assert_eq!(feed.my_vote("a"), 0);
    assert_eq!(counters(&feed, "b"), (4, 1, 3));
    assert_eq!(feed.my_vote("b"), -1);
}

#[test]
fn unchanged_vote_sends_nothing() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    assert_eq!(feed.begin_vote("a", 0).unwrap(), None);
    assert_eq!(feed.pending_count(), 0);
}

#[test]
fn failed_earlier_vote_hands_over_to_later_vote() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let like = feed.begin_vote("a", 1).unwrap().unwrap();
    let dislike = feed.begin_vote("a", -1).unwrap().unwrap();
    assert_eq!(counters(&feed, "a"), (0, 1, -1));

    feed.complete_vote(like, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    // The later vote still stands locally.
    assert_eq!(counters(&feed, "a"), (0, 1, -1));
    assert_eq!(feed.my_vote("a"), -1);

    feed.complete_vote(dislike, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    assert_eq!(counters(&feed, "a"), (0, 0, 0));
    assert_eq!(feed.my_vote("a"), 0);
}

#[test]
fn failed_later_vote_falls_back_to_earlier_pending_vote() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let like = feed.begin_vote("a", 1).unwrap().unwrap();
    let dislike = feed.begin_vote("a", -1).unwrap().unwrap();

    feed.complete_vote(dislike, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    assert_eq!(counters(&feed, "a"), (1, 0, 1));
    assert_eq!(feed.my_vote("a"), 1);
    assert_eq!(feed.mutation_state(like), Some(MutationState::Pending));
}

fn tally(like_count: i64, dislike_count: i64, my_vote: i64) -> VoteTally {
    VoteTally {
        like_count,
        dislike_count,
        score: like_count - dislike_count,
        my_vote,
    }
}

#[test]
fn earlier_vote_failing_after_later_commit_leaves_committed_state() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let like = feed.begin_vote("a", 1).unwrap().unwrap();
    let dislike = feed.begin_vote("a", -1).unwrap().unwrap();

    feed.complete_vote(dislike, Ok(tally(0, 1, -1))).unwrap();
    let state = feed
        .complete_vote(like, Err(rejected(ErrorCode::ResourceExhausted)))
        .unwrap();

    assert_eq!(state, MutationState::RolledBack);
    assert_eq!(counters(&feed, "a"), (0, 1, -1));
    assert_eq!(feed.my_vote("a"), -1);
}

#[test]
fn stale_tally_from_earlier_vote_is_ignored() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let like = feed.begin_vote("a", 1).unwrap().unwrap();
    let dislike = feed.begin_vote("a", -1).unwrap().unwrap();

    feed.complete_vote(dislike, Ok(tally(0, 1, -1))).unwrap();
    let state = feed.complete_vote(like, Ok(tally(1, 0, 1))).unwrap();

    assert_eq!(state, MutationState::Committed);
    assert_eq!(counters(&feed, "a"), (0, 1, -1));
    assert_eq!(feed.my_vote("a"), -1);
}

#[test]
fn earlier_vote_tally_is_adopted_once_later_vote_failed() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let like = feed.begin_vote("a", 1).unwrap().unwrap();
    let dislike = feed.begin_vote("a", -1).unwrap().unwrap();

    feed.complete_vote(dislike, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    // Someone else liked in the meantime.
    feed.complete_vote(like, Ok(tally(2, 0, 1))).unwrap();

    assert_eq!(counters(&feed, "a"), (2, 0, 2));
    assert_eq!(feed.my_vote("a"), 1);
}

#[test]
fn adopted_tally_sets_my_vote_from_server() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let like = feed.begin_vote("a", 1).unwrap().unwrap();
    feed.complete_vote(like, Ok(tally(0, 0, 0))).unwrap();

    assert_eq!(counters(&feed, "a"), (0, 0, 0));
    assert_eq!(feed.my_vote("a"), 0);
}

#[test]
fn failed_edit_restores_snapshot_but_keeps_vote_counters() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let edit = feed.begin_edit("a", " revised ").unwrap();
    assert_eq!(feed.comment("a").unwrap().body.as_deref(), Some("revised"));
    assert_eq!(feed.comment("a").unwrap().status, CommentStatus::Edited);

    let vote = feed.begin_vote("a", 1).unwrap().unwrap();
    feed.complete_content_change(edit, Err(rejected(ErrorCode::PermissionDenied)))
        .unwrap();

    let view = feed.comment("a").unwrap();
    assert_eq!(view.body.as_deref(), Some("body of a"));
    assert_eq!(view.status, CommentStatus::Visible);
    assert_eq!(view.last_activity_at, "2024-01-01T00:00:01.000000Z");
    assert_eq!(counters(&feed, "a"), (1, 0, 1));
    assert_eq!(feed.mutation_state(vote), Some(MutationState::Pending));
}

#[test]
fn failed_earlier_edit_does_not_clobber_later_edit() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let first = feed.begin_edit("a", "first").unwrap();
    let second = feed.begin_edit("a", "second").unwrap();

    feed.complete_content_change(first, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    assert_eq!(feed.comment("a").unwrap().body.as_deref(), Some("second"));

    feed.complete_content_change(second, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    assert_eq!(feed.comment("a").unwrap().body.as_deref(), Some("body of a"));
    assert_eq!(feed.comment("a").unwrap().status, CommentStatus::Visible);
}

#[test]
fn earlier_edit_failing_after_later_commit_keeps_committed_body() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let first = feed.begin_edit("a", "first").unwrap();
    let second = feed.begin_edit("a", "second").unwrap();

    feed.complete_content_change(second, Ok(())).unwrap();
    let state = feed
        .complete_content_change(first, Err(rejected(ErrorCode::Internal)))
        .unwrap();

    assert_eq!(state, MutationState::RolledBack);
    let view = feed.comment("a").unwrap();
    assert_eq!(view.body.as_deref(), Some("second"));
    assert_eq!(view.status, CommentStatus::Edited);
}

#[test]
fn earlier_edit_failing_after_committed_delete_stays_deleted() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let edit = feed.begin_edit("a", "draft").unwrap();
    let delete = feed.begin_delete("a").unwrap();

    feed.handle(FeedMessage::CommentDeleted {
        mutation: delete,
        result: Ok(()),
    })
    .unwrap();
    feed.handle(FeedMessage::CommentEdited {
        mutation: edit,
        result: Err(rejected(ErrorCode::PermissionDenied)),
    })
    .unwrap();

    let view = feed.comment("a").unwrap();
    assert_eq!(view.body, None);
    assert_eq!(view.status, CommentStatus::Deleted);
}

#[test]
fn later_edit_failing_after_earlier_commit_restores_earlier_body() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let first = feed.begin_edit("a", "first").unwrap();
    let second = feed.begin_edit("a", "second").unwrap();

    feed.complete_content_change(first, Ok(())).unwrap();
    feed.complete_content_change(second, Err(rejected(ErrorCode::Internal)))
        .unwrap();

    let view = feed.comment("a").unwrap();
    assert_eq!(view.body.as_deref(), Some("first"));
    assert_eq!(view.status, CommentStatus::Edited);
}

#[test]
fn delete_redacts_locally_and_commit_keeps_it() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let delete = feed.begin_delete("a").unwrap();
    assert_eq!(feed.comment("a").unwrap().body, None);

    let state = feed.complete_content_change(delete, Ok(())).unwrap();
    assert_eq!(state, MutationState::Committed);
    assert_eq!(feed.comment("a").unwrap().status, CommentStatus::Deleted);
    assert_eq!(
        feed.begin_edit("a", "too late"),
        Err(FeedError::Inactive("a".into()))
    );
}

#[test]
fn temp_ids_and_settled_mutations_are_refused() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    let ticket = feed.begin_add("pending", None).unwrap();
    assert_eq!(
        feed.begin_vote(&ticket.temp_id, 1),
        Err(FeedError::NotYetCommitted(ticket.temp_id.clone()))
    );
    assert!(matches!(
        feed.begin_add("child", Some(&ticket.temp_id)),
        Err(FeedError::NotYetCommitted(_))
    ));
    assert_eq!(
        feed.begin_vote("ghost", 1),
        Err(FeedError::UnknownComment("ghost".into()))
    );

    feed.complete_add(ticket.mutation, Err(rejected(ErrorCode::Internal)))
        .unwrap();
    assert_eq!(
        feed.complete_add(ticket.mutation, Err(rejected(ErrorCode::Internal))),
        Err(FeedError::NotPending(ticket.mutation))
    );
}

#[test]
fn invalid_bodies_are_refused_before_any_local_change() {
    let mut feed = loaded_feed(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")]);
    feed.set_comment_count(1);

    assert_eq!(feed.begin_add("   ", None), Err(FeedError::EmptyBody));
    let too_long = "x".repeat(MAX_BODY_CHARS + 1);
    assert_eq!(feed.begin_add(&too_long, Some("a")), Err(FeedError::BodyTooLong));
    assert_eq!(feed.begin_edit("a", ""), Err(FeedError::EmptyBody));

    assert_eq!(feed.comment_count(), 1);
    assert_eq!(feed.pending_count(), 0);
    assert_eq!(feed.root_order(), ["a".to_string()]);
    assert_eq!(feed.comment("a").unwrap().reply_count, 0);
    assert_eq!(feed.comment("a").unwrap().body.as_deref(), Some("body of a"));

    // Multibyte characters count once each.
    let at_limit = "é".repeat(MAX_BODY_CHARS);
    assert!(feed.begin_add(&at_limit, None).is_ok());
}

#[test]
fn handle_routes_worker_answers() {
    let mut feed = CommentFeed::new("trap-1", "me");
    let ticket = feed.begin_load().unwrap();
    let loaded = feed
        .handle(FeedMessage::PageLoaded {
            ticket,
            result: Ok(page(vec![root("a", 0, "2024-01-01T00:00:01.000000Z")], false, None)),
        })
        .unwrap();
    assert_eq!(loaded, None);

    let vote = feed.begin_vote("a", -1).unwrap().unwrap();
    let state = feed
        .handle(FeedMessage::VoteSet {
            mutation: vote,
            result: Ok(VoteTally {
                like_count: 2,
                dislike_count: 1,
                score: 1,
                my_vote: -1,
            }),
        })
        .unwrap();
    assert_eq!(state, Some(MutationState::Committed));
    assert_eq!(counters(&feed, "a"), (2, 1, 1));

    let delete = feed.begin_delete("a").unwrap();
    let state = feed
        .handle(FeedMessage::CommentDeleted {
            mutation: delete,
            result: Err(rejected(ErrorCode::PermissionDenied)),
        })
        .unwrap();
    assert_eq!(state, Some(MutationState::RolledBack));
    assert_eq!(feed.comment("a").unwrap().status, CommentStatus::Visible);

    // A vote answer cannot settle an edit.
    let edit = feed.begin_edit("a", "again").unwrap();
    assert_eq!(
        feed.handle(FeedMessage::VoteSet {
            mutation: edit,
            result: Err(rejected(ErrorCode::Internal)),
        }),
        Err(FeedError::NotPending(edit))
    );
    assert_eq!(feed.mutation_state(edit), Some(MutationState::Pending));
}
