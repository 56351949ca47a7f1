mod common;

use common::Fixture;
use gateway_client::Operation;
use petgram_client::services::feed::EMPTY_FEED_MESSAGE;
use petgram_client::services::FeedService;
use uuid::Uuid;

#[tokio::test]
async fn test_feed_without_session_is_empty() {
    let fixture = Fixture::new();
    let author = fixture.user("luna", Some("Cat")).await;
    fixture.post(author.id, "sunbeam", "2024-05-01T10:00:00Z").await;

    let view = FeedService::new(fixture.ctx.clone()).load_feed().await.unwrap();
    assert!(view.is_empty());
    assert_eq!(view.viewer_id, None);
    assert_eq!(view.empty_state(), Some(EMPTY_FEED_MESSAGE));
    assert_eq!(fixture.gateway.request_count(Operation::Select).await, 0);
}

#[tokio::test]
async fn test_feed_aggregates_likes_comments_and_previews() {
    let (fixture, viewer) = Fixture::signed_in("biscuit").await;
    let luna = fixture.user("luna", Some("Cat")).await;
    let older = fixture.post(luna.id, "first nap", "2024-05-01T10:00:00Z").await;
    let newer = fixture.post(luna.id, "second nap", "2024-05-02T10:00:00Z").await;

    fixture.like(newer, viewer.id).await;
    fixture.like(newer, luna.id).await;
    fixture.like(older, luna.id).await;
    for (i, text) in ["one", "two", "three", "four", "five"].iter().enumerate() {
        let ts = format!("2024-05-02T11:0{}:00Z", i);
        fixture.comment(newer, luna.id, text, &ts).await;
    }

    let view = FeedService::new(fixture.ctx.clone()).load_feed().await.unwrap();
    assert_eq!(view.viewer_id, Some(viewer.id));
    let ids: Vec<Uuid> = view.items.iter().map(|i| i.post.id).collect();
    assert_eq!(ids, vec![newer, older]);

    let top = &view.items[0];
    assert_eq!(top.stats.like_count, 2);
    assert!(top.stats.has_liked);
    assert_eq!(top.stats.comment_count, 5);
    let previews: Vec<&str> = top.stats.previews.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(previews, ["one", "two"]);
    assert_eq!(
        top.stats.previews[0].author.as_ref().map(|a| a.username.as_str()),
        Some("luna")
    );
    assert_eq!(
        top.post.author.as_ref().map(|a| a.username.as_str()),
        Some("luna")
    );

    let bottom = &view.items[1];
    assert_eq!(bottom.stats.like_count, 1);
    assert!(!bottom.stats.has_liked);
    assert_eq!(bottom.stats.comment_count, 0);
    assert!(bottom.stats.previews.is_empty());
}

#[tokio::test]
async fn test_feed_is_served_from_cache_until_invalidated() {
    let (fixture, viewer) = Fixture::signed_in("biscuit").await;
    fixture.post(viewer.id, "zoomies", "2024-05-01T10:00:00Z").await;
    let feed = FeedService::new(fixture.ctx.clone());

    feed.load_feed().await.unwrap();
    let selects = fixture.gateway.request_count(Operation::Select).await;
    feed.load_feed().await.unwrap();
    assert_eq!(fixture.gateway.request_count(Operation::Select).await, selects);

    fixture.ctx.invalidate_feed();
    feed.load_feed().await.unwrap();
    assert!(fixture.gateway.request_count(Operation::Select).await > selects);
}

#[tokio::test]
async fn test_feed_survives_failed_side_lookup() {
    let (fixture, viewer) = Fixture::signed_in("biscuit").await;
    let post = fixture.post(viewer.id, "zoomies", "2024-05-01T10:00:00Z").await;
    fixture.like(post, viewer.id).await;
    fixture
        .gateway
        .fail_next(Operation::Select, Some("likes"), "upstream timeout")
        .await;

    let view = FeedService::new(fixture.ctx.clone()).load_feed().await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].stats.like_count, 0);
}

#[tokio::test]
async fn test_failed_posts_query_surfaces_error() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    fixture
        .gateway
        .fail_next(Operation::Select, Some("posts"), "relation does not exist")
        .await;

    let err = FeedService::new(fixture.ctx.clone())
        .load_feed()
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "relation does not exist");
}

#[tokio::test]
async fn test_post_detail_and_missing_post() {
    let (fixture, viewer) = Fixture::signed_in("biscuit").await;
    let post = fixture.post(viewer.id, "zoomies", "2024-05-01T10:00:00Z").await;
    for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
        let ts = format!("2024-05-01T11:0{}:00Z", i);
        fixture.comment(post, viewer.id, text, &ts).await;
    }
    let feed = FeedService::new(fixture.ctx.clone());

    let detail = feed.load_post(post).await.unwrap();
    assert_eq!(detail.comments.len(), 4);
    assert_eq!(detail.stats.comment_count, 4);
    assert_eq!(detail.stats.previews.len(), 3);

    let err = feed.load_post(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}
