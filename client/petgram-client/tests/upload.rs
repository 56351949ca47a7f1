mod common;

use async_trait::async_trait;
use common::Fixture;
use gateway_client::{Collection, Operation, MEMORY_STORAGE_URL};
use mockall::mock;
use petgram_client::services::media::CompressError;
use petgram_client::services::{
    ComposeForm, MediaCompressor, MediaFile, UploadPipeline, UploadStatus,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Compressor {}

    #[async_trait]
    impl MediaCompressor for Compressor {
        async fn compress(&self, media: &MediaFile) -> Result<MediaFile, CompressError>;
    }
}

fn photo() -> MediaFile {
    MediaFile::new(vec![7u8; 128], "beach.jpg", "image/jpeg")
}

fn form_with_photo() -> ComposeForm {
    let mut form = ComposeForm::new();
    form.select_media(photo());
    form.set_caption("  Beach day with the pack  ");
    form.add_tag("#Beach Day");
    form
}

#[tokio::test]
async fn test_publish_creates_post_and_resets_form() {
    let (fixture, viewer) = Fixture::signed_in("biscuit").await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let mut form = form_with_photo();

    let post_id = pipeline.publish(&mut form).await.unwrap();

    assert_eq!(form, ComposeForm::default());
    assert_eq!(pipeline.status(), UploadStatus::Complete(post_id));

    let paths = fixture.gateway.object_paths("pet-media").await;
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with(&format!("posts/{}/", viewer.id)));
    assert!(paths[0].ends_with("-beach.jpg"));

    let posts = fixture.gateway.rows(Collection::Posts).await;
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post["id"], Value::String(post_id.to_string()));
    assert_eq!(post["caption"], "Beach day with the pack");
    assert_eq!(post["media_type"], "image");
    assert_eq!(post["tags"], serde_json::json!(["beach-day"]));
    let media_url = post["media_url"].as_str().unwrap();
    assert!(media_url.starts_with(MEMORY_STORAGE_URL));
    assert!(media_url.contains(&paths[0]));
}

#[tokio::test]
async fn test_storage_failure_creates_no_post() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    fixture
        .gateway
        .fail_next(Operation::Upload, None, "Payload too large")
        .await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let mut form = form_with_photo();

    let err = pipeline.publish(&mut form).await.unwrap_err();

    assert_eq!(err.user_message(), "Payload too large");
    assert_eq!(
        pipeline.status(),
        UploadStatus::Failed("Payload too large".to_string())
    );
    assert!(fixture.gateway.rows(Collection::Posts).await.is_empty());
    assert_eq!(fixture.gateway.request_count(Operation::Insert).await, 0);
    assert!(form.media().is_some());
}

#[tokio::test]
async fn test_publish_validation_messages() {
    let fixture = Fixture::new();
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let err = pipeline.publish(&mut form_with_photo()).await.unwrap_err();
    assert_eq!(err.user_message(), "You must be signed in to upload.");

    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let err = pipeline.publish(&mut ComposeForm::new()).await.unwrap_err();
    assert_eq!(err.user_message(), "Select a photo or video to upload.");
    assert_eq!(fixture.gateway.request_count(Operation::Upload).await, 0);
}

#[tokio::test]
async fn test_mentions_notify_only_resolved_handles() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    let luna = fixture.user("luna", Some("Cat")).await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let mut form = form_with_photo();
    form.add_mention("@luna");
    form.add_mention("@ghost");

    let post_id = pipeline.publish(&mut form).await.unwrap();

    let notifications = fixture.gateway.rows(Collection::Notifications).await;
    assert_eq!(notifications.len(), 1);
    let note = &notifications[0];
    assert_eq!(note["user_id"], Value::String(luna.id.to_string()));
    assert_eq!(note["type"], "comment");
    assert_eq!(note["is_read"], false);
    assert_eq!(note["data"]["post_id"], Value::String(post_id.to_string()));
    assert_eq!(note["data"]["message"], "biscuit mentioned you in a post");
}

#[tokio::test]
async fn test_failed_fan_out_keeps_post() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    fixture.user("luna", None).await;
    fixture
        .gateway
        .fail_next(Operation::Insert, Some("notifications"), "rate limited")
        .await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let mut form = form_with_photo();
    form.add_mention("luna");

    let post_id = pipeline.publish(&mut form).await.unwrap();

    assert_eq!(pipeline.status(), UploadStatus::Complete(post_id));
    assert_eq!(fixture.gateway.rows(Collection::Posts).await.len(), 1);
    assert!(fixture
        .gateway
        .rows(Collection::Notifications)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_compressed_bytes_are_uploaded() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    let mut compressor = MockCompressor::new();
    compressor
        .expect_compress()
        .times(1)
        .returning(|m| Ok(MediaFile::new(vec![1u8; 16], &m.file_name, &m.content_type)));
    let pipeline = UploadPipeline::with_compressor(fixture.ctx.clone(), Arc::new(compressor));

    pipeline.publish(&mut form_with_photo()).await.unwrap();

    let path = fixture.gateway.object_paths("pet-media").await.remove(0);
    let stored = fixture.gateway.object("pet-media", &path).await.unwrap();
    assert_eq!(stored.body.len(), 16);
    assert_eq!(stored.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_publish_rejected_while_upload_running() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    let release = fixture.gateway.hold_next(Operation::Upload, None).await;
    let pipeline = Arc::new(UploadPipeline::new(fixture.ctx.clone()));

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.publish(&mut form_with_photo()).await })
    };
    let mut status = pipeline.subscribe();
    status
        .wait_for(|s| *s == UploadStatus::Uploading)
        .await
        .unwrap();

    let mut second = form_with_photo();
    let err = pipeline.publish(&mut second).await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "Hang tight, your last post is still uploading."
    );
    assert_eq!(pipeline.status(), UploadStatus::Uploading);
    assert!(second.media().is_some());

    release.notify_one();
    let post_id = first.await.unwrap().unwrap();
    assert_eq!(pipeline.status(), UploadStatus::Complete(post_id));
    assert_eq!(fixture.gateway.rows(Collection::Posts).await.len(), 1);
}

#[tokio::test]
async fn test_handle_suggestions() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    fixture.user("luna", None).await;
    fixture.user("lunar", None).await;
    fixture.user("mochi", None).await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());

    assert!(pipeline.suggest_handles("@l").await.unwrap().is_empty());
    assert_eq!(fixture.gateway.request_count(Operation::Select).await, 0);

    let handles = pipeline.suggest_handles("@LU").await.unwrap();
    assert_eq!(handles, ["luna", "lunar"]);

    // accounts created after the first lookup are suggested too
    fixture.user("peluche", None).await;
    let handles = pipeline.suggest_handles("lu").await.unwrap();
    assert_eq!(handles, ["luna", "lunar", "peluche"]);
    assert_eq!(fixture.gateway.request_count(Operation::Select).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_handle_typing_runs_one_lookup() {
    let (fixture, _viewer) = Fixture::signed_in("biscuit").await;
    fixture.user("mochi", None).await;
    let pipeline = UploadPipeline::new(fixture.ctx.clone());
    let mut debouncer = pipeline.handle_debouncer();
    assert_eq!(debouncer.quiet(), Duration::from_millis(300));
    debouncer.settled().await;

    let handle = debouncer.handle();
    tokio::spawn(async move {
        for text in ["@m", "@mo", "@moc"] {
            handle.push(text.to_string());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let term = debouncer.settled().await;
    assert_eq!(term, "@moc");
    assert_eq!(pipeline.suggest_handles(&term).await.unwrap(), ["mochi"]);
    assert_eq!(fixture.gateway.request_count(Operation::Select).await, 1);
}
