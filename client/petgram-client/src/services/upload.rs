//! Compose form and the publish pipeline
//!
//! Publishing is storage upload, then the post row, then best-effort mention
//! notifications. Nothing is compensated: a failed fan-out leaves the post in
//! place.

use crate::context::ClientContext;
use crate::domain::{NewNotification, NewPost, NotificationData, NotificationType};
use crate::error::{ClientError, ClientResult};
use crate::services::debounce::Debouncer;
use crate::services::media::{prepare_media, MediaCompressor, MediaFile, PassthroughCompressor};
use chrono::Utc;
use gateway_client::{
    to_row, AuthUser, Collection, DataGateway, DataGatewayExt, Filter, GatewayResult, Projection,
    Select, StorageGateway, UploadOptions,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const HANDLE_SUGGESTION_LIMIT: usize = 8;

const UPLOADING_MESSAGE: &str = "Uploading to Petgram…";
const COMPRESSING_MESSAGE: &str = "Compressing media for a speedy upload…";
const COMPLETE_MESSAGE: &str = "Upload complete! Your followers will love this.";
const UPLOAD_IN_PROGRESS_MESSAGE: &str = "Hang tight, your last post is still uploading.";
const MENTION_FALLBACK_AUTHOR: &str = "A fellow petlover";

/// Normalize free text into a tag: leading `#`/`@` stripped, whitespace runs
/// become `-`, lowercased. Blank input yields `None`.
pub fn clean_tag(raw: &str) -> Option<String> {
    let stripped = raw.trim().trim_start_matches(['#', '@']);
    let tag = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    (!tag.is_empty()).then_some(tag)
}

/// Strip a leading `@` from a handle. Case is kept; mentions resolve
/// case-sensitively.
pub fn clean_handle(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_start_matches('@').trim();
    (!handle.is_empty()).then(|| handle.to_string())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeForm {
    media: Option<MediaFile>,
    caption: String,
    tags: Vec<String>,
    mentions: Vec<String>,
}

impl ComposeForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previously selected media
    pub fn select_media(&mut self, media: MediaFile) {
        self.media = Some(media);
    }

    pub fn clear_media(&mut self) {
        self.media = None;
    }

    pub fn media(&self) -> Option<&MediaFile> {
        self.media.as_ref()
    }

    pub fn set_caption(&mut self, caption: &str) {
        self.caption = caption.to_string();
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Returns false when the input was blank or already present
    pub fn add_tag(&mut self, raw: &str) -> bool {
        match clean_tag(raw) {
            Some(tag) if !self.tags.contains(&tag) => {
                self.tags.push(tag);
                true
            }
            _ => false,
        }
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn add_mention(&mut self, raw: &str) -> bool {
        match clean_handle(raw) {
            Some(handle) if !self.mentions.contains(&handle) => {
                self.mentions.push(handle);
                true
            }
            _ => false,
        }
    }

    pub fn remove_mention(&mut self, handle: &str) {
        let handle = handle.trim_start_matches('@');
        self.mentions.retain(|m| m != handle);
    }

    pub fn mentions(&self) -> &[String] {
        &self.mentions
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadStatus {
    #[default]
    Idle,
    Compressing,
    /// Sending media to storage
    Uploading,
    /// Writing the post row and mention notifications
    Publishing,
    Complete(Uuid),
    Failed(String),
}

impl UploadStatus {
    /// Inline feedback line, if any
    pub fn feedback(&self) -> Option<&str> {
        match self {
            UploadStatus::Idle => None,
            UploadStatus::Compressing => Some(COMPRESSING_MESSAGE),
            UploadStatus::Uploading | UploadStatus::Publishing => Some(UPLOADING_MESSAGE),
            UploadStatus::Complete(_) => Some(COMPLETE_MESSAGE),
            UploadStatus::Failed(message) => Some(message.as_str()),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadStatus::Compressing | UploadStatus::Uploading | UploadStatus::Publishing
        )
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Uuid,
}

pub struct UploadPipeline {
    ctx: ClientContext,
    compressor: Arc<dyn MediaCompressor>,
    status: watch::Sender<UploadStatus>,
}

impl UploadPipeline {
    pub fn new(ctx: ClientContext) -> Self {
        Self::with_compressor(ctx, Arc::new(PassthroughCompressor))
    }

    pub fn with_compressor(ctx: ClientContext, compressor: Arc<dyn MediaCompressor>) -> Self {
        let (status, _) = watch::channel(UploadStatus::Idle);
        Self {
            ctx,
            compressor,
            status,
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.status.subscribe()
    }

    /// Publish the form as a new post and return its id.
    ///
    /// On success the form is reset and cached feeds are dropped. On failure
    /// the form is left as it was and the status carries the error text.
    /// A publish started while another is still running is rejected without
    /// touching the status.
    pub async fn publish(&self, form: &mut ComposeForm) -> ClientResult<Uuid> {
        if self.status().is_busy() {
            return Err(ClientError::validation(UPLOAD_IN_PROGRESS_MESSAGE));
        }
        match self.run(form).await {
            Ok(post_id) => {
                form.reset();
                self.ctx.invalidate_feed();
                self.status.send_replace(UploadStatus::Complete(post_id));
                info!(post_id = %post_id, "Post published");
                Ok(post_id)
            }
            Err(e) => {
                warn!(error = %e, "Publish failed");
                self.status.send_replace(UploadStatus::Failed(e.user_message()));
                Err(e)
            }
        }
    }

    async fn run(&self, form: &ComposeForm) -> ClientResult<Uuid> {
        let viewer = self
            .ctx
            .require_viewer("You must be signed in to upload.")
            .await?;
        let media = form
            .media()
            .cloned()
            .ok_or_else(|| ClientError::validation("Select a photo or video to upload."))?;

        self.status.send_replace(UploadStatus::Compressing);
        let media = prepare_media(self.compressor.as_ref(), media).await;
        let media_type = media.media_type();

        self.status.send_replace(UploadStatus::Uploading);

        let gateway = self.ctx.gateway();
        let bucket = self.ctx.media_bucket();
        let path = format!(
            "posts/{}/{}-{}",
            viewer.id,
            Utc::now().timestamp_millis(),
            media.file_name
        );
        let options = UploadOptions {
            content_type: media.content_type.clone(),
            upsert: false,
        };
        gateway.upload(bucket, &path, media.bytes, options).await?;
        let media_url = gateway.public_url(bucket, &path);
        debug!(path = %path, "Media stored");

        self.status.send_replace(UploadStatus::Publishing);
        let caption = form.caption().trim();
        let post = NewPost {
            author_id: viewer.id,
            caption: (!caption.is_empty()).then(|| caption.to_string()),
            media_url,
            media_type,
            tags: form.tags().to_vec(),
        };
        let inserted: IdRow = gateway
            .insert_one(Collection::Posts, &post, &Projection::columns(&["id"]))
            .await?;

        if !form.mentions().is_empty() {
            match self.notify_mentions(&viewer, inserted.id, form.mentions()).await {
                Ok(sent) => debug!(post_id = %inserted.id, sent, "Mention notifications sent"),
                Err(e) => warn!(post_id = %inserted.id, error = %e, "Mention fan-out failed"),
            }
        }

        Ok(inserted.id)
    }

    /// Resolve handles to profile ids and notify each one. Handles with no
    /// matching profile are skipped.
    async fn notify_mentions(
        &self,
        viewer: &AuthUser,
        post_id: Uuid,
        handles: &[String],
    ) -> GatewayResult<usize> {
        let gateway = self.ctx.gateway();
        let query = Select::new(Collection::Profiles)
            .columns(&["id"])
            .filter(Filter::in_list("username", handles));
        let targets: Vec<IdRow> = gateway.fetch(&query).await?;
        if targets.is_empty() {
            return Ok(0);
        }

        let author = viewer.username().unwrap_or(MENTION_FALLBACK_AUTHOR);
        let message = format!("{} mentioned you in a post", author);
        let rows = targets
            .iter()
            .map(|target| {
                to_row(&NewNotification {
                    user_id: target.id,
                    kind: NotificationType::Comment,
                    data: NotificationData {
                        message: Some(message.clone()),
                        post_id: Some(post_id),
                    },
                    is_read: false,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        gateway
            .insert(Collection::Notifications, rows, &Projection::columns(&["id"]))
            .await?;
        Ok(targets.len())
    }

    /// Debouncer for the `@handle` input, using the configured quiet window
    pub fn handle_debouncer(&self) -> Debouncer<String> {
        Debouncer::new(String::new(), self.ctx.config().search.handle_debounce())
    }

    /// Usernames containing the typed handle, read fresh so new accounts show
    /// up. Inputs of one character or less return nothing without a request.
    pub async fn suggest_handles(&self, input: &str) -> ClientResult<Vec<String>> {
        let term = input.trim().trim_start_matches('@').trim();
        if term.chars().count() <= 1 {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct Handle {
            username: String,
        }

        let query = Select::new(Collection::Profiles)
            .columns(&["username"])
            .filter(Filter::contains("username", term))
            .order_by("username", true)
            .limit(HANDLE_SUGGESTION_LIMIT);
        let handles: Vec<String> = self
            .ctx
            .gateway()
            .fetch::<Handle>(&query)
            .await?
            .into_iter()
            .map(|h| h.username)
            .collect();
        debug!(term, count = handles.len(), "Handle suggestions loaded");
        Ok(handles)
    }
}
