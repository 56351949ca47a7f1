//! Per-post interactive state: likes and the comment thread
//!
//! Both are published through watch channels so a renderer sees the
//! optimistic value before the gateway answers.

use crate::context::ClientContext;
use crate::domain::{Comment, CommentAuthor, CommentId, LikeRecord, NewComment, Profile};
use crate::error::ClientResult;
use crate::services::feed::{comment_author_embed, comments_query, FeedItem, PostStats, COMMENT_COLUMNS};
use crate::services::optimistic::{MutationOutcome, Optimistic};
use chrono::Utc;
use gateway_client::{
    to_row, Collection, DataGateway, DataGatewayExt, Filter, GatewayResult, Projection,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeState {
    pub count: u64,
    pub liked: bool,
    /// A like/unlike request is in flight
    pub pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentThread {
    /// Oldest first. Starts as the feed previews until the full list loads.
    pub comments: Vec<Comment>,
    pub count: u64,
    pub loading: bool,
    pub submitting: bool,
}

pub struct PostCard {
    ctx: ClientContext,
    post_id: Uuid,
    viewer_id: Uuid,
    viewer: CommentAuthor,
    likes: watch::Sender<LikeState>,
    thread: watch::Sender<CommentThread>,
    next_pending: AtomicU64,
}

impl PostCard {
    pub fn new(ctx: ClientContext, post_id: Uuid, viewer: &Profile, stats: &PostStats) -> Self {
        let (likes, _) = watch::channel(LikeState {
            count: stats.like_count,
            liked: stats.has_liked,
            pending: false,
        });
        let (thread, _) = watch::channel(CommentThread {
            comments: stats.previews.clone(),
            count: stats.comment_count,
            loading: false,
            submitting: false,
        });
        Self {
            ctx,
            post_id,
            viewer_id: viewer.id,
            viewer: viewer.comment_author(),
            likes,
            thread,
            next_pending: AtomicU64::new(1),
        }
    }

    pub fn from_item(ctx: ClientContext, item: &FeedItem, viewer: &Profile) -> Self {
        Self::new(ctx, item.post.id, viewer, &item.stats)
    }

    pub fn post_id(&self) -> Uuid {
        self.post_id
    }

    pub fn like_state(&self) -> LikeState {
        *self.likes.borrow()
    }

    pub fn subscribe_likes(&self) -> watch::Receiver<LikeState> {
        self.likes.subscribe()
    }

    pub fn thread(&self) -> CommentThread {
        self.thread.borrow().clone()
    }

    pub fn subscribe_thread(&self) -> watch::Receiver<CommentThread> {
        self.thread.subscribe()
    }

    /// Flip the viewer's like. The count and flag change immediately; a
    /// failed request restores both exactly.
    pub async fn toggle_like(&self) -> MutationOutcome {
        let change = Optimistic::apply_watch(&self.likes, |state| {
            if state.liked {
                state.count = state.count.saturating_sub(1);
            } else {
                state.count += 1;
            }
            state.liked = !state.liked;
            state.pending = true;
        });
        let was_liked = change.snapshot().liked;

        let result = self.write_like(!was_liked).await;

        let outcome = match result {
            Ok(()) => {
                change.commit();
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!(post_id = %self.post_id, error = %e, "Like toggle failed, rolling back");
                change.rollback_watch(&self.likes);
                MutationOutcome::RolledBack
            }
        };
        self.likes.send_modify(|state| state.pending = false);
        self.ctx.invalidate_post(self.post_id);
        outcome
    }

    async fn write_like(&self, like: bool) -> GatewayResult<()> {
        let gateway = self.ctx.gateway();
        if like {
            let record = LikeRecord {
                post_id: self.post_id,
                user_id: self.viewer_id,
            };
            gateway
                .insert(
                    Collection::Likes,
                    vec![to_row(&record)?],
                    &Projection::columns(&["post_id", "user_id"]),
                )
                .await?;
        } else {
            gateway
                .delete(
                    Collection::Likes,
                    &[
                        Filter::eq("post_id", self.post_id),
                        Filter::eq("user_id", self.viewer_id),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// Post a comment. Blank text is ignored without a request.
    ///
    /// A placeholder authored by the viewer is appended at once and replaced
    /// by the stored comment on success. On failure the thread returns to its
    /// exact prior list and count.
    pub async fn submit_comment(&self, text: &str) -> MutationOutcome {
        let content = text.trim();
        if content.is_empty() {
            return MutationOutcome::Ignored;
        }

        let pending_id = CommentId::Pending(self.next_pending.fetch_add(1, Ordering::Relaxed));
        let placeholder = Comment {
            id: pending_id,
            post_id: self.post_id,
            content: content.to_string(),
            created_at: Utc::now(),
            author: Some(self.viewer.clone()),
        };
        let change = Optimistic::apply_watch(&self.thread, |thread| {
            thread.comments.push(placeholder);
            thread.count += 1;
            thread.submitting = true;
        });

        let record = NewComment {
            post_id: self.post_id,
            user_id: self.viewer_id,
            content: content.to_string(),
        };
        let returning = Projection::columns(COMMENT_COLUMNS).with_embed(comment_author_embed());
        let result = self
            .ctx
            .gateway()
            .insert_one::<NewComment, Comment>(Collection::Comments, &record, &returning)
            .await;

        match result {
            Ok(confirmed) => {
                change.commit();
                self.thread.send_modify(|thread| {
                    if let Some(slot) = thread.comments.iter_mut().find(|c| c.id == pending_id) {
                        *slot = confirmed;
                    } else if !thread.comments.iter().any(|c| c.id == confirmed.id) {
                        // placeholder lost to an overlapping rollback
                        thread.comments.push(confirmed);
                        thread.count += 1;
                    }
                    thread.submitting = false;
                });
                self.ctx.invalidate_post(self.post_id);
                debug!(post_id = %self.post_id, "Comment stored");
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!(post_id = %self.post_id, error = %e, "Comment failed, rolling back");
                change.rollback_watch(&self.thread);
                MutationOutcome::RolledBack
            }
        }
    }

    /// Replace the preview list with the full thread, oldest first
    pub async fn load_comments(&self) -> ClientResult<()> {
        self.thread.send_modify(|thread| thread.loading = true);

        let result = self
            .ctx
            .gateway()
            .fetch::<Comment>(&comments_query(self.post_id))
            .await;

        match result {
            Ok(comments) => {
                self.thread.send_modify(|thread| {
                    thread.count = comments.len() as u64;
                    thread.comments = comments;
                    thread.loading = false;
                });
                Ok(())
            }
            Err(e) => {
                self.thread.send_modify(|thread| thread.loading = false);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use gateway_client::{InMemoryGateway, Operation};
    use std::sync::Arc;

    fn viewer() -> Profile {
        Profile {
            id: Uuid::new_v4(),
            username: "luna".to_string(),
            full_name: None,
            bio: None,
            species: None,
            breed: None,
            location: None,
            website: None,
            avatar_url: Some("https://cdn.petgram.dev/luna.png".to_string()),
            created_at: None,
        }
    }

    fn card(gateway: Arc<InMemoryGateway>, stats: PostStats) -> PostCard {
        let ctx = ClientContext::new(gateway, Config::with_gateway("memory://gateway", "anon"));
        PostCard::new(ctx, Uuid::new_v4(), &viewer(), &stats)
    }

    #[tokio::test]
    async fn test_blank_comment_is_ignored() {
        let gateway = Arc::new(InMemoryGateway::new());
        let card = card(gateway.clone(), PostStats::default());

        assert_eq!(card.submit_comment("   \n").await, MutationOutcome::Ignored);
        assert_eq!(card.thread(), CommentThread::default());
        assert!(gateway.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_uses_viewer_snippet() {
        let gateway = Arc::new(InMemoryGateway::new());
        let release = gateway.hold_next(Operation::Insert, Some("comments")).await;
        let card = Arc::new(card(gateway.clone(), PostStats::default()));

        let task = {
            let card = card.clone();
            tokio::spawn(async move { card.submit_comment("  so fluffy ").await })
        };
        let mut thread = card.subscribe_thread();
        thread
            .wait_for(|t| t.submitting)
            .await
            .unwrap();

        let pending = card.thread();
        assert_eq!(pending.count, 1);
        assert!(pending.comments[0].id.is_pending());
        assert_eq!(pending.comments[0].content, "so fluffy");
        assert_eq!(
            pending.comments[0].author.as_ref().map(|a| a.username.as_str()),
            Some("luna")
        );

        release.notify_one();
        assert_eq!(task.await.unwrap(), MutationOutcome::Confirmed);
        let thread = card.thread();
        assert_eq!(thread.count, 1);
        assert!(!thread.comments[0].id.is_pending());
        assert!(!thread.submitting);
    }

    #[tokio::test]
    async fn test_overlapping_comments_keep_count_in_step() {
        let gateway = Arc::new(InMemoryGateway::new());
        let first = gateway.hold_next(Operation::Insert, Some("comments")).await;
        let second = gateway.hold_next(Operation::Insert, Some("comments")).await;
        let card = Arc::new(card(gateway.clone(), PostStats::default()));

        let a = {
            let card = card.clone();
            tokio::spawn(async move { card.submit_comment("first").await })
        };
        while gateway.request_count(Operation::Insert).await < 1 {
            tokio::task::yield_now().await;
        }
        let b = {
            let card = card.clone();
            tokio::spawn(async move { card.submit_comment("second").await })
        };
        while gateway.request_count(Operation::Insert).await < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(card.thread().count, 2);

        gateway
            .fail_next(Operation::Insert, Some("comments"), "connection reset")
            .await;
        first.notify_one();
        assert_eq!(a.await.unwrap(), MutationOutcome::RolledBack);
        second.notify_one();
        assert_eq!(b.await.unwrap(), MutationOutcome::Confirmed);

        let thread = card.thread();
        assert_eq!(thread.comments.len(), 1);
        assert_eq!(thread.comments[0].content, "second");
        assert_eq!(thread.count, 1);
        assert_eq!(gateway.rows(Collection::Comments).await.len(), 1);
    }
}
