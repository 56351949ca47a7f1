//! Home feed and post detail
//!
//! Raw rows (posts, likes, comment ids, comment previews) are folded into
//! per-post stats in one pass per collection; the resulting view is cached
//! per viewer until a mutation invalidates it.

use crate::context::ClientContext;
use crate::domain::{Comment, CommentRecord, LikeRecord, Post};
use crate::error::{ClientError, ClientResult};
use gateway_client::{Collection, DataGatewayExt, Embed, Filter, GatewayResult, Select};
use petgram_cache::CacheKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Comment previews shown per post in the feed
pub const FEED_PREVIEW_LIMIT: usize = 2;

/// Comment previews shown on the post detail page
pub const DETAIL_PREVIEW_LIMIT: usize = 3;

pub const EMPTY_FEED_MESSAGE: &str = "It's quiet… for now.";

pub(crate) const POST_COLUMNS: &[&str] = &[
    "id",
    "caption",
    "media_url",
    "media_type",
    "thumbnail_url",
    "tags",
    "created_at",
];

pub(crate) const COMMENT_COLUMNS: &[&str] = &["id", "post_id", "content", "created_at"];

pub(crate) fn author_embed() -> Embed {
    Embed::new(
        "author",
        "author_id",
        Collection::Profiles,
        &["id", "username", "full_name", "avatar_url"],
    )
}

pub(crate) fn comment_author_embed() -> Embed {
    Embed::new(
        "author",
        "user_id",
        Collection::Profiles,
        &["username", "avatar_url"],
    )
}

/// Comments of one post with author snippets, oldest first
pub(crate) fn comments_query(post_id: Uuid) -> Select {
    Select::new(Collection::Comments)
        .columns(COMMENT_COLUMNS)
        .embed(comment_author_embed())
        .filter(Filter::eq("post_id", post_id))
        .order_by("created_at", true)
}

/// Derived per-post view state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostStats {
    pub like_count: u64,
    pub has_liked: bool,
    pub comment_count: u64,
    pub previews: Vec<Comment>,
}

/// Per-post stats for one page of posts
#[derive(Debug, Clone, Default)]
pub struct FeedAggregate {
    stats: HashMap<Uuid, PostStats>,
    likers: HashSet<(Uuid, Uuid)>,
}

impl FeedAggregate {
    /// Stats for a post; posts without data get zero counts and no previews
    pub fn get(&self, post_id: Uuid) -> PostStats {
        self.stats.get(&post_id).cloned().unwrap_or_default()
    }

    pub fn has_liked(&self, post_id: Uuid, user_id: Uuid) -> bool {
        self.likers.contains(&(post_id, user_id))
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

/// Fold raw rows into per-post stats.
///
/// Previews keep the first [`FEED_PREVIEW_LIMIT`] records per post in input
/// order. Rows referencing posts outside `posts` are ignored.
pub fn aggregate(
    viewer_id: Uuid,
    posts: &[Post],
    likes: &[LikeRecord],
    comments: &[CommentRecord],
    previews: &[Comment],
) -> FeedAggregate {
    let mut stats: HashMap<Uuid, PostStats> = posts
        .iter()
        .map(|post| (post.id, PostStats::default()))
        .collect();
    let mut likers = HashSet::with_capacity(likes.len());

    for like in likes {
        if let Some(entry) = stats.get_mut(&like.post_id) {
            entry.like_count += 1;
            if like.user_id == viewer_id {
                entry.has_liked = true;
            }
        }
        likers.insert((like.post_id, like.user_id));
    }

    for comment in comments {
        if let Some(entry) = stats.get_mut(&comment.post_id) {
            entry.comment_count += 1;
        }
    }

    for preview in previews {
        if let Some(entry) = stats.get_mut(&preview.post_id) {
            if entry.previews.len() < FEED_PREVIEW_LIMIT {
                entry.previews.push(preview.clone());
            }
        }
    }

    FeedAggregate { stats, likers }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: Post,
    pub stats: PostStats,
}

/// Ordered feed page, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedView {
    pub viewer_id: Option<Uuid>,
    pub items: Vec<FeedItem>,
}

impl FeedView {
    pub fn build(viewer_id: Uuid, posts: Vec<Post>, aggregate: &FeedAggregate) -> Self {
        let items = posts
            .into_iter()
            .map(|post| FeedItem {
                stats: aggregate.get(post.id),
                post,
            })
            .collect();
        Self {
            viewer_id: Some(viewer_id),
            items,
        }
    }

    pub fn empty(viewer_id: Option<Uuid>) -> Self {
        Self {
            viewer_id,
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Text shown in place of the feed when there is nothing to show
    pub fn empty_state(&self) -> Option<&'static str> {
        self.is_empty().then_some(EMPTY_FEED_MESSAGE)
    }
}

/// A single post with its full comment thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    pub stats: PostStats,
    pub comments: Vec<Comment>,
}

/// Log a failed secondary lookup and continue with no rows
fn or_empty<T>(result: GatewayResult<Vec<T>>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(lookup = what, error = %e, "Feed lookup failed, treating as empty");
        Vec::new()
    })
}

pub struct FeedService {
    ctx: ClientContext,
}

impl FeedService {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    /// Home feed for the signed-in viewer. Without a session the feed is empty.
    pub async fn load_feed(&self) -> ClientResult<FeedView> {
        let Some(viewer) = self.ctx.viewer().await? else {
            return Ok(FeedView::empty(None));
        };

        let key = CacheKey::feed(viewer.id);
        if let Some(view) = self.ctx.cache().get::<FeedView>(&key)? {
            return Ok(view);
        }

        let gateway = self.ctx.gateway();
        let feed = &self.ctx.config().feed;

        let posts_query = Select::new(Collection::Posts)
            .columns(POST_COLUMNS)
            .embed(author_embed())
            .order_by("created_at", false)
            .limit(feed.post_limit);
        let posts: Vec<Post> = gateway.fetch(&posts_query).await?;

        if posts.is_empty() {
            debug!(viewer_id = %viewer.id, "Feed is empty");
            let view = FeedView::empty(Some(viewer.id));
            self.ctx.cache().set(&key, &view)?;
            return Ok(view);
        }

        let post_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let likes_query = Select::new(Collection::Likes)
            .columns(&["post_id", "user_id"])
            .filter(Filter::in_list("post_id", &post_ids));
        let comments_query = Select::new(Collection::Comments)
            .columns(&["id", "post_id"])
            .filter(Filter::in_list("post_id", &post_ids));
        let previews_query = Select::new(Collection::Comments)
            .columns(COMMENT_COLUMNS)
            .embed(comment_author_embed())
            .filter(Filter::in_list("post_id", &post_ids))
            .order_by("created_at", true)
            .limit(feed.preview_fetch_limit);

        let (likes, comments, previews) = tokio::join!(
            gateway.fetch::<LikeRecord>(&likes_query),
            gateway.fetch::<CommentRecord>(&comments_query),
            gateway.fetch::<Comment>(&previews_query),
        );
        let likes = or_empty(likes, "likes");
        let comments = or_empty(comments, "comments");
        let previews = or_empty(previews, "previews");

        let aggregate = aggregate(viewer.id, &posts, &likes, &comments, &previews);
        let view = FeedView::build(viewer.id, posts, &aggregate);
        self.ctx.cache().set(&key, &view)?;

        info!(
            viewer_id = %viewer.id,
            posts = view.items.len(),
            likes = likes.len(),
            comments = comments.len(),
            "Feed loaded"
        );
        Ok(view)
    }

    /// One post with likes and every comment. Requires a session.
    pub async fn load_post(&self, post_id: Uuid) -> ClientResult<PostDetail> {
        let viewer = self.ctx.require_viewer("Sign in to view this post.").await?;

        let key = CacheKey::post(post_id);
        if let Some(detail) = self.ctx.cache().get::<PostDetail>(&key)? {
            return Ok(detail);
        }

        let gateway = self.ctx.gateway();
        let post_query = Select::new(Collection::Posts)
            .columns(POST_COLUMNS)
            .embed(author_embed())
            .filter(Filter::eq("id", post_id));
        let post: Post = match gateway.fetch_one(&post_query).await {
            Ok(post) => post,
            Err(e) => {
                debug!(post_id = %post_id, error = %e, "Post lookup failed");
                return Err(ClientError::NotFound(format!("post {}", post_id)));
            }
        };

        let likes_query = Select::new(Collection::Likes)
            .columns(&["post_id", "user_id"])
            .filter(Filter::eq("post_id", post_id));
        let comments_query = comments_query(post_id);
        let (likes, comments) = tokio::join!(
            gateway.fetch::<LikeRecord>(&likes_query),
            gateway.fetch::<Comment>(&comments_query),
        );
        let likes = or_empty(likes, "likes");
        let comments = or_empty(comments, "comments");

        let stats = PostStats {
            like_count: likes.len() as u64,
            has_liked: likes.iter().any(|l| l.user_id == viewer.id),
            comment_count: comments.len() as u64,
            previews: comments.iter().take(DETAIL_PREVIEW_LIMIT).cloned().collect(),
        };
        let detail = PostDetail {
            post,
            stats,
            comments,
        };
        self.ctx.cache().set(&key, &detail)?;
        Ok(detail)
    }
}
