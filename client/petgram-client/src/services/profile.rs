//! Profile pages and profile editing

use crate::context::ClientContext;
use crate::domain::{Post, Profile, ProfileUpdate};
use crate::error::{ClientError, ClientResult};
use crate::services::feed::{author_embed, POST_COLUMNS};
use crate::services::follow::{set_follow, FollowState};
use crate::services::media::MediaFile;
use crate::services::optimistic::{MutationOutcome, Optimistic};
use chrono::Utc;
use futures::try_join;
use gateway_client::{
    to_row, Collection, DataGateway, DataGatewayExt, Filter, GatewayError, GatewayResult, Select,
    StorageGateway, UploadOptions,
};
use petgram_cache::CacheKey;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const PROFILE_SAVED_MESSAGE: &str = "Profile updated successfully!";

/// Everything a profile page shows, relative to the current viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePage {
    pub profile: Profile,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_following: bool,
    pub is_owner: bool,
    /// Newest first
    pub posts: Vec<Post>,
}

impl ProfilePage {
    pub fn follow_state(&self) -> FollowState {
        FollowState {
            is_following: self.is_following,
            followers_count: self.followers_count,
        }
    }
}

pub struct ProfileService {
    ctx: ClientContext,
}

impl ProfileService {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    pub async fn load_profile(&self, username: &str) -> ClientResult<ProfilePage> {
        let viewer_id = self.ctx.viewer().await?.map(|u| u.id);

        let key = CacheKey::profile(username);
        if let Some(page) = self.ctx.cache().get::<ProfilePage>(&key)? {
            return Ok(page);
        }

        let gateway = self.ctx.gateway();
        let profile_query =
            Select::new(Collection::Profiles).filter(Filter::eq("username", username));
        let profile: Profile = match gateway.fetch_one(&profile_query).await {
            Ok(profile) => profile,
            Err(GatewayError::NotFound(_)) => {
                return Err(ClientError::NotFound(format!("profile {}", username)))
            }
            Err(e) => return Err(e.into()),
        };

        let followers = [Filter::eq("followed_id", profile.id)];
        let following = [Filter::eq("follower_id", profile.id)];
        let posts_query = Select::new(Collection::Posts)
            .columns(POST_COLUMNS)
            .embed(author_embed())
            .filter(Filter::eq("author_id", profile.id))
            .order_by("created_at", false);

        let (followers_count, following_count, is_following, posts) = try_join!(
            gateway.count(Collection::Followers, &followers),
            gateway.count(Collection::Followers, &following),
            self.viewer_follows(viewer_id, profile.id),
            gateway.fetch::<Post>(&posts_query),
        )?;

        let page = ProfilePage {
            is_owner: viewer_id == Some(profile.id),
            followers_count,
            following_count,
            is_following,
            posts,
            profile,
        };
        self.ctx.cache().set(&key, &page)?;

        debug!(
            username = %username,
            posts = page.posts.len(),
            followers = page.followers_count,
            "Profile loaded"
        );
        Ok(page)
    }

    async fn viewer_follows(
        &self,
        viewer_id: Option<Uuid>,
        profile_id: Uuid,
    ) -> GatewayResult<bool> {
        let Some(viewer_id) = viewer_id else {
            return Ok(false);
        };
        let edge = [
            Filter::eq("followed_id", profile_id),
            Filter::eq("follower_id", viewer_id),
        ];
        Ok(self.ctx.gateway().count(Collection::Followers, &edge).await? > 0)
    }

    /// Save the viewer's profile, uploading `avatar` first when given.
    ///
    /// Returns the values written, including the new avatar URL.
    pub async fn edit_profile(
        &self,
        mut update: ProfileUpdate,
        avatar: Option<MediaFile>,
    ) -> ClientResult<ProfileUpdate> {
        let viewer = self
            .ctx
            .require_viewer("You must be signed in to update your profile.")
            .await?;
        let gateway = self.ctx.gateway();

        if let Some(avatar) = avatar {
            let bucket = self.ctx.media_bucket();
            let path = format!(
                "avatars/{}-{}-{}",
                viewer.id,
                Utc::now().timestamp_millis(),
                avatar.file_name
            );
            let options = UploadOptions {
                content_type: avatar.content_type,
                upsert: true,
            };
            gateway.upload(bucket, &path, avatar.bytes, options).await?;
            update.avatar_url = Some(gateway.public_url(bucket, &path));
        }

        gateway
            .update(
                Collection::Profiles,
                &[Filter::eq("id", viewer.id)],
                to_row(&update)?,
            )
            .await?;

        let cache = self.ctx.cache();
        cache.invalidate_prefix(&CacheKey::profile_prefix());
        cache.invalidate_prefix(&CacheKey::search_prefix(viewer.id));
        self.ctx.invalidate_feed();

        info!(user_id = %viewer.id, "Profile updated");
        Ok(update)
    }
}

/// Follow button state on a profile page
pub struct ProfileHeader {
    ctx: ClientContext,
    viewer_id: Uuid,
    profile_id: Uuid,
    username: String,
    state: watch::Sender<FollowState>,
}

impl ProfileHeader {
    pub fn new(ctx: ClientContext, viewer_id: Uuid, page: &ProfilePage) -> Self {
        let (state, _) = watch::channel(page.follow_state());
        Self {
            ctx,
            viewer_id,
            profile_id: page.profile.id,
            username: page.profile.username.clone(),
            state,
        }
    }

    pub fn state(&self) -> FollowState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FollowState> {
        self.state.subscribe()
    }

    pub async fn toggle_follow(&self) -> MutationOutcome {
        let change = Optimistic::apply_watch(&self.state, |state| *state = state.toggled());
        let follow = !change.snapshot().is_following;

        match set_follow(self.ctx.gateway(), self.viewer_id, self.profile_id, follow).await {
            Ok(()) => {
                change.commit();
                let cache = self.ctx.cache();
                cache.del(&CacheKey::profile(&self.username));
                cache.invalidate_prefix(&CacheKey::search_prefix(self.viewer_id));
                MutationOutcome::Confirmed
            }
            Err(e) => {
                warn!(profile_id = %self.profile_id, error = %e, "Follow toggle failed, rolling back");
                change.rollback_watch(&self.state);
                MutationOutcome::RolledBack
            }
        }
    }
}
