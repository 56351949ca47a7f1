//! Per-session dependency container
//!
//! Built once after configuration is loaded and handed to every service.
//! Signing out clears the session and every cached view.

use crate::config::Config;
use crate::domain::Profile;
use crate::error::{ClientError, ClientResult};
use gateway_client::{
    AuthGateway, AuthUser, Collection, DataGatewayExt, Filter, Gateway, GatewayError, RestConfig,
    RestGateway, Select,
};
use petgram_cache::{CacheKey, QueryCache};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ClientContext {
    gateway: Arc<dyn Gateway>,
    cache: QueryCache,
    config: Arc<Config>,
}

impl ClientContext {
    pub fn new(gateway: Arc<dyn Gateway>, config: Config) -> Self {
        Self {
            gateway,
            cache: QueryCache::new(),
            config: Arc::new(config),
        }
    }

    /// Context backed by the hosted REST gateway
    pub fn connect(config: Config) -> ClientResult<Self> {
        let rest = RestConfig::new(&config.gateway.url, &config.gateway.anon_key)?;
        info!(url = %rest.url, env = %config.env, "Connecting to gateway");
        Ok(Self::new(Arc::new(RestGateway::new(rest)), config))
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn media_bucket(&self) -> &str {
        &self.config.gateway.media_bucket
    }

    /// Signed-in user, if any
    pub async fn viewer(&self) -> ClientResult<Option<AuthUser>> {
        Ok(self.gateway.current_user().await?)
    }

    /// Signed-in user, or `Unauthenticated` carrying `message`
    pub async fn require_viewer(&self, message: &str) -> ClientResult<AuthUser> {
        self.viewer()
            .await?
            .ok_or_else(|| ClientError::Unauthenticated(message.to_string()))
    }

    /// The viewer's profile row, falling back to auth metadata when the row
    /// cannot be read
    pub async fn viewer_profile(&self, user: &AuthUser) -> Profile {
        let query = Select::new(Collection::Profiles).filter(Filter::eq("id", user.id));
        match self.gateway.fetch_one::<Profile>(&query).await {
            Ok(profile) => profile,
            Err(e) => {
                if !matches!(e, GatewayError::NotFound(_)) {
                    warn!(user_id = %user.id, error = %e, "Failed to load viewer profile");
                }
                fallback_profile(user)
            }
        }
    }

    /// Drop every cached feed so the next read refetches
    pub fn invalidate_feed(&self) {
        self.cache.invalidate_prefix(&CacheKey::feed_prefix());
    }

    pub fn invalidate_post(&self, post_id: Uuid) {
        self.invalidate_feed();
        self.cache.del(&CacheKey::post(post_id));
    }

    /// End the session and drop all cached state
    pub async fn sign_out(&self) -> ClientResult<()> {
        let result = self.gateway.sign_out().await;
        self.cache.clear();
        result?;
        info!("Signed out");
        Ok(())
    }
}

fn fallback_profile(user: &AuthUser) -> Profile {
    let metadata = |key: &str| {
        user.user_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let username = user
        .username()
        .map(str::to_string)
        .or_else(|| {
            user.email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "petgrammer".to_string());

    Profile {
        id: user.id,
        username,
        full_name: metadata("full_name"),
        bio: None,
        species: None,
        breed: None,
        location: None,
        website: None,
        avatar_url: metadata("avatar_url"),
        created_at: None,
    }
}
