use gateway_client::{AuthUser, Collection, InMemoryGateway};
use petgram_client::domain::Profile;
use petgram_client::{ClientContext, Config};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub struct Fixture {
    pub gateway: Arc<InMemoryGateway>,
    pub ctx: ClientContext,
}

impl Fixture {
    pub fn new() -> Self {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = ClientContext::new(
            gateway.clone(),
            Config::with_gateway("memory://gateway", "anon"),
        );
        Self { gateway, ctx }
    }

    /// Register an account with a profile row and sign in as it
    #[allow(dead_code)]
    pub async fn signed_in(username: &str) -> (Self, AuthUser) {
        let fixture = Self::new();
        let user = fixture.user(username, None).await;
        fixture.gateway.sign_in_as(&user).await;
        (fixture, user)
    }

    /// Account plus profile row; does not change the session
    #[allow(dead_code)]
    pub async fn user(&self, username: &str, species: Option<&str>) -> AuthUser {
        let user = self
            .gateway
            .register(&format!("{}@example.com", username), "sardines1", username)
            .await;
        self.profile(user.id, username, species).await;
        user
    }

    #[allow(dead_code)]
    pub async fn profile(&self, id: Uuid, username: &str, species: Option<&str>) {
        self.gateway
            .seed(
                Collection::Profiles,
                vec![json!({
                    "id": id,
                    "username": username,
                    "full_name": capitalize(username),
                    "species": species,
                    "avatar_url": format!("https://cdn.petgram.dev/{}.png", username),
                })],
            )
            .await;
    }

    #[allow(dead_code)]
    pub async fn post(&self, author_id: Uuid, caption: &str, created_at: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.gateway
            .seed(
                Collection::Posts,
                vec![json!({
                    "id": id,
                    "author_id": author_id,
                    "caption": caption,
                    "media_url": format!("memory://gateway/{}.jpg", id),
                    "media_type": "image",
                    "tags": ["cozy"],
                    "created_at": created_at,
                })],
            )
            .await;
        id
    }

    #[allow(dead_code)]
    pub async fn like(&self, post_id: Uuid, user_id: Uuid) {
        self.gateway
            .seed(
                Collection::Likes,
                vec![json!({"post_id": post_id, "user_id": user_id})],
            )
            .await;
    }

    #[allow(dead_code)]
    pub async fn comment(&self, post_id: Uuid, user_id: Uuid, content: &str, created_at: &str) {
        self.gateway
            .seed(
                Collection::Comments,
                vec![json!({
                    "post_id": post_id,
                    "user_id": user_id,
                    "content": content,
                    "created_at": created_at,
                })],
            )
            .await;
    }

    #[allow(dead_code)]
    pub async fn viewer_profile(&self, user: &AuthUser) -> Profile {
        self.ctx.viewer_profile(user).await
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
