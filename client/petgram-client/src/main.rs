use anyhow::{Context, Result};
use petgram_client::services::{AccountService, FeedService};
use petgram_client::{telemetry, ClientContext, Config};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(env = %config.env, "Starting petgram-feed");

    let ctx = ClientContext::connect(config).context("Failed to build gateway client")?;

    match (
        std::env::var("PETGRAM_EMAIL"),
        std::env::var("PETGRAM_PASSWORD"),
    ) {
        (Ok(email), Ok(password)) => {
            AccountService::new(ctx.clone())
                .sign_in(&email, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))
                .context("Sign-in failed")?;
        }
        _ => warn!("PETGRAM_EMAIL/PETGRAM_PASSWORD not set, feed will be empty"),
    }

    let feed = FeedService::new(ctx.clone())
        .load_feed()
        .await
        .context("Failed to load feed")?;

    if let Some(message) = feed.empty_state() {
        info!("{}", message);
    }
    for item in &feed.items {
        let author = item
            .post
            .author
            .as_ref()
            .map(|a| a.display_name())
            .unwrap_or("unknown");
        info!(
            post_id = %item.post.id,
            author = %author,
            likes = item.stats.like_count,
            liked = item.stats.has_liked,
            comments = item.stats.comment_count,
            "{}",
            item.post.caption.as_deref().unwrap_or("")
        );
    }

    let stats = ctx.cache().stats();
    info!(
        posts = feed.items.len(),
        cache_writes = stats.writes,
        "Feed summary"
    );
    Ok(())
}
