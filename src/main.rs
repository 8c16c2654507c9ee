use background_service::{BackgroundService, DiscordWebhook};
use llm_interface::RelevanceFilter;
use reddit_client::{RedditClient, RedditConfig};
use subwatch_core::{Config, CoreError, ErrorExt, MemorySeenStore};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "subwatch=info,reddit_client=info,llm_interface=info,background_service=info";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    // A missing .env file is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting subwatch - Reddit to Discord watcher");

    run().await.map_err(|e| {
        tracing::error!("Startup failed: {}", e.user_friendly_message());
        e
    })
}

async fn run() -> Result<(), CoreError> {
    let config = Config::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);
    tracing::info!(
        subreddits = config.subreddits.len(),
        ai_filtering = config.ai_enabled(),
        "Configuration loaded"
    );

    let mut reddit = RedditClient::new(RedditConfig::from_config(&config))?;
    reddit.authenticate().await?;
    reddit.load_community_icons(&config.subreddits).await;

    let filter = RelevanceFilter::from_config(&config)?;
    let notifier = DiscordWebhook::new(config.webhook_url.as_str())?;

    let mut service = BackgroundService::new(
        &config,
        Box::new(reddit),
        filter,
        Box::new(notifier),
        Box::new(MemorySeenStore::new()),
    );

    service.start().await?;
    tracing::info!("subwatch stopped");
    Ok(())
}
