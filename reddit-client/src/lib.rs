pub mod api;
pub mod auth;
pub mod rate_limiter;


pub use api::{
    RedditApiClient, RedditCommentData, RedditPostData, RedditSubredditData, RedditUserData,
    REDDIT_API_BASE,
};
pub use auth::{AppOnlyAuth, AuthState, RedditToken};

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use subwatch_core::{Config, ContentSource, CoreError, Item, RedditApiError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub fetch_limit: u32,
}

impl RedditConfig {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
            fetch_limit: subwatch_core::DEFAULT_FETCH_LIMIT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            client_id: config.reddit_client_id.clone(),
            client_secret: config.reddit_client_secret.clone(),
            user_agent: config.user_agent.clone(),
            fetch_limit: config.fetch_limit,
        }
    }
}

/// Read-only Reddit content source: newest comments and posts across a set of
/// subreddits, narrowed to those mentioning the search term.
pub struct RedditClient {
    config: RedditConfig,
    auth: AppOnlyAuth,
    api: RedditApiClient,
    auth_state: AuthState,
    community_icons: HashMap<String, String>,
    author_icons: HashMap<String, Option<String>>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, CoreError> {
        Self::with_base_url(config, REDDIT_API_BASE)
    }

    /// Same as [`RedditClient::new`] but sends API calls to `base_url`.
    pub fn with_base_url(config: RedditConfig, base_url: &str) -> Result<Self, CoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::Internal {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        let auth = AppOnlyAuth::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            http_client.clone(),
        )?;
        let api = RedditApiClient::with_base_url(http_client, base_url);

        Ok(Self {
            config,
            auth,
            api,
            auth_state: AuthState::NotAuthenticated,
            community_icons: HashMap::new(),
            author_icons: HashMap::new(),
        })
    }

    pub fn get_auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(&self.auth_state, AuthState::Authenticated { token } if !token.is_expired())
    }

    pub fn set_token(&mut self, token: RedditToken) {
        self.auth_state = if token.is_expired() {
            AuthState::TokenExpired
        } else {
            AuthState::Authenticated { token }
        };
    }

    /// Obtains a fresh token. Failing here at startup means bad credentials.
    pub async fn authenticate(&mut self) -> Result<(), CoreError> {
        let token = self.auth.request_token().await?;
        self.set_token(token);
        Ok(())
    }

    /// Looks up icons for each subreddit. Best effort: failures are logged
    /// and the notifier falls back to the default avatar.
    pub async fn load_community_icons(&mut self, subreddits: &[String]) {
        for subreddit in subreddits {
            let access_token = match self.access_token().await {
                Ok(token) => token,
                Err(e) => {
                    warn!("Skipping icon lookup for r/{}: {}", subreddit, e);
                    continue;
                }
            };

            match self.api.get_subreddit_info(&access_token, subreddit).await {
                Ok(about) => {
                    if let Some(icon) = about.icon() {
                        debug!("Using icon {} for r/{}", icon, subreddit);
                        self.community_icons.insert(subreddit.to_lowercase(), icon);
                    }
                }
                Err(e) => warn!("Could not load icon for r/{}: {}", subreddit, e),
            }
        }
    }

    pub fn community_icon(&self, subreddit: &str) -> Option<String> {
        self.community_icons.get(&subreddit.to_lowercase()).cloned()
    }

    /// Avatar for the embed author line. Lookups are cached per author; a
    /// failed lookup is retried the next time that author shows up.
    async fn author_icon(&mut self, access_token: &str, author: &str) -> Option<String> {
        if author.is_empty() || author == "[deleted]" {
            return None;
        }
        if let Some(icon) = self.author_icons.get(author) {
            return icon.clone();
        }

        match self.api.get_user_icon(access_token, author).await {
            Ok(icon) => {
                self.author_icons.insert(author.to_string(), icon.clone());
                icon
            }
            Err(e) => {
                debug!("No avatar for u/{}: {}", author, e);
                None
            }
        }
    }

    async fn access_token(&mut self) -> Result<String, CoreError> {
        if let AuthState::Authenticated { token } = &self.auth_state {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        info!("Reddit token missing or expired, re-authenticating");
        self.auth_state = AuthState::TokenExpired;
        self.authenticate().await?;
        match &self.auth_state {
            AuthState::Authenticated { token } => Ok(token.access_token.clone()),
            _ => Err(CoreError::RedditApi(RedditApiError::InvalidToken)),
        }
    }

    async fn fetch_matching(
        &mut self,
        search_term: &str,
        subreddits: &[String],
    ) -> Result<Vec<Item>, CoreError> {
        let access_token = self.access_token().await?;
        let limit = self.config.fetch_limit;

        let comments = self
            .api
            .get_comments(&access_token, subreddits, limit)
            .await?;
        let posts = self
            .api
            .get_new_posts(&access_token, subreddits, limit)
            .await?;

        let mut items = Vec::with_capacity(comments.len() + posts.len());
        for comment in comments {
            let icon = self.community_icon(&comment.subreddit);
            items.push(comment.into_item(icon));
        }
        for post in posts {
            let icon = self.community_icon(&post.subreddit);
            items.push(post.into_item(icon));
        }

        let mut matched = filter_matching(items, search_term);
        for item in &mut matched {
            item.author_icon = self.author_icon(&access_token, &item.author).await;
        }
        Ok(matched)
    }
}

/// Keeps items whose text mentions `search_term`, case-insensitively.
pub fn filter_matching(items: Vec<Item>, search_term: &str) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| item.matches(search_term))
        .collect()
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn fetch_items(
        &mut self,
        search_term: &str,
        subreddits: &[String],
    ) -> Result<Vec<Item>, CoreError> {
        if search_term.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "search term must not be empty".to_string(),
            });
        }
        if subreddits.is_empty() {
            return Err(CoreError::InvalidInput {
                message: "at least one subreddit is required".to_string(),
            });
        }

        let result = self.fetch_matching(search_term, subreddits).await;
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            // Reddit revoked the token early; request a new one next cycle.
            self.auth_state = AuthState::TokenExpired;
        }

        let items = result?;
        debug!("{} items mention '{}'", items.len(), search_term);
        Ok(items)
    }
}
