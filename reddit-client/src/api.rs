use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use chrono::{TimeZone, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::{CoreError, Item, ItemKind, RedditApiError};
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

fn deleted() -> String {
    "[deleted]".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "deleted")]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default = "deleted")]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditSubredditData {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub icon_img: Option<String>,
    #[serde(default)]
    pub community_icon: Option<String>,
}

impl RedditSubredditData {
    /// The subreddit's icon, preferring `icon_img` over `community_icon`.
    pub fn icon(&self) -> Option<String> {
        [&self.icon_img, &self.community_icon]
            .into_iter()
            .flatten()
            .map(|icon| icon.replace("&amp;", "&"))
            .find(|icon| !icon.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditUserData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon_img: Option<String>,
}

impl RedditUserData {
    pub fn icon(&self) -> Option<String> {
        self.icon_img
            .as_deref()
            .filter(|icon| !icon.is_empty())
            .map(|icon| icon.replace("&amp;", "&"))
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, REDDIT_API_BASE)
    }

    pub fn with_base_url(http_client: Client, base_url: &str) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth()));

        Self {
            http_client,
            rate_limiter,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let waited = self.rate_limiter.acquire_permit().await;
        if waited > Duration::ZERO {
            debug!("Waited {:?} for rate limit permit for {}", waited, endpoint);
        }

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        Err(CoreError::RedditApi(status_error(
            status,
            endpoint,
            retry_after_header(&response),
        )))
    }

    /// Newest comments across `subreddits` (a `+`-joined multireddit).
    pub async fn get_comments(
        &self,
        access_token: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditCommentData>, CoreError> {
        let endpoint = format!("/r/{}/comments", multireddit(subreddits));
        let listing = self.get_listing(&endpoint, access_token, limit).await?;
        let comments: Vec<RedditCommentData> = decode_children(listing);
        info!("Retrieved {} comments from {}", comments.len(), endpoint);
        Ok(comments)
    }

    /// Newest posts across `subreddits`.
    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", multireddit(subreddits));
        let listing = self.get_listing(&endpoint, access_token, limit).await?;
        let posts: Vec<RedditPostData> = decode_children(listing);
        info!("Retrieved {} posts from {}", posts.len(), endpoint);
        Ok(posts)
    }

    pub async fn get_subreddit_info(
        &self,
        access_token: &str,
        subreddit: &str,
    ) -> Result<RedditSubredditData, CoreError> {
        let endpoint = format!("/r/{}/about", subreddit);

        let response = self
            .make_request(Method::GET, &endpoint, access_token, None)
            .await
            .map_err(|e| match e {
                CoreError::RedditApi(RedditApiError::SubredditNotFound { .. }) => {
                    CoreError::RedditApi(RedditApiError::SubredditNotFound {
                        subreddit: subreddit.to_string(),
                    })
                }
                other => other,
            })?;

        let subreddit_response: RedditListingChild<RedditSubredditData> =
            response.json().await.map_err(|e| {
                error!("Failed to parse subreddit info: {}", e);
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("Failed to parse info for r/{}", subreddit),
                })
            })?;

        debug!("Retrieved info for r/{}", subreddit);
        Ok(subreddit_response.data)
    }

    /// Avatar of `username`, if the account still exists and has one.
    pub async fn get_user_icon(
        &self,
        access_token: &str,
        username: &str,
    ) -> Result<Option<String>, CoreError> {
        let endpoint = format!("/user/{}/about", username);
        let response = self
            .make_request(Method::GET, &endpoint, access_token, None)
            .await?;

        let user: RedditListingChild<RedditUserData> = response.json().await.map_err(|e| {
            error!("Failed to parse user info: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse info for u/{}", username),
            })
        })?;

        Ok(user.data.icon())
    }

    async fn get_listing(
        &self,
        endpoint: &str,
        access_token: &str,
        limit: u32,
    ) -> Result<RedditListing<serde_json::Value>, CoreError> {
        let limit = limit.to_string();
        let params = [("limit", limit.as_str()), ("raw_json", "1")];

        let response = self
            .make_request(Method::GET, endpoint, access_token, Some(&params[..]))
            .await?;

        response.json().await.map_err(|e| {
            error!("Failed to parse listing {}: {}", endpoint, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse listing {}", endpoint),
            })
        })
    }
}

pub fn multireddit(subreddits: &[String]) -> String {
    subreddits.join("+")
}

/// Decodes listing children one by one so a single malformed entry does not
/// discard the rest of the page.
pub fn decode_children<T: DeserializeOwned>(listing: RedditListing<serde_json::Value>) -> Vec<T> {
    listing
        .data
        .children
        .into_iter()
        .filter_map(|child| match serde_json::from_value(child.data) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Skipping malformed {} entry: {}", child.kind, e);
                None
            }
        })
        .collect()
}

fn retry_after_header(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|secs| secs.ceil() as u64)
}

pub(crate) fn status_error(
    status: StatusCode,
    endpoint: &str,
    retry_after: Option<u64>,
) -> RedditApiError {
    match status.as_u16() {
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => RedditApiError::SubredditNotFound {
            subreddit: endpoint.to_string(),
        },
        429 => {
            let retry_after = retry_after.unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    }
}

fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with('/') {
        format!("{}{}", REDDIT_WEB_BASE, permalink)
    } else {
        permalink.to_string()
    }
}

fn fullname(prefix: &str, name: &str, id: &str) -> String {
    if name.is_empty() {
        format!("{}_{}", prefix, id)
    } else {
        name.to_string()
    }
}

fn timestamp(created_utc: f64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(created_utc as i64, 0)
        .single()
        .unwrap_or_default()
}

impl RedditCommentData {
    pub fn into_item(self, community_icon: Option<String>) -> Item {
        Item {
            id: fullname("t1", &self.name, &self.id),
            kind: ItemKind::Comment,
            author: self.author,
            title: None,
            body: self.body,
            community: self.subreddit,
            community_icon,
            author_icon: None,
            permalink: absolute_permalink(&self.permalink),
            created_at: timestamp(self.created_utc),
        }
    }
}

impl RedditPostData {
    pub fn into_item(self, community_icon: Option<String>) -> Item {
        let permalink = if self.permalink.is_empty() {
            self.url
        } else {
            absolute_permalink(&self.permalink)
        };

        Item {
            id: fullname("t3", &self.name, &self.id),
            kind: ItemKind::Post,
            author: self.author,
            title: Some(self.title).filter(|title| !title.is_empty()),
            body: self.selftext,
            community: self.subreddit,
            community_icon,
            author_icon: None,
            permalink,
            created_at: timestamp(self.created_utc),
        }
    }
}
