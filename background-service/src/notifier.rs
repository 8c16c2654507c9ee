use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use subwatch_core::{CoreError, Notification, Notifier, NotifyError};
use tracing::{error, info};

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    pub avatar_url: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub timestamp: String,
    pub author: EmbedAuthor,
}

#[derive(Debug, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl WebhookPayload {
    pub fn from_notification(notification: &Notification) -> Self {
        // Deleted accounts have no profile page.
        let author_url = match notification.author.as_str() {
            "" | "[deleted]" => None,
            name => Some(format!("https://reddit.com/u/{}", name)),
        };

        Self {
            username: format!("r/{}", notification.community),
            avatar_url: notification.avatar_url().to_string(),
            embeds: vec![Embed {
                title: notification.title.clone(),
                description: notification.excerpt.clone(),
                url: notification.permalink.clone(),
                timestamp: notification.created_at.to_rfc3339(),
                author: EmbedAuthor {
                    name: format!("u/{}", notification.author),
                    url: author_url,
                    icon_url: notification.author_icon.clone(),
                },
            }],
        }
    }
}

/// Posts notifications to a Discord channel webhook.
pub struct DiscordWebhook {
    url: String,
    http_client: Client,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::Internal {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self::with_client(url, http_client))
    }

    pub fn with_client(url: impl Into<String>, http_client: Client) -> Self {
        Self {
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn notify(&self, notification: &Notification) -> Result<(), CoreError> {
        let payload = WebhookPayload::from_notification(notification);

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                // The webhook URL embeds its secret token.
                let e = e.without_url();
                error!("Discord webhook unreachable: {}", e);
                CoreError::Notify(NotifyError::Delivery {
                    reason: e.to_string(),
                })
            })?;

        let status = response.status();
        if status.is_success() {
            info!("Discord POST status: {} for {}", status, notification.permalink);
            return Ok(());
        }

        error!("Discord POST status: {} for {}", status, notification.permalink);

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(1);
            return Err(CoreError::Notify(NotifyError::RateLimited { retry_after }));
        }

        Err(CoreError::Notify(NotifyError::Rejected {
            status: status.as_u16(),
        }))
    }
}
