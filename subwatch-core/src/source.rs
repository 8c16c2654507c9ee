use crate::error::CoreError;
use crate::types::{Item, Notification};
use async_trait::async_trait;

/// Supplies candidate items for one poll cycle. Every call is a fresh fetch.
#[async_trait]
pub trait ContentSource: Send {
    async fn fetch_items(
        &mut self,
        search_term: &str,
        subreddits: &[String],
    ) -> Result<Vec<Item>, CoreError>;
}

/// Delivers a notification for a relevant item.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), CoreError>;
}
