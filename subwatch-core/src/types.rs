use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Avatar used when a subreddit has no icon of its own.
pub const DEFAULT_COMMUNITY_ICON: &str =
    "https://www.redditstatic.com/desktop2x/img/favicon/android-icon-192x192.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Comment,
    Post,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Comment => write!(f, "comment"),
            ItemKind::Post => write!(f, "post"),
        }
    }
}

/// A comment or post that matched the search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub author: String,
    pub title: Option<String>,
    pub body: String,
    pub community: String,
    pub community_icon: Option<String>,
    pub author_icon: Option<String>,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Text that search matching and relevance checks operate on.
    pub fn text(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() && !self.body.is_empty() => {
                format!("{}\n\n{}", title, self.body)
            }
            Some(title) if !title.is_empty() => title.clone(),
            _ => self.body.clone(),
        }
    }

    pub fn matches(&self, search_term: &str) -> bool {
        let needle = search_term.trim().to_lowercase();
        !needle.is_empty() && self.text().to_lowercase().contains(&needle)
    }
}

/// Outcome of a single relevance classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    Relevant,
    NotRelevant,
    Unknown,
}

/// Message delivered for a relevant item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub community: String,
    pub community_icon: Option<String>,
    pub author: String,
    pub author_icon: Option<String>,
    pub excerpt: String,
    pub permalink: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_item(item: &Item, excerpt_length: usize) -> Self {
        Self {
            title: format!("New {} in r/{}", item.kind, item.community),
            community: item.community.clone(),
            community_icon: item.community_icon.clone(),
            author: item.author.clone(),
            author_icon: item.author_icon.clone(),
            excerpt: excerpt(&item.text(), excerpt_length),
            permalink: item.permalink.clone(),
            created_at: item.created_at,
        }
    }

    pub fn avatar_url(&self) -> &str {
        self.community_icon
            .as_deref()
            .filter(|icon| !icon.is_empty())
            .unwrap_or(DEFAULT_COMMUNITY_ICON)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} by u/{}: {} ({})",
            self.title, self.author, self.excerpt, self.permalink
        )
    }
}

/// Truncates `text` to at most `max_chars` characters, marking the cut with `" ..."`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{} ...", &text[..cut]),
        None => text.to_string(),
    }
}
