//! Capabilities handed to handlers.
//!
//! The core never talks to a social network, a feed or a browser itself.
//! Handlers reach those collaborators through the narrow traits below, bundled
//! in [`Capabilities`] and passed along with every dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
        }
    }
}

/// A social network client.
#[async_trait]
pub trait SocialNetwork: Send + Sync {
    /// Registry key, e.g. `"mastodon"`.
    fn network(&self) -> &str;

    async fn post(&self, text: &str, visibility: Visibility) -> Result<(), HandlerError>;

    /// Text of the account's recent statuses, newest first.
    async fn recent_statuses(&self) -> Result<Vec<String>, HandlerError>;
}

/// Social network clients by name. Registering a name twice keeps the last one.
#[derive(Clone, Default)]
pub struct SocialRegistry {
    networks: HashMap<String, Arc<dyn SocialNetwork>>,
}

impl SocialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, network: Arc<dyn SocialNetwork>) {
        self.networks.insert(network.network().to_string(), network);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SocialNetwork>> {
        self.networks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for SocialRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialRegistry")
            .field("networks", &self.names())
            .finish()
    }
}

/// Just enough of a post to match it against remote statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub id: String,
    pub link: String,
}

/// Read/write access to the posts the system publishes.
#[async_trait]
pub trait PostCatalog: Send + Sync {
    /// Text to publish for `post_id` on `network`, or `None` if the post is unknown.
    async fn render(&self, post_id: &str, network: &str) -> Result<Option<String>, HandlerError>;

    async fn mark_published(&self, post_id: &str, network: &str) -> Result<(), HandlerError>;

    async fn posts(&self) -> Result<Vec<PostRef>, HandlerError>;
}

#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn create_preview(&self, post_id: &str, network: &str) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait FeedIngestor: Send + Sync {
    /// Pull the feed once; returns how many new posts were stored.
    async fn ingest(&self) -> Result<usize, HandlerError>;
}

/// What to replay and, when the replay publishes something, for which post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRequest {
    #[serde(default, alias = "name")]
    pub fixture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// Drives a recorded browser automation.
#[async_trait]
pub trait AutomationReplayer: Send + Sync {
    async fn replay(&self, request: &ReplayRequest) -> Result<(), HandlerError>;
}

/// Everything a handler may call out to.
#[derive(Clone, Default)]
pub struct Capabilities {
    social: SocialRegistry,
    posts: Option<Arc<dyn PostCatalog>>,
    previews: Option<Arc<dyn PreviewRenderer>>,
    feed: Option<Arc<dyn FeedIngestor>>,
    replayer: Option<Arc<dyn AutomationReplayer>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_social(mut self, network: Arc<dyn SocialNetwork>) -> Self {
        self.social.register(network);
        self
    }

    pub fn with_posts(mut self, posts: Arc<dyn PostCatalog>) -> Self {
        self.posts = Some(posts);
        self
    }

    pub fn with_previews(mut self, previews: Arc<dyn PreviewRenderer>) -> Self {
        self.previews = Some(previews);
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn FeedIngestor>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_replayer(mut self, replayer: Arc<dyn AutomationReplayer>) -> Self {
        self.replayer = Some(replayer);
        self
    }

    pub fn social(&self) -> &SocialRegistry {
        &self.social
    }

    pub fn posts(&self) -> Result<&dyn PostCatalog, HandlerError> {
        self.posts
            .as_deref()
            .ok_or(HandlerError::MissingCapability("posts"))
    }

    pub fn previews(&self) -> Result<&dyn PreviewRenderer, HandlerError> {
        self.previews
            .as_deref()
            .ok_or(HandlerError::MissingCapability("previews"))
    }

    pub fn feed(&self) -> Result<&dyn FeedIngestor, HandlerError> {
        self.feed
            .as_deref()
            .ok_or(HandlerError::MissingCapability("feed"))
    }

    pub fn replayer(&self) -> Result<&dyn AutomationReplayer, HandlerError> {
        self.replayer
            .as_deref()
            .ok_or(HandlerError::MissingCapability("replayer"))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("social", &self.social)
            .field("posts", &self.posts.is_some())
            .field("previews", &self.previews.is_some())
            .field("feed", &self.feed.is_some())
            .field("replayer", &self.replayer.is_some())
            .finish()
    }
}
