//! Capabilities that only log what they would do.
//!
//! `herald run` wires these in so the builtin handlers can be exercised end
//! to end without network credentials.

use std::sync::Arc;

use async_trait::async_trait;
use herald_core::HandlerError;
use herald_core::ports::{
    AutomationReplayer, Capabilities, FeedIngestor, PostCatalog, PostRef,
    PreviewRenderer, ReplayRequest, SocialNetwork, Visibility,
};
use tracing::info;

struct LogNetwork(&'static str);

#[async_trait]
impl SocialNetwork for LogNetwork {
    fn network(&self) -> &str {
        self.0
    }

    async fn post(&self, text: &str, visibility: Visibility) -> Result<(), HandlerError> {
        info!(network = self.0, visibility = visibility.as_str(), %text, "would post");
        Ok(())
    }


    async fn recent_statuses(&self) -> Result<Vec<String>, HandlerError> {
        Ok(Vec::new())
    }
}

struct LogCatalog;

#[async_trait]
impl PostCatalog for LogCatalog {
    async fn render(&self, post_id: &str, network: &str) -> Result<Option<String>, HandlerError> {
        Ok(Some(format!("[{network}] post {post_id}")))
    }

    async fn mark_published(&self, post_id: &str, network: &str) -> Result<(), HandlerError> {
        info!(%post_id, %network, "would mark published");
        Ok(())
    }

    async fn posts(&self) -> Result<Vec<PostRef>, HandlerError> {
        Ok(Vec::new())
    }
}

struct LogPreviews;

#[async_trait]
impl PreviewRenderer for LogPreviews {
    async fn create_preview(&self, post_id: &str, network: &str) -> Result<(), HandlerError> {
        info!(%post_id, %network, "would render preview");
        Ok(())
    }
}

struct LogFeed;

#[async_trait]
impl FeedIngestor for LogFeed {
    async fn ingest(&self) -> Result<usize, HandlerError> {
        info!("would ingest feed");
        Ok(0)
    }
}

struct LogReplayer;

#[async_trait]
impl AutomationReplayer for LogReplayer {
    async fn replay(&self, request: &ReplayRequest) -> Result<(), HandlerError> {
        info!(fixture = %request.fixture, post_id = ?request.post_id, "would replay fixture");
        Ok(())
    }
}

pub fn capabilities() -> Capabilities {
    Capabilities::new()
        .with_social(Arc::new(LogNetwork("mastodon")))
        .with_social(Arc::new(LogNetwork("medium")))
        .with_posts(Arc::new(LogCatalog))
        .with_previews(Arc::new(LogPreviews))
        .with_feed(Arc::new(LogFeed))
        .with_replayer(Arc::new(LogReplayer))
}
