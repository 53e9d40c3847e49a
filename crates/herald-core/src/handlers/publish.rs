//! Publishing: post to a network, render previews, record publication.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::BuiltinKind;
use crate::error::HandlerError;
use crate::observability;
use crate::ports::Visibility;
use crate::runtime::TaskContext;
use crate::typed::{Handler, TypedTask};

pub(crate) fn default_network() -> String {
    "mastodon".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPost {
    pub post_id: String,
    pub network: String,
}

impl TypedTask for PublishPost {
    const KIND: &'static str = BuiltinKind::PublishPost.as_str();
}

/// Posts the rendered text as unlisted, then marks the post published.
///
/// Each attempt bumps `posts_published_total` or `posts_failed_total`,
/// labelled with the network.
///
/// Waits `post_delay` after every attempt, successful or not, to stay under
/// the networks' rate limits.
pub struct PublishPostHandler {
    post_delay: Duration,
}

impl PublishPostHandler {
    pub fn new(post_delay: Duration) -> Self {
        Self { post_delay }
    }
}

#[async_trait]
impl Handler<PublishPost> for PublishPostHandler {
    async fn handle(&self, payload: PublishPost, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let posts = ctx.capabilities.posts()?;
        let text = posts
            .render(&payload.post_id, &payload.network)
            .await?
            .ok_or_else(|| HandlerError::NotFound(format!("post {}", payload.post_id)))?;
        let network = ctx
            .capabilities
            .social()
            .get(&payload.network)
            .ok_or_else(|| HandlerError::UnsupportedNetwork(payload.network.clone()))?;

        let outcome = async {
            network.post(&text, Visibility::Unlisted).await?;
            posts.mark_published(&payload.post_id, &payload.network).await
        }
        .await;
        match &outcome {
            Ok(()) => {
                observability::record_post_published(&payload.network);
                info!(post_id = %payload.post_id, network = %payload.network, "post published");
            }
            Err(_) => observability::record_post_failed(&payload.network),
        }

        tokio::time::sleep(self.post_delay).await;
        outcome
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePreview {
    pub post_id: String,
    #[serde(default = "default_network")]
    pub network: String,
}

impl TypedTask for CreatePreview {
    const KIND: &'static str = BuiltinKind::CreatePreview.as_str();
}

pub struct CreatePreviewHandler;

#[async_trait]
impl Handler<CreatePreview> for CreatePreviewHandler {
    async fn handle(&self, payload: CreatePreview, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        ctx.capabilities
            .previews()?
            .create_preview(&payload.post_id, &payload.network)
            .await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPublished {
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub network: String,
}

impl TypedTask for MarkPublished {
    const KIND: &'static str = BuiltinKind::MarkPublished.as_str();
}

pub struct MarkPublishedHandler;

#[async_trait]
impl Handler<MarkPublished> for MarkPublishedHandler {
    async fn handle(&self, payload: MarkPublished, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        if payload.post_id.is_empty() || payload.network.is_empty() {
            return Err(HandlerError::failed("post_id and network are required"));
        }
        ctx.capabilities
            .posts()?
            .mark_published(&payload.post_id, &payload.network)
            .await
    }
}
