use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::publish::default_network;
use crate::domain::BuiltinKind;
use crate::error::HandlerError;
use crate::ports::PostRef;
use crate::runtime::TaskContext;
use crate::typed::{Handler, TypedTask};

/// Reconcile the catalog with what is already live on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRemoteState {
    #[serde(default = "default_network")]
    pub network: String,
}

impl TypedTask for SyncRemoteState {
    const KIND: &'static str = BuiltinKind::SyncRemoteState.as_str();
}

/// Marks every post whose link or id shows up in a recent status as published.
pub struct SyncRemoteStateHandler;

#[async_trait]
impl Handler<SyncRemoteState> for SyncRemoteStateHandler {
    async fn handle(&self, payload: SyncRemoteState, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let network = ctx
            .capabilities
            .social()
            .get(&payload.network)
            .ok_or_else(|| HandlerError::UnsupportedNetwork(payload.network.clone()))?;
        let posts = ctx.capabilities.posts()?;

        let statuses = network.recent_statuses().await?;
        debug!(network = %payload.network, statuses = statuses.len(), "fetched remote statuses");

        let mut matched = 0usize;
        for post in posts.posts().await? {
            if appears_in(&post, &statuses) {
                posts.mark_published(&post.id, &payload.network).await?;
                matched += 1;
            }
        }
        info!(network = %payload.network, matched, "remote state synced");
        Ok(())
    }
}

fn appears_in(post: &PostRef, statuses: &[String]) -> bool {
    let needles = [post.link.as_str(), post.id.as_str()];
    statuses.iter().any(|status| {
        needles
            .iter()
            .any(|needle| !needle.is_empty() && status.contains(needle))
    })
}
