use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::BuiltinKind;
use crate::error::HandlerError;
use crate::runtime::TaskContext;
use crate::typed::{Handler, TypedTask};

/// Pull the configured feed once. Registered as recurring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFeed {}

impl TypedTask for IngestFeed {
    const KIND: &'static str = BuiltinKind::IngestFeed.as_str();
}

pub struct IngestFeedHandler;

#[async_trait]
impl Handler<IngestFeed> for IngestFeedHandler {
    async fn handle(&self, _payload: IngestFeed, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let stored = ctx.capabilities.feed()?.ingest().await?;
        info!(new_posts = stored, "feed ingested");
        Ok(())
    }
}
