//! Recorded browser automations and the publication they lead to.
//!
//! A `replay_fixture` row drives the automation; a recurring
//! `publish_completed_replays` row later turns every completed replay that
//! names a post into a publication record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{BuiltinKind, TaskStatus};
use crate::error::HandlerError;
use crate::ports::ReplayRequest;
use crate::runtime::TaskContext;
use crate::typed::{Handler, TypedTask};

impl TypedTask for ReplayRequest {
    const KIND: &'static str = BuiltinKind::ReplayFixture.as_str();
}

pub struct ReplayFixtureHandler;

#[async_trait]
impl Handler<ReplayRequest> for ReplayFixtureHandler {
    async fn handle(&self, payload: ReplayRequest, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        if payload.fixture.is_empty() {
            return Err(HandlerError::failed("fixture is required"));
        }
        ctx.capabilities.replayer()?.replay(&payload).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishCompletedReplays {}

impl TypedTask for PublishCompletedReplays {
    const KIND: &'static str = BuiltinKind::PublishCompletedReplays.as_str();
}

pub struct PublishCompletedReplaysHandler;

#[async_trait]
impl Handler<PublishCompletedReplays> for PublishCompletedReplaysHandler {
    async fn handle(
        &self,
        _payload: PublishCompletedReplays,
        ctx: &mut TaskContext<'_>,
    ) -> Result<(), HandlerError> {
        let posts = ctx.capabilities.posts()?;
        let replays = ctx
            .session
            .find(&ReplayRequest::kind(), TaskStatus::Completed)
            .await?;

        for replay in replays {
            let request: ReplayRequest = match replay.payload_json() {
                Ok(request) => request,
                Err(e) => {
                    warn!(task_id = %replay.id, error = %e, "skipping replay with unreadable payload");
                    continue;
                }
            };
            let (Some(post_id), Some(network)) = (request.post_id, request.network) else {
                continue;
            };
            if post_id.is_empty() || network.is_empty() {
                continue;
            }
            posts.mark_published(&post_id, &network).await?;
            debug!(task_id = %replay.id, %post_id, %network, "replay published");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::fakes::{Bench, FakeCatalog, FakeReplayer};
    use crate::ports::Capabilities;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn replay_passes_the_request_through() {
        let replayer = Arc::new(FakeReplayer::default());
        let bench = Bench::new(Capabilities::new().with_replayer(replayer.clone()));
        let id = bench
            .enqueue(
                "replay_fixture",
                json!({"name": "medium_login", "post_id": "p1", "network": "medium"}),
            )
            .await;

        assert_eq!(bench.run(id).await.status, TaskStatus::Completed);
        let seen = replayer.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].fixture, "medium_login");
        assert_eq!(seen[0].post_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn replay_without_fixture_fails() {
        let bench = Bench::new(Capabilities::new().with_replayer(Arc::new(FakeReplayer::default())));
        let id = bench.enqueue("replay_fixture", json!({"post_id": "p1"})).await;

        let task = bench.run(id).await;
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.last_error.as_deref(), Some("fixture is required"));
    }

    #[tokio::test]
    async fn completed_replays_are_published() {
        let posts = Arc::new(FakeCatalog::default());
        let bench = Bench::new(
            Capabilities::new()
                .with_posts(posts.clone())
                .with_replayer(Arc::new(FakeReplayer::default())),
        );
        bench
            .enqueue("replay_fixture", json!({"fixture": "a", "post_id": "p1", "network": "medium"}))
            .await;
        bench.enqueue("replay_fixture", json!({"fixture": "b"})).await;
        bench
            .dispatcher
            .process_pending()
            .await
            .unwrap();
        assert!(posts.published().is_empty());

        let scan = bench.enqueue("publish_completed_replays", json!({})).await;
        let task = bench.run(scan).await;

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(posts.published(), vec![("p1".to_string(), "medium".to_string())]);
    }
}
