//! In-process stand-ins for the capability traits, plus a small harness that
//! runs builtin handlers through a real dispatch pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::app::Dispatcher;
use crate::config::Settings;
use crate::domain::{Eligibility, NewTask, Task, TaskId};
use crate::error::HandlerError;
use crate::impls::InMemoryTaskStore;
use crate::ports::{
    AutomationReplayer, Capabilities, FeedIngestor, FixedClock, PostCatalog, PostRef,
    PreviewRenderer, ReplayRequest, Session, SocialNetwork, TaskStore, Visibility,
};
use crate::runtime::HandlerRegistry;

#[derive(Default)]
pub(crate) struct FakeNetwork {
    pub name: String,
    pub posted: Mutex<Vec<(String, Visibility)>>,
    pub statuses: Vec<String>,
    pub fail_posts: bool,
}

impl FakeNetwork {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SocialNetwork for FakeNetwork {
    fn network(&self) -> &str {
        &self.name
    }

    async fn post(&self, text: &str, visibility: Visibility) -> Result<(), HandlerError> {
        if self.fail_posts {
            return Err(HandlerError::failed("rate limited"));
        }
        self.posted.lock().unwrap().push((text.to_string(), visibility));
        Ok(())
    }


    async fn recent_statuses(&self) -> Result<Vec<String>, HandlerError> {
        Ok(self.statuses.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeCatalog {
    pub texts: HashMap<String, String>,
    pub posts: Vec<PostRef>,
    pub published: Mutex<Vec<(String, String)>>,
}

impl FakeCatalog {
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostCatalog for FakeCatalog {
    async fn render(&self, post_id: &str, _network: &str) -> Result<Option<String>, HandlerError> {
        Ok(self.texts.get(post_id).cloned())
    }

    async fn mark_published(&self, post_id: &str, network: &str) -> Result<(), HandlerError> {
        self.published
            .lock()
            .unwrap()
            .push((post_id.to_string(), network.to_string()));
        Ok(())
    }

    async fn posts(&self) -> Result<Vec<PostRef>, HandlerError> {
        Ok(self.posts.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakePreviews(pub Mutex<Vec<(String, String)>>);

#[async_trait]
impl PreviewRenderer for FakePreviews {
    async fn create_preview(&self, post_id: &str, network: &str) -> Result<(), HandlerError> {
        self.0
            .lock()
            .unwrap()
            .push((post_id.to_string(), network.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeFeed {
    pub runs: Mutex<usize>,
    pub fail: bool,
}

#[async_trait]
impl FeedIngestor for FakeFeed {
    async fn ingest(&self) -> Result<usize, HandlerError> {
        *self.runs.lock().unwrap() += 1;
        if self.fail {
            return Err(HandlerError::failed("feed unreachable"));
        }
        Ok(2)
    }
}

#[derive(Default)]
pub(crate) struct FakeReplayer(pub Mutex<Vec<ReplayRequest>>);

#[async_trait]
impl AutomationReplayer for FakeReplayer {
    async fn replay(&self, request: &ReplayRequest) -> Result<(), HandlerError> {
        self.0.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

/// Builtin handlers over an in-memory store with a fixed clock.
pub(crate) struct Bench {
    pub store: Arc<InMemoryTaskStore>,
    pub clock: Arc<FixedClock>,
    pub dispatcher: Dispatcher,
}

impl Bench {
    pub fn new(capabilities: Capabilities) -> Self {
        let settings = Settings {
            post_delay: std::time::Duration::ZERO,
            ..Settings::default()
        };
        let mut registry = HandlerRegistry::new();
        super::register_builtins(&mut registry, &settings);

        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryTaskStore::with_clock(clock.clone()));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(registry),
            clock.clone(),
            capabilities,
            Eligibility::default(),
        );
        Self {
            store,
            clock,
            dispatcher,
        }
    }

    pub async fn enqueue(&self, kind: &str, payload: serde_json::Value) -> TaskId {
        let mut session = self.store.session().await.unwrap();
        let id = session
            .insert(NewTask::new(kind).with_payload(payload.to_string()))
            .await
            .unwrap();
        session.commit().await.unwrap();
        id
    }

    /// One pass; returns the row afterwards.
    pub async fn run(&self, id: TaskId) -> Task {
        self.dispatcher.process_pending().await.unwrap();
        self.store.task(id).await.unwrap()
    }
}
