//! Handler<T>: a handler that receives its payload already decoded.
//!
//! `TypedHandler<T, H>` erases `T` so typed handlers sit in the same
//! registry as plain [`TaskHandler`]s.

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::TypedTask;
use crate::domain::Task;
use crate::error::HandlerError;
use crate::runtime::{TaskContext, TaskHandler};

/// Runs one decoded payload of type `T`.
///
/// `Handler<PublishPost>` only ever sees rows stored under
/// `PublishPost::KIND`; the pairing is fixed at registration.
#[async_trait]
pub trait Handler<T: TypedTask>: Send + Sync {
    async fn handle(&self, payload: T, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError>;
}

pub struct TypedHandler<T: TypedTask, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TypedTask, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TypedTask, H: Handler<T>> TaskHandler for TypedHandler<T, H> {
    async fn handle(&self, task: &Task, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let payload: T = task.payload_json()?;
        self.handler.handle(payload, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskId};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::{Capabilities, SystemClock, TaskStore};
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize)]
    struct Greet {
        name: String,
    }

    impl TypedTask for Greet {
        const KIND: &'static str = "greet";
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Handler<Greet> for Recorder {
        async fn handle(&self, payload: Greet, _ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
            self.0.lock().unwrap().push(payload.name);
            Ok(())
        }
    }

    async fn run(payload: Option<&str>) -> (Result<(), HandlerError>, Vec<String>) {
        let store = InMemoryTaskStore::new();
        let mut session = store.session().await.unwrap();
        let mut row = NewTask::new(Greet::KIND);
        if let Some(p) = payload {
            row = row.with_payload(p);
        }
        let task = row.into_task(TaskId::new(1), chrono::Utc::now());

        let typed = TypedHandler::<Greet, _>::new(Recorder::default());
        let caps = Capabilities::default();
        let mut ctx = TaskContext::new(session.as_mut(), &SystemClock, &caps);
        let result = typed.handle(&task, &mut ctx).await;
        let seen = typed.handler.0.lock().unwrap().clone();
        (result, seen)
    }

    #[tokio::test]
    async fn decodes_payload_before_calling_handler() {
        let (result, seen) = run(Some(r#"{"name":"ada"}"#)).await;
        assert!(result.is_ok());
        assert_eq!(seen, vec!["ada".to_string()]);
    }

    #[tokio::test]
    async fn decode_failure_is_a_handler_failure() {
        let (result, seen) = run(Some(r#"{"nom":"ada"}"#)).await;
        assert!(matches!(result, Err(HandlerError::Payload(_))));
        assert!(seen.is_empty());
    }
}
