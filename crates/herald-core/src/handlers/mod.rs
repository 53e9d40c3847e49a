//! Handlers shipped with herald, one per [`BuiltinKind`].
//!
//! Each handler is a [`TypedTask`](crate::typed::TypedTask) payload plus a
//! [`Handler`](crate::typed::Handler) implementation; they only reach the
//! outside world through [`Capabilities`](crate::ports::Capabilities).

pub mod feed;
pub mod publish;
pub mod replay;
pub mod sync;

#[cfg(test)]
pub(crate) mod fakes;

use crate::config::Settings;
use crate::domain::{BuiltinKind, RecurrencePolicy};
use crate::runtime::HandlerRegistry;

pub use self::feed::{IngestFeed, IngestFeedHandler};
pub use self::publish::{
    CreatePreview, CreatePreviewHandler, MarkPublished, MarkPublishedHandler, PublishPost,
    PublishPostHandler,
};
pub use self::replay::{PublishCompletedReplays, PublishCompletedReplaysHandler, ReplayFixtureHandler};
pub use self::sync::{SyncRemoteState, SyncRemoteStateHandler};

/// Kinds that must always have a row, so their recurrence chain exists.
pub const SEED_KINDS: [BuiltinKind; 2] = [
    BuiltinKind::IngestFeed,
    BuiltinKind::PublishCompletedReplays,
];

/// Register every builtin handler. Recurring kinds re-read their interval
/// from the environment each time they reschedule.
pub fn register_builtins(registry: &mut HandlerRegistry, settings: &Settings) {
    registry.register_typed::<PublishPost, _>(
        PublishPostHandler::new(settings.post_delay),
        RecurrencePolicy::Once,
    );
    registry.register_typed::<CreatePreview, _>(CreatePreviewHandler, RecurrencePolicy::Once);
    registry.register_typed::<IngestFeed, _>(
        IngestFeedHandler,
        RecurrencePolicy::Every(settings.ingest_interval_source()),
    );
    registry.register_typed::<MarkPublished, _>(MarkPublishedHandler, RecurrencePolicy::Once);
    registry.register_typed::<SyncRemoteState, _>(SyncRemoteStateHandler, RecurrencePolicy::Once);
    registry.register_typed::<crate::ports::ReplayRequest, _>(
        ReplayFixtureHandler,
        RecurrencePolicy::Once,
    );
    registry.register_typed::<PublishCompletedReplays, _>(
        PublishCompletedReplaysHandler,
        RecurrencePolicy::Every(settings.replay_check_interval_source()),
    );
}
