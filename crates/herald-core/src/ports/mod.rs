//! Ports: the interfaces the scheduler core consumes from its collaborators.

pub mod capabilities;
pub mod clock;
pub mod task_store;

pub use self::capabilities::{
    AutomationReplayer, Capabilities, FeedIngestor, PostCatalog, PostRef,
    PreviewRenderer, ReplayRequest, SocialNetwork, SocialRegistry, Visibility,
};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::task_store::{Session, TaskStore};
