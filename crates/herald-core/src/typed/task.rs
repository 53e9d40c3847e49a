//! TypedTask: binds a payload type to the kind it is stored under.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{NewTask, TaskKind};

/// A task payload with a fixed kind.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Resize {
///     image: String,
/// }
///
/// impl TypedTask for Resize {
///     const KIND: &'static str = "resize_image";
/// }
/// ```
///
/// - `Serialize`: to build the stored payload text
/// - `DeserializeOwned`: to decode it back at dispatch time
/// - `Send + Sync + 'static`: handlers live behind `Arc` in the registry
pub trait TypedTask: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;

    fn kind() -> TaskKind {
        TaskKind::new(Self::KIND)
    }

    /// The insert-side row for this payload.
    fn to_new_task(&self) -> Result<NewTask, serde_json::Error> {
        NewTask::new(Self::KIND).with_json(self)
    }
}
