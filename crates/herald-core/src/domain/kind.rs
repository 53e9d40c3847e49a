//! Work kinds.
//!
//! A [`TaskKind`] is the string stored with every row and used to select a
//! handler. Kinds the system ships with are also listed in [`BuiltinKind`] so
//! code that enqueues them never has to spell the string by hand. Plugins can
//! still register any other kind at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The builtin kind this string names, if any.
    pub fn builtin(&self) -> Option<BuiltinKind> {
        self.0.parse().ok()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kinds with a handler shipped in [`crate::handlers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    PublishPost,
    CreatePreview,
    IngestFeed,
    MarkPublished,
    SyncRemoteState,
    ReplayFixture,
    PublishCompletedReplays,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 7] = [
        BuiltinKind::PublishPost,
        BuiltinKind::CreatePreview,
        BuiltinKind::IngestFeed,
        BuiltinKind::MarkPublished,
        BuiltinKind::SyncRemoteState,
        BuiltinKind::ReplayFixture,
        BuiltinKind::PublishCompletedReplays,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            BuiltinKind::PublishPost => "publish_post",
            BuiltinKind::CreatePreview => "create_preview",
            BuiltinKind::IngestFeed => "ingest_feed",
            BuiltinKind::MarkPublished => "mark_published",
            BuiltinKind::SyncRemoteState => "sync_remote_state",
            BuiltinKind::ReplayFixture => "replay_fixture",
            BuiltinKind::PublishCompletedReplays => "publish_completed_replays",
        }
    }

    pub fn kind(self) -> TaskKind {
        TaskKind::new(self.as_str())
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BuiltinKind> for TaskKind {
    fn from(kind: BuiltinKind) -> Self {
        kind.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a builtin task kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for BuiltinKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
