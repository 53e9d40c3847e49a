//! SQLite-backed TaskStore.
//!
//! Every session opens its own connection to the database file, so a pass's
//! transaction never interleaves with a producer inserting rows from another
//! task. The first write of a session starts a transaction; `commit` ends it
//! and dropping an uncommitted session rolls it back.
//!
//! Statements run on tokio's blocking pool (`spawn_blocking`), so a locked
//! database waiting out the busy timeout never stalls the async executor.
//!
//! Timestamps are stored as INTEGER microseconds since the Unix epoch, which
//! keeps `ORDER BY scheduled_at` and range comparisons exact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::domain::{Eligibility, NewTask, Task, TaskId, TaskKind, TaskStatus};
use crate::error::StoreError;
use crate::ports::{Clock, Session, SystemClock, TaskStore};

/// DDL for the task table. Idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    kind         TEXT    NOT NULL,
    payload      TEXT,
    scheduled_at INTEGER NOT NULL,
    status       TEXT    NOT NULL DEFAULT 'pending',
    attempts     INTEGER NOT NULL DEFAULT 0,
    last_error   TEXT,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_due  ON tasks(status, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_tasks_kind ON tasks(kind);
"#;

const COLUMNS: &str =
    "id, kind, payload, scheduled_at, status, attempts, last_error, created_at, updated_at";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteTaskStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    busy_timeout: Duration,
}

impl SqliteTaskStore {
    /// Use the database file at `path`, creating parent directories as needed.
    /// The schema is not applied; see [`SqliteTaskStore::apply_schema`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            path,
            clock: Arc::new(SystemClock),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        // Fail early on unopenable paths.
        store.connect()?;
        Ok(store)
    }

    /// Open the file named by a `DATABASE_URL`; see [`database_path`].
    pub fn from_database_url(url: &str) -> Result<Self, StoreError> {
        Self::open(database_path(url))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the `tasks` table and its indexes if they are missing.
    pub fn apply_schema(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA_SQL)?;
        debug!(path = %self.path.display(), "task schema applied");
        Ok(())
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        open_connection(&self.path, self.busy_timeout)
    }

    async fn connect_blocking(&self) -> Result<Connection, StoreError> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || open_connection(&path, busy_timeout)).await?
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Path named by a database URL. `sqlite:///relative.db` is relative,
/// `sqlite:////abs/path.db` is absolute, and a bare path is used as is.
pub fn database_path(url: &str) -> PathBuf {
    match url.strip_prefix("sqlite:///") {
        Some(rest) => PathBuf::from(rest),
        None => PathBuf::from(url.strip_prefix("sqlite://").unwrap_or(url)),
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn has_schema(&self) -> Result<bool, StoreError> {
        let conn = self.connect_blocking().await?;
        tokio::task::spawn_blocking(move || {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tasks'",
                [],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await?
    }

    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        Ok(Box::new(SqliteSession {
            conn: Some(self.connect_blocking().await?),
            clock: Arc::clone(&self.clock),
            in_transaction: false,
        }))
    }
}

struct SqliteSession {
    // 操作中は blocking スレッドに貸し出すため Option
    conn: Option<Connection>,
    clock: Arc<dyn Clock>,
    in_transaction: bool,
}

impl SqliteSession {
    /// Run `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&mut self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::Corrupt("session connection was lost".to_string()))?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = op(&conn);
            (conn, result)
        })
        .await?;
        self.conn = Some(conn);
        result
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            self.blocking(|conn| Ok(conn.execute_batch("BEGIN IMMEDIATE")?))
                .await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn query_tasks<P>(&mut self, sql: String, params: P) -> Result<Vec<Task>, StoreError>
    where
        P: rusqlite::Params + Send + 'static,
    {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params, row_to_task)?;
            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(row?);
            }
            Ok(tasks)
        })
        .await
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        if self.in_transaction {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of uncommitted task session failed");
            }
        }
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn eligible(
        &mut self,
        now: DateTime<Utc>,
        rules: &Eligibility,
    ) -> Result<Vec<Task>, StoreError> {
        let stale_cutoff = rules.stale_cutoff(now).map(to_micros);
        let sql = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE scheduled_at <= ?1 \
               AND (status = 'pending' \
                    OR (status = 'error' AND attempts < ?2) \
                    OR (?3 IS NOT NULL AND status = 'running' \
                        AND updated_at <= ?3 AND attempts < ?2)) \
             ORDER BY scheduled_at ASC, id ASC"
        );
        self.query_tasks(sql, (to_micros(now), rules.max_attempts, stale_cutoff))
            .await
    }

    async fn get(&mut self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1");
        self.blocking(move |conn| {
            Ok(conn
                .query_row(&sql, params![id.get()], row_to_task)
                .optional()?)
        })
        .await
    }

    async fn insert(&mut self, task: NewTask) -> Result<TaskId, StoreError> {
        self.begin().await?;
        let now = self.clock.now();
        let scheduled_at = task.scheduled_at.unwrap_or(now);
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO tasks \
                 (kind, payload, scheduled_at, status, attempts, last_error, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, 'pending', 0, NULL, ?4, ?4)",
                params![
                    task.kind.as_str(),
                    task.payload,
                    to_micros(scheduled_at),
                    to_micros(now)
                ],
            )?;
            Ok(TaskId::new(conn.last_insert_rowid()))
        })
        .await
    }

    async fn update(&mut self, task: &Task) -> Result<(), StoreError> {
        self.begin().await?;
        let task = task.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE tasks SET scheduled_at = ?1, status = ?2, attempts = ?3, \
                 last_error = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    to_micros(task.scheduled_at),
                    task.status.as_str(),
                    task.attempts,
                    task.last_error,
                    to_micros(task.updated_at),
                    task.id.get()
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::Corrupt(format!("{} does not exist", task.id)));
            }
            Ok(())
        })
        .await
    }

    async fn exists_kind(&mut self, kind: &TaskKind) -> Result<bool, StoreError> {
        let kind = kind.clone();
        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM tasks WHERE kind = ?1 LIMIT 1",
                    params![kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn find(
        &mut self,
        kind: &TaskKind,
        status: TaskStatus,
    ) -> Result<Vec<Task>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM tasks WHERE kind = ?1 AND status = ?2 ORDER BY id ASC"
        );
        self.query_tasks(sql, (kind.as_str().to_string(), status.as_str()))
            .await
    }

    async fn list(&mut self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM tasks ORDER BY id DESC LIMIT ?1");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_tasks(sql, (limit,)).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            self.blocking(|conn| Ok(conn.execute_batch("COMMIT")?))
                .await?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(4)?;
    let status = status_str
        .parse::<TaskStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Task {
        id: TaskId::new(row.get(0)?),
        kind: TaskKind::new(row.get::<_, String>(1)?),
        payload: row.get(2)?,
        scheduled_at: from_micros(3, row.get(3)?)?,
        status,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        created_at: from_micros(7, row.get(7)?)?,
        updated_at: from_micros(8, row.get(8)?)?,
    })
}
