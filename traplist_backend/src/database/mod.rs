pub mod models;
pub mod repositories;

use crate::config::TraplistPaths;
use anyhow::{anyhow, Result};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS items (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        creators TEXT NOT NULL DEFAULT '[]',
        item_type TEXT NOT NULL DEFAULT '',
        categories TEXT NOT NULL DEFAULT '[]',
        date TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'in_review',
        comment_count INTEGER NOT NULL DEFAULT 0,
        rating_average REAL NOT NULL DEFAULT 0,
        rating_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_activity_at TEXT NOT NULL,
        parent_id TEXT,
        thread_id TEXT NOT NULL,
        depth INTEGER NOT NULL CHECK (depth IN (0, 1)),
        reply_count INTEGER NOT NULL DEFAULT 0,
        like_count INTEGER NOT NULL DEFAULT 0,
        dislike_count INTEGER NOT NULL DEFAULT 0,
        score INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'visible',
        FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_comments_roots
        ON comments(item_id, depth, score DESC, created_at ASC, id ASC);
    CREATE INDEX IF NOT EXISTS idx_comments_thread ON comments(thread_id, created_at);

    CREATE TABLE IF NOT EXISTS comment_votes (
        comment_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        value INTEGER NOT NULL CHECK (value IN (-1, 1)),
        updated_at TEXT NOT NULL,
        PRIMARY KEY (comment_id, user_id),
        FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS item_ratings (
        item_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        value INTEGER NOT NULL CHECK (value BETWEEN 0 AND 6),
        updated_at TEXT NOT NULL,
        PRIMARY KEY (item_id, user_id),
        FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS rate_limits (
        key TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        action TEXT NOT NULL,
        window_start INTEGER NOT NULL,
        count INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS profiles (
        user_id TEXT PRIMARY KEY,
        display_name TEXT,
        photo_url TEXT,
        is_anonymous INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_items_status_date ON items(status, date);
"#;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    newly_created: bool,
}

impl Database {
    pub fn connect(paths: &TraplistPaths) -> Result<Self> {
        let newly_created = !paths.db_path.exists();
        let conn = Connection::open(&paths.db_path)?;
        Ok(Self::from_connection(conn, newly_created))
    }

    pub fn from_connection(conn: Connection, newly_created: bool) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            newly_created,
        }
    }

    /// Opens a private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let db = Self::from_connection(Connection::open_in_memory()?, true);
        db.ensure_migrations()?;
        Ok(db)
    }

    pub fn ensure_migrations(&self) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })?;
        Ok(self.newly_created)
    }

    /// Runs `f` against the repositories without opening a transaction.
    /// The connection lock is held for the whole call, so several reads in
    /// one closure never observe a write made in between.
    pub fn with_repositories<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| E::from(anyhow!("database mutex poisoned")))?;
        f(repositories::SqliteRepositories::new(&guard))
    }

    /// Runs `f` inside an IMMEDIATE transaction. The write lock is taken up
    /// front so concurrent read-modify-write cycles serialize; any error rolls
    /// the whole transaction back.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(repositories::SqliteRepositories<'_>) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| E::from(anyhow!("database mutex poisoned")))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| E::from(anyhow::Error::from(err).context("failed to begin transaction")))?;
        let value = f(repositories::SqliteRepositories::new(&tx))?;
        tx.commit()
            .map_err(|err| E::from(anyhow::Error::from(err).context("failed to commit transaction")))?;
        Ok(value)
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))?;
        f(&guard)
    }
}
