#![forbid(unsafe_code)]

mod catalog;
mod chains;
mod error;
mod history;

pub use error::StoreError;

use isida_core::{Chain, ChainId, NodeId};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DB_FILE: &str = "isida_chains.db";
const SCHEMA_VERSION: i64 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSummary {
    pub id: ChainId,
    pub name: String,
    pub bound_node_id: Option<NodeId>,
    pub links: usize,
    pub revision: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainRevision {
    pub revision: i64,
    pub saved_at_ms: i64,
}

/// SQLite-backed chain store, action catalog and tree index.
///
/// Chain writes are staged in memory and written by `save_all` in a single
/// transaction.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    staged: Vec<Chain>,
    strict_actions: bool,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;
        info!(path = %db_path.display(), "chain store opened");

        Ok(Self {
            conn,
            storage_dir,
            staged: Vec::new(),
            strict_actions: false,
        })
    }

    /// When set, saves through a session are checked against the action catalog.
    pub fn with_strict_actions(mut self, strict: bool) -> Self {
        self.strict_actions = strict;
        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Number of staged chain writes waiting for `save_all`.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }
    if !tables.contains("store_state") {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: store state table is missing",
        ));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(SCHEMA_VERSION) => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          last_chain_id INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chains (
          id INTEGER PRIMARY KEY CHECK(id > 0),
          name TEXT NOT NULL,
          description TEXT NOT NULL DEFAULT '',
          bound_node_id INTEGER UNIQUE,
          link_high_water INTEGER NOT NULL DEFAULT 0,
          revision INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chain_links (
          chain_id INTEGER NOT NULL,
          link_id INTEGER NOT NULL CHECK(link_id > 0),
          action_ref INTEGER NOT NULL,
          success_next INTEGER NOT NULL DEFAULT 0,
          failure_next INTEGER NOT NULL DEFAULT 0,
          success_threshold INTEGER NOT NULL,
          description TEXT NOT NULL DEFAULT '',
          PRIMARY KEY(chain_id, link_id),
          FOREIGN KEY(chain_id) REFERENCES chains(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS chain_revisions (
          chain_id INTEGER NOT NULL,
          revision INTEGER NOT NULL,
          saved_at_ms INTEGER NOT NULL,
          snapshot_json TEXT NOT NULL,
          PRIMARY KEY(chain_id, revision),
          FOREIGN KEY(chain_id) REFERENCES chains(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS action_images (
          id INTEGER PRIMARY KEY CHECK(id > 0),
          name TEXT NOT NULL,
          description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS tree_nodes (
          id INTEGER PRIMARY KEY,
          parent_id INTEGER,
          label TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO store_state(\
           singleton, schema_version, last_chain_id, created_at_ms\
         ) VALUES (1, ?1, 0, ?2)",
        rusqlite::params![SCHEMA_VERSION, now_ms()],
    )?;
    Ok(())
}

fn chain_id_from_sql(value: i64) -> Result<ChainId, StoreError> {
    ChainId::try_new(value).map_err(|_| StoreError::InvalidInput("stored chain id is not positive"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
