#![forbid(unsafe_code)]

use super::*;
use rusqlite::{Transaction, params};

impl SqliteStore {
    /// Committed revisions of chain `id`, oldest first.
    pub fn chain_revisions(&self, id: ChainId) -> Result<Vec<ChainRevision>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT revision, saved_at_ms FROM chain_revisions \
             WHERE chain_id = ?1 ORDER BY revision",
        )?;
        let mut rows = stmt.query(params![id.get()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ChainRevision {
                revision: row.get(0)?,
                saved_at_ms: row.get(1)?,
            });
        }
        Ok(out)
    }

    pub fn chain_at_revision(
        &self,
        id: ChainId,
        revision: i64,
    ) -> Result<Option<Chain>, StoreError> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT snapshot_json FROM chain_revisions WHERE chain_id = ?1 AND revision = ?2",
                params![id.get(), revision],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match snapshot {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

pub(super) fn record_revision_tx(
    tx: &Transaction<'_>,
    id: ChainId,
    revision: i64,
    chain: &Chain,
    now_ms: i64,
) -> Result<(), StoreError> {
    let snapshot = serde_json::to_string(chain)?;
    tx.execute(
        "INSERT INTO chain_revisions(chain_id, revision, saved_at_ms, snapshot_json) \
         VALUES (?1, ?2, ?3, ?4)",
        params![id.get(), revision, now_ms, snapshot],
    )?;
    Ok(())
}
