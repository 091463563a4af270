#![forbid(unsafe_code)]

use super::history::record_revision_tx;
use super::*;
use isida_core::{ActionCatalog, AddedChain, ChainStore, Link, LinkId};
use rusqlite::{Transaction, params};
use tracing::{debug, info, warn};

impl SqliteStore {
    pub fn list_chains(&self) -> Result<Vec<ChainSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.bound_node_id, \
                    (SELECT COUNT(*) FROM chain_links l WHERE l.chain_id = c.id), \
                    c.revision, c.updated_at_ms \
             FROM chains c ORDER BY c.id",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let links: i64 = row.get(3)?;
            out.push(ChainSummary {
                id: chain_id_from_sql(row.get(0)?)?,
                name: row.get(1)?,
                bound_node_id: row.get(2)?,
                links: usize::try_from(links).unwrap_or(0),
                revision: row.get(4)?,
                updated_at_ms: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// The committed chain bound to `node_id`, if any.
    pub fn chain_for_node(&self, node_id: NodeId) -> Result<Option<ChainId>, StoreError> {
        self.conn
            .query_row(
                "SELECT id FROM chains WHERE bound_node_id = ?1",
                params![node_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(chain_id_from_sql)
            .transpose()
    }

    fn reserve_chain_id(&self) -> Result<ChainId, StoreError> {
        let committed: i64 = self.conn.query_row(
            "SELECT MAX(last_chain_id, COALESCE((SELECT MAX(id) FROM chains), 0)) \
             FROM store_state WHERE singleton = 1",
            [],
            |row| row.get(0),
        )?;
        let staged = self
            .staged
            .iter()
            .filter_map(|chain| chain.id.map(ChainId::get))
            .max()
            .unwrap_or(0);
        chain_id_from_sql(committed.max(staged).saturating_add(1))
    }

    fn is_known(&self, id: ChainId) -> Result<bool, StoreError> {
        if self.staged.iter().any(|chain| chain.id == Some(id)) {
            return Ok(true);
        }
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM chains WHERE id = ?1",
                params![id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Stages `chain`, replacing an earlier staged copy. A node holds one chain:
    /// taking a node from another chain moves the binding and yields a warning.
    fn stage(&mut self, chain: Chain) -> Result<Vec<String>, StoreError> {
        let id = chain
            .id
            .ok_or(StoreError::InvalidInput("staged chain has no id"))?;
        let mut warnings = Vec::new();

        if let Some(node_id) = chain.bound_node_id {
            for other in self
                .staged
                .iter_mut()
                .filter(|other| other.id != Some(id) && other.bound_node_id == Some(node_id))
            {
                other.bound_node_id = None;
                if let Some(other_id) = other.id {
                    warnings.push(binding_moved(node_id, other_id, id));
                }
            }

            if let Some(holder) = self.chain_for_node(node_id)? {
                let holder_staged = self.staged.iter().any(|other| other.id == Some(holder));
                if holder != id && !holder_staged {
                    warnings.push(binding_moved(node_id, holder, id));
                }
            }
        }

        for warning in &warnings {
            warn!(chain_id = %id, "{warning}");
        }

        match self.staged.iter_mut().find(|staged| staged.id == Some(id)) {
            Some(slot) => *slot = chain,
            None => self.staged.push(chain),
        }
        debug!(chain_id = %id, staged = self.staged.len(), "chain staged");
        Ok(warnings)
    }
}

fn binding_moved(node_id: NodeId, from: ChainId, to: ChainId) -> String {
    format!("tree node {node_id} was bound to chain {from}; binding moves to chain {to}")
}

impl ChainStore for SqliteStore {
    type Error = StoreError;

    fn get_chain(&self, id: ChainId) -> Result<Option<Chain>, StoreError> {
        load_chain(&self.conn, id)
    }

    fn add_chain(
        &mut self,
        name: &str,
        description: &str,
        links: &[Link],
        bound_node_id: Option<NodeId>,
    ) -> Result<AddedChain, StoreError> {
        let id = self.reserve_chain_id()?;
        let chain = Chain::from_parts(Some(id), name, description, bound_node_id, links.to_vec());
        let warnings = self.stage(chain)?;
        Ok(AddedChain { id, warnings })
    }

    fn update_chain(&mut self, chain: &Chain) -> Result<Vec<String>, StoreError> {
        let id = chain
            .id
            .ok_or(StoreError::InvalidInput("chain has no id; add it first"))?;
        if !self.is_known(id)? {
            return Err(StoreError::UnknownId);
        }
        self.stage(chain.clone())
    }

    /// Writes every staged chain in one transaction. On failure nothing is
    /// written and the staged set is dropped.
    fn save_all(&mut self) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(());
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let mut last_id = 0i64;
        for chain in &staged {
            let id = chain
                .id
                .ok_or(StoreError::InvalidInput("staged chain has no id"))?;
            write_chain_tx(&tx, id, chain, now_ms)?;
            last_id = last_id.max(id.get());
        }
        tx.execute(
            "UPDATE store_state SET last_chain_id = MAX(last_chain_id, ?1) WHERE singleton = 1",
            params![last_id],
        )?;
        tx.commit()?;

        info!(chains = staged.len(), "staged chains committed");
        Ok(())
    }

    fn remove_chain(&mut self, id: ChainId) -> Result<bool, StoreError> {
        let before = self.staged.len();
        self.staged.retain(|chain| chain.id != Some(id));
        let was_staged = self.staged.len() != before;

        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM chains WHERE id = ?1", params![id.get()])?;
        tx.commit()?;

        let existed = removed > 0 || was_staged;
        if existed {
            info!(chain_id = %id, "chain removed");
        }
        Ok(existed)
    }

    fn action_catalog(&self) -> Option<&dyn ActionCatalog> {
        if self.strict_actions {
            Some(self)
        } else {
            None
        }
    }
}

pub(super) fn load_chain(conn: &Connection, id: ChainId) -> Result<Option<Chain>, StoreError> {
    let head = conn
        .query_row(
            "SELECT name, description, bound_node_id, link_high_water FROM chains WHERE id = ?1",
            params![id.get()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<NodeId>>(2)?,
                    row.get::<_, LinkId>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((name, description, bound_node_id, high_water)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT link_id, action_ref, success_next, failure_next, success_threshold, description \
         FROM chain_links WHERE chain_id = ?1 ORDER BY link_id",
    )?;
    let mut rows = stmt.query(params![id.get()])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        links.push(Link {
            id: row.get(0)?,
            action_ref: row.get(1)?,
            success_next: row.get(2)?,
            failure_next: row.get(3)?,
            success_threshold: row.get(4)?,
            description: row.get(5)?,
        });
    }

    let chain = Chain::from_parts(Some(id), name, description, bound_node_id, links);
    Ok(Some(chain.with_high_water(high_water)))
}

fn write_chain_tx(
    tx: &Transaction<'_>,
    id: ChainId,
    chain: &Chain,
    now_ms: i64,
) -> Result<(), StoreError> {
    let revision = tx
        .query_row(
            "SELECT revision FROM chains WHERE id = ?1",
            params![id.get()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .unwrap_or(0)
        + 1;

    if let Some(node_id) = chain.bound_node_id {
        tx.execute(
            "UPDATE chains SET bound_node_id = NULL WHERE bound_node_id = ?1 AND id <> ?2",
            params![node_id, id.get()],
        )?;
    }

    tx.execute(
        r#"
        INSERT INTO chains(
          id, name, description, bound_node_id, link_high_water, revision,
          created_at_ms, updated_at_ms
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT(id) DO UPDATE SET
          name=excluded.name,
          description=excluded.description,
          bound_node_id=excluded.bound_node_id,
          link_high_water=MAX(chains.link_high_water, excluded.link_high_water),
          revision=excluded.revision,
          updated_at_ms=excluded.updated_at_ms
        "#,
        params![
            id.get(),
            chain.name,
            chain.description,
            chain.bound_node_id,
            chain.high_water(),
            revision,
            now_ms
        ],
    )?;

    tx.execute(
        "DELETE FROM chain_links WHERE chain_id = ?1",
        params![id.get()],
    )?;
    let mut insert = tx.prepare_cached(
        "INSERT INTO chain_links(\
           chain_id, link_id, action_ref, success_next, failure_next, \
           success_threshold, description\
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for link in &chain.links {
        insert.execute(params![
            id.get(),
            link.id,
            link.action_ref,
            link.success_next,
            link.failure_next,
            link.success_threshold,
            link.description,
        ])?;
    }

    record_revision_tx(tx, id, revision, chain, now_ms)
}
