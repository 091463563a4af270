#![forbid(unsafe_code)]

use super::*;
use isida_core::{ActionCatalog, ActionRef, ActionSummary, TreeIndex};
use rusqlite::params;
use tracing::warn;

impl SqliteStore {
    pub fn upsert_action_image(
        &mut self,
        action_ref: ActionRef,
        name: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        if action_ref == 0 {
            return Err(StoreError::InvalidInput("action id must be positive"));
        }
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("action name must not be empty"));
        }
        self.conn.execute(
            r#"
            INSERT INTO action_images(id, name, description) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name=excluded.name, description=excluded.description
            "#,
            params![action_ref, name.trim(), description],
        )?;
        Ok(())
    }

    pub fn upsert_tree_node(
        &mut self,
        node_id: NodeId,
        parent_id: Option<NodeId>,
        label: &str,
    ) -> Result<(), StoreError> {
        if parent_id == Some(node_id) {
            return Err(StoreError::InvalidInput("tree node cannot be its own parent"));
        }
        self.conn.execute(
            r#"
            INSERT INTO tree_nodes(id, parent_id, label) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET parent_id=excluded.parent_id, label=excluded.label
            "#,
            params![node_id, parent_id, label],
        )?;
        Ok(())
    }

    fn lookup_action(&self, action_ref: ActionRef) -> Result<Option<ActionSummary>, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT name, description FROM action_images WHERE id = ?1",
                params![action_ref],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(found.map(|(name, description)| ActionSummary {
            action_ref,
            name,
            description,
        }))
    }

    fn lookup_node(&self, node_id: NodeId) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM tree_nodes WHERE id = ?1",
                params![node_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

// A failed lookup counts as absent.
impl ActionCatalog for SqliteStore {
    fn exists(&self, action_ref: ActionRef) -> bool {
        self.describe(action_ref).is_some()
    }

    fn describe(&self, action_ref: ActionRef) -> Option<ActionSummary> {
        self.lookup_action(action_ref).unwrap_or_else(|err| {
            warn!(action_ref, error = %err, "action lookup failed");
            None
        })
    }
}

impl TreeIndex for SqliteStore {
    fn node_exists(&self, node_id: NodeId) -> bool {
        self.lookup_node(node_id).unwrap_or_else(|err| {
            warn!(node_id, error = %err, "tree node lookup failed");
            false
        })
    }
}
