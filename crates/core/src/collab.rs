#![forbid(unsafe_code)]

//! Contracts of the collaborators the editor core is injected with.

use crate::chain::{ActionRef, ActionSummary, Chain, ChainId, Link, NodeId};

/// Result of staging a new chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddedChain {
    pub id: ChainId,
    pub warnings: Vec<String>,
}

/// Persistence of chains. Writes are staged and become durable together on
/// [`ChainStore::save_all`], which is all-or-nothing.
pub trait ChainStore {
    type Error: std::fmt::Display;

    /// `Ok(None)` when no chain has this id.
    fn get_chain(&self, id: ChainId) -> Result<Option<Chain>, Self::Error>;

    fn add_chain(
        &mut self,
        name: &str,
        description: &str,
        links: &[Link],
        bound_node_id: Option<NodeId>,
    ) -> Result<AddedChain, Self::Error>;

    /// Stages a new version of an already identified chain. Returns warnings.
    fn update_chain(&mut self, chain: &Chain) -> Result<Vec<String>, Self::Error>;

    fn save_all(&mut self) -> Result<(), Self::Error>;

    /// Deletes a chain and releases its tree-node binding. `Ok(false)` if it did not exist.
    fn remove_chain(&mut self, id: ChainId) -> Result<bool, Self::Error>;

    /// Catalog consulted by the save gate, if the store carries one.
    fn action_catalog(&self) -> Option<&dyn ActionCatalog> {
        None
    }
}

pub trait ActionCatalog {
    fn exists(&self, action_ref: ActionRef) -> bool;

    fn describe(&self, action_ref: ActionRef) -> Option<ActionSummary>;
}

pub trait TreeIndex {
    fn node_exists(&self, node_id: NodeId) -> bool;
}
