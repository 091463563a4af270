#![forbid(unsafe_code)]

//! One edit session over one chain: load or seed it, apply edits, gate saves
//! and closes on validation.

use crate::chain::{
    self, Chain, ChainId, EditError, Link, LinkFields, LinkId, NodeId, Problems, Referrer,
    Removal, RemovalConsent,
};
use crate::collab::{ChainStore, TreeIndex};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Editing,
    /// Held while the store commit is in flight.
    Saving,
    Closed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Editing => "editing",
            Self::Saving => "saving",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is {0}, not editing")]
    NotEditing(SessionState),
    #[error("chain {0} not found")]
    ChainNotFound(ChainId),
    #[error("save blocked by {count} problem(s):\n{problems}", count = .0.len(), problems = .0)]
    Blocked(Problems),
    #[error("store: {0}")]
    Store(String),
    #[error("unknown tree node {0}")]
    UnknownTreeNode(NodeId),
    #[error(transparent)]
    Edit(#[from] EditError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReport {
    pub chain_id: ChainId,
    pub created: bool,
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDecision {
    /// Drop the unsaved changes and close.
    Discard,
    /// Stay in the session, e.g. to fix the reported problems.
    KeepEditing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// Unsaved changes exist; the caller must choose a [`CloseDecision`] (or save).
    /// `problems` is what a save attempt would be refused for.
    NeedsDecision { problems: Problems },
    StillEditing,
}

#[derive(Debug)]
pub struct ChainSession {
    chain: Chain,
    state: SessionState,
    dirty: bool,
    problems: Problems,
}

impl ChainSession {
    /// Loads chain `id`. A missing chain or a failing store means no session.
    pub fn open<S: ChainStore + ?Sized>(store: &S, id: ChainId) -> Result<Self, SessionError> {
        let chain = store
            .get_chain(id)
            .map_err(|err| SessionError::Store(err.to_string()))?
            .ok_or(SessionError::ChainNotFound(id))?;
        info!(chain_id = %id, links = chain.links.len(), "session opened");
        Ok(Self::editing(chain))
    }

    /// Starts an un-identified chain holding one seed link.
    pub fn create(name: impl Into<String>) -> Self {
        let chain = Chain::seeded(name);
        info!("session created for new chain");
        Self::editing(chain)
    }

    /// Starts a session over a chain built elsewhere, e.g. an imported document.
    /// The session starts dirty since nothing of it is saved.
    pub fn adopt(chain: Chain) -> Self {
        let mut session = Self::editing(chain);
        session.dirty = true;
        session
    }

    fn editing(chain: Chain) -> Self {
        let problems = chain::validate(&chain);
        Self {
            chain,
            state: SessionState::Editing,
            dirty: false,
            problems,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn into_chain(self) -> Chain {
        self.chain
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Findings of the validation run after the latest edit.
    pub fn problems(&self) -> &Problems {
        &self.problems
    }

    pub fn add_link(&mut self) -> Result<Link, SessionError> {
        self.ensure_editing()?;
        let link = chain::add_link(&mut self.chain)?;
        self.touched();
        Ok(link)
    }

    pub fn referrers(&self, id: LinkId) -> Vec<Referrer> {
        chain::referrers(&self.chain, id)
    }

    pub fn remove_link(
        &mut self,
        id: LinkId,
        consent: RemovalConsent,
    ) -> Result<Removal, SessionError> {
        self.ensure_editing()?;
        let removal = chain::remove_link(&mut self.chain, id, consent)?;
        if matches!(removal, Removal::Removed { .. }) {
            self.touched();
        }
        Ok(removal)
    }

    pub fn update_link(&mut self, id: LinkId, fields: LinkFields) -> Result<(), SessionError> {
        self.ensure_editing()?;
        chain::update_link(&mut self.chain, id, fields)?;
        self.touched();
        Ok(())
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_editing()?;
        chain::rename(&mut self.chain, name);
        self.touched();
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_editing()?;
        chain::set_description(&mut self.chain, description);
        self.touched();
        Ok(())
    }

    /// Binds the chain to a tree node after checking the node exists. `None` unbinds.
    pub fn set_binding(
        &mut self,
        tree: &dyn TreeIndex,
        node_id: Option<NodeId>,
    ) -> Result<(), SessionError> {
        self.ensure_editing()?;
        if let Some(node_id) = node_id {
            if !tree.node_exists(node_id) {
                return Err(SessionError::UnknownTreeNode(node_id));
            }
        }
        chain::set_binding(&mut self.chain, node_id);
        self.touched();
        Ok(())
    }

    /// Validates, then hands the chain to the store exactly once: add for a new
    /// chain, update otherwise, followed by the store commit. Any refusal or
    /// failure leaves the session editing with the chain untouched.
    pub fn save<S: ChainStore + ?Sized>(
        &mut self,
        store: &mut S,
    ) -> Result<SaveReport, SessionError> {
        self.ensure_editing()?;

        let problems = match store.action_catalog() {
            Some(catalog) => chain::validate_with_catalog(&self.chain, catalog),
            None => chain::validate(&self.chain),
        };
        if !problems.is_clean() {
            warn!(
                chain_id = ?self.chain.id,
                problems = problems.len(),
                "save refused"
            );
            self.problems = problems.clone();
            return Err(SessionError::Blocked(problems));
        }
        self.problems = problems;

        self.state = SessionState::Saving;
        let result = self.commit(store);
        self.state = SessionState::Editing;

        let report = result.map_err(|message| {
            warn!(chain_id = ?self.chain.id, error = %message, "store rejected save");
            SessionError::Store(message)
        })?;

        self.chain.id = Some(report.chain_id);
        self.dirty = false;
        for warning in &report.warnings {
            warn!(chain_id = %report.chain_id, "{warning}");
        }
        info!(chain_id = %report.chain_id, created = report.created, "chain saved");
        Ok(report)
    }

    fn commit<S: ChainStore + ?Sized>(&self, store: &mut S) -> Result<SaveReport, String> {
        let (chain_id, created, warnings) = match self.chain.id {
            Some(id) => {
                let warnings = store
                    .update_chain(&self.chain)
                    .map_err(|err| err.to_string())?;
                (id, false, warnings)
            }
            None => {
                let added = store
                    .add_chain(
                        &self.chain.name,
                        &self.chain.description,
                        &self.chain.links,
                        self.chain.bound_node_id,
                    )
                    .map_err(|err| err.to_string())?;
                (added.id, true, added.warnings)
            }
        };
        store.save_all().map_err(|err| err.to_string())?;
        Ok(SaveReport {
            chain_id,
            created,
            warnings,
        })
    }

    /// Closes a clean session. A dirty one reports what a save would be refused
    /// for and waits for [`ChainSession::close`].
    pub fn request_close(&mut self) -> Result<CloseOutcome, SessionError> {
        self.ensure_editing()?;
        if !self.dirty {
            self.state = SessionState::Closed;
            info!(chain_id = ?self.chain.id, "session closed");
            return Ok(CloseOutcome::Closed);
        }
        Ok(CloseOutcome::NeedsDecision {
            problems: chain::validate(&self.chain),
        })
    }

    pub fn close(&mut self, decision: CloseDecision) -> Result<CloseOutcome, SessionError> {
        self.ensure_editing()?;
        match decision {
            CloseDecision::Discard => {
                self.state = SessionState::Closed;
                info!(
                    chain_id = ?self.chain.id,
                    dirty = self.dirty,
                    "session closed, changes discarded"
                );
                Ok(CloseOutcome::Closed)
            }
            CloseDecision::KeepEditing => Ok(CloseOutcome::StillEditing),
        }
    }

    /// Abandons the session. The store is never touched.
    pub fn cancel(&mut self) {
        if self.state == SessionState::Editing {
            self.state = SessionState::Cancelled;
            info!(chain_id = ?self.chain.id, "session cancelled");
        }
    }

    fn ensure_editing(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Editing => Ok(()),
            other => Err(SessionError::NotEditing(other)),
        }
    }

    fn touched(&mut self) {
        self.dirty = true;
        self.problems = chain::validate(&self.chain);
        let blocking = self.problems.blocking_edit().count();
        if blocking > 0 {
            debug!(chain_id = ?self.chain.id, blocking, "edit left structural problems");
        }
    }
}

#[cfg(test)]
mod tests;
