#![forbid(unsafe_code)]

pub mod chain;
pub mod collab;
pub mod session;

pub use chain::{
    ActionRef, ActionSummary, Branch, Chain, ChainId, ChainIdError, EditError, Link, LinkFields,
    LinkId, NodeId, Problem, ProblemKind, Problems, Referrer, Removal, RemovalConsent, validate,
    validate_with_catalog,
};
pub use collab::{ActionCatalog, AddedChain, ChainStore, TreeIndex};
pub use session::{
    ChainSession, CloseDecision, CloseOutcome, SaveReport, SessionError, SessionState,
};
