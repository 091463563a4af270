#![forbid(unsafe_code)]

use super::ids::{ActionRef, ChainId, LinkId, NO_LINK, NodeId, UNBOUND_ACTION};
use serde::{Deserialize, Serialize};

/// Threshold given to links created by the editor.
pub const DEFAULT_SUCCESS_THRESHOLD: i32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Success,
    Failure,
}

impl Branch {
    pub const ALL: [Branch; 2] = [Branch::Success, Branch::Failure];

    pub fn as_str(self) -> &'static str {
        match self {
            Branch::Success => "success",
            Branch::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    #[serde(default)]
    pub action_ref: ActionRef,
    #[serde(default)]
    pub success_next: LinkId,
    #[serde(default)]
    pub failure_next: LinkId,
    #[serde(default = "default_threshold")]
    pub success_threshold: i32,
    #[serde(default)]
    pub description: String,
}

fn default_threshold() -> i32 {
    DEFAULT_SUCCESS_THRESHOLD
}

impl Link {
    /// An unbound, terminal link: the shape of every link the editor creates.
    pub fn seed(id: LinkId) -> Self {
        Self {
            id,
            action_ref: UNBOUND_ACTION,
            success_next: NO_LINK,
            failure_next: NO_LINK,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            description: String::new(),
        }
    }

    pub fn next(&self, branch: Branch) -> LinkId {
        match branch {
            Branch::Success => self.success_next,
            Branch::Failure => self.failure_next,
        }
    }

    pub(crate) fn clear_next(&mut self, branch: Branch) {
        match branch {
            Branch::Success => self.success_next = NO_LINK,
            Branch::Failure => self.failure_next = NO_LINK,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.success_next == NO_LINK && self.failure_next == NO_LINK
    }

    pub fn is_bound(&self) -> bool {
        self.action_ref != UNBOUND_ACTION
    }

    pub fn fields(&self) -> LinkFields {
        LinkFields {
            action_ref: self.action_ref,
            success_next: self.success_next,
            failure_next: self.failure_next,
            success_threshold: self.success_threshold,
            description: self.description.clone(),
        }
    }

    pub(crate) fn apply(&mut self, fields: LinkFields) {
        let LinkFields {
            action_ref,
            success_next,
            failure_next,
            success_threshold,
            description,
        } = fields;
        self.action_ref = action_ref;
        self.success_next = success_next;
        self.failure_next = failure_next;
        self.success_threshold = success_threshold;
        self.description = description;
    }
}

/// The mutable part of a link. Ids are never rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkFields {
    pub action_ref: ActionRef,
    pub success_next: LinkId,
    pub failure_next: LinkId,
    pub success_threshold: i32,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chain {
    #[serde(default)]
    pub id: Option<ChainId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bound_node_id: Option<NodeId>,
    #[serde(default)]
    pub links: Vec<Link>,
    /// Highest link id ever issued for this chain in memory.
    #[serde(skip)]
    pub(crate) issued: LinkId,
}

impl Chain {
    /// An empty, un-identified chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            bound_node_id: None,
            links: Vec::new(),
            issued: NO_LINK,
        }
    }

    /// An un-identified chain holding one seed link, as the editor starts a new chain.
    pub fn seeded(name: impl Into<String>) -> Self {
        let mut chain = Self::new(name);
        chain.links.push(Link::seed(1));
        chain.issued = 1;
        chain
    }

    /// Rebuilds a chain from stored parts. Links are ordered by id.
    pub fn from_parts(
        id: Option<ChainId>,
        name: impl Into<String>,
        description: impl Into<String>,
        bound_node_id: Option<NodeId>,
        mut links: Vec<Link>,
    ) -> Self {
        links.sort_by_key(|link| link.id);
        Self {
            id,
            name: name.into(),
            description: description.into(),
            bound_node_id,
            links,
            issued: NO_LINK,
        }
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.iter().find(|link| link.id == id)
    }

    pub(crate) fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.iter_mut().find(|link| link.id == id)
    }

    pub fn contains(&self, id: LinkId) -> bool {
        self.link(id).is_some()
    }

    pub fn max_link_id(&self) -> Option<LinkId> {
        self.links.iter().map(|link| link.id).max()
    }

    /// Largest link id this chain holds or has ever issued.
    pub fn high_water(&self) -> LinkId {
        self.max_link_id().unwrap_or(NO_LINK).max(self.issued)
    }

    /// Restores a high-water mark kept outside the chain, e.g. by a store.
    pub fn with_high_water(mut self, issued: LinkId) -> Self {
        self.issued = self.issued.max(issued);
        self
    }

    pub fn terminal_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.is_terminal())
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

// The issue counter is session bookkeeping, not chain content.
impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.bound_node_id == other.bound_node_id
            && self.links == other.links
    }
}

impl Eq for Chain {}

/// Presentation summary of an action image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub action_ref: ActionRef,
    pub name: String,
    pub description: String,
}
