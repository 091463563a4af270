#![forbid(unsafe_code)]

use super::allocator::next_link_id;
use super::ids::{LinkId, NO_LINK, NodeId};
use super::types::{Branch, Chain, Link, LinkFields};
use serde::Serialize;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("unknown link {0}")]
    UnknownLink(LinkId),
    #[error("no link id left after {0}")]
    IdsExhausted(LinkId),
}

/// A successor reference held by `link_id` on `branch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Referrer {
    pub link_id: LinkId,
    pub branch: Branch,
}

impl std::fmt::Display for Referrer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link {} ({})", self.link_id, self.branch)
    }
}

/// Caller's answer to "clear the references to this link?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalConsent {
    ClearReferences,
    KeepReferences,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Removal {
    /// The link is gone; `cleared` lists the references that were zeroed.
    Removed { cleared: Vec<Referrer> },
    /// The link is referenced and the caller kept the references. Nothing changed.
    Refused { referrers: Vec<Referrer> },
}

/// Appends a fresh unbound, terminal link. Its id is larger than any other, so
/// nothing can point at it yet and it cannot break forward-only ordering.
pub fn add_link(chain: &mut Chain) -> Result<Link, EditError> {
    let id = next_link_id(chain).ok_or(EditError::IdsExhausted(chain.high_water()))?;
    let link = Link::seed(id);
    chain.links.push(link.clone());
    chain.issued = id;
    debug!(link_id = id, "link added");
    Ok(link)
}

/// Every reference to `id` held by another link.
pub fn referrers(chain: &Chain, id: LinkId) -> Vec<Referrer> {
    let mut out = Vec::new();
    if id == NO_LINK {
        return out;
    }
    for link in &chain.links {
        if link.id == id {
            continue;
        }
        for branch in Branch::ALL {
            if link.next(branch) == id {
                out.push(Referrer {
                    link_id: link.id,
                    branch,
                });
            }
        }
    }
    out
}

/// Removes link `id`. A referenced link is removed only with
/// [`RemovalConsent::ClearReferences`], which zeroes every reference to it first.
pub fn remove_link(
    chain: &mut Chain,
    id: LinkId,
    consent: RemovalConsent,
) -> Result<Removal, EditError> {
    let Some(position) = chain.links.iter().position(|link| link.id == id) else {
        return Err(EditError::UnknownLink(id));
    };

    let found = referrers(chain, id);
    if !found.is_empty() && consent == RemovalConsent::KeepReferences {
        debug!(link_id = id, referrers = found.len(), "link removal refused");
        return Ok(Removal::Refused { referrers: found });
    }

    for referrer in &found {
        for link in chain
            .links
            .iter_mut()
            .filter(|link| link.id == referrer.link_id && link.next(referrer.branch) == id)
        {
            link.clear_next(referrer.branch);
        }
    }
    chain.issued = chain.issued.max(id);
    chain.links.remove(position);
    debug!(link_id = id, cleared = found.len(), "link removed");
    Ok(Removal::Removed { cleared: found })
}

/// Overwrites the mutable fields of link `id`. Nothing is checked here; run the
/// validator afterwards.
pub fn update_link(chain: &mut Chain, id: LinkId, fields: LinkFields) -> Result<(), EditError> {
    let link = chain.link_mut(id).ok_or(EditError::UnknownLink(id))?;
    link.apply(fields);
    debug!(link_id = id, "link updated");
    Ok(())
}

pub fn set_binding(chain: &mut Chain, node_id: Option<NodeId>) {
    chain.bound_node_id = node_id;
    debug!(node_id = ?node_id, "binding set");
}

pub fn rename(chain: &mut Chain, name: impl Into<String>) {
    chain.name = name.into();
    debug!(name = %chain.name, "chain renamed");
}

pub fn set_description(chain: &mut Chain, description: impl Into<String>) {
    chain.description = description.into();
    debug!("description set");
}
