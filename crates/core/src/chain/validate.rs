#![forbid(unsafe_code)]

use crate::collab::ActionCatalog;
use super::ids::{ActionRef, LinkId, NO_LINK};
use super::types::{Branch, Chain};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemKind {
    InvalidId,
    DuplicateId,
    SelfReference,
    DanglingReference,
    BackwardReference,
    NegativeThreshold,
    UnboundAction,
    UnknownAction,
    NoTerminalLink,
    EmptyChain,
    EmptyName,
}

impl ProblemKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidId => "INVALID_ID",
            Self::DuplicateId => "DUPLICATE_ID",
            Self::SelfReference => "SELF_REFERENCE",
            Self::DanglingReference => "DANGLING_REFERENCE",
            Self::BackwardReference => "BACKWARD_REFERENCE",
            Self::NegativeThreshold => "NEGATIVE_THRESHOLD",
            Self::UnboundAction => "UNBOUND_ACTION",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::NoTerminalLink => "NO_TERMINAL_LINK",
            Self::EmptyChain => "EMPTY_CHAIN",
            Self::EmptyName => "EMPTY_NAME",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidId => "link id must be positive",
            Self::DuplicateId => "link id occurs more than once",
            Self::SelfReference => "link refers to itself",
            Self::DanglingReference => "link refers to a missing link",
            Self::BackwardReference => "link refers to an earlier link",
            Self::NegativeThreshold => "success threshold must not be negative",
            Self::UnboundAction => "link has no action",
            Self::UnknownAction => "link refers to an unknown action",
            Self::NoTerminalLink => "chain has no terminal link",
            Self::EmptyChain => "chain has no links",
            Self::EmptyName => "chain name must not be empty",
        }
    }

    /// Graph-shape problems. The editor's own operations cannot produce them.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::InvalidId
                | Self::DuplicateId
                | Self::SelfReference
                | Self::DanglingReference
                | Self::BackwardReference
        )
    }

    /// Problems that must be surfaced right after the offending edit.
    pub fn blocks_editing(self) -> bool {
        self.is_structural() || self == Self::NegativeThreshold
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub kind: ProblemKind,
    /// Offending link; `None` for chain-level problems.
    pub link_id: Option<LinkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<LinkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_ref: Option<ActionRef>,
}

impl Problem {
    fn chain(kind: ProblemKind) -> Self {
        Self {
            kind,
            link_id: None,
            branch: None,
            target: None,
            action_ref: None,
        }
    }

    fn link(kind: ProblemKind, link_id: LinkId) -> Self {
        Self {
            link_id: Some(link_id),
            ..Self::chain(kind)
        }
    }

    fn reference(kind: ProblemKind, link_id: LinkId, branch: Branch, target: LinkId) -> Self {
        Self {
            branch: Some(branch),
            target: Some(target),
            ..Self::link(kind, link_id)
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.code())?;
        if let Some(link_id) = self.link_id {
            write!(f, " link={link_id}")?;
        }
        if let (Some(branch), Some(target)) = (self.branch, self.target) {
            write!(f, " {branch}_next={target}")?;
        }
        if let Some(action_ref) = self.action_ref {
            write!(f, " action={action_ref}")?;
        }
        write!(f, ": {}", self.kind.message())
    }
}

/// Ordered findings of one validation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Problems(Vec<Problem>);

impl Problems {
    pub fn is_clean(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Problem> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Problem] {
        &self.0
    }

    pub fn kinds(&self) -> Vec<ProblemKind> {
        self.0.iter().map(|problem| problem.kind).collect()
    }

    pub fn has(&self, kind: ProblemKind) -> bool {
        self.0.iter().any(|problem| problem.kind == kind)
    }

    pub fn count(&self, kind: ProblemKind) -> usize {
        self.0.iter().filter(|problem| problem.kind == kind).count()
    }

    pub fn for_link(&self, link_id: LinkId) -> impl Iterator<Item = &Problem> {
        self.0
            .iter()
            .filter(move |problem| problem.link_id == Some(link_id))
    }

    pub fn structural(&self) -> impl Iterator<Item = &Problem> {
        self.0.iter().filter(|problem| problem.kind.is_structural())
    }

    pub fn blocking_edit(&self) -> impl Iterator<Item = &Problem> {
        self.0.iter().filter(|problem| problem.kind.blocks_editing())
    }

    pub fn into_vec(self) -> Vec<Problem> {
        self.0
    }
}

impl IntoIterator for Problems {
    type Item = Problem;
    type IntoIter = std::vec::IntoIter<Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Problems {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::fmt::Display for Problems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, problem) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{problem}")?;
        }
        Ok(())
    }
}

/// Inspects `chain` and reports every rule it breaks. Never fails and never mutates.
pub fn validate(chain: &Chain) -> Problems {
    let mut problems = Vec::new();

    let mut occurrences: BTreeMap<LinkId, usize> = BTreeMap::new();
    for link in &chain.links {
        *occurrences.entry(link.id).or_default() += 1;
    }
    if occurrences.contains_key(&NO_LINK) {
        problems.push(Problem::link(ProblemKind::InvalidId, NO_LINK));
    }
    for (&id, &count) in &occurrences {
        if count > 1 {
            problems.push(Problem::link(ProblemKind::DuplicateId, id));
        }
    }

    for link in &chain.links {
        for branch in Branch::ALL {
            let target = link.next(branch);
            if target == NO_LINK {
                continue;
            }
            // One finding per reference, most specific first.
            let kind = if target == link.id {
                ProblemKind::SelfReference
            } else if !occurrences.contains_key(&target) {
                ProblemKind::DanglingReference
            } else if target < link.id {
                ProblemKind::BackwardReference
            } else {
                continue;
            };
            problems.push(Problem::reference(kind, link.id, branch, target));
        }
    }

    for link in &chain.links {
        if link.success_threshold < 0 {
            problems.push(Problem::link(ProblemKind::NegativeThreshold, link.id));
        }
    }

    for link in &chain.links {
        if !link.is_bound() {
            problems.push(Problem::link(ProblemKind::UnboundAction, link.id));
        }
    }

    // A self-reference is reported on its own and does not count as an exit.
    let has_exit = chain.links.iter().any(|link| {
        Branch::ALL.iter().all(|&branch| {
            let target = link.next(branch);
            target == NO_LINK || target == link.id
        })
    });
    if !chain.links.is_empty() && !has_exit {
        problems.push(Problem::chain(ProblemKind::NoTerminalLink));
    }

    if chain.links.is_empty() {
        problems.push(Problem::chain(ProblemKind::EmptyChain));
    }
    if chain.name.trim().is_empty() {
        problems.push(Problem::chain(ProblemKind::EmptyName));
    }

    Problems(problems)
}

/// [`validate`] plus an existence check of every bound action against `catalog`.
pub fn validate_with_catalog(chain: &Chain, catalog: &dyn ActionCatalog) -> Problems {
    let Problems(mut problems) = validate(chain);
    let unknown = chain
        .links
        .iter()
        .filter(|link| link.is_bound() && !catalog.exists(link.action_ref))
        .map(|link| Problem {
            action_ref: Some(link.action_ref),
            ..Problem::link(ProblemKind::UnknownAction, link.id)
        });

    // Keep link-level findings ahead of chain-level ones.
    let split = problems
        .iter()
        .position(|problem| problem.link_id.is_none())
        .unwrap_or(problems.len());
    let tail = problems.split_off(split);
    problems.extend(unknown);
    problems.extend(tail);
    Problems(problems)
}
