use super::*;
use crate::chain::{ActionRef, ActionSummary, ProblemKind};
use crate::collab::{ActionCatalog, AddedChain};
use std::collections::BTreeMap;

#[derive(Default)]
struct MemoryStore {
    saved: BTreeMap<ChainId, Chain>,
    staged: Vec<Chain>,
    next_id: i64,
    add_calls: usize,
    update_calls: usize,
    save_calls: usize,
    fail_save: bool,
    catalog: Option<Vec<ActionRef>>,
}

impl MemoryStore {
    fn with_chain(chain: Chain) -> (Self, ChainId) {
        let mut store = Self::default();
        let id = store.reserve();
        store.saved.insert(id, Chain { id: Some(id), ..chain });
        (store, id)
    }

    fn reserve(&mut self) -> ChainId {
        self.next_id += 1;
        ChainId::try_new(self.next_id).expect("positive id")
    }

    fn store_calls(&self) -> usize {
        self.add_calls + self.update_calls + self.save_calls
    }
}

impl ChainStore for MemoryStore {
    type Error = String;

    fn get_chain(&self, id: ChainId) -> Result<Option<Chain>, String> {
        Ok(self.saved.get(&id).cloned())
    }

    fn add_chain(
        &mut self,
        name: &str,
        description: &str,
        links: &[Link],
        bound_node_id: Option<NodeId>,
    ) -> Result<AddedChain, String> {
        self.add_calls += 1;
        let id = self.reserve();
        self.staged.push(Chain::from_parts(
            Some(id),
            name,
            description,
            bound_node_id,
            links.to_vec(),
        ));
        Ok(AddedChain {
            id,
            warnings: Vec::new(),
        })
    }

    fn update_chain(&mut self, chain: &Chain) -> Result<Vec<String>, String> {
        self.update_calls += 1;
        self.staged.push(chain.clone());
        Ok(vec!["node binding moved".to_string()])
    }

    fn save_all(&mut self) -> Result<(), String> {
        self.save_calls += 1;
        if self.fail_save {
            self.staged.clear();
            return Err("disk full".to_string());
        }
        for chain in self.staged.drain(..) {
            if let Some(id) = chain.id {
                self.saved.insert(id, chain);
            }
        }
        Ok(())
    }

    fn remove_chain(&mut self, id: ChainId) -> Result<bool, String> {
        Ok(self.saved.remove(&id).is_some())
    }

    fn action_catalog(&self) -> Option<&dyn ActionCatalog> {
        self.catalog.as_ref().map(|_| self as &dyn ActionCatalog)
    }
}

impl ActionCatalog for MemoryStore {
    fn exists(&self, action_ref: ActionRef) -> bool {
        self.catalog
            .as_ref()
            .is_some_and(|known| known.contains(&action_ref))
    }

    fn describe(&self, _action_ref: ActionRef) -> Option<ActionSummary> {
        None
    }
}

struct Tree(Vec<NodeId>);

impl TreeIndex for Tree {
    fn node_exists(&self, node_id: NodeId) -> bool {
        self.0.contains(&node_id)
    }
}

fn bind_action(session: &mut ChainSession, id: LinkId, action_ref: ActionRef) {
    let mut fields = session.chain().link(id).expect("link").fields();
    fields.action_ref = action_ref;
    session.update_link(id, fields).expect("bind action");
}

fn ready_session() -> ChainSession {
    let mut session = ChainSession::create("Greeting");
    bind_action(&mut session, 1, 5);
    session
}

#[test]
fn create_seeds_one_unbound_terminal_link() {
    let session = ChainSession::create("Greeting");
    assert_eq!(session.state(), SessionState::Editing);
    assert!(!session.is_dirty());
    let chain = session.chain();
    assert!(chain.is_new());
    assert_eq!(chain.links.len(), 1);
    let seed = &chain.links[0];
    assert_eq!((seed.id, seed.action_ref, seed.success_threshold), (1, 0, 1));
    assert!(seed.is_terminal());
    assert_eq!(session.problems().kinds(), vec![ProblemKind::UnboundAction]);
}

#[test]
fn open_missing_chain_fails() {
    let store = MemoryStore::default();
    let id = ChainId::try_new(3).expect("id");
    let err = ChainSession::open(&store, id).unwrap_err();
    assert!(matches!(err, SessionError::ChainNotFound(missing) if missing == id));
}

#[test]
fn every_mutation_dirties_the_session() {
    let mut session = ChainSession::create("Greeting");
    session.add_link().expect("add");
    assert!(session.is_dirty());

    let (store, id) = MemoryStore::with_chain(Chain::seeded("Loaded"));
    let mut loaded = ChainSession::open(&store, id).expect("open");
    assert!(!loaded.is_dirty());
    loaded.rename("Renamed").expect("rename");
    assert!(loaded.is_dirty());
}

#[test]
fn refused_removal_leaves_session_clean() {
    let mut chain = Chain::seeded("Loaded");
    chain.links[0].success_next = 2;
    chain.links.push(crate::chain::Link::seed(2));
    let (store, id) = MemoryStore::with_chain(chain);
    let mut session = ChainSession::open(&store, id).expect("open");

    let removal = session
        .remove_link(2, RemovalConsent::KeepReferences)
        .expect("remove");
    assert!(matches!(removal, Removal::Refused { .. }));
    assert!(!session.is_dirty());
    assert_eq!(session.chain().links.len(), 2);
}

#[test]
fn unknown_link_edits_are_reported() {
    let mut session = ChainSession::create("Greeting");
    let err = session
        .remove_link(4, RemovalConsent::ClearReferences)
        .unwrap_err();
    assert!(matches!(err, SessionError::Edit(EditError::UnknownLink(4))));
    assert!(!session.is_dirty());
}

#[test]
fn problems_follow_each_edit() {
    let mut session = ready_session();
    assert!(session.problems().is_clean());
    session.add_link().expect("add");
    assert_eq!(session.problems().kinds(), vec![ProblemKind::UnboundAction]);

    let mut fields = session.chain().link(2).expect("link 2").fields();
    fields.action_ref = 6;
    fields.success_next = 1;
    session.update_link(2, fields).expect("update");
    assert_eq!(session.problems().blocking_edit().count(), 1);
}

#[test]
fn blocked_save_never_reaches_the_store() {
    let mut store = MemoryStore::default();
    let mut session = ChainSession::create("");

    let problems = match session.save(&mut store) {
        Err(SessionError::Blocked(problems)) => problems,
        other => panic!("expected a blocked save, got {other:?}"),
    };
    assert_eq!(
        problems.kinds(),
        vec![ProblemKind::UnboundAction, ProblemKind::EmptyName]
    );
    assert_eq!(store.store_calls(), 0);
    assert_eq!(session.state(), SessionState::Editing);
    assert!(session.chain().is_new());
}

#[test]
fn blocked_save_lists_every_problem_in_its_message() {
    let mut store = MemoryStore::default();
    let mut session = ChainSession::create("");
    let err = session.save(&mut store).unwrap_err();
    assert_eq!(
        err.to_string(),
        "save blocked by 2 problem(s):\n\
         UNBOUND_ACTION link=1: link has no action\n\
         EMPTY_NAME: chain name must not be empty"
    );
}

#[test]
fn exhausted_link_ids_leave_the_session_clean() {
    let (store, id) = MemoryStore::with_chain(Chain::from_parts(
        None,
        "Full",
        "",
        None,
        vec![crate::chain::Link::seed(LinkId::MAX)],
    ));
    let mut session = ChainSession::open(&store, id).expect("open");
    let err = session.add_link().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Edit(EditError::IdsExhausted(LinkId::MAX))
    ));
    assert!(!session.is_dirty());
}

#[test]
fn clean_new_chain_is_added_once_and_committed() {
    let mut store = MemoryStore::default();
    let mut session = ready_session();

    let report = session.save(&mut store).expect("save");
    assert!(report.created);
    assert_eq!(store.add_calls, 1);
    assert_eq!(store.update_calls, 0);
    assert_eq!(store.save_calls, 1);
    assert_eq!(session.chain().id, Some(report.chain_id));
    assert!(!session.is_dirty());
    assert_eq!(session.state(), SessionState::Editing);

    let stored = store.get_chain(report.chain_id).expect("get").expect("chain");
    assert_eq!(&stored, session.chain());
}

#[test]
fn saved_chain_is_updated_on_the_next_save() {
    let mut store = MemoryStore::default();
    let mut session = ready_session();
    let first = session.save(&mut store).expect("first save");

    session.set_description("wave first").expect("describe");
    let second = session.save(&mut store).expect("second save");
    assert!(!second.created);
    assert_eq!(second.chain_id, first.chain_id);
    assert_eq!(second.warnings, vec!["node binding moved".to_string()]);
    assert_eq!(store.add_calls, 1);
    assert_eq!(store.update_calls, 1);
    assert_eq!(store.save_calls, 2);
}

#[test]
fn store_failure_keeps_edits_and_identity() {
    let mut store = MemoryStore {
        fail_save: true,
        ..MemoryStore::default()
    };
    let mut session = ready_session();
    let before = session.chain().clone();

    let err = session.save(&mut store).unwrap_err();
    assert!(matches!(&err, SessionError::Store(message) if message == "disk full"));
    assert_eq!(session.state(), SessionState::Editing);
    assert!(session.is_dirty());
    assert_eq!(session.chain(), &before);
    assert!(store.saved.is_empty());

    store.fail_save = false;
    let report = session.save(&mut store).expect("retry");
    assert!(report.created);
    assert_eq!(store.saved.len(), 1);
}

#[test]
fn catalog_carrying_store_blocks_unknown_actions() {
    let mut store = MemoryStore {
        catalog: Some(vec![7]),
        ..MemoryStore::default()
    };
    let mut session = ready_session();
    let err = session.save(&mut store).unwrap_err();
    assert!(
        matches!(&err, SessionError::Blocked(p) if p.kinds() == vec![ProblemKind::UnknownAction])
    );
    assert_eq!(store.store_calls(), 0);

    bind_action(&mut session, 1, 7);
    session.save(&mut store).expect("save");
}

#[test]
fn binding_checks_the_tree() {
    let tree = Tree(vec![10]);
    let mut session = ChainSession::create("Greeting");

    let err = session.set_binding(&tree, Some(11)).unwrap_err();
    assert!(matches!(err, SessionError::UnknownTreeNode(11)));
    assert_eq!(session.chain().bound_node_id, None);
    assert!(!session.is_dirty());

    session.set_binding(&tree, Some(10)).expect("bind");
    assert_eq!(session.chain().bound_node_id, Some(10));
    session.set_binding(&Tree(Vec::new()), None).expect("unbind");
    assert_eq!(session.chain().bound_node_id, None);
}

#[test]
fn clean_session_closes_immediately() {
    let mut store = MemoryStore::default();
    let mut session = ready_session();
    session.save(&mut store).expect("save");
    assert_eq!(session.request_close().expect("close"), CloseOutcome::Closed);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.add_link().unwrap_err(),
        SessionError::NotEditing(SessionState::Closed)
    ));
}

#[test]
fn dirty_session_asks_before_closing() {
    let mut session = ChainSession::create("Greeting");
    session.add_link().expect("add");

    let problems = match session.request_close() {
        Ok(CloseOutcome::NeedsDecision { problems }) => problems,
        other => panic!("expected a decision request, got {other:?}"),
    };
    assert_eq!(problems.count(ProblemKind::UnboundAction), 2);
    assert_eq!(session.state(), SessionState::Editing);

    assert_eq!(
        session.close(CloseDecision::KeepEditing).expect("keep"),
        CloseOutcome::StillEditing
    );
    assert_eq!(session.state(), SessionState::Editing);

    assert_eq!(
        session.close(CloseDecision::Discard).expect("discard"),
        CloseOutcome::Closed
    );
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn dirty_but_valid_session_still_needs_a_decision() {
    let mut session = ready_session();
    let outcome = session.request_close().expect("request close");
    assert_eq!(
        outcome,
        CloseOutcome::NeedsDecision {
            problems: Problems::default()
        }
    );
}

#[test]
fn cancel_is_terminal_and_skips_the_store() {
    let mut store = MemoryStore::default();
    let mut session = ready_session();
    session.cancel();
    assert_eq!(session.state(), SessionState::Cancelled);
    assert!(matches!(
        session.save(&mut store).unwrap_err(),
        SessionError::NotEditing(SessionState::Cancelled)
    ));
    assert_eq!(store.store_calls(), 0);
}

#[test]
fn adopted_chain_starts_dirty() {
    let mut chain = Chain::seeded("Imported");
    chain.links[0].action_ref = 3;
    let session = ChainSession::adopt(chain);
    assert!(session.is_dirty());
    assert!(session.problems().is_clean());
}
