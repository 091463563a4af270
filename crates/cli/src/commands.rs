#![forbid(unsafe_code)]

use crate::{AddLinkArgs, Command, HistoryArgs, NewArgs, Outcome, RemoveLinkArgs, SetLinkArgs};
use anyhow::{Context, Result, bail};
use isida_core::{
    ActionCatalog, Branch, Chain, ChainId, ChainSession, ChainStore, EditError, Link, LinkFields,
    LinkId, NodeId, Problems, Removal, RemovalConsent, SessionError, validate,
    validate_with_catalog,
};
use isida_storage::SqliteStore;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub(crate) fn run(
    command: Command,
    store: &mut SqliteStore,
    out: &mut dyn Write,
) -> Result<Outcome> {
    match command {
        Command::List => list(store, out),
        Command::Show { chain } => show(store, chain, out),
        Command::Validate { chain } => validate_stored(store, chain, out),
        Command::New(args) => new_chain(store, args, out),
        Command::AddLink(args) => add_link(store, args, out),
        Command::SetLink(args) => set_link(store, args, out),
        Command::RemoveLink(args) => remove_link(store, args, out),
        Command::Bind { chain, node } => bind(store, chain, Some(node), out),
        Command::Unbind { chain } => bind(store, chain, None, out),
        Command::Remove { chain } => remove(store, chain, out),
        Command::Export { chain } => export(store, chain, out),
        Command::Import { file } => import(store, &file, out),
        Command::History(args) => history(store, args, out),
        Command::ActionAdd {
            id,
            name,
            description,
        } => {
            store.upsert_action_image(id, &name, &description)?;
            writeln!(out, "action {id} saved")?;
            Ok(Outcome::Done)
        }
        Command::NodeAdd { id, label, parent } => {
            store.upsert_tree_node(id, parent, &label)?;
            writeln!(out, "node {id} saved")?;
            Ok(Outcome::Done)
        }
    }
}

fn list(store: &SqliteStore, out: &mut dyn Write) -> Result<Outcome> {
    let chains = store.list_chains()?;
    if chains.is_empty() {
        writeln!(out, "no chains")?;
    }
    for chain in chains {
        let node = chain
            .bound_node_id
            .map_or_else(|| "-".to_string(), |node| node.to_string());
        writeln!(
            out,
            "{:>4}  {}  links={} node={} rev={}",
            chain.id, chain.name, chain.links, node, chain.revision
        )?;
    }
    Ok(Outcome::Done)
}

fn show(store: &SqliteStore, id: ChainId, out: &mut dyn Write) -> Result<Outcome> {
    let chain = load(store, id)?;
    writeln!(out, "chain {id}: {}", chain.name)?;
    if !chain.description.is_empty() {
        writeln!(out, "  {}", chain.description)?;
    }
    match chain.bound_node_id {
        Some(node) => writeln!(out, "bound to node {node}")?,
        None => writeln!(out, "not bound")?,
    }
    for link in &chain.links {
        let action = match store.describe(link.action_ref) {
            Some(summary) => format!("{} ({})", link.action_ref, summary.name),
            None => link.action_ref.to_string(),
        };
        writeln!(
            out,
            "  link {:>3}  action={action}  success->{}  failure->{}  threshold={}  {}",
            link.id,
            next_label(link.success_next),
            next_label(link.failure_next),
            link.success_threshold,
            link.description
        )?;
    }

    let problems = check(store, &chain);
    if problems.is_clean() {
        writeln!(out, "no problems")?;
    } else {
        write_problems(out, &problems)?;
    }
    Ok(Outcome::Done)
}

fn validate_stored(store: &SqliteStore, id: ChainId, out: &mut dyn Write) -> Result<Outcome> {
    let chain = load(store, id)?;
    let problems = check(store, &chain);
    if problems.is_clean() {
        writeln!(out, "chain {id}: ok")?;
        return Ok(Outcome::Done);
    }
    write_problems(out, &problems)?;
    Ok(Outcome::Refused)
}

fn new_chain(store: &mut SqliteStore, args: NewArgs, out: &mut dyn Write) -> Result<Outcome> {
    let mut session = ChainSession::create(args.name);
    session.set_description(args.description)?;
    if let (Some(action), Some(seed)) = (args.action, session.chain().max_link_id()) {
        edit_link(&mut session, seed, |fields| fields.action_ref = action)?;
    }
    if args.bind.is_some() {
        session.set_binding(&*store, args.bind)?;
    }
    finish(&mut session, store, out)
}

fn add_link(store: &mut SqliteStore, args: AddLinkArgs, out: &mut dyn Write) -> Result<Outcome> {
    let mut session = ChainSession::open(&*store, args.chain)?;
    let link = session.add_link()?;
    edit_link(&mut session, link.id, |fields| {
        if let Some(action) = args.action {
            fields.action_ref = action;
        }
        if let Some(threshold) = args.threshold {
            fields.success_threshold = threshold;
        }
        if let Some(description) = args.description {
            fields.description = description;
        }
    })?;
    if let (Some(from), Some(on)) = (args.from, args.on) {
        let branch = Branch::from(on);
        edit_link(&mut session, from, |fields| match branch {
            Branch::Success => fields.success_next = link.id,
            Branch::Failure => fields.failure_next = link.id,
        })?;
    }
    writeln!(out, "link {} added", link.id)?;
    finish(&mut session, store, out)
}

fn set_link(store: &mut SqliteStore, args: SetLinkArgs, out: &mut dyn Write) -> Result<Outcome> {
    let mut session = ChainSession::open(&*store, args.chain)?;
    edit_link(&mut session, args.link, |fields| {
        if let Some(action) = args.action {
            fields.action_ref = action;
        }
        if let Some(next) = args.success_next {
            fields.success_next = next;
        }
        if let Some(next) = args.failure_next {
            fields.failure_next = next;
        }
        if let Some(threshold) = args.threshold {
            fields.success_threshold = threshold;
        }
        if let Some(description) = args.description {
            fields.description = description;
        }
    })?;
    finish(&mut session, store, out)
}

fn remove_link(
    store: &mut SqliteStore,
    args: RemoveLinkArgs,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let mut session = ChainSession::open(&*store, args.chain)?;
    let consent = if args.clear_references {
        RemovalConsent::ClearReferences
    } else {
        RemovalConsent::KeepReferences
    };
    match session.remove_link(args.link, consent)? {
        Removal::Refused { referrers } => {
            writeln!(out, "link {} is referenced by:", args.link)?;
            for referrer in &referrers {
                writeln!(out, "  {referrer}")?;
            }
            writeln!(out, "pass --clear-references to clear them")?;
            Ok(Outcome::Refused)
        }
        Removal::Removed { cleared } => {
            for referrer in &cleared {
                writeln!(out, "cleared {referrer}")?;
            }
            finish(&mut session, store, out)
        }
    }
}

fn bind(
    store: &mut SqliteStore,
    id: ChainId,
    node: Option<NodeId>,
    out: &mut dyn Write,
) -> Result<Outcome> {
    let mut session = ChainSession::open(&*store, id)?;
    session.set_binding(&*store, node)?;
    finish(&mut session, store, out)
}

fn remove(store: &mut SqliteStore, id: ChainId, out: &mut dyn Write) -> Result<Outcome> {
    if !store.remove_chain(id)? {
        bail!("chain {id} not found");
    }
    writeln!(out, "chain {id} removed")?;
    Ok(Outcome::Done)
}

fn export(store: &SqliteStore, id: ChainId, out: &mut dyn Write) -> Result<Outcome> {
    let chain = load(store, id)?;
    serde_json::to_writer_pretty(&mut *out, &chain)?;
    writeln!(out)?;
    Ok(Outcome::Done)
}

/// Imports always create a new chain; an id carried by the document is ignored.
fn import(store: &mut SqliteStore, path: &Path, out: &mut dyn Write) -> Result<Outcome> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read chain document {}", path.display()))?;
    let doc: Chain = serde_json::from_str(&text)
        .with_context(|| format!("parse chain document {}", path.display()))?;
    info!(path = %path.display(), links = doc.links.len(), "importing chain");

    let binding = doc.bound_node_id;
    let chain = Chain::from_parts(None, doc.name, doc.description, None, doc.links);
    let mut session = ChainSession::adopt(chain);
    if binding.is_some() {
        session.set_binding(&*store, binding)?;
    }
    finish(&mut session, store, out)
}

fn history(store: &SqliteStore, args: HistoryArgs, out: &mut dyn Write) -> Result<Outcome> {
    if let Some(revision) = args.revision {
        let chain = store
            .chain_at_revision(args.chain, revision)?
            .with_context(|| format!("chain {} has no revision {revision}", args.chain))?;
        serde_json::to_writer_pretty(&mut *out, &chain)?;
        writeln!(out)?;
        return Ok(Outcome::Done);
    }

    let revisions = store.chain_revisions(args.chain)?;
    if revisions.is_empty() {
        bail!("chain {} has no saved revisions", args.chain);
    }
    for revision in revisions {
        writeln!(
            out,
            "revision {}  saved_at_ms={}",
            revision.revision, revision.saved_at_ms
        )?;
    }
    Ok(Outcome::Done)
}

/// Saves the session. A refused save prints the problems and writes nothing.
fn finish(
    session: &mut ChainSession,
    store: &mut SqliteStore,
    out: &mut dyn Write,
) -> Result<Outcome> {
    match session.save(store) {
        Ok(report) => {
            for warning in &report.warnings {
                writeln!(out, "warning: {warning}")?;
            }
            let verb = if report.created { "created" } else { "saved" };
            writeln!(out, "chain {} {verb}", report.chain_id)?;
            Ok(Outcome::Done)
        }
        Err(SessionError::Blocked(problems)) => {
            writeln!(out, "save refused:")?;
            write_problems(out, &problems)?;
            Ok(Outcome::Refused)
        }
        Err(err) => Err(err.into()),
    }
}

fn edit_link(
    session: &mut ChainSession,
    id: LinkId,
    edit: impl FnOnce(&mut LinkFields),
) -> Result<()> {
    let mut fields = session
        .chain()
        .link(id)
        .map(Link::fields)
        .ok_or(EditError::UnknownLink(id))?;
    edit(&mut fields);
    session.update_link(id, fields)?;
    Ok(())
}

fn load(store: &SqliteStore, id: ChainId) -> Result<Chain> {
    store
        .get_chain(id)?
        .with_context(|| format!("chain {id} not found"))
}

fn check(store: &SqliteStore, chain: &Chain) -> Problems {
    match store.action_catalog() {
        Some(catalog) => validate_with_catalog(chain, catalog),
        None => validate(chain),
    }
}

fn write_problems(out: &mut dyn Write, problems: &Problems) -> std::io::Result<()> {
    for problem in problems {
        writeln!(out, "  {problem}")?;
    }
    Ok(())
}

fn next_label(id: LinkId) -> String {
    if id == 0 {
        "end".to_string()
    } else {
        id.to_string()
    }
}
