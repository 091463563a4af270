#![forbid(unsafe_code)]

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use isida_core::{ActionRef, Branch, ChainId, LinkId, NodeId};
use isida_storage::SqliteStore;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ISIDA_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "isida",
    version,
    about = "Edit ISIDA automatism chains stored in a local chain store"
)]
struct Cli {
    /// Directory holding the chain store (created on first use)
    #[arg(
        long,
        env = "ISIDA_STORAGE_DIR",
        default_value = ".isida",
        value_name = "DIR",
        global = true
    )]
    storage_dir: PathBuf,

    /// Refuse to save chains whose links use actions missing from the catalog
    #[arg(long, env = "ISIDA_STRICT_ACTIONS", global = true)]
    strict_actions: bool,

    /// More log output on stderr (-v info, -vv debug). ISIDA_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List stored chains
    List,
    /// Print a chain with its links and current problems
    Show { chain: ChainId },
    /// Validate a stored chain; exits 2 when problems are found
    Validate { chain: ChainId },
    /// Create a chain holding one seed link
    New(NewArgs),
    /// Append a link, optionally wiring an existing link to it
    AddLink(AddLinkArgs),
    /// Change the fields of one link
    SetLink(SetLinkArgs),
    /// Remove a link; referenced links need --clear-references
    RemoveLink(RemoveLinkArgs),
    /// Bind a chain to a decision-tree node
    Bind { chain: ChainId, node: NodeId },
    /// Release a chain's tree-node binding
    Unbind { chain: ChainId },
    /// Delete a chain
    Remove { chain: ChainId },
    /// Print a chain as JSON
    Export { chain: ChainId },
    /// Save a chain document (JSON) as a new chain
    Import { file: PathBuf },
    /// List saved revisions, or print one revision as JSON
    History(HistoryArgs),
    /// Register or rename an action image in the catalog
    ActionAdd {
        id: ActionRef,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Register a decision-tree node
    NodeAdd {
        id: NodeId,
        label: String,
        #[arg(long, value_name = "NODE")]
        parent: Option<NodeId>,
    },
}

#[derive(Debug, clap::Args)]
struct NewArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Action bound to the seed link
    #[arg(long, value_name = "ACTION")]
    action: Option<ActionRef>,
    #[arg(long, value_name = "NODE")]
    bind: Option<NodeId>,
}

#[derive(Debug, clap::Args)]
struct AddLinkArgs {
    chain: ChainId,
    #[arg(long, value_name = "ACTION")]
    action: Option<ActionRef>,
    #[arg(long)]
    threshold: Option<i32>,
    #[arg(long)]
    description: Option<String>,
    /// Existing link whose successor becomes the new link
    #[arg(long, value_name = "LINK", requires = "on")]
    from: Option<LinkId>,
    #[arg(long, value_enum, requires = "from")]
    on: Option<BranchArg>,
}

#[derive(Debug, clap::Args)]
struct SetLinkArgs {
    chain: ChainId,
    link: LinkId,
    #[arg(long, value_name = "ACTION")]
    action: Option<ActionRef>,
    #[arg(long, value_name = "LINK")]
    success_next: Option<LinkId>,
    #[arg(long, value_name = "LINK")]
    failure_next: Option<LinkId>,
    #[arg(long, allow_negative_numbers = true)]
    threshold: Option<i32>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Debug, clap::Args)]
struct RemoveLinkArgs {
    chain: ChainId,
    link: LinkId,
    /// Zero every reference to the link before removing it
    #[arg(long)]
    clear_references: bool,
}

#[derive(Debug, clap::Args)]
struct HistoryArgs {
    chain: ChainId,
    #[arg(long)]
    revision: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BranchArg {
    Success,
    Failure,
}

impl From<BranchArg> for Branch {
    fn from(value: BranchArg) -> Self {
        match value {
            BranchArg::Success => Branch::Success,
            BranchArg::Failure => Branch::Failure,
        }
    }
}

/// How a command ended when it did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Done,
    /// The request was refused and nothing was written.
    Refused,
}

impl Outcome {
    fn exit_code(self) -> ExitCode {
        match self {
            Self::Done => ExitCode::SUCCESS,
            Self::Refused => ExitCode::from(2),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!(storage_dir = %cli.storage_dir.display(), "starting");

    let mut store = SqliteStore::open(&cli.storage_dir)?.with_strict_actions(cli.strict_actions);
    let mut stdout = std::io::stdout().lock();
    let outcome = commands::run(cli.command, &mut store, &mut stdout)?;
    Ok(outcome.exit_code())
}
