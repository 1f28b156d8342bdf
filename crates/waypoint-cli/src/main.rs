#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use waypoint_core::config::{self, UserConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wp: operate a waypoint resource store",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `WAYPOINT_LOG` wins.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format.
    #[arg(long, value_enum, global = true)]
    format: Option<OutputMode>,

    /// Alias for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Acting identity recorded on history events (else `WAYPOINT_ACTOR`).
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Capability held by the caller. Repeatable; also accepted after
    /// `create`, `show` and `patch`.
    #[arg(long = "cap", value_name = "CAP")]
    caps: Vec<String>,

    /// SQLite database path (else `WAYPOINT_DB`, else the project config).
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Read",
        about = "List resource types",
        long_about = "List registered resource types, or show one type's states, fields, transitions, collections and triggers.",
        after_help = "EXAMPLES:\n    # List every type\n    wp types\n\n    # Show one definition\n    wp types leave-request\n\n    # Emit machine-readable output\n    wp types leave-request --format json"
    )]
    Types(cmd::types::TypesArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Create a resource",
        long_about = "Create a resource in its type's initial state and print it with its affordances.",
        after_help = "EXAMPLES:\n    # Create a leave request\n    wp create leave-request employee=alice from=2025-11-12 to=2025-11-15\n\n    # See the actions a requester may take\n    wp --cap requester create leave-request employee=alice from=2025-11-12 to=2025-11-15"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a resource and its affordances",
        long_about = "Show a resource with the links and actions open to a caller holding the given --cap capabilities.",
        after_help = "EXAMPLES:\n    # Show a resource as a reviewer sees it\n    wp --cap reviewer show lr-0a1b2c3d4e\n\n    # Emit machine-readable output\n    wp show lr-0a1b2c3d4e --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Patch a resource",
        long_about = "Merge-patch a resource at the version last read. Setting the state field requests a transition; key=null removes an optional field.",
        after_help = "EXAMPLES:\n    # Submit a draft\n    wp patch lr-0a1b2c3d4e --version 1 status=submitted\n\n    # Clear an optional field\n    wp patch lr-0a1b2c3d4e --version 2 reason=null"
    )]
    Patch(cmd::patch::PatchArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Append an item to a collection",
        long_about = "Append an item to one of a resource's collections. A matching trigger moves the parent to a new state.",
        after_help = "EXAMPLES:\n    # Approve a submitted leave request\n    wp append lr-0a1b2c3d4e approvals reviewer=bob decision=approved"
    )]
    Append(cmd::append::AppendArgs),

    #[command(
        next_help_heading = "Read",
        about = "List a collection's items",
        long_about = "List the items of one of a resource's collections in creation order.",
        after_help = "EXAMPLES:\n    # List approvals\n    wp items lr-0a1b2c3d4e approvals"
    )]
    Items(cmd::items::ItemsArgs),

    #[command(
        next_help_heading = "Read",
        about = "List stored resources",
        long_about = "List stored resources in identifier order, optionally of one type.",
        after_help = "EXAMPLES:\n    # Every resource\n    wp list\n\n    # Only leave requests\n    wp list --type leave-request"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Audit",
        about = "Show a resource's history",
        long_about = "Show the append-only history of a resource, oldest event first.",
        after_help = "EXAMPLES:\n    # Show history\n    wp history lr-0a1b2c3d4e\n\n    # Emit the hash-chained events as JSON\n    wp history lr-0a1b2c3d4e --json"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Audit",
        about = "Verify stored histories",
        long_about = "Recompute each history's hash chain and replay it against the stored resource. Exits non-zero if any history is corrupt.",
        after_help = "EXAMPLES:\n    # Verify everything\n    wp verify\n\n    # Verify two resources\n    wp verify lr-0a1b2c3d4e doc-9f8e7d6c5b"
    )]
    Verify(cmd::verify::VerifyArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        long_about = "Generate a shell completion script for wp.",
        after_help = "EXAMPLES:\n    # Bash\n    wp completions bash > ~/.local/share/bash-completion/completions/wp"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_env("WAYPOINT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 if env::var("DEBUG").is_ok() => "waypoint=debug,wp=debug,info",
            0 => "waypoint=info,warn",
            1 => "waypoint=debug,wp=debug,info",
            _ => "waypoint=trace,wp=trace,info",
        })
    });

    let format = env::var("WAYPOINT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

impl Cli {
    /// Capabilities from both sides of the subcommand, in command-line order.
    fn caller_caps(&self) -> Vec<String> {
        let after = match &self.command {
            Commands::Create(args) => args.caps.caps.as_slice(),
            Commands::Show(args) => args.caps.caps.as_slice(),
            Commands::Patch(args) => args.caps.caps.as_slice(),
            _ => &[],
        };
        self.caps.iter().chain(after).cloned().collect()
    }
}

fn run(cli: Cli, output: OutputMode, user: UserConfig) -> anyhow::Result<()> {
    let caps = cli.caller_caps();
    let ctx = cmd::Context {
        project_root: cmd::default_project_root()?,
        output,
        db: cli.db,
        actor_flag: cli.actor,
        caps,
        user,
    };
    debug!(root = %ctx.project_root.display(), ?output, "starting");

    match &cli.command {
        Commands::Types(args) => cmd::types::run_types(args, &ctx),
        Commands::Create(args) => cmd::create::run_create(args, &ctx),
        Commands::Show(args) => cmd::show::run_show(args, &ctx),
        Commands::Patch(args) => cmd::patch::run_patch(args, &ctx),
        Commands::Append(args) => cmd::append::run_append(args, &ctx),
        Commands::Items(args) => cmd::items::run_items(args, &ctx),
        Commands::List(args) => cmd::list::run_list(args, &ctx),
        Commands::History(args) => cmd::history::run_history(args, &ctx),
        Commands::Verify(args) => cmd::verify::run_verify(args, &ctx),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let user = config::load_user_config().unwrap_or_else(|e| {
        warn!("ignoring unreadable user config: {e:#}");
        UserConfig::default()
    });
    let output = output::resolve_output_mode(cli.format, cli.json, user.output.as_deref());

    match run(cli, output, user) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err.downcast_ref::<cmd::Reported>().is_none() {
                let rendered = output::render_error(output, &CliError::from(&err));
                if rendered.is_err() {
                    eprintln!("error: {err:#}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
