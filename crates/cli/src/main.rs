// crates/cli/src/main.rs
//! `rekal` — thin command dispatch over `rekal-core`/`rekal-db`/`rekal-search`.
//!
//! No behavior lives here beyond flag validation and wiring; every
//! command's actual logic lives in the library crates so it's
//! unit-testable without going through argument parsing.

mod commands;
mod context;
mod gitignore;
mod hooks;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rekal_search::SearchFilters;

#[derive(Parser)]
#[command(name = "rekal", version, about = "Record and search AI coding sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Search query words (default command when no subcommand name matches).
    query: Vec<String>,

    /// Filter by exact author email.
    #[arg(long)]
    author: Option<String>,

    /// Filter by exact actor (`human` or `agent`).
    #[arg(long)]
    actor: Option<String>,

    /// Filter by a git commit sha prefix.
    #[arg(long)]
    commit: Option<String>,

    /// Filter by a regex over touched file paths.
    #[arg(long)]
    file: Option<String>,

    /// Maximum number of results.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create `.rekal/`, install hooks, and ensure the user's ledger branch exists.
    Init,
    /// Remove `.rekal/` and any hooks this tool installed.
    Clean,
    /// Capture any new transcripts and anchor them to the current git commit.
    Checkpoint,
    /// Export unexported checkpoints and push the ledger branch.
    Push {
        #[arg(long)]
        force: bool,
    },
    /// Fetch and rebuild the search index from known ledger branches.
    Sync {
        #[arg(long = "self")]
        self_only: bool,
    },
    /// Rebuild the derived search index from the data store.
    Index,
    /// List checkpoints newest-first.
    Log {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run a read-only SQL query against a store.
    Query {
        sql: String,
        /// Query the derived index store instead of the data store.
        #[arg(long = "index")]
        use_index: bool,
    },
}

fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Init) => commands::init::run().await,
        Some(Commands::Clean) => commands::clean::run().await,
        Some(Commands::Checkpoint) => commands::checkpoint::run().await,
        Some(Commands::Push { force }) => commands::push::run(force).await,
        Some(Commands::Sync { self_only }) => commands::sync::run(self_only).await,
        Some(Commands::Index) => commands::index::run().await,
        Some(Commands::Log { limit }) => commands::log::run(limit).await,
        Some(Commands::Query { sql, use_index }) => commands::query::run(&sql, use_index).await,
        None => {
            let query = cli.query.join(" ");
            let filters = SearchFilters {
                author_email: cli.author,
                actor: cli.actor,
                commit_prefix: cli.commit,
                file_path_regex: cli.file,
            };
            commands::search::run(&query, filters, cli.limit).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rekal: {e}");
            ExitCode::FAILURE
        }
    }
}
