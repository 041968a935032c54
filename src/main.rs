//! # Shopdesk CLI
//!
//! ## Usage
//!
//! ```bash
//! shopdesk --config ./config/shopdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shopdesk init` | Create the SQLite database and run schema migrations |
//! | `shopdesk seed` | Insert the sample products and orders |
//! | `shopdesk index build` | Embed the catalog into the semantic index |
//! | `shopdesk index status` | Show index model, size and stale ids |
//! | `shopdesk search "<query>"` | Hybrid product search |
//! | `shopdesk tool list` | List capability tools |
//! | `shopdesk tool call <name> --param k=v` | Invoke a capability tool |
//! | `shopdesk ask "<question>"` | Answer one question |
//! | `shopdesk chat` | Interactive conversation |
//! | `shopdesk serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use shopdesk::server::AppState;
use shopdesk::{
    chat, config, db, index_store, logging, migrate, reasoning, runtime, search, seed, server,
    tools,
};

/// Shopdesk: an e-commerce customer-service assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shopdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shopdesk",
    about = "Shopdesk: answers order and product questions from your shop's database",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shopdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the `products` and `orders`
    /// tables. Safe to run more than once.
    Init,

    /// Load the sample catalog and orders.
    ///
    /// Existing rows with the same ids are left untouched.
    Seed,

    /// Build or inspect the semantic product index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Search products by description.
    Search {
        /// Free-text description of the wanted product.
        query: String,

        /// Maximum number of results, at most 100 (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List or call capability tools directly, without a reasoning engine.
    Tool {
        #[command(subcommand)]
        action: ToolAction,
    },

    /// Answer a single question.
    ///
    /// Requires a reasoning provider in `[reasoning]`.
    Ask {
        question: String,
    },

    /// Interactive conversation on stdin/stdout.
    ///
    /// Keeps the last `[conversation].history_window` turns as context.
    Chat,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed every product and write the index file.
    Build {
        /// Reuse vectors of products whose name and description did not change.
        #[arg(long)]
        incremental: bool,
    },
    /// Show the index model and entries that no longer exist in the database.
    Status,
}

#[derive(Subcommand)]
enum ToolAction {
    /// List tools and their parameter schemas.
    List,
    /// Invoke a tool and print its text result.
    Call {
        /// Tool name, e.g. `query_order`.
        name: String,
        /// Tool parameters as `key=value` pairs.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
}

/// Parse a `key=value` pair for `--param` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let default_level = match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    };
    logging::init(default_level);

    if let Commands::Tool {
        action: ToolAction::List,
    } = cli.command
    {
        return tools::list_tools();
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let stats = seed::run_seed(&pool).await?;
            println!("seed");
            println!("  products inserted: {}", stats.products);
            println!("  orders inserted: {}", stats.orders);
        }
        Commands::Index { action } => match action {
            IndexAction::Build { incremental } => {
                index_store::run_index_build(&cfg, incremental).await?;
            }
            IndexAction::Status => {
                index_store::run_index_status(&cfg).await?;
            }
        },
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Tool { action } => match action {
            ToolAction::Call { name, params } => {
                tools::run_tool(&cfg, &name, params).await?;
            }
            ToolAction::List => unreachable!(),
        },
        Commands::Ask { question } => {
            chat::run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            if !cfg.reasoning.is_enabled() {
                warn!("reasoning provider is disabled; /api/query will return an error message");
            }
            let rt = runtime::Runtime::load(&cfg).await?;
            let engine = reasoning::create_engine(&cfg.reasoning)?;
            let orchestrator = Arc::new(rt.orchestrator(engine, &cfg));
            let state =
                AppState::new(orchestrator, cfg.conversation.history_window, &cfg.server);
            server::run_server(&cfg.server.bind, state).await?;
        }
    }

    Ok(())
}
