//! # Marketplace Search CLI (`msq`)
//!
//! Command-line front end for the marketplace search engine: compile filters,
//! query a single index, fan a query out across several indices, and resolve
//! records by id.
//!
//! ## Usage
//!
//! ```bash
//! msq --config ./config/msq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `msq search <index> [query]` | Search one logical index |
//! | `msq search-all <query> --index <name>...` | Search several indices concurrently |
//! | `msq lookup <index> <id>...` | Fetch records by id in chunks |
//! | `msq watch <index>` | Debounced search over terms read from stdin |
//! | `msq replicas <index>` | Show the physical index for every sort key |
//! | `msq completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Active bakeries in Porto or Braga, best rated first
//! msq search shops --filter category=bakery --filter isActive=true \
//!     --filter city=Porto,Braga --sort rating_desc
//!
//! # Products between 5 and 20, only name and price
//! msq search products "olive oil" --filter minPrice=5 --filter maxPrice=20 \
//!     --attr name --attr price
//!
//! # Dashboard-style fan-out, JSON output
//! msq search-all "lisbon" --index shops --index products --index orders --json
//! ```
//!
//! Logging is controlled with `MSQ_LOG` (falls back to `RUST_LOG`), e.g.
//! `MSQ_LOG=marketplace_search=debug`.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use marketplace_search::commands::{self, SearchArgs};
use marketplace_search::models::FilterSpec;
use marketplace_search::{config, filter, logging};

/// Marketplace Search CLI: faceted search with retries and fan-out.
///
/// All commands except `completions` read a TOML configuration file given by
/// `--config`.
#[derive(Parser)]
#[command(
    name = "msq",
    about = "Marketplace Search: faceted search with retries and fan-out",
    version,
    long_about = "Compiles typed filters into search-service queries, picks the sorted replica \
    for the requested order, and runs queries with bounded retries and escalating timeouts. \
    Failures never abort a command; they show up as empty results."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/msq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Search one logical index.
    Search {
        /// Logical index name (e.g. `products`).
        index: String,

        /// Free-text query; empty matches everything.
        #[arg(default_value = "")]
        query: String,

        /// Filter as `field=value`. Repeatable.
        ///
        /// `minX`/`maxX` with a number become range bounds on `x`;
        /// `true`/`false` are booleans; comma-separated values match any.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Sort key: date, date_asc, price_asc, price_desc, rating_desc, name_asc.
        /// Unknown keys fall back to the index's default order.
        #[arg(long)]
        sort: Option<String>,

        /// Zero-based page number.
        #[arg(long, default_value_t = 0)]
        page: u32,

        /// Hits per page.
        #[arg(long, default_value_t = 20)]
        hits_per_page: u32,

        /// Attribute to retrieve. Repeatable; all attributes when omitted.
        #[arg(long = "attr")]
        attributes: Vec<String>,

        /// Print JSON instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Search several indices concurrently.
    ///
    /// An index that fails is reported as unavailable; the others are
    /// still shown.
    SearchAll {
        /// Free-text query.
        query: String,

        /// Logical index to include. Repeatable.
        #[arg(long = "index", required = true)]
        indices: Vec<String>,

        /// Hits per page for every index.
        #[arg(long, default_value_t = 5)]
        hits_per_page: u32,

        /// Print JSON instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Fetch records by id.
    ///
    /// Ids are split into chunks (`[lookup].chunk_size`) that are queried
    /// concurrently.
    Lookup {
        /// Logical index name.
        index: String,

        /// Record ids.
        #[arg(required = true)]
        ids: Vec<String>,

        /// Id attribute; defaults to `[lookup].id_field`.
        #[arg(long)]
        field: Option<String>,

        /// Print JSON instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Search-as-you-type: read terms from stdin, one per line.
    ///
    /// Terms replaced within `[debounce].window_ms` are never sent.
    Watch {
        /// Logical index name.
        index: String,

        /// Hits per page.
        #[arg(long, default_value_t = 5)]
        hits_per_page: u32,
    },

    /// Show the physical index each sort key resolves to.
    Replicas {
        /// Logical index name.
        index: String,
    },

    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("warn");
    let cli = Cli::parse();

    // Only `completions` runs without a config file
    let config_path = cli.config;
    let load = || config::load_config(&config_path);

    match cli.command {
        Commands::Search {
            index,
            query,
            filters,
            sort,
            page,
            hits_per_page,
            attributes,
            json,
        } => {
            let filters: FilterSpec = filters
                .iter()
                .map(|(k, v)| (k.clone(), filter::parse_cli_value(v)))
                .collect();
            commands::run_search(
                &load()?,
                SearchArgs {
                    index,
                    query,
                    filters,
                    sort,
                    page,
                    hits_per_page,
                    attributes,
                    json,
                },
            )
            .await?;
        }
        Commands::SearchAll {
            query,
            indices,
            hits_per_page,
            json,
        } => {
            commands::run_search_all(&load()?, &query, &indices, hits_per_page, json).await?;
        }
        Commands::Lookup {
            index,
            ids,
            field,
            json,
        } => {
            commands::run_lookup(&load()?, &index, &ids, field.as_deref(), json).await?;
        }
        Commands::Watch {
            index,
            hits_per_page,
        } => {
            commands::run_watch(&load()?, &index, hits_per_page).await?;
        }
        Commands::Replicas { index } => {
            commands::run_replicas(&load()?, &index)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "msq", &mut std::io::stdout());
        }
    }

    Ok(())
}
