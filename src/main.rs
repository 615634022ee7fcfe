//! # Vector Surfer CLI (`vsurf`)
//!
//! The `vsurf` binary loads execution records into SQLite, runs the
//! vector-space analyses over them, curates the reference set, and serves
//! the same analyses over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! vsurf --config ./config/vsurf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vsurf init` | Create the SQLite database and run schema migrations |
//! | `vsurf ingest <file.jsonl>` | Load execution records |
//! | `vsurf scatter` | 2D projection of execution vectors |
//! | `vsurf bottleneck` | Latency clusters |
//! | `vsurf coverage` | Reference coverage score |
//! | `vsurf hallucinations` | Outlier successful executions |
//! | `vsurf error-clusters` | Clusters of failed executions |
//! | `vsurf recommend <function>` | Discovery/steady test candidates |
//! | `vsurf drift summary` | Per-function drift verdicts |
//! | `vsurf drift simulate <function> <text>` | Drift check for free text |
//! | `vsurf golden register\|list\|delete\|stats` | Reference curation |
//! | `vsurf serve` | Start the HTTP server |
//!
//! Analysis commands print a JSON envelope on stdout; logs go to stderr
//! (filter with `RUST_LOG`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vector_surfer::sqlite_store::SqliteStore;
use vector_surfer::{analyze, config, ingest, server};
use vector_surfer_core::analysis::drift::SimulateRequest;
use vector_surfer_core::golden::RegisterRequest;

/// Vector Surfer CLI: vector-space analytics for instrumented function
/// executions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vsurf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vsurf",
    about = "Vector Surfer: scatter, clustering, coverage, outliers and drift over execution embeddings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vsurf.toml")]
    config: PathBuf,

    /// Named store from `[stores]`; defaults to `[db]`.
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Load execution records from a JSONL file.
    ///
    /// One JSON object per line; the embedding goes under `vector`.
    /// Unknown keys are preserved.
    Ingest {
        /// Path to the `.jsonl` file.
        file: PathBuf,
    },

    /// Project execution vectors onto their first two principal components.
    Scatter {
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value_t = 200)]
        limit: usize,
    },

    /// Cluster executions by input and flag clusters with high latency.
    Bottleneck {
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value_t = 5)]
        clusters: usize,
        #[arg(long, default_value_t = 300)]
        limit: usize,
    },

    /// Share of executions within reach of a reference record.
    Coverage {
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },

    /// Successful executions far from their nearest neighbors.
    Hallucinations {
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value_t = 0.3)]
        threshold: f64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Cluster failed executions.
    ErrorClusters {
        #[arg(long, default_value_t = 5)]
        clusters: usize,
        #[arg(long, default_value_t = 200)]
        limit: usize,
    },

    /// Recommend test candidates for a function, mixing unexplored and
    /// well-covered inputs.
    Recommend {
        function: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Drift detection.
    Drift {
        #[command(subcommand)]
        action: DriftAction,
    },

    /// Manage the reference ("golden") set.
    Golden {
        #[command(subcommand)]
        action: GoldenAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum DriftAction {
    /// Drift verdict for the newest execution of each function.
    Summary {
        /// Restrict to these functions (comma-separated).
        #[arg(long, value_delimiter = ',')]
        functions: Vec<String>,
    },
    /// Embed `text` and compare it against the function's history.
    Simulate {
        function: String,
        text: String,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        k: Option<usize>,
    },
}

#[derive(Subcommand)]
enum GoldenAction {
    /// Copy an execution into the reference set.
    Register {
        execution_id: String,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List reference records.
    List {
        #[arg(long)]
        function: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Delete a reference record by id.
    Delete { id: String },
    /// Reference counts per function.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let store = cli.store.as_deref();

    match cli.command {
        Commands::Init => {
            SqliteStore::open_initialized(cfg.store_path(store)?).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file } => {
            ingest::run_ingest(&cfg, store, &file).await?;
        }
        Commands::Scatter { function, limit } => {
            analyze::run_scatter(&cfg, store, function, limit).await?;
        }
        Commands::Bottleneck {
            function,
            clusters,
            limit,
        } => {
            analyze::run_bottleneck(&cfg, store, function, clusters, limit).await?;
        }
        Commands::Coverage { function, limit } => {
            analyze::run_coverage(&cfg, store, function, limit).await?;
        }
        Commands::Hallucinations {
            function,
            threshold,
            limit,
        } => {
            analyze::run_hallucinations(&cfg, store, function, threshold, limit).await?;
        }
        Commands::ErrorClusters { clusters, limit } => {
            analyze::run_error_clusters(&cfg, store, clusters, limit).await?;
        }
        Commands::Recommend { function, limit } => {
            analyze::run_recommend(&cfg, store, function, limit).await?;
        }
        Commands::Drift { action } => match action {
            DriftAction::Summary { functions } => {
                analyze::run_drift_summary(&cfg, store, functions).await?;
            }
            DriftAction::Simulate {
                function,
                text,
                threshold,
                k,
            } => {
                let req = SimulateRequest {
                    function_name: function,
                    text,
                    threshold,
                    k,
                };
                analyze::run_drift_simulate(&cfg, store, req).await?;
            }
        },
        Commands::Golden { action } => match action {
            GoldenAction::Register {
                execution_id,
                note,
                tags,
            } => {
                let req = RegisterRequest {
                    execution_id,
                    note,
                    tags,
                };
                analyze::run_golden_register(&cfg, store, req).await?;
            }
            GoldenAction::List { function, limit } => {
                analyze::run_golden_list(&cfg, store, function.as_deref(), limit).await?;
            }
            GoldenAction::Delete { id } => {
                analyze::run_golden_delete(&cfg, store, &id).await?;
            }
            GoldenAction::Stats => {
                analyze::run_golden_stats(&cfg, store).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
