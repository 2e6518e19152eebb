pub mod config;
pub mod indexer;
pub mod model;
pub mod search;
pub mod server;
pub mod storage;

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::SearchConfig;
use indexer::IndexOptions;
use model::types::SearchHit;
use search::embedder_registry::{EmbedderRegistry, embedder_for_index};
use search::expansion::Expansion;
use search::ranker::Ranker;
use server::{DEFAULT_TOP, ServeOptions};
use storage::index_store::SearchIndex;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "ngs",
    version,
    about = "Hashed character n-gram semantic search over multilingual historical corpora"
)]
pub struct Cli {
    /// Data directory (index + model cache). Defaults to platform data dir.
    #[arg(long, global = true, env = "NGS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct IndexDirArg {
    /// Index directory (defaults to <data-dir>/index)
    #[arg(long, env = "NGS_INDEX_DIR")]
    pub index_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an index from an NDJSON corpus and publish it atomically
    Build {
        /// Corpus file, one JSON document per line
        corpus: PathBuf,

        #[command(flatten)]
        index: IndexDirArg,

        /// TOML config file ([embedding] / [expansion] sections)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Embedding dimension
        #[arg(long)]
        dim: Option<usize>,

        /// Minimum document frequency for vocabulary tokens
        #[arg(long)]
        min_df: Option<usize>,

        /// Shortest character n-gram
        #[arg(long)]
        ngram_min: Option<usize>,

        /// Longest character n-gram
        #[arg(long)]
        ngram_max: Option<usize>,

        /// Decimal places kept in stored vectors
        #[arg(long)]
        decimals: Option<u32>,

        /// Expansion neighbors per query token stored as the index default
        #[arg(long)]
        top_k: Option<usize>,

        /// Expansion similarity floor stored as the index default
        #[arg(long)]
        min_sim: Option<f32>,

        /// Embedding backend (see `ngs embedders`)
        #[arg(long, env = "NGS_EMBEDDER")]
        embedder: Option<String>,

        /// Fail instead of falling back to hash when the backend is unavailable
        #[arg(long)]
        strict_embedder: bool,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the published index
    Search {
        query: String,

        #[command(flatten)]
        index: IndexDirArg,

        /// Number of results
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,

        /// Disable vocabulary query expansion
        #[arg(long)]
        no_expand: bool,

        /// Override the index's expansion neighbors per token
        #[arg(long)]
        top_k: Option<usize>,

        /// Override the index's expansion similarity floor
        #[arg(long)]
        min_sim: Option<f32>,

        /// Robot-friendly JSON output
        #[arg(long)]
        json: bool,
    },
    /// Show the vocabulary neighbors each query token expands to
    Expand {
        query: String,

        #[command(flatten)]
        index: IndexDirArg,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        min_sim: Option<f32>,

        #[arg(long)]
        json: bool,
    },
    /// Serve GET /api/search over HTTP
    Serve {
        #[command(flatten)]
        index: IndexDirArg,

        /// Address to bind (host:port)
        #[arg(long, env = "NGS_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Maximum `top` accepted per request
        #[arg(long, default_value_t = 100)]
        max_top: usize,

        /// Disable vocabulary query expansion
        #[arg(long)]
        no_expand: bool,
    },
    /// List embedding backends and whether they are available
    Embedders {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    match cli.command {
        Commands::Build {
            corpus,
            index,
            config,
            dim,
            min_df,
            ngram_min,
            ngram_max,
            decimals,
            top_k,
            min_sim,
            embedder,
            strict_embedder,
            json,
        } => {
            let mut cfg = SearchConfig::load(config.as_deref())?;
            let e = &mut cfg.embedding;
            override_with(&mut e.dim, dim);
            override_with(&mut e.min_df, min_df);
            override_with(&mut e.ngram_min, ngram_min);
            override_with(&mut e.ngram_max, ngram_max);
            override_with(&mut e.decimals, decimals);
            override_with(&mut cfg.expansion.top_k, top_k);
            override_with(&mut cfg.expansion.min_sim, min_sim);
            let opts = IndexOptions {
                corpus,
                index_dir: index.resolve(&data_dir),
                data_dir,
                config: cfg,
                embedder,
                strict_embedder,
                show_progress: !json,
            };
            run_build(opts, json).await
        }
        Commands::Search {
            query,
            index,
            top,
            no_expand,
            top_k,
            min_sim,
            json,
        } => {
            let ranker = open_ranker(&data_dir, &index.resolve(&data_dir), top_k, min_sim)?;
            run_search(&ranker, &query, top, !no_expand, json)
        }
        Commands::Expand {
            query,
            index,
            top_k,
            min_sim,
            json,
        } => {
            let ranker = open_ranker(&data_dir, &index.resolve(&data_dir), top_k, min_sim)?;
            run_expand(&ranker, &query, json)
        }
        Commands::Serve {
            index,
            bind,
            max_top,
            no_expand,
        } => {
            let ranker = open_ranker(&data_dir, &index.resolve(&data_dir), None, None)?;
            let opts = ServeOptions {
                bind,
                default_top: DEFAULT_TOP,
                max_top,
                expand: !no_expand,
            };
            server::serve(Arc::new(ranker), opts).await
        }
        Commands::Embedders { json } => run_embedders(&data_dir, json),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "ngs", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

impl IndexDirArg {
    fn resolve(&self, data_dir: &Path) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("index"))
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

async fn run_build(opts: IndexOptions, json: bool) -> Result<()> {
    // Build passes use rayon; keep them off the async workers.
    let report = tokio::task::spawn_blocking(move || indexer::run_build(&opts))
        .await
        .context("index build task panicked")??;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Indexed {} documents, {} vocabulary tokens (dim {}, {}) → {}",
            report.summary.counts.docs,
            report.summary.counts.vocab,
            report.summary.embedding.dim,
            report.summary.embedding.method,
            report.path.display()
        );
    }
    Ok(())
}

/// Load the published index and the backend it was built with.
pub fn open_ranker(
    data_dir: &Path,
    index_dir: &Path,
    top_k: Option<usize>,
    min_sim: Option<f32>,
) -> Result<Ranker> {
    let index = SearchIndex::load(index_dir)?;
    let embedder = embedder_for_index(data_dir, index.summary()).with_context(|| {
        format!(
            "index was built with '{}', which cannot be loaded",
            index.summary().embedding.embedder_id
        )
    })?;
    let mut expansion = index.summary().query_expansion.clone();
    override_with(&mut expansion.top_k, top_k);
    override_with(&mut expansion.min_sim, min_sim);
    let ranker = Ranker::new(Arc::new(index), embedder)?.with_expansion(expansion);
    Ok(ranker)
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    expansions: &'a [Expansion],
    results: &'a [SearchHit],
}

fn run_search(ranker: &Ranker, query: &str, top: usize, expand: bool, json: bool) -> Result<()> {
    let query_vector = ranker.query_vector(query, expand)?;
    let hits = ranker.hits(&query_vector, top)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        let payload = SearchOutput {
            query,
            expansions: &query_vector.expansions,
            results: &hits,
        };
        serde_json::to_writer_pretty(&mut out, &payload)?;
        writeln!(out)?;
        return Ok(());
    }

    write_expansions(&mut out, &query_vector.expansions)?;
    if hits.is_empty() {
        writeln!(out, "No results.")?;
    }
    for (rank, hit) in hits.iter().enumerate() {
        writeln!(out, "{:>2}. [{:.4}] {}  {}", rank + 1, hit.score, hit.doc_id, hit.title)?;
        if !hit.snippet.is_empty() {
            writeln!(out, "    {}", hit.snippet)?;
        }
    }
    Ok(())
}

fn run_expand(ranker: &Ranker, query: &str, json: bool) -> Result<()> {
    if !ranker.expansion_available() {
        tracing::warn!("index has no vocabulary; expansion is unavailable");
    }
    let expansions = ranker.expand(query);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &expansions)?;
        writeln!(out)?;
    } else {
        write_expansions(&mut out, &expansions)?;
    }
    Ok(())
}

fn write_expansions(out: &mut impl Write, expansions: &[Expansion]) -> Result<()> {
    for expansion in expansions.iter().filter(|e| !e.neighbors.is_empty()) {
        let neighbors: Vec<String> = expansion
            .neighbors
            .iter()
            .map(|n| format!("{} ({:.3})", n.token, n.similarity))
            .collect();
        writeln!(out, "{} → {}", expansion.token, neighbors.join(", "))?;
    }
    Ok(())
}

#[derive(Serialize)]
struct EmbedderRow {
    name: &'static str,
    id: &'static str,
    dimension: usize,
    is_semantic: bool,
    available: bool,
    description: &'static str,
}

fn run_embedders(data_dir: &Path, json: bool) -> Result<()> {
    let registry = EmbedderRegistry::new(data_dir);
    let rows: Vec<EmbedderRow> = registry
        .all()
        .iter()
        .map(|e| EmbedderRow {
            name: e.name,
            id: e.id,
            dimension: e.dimension,
            is_semantic: e.is_semantic,
            available: e.is_available(data_dir),
            description: e.description,
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    let best = registry.best_available().name;
    for row in rows {
        let status = if row.available { "available" } else { "missing" };
        let marker = if row.name == best { '*' } else { ' ' };
        println!(
            "{marker} {:<10} {:<20} {:>4}  {:<9}  {}",
            row.name, row.id, row.dimension, status, row.description
        );
    }
    Ok(())
}

pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("org", "ngram-search", "ngram-search")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .context("cannot determine a data directory; pass --data-dir")
}
