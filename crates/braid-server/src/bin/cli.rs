//! Braid CLI
//!
//! Operator interface for the hybrid retrieval engine.

use anyhow::Context;
use braid_core::embeddings::{build_cache, l2_norm};
use braid_core::search::{PostRecord, SqliteFtsIndex};
use braid_core::{EngineConfig, HybridSearcher, Role, SearchFilters, SearchRequest, DEFAULT_TOP_K};
use braid_server::telemetry::init_tracing;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

/// Braid - hybrid retrieval CLI
#[derive(Parser)]
#[command(name = "braid")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the braid hybrid retrieval engine")]
#[command(long_about = "Braid fuses lexical and semantic rankings with Reciprocal Rank Fusion,\nfilters and boosts them by recency, and reranks with a cross-encoder.\n\nBackends are configured with BRAID_* environment variables.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Query,
    Passage,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Query => Role::Query,
            RoleArg::Passage => Role::Passage,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hybrid search
    Search {
        /// Query text
        query: String,
        /// Number of results
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Only this category
        #[arg(long)]
        category: Option<String>,
        /// Only this filetype
        #[arg(long)]
        filetype: Option<String>,
        /// Earliest date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        date_from: Option<String>,
        /// Latest date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        date_to: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a post to the SQLite FTS5 index
    Index {
        /// Post title
        title: String,
        /// Post body
        #[arg(long)]
        body: String,
        /// Tags (comma-separated)
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        filetype: String,
        /// Post date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Id of the post in the system of record
        #[arg(long)]
        post_id: Option<String>,
    },

    /// Embed a text through the cache and report on the vector
    Embed {
        text: String,
        #[arg(long, value_enum, default_value = "query")]
        role: RoleArg,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("warn");
    let config = EngineConfig::from_env().context("invalid BRAID_* configuration")?;

    match cli.command {
        Commands::Search {
            query,
            top_k,
            category,
            filetype,
            date_from,
            date_to,
            json,
        } => {
            let filters = SearchFilters {
                category,
                filetype,
                date_from,
                date_to,
            };
            let request = SearchRequest::new(query).with_top_k(top_k).with_filters(filters);
            run_search(config, request, json).await
        }
        Commands::Index {
            title,
            body,
            tags,
            category,
            filetype,
            date,
            post_id,
        } => run_index(
            &config,
            PostRecord {
                title,
                body,
                tags,
                category,
                filetype,
                posted_at: date,
                post_id,
            },
        ),
        Commands::Embed { text, role } => run_embed(&config, &text, role.into()).await,
        Commands::Config => run_config(&config),
    }
}

async fn run_search(config: EngineConfig, request: SearchRequest, json: bool) -> anyhow::Result<()> {
    let searcher = tokio::task::spawn_blocking(move || HybridSearcher::from_config(config)).await?;
    let hits = searcher.search(&request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    println!("{}", format!("=== Results for \"{}\" ===", request.query).cyan().bold());
    if hits.is_empty() {
        println!("{}", "No results.".dimmed());
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!();
        println!(
            "{} {} {}",
            format!("{:>2}.", rank + 1).white().bold(),
            hit.title.green().bold(),
            format!("({:.4})", hit.score).yellow()
        );
        let mut meta = vec![hit.source.clone()];
        meta.extend(hit.category.clone());
        meta.extend(hit.filetype.clone());
        meta.extend(hit.posted_at.clone());
        println!("    {}", meta.join(" | ").cyan());
        if !hit.snippet.is_empty() {
            println!("    {}", hit.snippet.replace('\n', " ").dimmed());
        }
    }
    Ok(())
}

fn run_index(config: &EngineConfig, post: PostRecord) -> anyhow::Result<()> {
    let path = &config.lexical.sqlite_path;
    let index = SqliteFtsIndex::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let rowid = index.index_post(&post)?;

    println!("{}: post:{}", "Indexed".green().bold(), rowid);
    println!("{}: {}", "Index".white().bold(), path.display());
    println!("{}: {}", "Documents".white().bold(), index.len()?);
    Ok(())
}

async fn run_embed(config: &EngineConfig, text: &str, role: Role) -> anyhow::Result<()> {
    let config = config.clone();
    let cache = tokio::task::spawn_blocking(move || build_cache(&config)).await??;
    let was_cached = cache.is_cached(text, role);
    let vectors = cache.embed(&[text.to_string()], role).await?;
    let vector = vectors.first().context("no vector returned")?;

    println!("{}", "=== Embedding ===".cyan().bold());
    println!("{}: {}", "Backend".white().bold(), cache.backend_name());
    println!("{}: {}", "Cache".white().bold(), cache.store_name().unwrap_or("disabled"));
    println!("{}: {}", "Role".white().bold(), role.as_str());
    println!("{}: {}", "Key".white().bold(), cache.key(text, role));
    println!("{}: {}", "Dimensions".white().bold(), vector.len());
    println!("{}: {:.6}", "Norm".white().bold(), l2_norm(vector));
    println!(
        "{}: {}",
        "Cache Hit".white().bold(),
        if was_cached { "yes".green() } else { "no".yellow() }
    );
    Ok(())
}

fn run_config(config: &EngineConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
