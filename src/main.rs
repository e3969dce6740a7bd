//! # Customs KB CLI (`ckb`)
//!
//! The `ckb` binary is the primary interface for the knowledge base. It
//! provides commands for database initialization, data ingestion, search,
//! document and tariff-code lookup, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! ckb --config ./config/ckb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ckb init` | Create the SQLite database and run schema migrations |
//! | `ckb ingest federal-register` | Ingest Federal Register notices for a date range |
//! | `ckb ingest htsus` | Ingest the HTSUS tariff schedule |
//! | `ckb search "<query>"` | Semantic search with optional structured filters |
//! | `ckb get <document_number>` | Full document detail |
//! | `ckb hts search <term>` | Search tariff codes by description |
//! | `ckb hts get <number>` | Tariff-code detail |
//! | `ckb docs` | List documents by publication-date range |
//! | `ckb status` | Database counts and recent ingestion runs |
//! | `ckb serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! ckb init --config ./config/ckb.toml
//!
//! # Load the tariff schedule, then two years of notices
//! ckb ingest htsus
//! ckb ingest federal-register --start-date 2024-01-01 --end-date 2025-12-31
//!
//! # Semantic search, optionally filtered
//! ckb search "cheese import restrictions from France" --limit 5
//! ckb search "dairy quotas" --hts-code 0406.10.00
//! ckb search "enforcement actions" --from 2025-01-01 --to 2025-06-30
//!
//! # Structured lookups
//! ckb get 2025-01234
//! ckb hts search "cheese"
//! ckb hts get 0406.10.00
//! ```

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use customs_kb::config::{self, Config};
use customs_kb::db;
use customs_kb::ingest;
use customs_kb::migrate;
use customs_kb::models::SearchHit;
use customs_kb::retrieval::RetrievalEngine;
use customs_kb::server;
use customs_kb::status;
use customs_kb::store::Store;
use customs_kb::vector::SearchFilters;

/// Customs KB CLI — a hybrid search knowledge base for US customs
/// regulatory notices and HTSUS tariff codes.
#[derive(Parser)]
#[command(
    name = "ckb",
    about = "Customs KB — hybrid search over Federal Register notices and HTSUS tariff codes",
    version,
    long_about = "Customs KB ingests Federal Register documents and the Harmonized Tariff \
    Schedule, chunks and embeds document text, and answers semantic, structured, and hybrid \
    queries via a CLI and a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ckb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Ingest data from an external source.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Semantic search over document text.
    ///
    /// Filters compose: a tariff code or agency is pushed into the vector
    /// search, a date range post-filters the semantic result set.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results. Defaults to `retrieval.final_limit`.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity score; results below it are dropped.
        #[arg(long)]
        score_threshold: Option<f32>,

        /// Filter to documents tagged with this HTS code.
        #[arg(long)]
        hts_code: Option<String>,

        /// Filter to documents from this agency slug.
        #[arg(long)]
        agency: Option<String>,

        /// Filter to a source tag (e.g. `federal_register`).
        #[arg(long)]
        source: Option<String>,

        /// Only documents published on or after this date (YYYY-MM-DD).
        #[arg(long = "from")]
        from_date: Option<String>,

        /// Only documents published on or before this date (YYYY-MM-DD).
        #[arg(long = "to")]
        to_date: Option<String>,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve a document by its document number.
    Get {
        /// Document number (e.g. `2025-01234`).
        document_number: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Tariff-code lookups.
    Hts {
        #[command(subcommand)]
        action: HtsAction,
    },

    /// List documents by publication-date range.
    Docs {
        /// Earliest publication date (YYYY-MM-DD).
        #[arg(long = "from")]
        from_date: Option<String>,

        /// Latest publication date (YYYY-MM-DD).
        #[arg(long = "to")]
        to_date: Option<String>,

        /// Filter by source tag.
        #[arg(long)]
        source: Option<String>,

        /// Maximum number of documents.
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Database counts and recent ingestion runs.
    Status,

    /// Start the HTTP API server.
    Serve,
}

/// Ingestion subcommands.
#[derive(Subcommand)]
enum IngestSource {
    /// Ingest Federal Register documents for a publication-date range.
    ///
    /// Requires an embedding provider; document text is chunked and
    /// embedded as part of the load.
    FederalRegister {
        /// Start date (YYYY-MM-DD). Defaults to two years ago.
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end_date: Option<String>,
    },

    /// Ingest the HTSUS tariff schedule.
    Htsus {
        /// Override the download URL from config.
        #[arg(long)]
        url: Option<String>,

        /// Read the schedule CSV from a local file instead of downloading.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Tariff-code subcommands.
#[derive(Subcommand)]
enum HtsAction {
    /// Search codes by description (case-insensitive substring).
    Search {
        term: String,

        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Get one code's detail (exact match on the code string).
    Get {
        hts_number: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { source } => run_ingest(&cfg, source).await?,
        Commands::Search {
            query,
            limit,
            score_threshold,
            hts_code,
            agency,
            source,
            from_date,
            to_date,
            json,
        } => {
            run_search(
                &cfg,
                &query,
                limit,
                score_threshold,
                hts_code,
                agency,
                source,
                from_date,
                to_date,
                json,
            )
            .await?;
        }
        Commands::Get {
            document_number,
            json,
        } => run_get(&cfg, &document_number, json).await?,
        Commands::Hts { action } => run_hts(&cfg, action).await?,
        Commands::Docs {
            from_date,
            to_date,
            source,
            limit,
            json,
        } => run_docs(&cfg, from_date, to_date, source, limit, json).await?,
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, source: IngestSource) -> Result<()> {
    let pool = db::connect(cfg).await?;

    let summary = match source {
        IngestSource::FederalRegister {
            start_date,
            end_date,
        } => {
            let end = match end_date {
                Some(s) => parse_date(&s)?,
                None => chrono::Utc::now().date_naive(),
            };
            let start = match start_date {
                Some(s) => parse_date(&s)?,
                None => end
                    .checked_sub_months(chrono::Months::new(24))
                    .unwrap_or(end),
            };

            println!("Ingesting Federal Register documents from {} to {}", start, end);
            ingest::run_federal_register(cfg, &pool, start, end).await?
        }
        IngestSource::Htsus { url, file } => {
            let mut cfg = cfg.clone();
            if let Some(url) = url {
                cfg.sources.htsus.url = url;
            }

            println!("Ingesting HTSUS tariff schedule");
            ingest::run_htsus(&cfg, &pool, file.as_deref()).await?
        }
    };

    println!();
    println!("Ingestion finished");
    println!("  status:    {}", summary.status);
    println!("  processed: {}", summary.processed);
    println!("  duration:  {:.2}s", summary.duration_secs);
    if !summary.errors.is_empty() {
        println!("  errors:    {}", summary.errors.len());
        for err in summary.errors.iter().take(10) {
            println!("    - {}", err);
        }
    }

    pool.close().await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    cfg: &Config,
    query: &str,
    limit: Option<usize>,
    score_threshold: Option<f32>,
    hts_code: Option<String>,
    agency: Option<String>,
    source: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(cfg.retrieval.final_limit as usize);
    let pool = db::connect(cfg).await?;
    let engine = RetrievalEngine::new(cfg.clone(), pool.clone());

    // Date-range hybrid: structured prefilter, then semantic
    if from_date.is_some() || to_date.is_some() {
        let (Some(from), Some(to)) = (from_date.as_deref(), to_date.as_deref()) else {
            anyhow::bail!("--from and --to must be given together");
        };
        parse_date(from)?;
        parse_date(to)?;

        let hits = engine
            .search_with_date_filter(query, from, to, limit, score_threshold)
            .await?;
        print_hits(&hits, query, json)?;
        pool.close().await;
        return Ok(());
    }

    // Single tariff-code hybrid: push the code down and show its entry
    if let (Some(code), None, None) = (&hts_code, &agency, &source) {
        let filtered = engine
            .search_by_hts_and_text(code, query, limit, score_threshold)
            .await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&filtered)?);
        } else {
            match &filtered.hts_code {
                Some(info) => println!(
                    "Filter: HTS {} — {}",
                    info.hts_number, info.description
                ),
                None => println!("Filter: HTS {} (not in schedule)", code),
            }
            print_hits(&filtered.results, query, false)?;
        }
        pool.close().await;
        return Ok(());
    }

    if let (None, Some(slug), None) = (&hts_code, &agency, &source) {
        let hits = engine
            .search_by_agency_and_text(slug, query, limit, score_threshold)
            .await?;
        print_hits(&hits, query, json)?;
        pool.close().await;
        return Ok(());
    }

    // General case: all supplied filters AND-ed in the vector search
    let filters = SearchFilters {
        hts_codes: hts_code.into_iter().collect(),
        agencies: agency.into_iter().collect(),
        source,
    };
    let hits = engine.search(query, limit, score_threshold, &filters).await?;
    print_hits(&hits, query, json)?;

    pool.close().await;
    Ok(())
}

fn print_hits(hits: &[SearchHit], query: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results for: '{}'", query);
        return Ok(());
    }

    println!("Found {} results for: '{}'", hits.len(), query);
    println!();

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.title);
        println!("   document: {}", hit.document_number);
        if let Some(ref date) = hit.publication_date {
            println!("   date:     {}", date);
        }
        if let Some(ref doc_type) = hit.document_type {
            println!("   type:     {}", doc_type);
        }
        if !hit.agencies.is_empty() {
            println!("   agencies: {}", hit.agencies.join(", "));
        }
        if !hit.hts_codes.is_empty() {
            println!("   codes:    {}", hit.hts_codes.join(", "));
        }
        if let Some(ref url) = hit.html_url {
            println!("   url:      {}", url);
        }
        println!("   excerpt:  {}", hit.matched_chunk.replace('\n', " "));
        println!();
    }

    Ok(())
}

async fn run_get(cfg: &Config, document_number: &str, json: bool) -> Result<()> {
    let pool = db::connect(cfg).await?;
    let engine = RetrievalEngine::new(cfg.clone(), pool.clone());

    let detail = engine.document_detail(document_number).await?;
    pool.close().await;

    let detail = match detail {
        Some(d) => d,
        None => {
            eprintln!("Document not found: {}", document_number);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let doc = &detail.document;
    println!("--- Document ---");
    println!("number:   {}", doc.document_number);
    println!("title:    {}", doc.title);
    println!("source:   {}", doc.source);
    if let Some(ref doc_type) = doc.document_type {
        println!("type:     {}", doc_type);
    }
    if let Some(ref date) = doc.publication_date {
        println!("date:     {}", date);
    }
    if let Some(ref url) = doc.html_url {
        println!("url:      {}", url);
    }
    if !detail.agencies.is_empty() {
        let names: Vec<&str> = detail.agencies.iter().map(|a| a.name.as_str()).collect();
        println!("agencies: {}", names.join(", "));
    }
    if !detail.hts_codes.is_empty() {
        let codes: Vec<&str> = detail
            .hts_codes
            .iter()
            .map(|h| h.hts_number.as_str())
            .collect();
        println!("codes:    {}", codes.join(", "));
    }
    if let Some(ref abstract_text) = doc.abstract_text {
        println!();
        println!("--- Abstract ---");
        println!("{}", abstract_text);
    }
    if let Some(ref full_text) = doc.full_text {
        println!();
        println!("--- Full Text ---");
        println!("{}", full_text);
    }

    Ok(())
}

async fn run_hts(cfg: &Config, action: HtsAction) -> Result<()> {
    let pool = db::connect(cfg).await?;
    let store = Store::new(&pool);

    match action {
        HtsAction::Search { term, limit, json } => {
            let codes = store.search_hts_codes(&term, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&codes)?);
            } else if codes.is_empty() {
                println!("No HTS codes match '{}'", term);
            } else {
                for code in &codes {
                    println!("{:<14} {}", code.hts_number, code.description);
                    if let Some(ref rate) = code.general_rate {
                        println!("{:<14} general rate: {}", "", rate);
                    }
                }
            }
        }
        HtsAction::Get { hts_number, json } => {
            let code = store.get_hts_code(&hts_number).await?;
            let documents = store.documents_for_hts_code(&hts_number, 10).await?;
            pool.close().await;

            let code = match code {
                Some(c) => c,
                None => {
                    eprintln!("HTS code not found: {}", hts_number);
                    std::process::exit(1);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&code)?);
                return Ok(());
            }

            println!("HTS {}", code.hts_number);
            println!("  description:  {}", code.description);
            println!("  indent level: {}", code.indent_level);
            if let Some(ref parent) = code.parent_hts_number {
                println!("  parent:       {}", parent);
            }
            if let Some(ref rate) = code.general_rate {
                println!("  general rate: {}", rate);
            }
            if let Some(ref rate) = code.special_rate {
                println!("  special rate: {}", rate);
            }
            if !documents.is_empty() {
                println!("  related documents:");
                for doc in &documents {
                    println!("    {} — {}", doc.document_number, doc.title);
                }
            }
            return Ok(());
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_docs(
    cfg: &Config,
    from_date: Option<String>,
    to_date: Option<String>,
    source: Option<String>,
    limit: i64,
    json: bool,
) -> Result<()> {
    if let Some(ref d) = from_date {
        parse_date(d)?;
    }
    if let Some(ref d) = to_date {
        parse_date(d)?;
    }

    let pool = db::connect(cfg).await?;
    let store = Store::new(&pool);

    let docs = store
        .search_documents(
            source.as_deref(),
            from_date.as_deref(),
            to_date.as_deref(),
            limit,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else if docs.is_empty() {
        println!("No documents.");
    } else {
        for doc in &docs {
            println!(
                "{}  {:<14} {}",
                doc.publication_date.as_deref().unwrap_or("          "),
                doc.document_number,
                doc.title
            );
        }
    }

    pool.close().await;
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date '{}': expected YYYY-MM-DD", s))
}
