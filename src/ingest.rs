//! Ingestion pipeline orchestration.
//!
//! One run record brackets each invocation: created `running` at the
//! start, moved to exactly one terminal state at the end. Item failures
//! are captured per document — one bad notice never aborts the batch —
//! while pipeline-level failures (source unreachable, unparseable feed)
//! mark the whole run `failed` and stop.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::embedding::{self, chunk_and_embed};
use crate::federal_register::{self, FederalRegisterClient, FetchedDocument};
use crate::htsus;
use crate::models::ChunkPoint;
use crate::store::Store;
use crate::vector::VectorIndex;

/// Outcome of one ingestion run, mirroring its provenance record.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub status: String,
    pub processed: i64,
    pub errors: Vec<String>,
    pub duration_secs: f64,
}

/// Ingest Federal Register documents published in the date range.
pub async fn run_federal_register(
    config: &Config,
    pool: &SqlitePool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RunSummary> {
    // Fail before any run record exists if embeddings are misconfigured:
    // a wrong dimension would corrupt every vector written below.
    let provider = embedding::create_provider(&config.embedding)?;
    embedding::verify_dimension(&config.embedding).await?;
    tracing::info!(
        "embedding with model '{}' ({} dims)",
        provider.model_name(),
        provider.dims()
    );

    let started = Instant::now();
    let store = Store::new(pool);
    let run = store.create_ingestion_run(federal_register::SOURCE).await?;

    let client = FederalRegisterClient::new(&config.sources.federal_register)?;
    let raw = match client.fetch_all(start, end).await {
        Ok(raw) => raw,
        Err(e) => {
            let message = format!("fetch failed: {}", e);
            store
                .finish_ingestion_run(&run.id, "failed", 0, Some(&message))
                .await?;
            return Ok(RunSummary {
                run_id: run.id,
                status: "failed".to_string(),
                processed: 0,
                errors: vec![message],
                duration_secs: started.elapsed().as_secs_f64(),
            });
        }
    };

    let documents: Vec<FetchedDocument> =
        raw.into_iter().filter_map(federal_register::transform).collect();

    let mut processed = 0i64;
    let mut errors = Vec::new();

    for fetched in &documents {
        let number = fetched.document.document_number.clone();
        match load_document(config, pool, fetched).await {
            Ok(()) => processed += 1,
            Err(e) => {
                tracing::error!("failed to process document {}: {}", number, e);
                errors.push(format!("{}: {}", number, e));
            }
        }
    }

    let status = if errors.is_empty() || processed > 0 {
        "completed"
    } else {
        "failed"
    };
    let error_message = if errors.is_empty() {
        None
    } else {
        Some(format!("{} item(s) failed", errors.len()))
    };

    store
        .finish_ingestion_run(&run.id, status, processed, error_message.as_deref())
        .await?;

    tracing::info!("loaded {} documents ({} errors)", processed, errors.len());

    Ok(RunSummary {
        run_id: run.id,
        status: status.to_string(),
        processed,
        errors,
        duration_secs: started.elapsed().as_secs_f64(),
    })
}

/// Load one normalized document: relational upsert, replace-set links,
/// then delete-and-reinsert its chunk vectors.
async fn load_document(
    config: &Config,
    pool: &SqlitePool,
    fetched: &FetchedDocument,
) -> Result<()> {
    let store = Store::new(pool);
    let doc_id = store.upsert_document(&fetched.document).await?;

    for (slug, name) in &fetched.agencies {
        store.get_or_create_agency(slug, name).await?;
    }
    let slugs: Vec<String> = fetched.agencies.iter().map(|(s, _)| s.clone()).collect();
    store.link_document_agencies(&doc_id, &slugs).await?;
    store
        .link_document_hts_codes(&doc_id, &fetched.hts_codes)
        .await?;

    // Re-ingestion replaces the document's vectors wholesale; anything
    // from a previous revision would otherwise keep matching queries.
    let index = VectorIndex::new(pool);
    index.delete_by_document(&doc_id).await?;

    let body = fetched.document.full_text.as_deref().unwrap_or("");
    let pairs = chunk_and_embed(&config.embedding, &config.chunking, body).await?;

    if pairs.is_empty() {
        return Ok(());
    }

    let points: Vec<ChunkPoint> = pairs
        .into_iter()
        .enumerate()
        .map(|(chunk_index, (text_chunk, vector))| ChunkPoint {
            point_id: ChunkPoint::point_id_for(&doc_id, chunk_index as i64),
            document_id: doc_id.clone(),
            document_number: fetched.document.document_number.clone(),
            chunk_index: chunk_index as i64,
            source: fetched.document.source.clone(),
            title: fetched.document.title.clone(),
            publication_date: fetched.document.publication_date.clone(),
            text_chunk,
            hts_codes: fetched.hts_codes.clone(),
            agencies: slugs.clone(),
            embedding: vector,
        })
        .collect();

    index.upsert_points(&points).await?;
    Ok(())
}

/// Ingest the HTSUS tariff schedule, from a local file when given,
/// otherwise by downloading the configured CSV.
pub async fn run_htsus(
    config: &Config,
    pool: &SqlitePool,
    file: Option<&Path>,
) -> Result<RunSummary> {
    let started = Instant::now();
    let store = Store::new(pool);
    let run = store.create_ingestion_run(htsus::SOURCE).await?;

    let fail = |message: String| RunSummary {
        run_id: run.id.clone(),
        status: "failed".to_string(),
        processed: 0,
        errors: vec![message],
        duration_secs: started.elapsed().as_secs_f64(),
    };

    let csv_text = match file {
        Some(path) => htsus::read_csv_file(path),
        None => htsus::fetch_csv(&config.sources.htsus).await,
    };
    let csv_text = match csv_text {
        Ok(text) => text,
        Err(e) => {
            let message = format!("fetch failed: {}", e);
            store
                .finish_ingestion_run(&run.id, "failed", 0, Some(&message))
                .await?;
            return Ok(fail(message));
        }
    };

    let codes = match htsus::parse_schedule(&csv_text) {
        Ok(codes) => codes,
        Err(e) => {
            let message = format!("parse failed: {}", e);
            store
                .finish_ingestion_run(&run.id, "failed", 0, Some(&message))
                .await?;
            return Ok(fail(message));
        }
    };

    let mut processed = 0i64;
    let mut errors = Vec::new();

    for code in &codes {
        match store.upsert_hts_code(code).await {
            Ok(_) => processed += 1,
            Err(e) => {
                tracing::error!("failed to upsert HTS code {}: {}", code.hts_number, e);
                errors.push(format!("{}: {}", code.hts_number, e));
            }
        }
    }

    let status = if errors.is_empty() || processed > 0 {
        "completed"
    } else {
        "failed"
    };
    let error_message = if errors.is_empty() {
        None
    } else {
        Some(format!("{} row(s) failed", errors.len()))
    };

    store
        .finish_ingestion_run(&run.id, status, processed, error_message.as_deref())
        .await?;

    tracing::info!("loaded {} HTS codes ({} errors)", processed, errors.len());

    Ok(RunSummary {
        run_id: run.id,
        status: status.to_string(),
        processed,
        errors,
        duration_secs: started.elapsed().as_secs_f64(),
    })
}
