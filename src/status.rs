//! Database statistics and health overview.
//!
//! Provides a quick summary of what's indexed: document counts, tariff
//! code counts, vector coverage, and recent ingestion runs. Used by
//! `ckb status` to give confidence that ingestion is working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::store::Store;
use crate::vector::VectorIndex;

/// Run the status command: query the database and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = Store::new(&pool);

    let total_docs = store.document_count().await?;
    let total_codes = store.hts_count().await?;
    let total_points = VectorIndex::new(&pool).count().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Customs KB — Status");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  HTS codes:   {}", total_codes);
    println!("  Vectors:     {}", total_points);

    // Per-source breakdown
    let source_rows = sqlx::query(
        r#"
        SELECT d.source, COUNT(*) AS doc_count
        FROM documents d
        GROUP BY d.source
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !source_rows.is_empty() {
        println!();
        println!("  By source:");
        for row in &source_rows {
            let source: String = row.get("source");
            let doc_count: i64 = row.get("doc_count");
            println!("    {:<24} {:>6}", source, doc_count);
        }
    }

    let runs = store.recent_ingestion_runs(5).await?;
    if !runs.is_empty() {
        println!();
        println!("  Recent ingestion runs:");
        println!(
            "    {:<18} {:<10} {:>8}   {}",
            "SOURCE", "STATUS", "DOCS", "STARTED"
        );
        for run in &runs {
            println!(
                "    {:<18} {:<10} {:>8}   {}",
                run.source,
                run.status,
                run.documents_processed,
                format_ts_iso(run.started_at)
            );
            if let Some(ref err) = run.error_message {
                println!("      error: {}", err);
            }
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
