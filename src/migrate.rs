use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Core document metadata, one row per Federal Register document
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            document_number TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            document_type TEXT,
            title TEXT NOT NULL,
            abstract TEXT,
            publication_date TEXT,
            html_url TEXT,
            full_text TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agencies (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hts_codes (
            id TEXT PRIMARY KEY,
            hts_number TEXT NOT NULL UNIQUE,
            indent_level INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL,
            general_rate TEXT,
            special_rate TEXT,
            parent_hts_number TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_agencies (
            document_id TEXT NOT NULL,
            agency_id TEXT NOT NULL,
            PRIMARY KEY (document_id, agency_id),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (agency_id) REFERENCES agencies(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_hts_codes (
            document_id TEXT NOT NULL,
            hts_code_id TEXT NOT NULL,
            PRIMARY KEY (document_id, hts_code_id),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
            FOREIGN KEY (hts_code_id) REFERENCES hts_codes(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Vector index: one row per embedded chunk, with denormalized payload
    // columns so filtered search needs no join at query time
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_points (
            point_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            document_number TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            publication_date TEXT,
            text_chunk TEXT NOT NULL,
            hts_codes TEXT NOT NULL DEFAULT '[]',
            agencies TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingestion_runs (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            documents_processed INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            error_message TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_number ON documents(document_number)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_publication_date ON documents(publication_date)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_hts_codes_number ON hts_codes(hts_number)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_agencies_slug ON agencies(slug)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_points_document ON chunk_points(document_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_points_source ON chunk_points(source)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingestion_runs_started ON ingestion_runs(started_at DESC)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
