//! Relational store queries.
//!
//! All reads and writes against the document, agency, tariff-code, and
//! ingestion-run tables go through explicit methods here — association
//! lookups are owned queries (`agencies_for_document`,
//! `documents_for_hts_code`), never lazy collections, so every I/O
//! boundary is visible at the call site.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Agency, Document, HtsCode, IngestionRun};

/// Fields for creating or updating a document. The `document_number` is
/// the natural key; everything else is replaced on re-ingestion.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub document_number: String,
    pub source: String,
    pub document_type: Option<String>,
    pub title: String,
    pub abstract_text: Option<String>,
    pub publication_date: Option<String>,
    pub html_url: Option<String>,
    pub full_text: Option<String>,
}

/// Fields for one tariff-schedule row.
#[derive(Debug, Clone)]
pub struct HtsCodeInput {
    pub hts_number: String,
    pub indent_level: i64,
    pub description: String,
    pub general_rate: Option<String>,
    pub special_rate: Option<String>,
    pub parent_hts_number: Option<String>,
}

pub struct Store<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Store<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    // ============ Documents ============

    /// Create a document or update it in place, keyed by document number.
    /// Returns the document's id.
    pub async fn upsert_document(&self, input: &DocumentInput) -> Result<String> {
        let existing_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE document_number = ?")
                .bind(&input.document_number)
                .fetch_optional(self.pool)
                .await?;

        let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, document_number, source, document_type, title, abstract,
                 publication_date, html_url, full_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_number) DO UPDATE SET
                source = excluded.source,
                document_type = excluded.document_type,
                title = excluded.title,
                abstract = excluded.abstract,
                publication_date = excluded.publication_date,
                html_url = excluded.html_url,
                full_text = excluded.full_text
            "#,
        )
        .bind(&doc_id)
        .bind(&input.document_number)
        .bind(&input.source)
        .bind(&input.document_type)
        .bind(&input.title)
        .bind(&input.abstract_text)
        .bind(&input.publication_date)
        .bind(&input.html_url)
        .bind(&input.full_text)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(doc_id)
    }

    pub async fn get_document_by_number(&self, document_number: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, document_number, source, document_type, title, abstract, publication_date, html_url, full_text, created_at FROM documents WHERE document_number = ?",
        )
        .bind(document_number)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| document_from_row(&r)))
    }

    pub async fn get_document_by_id(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, document_number, source, document_type, title, abstract, publication_date, html_url, full_text, created_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| document_from_row(&r)))
    }

    /// Filtered document listing ordered by publication date descending.
    /// Date bounds are inclusive; documents without a publication date are
    /// excluded once a bound is given.
    pub async fn search_documents(
        &self,
        source: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_number, source, document_type, title, abstract,
                   publication_date, html_url, full_text, created_at
            FROM documents
            WHERE (? IS NULL OR source = ?)
              AND (? IS NULL OR publication_date >= ?)
              AND (? IS NULL OR publication_date <= ?)
            ORDER BY publication_date DESC
            LIMIT ?
            "#,
        )
        .bind(source)
        .bind(source)
        .bind(start_date)
        .bind(start_date)
        .bind(end_date)
        .bind(end_date)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn document_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    // ============ Agencies ============

    /// Get an agency by slug, creating it if missing. Re-running with the
    /// same slug never produces a second row; the display name is kept
    /// current.
    pub async fn get_or_create_agency(&self, slug: &str, name: &str) -> Result<Agency> {
        sqlx::query(
            r#"
            INSERT INTO agencies (id, slug, name) VALUES (?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(slug)
        .bind(name)
        .execute(self.pool)
        .await?;

        let row = sqlx::query("SELECT id, slug, name FROM agencies WHERE slug = ?")
            .bind(slug)
            .fetch_one(self.pool)
            .await?;

        Ok(Agency {
            id: row.get("id"),
            slug: row.get("slug"),
            name: row.get("name"),
        })
    }

    /// Replace a document's agency links with the given slug set.
    /// Slugs without a matching agency row are skipped.
    pub async fn link_document_agencies(
        &self,
        document_id: &str,
        agency_slugs: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_agencies WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for slug in agency_slugs {
            let agency_id: Option<String> =
                sqlx::query_scalar("SELECT id FROM agencies WHERE slug = ?")
                    .bind(slug)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some(agency_id) = agency_id {
                sqlx::query(
                    "INSERT OR IGNORE INTO document_agencies (document_id, agency_id) VALUES (?, ?)",
                )
                .bind(document_id)
                .bind(&agency_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn agencies_for_document(&self, document_id: &str) -> Result<Vec<Agency>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.slug, a.name
            FROM agencies a
            JOIN document_agencies da ON da.agency_id = a.id
            WHERE da.document_id = ?
            ORDER BY a.slug
            "#,
        )
        .bind(document_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Agency {
                id: r.get("id"),
                slug: r.get("slug"),
                name: r.get("name"),
            })
            .collect())
    }

    // ============ HTS codes ============

    /// Create a tariff-code row or refresh its fields, keyed by the code
    /// string. Returns the row's id.
    pub async fn upsert_hts_code(&self, input: &HtsCodeInput) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO hts_codes
                (id, hts_number, indent_level, description, general_rate, special_rate, parent_hts_number)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hts_number) DO UPDATE SET
                indent_level = excluded.indent_level,
                description = excluded.description,
                general_rate = excluded.general_rate,
                special_rate = excluded.special_rate,
                parent_hts_number = excluded.parent_hts_number
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&input.hts_number)
        .bind(input.indent_level)
        .bind(&input.description)
        .bind(&input.general_rate)
        .bind(&input.special_rate)
        .bind(&input.parent_hts_number)
        .execute(self.pool)
        .await?;

        let id: String = sqlx::query_scalar("SELECT id FROM hts_codes WHERE hts_number = ?")
            .bind(&input.hts_number)
            .fetch_one(self.pool)
            .await?;

        Ok(id)
    }

    /// Exact, case-sensitive lookup on the code string.
    pub async fn get_hts_code(&self, hts_number: &str) -> Result<Option<HtsCode>> {
        let row = sqlx::query(
            "SELECT id, hts_number, indent_level, description, general_rate, special_rate, parent_hts_number FROM hts_codes WHERE hts_number = ?",
        )
        .bind(hts_number)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| hts_code_from_row(&r)))
    }

    /// Case-insensitive substring search over code descriptions.
    pub async fn search_hts_codes(&self, term: &str, limit: i64) -> Result<Vec<HtsCode>> {
        let rows = sqlx::query(
            r#"
            SELECT id, hts_number, indent_level, description, general_rate, special_rate, parent_hts_number
            FROM hts_codes
            WHERE description LIKE ?
            ORDER BY hts_number
            LIMIT ?
            "#,
        )
        .bind(format!("%{}%", term))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.iter().map(hts_code_from_row).collect())
    }

    /// Replace a document's tariff-code links with the given code set.
    /// Codes not present in the schedule are skipped.
    pub async fn link_document_hts_codes(
        &self,
        document_id: &str,
        hts_numbers: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_hts_codes WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for number in hts_numbers {
            let code_id: Option<String> =
                sqlx::query_scalar("SELECT id FROM hts_codes WHERE hts_number = ?")
                    .bind(number)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some(code_id) = code_id {
                sqlx::query(
                    "INSERT OR IGNORE INTO document_hts_codes (document_id, hts_code_id) VALUES (?, ?)",
                )
                .bind(document_id)
                .bind(&code_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn hts_codes_for_document(&self, document_id: &str) -> Result<Vec<HtsCode>> {
        let rows = sqlx::query(
            r#"
            SELECT h.id, h.hts_number, h.indent_level, h.description, h.general_rate, h.special_rate, h.parent_hts_number
            FROM hts_codes h
            JOIN document_hts_codes dh ON dh.hts_code_id = h.id
            WHERE dh.document_id = ?
            ORDER BY h.hts_number
            "#,
        )
        .bind(document_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.iter().map(hts_code_from_row).collect())
    }

    pub async fn documents_for_hts_code(
        &self,
        hts_number: &str,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.document_number, d.source, d.document_type, d.title, d.abstract,
                   d.publication_date, d.html_url, d.full_text, d.created_at
            FROM documents d
            JOIN document_hts_codes dh ON dh.document_id = d.id
            JOIN hts_codes h ON h.id = dh.hts_code_id
            WHERE h.hts_number = ?
            ORDER BY d.publication_date DESC
            LIMIT ?
            "#,
        )
        .bind(hts_number)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn hts_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hts_codes")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    // ============ Ingestion runs ============

    /// Open a new run in `running` state.
    pub async fn create_ingestion_run(&self, source: &str) -> Result<IngestionRun> {
        let run = IngestionRun {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            status: "running".to_string(),
            documents_processed: 0,
            started_at: chrono::Utc::now().timestamp(),
            completed_at: None,
            error_message: None,
        };

        sqlx::query(
            "INSERT INTO ingestion_runs (id, source, status, documents_processed, started_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.source)
        .bind(&run.status)
        .bind(run.documents_processed)
        .bind(run.started_at)
        .execute(self.pool)
        .await?;

        Ok(run)
    }

    /// Move a run to its terminal state. Called exactly once per run,
    /// with `completed` or `failed`.
    pub async fn finish_ingestion_run(
        &self,
        run_id: &str,
        status: &str,
        documents_processed: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET status = ?, documents_processed = ?, completed_at = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(documents_processed)
        .bind(chrono::Utc::now().timestamp())
        .bind(error_message)
        .bind(run_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn recent_ingestion_runs(&self, limit: i64) -> Result<Vec<IngestionRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, status, documents_processed, started_at, completed_at, error_message
            FROM ingestion_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| IngestionRun {
                id: r.get("id"),
                source: r.get("source"),
                status: r.get("status"),
                documents_processed: r.get("documents_processed"),
                started_at: r.get("started_at"),
                completed_at: r.get("completed_at"),
                error_message: r.get("error_message"),
            })
            .collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        document_number: row.get("document_number"),
        source: row.get("source"),
        document_type: row.get("document_type"),
        title: row.get("title"),
        abstract_text: row.get("abstract"),
        publication_date: row.get("publication_date"),
        html_url: row.get("html_url"),
        full_text: row.get("full_text"),
        created_at: row.get("created_at"),
    }
}

fn hts_code_from_row(row: &SqliteRow) -> HtsCode {
    HtsCode {
        id: row.get("id"),
        hts_number: row.get("hts_number"),
        indent_level: row.get("indent_level"),
        description: row.get("description"),
        general_rate: row.get("general_rate"),
        special_rate: row.get("special_rate"),
        parent_hts_number: row.get("parent_hts_number"),
    }
}
