//! Filtered vector similarity index over SQLite.
//!
//! Chunk vectors live in the `chunk_points` table as little-endian f32
//! BLOBs next to a denormalized payload (document number, source, title,
//! publication date, linked agency slugs and tariff codes), so filtered
//! search never joins back to the relational tables.
//!
//! Search is a brute-force cosine scan: candidate rows are fetched (with
//! source equality pushed into SQL), payload filters applied, similarity
//! computed in Rust, then sorted descending and truncated. Filters are
//! conjunctive across categories; within a category, any listed value
//! matches.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{ChunkPoint, PointPayload, ScoredPoint};

/// Filter set for [`VectorIndex::search`]. Empty categories are ignored.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Match points whose payload contains any of these codes.
    pub hts_codes: Vec<String>,
    /// Match points whose payload contains any of these agency slugs.
    pub agencies: Vec<String>,
    /// Exact source tag match.
    pub source: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.hts_codes.is_empty() && self.agencies.is_empty() && self.source.is_none()
    }
}

/// Vector store operations over the shared connection pool.
pub struct VectorIndex<'a> {
    pool: &'a SqlitePool,
}

impl<'a> VectorIndex<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace chunk points by their id.
    ///
    /// Point ids derive from `(document_id, chunk_index)`, so re-upserting
    /// a document's chunks overwrites the previous vectors rather than
    /// accumulating duplicates.
    pub async fn upsert_points(&self, points: &[ChunkPoint]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for point in points {
            sqlx::query(
                r#"
                INSERT INTO chunk_points
                    (point_id, document_id, document_number, chunk_index, source,
                     title, publication_date, text_chunk, hts_codes, agencies, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(point_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    document_number = excluded.document_number,
                    chunk_index = excluded.chunk_index,
                    source = excluded.source,
                    title = excluded.title,
                    publication_date = excluded.publication_date,
                    text_chunk = excluded.text_chunk,
                    hts_codes = excluded.hts_codes,
                    agencies = excluded.agencies,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&point.point_id)
            .bind(&point.document_id)
            .bind(&point.document_number)
            .bind(point.chunk_index)
            .bind(&point.source)
            .bind(&point.title)
            .bind(&point.publication_date)
            .bind(&point.text_chunk)
            .bind(serde_json::to_string(&point.hts_codes)?)
            .bind(serde_json::to_string(&point.agencies)?)
            .bind(vec_to_blob(&point.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(points.len())
    }

    /// Filtered nearest-neighbor search, descending by cosine similarity.
    ///
    /// `score_threshold` excludes results below it; `None` means no floor.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredPoint>> {
        let rows = if let Some(ref source) = filters.source {
            sqlx::query(
                r#"
                SELECT point_id, document_id, document_number, chunk_index, source,
                       title, publication_date, text_chunk, hts_codes, agencies, embedding
                FROM chunk_points
                WHERE source = ?
                "#,
            )
            .bind(source)
            .fetch_all(self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT point_id, document_id, document_number, chunk_index, source,
                       title, publication_date, text_chunk, hts_codes, agencies, embedding
                FROM chunk_points
                "#,
            )
            .fetch_all(self.pool)
            .await?
        };

        let mut hits: Vec<ScoredPoint> = Vec::new();

        for row in &rows {
            let hts_codes: Vec<String> =
                serde_json::from_str(row.get::<String, _>("hts_codes").as_str())
                    .unwrap_or_default();
            let agencies: Vec<String> =
                serde_json::from_str(row.get::<String, _>("agencies").as_str())
                    .unwrap_or_default();

            // Conjunctive across categories, any-of within a category
            if !filters.hts_codes.is_empty()
                && !filters.hts_codes.iter().any(|c| hts_codes.contains(c))
            {
                continue;
            }
            if !filters.agencies.is_empty()
                && !filters.agencies.iter().any(|a| agencies.contains(a))
            {
                continue;
            }

            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query_vector, &blob_to_vec(&blob));

            if let Some(threshold) = score_threshold {
                if score < threshold {
                    continue;
                }
            }

            hits.push(ScoredPoint {
                point_id: row.get("point_id"),
                score,
                payload: PointPayload {
                    document_id: row.get("document_id"),
                    document_number: row.get("document_number"),
                    chunk_index: row.get("chunk_index"),
                    source: row.get("source"),
                    title: row.get("title"),
                    publication_date: row.get("publication_date"),
                    text_chunk: row.get("text_chunk"),
                    hts_codes,
                    agencies,
                },
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        Ok(hits)
    }

    /// Remove every chunk point denormalized from a document.
    ///
    /// The ingestion load path calls this before re-embedding an updated
    /// document, so stale chunks from a previous revision never linger.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunk_points WHERE document_id = ?")
            .bind(document_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Total number of stored points.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_points")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
