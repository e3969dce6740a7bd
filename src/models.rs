//! Core data models used throughout Customs KB.
//!
//! These types represent the documents, tariff codes, chunk points, and
//! search results that flow through the ingestion and retrieval pipeline.

use serde::Serialize;

/// Normalized regulatory document stored in SQLite.
///
/// `document_number` is the natural key: re-ingesting the same number
/// updates the row in place, it never creates a second one.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub document_number: String,
    pub source: String,
    pub document_type: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// ISO `YYYY-MM-DD`, when the notice carries one.
    pub publication_date: Option<String>,
    pub html_url: Option<String>,
    pub full_text: Option<String>,
    pub created_at: i64,
}

/// A government agency, keyed by its Federal Register slug.
#[derive(Debug, Clone, Serialize)]
pub struct Agency {
    pub id: String,
    pub slug: String,
    pub name: String,
}

/// One row of the Harmonized Tariff Schedule.
///
/// `parent_hts_number` is inferred from the flat indent-leveled listing
/// (see [`crate::hierarchy`]); headings at indent 0 have no parent.
#[derive(Debug, Clone, Serialize)]
pub struct HtsCode {
    pub id: String,
    pub hts_number: String,
    pub indent_level: i64,
    pub description: String,
    pub general_rate: Option<String>,
    pub special_rate: Option<String>,
    pub parent_hts_number: Option<String>,
}

/// Provenance record for one ingestion invocation.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRun {
    pub id: String,
    pub source: String,
    /// `running`, `completed`, or `failed`.
    pub status: String,
    pub documents_processed: i64,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

/// An embedded chunk with the denormalized payload stored alongside its
/// vector in the index. Chunks exist only as points; the relational side
/// never stores them.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Derived from `(document_id, chunk_index)` so re-upserting a
    /// document's chunks replaces rather than accumulates.
    pub point_id: String,
    pub document_id: String,
    pub document_number: String,
    pub chunk_index: i64,
    pub source: String,
    pub title: String,
    pub publication_date: Option<String>,
    pub text_chunk: String,
    pub hts_codes: Vec<String>,
    pub agencies: Vec<String>,
    pub embedding: Vec<f32>,
}

impl ChunkPoint {
    pub fn point_id_for(document_id: &str, chunk_index: i64) -> String {
        format!("{}:{}", document_id, chunk_index)
    }
}

/// Payload half of a scored vector hit — everything but the vector.
#[derive(Debug, Clone)]
pub struct PointPayload {
    pub document_id: String,
    pub document_number: String,
    pub chunk_index: i64,
    pub source: String,
    pub title: String,
    pub publication_date: Option<String>,
    pub text_chunk: String,
    pub hts_codes: Vec<String>,
    pub agencies: Vec<String>,
}

/// A single hit from the vector index, descending-score ordered.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub point_id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// A ranked, document-level result from the retrieval engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document_number: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub publication_date: Option<String>,
    pub source: String,
    pub document_type: Option<String>,
    pub html_url: Option<String>,
    pub score: f32,
    /// Leading excerpt of the best-matching chunk.
    pub matched_chunk: String,
    pub agencies: Vec<String>,
    pub hts_codes: Vec<String>,
}

/// A document hydrated with its linked agencies and tariff codes.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub agencies: Vec<Agency>,
    pub hts_codes: Vec<HtsCode>,
}
