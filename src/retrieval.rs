//! Semantic, structured, and hybrid search.
//!
//! The retrieval engine is the fan-out/fan-in point of the system: a
//! query is embedded once, the vector index is scanned with whatever
//! structured filters push down, and the chunk-level hits are folded
//! into document-level results — best chunk wins, one result per
//! document — hydrated from the relational store.
//!
//! Because several chunks of one document can rank in the candidate set,
//! the index is asked for `limit × candidate_multiplier` candidates
//! before dedup; without the over-fetch a single chatty document could
//! crowd the entire candidate window and shrink the result list.
//!
//! A vector-index failure degrades to an empty result list (logged at
//! `warn`), so a search outage reads as "no matches" rather than a hard
//! error. Callers that must distinguish the two cases should watch the
//! logs.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::config::Config;
use crate::embedding::embed_query;
use crate::models::{DocumentDetail, HtsCode, ScoredPoint, SearchHit};
use crate::store::Store;
use crate::vector::{SearchFilters, VectorIndex};

/// Hybrid result for a tariff-code + text query: the semantic hits plus
/// the detail of the code used as the filter.
#[derive(Debug, Clone, Serialize)]
pub struct HtsFilteredSearch {
    pub hts_code: Option<HtsCode>,
    pub results: Vec<SearchHit>,
}

/// Stateless per-call orchestrator over the relational store and the
/// vector index. Safe to share across concurrent queries.
pub struct RetrievalEngine {
    config: Config,
    pool: SqlitePool,
}

impl RetrievalEngine {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        Self { config, pool }
    }

    /// Semantic search with optional structured filters.
    ///
    /// Pipeline: embed the query, scan the vector index (filters pushed
    /// down), keep the best chunk per document in descending score order,
    /// hydrate each surviving document from the relational store, and
    /// return at most `limit` hits. Documents that vanished between
    /// indexing and hydration are skipped silently.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: Option<f32>,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        let query_vector = embed_query(&self.config.embedding, query).await?;

        let index = VectorIndex::new(&self.pool);
        let candidate_limit = limit * self.config.retrieval.candidate_multiplier;

        let candidates = match index
            .search(&query_vector, candidate_limit, score_threshold, filters)
            .await
        {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!("vector search failed, returning no results: {}", e);
                return Ok(vec![]);
            }
        };

        let deduped = first_hit_per_document(candidates);
        let store = Store::new(&self.pool);
        let mut hits = Vec::new();

        for point in deduped {
            if hits.len() >= limit {
                break;
            }

            let document = match store.get_document_by_id(&point.payload.document_id).await? {
                Some(doc) => doc,
                None => continue,
            };

            let agencies = store.agencies_for_document(&document.id).await?;
            let hts_codes = store.hts_codes_for_document(&document.id).await?;

            hits.push(SearchHit {
                document_number: document.document_number,
                title: document.title,
                abstract_text: document.abstract_text,
                publication_date: document.publication_date,
                source: document.source,
                document_type: document.document_type,
                html_url: document.html_url,
                score: point.score,
                matched_chunk: excerpt(&point.payload.text_chunk, 200),
                agencies: agencies.into_iter().map(|a| a.name).collect(),
                hts_codes: hts_codes.into_iter().map(|h| h.hts_number).collect(),
            });
        }

        Ok(hits)
    }

    /// Structured lookup: full document detail by its document number.
    pub async fn document_detail(&self, document_number: &str) -> Result<Option<DocumentDetail>> {
        let store = Store::new(&self.pool);

        let document = match store.get_document_by_number(document_number).await? {
            Some(doc) => doc,
            None => return Ok(None),
        };

        let agencies = store.agencies_for_document(&document.id).await?;
        let hts_codes = store.hts_codes_for_document(&document.id).await?;

        Ok(Some(DocumentDetail {
            document,
            agencies,
            hts_codes,
        }))
    }

    /// Hybrid: semantic ranking within the chunks tagged with one tariff
    /// code, enriched with that code's schedule entry.
    pub async fn search_by_hts_and_text(
        &self,
        hts_number: &str,
        query: &str,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<HtsFilteredSearch> {
        let filters = SearchFilters {
            hts_codes: vec![hts_number.to_string()],
            ..Default::default()
        };

        let results = self.search(query, limit, score_threshold, &filters).await?;
        let hts_code = Store::new(&self.pool).get_hts_code(hts_number).await?;

        Ok(HtsFilteredSearch { hts_code, results })
    }

    /// Hybrid: semantic ranking within one agency's documents.
    pub async fn search_by_agency_and_text(
        &self,
        agency_slug: &str,
        query: &str,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        let filters = SearchFilters {
            agencies: vec![agency_slug.to_string()],
            ..Default::default()
        };

        self.search(query, limit, score_threshold, &filters).await
    }

    /// Hybrid: semantic search post-filtered to a publication-date range.
    ///
    /// The structured side collects at most `retrieval.date_filter_cap`
    /// matching document numbers, so ranges wider than the cap are not
    /// exhaustive. The semantic side over-fetches (`limit × 2`) before
    /// the intersection.
    pub async fn search_with_date_filter(
        &self,
        query: &str,
        start_date: &str,
        end_date: &str,
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        let store = Store::new(&self.pool);
        let in_range = store
            .search_documents(
                None,
                Some(start_date),
                Some(end_date),
                self.config.retrieval.date_filter_cap,
            )
            .await?;

        let allowed: HashSet<String> = in_range
            .into_iter()
            .map(|doc| doc.document_number)
            .collect();

        let mut results = self
            .search(query, limit * 2, score_threshold, &SearchFilters::default())
            .await?;

        results.retain(|hit| allowed.contains(&hit.document_number));
        results.truncate(limit);

        Ok(results)
    }
}

/// Collapse chunk-level hits to one (best-scoring) hit per document,
/// preserving descending score order.
fn first_hit_per_document(points: Vec<ScoredPoint>) -> Vec<ScoredPoint> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for point in points {
        if seen.insert(point.payload.document_id.clone()) {
            out.push(point);
        }
    }

    out
}

/// Leading excerpt of a chunk, char-boundary safe.
fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
