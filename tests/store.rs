//! Store- and index-level tests over a temporary SQLite database.

use tempfile::TempDir;

use customs_kb::config::{
    ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig, ServerConfig,
    SourcesConfig,
};
use customs_kb::db;
use customs_kb::migrate;
use customs_kb::models::ChunkPoint;
use customs_kb::store::{DocumentInput, HtsCodeInput, Store};
use customs_kb::vector::{SearchFilters, VectorIndex};

fn test_config(tmp: &TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("kb.sqlite"),
        },
        chunking: ChunkingConfig::default(),
        embedding: EmbeddingConfig::default(),
        retrieval: RetrievalConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        sources: SourcesConfig::default(),
    }
}

async fn setup() -> (TempDir, sqlx::SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    (tmp, pool)
}

fn doc_input(number: &str, title: &str) -> DocumentInput {
    DocumentInput {
        document_number: number.to_string(),
        source: "federal_register".to_string(),
        document_type: Some("Notice".to_string()),
        title: title.to_string(),
        abstract_text: Some("An abstract.".to_string()),
        publication_date: Some("2025-03-14".to_string()),
        html_url: None,
        full_text: Some("Full text body.".to_string()),
    }
}

fn code_input(number: &str, description: &str) -> HtsCodeInput {
    HtsCodeInput {
        hts_number: number.to_string(),
        indent_level: 0,
        description: description.to_string(),
        general_rate: None,
        special_rate: None,
        parent_hts_number: None,
    }
}

#[tokio::test]
async fn test_document_roundtrip_by_number() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    store.upsert_document(&doc_input("2025-00001", "First")).await.unwrap();

    let doc = store
        .get_document_by_number("2025-00001")
        .await
        .unwrap()
        .expect("document should exist");

    assert_eq!(doc.title, "First");
    assert_eq!(doc.abstract_text.as_deref(), Some("An abstract."));
    assert_eq!(doc.publication_date.as_deref(), Some("2025-03-14"));
}

#[tokio::test]
async fn test_document_upsert_updates_in_place() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    let id1 = store.upsert_document(&doc_input("2025-00001", "First")).await.unwrap();

    let mut updated = doc_input("2025-00001", "First (corrected)");
    updated.publication_date = Some("2025-03-15".to_string());
    let id2 = store.upsert_document(&updated).await.unwrap();

    assert_eq!(id1, id2, "natural-key upsert must keep the same identity");
    assert_eq!(store.document_count().await.unwrap(), 1);

    let doc = store.get_document_by_number("2025-00001").await.unwrap().unwrap();
    assert_eq!(doc.title, "First (corrected)");
    assert_eq!(doc.publication_date.as_deref(), Some("2025-03-15"));
}

#[tokio::test]
async fn test_get_or_create_agency_idempotent() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    let a1 = store.get_or_create_agency("cbp", "Customs and Border Protection").await.unwrap();
    let a2 = store.get_or_create_agency("cbp", "Customs and Border Protection").await.unwrap();

    assert_eq!(a1.id, a2.id);
}

#[tokio::test]
async fn test_upsert_hts_code_idempotent() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    let id1 = store.upsert_hts_code(&code_input("0406", "Cheese and curd:")).await.unwrap();
    let id2 = store.upsert_hts_code(&code_input("0406", "Cheese and curd (rev):")).await.unwrap();

    assert_eq!(id1, id2);
    assert_eq!(store.hts_count().await.unwrap(), 1);

    let code = store.get_hts_code("0406").await.unwrap().unwrap();
    assert_eq!(code.description, "Cheese and curd (rev):");
}

#[tokio::test]
async fn test_hts_lookup_is_exact_and_search_is_substring() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    store.upsert_hts_code(&code_input("0406.10.04", "Fresh CHEESE, chongos")).await.unwrap();

    assert!(store.get_hts_code("0406.10").await.unwrap().is_none());
    assert!(store.get_hts_code("0406.10.04").await.unwrap().is_some());

    // Case-insensitive description search
    let hits = store.search_hts_codes("cheese", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_agency_links_are_replaced_not_merged() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    let doc_id = store.upsert_document(&doc_input("2025-00001", "First")).await.unwrap();
    store.get_or_create_agency("cbp", "CBP").await.unwrap();
    store.get_or_create_agency("treasury", "Treasury").await.unwrap();
    store.get_or_create_agency("commerce", "Commerce").await.unwrap();

    store
        .link_document_agencies(&doc_id, &["cbp".to_string(), "treasury".to_string()])
        .await
        .unwrap();
    store
        .link_document_agencies(&doc_id, &["treasury".to_string(), "commerce".to_string()])
        .await
        .unwrap();

    let agencies = store.agencies_for_document(&doc_id).await.unwrap();
    let slugs: Vec<&str> = agencies.iter().map(|a| a.slug.as_str()).collect();
    assert_eq!(slugs, vec!["commerce", "treasury"]);
}

#[tokio::test]
async fn test_code_links_skip_unknown_codes() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    let doc_id = store.upsert_document(&doc_input("2025-00001", "First")).await.unwrap();
    store.upsert_hts_code(&code_input("0406.10.04", "Chongos")).await.unwrap();

    store
        .link_document_hts_codes(
            &doc_id,
            &["0406.10.04".to_string(), "9999.99.99".to_string()],
        )
        .await
        .unwrap();

    let codes = store.hts_codes_for_document(&doc_id).await.unwrap();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].hts_number, "0406.10.04");

    let docs = store.documents_for_hts_code("0406.10.04", 10).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].document_number, "2025-00001");
}

#[tokio::test]
async fn test_search_documents_date_range_inclusive() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    for (number, date) in [
        ("2025-00001", "2025-01-10"),
        ("2025-00002", "2025-02-20"),
        ("2025-00003", "2025-03-30"),
    ] {
        let mut input = doc_input(number, number);
        input.publication_date = Some(date.to_string());
        store.upsert_document(&input).await.unwrap();
    }

    let docs = store
        .search_documents(None, Some("2025-01-10"), Some("2025-02-20"), 100)
        .await
        .unwrap();
    let numbers: Vec<&str> = docs.iter().map(|d| d.document_number.as_str()).collect();
    assert_eq!(numbers, vec!["2025-00002", "2025-00001"]);

    let docs = store
        .search_documents(Some("another_source"), None, None, 100)
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_ingestion_run_lifecycle() {
    let (_tmp, pool) = setup().await;
    let store = Store::new(&pool);

    let run = store.create_ingestion_run("htsus").await.unwrap();
    assert_eq!(run.status, "running");
    assert!(run.completed_at.is_none());

    store
        .finish_ingestion_run(&run.id, "completed", 42, None)
        .await
        .unwrap();

    let recent = store.recent_ingestion_runs(10).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status, "completed");
    assert_eq!(recent[0].documents_processed, 42);
    assert!(recent[0].completed_at.is_some());
}

// ============ Vector index ============

fn point(
    document_id: &str,
    chunk_index: i64,
    embedding: Vec<f32>,
    hts_codes: &[&str],
    agencies: &[&str],
    source: &str,
) -> ChunkPoint {
    ChunkPoint {
        point_id: ChunkPoint::point_id_for(document_id, chunk_index),
        document_id: document_id.to_string(),
        document_number: format!("2025-{}", document_id),
        chunk_index,
        source: source.to_string(),
        title: "title".to_string(),
        publication_date: Some("2025-03-14".to_string()),
        text_chunk: format!("chunk {} of {}", chunk_index, document_id),
        hts_codes: hts_codes.iter().map(|s| s.to_string()).collect(),
        agencies: agencies.iter().map(|s| s.to_string()).collect(),
        embedding,
    }
}

#[tokio::test]
async fn test_vector_search_orders_by_similarity() {
    let (_tmp, pool) = setup().await;
    let index = VectorIndex::new(&pool);

    index
        .upsert_points(&[
            point("d1", 0, vec![1.0, 0.0, 0.0], &[], &[], "federal_register"),
            point("d2", 0, vec![0.7, 0.7, 0.0], &[], &[], "federal_register"),
            point("d3", 0, vec![0.0, 1.0, 0.0], &[], &[], "federal_register"),
        ])
        .await
        .unwrap();

    let hits = index
        .search(&[1.0, 0.0, 0.0], 10, None, &SearchFilters::default())
        .await
        .unwrap();

    let ids: Vec<&str> = hits.iter().map(|h| h.payload.document_id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2", "d3"]);
    assert!(hits[0].score > hits[1].score);
    assert!(hits[1].score > hits[2].score);
}

#[tokio::test]
async fn test_vector_search_score_threshold() {
    let (_tmp, pool) = setup().await;
    let index = VectorIndex::new(&pool);

    index
        .upsert_points(&[
            point("d1", 0, vec![1.0, 0.0], &[], &[], "federal_register"),
            point("d2", 0, vec![0.0, 1.0], &[], &[], "federal_register"),
        ])
        .await
        .unwrap();

    let hits = index
        .search(&[1.0, 0.0], 10, Some(0.5), &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.document_id, "d1");
}

#[tokio::test]
async fn test_vector_filters_or_within_and_across_categories() {
    let (_tmp, pool) = setup().await;
    let index = VectorIndex::new(&pool);

    index
        .upsert_points(&[
            point("d1", 0, vec![1.0, 0.0], &["0406.10.00"], &["cbp"], "federal_register"),
            point("d2", 0, vec![1.0, 0.0], &["0406.30.00"], &["cbp"], "federal_register"),
            point("d3", 0, vec![1.0, 0.0], &["0406.10.00"], &["treasury"], "federal_register"),
            point("d4", 0, vec![1.0, 0.0], &["0406.10.00"], &["cbp"], "rulings"),
        ])
        .await
        .unwrap();

    // One category, two values: any-of
    let filters = SearchFilters {
        hts_codes: vec!["0406.10.00".to_string(), "0406.30.00".to_string()],
        ..Default::default()
    };
    let hits = index.search(&[1.0, 0.0], 10, None, &filters).await.unwrap();
    assert_eq!(hits.len(), 4);

    // Two categories: conjunctive
    let filters = SearchFilters {
        hts_codes: vec!["0406.10.00".to_string()],
        agencies: vec!["cbp".to_string()],
        ..Default::default()
    };
    let hits = index.search(&[1.0, 0.0], 10, None, &filters).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.payload.document_id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"d1"));
    assert!(ids.contains(&"d4"));

    // All three categories
    let filters = SearchFilters {
        hts_codes: vec!["0406.10.00".to_string()],
        agencies: vec!["cbp".to_string()],
        source: Some("federal_register".to_string()),
    };
    let hits = index.search(&[1.0, 0.0], 10, None, &filters).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.document_id, "d1");
}

#[tokio::test]
async fn test_vector_upsert_replaces_by_point_id() {
    let (_tmp, pool) = setup().await;
    let index = VectorIndex::new(&pool);

    index
        .upsert_points(&[point("d1", 0, vec![1.0, 0.0], &[], &[], "federal_register")])
        .await
        .unwrap();
    index
        .upsert_points(&[point("d1", 0, vec![0.0, 1.0], &[], &[], "federal_register")])
        .await
        .unwrap();

    assert_eq!(index.count().await.unwrap(), 1);

    let hits = index
        .search(&[0.0, 1.0], 10, None, &SearchFilters::default())
        .await
        .unwrap();
    assert!(hits[0].score > 0.99);
}

#[tokio::test]
async fn test_vector_delete_by_document() {
    let (_tmp, pool) = setup().await;
    let index = VectorIndex::new(&pool);

    index
        .upsert_points(&[
            point("d1", 0, vec![1.0, 0.0], &[], &[], "federal_register"),
            point("d1", 1, vec![0.9, 0.1], &[], &[], "federal_register"),
            point("d2", 0, vec![0.0, 1.0], &[], &[], "federal_register"),
        ])
        .await
        .unwrap();

    let removed = index.delete_by_document("d1").await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(index.count().await.unwrap(), 1);

    let hits = index
        .search(&[1.0, 0.0], 10, None, &SearchFilters::default())
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.payload.document_id == "d2"));
}
