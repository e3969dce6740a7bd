//! Federal Register API client and document transform.
//!
//! Fetches regulatory notices for the configured agency from the public
//! Federal Register API, page by page, and normalizes each raw document
//! into the shape the load path expects: stripped full text, a validated
//! publication date, extracted tariff codes, and agency slug/name pairs.

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

use crate::config::FederalRegisterConfig;
use crate::store::DocumentInput;
use crate::text::{extract_hts_codes, strip_html};

/// Retry cap for transient API failures (429/5xx/network).
const MAX_RETRIES: u32 = 3;

pub const SOURCE: &str = "federal_register";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiDocument>,
    #[serde(default)]
    total_pages: Option<u32>,
}

/// One raw document as returned by the API.
#[derive(Debug, Deserialize)]
pub struct ApiDocument {
    pub document_number: Option<String>,
    #[serde(rename = "type")]
    pub document_type: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_html: Option<String>,
    pub publication_date: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub agencies: Vec<ApiAgency>,
}

#[derive(Debug, Deserialize)]
pub struct ApiAgency {
    pub slug: Option<String>,
    pub name: Option<String>,
}

/// A normalized document ready for the load path.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub document: DocumentInput,
    /// `(slug, name)` pairs for every agency attached to the notice.
    pub agencies: Vec<(String, String)>,
    /// Tariff codes mentioned in the document text.
    pub hts_codes: Vec<String>,
}

pub struct FederalRegisterClient {
    base_url: String,
    agency: String,
    per_page: u32,
    http: reqwest::Client,
}

impl FederalRegisterClient {
    pub fn new(config: &FederalRegisterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            agency: config.agency.clone(),
            per_page: config.per_page,
            http,
        })
    }

    /// Fetch one result page, retrying transient failures with
    /// exponential backoff.
    async fn fetch_page(&self, start: NaiveDate, end: NaiveDate, page: u32) -> Result<ApiResponse> {
        let url = format!("{}/documents", self.base_url);
        let params = [
            ("conditions[agencies][]", self.agency.clone()),
            ("conditions[publication_date][gte]", start.to_string()),
            ("conditions[publication_date][lte]", end.to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
            ("order", "oldest".to_string()),
        ];

        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.http.get(&url).query(&params).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json::<ApiResponse>().await?);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("Federal Register API error {}", status));
                        continue;
                    }

                    bail!("Federal Register API error {}", status);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Federal Register fetch failed after retries")))
    }

    /// Fetch every document published in the date range (inclusive),
    /// following the API's paging.
    pub async fn fetch_all(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ApiDocument>> {
        let mut documents = Vec::new();
        let mut page = 1u32;
        let mut total_pages: Option<u32> = None;

        tracing::info!("fetching Federal Register documents from {} to {}", start, end);

        loop {
            let response = self.fetch_page(start, end, page).await?;

            if total_pages.is_none() {
                total_pages = Some(response.total_pages.unwrap_or(1));
            }
            let total = total_pages.unwrap_or(1);

            tracing::info!(
                "fetched page {}/{} ({} documents)",
                page,
                total,
                response.results.len()
            );

            documents.extend(response.results);

            if page >= total {
                break;
            }
            page += 1;
        }

        tracing::info!("fetched {} total documents", documents.len());
        Ok(documents)
    }
}

/// Normalize a raw API document. Returns `None` for documents without a
/// document number (nothing to key on).
pub fn transform(raw: ApiDocument) -> Option<FetchedDocument> {
    let document_number = raw.document_number.filter(|n| !n.trim().is_empty())?;

    let abstract_html = raw.abstract_html.unwrap_or_default();
    let full_text = strip_html(&abstract_html);

    // Drop dates the API sends in an unexpected shape rather than storing
    // something unsortable
    let publication_date = raw
        .publication_date
        .filter(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());

    let hts_codes = extract_hts_codes(&full_text);

    let agencies: Vec<(String, String)> = raw
        .agencies
        .into_iter()
        .filter_map(|a| {
            let slug = a.slug.filter(|s| !s.is_empty())?;
            let name = a.name.unwrap_or_else(|| slug.clone());
            Some((slug, name))
        })
        .collect();

    Some(FetchedDocument {
        document: DocumentInput {
            document_number,
            source: SOURCE.to_string(),
            document_type: raw.document_type,
            title: raw.title.unwrap_or_default(),
            abstract_text: Some(abstract_html),
            publication_date,
            html_url: raw.html_url,
            full_text: Some(full_text),
        },
        agencies,
        hts_codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_doc() -> ApiDocument {
        ApiDocument {
            document_number: Some("2025-01234".to_string()),
            document_type: Some("Notice".to_string()),
            title: Some("Import Duties on Cheese".to_string()),
            abstract_html: Some(
                "<p>Duties for HTS <b>0406.10.00</b> and 0406.30.00 are revised.</p>".to_string(),
            ),
            publication_date: Some("2025-03-14".to_string()),
            html_url: Some("https://example.gov/2025-01234".to_string()),
            agencies: vec![ApiAgency {
                slug: Some("u-s-customs-and-border-protection".to_string()),
                name: Some("U.S. Customs and Border Protection".to_string()),
            }],
        }
    }

    #[test]
    fn test_transform_strips_html_and_extracts_codes() {
        let fetched = transform(raw_doc()).unwrap();
        assert_eq!(
            fetched.document.full_text.as_deref(),
            Some("Duties for HTS 0406.10.00 and 0406.30.00 are revised.")
        );
        assert_eq!(fetched.hts_codes, vec!["0406.10.00", "0406.30.00"]);
        assert_eq!(fetched.document.source, SOURCE);
        // Raw abstract is stored untouched for display
        assert!(fetched
            .document
            .abstract_text
            .as_deref()
            .unwrap()
            .contains("<b>"));
    }

    #[test]
    fn test_transform_requires_document_number() {
        let mut raw = raw_doc();
        raw.document_number = None;
        assert!(transform(raw).is_none());

        let mut raw = raw_doc();
        raw.document_number = Some("  ".to_string());
        assert!(transform(raw).is_none());
    }

    #[test]
    fn test_transform_drops_malformed_dates() {
        let mut raw = raw_doc();
        raw.publication_date = Some("03/14/2025".to_string());
        let fetched = transform(raw).unwrap();
        assert!(fetched.document.publication_date.is_none());
    }

    #[test]
    fn test_transform_skips_agencies_without_slug() {
        let mut raw = raw_doc();
        raw.agencies.push(ApiAgency {
            slug: None,
            name: Some("Anonymous Office".to_string()),
        });
        let fetched = transform(raw).unwrap();
        assert_eq!(fetched.agencies.len(), 1);
    }
}
