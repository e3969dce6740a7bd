//! HTSUS schedule download and transform.
//!
//! The USITC publishes the Harmonized Tariff Schedule as a flat CSV with
//! an indent column expressing nesting. This module fetches the file
//! (or reads a local copy), parses it, and turns each row into an
//! [`HtsCodeInput`] with its parent inferred via [`crate::hierarchy`].

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::config::HtsusConfig;
use crate::hierarchy::{infer_parent, TrailingLevels};
use crate::store::HtsCodeInput;

pub const SOURCE: &str = "htsus";

const MAX_RETRIES: u32 = 3;

/// Download the schedule CSV from the configured URL.
pub async fn fetch_csv(config: &HtsusConfig) -> Result<String> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    let mut last_err = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = http.get(&config.url).send().await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let body = response.text().await?;
                    tracing::info!("downloaded {} bytes of HTSUS data", body.len());
                    return Ok(body);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("HTSUS download error {}", status));
                    continue;
                }

                bail!("HTSUS download error {}", status);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("HTSUS download failed after retries")))
}

/// Read a previously downloaded schedule CSV from disk.
pub fn read_csv_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read HTSUS file: {}", path.display()))
}

/// Parse the schedule CSV into tariff-code rows, inferring parents from
/// the indent column in listing order.
///
/// Header names are normalized (lowercased, spaces to underscores), a
/// UTF-8 BOM is tolerated, rows without an HTS number are skipped, and
/// an unparseable indent falls back to 0.
pub fn parse_schedule(csv_text: &str) -> Result<Vec<HtsCodeInput>> {
    let csv_text = csv_text.strip_prefix('\u{feff}').unwrap_or(csv_text);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("HTSUS CSV has no header row")?
        .iter()
        .map(|h| h.trim().to_lowercase().replace(' ', "_"))
        .collect();

    let col = |name: &str| headers.iter().position(|h| h == name);

    let number_col = col("hts_number")
        .ok_or_else(|| anyhow!("HTSUS CSV is missing the 'HTS Number' column"))?;
    let indent_col = col("indent");
    let description_col = col("description");
    let general_col = col("general_rate_of_duty");
    let special_col = col("special_rate_of_duty");

    let field = |record: &csv::StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| record.get(i))
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let mut codes = Vec::new();
    let mut trailing = TrailingLevels::new();

    for record in reader.records() {
        let record = record?;

        let hts_number = field(&record, Some(number_col));
        if hts_number.is_empty() {
            // Chapter notes and section headings carry no code
            continue;
        }

        let indent_level = field(&record, indent_col).parse::<i64>().unwrap_or(0);
        let parent_hts_number = infer_parent(&hts_number, indent_level, &mut trailing);

        codes.push(HtsCodeInput {
            hts_number,
            indent_level,
            description: field(&record, description_col),
            general_rate: rate_or_none(field(&record, general_col)),
            special_rate: rate_or_none(field(&record, special_col)),
            parent_hts_number,
        });
    }

    tracing::info!("parsed {} HTSUS entries", codes.len());
    Ok(codes)
}

fn rate_or_none(raw: String) -> Option<String> {
    if raw.is_empty() || raw == "nan" {
        None
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
HTS Number,Indent,Description,General Rate of Duty,Special Rate of Duty
0406,0,\"Cheese and curd:\",,
0406.10,1,\"Fresh (unripened or uncured) cheese, including whey cheese\",,
0406.10.04,2,Chongos,10%,\"Free (A+, AU, BH)\"
0406.20,1,Grated or powdered cheese,,
0406.20.10,2,Roquefort,8%,
";

    #[test]
    fn test_parse_infers_parents() {
        let codes = parse_schedule(SAMPLE).unwrap();
        assert_eq!(codes.len(), 5);

        assert_eq!(codes[0].hts_number, "0406");
        assert_eq!(codes[0].parent_hts_number, None);

        assert_eq!(codes[1].parent_hts_number.as_deref(), Some("0406"));
        assert_eq!(codes[2].parent_hts_number.as_deref(), Some("0406.10"));
        // Sibling at indent 1 attaches back to the chapter heading
        assert_eq!(codes[3].parent_hts_number.as_deref(), Some("0406"));
        assert_eq!(codes[4].parent_hts_number.as_deref(), Some("0406.20"));
    }

    #[test]
    fn test_parse_quoted_fields_with_commas() {
        let codes = parse_schedule(SAMPLE).unwrap();
        assert_eq!(
            codes[1].description,
            "Fresh (unripened or uncured) cheese, including whey cheese"
        );
        assert_eq!(
            codes[2].special_rate.as_deref(),
            Some("Free (A+, AU, BH)")
        );
    }

    #[test]
    fn test_parse_missing_rates_become_none() {
        let codes = parse_schedule(SAMPLE).unwrap();
        assert_eq!(codes[0].general_rate, None);
        assert_eq!(codes[2].general_rate.as_deref(), Some("10%"));
        assert_eq!(codes[4].special_rate, None);
    }

    #[test]
    fn test_parse_skips_rows_without_code() {
        let csv = "\
HTS Number,Indent,Description,General Rate of Duty,Special Rate of Duty
,,Chapter 4 notes apply.,,
0406,0,Cheese and curd:,,
";
        let codes = parse_schedule(csv).unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].hts_number, "0406");
    }

    #[test]
    fn test_parse_tolerates_bom_and_bad_indent() {
        let csv = "\u{feff}HTS Number,Indent,Description,General Rate of Duty,Special Rate of Duty\n9999,zero,Widgets,,\n";
        let codes = parse_schedule(csv).unwrap();
        assert_eq!(codes[0].indent_level, 0);
    }

    #[test]
    fn test_parse_missing_number_column_fails() {
        let csv = "Code,Description\n0406,Cheese\n";
        assert!(parse_schedule(csv).is_err());
    }
}
