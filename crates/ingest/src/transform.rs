//! Row transforms from parsed CSV records to import-ready structures, and
//! the bulk import entry points.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use traffboard_core::error::ReportResult;

use crate::csv::{parse_csv, safe_parse_boolean, safe_parse_date, safe_parse_decimal, safe_parse_number};

type CsvRecord = BTreeMap<String, String>;

/// Player row as stored after import. The partners-email column present in
/// the export is dropped during processing for data privacy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedPlayerData {
    pub player_id: String,
    pub original_player_id: String,
    pub sign_up_date: Option<NaiveDate>,
    pub first_deposit_date: Option<NaiveDate>,
    pub partner_id: String,
    pub company_name: String,
    pub partner_tags: Option<String>,
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub promo_code: Option<String>,
    pub player_country: Option<String>,
    pub tag_source: Option<String>,
    pub date: NaiveDate,
    pub prequalified: bool,
    pub duplicate: bool,
    pub self_excluded: bool,
    pub disabled: bool,
    pub currency: String,
    pub ftd_count: i64,
    pub ftd_sum: f64,
    pub deposits_count: i64,
    pub deposits_sum: f64,
    pub cashouts_count: i64,
    pub cashouts_sum: f64,
    pub casino_real_ngr: f64,
    pub fixed_per_player: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedConversionData {
    pub date: NaiveDate,
    pub foreign_brand_id: String,
    pub foreign_partner_id: String,
    pub foreign_campaign_id: String,
    pub foreign_landing_id: Option<String>,
    pub traffic_source: String,
    pub device_type: String,
    pub os_family: Option<String>,
    pub country: String,
    pub all_clicks: i64,
    pub unique_clicks: i64,
    pub registrations_count: i64,
    pub ftd_count: i64,
    pub deposits_count: i64,
}

fn optional(record: &CsvRecord, key: &str) -> Option<String> {
    record.get(key).filter(|v| !v.is_empty()).cloned()
}

fn required(record: &CsvRecord, key: &str) -> Option<String> {
    optional(record, key)
}

fn field<'a>(record: &'a CsvRecord, key: &str) -> &'a str {
    record.get(key).map(String::as_str).unwrap_or("")
}

/// Transform one parsed player record. `None` when the identifying fields
/// are missing; the import skips such rows rather than failing the batch.
pub fn transform_player_data(record: &CsvRecord) -> Option<TransformedPlayerData> {
    Some(TransformedPlayerData {
        player_id: required(record, "Player ID")?,
        original_player_id: field(record, "Original player ID").to_string(),
        sign_up_date: safe_parse_date(field(record, "Sign up date")),
        first_deposit_date: safe_parse_date(field(record, "First deposit date")),
        partner_id: required(record, "Partner ID")?,
        company_name: field(record, "Company name").to_string(),
        // "Partners email" is intentionally never read.
        partner_tags: optional(record, "Partner tags"),
        campaign_id: field(record, "Campaign ID").to_string(),
        campaign_name: optional(record, "Campaign name"),
        promo_code: optional(record, "Promo code"),
        player_country: optional(record, "Player country"),
        tag_source: optional(record, "Tag: source"),
        date: safe_parse_date(field(record, "Date"))?,
        prequalified: safe_parse_boolean(field(record, "Prequalified")),
        duplicate: safe_parse_boolean(field(record, "Duplicate")),
        self_excluded: safe_parse_boolean(field(record, "Self-excluded")),
        disabled: safe_parse_boolean(field(record, "Disabled")),
        currency: field(record, "Currency").to_string(),
        ftd_count: safe_parse_number(field(record, "FTD count")),
        ftd_sum: safe_parse_decimal(field(record, "FTD sum")),
        deposits_count: safe_parse_number(field(record, "Deposits count")),
        deposits_sum: safe_parse_decimal(field(record, "Deposits sum")),
        cashouts_count: safe_parse_number(field(record, "Cashouts count")),
        cashouts_sum: safe_parse_decimal(field(record, "Cashouts sum")),
        casino_real_ngr: safe_parse_decimal(field(record, "Casino real NGR")),
        fixed_per_player: safe_parse_decimal(field(record, "Fixed per player")),
    })
}

pub fn transform_conversion_data(record: &CsvRecord) -> Option<TransformedConversionData> {
    Some(TransformedConversionData {
        date: safe_parse_date(field(record, "Date"))?,
        foreign_brand_id: required(record, "Brand ID")?,
        foreign_partner_id: required(record, "Partner ID")?,
        foreign_campaign_id: field(record, "Campaign ID").to_string(),
        foreign_landing_id: optional(record, "Landing ID"),
        traffic_source: field(record, "Traffic source").to_string(),
        device_type: field(record, "Device type").to_string(),
        os_family: optional(record, "OS family"),
        country: field(record, "Country").to_string(),
        all_clicks: safe_parse_number(field(record, "All clicks")),
        unique_clicks: safe_parse_number(field(record, "Unique clicks")),
        registrations_count: safe_parse_number(field(record, "Registrations count")),
        ftd_count: safe_parse_number(field(record, "FTD count")),
        deposits_count: safe_parse_number(field(record, "Deposits count")),
    })
}

/// External persistence collaborator for bulk upserts.
#[async_trait]
pub trait ImportSink: Send + Sync {
    async fn upsert_players(&self, rows: Vec<TransformedPlayerData>) -> ReportResult<u64>;
    async fn upsert_conversions(&self, rows: Vec<TransformedConversionData>) -> ReportResult<u64>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub import_id: Uuid,
    pub processed: u64,
    pub skipped: u64,
}

/// Parse and import a player export. Rows missing identity or date fields
/// are counted as skipped, not errors.
pub async fn create_players_from_import(
    sink: &dyn ImportSink,
    csv_text: &str,
) -> ReportResult<ImportSummary> {
    let records = parse_csv(csv_text);
    let total = records.len();

    let rows: Vec<TransformedPlayerData> = records
        .iter()
        .filter_map(transform_player_data)
        .collect();
    let skipped = (total - rows.len()) as u64;

    if skipped > 0 {
        warn!(skipped = skipped, "Player import rows skipped");
    }

    let processed = sink.upsert_players(rows).await?;
    let summary = ImportSummary {
        import_id: Uuid::new_v4(),
        processed,
        skipped,
    };
    info!(
        import_id = %summary.import_id,
        processed = summary.processed,
        skipped = summary.skipped,
        "Player import complete"
    );
    Ok(summary)
}

pub async fn create_conversions_from_import(
    sink: &dyn ImportSink,
    csv_text: &str,
) -> ReportResult<ImportSummary> {
    let records = parse_csv(csv_text);
    let total = records.len();

    let rows: Vec<TransformedConversionData> = records
        .iter()
        .filter_map(transform_conversion_data)
        .collect();
    let skipped = (total - rows.len()) as u64;

    if skipped > 0 {
        warn!(skipped = skipped, "Conversion import rows skipped");
    }

    let processed = sink.upsert_conversions(rows).await?;
    let summary = ImportSummary {
        import_id: Uuid::new_v4(),
        processed,
        skipped,
    };
    info!(
        import_id = %summary.import_id,
        processed = summary.processed,
        skipped = summary.skipped,
        "Conversion import complete"
    );
    Ok(summary)
}
