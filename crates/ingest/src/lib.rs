//! CSV ingestion: uploaded report exports parsed into typed player and
//! conversion rows for bulk import.

pub mod csv;
pub mod transform;

pub use csv::{parse_csv, safe_parse_boolean, safe_parse_date, safe_parse_decimal, safe_parse_number};
pub use transform::{
    create_conversions_from_import, create_players_from_import, ImportSink, ImportSummary,
    TransformedConversionData, TransformedPlayerData,
};
