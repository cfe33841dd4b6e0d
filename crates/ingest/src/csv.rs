//! CSV parsing for uploaded affiliate exports. Quoted fields, embedded
//! separators, and CRLF line endings are handled; anything the exporter
//! produces beyond that is rejected upstream by row validation.

use std::collections::BTreeMap;

use chrono::NaiveDate;

/// Split one CSV line into fields, honoring double-quoted values with
/// `""` escapes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parse CSV text into header-keyed records. Blank lines are skipped;
/// short rows are padded with empty strings, long rows truncated to the
/// header width.
pub fn parse_csv(input: &str) -> Vec<BTreeMap<String, String>> {
    let mut lines = input.lines().filter(|l| !l.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = split_line(header_line.trim_end_matches('\r'))
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    lines
        .map(|line| {
            let fields = split_line(line.trim_end_matches('\r'));
            headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    (header.clone(), fields.get(i).cloned().unwrap_or_default())
                })
                .collect()
        })
        .collect()
}

/// Integer count; malformed values read as zero.
pub fn safe_parse_number(value: &str) -> i64 {
    value.trim().parse().unwrap_or(0)
}

/// Monetary amount; strips a currency symbol and thousands separators,
/// malformed values read as zero.
pub fn safe_parse_decimal(value: &str) -> f64 {
    value
        .trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse()
        .unwrap_or(0.0)
}

pub fn safe_parse_boolean(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Date in `YYYY-MM-DD`, optionally with a time suffix. `None` when the
/// field is empty or unparsable.
pub fn safe_parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok()
}
