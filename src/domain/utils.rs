//! Shared validation and text helpers for the paper pipeline

use regex::Regex;

use crate::domain::papers::UpstreamError;

pub const MIN_SUMMARY_LENGTH: u32 = 16;
pub const MAX_SUMMARY_LENGTH: u32 = 1_024;
pub const DEFAULT_SUMMARY_LENGTH: u32 = 256;

const ARXIV_ID_PATTERN: &str =
    r"^(?:\d{4}\.\d{4,5}|[a-z][a-z\-]*(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?$";

/// Trims, strips an optional `arXiv:` prefix and checks the identifier shape.
pub fn normalize_arxiv_id(raw: &str) -> Result<String, UpstreamError> {
    let trimmed = raw.trim();
    let without_prefix = match trimmed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("arxiv:") => &trimmed[6..],
        _ => trimmed,
    };

    let pattern = Regex::new(ARXIV_ID_PATTERN)
        .map_err(|err| UpstreamError::Malformed(format!("arxiv id pattern: {err}")))?;
    if !pattern.is_match(without_prefix) {
        return Err(UpstreamError::InvalidId(raw.trim().to_string()));
    }

    Ok(without_prefix.to_string())
}

pub fn validate_summary_length(max_length: Option<u32>) -> Result<Option<u32>, String> {
    match max_length {
        Some(length) if !(MIN_SUMMARY_LENGTH..=MAX_SUMMARY_LENGTH).contains(&length) => Err(
            format!("max_length must be between {MIN_SUMMARY_LENGTH} and {MAX_SUMMARY_LENGTH}"),
        ),
        other => Ok(other),
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the predefined XML entities and numeric character references.
pub fn decode_xml_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let Some(end) = candidate.find(';').filter(|end| *end <= 10) else {
            decoded.push('&');
            rest = &candidate[1..];
            continue;
        };

        let entity = &candidate[1..end];
        let replacement = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match replacement {
            Some(c) => {
                decoded.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}
