//! Timestamp parsing for stored payloads.
//!
//! Collections written by earlier generations of the store carry timestamps
//! either as RFC 3339 strings or as numeric epoch seconds. Readers accept
//! both; writers always emit RFC 3339.

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::error::ContractViolation;

/// Parses a payload value that should hold a point in time.
///
/// Accepts an ISO-8601/RFC 3339 string (offset or `Z`, `T` or space
/// separator, naive strings read as UTC) or a numeric epoch-seconds value,
/// possibly fractional.
pub fn parse_timestamp(
	field: &'static str,
	value: &Value,
) -> Result<OffsetDateTime, ContractViolation> {
	match value {
		Value::String(text) => parse_iso(text).ok_or_else(|| ContractViolation::MalformedField {
			field,
			expected: "an ISO-8601 timestamp",
			found: text.clone(),
		}),
		Value::Number(number) => {
			let seconds = number.as_f64().ok_or_else(|| ContractViolation::MalformedField {
				field,
				expected: "epoch seconds",
				found: number.to_string(),
			})?;
			from_epoch_seconds(seconds).ok_or(ContractViolation::MalformedField {
				field,
				expected: "epoch seconds in range",
				found: number.to_string(),
			})
		},
		other => Err(ContractViolation::MalformedField {
			field,
			expected: "an ISO-8601 string or epoch seconds",
			found: other.to_string(),
		}),
	}
}

fn parse_iso(text: &str) -> Option<OffsetDateTime> {
	let trimmed = text.trim();

	if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
		return Some(parsed);
	}

	// Space separators and missing offsets show up in older payloads.
	let mut normalized = trimmed.replacen(' ', "T", 1);

	if !has_offset(&normalized) {
		normalized.push('Z');
	}

	OffsetDateTime::parse(&normalized, &Rfc3339).ok()
}

fn has_offset(text: &str) -> bool {
	if text.ends_with('Z') || text.ends_with('z') {
		return true;
	}

	// An offset sign can only follow the time part, never the date.
	match text.rsplit_once('T') {
		Some((_, time_part)) => time_part.contains('+') || time_part.contains('-'),
		None => false,
	}
}

pub fn from_epoch_seconds(seconds: f64) -> Option<OffsetDateTime> {
	if !seconds.is_finite() {
		return None;
	}

	OffsetDateTime::from_unix_timestamp_nanos((seconds * 1e9) as i128).ok()
}

pub fn epoch_seconds(timestamp: OffsetDateTime) -> f64 {
	timestamp.unix_timestamp_nanos() as f64 / 1e9
}

/// Formats for storage. Falls back to the `Display` form if RFC 3339
/// formatting ever fails, which cannot happen for in-range timestamps.
pub fn to_rfc3339(timestamp: OffsetDateTime) -> String {
	timestamp.format(&Rfc3339).unwrap_or_else(|_| timestamp.to_string())
}
