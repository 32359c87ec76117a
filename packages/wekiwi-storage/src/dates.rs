//! Timestamp handling for Directus rows and index payloads.
//!
//! Directus returns `timestamp` columns as RFC 3339 strings and `datetime` columns without an
//! offset. Both are read as UTC. Index payloads store unix seconds so range filters stay numeric.

use serde::{Deserialize, Deserializer};
use time::{
	OffsetDateTime, PrimitiveDateTime,
	format_description::{BorrowedFormatItem, well_known::Rfc3339},
	macros::format_description,
};

const NAIVE_DATETIME: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");

/// Parses an RFC 3339 timestamp, or an offset-less `YYYY-MM-DDTHH:MM:SS[.fff]` taken as UTC.
pub fn parse(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
	let raw = raw.trim();

	match OffsetDateTime::parse(raw, &Rfc3339) {
		Ok(value) => Ok(value),
		Err(_) => PrimitiveDateTime::parse(raw, NAIVE_DATETIME).map(PrimitiveDateTime::assume_utc),
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
	Seconds(i64),
	Text(String),
}
impl Raw {
	fn into_datetime<E>(self) -> Result<Option<OffsetDateTime>, E>
	where
		E: serde::de::Error,
	{
		match self {
			Self::Seconds(seconds) =>
				OffsetDateTime::from_unix_timestamp(seconds).map(Some).map_err(E::custom),
			Self::Text(text) if text.trim().is_empty() => Ok(None),
			Self::Text(text) => parse(&text).map(Some).map_err(E::custom),
		}
	}
}

/// `Option<OffsetDateTime>` written as RFC 3339; read from either string form, unix seconds,
/// `null`, or a blank string.
pub mod option {
	use serde::{Deserialize as _, Deserializer, Serializer};
	use time::{OffsetDateTime, format_description::well_known::Rfc3339};

	use super::Raw;

	pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(value) => {
				let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

				serializer.serialize_str(&formatted)
			},
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Option::<Raw>::deserialize(deserializer)? {
			Some(raw) => raw.into_datetime(),
			None => Ok(None),
		}
	}
}

/// Reads the same inputs as [`option`] but keeps unix seconds.
pub fn unix_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = option::deserialize(deserializer)?;

	Ok(value.map(OffsetDateTime::unix_timestamp))
}

#[cfg(test)]
mod tests {
	use serde::Deserialize;
	use time::macros::datetime;

	use super::*;

	#[derive(Deserialize)]
	struct Row {
		#[serde(default, with = "option")]
		at: Option<OffsetDateTime>,
		#[serde(default, deserialize_with = "unix_seconds")]
		seconds: Option<i64>,
	}

	fn row(value: serde_json::Value) -> Row {
		serde_json::from_value(value).expect("Failed to decode row.")
	}

	#[test]
	fn directus_datetimes_without_offset_are_utc() {
		assert_eq!(
			parse("2024-05-02T08:30:00").expect("Parse failed."),
			datetime!(2024-05-02 08:30:00 UTC)
		);
		assert_eq!(
			parse(" 2024-05-02T08:30:00.250 ").expect("Parse failed."),
			datetime!(2024-05-02 08:30:00.25 UTC)
		);
		assert_eq!(
			parse("2024-05-02T10:30:00+02:00").expect("Parse failed."),
			datetime!(2024-05-02 08:30:00 UTC)
		);
		assert!(parse("02.05.2024").is_err());
	}

	#[test]
	fn rows_accept_strings_seconds_and_blanks() {
		let decoded = row(serde_json::json!({
			"at": "2024-05-02T08:30:00.000Z",
			"seconds": "2024-05-02T08:30:00",
		}));

		assert_eq!(decoded.at, Some(datetime!(2024-05-02 08:30:00 UTC)));
		assert_eq!(decoded.seconds, Some(1_714_638_600));

		let decoded = row(serde_json::json!({ "at": 1_714_638_600, "seconds": 1_714_638_600 }));

		assert_eq!(decoded.at, Some(datetime!(2024-05-02 08:30:00 UTC)));
		assert_eq!(decoded.seconds, Some(1_714_638_600));

		let decoded = row(serde_json::json!({ "at": "  ", "seconds": null }));

		assert_eq!(decoded.at, None);
		assert_eq!(decoded.seconds, None);
		assert_eq!(row(serde_json::json!({})).at, None);
	}

	#[test]
	fn malformed_dates_are_rejected() {
		let err = serde_json::from_value::<Row>(serde_json::json!({ "at": "yesterday" }));

		assert!(err.is_err());
	}
}
