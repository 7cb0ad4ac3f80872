use hexlink_core::error::StorageError;
use hexlink_core::{Record, ShortCode};
use serde::{Deserialize, Serialize};

/// On-disk shape of one snapshot line. Unknown fields are ignored.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct SnapshotLine {
    #[serde(rename = "originalURL")]
    original_url: String,
    #[serde(rename = "shortenedPath")]
    shortened_path: String,
    #[serde(rename = "correlationID", default)]
    correlation_id: String,
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(rename = "isDeleted", default, skip_serializing_if = "is_false")]
    is_deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl SnapshotLine {
    /// Parses one line into a record, returning a human-readable reason on failure.
    pub(super) fn decode(raw: &[u8]) -> Result<Record, String> {
        let line: SnapshotLine = serde_json::from_slice(raw).map_err(|e| e.to_string())?;

        if line.original_url.is_empty() {
            return Err("originalURL is empty".to_string());
        }
        let short_code = ShortCode::new(line.shortened_path).map_err(|e| e.to_string())?;

        Ok(Record {
            original_url: line.original_url,
            short_code,
            correlation_id: line.correlation_id,
            user_id: line.user_id,
            is_deleted: line.is_deleted,
        })
    }

    /// Appends `record` as one JSON line to `buf`.
    pub(super) fn encode_into(record: &Record, buf: &mut Vec<u8>) -> Result<(), StorageError> {
        let line = SnapshotLine {
            original_url: record.original_url.clone(),
            shortened_path: record.short_code.to_string(),
            correlation_id: record.correlation_id.clone(),
            user_id: record.user_id,
            is_deleted: record.is_deleted,
        };
        serde_json::to_writer(&mut *buf, &line)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        buf.push(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_legacy_field_names_and_omits_defaults() {
        let record = Record::new("https://a.example", ShortCode::new_unchecked("aaaa1111"))
            .with_correlation_id("c1");
        let mut buf = Vec::new();

        SnapshotLine::encode_into(&record, &mut buf).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"originalURL\":\"https://a.example\",\"shortenedPath\":\"aaaa1111\",\"correlationID\":\"c1\"}\n"
        );
    }

    #[test]
    fn decodes_optional_fields() {
        let record = SnapshotLine::decode(
            br#"{"originalURL":"https://a.example","shortenedPath":"aaaa1111","userID":3,"isDeleted":true}"#,
        )
        .unwrap();

        assert_eq!(record.correlation_id, "");
        assert_eq!(record.user_id, Some(3));
        assert!(record.is_deleted);
    }

    #[test]
    fn rejects_invalid_short_code() {
        let err = SnapshotLine::decode(
            br#"{"originalURL":"https://a.example","shortenedPath":"../etc"}"#,
        )
        .unwrap_err();
        assert!(err.contains("invalid short code"));
    }

    #[test]
    fn rejects_empty_url() {
        assert!(SnapshotLine::decode(br#"{"originalURL":"","shortenedPath":"aaaa"}"#).is_err());
    }
}
