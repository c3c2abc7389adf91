//! Shape checks applied to records before they reach presentation state.

use thiserror::Error;

use crate::models::ClientRecord;

/// Query-string fragments that only appear when a data-store channel URL
/// leaked into a user-facing field.
const CONNECTION_STRING_MARKERS: [&str; 5] =
    ["?VER=", "&VER=", "&database=", "&gsessionid=", "&SID="];

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("record has an empty id")]
    EmptyId,
    #[error("record has an empty name")]
    EmptyName,
    #[error("name looks like a leaked connection string")]
    LeakedConnectionString,
    #[error("completion {0} is outside 0..=100")]
    CompletionOutOfRange(u8),
}

/// Result of validating a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Validity {
    Valid(ClientRecord),
    Invalid(InvalidReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid(_))
    }
}

/// Check a record's shape.
pub fn validate(record: ClientRecord) -> Validity {
    let reason = if record.id.trim().is_empty() {
        Some(InvalidReason::EmptyId)
    } else if record.name.trim().is_empty() {
        Some(InvalidReason::EmptyName)
    } else if looks_like_connection_string(&record.name) {
        Some(InvalidReason::LeakedConnectionString)
    } else if record.completion > 100 {
        Some(InvalidReason::CompletionOutOfRange(record.completion))
    } else {
        None
    };

    match reason {
        Some(reason) => Validity::Invalid(reason),
        None => Validity::Valid(record),
    }
}

pub fn looks_like_connection_string(value: &str) -> bool {
    CONNECTION_STRING_MARKERS
        .iter()
        .any(|marker| value.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, name: &str) -> ClientRecord {
        ClientRecord::new(id, name, Utc::now())
    }

    #[test]
    fn test_plain_record_is_valid() {
        assert!(validate(record("1", "Ann")).is_valid());
    }

    #[test]
    fn test_leaked_channel_name_is_invalid() {
        assert_eq!(
            validate(record("9", "channel?VER=8&database=xyz")),
            Validity::Invalid(InvalidReason::LeakedConnectionString)
        );
        assert!(looks_like_connection_string("x&gsessionid=abc"));
        assert!(!looks_like_connection_string("Ann & Bo"));
    }

    #[test]
    fn test_empty_fields_are_invalid() {
        assert_eq!(
            validate(record(" ", "Ann")),
            Validity::Invalid(InvalidReason::EmptyId)
        );
        assert_eq!(
            validate(record("1", "")),
            Validity::Invalid(InvalidReason::EmptyName)
        );
    }

    #[test]
    fn test_completion_out_of_range_is_invalid() {
        let mut bad = record("1", "Ann");
        bad.completion = 140;
        assert_eq!(
            validate(bad),
            Validity::Invalid(InvalidReason::CompletionOutOfRange(140))
        );
    }
}
