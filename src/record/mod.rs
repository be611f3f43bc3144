//! Gazette record module
//!
//! This module turns the loosely-typed records returned by the catalog into
//! canonical gazette records and derives their storage identifiers.
//!
//! ## Key Components
//!
//! - `FieldRules`: ordered table of required fields and their formats
//! - `normalize`: validates a raw record against the rules
//! - `assign_id`: builds the date-ordered identifier of a record

mod error;
mod identifier;
mod rules;
mod validator;

pub use error::ValidationError;
pub use identifier::{GazetteId, ID_WIDTH, MAX_SEQUENCE_NUMBER, assign_id, random_sequence_number};
pub use rules::{FieldRule, FieldRules};
pub use validator::{DATE_FIELD, DATE_FORMAT, NUMBER_FIELD, TITLE_FIELD, normalize};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Untyped record as returned by a content listing
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A validated gazette record, the unit that gets persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Title of the publication, never empty
    pub title: String,

    /// Day the gazette was published
    pub publish_date: NaiveDate,

    /// Publication number, always in `1..=MAX_SEQUENCE_NUMBER` once assigned
    pub sequence_number: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_record_serializes_iso_date() {
        let record = CanonicalRecord {
            title: "Decreto X".to_string(),
            publish_date: NaiveDate::from_ymd_opt(2020, 12, 5).unwrap(),
            sequence_number: 42,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Decreto X");
        assert_eq!(json["publish_date"], "2020-12-05");
        assert_eq!(json["sequence_number"], 42);
    }
}
