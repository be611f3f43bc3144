//! Error types for record validation

use crate::error::Error as CrateError;
use thiserror::Error;

use super::RawRecord;

/// Reasons a raw record is rejected by the validator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is absent or empty
    #[error("record is missing required field '{field}'")]
    MissingField {
        /// Name of the missing field
        field: String,
        /// The record as received
        record: RawRecord,
    },

    /// A field is present but does not have the declared format
    #[error("field '{field}' has an invalid format ({pattern_description}): '{value}'")]
    InvalidFormat {
        /// Name of the offending field
        field: String,
        /// Human description of the expected format
        pattern_description: String,
        /// The value that was rejected
        value: String,
        /// The record as received
        record: RawRecord,
    },
}

impl ValidationError {
    /// Name of the field that caused the rejection
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field, .. } | Self::InvalidFormat { field, .. } => field,
        }
    }
}

impl From<ValidationError> for CrateError {
    fn from(err: ValidationError) -> Self {
        CrateError::Validation(err.to_string())
    }
}
