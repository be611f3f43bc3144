//! Date-ordered identifiers for stored gazette records

use std::fmt;

use chrono::{Datelike, NaiveDate};
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};

/// Largest sequence number that fits the identifier's reserved width
pub const MAX_SEQUENCE_NUMBER: u32 = 9999;

/// Length of every identifier: `yyyy` + `mm` + `dd` + `nnnn`
pub const ID_WIDTH: usize = 12;

/// Storage identifier of a gazette record
///
/// Identifiers sort lexicographically by publication date, then by sequence
/// number within the day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GazetteId(String);

impl GazetteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GazetteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GazetteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Random placeholder sequence number in `1..=MAX_SEQUENCE_NUMBER`
pub fn random_sequence_number() -> u32 {
    rng().random_range(1..=MAX_SEQUENCE_NUMBER)
}

/// Build the identifier for a record published on `publish_date`
///
/// A sequence number outside `1..=MAX_SEQUENCE_NUMBER` would not fit the
/// fixed width, so it is replaced by a random placeholder. Collisions caused
/// by the placeholder surface as duplicates at insertion time.
pub fn assign_id(sequence_number: u32, publish_date: NaiveDate) -> GazetteId {
    let sequence_number = if (1..=MAX_SEQUENCE_NUMBER).contains(&sequence_number) {
        sequence_number
    } else {
        random_sequence_number()
    };

    GazetteId(format!(
        "{:04}{:02}{:02}{:04}",
        publish_date.year(),
        publish_date.month(),
        publish_date.day(),
        sequence_number
    ))
}
