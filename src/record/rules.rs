//! # Field Rules
//!
//! The rule table drives record validation. Each rule names a field of the
//! raw record, whether it must be present and non-empty, and optionally a
//! pattern the value has to match. Rules are evaluated in insertion order, so
//! the first failing rule determines the rejection reported for a record.

use regex::Regex;

use super::validator::{DATE_FIELD, NUMBER_FIELD, TITLE_FIELD};

/// Validation rule for a single field
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Whether the field must be present and non-empty
    pub required: bool,

    /// Pattern the value must match when present
    pub format: Option<Regex>,

    /// Human description of `format`, reported on rejection
    pub description: String,
}

impl FieldRule {
    /// A required field without format constraints
    pub fn required() -> Self {
        Self {
            required: true,
            format: None,
            description: String::new(),
        }
    }

    /// An optional field without format constraints
    pub fn optional() -> Self {
        Self {
            required: false,
            ..Self::required()
        }
    }

    /// Attach a format pattern and its description
    pub fn with_format(mut self, format: Regex, description: impl Into<String>) -> Self {
        self.format = Some(format);
        self.description = description.into();
        self
    }
}

/// Ordered table of field name to rule
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    rules: Vec<(String, FieldRule)>,
}

impl FieldRules {
    /// Create an empty rule table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for `field`, keeping the original position on replace
    pub fn rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        let field = field.into();
        match self.rules.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = rule,
            None => self.rules.push((field, rule)),
        }
        self
    }

    /// Look up the rule for a field
    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.rules
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, rule)| rule)
    }

    /// Iterate over the rules in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules for the gazette catalog's content listings
    ///
    /// The publication number is required: listings that leave it blank are
    /// dropped rather than stored under a made-up number. A number that is
    /// present but only starts with digits (e.g. `"12bis"`) still passes and
    /// gets a placeholder sequence number from the validator.
    pub fn gazette() -> Self {
        Self::new()
            .rule(
                NUMBER_FIELD,
                FieldRule::required().with_format(
                    Regex::new(r"^\d+").expect("static pattern"),
                    "only numeric field",
                ),
            )
            .rule(
                DATE_FIELD,
                FieldRule::required().with_format(
                    Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("static pattern"),
                    "only date with the format dd/mm/yyyy",
                ),
            )
            .rule(TITLE_FIELD, FieldRule::required())
    }
}
