//! Raw record validation and normalization

use chrono::NaiveDate;
use serde_json::Value;

use super::error::ValidationError;
use super::identifier::{MAX_SEQUENCE_NUMBER, random_sequence_number};
use super::rules::FieldRules;
use super::{CanonicalRecord, RawRecord};

/// Field carrying the publication number
pub const NUMBER_FIELD: &str = "numPublica";

/// Field carrying the publication date
pub const DATE_FIELD: &str = "fecPublica";

/// Field carrying the title
pub const TITLE_FIELD: &str = "titulo";

/// Textual format of the publication date
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Validate a raw record against `rules` and build its canonical form
///
/// Rules are checked in order and the first violation is returned. The title
/// and date must be usable regardless of the rule table; the sequence number
/// falls back to a random placeholder when it is missing or not a usable
/// positive integer.
pub fn normalize(record: &RawRecord, rules: &FieldRules) -> Result<CanonicalRecord, ValidationError> {
    for (field, rule) in rules.iter() {
        let value = field_text(record, field);

        if rule.required && value.is_none() {
            return Err(missing(field, record));
        }

        if let (Some(format), Some(value)) = (&rule.format, &value) {
            if !format.is_match(value) {
                return Err(ValidationError::InvalidFormat {
                    field: field.to_string(),
                    pattern_description: rule.description.clone(),
                    value: value.clone(),
                    record: record.clone(),
                });
            }
        }
    }

    let title = match record.get(TITLE_FIELD) {
        Some(Value::String(title)) if !title.trim().is_empty() => title.clone(),
        None | Some(Value::Null) | Some(Value::String(_)) => return Err(missing(TITLE_FIELD, record)),
        Some(other) => {
            return Err(ValidationError::InvalidFormat {
                field: TITLE_FIELD.to_string(),
                pattern_description: "a non-empty text".to_string(),
                value: other.to_string(),
                record: record.clone(),
            });
        }
    };

    let date_text = field_text(record, DATE_FIELD).ok_or_else(|| missing(DATE_FIELD, record))?;
    let publish_date = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidFormat {
            field: DATE_FIELD.to_string(),
            pattern_description: "a calendar date in the format dd/mm/yyyy".to_string(),
            value: date_text.clone(),
            record: record.clone(),
        }
    })?;

    let sequence_number = field_text(record, NUMBER_FIELD)
        .and_then(|number| number.parse::<u32>().ok())
        .filter(|number| (1..=MAX_SEQUENCE_NUMBER).contains(number))
        .unwrap_or_else(random_sequence_number);

    Ok(CanonicalRecord {
        title,
        publish_date,
        sequence_number,
    })
}

/// Textual value of a field, `None` when absent, null or blank
fn field_text(record: &RawRecord, field: &str) -> Option<String> {
    let text = match record.get(field)? {
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn missing(field: &str, record: &RawRecord) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
        record: record.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldRule;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_valid_record() {
        let record = raw(json!({
            "numPublica": "42",
            "fecPublica": "05/12/2020",
            "titulo": "Decreto X"
        }));

        let canonical = normalize(&record, &FieldRules::gazette()).unwrap();
        assert_eq!(canonical.title, "Decreto X");
        assert_eq!(canonical.publish_date, NaiveDate::from_ymd_opt(2020, 12, 5).unwrap());
        assert_eq!(canonical.sequence_number, 42);
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let rules = FieldRules::gazette();
        for field in [NUMBER_FIELD, DATE_FIELD, TITLE_FIELD] {
            let mut record = raw(json!({
                "numPublica": "42",
                "fecPublica": "05/12/2020",
                "titulo": "Decreto X"
            }));
            record.remove(field);

            match normalize(&record, &rules) {
                Err(ValidationError::MissingField { field: missing, record: echoed }) => {
                    assert_eq!(missing, field);
                    assert_eq!(echoed, record);
                }
                other => panic!("Expected MissingField for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_and_null_count_as_missing() {
        let rules = FieldRules::gazette();
        let empty = raw(json!({"numPublica": "", "fecPublica": "05/12/2020", "titulo": "Decreto Y"}));
        let null = raw(json!({"numPublica": "7", "fecPublica": "05/12/2020", "titulo": null}));

        assert_eq!(normalize(&empty, &rules).unwrap_err().field(), NUMBER_FIELD);
        assert_eq!(normalize(&null, &rules).unwrap_err().field(), TITLE_FIELD);
    }

    #[test]
    fn test_date_with_wrong_shape_is_invalid_format() {
        let rules = FieldRules::gazette();
        for date in ["2020-12-05", "5/12/2020", "05/12/20", "yesterday"] {
            let record = raw(json!({"numPublica": "1", "fecPublica": date, "titulo": "T"}));
            match normalize(&record, &rules) {
                Err(ValidationError::InvalidFormat { field, value, .. }) => {
                    assert_eq!(field, DATE_FIELD);
                    assert_eq!(value, date);
                }
                other => panic!("Expected InvalidFormat for {date}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_impossible_calendar_date_is_invalid_format() {
        let record = raw(json!({"numPublica": "1", "fecPublica": "31/02/2021", "titulo": "T"}));
        let err = normalize(&record, &FieldRules::gazette()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { ref field, .. } if field == DATE_FIELD));
    }

    #[test]
    fn test_non_numeric_number_is_invalid_format() {
        let record = raw(json!({"numPublica": "N/A", "fecPublica": "05/12/2020", "titulo": "T"}));
        let err = normalize(&record, &FieldRules::gazette()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { ref field, .. } if field == NUMBER_FIELD));
    }

    #[test]
    fn test_malformed_number_gets_placeholder() {
        let rules = FieldRules::gazette();
        for number in ["12bis", "123456", "0"] {
            let record = raw(json!({"numPublica": number, "fecPublica": "05/12/2020", "titulo": "T"}));
            let canonical = normalize(&record, &rules).unwrap();
            assert!((1..=MAX_SEQUENCE_NUMBER).contains(&canonical.sequence_number));
        }
    }

    #[test]
    fn test_optional_number_falls_back_when_absent() {
        let rules = FieldRules::gazette().rule(NUMBER_FIELD, FieldRule::optional());
        let record = raw(json!({"fecPublica": "05/12/2020", "titulo": "Decreto Y"}));

        let canonical = normalize(&record, &rules).unwrap();
        assert!((1..=MAX_SEQUENCE_NUMBER).contains(&canonical.sequence_number));
    }

    #[test]
    fn test_numeric_json_values_are_accepted() {
        let record = raw(json!({"numPublica": 42, "fecPublica": "05/12/2020", "titulo": "Decreto X"}));
        let canonical = normalize(&record, &FieldRules::gazette()).unwrap();
        assert_eq!(canonical.sequence_number, 42);
    }

    #[test]
    fn test_title_kept_verbatim() {
        let record = raw(json!({"numPublica": "3", "fecPublica": "05/12/2020", "titulo": "  Ley N° 1040  "}));
        let canonical = normalize(&record, &FieldRules::gazette()).unwrap();
        assert_eq!(canonical.title, "  Ley N° 1040  ");
    }

    #[test]
    fn test_non_text_title_is_invalid_format() {
        let record = raw(json!({"numPublica": "3", "fecPublica": "05/12/2020", "titulo": 1040}));
        match normalize(&record, &FieldRules::gazette()) {
            Err(ValidationError::InvalidFormat { field, value, .. }) => {
                assert_eq!(field, TITLE_FIELD);
                assert_eq!(value, "1040");
            }
            other => panic!("Expected InvalidFormat, got {:?}", other),
        }
    }
}
