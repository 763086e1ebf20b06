//! Field validation and sanitization shared by every endpoint.
//!
//! `validate` is a pure function over the raw request and the endpoint's
//! field specs. It never stops at the first problem: every field is checked
//! and all violations are reported together.

use std::collections::BTreeMap;

use serde_json::Value;

use super::models::{
    FieldKind, FieldSpec, FieldValue, ValidatedRecord, ValidationResult, Violation,
    ViolationReason,
};

/// Characters stripped from every text value before it reaches downstream stages.
pub const DENY_LIST: [char; 4] = ['<', '>', '"', '\''];

/// Untyped request fields as received (form-encoded or JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRequest {
    fields: BTreeMap<String, String>,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Flatten a JSON object into text fields. Scalars keep their textual
    /// form, `null` counts as absent, nested values are kept as JSON text so
    /// that coercion rejects them.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let fields = object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((key.clone(), text))
            })
            .collect();
        Some(Self { fields })
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Check `raw` against `specs` in declaration order.
pub fn validate(raw: &RawRequest, specs: &[FieldSpec]) -> ValidationResult {
    let mut record = ValidatedRecord::default();
    let mut violations = Vec::new();

    for spec in specs {
        match check_field(raw.get(&spec.name), spec) {
            Ok(Some(value)) => record.push(spec.name.clone(), value),
            Ok(None) => {}
            Err(violation) => violations.push(violation),
        }
    }

    if violations.is_empty() {
        ValidationResult::Valid(record)
    } else {
        ValidationResult::Invalid(violations)
    }
}

/// Trim, strip deny-listed characters and truncate to `max_length` characters.
/// Whitespace exposed by stripping or truncation is kept.
pub fn sanitize_text(input: &str, max_length: usize) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !DENY_LIST.contains(c))
        .take(max_length)
        .collect()
}

fn check_field(raw: Option<&str>, spec: &FieldSpec) -> Result<Option<FieldValue>, Violation> {
    let raw = match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw,
        None if spec.required => return Err(missing(spec)),
        None => return Ok(None),
    };

    match spec.kind {
        FieldKind::Text => {
            let clean = sanitize_text(raw, spec.max_length);
            if clean.trim().is_empty() {
                return if spec.required { Err(missing(spec)) } else { Ok(None) };
            }
            Ok(Some(FieldValue::Text(clean)))
        }
        FieldKind::Integer => {
            let value: i64 = raw
                .parse()
                .map_err(|_| invalid_type(spec, "a whole number"))?;
            check_range(spec, value as f64)?;
            Ok(Some(FieldValue::Integer(value)))
        }
        FieldKind::Float => {
            let value = raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid_type(spec, "a number"))?;
            check_range(spec, value)?;
            Ok(Some(FieldValue::Float(value)))
        }
        FieldKind::Enum => {
            let clean = sanitize_text(raw, spec.max_length);
            if clean.trim().is_empty() {
                return if spec.required { Err(missing(spec)) } else { Ok(None) };
            }
            if let Some(allowed) = &spec.allowed_values {
                if !allowed.iter().any(|candidate| candidate == &clean) {
                    return Err(Violation::new(
                        &spec.name,
                        ViolationReason::UnknownValue,
                        format!("{} must be one of: {}", spec.name, allowed.join(", ")),
                    ));
                }
            }
            Ok(Some(FieldValue::Text(clean)))
        }
    }
}

fn check_range(spec: &FieldSpec, value: f64) -> Result<(), Violation> {
    let below = spec.min.is_some_and(|min| value < min);
    let above = spec.max.is_some_and(|max| value > max);
    if below || above {
        return Err(Violation::new(
            &spec.name,
            ViolationReason::OutOfRange,
            format!("{} must be {}", spec.name, spec.describe_range()),
        ));
    }
    Ok(())
}

fn missing(spec: &FieldSpec) -> Violation {
    Violation::new(
        &spec.name,
        ViolationReason::MissingField,
        format!("missing required field: {}", spec.name),
    )
}

fn invalid_type(spec: &FieldSpec, expected: &str) -> Violation {
    Violation::new(
        &spec.name,
        ViolationReason::InvalidType,
        format!("{} must be {}", spec.name, expected),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crop_specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec::float("N").range(0.0, 200.0),
            FieldSpec::float("temperature").range(-10.0, 60.0),
            FieldSpec::integer("year").range(1950.0, 2100.0),
            FieldSpec::text("notes").optional().max_length(8),
            FieldSpec::one_of("season", ["Kharif", "Rabi"]),
        ]
    }

    fn valid_request() -> RawRequest {
        RawRequest::from_pairs([
            ("N", "50"),
            ("temperature", " 25.5 "),
            ("year", "2020"),
            ("season", "Kharif"),
        ])
    }

    #[test]
    fn valid_request_yields_typed_record() {
        let record = validate(&valid_request(), &crop_specs()).into_result().unwrap();
        assert_eq!(record.number("N"), Some(50.0));
        assert_eq!(record.number("temperature"), Some(25.5));
        assert_eq!(record.get("year"), Some(&FieldValue::Integer(2020)));
        assert_eq!(record.text("season"), Some("Kharif"));
        assert!(record.get("notes").is_none());
    }

    #[test]
    fn collects_every_violation_in_declaration_order() {
        let raw = RawRequest::from_pairs([
            ("temperature", "999"),
            ("year", "twenty"),
            ("season", "kharif"),
        ]);
        let result = validate(&raw, &crop_specs());
        let found: Vec<(&str, ViolationReason)> = result
            .violations()
            .iter()
            .map(|v| (v.field.as_str(), v.reason))
            .collect();
        assert_eq!(
            found,
            vec![
                ("N", ViolationReason::MissingField),
                ("temperature", ViolationReason::OutOfRange),
                ("year", ViolationReason::InvalidType),
                ("season", ViolationReason::UnknownValue),
            ]
        );
    }

    #[test]
    fn blank_required_field_is_missing() {
        let raw = valid_request().with("N", "   ");
        let result = validate(&raw, &crop_specs());
        assert_eq!(result.violations()[0].field, "N");
        assert_eq!(result.violations()[0].reason, ViolationReason::MissingField);
    }

    #[test]
    fn text_is_sanitized_and_truncated() {
        let raw = valid_request().with("notes", "  <b>\"it's\"</b> fine ");
        let record = validate(&raw, &crop_specs()).into_result().unwrap();
        assert_eq!(record.text("notes"), Some("bits/b f"));
    }

    #[test]
    fn truncation_keeps_exposed_whitespace() {
        assert_eq!(sanitize_text("  ab<> cd  ", 3), "ab ");
        assert_eq!(sanitize_text("<  x", 10), "  x");
    }

    #[test]
    fn text_that_strips_to_blank_is_missing() {
        let raw = valid_request().with("season", "< >");
        let result = validate(&raw, &crop_specs());
        assert_eq!(result.violations()[0].field, "season");
        assert_eq!(result.violations()[0].reason, ViolationReason::MissingField);
    }

    #[test]
    fn non_finite_float_is_invalid_type() {
        let raw = valid_request().with("temperature", "NaN");
        let result = validate(&raw, &crop_specs());
        assert_eq!(result.violations()[0].reason, ViolationReason::InvalidType);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let raw = valid_request().with("temperature", "60").with("N", "0");
        assert!(validate(&raw, &crop_specs()).is_valid());
    }

    #[test]
    fn deferred_enum_keeps_sanitized_text() {
        let specs = vec![FieldSpec::category("crop")];
        let raw = RawRequest::from_pairs([("crop", " Unobtainium ")]);
        let record = validate(&raw, &specs).into_result().unwrap();
        assert_eq!(record.text("crop"), Some("Unobtainium"));
    }

    #[test]
    fn json_scalars_are_coerced_to_text() {
        let raw = RawRequest::from_json(&json!({
            "N": 50,
            "temperature": 25.5,
            "year": 2020,
            "season": "Rabi",
            "notes": null
        }))
        .unwrap();
        assert_eq!(raw.get("N"), Some("50"));
        assert!(raw.get("notes").is_none());
        assert!(validate(&raw, &crop_specs()).is_valid());
    }

    #[test]
    fn json_non_object_is_rejected() {
        assert!(RawRequest::from_json(&json!([1, 2, 3])).is_none());
    }
}
