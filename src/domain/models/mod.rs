use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Default cap applied to text fields that do not declare their own.
pub const DEFAULT_MAX_TEXT_LEN: usize = 255;

/// Accepted shape of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Enum,
}

/// Declarative description of one accepted input field.
///
/// Specs are built once per endpoint and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: usize,
    /// Membership set for `Enum` fields. `None` defers the check to the
    /// categorical encoder that owns the domain.
    pub allowed_values: Option<Vec<String>>,
}

impl FieldSpec {
    fn base(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            min: None,
            max: None,
            max_length: DEFAULT_MAX_TEXT_LEN,
            allowed_values: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::base(name, FieldKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::base(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::base(name, FieldKind::Float)
    }

    /// Enum field whose domain is owned by an external encoder.
    pub fn category(name: impl Into<String>) -> Self {
        Self::base(name, FieldKind::Enum)
    }

    /// Enum field with an explicit membership set.
    pub fn one_of(
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut spec = Self::base(name, FieldKind::Enum);
        spec.allowed_values = Some(values.into_iter().map(Into::into).collect());
        spec
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Human readable description of the numeric bounds, used in messages.
    pub fn describe_range(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("between {min} and {max}"),
            (Some(min), None) => format!("at least {min}"),
            (None, Some(max)) => format!("at most {max}"),
            (None, None) => "unbounded".into(),
        }
    }
}

/// A sanitized, typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Output of a successful validation: declaration-ordered typed values.
///
/// Optional fields that were absent are simply not present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl ValidatedRecord {
    pub(crate) fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Machine-readable reason attached to a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    MissingField,
    InvalidType,
    OutOfRange,
    UnknownValue,
}

impl ViolationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationReason::MissingField => "missing_field",
            ViolationReason::InvalidType => "invalid_type",
            ViolationReason::OutOfRange => "out_of_range",
            ViolationReason::UnknownValue => "unknown_value",
        }
    }
}

/// One problem with one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub reason: ViolationReason,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: ViolationReason, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason,
            message: message.into(),
        }
    }
}

/// Either a fully typed record or every violation found. Never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid(ValidatedRecord),
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Valid(_) => &[],
            ValidationResult::Invalid(violations) => violations,
        }
    }

    pub fn into_result(self) -> Result<ValidatedRecord, DomainError> {
        match self {
            ValidationResult::Valid(record) => Ok(record),
            ValidationResult::Invalid(violations) => Err(DomainError::validation(violations)),
        }
    }
}

/// Model-ready numeric features in the exact order the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_result_never_yields_a_record() {
        let result = ValidationResult::Invalid(vec![Violation::new(
            "ph",
            ViolationReason::OutOfRange,
            "ph must be between 0 and 14",
        )]);
        assert!(!result.is_valid());
        assert_eq!(result.violations().len(), 1);
        assert!(matches!(result.into_result(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn record_lookup_by_name_and_type() {
        let mut record = ValidatedRecord::default();
        record.push("year", FieldValue::Integer(2020));
        record.push("crop", FieldValue::Text("Rice".into()));

        assert_eq!(record.number("year"), Some(2020.0));
        assert_eq!(record.text("crop"), Some("Rice"));
        assert_eq!(record.text("year"), None);
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn reason_serializes_as_snake_case() {
        let json = serde_json::to_string(&ViolationReason::UnknownValue).unwrap();
        assert_eq!(json, "\"unknown_value\"");
    }
}
