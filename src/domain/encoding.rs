//! Categorical encoding and feature vector assembly.

use std::fmt;
use std::sync::Arc;

use super::errors::DomainError;
use super::models::{FeatureVector, ValidatedRecord, Violation, ViolationReason};

/// Maps a sanitized categorical value to the numeric code a model was
/// trained with. Matching is exact and case-sensitive.
pub trait CategoricalEncoder: Send + Sync {
    fn transform(&self, value: &str) -> Option<f64>;

    fn classes(&self) -> &[String];
}

/// Outcome of encoding one value. `Unrecognized` is bad input, not a fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    Code(f64),
    Unrecognized,
}

pub fn encode(value: &str, encoder: &dyn CategoricalEncoder) -> Encoding {
    match encoder.transform(value) {
        Some(code) => Encoding::Code(code),
        None => Encoding::Unrecognized,
    }
}

/// Encoder over a fixed label set. Codes are indices into the sorted,
/// de-duplicated labels, matching how the training pipeline fitted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }
}

impl CategoricalEncoder for LabelEncoder {
    fn transform(&self, value: &str) -> Option<f64> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(value))
            .ok()
            .map(|idx| idx as f64)
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

enum FeatureSlot {
    Numeric(String),
    Encoded {
        field: String,
        encoder: Arc<dyn CategoricalEncoder>,
    },
}

impl fmt::Debug for FeatureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSlot::Numeric(field) => write!(f, "Numeric({field})"),
            FeatureSlot::Encoded { field, encoder } => {
                write!(f, "Encoded({field}, {} classes)", encoder.classes().len())
            }
        }
    }
}

/// Training-time feature order of a model. The layout fixes both the length
/// and the order of every vector it assembles.
#[derive(Debug, Default)]
pub struct FeatureLayout {
    slots: Vec<FeatureSlot>,
}

impl FeatureLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(mut self, field: impl Into<String>) -> Self {
        self.slots.push(FeatureSlot::Numeric(field.into()));
        self
    }

    pub fn encoded(mut self, field: impl Into<String>, encoder: Arc<dyn CategoricalEncoder>) -> Self {
        self.slots.push(FeatureSlot::Encoded {
            field: field.into(),
            encoder,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Build the feature vector for `record`.
    ///
    /// Every categorical slot is encoded before failing, so a request with
    /// several unknown categories reports all of them.
    pub fn assemble(&self, record: &ValidatedRecord) -> Result<FeatureVector, DomainError> {
        let mut values = Vec::with_capacity(self.slots.len());
        let mut violations = Vec::new();

        for slot in &self.slots {
            match slot {
                FeatureSlot::Numeric(field) => {
                    let value = record.number(field).ok_or_else(|| {
                        DomainError::internal(format!("feature `{field}` missing from record"))
                    })?;
                    values.push(value);
                }
                FeatureSlot::Encoded { field, encoder } => {
                    let raw = record.text(field).ok_or_else(|| {
                        DomainError::internal(format!("feature `{field}` missing from record"))
                    })?;
                    match encode(raw, encoder.as_ref()) {
                        Encoding::Code(code) => values.push(code),
                        Encoding::Unrecognized => violations.push(Violation::new(
                            field,
                            ViolationReason::UnknownValue,
                            format!("Unknown {field}: {raw}"),
                        )),
                    }
                }
            }
        }

        if !violations.is_empty() {
            return Err(DomainError::validation(violations));
        }
        Ok(FeatureVector::new(values))
    }
}
