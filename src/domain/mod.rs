//! Domain layer: field rules, validation, categorical encoding and the error taxonomy.

pub mod encoding;
pub mod errors;
pub mod models;
pub mod validation;

pub use encoding::{encode, CategoricalEncoder, Encoding, FeatureLayout, LabelEncoder};
pub use errors::{DomainError, UpstreamError};
pub use models::{
    FeatureVector, FieldKind, FieldSpec, FieldValue, ValidatedRecord, ValidationResult, Violation,
    ViolationReason,
};
pub use validation::{sanitize_text, validate, RawRequest};
