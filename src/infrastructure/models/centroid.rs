use serde::{Deserialize, Serialize};

use crate::application::services::Classifier;
use crate::domain::{DomainError, FeatureVector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelledCentroid {
    pub label: String,
    pub values: Vec<f64>,
}

/// Nearest-centroid classifier (Euclidean distance). Ties go to the centroid
/// listed first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidClassifier {
    pub feature_count: usize,
    pub centroids: Vec<LabelledCentroid>,
}

impl CentroidClassifier {
    pub fn new(feature_count: usize, centroids: Vec<LabelledCentroid>) -> Self {
        Self {
            feature_count,
            centroids,
        }
    }

    /// Reject artifacts that could never answer a prediction.
    pub fn check(&self) -> Result<(), DomainError> {
        if self.centroids.is_empty() {
            return Err(DomainError::internal("classifier has no centroids"));
        }
        if let Some(bad) = self
            .centroids
            .iter()
            .find(|c| c.values.len() != self.feature_count)
        {
            return Err(DomainError::internal(format!(
                "centroid '{}' has {} values, expected {}",
                bad.label,
                bad.values.len(),
                self.feature_count
            )));
        }
        Ok(())
    }
}

impl Classifier for CentroidClassifier {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn predict(&self, features: &FeatureVector) -> Result<String, DomainError> {
        let values = features.values();
        if values.len() != self.feature_count {
            return Err(DomainError::internal(format!(
                "classifier expects {} features, got {}",
                self.feature_count,
                values.len()
            )));
        }

        let mut best: Option<(&str, f64)> = None;
        for centroid in &self.centroids {
            let distance: f64 = centroid
                .values
                .iter()
                .zip(values)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((centroid.label.as_str(), distance));
            }
        }

        best.map(|(label, _)| label.to_string())
            .ok_or_else(|| DomainError::internal("classifier has no centroids"))
    }
}
