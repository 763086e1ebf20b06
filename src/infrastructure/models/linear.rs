use serde::{Deserialize, Serialize};

use crate::application::services::Regressor;
use crate::domain::{DomainError, FeatureVector};

/// `intercept + Σ weight[i] * feature[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl Regressor for LinearRegressor {
    fn feature_count(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, DomainError> {
        if features.len() != self.weights.len() {
            return Err(DomainError::internal(format!(
                "regressor expects {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        Ok(self.intercept
            + self
                .weights
                .iter()
                .zip(features.values())
                .map(|(w, x)| w * x)
                .sum::<f64>())
    }
}
