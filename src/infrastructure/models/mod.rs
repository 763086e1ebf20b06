//! Model artifacts stored as JSON next to the service.
//!
//! Layout of the model directory:
//!
//! ```text
//! crop_recommendation.json   CentroidClassifier
//! crop_yield.json            LinearRegressor
//! yield_crop_encoder.json    LabelEncoder
//! yield_season_encoder.json  LabelEncoder
//! yield_state_encoder.json   LabelEncoder
//! fertilizer.json            CentroidClassifier
//! soil_type_encoder.json     LabelEncoder
//! crop_type_encoder.json     LabelEncoder
//! ```

mod centroid;
mod linear;

pub use centroid::{CentroidClassifier, LabelledCentroid};
pub use linear::LinearRegressor;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::application::services::{Classifier, FertilizerModel, ModelSet, YieldModel};
use crate::domain::{CategoricalEncoder, LabelEncoder};

pub const CROP_RECOMMENDATION_FILE: &str = "crop_recommendation.json";
pub const CROP_YIELD_FILE: &str = "crop_yield.json";
pub const YIELD_CROP_ENCODER_FILE: &str = "yield_crop_encoder.json";
pub const YIELD_SEASON_ENCODER_FILE: &str = "yield_season_encoder.json";
pub const YIELD_STATE_ENCODER_FILE: &str = "yield_state_encoder.json";
pub const FERTILIZER_FILE: &str = "fertilizer.json";
pub const SOIL_TYPE_ENCODER_FILE: &str = "soil_type_encoder.json";
pub const CROP_TYPE_ENCODER_FILE: &str = "crop_type_encoder.json";

#[derive(Debug, Deserialize)]
struct EncoderArtifact {
    classes: Vec<String>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn load_encoder(path: &Path) -> Result<Arc<dyn CategoricalEncoder>> {
    let artifact: EncoderArtifact = read_json(path)?;
    anyhow::ensure!(
        !artifact.classes.is_empty(),
        "{} declares no classes",
        path.display()
    );
    Ok(Arc::new(LabelEncoder::new(artifact.classes)))
}

pub fn load_classifier(path: &Path) -> Result<Arc<dyn Classifier>> {
    let classifier: CentroidClassifier = read_json(path)?;
    classifier
        .check()
        .with_context(|| format!("invalid classifier in {}", path.display()))?;
    Ok(Arc::new(classifier))
}

fn load_yield_model(dir: &Path) -> Result<YieldModel> {
    let regressor: LinearRegressor = read_json(&dir.join(CROP_YIELD_FILE))?;
    Ok(YieldModel {
        regressor: Arc::new(regressor),
        crop: load_encoder(&dir.join(YIELD_CROP_ENCODER_FILE))?,
        season: load_encoder(&dir.join(YIELD_SEASON_ENCODER_FILE))?,
        state: load_encoder(&dir.join(YIELD_STATE_ENCODER_FILE))?,
    })
}

fn load_fertilizer_model(dir: &Path) -> Result<FertilizerModel> {
    Ok(FertilizerModel {
        classifier: load_classifier(&dir.join(FERTILIZER_FILE))?,
        soil_type: load_encoder(&dir.join(SOIL_TYPE_ENCODER_FILE))?,
        crop_type: load_encoder(&dir.join(CROP_TYPE_ENCODER_FILE))?,
    })
}

/// Keep a loaded model, or log why it is missing and disable its endpoint.
fn available<T>(name: &str, loaded: Result<T>) -> Option<T> {
    match loaded {
        Ok(model) => {
            info!(model = name, "model loaded");
            Some(model)
        }
        Err(err) => {
            warn!(model = name, error = %format!("{err:#}"), "model unavailable; endpoint will answer 500");
            None
        }
    }
}

/// Load every model found in `dir`. Never fails: missing or broken
/// artifacts only disable the endpoint that needs them.
pub fn load_model_set(dir: &Path) -> ModelSet {
    info!(dir = %dir.display(), "loading model artifacts");
    ModelSet {
        crop_recommender: available(
            "crop_recommendation",
            load_classifier(&dir.join(CROP_RECOMMENDATION_FILE)),
        ),
        crop_yield: available("crop_yield", load_yield_model(dir)),
        fertilizer: available("fertilizer", load_fertilizer_model(dir)),
    }
}
