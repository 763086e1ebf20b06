use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    application::dtos::{CropRecommendation, FertilizerRecommendation, YieldContext, YieldPrediction},
    domain::{
        validate, CategoricalEncoder, DomainError, FeatureLayout, FeatureVector, FieldSpec,
        RawRequest, ValidatedRecord,
    },
};

/// A pre-trained model that maps a feature vector to a class label.
pub trait Classifier: Send + Sync {
    /// Number of features the model was trained on.
    fn feature_count(&self) -> usize;

    fn predict(&self, features: &FeatureVector) -> Result<String, DomainError>;
}

/// A pre-trained model that maps a feature vector to a number.
pub trait Regressor: Send + Sync {
    fn feature_count(&self) -> usize;

    fn predict(&self, features: &FeatureVector) -> Result<f64, DomainError>;
}

pub struct YieldModel {
    pub regressor: Arc<dyn Regressor>,
    pub crop: Arc<dyn CategoricalEncoder>,
    pub season: Arc<dyn CategoricalEncoder>,
    pub state: Arc<dyn CategoricalEncoder>,
}

pub struct FertilizerModel {
    pub classifier: Arc<dyn Classifier>,
    pub soil_type: Arc<dyn CategoricalEncoder>,
    pub crop_type: Arc<dyn CategoricalEncoder>,
}

/// Whatever model artifacts could be loaded at start-up. A missing model
/// disables its endpoint (answers 500) without affecting the others.
#[derive(Default)]
pub struct ModelSet {
    pub crop_recommender: Option<Arc<dyn Classifier>>,
    pub crop_yield: Option<YieldModel>,
    pub fertilizer: Option<FertilizerModel>,
}

pub fn crop_recommendation_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::float("N").range(0.0, 200.0),
        FieldSpec::float("P").range(0.0, 200.0),
        FieldSpec::float("K").range(0.0, 250.0),
        FieldSpec::float("temperature").range(-10.0, 60.0),
        FieldSpec::float("humidity").range(0.0, 100.0),
        FieldSpec::float("ph").range(0.0, 14.0),
        FieldSpec::float("rainfall").range(0.0, 5000.0),
    ]
}

pub fn crop_yield_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::category("crop").max_length(64),
        FieldSpec::integer("year").range(1950.0, 2100.0),
        FieldSpec::category("season").max_length(32),
        FieldSpec::category("state").max_length(64),
        FieldSpec::float("area").at_least(0.0),
        FieldSpec::float("production").at_least(0.0),
        FieldSpec::float("rainfall").at_least(0.0),
    ]
}

pub fn fertilizer_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::float("temperature").range(-10.0, 60.0),
        FieldSpec::float("humidity").range(0.0, 100.0),
        FieldSpec::float("moisture").range(0.0, 100.0),
        FieldSpec::category("soil_type").max_length(32),
        FieldSpec::category("crop_type").max_length(32),
        FieldSpec::float("nitrogen").range(0.0, 200.0),
        FieldSpec::float("potassium").range(0.0, 250.0),
        FieldSpec::float("phosphorous").range(0.0, 200.0),
    ]
}

/// Field specs, feature layout and model for one endpoint.
struct ModelEndpoint<M: ?Sized> {
    name: &'static str,
    fields: Vec<FieldSpec>,
    pipeline: Option<(FeatureLayout, Arc<M>)>,
}

impl<M: ?Sized> ModelEndpoint<M> {
    /// Validate, then encode. Client errors are reported before the model's
    /// availability is even considered, and no model is touched on failure.
    fn prepare(
        &self,
        raw: &RawRequest,
        feature_count: impl Fn(&M) -> usize,
    ) -> Result<(ValidatedRecord, FeatureVector, &M), DomainError> {
        let record = validate(raw, &self.fields).into_result()?;

        let (layout, model) = self.pipeline.as_ref().ok_or_else(|| {
            DomainError::internal(format!("{} model not available", self.name))
        })?;

        let features = layout.assemble(&record)?;
        let expected = feature_count(&**model);
        if features.len() != expected {
            return Err(DomainError::internal(format!(
                "{} model expects {expected} features, layout produced {}",
                self.name,
                features.len()
            )));
        }
        debug!(endpoint = self.name, features = ?features.values(), "features assembled");

        Ok((record, features, &**model))
    }
}

/// Orchestrates validation, encoding and local inference for the model-backed endpoints.
pub struct PredictionService {
    crop: ModelEndpoint<dyn Classifier>,
    crop_yield: ModelEndpoint<dyn Regressor>,
    fertilizer: ModelEndpoint<dyn Classifier>,
}

impl PredictionService {
    pub fn new(models: ModelSet) -> Self {
        let crop = ModelEndpoint {
            name: "crop recommendation",
            fields: crop_recommendation_fields(),
            pipeline: models.crop_recommender.map(|model| {
                let layout = ["N", "P", "K", "temperature", "humidity", "ph", "rainfall"]
                    .into_iter()
                    .fold(FeatureLayout::new(), |layout, field| layout.numeric(field));
                (layout, model)
            }),
        };

        let crop_yield = ModelEndpoint {
            name: "crop yield",
            fields: crop_yield_fields(),
            pipeline: models.crop_yield.map(|model| {
                let layout = FeatureLayout::new()
                    .encoded("crop", model.crop)
                    .numeric("year")
                    .encoded("season", model.season)
                    .encoded("state", model.state)
                    .numeric("area")
                    .numeric("rainfall")
                    .numeric("production");
                (layout, model.regressor)
            }),
        };

        let fertilizer = ModelEndpoint {
            name: "fertilizer",
            fields: fertilizer_fields(),
            pipeline: models.fertilizer.map(|model| {
                let layout = FeatureLayout::new()
                    .numeric("temperature")
                    .numeric("humidity")
                    .numeric("moisture")
                    .encoded("soil_type", model.soil_type)
                    .encoded("crop_type", model.crop_type)
                    .numeric("nitrogen")
                    .numeric("potassium")
                    .numeric("phosphorous");
                (layout, model.classifier)
            }),
        };

        Self {
            crop,
            crop_yield,
            fertilizer,
        }
    }

    pub fn recommend_crop(&self, raw: &RawRequest) -> Result<CropRecommendation, DomainError> {
        let (_, features, model) = self.crop.prepare(raw, |m| m.feature_count())?;
        let crop = model.predict(&features)?;
        info!(%crop, "crop recommended");
        Ok(CropRecommendation { crop })
    }

    pub fn predict_yield(&self, raw: &RawRequest) -> Result<YieldPrediction, DomainError> {
        let (record, features, model) = self.crop_yield.prepare(raw, |m| m.feature_count())?;
        let raw_prediction = model.predict(&features)?;
        if !raw_prediction.is_finite() {
            return Err(DomainError::internal("yield model produced a non-finite value"));
        }
        let prediction = (raw_prediction * 100.0).round() / 100.0;
        info!(prediction, "yield predicted");

        Ok(YieldPrediction {
            prediction,
            context: yield_context(&record),
        })
    }

    pub fn recommend_fertilizer(
        &self,
        raw: &RawRequest,
    ) -> Result<FertilizerRecommendation, DomainError> {
        let (_, features, model) = self.fertilizer.prepare(raw, |m| m.feature_count())?;
        let fertilizer = model.predict(&features)?;
        info!(%fertilizer, "fertilizer recommended");
        Ok(FertilizerRecommendation { fertilizer })
    }

    /// Names of endpoints whose model failed to load.
    pub fn unavailable_models(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.crop.pipeline.is_none() {
            missing.push(self.crop.name);
        }
        if self.crop_yield.pipeline.is_none() {
            missing.push(self.crop_yield.name);
        }
        if self.fertilizer.pipeline.is_none() {
            missing.push(self.fertilizer.name);
        }
        missing
    }
}

fn yield_context(record: &ValidatedRecord) -> YieldContext {
    let rainfall = record.number("rainfall").unwrap_or_default();
    let season = record.text("season").unwrap_or("selected");

    let (impact, note) = if rainfall < 500.0 {
        (
            "Low",
            "Rainfall is below the optimal range; plan supplementary irrigation.",
        )
    } else if rainfall <= 2000.0 {
        ("Positive", "Rainfall is within optimal range.")
    } else {
        ("Excess", "Rainfall is above the optimal range; ensure field drainage.")
    };

    YieldContext {
        rainfall_impact: impact.into(),
        rainfall_note: note.into(),
        season_tip: format!("Ensure timely sowing for the {season} season."),
    }
}
