//! Service layer orchestrating domain operations and infrastructure adapters.

mod feed_service;
mod planning_service;
mod prediction_service;

pub use feed_service::{Feed, FeedService, FeedSource};
pub use planning_service::{crop_plan_fields, Advisor, GuideSource, PlanningService};
pub use prediction_service::{
    crop_recommendation_fields, crop_yield_fields, fertilizer_fields, Classifier,
    FertilizerModel, ModelSet, PredictionService, Regressor, YieldModel,
};
