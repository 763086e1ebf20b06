//! Application layer wiring DTOs, resilience and services for Harvest.

pub mod dtos;
pub mod resilience;
pub mod response;
pub mod services;

pub use dtos::{
    CropPlan, CropRecommendation, FertilizerRecommendation, HealthStatusResponse, NameListResponse,
    NewsQuery, NewsResponse, PriceListResponse, PriceRecord, YieldPrediction,
};
pub use response::{ApiResponse, Outcome, ResponseBuilder};
pub use services::{FeedService, PlanningService, PredictionService};
