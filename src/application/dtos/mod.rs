use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Result of the crop recommendation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
    pub crop: String,
}

/// Result of the fertilizer recommendation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerRecommendation {
    pub fertilizer: String,
}

/// Result of the yield endpoint: the prediction plus advisory notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldPrediction {
    pub prediction: f64,
    pub context: YieldContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldContext {
    pub rainfall_impact: String,
    pub rainfall_note: String,
    pub season_tip: String,
}

/// Result of the crop planning endpoint. `guide_json_string` is the JSON
/// object extracted from the generated reply, passed through as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropPlan {
    pub crop: String,
    pub guide_json_string: String,
}

/// Effective query sent to the news upstream, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsQuery {
    pub q: String,
    pub language: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsResponse {
    pub query: NewsQuery,
    pub total: usize,
    pub articles: Vec<Value>,
}

/// Upstream news payload; only the parts we forward.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewsFeed {
    #[serde(default)]
    pub results: Vec<Value>,
}

/// One mandi price row as published by the price upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(default, deserialize_with = "text_or_number")]
    pub state: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub district: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub market: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub commodity: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub variety: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub arrival_date: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub min_price: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub max_price: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub modal_price: String,
}

/// Upstream price payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PriceFeed {
    #[serde(default)]
    pub records: Vec<PriceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListResponse {
    pub records: Vec<PriceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Sorted distinct names (commodities, states, markets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameListResponse {
    pub items: Vec<String>,
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub checked_at: DateTime<Utc>,
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_record_accepts_numeric_prices() {
        let record: PriceRecord = serde_json::from_value(json!({
            "state": "Kerala",
            "market": "Kollam",
            "commodity": "Banana",
            "min_price": 3000,
            "modal_price": "3500",
            "grade": "FAQ"
        }))
        .unwrap();
        assert_eq!(record.min_price, "3000");
        assert_eq!(record.modal_price, "3500");
        assert_eq!(record.district, "");
    }
}
