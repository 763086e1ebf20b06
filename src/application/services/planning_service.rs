use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    application::{dtos::CropPlan, resilience::ResilientClient},
    domain::{validate, DomainError, FieldSpec, FieldValue, RawRequest, UpstreamError, ValidatedRecord},
};

const UNKNOWN_CROP: &str = "Unknown";

/// Request field and the label it gets in the prompt.
const CONDITIONS: [(&str, &str); 9] = [
    ("ph", "pH"),
    ("temperature", "Temperature"),
    ("rainfall", "Rainfall"),
    ("soil_type", "Soil Type"),
    ("season", "Season"),
    ("market_demand", "Market Demand"),
    ("fertilizer_used", "Fertilizer Used"),
    ("pest_issue", "Pest Issue"),
    ("irrigation_method", "Irrigation Method"),
];

/// Text-generation upstream. A call is a single blocking attempt returning
/// the raw reply text; retries and caching happen above it.
pub trait GuideSource: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// A generation upstream paired with the resilient client that caches its
/// parsed plans.
pub struct Advisor {
    source: Arc<dyn GuideSource>,
    client: ResilientClient<Arc<CropPlan>>,
}

impl Advisor {
    pub fn new(source: Arc<dyn GuideSource>, client: ResilientClient<Arc<CropPlan>>) -> Self {
        Self { source, client }
    }
}

pub fn crop_plan_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::float("ph").range(0.0, 14.0),
        FieldSpec::float("temperature").range(-10.0, 60.0),
        FieldSpec::float("rainfall").range(0.0, 5000.0),
        FieldSpec::text("soil_type").max_length(64),
        FieldSpec::text("season").max_length(32),
        FieldSpec::text("market_demand").max_length(32),
        FieldSpec::text("fertilizer_used").max_length(64),
        FieldSpec::text("pest_issue").max_length(64),
        FieldSpec::text("irrigation_method").max_length(64),
    ]
}

/// Crop planning: picks a crop for the given field conditions and returns a
/// generated growing guide.
pub struct PlanningService {
    advisor: Option<Advisor>,
}

impl PlanningService {
    pub fn new(advisor: Option<Advisor>) -> Self {
        Self { advisor }
    }

    pub fn is_configured(&self) -> bool {
        self.advisor.is_some()
    }

    pub async fn plan(
        &self,
        raw: &RawRequest,
        cancel: &CancellationToken,
    ) -> Result<CropPlan, DomainError> {
        let record = validate(raw, &crop_plan_fields()).into_result()?;
        let advisor = self
            .advisor
            .as_ref()
            .ok_or_else(|| DomainError::internal("crop planner not configured"))?;

        let key = cache_key(&record);
        let prompt = build_prompt(&record);
        let producer = || {
            let source = Arc::clone(&advisor.source);
            let prompt = prompt.clone();
            async move {
                let reply = tokio::task::spawn_blocking(move || source.generate(&prompt))
                    .await
                    .map_err(|err| UpstreamError::Aborted(err.to_string()))??;
                extract_plan(&reply).map(Arc::new)
            }
        };

        let plan = advisor.client.fetch_with_cancel(&key, producer, cancel).await?;
        info!(crop = %plan.crop, "crop plan served");
        Ok(CropPlan::clone(&plan))
    }
}

fn display(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(text) => text.clone(),
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Float(v) => v.to_string(),
    }
}

/// Stable key over the sanitized conditions, in declaration order.
fn cache_key(record: &ValidatedRecord) -> String {
    let joined = record
        .iter()
        .map(|(name, value)| format!("{name}={}", display(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("plan?{joined}")
}

fn build_prompt(record: &ValidatedRecord) -> String {
    let conditions = CONDITIONS
        .iter()
        .filter_map(|(field, label)| record.get(field).map(|v| format!("{label}: {}", display(v))))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a JSON API that provides agricultural advice. \
         Your entire response MUST be a single, valid JSON object and nothing else.\n\
         Analyze these farming conditions: {conditions}\n\
         1. Determine the single best crop that is appropriate for the \"Season\" provided.\n\
         2. Generate a farming guide for that crop. For any lists or steps, use the newline \
         character `\\n` to separate items.\n\
         Return a single JSON object with these exact keys: \"predicted_crop\", \"title\", \
         \"how_to_plant\", \"fertilizer\", \"timeline\", \"ideal_rainfall\", \"post_harvest\"."
    )
}

/// Span from the first `{` to the last `}`, if the reply has one.
fn json_object_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

/// Pull the guide object out of a generated reply. A reply without a
/// parseable object is malformed, so it is never cached.
fn extract_plan(reply: &str) -> Result<CropPlan, UpstreamError> {
    let guide = json_object_span(reply)
        .ok_or_else(|| UpstreamError::Malformed("reply contains no JSON object".into()))?;
    let object: Map<String, Value> = serde_json::from_str(guide)
        .map_err(|err| UpstreamError::Malformed(format!("guide is not valid JSON: {err}")))?;

    let crop = object
        .get("predicted_crop")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|crop| !crop.is_empty())
        .unwrap_or(UNKNOWN_CROP);
    debug!(crop, keys = object.len(), "guide parsed");

    Ok(CropPlan {
        crop: crop.to_string(),
        guide_json_string: guide.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::application::resilience::{RetryPolicy, TtlCache};
    use crate::domain::ViolationReason;

    const GUIDE: &str = r#"{"predicted_crop": "Wheat", "title": "Growing Wheat", "timeline": "Sow\nIrrigate\nHarvest"}"#;

    struct ScriptedGuide {
        replies: Mutex<Vec<Result<String, UpstreamError>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedGuide {
        fn new(replies: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl GuideSource for ScriptedGuide {
        fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(prompt.to_string());
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            }
        }
    }

    fn service(source: Arc<ScriptedGuide>) -> PlanningService {
        PlanningService::new(Some(Advisor::new(
            source,
            ResilientClient::new(
                "planner",
                RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1)),
                TtlCache::new(Duration::from_secs(3600)),
            ),
        )))
    }

    fn conditions() -> RawRequest {
        RawRequest::from_pairs([
            ("ph", "6.5"),
            ("temperature", "22"),
            ("rainfall", "650"),
            ("soil_type", "Loamy"),
            ("season", "Rabi"),
            ("market_demand", "High"),
            ("fertilizer_used", "Urea"),
            ("pest_issue", "None"),
            ("irrigation_method", "Drip"),
        ])
    }

    #[tokio::test]
    async fn fenced_reply_is_extracted_and_cached() {
        let reply = format!("```json\n{GUIDE}\n```");
        let source = ScriptedGuide::new(vec![Ok(reply)]);
        let service = service(source.clone());
        let cancel = CancellationToken::new();

        let first = service.plan(&conditions(), &cancel).await.unwrap();
        let second = service.plan(&conditions(), &cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.crop, "Wheat");
        assert_eq!(first.guide_json_string, GUIDE);
        assert_eq!(source.calls(), 1);

        let prompts = source.prompts.lock();
        assert!(prompts[0].contains("pH: 6.5, Temperature: 22, Rainfall: 650, Soil Type: Loamy"));
        assert!(prompts[0].contains("Irrigation Method: Drip"));
    }

    #[tokio::test]
    async fn different_conditions_are_planned_separately() {
        let source = ScriptedGuide::new(vec![Ok(GUIDE.to_string())]);
        let service = service(source.clone());
        let cancel = CancellationToken::new();

        service.plan(&conditions(), &cancel).await.unwrap();
        service
            .plan(&conditions().with("season", "Kharif"), &cancel)
            .await
            .unwrap();

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn prose_reply_is_rejected_and_not_cached() {
        let source = ScriptedGuide::new(vec![
            Ok("Sorry, I cannot help with that.".to_string()),
            Ok(GUIDE.to_string()),
        ]);
        let service = service(source.clone());
        let cancel = CancellationToken::new();

        let err = service.plan(&conditions(), &cancel).await.unwrap_err();
        assert!(matches!(err, DomainError::UpstreamRejected(_)));
        assert_eq!(source.calls(), 1);

        let plan = service.plan(&conditions(), &cancel).await.unwrap();
        assert_eq!(plan.crop, "Wheat");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn broken_object_is_rejected() {
        let source = ScriptedGuide::new(vec![Ok(r#"{"predicted_crop": "Wheat",}"#.to_string())]);
        let err = service(source)
            .plan(&conditions(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UpstreamRejected(_)));
    }

    #[tokio::test]
    async fn guide_without_crop_is_unknown() {
        let source = ScriptedGuide::new(vec![Ok(r#"{"title": "General advice"}"#.to_string())]);
        let plan = service(source)
            .plan(&conditions(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plan.crop, UNKNOWN_CROP);
    }

    #[tokio::test]
    async fn outage_exhausts_retries_as_unavailable() {
        let source = ScriptedGuide::new(vec![Err(UpstreamError::from_status(503, "overloaded"))]);
        let err = service(source.clone())
            .plan(&conditions(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::UpstreamUnavailable(_)));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn invalid_conditions_never_reach_upstream() {
        let source = ScriptedGuide::new(vec![Ok(GUIDE.to_string())]);
        let raw = conditions().with("ph", "15").with("season", "<>");

        let err = service(source.clone())
            .plan(&raw, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            DomainError::Validation(violations) => {
                assert_eq!(violations.len(), 2);
                assert_eq!(violations[0].field, "ph");
                assert_eq!(violations[0].reason, ViolationReason::OutOfRange);
                assert_eq!(violations[1].field, "season");
                assert_eq!(violations[1].reason, ViolationReason::MissingField);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_planner_is_internal_after_validation() {
        let service = PlanningService::new(None);
        let cancel = CancellationToken::new();

        let err = service.plan(&conditions(), &cancel).await.unwrap_err();
        assert!(matches!(err, DomainError::Internal(_)));

        let err = service.plan(&RawRequest::new(), &cancel).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(v) if v.len() == 9));
    }

    #[test]
    fn span_runs_from_first_open_to_last_close() {
        assert_eq!(json_object_span("x {\"a\": {\"b\": 1}} y"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(json_object_span("} backwards {"), None);
        assert_eq!(json_object_span("no braces"), None);
    }
}
