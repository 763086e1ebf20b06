//! Blocking HTTP transport for the third-party upstreams (news, prices and
//! the generative crop planner).
//!
//! Every call here is exactly one attempt. Retrying, caching and the
//! per-attempt deadline live in the resilient client above this layer.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::services::{FeedSource, GuideSource};
use crate::domain::UpstreamError;

/// Query parameter carrying an API credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub param: String,
    pub value: String,
}

impl Credential {
    pub fn new(param: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            value: value.into(),
        }
    }
}

/// [`FeedSource`] backed by a `ureq` agent.
pub struct HttpFeedSource {
    base_url: String,
    credential: Option<Credential>,
    agent: ureq::Agent,
}

impl HttpFeedSource {
    pub fn new(base_url: impl Into<String>, credential: Option<Credential>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        Self {
            base_url: base_url.into(),
            credential,
            agent,
        }
    }

    /// Endpoint URL for `path`, relative to the base URL.
    fn endpoint(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl FeedSource for HttpFeedSource {
    fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, UpstreamError> {
        let url = self.endpoint(path);
        debug!(%url, params = query.len(), "calling upstream");

        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        if let Some(credential) = &self.credential {
            request = request.query(&credential.param, &credential.value);
        }

        let response = request.call().map_err(handle_http_error)?;
        response
            .into_json::<Value>()
            .map_err(|e| UpstreamError::Malformed(format!("invalid JSON body: {e}")))
    }

    fn fingerprint(&self, path: &str, query: &[(String, String)]) -> String {
        let mut params: Vec<&(String, String)> = query
            .iter()
            .filter(|(key, _)| {
                self.credential
                    .as_ref()
                    .map_or(true, |credential| &credential.param != key)
            })
            .collect();
        params.sort();

        let encoded = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.endpoint(path), encoded)
    }
}

/// [`GuideSource`] calling a `generateContent` endpoint with a single
/// text prompt.
pub struct HttpGuideSource {
    url: String,
    credential: Option<Credential>,
    agent: ureq::Agent,
}

impl HttpGuideSource {
    pub fn new(url: impl Into<String>, credential: Option<Credential>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            credential,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl GuideSource for HttpGuideSource {
    fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
        debug!(url = %self.url, prompt_chars = prompt.len(), "requesting guide");

        let mut request = self.agent.post(&self.url);
        if let Some(credential) = &self.credential {
            request = request.query(&credential.param, &credential.value);
        }

        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let response = request.send_json(body).map_err(handle_http_error)?;
        let reply = response
            .into_json::<GenerateReply>()
            .map_err(|e| UpstreamError::Malformed(format!("invalid JSON body: {e}")))?;

        reply
            .text()
            .ok_or_else(|| UpstreamError::Malformed("reply has no candidate text".into()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateReply {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Error body shape some upstreams return alongside a failing status.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Classify a `ureq` failure.
pub fn handle_http_error(error: ureq::Error) -> UpstreamError {
    match error {
        ureq::Error::Status(code, response) => {
            let message = match response.into_json::<ErrorResponse>() {
                Ok(ErrorResponse {
                    message: Some(message),
                    ..
                }) => message,
                Ok(ErrorResponse {
                    error: Some(error), ..
                }) => error.to_string(),
                _ => format!("HTTP {code}"),
            };
            UpstreamError::from_status(code, message)
        }
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                UpstreamError::Aborted(transport.to_string())
            }
            _ => UpstreamError::Connection(transport.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(credential: Option<Credential>) -> HttpFeedSource {
        HttpFeedSource::new(
            "https://newsdata.example/api/1/",
            credential,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn endpoint_joins_paths() {
        let source = source(None);
        assert_eq!(source.endpoint("latest"), "https://newsdata.example/api/1/latest");
        assert_eq!(source.endpoint(""), "https://newsdata.example/api/1/");
    }

    #[test]
    fn fingerprint_sorts_and_encodes_params() {
        let source = source(None);
        let key = source.fingerprint(
            "latest",
            &[
                ("qInMeta".into(), "crop prices".into()),
                ("country".into(), "in".into()),
            ],
        );
        assert_eq!(
            key,
            "https://newsdata.example/api/1/latest?country=in&qInMeta=crop%20prices"
        );
    }

    #[test]
    fn fingerprint_never_contains_the_credential() {
        let source = source(Some(Credential::new("apikey", "secret-token")));
        let key = source.fingerprint(
            "latest",
            &[
                ("apikey".into(), "secret-token".into()),
                ("language".into(), "hi".into()),
            ],
        );
        assert!(!key.contains("secret-token"));
        assert!(key.ends_with("?language=hi"));
    }

    #[test]
    fn unreachable_host_is_a_transient_failure() {
        let source = HttpFeedSource::new("http://127.0.0.1:9", None, Duration::from_millis(500));
        let err = source.get_json("", &[]).unwrap_err();
        assert!(err.is_transient(), "unexpected classification: {err:?}");
    }

    #[test]
    fn guide_text_joins_first_candidate_parts() {
        let reply: GenerateReply = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"predicted_crop\": " }, { "text": "\"Rice\"}" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(reply.text().as_deref(), Some("{\"predicted_crop\": \"Rice\"}"));
    }

    #[test]
    fn blocked_prompt_has_no_guide_text() {
        let reply: GenerateReply =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap();
        assert!(reply.text().is_none());

        let reply: GenerateReply =
            serde_json::from_value(json!({ "candidates": [{ "finishReason": "SAFETY" }] })).unwrap();
        assert!(reply.text().is_none());
    }

    #[test]
    fn unreachable_planner_is_a_transient_failure() {
        let source = HttpGuideSource::new(
            "http://127.0.0.1:9/v1beta/models/m:generateContent",
            Some(Credential::new("key", "k")),
            Duration::from_millis(500),
        );
        let err = source.generate("hello").unwrap_err();
        assert!(err.is_transient(), "unexpected classification: {err:?}");
    }

    #[test]
    fn malformed_url_is_not_retried() {
        let source = HttpFeedSource::new("not a url", None, Duration::from_millis(500));
        let err = source.get_json("latest", &[]).unwrap_err();
        assert!(!err.is_transient());
    }
}
