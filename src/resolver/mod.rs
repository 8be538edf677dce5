//! Response resolution
//!
//! Sends the utterance to the text-processing backend and falls back to a
//! canned local reply on any failure. [`ResponseResolver::resolve`] never
//! fails.

mod keywords;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ResolutionFailure;
use crate::state::{AudioRef, Origin, Response, Utterance};

pub use keywords::local_fallback;

/// Backend endpoint, relative to the base URL
pub const PROCESS_TEXT_PATH: &str = "api/process-text";

#[derive(Debug, Serialize)]
struct ProcessTextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessTextReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    audio_url: Option<String>,
}

/// Turns utterances into responses
pub struct ResponseResolver {
    client: reqwest::Client,
    base: Url,
    endpoint: Url,
    timeout: Duration,
}

impl ResponseResolver {
    /// `base` must end with `/` when it carries a path
    pub fn new(client: reqwest::Client, base: Url, timeout: Duration) -> Result<Self, url::ParseError> {
        let endpoint = base.join(PROCESS_TEXT_PATH)?;
        Ok(Self {
            client,
            base,
            endpoint,
            timeout,
        })
    }

    /// Resolve `utterance` to a response, remotely if possible
    pub async fn resolve(&self, utterance: &Utterance) -> Response {
        match self.request(&utterance.text).await {
            Ok(reply) => {
                let response = self.response_from(reply, utterance);
                info!(
                    origin = "backend",
                    has_audio = response.audio_ref().is_some(),
                    "response resolved"
                );
                response
            }
            Err(failure) => {
                warn!(error = %failure, "backend unavailable, answering locally");
                Response::from_parts(
                    local_fallback(&utterance.text).to_string(),
                    None,
                    Origin::Fallback,
                )
            }
        }
    }

    async fn request(&self, text: &str) -> Result<ProcessTextReply, ResolutionFailure> {
        debug!(endpoint = %self.endpoint, "posting utterance to backend");
        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&ProcessTextRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionFailure::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn response_from(&self, reply: ProcessTextReply, utterance: &Utterance) -> Response {
        let text = reply
            .response
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| local_fallback(&utterance.text).to_string());

        let audio_ref = reply
            .audio_url
            .filter(|url| !url.trim().is_empty())
            .and_then(|url| match self.base.join(&url) {
                Ok(resolved) => Some(AudioRef::new(resolved)),
                Err(e) => {
                    warn!(%url, error = %e, "ignoring unusable audio_url");
                    None
                }
            });

        Response::from_parts(text, audio_ref, Origin::Backend)
    }
}


#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::testing::{local_client, serve, unreachable_base};
    use super::*;

    fn resolver(base: Url) -> ResponseResolver {
        ResponseResolver::new(local_client(), base, Duration::from_secs(5)).unwrap()
    }

    fn route(router: Router) -> Router {
        Router::new().nest("/api", router)
    }

    #[tokio::test]
    async fn test_backend_reply() {
        let router = route(Router::new().route(
            "/process-text",
            post(|Json(body): Json<Value>| async move {
                let text = body["text"].as_str().unwrap_or_default().to_string();
                Json(json!({
                    "response": format!("ऐकले: {text}"),
                    "audio_url": "/audio/reply.wav",
                }))
            }),
        ));
        let base = serve(router).await;

        let response = resolver(base.clone())
            .resolve(&Utterance::new("नमस्कार"))
            .await;
        assert_eq!(response.origin(), Origin::Backend);
        assert_eq!(response.text(), "ऐकले: नमस्कार");
        assert_eq!(
            response.audio_ref().map(AudioRef::as_str),
            Some(base.join("audio/reply.wav").unwrap().as_str())
        );
    }

    #[tokio::test]
    async fn test_backend_without_text_uses_local_reply() {
        let router = route(Router::new().route(
            "/process-text",
            post(|| async { Json(json!({ "response": "", "audio_url": "https://cdn.example/a.mp3" })) }),
        ));
        let response = resolver(serve(router).await)
            .resolve(&Utterance::new("bye"))
            .await;

        assert_eq!(response.origin(), Origin::Backend);
        assert_eq!(response.text(), local_fallback("bye"));
        assert_eq!(
            response.audio_ref().map(AudioRef::as_str),
            Some("https://cdn.example/a.mp3")
        );
    }

    #[tokio::test]
    async fn test_error_status_falls_back() {
        let router = route(Router::new().route(
            "/process-text",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ));
        let response = resolver(serve(router).await)
            .resolve(&Utterance::new("thank you"))
            .await;

        assert_eq!(response.origin(), Origin::Fallback);
        assert_eq!(response.text(), local_fallback("thank you"));
        assert!(response.audio_ref().is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back() {
        let router = route(Router::new().route(
            "/process-text",
            post(|| async { "<html>gateway</html>" }),
        ));
        let response = resolver(serve(router).await)
            .resolve(&Utterance::new("hello"))
            .await;
        assert_eq!(response.origin(), Origin::Fallback);

        let router = route(Router::new().route(
            "/process-text",
            post(|| async { Json(json!({ "response": 42 })) }),
        ));
        let response = resolver(serve(router).await)
            .resolve(&Utterance::new("hello"))
            .await;
        assert_eq!(response.origin(), Origin::Fallback);
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_back() {
        for input in ["नमस्कार", "", "काहीतरी वेगळे"] {
            let response = resolver(unreachable_base())
                .resolve(&Utterance::new(input))
                .await;
            assert_eq!(response.origin(), Origin::Fallback);
            assert!(!response.text().is_empty());
        }
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let router = route(Router::new().route(
            "/process-text",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Json(json!({ "response": "too late" }))
            }),
        ));
        let resolver =
            ResponseResolver::new(local_client(), serve(router).await, Duration::from_millis(100))
                .unwrap();

        let started = std::time::Instant::now();
        let response = resolver.resolve(&Utterance::new("hello")).await;
        assert_eq!(response.origin(), Origin::Fallback);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_reply_fields_are_optional() {
        let reply: ProcessTextReply = serde_json::from_str("{}").unwrap();
        assert!(reply.response.is_none());
        assert!(reply.audio_url.is_none());
    }
}
