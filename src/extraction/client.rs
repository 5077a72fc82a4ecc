//! HTTP adapter for the document-understanding provider.
//!
//! One extraction is a single fallible remote call from the retry executor's
//! point of view: the adapter maps transport failures onto [`ExtractError`]
//! variants the classifier understands and normalizes the provider response
//! into an [`Extraction`] with populated token and cost fields.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::types::{ExtractError, Extraction, PageHints};
use crate::retry::parse_retry_after;

/// Per-model pricing in USD per million tokens (input, output).
/// Used when the provider reports token counts but no cost figure.
const MODEL_PRICING: &[(&str, f64, f64)] = &[
    ("sheetread-pro", 3.00, 15.00),
    ("sheetread-lite", 0.25, 1.25),
];

/// Fallback pricing for unknown models: priced like the pro tier so cost
/// is over- rather than under-reported.
const DEFAULT_PRICING: (f64, f64) = (3.00, 15.00);

/// Compute USD cost from token counts for a model.
pub fn cost_for_tokens(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let (input_rate, output_rate) = MODEL_PRICING
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, i, o)| (*i, *o))
        .unwrap_or(DEFAULT_PRICING);
    (input_tokens as f64 * input_rate + output_tokens as f64 * output_rate) / 1_000_000.0
}

/// Boundary seam for document extraction. The job processor only ever sees
/// this trait, so tests plug in [`MockExtractor`].
pub trait DocumentExtractor: Send + Sync {
    fn extract(
        &self,
        document: &[u8],
        hints: Option<&PageHints>,
    ) -> impl std::future::Future<Output = Result<Extraction, ExtractError>> + Send;
}

/// HTTP client for the extraction provider.
pub struct HttpExtractionClient {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpExtractionClient {
    /// Build a client with a per-request timeout. Exceeding the timeout is
    /// surfaced as [`ExtractError::Timeout`], which the classifier treats
    /// as retryable.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Network {
                code: None,
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ExtractError {
        if e.is_timeout() {
            ExtractError::Timeout(self.timeout)
        } else if e.is_connect() {
            ExtractError::Network {
                code: Some("ECONNREFUSED".into()),
                message: e.to_string(),
            }
        } else {
            ExtractError::Network {
                code: None,
                message: e.to_string(),
            }
        }
    }
}

/// Request body for POST /v1/extract.
#[derive(Serialize)]
struct ExtractRequest<'a> {
    model: &'a str,
    /// Document bytes, base64-encoded.
    document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pages: Option<&'a [u32]>,
}

/// Response body from POST /v1/extract.
#[derive(Deserialize)]
struct ExtractResponse {
    data: serde_json::Value,
    usage: ExtractUsage,
    /// Present when the provider bills per request and reports it directly.
    cost_usd: Option<f64>,
}

#[derive(Deserialize)]
struct ExtractUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    pages_processed: u32,
}

/// Error body the provider returns with 4xx semantic failures.
#[derive(Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
}

impl DocumentExtractor for HttpExtractionClient {
    async fn extract(
        &self,
        document: &[u8],
        hints: Option<&PageHints>,
    ) -> Result<Extraction, ExtractError> {
        let start = Instant::now();
        let url = format!("{}/v1/extract", self.base_url);
        let body = ExtractRequest {
            model: &self.model,
            document: base64::engine::general_purpose::STANDARD.encode(document),
            pages: hints.map(|h| h.pages.as_slice()),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();

            // 422 is the provider's "document understood the request but the
            // content is unusable" answer: semantic, not transient.
            if status.as_u16() == 422 {
                let reason = serde_json::from_str::<ProviderErrorBody>(&body)
                    .ok()
                    .and_then(|b| b.error)
                    .unwrap_or(body);
                return Err(ExtractError::Unreadable(reason));
            }

            return Err(ExtractError::Provider {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::ResponseParsing(e.to_string()))?;

        let cost_usd = parsed.cost_usd.unwrap_or_else(|| {
            cost_for_tokens(
                &self.model,
                parsed.usage.input_tokens,
                parsed.usage.output_tokens,
            )
        });

        Ok(Extraction {
            provider: "sheetread".to_string(),
            model: self.model.clone(),
            data: parsed.data,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            pages_processed: parsed.usage.pages_processed,
            cost_usd,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Mock extractor for testing — plays back a scripted sequence of outcomes,
/// then keeps returning the fallback success.
pub struct MockExtractor {
    script: Mutex<std::collections::VecDeque<Result<Extraction, ExtractError>>>,
    fallback: Extraction,
    calls: AtomicU32,
}

impl MockExtractor {
    pub fn succeeding() -> Self {
        Self {
            script: Mutex::new(std::collections::VecDeque::new()),
            fallback: Self::sample_extraction(),
            calls: AtomicU32::new(0),
        }
    }

    /// Queue outcomes returned in order before the fallback kicks in.
    pub fn scripted(outcomes: Vec<Result<Extraction, ExtractError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallback: Self::sample_extraction(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sample_extraction() -> Extraction {
        Extraction {
            provider: "sheetread".into(),
            model: "sheetread-lite".into(),
            data: serde_json::json!({"rows": [{"label": "A-1", "length_m": 12.5}]}),
            input_tokens: 1200,
            output_tokens: 340,
            pages_processed: 1,
            cost_usd: cost_for_tokens("sheetread-lite", 1200, 340),
            processing_time_ms: 8,
        }
    }
}

impl DocumentExtractor for MockExtractor {
    async fn extract(
        &self,
        _document: &[u8],
        _hints: Option<&PageHints>,
    ) -> Result<Extraction, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().expect("mock script lock").pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = HttpExtractionClient::new(
            "https://extract.example.com/",
            "key",
            "sheetread-lite",
            Duration::from_secs(120),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://extract.example.com");
        assert_eq!(client.model(), "sheetread-lite");
    }

    #[test]
    fn cost_uses_model_pricing() {
        // 1M input + 1M output on the lite tier.
        let cost = cost_for_tokens("sheetread-lite", 1_000_000, 1_000_000);
        assert!((cost - 1.50).abs() < 1e-9);

        let cost = cost_for_tokens("sheetread-pro", 1_000_000, 0);
        assert!((cost - 3.00).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_prices_at_pro_tier() {
        let unknown = cost_for_tokens("sheetread-next", 500_000, 0);
        let pro = cost_for_tokens("sheetread-pro", 500_000, 0);
        assert_eq!(unknown, pro);
    }

    #[test]
    fn request_body_omits_absent_pages() {
        let body = ExtractRequest {
            model: "sheetread-lite",
            document: "aGVsbG8=".into(),
            pages: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("pages").is_none());
    }

    #[tokio::test]
    async fn mock_plays_script_then_fallback() {
        let mock = MockExtractor::scripted(vec![Err(ExtractError::Timeout(
            Duration::from_secs(1),
        ))]);
        assert!(mock.extract(b"doc", None).await.is_err());
        assert!(mock.extract(b"doc", None).await.is_ok());
        assert_eq!(mock.calls(), 2);
    }
}
