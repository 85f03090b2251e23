//! Multimodal encoder service client.
//!
//! Turns text and image content into fixed-length vectors in one shared
//! space over a bearer-authenticated HTTPS API. Failure semantics follow the
//! degraded-retrieval contract: every input yields a vector or `None`, in
//! input order, and no transport or provider error ever reaches the caller.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use curio_core::defaults;
use curio_core::{EncodeInput, EncodeMode, Encoder, Vector};

/// Default encoder endpoint.
pub const DEFAULT_ENCODER_URL: &str = "https://api.encoder.example.com";

/// Default multimodal embedding model.
pub const DEFAULT_ENCODER_MODEL: &str = "multimodal-embed-3";

/// HTTP client for the encoder service.
pub struct EncoderClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

impl EncoderClient {
    /// Create a new encoder client with custom configuration. A `None`
    /// api_key is a valid, handled state: every encode call returns all-`None`
    /// vectors, signaling degraded retrieval to callers.
    pub fn with_config(
        base_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(defaults::ENCODE_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        info!(
            subsystem = "inference",
            component = "encoder",
            base_url = %base_url,
            model = %model,
            dimension,
            credentials = api_key.is_some(),
            "Initializing encoder client"
        );

        Self {
            client,
            base_url,
            api_key,
            model,
            dimension,
            timeout_secs: defaults::ENCODE_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CURIO_ENCODER_URL` | `https://api.encoder.example.com` |
    /// | `CURIO_ENCODER_API_KEY` | unset (degraded mode) |
    /// | `CURIO_ENCODER_MODEL` | `multimodal-embed-3` |
    /// | `CURIO_EMBED_DIM` | `1024` |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("CURIO_ENCODER_URL").unwrap_or_else(|_| DEFAULT_ENCODER_URL.to_string());
        let api_key = std::env::var("CURIO_ENCODER_API_KEY").ok().filter(|k| !k.is_empty());
        let model = std::env::var("CURIO_ENCODER_MODEL")
            .unwrap_or_else(|_| DEFAULT_ENCODER_MODEL.to_string());
        let dimension = std::env::var("CURIO_EMBED_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::EMBED_DIMENSION);

        Self::with_config(base_url, api_key, model, dimension)
    }

    /// Whether credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Truncate text to the per-input character budget.
    fn truncate(text: &str) -> String {
        if text.chars().count() <= defaults::ENCODE_CHAR_BUDGET {
            text.to_string()
        } else {
            text.chars().take(defaults::ENCODE_CHAR_BUDGET).collect()
        }
    }

    /// Encode one bounded batch; `None` for every slot on any failure.
    async fn encode_batch(
        &self,
        api_key: &str,
        inputs: &[EncodeInput],
        mode: EncodeMode,
    ) -> Vec<Option<Vector>> {
        let request = EncodeRequest {
            model: self.model.clone(),
            mode: match mode {
                EncodeMode::Document => "document",
                EncodeMode::Query => "query",
            },
            inputs: inputs
                .iter()
                .map(|input| EncodeRequestInput {
                    text: input.text.as_deref().map(Self::truncate),
                    image_url: input.image_url.clone(),
                })
                .collect(),
        };

        let response = match self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "encoder",
                    error = %e,
                    "Encoder request failed, returning null vectors"
                );
                return vec![None; inputs.len()];
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "inference",
                component = "encoder",
                status = %status,
                body = %body,
                "Encoder returned error status, returning null vectors"
            );
            return vec![None; inputs.len()];
        }

        let parsed: EncodeResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "encoder",
                    error = %e,
                    "Failed to parse encoder response, returning null vectors"
                );
                return vec![None; inputs.len()];
            }
        };

        // The provider may return results out of order; restore caller order
        // by the declared index before returning.
        let mut slots: Vec<Option<Vector>> = vec![None; inputs.len()];
        for entry in parsed.data {
            if let Some(slot) = slots.get_mut(entry.index) {
                *slot = entry.embedding.map(Vector::from);
            } else {
                warn!(
                    subsystem = "inference",
                    component = "encoder",
                    index = entry.index,
                    "Encoder returned out-of-range index, dropping entry"
                );
            }
        }
        slots
    }
}

#[derive(Serialize)]
struct EncodeRequest {
    model: String,
    mode: &'static str,
    inputs: Vec<EncodeRequestInput>,
}

#[derive(Serialize)]
struct EncodeRequestInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct EncodeResponse {
    data: Vec<EncodeResponseEntry>,
}

#[derive(Deserialize)]
struct EncodeResponseEntry {
    index: usize,
    embedding: Option<Vec<f32>>,
}

#[async_trait]
impl Encoder for EncoderClient {
    #[instrument(skip(self, inputs), fields(subsystem = "inference", component = "encoder", op = "encode", input_count = inputs.len()))]
    async fn encode(&self, inputs: &[EncodeInput], mode: EncodeMode) -> Vec<Option<Vector>> {
        if inputs.is_empty() {
            return Vec::new();
        }

        let Some(api_key) = self.api_key.clone() else {
            debug!("No encoder credentials configured, returning null vectors");
            return vec![None; inputs.len()];
        };

        let start = Instant::now();
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(defaults::ENCODE_BATCH_MAX) {
            vectors.extend(self.encode_batch(&api_key, batch, mode).await);
        }

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = vectors.iter().filter(|v| v.is_some()).count(),
            duration_ms = elapsed,
            "Encoding complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                input_count = inputs.len(),
                slow = true,
                "Slow encoding operation"
            );
        }
        vectors
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
