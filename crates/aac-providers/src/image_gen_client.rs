//! HTTP implementation of `ImageGenClient` against a Replicate-shaped
//! prediction API: a model-path routing table in `stage3_request`, a
//! create-then-poll prediction flow, and a white-background prompt for
//! stage 4.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use aac_core::provider::{GeneratedImage, ImageGenClient};
use aac_core::retry::with_backoff;
use aac_core::EngineError;
use aac_domain::runtime_config::normalize_generation_model;

const POLL_MAX_TRIES: u32 = 90;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ReplicateImageGenClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    max_api_retries: u32,
}

impl ReplicateImageGenClient {
    pub fn new(base_url: String, api_token: String, max_api_retries: u32) -> Self {
        Self { http: reqwest::Client::new(), base_url, api_token, max_api_retries }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_token).parse().unwrap());
        headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers.insert("Prefer", "wait=60".parse().unwrap());
        headers
    }

    async fn create_prediction(&self, model_path: &str, payload_input: &Value) -> Result<Value, EngineError> {
        let url = format!("{}/v1/models/{model_path}/predictions", self.base_url);
        let body = json!({ "input": payload_input });
        with_backoff(self.max_api_retries, Duration::from_millis(500), |_: &reqwest::Error| true, || async {
            self.http.post(&url).headers(self.headers()).json(&body).send().await?.error_for_status()?.json::<Value>().await
        })
        .await
    }

    async fn poll_prediction(&self, prediction_id: &str) -> Result<Value, EngineError> {
        let url = format!("{}/v1/predictions/{prediction_id}", self.base_url);
        for _ in 0..POLL_MAX_TRIES {
            let data = with_backoff(self.max_api_retries, Duration::from_millis(500), |_: &reqwest::Error| true, || async {
                self.http.get(&url).headers(self.headers()).send().await?.error_for_status()?.json::<Value>().await
            })
            .await?;
            let status = data["status"].as_str().unwrap_or("");
            if matches!(status, "succeeded" | "failed" | "canceled") {
                return Ok(data);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(json!({ "status": "timeout", "id": prediction_id }))
    }

    async fn run_prediction(&self, model_path: &str, payload_input: &Value) -> Result<(Value, String), EngineError> {
        let created = self.create_prediction(model_path, payload_input).await?;
        let status = created["status"].as_str().unwrap_or("").to_string();
        let prediction = if matches!(status.as_str(), "succeeded" | "failed" | "canceled") {
            created
        } else {
            let Some(prediction_id) = created["id"].as_str() else {
                return Err(EngineError::ContractViolation("prediction response missing id".to_string()));
            };
            self.poll_prediction(prediction_id).await?
        };
        Ok((prediction, model_path.to_string()))
    }

    fn stage3_request(model_key: &str, prompt: &str) -> (&'static str, Value) {
        match model_key {
            "flux-1.1-pro" => (
                "black-forest-labs/flux-1.1-pro",
                json!({ "prompt": prompt, "aspect_ratio": "4:3", "output_format": "jpg", "output_quality": 80, "prompt_upsampling": false, "safety_tolerance": 2, "seed": 10000 }),
            ),
            "imagen-4" => (
                "google/imagen-4",
                json!({ "prompt": prompt, "num_outputs": 1, "aspect_ratio": "4:3", "output_format": "jpg", "output_quality": 80, "prompt_upsampling": true, "safety_tolerance": 2 }),
            ),
            "nano-banana" => ("google/nano-banana", json!({ "prompt": prompt, "aspect_ratio": "4:3", "output_format": "jpg" })),
            "nano-banana-pro" => ("google/nano-banana-pro", json!({ "prompt": prompt, "aspect_ratio": "4:3", "output_format": "jpg" })),
            // imagen-3 and any unrecognized key fall back to the same defensive shape.
            _ => (
                "google/imagen-3-fast",
                json!({ "prompt": prompt, "num_outputs": 1, "aspect_ratio": "4:3", "output_format": "jpg", "output_quality": 80, "prompt_upsampling": true, "safety_tolerance": 2 }),
            ),
        }
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let bytes = with_backoff(self.max_api_retries, Duration::from_millis(500), |_: &reqwest::Error| true, || async {
            Ok::<_, reqwest::Error>(self.http.get(url).send().await?.error_for_status()?.bytes().await?.to_vec())
        })
        .await?;
        Ok(bytes)
    }

    fn extract_output_url(prediction: &Value) -> String {
        match &prediction["output"] {
            Value::Array(items) => items.last().and_then(Value::as_str).unwrap_or("").to_string(),
            Value::String(s) => s.clone(),
            _ => String::new(),
        }
    }

    async fn finish(&self, prediction: Value, model_path: String) -> Result<GeneratedImage, EngineError> {
        let status = prediction["status"].as_str().unwrap_or("");
        if status != "succeeded" {
            return Err(EngineError::ProviderFailure(format!("prediction status: {status}")));
        }
        let origin_url = Self::extract_output_url(&prediction);
        if origin_url.is_empty() {
            return Err(EngineError::ContractViolation("prediction succeeded with no output url".to_string()));
        }
        let bytes = self.download_image(&origin_url).await?;
        Ok(GeneratedImage { origin_url, bytes, mime_type: "image/jpeg".to_string(), model_name: model_path })
    }
}

#[async_trait]
impl ImageGenClient for ReplicateImageGenClient {
    async fn generate_draft(&self, prompt_text: &str) -> Result<GeneratedImage, EngineError> {
        let payload = json!({ "prompt": prompt_text, "output_format": "jpg" });
        let (prediction, model_path) = self.run_prediction("black-forest-labs/flux-schnell", &payload).await?;
        self.finish(prediction, model_path).await
    }

    async fn generate_stage3(&self, prompt_text: &str, model_name: &str) -> Result<GeneratedImage, EngineError> {
        let model_key = normalize_generation_model(model_name);
        let (model_path, payload) = Self::stage3_request(&model_key, prompt_text);
        let (prediction, resolved_path) = self.run_prediction(model_path, &payload).await?;
        self.finish(prediction, resolved_path).await
    }

    async fn remove_background_to_white(&self, image_bytes: &[u8], mime_type: &str) -> Result<GeneratedImage, EngineError> {
        let data_uri = format!("data:{mime_type};base64,{}", base64::engine::general_purpose::STANDARD.encode(image_bytes));
        let payload = json!({
            "prompt": "remove the background - keep only the important elements of the image and make the background white. Do not add text in the image.",
            "image_input": [data_uri],
            "aspect_ratio": "match_input_image",
            "output_format": "jpg",
        });
        let (prediction, model_path) = self.run_prediction("google/nano-banana", &payload).await?;
        self.finish(prediction, model_path).await
    }
}
