//! HTTP implementation of `PromptAssistantClient` against an
//! OpenAI-assistants-v2-shaped API: thread/run/poll dance, `analyze_image`/
//! `score_image` request shapes (including the abstract-mode rubric branch),
//! on top of `reqwest` + the engine's `with_backoff`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use aac_core::provider::{GeneratedPrompt, ImageAnalysis, PromptAssistantClient, QualityVerdict};
use aac_core::retry::with_backoff;
use aac_core::EngineError;
use aac_domain::abstract_semantics::AbstractIntent;
use aac_domain::Entry;

use crate::json_relaxed::parse_json_relaxed;
use crate::prompt_templates::{build_stage1_prompt, build_stage3_prompt};

const MAX_RUN_POLL_SECONDS: u64 = 300;

pub struct OpenAiAssistantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
    max_api_retries: u32,
}

impl OpenAiAssistantClient {
    pub fn new(base_url: String, api_key: String, assistant_id: String, max_api_retries: u32) -> Self {
        Self { http: reqwest::Client::new(), base_url, api_key, assistant_id, max_api_retries }
    }

    fn headers(&self, assistants_v2: bool) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.api_key).parse().unwrap());
        headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().unwrap());
        if assistants_v2 {
            headers.insert("OpenAI-Beta", "assistants=v2".parse().unwrap());
        }
        headers
    }

    async fn post_json(&self, path: &str, body: &Value, assistants_v2: bool) -> Result<Value, EngineError> {
        let url = format!("{}{path}", self.base_url);
        with_backoff(self.max_api_retries, Duration::from_millis(500), |_: &reqwest::Error| true, || async {
            self.http.post(&url).headers(self.headers(assistants_v2)).json(body).send().await?.error_for_status()?.json::<Value>().await
        })
        .await
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)], assistants_v2: bool) -> Result<Value, EngineError> {
        let url = format!("{}{path}", self.base_url);
        with_backoff(self.max_api_retries, Duration::from_millis(500), |_: &reqwest::Error| true, || async {
            self.http.get(&url).headers(self.headers(assistants_v2)).query(query).send().await?.error_for_status()?.json::<Value>().await
        })
        .await
    }

    async fn create_thread(&self, message: &str) -> Result<String, EngineError> {
        let body = json!({ "messages": [{ "role": "user", "content": message }] });
        let data = self.post_json("/threads", &body, true).await?;
        data["id"].as_str().map(str::to_string).ok_or_else(|| EngineError::ContractViolation("thread response missing id".to_string()))
    }

    async fn create_run(&self, thread_id: &str) -> Result<String, EngineError> {
        let body = json!({ "assistant_id": self.assistant_id });
        let data = self.post_json(&format!("/threads/{thread_id}/runs"), &body, true).await?;
        data["id"].as_str().map(str::to_string).ok_or_else(|| EngineError::ContractViolation("run response missing id".to_string()))
    }

    async fn poll_run(&self, thread_id: &str, run_id: &str) -> Result<String, EngineError> {
        let started = tokio::time::Instant::now();
        loop {
            let run = self.get_json(&format!("/threads/{thread_id}/runs/{run_id}"), &[], true).await?;
            let status = run["status"].as_str().unwrap_or("").to_string();
            if matches!(status.as_str(), "completed" | "failed" | "cancelled" | "expired") {
                return Ok(status);
            }
            if started.elapsed().as_secs() > MAX_RUN_POLL_SECONDS {
                return Ok("timeout".to_string());
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    async fn latest_assistant_text(&self, thread_id: &str) -> Result<String, EngineError> {
        let payload = self.get_json(&format!("/threads/{thread_id}/messages"), &[("limit", "1".to_string()), ("order", "desc".to_string()), ("role", "assistant".to_string())], true).await?;
        let items = payload["data"].as_array().cloned().unwrap_or_default();
        let Some(first) = items.first() else { return Ok(String::new()) };
        let texts: Vec<String> = first["content"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|part| part["type"] == "text")
            .filter_map(|part| part["text"]["value"].as_str().map(str::to_string))
            .collect();
        Ok(texts.join("\n").trim().to_string())
    }

    async fn assistant_json(&self, user_text: &str) -> Result<(Value, Value), EngineError> {
        let thread_id = self.create_thread(user_text).await?;
        let run_id = self.create_run(&thread_id).await?;
        let status = self.poll_run(&thread_id, &run_id).await?;
        if status != "completed" {
            return Err(EngineError::ProviderFailure(format!("assistant run status: {status}")));
        }
        let raw_text = self.latest_assistant_text(&thread_id).await?;
        let parsed = parse_json_relaxed(&raw_text);
        Ok((parsed, json!({ "thread_id": thread_id, "run_id": run_id, "raw_text": raw_text })))
    }

    fn to_data_uri(image_bytes: &[u8], mime_type: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        format!("data:{mime_type};base64,{encoded}")
    }

    async fn chat_completion_with_image(&self, prompt: &str, image_bytes: &[u8], mime_type: &str, temperature: f64, model: &str) -> Result<(Value, Value), EngineError> {
        let image_data_uri = Self::to_data_uri(image_bytes, mime_type);
        let body = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_data_uri } },
                ],
            }],
            "temperature": temperature,
        });
        let response = self.post_json("/chat/completions", &body, false).await?;
        let content = response["choices"][0]["message"]["content"].as_str().ok_or_else(|| EngineError::ContractViolation("chat completion missing message content".to_string()))?.to_string();
        let parsed = parse_json_relaxed(&content);
        Ok((parsed, json!({ "raw_response": response, "raw_text": content })))
    }
}

#[async_trait]
impl PromptAssistantClient for OpenAiAssistantClient {
    async fn generate_first_prompt(&self, entry: &Entry, abstract_intent: Option<&AbstractIntent>) -> Result<GeneratedPrompt, EngineError> {
        let user_text = build_stage1_prompt(entry, abstract_intent);
        let (parsed, raw) = self.assistant_json(&user_text).await?;
        let prompt_text = parsed["first prompt"].as_str().ok_or_else(|| EngineError::ContractViolation("missing 'first prompt'".to_string()))?.to_string();
        let needs_person = parsed["need a person"].as_str().unwrap_or("no").to_string();
        Ok(GeneratedPrompt { prompt_text, needs_person, raw_response_json: raw })
    }

    async fn generate_upgraded_prompt(
        &self,
        entry: &Entry,
        previous_prompt: &str,
        critique: &ImageAnalysis,
        abstract_intent: Option<&AbstractIntent>,
    ) -> Result<GeneratedPrompt, EngineError> {
        let user_text = build_stage3_prompt(entry, previous_prompt, &critique.challenges, &critique.recommendations, abstract_intent);
        let (parsed, raw) = self.assistant_json(&user_text).await?;
        let prompt_text = parsed["upgraded prompt"].as_str().ok_or_else(|| EngineError::ContractViolation("missing 'upgraded prompt'".to_string()))?.to_string();
        Ok(GeneratedPrompt { prompt_text, needs_person: String::new(), raw_response_json: raw })
    }

    async fn analyze_image(&self, entry: &Entry, image_bytes: &[u8], mime_type: &str, model: &str) -> Result<ImageAnalysis, EngineError> {
        let prompt = format!(
            "You are an expert AAC visual designer for children. \
             Analyze the image for concept clarity. Return STRICT JSON with keys \
             {{\"challenges\":\"...\", \"recommendations\":\"...\"}}. \
             Word: {word}. Part of sentence: {pos}. Category: {category}.",
            word = entry.word,
            pos = entry.part_of_speech,
            category = entry.category,
        );
        let (parsed, raw) = self.chat_completion_with_image(&prompt, image_bytes, mime_type, 0.2, model).await?;
        let challenges = parsed["challenges"].as_str().unwrap_or_default().to_string();
        let recommendations = parsed["recommendations"].as_str().unwrap_or_default().to_string();
        Ok(ImageAnalysis { challenges, recommendations, raw_response_json: raw })
    }

    async fn score_image(&self, entry: &Entry, image_bytes: &[u8], mime_type: &str, abstract_intent: Option<&AbstractIntent>, threshold: f64, model: &str) -> Result<QualityVerdict, EngineError> {
        let abstract_mode = abstract_intent.map(|i| i.is_abstract).unwrap_or(false);
        let prompt = if abstract_mode {
            let contrast_subject = abstract_intent.map(|i| i.contrast_subject.as_str()).unwrap_or("");
            format!(
                "Score this AAC image for an abstract/ambiguous concept. Return STRICT JSON with fields: \
                 {{\"score\":0-100, \"contrast_clarity\":0-5, \"absence_signal_strength\":0-5, \"aac_interpretability\":0-5, \
                 \"explanation\":\"...\", \"failure_tags\":[\"ambiguity\",\"clutter\",\"wrong_concept\",\"text_in_image\",\"distracting_details\"]}}. \
                 Word: {word}. Part of sentence: {pos}. Category: {category}. Contrast subject: {contrast_subject}.",
                word = entry.word,
                pos = entry.part_of_speech,
                category = entry.category,
            )
        } else {
            format!(
                "Score the AAC concept image quality for a child user. Return STRICT JSON with fields: \
                 {{\"score\":0-100, \"explanation\":\"...\", \"failure_tags\":[\"ambiguity\",\"clutter\",\"wrong_concept\",\"text_in_image\",\"distracting_details\"]}}. \
                 Word: {word}. Part of sentence: {pos}. Category: {category}.",
                word = entry.word,
                pos = entry.part_of_speech,
                category = entry.category,
            )
        };

        let (mut parsed, raw) = self.chat_completion_with_image(&prompt, image_bytes, mime_type, 0.1, model).await?;

        let rubric = if abstract_mode {
            normalize_abstract_rubric(&mut parsed);
            parsed
        } else {
            if parsed.get("score").is_none() {
                parsed["score"] = json!(0);
            }
            parsed
        };

        let score_0_100 = rubric["score"].as_f64().unwrap_or(0.0);
        let pass_fail = if abstract_mode {
            let contrast_clarity = rubric["contrast_clarity"].as_f64().unwrap_or(0.0);
            let absence_signal_strength = rubric["absence_signal_strength"].as_f64().unwrap_or(0.0);
            score_0_100 >= threshold && contrast_clarity >= 4.0 && absence_signal_strength >= 4.0
        } else {
            score_0_100 >= threshold
        };

        Ok(QualityVerdict { score_0_100, pass_fail, rubric_json: json!({ "rubric": rubric, "raw": raw }) })
    }
}

fn normalize_abstract_rubric(parsed: &mut Value) {
    for field in ["score", "contrast_clarity", "absence_signal_strength", "aac_interpretability"] {
        let value = parsed.get(field).and_then(Value::as_f64).unwrap_or(0.0);
        parsed[field] = json!(value);
    }
    if !parsed["failure_tags"].is_array() {
        parsed["failure_tags"] = json!([]);
    }
    if parsed.get("explanation").is_none() {
        parsed["explanation"] = json!("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_abstract_rubric_fills_defaults() {
        let mut parsed = json!({ "score": "not-a-number" });
        normalize_abstract_rubric(&mut parsed);
        assert_eq!(parsed["score"], 0.0);
        assert_eq!(parsed["failure_tags"], json!([]));
        assert_eq!(parsed["explanation"], "");
    }

    #[test]
    fn normalize_abstract_rubric_preserves_numeric_fields() {
        let mut parsed = json!({ "score": 91, "contrast_clarity": 5, "absence_signal_strength": 4, "aac_interpretability": 5 });
        normalize_abstract_rubric(&mut parsed);
        assert_eq!(parsed["contrast_clarity"], 5.0);
    }
}
