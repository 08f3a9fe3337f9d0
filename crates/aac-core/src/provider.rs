//! Provider contracts. `aac-pipeline` depends only on these traits;
//! `aac-providers` supplies the HTTP implementations, and tests supply fakes.

use async_trait::async_trait;
use serde_json::Value;

use aac_domain::abstract_semantics::AbstractIntent;
use aac_domain::Entry;

use crate::errors::EngineError;

/// Output of a prompt-generation call: the text to hand to the image
/// generator, whether the assistant judged the concept needs a person in
/// frame, and the raw response for audit storage.
#[derive(Debug, Clone)]
pub struct GeneratedPrompt {
    pub prompt_text: String,
    pub needs_person: String,
    pub raw_response_json: Value,
}

#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub challenges: String,
    pub recommendations: String,
    pub raw_response_json: Value,
}

#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub score_0_100: f64,
    pub pass_fail: bool,
    pub rubric_json: Value,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub origin_url: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub model_name: String,
}

/// The assistant-backed text service: first-draft prompts, critique-driven
/// rewrites, image analysis, and quality scoring all go through one
/// conversational assistant in the original system, so one trait covers all
/// four.
#[async_trait]
pub trait PromptAssistantClient: Send + Sync {
    async fn generate_first_prompt(&self, entry: &Entry, abstract_intent: Option<&AbstractIntent>) -> Result<GeneratedPrompt, EngineError>;

    async fn generate_upgraded_prompt(
        &self,
        entry: &Entry,
        previous_prompt: &str,
        critique: &ImageAnalysis,
        abstract_intent: Option<&AbstractIntent>,
    ) -> Result<GeneratedPrompt, EngineError>;

    async fn analyze_image(&self, entry: &Entry, image_bytes: &[u8], mime_type: &str, model: &str) -> Result<ImageAnalysis, EngineError>;

    async fn score_image(&self, entry: &Entry, image_bytes: &[u8], mime_type: &str, abstract_intent: Option<&AbstractIntent>, threshold: f64, model: &str) -> Result<QualityVerdict, EngineError>;
}

/// The image-generation/editing service: draft, upgrade, and background
/// removal are three independently-modelled calls because each can target a
/// different underlying model.
#[async_trait]
pub trait ImageGenClient: Send + Sync {
    async fn generate_draft(&self, prompt_text: &str) -> Result<GeneratedImage, EngineError>;

    async fn generate_stage3(&self, prompt_text: &str, model_name: &str) -> Result<GeneratedImage, EngineError>;

    async fn remove_background_to_white(&self, image_bytes: &[u8], mime_type: &str) -> Result<GeneratedImage, EngineError>;
}
