//! In-memory fakes for `Repository`, `PromptAssistantClient`, and
//! `ImageGenClient` — no real database or network touches these tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use aac_core::provider::{GeneratedImage, GeneratedPrompt, ImageAnalysis, ImageGenClient, PromptAssistantClient, QualityVerdict};
use aac_core::repository::{EntryFilter, ExportFilter, ExportUpdate, Repository, RunFilter, RunUpdate, RuntimeConfigUpdate, StageResultInput};
use aac_core::EngineError;
use aac_domain::abstract_semantics::AbstractIntent;
use aac_domain::entry::{deterministic_entry_id, source_row_hash, EntryPayload};
use aac_domain::run::{Run, RunStatus, Stage};
use aac_domain::{Asset, Entry, Export, ExportStatus, Prompt, RuntimeConfig, Score, StageResult};

#[derive(Default)]
pub struct FakeRepository {
    entries: Mutex<HashMap<String, Entry>>,
    runs: Mutex<HashMap<String, Run>>,
    stage_results: Mutex<Vec<StageResult>>,
    prompts: Mutex<Vec<Prompt>>,
    assets: Mutex<Vec<Asset>>,
    scores: Mutex<Vec<Score>>,
    runtime_config: Mutex<Option<RuntimeConfig>>,
    exports: Mutex<HashMap<String, Export>>,
}

impl FakeRepository {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { runtime_config: Mutex::new(Some(config)), ..Default::default() }
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn create_entry(&self, payload: EntryPayload) -> Result<Entry, EngineError> {
        let id = deterministic_entry_id(&payload.word, &payload.part_of_speech, &payload.category);
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries.get(&id) {
            return Ok(existing.clone());
        }
        let now = chrono::Utc::now();
        let row_hash = source_row_hash(&payload);
        let entry = Entry {
            id: id.clone(),
            word: payload.word,
            part_of_speech: payload.part_of_speech,
            category: payload.category,
            context: payload.context,
            person_preference: payload.person_preference,
            batch: payload.batch,
            source_row_hash: row_hash,
            created_at: now,
            updated_at: now,
        };
        entries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, entry_id: &str) -> Result<Option<Entry>, EngineError> {
        Ok(self.entries.lock().unwrap().get(entry_id).cloned())
    }

    async fn list_entries(&self, _filter: EntryFilter) -> Result<Vec<(Entry, Option<Run>)>, EngineError> {
        Ok(self.entries.lock().unwrap().values().cloned().map(|e| (e, None)).collect())
    }

    async fn create_runs(&self, entry_ids: &[String], quality_threshold: i32, max_optimization_attempts: i32) -> Result<Vec<Run>, EngineError> {
        let mut runs = self.runs.lock().unwrap();
        let mut created = Vec::new();
        for entry_id in entry_ids {
            let run = Run::new(entry_id.clone(), quality_threshold, max_optimization_attempts);
            runs.insert(run.id.clone(), run.clone());
            created.push(run);
        }
        Ok(created)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, EngineError> {
        Ok(self.runs.lock().unwrap().get(run_id).cloned())
    }

    async fn list_runs(&self, _filter: RunFilter) -> Result<Vec<Run>, EngineError> {
        Ok(self.runs.lock().unwrap().values().cloned().collect())
    }

    async fn claim_next_queued_run(&self) -> Result<Option<Run>, EngineError> {
        let mut runs = self.runs.lock().unwrap();
        let claimable_id = runs.values().filter(|r| r.status.is_claimable()).min_by_key(|r| r.created_at).map(|r| r.id.clone());
        let Some(id) = claimable_id else { return Ok(None) };
        let run = runs.get_mut(&id).unwrap();
        run.current_stage = run.retry_from_stage.unwrap_or(run.current_stage);
        run.status = RunStatus::Running;
        Ok(Some(run.clone()))
    }

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<Run, EngineError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| EngineError::NotFound(run_id.to_string()))?;
        if let Some(v) = update.status {
            run.status = v;
        }
        if let Some(v) = update.current_stage {
            run.current_stage = v;
        }
        if let Some(v) = update.retry_from_stage {
            run.retry_from_stage = v;
        }
        if let Some(v) = update.quality_score {
            run.quality_score = v;
        }
        if let Some(v) = update.optimization_attempt {
            run.optimization_attempt = v;
        }
        if let Some(v) = update.technical_retry_count {
            run.technical_retry_count = v;
        }
        if let Some(v) = update.review_warning {
            run.review_warning = v;
        }
        if let Some(v) = update.review_warning_reason {
            run.review_warning_reason = v;
        }
        if let Some(v) = update.error_detail {
            run.error_detail = v;
        }
        run.updated_at = chrono::Utc::now();
        Ok(run.clone())
    }

    async fn retry_run_from_last_failure(&self, run_id: &str) -> Result<Run, EngineError> {
        let last_failed_stage = self
            .stage_results
            .lock()
            .unwrap()
            .iter()
            .filter(|sr| sr.run_id == run_id && matches!(sr.status, aac_domain::StageStatus::Error | aac_domain::StageStatus::Failed | aac_domain::StageStatus::Timeout))
            .max_by_key(|sr| sr.created_at)
            .map(|sr| sr.stage_name);

        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(run_id).ok_or_else(|| EngineError::NotFound(run_id.to_string()))?;
        run.retry_from_stage = Some(last_failed_stage.unwrap_or(Stage::Stage1Prompt));
        run.status = RunStatus::RetryQueued;
        Ok(run.clone())
    }

    async fn add_stage_result(&self, input: StageResultInput) -> Result<StageResult, EngineError> {
        let idempotency_key = StageResult::idempotency_key(&input.run_id, input.stage_name, input.attempt);
        let mut stage_results = self.stage_results.lock().unwrap();
        if let Some(existing) = stage_results.iter_mut().find(|sr| sr.idempotency_key == idempotency_key) {
            existing.status = input.status;
            existing.request_json = input.request_json;
            existing.response_json = input.response_json;
            existing.error_detail = input.error_detail;
            return Ok(existing.clone());
        }
        let result = StageResult::new(input.run_id, input.stage_name, input.attempt, input.status, input.request_json, input.response_json, input.error_detail);
        stage_results.push(result.clone());
        Ok(result)
    }

    async fn add_prompt(&self, run_id: &str, stage_name: Stage, attempt: i32, prompt_text: &str, needs_person: &str, source: &str, raw_response_json: Value) -> Result<Prompt, EngineError> {
        let prompt = Prompt::new(run_id.to_string(), stage_name, attempt, prompt_text.to_string(), needs_person.to_string(), source.to_string(), raw_response_json);
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(prompt)
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_asset(&self, run_id: &str, stage_name: Stage, attempt: i32, file_name: &str, abs_path: &str, mime_type: &str, sha256: &str, width: i32, height: i32, origin_url: &str, model_name: &str) -> Result<Asset, EngineError> {
        let asset = Asset::new(run_id.to_string(), stage_name, attempt, file_name.to_string(), abs_path.to_string(), mime_type.to_string(), sha256.to_string(), width, height, origin_url.to_string(), model_name.to_string());
        self.assets.lock().unwrap().push(asset.clone());
        Ok(asset)
    }

    async fn add_score(&self, run_id: &str, attempt: i32, score_0_100: f64, pass_fail: bool, rubric_json: Value) -> Result<Score, EngineError> {
        let score = Score::new(run_id.to_string(), attempt, score_0_100, pass_fail, rubric_json);
        self.scores.lock().unwrap().push(score.clone());
        Ok(score)
    }

    async fn latest_prompt(&self, run_id: &str, stage_name: Stage) -> Result<Option<Prompt>, EngineError> {
        Ok(self.prompts.lock().unwrap().iter().rev().find(|p| p.run_id == run_id && p.stage_name == stage_name).cloned())
    }

    async fn latest_asset(&self, run_id: &str, stage_name: Stage) -> Result<Option<Asset>, EngineError> {
        Ok(self.assets.lock().unwrap().iter().rev().find(|a| a.run_id == run_id && a.stage_name == stage_name).cloned())
    }

    async fn asset_for_attempt(&self, run_id: &str, stage_name: Stage, attempt: i32) -> Result<Option<Asset>, EngineError> {
        Ok(self.assets.lock().unwrap().iter().rev().find(|a| a.run_id == run_id && a.stage_name == stage_name && a.attempt == attempt).cloned())
    }

    async fn get_runtime_config(&self) -> Result<RuntimeConfig, EngineError> {
        Ok(self.runtime_config.lock().unwrap().clone().unwrap_or_default())
    }

    async fn update_runtime_config(&self, update: RuntimeConfigUpdate) -> Result<RuntimeConfig, EngineError> {
        let mut guard = self.runtime_config.lock().unwrap();
        let mut config = guard.clone().unwrap_or_default();
        if let Some(v) = update.quality_threshold {
            config.quality_threshold = v;
        }
        if let Some(v) = update.max_optimization_loops {
            config.max_optimization_loops = v;
        }
        if let Some(v) = update.max_api_retries {
            config.max_api_retries = v;
        }
        if let Some(v) = update.stage_retry_limit {
            config.stage_retry_limit = v;
        }
        if let Some(v) = update.worker_poll_seconds {
            config.worker_poll_seconds = v;
        }
        if let Some(v) = update.max_parallel_runs {
            config.max_parallel_runs = v;
        }
        if let Some(v) = update.flux_imagen_fallback_enabled {
            config.flux_imagen_fallback_enabled = v;
        }
        if let Some(v) = update.assistant_id {
            config.assistant_id = v;
        }
        if let Some(v) = update.assistant_name {
            config.assistant_name = v;
        }
        if let Some(v) = update.model_critique {
            config.model_critique = v;
        }
        if let Some(v) = update.model_generation {
            config.model_generation = v;
        }
        if let Some(v) = update.model_quality_gate {
            config.model_quality_gate = v;
        }
        config.normalize();
        *guard = Some(config.clone());
        Ok(config)
    }

    async fn create_export(&self, filter_json: Value) -> Result<Export, EngineError> {
        let export = Export::new(filter_json);
        self.exports.lock().unwrap().insert(export.id.clone(), export.clone());
        Ok(export)
    }

    async fn update_export(&self, export_id: &str, update: ExportUpdate) -> Result<Export, EngineError> {
        let mut exports = self.exports.lock().unwrap();
        let export = exports.get_mut(export_id).ok_or_else(|| EngineError::NotFound(export_id.to_string()))?;
        if let Some(v) = update.csv_path {
            export.csv_path = Some(v);
        }
        if let Some(v) = update.zip_path {
            export.zip_path = Some(v);
        }
        if let Some(v) = update.manifest_path {
            export.manifest_path = Some(v);
        }
        if let Some(v) = update.status {
            export.status = v;
        }
        if let Some(v) = update.error_detail {
            export.error_detail = v;
        }
        Ok(export.clone())
    }

    async fn get_export(&self, export_id: &str) -> Result<Option<Export>, EngineError> {
        Ok(self.exports.lock().unwrap().get(export_id).cloned())
    }

    async fn list_runs_for_export(&self, _filter: ExportFilter) -> Result<Vec<(Run, Entry)>, EngineError> {
        let runs = self.runs.lock().unwrap();
        let entries = self.entries.lock().unwrap();
        Ok(runs.values().filter_map(|r| entries.get(&r.entry_id).map(|e| (r.clone(), e.clone()))).collect())
    }
}

/// Returns a fixed image-gen response and a scripted sequence of quality
/// scores, one per optimization attempt (recycling the last if the loop
/// asks for more attempts than were scripted).
pub struct ScriptedAssistantClient {
    pub scores: Vec<f64>,
    call_count: AtomicI32,
}

impl ScriptedAssistantClient {
    pub fn new(scores: Vec<f64>) -> Self {
        Self { scores, call_count: AtomicI32::new(0) }
    }
}

#[async_trait]
impl PromptAssistantClient for ScriptedAssistantClient {
    async fn generate_first_prompt(&self, _entry: &Entry, _abstract_intent: Option<&AbstractIntent>) -> Result<GeneratedPrompt, EngineError> {
        Ok(GeneratedPrompt { prompt_text: "a simple concept image".to_string(), needs_person: "no".to_string(), raw_response_json: json!({}) })
    }

    async fn generate_upgraded_prompt(&self, _entry: &Entry, _previous_prompt: &str, _critique: &ImageAnalysis, _abstract_intent: Option<&AbstractIntent>) -> Result<GeneratedPrompt, EngineError> {
        Ok(GeneratedPrompt { prompt_text: "an upgraded concept image".to_string(), needs_person: String::new(), raw_response_json: json!({}) })
    }

    async fn analyze_image(&self, _entry: &Entry, _image_bytes: &[u8], _mime_type: &str, _model: &str) -> Result<ImageAnalysis, EngineError> {
        Ok(ImageAnalysis { challenges: "slightly ambiguous".to_string(), recommendations: "simplify background".to_string(), raw_response_json: json!({}) })
    }

    async fn score_image(&self, _entry: &Entry, _image_bytes: &[u8], _mime_type: &str, _abstract_intent: Option<&AbstractIntent>, threshold: f64, _model: &str) -> Result<QualityVerdict, EngineError> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
        let score = *self.scores.get(index).unwrap_or_else(|| self.scores.last().unwrap());
        Ok(QualityVerdict { score_0_100: score, pass_fail: score >= threshold, rubric_json: json!({ "rubric": { "explanation": format!("scored {score}") } }) })
    }
}

pub struct FakeImageGenClient;

#[async_trait]
impl ImageGenClient for FakeImageGenClient {
    async fn generate_draft(&self, _prompt_text: &str) -> Result<GeneratedImage, EngineError> {
        Ok(GeneratedImage { origin_url: "https://example.test/draft.jpg".to_string(), bytes: tiny_jpeg(), mime_type: "image/jpeg".to_string(), model_name: "flux-schnell".to_string() })
    }

    async fn generate_stage3(&self, _prompt_text: &str, model_name: &str) -> Result<GeneratedImage, EngineError> {
        Ok(GeneratedImage { origin_url: "https://example.test/stage3.jpg".to_string(), bytes: tiny_jpeg(), mime_type: "image/jpeg".to_string(), model_name: model_name.to_string() })
    }

    async fn remove_background_to_white(&self, _image_bytes: &[u8], _mime_type: &str) -> Result<GeneratedImage, EngineError> {
        Ok(GeneratedImage { origin_url: "https://example.test/white_bg.jpg".to_string(), bytes: tiny_jpeg(), mime_type: "image/jpeg".to_string(), model_name: "nano-banana".to_string() })
    }
}

/// A minimal valid 1x1 JPEG so `image::io::Reader` can read real dimensions.
pub fn tiny_jpeg() -> Vec<u8> {
    include_bytes!("tiny.jpg").to_vec()
}

pub fn sample_entry_payload() -> EntryPayload {
    EntryPayload { word: "apple".to_string(), part_of_speech: "noun".to_string(), category: "food".to_string(), context: String::new(), person_preference: String::new(), batch: "b1".to_string() }
}
