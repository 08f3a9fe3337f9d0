//! Repository contract: typed accessors over the durable state store,
//! including the two operations central to the engine: `claim_next_queued_run`
//! and `add_stage_result`.

use async_trait::async_trait;
use serde_json::Value;

use aac_domain::{Asset, Entry, Export, ExportStatus, Prompt, Run, RunStatus, RuntimeConfig, Score, Stage, StageResult, StageStatus};
use aac_domain::entry::EntryPayload;

use crate::errors::EngineError;

/// Filters accepted by `list_entries`.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub word: Option<String>,
    pub part_of_speech: Option<String>,
    pub category: Option<String>,
    pub batch: Option<String>,
    pub status: Option<RunStatus>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub entry_id: Option<String>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub entry_ids: Option<Vec<String>>,
    pub run_ids: Option<Vec<String>>,
    pub status: Option<Vec<RunStatus>>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
}

/// A sparse patch applied to a `Run` row (mirrors the Python repository's
/// `update_run(run, **updates)` kwargs pattern with Rust's type safety).
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub current_stage: Option<Stage>,
    pub retry_from_stage: Option<Option<Stage>>,
    pub quality_score: Option<Option<f64>>,
    pub optimization_attempt: Option<i32>,
    pub technical_retry_count: Option<i32>,
    pub review_warning: Option<bool>,
    pub review_warning_reason: Option<String>,
    pub error_detail: Option<String>,
}

impl RunUpdate {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn status(mut self, v: RunStatus) -> Self {
        self.status = Some(v);
        self
    }
    pub fn current_stage(mut self, v: Stage) -> Self {
        self.current_stage = Some(v);
        self
    }
    pub fn retry_from_stage(mut self, v: Option<Stage>) -> Self {
        self.retry_from_stage = Some(v);
        self
    }
    pub fn quality_score(mut self, v: Option<f64>) -> Self {
        self.quality_score = Some(v);
        self
    }
    pub fn optimization_attempt(mut self, v: i32) -> Self {
        self.optimization_attempt = Some(v);
        self
    }
    pub fn technical_retry_count(mut self, v: i32) -> Self {
        self.technical_retry_count = Some(v);
        self
    }
    pub fn review_warning(mut self, v: bool, reason: impl Into<String>) -> Self {
        self.review_warning = Some(v);
        self.review_warning_reason = Some(reason.into());
        self
    }
    pub fn error_detail(mut self, v: impl Into<String>) -> Self {
        self.error_detail = Some(v.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigUpdate {
    pub quality_threshold: Option<i32>,
    pub max_optimization_loops: Option<i32>,
    pub max_api_retries: Option<i32>,
    pub stage_retry_limit: Option<i32>,
    pub worker_poll_seconds: Option<i32>,
    pub max_parallel_runs: Option<i32>,
    pub flux_imagen_fallback_enabled: Option<bool>,
    pub assistant_id: Option<String>,
    pub assistant_name: Option<String>,
    pub model_critique: Option<String>,
    pub model_generation: Option<String>,
    pub model_quality_gate: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExportUpdate {
    pub csv_path: Option<String>,
    pub zip_path: Option<String>,
    pub manifest_path: Option<String>,
    pub status: Option<ExportStatus>,
    pub error_detail: Option<String>,
}

/// Everything a stage needs to append a `StageResult` row.
pub struct StageResultInput {
    pub run_id: String,
    pub stage_name: Stage,
    pub attempt: i32,
    pub status: StageStatus,
    pub request_json: Value,
    pub response_json: Value,
    pub error_detail: String,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // -- Entries --------------------------------------------------------
    async fn create_entry(&self, payload: EntryPayload) -> Result<Entry, EngineError>;
    async fn get_entry(&self, entry_id: &str) -> Result<Option<Entry>, EngineError>;
    async fn list_entries(&self, filter: EntryFilter) -> Result<Vec<(Entry, Option<Run>)>, EngineError>;

    // -- Runs -------------------------------------------------------------
    async fn create_runs(&self, entry_ids: &[String], quality_threshold: i32, max_optimization_attempts: i32) -> Result<Vec<Run>, EngineError>;
    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, EngineError>;
    async fn list_runs(&self, filter: RunFilter) -> Result<Vec<Run>, EngineError>;

    /// Atomically claims the oldest queued/retry_queued run. Must
    /// be implemented as a single conditional UPDATE; returns `None` if
    /// another worker won the race.
    async fn claim_next_queued_run(&self) -> Result<Option<Run>, EngineError>;

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<Run, EngineError>;

    /// Sets `retry_from_stage` to the most recently failed stage (or
    /// `stage1_prompt` if none) and `status` to `retry_queued`.
    async fn retry_run_from_last_failure(&self, run_id: &str) -> Result<Run, EngineError>;

    // -- Stage results (upsert keyed by run/stage/attempt) ---------------
    async fn add_stage_result(&self, input: StageResultInput) -> Result<StageResult, EngineError>;

    // -- Append-only artifacts --------------------------------------------
    #[allow(clippy::too_many_arguments)]
    async fn add_prompt(&self, run_id: &str, stage_name: Stage, attempt: i32, prompt_text: &str, needs_person: &str, source: &str, raw_response_json: Value) -> Result<Prompt, EngineError>;

    #[allow(clippy::too_many_arguments)]
    async fn add_asset(&self, run_id: &str, stage_name: Stage, attempt: i32, file_name: &str, abs_path: &str, mime_type: &str, sha256: &str, width: i32, height: i32, origin_url: &str, model_name: &str) -> Result<Asset, EngineError>;

    async fn add_score(&self, run_id: &str, attempt: i32, score_0_100: f64, pass_fail: bool, rubric_json: Value) -> Result<Score, EngineError>;

    async fn latest_prompt(&self, run_id: &str, stage_name: Stage) -> Result<Option<Prompt>, EngineError>;
    async fn latest_asset(&self, run_id: &str, stage_name: Stage) -> Result<Option<Asset>, EngineError>;
    async fn asset_for_attempt(&self, run_id: &str, stage_name: Stage, attempt: i32) -> Result<Option<Asset>, EngineError>;

    // -- Runtime config ----------------------------------------------------
    async fn get_runtime_config(&self) -> Result<RuntimeConfig, EngineError>;
    async fn update_runtime_config(&self, update: RuntimeConfigUpdate) -> Result<RuntimeConfig, EngineError>;

    // -- Export -------------------------------------------------------------
    async fn create_export(&self, filter_json: Value) -> Result<Export, EngineError>;
    async fn update_export(&self, export_id: &str, update: ExportUpdate) -> Result<Export, EngineError>;
    async fn get_export(&self, export_id: &str) -> Result<Option<Export>, EngineError>;
    async fn list_runs_for_export(&self, filter: ExportFilter) -> Result<Vec<(Run, Entry)>, EngineError>;
}
