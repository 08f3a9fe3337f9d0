//! Raw row shapes as sqlx sees them (status/stage columns are `TEXT`, not
//! native enums) and their conversions into `aac-domain` entities.

use std::str::FromStr;

use aac_domain::entry::EntryPayload;
use aac_domain::run::{RunStatus, Stage};
use aac_domain::stage_result::StageStatus;
use aac_domain::{Asset, Entry, Export, ExportStatus, Prompt, Run, RuntimeConfig, Score, StageResult};

use crate::error::PersistenceError;

#[derive(sqlx::FromRow)]
pub struct EntryRow {
    pub id: String,
    pub word: String,
    pub part_of_speech: String,
    pub category: String,
    pub context: String,
    pub person_preference: String,
    pub batch: String,
    pub source_row_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<EntryRow> for Entry {
    fn from(r: EntryRow) -> Self {
        Entry {
            id: r.id,
            word: r.word,
            part_of_speech: r.part_of_speech,
            category: r.category,
            context: r.context,
            person_preference: r.person_preference,
            batch: r.batch,
            source_row_hash: r.source_row_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Builds an `EntryRow` shape from a payload for insertion, computing the
/// deterministic id and content hash the same way `Entry::new` does.
pub fn entry_from_payload(payload: EntryPayload) -> Entry {
    Entry::new(payload)
}

#[derive(sqlx::FromRow)]
pub struct RunRow {
    pub id: String,
    pub entry_id: String,
    pub status: String,
    pub current_stage: String,
    pub retry_from_stage: Option<String>,
    pub quality_score: Option<f64>,
    pub quality_threshold: i32,
    pub optimization_attempt: i32,
    pub max_optimization_attempts: i32,
    pub technical_retry_count: i32,
    pub review_warning: bool,
    pub review_warning_reason: String,
    pub error_detail: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<RunRow> for Run {
    type Error = PersistenceError;

    fn try_from(r: RunRow) -> Result<Self, Self::Error> {
        Ok(Run {
            id: r.id,
            entry_id: r.entry_id,
            status: RunStatus::from_str(&r.status).map_err(PersistenceError::Unknown)?,
            current_stage: Stage::from_str(&r.current_stage).map_err(PersistenceError::Unknown)?,
            retry_from_stage: r.retry_from_stage.map(|s| Stage::from_str(&s)).transpose().map_err(PersistenceError::Unknown)?,
            quality_score: r.quality_score,
            quality_threshold: r.quality_threshold,
            optimization_attempt: r.optimization_attempt,
            max_optimization_attempts: r.max_optimization_attempts,
            technical_retry_count: r.technical_retry_count,
            review_warning: r.review_warning,
            review_warning_reason: r.review_warning_reason,
            error_detail: r.error_detail,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct StageResultRow {
    pub id: String,
    pub run_id: String,
    pub stage_name: String,
    pub attempt: i32,
    pub status: String,
    pub idempotency_key: String,
    pub request_json: serde_json::Value,
    pub response_json: serde_json::Value,
    pub error_detail: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<StageResultRow> for StageResult {
    type Error = PersistenceError;

    fn try_from(r: StageResultRow) -> Result<Self, Self::Error> {
        Ok(StageResult {
            id: r.id,
            run_id: r.run_id,
            stage_name: Stage::from_str(&r.stage_name).map_err(PersistenceError::Unknown)?,
            attempt: r.attempt,
            status: StageStatus::from_str(&r.status).map_err(PersistenceError::Unknown)?,
            idempotency_key: r.idempotency_key,
            request_json: r.request_json,
            response_json: r.response_json,
            error_detail: r.error_detail,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct PromptRow {
    pub id: String,
    pub run_id: String,
    pub stage_name: String,
    pub attempt: i32,
    pub prompt_text: String,
    pub needs_person: String,
    pub source: String,
    pub raw_response_json: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PromptRow> for Prompt {
    type Error = PersistenceError;

    fn try_from(r: PromptRow) -> Result<Self, Self::Error> {
        Ok(Prompt {
            id: r.id,
            run_id: r.run_id,
            stage_name: Stage::from_str(&r.stage_name).map_err(PersistenceError::Unknown)?,
            attempt: r.attempt,
            prompt_text: r.prompt_text,
            needs_person: r.needs_person,
            source: r.source,
            raw_response_json: r.raw_response_json,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct AssetRow {
    pub id: String,
    pub run_id: String,
    pub stage_name: String,
    pub attempt: i32,
    pub file_name: String,
    pub abs_path: String,
    pub mime_type: String,
    pub sha256: String,
    pub width: i32,
    pub height: i32,
    pub origin_url: String,
    pub model_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = PersistenceError;

    fn try_from(r: AssetRow) -> Result<Self, Self::Error> {
        Ok(Asset {
            id: r.id,
            run_id: r.run_id,
            stage_name: Stage::from_str(&r.stage_name).map_err(PersistenceError::Unknown)?,
            attempt: r.attempt,
            file_name: r.file_name,
            abs_path: r.abs_path,
            mime_type: r.mime_type,
            sha256: r.sha256,
            width: r.width,
            height: r.height,
            origin_url: r.origin_url,
            model_name: r.model_name,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct ScoreRow {
    pub id: String,
    pub run_id: String,
    pub stage_name: String,
    pub attempt: i32,
    pub score_0_100: f64,
    pub pass_fail: bool,
    pub rubric_json: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ScoreRow> for Score {
    fn from(r: ScoreRow) -> Self {
        Score {
            id: r.id,
            run_id: r.run_id,
            stage_name: r.stage_name,
            attempt: r.attempt,
            score_0_100: r.score_0_100,
            pass_fail: r.pass_fail,
            rubric_json: r.rubric_json,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct RuntimeConfigRow {
    pub quality_threshold: i32,
    pub max_optimization_loops: i32,
    pub max_api_retries: i32,
    pub stage_retry_limit: i32,
    pub worker_poll_seconds: i32,
    pub max_parallel_runs: i32,
    pub flux_imagen_fallback_enabled: bool,
    pub assistant_id: String,
    pub assistant_name: String,
    pub model_critique: String,
    pub model_generation: String,
    pub model_quality_gate: String,
}

impl From<RuntimeConfigRow> for RuntimeConfig {
    fn from(r: RuntimeConfigRow) -> Self {
        let mut cfg = RuntimeConfig {
            quality_threshold: r.quality_threshold,
            max_optimization_loops: r.max_optimization_loops,
            max_api_retries: r.max_api_retries,
            stage_retry_limit: r.stage_retry_limit,
            worker_poll_seconds: r.worker_poll_seconds,
            max_parallel_runs: r.max_parallel_runs,
            flux_imagen_fallback_enabled: r.flux_imagen_fallback_enabled,
            assistant_id: r.assistant_id,
            assistant_name: r.assistant_name,
            model_critique: r.model_critique,
            model_generation: r.model_generation,
            model_quality_gate: r.model_quality_gate,
        };
        cfg.normalize();
        cfg
    }
}

#[derive(sqlx::FromRow)]
pub struct ExportRow {
    pub id: String,
    pub filter_json: serde_json::Value,
    pub csv_path: Option<String>,
    pub zip_path: Option<String>,
    pub manifest_path: Option<String>,
    pub status: String,
    pub error_detail: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ExportRow> for Export {
    type Error = PersistenceError;

    fn try_from(r: ExportRow) -> Result<Self, Self::Error> {
        let status = match r.status.as_str() {
            "pending" => ExportStatus::Pending,
            "completed" => ExportStatus::Completed,
            "failed" => ExportStatus::Failed,
            other => return Err(PersistenceError::Unknown(format!("unknown export status: {other}"))),
        };
        Ok(Export {
            id: r.id,
            filter_json: r.filter_json,
            csv_path: r.csv_path,
            zip_path: r.zip_path,
            manifest_path: r.manifest_path,
            status,
            error_detail: r.error_detail,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
