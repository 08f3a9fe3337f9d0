//! Postgres implementation of the `Repository` contract: typed row
//! structs, `PersistenceError` conversions, a pool-backed struct implementing
//! the trait's claim-by-conditional-update, upsert-by-idempotency-key, and
//! create-or-fetch-entry semantics.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Pool, Postgres};

use aac_core::repository::{EntryFilter, ExportFilter, ExportUpdate, Repository, RunFilter, RunUpdate, RuntimeConfigUpdate, StageResultInput};
use aac_core::EngineError;
use aac_domain::entry::EntryPayload;
use aac_domain::run::Stage;
use aac_domain::{Asset, Entry, Export, Prompt, Run, RunStatus, RuntimeConfig, Score, StageResult};

use crate::error::PersistenceError;
use crate::rows::{AssetRow, EntryRow, ExportRow, PromptRow, RunRow, RuntimeConfigRow, ScoreRow, StageResultRow};

pub struct PostgresRepository {
    pool: Pool<Postgres>,
}

impl PostgresRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_run(&self, run_id: &str) -> Result<Run, EngineError> {
        let row: RunRow = sqlx::query_as("SELECT * FROM runs WHERE id = $1").bind(run_id).fetch_one(&self.pool).await.map_err(PersistenceError::from)?;
        row.try_into().map_err(|e: PersistenceError| e.into())
    }

    async fn most_recent_failed_stage(&self, run_id: &str) -> Result<Option<Stage>, EngineError> {
        let row: Option<StageResultRow> = sqlx::query_as(
            "SELECT * FROM stage_results WHERE run_id = $1 AND status IN ('error', 'failed', 'timeout') ORDER BY created_at DESC LIMIT 1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        match row {
            Some(r) => {
                let sr: StageResult = r.try_into().map_err(|e: PersistenceError| EngineError::from(e))?;
                Ok(Some(sr.stage_name))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_entry(&self, payload: EntryPayload) -> Result<Entry, EngineError> {
        let entry = Entry::new(payload);
        sqlx::query(
            "INSERT INTO entries (id, word, part_of_speech, category, context, person_preference, batch, source_row_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ON CONFLICT (id) DO NOTHING",
        )
        .bind(&entry.id)
        .bind(&entry.word)
        .bind(&entry.part_of_speech)
        .bind(&entry.category)
        .bind(&entry.context)
        .bind(&entry.person_preference)
        .bind(&entry.batch)
        .bind(&entry.source_row_hash)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        let row: EntryRow = sqlx::query_as("SELECT * FROM entries WHERE id = $1").bind(&entry.id).fetch_one(&self.pool).await.map_err(PersistenceError::from)?;
        Ok(row.into())
    }

    async fn get_entry(&self, entry_id: &str) -> Result<Option<Entry>, EngineError> {
        let row: Option<EntryRow> = sqlx::query_as("SELECT * FROM entries WHERE id = $1").bind(entry_id).fetch_optional(&self.pool).await.map_err(PersistenceError::from)?;
        Ok(row.map(Into::into))
    }

    async fn list_entries(&self, filter: EntryFilter) -> Result<Vec<(Entry, Option<Run>)>, EngineError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT e.* FROM entries e \
             WHERE ($1::text IS NULL OR e.word ILIKE '%' || $1 || '%') \
               AND ($2::text IS NULL OR e.part_of_speech = $2) \
               AND ($3::text IS NULL OR e.category = $3) \
               AND ($4::text IS NULL OR e.batch = $4) \
             ORDER BY e.created_at ASC",
        )
        .bind(filter.word)
        .bind(filter.part_of_speech)
        .bind(filter.category)
        .bind(filter.batch)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let entry: Entry = row.into();
            let latest_run: Option<RunRow> =
                sqlx::query_as("SELECT * FROM runs WHERE entry_id = $1 ORDER BY created_at DESC LIMIT 1").bind(&entry.id).fetch_optional(&self.pool).await.map_err(PersistenceError::from)?;
            let run = latest_run.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| EngineError::from(e))?;
            out.push((entry, run));
        }
        Ok(out)
    }

    async fn create_runs(&self, entry_ids: &[String], quality_threshold: i32, max_optimization_attempts: i32) -> Result<Vec<Run>, EngineError> {
        let mut created = Vec::with_capacity(entry_ids.len());
        for entry_id in entry_ids {
            let run = Run::new(entry_id.clone(), quality_threshold, max_optimization_attempts);
            sqlx::query(
                "INSERT INTO runs (id, entry_id, status, current_stage, retry_from_stage, quality_score, quality_threshold, \
                 optimization_attempt, max_optimization_attempts, technical_retry_count, review_warning, review_warning_reason, error_detail) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(&run.id)
            .bind(&run.entry_id)
            .bind(run.status.as_str())
            .bind(run.current_stage.as_str())
            .bind(run.retry_from_stage.map(|s| s.as_str()))
            .bind(run.quality_score)
            .bind(run.quality_threshold)
            .bind(run.optimization_attempt)
            .bind(run.max_optimization_attempts)
            .bind(run.technical_retry_count)
            .bind(run.review_warning)
            .bind(&run.review_warning_reason)
            .bind(&run.error_detail)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from)?;
            created.push(run);
        }
        Ok(created)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, EngineError> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM runs WHERE id = $1").bind(run_id).fetch_optional(&self.pool).await.map_err(PersistenceError::from)?;
        row.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| e.into())
    }

    async fn list_runs(&self, filter: RunFilter) -> Result<Vec<Run>, EngineError> {
        let status_filter = filter.status.map(|s| s.as_str().to_string());
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT * FROM runs \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::text IS NULL OR entry_id = $2) \
               AND ($3::double precision IS NULL OR quality_score >= $3) \
               AND ($4::double precision IS NULL OR quality_score <= $4) \
             ORDER BY created_at DESC",
        )
        .bind(status_filter)
        .bind(filter.entry_id)
        .bind(filter.min_score)
        .bind(filter.max_score)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        rows.into_iter().map(TryInto::try_into).collect::<Result<Vec<_>, PersistenceError>>().map_err(|e| e.into())
    }

    async fn claim_next_queued_run(&self) -> Result<Option<Run>, EngineError> {
        let row: Option<RunRow> = sqlx::query_as(
            "UPDATE runs SET status = 'running', current_stage = COALESCE(retry_from_stage, current_stage), updated_at = now() \
             WHERE id = ( \
                 SELECT id FROM runs \
                 WHERE status IN ('queued', 'retry_queued') \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING *",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        row.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| e.into())
    }

    async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<Run, EngineError> {
        let mut run = self.fetch_run(run_id).await?;

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

        sqlx::query(
            "UPDATE runs SET status = $2, current_stage = $3, retry_from_stage = $4, quality_score = $5, \
             optimization_attempt = $6, technical_retry_count = $7, review_warning = $8, review_warning_reason = $9, \
             error_detail = $10, updated_at = $11 WHERE id = $1",
        )
        .bind(&run.id)
        .bind(run.status.as_str())
        .bind(run.current_stage.as_str())
        .bind(run.retry_from_stage.map(|s| s.as_str()))
        .bind(run.quality_score)
        .bind(run.optimization_attempt)
        .bind(run.technical_retry_count)
        .bind(run.review_warning)
        .bind(&run.review_warning_reason)
        .bind(&run.error_detail)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(run)
    }

    async fn retry_run_from_last_failure(&self, run_id: &str) -> Result<Run, EngineError> {
        let stage = self.most_recent_failed_stage(run_id).await?.unwrap_or(Stage::Stage1Prompt);
        self.update_run(run_id, RunUpdate::new().status(RunStatus::RetryQueued).retry_from_stage(Some(stage))).await
    }

    async fn add_stage_result(&self, input: StageResultInput) -> Result<StageResult, EngineError> {
        let idempotency_key = StageResult::idempotency_key(&input.run_id, input.stage_name, input.attempt);
        let result = StageResult::new(input.run_id, input.stage_name, input.attempt, input.status, input.request_json, input.response_json, input.error_detail);

        let row: StageResultRow = sqlx::query_as(
            "INSERT INTO stage_results (id, run_id, stage_name, attempt, status, idempotency_key, request_json, response_json, error_detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (idempotency_key) DO UPDATE SET \
                 status = EXCLUDED.status, request_json = EXCLUDED.request_json, \
                 response_json = EXCLUDED.response_json, error_detail = EXCLUDED.error_detail, created_at = now() \
             RETURNING *",
        )
        .bind(&result.id)
        .bind(&result.run_id)
        .bind(result.stage_name.as_str())
        .bind(result.attempt)
        .bind(result.status.as_str())
        .bind(&idempotency_key)
        .bind(&result.request_json)
        .bind(&result.response_json)
        .bind(&result.error_detail)
        .fetch_one(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        row.try_into().map_err(|e: PersistenceError| e.into())
    }

    async fn add_prompt(&self, run_id: &str, stage_name: Stage, attempt: i32, prompt_text: &str, needs_person: &str, source: &str, raw_response_json: Value) -> Result<Prompt, EngineError> {
        let prompt = Prompt::new(run_id.to_string(), stage_name, attempt, prompt_text.to_string(), needs_person.to_string(), source.to_string(), raw_response_json);

        sqlx::query("INSERT INTO prompts (id, run_id, stage_name, attempt, prompt_text, needs_person, source, raw_response_json) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(&prompt.id)
            .bind(&prompt.run_id)
            .bind(prompt.stage_name.as_str())
            .bind(prompt.attempt)
            .bind(&prompt.prompt_text)
            .bind(&prompt.needs_person)
            .bind(&prompt.source)
            .bind(&prompt.raw_response_json)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        Ok(prompt)
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_asset(
        &self,
        run_id: &str,
        stage_name: Stage,
        attempt: i32,
        file_name: &str,
        abs_path: &str,
        mime_type: &str,
        sha256: &str,
        width: i32,
        height: i32,
        origin_url: &str,
        model_name: &str,
    ) -> Result<Asset, EngineError> {
        let asset = Asset::new(
            run_id.to_string(),
            stage_name,
            attempt,
            file_name.to_string(),
            abs_path.to_string(),
            mime_type.to_string(),
            sha256.to_string(),
            width,
            height,
            origin_url.to_string(),
            model_name.to_string(),
        );

        sqlx::query(
            "INSERT INTO assets (id, run_id, stage_name, attempt, file_name, abs_path, mime_type, sha256, width, height, origin_url, model_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&asset.id)
        .bind(&asset.run_id)
        .bind(asset.stage_name.as_str())
        .bind(asset.attempt)
        .bind(&asset.file_name)
        .bind(&asset.abs_path)
        .bind(&asset.mime_type)
        .bind(&asset.sha256)
        .bind(asset.width)
        .bind(asset.height)
        .bind(&asset.origin_url)
        .bind(&asset.model_name)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(asset)
    }

    async fn add_score(&self, run_id: &str, attempt: i32, score_0_100: f64, pass_fail: bool, rubric_json: Value) -> Result<Score, EngineError> {
        let score = Score::new(run_id.to_string(), attempt, score_0_100, pass_fail, rubric_json);

        sqlx::query("INSERT INTO scores (id, run_id, stage_name, attempt, score_0_100, pass_fail, rubric_json) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(&score.id)
            .bind(&score.run_id)
            .bind(&score.stage_name)
            .bind(score.attempt)
            .bind(score.score_0_100)
            .bind(score.pass_fail)
            .bind(&score.rubric_json)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        Ok(score)
    }

    async fn latest_prompt(&self, run_id: &str, stage_name: Stage) -> Result<Option<Prompt>, EngineError> {
        let row: Option<PromptRow> = sqlx::query_as("SELECT * FROM prompts WHERE run_id = $1 AND stage_name = $2 ORDER BY attempt DESC, created_at DESC LIMIT 1")
            .bind(run_id)
            .bind(stage_name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::from)?;
        row.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| e.into())
    }

    async fn latest_asset(&self, run_id: &str, stage_name: Stage) -> Result<Option<Asset>, EngineError> {
        let row: Option<AssetRow> = sqlx::query_as("SELECT * FROM assets WHERE run_id = $1 AND stage_name = $2 ORDER BY attempt DESC, created_at DESC LIMIT 1")
            .bind(run_id)
            .bind(stage_name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::from)?;
        row.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| e.into())
    }

    async fn asset_for_attempt(&self, run_id: &str, stage_name: Stage, attempt: i32) -> Result<Option<Asset>, EngineError> {
        let row: Option<AssetRow> = sqlx::query_as("SELECT * FROM assets WHERE run_id = $1 AND stage_name = $2 AND attempt = $3 ORDER BY created_at DESC LIMIT 1")
            .bind(run_id)
            .bind(stage_name.as_str())
            .bind(attempt)
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::from)?;
        row.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| e.into())
    }

    async fn get_runtime_config(&self) -> Result<RuntimeConfig, EngineError> {
        let existing: Option<RuntimeConfigRow> = sqlx::query_as("SELECT quality_threshold, max_optimization_loops, max_api_retries, stage_retry_limit, worker_poll_seconds, \
             max_parallel_runs, flux_imagen_fallback_enabled, assistant_id, assistant_name, model_critique, model_generation, model_quality_gate \
             FROM runtime_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        if let Some(row) = existing {
            return Ok(row.into());
        }

        let defaults = RuntimeConfig::default();
        sqlx::query(
            "INSERT INTO runtime_config (id, quality_threshold, max_optimization_loops, max_api_retries, stage_retry_limit, worker_poll_seconds, \
             max_parallel_runs, flux_imagen_fallback_enabled, assistant_id, assistant_name, model_critique, model_generation, model_quality_gate) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) ON CONFLICT (id) DO NOTHING",
        )
        .bind(defaults.quality_threshold)
        .bind(defaults.max_optimization_loops)
        .bind(defaults.max_api_retries)
        .bind(defaults.stage_retry_limit)
        .bind(defaults.worker_poll_seconds)
        .bind(defaults.max_parallel_runs)
        .bind(defaults.flux_imagen_fallback_enabled)
        .bind(&defaults.assistant_id)
        .bind(&defaults.assistant_name)
        .bind(&defaults.model_critique)
        .bind(&defaults.model_generation)
        .bind(&defaults.model_quality_gate)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(defaults)
    }

    async fn update_runtime_config(&self, update: RuntimeConfigUpdate) -> Result<RuntimeConfig, EngineError> {
        let mut cfg = self.get_runtime_config().await?;

        if let Some(v) = update.quality_threshold {
            cfg.quality_threshold = v;
        }
        if let Some(v) = update.max_optimization_loops {
            cfg.max_optimization_loops = v;
        }
        if let Some(v) = update.max_api_retries {
            cfg.max_api_retries = v;
        }
        if let Some(v) = update.stage_retry_limit {
            cfg.stage_retry_limit = v;
        }
        if let Some(v) = update.worker_poll_seconds {
            cfg.worker_poll_seconds = v;
        }
        if let Some(v) = update.max_parallel_runs {
            cfg.max_parallel_runs = v;
        }
        if let Some(v) = update.flux_imagen_fallback_enabled {
            cfg.flux_imagen_fallback_enabled = v;
        }
        if let Some(v) = update.assistant_id {
            cfg.assistant_id = v;
        }
        if let Some(v) = update.assistant_name {
            cfg.assistant_name = v;
        }
        if let Some(v) = update.model_critique {
            cfg.model_critique = v;
        }
        if let Some(v) = update.model_generation {
            cfg.model_generation = v;
        }
        if let Some(v) = update.model_quality_gate {
            cfg.model_quality_gate = v;
        }
        cfg.normalize();

        sqlx::query(
            "UPDATE runtime_config SET quality_threshold = $1, max_optimization_loops = $2, max_api_retries = $3, stage_retry_limit = $4, \
             worker_poll_seconds = $5, max_parallel_runs = $6, flux_imagen_fallback_enabled = $7, assistant_id = $8, assistant_name = $9, \
             model_critique = $10, model_generation = $11, model_quality_gate = $12 WHERE id = 1",
        )
        .bind(cfg.quality_threshold)
        .bind(cfg.max_optimization_loops)
        .bind(cfg.max_api_retries)
        .bind(cfg.stage_retry_limit)
        .bind(cfg.worker_poll_seconds)
        .bind(cfg.max_parallel_runs)
        .bind(cfg.flux_imagen_fallback_enabled)
        .bind(&cfg.assistant_id)
        .bind(&cfg.assistant_name)
        .bind(&cfg.model_critique)
        .bind(&cfg.model_generation)
        .bind(&cfg.model_quality_gate)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(cfg)
    }

    async fn create_export(&self, filter_json: Value) -> Result<Export, EngineError> {
        let export = Export::new(filter_json);

        sqlx::query("INSERT INTO exports (id, filter_json, status, error_detail) VALUES ($1, $2, $3, $4)")
            .bind(&export.id)
            .bind(&export.filter_json)
            .bind(export.status.as_str())
            .bind(&export.error_detail)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        Ok(export)
    }

    async fn update_export(&self, export_id: &str, update: ExportUpdate) -> Result<Export, EngineError> {
        let row: ExportRow = sqlx::query_as("SELECT * FROM exports WHERE id = $1").bind(export_id).fetch_one(&self.pool).await.map_err(PersistenceError::from)?;
        let mut export: Export = row.try_into().map_err(|e: PersistenceError| EngineError::from(e))?;

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
        export.updated_at = chrono::Utc::now();

        sqlx::query("UPDATE exports SET csv_path = $2, zip_path = $3, manifest_path = $4, status = $5, error_detail = $6, updated_at = $7 WHERE id = $1")
            .bind(&export.id)
            .bind(&export.csv_path)
            .bind(&export.zip_path)
            .bind(&export.manifest_path)
            .bind(export.status.as_str())
            .bind(&export.error_detail)
            .bind(export.updated_at)
            .execute(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

        Ok(export)
    }

    async fn get_export(&self, export_id: &str) -> Result<Option<Export>, EngineError> {
        let row: Option<ExportRow> = sqlx::query_as("SELECT * FROM exports WHERE id = $1").bind(export_id).fetch_optional(&self.pool).await.map_err(PersistenceError::from)?;
        row.map(TryInto::try_into).transpose().map_err(|e: PersistenceError| e.into())
    }

    async fn list_runs_for_export(&self, filter: ExportFilter) -> Result<Vec<(Run, Entry)>, EngineError> {
        let status_filter: Option<Vec<String>> = filter.status.map(|statuses| statuses.into_iter().map(|s| s.as_str().to_string()).collect());

        let rows: Vec<(RunRow, EntryRow)> = {
            let run_rows: Vec<RunRow> = sqlx::query_as(
                "SELECT r.* FROM runs r \
                 WHERE ($1::text[] IS NULL OR r.entry_id = ANY($1)) \
                   AND ($2::text[] IS NULL OR r.id = ANY($2)) \
                   AND ($3::text[] IS NULL OR r.status = ANY($3)) \
                   AND ($4::double precision IS NULL OR r.quality_score >= $4) \
                   AND ($5::double precision IS NULL OR r.quality_score <= $5) \
                 ORDER BY r.created_at ASC",
            )
            .bind(&filter.entry_ids)
            .bind(&filter.run_ids)
            .bind(&status_filter)
            .bind(filter.min_score)
            .bind(filter.max_score)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::from)?;

            let mut paired = Vec::with_capacity(run_rows.len());
            for run_row in run_rows {
                let entry_row: EntryRow = sqlx::query_as("SELECT * FROM entries WHERE id = $1").bind(&run_row.entry_id).fetch_one(&self.pool).await.map_err(PersistenceError::from)?;
                paired.push((run_row, entry_row));
            }
            paired
        };

        let mut out = Vec::with_capacity(rows.len());
        for (run_row, entry_row) in rows {
            let run: Run = run_row.try_into().map_err(|e: PersistenceError| EngineError::from(e))?;
            out.push((run, entry_row.into()));
        }
        Ok(out)
    }
}
