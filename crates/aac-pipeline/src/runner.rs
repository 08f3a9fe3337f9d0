//! The staged pipeline state machine: one call to `process_run` drives
//! one `Run` from its resumption point through to a terminal status.

use std::sync::Arc;

use serde_json::{json, Value};

use aac_core::repository::{Repository, RunUpdate, StageResultInput};
use aac_core::provider::{ImageGenClient, PromptAssistantClient};
use aac_core::EngineError;
use aac_domain::abstract_semantics::{detect_abstract_intent, AbstractIntent};
use aac_domain::run::{Run, RunStatus, Stage};
use aac_domain::runtime_config::{RuntimeConfig, DEFAULT_GENERATION_MODEL, FALLBACK_GENERATION_MODEL};
use aac_domain::{Asset, Entry};
use aac_providers::asset_store::{image_dimensions, sha256_bytes, AssetStore};

use crate::metadata::AttemptMetadata;
use crate::stage_retry::with_stage_retry;

const PROMPT_SOURCE: &str = "assistant";

/// An error that escaped every stage retry, tagged with where it happened so
/// the outer catch can record `failed_technical` at the right stage/attempt.
#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    attempt: i32,
    source: EngineError,
}

struct Stage3Outcome {
    asset: Asset,
    analysis_json: Value,
    assistant_json: Value,
    model_name: String,
}

pub struct PipelineRunner {
    repo: Arc<dyn Repository>,
    assistant: Arc<dyn PromptAssistantClient>,
    image_gen: Arc<dyn ImageGenClient>,
    assets: AssetStore,
}

impl PipelineRunner {
    pub fn new(repo: Arc<dyn Repository>, assistant: Arc<dyn PromptAssistantClient>, image_gen: Arc<dyn ImageGenClient>, assets: AssetStore) -> Self {
        Self { repo, assistant, image_gen, assets }
    }

    /// Drives one run from its resumption point to a terminal status.
    /// Persistence failures inside the recovery path itself still propagate;
    /// every other failure is converted into a `failed_technical` run update.
    pub async fn process_run(&self, run: Run) -> Result<Run, EngineError> {
        let config = self.repo.get_runtime_config().await?;
        let entry = self.repo.get_entry(&run.entry_id).await?.ok_or_else(|| EngineError::NotFound(format!("entry {}", run.entry_id)))?;
        let abstract_intent = detect_abstract_intent(&entry.word, &entry.part_of_speech, &entry.context, &entry.category);
        let start_stage = run.start_stage();

        match self.run_pipeline(&run, &entry, &abstract_intent, &config, start_stage).await {
            Ok(()) => self.repo.get_run(&run.id).await?.ok_or_else(|| EngineError::NotFound(format!("run {}", run.id))),
            Err(failure) => {
                log::error!("run {} technical failure at stage {} attempt {}: {}", run.id, failure.stage, failure.attempt, failure.source);
                let updated = self
                    .repo
                    .update_run(
                        &run.id,
                        RunUpdate::new().status(RunStatus::FailedTechnical).current_stage(failure.stage).technical_retry_count(run.technical_retry_count + 1).error_detail(failure.source.to_string()),
                    )
                    .await?;
                self.repo
                    .add_stage_result(StageResultInput {
                        run_id: run.id.clone(),
                        stage_name: failure.stage,
                        attempt: failure.attempt.max(1),
                        status: aac_domain::StageStatus::Error,
                        request_json: json!({}),
                        response_json: json!({}),
                        error_detail: failure.source.to_string(),
                    })
                    .await?;
                Ok(updated)
            }
        }
    }

    async fn run_pipeline(&self, run: &Run, entry: &Entry, abstract_intent: &AbstractIntent, config: &RuntimeConfig, start_stage: Stage) -> Result<(), StageFailure> {
        if matches!(start_stage, Stage::Stage1Prompt | Stage::Queued) {
            self.mark_stage(run, Stage::Stage1Prompt).await.map_err(|e| StageFailure { stage: Stage::Stage1Prompt, attempt: 0, source: e })?;
            with_stage_retry(config.stage_retry_limit, || self.run_stage1(run, entry, abstract_intent)).await.map_err(|e| StageFailure { stage: Stage::Stage1Prompt, attempt: 0, source: e })?;
            self.mark_stage(run, Stage::Stage2Draft).await.map_err(|e| StageFailure { stage: Stage::Stage2Draft, attempt: 0, source: e })?;
            with_stage_retry(config.stage_retry_limit, || self.run_stage2(run)).await.map_err(|e| StageFailure { stage: Stage::Stage2Draft, attempt: 0, source: e })?;
        } else if start_stage == Stage::Stage2Draft {
            self.mark_stage(run, Stage::Stage2Draft).await.map_err(|e| StageFailure { stage: Stage::Stage2Draft, attempt: 0, source: e })?;
            with_stage_retry(config.stage_retry_limit, || self.run_stage2(run)).await.map_err(|e| StageFailure { stage: Stage::Stage2Draft, attempt: 0, source: e })?;
        }
        // start_stage in {stage3_upgrade, stage4_background, quality_gate}: fall straight into the loop.

        self.mark_stage(run, Stage::Stage3Upgrade).await.map_err(|e| StageFailure { stage: Stage::Stage3Upgrade, attempt: 0, source: e })?;
        let (winner_attempt, best_score, best_rubric) = self.run_optimization_loop(run, entry, abstract_intent, config).await?;

        self.mark_stage(run, Stage::Stage4Background).await.map_err(|e| StageFailure { stage: Stage::Stage4Background, attempt: winner_attempt, source: e })?;
        with_stage_retry(config.stage_retry_limit, || self.run_stage4(run, winner_attempt)).await.map_err(|e| StageFailure { stage: Stage::Stage4Background, attempt: winner_attempt, source: e })?;

        let passed = best_score >= run.quality_threshold as f64;
        let status = if passed { RunStatus::CompletedPass } else { RunStatus::CompletedFailThreshold };
        let error_detail = if passed {
            String::new()
        } else {
            let explanation = best_rubric["rubric"]["explanation"].as_str().unwrap_or("");
            format!("winner attempt {winner_attempt} scored {best_score:.1} below threshold {}: {explanation}", run.quality_threshold)
        };

        self.repo
            .update_run(
                &run.id,
                RunUpdate::new().status(status).current_stage(Stage::Completed).quality_score(Some(best_score)).optimization_attempt(winner_attempt).error_detail(error_detail),
            )
            .await
            .map_err(|e| StageFailure { stage: Stage::Completed, attempt: winner_attempt, source: e })?;
        Ok(())
    }

    async fn mark_stage(&self, run: &Run, stage: Stage) -> Result<(), EngineError> {
        self.repo.update_run(&run.id, RunUpdate::new().current_stage(stage)).await?;
        Ok(())
    }

    async fn run_stage1(&self, run: &Run, entry: &Entry, abstract_intent: &AbstractIntent) -> Result<(), EngineError> {
        let generated = self.assistant.generate_first_prompt(entry, Some(abstract_intent)).await?;
        if generated.prompt_text.trim().is_empty() {
            return Err(EngineError::ContractViolation("stage1 response missing a usable prompt".to_string()));
        }
        let needs_person = generated.needs_person.trim().to_lowercase();
        let needs_person = if needs_person == "yes" { "yes" } else { "no" };

        self.repo.add_prompt(&run.id, Stage::Stage1Prompt, 0, &generated.prompt_text, needs_person, PROMPT_SOURCE, generated.raw_response_json.clone()).await?;
        self.repo
            .add_stage_result(StageResultInput {
                run_id: run.id.clone(),
                stage_name: Stage::Stage1Prompt,
                attempt: 0,
                status: aac_domain::StageStatus::Ok,
                request_json: json!({ "entry_id": entry.id }),
                response_json: generated.raw_response_json,
                error_detail: String::new(),
            })
            .await?;
        Ok(())
    }

    async fn run_stage2(&self, run: &Run) -> Result<(), EngineError> {
        let prompt = self.repo.latest_prompt(&run.id, Stage::Stage1Prompt).await?.ok_or_else(|| EngineError::InvariantViolation("stage2 has no stage1 prompt to draft from".to_string()))?;
        let generated = self.image_gen.generate_draft(&prompt.prompt_text).await?;
        self.persist_asset(&run.id, Stage::Stage2Draft, 0, &generated).await?;
        self.repo
            .add_stage_result(StageResultInput {
                run_id: run.id.clone(),
                stage_name: Stage::Stage2Draft,
                attempt: 0,
                status: aac_domain::StageStatus::Ok,
                request_json: json!({ "prompt_text": prompt.prompt_text }),
                response_json: json!({ "origin_url": generated.origin_url, "model_name": generated.model_name }),
                error_detail: String::new(),
            })
            .await?;
        Ok(())
    }

    /// Runs Stage3-upgrade/Quality-gate pairs until an attempt passes or the
    /// attempt budget (`run.max_optimization_attempts + 1`) is exhausted.
    /// Returns the winner attempt, its score, and its rubric JSON.
    async fn run_optimization_loop(&self, run: &Run, entry: &Entry, abstract_intent: &AbstractIntent, config: &RuntimeConfig) -> Result<(i32, f64, Value), StageFailure> {
        let total_attempts = run.max_optimization_attempts.max(0) + 1;
        let mut best: Option<(i32, f64, Value)> = None;
        let mut previous_explanation: Option<String> = None;

        for attempt in 1..=total_attempts {
            let stage3 = with_stage_retry(config.stage_retry_limit, || self.run_stage3(run, entry, abstract_intent, config, attempt, previous_explanation.as_deref()))
                .await
                .map_err(|e| StageFailure { stage: Stage::Stage3Upgrade, attempt, source: e })?;

            let verdict = with_stage_retry(config.stage_retry_limit, || self.run_quality_gate(run, entry, abstract_intent, &stage3.asset, attempt, config))
                .await
                .map_err(|e| StageFailure { stage: Stage::QualityGate, attempt, source: e })?;

            let metadata = AttemptMetadata {
                attempt,
                stage3_analysis: stage3.analysis_json.clone(),
                stage3_assistant: stage3.assistant_json.clone(),
                stage3_generation_model: stage3.model_name.clone(),
                quality_gate: json!({ "score": verdict.score_0_100, "passed": verdict.pass_fail, "rubric": verdict.rubric_json }),
            };
            self.assets.write_metadata(&run.id, attempt, &metadata.to_json()).map_err(|e| StageFailure { stage: Stage::QualityGate, attempt, source: EngineError::Internal(e.to_string()) })?;

            previous_explanation = verdict.rubric_json["rubric"]["explanation"].as_str().map(str::to_string);

            let is_better = best.as_ref().map(|(_, score, _)| verdict.score_0_100 > *score).unwrap_or(true);
            if is_better {
                best = Some((attempt, verdict.score_0_100, verdict.rubric_json.clone()));
            }

            if verdict.pass_fail {
                break;
            }
        }

        best.ok_or_else(|| StageFailure { stage: Stage::QualityGate, attempt: total_attempts, source: EngineError::InvariantViolation("optimization loop produced no score".to_string()) })
    }

    async fn run_stage3(&self, run: &Run, entry: &Entry, abstract_intent: &AbstractIntent, config: &RuntimeConfig, attempt: i32, previous_explanation: Option<&str>) -> Result<Stage3Outcome, EngineError> {
        let source_asset = match self.repo.latest_asset(&run.id, Stage::Stage3Upgrade).await? {
            Some(asset) => asset,
            None => self.repo.latest_asset(&run.id, Stage::Stage2Draft).await?.ok_or_else(|| EngineError::InvariantViolation("stage3 has no source image".to_string()))?,
        };
        let source_bytes = tokio::fs::read(&source_asset.abs_path).await.map_err(|e| EngineError::Internal(format!("reading {}: {e}", source_asset.abs_path)))?;

        let mut critique = self.assistant.analyze_image(entry, &source_bytes, &source_asset.mime_type, &config.model_critique).await?;
        if let Some(explanation) = previous_explanation {
            critique.recommendations = format!("{} {explanation}", critique.recommendations).trim().to_string();
        }

        let previous_prompt = match self.repo.latest_prompt(&run.id, Stage::Stage3Upgrade).await? {
            Some(p) => p,
            None => self.repo.latest_prompt(&run.id, Stage::Stage1Prompt).await?.ok_or_else(|| EngineError::InvariantViolation("stage3 has no previous prompt".to_string()))?,
        };

        let generated = self.assistant.generate_upgraded_prompt(entry, &previous_prompt.prompt_text, &critique, Some(abstract_intent)).await?;
        if generated.prompt_text.trim().is_empty() {
            return Err(EngineError::ContractViolation("stage3 response missing an upgraded prompt".to_string()));
        }
        self.repo.add_prompt(&run.id, Stage::Stage3Upgrade, attempt, &generated.prompt_text, "", PROMPT_SOURCE, generated.raw_response_json.clone()).await?;

        let (image, model_name) = self.generate_stage3_image(&generated.prompt_text, config).await?;
        let asset = self.persist_asset(&run.id, Stage::Stage3Upgrade, attempt, &image).await?;

        self.repo
            .add_stage_result(StageResultInput {
                run_id: run.id.clone(),
                stage_name: Stage::Stage3Upgrade,
                attempt,
                status: aac_domain::StageStatus::Ok,
                request_json: json!({ "old_prompt": previous_prompt.prompt_text, "challenges": critique.challenges, "recommendations": critique.recommendations }),
                response_json: json!({ "prompt_text": generated.prompt_text, "model_name": model_name }),
                error_detail: String::new(),
            })
            .await?;

        Ok(Stage3Outcome {
            asset,
            analysis_json: json!({ "challenges": critique.challenges, "recommendations": critique.recommendations }),
            assistant_json: generated.raw_response_json,
            model_name,
        })
    }

    /// Selects the generation model from `RuntimeConfig` (already normalized
    /// against the allow-list) and, on a `flux-1.1-pro` failure with the
    /// fallback flag enabled, retries once via `imagen-3`.
    async fn generate_stage3_image(&self, prompt_text: &str, config: &RuntimeConfig) -> Result<(aac_core::provider::GeneratedImage, String), EngineError> {
        let model = config.model_generation.clone();
        match self.image_gen.generate_stage3(prompt_text, &model).await {
            Ok(image) => Ok((image, model)),
            Err(err) if model == DEFAULT_GENERATION_MODEL && config.flux_imagen_fallback_enabled => {
                log::warn!("stage3 generation model {model} failed ({err}), falling back to {FALLBACK_GENERATION_MODEL}");
                let image = self.image_gen.generate_stage3(prompt_text, FALLBACK_GENERATION_MODEL).await?;
                Ok((image, FALLBACK_GENERATION_MODEL.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn run_quality_gate(&self, run: &Run, entry: &Entry, abstract_intent: &AbstractIntent, asset: &Asset, attempt: i32, config: &RuntimeConfig) -> Result<aac_core::provider::QualityVerdict, EngineError> {
        let bytes = tokio::fs::read(&asset.abs_path).await.map_err(|e| EngineError::Internal(format!("reading {}: {e}", asset.abs_path)))?;
        let verdict = self.assistant.score_image(entry, &bytes, &asset.mime_type, Some(abstract_intent), run.quality_threshold as f64, &config.model_quality_gate).await?;
        self.repo.add_score(&run.id, attempt, verdict.score_0_100, verdict.pass_fail, verdict.rubric_json.clone()).await?;
        self.repo
            .add_stage_result(StageResultInput {
                run_id: run.id.clone(),
                stage_name: Stage::QualityGate,
                attempt,
                status: aac_domain::StageStatus::Ok,
                request_json: json!({ "asset_id": asset.id, "threshold": run.quality_threshold }),
                response_json: json!({ "score": verdict.score_0_100, "pass_fail": verdict.pass_fail, "rubric": verdict.rubric_json }),
                error_detail: String::new(),
            })
            .await?;
        Ok(verdict)
    }

    /// Stage 4 always targets the winning attempt's asset directly by
    /// attempt number, never "latest", so a later non-winning attempt can
    /// never be mistaken for the winner.
    async fn run_stage4(&self, run: &Run, winner_attempt: i32) -> Result<(), EngineError> {
        let source_asset = self
            .repo
            .asset_for_attempt(&run.id, Stage::Stage3Upgrade, winner_attempt)
            .await?
            .ok_or_else(|| EngineError::InvariantViolation(format!("no stage3_upgraded asset for winner attempt {winner_attempt}")))?;
        let bytes = tokio::fs::read(&source_asset.abs_path).await.map_err(|e| EngineError::Internal(format!("reading {}: {e}", source_asset.abs_path)))?;

        let generated = self.image_gen.remove_background_to_white(&bytes, &source_asset.mime_type).await?;
        self.persist_asset(&run.id, Stage::Stage4Background, winner_attempt, &generated).await?;
        self.repo
            .add_stage_result(StageResultInput {
                run_id: run.id.clone(),
                stage_name: Stage::Stage4Background,
                attempt: winner_attempt,
                status: aac_domain::StageStatus::Ok,
                request_json: json!({ "source_asset_id": source_asset.id }),
                response_json: json!({ "origin_url": generated.origin_url }),
                error_detail: String::new(),
            })
            .await?;
        Ok(())
    }

    async fn persist_asset(&self, run_id: &str, stage: Stage, attempt: i32, generated: &aac_core::provider::GeneratedImage) -> Result<Asset, EngineError> {
        let extension = if generated.mime_type.contains("png") { "png" } else { "jpg" };
        let filename = format!("{}_attempt_{attempt}.{extension}", stage.as_str());
        let abs_path = self.assets.write_image(run_id, &filename, &generated.bytes).map_err(|e| EngineError::Internal(e.to_string()))?;
        let sha256 = sha256_bytes(&generated.bytes);
        let (width, height) = image_dimensions(&abs_path).map_err(|e| EngineError::Internal(e.to_string()))?;
        let asset = self
            .repo
            .add_asset(run_id, stage, attempt, &filename, &abs_path.to_string_lossy(), &generated.mime_type, &sha256, width as i32, height as i32, &generated.origin_url, &generated.model_name)
            .await?;
        Ok(asset)
    }
}
