//! `Run` — one pipeline execution for an `Entry`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::new_prefixed_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    RetryQueued,
    Running,
    CompletedPass,
    CompletedFailThreshold,
    FailedTechnical,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::RetryQueued => "retry_queued",
            Self::Running => "running",
            Self::CompletedPass => "completed_pass",
            Self::CompletedFailThreshold => "completed_fail_threshold",
            Self::FailedTechnical => "failed_technical",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CompletedPass | Self::CompletedFailThreshold | Self::FailedTechnical)
    }

    /// The two statuses `claim_next_queued_run` is allowed to pick up.
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Queued | Self::RetryQueued)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => Self::Queued,
            "retry_queued" => Self::RetryQueued,
            "running" => Self::Running,
            "completed_pass" => Self::CompletedPass,
            "completed_fail_threshold" => Self::CompletedFailThreshold,
            "failed_technical" => Self::FailedTechnical,
            other => return Err(format!("unknown run status: {other}")),
        })
    }
}

/// Pipeline stage names. `QualityGate` and `Stage3Upgrade` share a
/// loop; `current_stage` on `Run` tracks this as free text in the store but
/// the engine only ever writes one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Stage1Prompt,
    Stage2Draft,
    Stage3Upgrade,
    Stage4Background,
    QualityGate,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Stage1Prompt => "stage1_prompt",
            Self::Stage2Draft => "stage2_draft",
            Self::Stage3Upgrade => "stage3_upgrade",
            Self::Stage4Background => "stage4_background",
            Self::QualityGate => "quality_gate",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => Self::Queued,
            "stage1_prompt" => Self::Stage1Prompt,
            "stage2_draft" => Self::Stage2Draft,
            "stage3_upgrade" => Self::Stage3Upgrade,
            "stage4_background" => Self::Stage4Background,
            "quality_gate" => Self::QualityGate,
            "completed" => Self::Completed,
            other => return Err(format!("unknown stage: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub entry_id: String,
    pub status: RunStatus,
    pub current_stage: Stage,
    pub retry_from_stage: Option<Stage>,
    pub quality_score: Option<f64>,
    pub quality_threshold: i32,
    pub optimization_attempt: i32,
    pub max_optimization_attempts: i32,
    pub technical_retry_count: i32,
    pub review_warning: bool,
    pub review_warning_reason: String,
    pub error_detail: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimum quality threshold accepted anywhere in the system.
pub const MIN_QUALITY_THRESHOLD: i32 = 95;

impl Run {
    pub fn new(entry_id: String, quality_threshold: i32, max_optimization_attempts: i32) -> Self {
        let now = Utc::now();
        Self { id: new_prefixed_id("run"),
               entry_id,
               status: RunStatus::Queued,
               current_stage: Stage::Queued,
               retry_from_stage: None,
               quality_score: None,
               quality_threshold: quality_threshold.max(MIN_QUALITY_THRESHOLD),
               optimization_attempt: 0,
               max_optimization_attempts: max_optimization_attempts.max(0),
               technical_retry_count: 0,
               review_warning: false,
               review_warning_reason: String::new(),
               error_detail: String::new(),
               created_at: now,
               updated_at: now }
    }

    /// resumption mapping: where `process_run` should re-enter.
    pub fn start_stage(&self) -> Stage {
        self.retry_from_stage.unwrap_or(Stage::Stage1Prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_threshold_is_clamped_on_construction() {
        let run = Run::new("ent_x".into(), 50, 3);
        assert_eq!(run.quality_threshold, MIN_QUALITY_THRESHOLD);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [RunStatus::Queued, RunStatus::RetryQueued, RunStatus::Running, RunStatus::CompletedPass, RunStatus::CompletedFailThreshold, RunStatus::FailedTechnical] {
            let parsed: RunStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed.as_str(), s.as_str());
        }
    }

    #[test]
    fn default_start_stage_is_stage1() {
        let run = Run::new("ent_x".into(), 95, 0);
        assert_eq!(run.start_stage(), Stage::Stage1Prompt);
    }
}
