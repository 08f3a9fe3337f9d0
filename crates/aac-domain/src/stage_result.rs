//! `StageResult` — the append-or-upsert audit log keyed by
//! (run_id, stage_name, attempt).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::new_prefixed_id;
use crate::run::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Error,
    Failed,
    Timeout,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ok" => Self::Ok,
            "error" => Self::Error,
            "failed" => Self::Failed,
            "timeout" => Self::Timeout,
            other => return Err(format!("unknown stage status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub id: String,
    pub run_id: String,
    pub stage_name: Stage,
    pub attempt: i32,
    pub status: StageStatus,
    pub idempotency_key: String,
    pub request_json: Value,
    pub response_json: Value,
    pub error_detail: String,
    pub created_at: DateTime<Utc>,
}

impl StageResult {
    pub fn idempotency_key(run_id: &str, stage_name: Stage, attempt: i32) -> String {
        format!("{run_id}:{stage_name}:{attempt}")
    }

    pub fn new(run_id: String, stage_name: Stage, attempt: i32, status: StageStatus, request_json: Value, response_json: Value, error_detail: String) -> Self {
        let idempotency_key = Self::idempotency_key(&run_id, stage_name, attempt);
        Self { id: new_prefixed_id("sr"),
               run_id,
               stage_name,
               attempt,
               status,
               idempotency_key,
               request_json,
               response_json,
               error_detail,
               created_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_format() {
        assert_eq!(StageResult::idempotency_key("run_a", Stage::Stage3Upgrade, 2), "run_a:stage3_upgrade:2");
    }
}
