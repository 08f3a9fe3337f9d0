//! `Score` — a quality-gate verdict for one (run, attempt).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::new_prefixed_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub id: String,
    pub run_id: String,
    pub stage_name: String,
    pub attempt: i32,
    pub score_0_100: f64,
    pub pass_fail: bool,
    pub rubric_json: Value,
    pub created_at: DateTime<Utc>,
}

impl Score {
    pub fn new(run_id: String, attempt: i32, score_0_100: f64, pass_fail: bool, rubric_json: Value) -> Self {
        Self { id: new_prefixed_id("sco"),
               run_id,
               stage_name: "quality_gate".to_string(),
               attempt,
               score_0_100,
               pass_fail,
               rubric_json,
               created_at: Utc::now() }
    }
}
