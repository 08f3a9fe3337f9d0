//! `Prompt` — an assistant-generated prompt for one (run, stage, attempt).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::new_prefixed_id;
use crate::run::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub run_id: String,
    pub stage_name: Stage,
    pub attempt: i32,
    pub prompt_text: String,
    pub needs_person: String,
    pub source: String,
    pub raw_response_json: Value,
    pub created_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(run_id: String, stage_name: Stage, attempt: i32, prompt_text: String, needs_person: String, source: String, raw_response_json: Value) -> Self {
        Self { id: new_prefixed_id("prm"),
               run_id,
               stage_name,
               attempt,
               prompt_text,
               needs_person,
               source,
               raw_response_json,
               created_at: Utc::now() }
    }
}
