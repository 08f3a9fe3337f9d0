//! `Asset` — a saved image file produced by a stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::new_prefixed_id;
use crate::run::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub run_id: String,
    pub stage_name: Stage,
    pub attempt: i32,
    pub file_name: String,
    pub abs_path: String,
    pub mime_type: String,
    pub sha256: String,
    pub width: i32,
    pub height: i32,
    pub origin_url: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
impl Asset {
    pub fn new(run_id: String, stage_name: Stage, attempt: i32, file_name: String, abs_path: String, mime_type: String, sha256: String, width: i32, height: i32, origin_url: String, model_name: String) -> Self {
        Self { id: new_prefixed_id("ast"),
               run_id,
               stage_name,
               attempt,
               file_name,
               abs_path,
               mime_type,
               sha256,
               width,
               height,
               origin_url,
               model_name,
               created_at: Utc::now() }
    }
}
