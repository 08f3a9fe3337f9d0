//! `Export` — a requested CSV/ZIP/manifest export job. The writer
//! itself (pure file assembly) is out of scope; only the durable
//! record this engine owns lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::new_prefixed_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    pub id: String,
    pub filter_json: Value,
    pub csv_path: Option<String>,
    pub zip_path: Option<String>,
    pub manifest_path: Option<String>,
    pub status: ExportStatus,
    pub error_detail: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Export {
    pub fn new(filter_json: Value) -> Self {
        let now = Utc::now();
        Self { id: new_prefixed_id("exp"),
               filter_json,
               csv_path: None,
               zip_path: None,
               manifest_path: None,
               status: ExportStatus::Pending,
               error_detail: String::new(),
               created_at: now,
               updated_at: now }
    }
}

/// Resolves a requested export file under the export's own directory,
/// rejecting any path that would escape it.
pub fn resolve_export_file(export_root: &std::path::Path, export_id: &str, requested: &str) -> Result<std::path::PathBuf, String> {
    let dir = export_root.join(export_id);
    let candidate = dir.join(requested);

    let dir_abs = dir.canonicalize().map_err(|e| format!("export dir missing: {e}"))?;
    let parent = candidate.parent().ok_or_else(|| "invalid path".to_string())?;
    let parent_abs = if parent.exists() {
        parent.canonicalize().map_err(|e| format!("invalid export path: {e}"))?
    } else {
        return Err("requested file does not exist".to_string());
    };

    if parent_abs != dir_abs && !parent_abs.starts_with(&dir_abs) {
        return Err("path traversal rejected".to_string());
    }
    Ok(candidate)
}
