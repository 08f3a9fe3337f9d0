//! Process-environment configuration, loaded once at startup from `.env` +
//! `std::env`.

use std::env;

use crate::errors::EngineError;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub database_url: String,
    /// Root directory under which per-run asset files and export bundles are
    /// written.
    pub runtime_data_root: String,
    pub assistant_api_key: String,
    pub assistant_base_url: String,
    pub image_gen_api_key: String,
    pub image_gen_base_url: String,
    pub log_level: String,
}

impl EnvConfig {
    /// Reads required and optional variables from the process environment.
    /// Call `dotenvy::dotenv().ok()` before this if a `.env` file should be
    /// honored; this function itself never touches the filesystem.
    pub fn from_env() -> Result<Self, EngineError> {
        let database_url = require_var("DATABASE_URL")?;
        let runtime_data_root = env::var("RUNTIME_DATA_ROOT").unwrap_or_else(|_| "./data".to_string());
        let assistant_api_key = env::var("ASSISTANT_API_KEY").unwrap_or_default();
        let assistant_base_url = env::var("ASSISTANT_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let image_gen_api_key = env::var("IMAGE_GEN_API_KEY").unwrap_or_default();
        let image_gen_base_url = env::var("IMAGE_GEN_BASE_URL").unwrap_or_else(|_| "https://api.replicate.com/v1".to_string());
        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self { database_url, runtime_data_root, assistant_api_key, assistant_base_url, image_gen_api_key, image_gen_base_url, log_level })
    }
}

fn require_var(name: &str) -> Result<String, EngineError> {
    env::var(name).map_err(|_| EngineError::Config(format!("{name} not set")))
}
