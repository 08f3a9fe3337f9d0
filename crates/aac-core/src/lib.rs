//! Engine-level contracts: errors, retry policy, the repository trait, the
//! provider traits, and environment configuration. `aac-pipeline` and
//! `aac-worker` depend on this crate's traits, never on a concrete backend.

pub mod env_config;
pub mod errors;
pub mod provider;
pub mod repository;
pub mod retry;

pub use env_config::EnvConfig;
pub use errors::EngineError;
pub use provider::{GeneratedImage, GeneratedPrompt, ImageAnalysis, ImageGenClient, PromptAssistantClient, QualityVerdict};
pub use repository::{EntryFilter, ExportFilter, ExportUpdate, Repository, RunFilter, RunUpdate, RuntimeConfigUpdate, StageResultInput};
pub use retry::with_backoff;
