//! Per-attempt metadata sidecar: `{attempt, stage3:{...}, quality_gate:{...}}`.

use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
pub struct AttemptMetadata {
    pub attempt: i32,
    pub stage3_analysis: Value,
    pub stage3_assistant: Value,
    pub stage3_generation_model: String,
    pub quality_gate: Value,
}

impl AttemptMetadata {
    pub fn to_json(&self) -> Value {
        json!({
            "attempt": self.attempt,
            "stage3": {
                "analysis": self.stage3_analysis,
                "assistant": self.stage3_assistant,
                "generation": { "model": self.stage3_generation_model },
                "generation_model": self.stage3_generation_model,
            },
            "quality_gate": self.quality_gate,
        })
    }
}
