//! Tolerant JSON extraction from assistant text.
//!
//! Assistants are asked for STRICT JSON but sometimes fence it in markdown or
//! wrap it in prose; this tries the raw text, a fenced code block, then the
//! first `{...}` span, in that order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)```").unwrap());
static OBJECT_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

pub fn parse_json_relaxed(content: &str) -> Value {
    let text = content.trim();
    let mut candidates = vec![text.to_string()];

    if let Some(caps) = FENCED.captures(text) {
        candidates.push(caps[1].trim().to_string());
    }
    if let Some(m) = OBJECT_SPAN.find(text) {
        candidates.push(m.as_str().to_string());
    }

    for candidate in candidates {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&candidate) {
            return value;
        }
    }
    Value::Object(serde_json::Map::new())
}
