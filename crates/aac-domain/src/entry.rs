//! `Entry` — a vocabulary item driven through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical_json::to_canonical_json;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub word: String,
    pub part_of_speech: String,
    pub category: String,
    pub context: String,
    pub person_preference: String,
    pub batch: String,
    pub source_row_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies to create or look up an `Entry`. `source_row_hash`
/// is derived from this payload via [`source_row_hash`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPayload {
    pub word: String,
    pub part_of_speech: String,
    pub category: String,
    pub context: String,
    pub person_preference: String,
    pub batch: String,
}

/// Deterministic id: `ent_{sha256("word|pos|category".lower().trim())[..24]}`.
/// Re-creating an `Entry` with the same
/// (word, pos, category) tuple always yields this same id.
pub fn deterministic_entry_id(word: &str, part_of_speech: &str, category: &str) -> String {
    let key = format!("{}|{}|{}", normalize(word), normalize(part_of_speech), normalize(category));
    let digest = Sha256::digest(key.as_bytes());
    let hex = hex_encode(&digest);
    format!("ent_{}", &hex[..24])
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Content hash of the full creation payload, used to detect whether a
/// re-submitted CSV row actually differs from what is stored (not part of the
/// identity tuple, only used for audit/dedupe bookkeeping).
pub fn source_row_hash(payload: &EntryPayload) -> String {
    let value = serde_json::to_value(payload).expect("EntryPayload serializes");
    let canonical = to_canonical_json(&value);
    let digest = Sha256::digest(canonical.as_bytes());
    hex_encode(&digest)
}

impl Entry {
    pub fn new(payload: EntryPayload) -> Self {
        let id = deterministic_entry_id(&payload.word, &payload.part_of_speech, &payload.category);
        let row_hash = source_row_hash(&payload);
        let now = Utc::now();
        Self { id,
               word: payload.word.trim().to_string(),
               part_of_speech: payload.part_of_speech.trim().to_string(),
               category: payload.category.trim().to_string(),
               context: payload.context.trim().to_string(),
               person_preference: payload.person_preference.trim().to_string(),
               batch: payload.batch.trim().to_string(),
               source_row_hash: row_hash,
               created_at: now,
               updated_at: now }
    }
}
