//! Abstract-concept detector.
//!
//! When an `Entry` is flagged abstract, Stage 1/3 prompt templates switch to
//! a "single-frame contrast" framing and the quality gate uses the abstract
//! rubric (see `aac-pipeline`).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static ABSTRACT_LEXICON: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "none", "no", "nothing", "without", "not", "empty", "all", "any", "some", "every", "each", "more", "less", "same", "different", "other",
    ].into_iter()
     .collect()
});

static NEGATION_TOKENS: Lazy<HashSet<&'static str>> = Lazy::new(|| ["no", "not", "without", "none", "nothing"].into_iter().collect());

static ABSTRACT_PARTS_OF_SPEECH: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["pronoun", "determiner", "preposition", "conjunction", "adverb", "quantifier"].into_iter().collect());

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbstractIntent {
    pub is_abstract: bool,
    pub reason_codes: Vec<String>,
    pub contrast_subject: String,
    pub contrast_pattern: String,
}

fn tokenize(value: &str) -> HashSet<String> {
    value.to_lowercase()
         .split(|c: char| !c.is_ascii_alphabetic() && c != '\'')
         .filter(|s| !s.is_empty())
         .map(|s| s.to_string())
         .collect()
}

fn extract_contrast_subject(context: &str, category: &str, fallback_word: &str) -> String {
    let text = context.to_lowercase();
    for marker in ["without ", "no ", "none ", "not "] {
        if let Some(idx) = text.find(marker) {
            let rest = &text[idx + marker.len()..];
            let candidate: String = rest.chars().take_while(|c| c.is_ascii_alphabetic() || *c == ' ' || *c == '-').collect();
            let first_word = candidate.trim().split(' ').next().unwrap_or("").to_string();
            if !first_word.is_empty() {
                return first_word;
            }
        }
    }
    if !category.trim().is_empty() {
        return category.trim().to_string();
    }
    if !fallback_word.trim().is_empty() {
        return fallback_word.trim().to_string();
    }
    "target object".to_string()
}

pub fn detect_abstract_intent(word: &str, part_of_speech: &str, context: &str, category: &str) -> AbstractIntent {
    let mut reason_codes = Vec::new();
    let normalized_word = word.trim().to_lowercase();
    let normalized_pos = part_of_speech.trim().to_lowercase();
    let context_tokens = tokenize(context);

    if ABSTRACT_LEXICON.contains(normalized_word.as_str()) {
        reason_codes.push("lexicon_match".to_string());
    }
    if context_tokens.iter().any(|t| NEGATION_TOKENS.contains(t.as_str())) {
        reason_codes.push("context_negation".to_string());
    }
    if ABSTRACT_PARTS_OF_SPEECH.contains(normalized_pos.as_str()) {
        reason_codes.push("pos_abstract".to_string());
    }
    if normalized_word.ends_with("less") {
        reason_codes.push("suffix_less".to_string());
    }

    let is_abstract = !reason_codes.is_empty();
    let contrast_subject = extract_contrast_subject(context, category, word);

    AbstractIntent { is_abstract, reason_codes, contrast_subject, contrast_pattern: "single_frame_contrast".to_string() }
}
