//! Builds the user-turn text sent to the prompt assistant, with a
//! contrast-framing variant for entries the abstract-concept detector flags.

use aac_domain::abstract_semantics::AbstractIntent;
use aac_domain::Entry;

const PHOTOREALISTIC_HINT: &str = "If category is one of: Drinks, animals, food, food: fruits, food: vegetables, \
food: Sweets & desserts, shapes, school supplies, transportation - use a photorealistic style.";

pub fn build_stage1_prompt(entry: &Entry, abstract_intent: Option<&AbstractIntent>) -> String {
    match abstract_intent.filter(|i| i.is_abstract) {
        Some(intent) => format!(
            "Task: Create the first image prompt for an abstract concept using a single-frame contrast and decide if the prompt needs a person.\n\
             Return STRICT JSON with keys exactly:\n\
             {{ \"first prompt\": \"<string>\", \"need a person\": \"yes\" | \"no\" }}\n\n\
             Context: {context}\n\
             Word: {word}\n\
             Part of speech: {pos}\n\
             Category: {category}\n\
             Contrast subject (what must be visibly absent or negated): {contrast_subject}\n\
             If a person is present, use a: {person}\n\n\
             Show the contrast within a single frame; do not split into before/after panels.\n\
             {hint}\n",
            context = entry.context,
            word = entry.word,
            pos = entry.part_of_speech,
            category = entry.category,
            contrast_subject = intent.contrast_subject,
            person = entry.person_preference,
            hint = PHOTOREALISTIC_HINT,
        ),
        None => format!(
            "Task: Create the first image prompt for the given word and decide if the prompt needs a person.\n\
             Return STRICT JSON with keys exactly:\n\
             {{ \"first prompt\": \"<string>\", \"need a person\": \"yes\" | \"no\" }}\n\n\
             Context: {context}\n\
             Word: {word}\n\
             Part of speech: {pos}\n\
             Category: {category}\n\
             If a person is present, use a: {person}\n\n\
             {hint}\n",
            context = entry.context,
            word = entry.word,
            pos = entry.part_of_speech,
            category = entry.category,
            person = entry.person_preference,
            hint = PHOTOREALISTIC_HINT,
        ),
    }
}

pub fn build_stage3_prompt(entry: &Entry, old_prompt: &str, challenges: &str, recommendations: &str, abstract_intent: Option<&AbstractIntent>) -> String {
    let contrast_line = match abstract_intent.filter(|i| i.is_abstract) {
        Some(intent) => format!("Contrast subject (what must be visibly absent or negated): {}\n", intent.contrast_subject),
        None => String::new(),
    };

    format!(
        "Create an upgraded image prompt for the given word. Return STRICT JSON:\n\
         {{ \"upgraded prompt\": \"<string>\" }}\n\n\
         context for the image: {context}\n\
         Old prompt: {old_prompt}\n\
         challenges and improvements with the old image: challenges={challenges}; recommendations={recommendations}\n\
         word: {word}\n\
         part of sentence: {pos}\n\
         Category: {category}\n\
         {contrast_line}\
         If a person is present, use a {person} as the person.\n\n\
         Do not use text in the image.\n\
         The word's category can add information in addition to its PoS.\n\
         {hint}\n",
        context = entry.context,
        word = entry.word,
        pos = entry.part_of_speech,
        category = entry.category,
        person = entry.person_preference,
        hint = PHOTOREALISTIC_HINT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aac_domain::entry::EntryPayload;

    fn sample_entry() -> Entry {
        Entry::new(EntryPayload {
            word: "nothing".to_string(),
            part_of_speech: "pronoun".to_string(),
            category: "quantity".to_string(),
            context: "an empty bowl".to_string(),
            person_preference: "girl".to_string(),
            batch: "b1".to_string(),
        })
    }

    #[test]
    fn abstract_prompt_mentions_contrast_subject() {
        let entry = sample_entry();
        let intent = AbstractIntent { is_abstract: true, reason_codes: vec!["lexicon_match".into()], contrast_subject: "food".into(), contrast_pattern: "single_frame_contrast".into() };
        let prompt = build_stage1_prompt(&entry, Some(&intent));
        assert!(prompt.contains("Contrast subject"));
        assert!(prompt.contains("food"));
    }

    #[test]
    fn concrete_prompt_has_no_contrast_line() {
        let entry = sample_entry();
        let prompt = build_stage1_prompt(&entry, None);
        assert!(!prompt.contains("Contrast subject"));
    }
}
