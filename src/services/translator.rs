use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::services::llm::{self, LLMError, LLMProvider};

/// Verdict from the enrichment collaborator for a single candidate word.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Translation {
    pub is_valid: bool,
    #[serde(default)]
    pub definition_en: String,
    #[serde(default)]
    pub definition_zh: String,
    #[serde(default)]
    pub difficulty: i32,
    #[serde(default)]
    pub part_of_speech: String,
    #[serde(default)]
    pub root_word: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

impl Translation {
    pub fn has_definitions(&self) -> bool {
        !self.definition_en.trim().is_empty() && !self.definition_zh.trim().is_empty()
    }

    /// Model-reported difficulty is advisory; anything out of range falls
    /// back to 1.
    pub fn clamped_difficulty(&self) -> i32 {
        if self.difficulty <= 0 || self.difficulty > 10 {
            1
        } else {
            self.difficulty
        }
    }
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error(transparent)]
    Llm(#[from] LLMError),
    #[error("unparseable translation payload")]
    InvalidPayload,
}

const SYSTEM_PROMPT: &str = "You are a vocabulary learning assistant. You analyze a single English word and answer with one JSON object only.";

pub struct WordTranslator {
    llm: Arc<LLMProvider>,
}

impl WordTranslator {
    pub fn new(llm: Arc<LLMProvider>) -> Self {
        Self { llm }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_available()
    }

    pub async fn translate(&self, word: &str) -> Result<Translation, TranslateError> {
        let prompt = build_prompt(word);
        let reply = self.llm.complete_with_system(SYSTEM_PROMPT, &prompt).await?;

        let json = llm::extract_json_object(&reply).ok_or(TranslateError::InvalidPayload)?;
        let translation: Translation =
            serde_json::from_str(&json).map_err(|_| TranslateError::InvalidPayload)?;

        Ok(translation)
    }
}

fn build_prompt(word: &str) -> String {
    format!(
        r#"Analyze the English word "{word}" and decide whether it is suitable for vocabulary learning.

STRICT VALIDATION RULES:
1. ONLY accept real English words found in standard dictionaries, in their BASE FORM.
2. REJECT random strings, gibberish, misspellings, and proper nouns.
3. REJECT inflected forms (past tense, plurals, -ing forms, comparatives).
4. REJECT prefixes, suffixes, and word fragments ("tion", "pre", "beauti").

If the word is valid: give an English definition, a Traditional Chinese definition,
the part of speech, the root word if derived, a difficulty from 1-10
(1-3 very common, 4-6 intermediate, 7-10 advanced or rare), and 2-3 short
example sentences.

Respond in this exact JSON format:
{{
  "is_valid": true/false,
  "definition_en": "English definition (empty if invalid)",
  "definition_zh": "Traditional Chinese definition (empty if invalid)",
  "difficulty": 1-10 (0 if invalid),
  "part_of_speech": "noun/verb/adjective/... (empty if invalid)",
  "root_word": "base word this derives from, or empty",
  "examples": ["sentence 1", "sentence 2"],
  "reason": "why the word was rejected (empty if valid)"
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_out_of_range_defaults_to_one() {
        let translation = Translation {
            difficulty: 0,
            ..Default::default()
        };
        assert_eq!(translation.clamped_difficulty(), 1);

        let translation = Translation {
            difficulty: 11,
            ..Default::default()
        };
        assert_eq!(translation.clamped_difficulty(), 1);

        let translation = Translation {
            difficulty: 7,
            ..Default::default()
        };
        assert_eq!(translation.clamped_difficulty(), 7);
    }

    #[test]
    fn definitions_must_cover_both_languages() {
        let translation = Translation {
            definition_en: "a small feline".into(),
            definition_zh: String::new(),
            ..Default::default()
        };
        assert!(!translation.has_definitions());

        let translation = Translation {
            definition_en: "a small feline".into(),
            definition_zh: "貓".into(),
            ..Default::default()
        };
        assert!(translation.has_definitions());
    }

    #[test]
    fn prompt_embeds_the_word() {
        assert!(build_prompt("serendipity").contains("\"serendipity\""));
    }
}
