use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::db::operations::vocabulary::{self, WordExampleRow, WordRow};
use crate::db::DatabaseProxy;
use crate::id::IdGenerator;
use crate::services::llm::{self, LLMError, LLMProvider};
use crate::services::translator::{TranslateError, Translation, WordTranslator};

/// A candidate the deduplicator decided to surface: the global word plus
/// fresh (zeroed) per-user stats and its example sentences.
#[derive(Debug, Clone)]
pub struct RecommendedWord {
    pub word: WordRow,
    pub learn_count: i32,
    pub fluency: i32,
    pub examples: Vec<WordExampleRow>,
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("enrichment error: {0}")]
    Enrich(#[from] TranslateError),
}

/// Persistence boundary for candidate processing.
pub trait RecommendationStore {
    fn find_word_by_text(
        &self,
        word: &str,
    ) -> impl std::future::Future<Output = Result<Option<WordRow>, sqlx::Error>> + Send;
    fn user_has_word(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;
    fn record_offer(
        &self,
        id: &str,
        user_id: &str,
        word_id: &str,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn insert_word(
        &self,
        word: &WordRow,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn insert_examples(
        &self,
        examples: &[WordExampleRow],
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn examples_for(
        &self,
        word_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WordExampleRow>, sqlx::Error>> + Send;
}

/// External enrichment collaborator.
pub trait WordEnricher {
    fn translate(
        &self,
        word: &str,
    ) -> impl std::future::Future<Output = Result<Translation, TranslateError>> + Send;
}

/// Decides whether a single AI-recommended candidate materializes for the
/// user. `Ok(None)` means Skip: empty candidate, already tracked, or the
/// enrichment collaborator rejected the word.
pub async fn process_candidate<S, E>(
    store: &S,
    enricher: &E,
    ids: &IdGenerator,
    user_id: &str,
    candidate: &str,
) -> Result<Option<RecommendedWord>, RecommendError>
where
    S: RecommendationStore,
    E: WordEnricher,
{
    let word = candidate.trim().to_lowercase();
    if word.is_empty() {
        return Ok(None);
    }

    if let Some(existing) = store.find_word_by_text(&word).await? {
        if store.user_has_word(user_id, &existing.id).await? {
            return Ok(None);
        }

        store
            .record_offer(&ids.next_id(), user_id, &existing.id)
            .await?;
        let examples = store.examples_for(&existing.id).await?;

        return Ok(Some(RecommendedWord {
            word: existing,
            learn_count: 0,
            fluency: 0,
            examples,
        }));
    }

    let translation = enricher.translate(&word).await?;
    if !translation.is_valid || !translation.has_definitions() {
        return Ok(None);
    }

    let now = Utc::now().naive_utc();
    let new_word = WordRow {
        id: ids.next_id(),
        word: word.clone(),
        definition_en: translation.definition_en.clone(),
        definition_zh: translation.definition_zh.clone(),
        difficulty: translation.clamped_difficulty(),
        part_of_speech: translation.part_of_speech.clone(),
        root_word: translation.root_word.clone(),
        created_at: now,
        updated_at: now,
    };

    store.insert_word(&new_word).await?;

    let examples: Vec<WordExampleRow> = translation
        .examples
        .iter()
        .filter(|sentence| !sentence.trim().is_empty())
        .map(|sentence| WordExampleRow {
            id: ids.next_id(),
            word_id: new_word.id.clone(),
            sentence: sentence.trim().to_string(),
        })
        .collect();
    if !examples.is_empty() {
        store.insert_examples(&examples).await?;
    }

    store
        .record_offer(&ids.next_id(), user_id, &new_word.id)
        .await?;

    Ok(Some(RecommendedWord {
        word: new_word,
        learn_count: 0,
        fluency: 0,
        examples,
    }))
}

/// Processes a whole recommendation batch. A failure on one candidate never
/// touches the others; it is logged and the candidate is dropped.
pub async fn process_batch<S, E>(
    store: &S,
    enricher: &E,
    ids: &IdGenerator,
    user_id: &str,
    candidates: &[String],
) -> Vec<RecommendedWord>
where
    S: RecommendationStore,
    E: WordEnricher,
{
    let mut results = Vec::new();

    for candidate in candidates {
        match process_candidate(store, enricher, ids, user_id, candidate).await {
            Ok(Some(word)) => results.push(word),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%candidate, error = %err, "recommendation candidate failed, skipping");
            }
        }
    }

    results
}

impl RecommendationStore for DatabaseProxy {
    async fn find_word_by_text(&self, word: &str) -> Result<Option<WordRow>, sqlx::Error> {
        vocabulary::find_word_by_text(self, word).await
    }

    async fn user_has_word(&self, user_id: &str, word_id: &str) -> Result<bool, sqlx::Error> {
        Ok(vocabulary::find_user_word(self, user_id, word_id)
            .await?
            .is_some())
    }

    async fn record_offer(&self, id: &str, user_id: &str, word_id: &str) -> Result<(), sqlx::Error> {
        vocabulary::record_recommendation_offer(self, id, user_id, word_id).await
    }

    async fn insert_word(&self, word: &WordRow) -> Result<(), sqlx::Error> {
        vocabulary::insert_word(self, word).await
    }

    async fn insert_examples(&self, examples: &[WordExampleRow]) -> Result<(), sqlx::Error> {
        for example in examples {
            vocabulary::insert_example(self, example).await?;
        }
        Ok(())
    }

    async fn examples_for(&self, word_id: &str) -> Result<Vec<WordExampleRow>, sqlx::Error> {
        vocabulary::examples_for_word(self, word_id).await
    }
}

impl WordEnricher for WordTranslator {
    async fn translate(&self, word: &str) -> Result<Translation, TranslateError> {
        WordTranslator::translate(self, word).await
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationPayload {
    words: Vec<String>,
}

/// Asks the generative collaborator for candidate words themed around the
/// user's current vocabulary.
pub struct LlmWordRecommender {
    llm: Arc<LLMProvider>,
}

impl LlmWordRecommender {
    pub fn new(llm: Arc<LLMProvider>) -> Self {
        Self { llm }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_available()
    }

    pub async fn recommend(
        &self,
        user_words: &[String],
        interests: &[String],
    ) -> Result<Vec<String>, LLMError> {
        let prompt = build_recommend_prompt(user_words, interests);
        let reply = self
            .llm
            .complete_with_system(
                "You are a vocabulary learning assistant. Answer with one JSON object only.",
                &prompt,
            )
            .await?;

        let json = llm::extract_json_object(&reply).ok_or(LLMError::EmptyChoices)?;
        let payload: RecommendationPayload = serde_json::from_str(&json)?;
        Ok(payload.words)
    }
}

fn build_recommend_prompt(user_words: &[String], interests: &[String]) -> String {
    let analysis_context = if user_words.is_empty() {
        "The user has no vocabulary yet. Recommend 10 common, basic English words that beginners should learn first."
    } else if user_words.len() < 5 {
        "The user has very few words. Recommend words related to their existing words plus fundamental vocabulary they might be missing."
    } else if user_words.len() < 15 {
        "The user has a small vocabulary. Focus on expanding it with words closely related to what they already know."
    } else {
        "The user has a good vocabulary base. Recommend more advanced words that fit the themes in their existing vocabulary."
    };

    let words_str = if user_words.is_empty() {
        "no words yet - beginner level".to_string()
    } else {
        user_words.join(", ")
    };

    let interests_str = if interests.is_empty() {
        "unknown".to_string()
    } else {
        interests.join(", ")
    };

    format!(
        r#"Analyze the user's vocabulary and recommend 10 new English words that are similar, related, or in the same theme as the words they already know.

{analysis_context}

User's current vocabulary: {words_str}
User's stated interests: {interests_str}

RULES:
1. Recommend exactly 10 real English words in their base form.
2. Never recommend proper nouns, inflected forms, or words already in the vocabulary.
3. Prefer words thematically related to the existing vocabulary and interests.

Respond in this exact JSON format:
{{
  "words": ["word1", "word2", "word3", "word4", "word5", "word6", "word7", "word8", "word9", "word10"]
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        words: Mutex<Vec<WordRow>>,
        user_words: Mutex<Vec<(String, String)>>,
        offers: Mutex<Vec<(String, String)>>,
        examples: Mutex<Vec<WordExampleRow>>,
    }

    impl FakeStore {
        fn with_word(self, word: WordRow) -> Self {
            self.words.lock().unwrap().push(word);
            self
        }

        fn with_user_word(self, user_id: &str, word_id: &str) -> Self {
            self.user_words
                .lock()
                .unwrap()
                .push((user_id.to_string(), word_id.to_string()));
            self
        }

        fn with_offer(self, user_id: &str, word_id: &str) -> Self {
            self.offers
                .lock()
                .unwrap()
                .push((user_id.to_string(), word_id.to_string()));
            self
        }
    }

    impl RecommendationStore for FakeStore {
        async fn find_word_by_text(&self, word: &str) -> Result<Option<WordRow>, sqlx::Error> {
            Ok(self
                .words
                .lock()
                .unwrap()
                .iter()
                .find(|w| w.word == word)
                .cloned())
        }

        async fn user_has_word(&self, user_id: &str, word_id: &str) -> Result<bool, sqlx::Error> {
            Ok(self
                .user_words
                .lock()
                .unwrap()
                .contains(&(user_id.to_string(), word_id.to_string())))
        }

        async fn record_offer(
            &self,
            _id: &str,
            user_id: &str,
            word_id: &str,
        ) -> Result<(), sqlx::Error> {
            let mut offers = self.offers.lock().unwrap();
            let entry = (user_id.to_string(), word_id.to_string());
            if !offers.contains(&entry) {
                offers.push(entry);
            }
            Ok(())
        }

        async fn insert_word(&self, word: &WordRow) -> Result<(), sqlx::Error> {
            self.words.lock().unwrap().push(word.clone());
            Ok(())
        }

        async fn insert_examples(&self, examples: &[WordExampleRow]) -> Result<(), sqlx::Error> {
            self.examples.lock().unwrap().extend_from_slice(examples);
            Ok(())
        }

        async fn examples_for(&self, word_id: &str) -> Result<Vec<WordExampleRow>, sqlx::Error> {
            Ok(self
                .examples
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.word_id == word_id)
                .cloned()
                .collect())
        }
    }

    struct FakeEnricher {
        translation: Translation,
        calls: Mutex<usize>,
    }

    impl FakeEnricher {
        fn valid() -> Self {
            Self {
                translation: Translation {
                    is_valid: true,
                    definition_en: "a round fruit".into(),
                    definition_zh: "蘋果".into(),
                    difficulty: 2,
                    part_of_speech: "noun".into(),
                    root_word: String::new(),
                    examples: vec!["I ate an apple.".into()],
                    reason: String::new(),
                },
                calls: Mutex::new(0),
            }
        }

        fn invalid() -> Self {
            Self {
                translation: Translation {
                    is_valid: false,
                    reason: "not a real word".into(),
                    ..Default::default()
                },
                calls: Mutex::new(0),
            }
        }
    }

    impl WordEnricher for FakeEnricher {
        async fn translate(&self, _word: &str) -> Result<Translation, TranslateError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.translation.clone())
        }
    }

    fn global_word(id: &str, word: &str) -> WordRow {
        let now = Utc::now().naive_utc();
        WordRow {
            id: id.to_string(),
            word: word.to_string(),
            definition_en: "def".into(),
            definition_zh: "定義".into(),
            difficulty: 3,
            part_of_speech: "noun".into(),
            root_word: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn empty_candidate_is_skipped() {
        let store = FakeStore::default();
        let enricher = FakeEnricher::valid();
        let ids = IdGenerator::new(1);

        let result = process_candidate(&store, &enricher, &ids, "u1", "   ")
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(*enricher.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn tracked_word_is_skipped_without_offer() {
        let store = FakeStore::default()
            .with_word(global_word("w1", "apple"))
            .with_user_word("u1", "w1");
        let enricher = FakeEnricher::valid();
        let ids = IdGenerator::new(1);

        let result = process_candidate(&store, &enricher, &ids, "u1", "Apple")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.offers.lock().unwrap().is_empty());
        assert_eq!(*enricher.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn known_word_is_returned_without_reenrichment() {
        let store = FakeStore::default().with_word(global_word("w1", "apple"));
        let enricher = FakeEnricher::valid();
        let ids = IdGenerator::new(1);

        let result = process_candidate(&store, &enricher, &ids, "u1", "apple")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.word.id, "w1");
        assert_eq!(result.learn_count, 0);
        assert_eq!(result.fluency, 0);
        // Enrichment must not be re-queried for a known word.
        assert_eq!(*enricher.calls.lock().unwrap(), 0);
        assert_eq!(
            store.offers.lock().unwrap().as_slice(),
            &[("u1".to_string(), "w1".to_string())]
        );
    }

    #[tokio::test]
    async fn repeated_offer_stays_single() {
        let store = FakeStore::default()
            .with_word(global_word("w1", "apple"))
            .with_offer("u1", "w1");
        let enricher = FakeEnricher::valid();
        let ids = IdGenerator::new(1);

        let result = process_candidate(&store, &enricher, &ids, "u1", "apple")
            .await
            .unwrap();
        assert!(result.is_some());
        assert_eq!(store.offers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_word_is_enriched_and_persisted() {
        let store = FakeStore::default();
        let enricher = FakeEnricher::valid();
        let ids = IdGenerator::new(1);

        let result = process_candidate(&store, &enricher, &ids, "u1", " Apple ")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.word.word, "apple");
        assert_eq!(result.word.difficulty, 2);
        assert_eq!(result.examples.len(), 1);
        assert_eq!(store.words.lock().unwrap().len(), 1);
        assert_eq!(store.offers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_candidate_is_skipped() {
        let store = FakeStore::default();
        let enricher = FakeEnricher::invalid();
        let ids = IdGenerator::new(1);

        let result = process_candidate(&store, &enricher, &ids, "u1", "asdfgh")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.words.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_survives_per_candidate_failures() {
        struct FailingEnricher;

        impl WordEnricher for FailingEnricher {
            async fn translate(&self, word: &str) -> Result<Translation, TranslateError> {
                if word == "boom" {
                    return Err(TranslateError::InvalidPayload);
                }
                Ok(Translation {
                    is_valid: true,
                    definition_en: "def".into(),
                    definition_zh: "定義".into(),
                    difficulty: 1,
                    ..Default::default()
                })
            }
        }

        let store = FakeStore::default();
        let ids = IdGenerator::new(1);
        let candidates = vec!["alpha".to_string(), "boom".to_string(), "gamma".to_string()];

        let results = process_batch(&store, &FailingEnricher, &ids, "u1", &candidates).await;
        let words: Vec<&str> = results.iter().map(|r| r.word.word.as_str()).collect();
        assert_eq!(words, vec!["alpha", "gamma"]);
    }
}
