use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::db::operations::news::NewsRow;
use crate::db::DatabaseProxy;
use crate::id::IdGenerator;
use crate::services::audio::{AudioError, AudioService, StoredAudio};
use crate::services::difficulty::{self, DifficultyEstimate};
use crate::services::llm::{self, LLMError, LLMProvider};
use crate::services::selection::WordSelection;

pub const COOLDOWN_HOURS: i64 = 4;
pub const MIN_BACKLOG: usize = 4;
pub const BATCH_SIZE: usize = 4;

/// User inputs for one article request, assembled once per generation loop.
#[derive(Debug, Clone, Default)]
pub struct GenerationPreferences {
    pub level: i32,
    pub interests: Vec<String>,
}

#[derive(Debug)]
pub struct GenerationContext<'a> {
    pub preferences: Option<&'a GenerationPreferences>,
    pub learn_words: &'a [String],
    pub review_words: &'a [String],
    pub existing_titles: &'a [String],
    pub estimate: &'a DifficultyEstimate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedArticle {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Llm(#[from] LLMError),
    #[error("generator returned invalid payload: {0}")]
    InvalidPayload(&'static str),
    #[error("persist failed: {0}")]
    Persist(#[from] sqlx::Error),
}

/// External generative collaborator.
pub trait ArticleGenerator {
    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
    ) -> impl std::future::Future<Output = Result<GeneratedArticle, GenerateError>> + Send;
}

/// External speech + storage collaborator; failures are non-fatal to callers.
pub trait AudioPipeline {
    fn synthesize_and_store(
        &self,
        text: &str,
        news_id: &str,
    ) -> impl std::future::Future<Output = Result<StoredAudio, AudioError>> + Send;
}

/// Persistence boundary for generated items.
pub trait NewsStore {
    fn insert(
        &self,
        item: &NewsRow,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPlan {
    /// Backlog is full and something was generated recently; hand back the
    /// existing items untouched.
    CooldownActive,
    Generate { quota: usize },
}

/// Cooldown and quota decision. Below the minimum backlog we always fill up
/// to it, recent activity or not; at or above it a full batch is generated
/// only once the cooldown window has passed.
pub fn plan_generation(backlog_len: usize, has_recent: bool) -> GenerationPlan {
    if backlog_len < MIN_BACKLOG {
        return GenerationPlan::Generate {
            quota: MIN_BACKLOG - backlog_len,
        };
    }

    if has_recent {
        GenerationPlan::CooldownActive
    } else {
        GenerationPlan::Generate { quota: BATCH_SIZE }
    }
}

/// Runs the sequential generation loop. Each iteration feeds every known
/// title (stored plus generated earlier in this call) back into the
/// generator, so the loop must not be parallelized. Returns the newly
/// generated items, oldest first.
///
/// Generator and persistence failures abort the request; items persisted by
/// earlier iterations stay behind, which is the accepted partial-commit
/// behavior. Audio failure only logs a warning.
pub async fn run_generation<G, A, S>(
    generator: &G,
    audio: &A,
    store: &S,
    ids: &IdGenerator,
    user_id: &str,
    preferences: Option<&GenerationPreferences>,
    selection: &WordSelection,
    existing: &[NewsRow],
    quota: usize,
) -> Result<Vec<NewsRow>, GenerateError>
where
    G: ArticleGenerator,
    A: AudioPipeline,
    S: NewsStore,
{
    let base_level = preferences.map(|p| p.level).unwrap_or(1);
    let estimate = difficulty::estimate(base_level, &selection.learn_words, &selection.review_words);

    // What was actually requested from the generator, recorded verbatim on
    // every persisted item regardless of what the generator echoes back.
    let mut vocabulary_used = selection.learn_words.clone();
    vocabulary_used.extend(selection.review_words.iter().cloned());

    let mut generated: Vec<NewsRow> = Vec::with_capacity(quota);

    for _ in 0..quota {
        let existing_titles: Vec<String> = existing
            .iter()
            .map(|item| item.title.clone())
            .chain(generated.iter().map(|item| item.title.clone()))
            .collect();

        let ctx = GenerationContext {
            preferences,
            learn_words: &selection.learn_words,
            review_words: &selection.review_words,
            existing_titles: &existing_titles,
            estimate: &estimate,
        };

        let article = generator.generate(&ctx).await?;
        if article.title.trim().is_empty() || article.content.trim().is_empty() {
            return Err(GenerateError::InvalidPayload("missing title or content"));
        }

        let level = article
            .level
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|value| (1..=10).contains(value))
            .unwrap_or(estimate.effective_level);

        let news_id = ids.next_id();
        let now = Utc::now().naive_utc();
        let mut item = NewsRow {
            id: news_id.clone(),
            user_id: user_id.to_string(),
            title: article.title,
            content: article.content,
            level,
            keywords: article.keywords,
            vocabulary_used: vocabulary_used.clone(),
            source: article.source,
            audio_url: None,
            audio_key: None,
            created_at: now,
            updated_at: now,
        };

        match audio.synthesize_and_store(&item.content, &news_id).await {
            Ok(stored) => {
                item.audio_url = Some(stored.url);
                item.audio_key = Some(stored.key);
            }
            Err(err) => {
                tracing::warn!(%news_id, error = %err, "audio synthesis failed, storing item without audio");
            }
        }

        store.insert(&item).await?;
        generated.push(item);
    }

    Ok(generated)
}

/// Article generation backed by the chat-completions collaborator.
#[derive(Clone)]
pub struct LlmArticleGenerator {
    llm: Arc<LLMProvider>,
}

impl LlmArticleGenerator {
    pub fn new(llm: Arc<LLMProvider>) -> Self {
        Self { llm }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_available()
    }
}

impl ArticleGenerator for LlmArticleGenerator {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedArticle, GenerateError> {
        let prompt = build_article_prompt(ctx);
        let reply = self
            .llm
            .complete_with_system(ARTICLE_SYSTEM_PROMPT, &prompt)
            .await?;

        let json =
            llm::extract_json_object(&reply).ok_or(GenerateError::InvalidPayload("no JSON object"))?;
        let article: GeneratedArticle =
            serde_json::from_str(&json).map_err(|_| GenerateError::InvalidPayload("bad JSON shape"))?;

        Ok(article)
    }
}

impl AudioPipeline for AudioService {
    async fn synthesize_and_store(
        &self,
        text: &str,
        news_id: &str,
    ) -> Result<StoredAudio, AudioError> {
        AudioService::synthesize_and_store(self, text, news_id).await
    }
}

impl NewsStore for DatabaseProxy {
    async fn insert(&self, item: &NewsRow) -> Result<(), sqlx::Error> {
        crate::db::operations::news::insert_news(self, item).await
    }
}

const ARTICLE_SYSTEM_PROMPT: &str = "You are a casual, friendly news presenter creating content for English language learners. Write like you are hosting a relaxed podcast and answer with one JSON object only.";

fn build_article_prompt(ctx: &GenerationContext<'_>) -> String {
    let interests = ctx
        .preferences
        .filter(|p| !p.interests.is_empty())
        .map(|p| p.interests.join(", "))
        .unwrap_or_else(|| "general news".to_string());

    let learn_words = join_or_none(ctx.learn_words);
    let review_words = join_or_none(ctx.review_words);

    let existing_titles = if ctx.existing_titles.is_empty() {
        "none".to_string()
    } else {
        ctx.existing_titles
            .iter()
            .map(|title| format!("- {title}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let level = ctx.estimate.effective_level;

    format!(
        r#"Write one news-style article for an English learner.

USER PROFILE (use ONLY this information):
- Learning Level: {level} (1-10 scale)
- Interests: {interests}
- Words Currently Learning: {learn_words}
- Words Needing Review: {review_words}

ADAPTIVE DIFFICULTY INSTRUCTION:
{rationale}

AVOID DUPLICATE TOPICS. Previously generated titles (choose a COMPLETELY
different topic and theme from all of these):
{existing_titles}

ARTICLE STYLE:
1. A comprehensive article (800-1200 words) in a relaxed, conversational tone,
   like chatting with a friend over coffee.
2. Naturally weave in the learning and review words listed above.
3. Use everyday language appropriate for level {level}.
4. Keep it factual and educational, never formal or official.

Respond in this exact JSON format:
{{
  "title": "Catchy, conversational title",
  "content": "Full article text",
  "level": "{level}",
  "keywords": ["8-12 important topic words from the article"],
  "source": ["short tags describing where the story angle comes from"]
}}"#,
        rationale = ctx.estimate.rationale,
    )
}

fn join_or_none(words: &[String]) -> String {
    if words.is_empty() {
        "none".to_string()
    } else {
        words.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn fill_to_minimum_when_backlog_short() {
        assert_eq!(
            plan_generation(2, false),
            GenerationPlan::Generate { quota: 2 }
        );
        // A short backlog is filled even during the cooldown window.
        assert_eq!(
            plan_generation(1, true),
            GenerationPlan::Generate { quota: 3 }
        );
        assert_eq!(
            plan_generation(0, false),
            GenerationPlan::Generate { quota: 4 }
        );
    }

    #[test]
    fn cooldown_blocks_refresh_of_full_backlog() {
        assert_eq!(plan_generation(4, true), GenerationPlan::CooldownActive);
        assert_eq!(plan_generation(9, true), GenerationPlan::CooldownActive);
    }

    #[test]
    fn full_backlog_refreshes_a_whole_batch_after_cooldown() {
        assert_eq!(
            plan_generation(4, false),
            GenerationPlan::Generate { quota: 4 }
        );
        assert_eq!(
            plan_generation(12, false),
            GenerationPlan::Generate { quota: 4 }
        );
    }

    struct FakeGenerator {
        titles_seen: Mutex<Vec<Vec<String>>>,
        fail_on_call: Option<usize>,
    }

    impl FakeGenerator {
        fn new() -> Self {
            Self {
                titles_seen: Mutex::new(Vec::new()),
                fail_on_call: None,
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                titles_seen: Mutex::new(Vec::new()),
                fail_on_call: Some(call),
            }
        }
    }

    impl ArticleGenerator for FakeGenerator {
        async fn generate(
            &self,
            ctx: &GenerationContext<'_>,
        ) -> Result<GeneratedArticle, GenerateError> {
            let mut seen = self.titles_seen.lock().unwrap();
            let call = seen.len();
            seen.push(ctx.existing_titles.to_vec());

            if self.fail_on_call == Some(call) {
                return Err(GenerateError::InvalidPayload("forced failure"));
            }

            Ok(GeneratedArticle {
                title: format!("Article {call}"),
                content: "body".to_string(),
                level: String::new(),
                keywords: vec!["echoed".to_string()],
                source: vec!["test".to_string()],
            })
        }
    }

    struct NoAudio;

    impl AudioPipeline for NoAudio {
        async fn synthesize_and_store(
            &self,
            _text: &str,
            _news_id: &str,
        ) -> Result<StoredAudio, AudioError> {
            Err(AudioError::NotConfigured("TTS_SERVICE_URL"))
        }
    }

    struct WorkingAudio;

    impl AudioPipeline for WorkingAudio {
        async fn synthesize_and_store(
            &self,
            _text: &str,
            news_id: &str,
        ) -> Result<StoredAudio, AudioError> {
            Ok(StoredAudio {
                url: format!("https://cdn.example/{news_id}.wav"),
                key: format!("news/{news_id}.wav"),
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        inserted: Mutex<Vec<NewsRow>>,
    }

    impl NewsStore for FakeStore {
        async fn insert(&self, item: &NewsRow) -> Result<(), sqlx::Error> {
            self.inserted.lock().unwrap().push(item.clone());
            Ok(())
        }
    }

    fn selection() -> WordSelection {
        WordSelection {
            learn_words: vec!["apple".to_string()],
            review_words: vec!["banana".to_string()],
        }
    }

    fn existing_item(title: &str) -> NewsRow {
        let now = Utc::now().naive_utc();
        NewsRow {
            id: title.to_string(),
            user_id: "u1".to_string(),
            title: title.to_string(),
            content: "old".to_string(),
            level: 1,
            keywords: Vec::new(),
            vocabulary_used: Vec::new(),
            source: Vec::new(),
            audio_url: None,
            audio_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn loop_accumulates_titles_across_iterations() {
        let generator = FakeGenerator::new();
        let store = FakeStore::default();
        let ids = IdGenerator::new(1);
        let existing = vec![existing_item("Old Story")];

        let generated = run_generation(
            &generator,
            &NoAudio,
            &store,
            &ids,
            "u1",
            None,
            &selection(),
            &existing,
            3,
        )
        .await
        .unwrap();

        assert_eq!(generated.len(), 3);

        let seen = generator.titles_seen.lock().unwrap();
        assert_eq!(seen[0], vec!["Old Story"]);
        assert_eq!(seen[1], vec!["Old Story", "Article 0"]);
        assert_eq!(seen[2], vec!["Old Story", "Article 0", "Article 1"]);
    }

    #[tokio::test]
    async fn persisted_vocabulary_is_the_request_not_the_echo() {
        let generator = FakeGenerator::new();
        let store = FakeStore::default();
        let ids = IdGenerator::new(1);

        run_generation(
            &generator,
            &NoAudio,
            &store,
            &ids,
            "u1",
            None,
            &selection(),
            &[],
            1,
        )
        .await
        .unwrap();

        let inserted = store.inserted.lock().unwrap();
        assert_eq!(inserted[0].vocabulary_used, vec!["apple", "banana"]);
        // The generator echoed "echoed" as a keyword; keywords keep it, the
        // vocabulary record must not.
        assert_eq!(inserted[0].keywords, vec!["echoed"]);
    }

    #[tokio::test]
    async fn audio_failure_is_non_fatal() {
        let generator = FakeGenerator::new();
        let store = FakeStore::default();
        let ids = IdGenerator::new(1);

        let generated = run_generation(
            &generator,
            &NoAudio,
            &store,
            &ids,
            "u1",
            None,
            &selection(),
            &[],
            1,
        )
        .await
        .unwrap();

        assert_eq!(generated.len(), 1);
        assert!(generated[0].audio_url.is_none());
        assert_eq!(store.inserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn audio_success_is_attached() {
        let generator = FakeGenerator::new();
        let store = FakeStore::default();
        let ids = IdGenerator::new(1);

        let generated = run_generation(
            &generator,
            &WorkingAudio,
            &store,
            &ids,
            "u1",
            None,
            &selection(),
            &[],
            1,
        )
        .await
        .unwrap();

        assert!(generated[0].audio_url.as_deref().unwrap().starts_with("https://cdn.example/"));
        assert!(generated[0].audio_key.as_deref().unwrap().starts_with("news/"));
    }

    #[tokio::test]
    async fn generator_failure_aborts_but_keeps_prior_items() {
        let generator = FakeGenerator::failing_on(2);
        let store = FakeStore::default();
        let ids = IdGenerator::new(1);

        let result = run_generation(
            &generator,
            &NoAudio,
            &store,
            &ids,
            "u1",
            None,
            &selection(),
            &[],
            4,
        )
        .await;

        assert!(result.is_err());
        // The two items persisted before the failure stay persisted.
        assert_eq!(store.inserted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn level_falls_back_to_the_estimate() {
        let generator = FakeGenerator::new();
        let store = FakeStore::default();
        let ids = IdGenerator::new(1);
        let preferences = GenerationPreferences {
            level: 6,
            interests: vec!["science".to_string()],
        };

        run_generation(
            &generator,
            &NoAudio,
            &store,
            &ids,
            "u1",
            Some(&preferences),
            &selection(),
            &[],
            1,
        )
        .await
        .unwrap();

        // Fake generator echoes an empty level string.
        assert_eq!(store.inserted.lock().unwrap()[0].level, 6);
    }

    #[test]
    fn prompt_lists_titles_and_rationale() {
        let estimate = difficulty::estimate(3, &[], &[]);
        let titles = vec!["First".to_string(), "Second".to_string()];
        let preferences = GenerationPreferences {
            level: 3,
            interests: vec!["space".to_string(), "food".to_string()],
        };
        let ctx = GenerationContext {
            preferences: Some(&preferences),
            learn_words: &["apple".to_string()],
            review_words: &[],
            existing_titles: &titles,
            estimate: &estimate,
        };

        let prompt = build_article_prompt(&ctx);
        assert!(prompt.contains("- First"));
        assert!(prompt.contains("- Second"));
        assert!(prompt.contains("space, food"));
        assert!(prompt.contains("apple"));
        assert!(prompt.contains("Maintain current difficulty level"));
    }
}
