use chrono::{Duration, Utc};
use proptest::prelude::*;

use lexnews_backend::services::difficulty;
use lexnews_backend::services::selection::{self, TrackedWord};
use lexnews_backend::services::srs::{self, ReviewStatus, WordStrength};

proptest! {
    #[test]
    fn fluency_stays_in_range(
        start in -50i32..150,
        attempts in proptest::collection::vec(any::<bool>(), 0..200),
    ) {
        let mut learn_count = 0;
        let mut fluency = start.clamp(0, 100);
        for correct in attempts {
            let (next_count, next_fluency) = srs::apply_attempt(learn_count, fluency, correct);
            prop_assert_eq!(next_count, learn_count + 1);
            prop_assert!((0..=100).contains(&next_fluency));
            learn_count = next_count;
            fluency = next_fluency;
        }
    }

    #[test]
    fn weak_or_underpracticed_words_always_learn(
        learn_count in 0i32..100,
        fluency in 0i32..=100,
        days_ago in 0i64..1000,
    ) {
        let now = Utc::now();
        let strength = WordStrength {
            learn_count,
            fluency,
            last_updated_at: now - Duration::days(days_ago),
        };

        let status = srs::classify(&strength, now);
        if learn_count < 3 || fluency < 50 {
            prop_assert_eq!(status, ReviewStatus::Learning);
        } else {
            prop_assert_ne!(status, ReviewStatus::Learning);
        }
    }

    #[test]
    fn selection_lists_are_disjoint_and_bounded(
        words in proptest::collection::vec(
            (0i32..10, 0i32..=100, 0i64..60),
            0..60,
        ),
    ) {
        let now = Utc::now();
        let tracked: Vec<TrackedWord> = words
            .iter()
            .enumerate()
            .map(|(i, (learn_count, fluency, days_ago))| TrackedWord {
                word: format!("word{i}"),
                strength: WordStrength {
                    learn_count: *learn_count,
                    fluency: *fluency,
                    last_updated_at: now - Duration::days(*days_ago),
                },
            })
            .collect();

        let result = selection::select(&tracked, now);
        prop_assert!(result.learn_words.len() <= 10);
        prop_assert!(result.review_words.len() <= 10);
        for word in &result.learn_words {
            prop_assert!(!result.review_words.contains(word));
        }
    }

    #[test]
    fn estimated_level_always_in_range(
        base_level in -5i32..20,
        learn in 0usize..40,
        review in 0usize..40,
    ) {
        let learn_words: Vec<String> = (0..learn).map(|i| format!("l{i}")).collect();
        let review_words: Vec<String> = (0..review).map(|i| format!("r{i}")).collect();

        let estimate = difficulty::estimate(base_level, &learn_words, &review_words);
        prop_assert!((1..=10).contains(&estimate.effective_level));
        prop_assert!(!estimate.rationale.is_empty());
    }
}
