use chrono::{DateTime, Utc};

use crate::services::srs::{self, ReviewStatus, WordStrength};

/// Cap per list so one user's backlog cannot flood the generation prompt.
const MAX_WORDS_PER_LIST: usize = 10;

#[derive(Debug, Clone)]
pub struct TrackedWord {
    pub word: String,
    pub strength: WordStrength,
}

#[derive(Debug, Clone, Default)]
pub struct WordSelection {
    pub learn_words: Vec<String>,
    pub review_words: Vec<String>,
}

/// Partitions a vocabulary snapshot into learn and review lists. Order is the
/// caller's iteration order (the repository query is stable), truncated to
/// [`MAX_WORDS_PER_LIST`] per list; `NotDue` words are dropped.
pub fn select(tracked: &[TrackedWord], now: DateTime<Utc>) -> WordSelection {
    let mut selection = WordSelection::default();

    for entry in tracked {
        match srs::classify(&entry.strength, now) {
            ReviewStatus::Learning => {
                if selection.learn_words.len() < MAX_WORDS_PER_LIST {
                    selection.learn_words.push(entry.word.clone());
                }
            }
            ReviewStatus::ReviewDue => {
                if selection.review_words.len() < MAX_WORDS_PER_LIST {
                    selection.review_words.push(entry.word.clone());
                }
            }
            ReviewStatus::NotDue => {}
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tracked(word: &str, learn_count: i32, fluency: i32, days_ago: i64) -> TrackedWord {
        TrackedWord {
            word: word.to_string(),
            strength: WordStrength {
                learn_count,
                fluency,
                last_updated_at: Utc::now() - Duration::days(days_ago),
            },
        }
    }

    #[test]
    fn partitions_learning_and_review() {
        let now = Utc::now();
        let words = vec![
            tracked("apple", 1, 20, 0),   // learning: few attempts
            tracked("banana", 5, 60, 8),  // review: past 7-day interval
            tracked("cherry", 5, 60, 2),  // not due
            tracked("damson", 4, 30, 0),  // learning: weak
        ];

        let selection = select(&words, now);
        assert_eq!(selection.learn_words, vec!["apple", "damson"]);
        assert_eq!(selection.review_words, vec!["banana"]);
    }

    #[test]
    fn no_word_lands_in_both_lists() {
        let now = Utc::now();
        let words: Vec<TrackedWord> = (0..40)
            .map(|i| tracked(&format!("word{i}"), i % 6, (i * 7) % 101, (i % 40) as i64))
            .collect();

        let selection = select(&words, now);
        for word in &selection.learn_words {
            assert!(!selection.review_words.contains(word));
        }
    }

    #[test]
    fn lists_are_capped_at_ten() {
        let now = Utc::now();
        let mut words = Vec::new();
        for i in 0..25 {
            words.push(tracked(&format!("new{i}"), 0, 0, 0));
            words.push(tracked(&format!("due{i}"), 5, 60, 10));
        }

        let selection = select(&words, now);
        assert_eq!(selection.learn_words.len(), 10);
        assert_eq!(selection.review_words.len(), 10);
        // Earliest-encountered entries win.
        assert_eq!(selection.learn_words[0], "new0");
        assert_eq!(selection.review_words[0], "due0");
    }

    #[test]
    fn selection_is_deterministic_for_a_snapshot() {
        let now = Utc::now();
        let words = vec![
            tracked("alpha", 0, 0, 0),
            tracked("beta", 5, 95, 40),
            tracked("gamma", 5, 55, 3),
        ];

        let first = select(&words, now);
        let second = select(&words, now);
        assert_eq!(first.learn_words, second.learn_words);
        assert_eq!(first.review_words, second.review_words);
    }
}
