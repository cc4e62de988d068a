use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LEARNING_MIN_ATTEMPTS: i32 = 3;
const LEARNING_FLUENCY_FLOOR: i32 = 50;
const FLUENCY_GAIN: i32 = 10;
const FLUENCY_LOSS: i32 = 5;

/// Forgetting-curve bands, highest fluency first.
const REVIEW_BANDS: [(i32, i64); 3] = [(90, 30), (70, 14), (50, 7)];
const DEFAULT_REVIEW_INTERVAL_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    /// Under-practiced or weak; always surfaced for learning.
    Learning,
    /// Practiced enough and past its review interval.
    ReviewDue,
    /// Practiced enough and still inside its review interval.
    NotDue,
}

#[derive(Debug, Clone, Copy)]
pub struct WordStrength {
    pub learn_count: i32,
    pub fluency: i32,
    pub last_updated_at: DateTime<Utc>,
}

pub fn review_interval_days(fluency: i32) -> i64 {
    for (threshold, days) in REVIEW_BANDS {
        if fluency >= threshold {
            return days;
        }
    }
    DEFAULT_REVIEW_INTERVAL_DAYS
}

pub fn classify(strength: &WordStrength, now: DateTime<Utc>) -> ReviewStatus {
    if strength.learn_count < LEARNING_MIN_ATTEMPTS || strength.fluency < LEARNING_FLUENCY_FLOOR {
        return ReviewStatus::Learning;
    }

    let days_since_update = (now - strength.last_updated_at).num_days();
    if days_since_update >= review_interval_days(strength.fluency) {
        ReviewStatus::ReviewDue
    } else {
        ReviewStatus::NotDue
    }
}

/// Fluency delta for one practice attempt. The persistence layer applies it
/// with a clamped single-statement update; this is the reference semantics.
pub fn attempt_delta(correct: bool) -> i32 {
    if correct {
        FLUENCY_GAIN
    } else {
        -FLUENCY_LOSS
    }
}

pub fn apply_attempt(learn_count: i32, fluency: i32, correct: bool) -> (i32, i32) {
    let next_fluency = (fluency + attempt_delta(correct)).clamp(0, 100);
    (learn_count + 1, next_fluency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn strength(now: DateTime<Utc>, learn_count: i32, fluency: i32, days_ago: i64) -> WordStrength {
        WordStrength {
            learn_count,
            fluency,
            last_updated_at: now - Duration::days(days_ago),
        }
    }

    #[test]
    fn weak_words_are_always_learning() {
        let now = Utc::now();
        // Low attempt count dominates, even after a year untouched.
        assert_eq!(classify(&strength(now, 2, 100, 365), now), ReviewStatus::Learning);
        // Low fluency dominates too.
        assert_eq!(classify(&strength(now, 50, 49, 365), now), ReviewStatus::Learning);
        assert_eq!(classify(&strength(now, 0, 0, 0), now), ReviewStatus::Learning);
    }

    #[test]
    fn review_boundary_at_seven_days() {
        let now = Utc::now();
        assert_eq!(classify(&strength(now, 5, 60, 7), now), ReviewStatus::ReviewDue);
        assert_eq!(classify(&strength(now, 5, 60, 6), now), ReviewStatus::NotDue);
    }

    #[test]
    fn higher_fluency_waits_longer() {
        let now = Utc::now();
        assert_eq!(classify(&strength(now, 5, 70, 13), now), ReviewStatus::NotDue);
        assert_eq!(classify(&strength(now, 5, 70, 14), now), ReviewStatus::ReviewDue);
        assert_eq!(classify(&strength(now, 5, 90, 29), now), ReviewStatus::NotDue);
        assert_eq!(classify(&strength(now, 5, 90, 30), now), ReviewStatus::ReviewDue);
    }

    #[test]
    fn interval_bands_check_highest_first() {
        assert_eq!(review_interval_days(100), 30);
        assert_eq!(review_interval_days(90), 30);
        assert_eq!(review_interval_days(89), 14);
        assert_eq!(review_interval_days(70), 14);
        assert_eq!(review_interval_days(50), 7);
        assert_eq!(review_interval_days(49), 3);
    }

    #[test]
    fn attempts_clamp_fluency() {
        assert_eq!(apply_attempt(0, 95, true), (1, 100));
        assert_eq!(apply_attempt(0, 100, true), (1, 100));
        assert_eq!(apply_attempt(3, 3, false), (4, 0));
        assert_eq!(apply_attempt(3, 0, false), (4, 0));
        assert_eq!(apply_attempt(7, 40, true), (8, 50));
    }

    #[test]
    fn classify_is_pure() {
        let now = Utc::now();
        let word = strength(now, 5, 75, 10);
        assert_eq!(classify(&word, now), classify(&word, now));
    }
}
