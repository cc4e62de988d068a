use serde::{Deserialize, Serialize};

const MIN_LEVEL: i32 = 1;
const MAX_LEVEL: i32 = 10;

/// Escalation gates: the high gate must be checked before the low one, since
/// any ratio above 0.8 also clears 0.6.
const HIGH_RATIO: f64 = 0.8;
const HIGH_MIN_TOTAL: usize = 20;
const LOW_RATIO: f64 = 0.6;
const LOW_MIN_TOTAL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Beginner => "beginner",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
            Tier::Expert => "expert",
        }
    }

    pub fn from_level(level: i32) -> Self {
        if level >= 8 {
            Tier::Advanced
        } else if level >= 5 {
            Tier::Intermediate
        } else {
            Tier::Beginner
        }
    }
}

#[derive(Debug, Clone)]
pub struct DifficultyEstimate {
    pub effective_level: i32,
    pub tier: Tier,
    pub rationale: String,
}

/// Derives the difficulty the generator should target from the user's base
/// level plus mastery evidence: a vocabulary dominated by review-due words
/// means the user has outgrown their configured level.
pub fn estimate(base_level: i32, learn_words: &[String], review_words: &[String]) -> DifficultyEstimate {
    let base_level = base_level.clamp(MIN_LEVEL, MAX_LEVEL);
    let base_tier = Tier::from_level(base_level);

    let total = learn_words.len() + review_words.len();
    let review_ratio = if total > 0 {
        review_words.len() as f64 / total as f64
    } else {
        0.0
    };

    let (tier, effective_level) = if review_ratio > HIGH_RATIO && total >= HIGH_MIN_TOTAL {
        match base_tier {
            Tier::Beginner => (Tier::Advanced, (base_level + 3).min(MAX_LEVEL)),
            Tier::Intermediate | Tier::Advanced | Tier::Expert => (Tier::Expert, MAX_LEVEL),
        }
    } else if review_ratio > LOW_RATIO && total >= LOW_MIN_TOTAL {
        match base_tier {
            Tier::Beginner => (Tier::Intermediate, (base_level + 2).min(MAX_LEVEL)),
            Tier::Intermediate => (Tier::Advanced, (base_level + 2).min(MAX_LEVEL)),
            Tier::Advanced | Tier::Expert => (Tier::Expert, MAX_LEVEL),
        }
    } else {
        (base_tier, base_level)
    };

    let rationale = rationale_for(base_tier, tier, effective_level, review_ratio, total);

    DifficultyEstimate {
        effective_level: effective_level.clamp(MIN_LEVEL, MAX_LEVEL),
        tier,
        rationale,
    }
}

fn rationale_for(
    base_tier: Tier,
    tier: Tier,
    level: i32,
    review_ratio: f64,
    total: usize,
) -> String {
    if base_tier == tier {
        return format!(
            "Maintain current difficulty level ({} - Level {}). User is still building vocabulary at this level.",
            base_tier.as_str(),
            level
        );
    }

    let progress = format!("{:.1}% review words, {} total words", review_ratio * 100.0, total);
    match tier {
        Tier::Intermediate => format!(
            "INCREASE DIFFICULTY: User shows good progress ({progress}). Gradually introduce intermediate-level vocabulary (Level {level}) and slightly more complex sentence structures while maintaining conversational tone."
        ),
        Tier::Advanced => format!(
            "INCREASE DIFFICULTY: User demonstrates strong vocabulary progress ({progress}). Use more sophisticated vocabulary (Level {level}), complex sentence structures, and introduce idiomatic expressions while keeping it engaging."
        ),
        Tier::Expert => format!(
            "MAXIMUM DIFFICULTY: User shows excellent mastery ({progress}). Use advanced vocabulary (Level {level}), complex grammatical structures, nuanced expressions, and sophisticated concepts while maintaining readability."
        ),
        Tier::Beginner => format!("Maintain current difficulty level (beginner - Level {level})."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn no_vocabulary_keeps_base_level() {
        let estimate = estimate(4, &[], &[]);
        assert_eq!(estimate.effective_level, 4);
        assert_eq!(estimate.tier, Tier::Beginner);
    }

    #[test]
    fn beginner_escalates_to_intermediate_on_good_progress() {
        // 15 review words out of 15: ratio 1.0, total below the high gate.
        let estimate = estimate(3, &[], &words(15));
        assert_eq!(estimate.tier, Tier::Intermediate);
        assert_eq!(estimate.effective_level, 5);
    }

    #[test]
    fn advanced_escalates_to_expert_on_high_mastery() {
        // ratio 0.85 >= high gate with 25+ total words.
        let estimate = estimate(9, &words(4), &words(22));
        assert_eq!(estimate.tier, Tier::Expert);
        assert_eq!(estimate.effective_level, 10);
    }

    #[test]
    fn high_gate_takes_precedence_over_low_gate() {
        // Both gates hold; beginner must jump straight to advanced.
        let estimate = estimate(2, &words(2), &words(20));
        assert_eq!(estimate.tier, Tier::Advanced);
        assert_eq!(estimate.effective_level, 5);
    }

    #[test]
    fn high_ratio_without_volume_uses_low_gate() {
        // ratio 1.0 but only 12 words: high gate misses on total.
        let estimate = estimate(6, &[], &words(12));
        assert_eq!(estimate.tier, Tier::Advanced);
        assert_eq!(estimate.effective_level, 8);
    }

    #[test]
    fn effective_level_is_capped_at_ten() {
        let estimate = estimate(9, &[], &words(15));
        assert_eq!(estimate.tier, Tier::Expert);
        assert_eq!(estimate.effective_level, 10);
    }

    #[test]
    fn base_level_is_clamped_before_tiering() {
        assert_eq!(estimate(0, &[], &[]).effective_level, 1);
        assert_eq!(estimate(99, &[], &[]).effective_level, 10);
        assert_eq!(estimate(99, &[], &[]).tier, Tier::Advanced);
    }

    #[test]
    fn rationale_embeds_progress_numbers() {
        let estimate = estimate(3, &[], &words(15));
        assert!(estimate.rationale.contains("100.0%"));
        assert!(estimate.rationale.contains("15 total words"));
    }
}
