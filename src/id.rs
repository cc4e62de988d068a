use chrono::Utc;
use parking_lot::Mutex;

// Twitter-style snowflake layout: 41 bits millis, 10 bits worker, 12 bits sequence.
const EPOCH_MS: i64 = 1_577_836_800_000; // 2020-01-01T00:00:00Z
const WORKER_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const MAX_WORKER_ID: i64 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

/// Process-local snowflake id generator. Constructed once and shared through
/// `AppState` instead of living behind a global.
pub struct IdGenerator {
    worker_id: i64,
    state: Mutex<GeneratorState>,
}

struct GeneratorState {
    last_timestamp: i64,
    sequence: i64,
}

impl IdGenerator {
    pub fn new(worker_id: i64) -> Self {
        Self {
            worker_id: worker_id.clamp(0, MAX_WORKER_ID),
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        }
    }

    pub fn from_env() -> Self {
        let worker_id = std::env::var("ID_WORKER_ID")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(1);
        Self::new(worker_id)
    }

    pub fn next_id(&self) -> String {
        let mut state = self.state.lock();
        let mut now = Utc::now().timestamp_millis();

        if now < state.last_timestamp {
            // Clock went backwards; hold the line at the last seen timestamp.
            now = state.last_timestamp;
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = now;

        let id = ((now - EPOCH_MS) << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;

        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let generator = IdGenerator::new(1);
        let mut previous = 0i64;
        for _ in 0..4096 {
            let id: i64 = generator.next_id().parse().unwrap();
            assert!(id > previous);
            previous = id;
        }
    }

    #[test]
    fn worker_id_is_clamped() {
        let generator = IdGenerator::new(99_999);
        let id: i64 = generator.next_id().parse().unwrap();
        assert_eq!((id >> SEQUENCE_BITS) & MAX_WORKER_ID, MAX_WORKER_ID);
    }
}
