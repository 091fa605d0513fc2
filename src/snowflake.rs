//! Snowflake-style 64-bit ID generator.
//!
//! Layout, most significant bit first:
//!
//! ```text
//! | 1 bit: 0 | 41 bits: ms since EPOCH_MS | 10 bits: machine id | 12 bits: sequence |
//! ```

use chrono::Utc;
use parking_lot::Mutex;

/// 2021-01-01T00:00:00Z in unix milliseconds.
pub const EPOCH_MS: i64 = 1_609_459_200_000;

const MACHINE_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

pub const MAX_MACHINE_ID: i64 = (1 << MACHINE_ID_BITS) - 1;
pub const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

const MACHINE_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_ID_BITS;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("machine id {0} is outside 0..={MAX_MACHINE_ID}")]
    InvalidMachineId(i64),

    #[error("clock moved backwards by {0} ms, refusing to generate id")]
    ClockMovedBackwards(i64),
}

#[derive(Debug, Default)]
struct State {
    last_timestamp: i64,
    sequence: i64,
}

/// Thread-safe ID generator bound to one machine id.
#[derive(Debug)]
pub struct Snowflake {
    machine_id: i64,
    state: Mutex<State>,
}

impl Snowflake {
    pub fn new(machine_id: i64) -> Result<Self, SnowflakeError> {
        if !(0..=MAX_MACHINE_ID).contains(&machine_id) {
            return Err(SnowflakeError::InvalidMachineId(machine_id));
        }

        Ok(Self {
            machine_id,
            state: Mutex::new(State::default()),
        })
    }

    pub fn machine_id(&self) -> i64 {
        self.machine_id
    }

    /// Generate the next ID using the wall clock.
    pub fn next_id(&self) -> Result<i64, SnowflakeError> {
        self.next_id_with(current_millis)
    }

    /// Generate the next ID reading time from `clock`.
    ///
    /// When the sequence overflows within one millisecond the generator spins
    /// on `clock` until it advances.
    fn next_id_with(&self, mut clock: impl FnMut() -> i64) -> Result<i64, SnowflakeError> {
        let mut state = self.state.lock();
        let mut now = clock();

        if now < state.last_timestamp {
            return Err(SnowflakeError::ClockMovedBackwards(
                state.last_timestamp - now,
            ));
        }

        if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                while now <= state.last_timestamp {
                    std::hint::spin_loop();
                    now = clock();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = now;

        Ok(((now - EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.machine_id << MACHINE_ID_SHIFT)
            | state.sequence)
    }
}

/// Split an ID into (unix ms timestamp, machine id, sequence).
pub fn decompose(id: i64) -> (i64, i64, i64) {
    let timestamp = (id >> TIMESTAMP_SHIFT) + EPOCH_MS;
    let machine_id = (id >> MACHINE_ID_SHIFT) & MAX_MACHINE_ID;
    let sequence = id & MAX_SEQUENCE;
    (timestamp, machine_id, sequence)
}

fn current_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn rejects_out_of_range_machine_id() {
        assert_eq!(
            Snowflake::new(1024).unwrap_err(),
            SnowflakeError::InvalidMachineId(1024)
        );
        assert!(Snowflake::new(-1).is_err());
        assert!(Snowflake::new(0).is_ok());
        assert!(Snowflake::new(MAX_MACHINE_ID).is_ok());
    }

    #[test]
    fn ids_are_strictly_increasing_and_unique() {
        let generator = Snowflake::new(7).unwrap();
        let mut previous = 0;
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            let id = generator.next_id().unwrap();
            assert!(id > previous);
            assert!(seen.insert(id));
            previous = id;
        }
    }

    #[test]
    fn decompose_recovers_parts() {
        let generator = Snowflake::new(42).unwrap();
        let fixed = EPOCH_MS + 123_456;

        let first = generator.next_id_with(|| fixed).unwrap();
        let second = generator.next_id_with(|| fixed).unwrap();

        assert_eq!(decompose(first), (fixed, 42, 0));
        assert_eq!(decompose(second), (fixed, 42, 1));
    }

    #[test]
    fn sequence_resets_on_new_millisecond() {
        let generator = Snowflake::new(1).unwrap();
        let start = EPOCH_MS + 1_000;

        generator.next_id_with(|| start).unwrap();
        generator.next_id_with(|| start).unwrap();
        let id = generator.next_id_with(|| start + 1).unwrap();

        assert_eq!(decompose(id), (start + 1, 1, 0));
    }

    #[test]
    fn sequence_overflow_waits_for_next_millisecond() {
        let generator = Snowflake::new(3).unwrap();
        let start = EPOCH_MS + 5_000;

        for _ in 0..=MAX_SEQUENCE {
            generator.next_id_with(|| start).unwrap();
        }

        // The clock only advances after being polled a few times.
        let mut calls = 0;
        let id = generator
            .next_id_with(|| {
                calls += 1;
                if calls < 4 { start } else { start + 1 }
            })
            .unwrap();

        assert_eq!(decompose(id), (start + 1, 3, 0));
        assert!(calls >= 4);
    }

    #[test]
    fn clock_moving_backwards_is_an_error() {
        let generator = Snowflake::new(1).unwrap();
        let start = EPOCH_MS + 10_000;

        generator.next_id_with(|| start).unwrap();
        let err = generator.next_id_with(|| start - 5).unwrap_err();

        assert_eq!(err, SnowflakeError::ClockMovedBackwards(5));
    }

    #[test]
    fn concurrent_generation_never_collides() {
        let generator = Arc::new(Snowflake::new(9).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 8_000);
    }
}
