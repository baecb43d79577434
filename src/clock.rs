// Time and id sources used when stamping documents

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Mutex;
use uuid::Uuid;

/// Source of "now" for timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to milliseconds so stored timestamps round-trip exactly
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now.trunc_subsecs(3)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now.trunc_subsecs(3);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Timestamp for a mutation of a document last written at `previous`
///
/// Always strictly after `previous`: when the clock has not moved past it
/// (coarse resolution, or a clock behind the stored value) the result is
/// `previous + 1ms`.
pub fn next_timestamp(clock: &dyn Clock, previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = clock.now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Source of primary keys for new documents
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// UUIDv7 ids: 128 bits, time ordered, with 74 random bits per id
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn generate(&self) -> String {
        Uuid::now_v7().to_string()
    }
}
