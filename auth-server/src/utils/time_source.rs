// auth-server/src/utils/time_source.rs
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Abstracts the wall clock so expiry logic can be tested without sleeping
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Epoch milliseconds, the unit used for every wire timestamp
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests
#[derive(Debug, Clone)]
pub struct FakeTimeSource {
    t: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for FakeTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTimeSource {
    pub fn new() -> Self {
        Self::new_set(Utc::now())
    }

    pub fn new_set(t: DateTime<Utc>) -> Self {
        Self {
            t: Arc::new(Mutex::new(t)),
        }
    }

    pub fn set(&self, t: DateTime<Utc>) {
        let mut state = self.t.lock().unwrap_or_else(|e| e.into_inner());
        *state = t;
    }

    pub fn advance(&self, time_quantum: Duration) {
        let mut state = self.t.lock().unwrap_or_else(|e| e.into_inner());
        *state += time_quantum;
    }
}

impl TimeSource for FakeTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.t.lock().unwrap_or_else(|e| e.into_inner())
    }
}
