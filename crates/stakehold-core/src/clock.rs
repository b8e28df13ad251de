//! Injectable time source.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;
use crate::{Result, StakeholdError};

/// Monotonic seconds source consulted once per engine operation.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Result<Timestamp>;
}

/// Wall-clock seconds since the unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| StakeholdError::Internal("system clock error".into()))?;
        Ok(now.as_secs())
    }
}

/// Deterministic clock for tests and simulations.
///
/// Clones share the same underlying time, so a test can keep a handle while the engine owns
/// another. Time only moves forward.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> ManualClock {
        ManualClock {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, secs: u64) -> Result<Timestamp> {
        let current = self.now.load(Ordering::SeqCst);
        let next = current
            .checked_add(secs)
            .ok_or_else(|| StakeholdError::Overflow("clock overflow".into()))?;
        self.now.store(next, Ordering::SeqCst);
        Ok(next)
    }

    /// Jumps to `at`; earlier targets are rejected.
    pub fn set(&self, at: Timestamp) -> Result<()> {
        let current = self.now.load(Ordering::SeqCst);
        if at < current {
            return Err(StakeholdError::ClockWentBackwards {
                last: current,
                now: at,
            });
        }
        self.now.store(at, Ordering::SeqCst);
        Ok(())
    }

    pub fn get(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Timestamp> {
        Ok(self.get())
    }
}
