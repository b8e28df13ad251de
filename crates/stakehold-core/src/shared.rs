//! Thread-safe handle for multi-threaded hosts.
//!
//! One lock serializes every call, which covers both the per-prover critical sections and the
//! cross-prover dispense path.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::actions::{Action, ActionOutcome};
use crate::engine::StakingEngine;
use crate::{Hash32, Result, StakeholdError};

#[derive(Clone, Debug)]
pub struct SharedStakingEngine {
    inner: Arc<Mutex<StakingEngine>>,
}

impl SharedStakingEngine {
    pub fn new(engine: StakingEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StakingEngine>> {
        self.inner
            .lock()
            .map_err(|_| StakeholdError::Internal("staking engine lock poisoned".into()))
    }

    pub fn apply(&self, action: &Action) -> Result<ActionOutcome> {
        self.lock()?.apply(action)
    }

    /// Runs `f` with exclusive access; no other call interleaves with it.
    pub fn with<R>(&self, f: impl FnOnce(&mut StakingEngine) -> Result<R>) -> Result<R> {
        let mut guard = self.lock()?;
        f(&mut guard)
    }

    pub fn read<R>(&self, f: impl FnOnce(&StakingEngine) -> R) -> Result<R> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    pub fn state_hash(&self) -> Result<Hash32> {
        self.lock()?.state_hash()
    }
}
