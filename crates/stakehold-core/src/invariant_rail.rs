use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actions::{Action, ActionOutcome};
use crate::bounds::RuntimeBounds;
use crate::clock::ManualClock;
use crate::config::StakingConfig;
use crate::engine::StakingEngine;
use crate::invariants::{InvariantCounterexample, InvariantId, InvariantViolation};
use crate::math::add;
use crate::slashing::StaticGovernance;
use crate::types::{ProverId, Timestamp};
use crate::{Result, StakeholdError};

/// One step of a replayable ledger trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStep {
    /// Move the manual clock forward.
    Advance { secs: u64 },
    Apply(Action),
}

/// Run a trace on a fresh engine and return the first invariant counterexample (if any).
///
/// Invariants checked:
/// - "no mutation on error" (state hash must not change if `apply` returns `Err`)
/// - `StakingEngine::check_invariants` after every successful action
/// - transition-level checks (slash factor monotonicity within a generation, reward split
///   conservation)
pub fn first_invariant_counterexample(
    config: &StakingConfig,
    bounds: RuntimeBounds,
    governance: StaticGovernance,
    start: Timestamp,
    steps: &[TraceStep],
) -> Result<Option<InvariantCounterexample>> {
    let clock = ManualClock::new(start);
    let mut eng = StakingEngine::new_with_bounds(
        config.clone(),
        bounds,
        Arc::new(clock.clone()),
        Arc::new(governance),
    )?;

    for (i, step) in steps.iter().enumerate() {
        let action = match step {
            TraceStep::Advance { secs } => {
                clock.advance(*secs)?;
                continue;
            }
            TraceStep::Apply(action) => action,
        };

        let before_hash = eng.state_hash()?;
        let before_escrow = escrow_snapshot(&eng);
        let counterexample = |violation: InvariantViolation, eng: &StakingEngine| {
            Ok::<_, StakeholdError>(Some(InvariantCounterexample {
                violation,
                at_step: i,
                state_hash: eng.state_hash()?,
                steps: steps[..=i].to_vec(),
            }))
        };

        match eng.apply(action) {
            Err(e) => {
                debug!(step = i, error = %e, "trace action rejected");
                if eng.state_hash()? != before_hash {
                    return counterexample(
                        InvariantViolation::new(
                            InvariantId::NoMutationOnError,
                            format!("action returned Err but state hash changed: {e}"),
                        ),
                        &eng,
                    );
                }
            }
            Ok(outcome) => {
                if let Some(v) = check_transition_invariants(action, &outcome, &before_escrow, &eng)
                {
                    return counterexample(v, &eng);
                }
                if let Err(v) = eng.check_invariants() {
                    return counterexample(v, &eng);
                }
            }
        }
    }

    Ok(None)
}

/// `(generation, slash_factor)` per prover.
fn escrow_snapshot(eng: &StakingEngine) -> BTreeMap<ProverId, (u64, u128)> {
    eng.state()
        .provers
        .iter()
        .map(|(id, p)| (*id, (p.escrow.generation(), p.escrow.slash_factor())))
        .collect()
}

fn check_transition_invariants(
    action: &Action,
    outcome: &ActionOutcome,
    before_escrow: &BTreeMap<ProverId, (u64, u128)>,
    eng: &StakingEngine,
) -> Option<InvariantViolation> {
    for (id, (generation, factor)) in escrow_snapshot(eng) {
        let Some((before_generation, before_factor)) = before_escrow.get(&id) else {
            continue;
        };
        if generation == *before_generation && factor > *before_factor {
            return Some(InvariantViolation::new(
                InvariantId::SlashFactorMonotone,
                format!(
                    "prover {id}: slash factor rose from {before_factor} to {factor} in generation {generation}"
                ),
            ));
        }
        if generation < *before_generation {
            return Some(InvariantViolation::new(
                InvariantId::SlashFactorMonotone,
                format!("prover {id}: escrow generation went back to {generation}"),
            ));
        }
    }

    if let (Action::Reward { amount, .. }, ActionOutcome::Reward(split)) = (action, outcome) {
        let total = add(split.protocol_fee, split.owner_fee)
            .and_then(|v| add(v, split.staker_reward))
            .and_then(|v| add(v, split.dust));
        if total.as_ref() != Ok(amount) {
            return Some(InvariantViolation::new(
                InvariantId::Conservation,
                format!("reward split {split:?} does not sum to gross {amount}"),
            ));
        }
    }
    None
}

/// Minimize a counterexample by removing steps while preserving the same invariant id.
///
/// This is a deterministic delta-debugging (ddmin) pass over the step list.
pub fn minimize_counterexample(
    config: &StakingConfig,
    bounds: RuntimeBounds,
    governance: StaticGovernance,
    start: Timestamp,
    ce: &InvariantCounterexample,
) -> Result<InvariantCounterexample> {
    let want = ce.violation.id;
    let run = |steps: &[TraceStep]| {
        first_invariant_counterexample(config, bounds, governance, start, steps)
    };

    // Always start from the smallest prefix that actually triggers the violation.
    let Some(first) = run(&ce.steps)? else {
        return Err(StakeholdError::Internal(
            "minimize_counterexample: provided trace does not reproduce".into(),
        ));
    };
    if first.violation.id != want {
        return Err(StakeholdError::Internal(
            "minimize_counterexample: provided trace reproduces a different invariant".into(),
        ));
    }
    let mut cur = first.steps;

    let mut n = 2usize;
    while cur.len() >= 2 {
        let len = cur.len();
        let chunk = len.div_ceil(n);
        let mut reduced = false;

        for start_idx in (0..len).step_by(chunk) {
            let end = (start_idx + chunk).min(len);
            if start_idx == 0 && end == len {
                continue;
            }
            let mut cand = Vec::with_capacity(len - (end - start_idx));
            cand.extend_from_slice(&cur[..start_idx]);
            cand.extend_from_slice(&cur[end..]);

            let Some(r) = run(&cand)? else {
                continue;
            };
            if r.violation.id != want {
                continue;
            }

            cur = r.steps;
            n = n.saturating_sub(1).max(2);
            reduced = true;
            break;
        }

        if reduced {
            continue;
        }
        if n >= len {
            break;
        }
        n = (n * 2).min(len);
    }

    run(&cur)?.ok_or_else(|| {
        StakeholdError::Internal(
            "minimize_counterexample: lost counterexample during minimization".into(),
        )
    })
}
