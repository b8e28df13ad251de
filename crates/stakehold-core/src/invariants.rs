use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::StakingEngine;
use crate::invariant_rail::TraceStep;
use crate::math::add;
use crate::types::ProverId;
use crate::{Hash32, StakeholdError};

/// Stable identifiers for ledger invariants (used for testing and counterexamples).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantId {
    /// Engine mutated state even though the action returned `Err`.
    NoMutationOnError,

    /// `issued_total != wallets + global vault backing + burned_total`.
    Conservation,

    /// Global normalized share supply disagreed with live vault backing plus escrow.
    NormalizedSharesConserve,

    /// A prover's receipt supply disagreed with its vault share supply.
    ReceiptSupplyMatchesVault,

    /// Outstanding unstake claims were worth more than the escrow pool holds.
    ShareBinding,

    /// An escrow slash factor increased within one generation.
    SlashFactorMonotone,

    /// A staker held receipts or claims of a prover other than its bound one.
    SingleProverBinding,

    /// More was dispensed than the limiter ever accrued.
    DispenseCeiling,

    /// `pending_slashes` disagreed with the number of pending slash claims.
    PendingSlashCount,

    /// Safety bounds were exceeded (unreachable state).
    BoundsRespected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for StakeholdError {
    fn from(v: InvariantViolation) -> Self {
        StakeholdError::Internal(format!("ledger invariant violated: {v}"))
    }
}

/// A reproducible invariant failure with its trace prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantCounterexample {
    pub violation: InvariantViolation,
    /// Index of the first step that leads to a violated invariant.
    pub at_step: usize,
    /// State hash at the time of detection.
    pub state_hash: Hash32,
    /// The step prefix that reproduces the violation (includes the failing step).
    pub steps: Vec<TraceStep>,
}

impl InvariantCounterexample {
    pub fn short(&self) -> String {
        format!(
            "Invariant {:?} violated at step {} (state_hash={})",
            self.violation.id,
            self.at_step,
            self.state_hash.to_hex()
        )
    }
}

fn arith(id: InvariantId, e: StakeholdError) -> InvariantViolation {
    InvariantViolation::new(id, format!("arithmetic failed while checking: {e}"))
}

impl StakingEngine {
    /// Checks every state invariant of the ledger.
    ///
    /// Slash factor monotonicity is a transition property and is checked by the invariant rail.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        let state = self.state();
        let bounds = self.bounds();

        if state.provers.len() > bounds.max_provers || state.stakers.len() > bounds.max_stakers {
            return Err(InvariantViolation::new(
                InvariantId::BoundsRespected,
                format!(
                    "provers={} (max {}), stakers={} (max {})",
                    state.provers.len(),
                    bounds.max_provers,
                    state.stakers.len(),
                    bounds.max_stakers
                ),
            ));
        }

        // Conservation of collateral.
        let id = InvariantId::Conservation;
        let wallets = state.collateral.total().map_err(|e| arith(id, e))?;
        let accounted = add(wallets, state.global.total_assets())
            .and_then(|v| add(v, state.burned_total))
            .map_err(|e| arith(id, e))?;
        if accounted != state.issued_total {
            return Err(InvariantViolation::new(
                id,
                format!(
                    "issued_total({}) != wallets({}) + global_assets({}) + burned_total({})",
                    state.issued_total,
                    wallets,
                    state.global.total_assets(),
                    state.burned_total
                ),
            ));
        }

        // Per-prover structure.
        let mut normalized = 0u128;
        for (prover_id, p) in &state.provers {
            normalized = p
                .exposure()
                .and_then(|x| add(normalized, x))
                .map_err(|e| arith(InvariantId::NormalizedSharesConserve, e))?;

            if p.receipts.total_supply() != p.vault.total_shares() {
                return Err(InvariantViolation::new(
                    InvariantId::ReceiptSupplyMatchesVault,
                    format!(
                        "prover {prover_id}: receipt supply {} != vault shares {}",
                        p.receipts.total_supply(),
                        p.vault.total_shares()
                    ),
                ));
            }

            if p.pending_slashes > bounds.max_pending_slashes_per_prover {
                return Err(InvariantViolation::new(
                    InvariantId::BoundsRespected,
                    format!(
                        "prover {prover_id}: {} pending slashes (max {})",
                        p.pending_slashes, bounds.max_pending_slashes_per_prover
                    ),
                ));
            }
            let pending = p.slash_requests.iter().filter(|c| c.is_pending()).count();
            if pending != p.pending_slashes {
                return Err(InvariantViolation::new(
                    InvariantId::PendingSlashCount,
                    format!(
                        "prover {prover_id}: pending_slashes={} but {pending} claims pending",
                        p.pending_slashes
                    ),
                ));
            }

            for (holder, balance) in p.receipts.holders() {
                if *balance == 0 {
                    continue;
                }
                let bound = state.stakers.get(holder).map(|s| s.prover);
                if bound != Some(*prover_id) {
                    return Err(InvariantViolation::new(
                        InvariantId::SingleProverBinding,
                        format!("{holder} holds receipts of {prover_id} but is bound to {bound:?}"),
                    ));
                }
            }
        }
        if normalized != state.global.total_shares() {
            return Err(InvariantViolation::new(
                InvariantId::NormalizedSharesConserve,
                format!(
                    "global shares {} != sum of vault backing and escrow {normalized}",
                    state.global.total_shares()
                ),
            ));
        }

        // Per-staker claims.
        let mut claimed: BTreeMap<ProverId, u128> = BTreeMap::new();
        let max_claims = self.config().limits.max_unstake_requests;
        for (staker, s) in &state.stakers {
            let Some(p) = state.provers.get(&s.prover) else {
                return Err(InvariantViolation::new(
                    InvariantId::SingleProverBinding,
                    format!("{staker} is bound to unknown prover {}", s.prover),
                ));
            };
            if p.receipts.balance_of(staker) == 0 && s.unstakes.is_empty() {
                return Err(InvariantViolation::new(
                    InvariantId::SingleProverBinding,
                    format!("{staker} is bound to {} with no position", s.prover),
                ));
            }
            if s.unstakes.len() > max_claims {
                return Err(InvariantViolation::new(
                    InvariantId::BoundsRespected,
                    format!("{staker}: {} unstake claims (max {max_claims})", s.unstakes.len()),
                ));
            }
            for claim in s.unstakes.claims() {
                if claim.prover != s.prover {
                    return Err(InvariantViolation::new(
                        InvariantId::SingleProverBinding,
                        format!(
                            "{staker} bound to {} holds a claim on {}",
                            s.prover, claim.prover
                        ),
                    ));
                }
                let id = InvariantId::ShareBinding;
                let value = p
                    .escrow
                    .claim_value(claim.shares, claim.slash_factor, claim.generation)
                    .map_err(|e| arith(id, e))?;
                let entry = claimed.entry(s.prover).or_insert(0);
                *entry = add(*entry, value).map_err(|e| arith(id, e))?;
            }
        }
        for (prover_id, total) in claimed {
            let escrowed = state
                .provers
                .get(&prover_id)
                .map(|p| p.escrow.escrowed_shares())
                .unwrap_or(0);
            if total > escrowed {
                return Err(InvariantViolation::new(
                    InvariantId::ShareBinding,
                    format!("prover {prover_id}: claims worth {total} > escrowed {escrowed}"),
                ));
            }
        }

        let id = InvariantId::DispenseCeiling;
        let accrued = state
            .dispense
            .cumulative_accrual(state.now)
            .map_err(|e| arith(id, e))?;
        if state.dispensed_total > accrued {
            return Err(InvariantViolation::new(
                id,
                format!(
                    "dispensed_total({}) > cumulative accrual({accrued}) at {}",
                    state.dispensed_total, state.now
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::ManualClock;
    use crate::config::StakingConfig;
    use crate::slashing::StaticGovernance;
    use crate::types::{AccountId, Bps};

    fn engine() -> (StakingEngine, ManualClock) {
        let clock = ManualClock::new(0);
        let cfg = StakingConfig::builder()
            .min_stake_amount(1)
            .unstake_delay_secs(10)
            .dispense_rate_per_second(5)
            .build()
            .unwrap();
        let e = StakingEngine::new(
            cfg,
            Arc::new(clock.clone()),
            Arc::new(StaticGovernance::default()),
        )
        .unwrap();
        (e, clock)
    }

    #[test]
    fn fresh_engine_satisfies_invariants() {
        let (e, _) = engine();
        assert_eq!(e.check_invariants(), Ok(()));
    }

    #[test]
    fn invariants_hold_through_a_full_lifecycle() {
        let (mut e, clock) = engine();
        let alice = AccountId::from_label("alice");
        let p = e
            .create_prover(AccountId::from_label("op"), Bps::new(500).unwrap())
            .unwrap();
        e.credit_collateral(alice, 10_000).unwrap();
        e.stake(alice, p, 7_000).unwrap();
        e.check_invariants().unwrap();

        e.request_unstake(alice, 3_000).unwrap();
        let settlement = e.config().roles.settlement;
        e.credit_collateral(settlement, 999).unwrap();
        e.reward(settlement, p, 999).unwrap();
        e.check_invariants().unwrap();

        let idx = e.request_slash(settlement, p, 1_234).unwrap();
        e.check_invariants().unwrap();
        let governance = e.config().roles.governance;
        e.finish_slash(governance, p, idx).unwrap();
        e.check_invariants().unwrap();

        clock.advance(20).unwrap();
        let dispenser = e.config().roles.dispenser;
        e.credit_collateral(dispenser, 1_000).unwrap();
        e.dispense(dispenser, crate::DispenseAmount::All).unwrap();
        e.finish_unstake(alice, alice).unwrap();
        e.check_invariants().unwrap();
    }

    #[test]
    fn violation_converts_into_internal_error() {
        let v = InvariantViolation::new(InvariantId::Conservation, "x");
        let err: StakeholdError = v.into();
        assert!(matches!(err, StakeholdError::Internal(msg) if msg.contains("Conservation")));
    }
}
