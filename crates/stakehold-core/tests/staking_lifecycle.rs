//! Staking Lifecycle Tests
//!
//! These tests drive the public engine API through complete stake / reward / unstake / slash /
//! dispense flows on a manual clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use stakehold_core::math::SCALAR;
use stakehold_core::{
    AccountId, Bps, DispenseAmount, GovernanceParams, ManualClock, PermitSigningKey, ProverId,
    RuntimeBounds, SlashPath, StakePermit, StakeholdError, StakingConfig, StakingEngine,
    StaticGovernance,
};

// =============================================================================
// Test Fixtures
// =============================================================================

const UNSTAKE_DELAY: u64 = 21 * 24 * 60 * 60;
const SLASH_DELAY: u64 = 7 * 24 * 60 * 60;
const CANCEL_DELAY: u64 = 14 * 24 * 60 * 60;
const VOTING_DELAY: u64 = 24 * 60 * 60;
const VOTING_PERIOD: u64 = 7 * 24 * 60 * 60;
const UNIT: u128 = 1_000_000_000_000_000_000;

fn acct(label: &str) -> AccountId {
    AccountId::from_label(label)
}

fn config(min_stake: u128, rate: u128) -> StakingConfig {
    StakingConfig::builder()
        .min_stake_amount(min_stake)
        .dispense_rate_per_second(rate)
        .build()
        .expect("valid config")
}

struct Harness {
    engine: StakingEngine,
    clock: ManualClock,
}

impl Harness {
    fn new(config: StakingConfig) -> Self {
        Self::with_governance(config, Arc::new(StaticGovernance::default()))
    }

    fn with_governance(config: StakingConfig, governance: Arc<dyn GovernanceParams>) -> Self {
        let clock = ManualClock::new(1_700_000_000);
        let engine = StakingEngine::new(config, Arc::new(clock.clone()), governance)
            .expect("engine");
        Self { engine, clock }
    }

    fn prover(&mut self, owner: &str, fee_bps: u16) -> ProverId {
        self.engine
            .create_prover(acct(owner), Bps::new(fee_bps).unwrap())
            .unwrap()
    }

    fn fund_and_stake(&mut self, who: &str, prover: ProverId, amount: u128) -> u128 {
        self.engine.credit_collateral(acct(who), amount).unwrap();
        self.engine.stake(acct(who), prover, amount).unwrap()
    }

    fn settlement(&self) -> AccountId {
        self.engine.config().roles.settlement
    }

    fn governance(&self) -> AccountId {
        self.engine.config().roles.governance
    }

    fn owner(&self) -> AccountId {
        self.engine.config().roles.owner
    }

    fn dispenser(&self) -> AccountId {
        self.engine.config().roles.dispenser
    }

    fn advance(&self, secs: u64) {
        self.clock.advance(secs).unwrap();
    }
}

fn assert_close(actual: u128, expected: u128, tolerance: u128) {
    let diff = actual.abs_diff(expected);
    assert!(
        diff <= tolerance,
        "actual {actual} differs from expected {expected} by {diff} (> {tolerance})"
    );
}

// =============================================================================
// End-to-End
// =============================================================================

#[test]
fn e2e_reward_unstake_slash_payout() {
    let mut h = Harness::new(config(UNIT, 0));
    let p = h.prover("prover-owner", 1_000);
    let alice = acct("alice");

    assert_eq!(h.fund_and_stake("alice", p, 100 * UNIT), 100 * UNIT);

    let settlement = h.settlement();
    h.engine.credit_collateral(settlement, 50 * UNIT).unwrap();
    let split = h.engine.reward(settlement, p, 50 * UNIT).unwrap();
    assert_eq!(split.protocol_fee, 150_000_000_000_000_000);
    assert_eq!(split.owner_fee, 4_985_000_000_000_000_000);
    assert_eq!(split.staker_reward, 44_865_000_000_000_000_000);
    assert_eq!(split.dust, 0);
    assert_close(h.engine.staked(&alice).unwrap(), 144_865_000_000_000_000_000, 2);

    let escrowed = h.engine.request_unstake(alice, 100 * UNIT).unwrap();
    assert_close(escrowed, 144_865_000_000_000_000_000, 2);
    assert_eq!(h.engine.balance_of(&alice), 0);

    // Slash half of the total exposure while the claim is escrowed.
    let exposure = h.engine.prover(p).unwrap().exposure().unwrap();
    let idx = h.engine.request_slash(settlement, p, exposure / 2).unwrap();
    let governance = h.governance();
    let outcome = h.engine.finish_slash(governance, p, idx).unwrap();
    assert_eq!(outcome.vault_slashed, 0);
    assert_eq!(outcome.path, SlashPath::Governance);
    assert_eq!(h.engine.escrow_pool(p).unwrap().slash_factor(), SCALAR / 2);

    h.advance(UNSTAKE_DELAY);
    let payout = h.engine.finish_unstake(alice, alice).unwrap();
    assert_close(payout, 72_432_500_000_000_000_000, 2);
    assert_eq!(h.engine.staked_to(&alice), None);
    assert_close(h.engine.collateral_balance(&alice), 72_432_500_000_000_000_000, 2);
    h.engine.check_invariants().unwrap();
}

// =============================================================================
// Testable properties
// =============================================================================

#[test]
fn conservation_across_lifecycle() {
    let mut h = Harness::new(config(1, 7));
    let p = h.prover("op-a", 500);
    let q = h.prover("op-b", 2_000);
    h.fund_and_stake("alice", p, 12_345);
    h.fund_and_stake("bob", q, 6_789);
    h.fund_and_stake("carol", p, 1_001);

    let settlement = h.settlement();
    h.engine.credit_collateral(settlement, 10_000).unwrap();
    h.engine.reward(settlement, p, 3_333).unwrap();
    h.engine.reward(settlement, q, 1_111).unwrap();
    h.engine.request_unstake(acct("alice"), 5_000).unwrap();

    let idx = h.engine.request_slash(settlement, p, 4_000).unwrap();
    h.advance(SLASH_DELAY);
    let owner = h.owner();
    let burned = h.engine.finish_slash(owner, p, idx).unwrap().collateral_burned;

    let dispenser = h.dispenser();
    h.engine.credit_collateral(dispenser, 1_000_000).unwrap();
    h.advance(100);
    h.engine.dispense(dispenser, DispenseAmount::Exact(500)).unwrap();
    h.advance(UNSTAKE_DELAY);
    h.engine.finish_unstake(acct("x"), acct("alice")).unwrap();

    let state = h.engine.state();
    let wallets = state.collateral.total().unwrap();
    assert_eq!(
        wallets + state.global.total_assets() + state.burned_total,
        h.engine.issued_total()
    );
    assert_eq!(h.engine.burned_total(), burned);
    h.engine.check_invariants().unwrap();
}

#[test]
fn slash_factor_never_increases() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 10_000);
    h.engine.request_unstake(acct("alice"), 4_000).unwrap();

    let settlement = h.settlement();
    let governance = h.governance();
    let mut last = h.engine.escrow_pool(p).unwrap().slash_factor();
    for amount in [1_000u128, 7, 2_500, 333] {
        let idx = h.engine.request_slash(settlement, p, amount).unwrap();
        h.engine.finish_slash(governance, p, idx).unwrap();
        let factor = h.engine.escrow_pool(p).unwrap().slash_factor();
        assert!(factor <= last, "factor rose from {last} to {factor}");
        last = factor;
    }
}

#[test]
fn slash_is_pro_rata_between_live_and_escrow() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 3_000);
    h.engine.request_unstake(acct("alice"), 1_000).unwrap();

    let settlement = h.settlement();
    let idx = h.engine.request_slash(settlement, p, 900).unwrap();
    h.advance(SLASH_DELAY);
    let owner = h.owner();
    let out = h.engine.finish_slash(owner, p, idx).unwrap();
    assert_eq!(out.vault_slashed, 600);
    assert_eq!(out.escrow_slashed, 300);
    assert_eq!(out.path, SlashPath::Owner);
    assert_eq!(h.engine.prover_vault(p).unwrap().total_assets(), 1_400);
    assert_eq!(h.engine.escrow_pool(p).unwrap().escrowed_shares(), 700);
    assert_eq!(h.engine.prover_staked(p).unwrap(), 2_100);
}

#[test]
fn claims_straddling_slashes_pay_by_their_own_snapshot() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    let alice = acct("alice");
    h.fund_and_stake("alice", p, 3_000);
    let settlement = h.settlement();
    let governance = h.governance();

    assert_eq!(h.engine.request_unstake(alice, 1_000).unwrap(), 1_000);
    let idx = h.engine.request_slash(settlement, p, 600).unwrap();
    let out = h.engine.finish_slash(governance, p, idx).unwrap();
    assert_eq!((out.vault_slashed, out.escrow_slashed), (400, 200));

    // Live receipts lost 20% as well: 1000 receipts now redeem for 800 normalized shares.
    assert_eq!(h.engine.request_unstake(alice, 1_000).unwrap(), 800);
    let idx = h.engine.request_slash(settlement, p, 400).unwrap();
    let out = h.engine.finish_slash(governance, p, idx).unwrap();
    assert_eq!((out.vault_slashed, out.escrow_slashed), (133, 267));

    let claims = h.engine.unstake_requests(&alice).to_vec();
    assert_eq!(claims.len(), 2);
    assert_eq!((claims[0].shares, claims[0].slash_factor), (1_000, SCALAR));
    assert_eq!((claims[1].shares, claims[1].slash_factor), (800, SCALAR / 5 * 4));

    // f_now = 0.8 * 1333 / 1600 = 0.6665
    let escrow = h.engine.escrow_pool(p).unwrap();
    let f_now = escrow.slash_factor();
    assert_eq!(f_now, 666_500_000_000_000_000_000_000_000);
    let first = escrow
        .claim_value(claims[0].shares, claims[0].slash_factor, claims[0].generation)
        .unwrap();
    let second = escrow
        .claim_value(claims[1].shares, claims[1].slash_factor, claims[1].generation)
        .unwrap();
    assert_eq!(first, 1_000 * f_now / SCALAR);
    assert_eq!(second, 800 * f_now / (SCALAR / 5 * 4));
    assert_eq!((first, second), (666, 666));
    assert_eq!(h.engine.unstake_pending(&alice).unwrap(), 1_332);

    h.advance(UNSTAKE_DELAY);
    assert_eq!(h.engine.finish_unstake(alice, alice).unwrap(), 1_332);
    assert_eq!(h.engine.collateral_balance(&alice), 1_332);
    assert_eq!(h.engine.escrow_pool(p).unwrap().escrowed_shares(), 1);
    assert!(h.engine.unstake_requests(&alice).is_empty());
    assert_eq!(h.engine.staked_to(&alice), Some(p));
    h.engine.check_invariants().unwrap();
}

#[test]
fn stake_after_live_vault_is_slashed_to_zero() {
    let mut h = Harness::new(config(UNIT, 0));
    let p = h.prover("op", 0);
    let alice = acct("alice");
    let bob = acct("bob");
    h.fund_and_stake("alice", p, 100 * UNIT);

    let settlement = h.settlement();
    let idx = h.engine.request_slash(settlement, p, 100 * UNIT).unwrap();
    let governance = h.governance();
    let out = h.engine.finish_slash(governance, p, idx).unwrap();
    assert_eq!(out.vault_slashed, 100 * UNIT);
    assert_eq!(h.engine.staked_to(&alice), None);

    assert_eq!(h.fund_and_stake("bob", p, 10 * UNIT), 10 * UNIT);
    assert_eq!(h.engine.staked(&bob).unwrap(), 10 * UNIT);
    let q = h.prover("op-2", 0);
    assert_eq!(h.fund_and_stake("alice", q, 5 * UNIT), 5 * UNIT);
    h.engine.check_invariants().unwrap();
}

#[test]
fn unstake_timing_boundary() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    let alice = acct("alice");
    h.fund_and_stake("alice", p, 100);
    h.engine.request_unstake(alice, 100).unwrap();

    h.advance(UNSTAKE_DELAY - 1);
    assert_eq!(h.engine.finish_unstake(alice, alice).unwrap(), 0);
    assert_eq!(h.engine.unstake_requests(&alice).len(), 1);

    h.advance(1);
    assert_eq!(h.engine.finish_unstake(alice, alice).unwrap(), 100);
    assert!(h.engine.unstake_requests(&alice).is_empty());
}

#[test]
fn rewards_do_not_reach_escrowed_claims() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 1_000);
    h.fund_and_stake("bob", p, 1_000);
    h.engine.request_unstake(acct("alice"), 1_000).unwrap();
    let pending_before = h.engine.unstake_pending(&acct("alice")).unwrap();
    let bob_before = h.engine.staked(&acct("bob")).unwrap();

    let settlement = h.settlement();
    h.engine.credit_collateral(settlement, 10_000).unwrap();
    h.engine.reward(settlement, p, 10_000).unwrap();

    assert_eq!(h.engine.unstake_pending(&acct("alice")).unwrap(), pending_before);
    assert!(h.engine.staked(&acct("bob")).unwrap() > bob_before + 9_000);

    h.advance(UNSTAKE_DELAY);
    let alice = acct("alice");
    assert_eq!(h.engine.finish_unstake(alice, alice).unwrap(), 1_000);
}

#[test]
fn dispense_ceiling() {
    let mut h = Harness::new(config(1, 10));
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 1_000);
    let dispenser = h.dispenser();
    h.engine.credit_collateral(dispenser, 10_000).unwrap();

    h.advance(50);
    assert_eq!(h.engine.max_dispense().unwrap(), 500);
    assert_eq!(
        h.engine.dispense(dispenser, DispenseAmount::Exact(501)),
        Err(StakeholdError::AmountExceedsAvailableDispense {
            requested: 501,
            available: 500
        })
    );
    assert_eq!(h.engine.dispense(dispenser, DispenseAmount::Exact(500)).unwrap(), 500);
    assert_eq!(h.engine.max_dispense().unwrap(), 0);
    assert_eq!(
        h.engine.dispense(dispenser, DispenseAmount::All),
        Err(StakeholdError::ZeroAmount)
    );

    // A fraction leaves the remainder available.
    h.advance(3);
    assert_eq!(h.engine.dispense(dispenser, DispenseAmount::Exact(7)).unwrap(), 7);
    assert_eq!(h.engine.max_dispense().unwrap(), 23);
}

#[test]
fn single_prover_binding() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op-p", 0);
    let q = h.prover("op-q", 0);
    let alice = acct("alice");
    h.fund_and_stake("alice", p, 100);
    h.engine.credit_collateral(alice, 100).unwrap();

    let bound = StakeholdError::AlreadyStakedWithDifferentProver {
        staker: alice,
        bound: p,
        requested: q,
    };
    assert_eq!(h.engine.stake(alice, q, 10), Err(bound.clone()));

    // Zero balance but a pending claim still binds.
    h.engine.request_unstake(alice, 100).unwrap();
    assert_eq!(h.engine.stake(alice, q, 10), Err(bound));

    h.advance(UNSTAKE_DELAY);
    h.engine.finish_unstake(alice, alice).unwrap();
    assert_eq!(h.engine.stake(alice, q, 10).unwrap(), 10);
    assert_eq!(h.engine.staked_to(&alice), Some(q));
}

// =============================================================================
// Slash authorization
// =============================================================================

#[test]
fn public_finalize_after_deadline() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 1_000);
    let settlement = h.settlement();
    let idx = h.engine.request_slash(settlement, p, 100).unwrap();

    let anyone = acct("anyone");
    h.advance(SLASH_DELAY);
    assert!(matches!(
        h.engine.finish_slash(anyone, p, idx),
        Err(StakeholdError::Unauthorized { .. })
    ));
    h.advance(CANCEL_DELAY + VOTING_DELAY + VOTING_PERIOD - SLASH_DELAY);
    let out = h.engine.finish_slash(anyone, p, idx).unwrap();
    assert_eq!(out.path, SlashPath::PublicAfterDeadline);
    assert_eq!(out.collateral_burned, 100);
}

#[derive(Debug, Default)]
struct AdjustableGovernance {
    voting_period: AtomicU64,
}

impl GovernanceParams for AdjustableGovernance {
    fn voting_delay(&self) -> u64 {
        0
    }

    fn voting_period(&self) -> u64 {
        self.voting_period.load(Ordering::SeqCst)
    }
}

#[test]
fn public_deadline_tracks_live_governance_parameters() {
    let gov = Arc::new(AdjustableGovernance::default());
    let mut h = Harness::with_governance(config(1, 0), gov.clone());
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 1_000);
    let settlement = h.settlement();
    let idx = h.engine.request_slash(settlement, p, 100).unwrap();

    h.advance(CANCEL_DELAY);
    gov.voting_period.store(60, Ordering::SeqCst);
    let anyone = acct("anyone");
    assert!(h.engine.cancel_slash(anyone, p, idx).is_err());

    gov.voting_period.store(0, Ordering::SeqCst);
    assert_eq!(
        h.engine.cancel_slash(anyone, p, idx).unwrap(),
        SlashPath::PublicAfterDeadline
    );
}

#[test]
fn escrow_wipe_out_starts_new_generation() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    let alice = acct("alice");
    h.fund_and_stake("alice", p, 500);
    h.engine.request_unstake(alice, 500).unwrap();
    let settlement = h.settlement();
    let governance = h.governance();
    let idx = h.engine.request_slash(settlement, p, 500).unwrap();
    h.engine.finish_slash(governance, p, idx).unwrap();

    let pool = h.engine.escrow_pool(p).unwrap();
    assert_eq!(pool.slash_factor(), 0);
    assert!(!pool.is_live());
    assert_eq!(h.engine.unstake_pending(&alice).unwrap(), 0);

    h.fund_and_stake("bob", p, 300);
    h.engine.request_unstake(acct("bob"), 300).unwrap();
    let pool = h.engine.escrow_pool(p).unwrap();
    assert_eq!(pool.generation(), 2);
    assert_eq!(pool.slash_factor(), SCALAR);

    h.advance(UNSTAKE_DELAY);
    assert_eq!(h.engine.finish_unstake(alice, alice).unwrap(), 0);
    assert_eq!(h.engine.staked_to(&alice), None);
    let bob = acct("bob");
    assert_eq!(h.engine.finish_unstake(bob, bob).unwrap(), 300);
    h.engine.check_invariants().unwrap();
}

// =============================================================================
// Permits
// =============================================================================

#[test]
fn permit_stake_is_replay_protected() {
    let mut h = Harness::new(config(1, 0));
    let p = h.prover("op", 0);
    let key = PermitSigningKey::from_seed(&[42; 32]);
    let staker = key.account_id();
    h.engine.credit_collateral(staker, 1_000).unwrap();

    let deadline = h.clock.get() + 60;
    let permit = StakePermit {
        staker,
        prover: p,
        amount: 400,
        nonce: 0,
        deadline,
    };
    let sig = key.sign(&permit);
    let relayer = acct("relayer");
    assert_eq!(h.engine.stake_with_permit(relayer, &permit, &sig).unwrap(), 400);
    assert_eq!(h.engine.permit_nonce(&staker), 1);
    assert_eq!(
        h.engine.stake_with_permit(relayer, &permit, &sig),
        Err(StakeholdError::InvalidPermitNonce {
            expected: 1,
            got: 0
        })
    );

    let next = StakePermit { nonce: 1, ..permit };
    let next_sig = key.sign(&next);
    h.advance(61);
    assert_eq!(
        h.engine.stake_with_permit(relayer, &next, &next_sig),
        Err(StakeholdError::PermitExpired {
            deadline,
            now: deadline + 1
        })
    );
    assert_eq!(h.engine.balance_of(&staker), 400);
}

#[test]
fn bounds_cap_stakers() {
    let mut h = Harness::new(config(1, 0));
    h.engine
        .set_bounds(RuntimeBounds::new(10, 1, 10).unwrap())
        .unwrap();
    let p = h.prover("op", 0);
    h.fund_and_stake("alice", p, 10);
    h.engine.credit_collateral(acct("bob"), 10).unwrap();
    assert!(matches!(
        h.engine.stake(acct("bob"), p, 10),
        Err(StakeholdError::BoundedValueExceeded(_))
    ));
}

// =============================================================================
// Property tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn slash_split_stays_within_bounds(
        live in 1u128..1_000_000,
        escrow in 1u128..1_000_000,
        pct in 1u128..=100,
    ) {
        let mut h = Harness::new(config(1, 0));
        let p = h.prover("op", 0);
        let alice = acct("alice");
        h.fund_and_stake("alice", p, live + escrow);
        h.engine.request_unstake(alice, escrow).unwrap();
        let exposure = h.engine.prover(p).unwrap().exposure().unwrap();
        let amount = (exposure * pct / 100).max(1);

        let settlement = h.settlement();
        let governance = h.governance();
        let idx = h.engine.request_slash(settlement, p, amount).unwrap();
        let out = h.engine.finish_slash(governance, p, idx).unwrap();

        prop_assert_eq!(out.vault_slashed + out.escrow_slashed, amount);
        prop_assert!(out.vault_slashed <= live);
        prop_assert!(out.escrow_slashed <= escrow);
        prop_assert_eq!(out.collateral_burned, amount);
        h.engine.check_invariants().unwrap();
    }
}
