use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::bounds::RuntimeBounds;
use crate::clock::Clock;
use crate::config::StakingConfig;
use crate::dispense::{DispenseAmount, DispenseLimiter};
use crate::escrow::EscrowPool;
use crate::hash::{sha256_domain, LEDGER_STATE_DOMAIN_V1};
use crate::ledger::{CollateralLedger, ReceiptLedger};
use crate::math::{add, floor_bps, mul_div_floor, sub};
use crate::permit::StakePermit;
use crate::slashing::{GovernanceParams, SlashAuthority, SlashClaim, SlashPath, SlashStatus};
use crate::types::{AccountId, Bps, ProverId, Role, Timestamp};
use crate::unstake::{UnstakeClaim, UnstakeQueue};
use crate::vault::ExchangeRateVault;
use crate::{Hash32, Result, StakeholdError};

/// Split of one gross reward.
///
/// Conservation: `protocol_fee + owner_fee + staker_reward + dust = gross`. Only the first three
/// leave the settlement wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    pub protocol_fee: u128,
    pub owner_fee: u128,
    pub staker_reward: u128,
    pub dust: u128,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashOutcome {
    /// Normalized shares burned from the prover's live vault.
    pub vault_slashed: u128,
    /// Normalized shares burned from the escrow pool.
    pub escrow_slashed: u128,
    /// Collateral destroyed in the global vault.
    pub collateral_burned: u128,
    pub path: SlashPath,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverState {
    pub owner: AccountId,
    pub owner_fee_bps: Bps,
    /// Receipt shares (vault shares) backed by live normalized shares (vault assets).
    pub vault: ExchangeRateVault,
    pub escrow: EscrowPool,
    pub receipts: ReceiptLedger,
    /// Stable-index slash history.
    pub slash_requests: Vec<SlashClaim>,
    pub pending_slashes: usize,
}

impl ProverState {
    fn new(owner: AccountId, owner_fee_bps: Bps) -> ProverState {
        ProverState {
            owner,
            owner_fee_bps,
            vault: ExchangeRateVault::new(),
            escrow: EscrowPool::default(),
            receipts: ReceiptLedger::default(),
            slash_requests: Vec::new(),
            pending_slashes: 0,
        }
    }

    /// Live vault plus escrow, in normalized shares.
    pub fn exposure(&self) -> Result<u128> {
        add(self.vault.total_assets(), self.escrow.escrowed_shares())
    }

    pub fn has_pending_slash(&self) -> bool {
        self.pending_slashes > 0
    }

    fn is_live(&self) -> bool {
        self.receipts.total_supply() > 0 && self.vault.total_assets() > 0
    }
}

/// A staker's binding and exit queue. Present only while the staker is bound.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerState {
    pub prover: ProverId,
    pub unstakes: UnstakeQueue,
}

/// The complete ledger. Serializes deterministically (ordered maps only).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Last committed timestamp.
    pub now: Timestamp,
    /// Collateral (assets) → normalized shares.
    pub global: ExchangeRateVault,
    pub provers: BTreeMap<ProverId, ProverState>,
    pub stakers: BTreeMap<AccountId, StakerState>,
    pub collateral: CollateralLedger,
    pub dispense: DispenseLimiter,
    pub permit_nonces: BTreeMap<AccountId, u64>,
    pub prover_nonce: u64,
    pub issued_total: u128,
    pub burned_total: u128,
    pub dispensed_total: u128,
}

/// Prover staking ledger (pure, deterministic state machine).
///
/// Separation of concerns:
/// - ECONOMIC PARAMETERS: `StakingConfig` (delays, fees, limits, roles).
/// - SAFETY BOUNDS: `RuntimeBounds` (caps state size; not economic).
/// - COLLABORATORS: the clock and the governance timing view, both injected read-only.
///
/// Every mutation reads the clock once, computes on staged copies, and commits only after all
/// fallible steps have passed.
#[derive(Clone, Debug)]
pub struct StakingEngine {
    config: StakingConfig,
    bounds: RuntimeBounds,
    clock: Arc<dyn Clock>,
    governance: Arc<dyn GovernanceParams>,
    state: LedgerState,
}

impl StakingEngine {
    pub fn new(
        config: StakingConfig,
        clock: Arc<dyn Clock>,
        governance: Arc<dyn GovernanceParams>,
    ) -> Result<StakingEngine> {
        Self::new_with_bounds(config, RuntimeBounds::default(), clock, governance)
    }

    pub fn new_with_bounds(
        config: StakingConfig,
        bounds: RuntimeBounds,
        clock: Arc<dyn Clock>,
        governance: Arc<dyn GovernanceParams>,
    ) -> Result<StakingEngine> {
        config.validate()?;
        bounds.validate()?;
        let now = clock.now()?;
        let state = LedgerState {
            now,
            dispense: DispenseLimiter::new(config.dispense.rate_per_second, now),
            ..LedgerState::default()
        };
        Ok(StakingEngine {
            config,
            bounds,
            clock,
            governance,
            state,
        })
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    pub fn bounds(&self) -> RuntimeBounds {
        self.bounds
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Updates safety bounds (validated before being installed).
    pub fn set_bounds(&mut self, bounds: RuntimeBounds) -> Result<()> {
        bounds.validate()?;
        self.bounds = bounds;
        Ok(())
    }

    fn tick(&self) -> Result<Timestamp> {
        let now = self.clock.now()?;
        if now < self.state.now {
            return Err(StakeholdError::ClockWentBackwards {
                last: self.state.now,
                now,
            });
        }
        Ok(now)
    }

    fn require_role(&self, caller: AccountId, role: Role) -> Result<()> {
        let roles = &self.config.roles;
        let expected = match role {
            Role::Owner => roles.owner,
            Role::Governance => roles.governance,
            Role::Settlement => roles.settlement,
            Role::Dispenser => roles.dispenser,
        };
        if caller != expected {
            return Err(StakeholdError::Unauthorized {
                caller,
                required: role,
            });
        }
        Ok(())
    }

    fn slash_authority(&self) -> SlashAuthority<'_> {
        SlashAuthority {
            owner: self.config.roles.owner,
            governance: self.config.roles.governance,
            slash_delay: self.config.delays.slash_delay_secs,
            cancel_delay: self.config.delays.cancel_delay_secs,
            params: self.governance.as_ref(),
        }
    }

    // ---------------------------------------------------------------------
    // Boundary
    // ---------------------------------------------------------------------

    /// Registers a prover owned by `owner`.
    ///
    /// Safety bound: `bounds.max_provers`.
    #[instrument(skip_all, fields(owner = %owner, owner_fee_bps = owner_fee_bps.get()))]
    pub fn create_prover(&mut self, owner: AccountId, owner_fee_bps: Bps) -> Result<ProverId> {
        let now = self.tick()?;
        if self.state.provers.len() >= self.bounds.max_provers {
            return Err(StakeholdError::BoundedValueExceeded(
                "max provers exceeded".into(),
            ));
        }
        let prover = ProverId::derive(owner, self.state.prover_nonce);
        if self.state.provers.contains_key(&prover) {
            return Err(StakeholdError::Internal("prover id collision".into()));
        }
        let next_nonce = self
            .state
            .prover_nonce
            .checked_add(1)
            .ok_or_else(|| StakeholdError::Overflow("prover nonce".into()))?;

        // Commit.
        self.state
            .provers
            .insert(prover, ProverState::new(owner, owner_fee_bps));
        self.state.prover_nonce = next_nonce;
        self.state.now = now;
        info!(%prover, "prover created");
        Ok(prover)
    }

    /// Credits collateral to a wallet (boundary deposit; the only source of new collateral).
    pub fn credit_collateral(&mut self, account: AccountId, amount: u128) -> Result<()> {
        let now = self.tick()?;
        if amount == 0 {
            return Err(StakeholdError::ZeroAmount);
        }
        let issued_total = add(self.state.issued_total, amount)?;

        // Commit.
        self.state.collateral.credit(account, amount)?;
        self.state.issued_total = issued_total;
        self.state.now = now;
        debug!(%account, amount = %amount, "collateral credited");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Stake / unstake
    // ---------------------------------------------------------------------

    /// Stakes `amount` collateral from `staker` into `prover`; returns receipt shares minted.
    #[instrument(skip_all, fields(staker = %staker, prover = %prover, amount = %amount))]
    pub fn stake(&mut self, staker: AccountId, prover: ProverId, amount: u128) -> Result<u128> {
        let now = self.tick()?;
        self.stake_at(staker, prover, amount, now)
    }

    /// Stakes on behalf of the permit's signer. `caller` is the relayer and needs no role.
    #[instrument(skip_all, fields(caller = %caller, staker = %permit.staker, nonce = permit.nonce))]
    pub fn stake_with_permit(
        &mut self,
        caller: AccountId,
        permit: &StakePermit,
        signature: &[u8],
    ) -> Result<u128> {
        let now = self.tick()?;
        if now > permit.deadline {
            warn!(deadline = permit.deadline, now, "permit expired");
            return Err(StakeholdError::PermitExpired {
                deadline: permit.deadline,
                now,
            });
        }
        let expected = self.permit_nonce(&permit.staker);
        if permit.nonce != expected {
            warn!(expected, got = permit.nonce, "permit nonce mismatch");
            return Err(StakeholdError::InvalidPermitNonce {
                expected,
                got: permit.nonce,
            });
        }
        permit.verify_signature(signature)?;
        let next_nonce = expected
            .checked_add(1)
            .ok_or_else(|| StakeholdError::Overflow("permit nonce".into()))?;

        let shares = self.stake_at(permit.staker, permit.prover, permit.amount, now)?;
        self.state.permit_nonces.insert(permit.staker, next_nonce);
        Ok(shares)
    }

    fn stake_at(
        &mut self,
        staker: AccountId,
        prover: ProverId,
        amount: u128,
        now: Timestamp,
    ) -> Result<u128> {
        if amount == 0 {
            return Err(StakeholdError::ZeroAmount);
        }
        let min = self.config.limits.min_stake_amount;
        if amount < min {
            return Err(StakeholdError::StakeBelowMinimum { amount, min });
        }
        let p = self
            .state
            .provers
            .get(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        match self.state.stakers.get(&staker) {
            Some(s) if s.prover != prover => {
                return Err(StakeholdError::AlreadyStakedWithDifferentProver {
                    staker,
                    bound: s.prover,
                    requested: prover,
                });
            }
            None if self.state.stakers.len() >= self.bounds.max_stakers => {
                return Err(StakeholdError::BoundedValueExceeded(
                    "max stakers exceeded".into(),
                ));
            }
            _ => {}
        }
        if p.has_pending_slash() {
            return Err(StakeholdError::ProverHasSlashRequest { prover });
        }
        let balance = self.state.collateral.balance(&staker);
        if balance < amount {
            return Err(StakeholdError::InsufficientCollateral {
                account: staker,
                balance,
                required: amount,
            });
        }

        let mut global = self.state.global;
        let normalized = global.deposit(amount)?;
        let mut vault = p.vault;
        let receipt_shares = vault.deposit(normalized)?;

        // Commit.
        let state = &mut self.state;
        let p = state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        p.receipts.mint(staker, receipt_shares)?;
        p.vault = vault;
        state.collateral.debit(staker, amount)?;
        state.global = global;
        state.stakers.entry(staker).or_insert_with(|| StakerState {
            prover,
            unstakes: UnstakeQueue::default(),
        });
        state.now = now;
        info!(normalized = %normalized, receipt_shares = %receipt_shares, "stake committed");
        Ok(receipt_shares)
    }

    /// Burns `amount` receipt shares and escrows their normalized value.
    ///
    /// Returns the normalized shares escrowed.
    #[instrument(skip_all, fields(staker = %staker, amount = %amount))]
    pub fn request_unstake(&mut self, staker: AccountId, amount: u128) -> Result<u128> {
        let now = self.tick()?;
        if amount == 0 {
            return Err(StakeholdError::ZeroAmount);
        }
        let Some(s) = self.state.stakers.get(&staker) else {
            return Err(StakeholdError::UnstakeAmountExceedsBalance {
                requested: amount,
                balance: 0,
            });
        };
        let prover = s.prover;
        let p = self.prover(prover)?;
        if p.has_pending_slash() {
            return Err(StakeholdError::ProverHasSlashRequest { prover });
        }
        let balance = p.receipts.balance_of(&staker);
        if amount > balance {
            return Err(StakeholdError::UnstakeAmountExceedsBalance {
                requested: amount,
                balance,
            });
        }
        let max = self.config.limits.max_unstake_requests;
        if s.unstakes.len() >= max {
            return Err(StakeholdError::TooManyUnstakeRequests { max });
        }

        let mut vault = p.vault;
        let normalized = vault.redeem(amount)?;
        let mut escrow = p.escrow;
        let (slash_factor, generation) = escrow.enter(normalized)?;
        let claim = UnstakeClaim {
            prover,
            shares: normalized,
            slash_factor,
            generation,
            requested_at: now,
        };

        // Commit.
        let state = &mut self.state;
        let p = state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        p.receipts.burn(staker, amount)?;
        p.vault = vault;
        p.escrow = escrow;
        let s = state
            .stakers
            .get_mut(&staker)
            .ok_or_else(|| StakeholdError::Internal("staker binding vanished".into()))?;
        s.unstakes.push(claim, max)?;
        write_off_worthless_receipts(state, prover);
        state.now = now;
        info!(%prover, normalized = %normalized, generation, "unstake requested");
        Ok(normalized)
    }

    /// Pays out every matured claim of `staker`; returns the collateral paid (0 if none matured).
    ///
    /// Callable by anyone. Remaining claims may be reordered.
    #[instrument(skip_all, fields(caller = %caller, staker = %staker))]
    pub fn finish_unstake(&mut self, caller: AccountId, staker: AccountId) -> Result<u128> {
        let now = self.tick()?;
        let s = self
            .state
            .stakers
            .get(&staker)
            .filter(|s| !s.unstakes.is_empty())
            .ok_or(StakeholdError::NoUnstakeRequests { staker })?;
        let prover = s.prover;
        let p = self.prover(prover)?;
        if p.has_pending_slash() {
            return Err(StakeholdError::ProverHasSlashRequest { prover });
        }

        let mut queue = s.unstakes.clone();
        let matured = queue.take_matured(now, self.config.delays.unstake_delay_secs);
        let mut escrow = p.escrow;
        let mut normalized = 0u128;
        for claim in &matured {
            let value = escrow.claim_value(claim.shares, claim.slash_factor, claim.generation)?;
            escrow.exit(value)?;
            normalized = add(normalized, value)?;
        }
        let mut global = self.state.global;
        let payout = global.withdraw_shares(normalized)?;
        let release_binding = queue.is_empty() && p.receipts.balance_of(&staker) == 0;

        // Commit.
        let state = &mut self.state;
        let p = state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        p.escrow = escrow;
        state.collateral.credit(staker, payout)?;
        state.global = global;
        if release_binding {
            state.stakers.remove(&staker);
        } else if let Some(s) = state.stakers.get_mut(&staker) {
            s.unstakes = queue;
        }
        state.now = now;
        info!(
            matured = matured.len(),
            normalized = %normalized,
            payout = %payout,
            release_binding,
            "unstake finished"
        );
        Ok(payout)
    }

    // ---------------------------------------------------------------------
    // Rewards and dispense
    // ---------------------------------------------------------------------

    /// Splits a gross reward (settlement role only) and credits the staker portion to `prover`.
    ///
    /// A prover without live receipt holders has no one to credit: its staker portion is reported
    /// as dust and stays with the source.
    #[instrument(skip_all, fields(caller = %caller, prover = %prover, amount = %amount))]
    pub fn reward(
        &mut self,
        caller: AccountId,
        prover: ProverId,
        amount: u128,
    ) -> Result<RewardSplit> {
        let now = self.tick()?;
        self.require_role(caller, Role::Settlement)?;
        if amount == 0 {
            return Err(StakeholdError::ZeroAmount);
        }
        let p = self.prover(prover)?;

        let protocol_fee = floor_bps(amount, self.config.fees.protocol_fee_bps)?;
        let remainder = sub(amount, protocol_fee)?;
        let owner_fee = floor_bps(remainder, p.owner_fee_bps)?;
        let staker_reward = if p.receipts.total_supply() == 0 {
            0
        } else {
            floor_bps(remainder, p.owner_fee_bps.complement())?
        };
        let dust = sub(sub(remainder, owner_fee)?, staker_reward)?;
        let debit = add(add(protocol_fee, owner_fee)?, staker_reward)?;

        let balance = self.state.collateral.balance(&caller);
        if balance < debit {
            return Err(StakeholdError::InsufficientCollateral {
                account: caller,
                balance,
                required: debit,
            });
        }

        let mut global = self.state.global;
        let minted = global.credit(staker_reward)?;
        let mut vault = p.vault;
        vault.donate(minted)?;
        let owner = p.owner;
        let treasury = self.config.roles.treasury;

        // Commit.
        let state = &mut self.state;
        let p = state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        p.vault = vault;
        state.collateral.debit(caller, debit)?;
        state.collateral.credit(treasury, protocol_fee)?;
        state.collateral.credit(owner, owner_fee)?;
        state.global = global;
        state.now = now;

        let split = RewardSplit {
            protocol_fee,
            owner_fee,
            staker_reward,
            dust,
        };
        info!(?split, minted = %minted, "reward credited");
        Ok(split)
    }

    /// Injects rate-limited bonus collateral (dispenser role only); returns the amount dispensed.
    ///
    /// The amount is spread over provers pro-rata to their live normalized shares through the same
    /// path as an organic staker reward; the last prover takes the rounding remainder. Escrowed
    /// claims are not credited.
    #[instrument(skip_all, fields(caller = %caller, amount = ?amount))]
    pub fn dispense(&mut self, caller: AccountId, amount: DispenseAmount) -> Result<u128> {
        let now = self.tick()?;
        self.require_role(caller, Role::Dispenser)?;

        let live: Vec<(ProverId, u128)> = self
            .state
            .provers
            .iter()
            .filter(|(_, p)| p.is_live())
            .map(|(id, p)| (*id, p.vault.total_assets()))
            .collect();
        let total_live = live.iter().try_fold(0u128, |acc, (_, v)| add(acc, *v))?;
        if total_live == 0 {
            return Err(StakeholdError::NoActiveStake);
        }

        let mut limiter = self.state.dispense;
        let value = limiter.consume(amount, now)?;
        let balance = self.state.collateral.balance(&caller);
        if balance < value {
            return Err(StakeholdError::InsufficientCollateral {
                account: caller,
                balance,
                required: value,
            });
        }

        let mut global = self.state.global;
        let mut staged = Vec::with_capacity(live.len());
        let mut remaining = value;
        for (i, (id, weight)) in live.iter().enumerate() {
            let portion = if i + 1 == live.len() {
                remaining
            } else {
                mul_div_floor(value, *weight, total_live)?
            };
            remaining = sub(remaining, portion)?;
            let minted = global.credit(portion)?;
            let mut vault = self.prover(*id)?.vault;
            vault.donate(minted)?;
            staged.push((*id, vault));
        }
        let dispensed_total = add(self.state.dispensed_total, value)?;

        // Commit.
        let state = &mut self.state;
        for (id, vault) in staged {
            if let Some(p) = state.provers.get_mut(&id) {
                p.vault = vault;
            }
        }
        state.collateral.debit(caller, value)?;
        state.global = global;
        state.dispense = limiter;
        state.dispensed_total = dispensed_total;
        state.now = now;
        info!(value = %value, provers = live.len(), "dispensed");
        Ok(value)
    }

    /// Changes the dispense rate prospectively (owner role only).
    #[instrument(skip_all, fields(caller = %caller, rate_per_second = %rate_per_second))]
    pub fn set_dispense_rate(&mut self, caller: AccountId, rate_per_second: u128) -> Result<()> {
        let now = self.tick()?;
        self.require_role(caller, Role::Owner)?;
        let mut limiter = self.state.dispense;
        limiter.set_rate(rate_per_second, now)?;

        // Commit.
        self.state.dispense = limiter;
        self.state.now = now;
        info!("dispense rate updated");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Slashing
    // ---------------------------------------------------------------------

    /// Records a slash report (settlement role only); returns its index in the prover's list.
    ///
    /// Over-requests are clamped to the current exposure rather than rejected.
    #[instrument(skip_all, fields(caller = %caller, prover = %prover, amount = %amount))]
    pub fn request_slash(
        &mut self,
        caller: AccountId,
        prover: ProverId,
        amount: u128,
    ) -> Result<usize> {
        let now = self.tick()?;
        self.require_role(caller, Role::Settlement)?;
        if amount == 0 {
            return Err(StakeholdError::ZeroAmount);
        }
        let p = self.prover(prover)?;
        if p.pending_slashes >= self.bounds.max_pending_slashes_per_prover {
            return Err(StakeholdError::BoundedValueExceeded(
                "max pending slashes per prover exceeded".into(),
            ));
        }
        let exposure = p.exposure()?;
        let clamped = amount.min(exposure);
        if clamped < amount {
            warn!(exposure = %exposure, "slash request clamped to exposure");
        }
        let pending = p
            .pending_slashes
            .checked_add(1)
            .ok_or_else(|| StakeholdError::Overflow("pending slashes".into()))?;

        // Commit.
        let p = self
            .state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        let index = p.slash_requests.len();
        p.slash_requests.push(SlashClaim {
            prover,
            amount: clamped,
            requested_amount: amount,
            requested_at: now,
            status: SlashStatus::Pending,
        });
        p.pending_slashes = pending;
        self.state.now = now;
        info!(index, clamped = %clamped, "slash requested");
        Ok(index)
    }

    /// Finalizes a pending slash, burning pro-rata from the live vault and the escrow pool.
    #[instrument(skip_all, fields(caller = %caller, prover = %prover, index = index))]
    pub fn finish_slash(
        &mut self,
        caller: AccountId,
        prover: ProverId,
        index: usize,
    ) -> Result<SlashOutcome> {
        let now = self.tick()?;
        let p = self.prover(prover)?;
        let claim = pending_claim(p, prover, index)?;
        let path = self
            .slash_authority()
            .authorize_finish(caller, claim.requested_at, now)?;

        let live = p.vault.total_assets();
        let escrowed = p.escrow.escrowed_shares();
        let exposure = add(live, escrowed)?;
        let amount = claim.amount.min(exposure);
        let vault_slashed = if exposure == 0 {
            0
        } else {
            mul_div_floor(amount, live, exposure)?
        };
        let escrow_slashed = sub(amount, vault_slashed)?;
        debug!(
            live = %live,
            escrowed = %escrowed,
            vault_slashed = %vault_slashed,
            escrow_slashed = %escrow_slashed,
            "slash split"
        );

        let mut vault = p.vault;
        vault.burn_assets(vault_slashed)?;
        let mut escrow = p.escrow;
        escrow.slash(escrow_slashed)?;
        let mut global = self.state.global;
        let collateral_burned = global.withdraw_shares(amount)?;
        let burned_total = add(self.state.burned_total, collateral_burned)?;
        let pending = p.pending_slashes.saturating_sub(1);

        // Commit.
        let state = &mut self.state;
        let p = state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        p.vault = vault;
        p.escrow = escrow;
        p.pending_slashes = pending;
        if let Some(c) = p.slash_requests.get_mut(index) {
            c.status = SlashStatus::Finalized {
                vault_slashed,
                escrow_slashed,
                collateral_burned,
            };
        }
        state.global = global;
        state.burned_total = burned_total;
        write_off_worthless_receipts(state, prover);
        state.now = now;
        info!(
            ?path,
            collateral_burned = %collateral_burned,
            slash_factor = %escrow.slash_factor(),
            "slash finalized"
        );
        Ok(SlashOutcome {
            vault_slashed,
            escrow_slashed,
            collateral_burned,
            path,
        })
    }

    /// Cancels a pending slash.
    #[instrument(skip_all, fields(caller = %caller, prover = %prover, index = index))]
    pub fn cancel_slash(
        &mut self,
        caller: AccountId,
        prover: ProverId,
        index: usize,
    ) -> Result<SlashPath> {
        let now = self.tick()?;
        let p = self.prover(prover)?;
        let claim = pending_claim(p, prover, index)?;
        let path = self
            .slash_authority()
            .authorize_cancel(caller, claim.requested_at, now)?;
        let pending = p.pending_slashes.saturating_sub(1);

        // Commit.
        let p = self
            .state
            .provers
            .get_mut(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })?;
        if let Some(c) = p.slash_requests.get_mut(index) {
            c.status = SlashStatus::Cancelled;
        }
        p.pending_slashes = pending;
        self.state.now = now;
        info!(?path, "slash cancelled");
        Ok(path)
    }

    // ---------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------

    pub fn prover(&self, prover: ProverId) -> Result<&ProverState> {
        self.state
            .provers
            .get(&prover)
            .ok_or(StakeholdError::ProverNotFound { prover })
    }

    /// Prover the staker is bound to, if any.
    pub fn staked_to(&self, staker: &AccountId) -> Option<ProverId> {
        self.state.stakers.get(staker).map(|s| s.prover)
    }

    /// Receipt-share balance of `staker` with its bound prover.
    pub fn balance_of(&self, staker: &AccountId) -> u128 {
        self.staked_to(staker)
            .and_then(|p| self.state.provers.get(&p))
            .map(|p| p.receipts.balance_of(staker))
            .unwrap_or(0)
    }

    /// Collateral value of `staker`'s live receipt balance.
    pub fn staked(&self, staker: &AccountId) -> Result<u128> {
        let Some(prover) = self.staked_to(staker) else {
            return Ok(0);
        };
        self.preview_unstake(prover, self.balance_of(staker))
    }

    /// Collateral value of `receipt_shares` of `prover` at current rates.
    pub fn preview_unstake(&self, prover: ProverId, receipt_shares: u128) -> Result<u128> {
        let p = self.prover(prover)?;
        let normalized = p.vault.preview_redeem(receipt_shares)?;
        self.preview_redeem(normalized)
    }

    /// Collateral value of `normalized` shares at the global rate.
    pub fn preview_redeem(&self, normalized: u128) -> Result<u128> {
        self.state.global.preview_redeem(normalized)
    }

    /// Current collateral value of all of `staker`'s pending claims (matured or not).
    pub fn unstake_pending(&self, staker: &AccountId) -> Result<u128> {
        let Some(s) = self.state.stakers.get(staker) else {
            return Ok(0);
        };
        let escrow = self.prover(s.prover)?.escrow;
        let mut normalized = 0u128;
        for claim in s.unstakes.claims() {
            let value = escrow.claim_value(claim.shares, claim.slash_factor, claim.generation)?;
            normalized = add(normalized, value)?;
        }
        self.preview_redeem(normalized)
    }

    /// Pending claims in storage order (changes after `finish_unstake`).
    pub fn unstake_requests(&self, staker: &AccountId) -> &[UnstakeClaim] {
        self.state
            .stakers
            .get(staker)
            .map(|s| s.unstakes.claims())
            .unwrap_or(&[])
    }

    pub fn slash_requests(&self, prover: ProverId) -> Result<&[SlashClaim]> {
        Ok(&self.prover(prover)?.slash_requests)
    }

    pub fn escrow_pool(&self, prover: ProverId) -> Result<EscrowPool> {
        Ok(self.prover(prover)?.escrow)
    }

    pub fn prover_vault(&self, prover: ProverId) -> Result<ExchangeRateVault> {
        Ok(self.prover(prover)?.vault)
    }

    /// Collateral value of the prover's total exposure (live vault plus escrow).
    pub fn prover_staked(&self, prover: ProverId) -> Result<u128> {
        self.preview_redeem(self.prover(prover)?.exposure()?)
    }

    pub fn global_vault(&self) -> ExchangeRateVault {
        self.state.global
    }

    pub fn max_dispense(&self) -> Result<u128> {
        let now = self.clock.now()?.max(self.state.now);
        self.state.dispense.available(now)
    }

    pub fn min_stake_amount(&self) -> u128 {
        self.config.limits.min_stake_amount
    }

    pub fn collateral_balance(&self, account: &AccountId) -> u128 {
        self.state.collateral.balance(account)
    }

    pub fn permit_nonce(&self, staker: &AccountId) -> u64 {
        self.state.permit_nonces.get(staker).copied().unwrap_or(0)
    }

    pub fn issued_total(&self) -> u128 {
        self.state.issued_total
    }

    pub fn burned_total(&self) -> u128 {
        self.state.burned_total
    }

    pub fn dispensed_total(&self) -> u128 {
        self.state.dispensed_total
    }

    /// Current clock reading (no state change).
    pub fn now(&self) -> Result<Timestamp> {
        self.clock.now()
    }

    /// Domain-separated SHA-256 over the canonical JSON encoding of the ledger.
    pub fn state_hash(&self) -> Result<Hash32> {
        let bytes = serde_json::to_vec(&self.state)
            .map_err(|e| StakeholdError::Internal(format!("state encoding failed: {e}")))?;
        Ok(sha256_domain(LEDGER_STATE_DOMAIN_V1, &bytes))
    }
}

/// Drops receipt shares of `prover` once its live vault has no backing left.
///
/// Holders without pending claims are released from their binding. Later stakes then mint
/// against an empty vault instead of against worthless outstanding shares.
fn write_off_worthless_receipts(state: &mut LedgerState, prover: ProverId) {
    let Some(p) = state.provers.get_mut(&prover) else {
        return;
    };
    let written_off = p.vault.total_shares();
    if p.vault.total_assets() > 0 || written_off == 0 {
        return;
    }
    p.vault = ExchangeRateVault::new();
    p.receipts = ReceiptLedger::default();
    let bound = state.stakers.len();
    state
        .stakers
        .retain(|_, s| s.prover != prover || !s.unstakes.is_empty());
    warn!(
        %prover,
        written_off = %written_off,
        released = bound - state.stakers.len(),
        "live vault exhausted, receipt shares written off"
    );
}

fn pending_claim(p: &ProverState, prover: ProverId, index: usize) -> Result<SlashClaim> {
    let claim = p
        .slash_requests
        .get(index)
        .copied()
        .ok_or(StakeholdError::SlashRequestNotFound { prover, index })?;
    if !claim.is_pending() {
        return Err(StakeholdError::SlashRequestAlreadyResolved { prover, index });
    }
    Ok(claim)
}
