use serde::{Deserialize, Serialize};

use crate::dispense::DispenseAmount;
use crate::engine::{RewardSplit, SlashOutcome, StakingEngine};
use crate::permit::StakePermit;
use crate::slashing::SlashPath;
use crate::types::{AccountId, Bps, ProverId};
use crate::{Result, StakeholdError};

/// Ledger state transition inputs.
///
/// Every mutating entry point of [`StakingEngine`] has exactly one variant; the caller is explicit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Register a prover (boundary bookkeeping).
    CreateProver {
        owner: AccountId,
        owner_fee_bps: Bps,
    },
    /// Credit collateral to a wallet (boundary deposit).
    CreditCollateral { account: AccountId, amount: u128 },

    Stake {
        staker: AccountId,
        prover: ProverId,
        amount: u128,
    },
    StakeWithPermit {
        caller: AccountId,
        permit: StakePermit,
        /// Hex-encoded ed25519 signature.
        signature: String,
    },
    RequestUnstake { staker: AccountId, amount: u128 },
    FinishUnstake { caller: AccountId, staker: AccountId },

    Reward {
        caller: AccountId,
        prover: ProverId,
        amount: u128,
    },
    Dispense {
        caller: AccountId,
        amount: DispenseAmount,
    },
    SetDispenseRate {
        caller: AccountId,
        rate_per_second: u128,
    },

    RequestSlash {
        caller: AccountId,
        prover: ProverId,
        amount: u128,
    },
    FinishSlash {
        caller: AccountId,
        prover: ProverId,
        index: usize,
    },
    CancelSlash {
        caller: AccountId,
        prover: ProverId,
        index: usize,
    },
}

/// Observable result of a state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Unit,
    ProverCreated(ProverId),
    /// Receipt shares minted by a stake.
    Staked(u128),
    /// Normalized shares escrowed by an unstake request.
    UnstakeRequested(u128),
    /// Collateral paid by `finish_unstake`.
    UnstakeFinished(u128),
    Reward(RewardSplit),
    Dispensed(u128),
    SlashRequested(usize),
    SlashFinalized(SlashOutcome),
    SlashCancelled(SlashPath),
}

impl StakingEngine {
    /// Dispatches one [`Action`].
    pub fn apply(&mut self, action: &Action) -> Result<ActionOutcome> {
        match action {
            Action::CreateProver {
                owner,
                owner_fee_bps,
            } => Ok(ActionOutcome::ProverCreated(
                self.create_prover(*owner, *owner_fee_bps)?,
            )),
            Action::CreditCollateral { account, amount } => {
                self.credit_collateral(*account, *amount)?;
                Ok(ActionOutcome::Unit)
            }
            Action::Stake {
                staker,
                prover,
                amount,
            } => Ok(ActionOutcome::Staked(self.stake(*staker, *prover, *amount)?)),
            Action::StakeWithPermit {
                caller,
                permit,
                signature,
            } => {
                let signature = hex::decode(signature).map_err(|e| {
                    StakeholdError::InvalidSignature(format!("Invalid signature hex: {e}"))
                })?;
                Ok(ActionOutcome::Staked(self.stake_with_permit(
                    *caller, permit, &signature,
                )?))
            }
            Action::RequestUnstake { staker, amount } => Ok(ActionOutcome::UnstakeRequested(
                self.request_unstake(*staker, *amount)?,
            )),
            Action::FinishUnstake { caller, staker } => Ok(ActionOutcome::UnstakeFinished(
                self.finish_unstake(*caller, *staker)?,
            )),
            Action::Reward {
                caller,
                prover,
                amount,
            } => Ok(ActionOutcome::Reward(self.reward(*caller, *prover, *amount)?)),
            Action::Dispense { caller, amount } => {
                Ok(ActionOutcome::Dispensed(self.dispense(*caller, *amount)?))
            }
            Action::SetDispenseRate {
                caller,
                rate_per_second,
            } => {
                self.set_dispense_rate(*caller, *rate_per_second)?;
                Ok(ActionOutcome::Unit)
            }
            Action::RequestSlash {
                caller,
                prover,
                amount,
            } => Ok(ActionOutcome::SlashRequested(self.request_slash(
                *caller, *prover, *amount,
            )?)),
            Action::FinishSlash {
                caller,
                prover,
                index,
            } => Ok(ActionOutcome::SlashFinalized(self.finish_slash(
                *caller, *prover, *index,
            )?)),
            Action::CancelSlash {
                caller,
                prover,
                index,
            } => Ok(ActionOutcome::SlashCancelled(self.cancel_slash(
                *caller, *prover, *index,
            )?)),
        }
    }
}
