//! Slash claims and the finalize/cancel authorization check.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{AccountId, ProverId, Role, Timestamp};
use crate::{Result, StakeholdError};

/// Read-only view of the governance collaborator's timing parameters.
///
/// Consulted on every authorization check, never cached.
pub trait GovernanceParams: Send + Sync + fmt::Debug {
    /// Seconds between proposal submission and the start of voting.
    fn voting_delay(&self) -> u64;
    /// Seconds voting stays open.
    fn voting_period(&self) -> u64;
}

/// Fixed governance timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticGovernance {
    pub voting_delay: u64,
    pub voting_period: u64,
}

impl StaticGovernance {
    pub const DEFAULT_VOTING_DELAY: u64 = 24 * 60 * 60;
    pub const DEFAULT_VOTING_PERIOD: u64 = 7 * 24 * 60 * 60;
}

impl Default for StaticGovernance {
    fn default() -> Self {
        Self {
            voting_delay: Self::DEFAULT_VOTING_DELAY,
            voting_period: Self::DEFAULT_VOTING_PERIOD,
        }
    }
}

impl GovernanceParams for StaticGovernance {
    fn voting_delay(&self) -> u64 {
        self.voting_delay
    }

    fn voting_period(&self) -> u64 {
        self.voting_period
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashStatus {
    Pending,
    Finalized {
        vault_slashed: u128,
        escrow_slashed: u128,
        collateral_burned: u128,
    },
    Cancelled,
}

/// A reported slash against one prover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashClaim {
    pub prover: ProverId,
    /// Normalized shares to slash, clamped to the exposure at request time.
    pub amount: u128,
    /// Amount as reported, before clamping.
    pub requested_amount: u128,
    pub requested_at: Timestamp,
    pub status: SlashStatus,
}

impl SlashClaim {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, SlashStatus::Pending)
    }
}

/// Which branch authorized a finalize or cancel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashPath {
    Governance,
    Owner,
    PublicAfterDeadline,
}

/// Two-branch authorization: privileged callers now, anyone after the public deadline.
#[derive(Clone, Copy, Debug)]
pub struct SlashAuthority<'a> {
    pub owner: AccountId,
    pub governance: AccountId,
    pub slash_delay: u64,
    pub cancel_delay: u64,
    pub params: &'a dyn GovernanceParams,
}

impl SlashAuthority<'_> {
    /// `requested_at + cancel_delay + voting_delay + voting_period`.
    pub fn public_deadline(&self, requested_at: Timestamp) -> Timestamp {
        requested_at
            .saturating_add(self.cancel_delay)
            .saturating_add(self.params.voting_delay())
            .saturating_add(self.params.voting_period())
    }

    pub fn authorize_finish(
        &self,
        caller: AccountId,
        requested_at: Timestamp,
        now: Timestamp,
    ) -> Result<SlashPath> {
        if caller == self.governance {
            return Ok(SlashPath::Governance);
        }
        let deadline = self.public_deadline(requested_at);
        if caller == self.owner {
            let ready_at = requested_at.saturating_add(self.slash_delay);
            if now >= ready_at {
                return Ok(SlashPath::Owner);
            }
            if now >= deadline {
                return Ok(SlashPath::PublicAfterDeadline);
            }
            debug!(ready_at, now, "owner slash finalize too early");
            return Err(StakeholdError::SlashNotReady { ready_at, now });
        }
        self.public_or_unauthorized(caller, deadline, now)
    }

    pub fn authorize_cancel(
        &self,
        caller: AccountId,
        requested_at: Timestamp,
        now: Timestamp,
    ) -> Result<SlashPath> {
        if caller == self.governance {
            return Ok(SlashPath::Governance);
        }
        if caller == self.owner {
            return Ok(SlashPath::Owner);
        }
        self.public_or_unauthorized(caller, self.public_deadline(requested_at), now)
    }

    fn public_or_unauthorized(
        &self,
        caller: AccountId,
        deadline: Timestamp,
        now: Timestamp,
    ) -> Result<SlashPath> {
        if now >= deadline {
            Ok(SlashPath::PublicAfterDeadline)
        } else {
            Err(StakeholdError::Unauthorized {
                caller,
                required: Role::Owner,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    const GOV: StaticGovernance = StaticGovernance {
        voting_delay: 10,
        voting_period: 20,
    };

    fn authority(params: &dyn GovernanceParams) -> SlashAuthority<'_> {
        SlashAuthority {
            owner: acct("owner"),
            governance: acct("governance"),
            slash_delay: 100,
            cancel_delay: 200,
            params,
        }
    }

    #[test]
    fn governance_finalizes_immediately() {
        let auth = authority(&GOV);
        assert_eq!(
            auth.authorize_finish(acct("governance"), 0, 0).unwrap(),
            SlashPath::Governance
        );
    }

    #[test]
    fn owner_waits_for_slash_delay() {
        let auth = authority(&GOV);
        assert_eq!(
            auth.authorize_finish(acct("owner"), 5, 104),
            Err(StakeholdError::SlashNotReady {
                ready_at: 105,
                now: 104
            })
        );
        assert_eq!(
            auth.authorize_finish(acct("owner"), 5, 105).unwrap(),
            SlashPath::Owner
        );
    }

    #[test]
    fn public_deadline_includes_voting_window() {
        let auth = authority(&GOV);
        assert_eq!(auth.public_deadline(0), 230);
        let anyone = acct("anyone");
        assert_eq!(
            auth.authorize_finish(anyone, 0, 229),
            Err(StakeholdError::Unauthorized {
                caller: anyone,
                required: Role::Owner
            })
        );
        assert_eq!(
            auth.authorize_finish(anyone, 0, 230).unwrap(),
            SlashPath::PublicAfterDeadline
        );
        assert_eq!(
            auth.authorize_cancel(anyone, 0, 230).unwrap(),
            SlashPath::PublicAfterDeadline
        );
    }

    #[test]
    fn owner_cancels_any_time() {
        let auth = authority(&GOV);
        assert_eq!(
            auth.authorize_cancel(acct("owner"), 0, 0).unwrap(),
            SlashPath::Owner
        );
        assert!(auth.authorize_cancel(acct("anyone"), 0, 0).is_err());
    }

    #[test]
    fn deadline_is_read_fresh_from_collaborator() {
        use std::sync::atomic::{AtomicU64, Ordering};

        #[derive(Debug)]
        struct Shifting(AtomicU64);
        impl GovernanceParams for Shifting {
            fn voting_delay(&self) -> u64 {
                self.0.load(Ordering::SeqCst)
            }
            fn voting_period(&self) -> u64 {
                0
            }
        }

        let gov = Shifting(AtomicU64::new(0));
        let auth = authority(&gov);
        assert_eq!(auth.public_deadline(0), 200);
        gov.0.store(50, Ordering::SeqCst);
        assert_eq!(auth.public_deadline(0), 250);
    }
}
