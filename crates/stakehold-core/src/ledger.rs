//! Balance ledgers.
//!
//! - [`ReceiptLedger`]: per-prover, non-transferable receipt shares. Only the engine mints/burns.
//! - [`CollateralLedger`]: wallet balances of the fungible collateral asset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{add, sub};
use crate::types::AccountId;
use crate::{Result, StakeholdError};

/// Restricted receipt-share ledger of one prover.
///
/// There is no transfer: the public surface is read-only and the only mutators are the
/// crate-private `mint`/`burn` used by the staking engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLedger {
    balances: BTreeMap<AccountId, u128>,
    total_supply: u128,
}

impl ReceiptLedger {
    pub fn balance_of(&self, holder: &AccountId) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Holders with a non-zero balance, in id order.
    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &u128)> {
        self.balances.iter()
    }

    pub(crate) fn mint(&mut self, to: AccountId, amount: u128) -> Result<()> {
        let next_balance = add(self.balance_of(&to), amount)?;
        let next_supply = add(self.total_supply, amount)?;
        if next_balance > 0 {
            self.balances.insert(to, next_balance);
        }
        self.total_supply = next_supply;
        Ok(())
    }

    pub(crate) fn burn(&mut self, from: AccountId, amount: u128) -> Result<()> {
        let balance = self.balance_of(&from);
        if amount > balance {
            return Err(StakeholdError::UnstakeAmountExceedsBalance {
                requested: amount,
                balance,
            });
        }
        let next_supply = sub(self.total_supply, amount)?;
        let next_balance = balance - amount;
        if next_balance == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, next_balance);
        }
        self.total_supply = next_supply;
        Ok(())
    }
}

/// Wallet balances of the collateral asset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralLedger {
    wallets: BTreeMap<AccountId, u128>,
}

impl CollateralLedger {
    pub fn balance(&self, account: &AccountId) -> u128 {
        self.wallets.get(account).copied().unwrap_or(0)
    }

    /// Sum of every wallet.
    pub fn total(&self) -> Result<u128> {
        self.wallets.values().try_fold(0u128, |acc, v| add(acc, *v))
    }

    pub fn wallets(&self) -> impl Iterator<Item = (&AccountId, &u128)> {
        self.wallets.iter()
    }

    pub(crate) fn credit(&mut self, account: AccountId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let next = add(self.balance(&account), amount)?;
        self.wallets.insert(account, next);
        Ok(())
    }

    pub(crate) fn debit(&mut self, account: AccountId, amount: u128) -> Result<()> {
        let balance = self.balance(&account);
        if amount > balance {
            return Err(StakeholdError::InsufficientCollateral {
                account,
                balance,
                required: amount,
            });
        }
        let next = balance - amount;
        if next == 0 {
            self.wallets.remove(&account);
        } else {
            self.wallets.insert(account, next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(b: u8) -> AccountId {
        AccountId(crate::Hash32([b; 32]))
    }

    #[test]
    fn receipt_mint_and_burn_track_supply() {
        let mut l = ReceiptLedger::default();
        l.mint(acct(1), 10).unwrap();
        l.mint(acct(2), 5).unwrap();
        assert_eq!(l.total_supply(), 15);
        l.burn(acct(1), 10).unwrap();
        assert_eq!(l.balance_of(&acct(1)), 0);
        assert_eq!(l.holders().count(), 1);
        assert_eq!(l.total_supply(), 5);
    }

    #[test]
    fn receipt_over_burn_fails_without_mutation() {
        let mut l = ReceiptLedger::default();
        l.mint(acct(1), 3).unwrap();
        let before = l.clone();
        assert_eq!(
            l.burn(acct(1), 4),
            Err(StakeholdError::UnstakeAmountExceedsBalance {
                requested: 4,
                balance: 3
            })
        );
        assert_eq!(l, before);
    }

    #[test]
    fn collateral_debit_reports_shortfall() {
        let mut c = CollateralLedger::default();
        c.credit(acct(9), 7).unwrap();
        let err = c.debit(acct(9), 8).unwrap_err();
        assert_eq!(
            err,
            StakeholdError::InsufficientCollateral {
                account: acct(9),
                balance: 7,
                required: 8
            }
        );
        c.debit(acct(9), 7).unwrap();
        assert_eq!(c.total().unwrap(), 0);
        assert_eq!(c.wallets().count(), 0);
    }
}
