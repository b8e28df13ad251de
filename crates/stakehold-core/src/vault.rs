//! Exchange-rate vault.
//!
//! One type serves both layers of the ledger: the global vault (collateral → normalized shares)
//! and each prover's vault (normalized shares → receipt shares). The engine composes two
//! independent instances; neither layer knows about the other.
//!
//! Conversions carry a virtual offset of one share and one asset:
//! - `to_shares(a) = floor(a · (S + 1) / (A + 1))`
//! - `to_assets(s) = floor(s · (A + 1) / (S + 1))`
//!
//! which is exactly 1:1 on an empty vault, never divides by zero for orphaned or fully slashed
//! vaults, and always rounds in favor of the vault.

use serde::{Deserialize, Serialize};

use crate::math::{add, mul_div_floor, sub};
use crate::{Result, StakeholdError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateVault {
    total_shares: u128,
    total_assets: u128,
}

impl ExchangeRateVault {
    pub fn new() -> ExchangeRateVault {
        ExchangeRateVault::default()
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    pub fn total_assets(&self) -> u128 {
        self.total_assets
    }

    pub fn convert_to_shares(&self, assets: u128) -> Result<u128> {
        mul_div_floor(
            assets,
            add(self.total_shares, 1)?,
            add(self.total_assets, 1)?,
        )
    }

    pub fn convert_to_assets(&self, shares: u128) -> Result<u128> {
        mul_div_floor(
            shares,
            add(self.total_assets, 1)?,
            add(self.total_shares, 1)?,
        )
    }

    /// Shares a `deposit(assets)` would mint right now.
    pub fn preview_deposit(&self, assets: u128) -> Result<u128> {
        self.convert_to_shares(assets)
    }

    /// Assets a `redeem(shares)` would return right now.
    pub fn preview_redeem(&self, shares: u128) -> Result<u128> {
        self.convert_to_assets(shares)
    }

    /// Deposits `assets` and mints shares.
    ///
    /// Fails with `ZeroSharesMinted` instead of silently accepting a deposit worth nothing.
    pub fn deposit(&mut self, assets: u128) -> Result<u128> {
        let shares = self.convert_to_shares(assets)?;
        if shares == 0 {
            return Err(StakeholdError::ZeroSharesMinted { assets });
        }
        self.total_shares = add(self.total_shares, shares)?;
        self.total_assets = add(self.total_assets, assets)?;
        Ok(shares)
    }

    /// Burns `shares` and releases their backing.
    ///
    /// Fails with `ZeroAssetsRedeemed` when the shares are worth nothing.
    pub fn redeem(&mut self, shares: u128) -> Result<u128> {
        let assets = self.withdraw_preview(shares)?;
        if assets == 0 {
            return Err(StakeholdError::ZeroAssetsRedeemed { shares });
        }
        self.total_shares = sub(self.total_shares, shares)?;
        self.total_assets = sub(self.total_assets, assets)?;
        Ok(assets)
    }

    /// Injects `assets`, minting floor shares for them (possibly zero).
    ///
    /// With zero shares minted the assets act as a donation to all holders.
    pub fn credit(&mut self, assets: u128) -> Result<u128> {
        let shares = self.convert_to_shares(assets)?;
        self.total_shares = add(self.total_shares, shares)?;
        self.total_assets = add(self.total_assets, assets)?;
        Ok(shares)
    }

    /// Removes `shares` together with their floor backing (possibly zero).
    pub fn withdraw_shares(&mut self, shares: u128) -> Result<u128> {
        let assets = self.withdraw_preview(shares)?;
        self.total_shares = sub(self.total_shares, shares)?;
        self.total_assets = sub(self.total_assets, assets)?;
        Ok(assets)
    }

    /// Adds backing without minting shares (raises the rate).
    pub fn donate(&mut self, assets: u128) -> Result<()> {
        self.total_assets = add(self.total_assets, assets)?;
        Ok(())
    }

    /// Removes backing without burning shares (lowers the rate).
    pub fn burn_assets(&mut self, assets: u128) -> Result<()> {
        if assets > self.total_assets {
            return Err(StakeholdError::Underflow(format!(
                "vault backing {} cannot cover burn of {assets}",
                self.total_assets
            )));
        }
        self.total_assets -= assets;
        Ok(())
    }

    fn withdraw_preview(&self, shares: u128) -> Result<u128> {
        if shares > self.total_shares {
            return Err(StakeholdError::InsufficientShares {
                requested: shares,
                available: self.total_shares,
            });
        }
        if shares == 0 {
            return Ok(0);
        }
        // The last shares out take whatever backing is left (no virtual-offset residue).
        if shares == self.total_shares {
            return Ok(self.total_assets);
        }
        Ok(self.convert_to_assets(shares)?.min(self.total_assets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_vault_is_one_to_one() {
        let mut v = ExchangeRateVault::new();
        assert_eq!(v.preview_deposit(100).unwrap(), 100);
        assert_eq!(v.deposit(100).unwrap(), 100);
        assert_eq!(v.redeem(40).unwrap(), 40);
        assert_eq!(v.total_shares(), 60);
        assert_eq!(v.total_assets(), 60);
    }

    #[test]
    fn donation_raises_rate_without_minting() {
        let mut v = ExchangeRateVault::new();
        v.deposit(1_000).unwrap();
        v.donate(500).unwrap();
        assert_eq!(v.total_shares(), 1_000);
        // The virtual share keeps a sliver of the donation.
        assert_eq!(v.convert_to_assets(1_000).unwrap(), 1_499);
        // Newcomers pay the raised rate.
        assert_eq!(v.preview_deposit(150).unwrap(), 100);
    }

    #[test]
    fn zero_mint_is_a_hard_failure() {
        let mut v = ExchangeRateVault::new();
        v.deposit(10).unwrap();
        v.donate(1_000).unwrap();
        let before = v;
        assert_eq!(
            v.deposit(1),
            Err(StakeholdError::ZeroSharesMinted { assets: 1 })
        );
        assert_eq!(v, before);
    }

    #[test]
    fn zero_redeem_is_a_hard_failure() {
        let mut v = ExchangeRateVault::new();
        v.deposit(1_000).unwrap();
        v.burn_assets(999).unwrap();
        let before = v;
        assert_eq!(
            v.redeem(1),
            Err(StakeholdError::ZeroAssetsRedeemed { shares: 1 })
        );
        assert_eq!(v, before);
    }

    #[test]
    fn full_exit_takes_remaining_backing() {
        let mut v = ExchangeRateVault::new();
        v.deposit(3).unwrap();
        v.donate(4).unwrap();
        assert_eq!(v.withdraw_shares(3).unwrap(), 7);
        assert_eq!(v.total_assets(), 0);
        assert_eq!(v.total_shares(), 0);
    }

    #[test]
    fn fully_slashed_vault_still_converts() {
        let mut v = ExchangeRateVault::new();
        v.deposit(100).unwrap();
        v.burn_assets(100).unwrap();
        // Outstanding shares are worthless; new deposits are not diluted to zero.
        assert_eq!(v.convert_to_assets(100).unwrap(), 0);
        assert_eq!(v.preview_deposit(10).unwrap(), 1_010);
    }

    #[test]
    fn over_redeem_is_rejected() {
        let mut v = ExchangeRateVault::new();
        v.deposit(5).unwrap();
        assert_eq!(
            v.withdraw_shares(6),
            Err(StakeholdError::InsufficientShares {
                requested: 6,
                available: 5
            })
        );
    }

    proptest! {
        #[test]
        fn deposit_then_redeem_never_profits(
            seed_assets in 1u128..1_000_000_000u128,
            donation in 0u128..1_000_000_000u128,
            deposit in 1u128..1_000_000_000u128,
        ) {
            let mut v = ExchangeRateVault::new();
            v.deposit(seed_assets).unwrap();
            v.donate(donation).unwrap();
            let Ok(shares) = v.deposit(deposit) else { return Ok(()); };
            let back = v.withdraw_shares(shares).unwrap();
            prop_assert!(back <= deposit);
        }

        #[test]
        fn withdraw_never_exceeds_backing(
            deposit in 1u128..1_000_000_000u128,
            burn_pct in 0u128..=100u128,
            take in 0u128..1_000_000_000u128,
        ) {
            let mut v = ExchangeRateVault::new();
            v.deposit(deposit).unwrap();
            v.burn_assets(deposit * burn_pct / 100).unwrap();
            let take = take.min(v.total_shares());
            let before_assets = v.total_assets();
            let out = v.withdraw_shares(take).unwrap();
            prop_assert!(out <= before_assets);
            prop_assert_eq!(v.total_assets(), before_assets - out);
        }
    }
}
