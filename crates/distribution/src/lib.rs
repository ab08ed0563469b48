//! PatronPay Distribution
//!
//! Pure computation of how a gross payment splits among creator, platform,
//! and referrer. No I/O; deterministic for identical inputs.
//!
//! ## Split rules
//!
//! - No referrer: platform takes `platform_fee_bps` (default 10%), creator
//!   receives the rest.
//! - Referrer present: platform takes `referred_platform_fee_bps` (default
//!   5%), referrer takes `referral_fee_bps` (default 5%), creator receives
//!   the rest.
//! - Fee shares are floored to whole lamports; the creator absorbs the
//!   rounding dust, so the three shares always sum exactly to the gross.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use patronpay_core::sol_to_lamports;

/// Basis-point denominator (100% == 10_000 bps)
pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid fee schedule: {0}")]
    InvalidFeeSchedule(String),
}

pub type Result<T> = std::result::Result<T, DistributionError>;

/// Fee percentages in basis points, externally configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Platform cut when no referrer is attached (default 10%)
    pub platform_fee_bps: u16,
    /// Platform cut when a referrer is attached (default 5%)
    pub referred_platform_fee_bps: u16,
    /// Referrer cut when attached (default 5%)
    pub referral_fee_bps: u16,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_bps: 1_000,
            referred_platform_fee_bps: 500,
            referral_fee_bps: 500,
        }
    }
}

impl FeeSchedule {
    /// Reject schedules where the fees leave the creator with nothing
    /// (or less than nothing).
    pub fn validate(&self) -> Result<()> {
        let no_referrer = self.platform_fee_bps as u64;
        let with_referrer = self.referred_platform_fee_bps as u64 + self.referral_fee_bps as u64;
        if no_referrer >= BPS_DENOMINATOR || with_referrer >= BPS_DENOMINATOR {
            return Err(DistributionError::InvalidFeeSchedule(format!(
                "fees must total under 100%: {}bps / {}bps",
                no_referrer, with_referrer
            )));
        }
        Ok(())
    }

    fn platform_bps(&self, has_referrer: bool) -> u64 {
        if has_referrer {
            self.referred_platform_fee_bps as u64
        } else {
            self.platform_fee_bps as u64
        }
    }
}

/// The computed three-way split of a gross payment.
///
/// Immutable once computed; created fresh for every payment attempt and
/// embedded into the settlement ledger after the payment confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Gross payment in lamports
    pub gross_lamports: u64,
    /// Creator receiving the payment
    pub creator: Pubkey,
    /// Platform fee wallet
    pub platform: Pubkey,
    /// Referrer wallet, when the payer has a referral chain
    pub referrer: Option<Pubkey>,
    /// Creator share (remainder after fees, absorbs rounding dust)
    pub creator_lamports: u64,
    /// Platform share
    pub platform_lamports: u64,
    /// Referrer share (zero when no referrer)
    pub referrer_lamports: u64,
}

impl Distribution {
    /// The non-zero transfers this distribution requires, in
    /// (recipient, lamports) form. Two entries without a referrer,
    /// three with one.
    pub fn transfers(&self) -> Vec<(Pubkey, u64)> {
        let mut out = Vec::with_capacity(3);
        if self.creator_lamports > 0 {
            out.push((self.creator, self.creator_lamports));
        }
        if self.platform_lamports > 0 {
            out.push((self.platform, self.platform_lamports));
        }
        if self.referrer_lamports > 0 {
            if let Some(referrer) = self.referrer {
                out.push((referrer, self.referrer_lamports));
            }
        }
        out
    }
}

/// Split a gross lamport amount per the fee schedule.
///
/// Each fee share is floored to whole lamports and the creator receives
/// the remainder, so the shares always sum exactly to `gross_lamports`.
pub fn split_lamports(
    gross_lamports: u64,
    creator: Pubkey,
    platform: Pubkey,
    referrer: Option<Pubkey>,
    schedule: &FeeSchedule,
) -> Result<Distribution> {
    if gross_lamports == 0 {
        return Err(DistributionError::InvalidAmount(
            "gross amount must be positive".to_string(),
        ));
    }
    schedule.validate()?;

    let has_referrer = referrer.is_some();
    let platform_lamports =
        (gross_lamports as u128 * schedule.platform_bps(has_referrer) as u128
            / BPS_DENOMINATOR as u128) as u64;
    let referrer_lamports = if has_referrer {
        (gross_lamports as u128 * schedule.referral_fee_bps as u128 / BPS_DENOMINATOR as u128)
            as u64
    } else {
        0
    };
    // Remainder to the creator; fees are strictly under 100% so this
    // cannot underflow.
    let creator_lamports = gross_lamports - platform_lamports - referrer_lamports;

    Ok(Distribution {
        gross_lamports,
        creator,
        platform,
        referrer,
        creator_lamports,
        platform_lamports,
        referrer_lamports,
    })
}

/// Split a decimal SOL amount per the fee schedule.
///
/// Validates that `gross_sol` is finite and positive, converts to
/// lamports once, and delegates to [`split_lamports`].
pub fn compute_distribution(
    gross_sol: f64,
    creator: Pubkey,
    platform: Pubkey,
    referrer: Option<Pubkey>,
    schedule: &FeeSchedule,
) -> Result<Distribution> {
    let gross_lamports = sol_to_lamports(gross_sol).ok_or_else(|| {
        DistributionError::InvalidAmount(format!("not a positive finite SOL amount: {gross_sol}"))
    })?;
    split_lamports(gross_lamports, creator, platform, referrer, schedule)
}
