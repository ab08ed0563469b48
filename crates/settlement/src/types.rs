//! Settlement ledger and validation types

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

use patronpay_core::PaymentPurpose;
use patronpay_distribution::Distribution;

/// Default absolute tolerance when comparing on-chain transfers against
/// the expected distribution: one signature fee. Absorbs fee-accounting
/// overpayment only; a shortfall of even one lamport is a mismatch.
pub const DEFAULT_VALIDATION_TOLERANCE_LAMPORTS: u64 = 5_000;

/// Default interval between confirmation status polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;

/// Default bound on how long a settlement call waits for confirmation
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 45;

/// Pending records whose signature is still unknown to the chain after
/// this horizon are marked expired (well past any blockhash validity
/// window).
pub const DEFAULT_EXPIRY_HORIZON_SECS: u64 = 2 * 3_600;

/// Current unix timestamp in seconds
pub(crate) fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One attempt to pay, created at checkout and superseded by a
/// [`PaymentRecord`] once a signature exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Paying wallet
    pub payer: Pubkey,
    /// What is being purchased
    pub purpose: PaymentPurpose,
    /// Expected split of the payment
    pub distribution: Distribution,
    /// Creation time (unix seconds)
    pub created_at: u64,
}

impl PaymentIntent {
    pub fn new(payer: Pubkey, purpose: PaymentPurpose, distribution: Distribution) -> Self {
        Self {
            payer,
            purpose,
            distribution,
            created_at: unix_now(),
        }
    }
}

/// Settlement status of a reported signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Signature reported, finality not yet observed
    PendingConfirmation,
    /// Confirmed on-chain and the transfers match the expected distribution
    ConfirmedValid,
    /// Confirmed on-chain but the transfers do not match (or the
    /// transaction itself failed)
    ConfirmedInvalid,
    /// Signature never appeared on-chain within the expiry horizon
    Expired,
}

impl PaymentStatus {
    /// Terminal statuses are never revisited; the ledger entry is
    /// write-once past this point.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::PendingConfirmation)
    }
}

/// Which leg of the distribution a transfer check covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientRole {
    Creator,
    Platform,
    Referrer,
}

/// Per-recipient comparison of expected versus actually-settled lamports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCheck {
    pub role: RecipientRole,
    pub recipient: Pubkey,
    pub expected_lamports: u64,
    pub actual_lamports: u64,
    pub matched: bool,
}

/// Why a confirmed transaction failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// A recipient received a different amount than expected
    AmountMismatch,
    /// An expected recipient received nothing
    RecipientMismatch,
    /// The chain reports the transaction itself failed/reverted
    TransactionFailed,
    /// The transaction is unknown to the chain (or its data could not be
    /// fetched — validation fails closed)
    TransactionNotFound,
}

/// Validation verdict for a confirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationVerdict {
    Valid,
    Invalid(InvalidReason),
}

/// Verdict plus the per-recipient comparisons that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub verdict: ValidationVerdict,
    pub checks: Vec<TransferCheck>,
}

impl ValidationReport {
    pub fn invalid(reason: InvalidReason) -> Self {
        Self {
            verdict: ValidationVerdict::Invalid(reason),
            checks: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verdict == ValidationVerdict::Valid
    }

    /// Total lamports actually received by the expected recipients
    pub fn actual_gross(&self) -> u64 {
        self.checks.iter().map(|c| c.actual_lamports).sum()
    }
}

/// Durable settlement ledger entry, keyed by transaction signature.
///
/// Created when a signature is first reported; mutated only by the
/// settlement recorder; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Transaction signature — globally unique idempotency key
    pub signature: Signature,
    /// Settlement status
    pub status: PaymentStatus,
    /// Paying wallet
    pub payer: Pubkey,
    /// What was purchased
    pub purpose: PaymentPurpose,
    /// Expected split the payment was validated against
    pub distribution: Distribution,
    /// When the signature was first reported (unix seconds)
    pub created_at: u64,
    /// When finality was observed (unix seconds)
    pub confirmed_at: Option<u64>,
    /// Per-transfer comparison results
    pub validation: Option<ValidationReport>,
    /// Whether the entitlement grant has been delivered. A valid record
    /// with this unset is picked up by grant reconciliation.
    pub entitlement_granted: bool,
}

impl PaymentRecord {
    /// Fresh entry for a just-reported signature
    pub fn pending(
        signature: Signature,
        payer: Pubkey,
        purpose: PaymentPurpose,
        distribution: Distribution,
    ) -> Self {
        Self {
            signature,
            status: PaymentStatus::PendingConfirmation,
            payer,
            purpose,
            distribution,
            created_at: unix_now(),
            confirmed_at: None,
            validation: None,
            entitlement_granted: false,
        }
    }

    /// Seconds since the signature was first reported
    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.created_at)
    }
}
