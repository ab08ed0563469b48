//! PatronPay Settlement
//!
//! Solana client for submitting and settling creator payments.
//!
//! ## Payment flow
//!
//! 1. **Quote**: [`PaymentPipeline::initiate_payment`] prices the purpose
//!    and computes the creator/platform/referrer [`Distribution`].
//! 2. **Submit**: the client builds the 2-or-3-transfer transaction, has
//!    the wallet sign it, and submits with bounded retries
//!    ([`SubmissionCoordinator`]).
//! 3. **Confirm**: the server polls for finality with a bounded timeout
//!    ([`ConfirmationWaiter`]); a timeout is a recoverable outcome, not an
//!    error.
//! 4. **Validate**: the server re-derives the confirmed transaction's
//!    actual per-recipient transfers and compares them against the
//!    expected distribution ([`SettlementValidator`]). Client-reported
//!    amounts are never trusted.
//! 5. **Record**: the validated result is persisted exactly once per
//!    signature and the purchased entitlement is granted at-least-once
//!    ([`SettlementRecorder`]).
//!
//! A transaction signature is the idempotency key throughout: reporting
//! the same signature twice yields the same ledger entry and a single
//! entitlement grant.

mod builder;
mod confirm;
mod pipeline;
mod record;
mod rpc;
mod submit;
mod types;
mod validate;
mod wallet;

pub use builder::{build_transfer_transaction, parse_address};
pub use confirm::{ConfirmationOutcome, ConfirmationWaiter};
pub use pipeline::{PaymentPipeline, PipelineConfig, PriceQuote, Pricing};
pub use record::{
    EntitlementSink, GrantError, InsertOutcome, LedgerStore, MemoryLedger, SettlementRecorder,
};
pub use rpc::{
    ChainRpc, ConfirmedTransfers, MockChainRpc, RpcConfig, SignatureStatus, SimulationOutcome,
    SolanaRpc,
};
pub use submit::{AttemptRecord, RetryPolicy, SubmissionCoordinator, SubmissionOutcome, SubmissionPhase};
pub use types::*;
pub use validate::SettlementValidator;
pub use wallet::{KeypairSigner, RejectingSigner, WalletSigner};

use patronpay_distribution::DistributionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("signing rejected by wallet")]
    UserRejected,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("submission failed after {attempts} attempts: {last_error}")]
    SubmissionFailed { attempts: u32, last_error: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no price configured for {0}")]
    UnknownPrice(String),
}

impl From<DistributionError> for PaymentError {
    fn from(err: DistributionError) -> Self {
        match err {
            DistributionError::InvalidAmount(msg) => PaymentError::InvalidAmount(msg),
            DistributionError::InvalidFeeSchedule(msg) => PaymentError::InvalidAmount(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
