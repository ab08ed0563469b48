//! Payment pipeline
//!
//! Wires quote → submit → confirm → validate → record into the two
//! entry points the platform exposes: the client-side
//! [`PaymentPipeline::initiate_payment`] / [`PaymentPipeline::submit_payment`]
//! pair and the server-side [`PaymentPipeline::report_and_settle`].
//!
//! The server half re-derives everything from its own pricing and the
//! chain. Nothing reported by the client beyond the signature itself is
//! trusted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use patronpay_core::{PaymentPurpose, PurposeKind};
use patronpay_distribution::{split_lamports, Distribution, FeeSchedule};

use crate::builder::build_transfer_transaction;
use crate::confirm::{ConfirmationOutcome, ConfirmationWaiter};
use crate::record::{EntitlementSink, LedgerStore, SettlementRecorder};
use crate::rpc::{ChainRpc, SignatureStatus};
use crate::submit::{RetryPolicy, SubmissionCoordinator};
use crate::types::{
    InvalidReason, PaymentIntent, PaymentRecord, PaymentStatus, ValidationVerdict,
    DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_EXPIRY_HORIZON_SECS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_VALIDATION_TOLERANCE_LAMPORTS,
};
use crate::validate::SettlementValidator;
use crate::wallet::WalletSigner;
use crate::{PaymentError, Result};

/// Server-side price for a purpose: the gross amount owed and who
/// receives the creator/referrer legs
#[derive(Debug, Clone)]
pub struct PriceQuote {
    /// Gross price in lamports
    pub gross_lamports: u64,
    /// Creator payout wallet
    pub creator: Pubkey,
    /// Referrer payout wallet, if the payer was referred
    pub referrer: Option<Pubkey>,
}

/// Source of truth for what a purpose costs and where payouts go.
/// Backed by the creator/content catalog; the payment core only
/// consumes it.
#[async_trait]
pub trait Pricing: Send + Sync {
    /// Price the purpose for this payer, or `UnknownPrice` if the
    /// target does not exist or has no price
    async fn quote(&self, purpose: &PaymentPurpose, payer: &Pubkey) -> Result<PriceQuote>;

    /// All tier prices (lamports) offered by a creator, for resolving a
    /// confirmed payment that matches a different tier than reported
    async fn tier_prices(&self, creator: &str) -> Result<Vec<u64>>;
}

/// Pipeline tuning knobs. `new` takes the one field with no sensible
/// default: the platform treasury wallet.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Platform treasury wallet receiving the fee leg
    pub platform: Pubkey,
    /// Fee split applied to every payment
    pub fee_schedule: FeeSchedule,
    /// Submission retry policy
    pub retry: RetryPolicy,
    /// How long one settlement call waits for finality
    pub confirmation_timeout: Duration,
    /// Interval between confirmation polls
    pub poll_interval: Duration,
    /// Age past which a chain-unknown pending signature is expired
    pub expiry_horizon: Duration,
    /// Overpayment tolerance for validation (lamports)
    pub validation_tolerance_lamports: u64,
}

impl PipelineConfig {
    pub fn new(platform: Pubkey) -> Self {
        Self {
            platform,
            fee_schedule: FeeSchedule::default(),
            retry: RetryPolicy::default(),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            expiry_horizon: Duration::from_secs(DEFAULT_EXPIRY_HORIZON_SECS),
            validation_tolerance_lamports: DEFAULT_VALIDATION_TOLERANCE_LAMPORTS,
        }
    }
}

/// End-to-end payment orchestrator
pub struct PaymentPipeline {
    rpc: Arc<dyn ChainRpc>,
    pricing: Arc<dyn Pricing>,
    recorder: SettlementRecorder,
    coordinator: SubmissionCoordinator,
    waiter: ConfirmationWaiter,
    validator: SettlementValidator,
    config: PipelineConfig,
}

impl PaymentPipeline {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        pricing: Arc<dyn Pricing>,
        store: Arc<dyn LedgerStore>,
        config: PipelineConfig,
    ) -> Self {
        let coordinator = SubmissionCoordinator::new(rpc.clone(), config.retry.clone());
        let waiter = ConfirmationWaiter::new(rpc.clone()).with_poll_interval(config.poll_interval);
        let validator = SettlementValidator::new(rpc.clone())
            .with_tolerance(config.validation_tolerance_lamports);
        Self {
            rpc,
            pricing,
            recorder: SettlementRecorder::new(store),
            coordinator,
            waiter,
            validator,
            config,
        }
    }

    /// Register the entitlement granter for a purpose kind
    pub fn register_entitlement_sink(&mut self, kind: PurposeKind, sink: Arc<dyn EntitlementSink>) {
        self.recorder.register_sink(kind, sink);
    }

    /// The settlement recorder, for reconciliation jobs
    pub fn recorder(&self) -> &SettlementRecorder {
        &self.recorder
    }

    /// Price a purpose and compute its expected distribution
    pub async fn initiate_payment(
        &self,
        payer: Pubkey,
        purpose: PaymentPurpose,
    ) -> Result<PaymentIntent> {
        let distribution = self.expected_distribution(&purpose, &payer).await?;
        info!(
            "Payment initiated: {} paying {} lamports for {}",
            payer, distribution.gross_lamports, purpose
        );
        Ok(PaymentIntent::new(payer, purpose, distribution))
    }

    /// Sign and submit the transfer transaction for an intent, returning
    /// the accepted signature
    pub async fn submit_payment(
        &self,
        intent: &PaymentIntent,
        signer: &dyn WalletSigner,
    ) -> Result<Signature> {
        let payer = intent.payer;
        let distribution = intent.distribution.clone();
        let outcome = self
            .coordinator
            .submit(
                move |blockhash| build_transfer_transaction(&payer, &distribution, blockhash),
                signer,
            )
            .await?;
        Ok(outcome.signature)
    }

    /// Settle a reported signature: confirm, validate, record, grant.
    ///
    /// Idempotent by signature — re-reporting a settled payment returns
    /// the existing terminal record. A still-pending result means the
    /// caller should report again later.
    pub async fn report_and_settle(
        &self,
        signature: Signature,
        payer: Pubkey,
        purpose: PaymentPurpose,
    ) -> Result<PaymentRecord> {
        // Expected amounts come from our own pricing, not the client
        let expected = self.expected_distribution(&purpose, &payer).await?;

        let record = self
            .recorder
            .register(signature, payer, purpose.clone(), expected)
            .await?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        // Validate against the distribution the record was registered
        // with: a catalog price change must not reinterpret a payment
        // already in flight.
        let expected = record.distribution.clone();

        match self
            .waiter
            .await_confirmation(&signature, self.config.confirmation_timeout)
            .await
        {
            ConfirmationOutcome::TimedOut => {
                if record.age_secs() >= self.config.expiry_horizon.as_secs()
                    && self.chain_has_no_trace(&signature).await
                {
                    return self.recorder.expire(&signature).await;
                }
                // Still in flight; leave pending for a later report
                return Ok(record);
            }
            // Confirmed or failed on-chain: either way the validator
            // re-derives the outcome from the fetched transaction
            ConfirmationOutcome::Confirmed { .. } | ConfirmationOutcome::Failed { .. } => {}
        }

        let report = self.validator.validate(&signature, &payer, &expected).await;

        // A wrong-amount subscription payment may simply be a different
        // tier at its exact price; settle it as that tier instead of
        // bouncing the money.
        let (report, revised) = match (&report.verdict, &purpose) {
            (
                ValidationVerdict::Invalid(InvalidReason::AmountMismatch),
                PaymentPurpose::Subscription { creator, .. },
            ) => {
                let actual_gross = report.actual_gross();
                let tier_prices = self.pricing.tier_prices(creator).await?;
                if actual_gross != expected.gross_lamports && tier_prices.contains(&actual_gross) {
                    warn!(
                        "Payment {} settled {} lamports against an expected {}; matches another tier price, revalidating",
                        signature, actual_gross, expected.gross_lamports
                    );
                    let revised = split_lamports(
                        actual_gross,
                        expected.creator,
                        expected.platform,
                        expected.referrer,
                        &self.config.fee_schedule,
                    )?;
                    let report = self.validator.validate(&signature, &payer, &revised).await;
                    (report, Some(revised))
                } else {
                    (report, None)
                }
            }
            _ => (report, None),
        };

        self.recorder.finalize(&signature, report, revised).await
    }

    async fn expected_distribution(
        &self,
        purpose: &PaymentPurpose,
        payer: &Pubkey,
    ) -> Result<Distribution> {
        let quote = self.pricing.quote(purpose, payer).await?;
        split_lamports(
            quote.gross_lamports,
            quote.creator,
            self.config.platform,
            quote.referrer,
            &self.config.fee_schedule,
        )
        .map_err(PaymentError::from)
    }

    async fn chain_has_no_trace(&self, signature: &Signature) -> bool {
        matches!(
            self.rpc.signature_status(signature).await,
            Ok(SignatureStatus::NotFound)
        )
    }
}
