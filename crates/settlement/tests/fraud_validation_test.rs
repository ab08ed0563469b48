//! Server-side validation scenarios: a client reports a signature and
//! the server must settle on chain facts alone.
//!
//! Covers the adversarial cases:
//!   1. Short-paid transaction reported as a full payment
//!   2. Transfers routed to the wrong recipients
//!   3. Reverted transaction reported as success
//!   4. Signature that never reaches the chain (pending, then expired)
//!   5. Wrong-tier payment at another tier's exact price

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use patronpay_core::{PaymentPurpose, PurposeKind, SubscriptionTier};
use patronpay_distribution::{split_lamports, Distribution, FeeSchedule};
use patronpay_settlement::{
    EntitlementSink, GrantError, InvalidReason, MemoryLedger, MockChainRpc, PaymentPipeline,
    PaymentStatus, PipelineConfig, PriceQuote, Pricing, Result, ValidationVerdict,
};

const BASIC_PRICE: u64 = 50_000_000;
const STANDARD_PRICE: u64 = 150_000_000;

struct CatalogPricing {
    creator_wallet: Pubkey,
}

#[async_trait]
impl Pricing for CatalogPricing {
    async fn quote(&self, purpose: &PaymentPurpose, _payer: &Pubkey) -> Result<PriceQuote> {
        let gross_lamports = match purpose {
            PaymentPurpose::Subscription { tier, .. } => match tier {
                SubscriptionTier::Basic => BASIC_PRICE,
                SubscriptionTier::Standard => STANDARD_PRICE,
                SubscriptionTier::Premium => 500_000_000,
            },
            PaymentPurpose::PostPurchase { .. } => 20_000_000,
            PaymentPurpose::MessageUnlock { .. } => 5_000_000,
            PaymentPurpose::Tip { lamports, .. } => *lamports,
        };
        Ok(PriceQuote {
            gross_lamports,
            creator: self.creator_wallet,
            referrer: None,
        })
    }

    async fn tier_prices(&self, _creator: &str) -> Result<Vec<u64>> {
        Ok(vec![BASIC_PRICE, STANDARD_PRICE, 500_000_000])
    }
}

#[derive(Default)]
struct CountingSink {
    grants: Mutex<u32>,
}

#[async_trait]
impl EntitlementSink for CountingSink {
    async fn grant(
        &self,
        _payer: &Pubkey,
        _purpose: &PaymentPurpose,
        _distribution: &Distribution,
    ) -> std::result::Result<(), GrantError> {
        *self.grants.lock() += 1;
        Ok(())
    }
}

struct Harness {
    rpc: Arc<MockChainRpc>,
    pipeline: PaymentPipeline,
    sink: Arc<CountingSink>,
    creator_wallet: Pubkey,
    platform: Pubkey,
}

impl Harness {
    /// The distribution the server expects for a Standard subscription
    fn expected_standard(&self) -> Distribution {
        split_lamports(
            STANDARD_PRICE,
            self.creator_wallet,
            self.platform,
            None,
            &FeeSchedule::default(),
        )
        .unwrap()
    }
}

fn harness() -> Harness {
    patronpay_logging::init_for_tests();

    let rpc = Arc::new(MockChainRpc::new());
    let platform = Pubkey::new_unique();
    let creator_wallet = Pubkey::new_unique();
    let sink = Arc::new(CountingSink::default());

    let mut config = PipelineConfig::new(platform);
    config.poll_interval = Duration::from_millis(20);
    config.confirmation_timeout = Duration::from_millis(300);

    let mut pipeline = PaymentPipeline::new(
        rpc.clone(),
        Arc::new(CatalogPricing { creator_wallet }),
        Arc::new(MemoryLedger::new()),
        config,
    );
    pipeline.register_entitlement_sink(PurposeKind::Subscription, sink.clone());

    Harness {
        rpc,
        pipeline,
        sink,
        creator_wallet,
        platform,
    }
}

fn standard_subscription() -> PaymentPurpose {
    PaymentPurpose::Subscription {
        creator: "creator-1".into(),
        tier: SubscriptionTier::Standard,
    }
}

fn invalid_reason(record: &patronpay_settlement::PaymentRecord) -> InvalidReason {
    match record.validation.as_ref().expect("validation report").verdict {
        ValidationVerdict::Invalid(reason) => reason,
        ValidationVerdict::Valid => panic!("expected an invalid verdict"),
    }
}

#[tokio::test]
async fn test_short_paid_transaction_rejected() {
    let harness = harness();
    let payer = Pubkey::new_unique();
    let expected = harness.expected_standard();

    // On-chain: creator leg short by 10_000_000 lamports
    let sig = Signature::new_unique();
    harness.rpc.register_confirmed(
        sig,
        payer,
        true,
        vec![
            (expected.creator, expected.creator_lamports - 10_000_000),
            (expected.platform, expected.platform_lamports),
        ],
    );

    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();

    assert_eq!(record.status, PaymentStatus::ConfirmedInvalid);
    assert_eq!(invalid_reason(&record), InvalidReason::AmountMismatch);
    assert_eq!(*harness.sink.grants.lock(), 0);
}

#[tokio::test]
async fn test_wrong_recipient_rejected() {
    let harness = harness();
    let payer = Pubkey::new_unique();
    let expected = harness.expected_standard();

    // Full amount, but the platform leg went to an attacker wallet
    let sig = Signature::new_unique();
    harness.rpc.register_confirmed(
        sig,
        payer,
        true,
        vec![
            (expected.creator, expected.creator_lamports),
            (Pubkey::new_unique(), expected.platform_lamports),
        ],
    );

    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();

    assert_eq!(record.status, PaymentStatus::ConfirmedInvalid);
    assert_eq!(invalid_reason(&record), InvalidReason::RecipientMismatch);
    assert_eq!(*harness.sink.grants.lock(), 0);
}

#[tokio::test]
async fn test_reverted_transaction_rejected() {
    let harness = harness();
    let payer = Pubkey::new_unique();
    let expected = harness.expected_standard();

    let sig = Signature::new_unique();
    harness
        .rpc
        .register_confirmed(sig, payer, false, expected.transfers());

    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();

    assert_eq!(record.status, PaymentStatus::ConfirmedInvalid);
    assert_eq!(invalid_reason(&record), InvalidReason::TransactionFailed);
    assert_eq!(*harness.sink.grants.lock(), 0);
}

#[tokio::test]
async fn test_fabricated_signature_stays_pending_then_expires() {
    let harness = harness();
    let payer = Pubkey::new_unique();
    let sig = Signature::new_unique();

    // First report: nothing on-chain yet, the record waits
    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::PendingConfirmation);

    // Re-settle with a zero horizon: still unknown to the chain, expire
    let mut config = PipelineConfig::new(harness.platform);
    config.poll_interval = Duration::from_millis(20);
    config.confirmation_timeout = Duration::from_millis(100);
    config.expiry_horizon = Duration::ZERO;
    let expiring = PaymentPipeline::new(
        harness.rpc.clone(),
        Arc::new(CatalogPricing {
            creator_wallet: harness.creator_wallet,
        }),
        Arc::new(MemoryLedger::new()),
        config,
    );

    let record = expiring
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Expired);
    assert_eq!(*harness.sink.grants.lock(), 0);
}

#[tokio::test]
async fn test_overpayment_within_fee_slack_accepted() {
    let harness = harness();
    let payer = Pubkey::new_unique();
    let expected = harness.expected_standard();

    let sig = Signature::new_unique();
    harness.rpc.register_confirmed(
        sig,
        payer,
        true,
        vec![
            (expected.creator, expected.creator_lamports + 4_000),
            (expected.platform, expected.platform_lamports),
        ],
    );

    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::ConfirmedValid);
}

#[tokio::test]
async fn test_other_tier_exact_price_settles_as_that_tier() {
    let harness = harness();
    let payer = Pubkey::new_unique();

    // Reported as Standard, but the chain shows an exact Basic payment
    let basic = split_lamports(
        BASIC_PRICE,
        harness.creator_wallet,
        harness.platform,
        None,
        &FeeSchedule::default(),
    )
    .unwrap();
    let sig = Signature::new_unique();
    harness
        .rpc
        .register_confirmed(sig, payer, true, basic.transfers());

    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();

    // Settled as what was actually paid, not bounced
    assert_eq!(record.status, PaymentStatus::ConfirmedValid);
    assert_eq!(record.distribution.gross_lamports, BASIC_PRICE);
    assert_eq!(*harness.sink.grants.lock(), 1);
}

#[tokio::test]
async fn test_near_tier_price_still_rejected() {
    let harness = harness();
    let payer = Pubkey::new_unique();

    // Off by 1 lamport from the Basic price: not an exact tier match
    let near_basic = split_lamports(
        BASIC_PRICE - 1,
        harness.creator_wallet,
        harness.platform,
        None,
        &FeeSchedule::default(),
    )
    .unwrap();
    let sig = Signature::new_unique();
    harness
        .rpc
        .register_confirmed(sig, payer, true, near_basic.transfers());

    let record = harness
        .pipeline
        .report_and_settle(sig, payer, standard_subscription())
        .await
        .unwrap();

    assert_eq!(record.status, PaymentStatus::ConfirmedInvalid);
    assert_eq!(*harness.sink.grants.lock(), 0);
}
