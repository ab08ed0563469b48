//! Settlement recording
//!
//! Persists validated payment results exactly once per signature and
//! drives entitlement granting. Two distinct delivery contracts meet
//! here:
//! - the ledger entry is exactly-once (unique signature, terminal
//!   states never revisited);
//! - the entitlement grant is at-least-once (a failed grant leaves the
//!   record `CONFIRMED_VALID` and is retried by reconciliation — the
//!   money has moved, the entitlement must eventually catch up).
//!
//! Concurrent settlement attempts for the same signature are serialized
//! behind a per-signature mutex; different signatures proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use patronpay_core::{PaymentPurpose, PurposeKind};
use patronpay_distribution::Distribution;

use crate::types::{unix_now, PaymentRecord, PaymentStatus, ValidationReport, ValidationVerdict};
use crate::{PaymentError, Result};

/// Result of an insert-if-absent against the ledger
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The record was inserted
    Inserted(PaymentRecord),
    /// A record for this signature already existed; returned unchanged
    Existing(PaymentRecord),
}

/// Durable settlement ledger keyed by transaction signature.
///
/// `insert_if_absent` must be atomic: two concurrent inserts for one
/// signature must yield exactly one `Inserted`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_if_absent(&self, record: PaymentRecord) -> Result<InsertOutcome>;

    async fn get(&self, signature: &Signature) -> Result<Option<PaymentRecord>>;

    async fn update(&self, record: PaymentRecord) -> Result<()>;

    /// All `CONFIRMED_VALID` records for this payer and purpose
    /// (dedup key)
    async fn find_valid_for_purpose(
        &self,
        payer: &Pubkey,
        purpose: &PaymentPurpose,
    ) -> Result<Vec<PaymentRecord>>;

    /// Valid settlements whose entitlement grant has not yet been
    /// delivered, for reconciliation
    async fn settled_ungranted(&self) -> Result<Vec<PaymentRecord>>;
}

/// In-memory [`LedgerStore`] for tests and development
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<Signature, PaymentRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_if_absent(&self, record: PaymentRecord) -> Result<InsertOutcome> {
        let mut records = self.records.write();
        match records.get(&record.signature) {
            Some(existing) => Ok(InsertOutcome::Existing(existing.clone())),
            None => {
                records.insert(record.signature, record.clone());
                Ok(InsertOutcome::Inserted(record))
            }
        }
    }

    async fn get(&self, signature: &Signature) -> Result<Option<PaymentRecord>> {
        Ok(self.records.read().get(signature).cloned())
    }

    async fn update(&self, record: PaymentRecord) -> Result<()> {
        let mut records = self.records.write();
        if !records.contains_key(&record.signature) {
            return Err(PaymentError::Storage(format!(
                "no ledger entry for {}",
                record.signature
            )));
        }
        records.insert(record.signature, record);
        Ok(())
    }

    async fn find_valid_for_purpose(
        &self,
        payer: &Pubkey,
        purpose: &PaymentPurpose,
    ) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| {
                r.status == PaymentStatus::ConfirmedValid
                    && r.payer == *payer
                    && r.purpose.kind() == purpose.kind()
                    && r.purpose.dedup_id() == purpose.dedup_id()
            })
            .cloned()
            .collect())
    }

    async fn settled_ungranted(&self) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.status == PaymentStatus::ConfirmedValid && !r.entitlement_granted)
            .cloned()
            .collect())
    }
}

/// Entitlement grant failure. Grants are retried by reconciliation, so
/// every failure is treated as retryable.
#[derive(Error, Debug, Clone)]
#[error("entitlement grant failed: {0}")]
pub struct GrantError(pub String);

/// Purpose-specific entitlement granter: subscription activation, post
/// unlock, message unlock, tip recording. Owned by the purpose
/// subsystem; the payment core only dispatches to it.
#[async_trait]
pub trait EntitlementSink: Send + Sync {
    async fn grant(
        &self,
        payer: &Pubkey,
        purpose: &PaymentPurpose,
        distribution: &Distribution,
    ) -> std::result::Result<(), GrantError>;
}

/// Records validated settlements and dispatches entitlement grants
pub struct SettlementRecorder {
    store: Arc<dyn LedgerStore>,
    sinks: HashMap<PurposeKind, Arc<dyn EntitlementSink>>,
    locks: Mutex<HashMap<Signature, Arc<tokio::sync::Mutex<()>>>>,
}

impl SettlementRecorder {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            sinks: HashMap::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register the entitlement granter for a purpose kind
    pub fn register_sink(&mut self, kind: PurposeKind, sink: Arc<dyn EntitlementSink>) {
        self.sinks.insert(kind, sink);
    }

    fn signature_lock(&self, signature: &Signature) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(*signature)
            .or_default()
            .clone()
    }

    /// Drop the lock entry once no settlement path holds it, keeping the
    /// table bounded by in-flight signatures rather than every signature
    /// ever settled.
    fn prune_lock(&self, signature: &Signature) {
        let mut locks = self.locks.lock();
        if locks
            .get(signature)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(signature);
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Create the ledger entry for a freshly reported signature, or
    /// return the existing one. Idempotent by signature.
    pub async fn register(
        &self,
        signature: Signature,
        payer: Pubkey,
        purpose: PaymentPurpose,
        distribution: Distribution,
    ) -> Result<PaymentRecord> {
        let record = PaymentRecord::pending(signature, payer, purpose, distribution);
        match self.store.insert_if_absent(record).await? {
            InsertOutcome::Inserted(record) => {
                info!("Ledger entry opened for {} ({})", signature, record.purpose);
                Ok(record)
            }
            InsertOutcome::Existing(record) => {
                debug!("Duplicate report for {}; returning existing entry", signature);
                Ok(record)
            }
        }
    }

    /// Finalize a settlement with its validation report.
    ///
    /// Serialized per signature. Terminal records are returned
    /// unchanged, so duplicate reports cannot double-credit.
    /// `revised_distribution` replaces the recorded expectation when the
    /// pipeline re-resolved the price (tier lenience).
    pub async fn finalize(
        &self,
        signature: &Signature,
        report: ValidationReport,
        revised_distribution: Option<Distribution>,
    ) -> Result<PaymentRecord> {
        let lock = self.signature_lock(signature);
        let result = {
            let _guard = lock.lock().await;
            self.finalize_locked(signature, report, revised_distribution)
                .await
        };
        drop(lock);
        self.prune_lock(signature);
        result
    }

    async fn finalize_locked(
        &self,
        signature: &Signature,
        report: ValidationReport,
        revised_distribution: Option<Distribution>,
    ) -> Result<PaymentRecord> {
        let mut record = self
            .store
            .get(signature)
            .await?
            .ok_or_else(|| PaymentError::Storage(format!("no ledger entry for {signature}")))?;

        if record.status.is_terminal() {
            debug!("Settlement for {} already finalized; no-op", signature);
            return Ok(record);
        }

        if let Some(distribution) = revised_distribution {
            record.distribution = distribution;
        }
        record.confirmed_at = Some(unix_now());

        match report.verdict {
            ValidationVerdict::Valid => {
                record.status = PaymentStatus::ConfirmedValid;
                record.validation = Some(report);
                self.store.update(record.clone()).await?;
                info!("Settlement confirmed valid: {} ({})", signature, record.purpose);
                self.dispatch_grant(&mut record).await?;
            }
            ValidationVerdict::Invalid(reason) => {
                record.status = PaymentStatus::ConfirmedInvalid;
                record.validation = Some(report);
                self.store.update(record.clone()).await?;
                error!(
                    "Settlement confirmed INVALID: {} ({}) reason={:?}",
                    signature, record.purpose, reason
                );
            }
        }

        Ok(record)
    }

    /// Mark a still-pending record expired (signature never appeared
    /// on-chain within the expiry horizon)
    pub async fn expire(&self, signature: &Signature) -> Result<PaymentRecord> {
        let lock = self.signature_lock(signature);
        let result = {
            let _guard = lock.lock().await;
            self.expire_locked(signature).await
        };
        drop(lock);
        self.prune_lock(signature);
        result
    }

    async fn expire_locked(&self, signature: &Signature) -> Result<PaymentRecord> {
        let mut record = self
            .store
            .get(signature)
            .await?
            .ok_or_else(|| PaymentError::Storage(format!("no ledger entry for {signature}")))?;

        if record.status.is_terminal() {
            return Ok(record);
        }
        record.status = PaymentStatus::Expired;
        self.store.update(record.clone()).await?;
        warn!("Payment {} expired without appearing on-chain", signature);
        Ok(record)
    }

    /// Re-drive grants for valid settlements that have not been
    /// delivered yet. Returns how many grants succeeded.
    pub async fn retry_pending_grants(&self) -> Result<usize> {
        let pending = self.store.settled_ungranted().await?;
        let mut granted = 0;

        for record in pending {
            let lock = self.signature_lock(&record.signature);
            {
                let _guard = lock.lock().await;
                // Re-read under the lock; another path may have delivered it
                if let Some(mut current) = self.store.get(&record.signature).await? {
                    if !current.entitlement_granted {
                        self.dispatch_grant(&mut current).await?;
                        if current.entitlement_granted {
                            granted += 1;
                        }
                    }
                }
            }
            drop(lock);
            self.prune_lock(&record.signature);
        }
        Ok(granted)
    }

    /// Attempt the entitlement grant for a `CONFIRMED_VALID` record and
    /// persist the outcome. Grant failures are logged and left for
    /// reconciliation; they never fail the settlement.
    async fn dispatch_grant(&self, record: &mut PaymentRecord) -> Result<()> {
        if !record.purpose.allows_repeat() {
            // Any other valid settlement whose grant already fired
            // satisfies this one. Checking only the first match is wrong:
            // it can be the record currently being granted.
            let prior = self
                .store
                .find_valid_for_purpose(&record.payer, &record.purpose)
                .await?;
            if let Some(satisfied) = prior
                .iter()
                .find(|p| p.signature != record.signature && p.entitlement_granted)
            {
                warn!(
                    "Duplicate valid settlement for {} by {}: {} supersedes {}; skipping repeat grant",
                    record.purpose, record.payer, satisfied.signature, record.signature
                );
                record.entitlement_granted = true;
                self.store.update(record.clone()).await?;
                return Ok(());
            }
        }

        let sink = match self.sinks.get(&record.purpose.kind()) {
            Some(sink) => sink,
            None => {
                warn!(
                    "No entitlement sink for {:?}; leaving {} for reconciliation",
                    record.purpose.kind(),
                    record.signature
                );
                return Ok(());
            }
        };

        match sink
            .grant(&record.payer, &record.purpose, &record.distribution)
            .await
        {
            Ok(()) => {
                record.entitlement_granted = true;
                self.store.update(record.clone()).await?;
                info!("Entitlement granted for {} ({})", record.signature, record.purpose);
            }
            Err(err) => {
                warn!(
                    "Entitlement grant for {} failed, will retry: {}",
                    record.signature, err
                );
            }
        }
        Ok(())
    }
}
