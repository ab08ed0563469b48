//! Submission coordination
//!
//! Drives one payment through build → simulate → sign → send with
//! bounded retries. Each attempt re-fetches a fresh blockhash and
//! rebuilds the transaction through the caller-supplied factory, so a
//! retried attempt never reuses a stale blockhash.
//!
//! Backoff is fixed or linear, never exponential: blockhash validity
//! windows are short, so long backoffs only waste them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use solana_sdk::{hash::Hash, signature::Signature, transaction::Transaction};

use crate::rpc::{ChainRpc, SimulationOutcome};
use crate::wallet::WalletSigner;
use crate::{PaymentError, Result};

/// Retry policy for transaction submission
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum submission attempts before giving up
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Scale the delay by the attempt number (linear) instead of fixed
    pub linear_backoff: bool,
    /// Preflight-simulate each attempt before signing
    pub simulate_first: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            linear_backoff: false,
            simulate_first: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (attempts count from 1; the first
    /// attempt has no delay)
    fn delay_before(&self, attempt: u32) -> Duration {
        if self.linear_backoff {
            self.retry_delay * (attempt - 1)
        } else {
            self.retry_delay
        }
    }
}

/// Phase of a submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    /// Fetching a blockhash and building the transaction
    Building,
    /// Awaiting the wallet signature
    Signing,
    /// Handed to the RPC node
    Sent,
    /// Backing off before the next attempt
    Retrying,
    /// Accepted by the network
    Submitted,
    /// All attempts exhausted
    Failed,
}

/// Record of one submission attempt
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Attempt number, counting from 1
    pub attempt: u32,
    /// Phases the attempt passed through, in order
    pub phases: Vec<SubmissionPhase>,
    /// Error that ended the attempt, if it failed
    pub error: Option<String>,
}

/// Successful submission plus its attempt history
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// Signature of the accepted transaction
    pub signature: Signature,
    /// Per-attempt phase log
    pub attempts: Vec<AttemptRecord>,
}

/// Signs and submits built transactions with retries
pub struct SubmissionCoordinator {
    rpc: Arc<dyn ChainRpc>,
    policy: RetryPolicy,
}

impl SubmissionCoordinator {
    pub fn new(rpc: Arc<dyn ChainRpc>, policy: RetryPolicy) -> Self {
        Self { rpc, policy }
    }

    /// Submit a payment transaction.
    ///
    /// `build` is invoked once per attempt with a fresh blockhash.
    /// Wallet rejection and caller-input errors abort immediately; RPC
    /// and simulation failures are retried up to the policy limit, then
    /// surface as `SubmissionFailed`.
    pub async fn submit<F>(
        &self,
        build: F,
        signer: &dyn WalletSigner,
    ) -> Result<SubmissionOutcome>
    where
        F: Fn(Hash) -> Result<Transaction> + Send + Sync,
    {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_before(attempt);
                debug!("Retrying submission (attempt {attempt}) after {delay:?}");
                if let Some(previous) = attempts.last_mut() {
                    previous.phases.push(SubmissionPhase::Retrying);
                }
                sleep(delay).await;
            }

            let mut record = AttemptRecord {
                attempt,
                phases: Vec::new(),
                error: None,
            };

            match self.attempt(&build, signer, &mut record).await {
                Ok(signature) => {
                    record.phases.push(SubmissionPhase::Submitted);
                    attempts.push(record);
                    info!(
                        "Payment transaction submitted on attempt {attempt}: {}",
                        signature
                    );
                    return Ok(SubmissionOutcome {
                        signature,
                        attempts,
                    });
                }
                // Not retryable: the user declined, or the inputs are bad
                Err(
                    err @ (PaymentError::UserRejected
                    | PaymentError::InvalidAmount(_)
                    | PaymentError::InvalidAddress(_)),
                ) => {
                    if matches!(err, PaymentError::UserRejected) {
                        info!("Payment cancelled: wallet declined the signing request");
                    }
                    record.error = Some(err.to_string());
                    attempts.push(record);
                    return Err(err);
                }
                Err(err) => {
                    warn!("Submission attempt {attempt} failed: {err}");
                    last_error = err.to_string();
                    record.error = Some(last_error.clone());
                    attempts.push(record);
                }
            }
        }

        if let Some(last) = attempts.last_mut() {
            last.phases.push(SubmissionPhase::Failed);
        }
        Err(PaymentError::SubmissionFailed {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    async fn attempt<F>(
        &self,
        build: &F,
        signer: &dyn WalletSigner,
        record: &mut AttemptRecord,
    ) -> Result<Signature>
    where
        F: Fn(Hash) -> Result<Transaction> + Send + Sync,
    {
        record.phases.push(SubmissionPhase::Building);
        let blockhash = self.rpc.latest_blockhash().await?;
        let tx = build(blockhash)?;

        if self.policy.simulate_first {
            match self.rpc.simulate(&tx).await? {
                SimulationOutcome::Ok => {}
                SimulationOutcome::MissingAccount => {
                    // Freshly funded accounts may lag the simulation node
                    debug!("Simulation reports a missing account; sending anyway");
                }
                SimulationOutcome::Failed(reason) => {
                    return Err(PaymentError::Rpc(format!("simulation failed: {reason}")));
                }
            }
        }

        record.phases.push(SubmissionPhase::Signing);
        let signed = signer.sign(tx).await?;

        record.phases.push(SubmissionPhase::Sent);
        self.rpc.send(&signed).await
    }
}
