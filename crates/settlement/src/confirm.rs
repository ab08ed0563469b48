//! Confirmation polling
//!
//! Waits for a submitted signature to reach finality, polling at a
//! fixed interval with a hard deadline. A timeout is an expected,
//! recoverable outcome — the transaction may still land afterwards and
//! the caller can re-check later — so it is returned as a value, never
//! an error, and the underlying transaction is never cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use solana_sdk::signature::Signature;

use crate::rpc::{ChainRpc, SignatureStatus};
use crate::types::DEFAULT_POLL_INTERVAL_MS;

/// Result of waiting for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Finality observed
    Confirmed { slot: u64 },
    /// The transaction executed and failed on-chain
    Failed { error: String },
    /// Finality not observed within the deadline
    TimedOut,
}

/// Polls a signature until finality or deadline
pub struct ConfirmationWaiter {
    rpc: Arc<dyn ChainRpc>,
    poll_interval: Duration,
}

impl ConfirmationWaiter {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for the signature to confirm, up to `timeout`.
    ///
    /// "Not found yet" is a transient state — propagation delay is
    /// normal. Transient RPC errors are logged and polling continues.
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        timeout: Duration,
    ) -> ConfirmationOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            match self.rpc.signature_status(signature).await {
                Ok(SignatureStatus::Confirmed { slot }) => {
                    debug!("Signature {} confirmed at slot {}", signature, slot);
                    return ConfirmationOutcome::Confirmed { slot };
                }
                Ok(SignatureStatus::Failed { error }) => {
                    warn!("Signature {} failed on-chain: {}", signature, error);
                    return ConfirmationOutcome::Failed { error };
                }
                Ok(SignatureStatus::NotFound) => {
                    debug!("Signature {} not yet visible", signature);
                }
                Ok(SignatureStatus::Processing) => {
                    debug!("Signature {} processing", signature);
                }
                Err(err) => {
                    warn!("Status poll for {} failed: {}", signature, err);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Confirmation wait for {} timed out", signature);
                return ConfirmationOutcome::TimedOut;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
