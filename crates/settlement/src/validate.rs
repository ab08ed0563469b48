//! Settlement validation
//!
//! Re-derives what a confirmed transaction actually transferred and
//! compares it against the expected distribution. This is the server's
//! defense against a compromised or buggy client claiming a payment it
//! never sent: client-reported amounts are never trusted, only the
//! independently fetched on-chain facts.
//!
//! Validation fails closed. Any ambiguity — RPC error, partial data,
//! undecodable transaction — resolves to `Invalid`, never `Valid`.

use std::sync::Arc;

use tracing::{debug, error};

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use patronpay_distribution::Distribution;

use crate::rpc::{ChainRpc, ConfirmedTransfers};
use crate::types::{
    InvalidReason, RecipientRole, TransferCheck, ValidationReport, ValidationVerdict,
    DEFAULT_VALIDATION_TOLERANCE_LAMPORTS,
};

/// Validates confirmed transactions against expected distributions
pub struct SettlementValidator {
    rpc: Arc<dyn ChainRpc>,
    tolerance_lamports: u64,
}

impl SettlementValidator {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            tolerance_lamports: DEFAULT_VALIDATION_TOLERANCE_LAMPORTS,
        }
    }

    /// Override the overpayment tolerance (lamports)
    pub fn with_tolerance(mut self, tolerance_lamports: u64) -> Self {
        self.tolerance_lamports = tolerance_lamports;
        self
    }

    /// Validate the confirmed transaction behind `signature` against
    /// `expected`, requiring `payer` to be its fee payer.
    ///
    /// Returns a verdict rather than `Result`: an RPC failure here must
    /// not be mistaken for a retryable submission error, and can never
    /// resolve toward `Valid`.
    pub async fn validate(
        &self,
        signature: &Signature,
        payer: &Pubkey,
        expected: &Distribution,
    ) -> ValidationReport {
        let transfers = match self.rpc.transaction_transfers(signature).await {
            Ok(Some(transfers)) => transfers,
            Ok(None) => {
                error!(
                    "Validation failed for {}: transaction not found on-chain",
                    signature
                );
                return ValidationReport::invalid(InvalidReason::TransactionNotFound);
            }
            Err(err) => {
                // Fails closed: an unreadable transaction is an invalid one
                error!("Validation fetch failed for {}: {}", signature, err);
                return ValidationReport::invalid(InvalidReason::TransactionNotFound);
            }
        };

        if !transfers.succeeded {
            error!("Validation failed for {}: transaction reverted", signature);
            return ValidationReport::invalid(InvalidReason::TransactionFailed);
        }

        // The funds must come from the reported payer, not a third wallet
        if transfers.payer != *payer {
            error!(
                "Validation failed for {}: fee payer {} is not the reported payer {}",
                signature, transfers.payer, payer
            );
            return ValidationReport::invalid(InvalidReason::RecipientMismatch);
        }

        self.compare(signature, expected, &transfers)
    }

    fn compare(
        &self,
        signature: &Signature,
        expected: &Distribution,
        transfers: &ConfirmedTransfers,
    ) -> ValidationReport {
        let mut checks = Vec::new();
        let mut missing_recipient = false;
        let mut amount_off = false;

        for (role, recipient, expected_lamports) in expected_shares(expected) {
            let actual = transfers.credited(&recipient);
            // A shortfall of even one lamport is a mismatch; overpayment
            // is tolerated up to one network fee of accounting slack.
            let matched =
                actual >= expected_lamports && actual - expected_lamports <= self.tolerance_lamports;
            if !matched {
                if actual == 0 {
                    missing_recipient = true;
                } else {
                    amount_off = true;
                }
            }
            checks.push(TransferCheck {
                role,
                recipient,
                expected_lamports,
                actual_lamports: actual,
                matched,
            });
        }

        let verdict = if missing_recipient {
            ValidationVerdict::Invalid(InvalidReason::RecipientMismatch)
        } else if amount_off {
            ValidationVerdict::Invalid(InvalidReason::AmountMismatch)
        } else {
            ValidationVerdict::Valid
        };

        match verdict {
            ValidationVerdict::Valid => {
                debug!("Validation passed for {}", signature);
            }
            ValidationVerdict::Invalid(reason) => {
                error!(
                    "Validation failed for {}: {:?} (checks: {:?})",
                    signature, reason, checks
                );
            }
        }

        ValidationReport { verdict, checks }
    }
}

/// The non-zero expected legs of a distribution as (role, recipient,
/// lamports)
fn expected_shares(
    distribution: &Distribution,
) -> Vec<(RecipientRole, solana_sdk::pubkey::Pubkey, u64)> {
    let mut shares = Vec::with_capacity(3);
    if distribution.creator_lamports > 0 {
        shares.push((
            RecipientRole::Creator,
            distribution.creator,
            distribution.creator_lamports,
        ));
    }
    if distribution.platform_lamports > 0 {
        shares.push((
            RecipientRole::Platform,
            distribution.platform,
            distribution.platform_lamports,
        ));
    }
    if distribution.referrer_lamports > 0 {
        if let Some(referrer) = distribution.referrer {
            shares.push((
                RecipientRole::Referrer,
                referrer,
                distribution.referrer_lamports,
            ));
        }
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockChainRpc;
    use patronpay_distribution::{split_lamports, FeeSchedule};
    use solana_sdk::pubkey::Pubkey;

    fn expected() -> Distribution {
        split_lamports(
            150_000_000,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            None,
            &FeeSchedule::default(),
        )
        .unwrap()
    }

    fn exact_credits(dist: &Distribution) -> Vec<(Pubkey, u64)> {
        dist.transfers()
    }

    #[tokio::test]
    async fn test_exact_match_is_valid() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, true, exact_credits(&dist));

        let report = SettlementValidator::new(rpc).validate(&sig, &payer, &dist).await;
        assert!(report.is_valid());
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.iter().all(|c| c.matched));
    }

    #[tokio::test]
    async fn test_platform_short_by_one_lamport() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        let credits = vec![
            (dist.creator, dist.creator_lamports),
            (dist.platform, dist.platform_lamports - 1),
        ];
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, true, credits);

        let report = SettlementValidator::new(rpc).validate(&sig, &payer, &dist).await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::AmountMismatch)
        );
        let platform_check = report
            .checks
            .iter()
            .find(|c| c.role == RecipientRole::Platform)
            .unwrap();
        assert!(!platform_check.matched);
    }

    #[tokio::test]
    async fn test_overpayment_within_tolerance_is_valid() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        let credits = vec![
            (dist.creator, dist.creator_lamports + 4_999),
            (dist.platform, dist.platform_lamports),
        ];
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, true, credits);

        let report = SettlementValidator::new(rpc).validate(&sig, &payer, &dist).await;
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn test_overpayment_beyond_tolerance_is_invalid() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        let credits = vec![
            (dist.creator, dist.creator_lamports + 5_001),
            (dist.platform, dist.platform_lamports),
        ];
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, true, credits);

        let report = SettlementValidator::new(rpc).validate(&sig, &payer, &dist).await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::AmountMismatch)
        );
    }

    #[tokio::test]
    async fn test_missing_recipient() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = split_lamports(
            150_000_000,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Some(Pubkey::new_unique()),
            &FeeSchedule::default(),
        )
        .unwrap();
        let sig = Signature::new_unique();
        // Creator and platform paid, referrer leg omitted entirely
        let credits = vec![
            (dist.creator, dist.creator_lamports),
            (dist.platform, dist.platform_lamports),
        ];
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, true, credits);

        let report = SettlementValidator::new(rpc).validate(&sig, &payer, &dist).await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::RecipientMismatch)
        );
    }

    #[tokio::test]
    async fn test_reverted_transaction() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, false, exact_credits(&dist));

        let report = SettlementValidator::new(rpc).validate(&sig, &payer, &dist).await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::TransactionFailed)
        );
    }

    #[tokio::test]
    async fn test_unknown_transaction_fails_closed() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();

        let report = SettlementValidator::new(rpc)
            .validate(&Signature::new_unique(), &Pubkey::new_unique(), &dist)
            .await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::TransactionNotFound)
        );
    }

    #[tokio::test]
    async fn test_zero_tolerance_rejects_any_overpayment() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        let credits = vec![
            (dist.creator, dist.creator_lamports + 1),
            (dist.platform, dist.platform_lamports),
        ];
        let payer = Pubkey::new_unique();
        rpc.register_confirmed(sig, payer, true, credits);

        let report = SettlementValidator::new(rpc)
            .with_tolerance(0)
            .validate(&sig, &payer, &dist)
            .await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::AmountMismatch)
        );
    }

    #[tokio::test]
    async fn test_wrong_payer_is_invalid() {
        let rpc = Arc::new(MockChainRpc::new());
        let dist = expected();
        let sig = Signature::new_unique();
        // Correct transfers, but funded by a different wallet
        rpc.register_confirmed(sig, Pubkey::new_unique(), true, exact_credits(&dist));

        let report = SettlementValidator::new(rpc)
            .validate(&sig, &Pubkey::new_unique(), &dist)
            .await;
        assert_eq!(
            report.verdict,
            ValidationVerdict::Invalid(InvalidReason::RecipientMismatch)
        );
    }
}
