//! Wallet signing seam
//!
//! Signing is the wallet's responsibility, not the payment core's. The
//! [`WalletSigner`] call is the one suspension point that may block on
//! user interaction indefinitely; a declined request surfaces as
//! [`PaymentError::UserRejected`] and aborts the payment with no retry.

use async_trait::async_trait;

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};

use crate::{PaymentError, Result};

/// Capability to sign an unsigned transaction.
///
/// Implementations: browser/mobile wallets in the application layer,
/// [`KeypairSigner`] for server-side flows and tests.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Sign the transaction, or fail with `UserRejected` if the user
    /// declines the request.
    async fn sign(&self, tx: Transaction) -> Result<Transaction>;
}

/// Local keypair signer (no user interaction)
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Build a signer from a 32-byte ed25519 secret key.
    pub fn from_secret_key(secret: &[u8; 32]) -> Result<Self> {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(secret);
        let public_bytes = signing_key.verifying_key().to_bytes();

        let mut full_key = [0u8; 64];
        full_key[..32].copy_from_slice(secret);
        full_key[32..].copy_from_slice(&public_bytes);
        let keypair = Keypair::try_from(full_key.as_ref())
            .map_err(|e| PaymentError::SigningFailed(format!("invalid secret key: {e}")))?;

        Ok(Self::new(keypair))
    }

    /// The signer's public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    async fn sign(&self, mut tx: Transaction) -> Result<Transaction> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[&self.keypair], blockhash)
            .map_err(|e| PaymentError::SigningFailed(e.to_string()))?;
        Ok(tx)
    }
}

/// A wallet that always declines, for exercising cancellation paths
#[derive(Default)]
pub struct RejectingSigner;

#[async_trait]
impl WalletSigner for RejectingSigner {
    async fn sign(&self, _tx: Transaction) -> Result<Transaction> {
        Err(PaymentError::UserRejected)
    }
}
