//! Chain RPC seam
//!
//! [`ChainRpc`] is the narrow capability the payment core needs from a
//! Solana node. Two implementations:
//! - [`SolanaRpc`]: live RPC calls via the nonblocking client.
//! - [`MockChainRpc`]: in-memory, with programmable failure and latency
//!   injection for tests and development.
//!
//! The RPC client is a shared, stateless collaborator: one instance is
//! safely used by any number of concurrent payment flows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{Transaction, TransactionError},
};
use solana_sdk_ids::system_program;
use solana_transaction_status::UiTransactionEncoding;

use crate::{PaymentError, Result};

/// Outcome of a preflight simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// Simulation succeeded
    Ok,
    /// A referenced account does not exist yet — tolerated, propagation
    /// delay is normal for freshly funded wallets
    MissingAccount,
    /// Simulation failed for any other reason
    Failed(String),
}

/// Observed status of a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The chain has not seen this signature (yet)
    NotFound,
    /// Seen but not at the requested commitment level
    Processing,
    /// Finalized at the requested commitment level
    Confirmed { slot: u64 },
    /// The transaction executed and failed
    Failed { error: String },
}

/// Per-recipient lamport movements of a confirmed transaction,
/// re-derived from chain data rather than taken from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransfers {
    /// Whether the transaction executed successfully
    pub succeeded: bool,
    /// Network fee paid
    pub fee: u64,
    /// Fee payer (first account key)
    pub payer: Pubkey,
    /// Lamports credited per account, (recipient, amount)
    pub credits: Vec<(Pubkey, u64)>,
}

impl ConfirmedTransfers {
    /// Total lamports credited to `recipient`
    pub fn credited(&self, recipient: &Pubkey) -> u64 {
        self.credits
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, lamports)| lamports)
            .sum()
    }
}

/// The chain capability consumed by the payment core
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Fetch a fresh recent blockhash
    async fn latest_blockhash(&self) -> Result<Hash>;

    /// Preflight-simulate a transaction
    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome>;

    /// Submit a signed transaction, returning its signature
    async fn send(&self, tx: &Transaction) -> Result<Signature>;

    /// Current status of a submitted signature
    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus>;

    /// Re-derive the per-recipient transfers of a confirmed transaction.
    /// `None` when the transaction is unknown or its data is incomplete.
    async fn transaction_transfers(
        &self,
        signature: &Signature,
    ) -> Result<Option<ConfirmedTransfers>>;
}

/// RPC endpoint configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Solana RPC endpoint
    pub rpc_url: String,
    /// Commitment level for submissions and status checks
    pub commitment: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: "confirmed".to_string(),
        }
    }
}

impl RpcConfig {
    /// Configuration for Solana devnet
    pub fn devnet() -> Self {
        Self::default()
    }

    /// Configuration for Solana mainnet
    pub fn mainnet() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "finalized".to_string(),
        }
    }

    fn commitment_config(&self) -> CommitmentConfig {
        match self.commitment.as_str() {
            "finalized" => CommitmentConfig::finalized(),
            "confirmed" => CommitmentConfig::confirmed(),
            "processed" => CommitmentConfig::processed(),
            _ => CommitmentConfig::confirmed(),
        }
    }
}

/// Live [`ChainRpc`] over the nonblocking Solana RPC client
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(config: RpcConfig) -> Self {
        let commitment = config.commitment_config();
        Self {
            client: Arc::new(RpcClient::new_with_commitment(
                config.rpc_url.clone(),
                commitment,
            )),
            commitment,
        }
    }

    /// SOL balance in lamports, for preflight affordability checks
    pub async fn balance(&self, account: &Pubkey) -> Result<u64> {
        self.client
            .get_balance(account)
            .await
            .map_err(|e| PaymentError::Rpc(format!("get_balance: {e}")))
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| PaymentError::Rpc(format!("get_latest_blockhash: {e}")))
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome> {
        let response = self
            .client
            .simulate_transaction(tx)
            .await
            .map_err(|e| PaymentError::Rpc(format!("simulate_transaction: {e}")))?;

        Ok(match response.value.err {
            None => SimulationOutcome::Ok,
            Some(TransactionError::AccountNotFound) => SimulationOutcome::MissingAccount,
            Some(err) => SimulationOutcome::Failed(err.to_string()),
        })
    }

    async fn send(&self, tx: &Transaction) -> Result<Signature> {
        let signature = self
            .client
            .send_transaction(tx)
            .await
            .map_err(|e| PaymentError::Rpc(format!("send_transaction: {e}")))?;
        info!("Transaction submitted: {}", signature);
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| PaymentError::Rpc(format!("get_signature_statuses: {e}")))?;

        let status = match response.value.into_iter().next().flatten() {
            None => return Ok(SignatureStatus::NotFound),
            Some(status) => status,
        };

        if let Some(err) = status.err {
            return Ok(SignatureStatus::Failed {
                error: err.to_string(),
            });
        }
        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureStatus::Confirmed { slot: status.slot })
        } else {
            Ok(SignatureStatus::Processing)
        }
    }

    async fn transaction_transfers(
        &self,
        signature: &Signature,
    ) -> Result<Option<ConfirmedTransfers>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        let fetched = match self
            .client
            .get_transaction_with_config(signature, config)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                debug!("Transaction {} not available: {}", signature, e);
                return Ok(None);
            }
        };

        let meta = match fetched.transaction.meta {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let decoded = match fetched.transaction.transaction.decode() {
            Some(tx) => tx,
            None => return Ok(None),
        };
        let keys = decoded.message.static_account_keys();
        if meta.pre_balances.len() != keys.len() || meta.post_balances.len() != keys.len() {
            return Ok(None);
        }

        // Credits are the positive per-account balance deltas; the payer's
        // debit carries the fee, which is why validation tolerates
        // overpayment up to one fee but never a shortfall.
        let mut credits = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let post = meta.post_balances[i];
            let pre = meta.pre_balances[i];
            if post > pre {
                credits.push((*key, post - pre));
            }
        }

        let payer = match keys.first() {
            Some(key) => *key,
            None => return Ok(None),
        };

        Ok(Some(ConfirmedTransfers {
            succeeded: meta.err.is_none(),
            fee: meta.fee,
            payer,
            credits,
        }))
    }
}

/// One transaction known to the mock chain
#[derive(Debug, Clone)]
struct MockTransaction {
    transfers: ConfirmedTransfers,
    polls_seen: u32,
}

/// In-memory mock state
#[derive(Debug, Default)]
struct MockRpcState {
    transactions: HashMap<Signature, MockTransaction>,
    send_failures_remaining: u32,
    simulation: Option<SimulationOutcome>,
    confirm_after_polls: u32,
    sent_count: u32,
}

/// Mock [`ChainRpc`] for development and testing.
///
/// Submitted transactions have their system transfers parsed and become
/// queryable exactly as a live chain would report them. Failure modes
/// are programmable: failed sends, simulation outcomes, confirmation
/// delay, and hand-registered (forged/short-paid/reverted) transactions.
#[derive(Default)]
pub struct MockChainRpc {
    state: Mutex<MockRpcState>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` send attempts with an RPC error
    pub fn fail_next_sends(&self, n: u32) {
        self.state.lock().send_failures_remaining = n;
    }

    /// Force a simulation outcome for all subsequent simulations
    pub fn set_simulation_outcome(&self, outcome: SimulationOutcome) {
        self.state.lock().simulation = Some(outcome);
    }

    /// Report `Processing` for the first `n` status polls of every
    /// transaction before confirming
    pub fn confirm_after_polls(&self, n: u32) {
        self.state.lock().confirm_after_polls = n;
    }

    /// Number of successful sends so far
    pub fn sent_count(&self) -> u32 {
        self.state.lock().sent_count
    }

    /// Register a confirmed transaction directly, bypassing `send`.
    /// Used to stage short-paid, reverted, or otherwise forged
    /// transactions a malicious client might report.
    pub fn register_confirmed(
        &self,
        signature: Signature,
        payer: Pubkey,
        succeeded: bool,
        credits: Vec<(Pubkey, u64)>,
    ) {
        let mut state = self.state.lock();
        state.transactions.insert(
            signature,
            MockTransaction {
                transfers: ConfirmedTransfers {
                    succeeded,
                    fee: 5_000,
                    payer,
                    credits,
                },
                polls_seen: u32::MAX, // already past any confirmation delay
            },
        );
    }

    /// Parse the system transfers out of a legacy transaction
    fn parse_transfers(tx: &Transaction) -> ConfirmedTransfers {
        let message = &tx.message;
        let keys = &message.account_keys;
        let payer = keys.first().copied().unwrap_or_default();

        let mut credits: Vec<(Pubkey, u64)> = Vec::new();
        for ix in &message.instructions {
            let program = match keys.get(ix.program_id_index as usize) {
                Some(program) => *program,
                None => continue,
            };
            if program != system_program::id() {
                continue;
            }
            // SystemInstruction::Transfer: 4-byte LE discriminant (2)
            // followed by 8-byte LE lamports
            if ix.data.len() != 12 {
                continue;
            }
            let tag = u32::from_le_bytes([ix.data[0], ix.data[1], ix.data[2], ix.data[3]]);
            if tag != 2 {
                continue;
            }
            let mut lamport_bytes = [0u8; 8];
            lamport_bytes.copy_from_slice(&ix.data[4..12]);
            let lamports = u64::from_le_bytes(lamport_bytes);

            let to = match ix.accounts.get(1).and_then(|i| keys.get(*i as usize)) {
                Some(to) => *to,
                None => continue,
            };
            match credits.iter_mut().find(|(key, _)| *key == to) {
                Some((_, total)) => *total += lamports,
                None => credits.push((to, lamports)),
            }
        }

        ConfirmedTransfers {
            succeeded: true,
            fee: 5_000,
            payer,
            credits,
        }
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn simulate(&self, _tx: &Transaction) -> Result<SimulationOutcome> {
        Ok(self
            .state
            .lock()
            .simulation
            .clone()
            .unwrap_or(SimulationOutcome::Ok))
    }

    async fn send(&self, tx: &Transaction) -> Result<Signature> {
        let mut state = self.state.lock();
        if state.send_failures_remaining > 0 {
            state.send_failures_remaining -= 1;
            return Err(PaymentError::Rpc("mock send failure".to_string()));
        }

        let signature = tx
            .signatures
            .first()
            .copied()
            .filter(|sig| *sig != Signature::default())
            .unwrap_or_else(Signature::new_unique);

        let transfers = Self::parse_transfers(tx);
        state.transactions.insert(
            signature,
            MockTransaction {
                transfers,
                polls_seen: 0,
            },
        );
        state.sent_count += 1;
        debug!("[MOCK] Accepted transaction {}", signature);
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        let mut state = self.state.lock();
        let confirm_after = state.confirm_after_polls;
        let tx = match state.transactions.get_mut(signature) {
            None => return Ok(SignatureStatus::NotFound),
            Some(tx) => tx,
        };

        if tx.polls_seen < confirm_after {
            tx.polls_seen += 1;
            return Ok(SignatureStatus::Processing);
        }
        if !tx.transfers.succeeded {
            return Ok(SignatureStatus::Failed {
                error: "mock transaction reverted".to_string(),
            });
        }
        Ok(SignatureStatus::Confirmed { slot: 1 })
    }

    async fn transaction_transfers(
        &self,
        signature: &Signature,
    ) -> Result<Option<ConfirmedTransfers>> {
        let state = self.state.lock();
        Ok(state
            .transactions
            .get(signature)
            .map(|tx| tx.transfers.clone()))
    }
}
