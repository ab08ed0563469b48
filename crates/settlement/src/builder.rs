//! Transfer transaction construction
//!
//! Builds the unsigned 2-or-3-transfer transaction for a distribution.
//! The recent blockhash is supplied by the caller — the submission
//! coordinator owns freshness — which keeps this module I/O-free.

use std::str::FromStr;

use solana_sdk::{
    hash::Hash, instruction::Instruction, message::Message, pubkey::Pubkey, system_instruction,
    transaction::Transaction,
};

use patronpay_distribution::Distribution;

use crate::{PaymentError, Result};

/// Parse a chain account identifier, failing with `InvalidAddress` on
/// anything that is not a well-formed base58 public key.
pub fn parse_address(address: &str) -> Result<Pubkey> {
    Pubkey::from_str(address).map_err(|_| PaymentError::InvalidAddress(address.to_string()))
}

/// Build the unsigned transfer transaction for a distribution.
///
/// One system transfer per non-zero share, fee payer = `payer`. Signing
/// is the wallet's responsibility.
pub fn build_transfer_transaction(
    payer: &Pubkey,
    distribution: &Distribution,
    recent_blockhash: Hash,
) -> Result<Transaction> {
    let transfers = distribution.transfers();
    if transfers.is_empty() {
        return Err(PaymentError::InvalidAmount(
            "distribution has no non-zero transfers".to_string(),
        ));
    }

    let instructions: Vec<Instruction> = transfers
        .iter()
        .map(|(to, lamports)| system_instruction::transfer(payer, to, *lamports))
        .collect();

    let message = Message::new_with_blockhash(&instructions, Some(payer), &recent_blockhash);
    Ok(Transaction::new_unsigned(message))
}
