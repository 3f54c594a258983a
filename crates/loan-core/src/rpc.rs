//! The chain RPC seam.
//!
//! Hosts plug their RPC client in behind [`ChainRpc`]. Whatever error type
//! the client produces is mapped once, at that boundary, into the closed
//! [`RpcError`] classification; nothing above this module looks at error
//! strings.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chain_sol::Pubkey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

/// Account state as returned by `getAccountInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// The program or payer lacks lamports for the requested movement.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Refused by the wallet, the preflight simulation, or the program.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    /// Classify a raw SDK/node error message.
    ///
    /// This is the only place that matches on message text.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
            RpcError::InsufficientFunds(message)
        } else if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("block height exceeded")
        {
            RpcError::Timeout(message)
        } else if lower.contains("connection")
            || lower.contains("network")
            || lower.contains("fetch")
            || lower.contains("503")
            || lower.contains("429")
        {
            RpcError::Transport(message)
        } else {
            RpcError::Rejected(message)
        }
    }
}

/// The RPC calls the loan client needs.
pub trait ChainRpc {
    fn latest_blockhash(&self) -> impl Future<Output = Result<[u8; 32], RpcError>>;

    /// Broadcast a signed wire-format transaction; returns its signature.
    fn send_transaction(&self, wire: &[u8]) -> impl Future<Output = Result<String, RpcError>>;

    /// Resolve once `signature` reaches `commitment`, or fail with the
    /// transaction's error.
    fn confirm_transaction(
        &self,
        signature: &str,
        commitment: Commitment,
    ) -> impl Future<Output = Result<(), RpcError>>;

    fn get_account_info(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = Result<Option<AccountInfo>, RpcError>>;

    fn get_balance(&self, address: &Pubkey) -> impl Future<Output = Result<u64, RpcError>>;

    fn request_airdrop(
        &self,
        address: &Pubkey,
        lamports: u64,
    ) -> impl Future<Output = Result<String, RpcError>>;
}
