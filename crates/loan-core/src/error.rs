use thiserror::Error;

use crate::rpc::RpcError;

#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum LoanError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Network submission failed: {0}")]
    NetworkSubmission(String),

    #[error("Insufficient program funds: {0}")]
    InsufficientProgramFunds(String),

    #[error("Confirmation timed out: {0}")]
    ConfirmationTimeout(String),

    #[error("Loan not found: {0}")]
    LoanNotFound(String),

    #[error("Invalid loan state: {0}")]
    InvalidLoanState(String),

    #[error("Unsupported in {0} mode")]
    Unsupported(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LoanError {
    /// Only underfunded approvals have an automatic recovery path.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LoanError::InsufficientProgramFunds(_))
    }
}

impl From<chain_sol::SolError> for LoanError {
    fn from(e: chain_sol::SolError) -> Self {
        match e {
            chain_sol::SolError::InvalidAddress(msg) => LoanError::InvalidAddress(msg),
            other => LoanError::Encoding(format!("SOL: {other}")),
        }
    }
}

impl From<RpcError> for LoanError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::InsufficientFunds(msg) => LoanError::InsufficientProgramFunds(msg),
            RpcError::Timeout(msg) => LoanError::ConfirmationTimeout(msg),
            RpcError::Rejected(msg) | RpcError::Transport(msg) => LoanError::NetworkSubmission(msg),
        }
    }
}
