pub mod addresses;
pub mod backend;
pub mod chain;
pub mod config;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod notify;
pub mod rpc;
pub mod service;
pub mod simulated;
pub mod state;
pub mod types;
pub mod wallet;

pub use addresses::ProgramAddresses;
pub use backend::{Backend, LoanBackend, LoanReceipt, LoanRequest};
pub use chain::{ChainBackend, SubmissionState};
pub use config::{Cluster, LoanConfig, SubmissionMode};
pub use error::LoanError;
pub use instruction::{LoanInstruction, LoanInstructionKind};
pub use ledger::SimulatedLedger;
pub use notify::{Notification, Notifier, Severity, TracingNotifier};
pub use rpc::{AccountInfo, ChainRpc, Commitment, RpcError};
pub use service::LoanService;
pub use simulated::SimulatedBackend;
pub use state::LoanAccount;
pub use types::{LoanApplication, LoanStatus, LoanTransaction, TransactionKind};
pub use wallet::{KeypairWallet, WalletAdapter};

use chain_sol::Pubkey;

uniffi::setup_scaffolding!();

// ─── UniFFI-exported functions ───────────────────────────────────────
// Hosts that build and send transactions themselves only need the
// addresses and the instruction bytes.

fn program_addresses(program_id: &str) -> Result<ProgramAddresses, LoanError> {
    let program_id: Pubkey = program_id
        .parse()
        .map_err(|e| LoanError::InvalidAddress(format!("program id: {e}")))?;
    Ok(ProgramAddresses::new(program_id))
}

/// Loan account PDA for `borrower`, Base58.
#[uniffi::export]
pub fn derive_loan_address(program_id: String, borrower: String) -> Result<String, LoanError> {
    let borrower: Pubkey = borrower.parse()?;
    let (address, _) = program_addresses(&program_id)?.loan_account(&borrower)?;
    Ok(address.to_string())
}

/// Program fund PDA, Base58.
#[uniffi::export]
pub fn derive_program_fund_address(program_id: String) -> Result<String, LoanError> {
    let (address, _) = program_addresses(&program_id)?.program_fund()?;
    Ok(address.to_string())
}

#[uniffi::export]
pub fn encode_initialize_instruction(amount: u64, term_days: u16, credit_score: u16) -> Vec<u8> {
    LoanInstruction::Initialize {
        amount,
        term_days,
        credit_score,
    }
    .pack()
}

#[uniffi::export]
pub fn encode_approve_instruction() -> Vec<u8> {
    LoanInstruction::ApproveLoan.pack()
}

#[uniffi::export]
pub fn encode_repay_instruction() -> Vec<u8> {
    LoanInstruction::RepayLoan.pack()
}

#[uniffi::export]
pub fn encode_update_credit_score_instruction(new_score: u16) -> Vec<u8> {
    LoanInstruction::UpdateCreditScore { new_score }.pack()
}

/// Rejects a zero amount.
#[uniffi::export]
pub fn encode_fund_program_instruction(amount: u64) -> Result<Vec<u8>, LoanError> {
    Ok(LoanInstruction::fund_program(amount.into())?.pack())
}

/// Parse and validate a JSON client configuration, returning it normalized
/// with every default filled in.
#[uniffi::export]
pub fn normalize_config(json: String) -> Result<String, LoanError> {
    let config = LoanConfig::from_json(&json)?;
    serde_json::to_string(&config).map_err(|e| LoanError::Config(e.to_string()))
}
