//! Submission strategies.
//!
//! [`LoanBackend`] is implemented twice: [`ChainBackend`] talks to the loan
//! program through a wallet and an RPC client, [`SimulatedBackend`] records
//! the same effects in a [`SimulatedLedger`]. Which one runs is decided by
//! [`LoanConfig::mode`] when the service is composed, never by catching a
//! failure at runtime.

use std::future::Future;
use std::sync::Arc;

use chain_sol::Pubkey;

use crate::addresses::ProgramAddresses;
use crate::chain::ChainBackend;
use crate::config::{LoanConfig, SubmissionMode};
use crate::error::LoanError;
use crate::instruction::LoanInstruction;
use crate::ledger::SimulatedLedger;
use crate::rpc::ChainRpc;
use crate::simulated::SimulatedBackend;
use crate::types::{LoanApplication, LoanTransaction};
use crate::wallet::WalletAdapter;

/// A loan application as entered by the user, not yet range-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRequest {
    pub amount: u128,
    pub term_days: u32,
    pub purpose: String,
}

impl LoanRequest {
    pub fn new(amount: u128, term_days: u32, purpose: impl Into<String>) -> Self {
        Self {
            amount,
            term_days,
            purpose: purpose.into(),
        }
    }

    /// Narrow to the on-chain field widths: `(amount, term_days)`.
    pub fn validate(&self) -> Result<(u64, u16), LoanError> {
        if self.amount == 0 {
            return Err(LoanError::InvalidAmount("loan amount must be > 0".into()));
        }
        match LoanInstruction::initialize(self.amount, self.term_days, 0)? {
            LoanInstruction::Initialize {
                amount, term_days, ..
            } => Ok((amount, term_days)),
            other => Err(LoanError::Encoding(format!("unexpected {:?}", other.kind()))),
        }
    }
}

/// What an application produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanReceipt {
    pub loan_id: String,
    pub application_signature: String,
    /// Set when the program fund had to be topped up before approval.
    pub funding_signature: Option<String>,
    pub approval_signature: String,
}

pub trait LoanBackend {
    fn mode(&self) -> SubmissionMode;

    /// Create the loan and have it approved (demo auto-approval: the
    /// connected wallet acts as lender).
    fn apply<W: WalletAdapter>(
        &self,
        wallet: &W,
        request: &LoanRequest,
    ) -> impl Future<Output = Result<LoanReceipt, LoanError>>;

    fn fund<W: WalletAdapter>(
        &self,
        wallet: &W,
        amount: u128,
    ) -> impl Future<Output = Result<String, LoanError>>;

    fn repay<W: WalletAdapter>(
        &self,
        wallet: &W,
        loan_id: &str,
    ) -> impl Future<Output = Result<String, LoanError>>;

    fn update_credit_score<W: WalletAdapter>(
        &self,
        wallet: &W,
        borrower: &Pubkey,
        new_score: u16,
    ) -> impl Future<Output = Result<String, LoanError>>;

    fn user_loans(
        &self,
        borrower: &Pubkey,
    ) -> impl Future<Output = Result<Vec<LoanApplication>, LoanError>>;

    fn loan_details(
        &self,
        loan_id: &str,
    ) -> impl Future<Output = Result<Option<LoanApplication>, LoanError>>;

    fn user_transactions(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = Result<Vec<LoanTransaction>, LoanError>>;
}

/// The configured strategy.
pub enum Backend<R> {
    Chain(ChainBackend<R>),
    Simulated(SimulatedBackend),
}

impl<R: ChainRpc> Backend<R> {
    /// Pick the strategy named by `config.mode`. In simulated mode `rpc` is
    /// dropped unused.
    pub fn from_config(
        config: &LoanConfig,
        rpc: R,
        ledger: Arc<SimulatedLedger>,
    ) -> Result<Self, LoanError> {
        let addresses = ProgramAddresses::new(config.program_id()?);
        Ok(match config.mode {
            SubmissionMode::Chain => Backend::Chain(ChainBackend::new(rpc, addresses, config, ledger)),
            SubmissionMode::Simulated => {
                Backend::Simulated(SimulatedBackend::new(ledger, addresses, config))
            }
        })
    }

    pub fn as_chain(&self) -> Option<&ChainBackend<R>> {
        match self {
            Backend::Chain(chain) => Some(chain),
            Backend::Simulated(_) => None,
        }
    }
}

impl<R: ChainRpc> LoanBackend for Backend<R> {
    fn mode(&self) -> SubmissionMode {
        match self {
            Backend::Chain(b) => b.mode(),
            Backend::Simulated(b) => b.mode(),
        }
    }

    async fn apply<W: WalletAdapter>(
        &self,
        wallet: &W,
        request: &LoanRequest,
    ) -> Result<LoanReceipt, LoanError> {
        match self {
            Backend::Chain(b) => b.apply(wallet, request).await,
            Backend::Simulated(b) => b.apply(wallet, request).await,
        }
    }

    async fn fund<W: WalletAdapter>(&self, wallet: &W, amount: u128) -> Result<String, LoanError> {
        match self {
            Backend::Chain(b) => b.fund(wallet, amount).await,
            Backend::Simulated(b) => b.fund(wallet, amount).await,
        }
    }

    async fn repay<W: WalletAdapter>(&self, wallet: &W, loan_id: &str) -> Result<String, LoanError> {
        match self {
            Backend::Chain(b) => b.repay(wallet, loan_id).await,
            Backend::Simulated(b) => b.repay(wallet, loan_id).await,
        }
    }

    async fn update_credit_score<W: WalletAdapter>(
        &self,
        wallet: &W,
        borrower: &Pubkey,
        new_score: u16,
    ) -> Result<String, LoanError> {
        match self {
            Backend::Chain(b) => b.update_credit_score(wallet, borrower, new_score).await,
            Backend::Simulated(b) => b.update_credit_score(wallet, borrower, new_score).await,
        }
    }

    async fn user_loans(&self, borrower: &Pubkey) -> Result<Vec<LoanApplication>, LoanError> {
        match self {
            Backend::Chain(b) => b.user_loans(borrower).await,
            Backend::Simulated(b) => b.user_loans(borrower).await,
        }
    }

    async fn loan_details(&self, loan_id: &str) -> Result<Option<LoanApplication>, LoanError> {
        match self {
            Backend::Chain(b) => b.loan_details(loan_id).await,
            Backend::Simulated(b) => b.loan_details(loan_id).await,
        }
    }

    async fn user_transactions(&self, address: &Pubkey) -> Result<Vec<LoanTransaction>, LoanError> {
        match self {
            Backend::Chain(b) => b.user_transactions(address).await,
            Backend::Simulated(b) => b.user_transactions(address).await,
        }
    }
}
