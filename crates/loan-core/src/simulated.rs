//! Simulated submission: the same operations as the chain backend, recorded
//! in a [`SimulatedLedger`] with no network access.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use chain_sol::Pubkey;

use crate::addresses::ProgramAddresses;
use crate::backend::{LoanBackend, LoanReceipt, LoanRequest};
use crate::config::{LoanConfig, SubmissionMode};
use crate::error::LoanError;
use crate::instruction::LoanInstruction;
use crate::ledger::SimulatedLedger;
use crate::state::{repayment_amount, DEFAULT_INTEREST_RATE_BPS};
use crate::types::{now_millis, LoanApplication, LoanStatus, LoanTransaction, TransactionKind};
use crate::wallet::WalletAdapter;

pub const SIMULATED_SIGNATURE_PREFIX: &str = "sim_";

/// `sim_` followed by 32 random bytes in Base58.
pub fn simulated_signature() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{SIMULATED_SIGNATURE_PREFIX}{}", bs58::encode(bytes).into_string())
}

pub struct SimulatedBackend {
    ledger: Arc<SimulatedLedger>,
    addresses: ProgramAddresses,
    credit_score: u16,
}

impl SimulatedBackend {
    pub fn new(ledger: Arc<SimulatedLedger>, addresses: ProgramAddresses, config: &LoanConfig) -> Self {
        Self {
            ledger,
            addresses,
            credit_score: config.default_credit_score,
        }
    }

    pub fn ledger(&self) -> &Arc<SimulatedLedger> {
        &self.ledger
    }

    fn movement(
        loan_id: Option<String>,
        kind: TransactionKind,
        amount: u64,
        from: String,
        to: String,
    ) -> LoanTransaction {
        let signature = simulated_signature();
        LoanTransaction {
            id: signature.clone(),
            loan_id,
            kind,
            amount,
            from,
            to,
            timestamp: now_millis(),
            signature,
        }
    }
}

impl LoanBackend for SimulatedBackend {
    fn mode(&self) -> SubmissionMode {
        SubmissionMode::Simulated
    }

    async fn apply<W: WalletAdapter>(
        &self,
        wallet: &W,
        request: &LoanRequest,
    ) -> Result<LoanReceipt, LoanError> {
        let borrower = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let (amount, term_days) = request.validate()?;
        let (loan_account, _) = self.addresses.loan_account(&borrower)?;
        let (program_fund, _) = self.addresses.program_fund()?;
        let loan_id = loan_account.to_string();

        let application_signature = simulated_signature();
        self.ledger.add_loan(LoanApplication {
            id: loan_id.clone(),
            borrower: borrower.to_string(),
            amount,
            term_days,
            status: LoanStatus::Pending,
            purpose: request.purpose.clone(),
            created_at: now_millis(),
        });
        self.ledger.set_credit_score(&loan_id, self.credit_score)?;

        let disbursement = Self::movement(
            Some(loan_id.clone()),
            TransactionKind::Transfer,
            amount,
            program_fund.to_string(),
            borrower.to_string(),
        );
        let approval_signature = disbursement.signature.clone();
        self.ledger
            .transition(&loan_id, LoanStatus::Approved, disbursement)?;

        info!(loan_id = %loan_id, amount, mode = "simulated", "loan approved");
        Ok(LoanReceipt {
            loan_id,
            application_signature,
            funding_signature: None,
            approval_signature,
        })
    }

    async fn fund<W: WalletAdapter>(&self, wallet: &W, amount: u128) -> Result<String, LoanError> {
        let funder = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let LoanInstruction::FundProgram { amount } = LoanInstruction::fund_program(amount)? else {
            return Err(LoanError::Encoding("fund_program built the wrong instruction".into()));
        };
        let (program_fund, _) = self.addresses.program_fund()?;

        let funding = Self::movement(
            None,
            TransactionKind::Transfer,
            amount,
            funder.to_string(),
            program_fund.to_string(),
        );
        let signature = funding.signature.clone();
        self.ledger.add_transaction(funding);

        info!(amount, signature = %signature, mode = "simulated", "program funded");
        Ok(signature)
    }

    async fn repay<W: WalletAdapter>(&self, wallet: &W, loan_id: &str) -> Result<String, LoanError> {
        let borrower = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let loan = self
            .ledger
            .get_loan(loan_id)
            .ok_or_else(|| LoanError::LoanNotFound(loan_id.to_string()))?;
        if loan.borrower != borrower.to_string() {
            return Err(LoanError::InvalidLoanState(format!(
                "{loan_id} is not the connected wallet's loan"
            )));
        }

        let due = repayment_amount(loan.amount, DEFAULT_INTEREST_RATE_BPS)?;
        let (program_fund, _) = self.addresses.program_fund()?;
        let repayment = Self::movement(
            Some(loan_id.to_string()),
            TransactionKind::Repayment,
            due,
            borrower.to_string(),
            program_fund.to_string(),
        );
        let signature = repayment.signature.clone();
        self.ledger.transition(loan_id, LoanStatus::Repaid, repayment)?;

        info!(loan_id, amount = due, mode = "simulated", "loan repaid");
        Ok(signature)
    }

    async fn update_credit_score<W: WalletAdapter>(
        &self,
        wallet: &W,
        borrower: &Pubkey,
        new_score: u16,
    ) -> Result<String, LoanError> {
        wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let (loan_account, _) = self.addresses.loan_account(borrower)?;
        self.ledger
            .set_credit_score(&loan_account.to_string(), new_score)?;

        info!(borrower = %borrower, new_score, mode = "simulated", "credit score updated");
        Ok(simulated_signature())
    }

    async fn user_loans(&self, borrower: &Pubkey) -> Result<Vec<LoanApplication>, LoanError> {
        Ok(self.ledger.user_loans(&borrower.to_string()))
    }

    async fn loan_details(&self, loan_id: &str) -> Result<Option<LoanApplication>, LoanError> {
        Ok(self.ledger.get_loan(loan_id))
    }

    async fn user_transactions(&self, address: &Pubkey) -> Result<Vec<LoanTransaction>, LoanError> {
        Ok(self.ledger.user_transactions(&address.to_string()))
    }
}
