//! Chain-backed submission.
//!
//! Every instruction goes through the same path: fetch a blockhash, compile
//! a single-instruction transaction with the wallet as fee payer, let the
//! wallet sign and broadcast it, then wait for confirmation at the configured
//! commitment.

use std::sync::Arc;

use tracing::{debug, info, warn};

use chain_sol::{Instruction, Pubkey, Transaction};

use crate::addresses::ProgramAddresses;
use crate::backend::{LoanBackend, LoanReceipt, LoanRequest};
use crate::config::{Cluster, LoanConfig, SubmissionMode};
use crate::error::LoanError;
use crate::instruction;
use crate::ledger::SimulatedLedger;
use crate::rpc::{ChainRpc, Commitment};
use crate::state::LoanAccount;
use crate::types::{now_millis, LoanApplication, LoanStatus, LoanTransaction, TransactionKind};
use crate::wallet::WalletAdapter;

/// Lifecycle of one submitted transaction.
///
/// `Unsigned -> Submitted -> Confirmed`, or `Failed` from either of the
/// first two.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubmissionState {
    #[default]
    Unsigned,
    Submitted { signature: String },
    Confirmed { signature: String },
    Failed { signature: Option<String>, reason: String },
}

impl SubmissionState {
    pub fn submitted(self, signature: String) -> Self {
        match self {
            SubmissionState::Unsigned => SubmissionState::Submitted { signature },
            other => other,
        }
    }

    pub fn confirmed(self) -> Self {
        match self {
            SubmissionState::Submitted { signature } => SubmissionState::Confirmed { signature },
            other => other,
        }
    }

    pub fn failed(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match self {
            SubmissionState::Unsigned => SubmissionState::Failed { signature: None, reason },
            SubmissionState::Submitted { signature } => SubmissionState::Failed {
                signature: Some(signature),
                reason,
            },
            terminal => terminal,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            SubmissionState::Unsigned => None,
            SubmissionState::Submitted { signature } | SubmissionState::Confirmed { signature } => {
                Some(signature)
            }
            SubmissionState::Failed { signature, .. } => signature.as_deref(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Confirmed { .. } | SubmissionState::Failed { .. })
    }
}

pub struct ChainBackend<R> {
    rpc: R,
    addresses: ProgramAddresses,
    cluster: Cluster,
    commitment: Commitment,
    credit_score: u16,
    funding_fee_buffer: u64,
    /// Fund movements confirmed during this session. The chain has no
    /// per-user transaction index the client can query cheaply.
    journal: Arc<SimulatedLedger>,
}

impl<R: ChainRpc> ChainBackend<R> {
    pub fn new(
        rpc: R,
        addresses: ProgramAddresses,
        config: &LoanConfig,
        journal: Arc<SimulatedLedger>,
    ) -> Self {
        Self {
            rpc,
            addresses,
            cluster: config.cluster,
            commitment: config.commitment,
            credit_score: config.default_credit_score,
            funding_fee_buffer: config.funding_fee_buffer,
            journal,
        }
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn addresses(&self) -> &ProgramAddresses {
        &self.addresses
    }

    /// Sign, broadcast and confirm a single instruction paid for by the
    /// wallet. Returns the confirmed signature.
    pub async fn submit<W: WalletAdapter>(
        &self,
        wallet: &W,
        instruction: Instruction,
        label: &'static str,
    ) -> Result<String, LoanError> {
        self.submit_tracked(wallet, instruction, label).await.1
    }

    /// Like [`submit`](Self::submit), also returning the terminal
    /// [`SubmissionState`]. A failure after broadcast keeps its signature.
    pub async fn submit_tracked<W: WalletAdapter>(
        &self,
        wallet: &W,
        instruction: Instruction,
        label: &'static str,
    ) -> (SubmissionState, Result<String, LoanError>) {
        let mut state = SubmissionState::Unsigned;
        let result = self.drive(wallet, instruction, &mut state).await;

        match &result {
            Ok(signature) => {
                info!(label, signature = %signature, state = ?state, "transaction confirmed")
            }
            Err(e) => {
                state = state.failed(e.to_string());
                warn!(label, signature = ?state.signature(), state = ?state, error = %e, "transaction failed");
            }
        }
        (state, result)
    }

    async fn drive<W: WalletAdapter>(
        &self,
        wallet: &W,
        instruction: Instruction,
        state: &mut SubmissionState,
    ) -> Result<String, LoanError> {
        let payer = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let blockhash = self.rpc.latest_blockhash().await?;
        let tx = Transaction::build(&[instruction], &payer, &blockhash)?;

        let signature = wallet.send_transaction(tx, &self.rpc).await?;
        *state = std::mem::take(state).submitted(signature.clone());
        debug!(signature = %signature, commitment = ?self.commitment, "awaiting confirmation");

        self.rpc.confirm_transaction(&signature, self.commitment).await?;
        *state = std::mem::take(state).confirmed();
        Ok(signature)
    }

    async fn approve<W: WalletAdapter>(
        &self,
        wallet: &W,
        lender: &Pubkey,
        borrower: &Pubkey,
    ) -> Result<String, LoanError> {
        let ix = instruction::approve_loan(&self.addresses, lender, borrower)?;
        self.submit(wallet, ix, "approve_loan").await
    }

    /// Top the program fund up by `amount` plus the fee buffer, then retry
    /// the approval once. The funding is journaled as soon as it confirms,
    /// whatever the retry does. Returns `(funding, approval)` signatures.
    async fn remediate<W: WalletAdapter>(
        &self,
        wallet: &W,
        payer: &Pubkey,
        program_fund: &Pubkey,
        amount: u64,
    ) -> Result<(String, String), LoanError> {
        let top_up = amount.checked_add(self.funding_fee_buffer).ok_or_else(|| {
            LoanError::InvalidAmount(format!("funding {amount} + buffer overflows u64"))
        })?;
        info!(amount = top_up, "program fund is short, funding before retrying approval");

        let ix = instruction::fund_program(&self.addresses, payer, top_up.into())?;
        let funding = self.submit(wallet, ix, "fund_program").await.map_err(|e| {
            LoanError::NetworkSubmission(format!(
                "approval needed {top_up} lamports of program funding, but funding failed: {e}"
            ))
        })?;
        self.journal_transfer(
            None,
            TransactionKind::Transfer,
            top_up,
            payer,
            program_fund,
            &funding,
        );

        let approval = self.approve(wallet, payer, payer).await.map_err(|e| match e {
            LoanError::InsufficientProgramFunds(msg) => LoanError::InsufficientProgramFunds(
                format!("still underfunded after adding {top_up} lamports: {msg}"),
            ),
            other => other,
        })?;
        Ok((funding, approval))
    }

    async fn fetch_loan(&self, loan_account: &Pubkey) -> Result<Option<LoanAccount>, LoanError> {
        let Some(info) = self.rpc.get_account_info(loan_account).await? else {
            return Ok(None);
        };
        if info.owner != *self.addresses.program_id() {
            debug!(account = %loan_account, owner = %info.owner, "account not owned by loan program");
            return Ok(None);
        }
        let loan = LoanAccount::unpack(&info.data)?;
        Ok(loan.is_initialized.then_some(loan))
    }

    fn journal_transfer(
        &self,
        loan_id: Option<String>,
        kind: TransactionKind,
        amount: u64,
        from: &Pubkey,
        to: &Pubkey,
        signature: &str,
    ) {
        self.journal.add_transaction(LoanTransaction {
            id: signature.to_string(),
            loan_id,
            kind,
            amount,
            from: from.to_string(),
            to: to.to_string(),
            timestamp: now_millis(),
            signature: signature.to_string(),
        });
    }

    pub async fn balance(&self, address: &Pubkey) -> Result<u64, LoanError> {
        Ok(self.rpc.get_balance(address).await?)
    }

    pub async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<String, LoanError> {
        if !self.cluster.supports_airdrop() {
            return Err(LoanError::Config(format!("no airdrops on {:?}", self.cluster)));
        }
        if lamports == 0 {
            return Err(LoanError::InvalidAmount("airdrop amount must be > 0".into()));
        }
        let signature = self.rpc.request_airdrop(address, lamports).await?;
        self.rpc.confirm_transaction(&signature, self.commitment).await?;
        info!(address = %address, amount = lamports, signature = %signature, "airdrop confirmed");
        Ok(signature)
    }
}

impl<R: ChainRpc> LoanBackend for ChainBackend<R> {
    fn mode(&self) -> SubmissionMode {
        SubmissionMode::Chain
    }

    async fn apply<W: WalletAdapter>(
        &self,
        wallet: &W,
        request: &LoanRequest,
    ) -> Result<LoanReceipt, LoanError> {
        let borrower = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let (amount, _) = request.validate()?;
        let (loan_account, _) = self.addresses.loan_account(&borrower)?;
        let (program_fund, _) = self.addresses.program_fund()?;

        let init = instruction::initialize_loan(
            &self.addresses,
            &borrower,
            request.amount,
            request.term_days,
            self.credit_score,
        )?;
        let application_signature = self.submit(wallet, init, "initialize_loan").await?;
        info!(loan_id = %loan_account, amount, purpose = %request.purpose, "loan initialized");

        let (funding_signature, approval_signature) =
            match self.approve(wallet, &borrower, &borrower).await {
                Ok(approval) => (None, approval),
                Err(e) if e.is_recoverable() => {
                    let (funding, approval) =
                        self.remediate(wallet, &borrower, &program_fund, amount).await?;
                    (Some(funding), approval)
                }
                Err(e) => return Err(e),
            };

        self.journal_transfer(
            Some(loan_account.to_string()),
            TransactionKind::Transfer,
            amount,
            &program_fund,
            &borrower,
            &approval_signature,
        );

        Ok(LoanReceipt {
            loan_id: loan_account.to_string(),
            application_signature,
            funding_signature,
            approval_signature,
        })
    }

    async fn fund<W: WalletAdapter>(&self, wallet: &W, amount: u128) -> Result<String, LoanError> {
        let funder = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let ix = instruction::fund_program(&self.addresses, &funder, amount)?;
        let lamports = u64::try_from(amount)
            .map_err(|_| LoanError::Encoding(format!("amount {amount} exceeds u64")))?;
        let (program_fund, _) = self.addresses.program_fund()?;

        let signature = self.submit(wallet, ix, "fund_program").await?;
        self.journal_transfer(
            None,
            TransactionKind::Transfer,
            lamports,
            &funder,
            &program_fund,
            &signature,
        );
        Ok(signature)
    }

    async fn repay<W: WalletAdapter>(&self, wallet: &W, loan_id: &str) -> Result<String, LoanError> {
        let borrower = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let loan_account: Pubkey = loan_id.parse()?;
        let (expected, _) = self.addresses.loan_account(&borrower)?;
        if loan_account != expected {
            return Err(LoanError::InvalidLoanState(format!(
                "{loan_id} is not the connected wallet's loan"
            )));
        }

        let loan = self
            .fetch_loan(&loan_account)
            .await?
            .ok_or_else(|| LoanError::LoanNotFound(loan_id.to_string()))?;
        if !loan.status().can_transition_to(LoanStatus::Repaid) {
            return Err(LoanError::InvalidLoanState(format!(
                "{loan_id} is {} and cannot be repaid",
                loan.status()
            )));
        }
        let due = loan.repayment_amount()?;
        let (program_fund, _) = self.addresses.program_fund()?;

        let ix = instruction::repay_loan(&self.addresses, &borrower)?;
        let signature = self.submit(wallet, ix, "repay_loan").await?;
        self.journal_transfer(
            Some(loan_id.to_string()),
            TransactionKind::Repayment,
            due,
            &borrower,
            &program_fund,
            &signature,
        );
        Ok(signature)
    }

    async fn update_credit_score<W: WalletAdapter>(
        &self,
        wallet: &W,
        borrower: &Pubkey,
        new_score: u16,
    ) -> Result<String, LoanError> {
        let admin = wallet.public_key().ok_or(LoanError::WalletNotConnected)?;
        let ix = instruction::update_credit_score(&self.addresses, &admin, borrower, new_score)?;
        self.submit(wallet, ix, "update_credit_score").await
    }

    async fn user_loans(&self, borrower: &Pubkey) -> Result<Vec<LoanApplication>, LoanError> {
        let (loan_account, _) = self.addresses.loan_account(borrower)?;
        Ok(self
            .fetch_loan(&loan_account)
            .await?
            .map(|loan| loan.to_application(&loan_account))
            .into_iter()
            .collect())
    }

    async fn loan_details(&self, loan_id: &str) -> Result<Option<LoanApplication>, LoanError> {
        let loan_account: Pubkey = loan_id.parse()?;
        Ok(self
            .fetch_loan(&loan_account)
            .await?
            .map(|loan| loan.to_application(&loan_account)))
    }

    async fn user_transactions(&self, address: &Pubkey) -> Result<Vec<LoanTransaction>, LoanError> {
        Ok(self.journal.transactions_for(&address.to_string()))
    }
}
