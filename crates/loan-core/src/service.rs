//! The boundary the UI calls.
//!
//! Nothing here returns an error. Failures are logged, reported through the
//! [`Notifier`], and come back as `None` or an empty list, which is what the
//! screens render.

use std::sync::Arc;

use tracing::error;

use chain_sol::Pubkey;

use crate::backend::{Backend, LoanBackend, LoanRequest};
use crate::config::{LoanConfig, SubmissionMode};
use crate::error::LoanError;
use crate::ledger::SimulatedLedger;
use crate::notify::{Notification, Notifier};
use crate::rpc::ChainRpc;
use crate::types::{LoanApplication, LoanTransaction};
use crate::wallet::WalletAdapter;

pub struct LoanService<W, R, N> {
    wallet: W,
    notifier: N,
    backend: Backend<R>,
}

impl<W, R, N> LoanService<W, R, N>
where
    W: WalletAdapter,
    R: ChainRpc,
    N: Notifier,
{
    pub fn new(wallet: W, notifier: N, backend: Backend<R>) -> Self {
        Self {
            wallet,
            notifier,
            backend,
        }
    }

    /// Compose a service with the strategy `config.mode` names.
    pub fn from_config(
        config: &LoanConfig,
        wallet: W,
        rpc: R,
        notifier: N,
        ledger: Arc<SimulatedLedger>,
    ) -> Result<Self, LoanError> {
        Ok(Self::new(wallet, notifier, Backend::from_config(config, rpc, ledger)?))
    }

    pub fn mode(&self) -> SubmissionMode {
        self.backend.mode()
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn backend(&self) -> &Backend<R> {
        &self.backend
    }

    // ─── Writes ─────────────────────────────────────────────────────────

    /// Submit a loan application. Returns the application signature.
    pub async fn apply_for_loan(&self, amount: u128, term_days: u32, purpose: &str) -> Option<String> {
        const TITLE: &str = "Loan application failed";

        self.require_wallet()?;
        let request = LoanRequest::new(amount, term_days, purpose);
        self.report(TITLE, request.validate())?;

        let receipt = self.report(TITLE, self.backend.apply(&self.wallet, &request).await)?;
        if let Some(funding) = &receipt.funding_signature {
            self.notifier.notify(Notification::info(
                "Program funded",
                format!("The loan program was topped up before approval. Signature: {funding}"),
            ));
        }
        self.notifier.notify(Notification::info(
            "Loan application submitted",
            format!(
                "Loan {} approved. Signature: {}",
                receipt.loan_id, receipt.approval_signature
            ),
        ));
        Some(receipt.application_signature)
    }

    pub async fn fund_program(&self, amount: u128) -> Option<String> {
        const TITLE: &str = "Funding failed";

        self.require_wallet()?;
        if amount == 0 {
            return self.report(
                TITLE,
                Err(LoanError::InvalidAmount("funding amount must be > 0".into())),
            );
        }

        let signature = self.report(TITLE, self.backend.fund(&self.wallet, amount).await)?;
        self.notifier.notify(Notification::info(
            "Program funded",
            format!("Added {amount} lamports. Signature: {signature}"),
        ));
        Some(signature)
    }

    pub async fn repay_loan(&self, loan_id: &str) -> Option<String> {
        self.require_wallet()?;
        let signature = self.report("Repayment failed", self.backend.repay(&self.wallet, loan_id).await)?;
        self.notifier.notify(Notification::info(
            "Loan repaid",
            format!("Loan {loan_id} repaid. Signature: {signature}"),
        ));
        Some(signature)
    }

    pub async fn update_credit_score(&self, borrower: &str, new_score: u16) -> Option<String> {
        const TITLE: &str = "Credit score update failed";

        self.require_wallet()?;
        let borrower = self.report(TITLE, parse_address(borrower))?;
        let signature = self.report(
            TITLE,
            self.backend
                .update_credit_score(&self.wallet, &borrower, new_score)
                .await,
        )?;
        self.notifier.notify(Notification::info(
            "Credit score updated",
            format!("Credit score set to {new_score}."),
        ));
        Some(signature)
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    pub async fn user_loans(&self, address: &str) -> Vec<LoanApplication> {
        const TITLE: &str = "Could not load loans";

        let Some(borrower) = self.report(TITLE, parse_address(address)) else {
            return Vec::new();
        };
        self.report(TITLE, self.backend.user_loans(&borrower).await)
            .unwrap_or_default()
    }

    pub async fn loan_details(&self, loan_id: &str) -> Option<LoanApplication> {
        self.report("Could not load loan", self.backend.loan_details(loan_id).await)
            .flatten()
    }

    pub async fn user_transactions(&self, address: &str) -> Vec<LoanTransaction> {
        const TITLE: &str = "Could not load transactions";

        let Some(address) = self.report(TITLE, parse_address(address)) else {
            return Vec::new();
        };
        self.report(TITLE, self.backend.user_transactions(&address).await)
            .unwrap_or_default()
    }

    // ─── Chain-only passthroughs ────────────────────────────────────────

    pub async fn balance(&self, address: &str) -> Option<u64> {
        const TITLE: &str = "Could not load balance";

        let address = self.report(TITLE, parse_address(address))?;
        let chain = self.report(TITLE, self.chain_only())?;
        self.report(TITLE, chain.balance(&address).await)
    }

    pub async fn request_airdrop(&self, address: &str, lamports: u64) -> Option<String> {
        const TITLE: &str = "Airdrop failed";

        let address = self.report(TITLE, parse_address(address))?;
        let chain = self.report(TITLE, self.chain_only())?;
        let signature = self.report(TITLE, chain.request_airdrop(&address, lamports).await)?;
        self.notifier.notify(Notification::info(
            "Airdrop received",
            format!("{lamports} lamports sent to {address}."),
        ));
        Some(signature)
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    fn chain_only(&self) -> Result<&crate::chain::ChainBackend<R>, LoanError> {
        self.backend
            .as_chain()
            .ok_or_else(|| LoanError::Unsupported(self.mode().as_str().to_string()))
    }

    fn require_wallet(&self) -> Option<Pubkey> {
        let key = self.wallet.public_key();
        if key.is_none() {
            self.notifier.notify(Notification::error(
                "Wallet not connected",
                "Please connect your wallet first.",
            ));
        }
        key
    }

    fn report<T>(&self, title: &str, result: Result<T, LoanError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(operation = title, mode = self.mode().as_str(), error = %e, "loan operation failed");
                self.notifier.notify(Notification::error(title, e.to_string()));
                None
            }
        }
    }
}

fn parse_address(address: &str) -> Result<Pubkey, LoanError> {
    Ok(address.parse::<Pubkey>()?)
}
