//! In-memory ledger behind the simulated backend.
//!
//! The ledger is an ordinary value owned by whoever composes the service and
//! shared by `Arc`; there is no global instance. Its contents live until
//! [`SimulatedLedger::clear_all`] or until the last handle is dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::LoanError;
use crate::types::{now_millis, LoanApplication, LoanStatus, LoanTransaction, TransactionKind, MILLIS_PER_DAY};

/// Source address used by the placeholder transactions.
pub const PLACEHOLDER_LENDER: &str = "DahnMn7khqD73k8B3nhFp3MJxpZC5n5Spr6acdiLmSrv";

#[derive(Debug, Default)]
struct LedgerState {
    loans: HashMap<String, LoanApplication>,
    /// Not part of the UI loan view, so kept beside it.
    credit_scores: HashMap<String, u16>,
    /// Keyed by the transaction's source address; the sequence number keeps
    /// recording order across sources.
    transactions: HashMap<String, Vec<(u64, LoanTransaction)>>,
    next_seq: u64,
}

impl LedgerState {
    fn record(&mut self, transaction: LoanTransaction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.transactions
            .entry(transaction.from.clone())
            .or_default()
            .push((seq, transaction));
    }
}

#[derive(Debug, Default)]
pub struct SimulatedLedger {
    state: Mutex<LedgerState>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a loan under its id.
    pub fn add_loan(&self, loan: LoanApplication) {
        debug!(loan_id = %loan.id, status = %loan.status, "ledger: add loan");
        self.lock().loans.insert(loan.id.clone(), loan);
    }

    pub fn get_loan(&self, loan_id: &str) -> Option<LoanApplication> {
        self.lock().loans.get(loan_id).cloned()
    }

    pub fn set_credit_score(&self, loan_id: &str, score: u16) -> Result<(), LoanError> {
        let mut state = self.lock();
        if !state.loans.contains_key(loan_id) {
            return Err(LoanError::LoanNotFound(loan_id.to_string()));
        }
        state.credit_scores.insert(loan_id.to_string(), score);
        debug!(loan_id, score, "ledger: credit score");
        Ok(())
    }

    pub fn credit_score(&self, loan_id: &str) -> Option<u16> {
        self.lock().credit_scores.get(loan_id).copied()
    }

    /// Move a loan to `next`, recording the fund movement that caused it.
    ///
    /// The status change and the transaction are applied together under one
    /// lock, or not at all.
    pub fn transition(
        &self,
        loan_id: &str,
        next: LoanStatus,
        movement: LoanTransaction,
    ) -> Result<LoanApplication, LoanError> {
        let mut state = self.lock();
        let loan = state
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| LoanError::LoanNotFound(loan_id.to_string()))?;

        if !loan.status.can_transition_to(next) {
            return Err(LoanError::InvalidLoanState(format!(
                "{loan_id} cannot move from {} to {next}",
                loan.status
            )));
        }

        loan.status = next;
        let updated = loan.clone();
        state.record(movement);

        debug!(loan_id, status = %next, "ledger: transition");
        Ok(updated)
    }

    /// Loans recorded for `borrower`, oldest first.
    pub fn loans_for(&self, borrower: &str) -> Vec<LoanApplication> {
        let mut loans: Vec<LoanApplication> = self
            .lock()
            .loans
            .values()
            .filter(|loan| loan.borrower == borrower)
            .cloned()
            .collect();
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        loans
    }

    /// Like [`loans_for`](Self::loans_for), but a borrower with no loans gets
    /// two fabricated example loans instead of an empty list.
    pub fn user_loans(&self, borrower: &str) -> Vec<LoanApplication> {
        let loans = self.loans_for(borrower);
        if loans.is_empty() {
            return placeholder_loans(borrower);
        }
        loans
    }

    pub fn add_transaction(&self, transaction: LoanTransaction) {
        debug!(id = %transaction.id, from = %transaction.from, "ledger: add transaction");
        self.lock().record(transaction);
    }

    /// Transactions sent from or received by `address`, in the order they
    /// were recorded.
    pub fn transactions_for(&self, address: &str) -> Vec<LoanTransaction> {
        let state = self.lock();
        let mut found: Vec<&(u64, LoanTransaction)> = state
            .transactions
            .get(address)
            .into_iter()
            .flatten()
            .chain(
                state
                    .transactions
                    .iter()
                    .filter(|(from, _)| from.as_str() != address)
                    .flat_map(|(_, txs)| txs.iter())
                    .filter(|(_, tx)| tx.to == address),
            )
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Transactions sent from `address`, in the order they were recorded.
    pub fn sent_by(&self, address: &str) -> Vec<LoanTransaction> {
        self.lock()
            .transactions
            .get(address)
            .map(|txs| txs.iter().map(|(_, tx)| tx.clone()).collect())
            .unwrap_or_default()
    }

    /// Like [`sent_by`](Self::sent_by), but an address that has sent nothing
    /// gets two fabricated transfers, even if it has received some.
    pub fn user_transactions(&self, address: &str) -> Vec<LoanTransaction> {
        let transactions = self.sent_by(address);
        if transactions.is_empty() {
            return placeholder_transactions(address);
        }
        transactions
    }

    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.loans.clear();
        state.credit_scores.clear();
        state.transactions.clear();
        state.next_seq = 0;
        debug!("ledger: cleared");
    }

    pub fn loan_count(&self) -> usize {
        self.lock().loans.len()
    }
}

fn short(address: &str) -> &str {
    address.get(..4).unwrap_or(address)
}

// TODO: confirm with product whether empty reads should keep returning
// fabricated loans; the dashboard currently relies on them.
fn placeholder_loans(borrower: &str) -> Vec<LoanApplication> {
    let now = now_millis();
    let prefix = short(borrower);

    vec![
        LoanApplication {
            id: format!("L-{prefix}1"),
            borrower: borrower.to_string(),
            amount: 1_000_000_000,
            term_days: 30,
            status: LoanStatus::Pending,
            purpose: "Business Expansion".to_string(),
            created_at: now.saturating_sub(2 * MILLIS_PER_DAY),
        },
        LoanApplication {
            id: format!("L-{prefix}2"),
            borrower: borrower.to_string(),
            amount: 500_000_000,
            term_days: 15,
            status: LoanStatus::Approved,
            purpose: "Investment".to_string(),
            created_at: now.saturating_sub(5 * MILLIS_PER_DAY),
        },
    ]
}

fn placeholder_transactions(address: &str) -> Vec<LoanTransaction> {
    let now = now_millis();
    let prefix = short(address);

    [(1, 1_000_000_000, 2), (2, 500_000_000, 5)]
        .into_iter()
        .map(|(n, amount, days_ago)| LoanTransaction {
            id: format!("TX-{prefix}{n}"),
            loan_id: Some(format!("L-{prefix}{n}")),
            kind: TransactionKind::Transfer,
            amount,
            from: PLACEHOLDER_LENDER.to_string(),
            to: address.to_string(),
            timestamp: now.saturating_sub(days_ago * MILLIS_PER_DAY),
            signature: format!("simulated_signature_{n}"),
        })
        .collect()
}
