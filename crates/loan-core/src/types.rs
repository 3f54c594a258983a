use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Lifecycle of a loan application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Repaid,
}

impl LoanStatus {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Approved)
                | (LoanStatus::Pending, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Repaid)
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Repaid => "repaid",
        };
        f.write_str(s)
    }
}

/// A loan application as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub id: String,
    pub borrower: String,
    /// Base units (lamports).
    pub amount: u64,
    pub term_days: u16,
    pub status: LoanStatus,
    pub purpose: String,
    /// Epoch millis.
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Repayment,
}

/// A fund movement attributed to a loan (or to the program fund).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanTransaction {
    pub id: String,
    /// `None` for program funding, which belongs to no loan.
    pub loan_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: u64,
    pub from: String,
    pub to: String,
    pub timestamp: u64,
    pub signature: String,
}

/// Current wall-clock time in epoch millis.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
