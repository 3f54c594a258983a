//! On-chain loan account layout.
//!
//! ```text
//! is_initialized  u8 (bool)   0
//! borrower        [u8; 32]    1
//! lender          [u8; 32]   33
//! amount          u64 LE     65
//! term_days       u16 LE     73
//! interest_rate   u16 LE     75   basis points
//! start_time      i64 LE     77   unix seconds
//! end_time        i64 LE     85
//! is_repaid       u8 (bool)  93
//! credit_score    u16 LE     94
//! ```

use chain_sol::Pubkey;

use crate::error::LoanError;
use crate::types::{LoanApplication, LoanStatus};

pub const LOAN_ACCOUNT_LEN: usize = 96;

/// Interest rate the program assigns to new loans (5%).
pub const DEFAULT_INTEREST_RATE_BPS: u16 = 500;

const BPS_DENOMINATOR: u128 = 10_000;

/// Purpose is not stored on chain.
pub const ON_CHAIN_PURPOSE: &str = "Loan";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanAccount {
    pub is_initialized: bool,
    pub borrower: Pubkey,
    /// `Pubkey::default()` until the loan is approved.
    pub lender: Pubkey,
    pub amount: u64,
    pub term_days: u16,
    pub interest_rate: u16,
    pub start_time: i64,
    pub end_time: i64,
    pub is_repaid: bool,
    pub credit_score: u16,
}

impl LoanAccount {
    /// A freshly initialized, unapproved loan.
    pub fn new(borrower: Pubkey, amount: u64, term_days: u16, credit_score: u16) -> Self {
        Self {
            is_initialized: true,
            borrower,
            lender: Pubkey::default(),
            amount,
            term_days,
            interest_rate: DEFAULT_INTEREST_RATE_BPS,
            start_time: 0,
            end_time: 0,
            is_repaid: false,
            credit_score,
        }
    }

    pub fn status(&self) -> LoanStatus {
        if self.is_repaid {
            LoanStatus::Repaid
        } else if !self.lender.is_default() {
            LoanStatus::Approved
        } else {
            LoanStatus::Pending
        }
    }

    /// Principal plus interest, as the program charges it on repayment.
    pub fn repayment_amount(&self) -> Result<u64, LoanError> {
        repayment_amount(self.amount, self.interest_rate)
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(LOAN_ACCOUNT_LEN);
        data.push(self.is_initialized as u8);
        data.extend_from_slice(self.borrower.as_ref());
        data.extend_from_slice(self.lender.as_ref());
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&self.term_days.to_le_bytes());
        data.extend_from_slice(&self.interest_rate.to_le_bytes());
        data.extend_from_slice(&self.start_time.to_le_bytes());
        data.extend_from_slice(&self.end_time.to_le_bytes());
        data.push(self.is_repaid as u8);
        data.extend_from_slice(&self.credit_score.to_le_bytes());
        data
    }

    /// Decode account data. Accounts may be allocated larger than the
    /// record, so only a short buffer is an error.
    pub fn unpack(data: &[u8]) -> Result<Self, LoanError> {
        if data.len() < LOAN_ACCOUNT_LEN {
            return Err(LoanError::Encoding(format!(
                "loan account needs {LOAN_ACCOUNT_LEN} bytes, got {}",
                data.len()
            )));
        }

        let bool_at = |at: usize| match data[at] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LoanError::Encoding(format!("invalid bool {other} at offset {at}"))),
        };
        let array_at = |at: usize| {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(&data[at..at + 32]);
            Pubkey::new_from_array(buf)
        };
        let le8 = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[at..at + 8]);
            buf
        };
        let u16_at = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);

        Ok(Self {
            is_initialized: bool_at(0)?,
            borrower: array_at(1),
            lender: array_at(33),
            amount: u64::from_le_bytes(le8(65)),
            term_days: u16_at(73),
            interest_rate: u16_at(75),
            start_time: i64::from_le_bytes(le8(77)),
            end_time: i64::from_le_bytes(le8(85)),
            is_repaid: bool_at(93)?,
            credit_score: u16_at(94),
        })
    }

    /// The UI view of this account, identified by its address.
    pub fn to_application(&self, loan_id: &Pubkey) -> LoanApplication {
        let created_at = if self.start_time > 0 {
            (self.start_time as u64).saturating_mul(1000)
        } else {
            crate::types::now_millis()
        };

        LoanApplication {
            id: loan_id.to_string(),
            borrower: self.borrower.to_string(),
            amount: self.amount,
            term_days: self.term_days,
            status: self.status(),
            purpose: ON_CHAIN_PURPOSE.to_string(),
            created_at,
        }
    }
}

/// `amount + amount * rate_bps / 10_000`, overflow-checked.
pub fn repayment_amount(amount: u64, rate_bps: u16) -> Result<u64, LoanError> {
    let interest = (amount as u128) * (rate_bps as u128) / BPS_DENOMINATOR;
    u64::try_from(amount as u128 + interest)
        .map_err(|_| LoanError::InvalidAmount(format!("repayment of {amount} overflows u64")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LoanAccount {
        let mut account = LoanAccount::new(Pubkey::new_from_array([1; 32]), 1_000_000_000, 30, 700);
        account.start_time = 1_700_000_000;
        account.end_time = 1_700_000_000 + 30 * 86_400;
        account
    }

    #[test]
    fn packed_length_is_fixed() {
        assert_eq!(sample().pack().len(), LOAN_ACCOUNT_LEN);
    }

    #[test]
    fn field_offsets() {
        let data = sample().pack();
        assert_eq!(data[0], 1);
        assert_eq!(&data[1..33], &[1u8; 32]);
        assert_eq!(&data[33..65], &[0u8; 32]);
        assert_eq!(&data[65..73], &1_000_000_000u64.to_le_bytes());
        assert_eq!(&data[73..75], &30u16.to_le_bytes());
        assert_eq!(&data[75..77], &500u16.to_le_bytes());
        assert_eq!(&data[94..96], &700u16.to_le_bytes());
    }

    #[test]
    fn unpack_inverts_pack() {
        let account = sample();
        assert_eq!(LoanAccount::unpack(&account.pack()).unwrap(), account);
    }

    #[test]
    fn unpack_tolerates_padding_but_not_truncation() {
        let mut data = sample().pack();
        data.extend_from_slice(&[0u8; 8]);
        assert!(LoanAccount::unpack(&data).is_ok());
        assert!(LoanAccount::unpack(&data[..95]).is_err());
    }

    #[test]
    fn unpack_rejects_invalid_bool() {
        let mut data = sample().pack();
        data[93] = 2;
        assert!(LoanAccount::unpack(&data).is_err());
    }

    #[test]
    fn status_follows_lender_and_repaid_flag() {
        let mut account = sample();
        assert_eq!(account.status(), LoanStatus::Pending);
        account.lender = Pubkey::new_from_array([2; 32]);
        assert_eq!(account.status(), LoanStatus::Approved);
        account.is_repaid = true;
        assert_eq!(account.status(), LoanStatus::Repaid);
    }

    #[test]
    fn repayment_adds_five_percent() {
        assert_eq!(sample().repayment_amount().unwrap(), 1_050_000_000);
        assert_eq!(repayment_amount(199, 500).unwrap(), 208);
    }

    #[test]
    fn repayment_overflow_is_an_error() {
        assert!(repayment_amount(u64::MAX, 500).is_err());
    }

    #[test]
    fn application_view_uses_start_time_in_millis() {
        let id = Pubkey::new_from_array([9; 32]);
        let app = sample().to_application(&id);
        assert_eq!(app.id, id.to_string());
        assert_eq!(app.created_at, 1_700_000_000_000);
        assert_eq!(app.purpose, "Loan");
    }

    #[test]
    fn corrupt_start_time_saturates() {
        let mut loan = sample();
        loan.start_time = i64::MAX;
        let app = loan.to_application(&Pubkey::new_from_array([9; 32]));
        assert_eq!(app.created_at, u64::MAX);
    }
}
