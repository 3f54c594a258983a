//! Deterministic account addresses of the loan program.
//!
//! Seeds:
//!   loan account   `["loan", borrower]`
//!   program fund   `["program_fund"]`

use chain_sol::{find_program_address, Pubkey};

use crate::error::LoanError;

pub const LOAN_SEED: &[u8] = b"loan";
pub const PROGRAM_FUND_SEED: &[u8] = b"program_fund";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramAddresses {
    program_id: Pubkey,
}

impl ProgramAddresses {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// The borrower's loan account and its bump seed. One per borrower.
    pub fn loan_account(&self, borrower: &Pubkey) -> Result<(Pubkey, u8), LoanError> {
        Ok(find_program_address(
            &[LOAN_SEED, borrower.as_ref()],
            &self.program_id,
        )?)
    }

    /// The program fund account and its bump seed.
    pub fn program_fund(&self) -> Result<(Pubkey, u8), LoanError> {
        Ok(find_program_address(&[PROGRAM_FUND_SEED], &self.program_id)?)
    }
}
