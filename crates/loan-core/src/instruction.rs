//! Loan program instruction codec.
//!
//! Every payload starts with a one-byte tag followed by fixed-width
//! little-endian fields:
//!
//! ```text
//! Initialize         [0] amount:u64 term_days:u16 credit_score:u16   13 bytes
//! ApproveLoan        [1]                                              1 byte
//! RepayLoan          [2]                                              1 byte
//! UpdateCreditScore  [3] new_score:u16                                3 bytes
//! FundProgram        [4] amount:u64                                   9 bytes
//! ```

use chain_sol::{AccountMeta, Instruction, Pubkey, SYSTEM_PROGRAM_ID};

use crate::addresses::ProgramAddresses;
use crate::error::LoanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoanInstructionKind {
    Initialize = 0,
    ApproveLoan = 1,
    RepayLoan = 2,
    UpdateCreditScore = 3,
    FundProgram = 4,
}

impl LoanInstructionKind {
    pub fn packed_len(&self) -> usize {
        match self {
            LoanInstructionKind::Initialize => 13,
            LoanInstructionKind::ApproveLoan | LoanInstructionKind::RepayLoan => 1,
            LoanInstructionKind::UpdateCreditScore => 3,
            LoanInstructionKind::FundProgram => 9,
        }
    }
}

impl TryFrom<u8> for LoanInstructionKind {
    type Error = LoanError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(LoanInstructionKind::Initialize),
            1 => Ok(LoanInstructionKind::ApproveLoan),
            2 => Ok(LoanInstructionKind::RepayLoan),
            3 => Ok(LoanInstructionKind::UpdateCreditScore),
            4 => Ok(LoanInstructionKind::FundProgram),
            other => Err(LoanError::Encoding(format!("unknown instruction tag {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanInstruction {
    Initialize {
        amount: u64,
        term_days: u16,
        credit_score: u16,
    },
    ApproveLoan,
    RepayLoan,
    UpdateCreditScore {
        new_score: u16,
    },
    FundProgram {
        amount: u64,
    },
}

impl LoanInstruction {
    /// Build an `Initialize` from unchecked caller input.
    ///
    /// The amount must fit in 64 bits and the term in 16 bits; anything wider
    /// fails here, before a single byte is encoded.
    pub fn initialize(amount: u128, term_days: u32, credit_score: u16) -> Result<Self, LoanError> {
        let amount = u64::try_from(amount)
            .map_err(|_| LoanError::Encoding(format!("amount {amount} does not fit in u64")))?;
        let term_days = u16::try_from(term_days)
            .map_err(|_| LoanError::Encoding(format!("term {term_days} days does not fit in u16")))?;

        Ok(LoanInstruction::Initialize {
            amount,
            term_days,
            credit_score,
        })
    }

    /// Build a `FundProgram`; zero and out-of-range amounts are rejected.
    pub fn fund_program(amount: u128) -> Result<Self, LoanError> {
        if amount == 0 {
            return Err(LoanError::InvalidAmount("funding amount must be > 0".into()));
        }
        let amount = u64::try_from(amount)
            .map_err(|_| LoanError::Encoding(format!("amount {amount} does not fit in u64")))?;
        Ok(LoanInstruction::FundProgram { amount })
    }

    pub fn kind(&self) -> LoanInstructionKind {
        match self {
            LoanInstruction::Initialize { .. } => LoanInstructionKind::Initialize,
            LoanInstruction::ApproveLoan => LoanInstructionKind::ApproveLoan,
            LoanInstruction::RepayLoan => LoanInstructionKind::RepayLoan,
            LoanInstruction::UpdateCreditScore { .. } => LoanInstructionKind::UpdateCreditScore,
            LoanInstruction::FundProgram { .. } => LoanInstructionKind::FundProgram,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let kind = self.kind();
        let mut data = Vec::with_capacity(kind.packed_len());
        data.push(kind as u8);

        match *self {
            LoanInstruction::Initialize {
                amount,
                term_days,
                credit_score,
            } => {
                data.extend_from_slice(&amount.to_le_bytes());
                data.extend_from_slice(&term_days.to_le_bytes());
                data.extend_from_slice(&credit_score.to_le_bytes());
            }
            LoanInstruction::ApproveLoan | LoanInstruction::RepayLoan => {}
            LoanInstruction::UpdateCreditScore { new_score } => {
                data.extend_from_slice(&new_score.to_le_bytes());
            }
            LoanInstruction::FundProgram { amount } => {
                data.extend_from_slice(&amount.to_le_bytes());
            }
        }

        data
    }

    pub fn unpack(data: &[u8]) -> Result<Self, LoanError> {
        let (&tag, rest) = data
            .split_first()
            .ok_or_else(|| LoanError::Encoding("empty instruction data".into()))?;
        let kind = LoanInstructionKind::try_from(tag)?;

        if data.len() != kind.packed_len() {
            return Err(LoanError::Encoding(format!(
                "{kind:?} expects {} bytes, got {}",
                kind.packed_len(),
                data.len()
            )));
        }

        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&rest[at..at + 8]);
            u64::from_le_bytes(buf)
        };
        let u16_at = |at: usize| u16::from_le_bytes([rest[at], rest[at + 1]]);

        Ok(match kind {
            LoanInstructionKind::Initialize => LoanInstruction::Initialize {
                amount: u64_at(0),
                term_days: u16_at(8),
                credit_score: u16_at(10),
            },
            LoanInstructionKind::ApproveLoan => LoanInstruction::ApproveLoan,
            LoanInstructionKind::RepayLoan => LoanInstruction::RepayLoan,
            LoanInstructionKind::UpdateCreditScore => LoanInstruction::UpdateCreditScore {
                new_score: u16_at(0),
            },
            LoanInstructionKind::FundProgram => LoanInstruction::FundProgram { amount: u64_at(0) },
        })
    }
}

// ---------------------------------------------------------------------------
// Instruction builders (account order matches the loan program)
// ---------------------------------------------------------------------------

pub fn initialize_loan(
    addresses: &ProgramAddresses,
    borrower: &Pubkey,
    amount: u128,
    term_days: u32,
    credit_score: u16,
) -> Result<Instruction, LoanError> {
    let data = LoanInstruction::initialize(amount, term_days, credit_score)?.pack();
    let (loan_account, _) = addresses.loan_account(borrower)?;

    Ok(Instruction {
        program_id: *addresses.program_id(),
        accounts: vec![
            AccountMeta::new(*borrower, true),
            AccountMeta::new(loan_account, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    })
}

pub fn approve_loan(
    addresses: &ProgramAddresses,
    lender: &Pubkey,
    borrower: &Pubkey,
) -> Result<Instruction, LoanError> {
    let (loan_account, _) = addresses.loan_account(borrower)?;
    let (program_fund, _) = addresses.program_fund()?;

    Ok(Instruction {
        program_id: *addresses.program_id(),
        accounts: vec![
            AccountMeta::new(*lender, true),
            AccountMeta::new(loan_account, false),
            AccountMeta::new(*borrower, false),
            AccountMeta::new(program_fund, false),
        ],
        data: LoanInstruction::ApproveLoan.pack(),
    })
}

pub fn repay_loan(addresses: &ProgramAddresses, borrower: &Pubkey) -> Result<Instruction, LoanError> {
    let (loan_account, _) = addresses.loan_account(borrower)?;
    let (program_fund, _) = addresses.program_fund()?;

    Ok(Instruction {
        program_id: *addresses.program_id(),
        accounts: vec![
            AccountMeta::new(*borrower, true),
            AccountMeta::new(loan_account, false),
            AccountMeta::new(program_fund, false),
        ],
        data: LoanInstruction::RepayLoan.pack(),
    })
}

pub fn update_credit_score(
    addresses: &ProgramAddresses,
    admin: &Pubkey,
    borrower: &Pubkey,
    new_score: u16,
) -> Result<Instruction, LoanError> {
    let (loan_account, _) = addresses.loan_account(borrower)?;

    Ok(Instruction {
        program_id: *addresses.program_id(),
        accounts: vec![
            AccountMeta::new(*admin, true),
            AccountMeta::new(loan_account, false),
        ],
        data: LoanInstruction::UpdateCreditScore { new_score }.pack(),
    })
}

pub fn fund_program(
    addresses: &ProgramAddresses,
    funder: &Pubkey,
    amount: u128,
) -> Result<Instruction, LoanError> {
    let data = LoanInstruction::fund_program(amount)?.pack();
    let (program_fund, _) = addresses.program_fund()?;

    Ok(Instruction {
        program_id: *addresses.program_id(),
        accounts: vec![
            AccountMeta::new(*funder, true),
            AccountMeta::new(program_fund, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    })
}
