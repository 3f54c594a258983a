use thiserror::Error;

/// Solana primitive errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid seeds: {0}")]
    InvalidSeeds(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = SolError::InvalidSeeds("seed 2 is 40 bytes, max 32".into());
        assert_eq!(err.to_string(), "invalid seeds: seed 2 is 40 bytes, max 32");

        let err = SolError::SerializationError("compact-u16 overflow".into());
        assert_eq!(err.to_string(), "serialization error: compact-u16 overflow");
    }

    #[test]
    fn bad_base58_is_an_address_error() {
        let err = "0OIl".parse::<crate::Pubkey>().unwrap_err();
        assert!(matches!(err, SolError::InvalidAddress(_)));
    }

    #[test]
    fn oversized_seed_is_a_seed_error() {
        let program = crate::Pubkey::new_from_array([1; 32]);
        let err = crate::find_program_address(&[&[0u8; 33]], &program).unwrap_err();
        assert!(matches!(err, SolError::InvalidSeeds(_)));
    }
}
