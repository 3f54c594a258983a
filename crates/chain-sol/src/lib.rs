//! Solana primitives for the loan client.
//!
//! Addresses, program derived addresses, and the legacy transaction wire
//! format, implemented by hand instead of pulling in `solana-sdk` (which
//! drags in tokio and 200+ transitive dependencies). `ed25519-dalek` signs,
//! `curve25519-dalek` answers the on-curve question for PDAs, `bs58` encodes.

pub mod address;
pub mod error;
pub mod pda;
pub mod transaction;

pub use address::{address_to_bytes, bytes_to_address, validate_address, Pubkey};
pub use error::SolError;
pub use pda::{create_program_address, find_program_address, is_on_curve};
pub use transaction::{
    decode_compact_u16, encode_compact_u16, AccountMeta, CompiledInstruction, Instruction,
    Message, Transaction, SIGNATURE_LEN, SYSTEM_PROGRAM_ID,
};
