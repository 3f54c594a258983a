//! Program Derived Address (PDA) derivation.
//!
//! A PDA is `SHA-256(seed_0 || ... || seed_n || bump || program_id ||
//! "ProgramDerivedAddress")` for the first bump (255 down to 0) whose hash is
//! NOT a valid Ed25519 point, so no private key can ever sign for it.

use sha2::{Digest, Sha256};

use crate::address::Pubkey;
use crate::error::SolError;

/// Maximum number of seeds, bump included.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed in bytes.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Find the canonical PDA and its bump seed for `seeds` under `program_id`.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), SolError> {
    // One slot is reserved for the bump.
    validate_seeds(seeds, MAX_SEEDS - 1)?;

    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(SolError::InvalidSeeds(
        "could not find valid PDA bump seed".into(),
    ))
}

/// Create a PDA from seeds that already include the bump.
///
/// Fails if the resulting hash lies on the Ed25519 curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<Pubkey, SolError> {
    validate_seeds(seeds, MAX_SEEDS)?;

    try_create_program_address(seeds, &[], program_id)
        .ok_or_else(|| SolError::InvalidSeeds("derived address is on the curve".into()))
}

fn validate_seeds(seeds: &[&[u8]], max_seeds: usize) -> Result<(), SolError> {
    if seeds.len() > max_seeds {
        return Err(SolError::InvalidSeeds(format!(
            "at most {max_seeds} seeds allowed, got {}",
            seeds.len()
        )));
    }
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(SolError::InvalidSeeds(format!(
            "seed of {} bytes exceeds {MAX_SEED_LEN}",
            seed.len()
        )));
    }
    Ok(())
}

fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &Pubkey,
) -> Option<Pubkey> {
    let mut hasher = Sha256::new();

    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id.as_array());
    hasher.update(PDA_MARKER);

    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }

    Some(Pubkey::new_from_array(hash))
}

/// Whether 32 bytes decompress to a point on the Ed25519 curve.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Pubkey {
        "Dtj6mjrmMLFEywJ3D1qyMsLR1ibbruQdoPcWB25x57Jy".parse().unwrap()
    }

    #[test]
    fn pda_is_not_on_curve() {
        let (address, _) = find_program_address(&[b"program_fund"], &program()).unwrap();
        assert!(!is_on_curve(address.as_array()));
    }

    #[test]
    fn pda_derivation_is_deterministic() {
        let borrower = [0x11u8; 32];
        let a = find_program_address(&[b"loan", &borrower], &program()).unwrap();
        let b = find_program_address(&[b"loan", &borrower], &program()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bump_recreates_same_address() {
        let (address, bump) = find_program_address(&[b"program_fund"], &program()).unwrap();
        let recreated = create_program_address(&[b"program_fund", &[bump]], &program()).unwrap();
        assert_eq!(recreated, address);
    }

    #[test]
    fn different_programs_give_different_addresses() {
        let other = Pubkey::new_from_array([9u8; 32]);
        let (a, _) = find_program_address(&[b"program_fund"], &program()).unwrap();
        let (b, _) = find_program_address(&[b"program_fund"], &other).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn seed_order_matters() {
        let (a, _) = find_program_address(&[b"loan", b"x"], &program()).unwrap();
        let (b, _) = find_program_address(&[b"x", b"loan"], &program()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let long = [0u8; 33];
        let err = find_program_address(&[&long], &program()).unwrap_err();
        assert!(matches!(err, SolError::InvalidSeeds(_)));
    }

    #[test]
    fn too_many_seeds_are_rejected() {
        let seeds: Vec<&[u8]> = (0..17).map(|_| b"s".as_slice()).collect();
        assert!(find_program_address(&seeds, &program()).is_err());
    }

    #[test]
    fn bump_counts_toward_the_seed_limit() {
        let sixteen: Vec<&[u8]> = (0..16).map(|_| b"s".as_slice()).collect();
        assert!(matches!(
            find_program_address(&sixteen, &program()),
            Err(SolError::InvalidSeeds(_))
        ));

        let (_, bump) = find_program_address(&sixteen[..15], &program()).unwrap();
        let bump = [bump];
        let mut with_bump = sixteen[..15].to_vec();
        with_bump.push(&bump);
        assert!(create_program_address(&with_bump, &program()).is_ok());
    }

    #[test]
    fn is_on_curve_accepts_basepoint() {
        let basepoint: [u8; 32] = [
            0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
            0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
            0x66, 0x66, 0x66, 0x66,
        ];
        assert!(is_on_curve(&basepoint));
    }
}
