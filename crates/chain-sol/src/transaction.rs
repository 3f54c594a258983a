//! Legacy Solana transaction wire format.
//!
//! Transactions are built and parsed by hand, no `solana-sdk`:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::Signer;
use zeroize::Zeroize;

use crate::address::Pubkey;
use crate::error::SolError;

/// The System Program: 32 zero bytes, `11111111111111111111111111111111`.
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0u8; 32]);

pub const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Compact-u16
// ---------------------------------------------------------------------------

/// Encode a `u16` in Solana's compact-u16 (1 to 3 bytes, 7 bits per byte).
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16, returning `(value, bytes_consumed)`.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            SolError::SerializationError("unexpected end of data while decoding compact-u16".into())
        })?;
        value |= ((byte & 0x7f) as u32) << (7 * consumed);
        consumed += 1;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    let value = u16::try_from(value)
        .map_err(|_| SolError::SerializationError("compact-u16 value overflow".into()))?;

    Ok((value, consumed))
}

fn compact_len(len: usize, what: &str) -> Result<Vec<u8>, SolError> {
    let len = u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(len))
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// An account reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    /// A writable account.
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    /// A read-only account.
    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction before it is compiled into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// An instruction whose account references are indices into the message's
/// `account_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    /// Canonical order: writable signers (fee payer first), read-only
    /// signers, writable non-signers, read-only non-signers.
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile instructions into a message paid for by `fee_payer`.
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &Pubkey,
        recent_blockhash: &[u8; 32],
    ) -> Result<Self, SolError> {
        if instructions.is_empty() {
            return Err(SolError::TransactionBuildError("no instructions".into()));
        }

        struct AccountEntry {
            pubkey: Pubkey,
            is_signer: bool,
            is_writable: bool,
        }

        let mut entries: Vec<AccountEntry> = Vec::new();
        let mut upsert = |pubkey: Pubkey, signer: bool, writable: bool| {
            if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
                entry.is_signer |= signer;
                entry.is_writable |= writable;
            } else {
                entries.push(AccountEntry {
                    pubkey,
                    is_signer: signer,
                    is_writable: writable,
                });
            }
        };

        upsert(*fee_payer, true, true);
        for ix in instructions {
            for meta in &ix.accounts {
                upsert(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        // Stable sort keeps insertion order inside each class, so the fee
        // payer stays at index 0.
        entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        if entries.len() > u8::MAX as usize {
            return Err(SolError::TransactionBuildError(format!(
                "too many accounts: {}",
                entries.len()
            )));
        }

        let count = |pred: fn(&AccountEntry) -> bool| entries.iter().filter(|e| pred(e)).count() as u8;
        let num_required_signatures = count(|e| e.is_signer);
        let num_readonly_signed = count(|e| e.is_signer && !e.is_writable);
        let num_readonly_unsigned = count(|e| !e.is_signer && !e.is_writable);

        let account_keys: Vec<Pubkey> = entries.iter().map(|e| e.pubkey).collect();
        let index_of = |key: &Pubkey| -> Result<u8, SolError> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| SolError::TransactionBuildError(format!("{key} not in account keys")))
        };

        let mut compiled = Vec::with_capacity(instructions.len());
        for ix in instructions {
            let account_indices = ix
                .accounts
                .iter()
                .map(|meta| index_of(&meta.pubkey))
                .collect::<Result<Vec<_>, _>>()?;

            compiled.push(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                account_indices,
                data: ix.data.clone(),
            });
        }

        Ok(Self {
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            account_keys,
            recent_blockhash: *recent_blockhash,
            instructions: compiled,
        })
    }

    /// The fee payer (first account key).
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    /// The accounts that must sign, in signature-slot order.
    pub fn signers(&self) -> &[Pubkey] {
        let n = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(256);

        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);

        buf.extend_from_slice(&compact_len(self.account_keys.len(), "account keys")?);
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_ref());
        }

        buf.extend_from_slice(&self.recent_blockhash);

        buf.extend_from_slice(&compact_len(self.instructions.len(), "instructions")?);
        for ix in &self.instructions {
            buf.push(ix.program_id_index);
            buf.extend_from_slice(&compact_len(ix.account_indices.len(), "account indices")?);
            buf.extend_from_slice(&ix.account_indices);
            buf.extend_from_slice(&compact_len(ix.data.len(), "data bytes")?);
            buf.extend_from_slice(&ix.data);
        }

        Ok(buf)
    }

    /// Parse a serialized message. Trailing bytes are rejected.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = Reader::new(bytes);

        let num_required_signatures = reader.u8()?;
        let num_readonly_signed = reader.u8()?;
        let num_readonly_unsigned = reader.u8()?;

        let num_accounts = reader.compact_u16()? as usize;
        let mut account_keys = Vec::with_capacity(num_accounts);
        for _ in 0..num_accounts {
            account_keys.push(Pubkey::new_from_array(reader.array::<32>()?));
        }

        let recent_blockhash = reader.array::<32>()?;

        let num_instructions = reader.compact_u16()? as usize;
        let mut instructions = Vec::with_capacity(num_instructions);
        for _ in 0..num_instructions {
            let program_id_index = reader.u8()?;
            let n = reader.compact_u16()? as usize;
            let account_indices = reader.bytes(n)?.to_vec();
            let n = reader.compact_u16()? as usize;
            let data = reader.bytes(n)?.to_vec();

            let out_of_range = std::iter::once(&program_id_index)
                .chain(account_indices.iter())
                .any(|&i| i as usize >= account_keys.len());
            if out_of_range {
                return Err(SolError::SerializationError(
                    "instruction references an unknown account index".into(),
                ));
            }

            instructions.push(CompiledInstruction {
                program_id_index,
                account_indices,
                data,
            });
        }

        if !reader.is_empty() {
            return Err(SolError::SerializationError(
                "trailing bytes after message".into(),
            ));
        }

        Ok(Self {
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// Expand a compiled instruction back into an [`Instruction`].
    pub fn decompile(&self, ix: &CompiledInstruction) -> Instruction {
        let signers = self.num_required_signatures as usize;
        let readonly_signed_from = signers - (self.num_readonly_signed as usize).min(signers);
        let readonly_unsigned_from = self
            .account_keys
            .len()
            .saturating_sub(self.num_readonly_unsigned as usize);

        let meta = |index: u8| {
            let i = index as usize;
            let is_signer = i < signers;
            let is_writable = if is_signer {
                i < readonly_signed_from
            } else {
                i < readonly_unsigned_from
            };
            AccountMeta {
                pubkey: self.account_keys[i],
                is_signer,
                is_writable,
            }
        };

        Instruction {
            program_id: self.account_keys[ix.program_id_index as usize],
            accounts: ix.account_indices.iter().map(|&i| meta(i)).collect(),
            data: ix.data.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A message plus one signature slot per required signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub message: Message,
}

impl Transaction {
    /// Wrap a message with zeroed signature slots.
    pub fn new_unsigned(message: Message) -> Self {
        Self {
            signatures: vec![[0u8; SIGNATURE_LEN]; message.num_required_signatures as usize],
            message,
        }
    }

    /// Compile `instructions` into an unsigned transaction.
    pub fn build(
        instructions: &[Instruction],
        fee_payer: &Pubkey,
        recent_blockhash: &[u8; 32],
    ) -> Result<Self, SolError> {
        Message::compile(instructions, fee_payer, recent_blockhash).map(Self::new_unsigned)
    }

    /// Sign with a 32-byte Ed25519 seed, filling the slot that belongs to the
    /// key's public address.
    pub fn sign(&mut self, private_key: &[u8; 32]) -> Result<(), SolError> {
        let mut seed = *private_key;
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
        seed.zeroize();

        let our_key = Pubkey::new_from_array(signing_key.verifying_key().to_bytes());
        let slot = self
            .message
            .signers()
            .iter()
            .position(|k| *k == our_key)
            .ok_or_else(|| {
                SolError::SigningError(format!("{our_key} not found in transaction signers"))
            })?;

        let message_bytes = self.message.serialize()?;
        let signature = signing_key.sign(&message_bytes);
        self.signatures[slot] = signature.to_bytes();
        Ok(())
    }

    /// Whether every signature slot has been filled.
    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(|s| s.iter().any(|&b| b != 0))
    }

    /// The first signature, Base58 encoded. This is the transaction id.
    pub fn signature(&self) -> Option<String> {
        self.signatures.first().map(|s| bs58::encode(s).into_string())
    }

    /// Serialize into wire format, ready for `sendTransaction`.
    pub fn to_wire(&self) -> Result<Vec<u8>, SolError> {
        let message_bytes = self.message.serialize()?;
        let mut wire =
            Vec::with_capacity(3 + self.signatures.len() * SIGNATURE_LEN + message_bytes.len());

        wire.extend_from_slice(&compact_len(self.signatures.len(), "signatures")?);
        for sig in &self.signatures {
            wire.extend_from_slice(sig);
        }
        wire.extend_from_slice(&message_bytes);

        Ok(wire)
    }

    /// Parse a wire-format transaction.
    pub fn from_wire(raw: &[u8]) -> Result<Self, SolError> {
        let (num_sigs, offset) = decode_compact_u16(raw)?;
        if num_sigs == 0 {
            return Err(SolError::SerializationError(
                "transaction has zero signatures".into(),
            ));
        }

        let mut reader = Reader::new(&raw[offset..]);
        let mut signatures = Vec::with_capacity(num_sigs as usize);
        for _ in 0..num_sigs {
            signatures.push(reader.array::<SIGNATURE_LEN>()?);
        }

        let message = Message::deserialize(reader.rest())?;
        if message.num_required_signatures as usize != signatures.len() {
            return Err(SolError::SerializationError(format!(
                "{} signatures for {} required signers",
                signatures.len(),
                message.num_required_signatures
            )));
        }

        Ok(Self {
            signatures,
            message,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], SolError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let end = end.ok_or_else(|| {
            SolError::SerializationError(format!("need {n} bytes at offset {}", self.pos))
        })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, SolError> {
        Ok(self.bytes(1)?[0])
    }

    fn compact_u16(&mut self) -> Result<u16, SolError> {
        let (value, used) = decode_compact_u16(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Pubkey {
        Pubkey::new_from_array([b; 32])
    }

    fn keypair(seed: u8) -> ([u8; 32], Pubkey) {
        let private_key = [seed; 32];
        let public = ed25519_dalek::SigningKey::from_bytes(&private_key)
            .verifying_key()
            .to_bytes();
        (private_key, Pubkey::new_from_array(public))
    }

    fn sample_instruction(payer: Pubkey) -> Instruction {
        Instruction {
            program_id: key(0x50),
            accounts: vec![
                AccountMeta::new(payer, true),
                AccountMeta::new(key(0xA1), false),
                AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            ],
            data: vec![4, 1, 2, 3],
        }
    }

    // -- compact-u16 ----------------------------------------------------------

    #[test]
    fn compact_u16_boundaries() {
        assert_eq!(encode_compact_u16(0), vec![0x00]);
        assert_eq!(encode_compact_u16(0x7f), vec![0x7f]);
        assert_eq!(encode_compact_u16(128), vec![0x80, 0x01]);
        assert_eq!(encode_compact_u16(16383), vec![0xff, 0x7f]);
        assert_eq!(encode_compact_u16(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode_compact_u16(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn decode_compact_u16_reports_consumed_bytes() {
        assert_eq!(decode_compact_u16(&[0x7f, 0xaa]).unwrap(), (127, 1));
        assert_eq!(decode_compact_u16(&[0x80, 0x01]).unwrap(), (128, 2));
        assert_eq!(decode_compact_u16(&[0x80, 0x80, 0x01]).unwrap(), (16384, 3));
    }

    #[test]
    fn decode_compact_u16_rejects_truncated_and_overflowing_input() {
        assert!(decode_compact_u16(&[]).is_err());
        assert!(decode_compact_u16(&[0x80]).is_err());
        assert!(decode_compact_u16(&[0xff, 0xff, 0x7f]).is_err());
    }

    // -- message compilation --------------------------------------------------

    #[test]
    fn compile_orders_accounts_canonically() {
        let payer = key(0x01);
        let msg = Message::compile(&[sample_instruction(payer)], &payer, &[0xAA; 32]).unwrap();

        // payer (signer, writable), loan account (writable), then read-only
        // system program and program id in insertion order.
        assert_eq!(
            msg.account_keys,
            vec![payer, key(0xA1), SYSTEM_PROGRAM_ID, key(0x50)]
        );
        assert_eq!(msg.num_required_signatures, 1);
        assert_eq!(msg.num_readonly_signed, 0);
        assert_eq!(msg.num_readonly_unsigned, 2);
        assert_eq!(msg.instructions[0].program_id_index, 3);
        assert_eq!(msg.instructions[0].account_indices, vec![0, 1, 2]);
    }

    #[test]
    fn compile_keeps_fee_payer_first_when_not_in_instruction() {
        let payer = key(0x09);
        let mut ix = sample_instruction(key(0x02));
        ix.accounts[0].is_signer = false;
        let msg = Message::compile(&[ix], &payer, &[0u8; 32]).unwrap();
        assert_eq!(msg.fee_payer(), Some(&payer));
        assert_eq!(msg.signers(), &[payer]);
    }

    #[test]
    fn compile_deduplicates_accounts() {
        let payer = key(0x01);
        let ix = Instruction {
            program_id: key(0x50),
            accounts: vec![
                AccountMeta::new(payer, true),
                AccountMeta::new_readonly(payer, false),
            ],
            data: vec![1],
        };
        let msg = Message::compile(&[ix], &payer, &[0u8; 32]).unwrap();
        assert_eq!(msg.account_keys.len(), 2);
        assert_eq!(msg.instructions[0].account_indices, vec![0, 0]);
    }

    #[test]
    fn compile_without_instructions_fails() {
        assert!(Message::compile(&[], &key(1), &[0u8; 32]).is_err());
    }

    #[test]
    fn message_serialization_layout() {
        let payer = key(0x01);
        let blockhash = [0xCC; 32];
        let msg = Message::compile(&[sample_instruction(payer)], &payer, &blockhash).unwrap();
        let bytes = msg.serialize().unwrap();

        assert_eq!(&bytes[..3], &[1, 0, 2]);
        assert_eq!(bytes[3], 4); // compact-u16 account count
        let offset = 4 + 32 * 4;
        assert_eq!(&bytes[offset..offset + 32], &blockhash);
    }

    #[test]
    fn message_deserialize_inverts_serialize() {
        let payer = key(0x01);
        let msg = Message::compile(&[sample_instruction(payer)], &payer, &[0x11; 32]).unwrap();
        let parsed = Message::deserialize(&msg.serialize().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn message_deserialize_rejects_trailing_bytes() {
        let payer = key(0x01);
        let msg = Message::compile(&[sample_instruction(payer)], &payer, &[0x11; 32]).unwrap();
        let mut bytes = msg.serialize().unwrap();
        bytes.push(0);
        assert!(Message::deserialize(&bytes).is_err());
    }

    #[test]
    fn decompile_restores_account_roles() {
        let payer = key(0x01);
        let ix = sample_instruction(payer);
        let msg = Message::compile(&[ix.clone()], &payer, &[0u8; 32]).unwrap();
        assert_eq!(msg.decompile(&msg.instructions[0]), ix);
    }

    // -- signing and wire format ----------------------------------------------

    #[test]
    fn signed_transaction_verifies() {
        use ed25519_dalek::{Signature, VerifyingKey};

        let (private_key, payer) = keypair(0x42);
        let mut tx = Transaction::build(&[sample_instruction(payer)], &payer, &[0xCC; 32]).unwrap();
        assert!(!tx.is_signed());

        tx.sign(&private_key).unwrap();
        assert!(tx.is_signed());

        let wire = tx.to_wire().unwrap();
        assert_eq!(wire[0], 0x01);

        let sig_bytes: [u8; 64] = wire[1..65].try_into().unwrap();
        let vk = VerifyingKey::from_bytes(payer.as_array()).unwrap();
        assert!(vk
            .verify_strict(&wire[65..], &Signature::from_bytes(&sig_bytes))
            .is_ok());
    }

    #[test]
    fn signing_is_deterministic() {
        let (private_key, payer) = keypair(0x55);
        let mut a = Transaction::build(&[sample_instruction(payer)], &payer, &[9; 32]).unwrap();
        let mut b = a.clone();
        a.sign(&private_key).unwrap();
        b.sign(&private_key).unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signing_with_foreign_key_fails() {
        let (_, payer) = keypair(0x11);
        let (other_key, _) = keypair(0x22);
        let mut tx = Transaction::build(&[sample_instruction(payer)], &payer, &[0; 32]).unwrap();
        let err = tx.sign(&other_key).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn wire_roundtrip_preserves_transaction() {
        let (private_key, payer) = keypair(0x42);
        let mut tx = Transaction::build(&[sample_instruction(payer)], &payer, &[0xDD; 32]).unwrap();
        tx.sign(&private_key).unwrap();

        let parsed = Transaction::from_wire(&tx.to_wire().unwrap()).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn from_wire_rejects_bad_input() {
        assert!(Transaction::from_wire(&[]).is_err());
        assert!(Transaction::from_wire(&[0x01]).is_err());

        let err = Transaction::from_wire(&[0x00, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(err.to_string().contains("zero signatures"));
    }

    #[test]
    fn signature_is_base58_of_first_slot() {
        let (private_key, payer) = keypair(0x42);
        let mut tx = Transaction::build(&[sample_instruction(payer)], &payer, &[1; 32]).unwrap();
        tx.sign(&private_key).unwrap();
        let decoded = bs58::decode(tx.signature().unwrap()).into_vec().unwrap();
        assert_eq!(decoded, tx.signatures[0].to_vec());
    }
}
