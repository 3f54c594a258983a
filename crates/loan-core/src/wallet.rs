//! The wallet seam, plus a local keypair wallet.

use std::future::Future;

use ed25519_dalek::SigningKey;
use tracing::debug;
use zeroize::Zeroizing;

use chain_sol::{Pubkey, Transaction};

use crate::rpc::{ChainRpc, RpcError};

/// What the loan client needs from a connected wallet.
pub trait WalletAdapter {
    /// `None` while disconnected.
    fn public_key(&self) -> Option<Pubkey>;

    fn connected(&self) -> bool {
        self.public_key().is_some()
    }

    /// Sign `tx` and broadcast it through `rpc`; returns the signature.
    fn send_transaction<R: ChainRpc>(
        &self,
        tx: Transaction,
        rpc: &R,
    ) -> impl Future<Output = Result<String, RpcError>>;
}

/// A wallet backed by an in-process Ed25519 seed.
pub struct KeypairWallet {
    seed: Zeroizing<[u8; 32]>,
    public_key: Pubkey,
}

impl KeypairWallet {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let public_key = Pubkey::new_from_array(SigningKey::from_bytes(&seed).verifying_key().to_bytes());
        Self {
            seed: Zeroizing::new(seed),
            public_key,
        }
    }
}

impl std::fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl WalletAdapter for KeypairWallet {
    fn public_key(&self) -> Option<Pubkey> {
        Some(self.public_key)
    }

    async fn send_transaction<R: ChainRpc>(
        &self,
        mut tx: Transaction,
        rpc: &R,
    ) -> Result<String, RpcError> {
        tx.sign(&self.seed)
            .map_err(|e| RpcError::Rejected(e.to_string()))?;
        if !tx.is_signed() {
            return Err(RpcError::Rejected(
                "transaction needs signers this wallet does not hold".into(),
            ));
        }

        let wire = tx.to_wire().map_err(|e| RpcError::Rejected(e.to_string()))?;
        debug!(signature = ?tx.signature(), bytes = wire.len(), "broadcasting transaction");
        rpc.send_transaction(&wire).await
    }
}
