//! In-process chain used by the integration tests.
//!
//! `MockChain` decodes every wire transaction it receives, checks the
//! signatures, and runs the loan program's instructions against an in-memory
//! account map, failing the same way the deployed program does when the
//! program fund is short.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use chain_sol::{Pubkey, Transaction};
use loan_core::rpc::{AccountInfo, ChainRpc, Commitment, RpcError};
use loan_core::{
    KeypairWallet, LoanAccount, LoanInstruction, LoanInstructionKind, Notification, Notifier,
    ProgramAddresses, WalletAdapter,
};

pub const BORROWER_SEED: [u8; 32] = [7u8; 32];

pub fn program_id() -> Pubkey {
    loan_core::config::DEFAULT_PROGRAM_ID.parse().unwrap()
}

pub fn addresses() -> ProgramAddresses {
    ProgramAddresses::new(program_id())
}

pub fn wallet() -> KeypairWallet {
    KeypairWallet::from_seed(BORROWER_SEED)
}

// ─── Mock chain ─────────────────────────────────────────────────────

#[derive(Default)]
struct ChainState {
    accounts: HashMap<Pubkey, LoanAccount>,
    balances: HashMap<Pubkey, u64>,
    /// Every loan instruction that reached the chain, including rejected ones.
    attempted: Vec<LoanInstructionKind>,
    /// Loan instructions that executed.
    executed: Vec<LoanInstruction>,
    rpc_calls: usize,
    blockhashes: u8,
    airdrops: usize,
    always_underfunded: bool,
    reject_funding: bool,
    confirm_error: Option<RpcError>,
}

#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fund_balance(self, lamports: u64) -> Self {
        let (fund, _) = addresses().program_fund().unwrap();
        self.lock().balances.insert(fund, lamports);
        self
    }

    /// Approvals fail with insufficient funds no matter how much is funded.
    pub fn always_underfunded(self) -> Self {
        self.lock().always_underfunded = true;
        self
    }

    /// The wallet's funding transaction is refused.
    pub fn reject_funding(self) -> Self {
        self.lock().reject_funding = true;
        self
    }

    pub fn fail_confirmation(self, error: RpcError) -> Self {
        self.lock().confirm_error = Some(error);
        self
    }

    pub fn attempted(&self) -> Vec<LoanInstructionKind> {
        self.lock().attempted.clone()
    }

    pub fn executed(&self) -> Vec<LoanInstruction> {
        self.lock().executed.clone()
    }

    pub fn rpc_calls(&self) -> usize {
        self.lock().rpc_calls
    }

    pub fn fund_balance(&self) -> u64 {
        let (fund, _) = addresses().program_fund().unwrap();
        self.lock().balances.get(&fund).copied().unwrap_or_default()
    }

    pub fn loan(&self, address: &Pubkey) -> Option<LoanAccount> {
        self.lock().accounts.get(address).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    fn call(&self) -> MutexGuard<'_, ChainState> {
        let mut state = self.lock();
        state.rpc_calls += 1;
        state
    }
}

fn verify_signatures(tx: &Transaction) -> Result<(), RpcError> {
    let message = tx
        .message
        .serialize()
        .map_err(|e| RpcError::Rejected(e.to_string()))?;
    for (key, sig) in tx.message.signers().iter().zip(&tx.signatures) {
        let key = VerifyingKey::from_bytes(key.as_array())
            .map_err(|e| RpcError::Rejected(e.to_string()))?;
        key.verify(&message, &Signature::from_bytes(sig))
            .map_err(|_| RpcError::Rejected("signature verification failure".into()))?;
    }
    Ok(())
}

impl ChainState {
    fn execute(&mut self, accounts: &[Pubkey], ix: LoanInstruction) -> Result<(), RpcError> {
        let missing = || RpcError::Rejected("account not found".into());
        match &ix {
            LoanInstruction::Initialize {
                amount,
                term_days,
                credit_score,
            } => {
                let loan = LoanAccount::new(accounts[0], *amount, *term_days, *credit_score);
                self.accounts.insert(accounts[1], loan);
            }
            LoanInstruction::ApproveLoan => {
                let amount = self.accounts.get(&accounts[1]).ok_or_else(missing)?.amount;
                let fund = self.balances.entry(accounts[3]).or_default();
                if self.always_underfunded || *fund < amount {
                    return Err(RpcError::classify(
                        "Transaction simulation failed: Error processing Instruction 0: insufficient funds for instruction",
                    ));
                }
                *fund -= amount;
                *self.balances.entry(accounts[2]).or_default() += amount;

                let loan = self.accounts.get_mut(&accounts[1]).ok_or_else(missing)?;
                loan.lender = accounts[0];
                loan.start_time = 1_700_000_000;
                loan.end_time = loan.start_time + i64::from(loan.term_days) * 86_400;
            }
            LoanInstruction::RepayLoan => {
                let loan = self.accounts.get_mut(&accounts[1]).ok_or_else(missing)?;
                let due = loan.repayment_amount().map_err(|e| RpcError::Rejected(e.to_string()))?;
                loan.is_repaid = true;
                *self.balances.entry(accounts[2]).or_default() += due;
            }
            LoanInstruction::UpdateCreditScore { new_score } => {
                self.accounts
                    .get_mut(&accounts[1])
                    .ok_or_else(missing)?
                    .credit_score = *new_score;
            }
            LoanInstruction::FundProgram { amount } => {
                if self.reject_funding {
                    return Err(RpcError::classify("User rejected the request."));
                }
                *self.balances.entry(accounts[1]).or_default() += amount;
            }
        }
        self.executed.push(ix);
        Ok(())
    }
}

impl ChainRpc for MockChain {
    async fn latest_blockhash(&self) -> Result<[u8; 32], RpcError> {
        let mut state = self.call();
        state.blockhashes = state.blockhashes.wrapping_add(1);
        Ok([state.blockhashes; 32])
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String, RpcError> {
        let mut state = self.call();
        let tx = Transaction::from_wire(wire).map_err(|e| RpcError::Rejected(e.to_string()))?;
        verify_signatures(&tx)?;

        for compiled in &tx.message.instructions {
            let ix = tx.message.decompile(compiled);
            if ix.program_id != program_id() {
                continue;
            }
            let decoded =
                LoanInstruction::unpack(&ix.data).map_err(|e| RpcError::Rejected(e.to_string()))?;
            state.attempted.push(decoded.kind());

            let accounts: Vec<Pubkey> = ix.accounts.iter().map(|m| m.pubkey).collect();
            state.execute(&accounts, decoded)?;
        }

        tx.signature()
            .ok_or_else(|| RpcError::Rejected("unsigned transaction".into()))
    }

    async fn confirm_transaction(&self, _signature: &str, _commitment: Commitment) -> Result<(), RpcError> {
        match self.call().confirm_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn get_account_info(&self, address: &Pubkey) -> Result<Option<AccountInfo>, RpcError> {
        let state = self.call();
        Ok(state.accounts.get(address).map(|loan| AccountInfo {
            lamports: 1_500_000,
            owner: program_id(),
            data: loan.pack(),
        }))
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, RpcError> {
        Ok(self.call().balances.get(address).copied().unwrap_or_default())
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<String, RpcError> {
        let mut state = self.call();
        *state.balances.entry(*address).or_default() += lamports;
        state.airdrops += 1;
        Ok(format!("airdrop_{}", state.airdrops))
    }
}

// ─── Wallet and notifier doubles ────────────────────────────────────

pub struct DisconnectedWallet;

impl WalletAdapter for DisconnectedWallet {
    fn public_key(&self) -> Option<Pubkey> {
        None
    }

    async fn send_transaction<R: ChainRpc>(&self, _tx: Transaction, _rpc: &R) -> Result<String, RpcError> {
        Err(RpcError::Rejected("wallet not connected".into()))
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.all().into_iter().map(|n| n.title).collect()
    }

    pub fn last(&self) -> Option<Notification> {
        self.all().pop()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}
