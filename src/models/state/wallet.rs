pub mod balance;
pub mod conflict_index;
pub mod error;
pub mod transaction_record;
pub mod transaction_summary;
pub mod wallet_state;

use std::collections::HashSet;
use std::fmt::Debug;

use crate::models::blockchain::transaction::ScriptLock;
use crate::models::blockchain::transaction::TxOutput;

/// The wallet's only view into key material: the `IsMine` question.
///
/// Key derivation and signing live with an external collaborator; the
/// tracker asks once per newly observed output whether its lock belongs to
/// this wallet and remembers the answer in the transaction record.
pub trait OwnershipOracle: Debug + Send + Sync {
    fn is_mine(&self, output: &TxOutput) -> bool;
}

/// Oracle backed by a plain set of owned script locks.
///
/// Sufficient for wallets whose key manager can enumerate its locks up
/// front, and for every test in this crate.
#[derive(Clone, Debug, Default)]
pub struct ScriptLockSet {
    locks: HashSet<ScriptLock>,
}

impl ScriptLockSet {
    pub fn new(locks: impl IntoIterator<Item = ScriptLock>) -> Self {
        Self {
            locks: locks.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, lock: ScriptLock) {
        self.locks.insert(lock);
    }
}

impl OwnershipOracle for ScriptLockSet {
    fn is_mine(&self, output: &TxOutput) -> bool {
        self.locks.contains(&output.lock)
    }
}
