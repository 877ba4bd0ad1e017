//! Per-transaction wallet records and their derived lifecycle state.
//!
//! A record stores only base facts reported by the ledger and mempool
//! collaborators: where (if anywhere) the transaction confirmed, whether the
//! mempool currently holds it, and whether the user abandoned it. The
//! user-visible state is always derived from those facts plus the current
//! conflict picture, so replaying an already-applied event can never produce
//! a different answer.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use crate::models::blockchain::amount::Amount;
use crate::models::blockchain::block::BlockHeight;
use crate::models::blockchain::transaction::Outpoint;
use crate::models::blockchain::transaction::Transaction;
use crate::models::blockchain::transaction::TransactionId;
use crate::models::blockchain::transaction::TxVersion;

/// How a transaction first became known to the wallet.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumIs,
)]
pub enum TxOrigin {
    /// built and broadcast by this wallet
    #[strum(to_string = "created")]
    Created,

    /// observed on the network, paying to this wallet
    #[strum(to_string = "received")]
    Received,
}

/// Derived lifecycle state of a wallet transaction.
///
/// `Conflicted` carries the losing margin: the negated confirmation count of
/// the best-confirmed competing transaction. A transaction buried eight
/// blocks deep by its winner reports a margin of −8. Mempool-only conflicts
/// do not reach this state; they leave the loser `Inactive` with a non-empty
/// mempool-conflict list, so that a negative confirmation count always means
/// a chain-confirmed competitor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumIs,
)]
pub enum TxState {
    #[strum(to_string = "confirmed")]
    Confirmed { height: BlockHeight },

    #[strum(to_string = "in-mempool")]
    InMempool,

    #[strum(to_string = "conflicted")]
    Conflicted { margin: i64 },

    #[strum(to_string = "inactive")]
    Inactive,

    #[strum(to_string = "abandoned")]
    Abandoned,
}

impl TxState {
    /// Confirmation count reported for this state. Positive iff confirmed,
    /// negative iff conflicted, zero otherwise.
    pub fn confirmations(&self, tip: BlockHeight) -> i64 {
        match self {
            TxState::Confirmed { height } => height.confirmations_at_tip(tip) as i64,
            TxState::Conflicted { margin } => *margin,
            TxState::InMempool | TxState::Inactive | TxState::Abandoned => 0,
        }
    }

    /// Whether a transaction in this state can spend coins and have its
    /// outputs counted: only chain-confirmed and mempool-resident
    /// transactions are live.
    pub fn is_active(&self) -> bool {
        matches!(self, TxState::Confirmed { .. } | TxState::InMempool)
    }
}

/// The wallet's durable record of one transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,

    pub origin: TxOrigin,

    /// Output indices owned by this wallet, with their values. Resolved
    /// against the ownership oracle once, when the record is created.
    pub owned_outputs: BTreeMap<u32, Amount>,

    /// Height of the canonical block containing this transaction, if any.
    pub confirmed_in_block: Option<BlockHeight>,

    /// Whether the mempool collaborator currently holds the transaction.
    pub in_mempool: bool,

    /// Terminal user mark; cleared only by an accepted re-broadcast.
    pub abandoned: bool,

    /// Fee as reported on mempool acceptance. Unknown for transactions
    /// first seen in a block.
    pub fee: Option<Amount>,

    /// Transactions that took this one's mempool slot. Sibling evictions
    /// under the TRUC one-descendant rule land here even though the evictor
    /// spends a different outpoint. Entries are only reported while the
    /// evictor is itself mempool-resident.
    pub mempool_conflicts: BTreeSet<TransactionId>,
}

impl TransactionRecord {
    pub fn new(
        transaction: Transaction,
        origin: TxOrigin,
        owned_outputs: BTreeMap<u32, Amount>,
    ) -> Self {
        Self {
            transaction,
            origin,
            owned_outputs,
            confirmed_in_block: None,
            in_mempool: false,
            abandoned: false,
            fee: None,
            mempool_conflicts: BTreeSet::new(),
        }
    }

    pub fn txid(&self) -> TransactionId {
        self.transaction.txid
    }

    pub fn version(&self) -> TxVersion {
        self.transaction.version
    }

    pub fn is_coinbase(&self) -> bool {
        self.transaction.is_coinbase()
    }

    pub fn owns_output(&self, index: u32) -> bool {
        self.owned_outputs.contains_key(&index)
    }

    /// Wallet-owned outpoints of this transaction with their values.
    pub fn owned_outpoints(&self) -> impl Iterator<Item = (Outpoint, Amount)> + '_ {
        self.owned_outputs
            .iter()
            .map(|(index, value)| (Outpoint::new(self.transaction.txid, *index), *value))
    }

    /// Total value paid to this wallet by the transaction.
    pub fn received_value(&self) -> Amount {
        self.owned_outputs.values().copied().sum()
    }

    /// Transition: included in a connected block.
    pub fn mark_confirmed(&mut self, height: BlockHeight) {
        self.confirmed_in_block = Some(height);
        self.in_mempool = false;
        self.abandoned = false;
        self.mempool_conflicts.clear();
    }

    /// Transition: the confirming block was disconnected. Mempool residency
    /// is not restored here; the mempool collaborator reports re-acceptance
    /// separately.
    pub fn mark_unconfirmed(&mut self) {
        self.confirmed_in_block = None;
    }

    /// Transition: accepted by the mempool. An accepted re-broadcast clears
    /// the abandoned mark and any stale eviction history.
    pub fn mark_mempool_entry(&mut self) {
        self.in_mempool = true;
        self.abandoned = false;
        self.mempool_conflicts.clear();
    }

    /// Transition: left the mempool without confirming.
    pub fn mark_mempool_exit(&mut self) {
        self.in_mempool = false;
    }

    /// Derive the current state from the record's base facts plus the
    /// conflict picture supplied by the store.
    ///
    /// `winning_conflict` is the confirmation height of the best-confirmed
    /// member of this transaction's conflict set, if any. Chain facts take
    /// precedence over mempool facts, which take precedence over the user's
    /// abandoned mark.
    pub fn derive_state(
        &self,
        winning_conflict: Option<BlockHeight>,
        tip: BlockHeight,
    ) -> TxState {
        if let Some(height) = self.confirmed_in_block {
            return TxState::Confirmed { height };
        }
        if let Some(winner_height) = winning_conflict {
            let margin = -(winner_height.confirmations_at_tip(tip) as i64);
            return TxState::Conflicted { margin };
        }
        if self.in_mempool {
            return TxState::InMempool;
        }
        if self.abandoned {
            return TxState::Abandoned;
        }
        TxState::Inactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blockchain::transaction::ScriptLock;
    use crate::models::blockchain::transaction::TxOutput;

    fn record() -> TransactionRecord {
        let transaction = Transaction {
            txid: TransactionId::new([7; 32]),
            version: TxVersion::Standard,
            inputs: vec![Outpoint::new(TransactionId::new([1; 32]), 0)],
            outputs: vec![TxOutput::new(
                Amount::from(50),
                ScriptLock::new([2; 32]),
            )],
            vsize: 120,
        };
        TransactionRecord::new(
            transaction,
            TxOrigin::Created,
            BTreeMap::from([(0, Amount::from(50))]),
        )
    }

    #[test]
    fn chain_position_dominates_everything() {
        let mut r = record();
        r.mark_mempool_entry();
        r.mark_confirmed(100.into());

        // even a stale conflict hint loses to a confirmed chain position
        let state = r.derive_state(Some(99.into()), 110.into());
        assert_eq!(TxState::Confirmed { height: 100.into() }, state);
        assert_eq!(11, state.confirmations(110.into()));
    }

    #[test]
    fn conflict_margin_is_negated_winner_depth() {
        let mut r = record();
        r.mark_mempool_entry();
        r.mark_mempool_exit();

        let state = r.derive_state(Some(101.into()), 108.into());
        assert_eq!(TxState::Conflicted { margin: -8 }, state);
        assert_eq!(-8, state.confirmations(108.into()));
    }

    #[test]
    fn abandoned_yields_to_mempool_reacceptance() {
        let mut r = record();
        r.abandoned = true;
        assert_eq!(TxState::Abandoned, r.derive_state(None, 100.into()));

        r.mark_mempool_entry();
        assert!(!r.abandoned);
        assert_eq!(TxState::InMempool, r.derive_state(None, 100.into()));
    }

    #[test]
    fn reorg_without_mempool_readdition_is_inactive() {
        let mut r = record();
        r.mark_confirmed(100.into());
        r.mark_unconfirmed();
        assert_eq!(TxState::Inactive, r.derive_state(None, 99.into()));
        assert_eq!(0, r.derive_state(None, 99.into()).confirmations(99.into()));
    }
}
