//! An index from spent outpoints to the transactions spending them.
//!
//! The index is the wallet's only record of which transactions compete for
//! the same coins. It stores ids exclusively; the records themselves live in
//! the wallet store's arena, and the store decides how to react when a
//! conflict set changes.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::models::blockchain::transaction::Outpoint;
use crate::models::blockchain::transaction::TransactionId;

#[derive(Clone, Debug, Default)]
pub struct ConflictIndex {
    /// Every known spend attempt, keyed by the contested outpoint. Two or
    /// more entries under one key is a conflict.
    spends: HashMap<Outpoint, BTreeSet<TransactionId>>,
}

impl ConflictIndex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record that `txid` spends `outpoint`. Idempotent.
    pub fn record_spend(&mut self, outpoint: Outpoint, txid: TransactionId) {
        self.spends.entry(outpoint).or_default().insert(txid);
    }

    /// All transactions known to spend the given outpoint.
    pub fn spenders(&self, outpoint: &Outpoint) -> impl Iterator<Item = TransactionId> + '_ {
        self.spends.get(outpoint).into_iter().flatten().copied()
    }

    /// Whether any known transaction spends the given outpoint.
    pub fn is_spent(&self, outpoint: &Outpoint) -> bool {
        self.spends.get(outpoint).is_some_and(|s| !s.is_empty())
    }

    /// Drop `txid` from every bucket. Only used when a record is forgotten
    /// outright; confirmed history is never unindexed.
    pub fn remove(&mut self, txid: TransactionId) {
        self.spends.retain(|_, spenders| {
            spenders.remove(&txid);
            !spenders.is_empty()
        });
    }

    /// Transactions spending any output produced by `txid`.
    pub(crate) fn children_of(&self, txid: TransactionId) -> BTreeSet<TransactionId> {
        self.spends
            .iter()
            .filter(|(outpoint, _)| outpoint.txid == txid)
            .flat_map(|(_, spenders)| spenders.iter().copied())
            .collect()
    }

    /// The full conflict set of `txid`: every known transaction that cannot
    /// be valid together with it.
    ///
    /// Two transactions conflict directly when they spend a common outpoint.
    /// Conflict is inherited along spends: a transaction spending an output
    /// of a conflicted parent conflicts with everything the parent conflicts
    /// with, and the descendants of a conflicting transaction conflict right
    /// back. The walk is a BFS over both edge kinds, bounded by the number
    /// of indexed transactions.
    ///
    /// `inputs_of` resolves a known transaction id to its input outpoints;
    /// returning `None` marks the id as foreign (not in the wallet's arena),
    /// which ends ancestor traversal at that edge.
    pub fn conflict_set<F>(&self, txid: TransactionId, inputs_of: F) -> BTreeSet<TransactionId>
    where
        F: Fn(TransactionId) -> Option<Vec<Outpoint>>,
    {
        // `txid` and every known ancestor of it
        let mut lineage: BTreeSet<TransactionId> = BTreeSet::new();
        let mut queue: VecDeque<TransactionId> = VecDeque::new();
        queue.push_back(txid);
        lineage.insert(txid);
        while let Some(current) = queue.pop_front() {
            let Some(inputs) = inputs_of(current) else {
                continue;
            };
            for input in inputs {
                if inputs_of(input.txid).is_some() && lineage.insert(input.txid) {
                    queue.push_back(input.txid);
                }
            }
        }

        // direct conflicts of anything in the lineage
        let mut conflicts: BTreeSet<TransactionId> = BTreeSet::new();
        let mut frontier: VecDeque<TransactionId> = VecDeque::new();
        for member in &lineage {
            let Some(inputs) = inputs_of(*member) else {
                continue;
            };
            for input in inputs {
                for spender in self.spenders(&input) {
                    if !lineage.contains(&spender) && conflicts.insert(spender) {
                        frontier.push_back(spender);
                    }
                }
            }
        }

        // descendants of every conflicting transaction conflict as well
        while let Some(current) = frontier.pop_front() {
            for child in self.children_of(current) {
                if !lineage.contains(&child) && conflicts.insert(child) {
                    frontier.push_back(child);
                }
            }
        }

        conflicts
    }
}
