//! The wallet transaction store and the event application logic that keeps
//! it consistent with the external ledger and mempool.
//!
//! The store is the sole owner of all [`TransactionRecord`]s, kept in an
//! arena keyed by transaction id. The conflict index holds only
//! back-references into that arena. Every mutation enters through
//! [`WalletState::handle_ledger_event`] (or the two user-invoked operations,
//! abandon and forget), and each event is applied in full before any query
//! can observe the store.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use itertools::Itertools;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::balance::WalletBalances;
use super::conflict_index::ConflictIndex;
use super::error::FundingError;
use super::error::PolicyError;
use super::error::WalletError;
use super::transaction_record::TransactionRecord;
use super::transaction_record::TxOrigin;
use super::transaction_record::TxState;
use super::transaction_summary::TransactionSummary;
use super::transaction_summary::UnspentOutput;
use super::OwnershipOracle;
use crate::config_models::wallet_configuration::WalletConfiguration;
use crate::models::blockchain::amount::Amount;
use crate::models::blockchain::block::Block;
use crate::models::blockchain::block::BlockHeight;
use crate::models::blockchain::transaction::Outpoint;
use crate::models::blockchain::transaction::Transaction;
use crate::models::blockchain::transaction::TransactionId;
use crate::models::blockchain::transaction::TxVersion;
use crate::models::state::ledger_event::LedgerEvent;
use crate::models::state::ledger_event::MempoolRemovalReason;
use crate::models::state::truc_policy;
use crate::models::state::truc_policy::AdmissionVerdict;
use crate::models::state::truc_policy::FundingOptions;

#[derive(Debug)]
pub struct WalletState {
    configuration: WalletConfiguration,

    oracle: Box<dyn OwnershipOracle>,

    /// All transaction records, living and dead. Append-only except for
    /// [`Self::forget_transaction`].
    records: HashMap<TransactionId, TransactionRecord>,

    /// Outpoint → spender back-references into `records`.
    spend_index: ConflictIndex,

    /// Current canonical chain tip, fed in by block events. Explicit state
    /// so confirmation counts are computable without a live chain.
    tip_height: BlockHeight,
}

impl WalletState {
    pub fn new(configuration: WalletConfiguration, oracle: Box<dyn OwnershipOracle>) -> Self {
        Self {
            configuration,
            oracle,
            records: HashMap::new(),
            spend_index: ConflictIndex::new(),
            tip_height: BlockHeight::genesis(),
        }
    }

    pub fn configuration(&self) -> &WalletConfiguration {
        &self.configuration
    }

    pub fn tip_height(&self) -> BlockHeight {
        self.tip_height
    }

    pub(crate) fn record(&self, txid: TransactionId) -> Option<&TransactionRecord> {
        self.records.get(&txid)
    }

    pub(crate) fn spenders_of(
        &self,
        outpoint: &Outpoint,
    ) -> impl Iterator<Item = TransactionId> + '_ {
        self.spend_index.spenders(outpoint)
    }

    /// Mempool-resident transactions spending any output of `txid`.
    pub(crate) fn mempool_children(&self, txid: TransactionId) -> Vec<TransactionId> {
        self.spend_index
            .children_of(txid)
            .into_iter()
            .filter(|child| self.records.get(child).is_some_and(|r| r.in_mempool))
            .collect()
    }

    // ---- event application ----

    /// Apply one ledger/mempool notification. Never fails: unknown parents
    /// are created lazily, irrelevant transactions are skipped with a trace.
    pub fn handle_ledger_event(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::BlockConnected { block } => self.update_with_connected_block(&block),
            LedgerEvent::BlockDisconnected { block } => {
                self.update_with_disconnected_block(&block)
            }
            LedgerEvent::TxAddedToMempool { transaction, fee } => {
                self.register_mempool_transaction(&transaction, fee)
            }
            LedgerEvent::TxRemovedFromMempool { txid, reason } => {
                self.register_mempool_removal(txid, &reason)
            }
        }
    }

    /// Register a transaction built by this wallet, before broadcast. The
    /// mempool acceptance (or rejection) still arrives as a ledger event.
    pub fn add_created_transaction(&mut self, transaction: &Transaction, fee: Amount) {
        self.upsert_record(transaction, TxOrigin::Created);
        if let Some(record) = self.records.get_mut(&transaction.txid) {
            record.fee = Some(fee);
        }
    }

    fn update_with_connected_block(&mut self, block: &Block) {
        if block.height <= self.tip_height && !self.tip_height.is_genesis() {
            warn!(
                "connected block at height {} does not extend tip {}",
                block.height, self.tip_height
            );
        }

        for transaction in &block.transactions {
            if !self.is_relevant(transaction) {
                debug!("block tx {} does not involve wallet; skipping", transaction.txid);
                continue;
            }

            self.upsert_record(transaction, TxOrigin::Received);
            if let Some(record) = self.records.get_mut(&transaction.txid) {
                record.mark_confirmed(block.height);
            }
            info!(
                "tx {} confirmed at height {}",
                transaction.txid, block.height
            );

            // Everything competing with the confirmed transaction lost; no
            // mempool can keep holding it.
            for loser in self.conflict_set(transaction.txid) {
                if let Some(record) = self.records.get_mut(&loser) {
                    if record.confirmed_in_block.is_none() && record.in_mempool {
                        record.mark_mempool_exit();
                        info!(
                            "tx {loser} left mempool: conflicts with confirmed tx {}",
                            transaction.txid
                        );
                    }
                }
            }
        }

        self.tip_height = block.height;
    }

    fn update_with_disconnected_block(&mut self, block: &Block) {
        if block.height != self.tip_height {
            warn!(
                "disconnected block height {} is not the tip {}",
                block.height, self.tip_height
            );
        }

        for transaction in &block.transactions {
            let Some(record) = self.records.get_mut(&transaction.txid) else {
                continue;
            };
            if record.confirmed_in_block == Some(block.height) {
                record.mark_unconfirmed();
                info!(
                    "tx {} unconfirmed by disconnect of block {}",
                    transaction.txid, block.height
                );
            }
        }

        self.tip_height = block.height.previous().unwrap_or(BlockHeight::genesis());
    }

    fn register_mempool_transaction(&mut self, transaction: &Transaction, fee: Amount) {
        if !self.is_relevant(transaction) {
            debug!(
                "mempool tx {} does not involve wallet; skipping",
                transaction.txid
            );
            return;
        }

        self.upsert_record(transaction, TxOrigin::Received);
        if let Some(record) = self.records.get_mut(&transaction.txid) {
            record.mark_mempool_entry();
            record.fee = Some(fee);
        }
        info!("tx {} entered mempool", transaction.txid);

        // Mempool-resident members of the new transaction's conflict set
        // lose their slot. The mempool collaborator reports the same
        // removals; applying them here keeps the store consistent whichever
        // notification arrives first.
        for loser in self.conflict_set(transaction.txid) {
            let Some(record) = self.records.get_mut(&loser) else {
                continue;
            };
            if record.confirmed_in_block.is_none() && record.in_mempool {
                record.mark_mempool_exit();
                record.mempool_conflicts.insert(transaction.txid);
                info!("tx {loser} evicted from mempool by conflicting tx {}", transaction.txid);
            }
        }

        // Sibling eviction: a second child of a version-3 parent takes the
        // single descendant slot from a lower-fee first child, without
        // spending the same outpoint.
        self.evict_lower_fee_siblings(transaction, fee);
    }

    fn evict_lower_fee_siblings(&mut self, transaction: &Transaction, fee: Amount) {
        if !transaction.version.is_truc() {
            return;
        }

        let parents = transaction
            .inputs
            .iter()
            .map(|input| input.txid)
            .filter(|parent| {
                self.records
                    .get(parent)
                    .is_some_and(|r| r.version().is_truc() && r.in_mempool)
            })
            .unique()
            .collect_vec();

        for parent in parents {
            for sibling in self.mempool_children(parent) {
                if sibling == transaction.txid {
                    continue;
                }
                let outbid = self
                    .records
                    .get(&sibling)
                    .is_some_and(|r| truc_policy::feerate_exceeds(fee, transaction.vsize, r));
                if outbid {
                    if let Some(record) = self.records.get_mut(&sibling) {
                        record.mark_mempool_exit();
                        record.mempool_conflicts.insert(transaction.txid);
                        info!(
                            "tx {sibling} evicted from mempool: sibling {} outbid it under parent {parent}",
                            transaction.txid
                        );
                    }
                }
            }
        }
    }

    fn register_mempool_removal(&mut self, txid: TransactionId, reason: &MempoolRemovalReason) {
        let Some(record) = self.records.get_mut(&txid) else {
            debug!("mempool removal for unknown tx {txid}; skipping");
            return;
        };

        record.mark_mempool_exit();
        match reason {
            MempoolRemovalReason::Expired => {
                info!("tx {txid} expired from mempool");
            }
            MempoolRemovalReason::Replaced { by } | MempoolRemovalReason::Conflicted { by } => {
                record.mempool_conflicts.insert(*by);
                info!("tx {txid} removed from mempool, displaced by {by}");
            }
        }
    }

    // ---- record ingestion ----

    /// Whether the wallet must track this transaction: it pays the wallet,
    /// spends the wallet's coins, or competes with a tracked transaction.
    fn is_relevant(&self, transaction: &Transaction) -> bool {
        if self.records.contains_key(&transaction.txid) {
            return true;
        }
        if transaction
            .outputs
            .iter()
            .any(|output| self.oracle.is_mine(output))
        {
            return true;
        }
        transaction
            .inputs
            .iter()
            .any(|input| self.owns_outpoint(input) || self.spend_index.is_spent(input))
    }

    fn owns_outpoint(&self, outpoint: &Outpoint) -> bool {
        self.records
            .get(&outpoint.txid)
            .is_some_and(|record| record.owns_output(outpoint.index))
    }

    /// Create the record if absent, resolving output ownership through the
    /// oracle, and (re-)index its spends. Idempotent.
    fn upsert_record(&mut self, transaction: &Transaction, origin: TxOrigin) {
        if !self.records.contains_key(&transaction.txid) {
            let owned_outputs: BTreeMap<u32, Amount> = transaction
                .outputs
                .iter()
                .enumerate()
                .filter(|(_, output)| self.oracle.is_mine(output))
                .map(|(index, output)| (index as u32, output.value))
                .collect();
            debug!(
                "creating record for tx {} ({} owned outputs)",
                transaction.txid,
                owned_outputs.len()
            );
            self.records.insert(
                transaction.txid,
                TransactionRecord::new(transaction.clone(), origin, owned_outputs),
            );
        }

        for input in &transaction.inputs {
            self.spend_index.record_spend(*input, transaction.txid);
        }
    }

    // ---- derived state ----

    /// The full conflict set of a tracked transaction.
    pub fn conflict_set(&self, txid: TransactionId) -> BTreeSet<TransactionId> {
        self.spend_index.conflict_set(txid, |id| {
            self.records.get(&id).map(|r| r.transaction.inputs.clone())
        })
    }

    /// Confirmation height of the best-confirmed member of the conflict
    /// set, if any member is confirmed.
    fn winning_conflict(&self, txid: TransactionId) -> Option<BlockHeight> {
        self.conflict_set(txid)
            .into_iter()
            .filter_map(|member| {
                self.records
                    .get(&member)
                    .and_then(|r| r.confirmed_in_block)
            })
            .min()
    }

    /// Derived lifecycle state, or `None` for untracked ids.
    pub fn tx_state(&self, txid: TransactionId) -> Option<TxState> {
        let record = self.records.get(&txid)?;
        Some(record.derive_state(self.winning_conflict(txid), self.tip_height))
    }

    /// Signed confirmation count, or `None` for untracked ids.
    pub fn confirmations(&self, txid: TransactionId) -> Option<i64> {
        self.tx_state(txid)
            .map(|state| state.confirmations(self.tip_height))
    }

    /// Conflicting transactions currently resident in the mempool. Always
    /// empty for a transaction that is itself confirmed or mempool-resident.
    pub fn mempool_conflicts(&self, txid: TransactionId) -> Vec<TransactionId> {
        let Some(record) = self.records.get(&txid) else {
            return vec![];
        };
        if record.confirmed_in_block.is_some() || record.in_mempool {
            return vec![];
        }

        self.conflict_set(txid)
            .into_iter()
            .chain(record.mempool_conflicts.iter().copied())
            .filter(|id| self.records.get(id).is_some_and(|r| r.in_mempool))
            .unique()
            .sorted()
            .collect_vec()
    }

    /// Whether a spend by `spender` makes its input coins unavailable.
    ///
    /// Live transactions bind their inputs, and so does an inactive
    /// transaction awaiting re-broadcast, unless something else holds its
    /// mempool slot. Conflicted and abandoned spenders release their coins.
    fn spend_is_binding(&self, spender: TransactionId) -> bool {
        match self.tx_state(spender) {
            Some(TxState::Confirmed { .. }) | Some(TxState::InMempool) => true,
            Some(TxState::Inactive) => self.mempool_conflicts(spender).is_empty(),
            Some(TxState::Conflicted { .. }) | Some(TxState::Abandoned) | None => false,
        }
    }

    fn output_is_spent(&self, outpoint: &Outpoint) -> bool {
        self.spend_index
            .spenders(outpoint)
            .any(|spender| self.spend_is_binding(spender))
    }

    /// Trusted-pending predicate: a mempool transaction whose entire
    /// unconfirmed ancestry was built from this wallet's own coins.
    fn is_trusted_unconfirmed(&self, txid: TransactionId) -> bool {
        let mut visited = HashSet::new();
        self.is_trusted_inner(txid, &mut visited)
    }

    fn is_trusted_inner(&self, txid: TransactionId, visited: &mut HashSet<TransactionId>) -> bool {
        if !visited.insert(txid) {
            // revisiting along another path; the first visit decides
            return true;
        }
        let Some(record) = self.records.get(&txid) else {
            return false;
        };
        match record.derive_state(self.winning_conflict(txid), self.tip_height) {
            TxState::Confirmed { .. } => return true,
            TxState::InMempool => {}
            _ => return false,
        }
        record.transaction.inputs.iter().all(|input| {
            self.records
                .get(&input.txid)
                .is_some_and(|parent| parent.owns_output(input.index))
                && self.is_trusted_inner(input.txid, visited)
        })
    }

    fn is_immature_coinbase(&self, record: &TransactionRecord, state: &TxState) -> bool {
        let TxState::Confirmed { height } = state else {
            return false;
        };
        record.is_coinbase()
            && height.confirmations_at_tip(self.tip_height)
                < self.configuration.coinbase_maturity
    }

    // ---- queries ----

    /// Fold all wallet-owned unspent outputs into balance buckets, keyed by
    /// the owning transaction's derived state.
    pub fn get_balances(&self) -> WalletBalances {
        let mut balances = WalletBalances::default();

        for (txid, record) in &self.records {
            let state = record.derive_state(self.winning_conflict(*txid), self.tip_height);
            let bucket: &mut Amount = match state {
                TxState::Confirmed { .. } if self.is_immature_coinbase(record, &state) => {
                    &mut balances.immature
                }
                TxState::Confirmed { .. } => &mut balances.trusted,
                TxState::InMempool if self.is_trusted_unconfirmed(*txid) => &mut balances.trusted,
                TxState::InMempool => &mut balances.untrusted_pending,
                TxState::Conflicted { .. } | TxState::Inactive | TxState::Abandoned => continue,
            };

            for (outpoint, value) in record.owned_outpoints() {
                if !self.output_is_spent(&outpoint) {
                    *bucket += value;
                }
            }
        }

        balances
    }

    /// All spendable wallet coins with at least `min_conf` confirmations.
    ///
    /// With `min_conf == 0`, mempool-resident transactions' outputs are
    /// included (untrusted ones only when `include_unsafe` is set). Immature
    /// coinbase outputs and coins of conflicted, inactive or abandoned
    /// transactions never appear.
    pub fn list_unspent(&self, min_conf: i64, include_unsafe: bool) -> Vec<UnspentOutput> {
        let mut coins = vec![];

        for (txid, record) in &self.records {
            let state = record.derive_state(self.winning_conflict(*txid), self.tip_height);
            let confirmations = state.confirmations(self.tip_height);
            match state {
                TxState::Confirmed { .. } => {
                    if confirmations < min_conf || self.is_immature_coinbase(record, &state) {
                        continue;
                    }
                }
                TxState::InMempool => {
                    if min_conf > 0 {
                        continue;
                    }
                    if !include_unsafe && !self.is_trusted_unconfirmed(*txid) {
                        continue;
                    }
                }
                _ => continue,
            }

            for (outpoint, value) in record.owned_outpoints() {
                if !self.output_is_spent(&outpoint) {
                    coins.push(UnspentOutput {
                        outpoint,
                        value,
                        state,
                        confirmations,
                    });
                }
            }
        }

        coins.sort_by(|a, b| {
            b.confirmations
                .cmp(&a.confirmations)
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        });
        coins
    }

    /// Full caller-facing view of one tracked transaction.
    pub fn get_transaction(&self, txid: TransactionId) -> Option<TransactionSummary> {
        let record = self.records.get(&txid)?;
        let state = record.derive_state(self.winning_conflict(txid), self.tip_height);

        let amount_spent = record
            .transaction
            .inputs
            .iter()
            .filter_map(|input| {
                self.records
                    .get(&input.txid)
                    .and_then(|parent| parent.owned_outputs.get(&input.index))
            })
            .copied()
            .sum();

        Some(TransactionSummary {
            txid,
            state,
            confirmations: state.confirmations(self.tip_height),
            block_height: record.confirmed_in_block,
            origin: record.origin,
            fee: record.fee,
            amount_received: record.received_value(),
            amount_spent,
            wallet_conflicts: self.conflict_set(txid).into_iter().collect(),
            mempool_conflicts: self.mempool_conflicts(txid),
        })
    }

    // ---- user operations ----

    /// Mark an inactive transaction as abandoned, releasing its inputs for
    /// re-spending. Mempool-resident, confirmed and conflicted transactions
    /// are not eligible.
    pub fn abandon_transaction(&mut self, txid: TransactionId) -> Result<(), WalletError> {
        let state = self
            .tx_state(txid)
            .ok_or(WalletError::UnknownTransaction(txid))?;
        if !state.is_inactive() {
            return Err(WalletError::NotEligible(txid));
        }

        let record = self.records.get_mut(&txid).ok_or_else(|| {
            WalletError::InternalInconsistency(format!(
                "tx {txid} has a derived state but no record"
            ))
        })?;
        record.abandoned = true;
        info!("tx {txid} abandoned");
        Ok(())
    }

    /// Drop an abandoned record and its index entries entirely. Cleanup
    /// escape hatch; confirmed history is never forgettable.
    pub fn forget_transaction(&mut self, txid: TransactionId) -> Result<(), WalletError> {
        let state = self
            .tx_state(txid)
            .ok_or(WalletError::UnknownTransaction(txid))?;
        if !state.is_abandoned() {
            return Err(WalletError::NotEligible(txid));
        }

        self.records.remove(&txid);
        self.spend_index.remove(txid);
        info!("tx {txid} forgotten");
        Ok(())
    }

    // ---- transaction construction support ----

    /// Validate a candidate transaction against the version-topology policy
    /// and compute which mempool transactions it must evict.
    pub fn validate_for_admission(
        &self,
        candidate: &Transaction,
        fee: Amount,
    ) -> Result<AdmissionVerdict, PolicyError> {
        truc_policy::validate_for_admission(self, candidate, fee)
    }

    /// Choose wallet coins funding a transaction of the given version.
    ///
    /// `base_vsize` is the candidate's virtual size before any input is
    /// attached. Confirmed coins are preferred; unconfirmed coins must match
    /// the target version, and a version-3 target draws unconfirmed coins
    /// from at most one parent whose descendant slot is free.
    pub fn select_funding_inputs(
        &self,
        target_version: TxVersion,
        target_amount: Amount,
        base_vsize: u64,
        options: &FundingOptions,
    ) -> Result<Vec<Outpoint>, FundingError> {
        truc_policy::select_funding_inputs(
            self,
            target_version,
            target_amount,
            base_vsize,
            options,
        )
    }

    /// Spendable coins eligible as funding candidates, split into confirmed
    /// coins and unconfirmed coins grouped by producing transaction.
    pub(crate) fn funding_candidates(
        &self,
        target_version: TxVersion,
        include_unsafe: bool,
    ) -> FundingCandidates {
        let mut confirmed = vec![];
        let mut unconfirmed_by_parent: BTreeMap<TransactionId, UnconfirmedParent> =
            BTreeMap::new();

        for (txid, record) in &self.records {
            let state = record.derive_state(self.winning_conflict(*txid), self.tip_height);
            match state {
                TxState::Confirmed { .. } => {
                    if self.is_immature_coinbase(record, &state) {
                        continue;
                    }
                    for (outpoint, value) in record.owned_outpoints() {
                        if !self.output_is_spent(&outpoint) {
                            confirmed.push((outpoint, value));
                        }
                    }
                }
                TxState::InMempool => {
                    // Automatic selection quietly skips version-mismatched
                    // unconfirmed coins; only pre-selected inputs raise the
                    // mismatch as an error.
                    if record.version() != target_version {
                        continue;
                    }
                    if !include_unsafe && !self.is_trusted_unconfirmed(*txid) {
                        continue;
                    }
                    if target_version.is_truc() {
                        // the parent's package must have room for the child
                        // this selection is funding
                        let parent_has_parent = record.transaction.inputs.iter().any(|input| {
                            self.records
                                .get(&input.txid)
                                .is_some_and(|r| r.in_mempool)
                        });
                        if parent_has_parent || !self.mempool_children(*txid).is_empty() {
                            continue;
                        }
                    }
                    let entry =
                        unconfirmed_by_parent
                            .entry(*txid)
                            .or_insert_with(|| UnconfirmedParent {
                                parent_vsize: record.transaction.vsize,
                                coins: vec![],
                            });
                    for (outpoint, value) in record.owned_outpoints() {
                        if !self.output_is_spent(&outpoint) {
                            entry.coins.push((outpoint, value));
                        }
                    }
                }
                _ => continue,
            }
        }

        unconfirmed_by_parent.retain(|_, parent| !parent.coins.is_empty());
        FundingCandidates {
            confirmed,
            unconfirmed_by_parent,
        }
    }
}

/// Unconfirmed funding coins grouped under their producing transaction.
#[derive(Clone, Debug)]
pub(crate) struct UnconfirmedParent {
    pub parent_vsize: u64,
    pub coins: Vec<(Outpoint, Amount)>,
}

#[derive(Clone, Debug)]
pub(crate) struct FundingCandidates {
    pub confirmed: Vec<(Outpoint, Amount)>,
    pub unconfirmed_by_parent: BTreeMap<TransactionId, UnconfirmedParent>,
}
