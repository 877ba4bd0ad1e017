use serde::Deserialize;
use serde::Serialize;

use crate::models::blockchain::amount::Amount;
use crate::models::blockchain::block::Block;
use crate::models::blockchain::transaction::Transaction;
use crate::models::blockchain::transaction::TransactionId;

/// Why the mempool collaborator dropped a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum MempoolRemovalReason {
    /// aged out without confirming
    Expired,

    /// a higher-fee version of the same spend took its slot
    Replaced { by: TransactionId },

    /// a conflicting spend (sibling eviction, block inclusion of a
    /// competitor, ...) invalidated it
    Conflicted { by: TransactionId },
}

/// One notification from the ledger/mempool collaborator.
///
/// Events arrive strictly ordered; the wallet applies each one atomically
/// under its write lock before looking at the next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// a block was connected to the tip of the canonical chain
    BlockConnected { block: Block },

    /// the former tip block was disconnected during a reorganization
    BlockDisconnected { block: Block },

    /// a transaction was accepted into the mempool
    TxAddedToMempool {
        transaction: Transaction,
        fee: Amount,
    },

    /// a transaction left the mempool without confirming
    TxRemovedFromMempool {
        txid: TransactionId,
        reason: MempoolRemovalReason,
    },
}
