use serde::Deserialize;
use serde::Serialize;

use super::transaction_record::TxOrigin;
use super::transaction_record::TxState;
use crate::models::blockchain::amount::Amount;
use crate::models::blockchain::block::BlockHeight;
use crate::models::blockchain::transaction::Outpoint;
use crate::models::blockchain::transaction::TransactionId;

/// Caller-facing view of one wallet transaction, the typed equivalent of a
/// `gettransaction` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub txid: TransactionId,
    pub state: TxState,

    /// Positive iff confirmed, negative iff conflicted, zero otherwise.
    pub confirmations: i64,

    pub block_height: Option<BlockHeight>,
    pub origin: TxOrigin,
    pub fee: Option<Amount>,

    /// Value paid to this wallet by the transaction's outputs.
    pub amount_received: Amount,

    /// Wallet-owned value consumed by the transaction's inputs.
    pub amount_spent: Amount,

    /// Every known transaction that cannot be valid together with this one,
    /// in or out of the mempool.
    pub wallet_conflicts: Vec<TransactionId>,

    /// The subset of conflicts currently resident in the mempool. Empty
    /// again as soon as the evicting transaction leaves.
    pub mempool_conflicts: Vec<TransactionId>,
}

/// One spendable coin, as returned by `list_unspent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: Outpoint,
    pub value: Amount,
    pub state: TxState,
    pub confirmations: i64,
}
