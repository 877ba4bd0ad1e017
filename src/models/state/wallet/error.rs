//! error types for wallet queries, admission policy and funding.

use serde::Deserialize;
use serde::Serialize;

use crate::models::blockchain::amount::Amount;
use crate::models::blockchain::transaction::TransactionId;
use crate::models::blockchain::transaction::TxVersion;

/// enumerates admission-policy violations for a candidate transaction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("can't spend unconfirmed version {input_version} pre-selected input with a version {tx_version} transaction")]
    VersionMismatch {
        input_version: TxVersion,
        tx_version: TxVersion,
    },

    #[error("inputs exceed maximum weight: {vsize} vbytes over limit of {limit}")]
    WeightExceeded { vsize: u64, limit: u64 },

    #[error("version 3 transaction would have too many unconfirmed ancestors")]
    TooManyUnconfirmedAncestors,

    #[error("version 3 parent already has an unconfirmed descendant")]
    DescendantLimit,

    #[error("insufficient fee to evict conflicting sibling {existing}")]
    SiblingFeeTooLow { existing: TransactionId },

    #[error("insufficient fee to replace conflicting mempool transaction {existing}")]
    ReplacementFeeTooLow { existing: TransactionId },

    #[error("maximum transaction weight {max} is less than transaction weight without inputs {base}")]
    MaxWeightBelowBase { max: u64, base: u64 },
}

/// enumerates possible funding-input selection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FundingError {
    #[error(
        "insufficient funds. requested: {}, available: {}",
        requested,
        available
    )]
    InsufficientFunds {
        requested: Amount,
        available: Amount,
    },

    #[error("the inputs size exceeds the maximum weight. try sending a smaller amount or consolidating the wallet's utxos")]
    WeightExceeded,

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// enumerates errors of the wallet store's caller-facing operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WalletError {
    #[error("transaction {0} is not known to this wallet")]
    UnknownTransaction(TransactionId),

    #[error("transaction {0} is not eligible: abandonment requires an inactive transaction")]
    NotEligible(TransactionId),

    #[error("internal wallet inconsistency: {0}")]
    InternalInconsistency(String),

    // catch-all error, eg for anyhow errors
    #[error("wallet operation failed.  reason: {0}")]
    Failed(String),
}

// convert anyhow::Error to a WalletError::Failed.
// note that anyhow Error is not serializable.
impl From<anyhow::Error> for WalletError {
    fn from(e: anyhow::Error) -> Self {
        Self::Failed(e.to_string())
    }
}
