use std::cmp::Ordering;
use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use super::transaction::Transaction;

/// Height of a block in the canonical chain. Genesis is height 0.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn genesis() -> Self {
        Self(0)
    }

    pub fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn previous(&self) -> Option<Self> {
        if self.is_genesis() {
            None
        } else {
            Some(Self(self.0 - 1))
        }
    }

    /// Subtract a number from a block height.
    pub fn checked_sub(&self, v: u64) -> Option<Self> {
        self.0.checked_sub(v).map(Self)
    }

    /// Number of confirmations a transaction mined at this height has when
    /// the given height is the chain tip. One-based: a transaction in the
    /// tip block has one confirmation.
    pub fn confirmations_at_tip(&self, tip: BlockHeight) -> u64 {
        tip.0.saturating_sub(self.0) + 1
    }
}

impl From<u64> for BlockHeight {
    fn from(height: u64) -> Self {
        Self(height)
    }
}

impl From<BlockHeight> for u64 {
    fn from(height: BlockHeight) -> Self {
        height.0
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The slice of a block that the wallet consumes: its height and the
/// transactions it contains, in block order. Header fields, proof data and
/// the consensus-validity question live with the ledger collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(height: BlockHeight, transactions: Vec<Transaction>) -> Self {
        Self {
            height,
            transactions,
        }
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height.cmp(&other.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_count_is_one_based() {
        let confirming: BlockHeight = 100.into();
        assert_eq!(1, confirming.confirmations_at_tip(100.into()));
        assert_eq!(9, confirming.confirmations_at_tip(108.into()));
    }

    #[test]
    fn genesis_has_no_previous() {
        assert_eq!(None, BlockHeight::genesis().previous());
        assert_eq!(BlockHeight::genesis(), BlockHeight::from(1).previous().unwrap());
    }
}
