use serde::Deserialize;
use serde::Serialize;

use crate::models::state::truc_policy::TRUC_CHILD_MAX_VSIZE;
use crate::models::state::truc_policy::TRUC_MAX_VSIZE;

/// Number of confirmations a coinbase output needs before it may be spent.
pub const COINBASE_MATURITY: u64 = 100;

/// Configuration options for
/// [`WalletState`](crate::models::state::wallet::wallet_state::WalletState).
///
/// Defaults match network policy; the overrides exist so that tests can
/// exercise boundaries without building ten-kilobyte transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfiguration {
    /// Confirmations before a coinbase output matures.
    pub coinbase_maturity: u64,

    /// Maximum virtual size of a version-3 transaction.
    pub truc_max_vsize: u64,

    /// Maximum combined virtual size of a version-3 parent/child package.
    pub truc_child_max_vsize: u64,

    /// Buffered capacity of the ledger-event channel.
    pub event_channel_capacity: usize,
}

impl Default for WalletConfiguration {
    fn default() -> Self {
        Self {
            coinbase_maturity: COINBASE_MATURITY,
            truc_max_vsize: TRUC_MAX_VSIZE,
            truc_child_max_vsize: TRUC_CHILD_MAX_VSIZE,
            event_channel_capacity: 256,
        }
    }
}

impl WalletConfiguration {
    /// Self-consuming constructor-helper.
    pub fn with_coinbase_maturity(mut self, maturity: u64) -> Self {
        self.coinbase_maturity = maturity;
        self
    }

    /// Self-consuming constructor-helper.
    pub fn with_truc_limits(mut self, max_vsize: u64, child_max_vsize: u64) -> Self {
        self.truc_max_vsize = max_vsize;
        self.truc_child_max_vsize = child_max_vsize;
        self
    }
}
