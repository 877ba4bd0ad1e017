use serde::Deserialize;
use serde::Serialize;

use crate::models::blockchain::amount::Amount;

/// represents the three native-currency wallet balances that tidewatch
/// tracks.
///
/// naming: trusted vs untrusted_pending:
///
/// `trusted` includes confirmed coins plus unconfirmed change: coins whose
/// whole unconfirmed ancestry was built by this wallet from its own inputs.
///
/// `untrusted_pending` is unconfirmed incoming value: mempool-resident, but
/// with at least one input the wallet cannot vouch for.
///
/// `immature` is coinbase value that has not yet reached maturity depth.
///
/// Conflicted, inactive and abandoned transactions contribute to no bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalances {
    /// balance of confirmed coins and trusted unconfirmed change
    pub trusted: Amount,

    /// balance of unconfirmed, not-yet-vouched-for incoming coins
    pub untrusted_pending: Amount,

    /// balance of coinbase outputs below maturity depth
    pub immature: Amount,
}

impl std::fmt::Display for WalletBalances {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "\
            trusted: {}\n\
            untrusted pending: {}\n\
            immature: {}\n",
            self.trusted, self.untrusted_pending, self.immature,
        )
    }
}
