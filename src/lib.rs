//! Wallet-side transaction lifecycle tracking.
//!
//! tidewatch maintains, for every transaction a wallet has created or
//! received, a derived state consistent with an external, reorganizable
//! ledger and an external, replaceable mempool. On top of that state it
//! computes spendable balances and enforces the version-3 ("TRUC") package
//! admission policy when coins are selected for new transactions.
//!
//! The ledger, mempool, script validation and key management are
//! collaborators, not components: they appear only as the
//! [`LedgerEvent`](models::state::ledger_event::LedgerEvent) stream and the
//! [`OwnershipOracle`](models::state::wallet::OwnershipOracle) seam.
//!
//! Entry points:
//! - [`WalletState`](models::state::wallet::wallet_state::WalletState), the
//!   store and every query.
//! - [`WalletStateLock`](models::state::WalletStateLock), a shared handle
//!   serializing event application against concurrent queries.

pub mod config_models;
pub mod logger;
pub mod models;

#[cfg(test)]
pub mod tests;
