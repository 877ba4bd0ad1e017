pub mod ledger_event;
pub mod truc_policy;
pub mod wallet;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::sync::RwLockReadGuard;
use tokio::sync::RwLockWriteGuard;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

use self::ledger_event::LedgerEvent;
use self::wallet::balance::WalletBalances;
use self::wallet::wallet_state::WalletState;

/// `WalletStateLock` holds an [`RwLock`](tokio::sync::RwLock) over
/// [`WalletState`].
///
/// All reads and writes of wallet state go through this lock.
///
/// Having a single lock is useful for a few reasons:
///  1. Enables write serialization over the whole store: one ledger event
///     is applied in full, conflict-set ripple included, before anything
///     else can look.
///  2. Readers see a consistent view of data.
///  3. makes it easy to reason about locking.
///
/// Usage conventions:
///
/// ```text
/// // read guard naming:
/// let wallet_state = wallet_state_lock.lock_guard().await;
///
/// // write guard naming:
/// let wallet_state_mut = wallet_state_lock.lock_guard_mut().await;
/// ```
///
/// When using a read-guard or write-guard, always drop it as soon as
/// possible. Failure to do so can result in poor concurrency or deadlock.
#[derive(Clone, Debug)]
pub struct WalletStateLock {
    wallet_state_lock: Arc<RwLock<WalletState>>,
}

impl WalletStateLock {
    pub fn from_wallet_state(wallet_state: WalletState) -> Self {
        Self {
            wallet_state_lock: Arc::new(RwLock::new(wallet_state)),
        }
    }

    pub async fn lock_guard(&self) -> RwLockReadGuard<'_, WalletState> {
        self.wallet_state_lock.read().await
    }

    pub async fn lock_guard_mut(&self) -> RwLockWriteGuard<'_, WalletState> {
        self.wallet_state_lock.write().await
    }

    /// Current balances against a consistent snapshot.
    pub async fn get_balances(&self) -> WalletBalances {
        self.lock_guard().await.get_balances()
    }

    /// Apply a single ledger event under the write lock.
    pub async fn handle_ledger_event(&self, event: LedgerEvent) {
        self.lock_guard_mut().await.handle_ledger_event(event);
    }

    /// Spawn the event pump: drain the ledger feed, applying each event
    /// atomically under the write lock, until the sender side closes.
    ///
    /// Events are strictly ordered by the feed; the pump preserves that
    /// order by holding the write guard across one full application.
    pub fn spawn_event_feed(&self, mut events: mpsc::Receiver<LedgerEvent>) -> JoinHandle<()> {
        let wallet_state_lock = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!("applying ledger event: {event:?}");
                wallet_state_lock.handle_ledger_event(event).await;
            }
            info!("ledger event feed closed; wallet event pump exiting");
        })
    }
}
