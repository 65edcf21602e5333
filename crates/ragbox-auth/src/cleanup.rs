//! Periodic expiry sweep.
//!
//! Correctness never depends on this task: expired sessions are hidden
//! and removed lazily on read, and expired authorization state fails the
//! callback. The sweep exists so storage for abandoned logins and
//! sessions does not grow without bound — deploy it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::AuthStore;

/// Spawns a background task sweeping expired auth records on an interval.
///
/// The returned handle can be aborted on shutdown; sweep failures are
/// logged and the task keeps running.
pub fn spawn_cleanup(store: Arc<dyn AuthStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match store.cleanup_expired().await {
                Ok(stats) if stats.total() > 0 => {
                    tracing::debug!(
                        states = stats.states_removed,
                        sessions = stats.sessions_removed,
                        "swept expired auth records"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "auth expiry sweep failed");
                }
            }
        }
    })
}
