//! Foreground/background visibility hook.
//!
//! Hosts embedding the manager know when their surface regains focus; a
//! connection silently dropped while backgrounded should come back the
//! moment the surface does. The monitor watches a [`Visibility`] channel
//! and nudges the manager on each return to the foreground. It never
//! disconnects on backgrounding; idle teardown is the server's call.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::core::ConnectionManager;

// ============================================================================
// Visibility
// ============================================================================

/// Host surface visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The surface is visible and interactive.
    Foreground,

    /// The surface is hidden or minimized.
    Background,
}

impl Visibility {
    /// Returns `true` for the foreground state.
    #[inline]
    #[must_use]
    pub const fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground)
    }
}

// ============================================================================
// VisibilityMonitor
// ============================================================================

/// Reconnects the manager when the host surface returns to foreground.
///
/// Only transitions trigger action: a connect attempt fires when the
/// channel changes to [`Visibility::Foreground`] while the manager is
/// disconnected. Already-connected foregrounds and all background
/// transitions are no-ops. Dropping the monitor stops it.
pub struct VisibilityMonitor {
    task: JoinHandle<()>,
}

impl VisibilityMonitor {
    /// Spawns a monitor over the given visibility channel.
    #[must_use]
    pub fn spawn(manager: ConnectionManager, mut visibility: watch::Receiver<Visibility>) -> Self {
        let task = tokio::spawn(async move {
            while visibility.changed().await.is_ok() {
                let current = *visibility.borrow_and_update();
                if !current.is_foreground() {
                    continue;
                }
                if manager.is_connected() || manager.is_connecting() {
                    continue;
                }

                debug!("Foregrounded while disconnected; reconnecting");
                if let Err(e) = manager.connect().await {
                    warn!(error = %e, "Visibility-triggered connect failed");
                }
            }
            debug!("Visibility monitor stopped");
        });

        Self { task }
    }

    /// Stops the monitor immediately.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for VisibilityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================
