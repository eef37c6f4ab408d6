use tracing::{info, warn};

/// User interaction hooks used by [`ListSync`](crate::sync::ListSync)
///
/// A UI implements this to show dialogs. `confirm` and `alert` are expected to
/// block until the user answers or dismisses them.
pub trait Prompt: Send + Sync {
    /// Ask the user to confirm a destructive operation
    fn confirm(&self, message: &str) -> bool;

    /// Report a failure the server reported back
    fn alert(&self, message: &str);

    /// Show a short lived notice after a successful operation
    fn notify(&self, message: &str) {
        let _ = message;
    }
}

/// A prompt for non-interactive use
///
/// Every confirmation is accepted and alerts are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl Prompt for Unattended {
    fn confirm(&self, message: &str) -> bool {
        info!(%message, "auto-confirmed");
        true
    }

    fn alert(&self, message: &str) {
        warn!("{message}");
    }

    fn notify(&self, message: &str) {
        info!("{message}");
    }
}
