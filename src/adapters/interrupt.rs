//! Ctrl-C handling: trips a [`CancelToken`] from a background listener.

use crate::domain::cancel::CancelToken;
use std::thread;
use tracing::{info, warn};

/// Spawn a thread that cancels `cancel` on the first interrupt signal.
///
/// The listener runs its own current-thread runtime; the rest of the
/// program stays synchronous.
pub fn install_interrupt_handler(cancel: CancelToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("interrupt received, stopping after the current window");
                        cancel.cancel();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for interrupt"),
                }
            });
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installing_does_not_cancel() {
        let cancel = CancelToken::new();
        install_interrupt_handler(cancel.clone()).unwrap();
        assert!(!cancel.is_cancelled());
    }
}
