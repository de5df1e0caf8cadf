use std::sync::Arc;

use console::Term;
use repoherd::Shutdown;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C requests a cooperative stop: in-flight git processes
/// finish, nothing new is dispatched, and the failed-task artifact is still
/// written. A second Ctrl+C force quits.
pub(crate) fn setup_shutdown_handler(shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing current operations...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("shutdown requested, finishing current operations");
        }

        shutdown.request();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}
