// External crates
use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Exit status used when a second Ctrl-C forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Process-wide stop signal, built on top of a `CancellationToken`.
///
/// - Components take a clone of the token via `.token()` and check it
///   cooperatively (the tail loop checks it between polls and while sleeping).
/// - `.trigger()` cancels every clone at once.
/// - `.listen_for_ctrl_c()` wires the first Ctrl-C to `.trigger()`. A second
///   Ctrl-C exits immediately, for when a slow in-flight request is holding up
///   the graceful path.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[instrument(
        name = "ves_tail_shutdown_trigger",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered, cancelling tail loop token");
        self.token.cancel();
    }

    /// Spawn the Ctrl-C listener. The task ends on its own if shutdown is
    /// triggered some other way first.
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.token.cancelled() => return,
                res = signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C signal");
                        return;
                    }
                }
            }

            tracing::info!("Ctrl-C received, stopping after the current request");
            shutdown.trigger();

            if signal::ctrl_c().await.is_ok() {
                tracing::warn!("Second Ctrl-C received, exiting immediately");
                std::process::exit(FORCED_EXIT_CODE);
            }
        })
    }
}
