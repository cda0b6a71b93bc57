// src/lifecycle.rs
//
// =============================================================================
// N8N-CLI: PROCESS LIFECYCLE
// =============================================================================
//
// Signal handling and ordered shutdown.
//
// - SIGINT / SIGTERM cancel the root context; outstanding HTTP calls and
//   sleeps observe the token and unwind cooperatively.
// - Cleanup (flush, store close) runs under a hard deadline; exceeding it
//   forces termination so a wedged teardown cannot hang the terminal.
// - SIGPIPE is ignored so piping into `head` exits quietly.
// - Exit codes on signals follow POSIX: SIGINT -> 130, SIGTERM -> 143.

use crate::errors::exit;
use std::future::Future;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Lifecycle {
    cancel: CancellationToken,
    cleanup_timeout: Duration,
    signal_code: Arc<AtomicI32>,
}

impl Lifecycle {
    /// Install signal handlers and build the root cancellation context.
    pub fn install(cleanup_timeout_ms: u64) -> Self {
        ignore_sigpipe();

        let cancel = CancellationToken::new();
        let signal_code = Arc::new(AtomicI32::new(0));

        spawn_signal_listener(cancel.clone(), signal_code.clone());

        Self {
            cancel,
            cleanup_timeout: Duration::from_millis(cleanup_timeout_ms),
            signal_code,
        }
    }

    /// A child token for one operation. Cancelling the child does not
    /// affect siblings; a signal cancels them all.
    pub fn token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The exit code mandated by a received signal, if any.
    pub fn signal_exit_code(&self) -> Option<i32> {
        match self.signal_code.load(Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }

    /// Run the ordered teardown under the cleanup deadline. Exceeding the
    /// deadline logs and returns anyway; the caller exits immediately
    /// after, which is the forced termination.
    pub async fn shutdown<F>(self, cleanup: F)
    where
        F: Future<Output = ()>,
    {
        self.cancel.cancel();
        if tokio::time::timeout(self.cleanup_timeout, cleanup)
            .await
            .is_err()
        {
            log::error!(
                "cleanup exceeded its {}ms deadline; terminating",
                self.cleanup_timeout.as_millis()
            );
        }
    }
}

fn spawn_signal_listener(cancel: CancellationToken, signal_code: Arc<AtomicI32>) {
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("cannot listen for SIGINT: {e}");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("cannot listen for SIGTERM: {e}");
                return;
            }
        };

        let code = tokio::select! {
            _ = interrupt.recv() => exit::SIGINT,
            _ = terminate.recv() => exit::SIGTERM,
        };
        log::warn!("interrupt received, cancelling outstanding work");
        signal_code.store(code, Ordering::SeqCst);
        cancel.cancel();
    });

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling outstanding work");
            signal_code.store(exit::SIGINT, Ordering::SeqCst);
            cancel.cancel();
        }
    });
}

#[cfg(unix)]
fn ignore_sigpipe() {
    // SAFETY: setting a signal disposition to SIG_IGN before any threads
    // depend on SIGPIPE semantics is the documented way to survive broken
    // pipes; no Rust-side state is touched.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}
