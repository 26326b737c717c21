//! Termination signals.
//!
//! SIGINT and SIGTERM both end the session through the ordinary shutdown
//! sequence. [`watch`] installs the handlers up front and turns the first
//! signal into a cancelled token, so every phase of the binary (start-up,
//! settle waits, the control loop) can observe it.

// Standard library imports
use std::future::Future;
use std::io;

// External crate imports
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Register the handlers now; the returned future resolves with the name of
/// the first signal received.
#[cfg(unix)]
fn first_signal() -> io::Result<impl Future<Output = io::Result<&'static str>>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => Ok::<_, io::Error>("SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    })
}

#[cfg(not(unix))]
fn first_signal() -> io::Result<impl Future<Output = io::Result<&'static str>>> {
    Ok(async { tokio::signal::ctrl_c().await.map(|()| "ctrl-c") })
}

/// Install the handlers and return a token cancelled on the first signal.
///
/// Must be called from inside the runtime.
pub fn watch() -> io::Result<CancellationToken> {
    let received = first_signal()?;
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        match received.await {
            Ok(signal) => info!(signal, "termination signal received"),
            Err(e) => warn!(error = %e, "signal listener failed, shutting down"),
        }
        cancel.cancel();
    });
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watch_is_quiet_without_signals() {
        let token = watch().unwrap();
        tokio::task::yield_now().await;
        assert!(!token.is_cancelled());
    }
}
