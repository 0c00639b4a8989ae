//! Termination signal handling.
//!
//! The returned receiver flips to `true` once shutdown is requested. Roles poll it between
//! critical sections, so a signal never interrupts a process while it holds a lock.

use crate::config::SignalPolicy;

use tokio::sync::watch;

pub fn install(policy: SignalPolicy) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut signals = match Signals::register(policy) {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!("Failed to listen for termination signals: {}", e);
                return;
            }
        };

        loop {
            let signal = signals.recv().await;

            match policy {
                SignalPolicy::Graceful => {
                    tracing::info!("Received {}, shutting down gracefully", signal);
                    let _ = tx.send(true);
                    return;
                }
                SignalPolicy::Ignore => {
                    tracing::warn!("Received {}, ignored (--ignore-signals)", signal);
                }
            }
        }
    });

    rx
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    /// Terminal stop (Ctrl-Z). Only intercepted when signals are ignored; otherwise the
    /// process keeps the default job-control behavior.
    suspend: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl Signals {
    fn register(policy: SignalPolicy) -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let suspend = match policy {
            SignalPolicy::Ignore => Some(signal(SignalKind::from_raw(libc::SIGTSTP))?),
            SignalPolicy::Graceful => None,
        };

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            suspend,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
            _ = recv_optional(&mut self.suspend) => "SIGTSTP",
        }
    }
}

#[cfg(unix)]
async fn recv_optional(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register(_policy: SignalPolicy) -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        "Ctrl-C"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_suspend_is_only_intercepted_when_ignoring() {
        let graceful = Signals::register(SignalPolicy::Graceful).unwrap();
        let ignoring = Signals::register(SignalPolicy::Ignore).unwrap();

        assert!(graceful.suspend.is_none());
        assert!(ignoring.suspend.is_some());
    }

    #[tokio::test]
    async fn test_ignored_suspend_is_delivered_to_the_listener() {
        let mut signals = Signals::register(SignalPolicy::Ignore).unwrap();

        // The handler is installed, so the process is not stopped.
        unsafe {
            libc::raise(libc::SIGTSTP);
        }
        let received = tokio::time::timeout(std::time::Duration::from_secs(2), signals.recv())
            .await
            .unwrap();

        assert_eq!(received, "SIGTSTP");
    }
}
