use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Stop flag shared between the signal handler and the export scheduler.
///
/// Backed by a `watch` channel so a listener created after the request
/// still sees it. A run already in progress is never interrupted; the
/// scheduler only checks the flag between runs.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Raise the flag. Returns true only for the call that raised it.
    pub fn request(&self) -> bool {
        let raised = self.tx.send_if_modified(|stop| !std::mem::replace(stop, true));
        if raised {
            info!("Shutdown requested, no further exports will start");
        }
        raised
    }

    /// Raise the flag once `event` completes.
    pub async fn request_on<F>(&self, event: F)
    where
        F: Future<Output = ()>,
    {
        event.await;
        self.request();
    }

    /// Raise the flag on SIGINT / SIGTERM (Ctrl+C off unix).
    pub async fn request_on_os_signal(&self) {
        self.request_on(os_signal()).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ShutdownSignal`].
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or every signal handle is gone.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Without a handler the process keeps the default signal behaviour, so
/// this only waits forever rather than stopping the scheduler.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn late_listener_sees_earlier_request() {
        let signal = ShutdownSignal::new();
        assert!(signal.request());

        let mut listener = signal.subscribe();
        assert!(listener.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), listener.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_first_request_raises() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_requested());
        assert!(clone.request());
        assert!(!signal.request());
        assert!(signal.is_requested());
    }

    #[tokio::test]
    async fn request_on_waits_for_event() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();
        let (fire, event) = oneshot::channel::<()>();

        let trigger = signal.clone();
        tokio::spawn(async move {
            trigger
                .request_on(async {
                    let _ = event.await;
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!listener.is_stopped());

        fire.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), listener.stopped())
            .await
            .unwrap();
        assert!(signal.is_requested());
    }

    #[tokio::test]
    async fn dropped_signal_releases_listener() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();
        drop(signal);

        tokio::time::timeout(Duration::from_secs(1), listener.stopped())
            .await
            .unwrap();
        assert!(!listener.is_stopped());
    }
}
