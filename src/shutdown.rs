use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Host-exposed registration point for work that must run before the host
/// process exits.
///
/// Finalizers are spawned as background tasks that sleep until `trigger`
/// fires; `trigger` then blocks until every finalizer completes. A
/// finalizer receives a cooperative abort token and should stop early when
/// it fires: `request_abort` cancels that token so a stuck finalizer can
/// be abandoned, without any guarantee about the work it was doing.
pub struct ShutdownCoordinator {
    shutdown: CancellationToken,
    abort: CancellationToken,
    finalizers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
            finalizers: Mutex::new(Vec::new()),
        }
    }

    /// Register a finalizer to run once the host begins shutting down.
    ///
    /// There is no deregistration: a finalizer fires at most once, at
    /// process end.
    pub fn register<F, Fut>(&self, finalizer: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let abort = self.abort.clone();
        let handle = tokio::spawn(async move {
            shutdown.cancelled().await;
            finalizer(abort).await;
        });
        self.finalizers.lock().unwrap().push(handle);
    }

    /// Fire all registered finalizers and wait for them to complete.
    pub async fn trigger(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.finalizers.lock().unwrap().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Shutdown finalizer failed: {}", e);
            }
        }
    }

    /// Cooperatively cancel finalizers that are still waiting on something.
    pub fn request_abort(&self) {
        self.abort.cancel();
    }
}
