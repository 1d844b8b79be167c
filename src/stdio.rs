use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Shared handle to the keeper's informational output sink.
pub struct KeeperStdOut(Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>);

impl Clone for KeeperStdOut {
    fn clone(&self) -> Self {
        KeeperStdOut(self.0.clone())
    }
}

impl KeeperStdOut {
    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    pub fn new(t: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> KeeperStdOut {
        KeeperStdOut(Arc::new(Mutex::new(t)))
    }

    pub async fn print(&self, message: &str) {
        self.write_all(message.as_bytes()).await;
    }

    pub async fn write_all(&self, bytes: &[u8]) {
        let mut lock = self.0.lock().await;
        let _ = lock.write_all(bytes).await;
        let _ = lock.flush().await;
    }
}

/// Shared handle to the keeper's error output sink.
pub struct KeeperStdErr(Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>);

impl Clone for KeeperStdErr {
    fn clone(&self) -> Self {
        KeeperStdErr(self.0.clone())
    }
}

impl KeeperStdErr {
    pub fn stderr() -> Self {
        Self::new(Box::new(tokio::io::stderr()))
    }

    pub fn new(t: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> KeeperStdErr {
        KeeperStdErr(Arc::new(Mutex::new(t)))
    }

    pub async fn write_all(&self, bytes: &[u8]) {
        let mut lock = self.0.lock().await;
        let _ = lock.write_all(bytes).await;
        let _ = lock.flush().await;
    }
}
