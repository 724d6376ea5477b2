// ===============================
// src/shutdown.rs
// ===============================
//
// Semua loop jangka panjang di-spawn lewat TaskGroup supaya bisa
// dihentikan dan di-join saat exit.
//
use futures_util::future::join_all;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Cancellation side handed to every loop.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown was requested (or the group is gone).
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

pub struct TaskGroup {
    runtime: Handle,
    tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskGroup {
    /// Must be called from inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        let (tx, _) = watch::channel(false);
        Self { runtime, tx, handles: Mutex::new(Vec::new()) }
    }

    pub fn token(&self) -> Shutdown {
        Shutdown { rx: self.tx.subscribe() }
    }

    /// Spawns `make(token)` on the group's runtime. Callable from any thread.
    pub fn spawn<F, Fut>(&self, make: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = make(self.token());
        let handle = self.runtime.spawn(fut);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flips the flag and waits for every task, including ones spawned while waiting.
    pub async fn shutdown(&self) {
        self.tx.send_replace(true);
        loop {
            let batch: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *handles)
            };
            if batch.is_empty() {
                break;
            }
            debug!(tasks = batch.len(), "joining tasks");
            for res in join_all(batch).await {
                if let Err(e) = res {
                    warn!(?e, "task ended abnormally");
                }
            }
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}
