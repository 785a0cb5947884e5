//! Blocking bridge into a background async scheduler.
//!
//! A [`TransportBridge`] owns one OS thread running a single-threaded tokio
//! runtime for its whole lifetime. Synchronous callers (a UI thread, a REPL)
//! hand it futures with [`TransportBridge::submit`] and block until the
//! future settles. All tool-session I/O and endpoint calls therefore live on
//! one cooperative scheduler, whatever thread the caller is on.

use futures::future::BoxFuture;
use std::future::Future;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Job = BoxFuture<'static, ()>;

/// Runs futures on a dedicated current-thread runtime and waits for them
/// from blocking code.
pub struct TransportBridge {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl TransportBridge {
    /// Start the worker thread and its runtime.
    pub fn start() -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(BridgeError::Runtime)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = std::thread::Builder::new()
            .name("toolchat-bridge".to_string())
            .spawn(move || {
                info!("Bridge worker started");
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        // Each job is its own task: a panic fails that job only.
                        tokio::spawn(job);
                    }
                });
                info!("Bridge worker stopped");
            })
            .map_err(BridgeError::Runtime)?;

        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    /// Run `future` on the worker and block the calling thread until it
    /// completes, returning its output.
    ///
    /// Must not be called from inside an async runtime (including from a
    /// future already running on this bridge).
    pub fn submit<F, T>(&self, future: F) -> Result<T, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(BridgeError::Stopped)?;
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = future.await;
            // The caller only goes away if its thread is gone.
            let _ = done_tx.send(output);
        });

        jobs.send(job).map_err(|_| BridgeError::Stopped)?;
        debug!("Job submitted to bridge worker");
        done_rx.blocking_recv().map_err(|_| BridgeError::Cancelled)
    }

    /// Whether the worker still accepts jobs.
    pub fn is_running(&self) -> bool {
        self.jobs.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Stop accepting jobs and join the worker thread.
    ///
    /// Tasks still pending on the runtime when the queue closes are dropped.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Bridge worker thread panicked");
            }
        }
    }
}

impl Drop for TransportBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to start bridge runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("Bridge worker is stopped")]
    Stopped,
    #[error("Operation was cancelled before completing (it panicked or the worker stopped)")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_submit_returns_output() {
        let bridge = TransportBridge::start().unwrap();
        let value = bridge.submit(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_sequential_submissions_keep_order_and_results() {
        let bridge = TransportBridge::start().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let log = log.clone();
            bridge
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push("first");
                    "result-1"
                })
                .unwrap()
        };
        let second = {
            let log = log.clone();
            bridge
                .submit(async move {
                    log.lock().unwrap().push("second");
                    "result-2"
                })
                .unwrap()
        };

        assert_eq!(first, "result-1");
        assert_eq!(second, "result-2");
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_errors_propagate_unchanged() {
        let bridge = TransportBridge::start().unwrap();
        let result: Result<(), String> = bridge
            .submit(async { Err("endpoint unreachable".to_string()) })
            .unwrap();
        assert_eq!(result, Err("endpoint unreachable".to_string()));
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let bridge = TransportBridge::start().unwrap();
        let err = bridge
            .submit(async {
                panic!("job failed");
            })
            .map(|_: ()| ())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));

        assert!(bridge.is_running());
        assert_eq!(bridge.submit(async { "still alive" }).unwrap(), "still alive");
    }

    #[test]
    fn test_jobs_run_on_worker_thread() {
        let bridge = TransportBridge::start().unwrap();
        let name = bridge
            .submit(async { std::thread::current().name().map(String::from) })
            .unwrap();
        assert_eq!(name.as_deref(), Some("toolchat-bridge"));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let mut bridge = TransportBridge::start().unwrap();
        bridge.shutdown();
        bridge.shutdown();
        assert!(!bridge.is_running());
        assert!(matches!(bridge.submit(async { 1 }), Err(BridgeError::Stopped)));
    }
}
