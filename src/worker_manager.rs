//! Container that creates [`Worker`](crate::worker::Worker) instances and owns the async
//! executor thread they all run on.

use crate::worker::{CreateWorkerError, Worker, WorkerSettings};
use async_executor::Executor;
use async_oneshot::Sender;
use futures_lite::future;
use log::debug;
use std::sync::Arc;

struct Inner {
    executor: Arc<Executor<'static>>,
    /// Dropped together with the last worker manager handle to stop the thread created in
    /// `WorkerManager::new()`.
    _stop_sender: Option<Sender<()>>,
}

/// Creates workers and owns the executor their channels and callbacks run on.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<Inner>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    /// Create a new worker manager, internally a new thread with an executor is created.
    pub fn new() -> Self {
        let executor = Arc::new(Executor::new());
        let (stop_sender, stop_receiver) = async_oneshot::oneshot::<()>();
        std::thread::Builder::new()
            .name("worker-manager".to_string())
            .spawn({
                let executor = Arc::clone(&executor);

                move || {
                    let _ = future::block_on(executor.run(stop_receiver));
                }
            })
            .expect("failed to spawn worker-manager thread");

        Self {
            inner: Arc::new(Inner {
                executor,
                _stop_sender: Some(stop_sender),
            }),
        }
    }

    /// Create a new worker manager that uses an externally managed executor.
    pub fn with_executor(executor: Arc<Executor<'static>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                _stop_sender: None,
            }),
        }
    }

    /// Create a worker with the given settings.
    ///
    /// Resolves once the worker subprocess has reported itself as running; fails if the
    /// subprocess could not be spawned or exited first.
    pub async fn create_worker(
        &self,
        worker_settings: WorkerSettings,
    ) -> Result<Worker, CreateWorkerError> {
        debug!("create_worker()");

        Worker::new(
            Arc::clone(&self.inner.executor),
            worker_settings,
            self.clone(),
        )
        .await
    }
}
