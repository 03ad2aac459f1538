//! Single-flight operation queue
//!
//! Operations that change device state run one at a time, in the order they
//! were submitted. Each submitter gets its own handle to await the result.

use crate::error::{InstallerError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = BoxFuture<'static, ()>;

/// FIFO queue drained by a single worker task
pub struct OperationQueue {
    sender: flume::Sender<Job>,
    worker: JoinHandle<()>,
}

impl OperationQueue {
    /// Create the queue and spawn its worker. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded::<Job>();
        let worker = tokio::spawn(async move {
            while let Ok(job) = receiver.recv_async().await {
                job.await;
            }
            debug!("Operation queue closed");
        });
        Self { sender, worker }
    }

    /// Enqueue `operation`. The position in the queue is fixed when this returns.
    pub fn submit<F, T>(&self, operation: F) -> QueuedOperation<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("Queued operation panicked: {}", message);
                    Err(InstallerError::OperationPanicked(message))
                }
            };
            // the submitter may have stopped listening
            let _ = tx.send(result);
        });

        if self.sender.send(job).is_err() {
            debug!("Operation submitted to a closed queue");
        }
        QueuedOperation { receiver: rx }
    }

    /// Number of operations waiting to start
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Stop accepting work; queued operations still run
    pub fn close(self) -> JoinHandle<()> {
        drop(self.sender);
        self.worker
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result handle for one queued operation
pub struct QueuedOperation<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Future for QueuedOperation<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(InstallerError::QueueClosed)))
    }
}
