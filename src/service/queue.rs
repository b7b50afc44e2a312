//! Background work queue.
//!
//! A bounded channel feeding one worker task. `enqueue` waits for room when
//! the queue is full, so producers slow down instead of piling up work.
//! `shutdown` stops intake and returns once every queued job has run.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("work queue is closed")]
pub struct QueueClosed;

struct Job {
    name: &'static str,
    work: BoxFuture<'static, ()>,
}

struct Inner {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the queue. Clones share one worker.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Starts the worker on the current tokio runtime.
    pub fn start(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(work(receiver, Arc::clone(&pending)));

        Self {
            inner: Arc::new(Inner {
                sender: RwLock::new(Some(sender)),
                pending,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// Queues `job`, waiting while the queue is full.
    pub async fn enqueue<F>(&self, name: &'static str, job: F) -> Result<(), QueueClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self
            .inner
            .sender
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(QueueClosed)?;

        let permit = sender.reserve().await.map_err(|_| QueueClosed)?;
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        permit.send(Job { name, work: job.boxed() });
        debug!(job = name, "job queued");
        Ok(())
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Refuses new work, then waits for the queue to drain. Later calls
    /// return at once.
    pub async fn shutdown(&self) {
        let sender = self
            .inner
            .sender
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            info!(pending = self.pending(), "draining work queue");
            if let Err(e) = worker.await {
                error!("work queue worker failed: {e}");
            }
            info!("work queue drained");
        }
    }
}

async fn work(mut receiver: mpsc::Receiver<Job>, pending: Arc<AtomicUsize>) {
    while let Some(Job { name, work }) = receiver.recv().await {
        if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
            error!(job = name, "job panicked: {}", panic_message(panic.as_ref()));
        } else {
            debug!(job = name, "job finished");
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_jobs_in_order_and_drains_on_shutdown() {
        let queue = WorkQueue::start(4);
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            queue
                .enqueue("record", async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().expect("lock").push(i);
                })
                .await
                .expect("enqueue");
        }

        queue.shutdown().await;
        assert_eq!(*log.lock().expect("lock"), vec![0, 1, 2]);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn closed_queue_refuses_work() {
        let queue = WorkQueue::start(1);
        queue.shutdown().await;
        assert_eq!(queue.enqueue("late", async {}).await, Err(QueueClosed));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn a_panicking_job_does_not_stop_the_worker() {
        let queue = WorkQueue::start(2);
        let ran = Arc::new(AtomicBool::new(false));

        queue.enqueue("boom", async { panic!("boom") }).await.expect("enqueue");
        let flag = Arc::clone(&ran);
        queue
            .enqueue("after", async move { flag.store(true, Ordering::SeqCst) })
            .await
            .expect("enqueue");

        queue.shutdown().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let queue = WorkQueue::start(1);
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        queue
            .enqueue("blocker", async move {
                let _ = gate.await;
            })
            .await
            .expect("enqueue");
        // Let the worker pick up the blocker; the next job fills the channel.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue("filler", async {}).await.expect("enqueue");

        let third = tokio::time::timeout(Duration::from_millis(20), queue.enqueue("third", async {})).await;
        assert!(third.is_err(), "enqueue should wait while the queue is full");

        release.send(()).expect("worker waiting");
        queue.shutdown().await;
        assert_eq!(queue.pending(), 0);
    }
}
