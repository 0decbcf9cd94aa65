//! Serial task queue.
//!
//! A single worker owns the context `C` and runs queued tasks against it one
//! at a time, in submission order. Each task gets exclusive `&mut C` for its
//! whole lifetime, so two tasks can never interleave their awaits on the
//! shared resource.

use futures::future::BoxFuture;
use futures::FutureExt;
use grocerbot_core::Result;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A unit of work run against the queue's context.
pub type Task<C> = Box<dyn for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, Result<()>> + Send>;

/// Boxes a closure as a [`Task`]. Naming the bound here lets the closure's
/// higher-ranked signature be inferred at the call site.
pub fn task<C, F>(f: F) -> Task<C>
where
    F: for<'a> FnOnce(&'a mut C) -> BoxFuture<'a, Result<()>> + Send + 'static,
{
    Box::new(f)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
    /// The queue was drained before the task started.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Tasks waiting to start; the running one is not counted.
    pub length: usize,
    pub running: bool,
}

/// Resolves once the task has finished or been discarded.
pub struct TaskHandle {
    pub seq: u64,
    pub description: String,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub async fn outcome(self) -> TaskOutcome {
        self.rx.await.unwrap_or(TaskOutcome::Discarded)
    }
}

struct QueuedTask<C> {
    seq: u64,
    description: String,
    task: Task<C>,
    done: oneshot::Sender<TaskOutcome>,
}

#[derive(Default)]
struct Counters {
    waiting: AtomicUsize,
    running: AtomicBool,
    closing: AtomicBool,
}

pub struct TaskQueue<C> {
    tx: mpsc::UnboundedSender<QueuedTask<C>>,
    counters: Arc<Counters>,
    next_seq: AtomicU64,
    worker: JoinHandle<C>,
}

impl<C: Send + 'static> TaskQueue<C> {
    /// Spawns the worker on the current tokio runtime.
    pub fn new(context: C) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(context, rx, counters.clone()));
        Self {
            tx,
            counters,
            next_seq: AtomicU64::new(1),
            worker,
        }
    }

    /// Appends a task and returns immediately.
    pub fn enqueue(&self, description: &str, task: Task<C>) -> TaskHandle {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let (done, rx) = oneshot::channel();
        self.counters.waiting.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedTask {
            seq,
            description: description.to_string(),
            task,
            done,
        };
        if let Err(mpsc::error::SendError(queued)) = self.tx.send(queued) {
            // Worker is gone; the handle resolves to Discarded.
            self.counters.waiting.fetch_sub(1, Ordering::SeqCst);
            warn!(seq = queued.seq, task = %queued.description, "Queue worker stopped, task dropped");
        } else {
            debug!(seq, task = %description, "Task enqueued");
        }
        TaskHandle {
            seq,
            description: description.to_string(),
            rx,
        }
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            length: self.counters.waiting.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
        }
    }

    /// Stops accepting work, lets the in-flight task finish, discards the
    /// rest and hands the context back.
    pub async fn drain(self) -> Option<C> {
        self.counters.closing.store(true, Ordering::SeqCst);
        drop(self.tx);
        match self.worker.await {
            Ok(context) => Some(context),
            Err(e) => {
                error!(error = %e, "Queue worker terminated abnormally");
                None
            }
        }
    }
}

async fn run_worker<C>(
    mut context: C,
    mut rx: mpsc::UnboundedReceiver<QueuedTask<C>>,
    counters: Arc<Counters>,
) -> C {
    while let Some(queued) = rx.recv().await {
        counters.waiting.fetch_sub(1, Ordering::SeqCst);
        let QueuedTask {
            seq,
            description,
            task,
            done,
        } = queued;

        if counters.closing.load(Ordering::SeqCst) {
            debug!(seq, task = %description, "Queue draining, task discarded");
            let _ = done.send(TaskOutcome::Discarded);
            continue;
        }

        counters.running.store(true, Ordering::SeqCst);
        info!(seq, task = %description, "Task started");
        let result = AssertUnwindSafe(task(&mut context)).catch_unwind().await;
        counters.running.store(false, Ordering::SeqCst);

        let outcome = match result {
            Ok(Ok(())) => {
                info!(seq, task = %description, "Task finished");
                TaskOutcome::Succeeded
            }
            Ok(Err(e)) => {
                error!(seq, task = %description, error = %e, "Task failed");
                TaskOutcome::Failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(seq, task = %description, panic = %message, "Task panicked");
                TaskOutcome::Panicked(message)
            }
        };
        // The submitter may have stopped listening.
        let _ = done.send(outcome);
    }
    context
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grocerbot_core::Error;
    use std::time::Duration;

    fn record(label: &'static str, delay_ms: u64) -> Task<Vec<&'static str>> {
        task(move |log: &mut Vec<&'static str>| {
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.push(label);
                Ok(())
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_completion_order_matches_submission_order() {
        let queue = TaskQueue::new(Vec::new());
        let handles: Vec<TaskHandle> = [("a", 30), ("b", 1), ("c", 15), ("d", 0)]
            .into_iter()
            .map(|(label, delay)| queue.enqueue(label, record(label, delay)))
            .collect();
        for handle in handles {
            assert_eq!(handle.outcome().await, TaskOutcome::Succeeded);
        }
        let log = queue.drain().await.unwrap();
        assert_eq!(log, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_failing_task_does_not_stop_the_queue() {
        let queue = TaskQueue::new(Vec::new());
        let a = queue.enqueue("A", record("a", 5));
        let b = queue.enqueue(
            "B",
            task(|_log: &mut Vec<&'static str>| {
                async move { Err(Error::Other("boom".to_string())) }.boxed()
            }),
        );
        let c = queue.enqueue("C", record("c", 0));

        assert_eq!(a.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(b.outcome().await, TaskOutcome::Failed("boom".to_string()));
        assert_eq!(c.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(
            queue.status(),
            QueueStatus {
                length: 0,
                running: false
            }
        );
        assert_eq!(queue.drain().await.unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_stop_the_queue() {
        let queue = TaskQueue::new(Vec::new());
        let bad = queue.enqueue(
            "panics",
            task(|_log: &mut Vec<&'static str>| {
                async move {
                    let page: Option<()> = None;
                    page.expect("page vanished");
                    Ok(())
                }
                .boxed()
            }),
        );
        let next = queue.enqueue("next", record("next", 0));
        assert_eq!(bad.outcome().await, TaskOutcome::Panicked("page vanished".to_string()));
        assert_eq!(next.outcome().await, TaskOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_status_counts_waiting_and_running() {
        let queue = TaskQueue::new(Vec::new());
        let (release, gate) = oneshot::channel::<()>();
        let blocker = queue.enqueue(
            "blocker",
            task(move |log: &mut Vec<&'static str>| {
                async move {
                    let _ = gate.await;
                    log.push("blocker");
                    Ok(())
                }
                .boxed()
            }),
        );
        let waiting = queue.enqueue("waiting", record("waiting", 0));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            queue.status(),
            QueueStatus {
                length: 1,
                running: true
            }
        );

        release.send(()).unwrap();
        assert_eq!(blocker.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(waiting.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(queue.status().length, 0);
    }

    #[tokio::test]
    async fn test_drain_finishes_in_flight_and_discards_waiting() {
        let queue = TaskQueue::new(Vec::new());
        let (release, gate) = oneshot::channel::<()>();
        let in_flight = queue.enqueue(
            "in flight",
            task(move |log: &mut Vec<&'static str>| {
                async move {
                    let _ = gate.await;
                    log.push("in flight");
                    Ok(())
                }
                .boxed()
            }),
        );
        let dropped = queue.enqueue("dropped", record("dropped", 0));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let draining = tokio::spawn(queue.drain());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!draining.is_finished());

        release.send(()).unwrap();
        let log = draining.await.unwrap().unwrap();
        assert_eq!(log, vec!["in flight"]);
        assert_eq!(in_flight.outcome().await, TaskOutcome::Succeeded);
        assert_eq!(dropped.outcome().await, TaskOutcome::Discarded);
    }
}
