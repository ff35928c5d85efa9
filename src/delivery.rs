//! Fire-and-forget notification delivery.
//!
//! Propagation is synchronous and must never wait on I/O. Notifications that
//! need to leave the process are enqueued on a bounded channel with
//! `try_send` and handed to [`Sink`]s by a dedicated worker thread. A full or
//! closed queue drops the notification and counts it; sink failures are
//! logged and counted. Nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::notifier::Notification;

/// Destination for delivered notifications (chat webhook, console, ...).
pub trait Sink: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Delivers one notification.
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Sink writing notifications to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            notifier = %notification.notifier,
            detector = notification.data.detector.as_deref().unwrap_or("-"),
            environment = notification.data.environment.as_deref().unwrap_or("-"),
            new_state = %notification.data.new_state,
            "{}: {}",
            notification.message,
            notification.text
        );
        Ok(())
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Max queued notifications before new ones are dropped.
    pub queue_capacity: usize,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            thread_name: "vermon-delivery".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Cheap handle for enqueueing onto a [`DeliveryQueue`].
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    tx: Sender<Notification>,
    counters: Arc<Counters>,
}

impl DeliveryHandle {
    /// Non-blocking enqueue.
    pub fn enqueue(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n) | TrySendError::Disconnected(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(notification = %n.id, "delivery queue unavailable, dropping notification");
            }
        }
    }
}

/// Background delivery worker.
#[derive(Debug)]
pub struct DeliveryQueue {
    handle: DeliveryHandle,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Spawns the worker thread.
    pub fn new(cfg: DeliveryConfig, sinks: Vec<Arc<dyn Sink>>) -> Result<Self, DeliveryError> {
        let (tx, rx) = bounded::<Notification>(cfg.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let thread_counters = Arc::clone(&counters);
        let join = thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || worker_loop(&sinks, &thread_counters, &rx))
            .map_err(|e| DeliveryError::WorkerSpawn {
                message: e.to_string(),
            })?;

        Ok(Self {
            handle: DeliveryHandle { tx, counters },
            join: Mutex::new(Some(join)),
        })
    }

    /// A handle that can be moved into listeners.
    #[must_use]
    pub fn handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    /// Non-blocking enqueue.
    pub fn enqueue(&self, notification: Notification) {
        self.handle.enqueue(notification);
    }

    /// Notifications dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.handle.counters.dropped.load(Ordering::Relaxed)
    }

    /// Notifications every sink accepted.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.handle.counters.delivered.load(Ordering::Relaxed)
    }

    /// Notifications at least one sink rejected.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.handle.counters.failed.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for the worker to drain it.
    ///
    /// Handles still held elsewhere keep the worker alive until they are
    /// dropped too.
    pub fn shutdown(self) {
        let Self { handle, join } = self;
        drop(handle);
        let worker = join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("delivery worker panicked");
            }
        }
    }
}

fn worker_loop(sinks: &[Arc<dyn Sink>], counters: &Counters, rx: &Receiver<Notification>) {
    // Exits once every sender is gone and the queue is drained.
    for notification in rx {
        for sink in sinks {
            match sink.deliver(&notification) {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(sink = sink.name(), error = %e, "notification delivery failed");
                }
            }
        }
    }
    debug!("delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{BaseNotifier, NotificationData};

    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl Sink for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(notification.message.clone());
            Ok(())
        }
    }

    struct Failing;

    impl Sink for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _: &Notification) -> Result<(), DeliveryError> {
            Err(DeliveryError::SinkFailed {
                sink: "failing".to_string(),
                message: "unreachable".to_string(),
            })
        }
    }

    #[test]
    fn forwards_notifications_to_sinks() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let sinks: Vec<Arc<dyn Sink>> = vec![recording.clone() as Arc<dyn Sink>, Arc::new(LogSink)];
        let queue = DeliveryQueue::new(DeliveryConfig::default(), sinks).unwrap();

        let notifier = BaseNotifier::new("n");
        let listener = notifier.forward_to(&queue);
        notifier.notify("first", "", NotificationData::default());
        notifier.notify("second", "", NotificationData::default());
        // The listener owns a handle; remove it so shutdown can drain.
        notifier.off(listener);

        let delivered = {
            queue.shutdown();
            recording.seen.lock().unwrap().clone()
        };
        assert_eq!(delivered, vec!["first", "second"]);
    }

    #[test]
    fn sink_failures_are_counted() {
        let queue = DeliveryQueue::new(DeliveryConfig::default(), vec![Arc::new(Failing) as Arc<dyn Sink>]).unwrap();
        let notifier = BaseNotifier::new("n");
        notifier.forward_to(&queue);
        notifier.notify("x", "", NotificationData::default());

        let start = std::time::Instant::now();
        while queue.failed() == 0 && start.elapsed() < std::time::Duration::from_secs(5) {
            thread::yield_now();
        }
        assert_eq!(queue.failed(), 1);
        assert_eq!(queue.delivered(), 0);
    }

    #[test]
    fn enqueue_after_worker_exit_is_dropped() {
        let (tx, rx) = bounded::<Notification>(1);
        drop(rx);
        let handle = DeliveryHandle {
            tx,
            counters: Arc::new(Counters::default()),
        };
        let n = BaseNotifier::new("n").notify("x", "", NotificationData::default());
        handle.enqueue(n);
        assert_eq!(handle.counters.dropped.load(Ordering::Relaxed), 1);
    }
}
