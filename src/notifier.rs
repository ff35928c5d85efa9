//! Notifiers and notification streams.
//!
//! A [`BaseNotifier`] is a sink for detections: `notify` wraps the message,
//! text and data into a [`Notification`] and emits `pushedNotification`.
//! Notifiers do not filter; all suppression happens upstream.
//!
//! Besides synchronous listeners, a notifier can hand out
//! [`NotificationStream`]s. Pushes to streams never block: a full or
//! abandoned stream loses the notification and the drop is counted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::delivery::DeliveryQueue;
use crate::detector::{DetectorId, MotionDetector};
use crate::error::DeliveryError;
use crate::event::{Emitter, ListenerId};
use crate::value::Value;

/// Name given to notifiers constructed without one.
pub const DEFAULT_NOTIFIER_NAME: &str = "Default Base Notifier";

/// Unique identifier for a notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifierId(Uuid);

impl NotifierId {
    /// Creates a new random notifier ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotifierId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detection details carried by a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Name of the detector that reported, if any.
    pub detector: Option<String>,
    /// Name of the environment the change happened in, if any.
    pub environment: Option<String>,
    /// State before the change.
    pub old_state: Value,
    /// State after the change.
    pub new_state: Value,
}

/// A pushed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique id of this notification.
    pub id: Uuid,
    /// Name of the notifier that pushed it.
    pub notifier: String,
    /// When it was pushed.
    pub timestamp: DateTime<Utc>,
    /// Headline, e.g. `Notification received from: pir`.
    pub message: String,
    /// Body text.
    pub text: String,
    /// Detection details.
    pub data: NotificationData,
}

/// Events a notifier emits.
#[derive(Debug, Clone)]
pub enum NotifierEvent {
    /// `pushedNotification(message, text, data)`
    PushedNotification(Notification),
}

struct Subscriber {
    tx: Sender<Notification>,
}

struct NotifierInner {
    id: NotifierId,
    name: String,
    events: Emitter<NotifierEvent>,
    subscribers: RwLock<Vec<Subscriber>>,
    bindings: RwLock<Vec<(DetectorId, ListenerId)>>,
    dropped: AtomicU64,
}

/// Shared handle to a notifier.
///
/// # Examples
///
/// ```
/// use vermon::{BaseNotifier, NotificationData, Value};
///
/// let notifier = BaseNotifier::new("console");
/// let stream = notifier.subscribe(8);
/// notifier.notify("motion", "hall", NotificationData {
///     new_state: Value::from(3),
///     ..NotificationData::default()
/// });
/// assert_eq!(stream.try_recv().unwrap().message, "motion");
/// ```
#[derive(Clone)]
pub struct BaseNotifier {
    inner: Arc<NotifierInner>,
}

impl BaseNotifier {
    /// A notifier with no bindings or subscribers.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                id: NotifierId::new(),
                name: name.into(),
                events: Emitter::new(),
                subscribers: RwLock::new(Vec::new()),
                bindings: RwLock::new(Vec::new()),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Unique id of this notifier.
    #[must_use]
    pub fn id(&self) -> NotifierId {
        self.inner.id
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Emits `pushedNotification(message, text, data)` and feeds streams.
    pub fn notify(&self, message: impl Into<String>, text: impl Into<String>, data: NotificationData) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            notifier: self.inner.name.clone(),
            timestamp: Utc::now(),
            message: message.into(),
            text: text.into(),
            data,
        };

        debug!(notifier = %self.name(), message = %notification.message, "pushed notification");
        self.inner
            .events
            .emit(&NotifierEvent::PushedNotification(notification.clone()));
        self.feed_streams(&notification);
        notification
    }

    fn feed_streams(&self, notification: &Notification) {
        let mut subs = self.inner.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|sub| match sub.tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(notifier = %self.inner.name, "notification stream full, dropping notification");
                true
            }
            // Receiver gone: drop the subscription.
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Opens a bounded stream of this notifier's notifications.
    #[must_use]
    pub fn subscribe(&self, capacity: usize) -> NotificationStream {
        let (tx, rx) = bounded(capacity.max(1));
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { tx });
        NotificationStream { rx }
    }

    /// Subscribes to a detector: every `hasDetected` it emits from now on is
    /// pushed as a notification.
    ///
    /// Notifiers bound to the same detector are notified in binding order.
    /// Binding twice is a no-op returning the existing listener.
    pub fn bind_to_detector(&self, detector: &MotionDetector) -> ListenerId {
        let mut bindings = self.inner.bindings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, listener)) = bindings.iter().find(|(id, _)| *id == detector.id()) {
            return *listener;
        }

        let notifier = self.clone();
        let detector_name = detector.name().to_string();
        let listener = detector.on_has_detected(move |old, new, environment| {
            notifier.notify(
                format!("Notification received from: {detector_name}"),
                format!("{}: {old} -> {new}", environment.name()),
                NotificationData {
                    detector: Some(detector_name.clone()),
                    environment: Some(environment.name().to_string()),
                    old_state: old.clone(),
                    new_state: new.clone(),
                },
            );
        });
        bindings.push((detector.id(), listener));
        debug!(notifier = %self.name(), detector = %detector.name(), "bound notifier to detector");
        listener
    }

    /// Stops receiving a detector's detections. Returns false if this
    /// notifier was not bound to it.
    pub fn unbind_from_detector(&self, detector: &MotionDetector) -> bool {
        let listener = {
            let mut bindings = self.inner.bindings.write().unwrap_or_else(PoisonError::into_inner);
            let Some(pos) = bindings.iter().position(|(id, _)| *id == detector.id()) else {
                return false;
            };
            bindings.remove(pos).1
        };
        detector.off(listener);
        debug!(notifier = %self.name(), detector = %detector.name(), "unbound notifier from detector");
        true
    }

    /// Returns true if this notifier is bound to `detector`.
    #[must_use]
    pub fn is_bound_to(&self, detector: &MotionDetector) -> bool {
        self.inner
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(id, _)| *id == detector.id())
    }

    /// Enqueues every future notification for asynchronous delivery.
    pub fn forward_to(&self, queue: &DeliveryQueue) -> ListenerId {
        let handle = queue.handle();
        self.on(move |event| {
            let NotifierEvent::PushedNotification(notification) = event;
            handle.enqueue(notification.clone());
        })
    }

    /// Notifications lost because a stream was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Registers a listener for every notifier event.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&NotifierEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(listener)
    }

    /// Registers a `pushedNotification(message, text, data)` listener.
    pub fn on_pushed_notification<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, &str, &NotificationData) + Send + Sync + 'static,
    {
        self.on(move |event| {
            let NotifierEvent::PushedNotification(n) = event;
            listener(&n.message, &n.text, &n.data);
        })
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }
}

impl Default for BaseNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFIER_NAME)
    }
}

impl PartialEq for BaseNotifier {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for BaseNotifier {}

impl fmt::Debug for BaseNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseNotifier")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Receiving end of [`BaseNotifier::subscribe`].
///
/// Dropping the stream ends the subscription on the next push.
#[derive(Debug)]
pub struct NotificationStream {
    rx: Receiver<Notification>,
}

impl NotificationStream {
    /// Receive the next notification (blocking).
    pub fn recv(&self) -> Result<Notification, DeliveryError> {
        self.rx.recv().map_err(|_| DeliveryError::Disconnected {
            path: "notification_stream".to_string(),
        })
    }

    /// Receive the next notification with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification, DeliveryError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => DeliveryError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => DeliveryError::Disconnected {
                path: "notification_stream".to_string(),
            },
        })
    }

    /// Returns the next notification if one is already queued.
    pub fn try_recv(&self) -> Option<Notification> {
        match self.rx.try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of queued notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
