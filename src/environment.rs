//! Environments: observed state plus the detectors watching it.
//!
//! An environment owns a current state, an immutable original state and an
//! ordered filter chain. `add_change` folds a delta into the current state;
//! the filter chain decides whether the result is committed. Committed
//! changes fire `changedState` and are then handed to every bound, active
//! detector in binding order.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::detector::{DetectorId, MotionDetector};
use crate::error::{BindingError, ValidationError};
use crate::event::{Emitter, ListenerId};
use crate::filter::{self, Filter, FilterContext};
use crate::value::Value;

/// Name given to environments constructed without one.
pub const DEFAULT_ENVIRONMENT_NAME: &str = "unnamed environment";

/// Unique identifier for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(Uuid);

impl EnvironmentId {
    /// Creates a new random environment ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EnvironmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recognized construction options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentOptions {
    /// Environment name; also the key under which a MultiEnvironment stores it.
    pub name: Option<String>,
    /// Initial (and original) state. Defaults to `0`.
    pub state: Option<Value>,
    /// Environment-level filter chain.
    pub filters: Vec<Filter>,
}

impl EnvironmentOptions {
    /// Options with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the initial state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<Value>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Appends a filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Reads options from loosely typed input
    /// (`{"name": .., "state": .., "filters": [..]}`).
    ///
    /// `null` yields the defaults. Anything other than an object, a
    /// non-string `name` and a non-array `filters` are rejected.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(obj) => obj,
            other => {
                return Err(ValidationError::InvalidField {
                    field: "params".to_string(),
                    reason: format!(
                        "Environment expects an object of options, got {}",
                        Value::from(other.clone()).type_name()
                    ),
                })
            }
        };

        let mut options = Self::default();

        match obj.get("name") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(name)) => options.name = Some(name.clone()),
            Some(other) => {
                return Err(ValidationError::InvalidField {
                    field: "name".to_string(),
                    reason: format!("expected a string, got {other}"),
                })
            }
        }

        options.state = obj.get("state").filter(|s| !s.is_null()).cloned().map(Value::from);

        match obj.get("filters") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::Array(items)) => {
                for item in items {
                    let f = Filter::try_from(item).map_err(|e| ValidationError::InvalidField {
                        field: "filters".to_string(),
                        reason: e.to_string(),
                    })?;
                    options.filters.push(f);
                }
            }
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    field: "filters".to_string(),
                    reason: "expected an array".to_string(),
                })
            }
        }

        Ok(options)
    }
}

/// Events an environment emits.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentEvent {
    /// `changedState(old, new)`: a change was committed.
    ChangedState {
        /// State before the change.
        old: Value,
        /// Committed state.
        new: Value,
    },
    /// `ignoredChange(current, ignored)`: the change could not be applied.
    IgnoredChange {
        /// State at the time, unchanged.
        current: Value,
        /// The rejected delta.
        ignored: Value,
    },
}

/// Result of a single `add_change` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    /// The change was committed and propagated to detectors.
    Committed {
        /// State before the change.
        old: Value,
        /// Committed state.
        new: Value,
    },
    /// The environment's filter chain blocked the change.
    Blocked,
    /// The delta could not be combined with the current state.
    Ignored,
}

impl ChangeOutcome {
    /// Returns true if the change was committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

#[derive(Debug)]
struct EnvironmentState {
    current: Value,
    filters: Vec<Filter>,
    detectors: Vec<MotionDetector>,
}

struct EnvironmentInner {
    id: EnvironmentId,
    name: String,
    original_state: Value,
    state: RwLock<EnvironmentState>,
    events: Emitter<EnvironmentEvent>,
}

/// Shared handle to an environment.
///
/// Cloning the handle does not clone the environment.
///
/// # Examples
///
/// ```
/// use vermon::{Environment, EnvironmentOptions, Filter};
///
/// let env = Environment::new(EnvironmentOptions::default().with_filter(Filter::high_pass(10.0)));
/// assert!(!env.add_change(5).is_committed());
/// assert!(env.add_change(15).is_committed());
/// assert_eq!(env.current_state().as_number(), Some(15.0));
/// assert_eq!(env.original_state().as_number(), Some(0.0));
/// ```
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

/// Non-owning reference to an environment, held by bound detectors.
#[derive(Clone)]
pub(crate) struct WeakEnvironment(Weak<EnvironmentInner>);

impl WeakEnvironment {
    pub(crate) fn upgrade(&self) -> Option<Environment> {
        self.0.upgrade().map(|inner| Environment { inner })
    }
}

impl fmt::Debug for WeakEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(inner) => write!(f, "WeakEnvironment({})", inner.name),
            None => f.write_str("WeakEnvironment(<dropped>)"),
        }
    }
}

impl Environment {
    /// Creates an environment from options.
    #[must_use]
    pub fn new(options: EnvironmentOptions) -> Self {
        let original_state = options.state.unwrap_or_default();
        Self {
            inner: Arc::new(EnvironmentInner {
                id: EnvironmentId::new(),
                name: options.name.unwrap_or_else(|| DEFAULT_ENVIRONMENT_NAME.to_string()),
                state: RwLock::new(EnvironmentState {
                    current: original_state.clone(),
                    filters: options.filters,
                    detectors: Vec::new(),
                }),
                original_state,
                events: Emitter::new(),
            }),
        }
    }

    /// Builds an environment from loosely typed options, see
    /// [`EnvironmentOptions::from_value`].
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        EnvironmentOptions::from_value(value).map(Self::new)
    }

    /// Creates a named environment with the default state.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(EnvironmentOptions::named(name))
    }

    /// Unique id of this environment.
    #[must_use]
    pub fn id(&self) -> EnvironmentId {
        self.inner.id
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `getCurrentState()`
    #[must_use]
    pub fn current_state(&self) -> Value {
        self.read().current.clone()
    }

    /// `getOriginalState()`: the construction-time state, for the object's lifetime.
    #[must_use]
    pub fn original_state(&self) -> &Value {
        &self.inner.original_state
    }

    /// Snapshot of the environment-level filter chain.
    #[must_use]
    pub fn filters(&self) -> Vec<Filter> {
        self.read().filters.clone()
    }

    /// Appends a filter to the environment-level chain.
    pub fn apply_filter(&self, filter: Filter) {
        debug!(environment = %self.name(), filter = filter.kind(), "applied environment filter");
        self.write().filters.push(filter);
    }

    /// Bound detectors, in binding order.
    #[must_use]
    pub fn detectors(&self) -> Vec<MotionDetector> {
        self.read().detectors.clone()
    }

    /// Number of bound detectors.
    #[must_use]
    pub fn detector_count(&self) -> usize {
        self.read().detectors.len()
    }

    /// Binds a detector. A detector bound elsewhere is detached from that
    /// environment first; binding twice to the same environment is a no-op.
    pub fn bind_detector(&self, detector: &MotionDetector) {
        if let Some(previous) = detector.attach(self) {
            if previous.id() != self.id() {
                previous.detach(detector.id());
            }
        }

        let mut state = self.write();
        if !state.detectors.iter().any(|d| d.id() == detector.id()) {
            state.detectors.push(detector.clone());
            debug!(environment = %self.name(), detector = %detector.name(), "bound detector");
        }
    }

    /// Unbinds a detector so it no longer sees this environment's changes.
    pub fn unbind_detector(&self, detector: &MotionDetector) -> Result<(), BindingError> {
        if !self.detach(detector.id()) {
            return Err(BindingError::DetectorNotBound {
                detector: detector.id(),
                environment: self.id(),
            });
        }
        detector.release(self.id());
        debug!(environment = %self.name(), detector = %detector.name(), "unbound detector");
        Ok(())
    }

    fn detach(&self, detector: DetectorId) -> bool {
        let mut state = self.write();
        let before = state.detectors.len();
        state.detectors.retain(|d| d.id() != detector);
        state.detectors.len() != before
    }

    /// Proposes `current + delta`, commits it if the filter chain passes and
    /// propagates the committed change to bound, active detectors.
    pub fn add_change(&self, delta: impl Into<Value>) -> ChangeOutcome {
        let delta = delta.into();

        let (old, new, detectors) = {
            let mut state = self.write();
            let Some(proposed) = state.current.combine(&delta) else {
                let current = state.current.clone();
                drop(state);
                trace!(environment = %self.name(), delta = %delta, "ignored change");
                self.inner.events.emit(&EnvironmentEvent::IgnoredChange {
                    current,
                    ignored: delta,
                });
                return ChangeOutcome::Ignored;
            };

            if !filter::evaluate(&state.filters, &FilterContext::environment(&proposed)) {
                trace!(environment = %self.name(), proposed = %proposed, "change blocked by filter");
                return ChangeOutcome::Blocked;
            }

            let old = std::mem::replace(&mut state.current, proposed.clone());
            (old, proposed, state.detectors.clone())
        };

        debug!(environment = %self.name(), old = %old, new = %new, "committed change");
        self.inner.events.emit(&EnvironmentEvent::ChangedState {
            old: old.clone(),
            new: new.clone(),
        });

        for detector in detectors.iter().filter(|d| d.is_active()) {
            detector.handle_change(&old, &new, self);
        }

        ChangeOutcome::Committed { old, new }
    }

    /// Registers a listener for every environment event.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&EnvironmentEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(listener)
    }

    /// Registers a `changedState(old, new)` listener.
    pub fn on_changed_state<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.on(move |event| {
            if let EnvironmentEvent::ChangedState { old, new } = event {
                listener(old, new);
            }
        })
    }

    /// Registers an `ignoredChange(current, ignored)` listener.
    pub fn on_ignored_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.on(move |event| {
            if let EnvironmentEvent::IgnoredChange { current, ignored } = event {
                listener(current, ignored);
            }
        })
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    pub(crate) fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment(Arc::downgrade(&self.inner))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, EnvironmentState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, EnvironmentState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(EnvironmentOptions::default())
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Environment {}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Environment")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("original_state", &self.inner.original_state)
            .field("current_state", &state.current)
            .field("filters", &state.filters.len())
            .field("detectors", &state.detectors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn stores_state_passed_as_argument() {
        let env = Environment::new(EnvironmentOptions::default().with_state(10));
        assert_eq!(env.current_state(), Value::Number(10.0));
        assert_eq!(env.name(), DEFAULT_ENVIRONMENT_NAME);
    }

    #[test]
    fn original_state_survives_changes() {
        let env = Environment::new(EnvironmentOptions::default().with_state(10));
        env.add_change(10);
        env.add_change(-3);
        assert_eq!(env.current_state(), Value::Number(17.0));
        assert_eq!(env.original_state(), &Value::Number(10.0));
    }

    #[test]
    fn unfiltered_changes_accumulate() {
        let env = Environment::default();
        for d in [1, 2, 3, 4] {
            env.add_change(d);
        }
        assert_eq!(env.current_state(), Value::Number(10.0));
    }

    #[test]
    fn changed_state_fires_with_new_value() {
        let env = Environment::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        env.on_changed_state(move |old, new| s.lock().unwrap().push((old.clone(), new.clone())));

        env.add_change(1);
        assert_eq!(*seen.lock().unwrap(), vec![(Value::Number(0.0), Value::Number(1.0))]);
    }

    #[test]
    fn environment_filter_prevents_mutation() {
        let env = Environment::default();
        env.apply_filter(Filter::high_pass(10.0));
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        env.on_changed_state(move |_, new| {
            assert_eq!(new, &Value::Number(15.0));
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(env.add_change(5), ChangeOutcome::Blocked);
        assert_eq!(env.current_state(), Value::Number(0.0));
        assert!(env.add_change(15).is_committed());
        assert_eq!(env.current_state(), Value::Number(15.0));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn uncombinable_change_is_ignored() {
        let env = Environment::default();
        let ignored = Arc::new(Mutex::new(None));
        let i = Arc::clone(&ignored);
        env.on_ignored_change(move |current, change| {
            *i.lock().unwrap() = Some((current.clone(), change.clone()));
        });
        env.on_changed_state(|_, _| panic!("must not commit"));

        assert_eq!(env.add_change(vec![6, 8]), ChangeOutcome::Ignored);
        assert_eq!(
            *ignored.lock().unwrap(),
            Some((Value::Number(0.0), Value::from(vec![6, 8])))
        );
    }

    #[test]
    fn text_state_accepts_text_changes() {
        let env = Environment::new(EnvironmentOptions::named("Environment 1").with_state(""));
        env.add_change("Some sub-environment change");
        assert_eq!(env.current_state(), Value::from("Some sub-environment change"));
    }

    #[test]
    fn off_stops_listener() {
        let env = Environment::default();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = env.on_changed_state(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        env.add_change(1);
        assert!(env.off(id));
        env.add_change(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rebinding_detaches_from_previous_environment() {
        let a = Environment::named("a");
        let b = Environment::named("b");
        let d = MotionDetector::new("d", 0.0);
        a.bind_detector(&d);
        b.bind_detector(&d);
        assert_eq!(a.detector_count(), 0);
        assert_eq!(b.detector_count(), 1);
        assert_eq!(d.environment(), Some(b.clone()));
    }

    #[test]
    fn binding_twice_is_idempotent() {
        let env = Environment::default();
        let d = MotionDetector::new("d", 0.0);
        env.bind_detector(&d);
        env.bind_detector(&d);
        assert_eq!(env.detector_count(), 1);
    }

    #[test]
    fn unbinding_an_unbound_detector_fails() {
        let env = Environment::default();
        let d = MotionDetector::new("d", 0.0);
        let err = env.unbind_detector(&d).unwrap_err();
        assert!(matches!(err, BindingError::DetectorNotBound { .. }));
    }

    #[test]
    fn from_value_reads_options() {
        let env = Environment::from_value(&serde_json::json!({
            "name": "hall",
            "state": 4,
            "filters": [{ "HighPassFilter": 10 }]
        }))
        .unwrap();
        assert_eq!(env.name(), "hall");
        assert_eq!(env.original_state(), &Value::Number(4.0));
        assert_eq!(env.filters(), vec![Filter::high_pass(10.0)]);

        let env = Environment::from_value(&serde_json::Value::Null).unwrap();
        assert_eq!(env.name(), DEFAULT_ENVIRONMENT_NAME);
    }

    #[test]
    fn from_value_rejects_non_object_options() {
        let err = Environment::from_value(&serde_json::json!("x")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "params"));
        assert!(!err.to_string().contains("MultiEnvironment"));
    }

    #[test]
    fn from_value_rejects_non_string_name() {
        let err = Environment::from_value(&serde_json::json!({ "name": 12 })).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidField {
                field: "name".to_string(),
                reason: "expected a string, got 12".to_string(),
            }
        );
    }

    #[test]
    fn from_value_rejects_non_array_filters() {
        let err = Environment::from_value(&serde_json::json!({ "filters": { "BlockAllFilter": null } })).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "filters"));
    }
}
