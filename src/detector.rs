//! Motion detectors.
//!
//! A detector watches at most one environment. Every committed change of
//! that environment is run through the detector's own filter chain; passing
//! changes bump the detection counter and fire `hasDetected`. Detector-level
//! filtering only decides reporting, the environment's state is already
//! committed by the time a detector sees a change.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::environment::{Environment, EnvironmentId, WeakEnvironment};
use crate::error::ValidationError;
use crate::event::{Emitter, ListenerId};
use crate::filter::{self, Filter, FilterContext};
use crate::value::Value;

/// Name given to detectors constructed without one.
pub const DEFAULT_DETECTOR_NAME: &str = "unnamed detector.";

/// Unique identifier for a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectorId(Uuid);

impl DetectorId {
    /// Creates a new random detector ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DetectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Construction options for a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    /// Detector name.
    pub name: String,
    /// Starting intensity. Stored, never used to gate detection.
    pub intensity: f64,
    /// Filter chain applied before a detection counts.
    pub filters: Vec<Filter>,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_DETECTOR_NAME.to_string(),
            intensity: 0.0,
            filters: Vec::new(),
        }
    }
}

impl DetectorOptions {
    /// Reads options from loosely typed input.
    ///
    /// Accepts an object (`{"name": .., "intensity": .., "filters": [..]}`),
    /// positional arguments (`["name", 10]`) or a bare name. A name that is
    /// present but not a string is rejected; a missing one falls back to the
    /// default name.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let (name, intensity, filters) = match value {
            serde_json::Value::Object(obj) => {
                (obj.get("name"), obj.get("intensity"), obj.get("filters"))
            }
            serde_json::Value::Array(args) => (args.first(), args.get(1), None),
            serde_json::Value::Null => (None, None, None),
            other => (Some(other), None, None),
        };

        let mut options = Self::default();

        match name {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(s)) => options.name.clone_from(s),
            Some(other) => {
                return Err(ValidationError::DetectorNameNotString {
                    provided: other.to_string(),
                })
            }
        }

        match intensity {
            None | Some(serde_json::Value::Null) => {}
            Some(v) => {
                options.intensity = v.as_f64().ok_or_else(|| ValidationError::InvalidField {
                    field: "intensity".to_string(),
                    reason: format!("expected a number, got {v}"),
                })?;
            }
        }

        if let Some(filters) = filters {
            let items = filters.as_array().ok_or_else(|| ValidationError::InvalidField {
                field: "filters".to_string(),
                reason: "expected an array".to_string(),
            })?;
            for item in items {
                let f = Filter::try_from(item).map_err(|e| ValidationError::InvalidField {
                    field: "filters".to_string(),
                    reason: e.to_string(),
                })?;
                options.filters.push(f);
            }
        }

        Ok(options)
    }
}

/// Events a detector emits.
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    /// `hasDetected(old, new, environment)`
    HasDetected {
        /// Environment state before the change.
        old: Value,
        /// Committed environment state.
        new: Value,
        /// The environment the change happened in.
        environment: Environment,
    },
}

#[derive(Debug)]
struct DetectorState {
    current_intensity: f64,
    filters: Vec<Filter>,
    active: bool,
    count: u64,
    environment: Option<WeakEnvironment>,
}

struct DetectorInner {
    id: DetectorId,
    name: String,
    original_intensity: f64,
    state: RwLock<DetectorState>,
    events: Emitter<DetectorEvent>,
}

/// Shared handle to a motion detector.
///
/// # Examples
///
/// ```
/// use vermon::{Environment, MotionDetector};
///
/// let env = Environment::default();
/// let detector = MotionDetector::new("hall", 10.0);
/// env.bind_detector(&detector);
/// detector.start_monitoring();
///
/// env.add_change(2);
/// assert_eq!(detector.count(), 1);
/// ```
#[derive(Clone)]
pub struct MotionDetector {
    inner: Arc<DetectorInner>,
}

impl MotionDetector {
    /// Creates a detector with the given name and intensity.
    #[must_use]
    pub fn new(name: impl Into<String>, intensity: f64) -> Self {
        Self::from_options(DetectorOptions {
            name: name.into(),
            intensity,
            filters: Vec::new(),
        })
    }

    /// Builds an inactive, unbound detector.
    #[must_use]
    pub fn from_options(options: DetectorOptions) -> Self {
        Self {
            inner: Arc::new(DetectorInner {
                id: DetectorId::new(),
                name: options.name,
                original_intensity: options.intensity,
                state: RwLock::new(DetectorState {
                    current_intensity: options.intensity,
                    filters: options.filters,
                    active: false,
                    count: 0,
                    environment: None,
                }),
                events: Emitter::new(),
            }),
        }
    }

    /// Builds a detector from loosely typed input, see [`DetectorOptions::from_value`].
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        DetectorOptions::from_value(value).map(Self::from_options)
    }

    /// Unique id of this detector.
    #[must_use]
    pub fn id(&self) -> DetectorId {
        self.inner.id
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `getIntensity()`
    #[must_use]
    pub fn intensity(&self) -> f64 {
        self.read().current_intensity
    }

    /// Overrides the current intensity.
    pub fn set_intensity(&self, intensity: f64) {
        self.write().current_intensity = intensity;
    }

    /// `getOriginalIntensity()`
    #[must_use]
    pub fn original_intensity(&self) -> f64 {
        self.inner.original_intensity
    }

    /// `getCount()`: number of accepted detections.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.read().count
    }

    /// `isActive()`
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.read().active
    }

    /// Starts processing changes from the bound environment. Changes made
    /// before this call are never replayed.
    pub fn start_monitoring(&self) {
        self.write().active = true;
        debug!(detector = %self.name(), "started monitoring");
    }

    /// Appends a filter to this detector's chain.
    pub fn apply_filter(&self, filter: Filter) {
        debug!(detector = %self.name(), filter = filter.kind(), "applied detector filter");
        self.write().filters.push(filter);
    }

    /// Snapshot of the filter chain.
    #[must_use]
    pub fn filters(&self) -> Vec<Filter> {
        self.read().filters.clone()
    }

    /// The environment this detector is bound to, if any.
    #[must_use]
    pub fn environment(&self) -> Option<Environment> {
        self.read().environment.as_ref().and_then(WeakEnvironment::upgrade)
    }

    /// Records a new binding, returning the previously bound environment.
    pub(crate) fn attach(&self, environment: &Environment) -> Option<Environment> {
        let previous = self.write().environment.replace(environment.downgrade());
        previous.and_then(|weak| weak.upgrade())
    }

    /// Clears the binding if it still points at `environment`.
    pub(crate) fn release(&self, environment: EnvironmentId) {
        let mut state = self.write();
        let bound_here = state
            .environment
            .as_ref()
            .and_then(WeakEnvironment::upgrade)
            .is_some_and(|e| e.id() == environment);
        if bound_here {
            state.environment = None;
        }
    }

    /// Entry point for a committed environment change.
    ///
    /// Returns true if the change was reported as a detection.
    pub fn handle_change(&self, old: &Value, new: &Value, environment: &Environment) -> bool {
        {
            let mut state = self.write();
            if !state.active {
                return false;
            }
            if !filter::evaluate(&state.filters, &FilterContext::detector(new, &self.inner.name)) {
                trace!(detector = %self.name(), new = %new, "detection blocked by filter");
                return false;
            }
            state.count += 1;
        }

        debug!(detector = %self.name(), environment = %environment.name(), new = %new, "detected change");
        self.inner.events.emit(&DetectorEvent::HasDetected {
            old: old.clone(),
            new: new.clone(),
            environment: environment.clone(),
        });
        true
    }

    /// Registers a listener for detector events.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DetectorEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(listener)
    }

    /// Registers a `hasDetected(old, new, environment)` listener.
    pub fn on_has_detected<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value, &Value, &Environment) + Send + Sync + 'static,
    {
        self.on(move |event| {
            let DetectorEvent::HasDetected { old, new, environment } = event;
            listener(old, new, environment);
        })
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DetectorState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DetectorState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::from_options(DetectorOptions::default())
    }
}

impl PartialEq for MotionDetector {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MotionDetector {}

impl fmt::Debug for MotionDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("MotionDetector")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("original_intensity", &self.inner.original_intensity)
            .field("current_intensity", &state.current_intensity)
            .field("active", &state.active)
            .field("count", &state.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn monitored(env: &Environment, name: &str) -> MotionDetector {
        let d = MotionDetector::new(name, 0.0);
        env.bind_detector(&d);
        d.start_monitoring();
        d
    }

    #[test]
    fn detects_committed_change() {
        let env = Environment::default();
        let d = monitored(&env, "d");
        let alternative = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&alternative);
        d.on_has_detected(move |_, _, _| {
            a.fetch_add(2, Ordering::SeqCst);
        });

        env.add_change(2);
        assert_eq!(d.count(), 1);
        assert_eq!(alternative.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn active_only_after_start_monitoring() {
        let env = Environment::default();
        let d = MotionDetector::default();
        env.bind_detector(&d);
        assert!(!d.is_active());

        env.add_change(1);
        assert_eq!(d.count(), 0);

        d.start_monitoring();
        assert!(d.is_active());
        env.add_change(1);
        assert_eq!(d.count(), 1);
    }

    #[test]
    fn both_detectors_respond() {
        let env = Environment::default();
        let d1 = monitored(&env, "d1");
        let d2 = monitored(&env, "d2");
        env.add_change(1);
        assert_eq!(d1.count() + d2.count(), 2);
    }

    #[test]
    fn unbound_detector_stops_responding() {
        let env = Environment::default();
        let d1 = monitored(&env, "d1");
        let d2 = monitored(&env, "d2");
        env.unbind_detector(&d1).unwrap();
        assert!(d1.environment().is_none());

        env.add_change(1);
        assert_eq!(d1.count(), 0);
        assert_eq!(d2.count(), 1);
    }

    #[test]
    fn high_pass_filter_never_alters_environment_state() {
        let env = Environment::default();
        let d = monitored(&env, "d");
        d.apply_filter(Filter::high_pass(10.0));
        let reported = Arc::new(RwLock::new(Vec::new()));
        let r = Arc::clone(&reported);
        d.on_has_detected(move |_, new, _| r.write().unwrap().push(new.clone()));

        env.add_change(8);
        assert_eq!(env.current_state(), Value::Number(8.0));
        env.add_change(30);
        assert_eq!(*reported.read().unwrap(), vec![Value::Number(38.0)]);
        assert_eq!(d.count(), 1);
    }

    #[test]
    fn name_filter_blocks_own_name() {
        let env = Environment::default();
        let d = monitored(&env, DEFAULT_DETECTOR_NAME);
        d.apply_filter(Filter::name(DEFAULT_DETECTOR_NAME));
        env.add_change(10);
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn intensity_is_stored_and_original_is_kept() {
        let d = MotionDetector::new("My detector", 10.0);
        assert!((d.intensity() - 10.0).abs() < f64::EPSILON);
        d.set_intensity(20.0);
        assert!((d.intensity() - 20.0).abs() < f64::EPSILON);
        assert!((d.original_intensity() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn from_value_rejects_non_string_name() {
        let err = MotionDetector::from_value(&serde_json::json!(12)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Motion detector first argument (name) is not of type string. Provided value was 12"
        );
    }

    #[test]
    fn from_value_accepts_object_and_positional_forms() {
        let d = MotionDetector::from_value(&serde_json::json!({
            "name": "PIR",
            "intensity": 3,
            "filters": [{"HighPassFilter": 10}]
        }))
        .unwrap();
        assert_eq!(d.name(), "PIR");
        assert_eq!(d.filters(), vec![Filter::high_pass(10.0)]);

        let d = MotionDetector::from_value(&serde_json::json!(["My detector", 10])).unwrap();
        assert_eq!(d.name(), "My detector");
        assert!((d.original_intensity() - 10.0).abs() < f64::EPSILON);

        let d = MotionDetector::from_value(&serde_json::Value::Null).unwrap();
        assert_eq!(d.name(), DEFAULT_DETECTOR_NAME);
    }
}
