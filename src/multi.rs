//! MultiEnvironment: an environment whose state is a set of named
//! sub-environments.
//!
//! Sub-environments are plain environments or further MultiEnvironments, so
//! a MultiEnvironment is the root of an owned tree. Only environments are
//! valid changes for a MultiEnvironment: adding one registers it under its
//! name and fires `changedState` once. Any other input leaves the mapping
//! alone, is forwarded to every sub-environment's own `add_change`, and is
//! reported through `ignoredChange`.
//!
//! Each sub-environment keeps its own listeners and detectors. Its changes
//! never reach the parent's or a sibling's `changedState`.
//!
//! Nested sub-environments are addressed by name paths joined with
//! [`PATH_SEPARATOR`] (`"floor 1/hall"`).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::detector::MotionDetector;
use crate::environment::{Environment, EnvironmentId, DEFAULT_ENVIRONMENT_NAME};
use crate::error::{BindingError, ValidationError};
use crate::event::{Emitter, ListenerId};
use crate::value::Value;

/// Separates names in a sub-environment path.
pub const PATH_SEPARATOR: char = '/';

/// One child of a MultiEnvironment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubEnvironment {
    /// A plain environment.
    Environment(Environment),
    /// A nested MultiEnvironment.
    Multi(MultiEnvironment),
}

impl SubEnvironment {
    /// Name the child is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Environment(env) => env.name(),
            Self::Multi(multi) => multi.name(),
        }
    }

    /// Unique id of the child.
    #[must_use]
    pub fn id(&self) -> EnvironmentId {
        match self {
            Self::Environment(env) => env.id(),
            Self::Multi(multi) => multi.id(),
        }
    }

    /// The child as a plain environment.
    #[must_use]
    pub const fn as_environment(&self) -> Option<&Environment> {
        match self {
            Self::Environment(env) => Some(env),
            Self::Multi(_) => None,
        }
    }

    /// The child as a nested MultiEnvironment.
    #[must_use]
    pub const fn as_multi(&self) -> Option<&MultiEnvironment> {
        match self {
            Self::Multi(multi) => Some(multi),
            Self::Environment(_) => None,
        }
    }

    /// Detectors bound anywhere below this child.
    #[must_use]
    pub fn detectors(&self) -> Vec<MotionDetector> {
        match self {
            Self::Environment(env) => env.detectors(),
            Self::Multi(multi) => multi.detectors(),
        }
    }

    fn forward(&self, value: &Value) {
        match self {
            Self::Environment(env) => {
                env.add_change(value.clone());
            }
            Self::Multi(multi) => {
                multi.add_change(Change::Value(value.clone()));
            }
        }
    }
}

impl From<Environment> for SubEnvironment {
    fn from(env: Environment) -> Self {
        Self::Environment(env)
    }
}

impl From<MultiEnvironment> for SubEnvironment {
    fn from(multi: MultiEnvironment) -> Self {
        Self::Multi(multi)
    }
}

/// Sub-environments keyed by name.
pub type SubEnvironments = BTreeMap<String, SubEnvironment>;

/// Input accepted by [`MultiEnvironment::add_change`].
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A plain sub-environment to register.
    Environment(Environment),
    /// A nested MultiEnvironment to register.
    MultiEnvironment(MultiEnvironment),
    /// Anything else; never changes the mapping.
    Value(Value),
}

impl From<Environment> for Change {
    fn from(env: Environment) -> Self {
        Self::Environment(env)
    }
}

impl From<MultiEnvironment> for Change {
    fn from(multi: MultiEnvironment) -> Self {
        Self::MultiEnvironment(multi)
    }
}

impl From<SubEnvironment> for Change {
    fn from(sub: SubEnvironment) -> Self {
        match sub {
            SubEnvironment::Environment(env) => Self::Environment(env),
            SubEnvironment::Multi(multi) => Self::MultiEnvironment(multi),
        }
    }
}

impl From<Value> for Change {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<i32> for Change {
    fn from(v: i32) -> Self {
        Self::Value(v.into())
    }
}

impl From<f64> for Change {
    fn from(v: f64) -> Self {
        Self::Value(v.into())
    }
}

impl From<&str> for Change {
    fn from(v: &str) -> Self {
        Self::Value(v.into())
    }
}

impl From<serde_json::Value> for Change {
    fn from(v: serde_json::Value) -> Self {
        Self::Value(v.into())
    }
}

/// Events a MultiEnvironment emits.
#[derive(Debug, Clone)]
pub enum MultiEnvironmentEvent {
    /// A sub-environment was registered.
    ChangedState {
        /// Mapping before the registration.
        old: SubEnvironments,
        /// Mapping after the registration.
        new: SubEnvironments,
    },
    /// A non-environment input was received.
    IgnoredChange {
        /// Mapping at the time, unchanged.
        current: SubEnvironments,
        /// The input.
        ignored: Change,
    },
}

/// Result of [`MultiEnvironment::add_change`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiChangeOutcome {
    /// A sub-environment was registered under `name`.
    Registered {
        /// Key it was stored under.
        name: String,
        /// True if an entry with that name was replaced.
        replaced: bool,
    },
    /// The input was not an environment, or registering it would make the
    /// tree contain itself.
    Ignored,
}

/// Construction options.
#[derive(Debug, Clone, Default)]
pub struct MultiEnvironmentOptions {
    /// Name; also the key under which a parent MultiEnvironment stores it.
    pub name: Option<String>,
    /// Sub-environments to start with.
    pub state: Option<Vec<SubEnvironment>>,
}

struct MultiInner {
    id: EnvironmentId,
    name: String,
    original_state: SubEnvironments,
    subs: RwLock<SubEnvironments>,
    events: Emitter<MultiEnvironmentEvent>,
}

/// Shared handle to a MultiEnvironment.
///
/// # Examples
///
/// ```
/// use vermon::{Environment, MultiEnvironment};
///
/// let multi = MultiEnvironment::default();
/// multi.add_change(Environment::named("Environment 1"));
/// multi.add_change("Some String");
///
/// let state = multi.current_state();
/// assert_eq!(state.len(), 1);
/// assert_eq!(state["Environment 1"].name(), "Environment 1");
/// ```
#[derive(Clone)]
pub struct MultiEnvironment {
    inner: Arc<MultiInner>,
}

impl MultiEnvironment {
    /// Creates a MultiEnvironment from options.
    #[must_use]
    pub fn new(options: MultiEnvironmentOptions) -> Self {
        let original_state: SubEnvironments = options
            .state
            .unwrap_or_default()
            .into_iter()
            .map(|sub| (sub.name().to_string(), sub))
            .collect();

        Self {
            inner: Arc::new(MultiInner {
                id: EnvironmentId::new(),
                name: options.name.unwrap_or_else(|| DEFAULT_ENVIRONMENT_NAME.to_string()),
                subs: RwLock::new(original_state.clone()),
                original_state,
                events: Emitter::new(),
            }),
        }
    }

    /// Builds a MultiEnvironment from loosely typed options
    /// (`{"name": .., "state": [<environment>, ..]}`).
    ///
    /// `state` must be an array whose items all describe environments,
    /// see [`sub_environment_from_value`].
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(obj) => obj,
            other => {
                return Err(ValidationError::InvalidField {
                    field: "params".to_string(),
                    reason: format!(
                        "MultiEnvironment expects an object of options, got {}",
                        Value::from(other.clone()).type_name()
                    ),
                })
            }
        };

        let name = match obj.get("name") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(name)) => Some(name.clone()),
            Some(other) => {
                return Err(ValidationError::InvalidField {
                    field: "name".to_string(),
                    reason: format!("expected a string, got {other}"),
                })
            }
        };

        let state = match obj.get("state") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .map(sub_environment_from_value)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(ValidationError::MultiEnvironmentStateNotArray),
        };

        Ok(Self::new(MultiEnvironmentOptions { name, state }))
    }

    /// Unique id of this MultiEnvironment.
    #[must_use]
    pub fn id(&self) -> EnvironmentId {
        self.inner.id
    }

    /// Name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the sub-environment mapping.
    #[must_use]
    pub fn current_state(&self) -> SubEnvironments {
        self.read().clone()
    }

    /// Sub-environments given at construction.
    #[must_use]
    pub fn original_state(&self) -> &SubEnvironments {
        &self.inner.original_state
    }

    /// Looks up a child by name or by a path through nested
    /// MultiEnvironments (`"floor 1/hall"`).
    #[must_use]
    pub fn node(&self, path: &str) -> Option<SubEnvironment> {
        if let Some(sub) = self.read().get(path) {
            return Some(sub.clone());
        }
        let (head, rest) = path.split_once(PATH_SEPARATOR)?;
        let child = self.read().get(head).cloned()?;
        child.as_multi()?.node(rest)
    }

    /// Looks up a plain sub-environment by name or path.
    #[must_use]
    pub fn sub_environment(&self, path: &str) -> Option<Environment> {
        match self.node(path)? {
            SubEnvironment::Environment(env) => Some(env),
            SubEnvironment::Multi(_) => None,
        }
    }

    /// Returns true if `other` is this MultiEnvironment or sits anywhere
    /// below it.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        self.read()
            .values()
            .filter_map(SubEnvironment::as_multi)
            .any(|m| m.contains(other))
    }

    /// Registers a sub-environment, or forwards any other input to the
    /// sub-environments and reports it as ignored.
    pub fn add_change(&self, input: impl Into<Change>) -> MultiChangeOutcome {
        match input.into() {
            Change::Environment(env) => self.register(env.into()),
            Change::MultiEnvironment(multi) => {
                if multi.contains(self) {
                    warn!(environment = %self.name(), sub_environment = %multi.name(), "refusing to nest a MultiEnvironment inside itself");
                    self.emit_ignored(Change::MultiEnvironment(multi));
                    return MultiChangeOutcome::Ignored;
                }
                self.register(multi.into())
            }
            Change::Value(value) => {
                for sub in self.current_state().values() {
                    sub.forward(&value);
                }
                debug!(environment = %self.name(), input = %value, "ignored non-environment change");
                self.emit_ignored(Change::Value(value));
                MultiChangeOutcome::Ignored
            }
        }
    }

    fn emit_ignored(&self, ignored: Change) {
        self.inner.events.emit(&MultiEnvironmentEvent::IgnoredChange {
            current: self.current_state(),
            ignored,
        });
    }

    fn register(&self, sub: SubEnvironment) -> MultiChangeOutcome {
        let name = sub.name().to_string();
        let (old, new, replaced) = {
            let mut subs = self.write();
            let old = subs.clone();
            let replaced = subs.insert(name.clone(), sub).is_some();
            (old, subs.clone(), replaced)
        };

        debug!(environment = %self.name(), sub_environment = %name, replaced, "registered sub-environment");
        self.inner.events.emit(&MultiEnvironmentEvent::ChangedState { old, new });
        MultiChangeOutcome::Registered { name, replaced }
    }

    /// Binds a detector to the plain sub-environment at `path`.
    pub fn bind_detector(&self, path: &str, detector: &MotionDetector) -> Result<(), BindingError> {
        match self.node(path) {
            Some(SubEnvironment::Environment(env)) => {
                env.bind_detector(detector);
                Ok(())
            }
            Some(SubEnvironment::Multi(multi)) => Err(BindingError::CompositeTarget {
                name: multi.name().to_string(),
            }),
            None => Err(BindingError::UnknownSubEnvironment {
                name: path.to_string(),
            }),
        }
    }

    /// Detectors bound anywhere in the tree, ordered by sub-environment name.
    #[must_use]
    pub fn detectors(&self) -> Vec<MotionDetector> {
        self.current_state().values().flat_map(SubEnvironment::detectors).collect()
    }

    /// Registers a listener for every MultiEnvironment event.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MultiEnvironmentEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(listener)
    }

    /// Registers a `changedState(old, new)` listener.
    pub fn on_changed_state<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SubEnvironments, &SubEnvironments) + Send + Sync + 'static,
    {
        self.on(move |event| {
            if let MultiEnvironmentEvent::ChangedState { old, new } = event {
                listener(old, new);
            }
        })
    }

    /// Registers an `ignoredChange(current, ignored)` listener.
    pub fn on_ignored_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SubEnvironments, &Change) + Send + Sync + 'static,
    {
        self.on(move |event| {
            if let MultiEnvironmentEvent::IgnoredChange { current, ignored } = event {
                listener(current, ignored);
            }
        })
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SubEnvironments> {
        self.inner.subs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SubEnvironments> {
        self.inner.subs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MultiEnvironment {
    fn default() -> Self {
        Self::new(MultiEnvironmentOptions::default())
    }
}

impl PartialEq for MultiEnvironment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MultiEnvironment {}

impl fmt::Debug for MultiEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiEnvironment")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("sub_environments", &self.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads one item of a MultiEnvironment `state`.
///
/// Accepted forms are plain environment options
/// (`{"name": .., "state": .., "filters": ..}`) and the constructor forms
/// `{"$new$Environment": {"params": {..}}}` and
/// `{"$new$MultiEnvironment": {"params": {..}}}`, the latter read
/// recursively.
pub fn sub_environment_from_value(value: &serde_json::Value) -> Result<SubEnvironment, ValidationError> {
    let Some(obj) = value.as_object() else {
        return Err(ValidationError::MultiEnvironmentStateNotEnvironment {
            found: Value::from(value.clone()).type_name().to_string(),
        });
    };

    let params = |ctor: &serde_json::Value| ctor.get("params").cloned().unwrap_or(serde_json::Value::Null);

    if let Some(ctor) = obj.get("$new$Environment") {
        return Ok(Environment::from_value(&params(ctor))?.into());
    }
    if let Some(ctor) = obj.get("$new$MultiEnvironment") {
        return Ok(MultiEnvironment::from_value(&params(ctor))?.into());
    }
    if let Some(key) = obj.keys().find(|k| k.starts_with("$new$")) {
        return Err(ValidationError::MultiEnvironmentStateNotEnvironment {
            found: key.trim_start_matches("$new$").to_string(),
        });
    }

    Ok(Environment::from_value(value)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&SubEnvironments, &SubEnvironments) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &SubEnvironments, _: &SubEnvironments| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn house() -> MultiEnvironment {
        MultiEnvironment::from_value(&serde_json::json!({
            "name": "house",
            "state": [
                { "$new$MultiEnvironment": { "params": { "name": "floor 1", "state": [
                    { "$new$Environment": { "params": { "name": "hall", "state": 1 } } },
                    { "$new$Environment": { "params": { "name": "kitchen" } } }
                ] } } },
                { "$new$Environment": { "params": { "name": "garden" } } }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn registers_sub_environments_by_name() {
        let multi = MultiEnvironment::default();
        multi.add_change(Environment::named("Environment 1"));
        multi.add_change(Environment::named("Environment 2"));

        let state = multi.current_state();
        assert_eq!(state["Environment 1"].name(), "Environment 1");
        assert_eq!(state["Environment 2"].name(), "Environment 2");
    }

    #[test]
    fn duplicate_name_replaces_entry() {
        let multi = MultiEnvironment::default();
        multi.add_change(Environment::named("e"));
        let second = Environment::named("e");
        let outcome = multi.add_change(second.clone());
        assert_eq!(
            outcome,
            MultiChangeOutcome::Registered {
                name: "e".to_string(),
                replaced: true
            }
        );
        assert_eq!(multi.current_state().len(), 1);
        assert_eq!(multi.sub_environment("e"), Some(second));
    }

    #[test]
    fn registration_fires_changed_state_once() {
        let multi = MultiEnvironment::default();
        let changes = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&changes);
        multi.on_changed_state(move |old, new| {
            assert_eq!(old.len() + 1, new.len());
            c.fetch_add(1, Ordering::SeqCst);
        });

        multi.add_change(Environment::named("e"));
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_environment_inputs_are_ignored() {
        let multi = MultiEnvironment::default();
        multi.on_changed_state(|_, _| panic!("changedState must not fire"));
        let ignores = Arc::new(AtomicUsize::new(0));
        let i = Arc::clone(&ignores);
        multi.on_ignored_change(move |current, _| {
            assert!(current.is_empty());
            i.fetch_add(1, Ordering::SeqCst);
        });

        multi.add_change("Some String");
        multi.add_change(1222);
        multi.add_change(serde_json::json!([6, 8]));
        multi.add_change(serde_json::json!({"test": "Some sort of object"}));

        assert_eq!(ignores.load(Ordering::SeqCst), 4);
        assert!(multi.current_state().is_empty());
    }

    #[test]
    fn bind_detector_to_unknown_sub_environment_fails() {
        let multi = MultiEnvironment::default();
        let err = multi.bind_detector("nope", &MotionDetector::default()).unwrap_err();
        assert_eq!(
            err,
            BindingError::UnknownSubEnvironment {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn from_value_rejects_non_array_state() {
        let err = MultiEnvironment::from_value(&serde_json::json!({"state": 333})).unwrap_err();
        assert_eq!(err, ValidationError::MultiEnvironmentStateNotArray);
    }

    #[test]
    fn from_value_rejects_non_environment_items() {
        let err = MultiEnvironment::from_value(&serde_json::json!({"state": ["a", "b"]})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "MultiEnvironment expects a state of type Array of type Environment, found 'String'"
        );

        let err = MultiEnvironment::from_value(&serde_json::json!({"state": [{"$new$BaseNotifier": {}}]})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MultiEnvironmentStateNotEnvironment {
                found: "BaseNotifier".to_string()
            }
        );
    }

    #[test]
    fn from_value_rejects_non_string_names() {
        let err = MultiEnvironment::from_value(&serde_json::json!({
            "state": [{ "$new$Environment": { "params": { "name": 7 } } }]
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "name"));

        let err = MultiEnvironment::from_value(&serde_json::json!({ "name": ["x"] })).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { ref field, .. } if field == "name"));
    }

    #[test]
    fn from_value_reads_constructor_form() {
        let multi = MultiEnvironment::from_value(&serde_json::json!({
            "name": "My MultiEnvironment",
            "state": [
                {"$new$Environment": {"params": {"name": "Environment 1", "state": 1}}},
                {"$new$Environment": {"params": {"name": "Environment 2", "state": 3}}}
            ]
        }))
        .unwrap();

        assert_eq!(multi.name(), "My MultiEnvironment");
        assert_eq!(multi.sub_environment("Environment 1").unwrap().current_state(), Value::Number(1.0));
        assert_eq!(
            multi.sub_environment("Environment 2").unwrap().original_state(),
            &Value::Number(3.0)
        );
        assert_eq!(multi.original_state().len(), 2);
    }

    #[test]
    fn nested_multi_environments_resolve_by_path() {
        let multi = house();
        let floor = multi.node("floor 1").unwrap();
        assert!(floor.as_multi().is_some());
        assert_eq!(multi.sub_environment("floor 1"), None);
        assert_eq!(
            multi.sub_environment("floor 1/hall").unwrap().current_state(),
            Value::Number(1.0)
        );
        assert!(multi.node("floor 1/attic").is_none());
        assert!(multi.node("garden/hall").is_none());
    }

    #[test]
    fn grandchild_changes_stay_local() {
        let multi = house();
        let floor = multi.node("floor 1").unwrap().as_multi().unwrap().clone();
        let (root_changes, on_root) = counter();
        let (floor_changes, on_floor) = counter();
        multi.on_changed_state(on_root);
        floor.on_changed_state(on_floor);

        let kitchen_changes = Arc::new(AtomicUsize::new(0));
        let garden_changes = Arc::new(AtomicUsize::new(0));
        let k = Arc::clone(&kitchen_changes);
        let g = Arc::clone(&garden_changes);
        multi.sub_environment("floor 1/kitchen").unwrap().on_changed_state(move |_, _| {
            k.fetch_add(1, Ordering::SeqCst);
        });
        multi.sub_environment("garden").unwrap().on_changed_state(move |_, _| {
            g.fetch_add(1, Ordering::SeqCst);
        });

        let hall = multi.sub_environment("floor 1/hall").unwrap();
        assert!(hall.add_change(2).is_committed());

        assert_eq!(hall.current_state(), Value::Number(3.0));
        assert_eq!(root_changes.load(Ordering::SeqCst), 0);
        assert_eq!(floor_changes.load(Ordering::SeqCst), 0);
        assert_eq!(kitchen_changes.load(Ordering::SeqCst), 0);
        assert_eq!(garden_changes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn nested_registration_fires_only_the_owner() {
        let multi = house();
        let floor = multi.node("floor 1").unwrap().as_multi().unwrap().clone();
        let (root_changes, on_root) = counter();
        let (floor_changes, on_floor) = counter();
        multi.on_changed_state(on_root);
        floor.on_changed_state(on_floor);

        floor.add_change(Environment::named("bathroom"));
        assert_eq!(floor_changes.load(Ordering::SeqCst), 1);
        assert_eq!(root_changes.load(Ordering::SeqCst), 0);
        assert!(multi.sub_environment("floor 1/bathroom").is_some());
    }

    #[test]
    fn values_are_forwarded_through_the_tree() {
        let multi = house();
        multi.add_change(5);
        assert_eq!(multi.sub_environment("floor 1/hall").unwrap().current_state(), Value::Number(6.0));
        assert_eq!(multi.sub_environment("floor 1/kitchen").unwrap().current_state(), Value::Number(5.0));
        assert_eq!(multi.sub_environment("garden").unwrap().current_state(), Value::Number(5.0));
    }

    #[test]
    fn detectors_bind_by_path() {
        let multi = house();
        let d = MotionDetector::new("pir", 0.0);
        multi.bind_detector("floor 1/hall", &d).unwrap();
        d.start_monitoring();

        multi.add_change(1);
        assert_eq!(d.count(), 1);
        assert_eq!(multi.detectors(), vec![d]);

        let err = multi.bind_detector("floor 1", &MotionDetector::default()).unwrap_err();
        assert_eq!(
            err,
            BindingError::CompositeTarget {
                name: "floor 1".to_string()
            }
        );
    }

    #[test]
    fn registering_itself_is_ignored() {
        let multi = house();
        let floor = multi.node("floor 1").unwrap().as_multi().unwrap().clone();
        assert_eq!(floor.add_change(multi.clone()), MultiChangeOutcome::Ignored);
        assert_eq!(multi.add_change(multi.clone()), MultiChangeOutcome::Ignored);
        assert_eq!(floor.current_state().len(), 2);
    }
}
