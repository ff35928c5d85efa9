//! Pipeline: the owning context that wires environments, detectors and
//! notifiers together.
//!
//! The pipeline owns the root environment (plain or composite), the
//! registered detectors and the registered notifiers. Notifiers are bound to
//! detectors with [`BaseNotifier::bind_to_detector`]: by default to every
//! detector, or only to named ones. A detection reaches its bound notifiers
//! in the order the notifiers were added.

use tracing::{debug, info};

use crate::detector::{DetectorId, MotionDetector};
use crate::environment::{ChangeOutcome, Environment};
use crate::error::BindingError;
use crate::multi::{Change, MultiChangeOutcome, MultiEnvironment};
use crate::notifier::{BaseNotifier, NotificationData};
use crate::value::Value;

/// Text of the notification pushed by [`Pipeline::start`].
pub const STARTED_TEXT: &str = "Started";

/// The environment a pipeline watches.
#[derive(Debug, Clone)]
pub enum RootEnvironment {
    /// A plain environment.
    Single(Environment),
    /// A composite environment; detectors bind to its sub-environments.
    Multi(MultiEnvironment),
}

impl RootEnvironment {
    /// Name of the root environment.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Single(env) => env.name(),
            Self::Multi(multi) => multi.name(),
        }
    }

    /// The root as a plain environment.
    #[must_use]
    pub const fn as_single(&self) -> Option<&Environment> {
        match self {
            Self::Single(env) => Some(env),
            Self::Multi(_) => None,
        }
    }

    /// The root as a MultiEnvironment.
    #[must_use]
    pub const fn as_multi(&self) -> Option<&MultiEnvironment> {
        match self {
            Self::Multi(multi) => Some(multi),
            Self::Single(_) => None,
        }
    }
}

impl From<Environment> for RootEnvironment {
    fn from(env: Environment) -> Self {
        Self::Single(env)
    }
}

impl From<MultiEnvironment> for RootEnvironment {
    fn from(multi: MultiEnvironment) -> Self {
        Self::Multi(multi)
    }
}

/// Outcome of [`Pipeline::add_change`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineChange {
    /// Result from a plain root environment.
    Single(ChangeOutcome),
    /// Result from a composite root environment.
    Multi(MultiChangeOutcome),
}

/// Which detectors a registered notifier listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    /// Every detector, current and future.
    All,
    /// Only the named detectors.
    Detectors(Vec<String>),
}

impl Scope {
    fn covers(&self, detector: &MotionDetector) -> bool {
        match self {
            Self::All => true,
            Self::Detectors(names) => names.iter().any(|n| n == detector.name()),
        }
    }
}

#[derive(Debug)]
struct NotifierEntry {
    notifier: BaseNotifier,
    scope: Scope,
}

/// Owning context for one environment graph.
///
/// # Examples
///
/// ```
/// use vermon::{BaseNotifier, Environment, MotionDetector, Pipeline};
///
/// let mut pipeline = Pipeline::new(Environment::default());
/// let notifier = BaseNotifier::new("console");
/// let stream = notifier.subscribe(8);
/// pipeline.add_notifier(notifier);
/// pipeline.add_detector(MotionDetector::new("hall", 0.0), None).unwrap();
///
/// pipeline.add_change(20);
/// let n = stream.try_recv().unwrap();
/// assert_eq!(n.data.new_state.as_number(), Some(20.0));
/// ```
#[derive(Debug)]
pub struct Pipeline {
    root: RootEnvironment,
    detectors: Vec<MotionDetector>,
    notifiers: Vec<NotifierEntry>,
}

impl Pipeline {
    /// Creates a pipeline watching `root`.
    #[must_use]
    pub fn new(root: impl Into<RootEnvironment>) -> Self {
        Self {
            root: root.into(),
            detectors: Vec::new(),
            notifiers: Vec::new(),
        }
    }

    /// The root environment.
    #[must_use]
    pub const fn environment(&self) -> &RootEnvironment {
        &self.root
    }

    /// Looks up a plain sub-environment of a composite root by name or path.
    #[must_use]
    pub fn sub_environment(&self, path: &str) -> Option<Environment> {
        self.root.as_multi().and_then(|m| m.sub_environment(path))
    }

    /// Binds `detector` to `target` (or the root environment), starts it and
    /// binds every notifier whose scope covers it, in registration order.
    pub fn add_detector(&mut self, detector: MotionDetector, target: Option<&Environment>) -> Result<(), BindingError> {
        let env = match (target, &self.root) {
            (Some(env), _) => env.clone(),
            (None, RootEnvironment::Single(env)) => env.clone(),
            (None, RootEnvironment::Multi(multi)) => {
                return Err(BindingError::CompositeTarget {
                    name: multi.name().to_string(),
                })
            }
        };

        env.bind_detector(&detector);
        detector.start_monitoring();
        for entry in self.notifiers.iter().filter(|e| e.scope.covers(&detector)) {
            entry.notifier.bind_to_detector(&detector);
        }

        debug!(detector = %detector.name(), environment = %env.name(), "added detector to pipeline");
        self.detectors.push(detector);
        Ok(())
    }

    /// Binds `detector` to the sub-environment at `path` of a composite root.
    pub fn add_detector_to_sub_environment(&mut self, detector: MotionDetector, path: &str) -> Result<(), BindingError> {
        let env = self
            .sub_environment(path)
            .ok_or_else(|| BindingError::UnknownSubEnvironment {
                name: path.to_string(),
            })?;
        self.add_detector(detector, Some(&env))
    }

    /// Unbinds a detector from its environment and from every notifier.
    pub fn remove_detector(&mut self, id: DetectorId) -> Option<MotionDetector> {
        let pos = self.detectors.iter().position(|d| d.id() == id)?;
        let detector = self.detectors.remove(pos);
        for entry in &self.notifiers {
            entry.notifier.unbind_from_detector(&detector);
        }
        if let Some(env) = detector.environment() {
            // Only fails if someone else already unbound it.
            let _ = env.unbind_detector(&detector);
        }
        Some(detector)
    }

    /// Adds a notifier listening to every detector, current and future.
    pub fn add_notifier(&mut self, notifier: BaseNotifier) {
        for detector in &self.detectors {
            notifier.bind_to_detector(detector);
        }
        debug!(notifier = %notifier.name(), "added notifier to pipeline");
        self.notifiers.push(NotifierEntry {
            notifier,
            scope: Scope::All,
        });
    }

    /// Adds a notifier listening only to the named detectors, including ones
    /// added later under those names.
    ///
    /// Fails without registering anything if a name matches no current
    /// detector.
    pub fn add_notifier_for(&mut self, notifier: BaseNotifier, detectors: &[&str]) -> Result<(), BindingError> {
        if let Some(missing) = detectors.iter().find(|name| self.detector(name).is_none()) {
            return Err(BindingError::UnknownDetector {
                name: (*missing).to_string(),
            });
        }

        let scope = Scope::Detectors(detectors.iter().map(|n| (*n).to_string()).collect());
        for detector in self.detectors.iter().filter(|d| scope.covers(d)) {
            notifier.bind_to_detector(detector);
        }
        debug!(notifier = %notifier.name(), detectors = ?detectors, "added scoped notifier to pipeline");
        self.notifiers.push(NotifierEntry { notifier, scope });
        Ok(())
    }

    /// Registered detectors, in the order they were added.
    #[must_use]
    pub fn detectors(&self) -> Vec<MotionDetector> {
        self.detectors.clone()
    }

    /// Looks up a detector by name.
    #[must_use]
    pub fn detector(&self, name: &str) -> Option<MotionDetector> {
        self.detectors.iter().find(|d| d.name() == name).cloned()
    }

    /// Registered notifiers, in the order they were added.
    #[must_use]
    pub fn notifiers(&self) -> Vec<BaseNotifier> {
        self.notifiers.iter().map(|e| e.notifier.clone()).collect()
    }

    /// Feeds a change into the root environment.
    pub fn add_change(&self, delta: impl Into<Value>) -> PipelineChange {
        match &self.root {
            RootEnvironment::Single(env) => PipelineChange::Single(env.add_change(delta)),
            RootEnvironment::Multi(multi) => PipelineChange::Multi(multi.add_change(Change::Value(delta.into()))),
        }
    }

    /// Announces the pipeline on every notifier.
    pub fn start(&self) {
        info!(
            environment = %self.root.name(),
            detectors = self.detectors.len(),
            notifiers = self.notifiers.len(),
            "pipeline started"
        );
        for entry in &self.notifiers {
            entry.notifier.notify(
                format!("vermon is watching {}", self.root.name()),
                STARTED_TEXT,
                NotificationData {
                    environment: Some(self.root.name().to_string()),
                    ..NotificationData::default()
                },
            );
        }
    }

    /// Unbinds every detector and forgets all detectors and notifiers.
    pub fn reset(&mut self) {
        let ids: Vec<DetectorId> = self.detectors.iter().map(MotionDetector::id).collect();
        for id in ids {
            self.remove_detector(id);
        }
        self.notifiers.clear();
        debug!(environment = %self.root.name(), "pipeline reset");
    }
}
