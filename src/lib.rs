//! # vermon - reactive sensor pipeline
//!
//! vermon models a sensor as a stateful **Environment** that accumulates
//! changes. **MotionDetectors** bound to an environment react to committed
//! changes and report them to **Notifiers**. **Filters** suppress changes
//! either before they are committed (environment level) or before they are
//! reported (detector level). A **MultiEnvironment** aggregates several
//! independent environments by name.
//!
//! ## Core Concepts
//!
//! - **Environment**: mutable state, a filter chain and bound detectors
//! - **MotionDetector**: turns committed changes into `hasDetected` events
//! - **Filter**: a predicate deciding whether a change propagates
//! - **BaseNotifier**: terminal sink emitting `pushedNotification`
//! - **Pipeline**: owning context wiring detectors to notifiers
//!
//! ## Usage
//!
//! ```rust
//! use vermon::{Environment, EnvironmentOptions, Filter, MotionDetector};
//!
//! let env = Environment::new(EnvironmentOptions::default().with_filter(Filter::high_pass(10.0)));
//! let detector = MotionDetector::new("hall", 0.0);
//! env.bind_detector(&detector);
//! detector.start_monitoring();
//!
//! env.add_change(5);
//! assert_eq!(env.current_state().as_number(), Some(0.0));
//! env.add_change(15);
//! assert_eq!(env.current_state().as_number(), Some(15.0));
//! assert_eq!(detector.count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core entities
pub mod detector;
pub mod environment;
pub mod error;
pub mod event;
pub mod filter;
pub mod multi;
pub mod notifier;
pub mod value;

// Wiring, configuration and delivery
pub mod config;
pub mod delivery;
pub mod factory;
pub mod pipeline;

// Re-export primary types at crate root for convenience
pub use config::{Config, Profile};
pub use delivery::{DeliveryConfig, DeliveryHandle, DeliveryQueue, LogSink, Sink};
pub use detector::{DetectorEvent, DetectorId, DetectorOptions, MotionDetector};
pub use environment::{ChangeOutcome, Environment, EnvironmentEvent, EnvironmentId, EnvironmentOptions};
pub use error::{BindingError, ConfigError, DeliveryError, ValidationError, VermonError, VermonResult};
pub use event::{Emitter, ListenerId};
pub use factory::{Entity, EntityClass, Factory};
pub use filter::{Filter, FilterContext};
pub use multi::{
    sub_environment_from_value, Change, MultiChangeOutcome, MultiEnvironment, MultiEnvironmentEvent,
    MultiEnvironmentOptions, SubEnvironment, SubEnvironments, PATH_SEPARATOR,
};
pub use notifier::{BaseNotifier, Notification, NotificationData, NotificationStream, NotifierEvent, NotifierId};
pub use pipeline::{Pipeline, PipelineChange, RootEnvironment};
pub use value::Value;
