//! Builds entities and pipelines from configuration profiles.
//!
//! Every key of a profile is either a class name or a reserved keyword.
//! A class key holds one entry or an array of them; an entry is
//! `{"params": {..}}` or the params object itself.
//!
//! ```json
//! {
//!   "MultiEnvironment": { "params": { "name": "house", "state": [
//!     { "$new$Environment": { "params": { "name": "hall" } } }
//!   ] } },
//!   "MotionDetector": [ { "params": { "name": "pir", "subEnvironment": "hall" } } ],
//!   "BaseNotifier": { "params": { "name": "console" } }
//! }
//! ```

use std::fmt;

use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::config::Profile;
use crate::detector::MotionDetector;
use crate::environment::Environment;
use crate::error::{ConfigError, VermonResult};
use crate::multi::MultiEnvironment;
use crate::notifier::{BaseNotifier, DEFAULT_NOTIFIER_NAME};
use crate::pipeline::{Pipeline, RootEnvironment};

/// Profile keys that are not classes: integration settings and the
/// `active` profile marker. They are never instantiated.
pub const RESERVED_KEYWORDS: &[&str] = &["slack", "raspistill", "active"];

/// Detector param naming the sub-environment (name or path) to bind to
/// under a composite root.
pub const SUB_ENVIRONMENT_KEY: &str = "subEnvironment";

/// Notifier param restricting it to the named detectors.
pub const DETECTORS_KEY: &str = "detectors";

/// Classes the factory can instantiate.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    Environment,
    MultiEnvironment,
    MotionDetector,
    BaseNotifier,
}

impl EntityClass {
    /// Resolves a class name.
    pub fn resolve(name: &str) -> Result<Self, ConfigError> {
        if RESERVED_KEYWORDS.contains(&name) {
            return Err(ConfigError::ReservedKeyword {
                keyword: name.to_string(),
            });
        }
        match name {
            "Environment" => Ok(Self::Environment),
            "MultiEnvironment" => Ok(Self::MultiEnvironment),
            "MotionDetector" => Ok(Self::MotionDetector),
            "BaseNotifier" => Ok(Self::BaseNotifier),
            other => Err(ConfigError::UnknownClass {
                name: other.to_string(),
            }),
        }
    }

    /// The class name as written in profiles.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "Environment",
            Self::MultiEnvironment => "MultiEnvironment",
            Self::MotionDetector => "MotionDetector",
            Self::BaseNotifier => "BaseNotifier",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An instantiated entity.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub enum Entity {
    Environment(Environment),
    MultiEnvironment(MultiEnvironment),
    MotionDetector(MotionDetector),
    BaseNotifier(BaseNotifier),
}

/// Instantiates entities by class name.
#[derive(Debug, Default, Clone, Copy)]
pub struct Factory;

impl Factory {
    /// Instantiates one entity of `class` from its config entry.
    pub fn instantiate(class: EntityClass, entry: &Json) -> VermonResult<Entity> {
        let params = params_of(entry);
        let entity = match class {
            EntityClass::Environment => Entity::Environment(Environment::from_value(&params)?),
            EntityClass::MultiEnvironment => Entity::MultiEnvironment(MultiEnvironment::from_value(&params)?),
            EntityClass::MotionDetector => Entity::MotionDetector(MotionDetector::from_value(&params)?),
            EntityClass::BaseNotifier => {
                let name = params
                    .get("name")
                    .and_then(Json::as_str)
                    .unwrap_or(DEFAULT_NOTIFIER_NAME);
                Entity::BaseNotifier(BaseNotifier::new(name))
            }
        };
        debug!(class = %class, "instantiated entity");
        Ok(entity)
    }

    /// Instantiates an entity from a class name; reserved keywords and
    /// unknown names are errors.
    pub fn create(class: &str, entry: &Json) -> VermonResult<Entity> {
        Self::instantiate(EntityClass::resolve(class)?, entry)
    }

    /// Builds a pipeline from a profile.
    ///
    /// The profile must declare exactly one `Environment` or
    /// `MultiEnvironment`. A detector under a composite root must name its
    /// sub-environment. Notifiers listen to every detector unless their
    /// params list `detectors` by name.
    pub fn build(profile: &Profile) -> VermonResult<Pipeline> {
        let mut root: Option<RootEnvironment> = None;
        let mut notifiers = Vec::new();
        let mut detectors = Vec::new();

        for (key, value) in profile {
            if RESERVED_KEYWORDS.contains(&key.as_str()) {
                debug!(keyword = %key, "skipping reserved keyword");
                continue;
            }
            let class = EntityClass::resolve(key)?;
            for entry in entries_of(value) {
                let params = params_of(entry);
                match Self::instantiate(class, entry)? {
                    Entity::Environment(env) => set_root(&mut root, env.into())?,
                    Entity::MultiEnvironment(multi) => set_root(&mut root, multi.into())?,
                    Entity::BaseNotifier(notifier) => {
                        let scope = string_list(&params, DETECTORS_KEY)?;
                        notifiers.push((notifier, scope));
                    }
                    Entity::MotionDetector(detector) => {
                        let target = params
                            .get(SUB_ENVIRONMENT_KEY)
                            .and_then(Json::as_str)
                            .map(str::to_string);
                        detectors.push((detector, target));
                    }
                }
            }
        }

        let root = root.ok_or(ConfigError::MissingEnvironment)?;
        let mut pipeline = Pipeline::new(root);
        for (detector, target) in detectors {
            match target {
                Some(path) => pipeline.add_detector_to_sub_environment(detector, &path)?,
                None => pipeline.add_detector(detector, None)?,
            }
        }
        for (notifier, scope) in notifiers {
            match scope {
                Some(names) => {
                    let names: Vec<&str> = names.iter().map(String::as_str).collect();
                    pipeline.add_notifier_for(notifier, &names)?;
                }
                None => pipeline.add_notifier(notifier),
            }
        }
        Ok(pipeline)
    }
}

fn string_list(params: &Json, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
    let invalid = || ConfigError::Parse {
        message: format!("'{key}' must be an array of names"),
    };
    match params.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}

fn set_root(slot: &mut Option<RootEnvironment>, env: RootEnvironment) -> Result<(), ConfigError> {
    if let Some(existing) = slot {
        warn!(existing = %existing.name(), duplicate = %env.name(), "profile declares more than one environment");
        return Err(ConfigError::Parse {
            message: format!(
                "profile declares more than one environment ('{}' and '{}')",
                existing.name(),
                env.name()
            ),
        });
    }
    *slot = Some(env);
    Ok(())
}

fn entries_of(value: &Json) -> Vec<&Json> {
    match value {
        Json::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn params_of(entry: &Json) -> Json {
    match entry.get("params") {
        Some(params) => params.clone(),
        None => entry.clone(),
    }
}
