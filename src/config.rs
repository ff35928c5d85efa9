//! Profile-based configuration.
//!
//! A config document is JSON in one of three shapes:
//!
//! - an object of named profiles, the `default` entry being active
//!   (optionally nested under a `profiles` key),
//! - an array of profiles, the first one marked `"active": true` being
//!   active (or the first one),
//! - a bare profile, stored as `default`.
//!
//! A profile maps class names (`Environment`, `MotionDetector`, ...) or
//! reserved keywords (`slack`, `raspistill`) to their parameters. Turning a
//! profile into entities is the job of [`crate::factory`].

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value as Json};

use crate::error::ConfigError;

/// Name of the profile used when none is requested.
pub const DEFAULT_PROFILE: &str = "default";

/// One profile: class name or keyword to parameters.
pub type Profile = Map<String, Json>;

/// Loaded profiles plus the name of the active one.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    profiles: BTreeMap<String, Profile>,
    active: String,
}

impl Config {
    /// Parses a config document.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let doc: Json = serde_json::from_str(s).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        Self::from_json(doc)
    }

    /// Reads and parses a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Interprets an already parsed document.
    pub fn from_json(doc: Json) -> Result<Self, ConfigError> {
        match doc {
            Json::Array(items) => {
                if items.is_empty() {
                    return Err(ConfigError::Parse {
                        message: "profile array is empty".to_string(),
                    });
                }
                let mut profiles = BTreeMap::new();
                let mut active = None;
                for (i, item) in items.into_iter().enumerate() {
                    let profile = into_profile(item, &i.to_string())?;
                    if active.is_none() && profile.get("active").and_then(Json::as_bool) == Some(true) {
                        active = Some(i.to_string());
                    }
                    profiles.insert(i.to_string(), profile);
                }
                Ok(Self {
                    profiles,
                    active: active.unwrap_or_else(|| "0".to_string()),
                })
            }
            Json::Object(mut obj) => {
                if let Some(Json::Object(nested)) = obj.remove("profiles") {
                    return Self::named(nested);
                }
                if obj.get(DEFAULT_PROFILE).is_some_and(Json::is_object) {
                    return Self::named(obj);
                }
                Ok(Self::single(obj))
            }
            other => Err(ConfigError::Parse {
                message: format!("expected an object or an array of profiles, got {other}"),
            }),
        }
    }

    fn named(obj: Map<String, Json>) -> Result<Self, ConfigError> {
        let mut profiles = BTreeMap::new();
        for (name, item) in obj {
            let profile = into_profile(item, &name)?;
            profiles.insert(name, profile);
        }
        if !profiles.contains_key(DEFAULT_PROFILE) {
            return Err(ConfigError::ProfileNotFound {
                name: DEFAULT_PROFILE.to_string(),
            });
        }
        Ok(Self {
            profiles,
            active: DEFAULT_PROFILE.to_string(),
        })
    }

    /// Config holding exactly one profile, stored as `default`.
    #[must_use]
    pub fn single(profile: Profile) -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(DEFAULT_PROFILE.to_string(), profile);
        Self {
            profiles,
            active: DEFAULT_PROFILE.to_string(),
        }
    }

    /// The active profile.
    #[must_use]
    pub fn active_profile(&self) -> &Profile {
        // `active` always names an existing profile.
        &self.profiles[&self.active]
    }

    /// Name of the active profile.
    #[must_use]
    pub fn active_name(&self) -> &str {
        &self.active
    }

    /// Looks up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.to_string(),
        })
    }

    /// Makes another profile active.
    pub fn select(&mut self, name: &str) -> Result<(), ConfigError> {
        self.profile(name)?;
        self.active = name.to_string();
        Ok(())
    }

    /// Reads one property of a profile.
    pub fn property(&self, profile: &str, key: &str) -> Result<Option<&Json>, ConfigError> {
        Ok(self.profile(profile)?.get(key))
    }

    /// Names of all profiles.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for Config {
    /// One environment, one detector and one notifier.
    fn default() -> Self {
        let doc = serde_json::json!({
            "Environment": { "params": { "name": "Default Environment" } },
            "MotionDetector": { "params": { "name": "Default Detector" } },
            "BaseNotifier": { "params": { "name": "Default Base Notifier" } }
        });
        match doc {
            Json::Object(profile) => Self::single(profile),
            _ => Self::single(Map::new()),
        }
    }
}

fn into_profile(item: Json, name: &str) -> Result<Profile, ConfigError> {
    match item {
        Json::Object(profile) => Ok(profile),
        other => Err(ConfigError::Parse {
            message: format!("profile '{name}' must be an object, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_profile_becomes_default() {
        let mock = json!({ "slack": { "hook": "test" }, "raspistill": { "options": {} } });
        let c = Config::from_json(mock.clone()).unwrap();
        assert_eq!(Json::Object(c.active_profile().clone()), mock);
        assert_eq!(c.active_name(), DEFAULT_PROFILE);
    }

    #[test]
    fn named_profiles_activate_default() {
        let default = json!({ "slack": { "hook": "x" } });
        let c = Config::from_json(json!({
            "profile1": {},
            "profile2": {},
            "default": default.clone()
        }))
        .unwrap();
        assert_eq!(Json::Object(c.active_profile().clone()), default);
        assert_eq!(c.profile_names().count(), 3);
    }

    #[test]
    fn profiles_key_is_unwrapped() {
        let c = Config::from_json(json!({
            "profiles": { "default": { "some_group": { "some_property": "Test Property" } } }
        }))
        .unwrap();
        let group = c.property("default", "some_group").unwrap().unwrap();
        assert_eq!(group["some_property"], json!("Test Property"));
    }

    #[test]
    fn array_profiles_pick_active_entry() {
        let active = json!({ "active": true, "slack": { "hook": "x" } });
        let c = Config::from_json(json!([{}, active.clone(), {}])).unwrap();
        assert_eq!(Json::Object(c.active_profile().clone()), active);
    }

    #[test]
    fn array_profiles_default_to_first() {
        let c = Config::from_json(json!([{ "a": 1 }, { "b": 2 }])).unwrap();
        assert_eq!(c.active_name(), "0");
    }

    #[test]
    fn select_unknown_profile_fails() {
        let mut c = Config::default();
        let err = c.select("nope").unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound { .. }));
        assert!(c.select(DEFAULT_PROFILE).is_ok());
    }

    #[test]
    fn rejects_scalars() {
        assert!(matches!(Config::from_json_str("42"), Err(ConfigError::Parse { .. })));
        assert!(matches!(Config::from_json_str("{"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
