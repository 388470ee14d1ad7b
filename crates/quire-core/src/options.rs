//! Extension options.
//!
//! Every extension carries two option sets, each declared as its own serde struct:
//!
//! - **static** options are fixed at construction time. They may shape the schema, commands or
//!   key bindings, so changing them later is rejected.
//! - **dynamic** options may be changed at runtime through
//!   [`Manager::set_extension_options`](crate::Manager::set_extension_options), which notifies the
//!   extension via [`Extension::on_set_options`](crate::Extension::on_set_options).
//!
//! # Example
//!
//! ```rust
//! use quire_core::Options;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Static { level: u8 }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Dynamic { placeholder: String }
//!
//! let options = Options::new(&Static { level: 3 }, &Dynamic { placeholder: "Type...".into() }).unwrap();
//! assert!(options.is_static("level"));
//! let dynamic: Dynamic = options.dynamic_options().unwrap();
//! assert_eq!(dynamic.placeholder, "Type...");
//! ```

use crate::error::ConfigurationError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Static and dynamic option values of one extension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    static_values: Map<String, Value>,
    dynamic_values: Map<String, Value>,
}

/// A single changed dynamic option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChange {
    /// Option key.
    pub key: String,
    /// Value before the change.
    pub previous: Value,
    /// Value after the change.
    pub value: Value,
}

/// The set of dynamic options changed by one update, in key order of the patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionChanges {
    /// Individual changes. Keys set to their current value are not listed.
    pub changes: Vec<OptionChange>,
}

impl OptionChanges {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns `true` if `key` changed.
    pub fn changed(&self, key: &str) -> bool {
        self.changes.iter().any(|c| c.key == key)
    }

    /// The new value of `key`, if it changed.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.changes.iter().find(|c| c.key == key).map(|c| &c.value)
    }
}

impl Options {
    /// Build from typed static and dynamic option structs.
    ///
    /// Both must serialize to JSON objects and may not share keys.
    pub fn new<St, Dy>(static_options: &St, dynamic_options: &Dy) -> Result<Self, ConfigurationError>
    where
        St: Serialize + ?Sized,
        Dy: Serialize + ?Sized,
    {
        let static_values = to_map(static_options)?;
        let dynamic_values = to_map(dynamic_options)?;
        if let Some(key) = static_values.keys().find(|k| dynamic_values.contains_key(*k)) {
            return Err(ConfigurationError::AmbiguousOption { key: key.clone() });
        }
        Ok(Self {
            static_values,
            dynamic_values,
        })
    }

    /// An extension without options.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a value in either set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.dynamic_values
            .get(key)
            .or_else(|| self.static_values.get(key))
    }

    /// Returns `true` if `key` is a static option.
    pub fn is_static(&self, key: &str) -> bool {
        self.static_values.contains_key(key)
    }

    /// Raw static values.
    pub fn static_values(&self) -> &Map<String, Value> {
        &self.static_values
    }

    /// Raw dynamic values.
    pub fn dynamic_values(&self) -> &Map<String, Value> {
        &self.dynamic_values
    }

    /// Deserialize the static set into its typed struct.
    pub fn static_options<T: DeserializeOwned>(&self) -> Result<T, ConfigurationError> {
        Ok(serde_json::from_value(Value::Object(
            self.static_values.clone(),
        ))?)
    }

    /// Deserialize the dynamic set into its typed struct.
    pub fn dynamic_options<T: DeserializeOwned>(&self) -> Result<T, ConfigurationError> {
        Ok(serde_json::from_value(Value::Object(
            self.dynamic_values.clone(),
        ))?)
    }

    /// Apply a patch of dynamic values.
    ///
    /// The whole patch is validated before anything is written: a static or unknown key rejects
    /// the patch and leaves the options untouched.
    pub(crate) fn apply(
        &mut self,
        extension: &str,
        patch: Map<String, Value>,
    ) -> Result<OptionChanges, ConfigurationError> {
        for key in patch.keys() {
            if self.static_values.contains_key(key) {
                return Err(ConfigurationError::StaticOption {
                    extension: extension.to_string(),
                    key: key.clone(),
                });
            }
            if !self.dynamic_values.contains_key(key) {
                return Err(ConfigurationError::UnknownOption {
                    extension: extension.to_string(),
                    key: key.clone(),
                });
            }
        }

        let mut changes = OptionChanges::default();
        for (key, value) in patch {
            let Some(slot) = self.dynamic_values.get_mut(&key) else {
                continue;
            };
            if *slot == value {
                continue;
            }
            let previous = std::mem::replace(slot, value.clone());
            changes.changes.push(OptionChange {
                key,
                previous,
                value,
            });
        }
        Ok(changes)
    }
}

fn to_map<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>, ConfigurationError> {
    object(serde_json::to_value(value)?)
}

/// Unwrap a JSON object. `null` counts as an empty object.
pub(crate) fn object(value: Value) -> Result<Map<String, Value>, ConfigurationError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::Bool(_) => Err(ConfigurationError::OptionsNotAnObject("a boolean")),
        Value::Number(_) => Err(ConfigurationError::OptionsNotAnObject("a number")),
        Value::String(_) => Err(ConfigurationError::OptionsNotAnObject("a string")),
        Value::Array(_) => Err(ConfigurationError::OptionsNotAnObject("an array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct HeadingStatic {
        levels: Vec<u8>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct HeadingDynamic {
        default_level: u8,
    }

    fn heading_options() -> Options {
        Options::new(
            &HeadingStatic {
                levels: vec![1, 2, 3],
            },
            &HeadingDynamic { default_level: 1 },
        )
        .unwrap()
    }

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_typed_round_trip() {
        let options = heading_options();
        let st: HeadingStatic = options.static_options().unwrap();
        assert_eq!(st.levels, vec![1, 2, 3]);
        assert!(options.is_static("levels"));
        assert!(!options.is_static("default_level"));
        assert_eq!(options.get("default_level"), Some(&json!(1)));
    }

    #[test]
    fn test_setting_static_option_is_rejected() {
        let mut options = heading_options();
        let err = options
            .apply("heading", patch(json!({ "levels": [1] })))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::StaticOption { ref key, .. } if key == "levels"
        ));
        assert_eq!(options, heading_options());
    }

    #[test]
    fn test_unknown_key_rejects_whole_patch() {
        let mut options = heading_options();
        let err = options
            .apply(
                "heading",
                patch(json!({ "default_level": 2, "missing": true })),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownOption { .. }));
        assert_eq!(options.get("default_level"), Some(&json!(1)));
    }

    #[test]
    fn test_apply_reports_only_real_changes() {
        let mut options = heading_options();
        let changes = options
            .apply("heading", patch(json!({ "default_level": 1 })))
            .unwrap();
        assert!(changes.is_empty());

        let changes = options
            .apply("heading", patch(json!({ "default_level": 4 })))
            .unwrap();
        assert!(changes.changed("default_level"));
        assert_eq!(changes.changes[0].previous, json!(1));
        let dynamic: HeadingDynamic = options.dynamic_options().unwrap();
        assert_eq!(dynamic.default_level, 4);
    }

    #[test]
    fn test_shared_keys_are_ambiguous() {
        let err = Options::new(&json!({ "a": 1 }), &json!({ "a": 2 })).unwrap_err();
        assert!(matches!(err, ConfigurationError::AmbiguousOption { .. }));
    }

    #[test]
    fn test_non_object_options_are_rejected() {
        let err = Options::new(&json!([1, 2]), &json!({})).unwrap_err();
        assert!(matches!(err, ConfigurationError::OptionsNotAnObject(_)));
    }
}
