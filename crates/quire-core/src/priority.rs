//! Priority ordering.
//!
//! Extensions are composed in ascending priority order. Ties keep registration order, so the
//! sorted list is a stable total order for any input. An extension moved into a priority level by
//! an override joins that level after the extensions that declare it themselves.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Ordering key of an extension. Lower values sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Runs before everything else.
    pub const CRITICAL: Self = Self(0);
    /// Very early.
    pub const HIGHEST: Self = Self(100);
    /// Early.
    pub const HIGH: Self = Self(200);
    /// Between high and default.
    pub const MEDIUM: Self = Self(300);
    /// Used when an extension does not say.
    pub const DEFAULT: Self = Self(400);
    /// Late.
    pub const LOW: Self = Self(500);
    /// Runs after everything else.
    pub const LOWEST: Self = Self(600);
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The priority an extension composes with: the override if one exists, else its own.
pub fn effective_priority(
    name: &str,
    own: Priority,
    overrides: &BTreeMap<String, Priority>,
) -> Priority {
    overrides.get(name).copied().unwrap_or(own)
}

/// Compute the sorted order of `entries`, given in registration order as `(name, own priority)`.
///
/// Returns indices into `entries`. Fails if a name repeats or if an override names an extension
/// that is not in `entries`.
pub fn sort_order(
    entries: &[(&str, Priority)],
    overrides: &BTreeMap<String, Priority>,
) -> Result<Vec<usize>, ConfigurationError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for (name, _) in entries {
        if !seen.insert(*name) {
            return Err(ConfigurationError::DuplicateExtension(name.to_string()));
        }
    }
    if let Some(unknown) = overrides.keys().find(|k| !seen.contains(k.as_str())) {
        return Err(ConfigurationError::UnknownPriorityOverride(unknown.clone()));
    }

    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by_key(|&i| {
        let (name, own) = entries[i];
        (
            effective_priority(name, own, overrides),
            overrides.contains_key(name),
            i,
        )
    });
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sorts_ascending() {
        let entries = [
            ("big", Priority::LOWEST),
            ("dummy", Priority::CRITICAL),
            ("bold", Priority::DEFAULT),
        ];
        let order = sort_order(&entries, &BTreeMap::new()).unwrap();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_override_moves_extension() {
        let entries = [("dummy", Priority::CRITICAL), ("big", Priority::LOWEST)];
        let overrides = BTreeMap::from([("dummy".to_string(), Priority(1_000))]);
        let order = sort_order(&entries, &overrides).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_override_joins_level_after_its_members() {
        let entries = [("dummy", Priority::CRITICAL), ("big", Priority::LOWEST)];
        let overrides = BTreeMap::from([("dummy".to_string(), Priority::LOWEST)]);
        assert_eq!(sort_order(&entries, &overrides).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_unknown_override_is_an_error() {
        let entries = [("dummy", Priority::CRITICAL)];
        let overrides = BTreeMap::from([("ghost".to_string(), Priority::LOW)]);
        let err = sort_order(&entries, &overrides).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPriorityOverride(ref n) if n == "ghost"));
    }

    #[test]
    fn test_duplicate_names_are_an_error() {
        let entries = [("a", Priority::LOW), ("a", Priority::HIGH)];
        assert!(matches!(
            sort_order(&entries, &BTreeMap::new()),
            Err(ConfigurationError::DuplicateExtension(_))
        ));
    }

    #[test]
    fn test_ties_keep_registration_order_for_random_inputs() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(0..40);
            let names: Vec<String> = (0..len).map(|i| format!("ext{i}")).collect();
            let entries: Vec<(&str, Priority)> = names
                .iter()
                .map(|n| (n.as_str(), Priority(rng.gen_range(0..4) * 100)))
                .collect();

            let order = sort_order(&entries, &BTreeMap::new()).unwrap();
            for pair in order.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                assert!(entries[a].1 <= entries[b].1);
                if entries[a].1 == entries[b].1 {
                    assert!(a < b, "equal priorities must keep registration order");
                }
            }
        }
    }
}
