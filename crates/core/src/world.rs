use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// World used when nothing is enabled.
pub const FALLBACK_WORLD: &str = "commerce";

/// Enabled/disabled worlds and the subject-type to world mapping.
///
/// The remote authority requires `ctx.world` on every decision request, so
/// the engine always resolves one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRegistry {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Subject type -> world key.
    #[serde(default)]
    pub subjects: BTreeMap<String, String>,
}

impl WorldRegistry {
    pub fn is_enabled(&self, world: &str) -> bool {
        self.enabled.iter().any(|w| w == world)
    }

    pub fn is_disabled(&self, world: &str) -> bool {
        self.disabled.iter().any(|w| w == world)
    }

    pub fn exists(&self, world: &str) -> bool {
        self.is_enabled(world) || self.is_disabled(world)
    }

    /// First enabled world, or [`FALLBACK_WORLD`].
    pub fn default_key(&self) -> &str {
        self.enabled
            .first()
            .map(String::as_str)
            .unwrap_or(FALLBACK_WORLD)
    }

    /// World for a subject type: explicit mapping first, then the default.
    pub fn world_for(&self, subject_type: &str) -> &str {
        self.subjects
            .get(&subject_type.to_ascii_lowercase())
            .or_else(|| self.subjects.get(subject_type))
            .map(String::as_str)
            .unwrap_or_else(|| self.default_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> WorldRegistry {
        WorldRegistry {
            enabled: vec!["marketplace".to_string()],
            disabled: vec!["messaging".to_string(), "social".to_string()],
            subjects: [("rental".to_string(), "rentals".to_string())]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn default_is_first_enabled_world() {
        assert_eq!(registry().default_key(), "marketplace");
        assert_eq!(WorldRegistry::default().default_key(), FALLBACK_WORLD);
    }

    #[test]
    fn explicit_subject_mapping_wins() {
        let r = registry();
        assert_eq!(r.world_for("rental"), "rentals");
        assert_eq!(r.world_for("Rental"), "rentals");
        assert_eq!(r.world_for("order"), "marketplace");
    }

    #[test]
    fn enabled_and_disabled_lookup() {
        let r = registry();
        assert!(r.is_enabled("marketplace"));
        assert!(r.is_disabled("social"));
        assert!(r.exists("messaging"));
        assert!(!r.exists("food"));
    }
}
