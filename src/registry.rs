use std::sync::Arc;

use tracing::warn;

use crate::error::ScaleError;
use crate::scanner::FoundDevice;
use crate::{aku, lunar, themis, Scale};

/// Builds a scale driver for a discovered device.
pub type ScaleFactory = fn(FoundDevice) -> Arc<dyn Scale>;

/// Maps advertised device-name prefixes to scale constructors.
///
/// The registry is a plain value built at startup. Nothing registers itself
/// behind the scenes, so which implementations are available, and in what
/// order they match, is explicit and testable.
pub struct ScaleRegistry {
    entries: Vec<(&'static str, ScaleFactory)>,
}

impl ScaleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry with every built-in scale family.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(lunar::NAME_PREFIX, lunar::create);
        registry.register(themis::NAME_PREFIX, themis::create);
        registry.register(aku::NAME_PREFIX, aku::create);
        registry
    }

    /// Makes a scale implementation available by its device name prefix.
    /// For example, an implementation for a "LUNAR" scale registers the
    /// prefix "LUNAR" and matches a device named "LUNAR-A23B".
    pub fn register(&mut self, prefix: &'static str, factory: ScaleFactory) {
        if self.entries.iter().any(|(existing, _)| *existing == prefix) {
            warn!(prefix, "scale implementation for prefix is being overwritten");
            self.entries.retain(|(existing, _)| *existing != prefix);
        }
        self.entries.push((prefix, factory));
    }

    /// The name prefixes worth scanning for.
    pub fn prefixes(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(prefix, _)| *prefix).collect()
    }

    /// Whether any registered implementation matches the device name.
    pub fn supports(&self, device_name: &str) -> bool {
        self.entries
            .iter()
            .any(|(prefix, _)| device_name.starts_with(prefix))
    }

    /// Builds a scale driver for the given device, matching on its name
    /// prefix.
    pub fn scale_for(&self, device: FoundDevice) -> Result<Arc<dyn Scale>, ScaleError> {
        for (prefix, factory) in &self.entries {
            if device.name.starts_with(prefix) {
                return Ok(factory(device));
            }
        }
        Err(ScaleError::UnknownDevice(device.name))
    }
}

impl Default for ScaleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_matches_known_prefixes() {
        let registry = ScaleRegistry::with_defaults();
        assert!(registry.supports("LUNAR-A23B"));
        assert!(registry.supports("BOOKOO_SC_0F1A"));
        assert!(registry.supports("Varia AKU"));
        assert!(!registry.supports("KITCHEN-SCALE"));
        assert!(!registry.supports(""));
    }

    #[test]
    fn prefixes_lists_registered_families() {
        let registry = ScaleRegistry::with_defaults();
        let prefixes = registry.prefixes();
        assert!(prefixes.contains(&lunar::NAME_PREFIX));
        assert!(prefixes.contains(&themis::NAME_PREFIX));
        assert!(prefixes.contains(&aku::NAME_PREFIX));
    }

    #[test]
    fn registering_a_prefix_twice_replaces_the_first_entry() {
        let mut registry = ScaleRegistry::new();
        registry.register("LUNAR", lunar::create);
        registry.register("LUNAR", lunar::create);
        assert_eq!(registry.prefixes(), vec!["LUNAR"]);
    }

    #[test]
    fn empty_registry_supports_nothing() {
        let registry = ScaleRegistry::new();
        assert!(!registry.supports("LUNAR-A23B"));
        assert!(registry.prefixes().is_empty());
    }
}
