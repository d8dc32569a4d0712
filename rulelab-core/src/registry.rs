//! In-memory plugin registry.
//!
//! The simplest useful `PluginResolver`: a string-keyed map of shared
//! plugin handles. Registration validates plugin identity up front so a
//! half-formed plugin can never be resolved later.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::plugin::{PluginResolver, StrategyPlugin};

/// Registration failure. Registries refuse blank identities and silent
/// replacement — a duplicate id is almost always two plugins fighting
/// over the same name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin id must be a non-blank string")]
    BlankId,

    #[error("plugin `{0}` has a blank label")]
    BlankLabel(String),

    #[error("plugin `{0}` is already registered")]
    Duplicate(String),
}

/// String-keyed registry of shared plugin handles.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn StrategyPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the reference plugins shipped in
    /// [`crate::plugins`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for plugin in crate::plugins::builtins() {
            registry
                .register(plugin)
                .expect("builtin plugins have unique, non-blank metadata");
        }
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn StrategyPlugin>) -> Result<(), RegistryError> {
        let meta = plugin.meta();
        let id = meta.id.trim();
        if id.is_empty() {
            return Err(RegistryError::BlankId);
        }
        if meta.label.trim().is_empty() {
            return Err(RegistryError::BlankLabel(id.to_string()));
        }
        if self.plugins.contains_key(id) {
            return Err(RegistryError::Duplicate(id.to_string()));
        }
        self.plugins.insert(id.to_string(), plugin);
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn get(&self, plugin_id: &str) -> Option<&Arc<dyn StrategyPlugin>> {
        self.plugins.get(plugin_id)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginResolver for PluginRegistry {
    fn resolve(&self, plugin_id: &str) -> Option<Arc<dyn StrategyPlugin>> {
        self.plugins.get(plugin_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::error::PluginRuntimeError;
    use crate::plugin::PluginMeta;
    use crate::schema::{ParamRecord, ParamSchema};
    use serde_json::{json, Value};

    struct Stub {
        meta: PluginMeta,
    }

    impl Stub {
        fn named(id: &str, label: &str) -> Arc<dyn StrategyPlugin> {
            Arc::new(Self {
                meta: PluginMeta::new(id, label, ParamSchema::new()),
            })
        }
    }

    impl StrategyPlugin for Stub {
        fn meta(&self) -> &PluginMeta {
            &self.meta
        }

        fn run(
            &self,
            _ctx: &EvaluationContext,
            _params: &ParamRecord,
        ) -> Result<Value, PluginRuntimeError> {
            Ok(json!({}))
        }
    }

    #[test]
    fn register_then_resolve() {
        let mut registry = PluginRegistry::new();
        registry.register(Stub::named("alpha", "Alpha")).unwrap();
        assert!(registry.resolve("alpha").is_some());
        assert!(registry.resolve("beta").is_none());
    }

    #[test]
    fn blank_id_rejected() {
        let mut registry = PluginRegistry::new();
        let err = registry.register(Stub::named("  ", "Blank")).unwrap_err();
        assert_eq!(err, RegistryError::BlankId);
    }

    #[test]
    fn blank_label_rejected() {
        let mut registry = PluginRegistry::new();
        let err = registry.register(Stub::named("alpha", " ")).unwrap_err();
        assert_eq!(err, RegistryError::BlankLabel("alpha".into()));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(Stub::named("alpha", "Alpha")).unwrap();
        let err = registry.register(Stub::named("alpha", "Alpha 2")).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("alpha".into()));
    }

    #[test]
    fn ids_are_sorted_and_deterministic() {
        let mut registry = PluginRegistry::new();
        registry.register(Stub::named("zeta", "Z")).unwrap();
        registry.register(Stub::named("alpha", "A")).unwrap();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn builtins_registry_is_non_empty() {
        let registry = PluginRegistry::with_builtins();
        assert!(!registry.is_empty());
        assert!(registry.resolve("ma_cross").is_some());
        assert!(registry.resolve("price_threshold").is_some());
        assert!(registry.resolve("momentum").is_some());
    }
}
