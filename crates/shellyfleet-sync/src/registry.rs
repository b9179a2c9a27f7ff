use std::collections::HashMap;
use std::sync::Arc;

use shellyfleet_domain::SyncRole;

use crate::error::SyncError;
use crate::plugin::SyncPlugin;

/// Two-level key `(role, name)` dispatch: a plain `HashMap` keyed by a
/// small `Copy` enum plus a string, registered once at startup.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<(SyncRole, String), Arc<dyn SyncPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` under `role`. A plugin that serves both roles
    /// (e.g. `json`) is registered twice, once per role, since the
    /// registry key is `(role, name)` not `name` alone.
    pub fn register(&mut self, role: SyncRole, plugin: Arc<dyn SyncPlugin>) -> &mut Self {
        let name = plugin.descriptor().name;
        self.plugins.insert((role, name), plugin);
        self
    }

    pub fn for_role_name(&self, role: SyncRole, name: &str) -> Result<Arc<dyn SyncPlugin>, SyncError> {
        self.plugins
        .get(&(role, name.to_string()))
        .cloned()
        .ok_or_else(|| SyncError::UnknownPlugin { role, name: name.to_string() })
    }

    pub fn descriptors(&self) -> Vec<shellyfleet_domain::PluginDescriptor> {
        self.plugins.values().map(|p| p.descriptor()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::json::JsonPlugin;

    #[test]
    fn registers_and_resolves_by_role_and_name() {
        let mut registry = PluginRegistry::new();
        registry.register(SyncRole::Export, Arc::new(JsonPlugin::new()));
        let plugin = registry.for_role_name(SyncRole::Export, "json");
        assert!(plugin.is_ok());
    }

    #[test]
    fn unknown_plugin_is_not_found() {
        let registry = PluginRegistry::new();
        let err = registry.for_role_name(SyncRole::Export, "nope").unwrap_err();
        assert!(matches!(err, SyncError::UnknownPlugin { .. }));
    }
}
