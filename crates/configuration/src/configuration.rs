//! The configuration the engine serves requests with.

use std::collections::BTreeMap;
use std::sync::Arc;

use query_engine_metadata::metadata::Registry;
use query_engine_translation::translation::query::{Assembler, CustomQueryset, EngineSettings};

use crate::base_queries::ConfiguredBaseQueries;
use crate::permissions::ConfiguredPermissions;

/// The 'Configuration' type collects all the information necessary to serve
/// requests at runtime.
///
/// Values of this type are produced from a 'ParsedConfiguration' using
/// 'make_runtime_configuration', which validates everything a request could
/// trip over: entity declarations, policy filters, base filters and custom
/// querysets.
pub struct Configuration {
    pub registry: Arc<Registry>,
    pub settings: EngineSettings,
    pub permissions: ConfiguredPermissions,
    pub base_queries: ConfiguredBaseQueries,
    pub custom_querysets: BTreeMap<String, Box<dyn CustomQueryset>>,
}

impl Configuration {
    /// An assembler over this configuration.
    pub fn assembler(&self) -> Assembler<'_> {
        Assembler {
            registry: &self.registry,
            permissions: &self.permissions,
            base: &self.base_queries,
            custom_querysets: &self.custom_querysets,
            settings: self.settings,
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("permissions", &self.permissions)
            .field("base_queries", &self.base_queries)
            .field(
                "custom_querysets",
                &self.custom_querysets.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
