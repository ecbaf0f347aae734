//! The first version of the configuration format.

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::fs;

use query_engine_metadata::metadata::{EntitiesInfo, EntityName};
use query_engine_translation::ast::Node;
use query_engine_translation::translation::query::EngineSettings;

use crate::error::{ParseConfigurationError, WriteParsedConfigurationError};
use crate::permissions::Policy;

const CURRENT_VERSION: u32 = 1;
pub const CONFIGURATION_FILENAME: &str = "configuration.json";
const CONFIGURATION_JSONSCHEMA_FILENAME: &str = "schema.json";

/// The configuration as it is written on disk: the entities the engine may
/// expose, who may read and create them, and the querysets built on them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ParsedConfiguration {
    // Which version of the configuration format are we using
    pub version: u32,
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub entities: EntitiesInfo,
    /// Access policies per entity. An entity without policies is not
    /// accessible to anyone.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub permissions: BTreeMap<EntityName, Vec<Policy>>,
    /// Named querysets a request may opt into.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_querysets: BTreeMap<String, CustomQuerysetConfig>,
    /// Filters every query of an entity starts from.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub base_filters: BTreeMap<EntityName, Node>,
}

/// A named query tree over one entity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct CustomQuerysetConfig {
    pub entity: EntityName,
    pub ast: Node,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParsedConfiguration {
    pub fn initial() -> Self {
        ParsedConfiguration::empty()
    }

    pub fn empty() -> Self {
        ParsedConfiguration {
            version: CURRENT_VERSION,
            settings: EngineSettings::default(),
            entities: EntitiesInfo::empty(),
            permissions: BTreeMap::new(),
            custom_querysets: BTreeMap::new(),
            base_filters: BTreeMap::new(),
        }
    }
}

/// Parse the configuration format from a directory.
pub async fn parse_configuration(
    configuration_dir: impl AsRef<Path>,
) -> Result<ParsedConfiguration, ParseConfigurationError> {
    let configuration_file = configuration_dir.as_ref().join(CONFIGURATION_FILENAME);

    let configuration_file_contents =
        fs::read_to_string(&configuration_file)
            .await
            .map_err(|err| {
                ParseConfigurationError::IoErrorButStringified(format!(
                    "{}: {}",
                    &configuration_file.display(),
                    err
                ))
            })?;

    let parsed_config: ParsedConfiguration = serde_json::from_str(&configuration_file_contents)
        .map_err(|error| ParseConfigurationError::ParseError {
            file_path: configuration_file.clone(),
            line: error.line(),
            column: error.column(),
            message: error.to_string(),
        })?;

    if parsed_config.version != CURRENT_VERSION {
        return Err(ParseConfigurationError::UnsupportedVersion(
            parsed_config.version,
        ));
    }

    tracing::debug!(
        file = %configuration_file.display(),
        entities = parsed_config.entities.0.len(),
        "parsed configuration"
    );
    Ok(parsed_config)
}

/// Write the parsed configuration into a directory on disk, along with the
/// JSON schema of the format.
pub async fn write_parsed_configuration(
    parsed_config: ParsedConfiguration,
    out_dir: impl AsRef<Path>,
) -> Result<(), WriteParsedConfigurationError> {
    let configuration_file = out_dir.as_ref().to_owned().join(CONFIGURATION_FILENAME);
    fs::create_dir_all(out_dir.as_ref()).await?;

    // create the configuration file
    fs::write(
        configuration_file,
        serde_json::to_string_pretty(&parsed_config)
            .map_err(|e| WriteParsedConfigurationError::IoError(e.into()))?
            + "\n",
    )
    .await?;

    // create the jsonschema file
    let configuration_jsonschema_file_path = out_dir
        .as_ref()
        .to_owned()
        .join(CONFIGURATION_JSONSCHEMA_FILENAME);

    let output = schemars::schema_for!(ParsedConfiguration);
    fs::write(
        &configuration_jsonschema_file_path,
        serde_json::to_string_pretty(&output)
            .map_err(|e| WriteParsedConfigurationError::IoError(e.into()))?
            + "\n",
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_the_fixture_configuration() {
        let parsed = parse_configuration(tests_common::blog_configuration_dir())
            .await
            .unwrap();
        assert_eq!(parsed.settings.max_depth, 3);
        assert_eq!(parsed.entities.0.len(), 7);
        assert_eq!(parsed.permissions[&EntityName::from("blog.post")].len(), 3);
        assert!(parsed.custom_querysets.contains_key("highly_rated"));
    }

    #[tokio::test]
    async fn written_configurations_parse_back() {
        let parsed = parse_configuration(tests_common::blog_configuration_dir())
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_parsed_configuration(parsed.clone(), dir.path())
            .await
            .unwrap();
        assert!(dir.path().join(CONFIGURATION_JSONSCHEMA_FILENAME).exists());
        let reparsed = parse_configuration(dir.path()).await.unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[tokio::test]
    async fn parse_errors_point_at_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIGURATION_FILENAME), "{\n  \"version\": 1,\n  oops\n}")
            .unwrap();
        let error = parse_configuration(dir.path()).await.unwrap_err();
        assert!(matches!(error, ParseConfigurationError::ParseError { line: 3, .. }));
    }

    #[tokio::test]
    async fn other_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIGURATION_FILENAME), r#"{"version": 2}"#).unwrap();
        let error = parse_configuration(dir.path()).await.unwrap_err();
        assert!(matches!(error, ParseConfigurationError::UnsupportedVersion(2)));
    }
}
