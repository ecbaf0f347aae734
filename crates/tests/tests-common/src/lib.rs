//! Shared fixtures for the integration tests: a small blog and organisation
//! schema, its permission policies, and a dataset to run queries against.

use std::path::PathBuf;
use std::sync::{Arc, Once};

use query_engine_metadata::metadata::{EntitiesInfo, Registry};

const BLOG_CONFIGURATION: &str = include_str!("../fixtures/blog/configuration.json");
const BLOG_DATASET: &str = include_str!("../fixtures/blog/dataset.json");

pub const ALICE: &str = "11111111-1111-4111-8111-111111111111";
pub const BOB: &str = "22222222-2222-4222-8222-222222222222";

static INIT_LOGGER: Once = Once::new();

/// Send `tracing` output to the test harness, controlled by `RUST_LOG`.
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// The directory holding the fixture `configuration.json`.
pub fn blog_configuration_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("blog")
}

/// The full fixture configuration file, as JSON.
pub fn blog_configuration() -> serde_json::Value {
    serde_json::from_str(BLOG_CONFIGURATION).expect("fixture configuration is valid JSON")
}

/// The entities declared by the fixture configuration.
pub fn blog_entities() -> anyhow::Result<EntitiesInfo> {
    let mut configuration = blog_configuration();
    let entities = configuration
        .get_mut("entities")
        .map(serde_json::Value::take)
        .ok_or_else(|| anyhow::anyhow!("fixture configuration has no entities"))?;
    Ok(serde_json::from_value(entities)?)
}

/// A registry built from the fixture entities.
pub fn blog_registry() -> Arc<Registry> {
    init_logger();
    let entities = blog_entities().expect("fixture entities are valid");
    Arc::new(Registry::build(entities).expect("fixture registry is valid"))
}

/// The fixture dataset, keyed by entity name.
pub fn blog_dataset() -> serde_json::Value {
    serde_json::from_str(BLOG_DATASET).expect("fixture dataset is valid JSON")
}
