//! The configuration files we ship must satisfy the generated JSON schema.

use querygate_configuration::ParsedConfiguration;

#[test]
fn fixture_configuration_conforms_to_the_schema() {
    let schema = serde_json::to_value(schemars::schema_for!(ParsedConfiguration)).unwrap();
    let compiled = jsonschema::JSONSchema::compile(&schema).expect("the schema compiles");

    let instance = tests_common::blog_configuration();
    if let Err(errors) = compiled.validate(&instance) {
        let messages: Vec<String> = errors
            .map(|error| format!("{}: {error}", error.instance_path))
            .collect();
        panic!("configuration does not conform:\n{}", messages.join("\n"));
    }

    // and it parses
    let _: ParsedConfiguration = serde_json::from_value(instance.clone()).unwrap();
}

#[test]
fn the_initial_configuration_conforms_to_the_schema() {
    let schema = serde_json::to_value(schemars::schema_for!(ParsedConfiguration)).unwrap();
    let compiled = jsonschema::JSONSchema::compile(&schema).expect("the schema compiles");
    let initial = serde_json::to_value(ParsedConfiguration::initial()).unwrap();
    assert!(compiled.is_valid(&initial));
}
