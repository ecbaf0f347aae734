use std::fs;

use query_engine_translation::request::{QueryRequest, Requester};
use query_engine_translation::translation::error::Error;
use query_engine_translation::translation::query::Plan;
use querygate_configuration::environment::FixedEnvironment;
use querygate_configuration::{make_runtime_configuration, Configuration, ParsedConfiguration};

fn configuration() -> Configuration {
    tests_common::init_logger();
    let parsed: ParsedConfiguration =
        serde_json::from_value(tests_common::blog_configuration()).unwrap();
    make_runtime_configuration(parsed, FixedEnvironment::default()).unwrap()
}

fn plan(testname: &str) -> Result<Plan, Error> {
    let request: QueryRequest = serde_json::from_str(
        fs::read_to_string(format!("tests/goldenfiles/{testname}/request.json"))
            .unwrap()
            .as_str(),
    )
    .unwrap();
    let requester: Requester = serde_json::from_str(
        fs::read_to_string(format!("tests/goldenfiles/{testname}/requester.json"))
            .unwrap()
            .as_str(),
    )
    .unwrap();

    configuration().assembler().plan(&request, &requester)
}

/// Plan a request and render what would run against the store.
pub fn test_translation(testname: &str) -> Result<String, Error> {
    Ok(match plan(testname)? {
        Plan::Read { query, .. } | Plan::Exists { query } => query.to_string(),
        Plan::Aggregate {
            query, aggregates, ..
        } => {
            let mut rendered = query.to_string();
            for aggregate in aggregates {
                rendered.push_str(&format!("\nAGGREGATE {aggregate}"));
            }
            rendered
        }
        Plan::Create { write, .. } => write.to_string(),
    })
}

/// Plan a request and list the field paths it returns.
pub fn test_selection(testname: &str) -> Result<String, Error> {
    Ok(plan(testname)?
        .selection()
        .map(|selection| selection.paths().join("\n"))
        .unwrap_or_default())
}
