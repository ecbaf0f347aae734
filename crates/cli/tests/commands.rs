use std::path::Path;

use querygate_cli::{run, Command, Context, RequesterArgs};
use querygate_configuration::environment::FixedEnvironment;

async fn run_in(context_path: &Path, command: Command) -> anyhow::Result<String> {
    let context = Context {
        context_path: context_path.to_owned(),
        environment: FixedEnvironment::default(),
    };
    let mut out = Vec::new();
    run(command, context, &mut out).await?;
    Ok(String::from_utf8(out)?)
}

#[tokio::test]
async fn initialize_writes_a_configuration_and_its_schema() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    run_in(dir.path(), Command::Initialize).await?;

    assert!(dir.path().join("configuration.json").exists());
    assert!(dir.path().join("schema.json").exists());

    let output = run_in(dir.path(), Command::Schema).await?;
    let written = std::fs::read_to_string(dir.path().join("schema.json"))?;
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&output)?,
        serde_json::from_str::<serde_json::Value>(&written)?
    );
    Ok(())
}

#[tokio::test]
async fn initialize_refuses_to_overwrite() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    run_in(dir.path(), Command::Initialize).await?;
    let error = run_in(dir.path(), Command::Initialize).await.unwrap_err();
    assert!(error.to_string().contains("already exists"));
    Ok(())
}

#[tokio::test]
async fn compile_prints_the_assembled_query() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let request = dir.path().join("request.json");
    std::fs::write(&request, r#"{"entity": "blog.comment"}"#)?;

    let output = run_in(
        &tests_common::blog_configuration_dir(),
        Command::Compile {
            request,
            requester: RequesterArgs::default(),
            describe: false,
        },
    )
    .await?;
    assert_eq!(
        output,
        "FROM blog.comment\nEXCLUDE [base] hidden exact true\nFILTER [permission] NOT post__published exact false\nLIMIT 100\nSELECT id, body, hidden\n"
    );
    Ok(())
}

#[tokio::test]
async fn compile_prints_aggregates_without_a_selection() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let request = dir.path().join("request.json");
    std::fs::write(
        &request,
        r#"{"entity": "blog.post", "operation": {"type": "avg", "field": "rating"}}"#,
    )?;

    let output = run_in(
        &tests_common::blog_configuration_dir(),
        Command::Compile {
            request,
            requester: RequesterArgs::default(),
            describe: false,
        },
    )
    .await?;
    assert_eq!(
        output,
        "FROM blog.post\nFILTER [permission] published exact true\nAGGREGATE avg(rating) AS rating__avg\n"
    );
    Ok(())
}

#[tokio::test]
async fn run_prints_the_response_payload() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let request = dir.path().join("request.json");
    std::fs::write(
        &request,
        r#"{"entity": "blog.post", "ast": {"type": "sort", "fields": ["title"]}}"#,
    )?;

    let output = run_in(
        &tests_common::blog_configuration_dir(),
        Command::Run {
            request,
            dataset: tests_common::blog_configuration_dir().join("dataset.json"),
            requester: RequesterArgs {
                user: Some("2".to_string()),
                roles: vec![],
            },
        },
    )
    .await?;
    let payload: serde_json::Value = serde_json::from_str(&output)?;
    assert_eq!(payload["data"], serde_json::json!([3, 1, 4]));
    assert_eq!(payload["model_name"], "blog.post");
    Ok(())
}

#[tokio::test]
async fn run_prints_single_values_for_counts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let request = dir.path().join("request.json");
    std::fs::write(
        &request,
        r#"{"entity": "blog.post", "operation": {"type": "count"}}"#,
    )?;

    let output = run_in(
        &tests_common::blog_configuration_dir(),
        Command::Run {
            request,
            dataset: tests_common::blog_configuration_dir().join("dataset.json"),
            requester: RequesterArgs {
                user: Some("2".to_string()),
                roles: vec![],
            },
        },
    )
    .await?;
    let response: serde_json::Value = serde_json::from_str(&output)?;
    assert_eq!(
        response,
        serde_json::json!({"data": 3, "model_name": "blog.post"})
    );
    Ok(())
}

#[tokio::test]
async fn graph_lists_relations() -> anyhow::Result<()> {
    let output = run_in(
        &tests_common::blog_configuration_dir(),
        Command::Graph {
            entity: "blog.author".to_string(),
            depth: Some(1),
        },
    )
    .await?;
    assert!(output.starts_with("blog.author\n"));
    assert!(output.contains("  posts -> blog.post (many) reverse read-only\n"));
    assert!(output.contains("  author -> blog.author (one)\n"));
    Ok(())
}
