//! The querygate command line: initialize a configuration, inspect what it
//! exposes, and compile or run requests against it.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use tokio::fs;

use query_engine_execution::{process_request, InMemoryStore};
use query_engine_metadata::metadata::Cardinality;
use query_engine_predicate::predicate::ast::PassOrigin;
use query_engine_translation::request::{QueryRequest, Requester};
use query_engine_translation::translation::describe::describe_query;
use query_engine_translation::translation::query::Plan;
use querygate_configuration::environment::Environment;
use querygate_configuration::version1::CONFIGURATION_FILENAME;
use querygate_configuration::{
    make_runtime_configuration, parse_configuration, write_parsed_configuration, Configuration,
    ParsedConfiguration,
};

/// The various contextual bits and bobs we need to run.
pub struct Context<Env: Environment> {
    pub context_path: PathBuf,
    pub environment: Env,
}

/// Who to make a request as.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RequesterArgs {
    /// The id of the requester. Parsed as JSON when it can be, e.g. `2`,
    /// otherwise taken as a string. Absent means anonymous.
    #[arg(long = "as-user", value_name = "ID")]
    pub user: Option<String>,
    /// A role of the requester; repeat for several.
    #[arg(long = "role", value_name = "ROLE")]
    pub roles: Vec<String>,
}

impl RequesterArgs {
    pub fn requester(&self) -> Requester {
        let mut requester = match &self.user {
            Some(id) => Requester::user(
                serde_json::from_str(id).unwrap_or_else(|_| serde_json::Value::String(id.clone())),
            ),
            None => Requester::anonymous(),
        };
        requester.roles.extend(self.roles.iter().cloned());
        requester
    }
}

/// The command invoked by the user.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Write an empty configuration into the context directory.
    Initialize,
    /// Print the JSON schema of the configuration file.
    Schema,
    /// Print the relations reachable from an entity.
    Graph {
        entity: String,
        /// Only list entities within this many relation hops.
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Compile a request and print the query it would run.
    Compile {
        /// The request document.
        #[arg(long, value_name = "PATH")]
        request: PathBuf,
        #[command(flatten)]
        requester: RequesterArgs,
        /// Also print the client's part of the query as a query tree.
        #[arg(long)]
        describe: bool,
    },
    /// Run a request against a JSON dataset and print the response.
    Run {
        /// The request document.
        #[arg(long, value_name = "PATH")]
        request: PathBuf,
        /// A JSON object mapping entity names to lists of rows.
        #[arg(long, value_name = "PATH")]
        dataset: PathBuf,
        #[command(flatten)]
        requester: RequesterArgs,
    },
}

/// Run a command in a given directory, writing what it prints to `out`.
pub async fn run(
    command: Command,
    context: Context<impl Environment>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Initialize => initialize(&context).await?,
        Command::Schema => schema(out)?,
        Command::Graph { entity, depth } => graph(&context, &entity, depth, out).await?,
        Command::Compile {
            request,
            requester,
            describe,
        } => compile(&context, &request, &requester.requester(), describe, out).await?,
        Command::Run {
            request,
            dataset,
            requester,
        } => run_request(&context, &request, &dataset, &requester.requester(), out).await?,
    };
    Ok(())
}

/// Initialize an empty directory with an empty configuration and its schema.
///
/// This will fail if the directory already holds a configuration.
async fn initialize(context: &Context<impl Environment>) -> anyhow::Result<()> {
    let configuration_file = context.context_path.join(CONFIGURATION_FILENAME);
    if fs::try_exists(&configuration_file).await? {
        anyhow::bail!(
            "a configuration already exists at {}",
            configuration_file.display()
        );
    }
    write_parsed_configuration(ParsedConfiguration::initial(), &context.context_path).await?;
    tracing::info!(path = %context.context_path.display(), "initialized configuration");
    Ok(())
}

fn schema(out: &mut impl Write) -> anyhow::Result<()> {
    let schema = schemars::schema_for!(ParsedConfiguration);
    writeln!(out, "{}", serde_json::to_string_pretty(&schema)?)?;
    Ok(())
}

async fn load(context: &Context<impl Environment>) -> anyhow::Result<Configuration> {
    let parsed = parse_configuration(&context.context_path).await?;
    Ok(make_runtime_configuration(parsed, &context.environment)?)
}

async fn read_request(path: &Path) -> anyhow::Result<QueryRequest> {
    let contents = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}

async fn graph(
    context: &Context<impl Environment>,
    entity: &str,
    depth: Option<usize>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let configuration = load(context).await?;
    let graph = configuration.registry.graph(entity)?;
    let reachable = depth.map(|depth| graph.reachable_within(depth));

    for node in graph.entity_nodes() {
        if reachable
            .as_ref()
            .is_some_and(|reachable| !reachable.contains(node))
        {
            continue;
        }
        writeln!(out, "{node}")?;
        for relation in graph.relations_of(node.as_str()) {
            let cardinality = match relation.cardinality {
                Cardinality::One => "one",
                Cardinality::Many => "many",
            };
            let mut flags = String::new();
            if relation.reverse {
                flags.push_str(" reverse");
            }
            if relation.read_only {
                flags.push_str(" read-only");
            }
            writeln!(
                out,
                "  {} -> {} ({cardinality}){flags}",
                relation.field, relation.target
            )?;
        }
    }
    Ok(())
}

async fn compile(
    context: &Context<impl Environment>,
    request: &Path,
    requester: &Requester,
    describe: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let configuration = load(context).await?;
    let request = read_request(request).await?;
    let plan = configuration.assembler().plan(&request, requester)?;

    match &plan {
        Plan::Read { query, .. } | Plan::Exists { query } => {
            writeln!(out, "{query}")?;
            if describe {
                let tree = describe_query(query, Some(&PassOrigin::Client));
                writeln!(out, "{}", serde_json::to_string_pretty(&tree)?)?;
            }
        }
        Plan::Aggregate {
            query, aggregates, ..
        } => {
            writeln!(out, "{query}")?;
            for aggregate in aggregates {
                writeln!(out, "AGGREGATE {aggregate}")?;
            }
        }
        Plan::Create { write, .. } => writeln!(out, "{write}")?,
    }
    if let Some(selection) = plan.selection() {
        writeln!(out, "SELECT {}", selection.paths().join(", "))?;
    }
    Ok(())
}

async fn run_request(
    context: &Context<impl Environment>,
    request: &Path,
    dataset: &Path,
    requester: &Requester,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let configuration = load(context).await?;
    let request = read_request(request).await?;
    let dataset = serde_json::from_str(&fs::read_to_string(dataset).await?)?;
    let store = InMemoryStore::from_json(configuration.registry.clone(), dataset)?;

    let response =
        process_request(&configuration.assembler(), &store, &request, requester).await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
    Ok(())
}
