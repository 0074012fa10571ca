//! `specgraph` command-line interface
//!
//! Runs one service operation against a YAML entity directory and prints the
//! `ToolResult` as pretty JSON. Exits with status 1 when the operation fails.

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use specgraph_core::{SpecGraphService, ToolResult, YamlDirStore};
use specgraph_engine::{EngineConfig, ValidationOptions};
use specgraph_model::Payload;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    Command::new("specgraph")
        .version(specgraph_core::VERSION)
        .about("Specification graph consistency engine")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .default_value("specs")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding <kind>/<id>.yaml entity documents"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration (TOML)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(Command::new("deps").about("Dependency metrics and critical path"))
        .subcommand(Command::new("coverage").about("Coverage by category"))
        .subcommand(Command::new("cycles").about("Circular dependency chains"))
        .subcommand(Command::new("orphans").about("Unreferenced specs"))
        .subcommand(
            Command::new("validate")
                .about("Validate references")
                .arg(
                    Arg::new("entity")
                        .long("entity")
                        .help("Validate a single entity instead of the whole corpus"),
                )
                .arg(
                    Arg::new("allow-self-reference")
                        .long("allow-self-reference")
                        .action(ArgAction::SetTrue)
                        .help("Accept references from a node to itself"),
                )
                .arg(
                    Arg::new("skip-cycles")
                        .long("skip-cycles")
                        .action(ArgAction::SetTrue)
                        .help("Do not check whether references would close a cycle"),
                ),
        )
        .subcommand(Command::new("broken").about("References that do not resolve"))
        .subcommand(
            Command::new("suggest")
                .about("Repair candidates for an entity's broken references")
                .arg(Arg::new("entity").required(true)),
        )
        .subcommand(
            Command::new("supersede")
                .about("Create a new version of a sub-item")
                .arg(Arg::new("parent").required(true).help("Parent entity ID"))
                .arg(Arg::new("kind").required(true).help("Sub-item kind (task, criterion, ...)"))
                .arg(Arg::new("old").required(true).help("ID of the version to retire"))
                .arg(
                    Arg::new("set")
                        .long("set")
                        .action(ArgAction::Append)
                        .value_name("KEY=JSON")
                        .help("Field to change in the new version"),
                ),
        )
        .subcommand(
            Command::new("depend")
                .about("Add a dependency reference")
                .arg(Arg::new("source").required(true).help("Entity ID or entity/item key"))
                .arg(Arg::new("field").required(true).help("Dependency field (depends_on, blocked_by)"))
                .arg(Arg::new("target").required(true).help("Reference value to append")),
        )
        .subcommand(Command::new("health").about("All analyses in one report"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<EngineConfig> {
    let Some(path) = matches.get_one::<PathBuf>("config") else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    EngineConfig::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Parse `key=value`; the value is JSON when it parses, a plain string otherwise
fn parse_assignment(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected KEY=JSON, got '{raw}'");
    };
    if key.is_empty() {
        bail!("empty key in '{raw}'");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn updates(args: &ArgMatches) -> anyhow::Result<Payload> {
    args.get_many::<String>("set")
        .into_iter()
        .flatten()
        .map(String::as_str)
        .map(parse_assignment)
        .collect()
}

fn emit<T: Serialize>(result: &ToolResult<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(result.success)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing argument <{name}>"))
}

async fn run(matches: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(matches)?;
    let root = matches
        .get_one::<PathBuf>("root")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("specs"));
    tracing::debug!(root = %root.display(), "opening entity store");
    let service = SpecGraphService::new(YamlDirStore::new(root)).with_config(config);

    match matches.subcommand() {
        Some(("deps", _)) => emit(&service.analyze_dependencies().await),
        Some(("coverage", _)) => emit(&service.analyze_coverage().await),
        Some(("cycles", _)) => emit(&service.detect_cycles().await),
        Some(("orphans", _)) => emit(&service.detect_orphans().await),
        Some(("validate", args)) => {
            let mut options = ValidationOptions::from_config(service.config());
            options.allow_self_reference |= args.get_flag("allow-self-reference");
            options.check_cycles = !args.get_flag("skip-cycles");
            match args.get_one::<String>("entity") {
                Some(entity) => emit(&service.validate_entity_references(entity, options).await),
                None => emit(&service.validate_all_references(options).await),
            }
        }
        Some(("broken", _)) => emit(&service.find_broken_references().await),
        Some(("suggest", args)) => emit(&service.suggest_reference_fixes(required(args, "entity")?).await),
        Some(("supersede", args)) => {
            let result = service
                .supersede(
                    required(args, "parent")?,
                    required(args, "kind")?,
                    required(args, "old")?,
                    updates(args)?,
                )
                .await;
            emit(&result)
        }
        Some(("depend", args)) => {
            let result = service
                .add_dependency(required(args, "source")?, required(args, "field")?, required(args, "target")?)
                .await;
            emit(&result)
        }
        Some(("health", _)) => emit(&service.health_report().await),
        Some((other, _)) => bail!("unknown command '{other}'"),
        None => bail!("no command given"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    if !run(&matches).await? {
        std::process::exit(1);
    }
    Ok(())
}
