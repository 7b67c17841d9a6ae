//! Binary entry point for the sluice planning CLI.
#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use sluice::logging::{init_logging, LoggingError};
use sluice::planner::ast::Statement;
use sluice::planner::{explain, PlanDispatcher, PlanError, PlanErrorWithCode};
use sluice::schema::{Domain, InfoSchema, SchemaFile, SchemaFileError};
use sluice::session::{ConfigError, Session, SessionConfig, StmtOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "sluice",
    version,
    about = "Plan SQL statements against a schema snapshot",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SLUICE_CONFIG",
        value_name = "FILE",
        help = "Config file (defaults to the user config dir)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(long, global = true, help = "Log filter, overriding the config")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PlanCmd {
    #[arg(long, value_name = "FILE", help = "TOML schema description")]
    schema: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "JSON statement, or an array of statements run in one session"
    )]
    statement: PathBuf,

    #[arg(long, help = "Current database for unqualified names")]
    database: Option<String>,

    #[arg(long, help = "Request the cascades planner")]
    cascades: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Plan statements and print their explain trees")]
    Plan(PlanCmd),

    #[command(about = "Print the databases and tables of a schema file")]
    Schema {
        #[arg(long, value_name = "FILE")]
        schema: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaFileError),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error("failed to read statement file {path}: {source}")]
    ReadStatement {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse statement file {path}: {source}")]
    ParseStatement {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("statement {index}: {}", PlanErrorWithCode(.source))]
    Plan { index: usize, source: PlanError },
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatementInput {
    Many(Vec<Statement>),
    One(Statement),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let mut config = SessionConfig::load(cli.config.clone())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level)?;

    match cli.command {
        Command::Plan(cmd) => {
            if cmd.cascades {
                config.planner.enable_cascades_planner = true;
            }
            if cmd.database.is_some() {
                config.session.default_database = cmd.database.clone();
            }
            let schema = load_schema(&cmd.schema)?;
            let statements = load_statements(&cmd.statement)?;
            let mut session = Session::new(
                Arc::new(Domain::new(schema)),
                Arc::new(PlanDispatcher::default()),
                &config,
            );
            let mut reports = Vec::with_capacity(statements.len());
            for (idx, stmt) in statements.iter().enumerate() {
                let index = idx + 1;
                let outcome = session
                    .run(stmt)
                    .map_err(|source| CliError::Plan { index, source })?;
                reports.push((index, stmt.kind_name(), outcome));
            }
            match cli.format {
                OutputFormat::Text => {
                    for (index, kind, outcome) in &reports {
                        println!("-- [{index}] {kind}");
                        print!("{}", outcome_text(outcome));
                    }
                }
                OutputFormat::Json => {
                    let values = reports
                        .iter()
                        .map(|(index, kind, outcome)| {
                            Ok(json!({
                                "index": index,
                                "statement": kind,
                                "outcome": outcome_json(outcome)?,
                            }))
                        })
                        .collect::<Result<Vec<_>, serde_json::Error>>()?;
                    println!("{}", serde_json::to_string_pretty(&values)?);
                }
            }
        }
        Command::Schema { schema } => {
            let schema = load_schema(&schema)?;
            match cli.format {
                OutputFormat::Text => print!("{}", schema_text(&schema)),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&schema_json(&schema))?)
                }
            }
        }
    }
    Ok(())
}

fn load_schema(path: &Path) -> Result<InfoSchema, CliError> {
    Ok(SchemaFile::load(path)?.into_info_schema()?)
}

fn load_statements(path: &Path) -> Result<Vec<Statement>, CliError> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::ReadStatement {
        path: path.to_path_buf(),
        source,
    })?;
    let input: StatementInput =
        serde_json::from_str(&contents).map_err(|source| CliError::ParseStatement {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(match input {
        StatementInput::Many(statements) => statements,
        StatementInput::One(stmt) => vec![stmt],
    })
}

fn outcome_text(outcome: &StmtOutcome) -> String {
    match outcome {
        StmtOutcome::Prepared {
            stmt_id,
            param_count,
        } => format!("prepared statement {stmt_id} ({param_count} params)\n"),
        StmtOutcome::Deallocated { name } => format!("deallocated {name}\n"),
        StmtOutcome::VariableSet { count } => format!("{count} variable(s) set\n"),
        StmtOutcome::DatabaseChanged { db } => format!("database changed to {db}\n"),
        StmtOutcome::Tables(tables) => {
            let mut out = String::new();
            for table in tables {
                out.push_str(table);
                out.push('\n');
            }
            out
        }
        StmtOutcome::Plan(plan) => {
            let explain = explain(plan);
            format!("{}plan_hash: {:#018x}\n", explain.render_text(), explain.plan_hash)
        }
    }
}

fn outcome_json(outcome: &StmtOutcome) -> Result<Value, serde_json::Error> {
    Ok(match outcome {
        StmtOutcome::Prepared {
            stmt_id,
            param_count,
        } => json!({ "prepared": { "stmt_id": stmt_id, "param_count": param_count } }),
        StmtOutcome::Deallocated { name } => json!({ "deallocated": name }),
        StmtOutcome::VariableSet { count } => json!({ "variables_set": count }),
        StmtOutcome::DatabaseChanged { db } => json!({ "database": db }),
        StmtOutcome::Tables(tables) => json!({ "tables": tables }),
        StmtOutcome::Plan(plan) => json!({
            "kind": plan.kind().as_str(),
            "explain": serde_json::to_value(explain(plan))?,
        }),
    })
}

fn schema_text(schema: &InfoSchema) -> String {
    let mut out = format!("version: {}\n", schema.version());
    for db in schema.database_names() {
        out.push_str(&db);
        out.push('\n');
        for table in schema.tables(&db).unwrap_or_default() {
            out.push_str("  ");
            out.push_str(&table);
            out.push('\n');
        }
    }
    out
}

fn schema_json(schema: &InfoSchema) -> Value {
    let databases = schema
        .database_names()
        .into_iter()
        .map(|db| {
            let tables = schema.tables(&db).unwrap_or_default();
            json!({ "name": db, "tables": tables })
        })
        .collect::<Vec<_>>();
    json!({ "version": schema.version(), "databases": databases })
}
