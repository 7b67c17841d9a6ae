#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;
use std::thread;

use sluice::planner::ast::Statement;
use sluice::planner::builder::{col, eq, field, lit, StatementBuilder};
use sluice::planner::{Plan, PlanDispatcher, PlanError, StatementPlanner};
use sluice::privilege::{GrantScope, GrantTable, Privilege, UserIdentity};
use sluice::schema::{ColumnType, Domain, InfoSchema, SchemaFile, TableDef};
use sluice::session::{ConfigError, Session, SessionConfig, StmtOutcome};
use tempfile::TempDir;

const SCHEMA_TOML: &str = r#"
version = 7

[[databases]]
name = "shop"

[[databases.tables]]
name = "orders"
primary_key = "id"
row_count = 1000
columns = [{ name = "id", type = "int" }, { name = "total", type = "float" }]

[[databases.tables]]
name = "customers"
primary_key = "id"
columns = [{ name = "id", type = "int" }, { name = "name", type = "string" }]

[[databases]]
name = "audit"
"#;

fn domain_from_file(dir: &TempDir) -> Arc<Domain> {
    let path = dir.path().join("schema.toml");
    fs::write(&path, SCHEMA_TOML).expect("write schema");
    let schema = SchemaFile::load(&path)
        .expect("load schema")
        .into_info_schema()
        .expect("valid schema");
    Arc::new(Domain::new(schema))
}

fn planner() -> Arc<dyn StatementPlanner> {
    Arc::new(PlanDispatcher::default())
}

#[test]
fn config_file_seeds_session_state() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("sluice.toml");
    fs::write(
        &config_path,
        r#"
[planner]
enable_cascades_planner = true
plan_cache_capacity = 4

[session]
default_database = "shop"
user = "report"
host = "localhost"

[logging]
level = "sluice=debug"
"#,
    )
    .expect("write config");

    let config = SessionConfig::load(Some(config_path.clone())).expect("load");
    assert_eq!(config.path(), Some(config_path.as_path()));
    assert_eq!(config.logging.level, "sluice=debug");

    let session = Session::new(domain_from_file(&dir), planner(), &config);
    let ctx = session.context();
    assert!(ctx.vars().enable_cascades_planner);
    assert!(ctx.vars().enable_plan_cache);
    assert_eq!(ctx.vars().current_db.as_deref(), Some("shop"));
    assert_eq!(ctx.vars().user, UserIdentity::new("report", "localhost"));
    assert_eq!(ctx.plan_cache().capacity(), 4);
}

#[test]
fn missing_config_file_yields_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let config = SessionConfig::load(Some(dir.path().join("absent.toml"))).expect("defaults");
    assert!(!config.planner.enable_cascades_planner);
    assert_eq!(config.planner.plan_cache_capacity, 100);
    assert_eq!(config.user_identity(), UserIdentity::default());
}

#[test]
fn unknown_config_keys_are_rejected() {
    let err = SessionConfig::from_toml("[planner]\nenable_turbo = true\n").expect_err("unknown");
    assert!(matches!(err, ConfigError::ParseStr { .. }));
}

#[test]
fn use_and_show_tables() {
    let dir = TempDir::new().expect("tempdir");
    let mut session = Session::new(domain_from_file(&dir), planner(), &SessionConfig::default());

    let show = Statement::ShowTables { db: None };
    assert_eq!(
        session.run(&show).expect_err("no db"),
        PlanError::NoDatabaseSelected
    );

    let outcome = session.run(&StatementBuilder::use_db("SHOP")).expect("use");
    assert!(matches!(outcome, StmtOutcome::DatabaseChanged { ref db } if db == "shop"));
    match session.run(&show).expect("show") {
        StmtOutcome::Tables(tables) => assert_eq!(tables, vec!["customers", "orders"]),
        other => panic!("unexpected {other:?}"),
    }
    match session
        .run(&Statement::ShowTables {
            db: Some("audit".into()),
        })
        .expect("show audit")
    {
        StmtOutcome::Tables(tables) => assert!(tables.is_empty()),
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(
        session
            .run(&StatementBuilder::use_db("warehouse"))
            .expect_err("unknown"),
        PlanError::UnknownDatabase {
            db: "warehouse".into()
        }
    );
}

#[test]
fn bad_system_variables_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut session = Session::new(domain_from_file(&dir), planner(), &SessionConfig::default());
    let err = session
        .run(&StatementBuilder::set("enable_turbo", 1))
        .expect_err("unknown variable");
    assert_eq!(err.code(), "UnknownSystemVariable");
    let err = session
        .run(&StatementBuilder::set("enable_plan_cache", "maybe"))
        .expect_err("bad value");
    assert_eq!(err.code(), "InvalidSystemVariableValue");
}

#[test]
fn sessions_plan_concurrently_against_shared_state() {
    let dir = TempDir::new().expect("tempdir");
    let domain = domain_from_file(&dir);
    let grants = Arc::new(GrantTable::new().with_grant(
        "root",
        GrantScope::Database("shop".into()),
        [Privilege::Select],
    ));
    let planner = planner();

    thread::scope(|scope| {
        for worker in 0..4i64 {
            let domain = Arc::clone(&domain);
            let grants = Arc::clone(&grants);
            let planner = Arc::clone(&planner);
            scope.spawn(move || {
                let config =
                    SessionConfig::from_toml("[session]\ndefault_database = \"shop\"\n")
                        .expect("config");
                let mut session = Session::new(domain, planner, &config).with_privileges(grants);
                for round in 0..25i64 {
                    let stmt = StatementBuilder::select([field(col("name"))])
                        .from("customers")
                        .filter(eq(col("name"), lit(format!("c{worker}-{round}"))))
                        .build();
                    let plan = session.compile(&stmt).expect("plan");
                    assert!(matches!(plan, Plan::Physical(_)));
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..5 {
                domain
                    .apply(|builder| builder.database("audit"))
                    .expect("publish");
            }
        });
    });

    assert_eq!(domain.snapshot().version(), 12);
}

#[test]
fn compile_uses_the_snapshot_current_at_statement_start() {
    let schema = InfoSchema::builder(1)
        .database("shop")
        .table(
            "shop",
            TableDef::new("orders")
                .column("id", ColumnType::Int)
                .primary_key("id"),
        )
        .build()
        .expect("schema");
    let domain = Arc::new(Domain::new(schema));
    let config = SessionConfig::from_toml("[session]\ndefault_database = \"shop\"\n")
        .expect("config");
    let mut session = Session::new(Arc::clone(&domain), planner(), &config);
    let stmt = StatementBuilder::select_all().from("refunds").build();
    assert_eq!(session.compile(&stmt).expect_err("missing").code(), "UnknownTable");

    domain
        .apply(|builder| {
            builder.table(
                "shop",
                TableDef::new("refunds").column("order_id", ColumnType::Int),
            )
        })
        .expect("publish");
    session.compile(&stmt).expect("visible after publish");
    assert_eq!(session.context().info_schema().map(|s| s.version()), Some(2));
}
