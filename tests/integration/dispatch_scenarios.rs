#![allow(missing_docs)]

use std::sync::Arc;

use sluice::planner::ast::{Datum, Statement};
use sluice::planner::builder::{add, col, eq, field, gt, lit, param, StatementBuilder};
use sluice::planner::physical::PhysicalOp;
use sluice::planner::{Plan, PlanDispatcher, PlanError};
use sluice::privilege::{GrantScope, GrantTable, Privilege};
use sluice::schema::{ColumnType, Domain, InfoSchema, TableDef};
use sluice::session::{Session, SessionConfig, StmtOutcome};

fn schema() -> InfoSchema {
    InfoSchema::builder(1)
        .database("shop")
        .table(
            "shop",
            TableDef::new("orders")
                .column("id", ColumnType::Int)
                .column("customer_id", ColumnType::Int)
                .column("total", ColumnType::Float)
                .primary_key("id")
                .index("idx_customer", ["customer_id"])
                .row_count(50_000),
        )
        .table(
            "shop",
            TableDef::new("customers")
                .column("id", ColumnType::Int)
                .column("name", ColumnType::String)
                .primary_key("id")
                .row_count(2_000),
        )
        .build()
        .expect("schema")
}

fn config() -> SessionConfig {
    SessionConfig::from_toml(
        r#"
[session]
default_database = "shop"
user = "app"
host = "10.0.0.1"
"#,
    )
    .expect("config")
}

fn session_with(grants: Option<Arc<GrantTable>>) -> Session {
    let session = Session::new(
        Arc::new(Domain::new(schema())),
        Arc::new(PlanDispatcher::default()),
        &config(),
    );
    match grants {
        Some(grants) => session.with_privileges(grants),
        None => session,
    }
}

fn compile_physical(session: &mut Session, stmt: &Statement) -> PhysicalOp {
    match session.compile(stmt).expect("plan") {
        Plan::Physical(plan) => plan.root.op,
        other => panic!("expected a physical plan, got {:?}", other.kind()),
    }
}

#[test]
fn point_lookup_bypasses_privileges() {
    let mut session = session_with(Some(Arc::new(GrantTable::new())));
    let stmt = StatementBuilder::select_all()
        .from("orders")
        .filter(eq(lit(42), col("id")))
        .build();
    let op = compile_physical(&mut session, &stmt);
    assert!(matches!(op, PhysicalOp::PointGet { handle: Datum::Int(42), .. }));
}

#[test]
fn select_without_policy_is_optimized() {
    let mut session = session_with(None);
    let stmt = StatementBuilder::select([field(col("o.total")), field(col("c.name"))])
        .from_as("orders", "o")
        .from_as("customers", "c")
        .filter(eq(col("o.customer_id"), col("c.id")))
        .build();
    let plan = session.compile(&stmt).expect("plan");
    let physical = plan.as_physical().expect("physical");
    let names: Vec<&str> = physical.schema().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["total", "name"]);
    fn has_hash_join(node: &sluice::planner::physical::PhysicalNode) -> bool {
        matches!(node.op, PhysicalOp::HashJoin { .. }) || node.inputs.iter().any(has_hash_join)
    }
    assert!(has_hash_join(&physical.root));
}

#[test]
fn grants_are_consulted_per_statement() {
    let grants = Arc::new(GrantTable::new());
    let mut session = session_with(Some(grants.clone()));
    let stmt = StatementBuilder::select([field(col("total"))])
        .from("orders")
        .filter(gt(col("total"), lit(10.0)))
        .build();

    let err = session.compile(&stmt).expect_err("no grant yet");
    assert_eq!(err, PlanError::PrivilegeCheckFail);

    grants.grant("app", GrantScope::Database("SHOP".into()), [Privilege::Select]);
    session.compile(&stmt).expect("granted");

    grants.revoke("app", GrantScope::Database("shop".into()), Privilege::Select);
    assert_eq!(
        session.compile(&stmt).expect_err("revoked"),
        PlanError::PrivilegeCheckFail
    );
}

#[test]
fn filtered_update_needs_update_and_select() {
    let grants = Arc::new(GrantTable::new().with_grant(
        "app",
        GrantScope::table("shop", "orders"),
        [Privilege::Update],
    ));
    let mut session = session_with(Some(grants.clone()));
    let stmt = StatementBuilder::update("orders")
        .set("total", add(col("total"), lit(1.0)))
        .filter(eq(col("customer_id"), lit(3)))
        .build();

    assert_eq!(
        session.compile(&stmt).expect_err("select missing"),
        PlanError::PrivilegeCheckFail
    );
    grants.grant("app", GrantScope::table("shop", "orders"), [Privilege::Select]);
    let op = compile_physical(&mut session, &stmt);
    assert!(matches!(op, PhysicalOp::Update { .. }));
}

#[test]
fn cascades_mode_rejects_only_logical_plans() {
    let mut session = session_with(None);
    session
        .run(&StatementBuilder::set("enable_cascades_planner", 1))
        .expect("set");

    let select = StatementBuilder::select_all().from("customers").build();
    assert_eq!(
        session.compile(&select).expect_err("cascades"),
        PlanError::CascadesNotImplemented
    );

    let insert = StatementBuilder::insert_into("customers")
        .columns(["id", "name"])
        .values([lit(1), lit("ada")])
        .build();
    let outcome = session.run(&insert).expect("insert passes through");
    assert!(matches!(outcome, StmtOutcome::Plan(Plan::Insert(_))));

    // The fast path still answers point lookups.
    let point = StatementBuilder::select_all()
        .from("customers")
        .filter(eq(col("id"), lit(1)))
        .build();
    session.compile(&point).expect("fast path");
}

#[test]
fn execute_failures_keep_their_meaning() {
    let grants = Arc::new(GrantTable::new().with_grant(
        "app",
        GrantScope::Global,
        [Privilege::All],
    ));
    let mut session = session_with(Some(grants.clone()));
    let body = StatementBuilder::select([field(col("total"))])
        .from("orders")
        .filter(eq(col("customer_id"), param(0)))
        .build();
    session
        .run(&StatementBuilder::prepare("by_customer", body))
        .expect("prepare");

    let execute = StatementBuilder::execute("by_customer", [Datum::Int(9)]);
    session.compile(&execute).expect("allowed");

    grants.revoke("app", GrantScope::Global, Privilege::All);
    let err = session.compile(&execute).expect_err("revoked");
    assert_eq!(err.code(), "PrivilegeCheckFail");
    assert_eq!(err.root_cause(), &PlanError::PrivilegeCheckFail);
    assert_eq!(err.to_string(), "privilege check fail");
    assert_eq!(err.trace().len(), 1);
}
