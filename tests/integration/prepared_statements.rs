#![allow(missing_docs)]

use std::sync::Arc;

use sluice::planner::ast::Datum;
use sluice::planner::builder::{col, eq, field, param, StatementBuilder};
use sluice::planner::explain;
use sluice::planner::physical::{PhysicalNode, PhysicalOp};
use sluice::planner::{ExecutePlan, Plan, PlanDispatcher, PlanError};
use sluice::privilege::{GrantScope, GrantTable, Privilege};
use sluice::schema::{ColumnType, Domain, InfoSchema, TableDef};
use sluice::session::{Session, SessionConfig};
use sluice::types::StmtId;

fn orders(indexed: bool) -> TableDef {
    let table = TableDef::new("orders")
        .column("id", ColumnType::Int)
        .column("customer_id", ColumnType::Int)
        .column("total", ColumnType::Float)
        .primary_key("id")
        .row_count(20_000);
    if indexed {
        table.index("idx_customer", ["customer_id"])
    } else {
        table
    }
}

fn setup(config: &str) -> (Arc<Domain>, Session) {
    let schema = InfoSchema::builder(1)
        .database("shop")
        .table("shop", orders(false))
        .build()
        .expect("schema");
    let domain = Arc::new(Domain::new(schema));
    let config = SessionConfig::from_toml(config).expect("config");
    let session = Session::new(
        Arc::clone(&domain),
        Arc::new(PlanDispatcher::default()),
        &config,
    );
    (domain, session)
}

const SHOP: &str = "[session]\ndefault_database = \"shop\"\n";

fn prepare_by_customer(session: &mut Session) -> StmtId {
    let body = StatementBuilder::select([field(col("total"))])
        .from("orders")
        .filter(eq(col("customer_id"), param(0)))
        .build();
    let (stmt_id, params) = session.prepare("by_customer", body).expect("prepare");
    assert_eq!(params, 1);
    stmt_id
}

fn inner_plan(plan: &Plan) -> &PhysicalNode {
    match plan {
        Plan::Execute(ExecutePlan {
            plan: Some(inner), ..
        }) => &inner.as_physical().expect("physical").root,
        other => panic!("expected an executed plan, got {:?}", other.kind()),
    }
}

fn leaf(node: &PhysicalNode) -> &PhysicalNode {
    let mut node = node;
    while let Some(child) = node.inputs.first() {
        node = child;
    }
    node
}

fn leaf_op(node: &PhysicalNode) -> &'static str {
    leaf(node).op.name()
}

fn scanned_db(plan: &Plan) -> &str {
    match &leaf(inner_plan(plan)).op {
        PhysicalOp::TableScan { db, .. } => db,
        other => panic!("expected a table scan, got {}", other.name()),
    }
}

fn two_databases(config: &str) -> Session {
    let orders = || {
        TableDef::new("orders")
            .column("id", ColumnType::Int)
            .column("total", ColumnType::Float)
            .primary_key("id")
            .row_count(1_000)
    };
    let schema = InfoSchema::builder(1)
        .database("a")
        .database("b")
        .table("a", orders())
        .table("b", orders())
        .build()
        .expect("schema");
    let config = SessionConfig::from_toml(config).expect("config");
    Session::new(
        Arc::new(Domain::new(schema)),
        Arc::new(PlanDispatcher::default()),
        &config,
    )
}

fn prepare_by_total(session: &mut Session) -> StmtId {
    let body = StatementBuilder::select([field(col("total"))])
        .from("orders")
        .filter(eq(col("total"), param(0)))
        .build();
    session.prepare("by_total", body).expect("prepare").0
}

#[test]
fn cache_hits_leave_plan_ids_alone() {
    let (_domain, mut session) = setup(SHOP);
    let stmt_id = prepare_by_customer(&mut session);

    let first = session
        .execute_prepared(stmt_id, vec![Datum::Int(4)])
        .expect("first execution");
    assert_eq!(session.context().plan_cache().len(), 1);
    let ids = (
        session.context().vars().plan_id(),
        session.context().vars().plan_column_id(),
    );

    let second = session
        .execute_prepared(stmt_id, vec![Datum::Int(4)])
        .expect("cached execution");
    assert_eq!(
        (
            session.context().vars().plan_id(),
            session.context().vars().plan_column_id(),
        ),
        ids
    );
    assert_eq!(explain(&first).plan_hash, explain(&second).plan_hash);

    // New parameter values are planned, and cached, separately.
    session
        .execute_prepared(stmt_id, vec![Datum::Int(5)])
        .expect("other params");
    assert_eq!(session.context().plan_cache().len(), 2);
}

#[test]
fn schema_change_replans_against_the_new_version() {
    let (domain, mut session) = setup(SHOP);
    let stmt_id = prepare_by_customer(&mut session);

    let before = session
        .execute_prepared(stmt_id, vec![Datum::Int(4)])
        .expect("before");
    assert_eq!(leaf_op(inner_plan(&before)), "TableScan");

    domain
        .apply(|builder| builder.drop_table("shop", "orders").table("shop", orders(true)))
        .expect("add index");

    let after = session
        .execute_prepared(stmt_id, vec![Datum::Int(4)])
        .expect("after");
    assert_eq!(leaf_op(inner_plan(&after)), "IndexLookup");
    let prepared = session.context().prepared().get(stmt_id).expect("prepared");
    assert_eq!(prepared.schema_version, 2);
    assert_eq!(session.context().plan_cache().len(), 1);
}

#[test]
fn dropped_table_surfaces_through_execute() {
    let (domain, mut session) = setup(SHOP);
    let stmt_id = prepare_by_customer(&mut session);
    domain
        .apply(|builder| builder.drop_table("shop", "orders"))
        .expect("drop");

    let err = session
        .execute_prepared(stmt_id, vec![Datum::Int(1)])
        .expect_err("table is gone");
    assert_eq!(err.code(), "UnknownTable");
    assert!(matches!(err, PlanError::Reoptimize { .. }));
}

#[test]
fn parameter_count_is_checked() {
    let (_domain, mut session) = setup(SHOP);
    let stmt_id = prepare_by_customer(&mut session);
    let err = session
        .execute_prepared(stmt_id, vec![Datum::Int(1), Datum::Int(2)])
        .expect_err("too many");
    assert_eq!(
        err.root_cause(),
        &PlanError::ParamCountMismatch {
            expected: 1,
            got: 2
        }
    );
}

#[test]
fn disabled_cache_plans_every_time() {
    let (_domain, mut session) = setup(
        "[session]\ndefault_database = \"shop\"\n[planner]\nenable_plan_cache = false\n",
    );
    let stmt_id = prepare_by_customer(&mut session);
    for _ in 0..3 {
        session
            .execute_prepared(stmt_id, vec![Datum::Int(7)])
            .expect("execute");
    }
    assert!(session.context().plan_cache().is_empty());

    session
        .run(&StatementBuilder::set("enable_plan_cache", "on"))
        .expect("enable");
    session
        .execute_prepared(stmt_id, vec![Datum::Int(7)])
        .expect("execute");
    assert_eq!(session.context().plan_cache().len(), 1);
}

#[test]
fn re_preparing_a_name_retires_the_old_statement() {
    let (_domain, mut session) = setup(SHOP);
    let old = prepare_by_customer(&mut session);
    session
        .execute_prepared(old, vec![Datum::Int(1)])
        .expect("execute");
    let new = prepare_by_customer(&mut session);
    assert_ne!(old, new);
    assert!(session.context().plan_cache().is_empty());

    let err = session
        .execute_prepared(old, vec![Datum::Int(1)])
        .expect_err("old id");
    assert_eq!(err.code(), "UnknownPreparedStatement");

    let plan = session
        .compile(&StatementBuilder::execute("BY_CUSTOMER", [Datum::Int(1)]))
        .expect("by name");
    assert!(matches!(plan, Plan::Execute(ExecutePlan { stmt_id: Some(id), .. }) if id == new));
}

#[test]
fn cached_plans_follow_the_current_database() {
    let mut session = two_databases("[session]\ndefault_database = \"a\"\n");
    let stmt_id = prepare_by_total(&mut session);

    let in_a = session
        .execute_prepared(stmt_id, vec![Datum::Float(1.0)])
        .expect("in a");
    assert_eq!(scanned_db(&in_a), "a");

    session.run(&StatementBuilder::use_db("b")).expect("use b");
    let in_b = session
        .execute_prepared(stmt_id, vec![Datum::Float(1.0)])
        .expect("in b");
    assert_eq!(scanned_db(&in_b), "b");
    assert_eq!(session.context().plan_cache().len(), 2);

    session.run(&StatementBuilder::use_db("A")).expect("back to a");
    let again = session
        .execute_prepared(stmt_id, vec![Datum::Float(1.0)])
        .expect("a again");
    assert_eq!(scanned_db(&again), "a");
    assert_eq!(session.context().plan_cache().len(), 2);
}

#[test]
fn switching_databases_rechecks_grants_on_the_new_tables() {
    let grants = Arc::new(GrantTable::new().with_grant(
        "root",
        GrantScope::Database("a".into()),
        [Privilege::Select],
    ));
    let mut session =
        two_databases("[session]\ndefault_database = \"a\"\n").with_privileges(grants);
    let stmt_id = prepare_by_total(&mut session);
    session
        .execute_prepared(stmt_id, vec![Datum::Float(2.0)])
        .expect("granted in a");

    session.run(&StatementBuilder::use_db("b")).expect("use b");
    let err = session
        .execute_prepared(stmt_id, vec![Datum::Float(2.0)])
        .expect_err("no grant in b");
    assert_eq!(err.root_cause(), &PlanError::PrivilegeCheckFail);
}

#[test]
fn cascades_mode_rejects_cached_and_uncached_executions() {
    let (_domain, mut session) = setup(SHOP);
    let stmt_id = prepare_by_customer(&mut session);
    session
        .execute_prepared(stmt_id, vec![Datum::Int(1)])
        .expect("warm the cache");
    assert_eq!(session.context().plan_cache().len(), 1);

    session
        .run(&StatementBuilder::set("enable_cascades_planner", 1))
        .expect("enable cascades");
    for params in [vec![Datum::Int(1)], vec![Datum::Int(2)]] {
        let err = session
            .execute_prepared(stmt_id, params)
            .expect_err("cascades");
        assert_eq!(err.root_cause(), &PlanError::CascadesNotImplemented);
    }
    let err = session
        .compile(&StatementBuilder::execute("by_customer", [Datum::Int(1)]))
        .expect_err("cascades by name");
    assert_eq!(err.code(), "CascadesNotImplemented");

    session
        .run(&StatementBuilder::set("enable_cascades_planner", 0))
        .expect("disable cascades");
    session
        .execute_prepared(stmt_id, vec![Datum::Int(1)])
        .expect("cached plan usable again");
    assert_eq!(session.context().plan_cache().len(), 1);
}
