#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sluice::planner::ast::{Datum, Statement};
use sluice::planner::builder::{col, eq, field, gt, lit, param, StatementBuilder};
use sluice::planner::PlanDispatcher;
use sluice::privilege::{GrantScope, GrantTable, Privilege};
use sluice::schema::{ColumnType, Domain, InfoSchema, TableDef};
use sluice::session::{Session, SessionConfig};
use sluice::types::StmtId;

fn micro_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/dispatch");
    group.throughput(Throughput::Elements(1));
    for guarded in [false, true] {
        let mut harness = DispatchHarness::new(guarded);
        let label = if guarded { "grants" } else { "open" };
        group.bench_with_input(BenchmarkId::new("point_get", label), &guarded, |b, _| {
            b.iter(|| harness.point_get());
        });
        group.bench_with_input(BenchmarkId::new("join_select", label), &guarded, |b, _| {
            b.iter(|| harness.join());
        });
        group.bench_with_input(BenchmarkId::new("execute_cached", label), &guarded, |b, _| {
            b.iter(|| harness.execute(black_box(42)));
        });
    }
    group.finish();
}

struct DispatchHarness {
    session: Session,
    point_get: Statement,
    join: Statement,
    stmt_id: StmtId,
}

impl DispatchHarness {
    fn new(guarded: bool) -> Self {
        let schema = InfoSchema::builder(1)
            .database("shop")
            .table(
                "shop",
                TableDef::new("orders")
                    .column("id", ColumnType::Int)
                    .column("customer_id", ColumnType::Int)
                    .column("total", ColumnType::Float)
                    .primary_key("id")
                    .index("idx_customer", ["customer_id"])
                    .row_count(100_000),
            )
            .table(
                "shop",
                TableDef::new("customers")
                    .column("id", ColumnType::Int)
                    .column("name", ColumnType::String)
                    .primary_key("id")
                    .row_count(5_000),
            )
            .build()
            .expect("schema");
        let mut config = SessionConfig::default();
        config.session.default_database = Some("shop".into());
        let mut session = Session::new(
            Arc::new(Domain::new(schema)),
            Arc::new(PlanDispatcher::default()),
            &config,
        );
        if guarded {
            let grants =
                GrantTable::new().with_grant("root", GrantScope::Global, [Privilege::Select]);
            session = session.with_privileges(Arc::new(grants));
        }
        let body = StatementBuilder::select([field(col("total"))])
            .from("orders")
            .filter(eq(col("customer_id"), param(0)))
            .build();
        let (stmt_id, _) = session.prepare("by_customer", body).expect("prepare");
        Self {
            session,
            point_get: StatementBuilder::select_all()
                .from("orders")
                .filter(eq(col("id"), lit(7)))
                .build(),
            join: StatementBuilder::select([field(col("o.total")), field(col("c.name"))])
                .from_as("orders", "o")
                .from_as("customers", "c")
                .filter(eq(col("o.customer_id"), col("c.id")))
                .filter(gt(col("o.total"), lit(100.0)))
                .build(),
            stmt_id,
        }
    }

    fn point_get(&mut self) {
        black_box(self.session.compile(&self.point_get).expect("point get"));
    }

    fn join(&mut self) {
        black_box(self.session.compile(&self.join).expect("join"));
    }

    fn execute(&mut self, customer: i64) {
        black_box(
            self.session
                .execute_prepared(self.stmt_id, vec![Datum::Int(customer)])
                .expect("execute"),
        );
    }
}

criterion_group!(benches, micro_dispatch);
criterion_main!(benches);
