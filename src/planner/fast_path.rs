//! Shortcut planning for statement shapes that need no optimization.
//!
//! A detector only reads the session; returning `None` leaves it untouched.
//! Plans it returns skip building, privilege checks, and optimization, so a
//! detector must match only statements where that is acceptable.

use std::sync::Arc;

use crate::planner::ast::{BinaryOp, ColumnName, Datum, Expr, SelectField, SelectStmt, Statement};
use crate::planner::expression::PlanColumn;
use crate::planner::physical::{PhysicalNode, PhysicalOp, PhysicalPlan};
use crate::planner::plan::Plan;
use crate::schema::{ColumnInfo, TableInfo};
use crate::session::SessionContext;
use crate::types::PlanColumnId;

/// Recognizes statements that can be planned without the full pipeline.
pub trait FastPathDetector: Send + Sync {
    /// Returns a ready plan for `stmt`, or `None` when it does not qualify.
    fn try_fast_plan(&self, ctx: &SessionContext, stmt: &Statement) -> Option<Plan>;
}

/// Detector that never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFastPath;

impl FastPathDetector for NoFastPath {
    fn try_fast_plan(&self, _ctx: &SessionContext, _stmt: &Statement) -> Option<Plan> {
        None
    }
}

/// Matches `SELECT <columns | *> FROM t WHERE <int pk> = <int literal>`.
///
/// Names resolve against the snapshot bound on the session; anything that
/// fails to resolve is left to the regular pipeline so it can report the
/// error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointGetDetector;

impl FastPathDetector for PointGetDetector {
    fn try_fast_plan(&self, ctx: &SessionContext, stmt: &Statement) -> Option<Plan> {
        let Statement::Select(select) = stmt else {
            return None;
        };
        if select.from.len() != 1 || !select.order_by.is_empty() || select.limit.is_some() {
            return None;
        }
        let schema = ctx.info_schema()?;
        let table_ref = &select.from[0];
        let db = table_ref
            .table
            .db
            .as_deref()
            .or(ctx.vars().current_db.as_deref())?;
        let db_name = schema.database(db)?.name.clone();
        let table = schema.table(db, &table_ref.table.name)?;
        let visible = table_ref.alias.as_deref().unwrap_or(&table.name);
        let handle = match_handle_equality(select, table, visible)?;
        let columns = output_columns(&select.fields, table, visible)?;
        let op = PhysicalOp::PointGet {
            db: db_name,
            table: Arc::clone(table),
            handle,
        };
        Some(Plan::Physical(PhysicalPlan::new(PhysicalNode::new(
            op, columns, 1.0,
        ))))
    }
}

fn refers_to(name: &ColumnName, col: &ColumnInfo, visible: &str) -> bool {
    name.name.eq_ignore_ascii_case(&col.name)
        && name
            .table
            .as_deref()
            .map_or(true, |qualifier| qualifier.eq_ignore_ascii_case(visible))
}

fn match_handle_equality(select: &SelectStmt, table: &TableInfo, visible: &str) -> Option<Datum> {
    let handle_col = table.handle_column()?;
    let Expr::Binary {
        op: BinaryOp::Eq,
        lhs,
        rhs,
    } = select.filter.as_ref()?
    else {
        return None;
    };
    let (column, value) = match (lhs.as_ref(), rhs.as_ref()) {
        (Expr::Column(column), Expr::Literal(value))
        | (Expr::Literal(value), Expr::Column(column)) => (column, value),
        _ => return None,
    };
    if !refers_to(column, handle_col, visible) {
        return None;
    }
    matches!(value, Datum::Int(_)).then(|| value.clone())
}

fn output_columns(fields: &[SelectField], table: &TableInfo, visible: &str) -> Option<Vec<PlanColumn>> {
    let mut out = Vec::new();
    let mut push = |col: &ColumnInfo, name: String, table_name: Option<String>| {
        out.push(PlanColumn {
            id: PlanColumnId(out.len() as u64 + 1),
            name,
            table: table_name,
            origin: Some(col.id),
            ty: Some(col.ty),
        });
    };
    for field in fields {
        match field {
            SelectField::Wildcard => {
                for col in &table.columns {
                    push(col, col.name.clone(), Some(visible.to_owned()));
                }
            }
            SelectField::Expr {
                expr: Expr::Column(name),
                alias,
            } => {
                let col = table
                    .columns
                    .iter()
                    .find(|col| refers_to(name, col, visible))?;
                match alias {
                    Some(alias) => push(col, alias.clone(), None),
                    None => push(col, col.name.clone(), Some(visible.to_owned())),
                }
            }
            SelectField::Expr { .. } => return None,
        }
    }
    (!out.is_empty()).then_some(out)
}
