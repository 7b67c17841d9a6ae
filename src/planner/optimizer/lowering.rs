use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::planner::ast::Datum;
use crate::planner::errors::{PlanError, Result};
use crate::planner::expression::{PlanColumn, ScalarExpr};
use crate::planner::logical::{LogicalNode, LogicalOp};
use crate::planner::physical::{BuildSide, PhysicalNode, PhysicalOp};
use crate::schema::{IndexInfo, TableInfo};

/// Fraction of rows kept by `column = constant`.
const EQ_SELECTIVITY: f64 = 0.1;
/// Fraction of rows kept by any other condition.
const DEFAULT_SELECTIVITY: f64 = 0.8;

pub(super) fn lower(node: &LogicalNode) -> Result<PhysicalNode> {
    let inputs = node
        .inputs
        .iter()
        .map(lower)
        .collect::<Result<Vec<_>>>()?;
    let schema = node.schema.clone();
    let physical = match &node.op {
        LogicalOp::DataSource {
            db,
            table,
            pushed_conditions,
            ..
        } => access_path(db, table, pushed_conditions, schema),
        LogicalOp::Selection { conditions } => {
            let est = input_rows(&inputs)? * selectivity(conditions);
            let op = PhysicalOp::Selection {
                conditions: conditions.clone(),
            };
            PhysicalNode::with_inputs(op, schema, est, inputs)
        }
        LogicalOp::Projection { exprs } => {
            let est = input_rows(&inputs)?;
            let op = PhysicalOp::Projection {
                exprs: exprs.clone(),
            };
            PhysicalNode::with_inputs(op, schema, est, inputs)
        }
        LogicalOp::Join {
            eq_conditions,
            other_conditions,
        } => {
            let (left, right) = match inputs.as_slice() {
                [left, right] => (left.est_rows, right.est_rows),
                _ => return Err(PlanError::Invalid("join expects two inputs")),
            };
            let matched = if eq_conditions.is_empty() {
                left * right
            } else {
                left.max(right)
            };
            let build_side = if right <= left {
                BuildSide::Right
            } else {
                BuildSide::Left
            };
            let op = PhysicalOp::HashJoin {
                eq_conditions: eq_conditions.clone(),
                other_conditions: other_conditions.clone(),
                build_side,
            };
            PhysicalNode::with_inputs(op, schema, matched * selectivity(other_conditions), inputs)
        }
        LogicalOp::Sort { by } => {
            let est = input_rows(&inputs)?;
            PhysicalNode::with_inputs(PhysicalOp::Sort { by: by.clone() }, schema, est, inputs)
        }
        LogicalOp::TopN { by, offset, count } => {
            let est = input_rows(&inputs)?.min(*count as f64);
            let op = PhysicalOp::TopN {
                by: by.clone(),
                offset: *offset,
                count: *count,
            };
            PhysicalNode::with_inputs(op, schema, est, inputs)
        }
        LogicalOp::Limit { offset, count } => {
            let est = input_rows(&inputs)?.min(*count as f64);
            let op = PhysicalOp::Limit {
                offset: *offset,
                count: *count,
            };
            PhysicalNode::with_inputs(op, schema, est, inputs)
        }
        LogicalOp::Update {
            db,
            table,
            assignments,
        } => {
            let est = input_rows(&inputs)?;
            let op = PhysicalOp::Update {
                db: db.clone(),
                table: Arc::clone(table),
                assignments: assignments.clone(),
            };
            PhysicalNode::with_inputs(op, schema, est, inputs)
        }
        LogicalOp::Delete { db, table } => {
            let est = input_rows(&inputs)?;
            let op = PhysicalOp::Delete {
                db: db.clone(),
                table: Arc::clone(table),
            };
            PhysicalNode::with_inputs(op, schema, est, inputs)
        }
    };
    Ok(physical)
}

fn input_rows(inputs: &[PhysicalNode]) -> Result<f64> {
    match inputs {
        [child] => Ok(child.est_rows),
        _ => Err(PlanError::Invalid("operator expects one input")),
    }
}

fn selectivity(conditions: &[ScalarExpr]) -> f64 {
    conditions
        .iter()
        .map(|cond| {
            if cond.as_column_eq_constant().is_some() {
                EQ_SELECTIVITY
            } else {
                DEFAULT_SELECTIVITY
            }
        })
        .product()
}

enum PathKind {
    PointGet { handle: Datum },
    Index { index: IndexInfo, values: Vec<Datum> },
    TableScan,
}

struct AccessPath {
    kind: PathKind,
    /// Rows read from storage before residual filtering.
    scan_rows: f64,
    /// Tie breaker, lower wins.
    rank: u8,
    /// Conditions consumed by the access itself.
    used: Vec<usize>,
}

fn compare_paths(a: &AccessPath, b: &AccessPath) -> Ordering {
    a.scan_rows
        .total_cmp(&b.scan_rows)
        .then(a.rank.cmp(&b.rank))
}

/// Equality constants on source columns, keyed by column offset.
fn equality_constants(table: &TableInfo, conds: &[ScalarExpr]) -> FxHashMap<usize, (usize, Datum)> {
    let mut out = FxHashMap::default();
    for (idx, cond) in conds.iter().enumerate() {
        let Some((col, value)) = cond.as_column_eq_constant() else {
            continue;
        };
        if matches!(value, Datum::Null) {
            continue;
        }
        let Some(origin) = col.origin else {
            continue;
        };
        if let Some(info) = table.columns.iter().find(|c| c.id == origin) {
            out.entry(info.offset).or_insert((idx, value.clone()));
        }
    }
    out
}

fn candidate_paths(table: &TableInfo, conds: &[ScalarExpr]) -> Vec<AccessPath> {
    let rows = (table.row_count as f64).max(1.0);
    let eqs = equality_constants(table, conds);
    let mut paths = Vec::new();
    if let Some((idx, handle)) = table.handle.and_then(|offset| eqs.get(&offset)) {
        paths.push(AccessPath {
            kind: PathKind::PointGet {
                handle: handle.clone(),
            },
            scan_rows: 1.0,
            rank: 0,
            used: vec![*idx],
        });
    }
    for index in &table.indexes {
        let matched: Option<Vec<&(usize, Datum)>> =
            index.columns.iter().map(|offset| eqs.get(offset)).collect();
        let Some(matched) = matched else {
            continue;
        };
        let (scan_rows, rank) = if index.unique {
            (1.0, 1)
        } else {
            let exp = i32::try_from(index.columns.len()).unwrap_or(i32::MAX);
            ((rows * EQ_SELECTIVITY.powi(exp)).max(1.0), 2)
        };
        paths.push(AccessPath {
            kind: PathKind::Index {
                index: index.clone(),
                values: matched.iter().map(|(_, value)| value.clone()).collect(),
            },
            scan_rows,
            rank,
            used: matched.iter().map(|(idx, _)| *idx).collect(),
        });
    }
    paths.push(AccessPath {
        kind: PathKind::TableScan,
        scan_rows: rows,
        rank: 3,
        used: Vec::new(),
    });
    paths
}

fn access_path(
    db: &str,
    table: &Arc<TableInfo>,
    conds: &[ScalarExpr],
    schema: Vec<PlanColumn>,
) -> PhysicalNode {
    let best = candidate_paths(table, conds)
        .into_iter()
        .min_by(compare_paths)
        .unwrap_or(AccessPath {
            kind: PathKind::TableScan,
            scan_rows: table.row_count as f64,
            rank: 3,
            used: Vec::new(),
        });
    let residual: Vec<ScalarExpr> = conds
        .iter()
        .enumerate()
        .filter(|(idx, _)| !best.used.contains(idx))
        .map(|(_, cond)| cond.clone())
        .collect();
    match best.kind {
        PathKind::PointGet { handle } => {
            let get = PhysicalNode::new(
                PhysicalOp::PointGet {
                    db: db.to_owned(),
                    table: Arc::clone(table),
                    handle,
                },
                schema.clone(),
                1.0,
            );
            if residual.is_empty() {
                return get;
            }
            let est = selectivity(&residual);
            PhysicalNode::with_inputs(
                PhysicalOp::Selection {
                    conditions: residual,
                },
                schema,
                est,
                vec![get],
            )
        }
        PathKind::Index { index, values } => {
            let est = best.scan_rows * selectivity(&residual);
            PhysicalNode::new(
                PhysicalOp::IndexLookup {
                    db: db.to_owned(),
                    table: Arc::clone(table),
                    index,
                    values,
                    filters: residual,
                },
                schema,
                est,
            )
        }
        PathKind::TableScan => {
            let est = table.row_count as f64 * selectivity(&residual);
            PhysicalNode::new(
                PhysicalOp::TableScan {
                    db: db.to_owned(),
                    table: Arc::clone(table),
                    filters: residual,
                },
                schema,
                est,
            )
        }
    }
}
