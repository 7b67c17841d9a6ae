use rustc_hash::FxHashSet;

use super::OptFlags;
use crate::planner::errors::{PlanError, Result};
use crate::planner::expression::{covered_by, schema_ids, ScalarExpr};
use crate::planner::logical::{LogicalNode, LogicalOp, LogicalPlan, PlanIdAllocator};
use crate::types::PlanColumnId;

/// A logical rewrite gated by one optimization flag.
pub trait LogicalRule: Send + Sync {
    /// Rule name used in logs.
    fn name(&self) -> &'static str;
    /// Flag that enables the rule.
    fn flag(&self) -> OptFlags;
    /// Rewrites `plan`.
    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan>;
}

fn single_input(mut inputs: Vec<LogicalNode>, op: &'static str) -> Result<LogicalNode> {
    match (inputs.pop(), inputs.is_empty()) {
        (Some(child), true) => Ok(child),
        _ => Err(PlanError::Invalid(op)),
    }
}

fn two_inputs(mut inputs: Vec<LogicalNode>) -> Result<(LogicalNode, LogicalNode)> {
    match (inputs.pop(), inputs.pop(), inputs.is_empty()) {
        (Some(right), Some(left), true) => Ok((left, right)),
        _ => Err(PlanError::Invalid("join expects two inputs")),
    }
}

/// Removes columns no ancestor reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnPruner;

impl LogicalRule for ColumnPruner {
    fn name(&self) -> &'static str {
        "column_pruning"
    }

    fn flag(&self) -> OptFlags {
        OptFlags::COLUMN_PRUNING
    }

    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let (root, ids) = plan.into_parts();
        let required = schema_ids(&root.schema);
        Ok(LogicalPlan::from_parts(prune(root, &required), ids))
    }
}

fn prune(mut node: LogicalNode, required: &FxHashSet<PlanColumnId>) -> LogicalNode {
    match &mut node.op {
        LogicalOp::DataSource {
            pushed_conditions, ..
        } => {
            let mut needed = required.clone();
            for cond in pushed_conditions.iter() {
                cond.collect_columns(&mut needed);
            }
            let first = node.schema.first().cloned();
            node.schema.retain(|col| needed.contains(&col.id));
            // A scan always yields at least one column.
            if node.schema.is_empty() {
                node.schema.extend(first);
            }
        }
        LogicalOp::Projection { exprs } => {
            let mut keep: Vec<bool> = node
                .schema
                .iter()
                .map(|col| required.contains(&col.id))
                .collect();
            if !keep.iter().any(|k| *k) {
                if let Some(first) = keep.first_mut() {
                    *first = true;
                }
            }
            let mut kept_exprs = Vec::new();
            let mut kept_schema = Vec::new();
            for ((expr, col), keep) in exprs.drain(..).zip(node.schema.drain(..)).zip(keep) {
                if keep {
                    kept_exprs.push(expr);
                    kept_schema.push(col);
                }
            }
            let mut child_required = FxHashSet::default();
            for expr in &kept_exprs {
                expr.collect_columns(&mut child_required);
            }
            *exprs = kept_exprs;
            node.schema = kept_schema;
            node.inputs = prune_all(std::mem::take(&mut node.inputs), &child_required);
        }
        LogicalOp::Join {
            eq_conditions,
            other_conditions,
        } => {
            let mut child_required = required.clone();
            for (left, right) in eq_conditions.iter() {
                child_required.insert(left.id);
                child_required.insert(right.id);
            }
            for cond in other_conditions.iter() {
                cond.collect_columns(&mut child_required);
            }
            node.inputs = prune_all(std::mem::take(&mut node.inputs), &child_required);
            node.schema = node
                .inputs
                .iter()
                .flat_map(|child| child.schema.iter().cloned())
                .collect();
        }
        LogicalOp::Selection { conditions } => {
            let mut child_required = required.clone();
            for cond in conditions.iter() {
                cond.collect_columns(&mut child_required);
            }
            pass_through(&mut node, &child_required);
        }
        LogicalOp::Sort { by } | LogicalOp::TopN { by, .. } => {
            let mut child_required = required.clone();
            for item in by.iter() {
                item.expr.collect_columns(&mut child_required);
            }
            pass_through(&mut node, &child_required);
        }
        LogicalOp::Limit { .. } => {
            let child_required = required.clone();
            pass_through(&mut node, &child_required);
        }
        LogicalOp::Update { assignments, .. } => {
            let mut child_required = FxHashSet::default();
            for child in &node.inputs {
                child_required.extend(child.schema.iter().map(|col| col.id));
            }
            for (col, value) in assignments.iter() {
                child_required.insert(col.id);
                value.collect_columns(&mut child_required);
            }
            node.inputs = prune_all(std::mem::take(&mut node.inputs), &child_required);
        }
        LogicalOp::Delete { .. } => {
            let child_required: FxHashSet<PlanColumnId> = node
                .inputs
                .iter()
                .flat_map(|child| child.schema.iter().map(|col| col.id))
                .collect();
            node.inputs = prune_all(std::mem::take(&mut node.inputs), &child_required);
        }
    }
    node
}

fn prune_all(inputs: Vec<LogicalNode>, required: &FxHashSet<PlanColumnId>) -> Vec<LogicalNode> {
    inputs
        .into_iter()
        .map(|child| prune(child, required))
        .collect()
}

fn pass_through(node: &mut LogicalNode, child_required: &FxHashSet<PlanColumnId>) {
    node.inputs = prune_all(std::mem::take(&mut node.inputs), child_required);
    if let Some(child) = node.inputs.first() {
        node.schema = child.schema.clone();
    }
}

/// Drops projections that reproduce their input's columns unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectionEliminator;

impl LogicalRule for ProjectionEliminator {
    fn name(&self) -> &'static str {
        "eliminate_projection"
    }

    fn flag(&self) -> OptFlags {
        OptFlags::ELIMINATE_PROJECTION
    }

    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let (root, ids) = plan.into_parts();
        Ok(LogicalPlan::from_parts(eliminate(root), ids))
    }
}

fn eliminate(mut node: LogicalNode) -> LogicalNode {
    node.inputs = node.inputs.into_iter().map(eliminate).collect();
    if is_identity_projection(&node) {
        if let Some(child) = node.inputs.pop() {
            return child;
        }
    }
    node
}

fn is_identity_projection(node: &LogicalNode) -> bool {
    let LogicalOp::Projection { exprs } = &node.op else {
        return false;
    };
    let [child] = node.inputs.as_slice() else {
        return false;
    };
    exprs.len() == child.schema.len()
        && exprs
            .iter()
            .zip(&node.schema)
            .zip(&child.schema)
            .all(|((expr, out), input)| {
                matches!(expr, ScalarExpr::Column(col) if col.id == input.id)
                    && out.id == input.id
                    && out.name == input.name
            })
}

/// Moves filter conditions as close to the scans as they can go.
#[derive(Debug, Default, Clone, Copy)]
pub struct PredicatePushDown;

impl LogicalRule for PredicatePushDown {
    fn name(&self) -> &'static str {
        "predicate_push_down"
    }

    fn flag(&self) -> OptFlags {
        OptFlags::PREDICATE_PUSH_DOWN
    }

    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let (root, mut ids) = plan.into_parts();
        let root = push_down(root, Vec::new(), &mut ids)?;
        Ok(LogicalPlan::from_parts(root, ids))
    }
}

fn push_down(
    node: LogicalNode,
    preds: Vec<ScalarExpr>,
    ids: &mut PlanIdAllocator,
) -> Result<LogicalNode> {
    let LogicalNode {
        id,
        op,
        schema,
        inputs,
    } = node;
    match op {
        LogicalOp::Selection { mut conditions } => {
            conditions.extend(preds);
            push_down(single_input(inputs, "selection expects one input")?, conditions, ids)
        }
        LogicalOp::DataSource {
            db,
            table,
            alias,
            mut pushed_conditions,
        } => {
            pushed_conditions.extend(preds);
            let op = LogicalOp::DataSource {
                db,
                table,
                alias,
                pushed_conditions,
            };
            Ok(LogicalNode::with_inputs(id, op, schema, inputs))
        }
        LogicalOp::Join {
            mut eq_conditions,
            other_conditions,
        } => {
            let (left, right) = two_inputs(inputs)?;
            let left_ids = schema_ids(&left.schema);
            let right_ids = schema_ids(&right.schema);
            let mut left_preds = Vec::new();
            let mut right_preds = Vec::new();
            let mut other = Vec::new();
            for pred in other_conditions.into_iter().chain(preds) {
                if covered_by(&pred, &left_ids) {
                    left_preds.push(pred);
                } else if covered_by(&pred, &right_ids) {
                    right_preds.push(pred);
                } else {
                    match pred.as_column_eq_column() {
                        Some((a, b)) if left_ids.contains(&a.id) && right_ids.contains(&b.id) => {
                            eq_conditions.push((a.clone(), b.clone()));
                        }
                        Some((a, b)) if right_ids.contains(&a.id) && left_ids.contains(&b.id) => {
                            eq_conditions.push((b.clone(), a.clone()));
                        }
                        _ => other.push(pred),
                    }
                }
            }
            let left = push_down(left, left_preds, ids)?;
            let right = push_down(right, right_preds, ids)?;
            let schema = left.schema.iter().chain(&right.schema).cloned().collect();
            let op = LogicalOp::Join {
                eq_conditions,
                other_conditions: other,
            };
            Ok(LogicalNode::with_inputs(id, op, schema, vec![left, right]))
        }
        LogicalOp::Projection { exprs } => {
            let child = single_input(inputs, "projection expects one input")?;
            let child_ids = schema_ids(&child.schema);
            let (down, kept): (Vec<_>, Vec<_>) =
                preds.into_iter().partition(|p| covered_by(p, &child_ids));
            let child = push_down(child, down, ids)?;
            let node =
                LogicalNode::with_inputs(id, LogicalOp::Projection { exprs }, schema, vec![child]);
            Ok(wrap_selection(node, kept, ids))
        }
        LogicalOp::Sort { by } => {
            let child = push_down(single_input(inputs, "sort expects one input")?, preds, ids)?;
            Ok(LogicalNode::with_inputs(id, LogicalOp::Sort { by }, schema, vec![child]))
        }
        op @ (LogicalOp::Limit { .. }
        | LogicalOp::TopN { .. }
        | LogicalOp::Update { .. }
        | LogicalOp::Delete { .. }) => {
            let inputs = inputs
                .into_iter()
                .map(|child| push_down(child, Vec::new(), ids))
                .collect::<Result<Vec<_>>>()?;
            let node = LogicalNode::with_inputs(id, op, schema, inputs);
            Ok(wrap_selection(node, preds, ids))
        }
    }
}

fn wrap_selection(
    node: LogicalNode,
    conditions: Vec<ScalarExpr>,
    ids: &mut PlanIdAllocator,
) -> LogicalNode {
    if conditions.is_empty() {
        return node;
    }
    LogicalNode::unary(ids.alloc(), LogicalOp::Selection { conditions }, node)
}

/// Fuses a limit directly over a sort into a top-N.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopNPushDown;

impl LogicalRule for TopNPushDown {
    fn name(&self) -> &'static str {
        "topn_push_down"
    }

    fn flag(&self) -> OptFlags {
        OptFlags::TOPN_PUSH_DOWN
    }

    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let (root, ids) = plan.into_parts();
        Ok(LogicalPlan::from_parts(fuse_topn(root), ids))
    }
}

fn fuse_topn(node: LogicalNode) -> LogicalNode {
    let LogicalNode {
        id,
        op,
        schema,
        inputs,
    } = node;
    let mut inputs: Vec<LogicalNode> = inputs.into_iter().map(fuse_topn).collect();
    if let LogicalOp::Limit { offset, count } = &op {
        if inputs.len() == 1 && matches!(inputs[0].op, LogicalOp::Sort { .. }) {
            let sort = inputs.remove(0);
            if let LogicalOp::Sort { by } = sort.op {
                let op = LogicalOp::TopN {
                    by,
                    offset: *offset,
                    count: *count,
                };
                return LogicalNode::with_inputs(id, op, schema, sort.inputs);
            }
        }
    }
    LogicalNode::with_inputs(id, op, schema, inputs)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::planner::ast::{BinaryOp, Datum};
    use crate::planner::expression::PlanColumn;
    use crate::planner::logical::SortItem;
    use crate::schema::{ColumnType, InfoSchema, TableDef, TableInfo};
    use crate::types::PlanId;

    fn table() -> Arc<TableInfo> {
        let schema = InfoSchema::builder(1)
            .database("db")
            .table(
                "db",
                TableDef::new("t")
                    .column("a", ColumnType::Int)
                    .column("b", ColumnType::Int)
                    .column("c", ColumnType::String),
            )
            .build()
            .expect("schema");
        Arc::clone(schema.table("db", "t").expect("table"))
    }

    fn column(id: u64, name: &str) -> PlanColumn {
        PlanColumn {
            id: PlanColumnId(id),
            name: name.into(),
            table: Some("t".into()),
            origin: None,
            ty: None,
        }
    }

    fn scan() -> LogicalNode {
        let op = LogicalOp::DataSource {
            db: "db".into(),
            table: table(),
            alias: None,
            pushed_conditions: Vec::new(),
        };
        LogicalNode::new(PlanId(1), op, vec![column(1, "a"), column(2, "b"), column(3, "c")])
    }

    fn a_gt_one() -> ScalarExpr {
        ScalarExpr::binary(
            BinaryOp::Gt,
            ScalarExpr::Column(column(1, "a")),
            ScalarExpr::Constant(Datum::Int(1)),
        )
    }

    #[test]
    fn pruning_keeps_filter_columns_on_the_scan() {
        let selection = LogicalNode::unary(
            PlanId(2),
            LogicalOp::Selection {
                conditions: vec![a_gt_one()],
            },
            scan(),
        );
        let projection = LogicalNode::with_inputs(
            PlanId(3),
            LogicalOp::Projection {
                exprs: vec![ScalarExpr::Column(column(2, "b"))],
            },
            vec![column(2, "b")],
            vec![selection],
        );
        let plan = ColumnPruner
            .optimize(LogicalPlan::new(projection, PlanId(3)))
            .expect("prunes");
        let scan = &plan.root.inputs[0].inputs[0];
        let names: Vec<&str> = scan.schema.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn push_down_moves_filters_into_the_scan() {
        let selection = LogicalNode::unary(
            PlanId(2),
            LogicalOp::Selection {
                conditions: vec![a_gt_one()],
            },
            scan(),
        );
        let plan = PredicatePushDown
            .optimize(LogicalPlan::new(selection, PlanId(2)))
            .expect("pushes");
        match &plan.root.op {
            LogicalOp::DataSource {
                pushed_conditions, ..
            } => assert_eq!(pushed_conditions, &vec![a_gt_one()]),
            other => panic!("expected data source, got {}", other.name()),
        }
    }

    #[test]
    fn push_down_stops_at_limits_with_a_fresh_selection() {
        let limit = LogicalNode::unary(PlanId(2), LogicalOp::Limit { offset: 0, count: 3 }, scan());
        let selection = LogicalNode::unary(
            PlanId(3),
            LogicalOp::Selection {
                conditions: vec![a_gt_one()],
            },
            limit,
        );
        let plan = PredicatePushDown
            .optimize(LogicalPlan::new(selection, PlanId(3)))
            .expect("pushes");
        assert_eq!(plan.root.op_name(), "Selection");
        assert_eq!(plan.root.id, PlanId(4));
        assert_eq!(plan.root.inputs[0].op_name(), "Limit");
    }

    #[test]
    fn limit_over_sort_becomes_topn() {
        let sort = LogicalNode::unary(
            PlanId(2),
            LogicalOp::Sort {
                by: vec![SortItem {
                    expr: ScalarExpr::Column(column(1, "a")),
                    desc: true,
                }],
            },
            scan(),
        );
        let limit = LogicalNode::unary(PlanId(3), LogicalOp::Limit { offset: 1, count: 5 }, sort);
        let plan = TopNPushDown
            .optimize(LogicalPlan::new(limit, PlanId(3)))
            .expect("fuses");
        assert!(matches!(
            plan.root.op,
            LogicalOp::TopN {
                offset: 1,
                count: 5,
                ..
            }
        ));
        assert_eq!(plan.root.id, PlanId(3));
        assert_eq!(plan.root.inputs[0].op_name(), "DataSource");
    }

    #[test]
    fn identity_projection_is_removed() {
        let projection = LogicalNode::with_inputs(
            PlanId(2),
            LogicalOp::Projection {
                exprs: vec![
                    ScalarExpr::Column(column(1, "a")),
                    ScalarExpr::Column(column(2, "b")),
                    ScalarExpr::Column(column(3, "c")),
                ],
            },
            vec![column(1, "a"), column(2, "b"), column(3, "c")],
            vec![scan()],
        );
        let plan = ProjectionEliminator
            .optimize(LogicalPlan::new(projection, PlanId(2)))
            .expect("eliminates");
        assert_eq!(plan.root.op_name(), "DataSource");
    }
}
