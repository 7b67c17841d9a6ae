//! Explain trees for every plan kind.

use std::fmt::Write as _;
use std::hash::Hasher;

use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use crate::planner::expression::{PlanColumn, ScalarExpr};
use crate::planner::logical::{LogicalNode, LogicalOp, SortItem};
use crate::planner::physical::{BuildSide, PhysicalNode, PhysicalOp};
use crate::planner::plan::{InsertPlan, Plan, SimplePlan};
use crate::planner::prepared::ExecutePlan;
use crate::schema::TableInfo;

/// Human-readable explain tree.
#[derive(Clone, Debug, Serialize)]
pub struct PlanExplain {
    /// Root node of the explain tree
    pub root: ExplainNode,
    /// Deterministic hash of the tree.
    pub plan_hash: u64,
}

impl PlanExplain {
    /// Renders the tree as indented text, one operator per line.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        render_node(&self.root, 0, &mut out);
        out
    }
}

/// Explain node representing an operator with optional metadata.
#[derive(Clone, Debug, Serialize)]
pub struct ExplainNode {
    /// Operator name
    pub op: String,
    /// Additional properties describing the operator
    pub props: Vec<ExplainProp>,
    /// Input operators
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given operator name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    fn prop(mut self, key: &str, value: impl Into<String>) -> Self {
        self.props.push(ExplainProp::plain(key, value));
        self
    }

    fn literal(mut self, key: &str, value: impl Into<String>) -> Self {
        self.props.push(ExplainProp::literal(key, value));
        self
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug, Serialize)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: true,
        }
    }
}

/// Builds the explain tree of `plan`.
///
/// Node ids are left out, so plans that differ only in the session counters
/// they were built with hash the same.
pub fn explain(plan: &Plan) -> PlanExplain {
    let root = match plan {
        Plan::Execute(execute) => explain_execute(execute),
        Plan::Logical(logical) => explain_logical(&logical.root),
        Plan::Physical(physical) => explain_physical(&physical.root),
        Plan::Insert(insert) => explain_insert(insert),
        Plan::Simple(simple) => explain_simple(simple),
    };
    let mut hasher = Xxh64::new(0);
    hash_node(&root, &mut hasher);
    PlanExplain {
        root,
        plan_hash: hasher.finish(),
    }
}

fn hash_node(node: &ExplainNode, hasher: &mut Xxh64) {
    hasher.write(node.op.as_bytes());
    for prop in &node.props {
        hasher.write(prop.key.as_bytes());
        hasher.write(prop.value.as_bytes());
    }
    hasher.write_u64(node.inputs.len() as u64);
    for child in &node.inputs {
        hash_node(child, hasher);
    }
}

fn render_node(node: &ExplainNode, depth: usize, out: &mut String) {
    let _ = write!(out, "{:indent$}{}", "", node.op, indent = depth * 2);
    for prop in &node.props {
        let _ = write!(out, " {}={}", prop.key, prop.value);
    }
    out.push('\n');
    for child in &node.inputs {
        render_node(child, depth + 1, out);
    }
}

fn qualified(db: &str, table: &TableInfo) -> String {
    format!("{db}.{}", table.name)
}

fn join_exprs(exprs: &[ScalarExpr], sep: &str) -> String {
    exprs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

fn sort_keys(by: &[SortItem]) -> String {
    by.iter()
        .map(|item| {
            if item.desc {
                format!("{} desc", item.expr)
            } else {
                item.expr.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn explain_physical(node: &PhysicalNode) -> ExplainNode {
    let mut explain = ExplainNode::new(node.op.name());
    explain = match &node.op {
        PhysicalOp::PointGet { db, table, handle } => explain
            .prop("table", qualified(db, table))
            .literal("handle", handle.to_string()),
        PhysicalOp::IndexLookup {
            db,
            table,
            index,
            values,
            filters,
        } => {
            let values = values.iter().map(ToString::to_string).collect::<Vec<_>>();
            let explain = explain
                .prop("table", qualified(db, table))
                .prop("index", index.name.clone())
                .literal("values", values.join(", "));
            if filters.is_empty() {
                explain
            } else {
                explain.literal("filters", join_exprs(filters, " AND "))
            }
        }
        PhysicalOp::TableScan { db, table, filters } => {
            let explain = explain.prop("table", qualified(db, table));
            if filters.is_empty() {
                explain
            } else {
                explain.literal("filters", join_exprs(filters, " AND "))
            }
        }
        PhysicalOp::Selection { conditions } => {
            explain.literal("conditions", join_exprs(conditions, " AND "))
        }
        PhysicalOp::Projection { exprs } => explain.prop("exprs", join_exprs(exprs, ", ")),
        PhysicalOp::HashJoin {
            eq_conditions,
            other_conditions,
            build_side,
        } => {
            let eq = eq_conditions
                .iter()
                .map(|(l, r)| format!("{l} = {r}"))
                .collect::<Vec<_>>()
                .join(", ");
            let side = match build_side {
                BuildSide::Left => "left",
                BuildSide::Right => "right",
            };
            let explain = explain.prop("build", side);
            let explain = if eq.is_empty() { explain } else { explain.prop("eq", eq) };
            if other_conditions.is_empty() {
                explain
            } else {
                explain.literal("other", join_exprs(other_conditions, " AND "))
            }
        }
        PhysicalOp::Sort { by } => explain.prop("by", sort_keys(by)),
        PhysicalOp::TopN { by, offset, count } => explain
            .prop("by", sort_keys(by))
            .prop("offset", offset.to_string())
            .prop("count", count.to_string()),
        PhysicalOp::Limit { offset, count } => explain
            .prop("offset", offset.to_string())
            .prop("count", count.to_string()),
        PhysicalOp::Update {
            db,
            table,
            assignments,
        } => explain
            .prop("table", qualified(db, table))
            .literal("set", assignments_text(assignments)),
        PhysicalOp::Delete { db, table } => explain.prop("table", qualified(db, table)),
    };
    explain = explain.prop("est_rows", format!("{:.2}", node.est_rows));
    explain.inputs = node.inputs.iter().map(explain_physical).collect();
    explain
}

fn assignments_text(assignments: &[(PlanColumn, ScalarExpr)]) -> String {
    assignments
        .iter()
        .map(|(col, value)| format!("{} = {value}", col.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn explain_logical(node: &LogicalNode) -> ExplainNode {
    let explain = ExplainNode::new(node.op_name());
    let mut explain = match &node.op {
        LogicalOp::DataSource {
            db,
            table,
            alias,
            pushed_conditions,
        } => {
            let mut explain = explain.prop("table", qualified(db, table));
            if let Some(alias) = alias {
                explain = explain.prop("alias", alias.clone());
            }
            if !pushed_conditions.is_empty() {
                explain = explain.literal("pushed", join_exprs(pushed_conditions, " AND "));
            }
            explain
        }
        LogicalOp::Selection { conditions } => {
            explain.literal("conditions", join_exprs(conditions, " AND "))
        }
        LogicalOp::Projection { exprs } => explain.prop("exprs", join_exprs(exprs, ", ")),
        LogicalOp::Join {
            eq_conditions,
            other_conditions,
        } => {
            let mut explain = explain;
            if !eq_conditions.is_empty() {
                let eq = eq_conditions
                    .iter()
                    .map(|(l, r)| format!("{l} = {r}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                explain = explain.prop("eq", eq);
            }
            if !other_conditions.is_empty() {
                explain = explain.literal("other", join_exprs(other_conditions, " AND "));
            }
            explain
        }
        LogicalOp::Sort { by } => explain.prop("by", sort_keys(by)),
        LogicalOp::Limit { offset, count } => explain
            .prop("offset", offset.to_string())
            .prop("count", count.to_string()),
        LogicalOp::TopN { by, offset, count } => explain
            .prop("by", sort_keys(by))
            .prop("offset", offset.to_string())
            .prop("count", count.to_string()),
        LogicalOp::Update {
            db,
            table,
            assignments,
        } => explain
            .prop("table", qualified(db, table))
            .literal("set", assignments_text(assignments)),
        LogicalOp::Delete { db, table } => explain.prop("table", qualified(db, table)),
    };
    explain.inputs = node.inputs.iter().map(explain_logical).collect();
    explain
}

fn explain_execute(execute: &ExecutePlan) -> ExplainNode {
    let params = execute
        .params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let mut node = ExplainNode::new("Execute")
        .prop("statement", execute.target.to_string())
        .literal("params", params);
    if let Some(id) = execute.stmt_id {
        node = node.prop("stmt_id", id.to_string());
    }
    if let Some(plan) = &execute.plan {
        node.inputs.push(explain(plan).root);
    }
    node
}

fn explain_insert(insert: &InsertPlan) -> ExplainNode {
    let columns = insert
        .columns
        .iter()
        .map(|col| col.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    ExplainNode::new("Insert")
        .prop("table", qualified(&insert.db, &insert.table))
        .prop("columns", columns)
        .prop("rows", insert.rows.len().to_string())
}

fn explain_simple(simple: &SimplePlan) -> ExplainNode {
    match simple {
        SimplePlan::Set(assignments) => {
            let set = assignments
                .iter()
                .map(|a| format!("{} = {}", a.name, a.value))
                .collect::<Vec<_>>()
                .join(", ");
            ExplainNode::new("Set").literal("vars", set)
        }
        SimplePlan::Use { db } => ExplainNode::new("Use").prop("db", db.clone()),
        SimplePlan::ShowTables { db } => ExplainNode::new("ShowTables").prop("db", db.clone()),
        SimplePlan::Prepare {
            name,
            stmt,
            param_count,
        } => ExplainNode::new("Prepare")
            .prop("name", name.clone())
            .prop("stmt", stmt.kind_name())
            .prop("params", param_count.to_string()),
        SimplePlan::Deallocate { name } => ExplainNode::new("Deallocate").prop("name", name.clone()),
    }
}
