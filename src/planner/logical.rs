//! Logical query plan structures built from statements before physical
//! optimisation.

use std::sync::Arc;

use crate::planner::expression::{PlanColumn, ScalarExpr};
use crate::schema::TableInfo;
use crate::types::PlanId;

/// Logical operator tree for a statement.
#[derive(Clone, Debug)]
pub struct LogicalPlan {
    /// The root node of the logical plan tree.
    pub root: LogicalNode,
    ids: PlanIdAllocator,
}

impl LogicalPlan {
    /// Creates a logical plan whose optimizer-created nodes get ids above
    /// `last_id`.
    pub fn new(root: LogicalNode, last_id: PlanId) -> Self {
        Self {
            root,
            ids: PlanIdAllocator { last: last_id.0 },
        }
    }

    /// Output columns of the plan.
    pub fn schema(&self) -> &[PlanColumn] {
        &self.root.schema
    }

    /// Splits the plan into its root and id allocator.
    pub fn into_parts(self) -> (LogicalNode, PlanIdAllocator) {
        (self.root, self.ids)
    }

    /// Reassembles a plan from [`LogicalPlan::into_parts`].
    pub fn from_parts(root: LogicalNode, ids: PlanIdAllocator) -> Self {
        Self { root, ids }
    }
}

/// Hands out node ids for operators introduced during optimisation.
#[derive(Clone, Debug)]
pub struct PlanIdAllocator {
    last: u64,
}

impl PlanIdAllocator {
    /// Returns the next unused id.
    pub fn alloc(&mut self) -> PlanId {
        self.last += 1;
        PlanId(self.last)
    }
}

/// Node within the logical plan tree.
#[derive(Clone, Debug)]
pub struct LogicalNode {
    /// Node identifier, unique within the plan.
    pub id: PlanId,
    /// The logical operator at this node.
    pub op: LogicalOp,
    /// Output columns.
    pub schema: Vec<PlanColumn>,
    /// Child nodes that provide input to this operator.
    pub inputs: Vec<LogicalNode>,
}

impl LogicalNode {
    /// Creates a leaf node.
    pub fn new(id: PlanId, op: LogicalOp, schema: Vec<PlanColumn>) -> Self {
        Self {
            id,
            op,
            schema,
            inputs: Vec::new(),
        }
    }

    /// Creates a node that passes its single input's columns through.
    pub fn unary(id: PlanId, op: LogicalOp, input: LogicalNode) -> Self {
        Self {
            id,
            op,
            schema: input.schema.clone(),
            inputs: vec![input],
        }
    }

    /// Creates a node with explicit output columns and inputs.
    pub fn with_inputs(
        id: PlanId,
        op: LogicalOp,
        schema: Vec<PlanColumn>,
        inputs: Vec<LogicalNode>,
    ) -> Self {
        Self {
            id,
            op,
            schema,
            inputs,
        }
    }

    /// Operator name as shown by explain output.
    pub fn op_name(&self) -> &'static str {
        self.op.name()
    }
}

/// Sort key.
#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    /// Key expression.
    pub expr: ScalarExpr,
    /// Descending order when set.
    pub desc: bool,
}

/// Logical operators available prior to physical selection.
#[derive(Clone, Debug)]
pub enum LogicalOp {
    /// Reads rows of a table.
    DataSource {
        /// Database the table lives in.
        db: String,
        /// Table metadata from the snapshot the plan was built against.
        table: Arc<TableInfo>,
        /// Alias the table is referenced by.
        alias: Option<String>,
        /// Conjuncts pushed into the scan.
        pushed_conditions: Vec<ScalarExpr>,
    },
    /// Keeps rows satisfying every condition.
    Selection {
        /// Conjunctive conditions.
        conditions: Vec<ScalarExpr>,
    },
    /// Computes output columns; `exprs[i]` produces `schema[i]`.
    Projection {
        /// Output expressions.
        exprs: Vec<ScalarExpr>,
    },
    /// Inner join of two inputs.
    Join {
        /// `left = right` column pairs.
        eq_conditions: Vec<(PlanColumn, PlanColumn)>,
        /// Remaining join conditions.
        other_conditions: Vec<ScalarExpr>,
    },
    /// Orders rows.
    Sort {
        /// Sort keys, most significant first.
        by: Vec<SortItem>,
    },
    /// Skips then truncates rows.
    Limit {
        /// Rows to skip.
        offset: u64,
        /// Maximum rows returned.
        count: u64,
    },
    /// Sort fused with a limit.
    TopN {
        /// Sort keys, most significant first.
        by: Vec<SortItem>,
        /// Rows to skip.
        offset: u64,
        /// Maximum rows returned.
        count: u64,
    },
    /// Modifies the rows produced by the input.
    Update {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
        /// Target column and new value pairs.
        assignments: Vec<(PlanColumn, ScalarExpr)>,
    },
    /// Removes the rows produced by the input.
    Delete {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
    },
}

impl LogicalOp {
    /// Operator name as shown by explain output.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::DataSource { .. } => "DataSource",
            LogicalOp::Selection { .. } => "Selection",
            LogicalOp::Projection { .. } => "Projection",
            LogicalOp::Join { .. } => "Join",
            LogicalOp::Sort { .. } => "Sort",
            LogicalOp::Limit { .. } => "Limit",
            LogicalOp::TopN { .. } => "TopN",
            LogicalOp::Update { .. } => "Update",
            LogicalOp::Delete { .. } => "Delete",
        }
    }
}
