//! Physical operator tree selected by the rule-based optimizer.

use std::sync::Arc;

use crate::planner::ast::Datum;
use crate::planner::expression::{PlanColumn, ScalarExpr};
use crate::planner::logical::SortItem;
use crate::schema::{IndexInfo, TableInfo};

/// Physical plan produced by the optimizer or the fast path.
#[derive(Clone, Debug)]
pub struct PhysicalPlan {
    /// The root node of the physical plan tree.
    pub root: PhysicalNode,
}

impl PhysicalPlan {
    /// Creates a new physical plan with the given root node.
    pub fn new(root: PhysicalNode) -> Self {
        Self { root }
    }

    /// Output columns of the plan.
    pub fn schema(&self) -> &[PlanColumn] {
        &self.root.schema
    }
}

/// Node within the physical plan tree.
#[derive(Clone, Debug)]
pub struct PhysicalNode {
    /// The physical operator at this node.
    pub op: PhysicalOp,
    /// Output columns.
    pub schema: Vec<PlanColumn>,
    /// Estimated number of output rows.
    pub est_rows: f64,
    /// Child nodes that provide input to this operator.
    pub inputs: Vec<PhysicalNode>,
}

impl PhysicalNode {
    /// Creates a leaf node.
    pub fn new(op: PhysicalOp, schema: Vec<PlanColumn>, est_rows: f64) -> Self {
        Self {
            op,
            schema,
            est_rows,
            inputs: Vec::new(),
        }
    }

    /// Creates a node with the given inputs.
    pub fn with_inputs(
        op: PhysicalOp,
        schema: Vec<PlanColumn>,
        est_rows: f64,
        inputs: Vec<PhysicalNode>,
    ) -> Self {
        Self {
            op,
            schema,
            est_rows,
            inputs,
        }
    }
}

/// Input of a hash join the hash table is built from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BuildSide {
    /// First input.
    Left,
    /// Second input.
    Right,
}

/// Physical operators.
#[derive(Clone, Debug)]
pub enum PhysicalOp {
    /// Reads at most one row by its integer primary key.
    PointGet {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
        /// Primary-key value.
        handle: Datum,
    },
    /// Reads rows through a secondary index with equality on every key column.
    IndexLookup {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
        /// Index used.
        index: IndexInfo,
        /// Key values, in index column order.
        values: Vec<Datum>,
        /// Residual conditions applied to fetched rows.
        filters: Vec<ScalarExpr>,
    },
    /// Reads every row of a table.
    TableScan {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
        /// Conditions applied while scanning.
        filters: Vec<ScalarExpr>,
    },
    /// Keeps rows satisfying every condition.
    Selection {
        /// Conjunctive conditions.
        conditions: Vec<ScalarExpr>,
    },
    /// Computes output columns.
    Projection {
        /// Output expressions.
        exprs: Vec<ScalarExpr>,
    },
    /// Inner hash join.
    HashJoin {
        /// `left = right` column pairs hashed on.
        eq_conditions: Vec<(PlanColumn, PlanColumn)>,
        /// Conditions applied to joined rows.
        other_conditions: Vec<ScalarExpr>,
        /// Input the hash table is built from.
        build_side: BuildSide,
    },
    /// Full sort.
    Sort {
        /// Sort keys.
        by: Vec<SortItem>,
    },
    /// Bounded heap sort.
    TopN {
        /// Sort keys.
        by: Vec<SortItem>,
        /// Rows to skip.
        offset: u64,
        /// Maximum rows returned.
        count: u64,
    },
    /// Skips then truncates rows.
    Limit {
        /// Rows to skip.
        offset: u64,
        /// Maximum rows returned.
        count: u64,
    },
    /// Writes new values to the input rows.
    Update {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
        /// Target column and new value pairs.
        assignments: Vec<(PlanColumn, ScalarExpr)>,
    },
    /// Removes the input rows.
    Delete {
        /// Database the table lives in.
        db: String,
        /// Target table.
        table: Arc<TableInfo>,
    },
}

impl PhysicalOp {
    /// Operator name as shown by explain output.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOp::PointGet { .. } => "PointGet",
            PhysicalOp::IndexLookup { .. } => "IndexLookup",
            PhysicalOp::TableScan { .. } => "TableScan",
            PhysicalOp::Selection { .. } => "Selection",
            PhysicalOp::Projection { .. } => "Projection",
            PhysicalOp::HashJoin { .. } => "HashJoin",
            PhysicalOp::Sort { .. } => "Sort",
            PhysicalOp::TopN { .. } => "TopN",
            PhysicalOp::Limit { .. } => "Limit",
            PhysicalOp::Update { .. } => "Update",
            PhysicalOp::Delete { .. } => "Delete",
        }
    }
}
