//! The closed set of plan kinds the dispatcher branches on.

use std::fmt;
use std::sync::Arc;

use crate::planner::ast::{Statement, VariableAssignment};
use crate::planner::expression::ScalarExpr;
use crate::planner::logical::LogicalPlan;
use crate::planner::optimizer::OptFlags;
use crate::planner::physical::PhysicalPlan;
use crate::planner::prepared::ExecutePlan;
use crate::privilege::VisitInfo;
use crate::schema::{ColumnInfo, TableInfo};

/// Result of planning a statement.
#[derive(Clone, Debug)]
pub enum Plan {
    /// Execution of a prepared statement; re-optimized on every dispatch.
    Execute(ExecutePlan),
    /// Plan still eligible for optimization.
    Logical(LogicalPlan),
    /// Executable operator tree.
    Physical(PhysicalPlan),
    /// Row insertion; needs no optimization.
    Insert(InsertPlan),
    /// Administrative statement applied by the session.
    Simple(SimplePlan),
}

impl Plan {
    /// Kind tag used for logging and metrics.
    pub fn kind(&self) -> PlanKind {
        match self {
            Plan::Execute(_) => PlanKind::Execute,
            Plan::Logical(_) => PlanKind::Logical,
            Plan::Physical(_) => PlanKind::Physical,
            Plan::Insert(_) => PlanKind::Insert,
            Plan::Simple(_) => PlanKind::Simple,
        }
    }

    /// Returns the physical plan, if this is one.
    pub fn as_physical(&self) -> Option<&PhysicalPlan> {
        match self {
            Plan::Physical(plan) => Some(plan),
            _ => None,
        }
    }
}

/// Fieldless mirror of [`Plan`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PlanKind {
    /// [`Plan::Execute`]
    Execute,
    /// [`Plan::Logical`]
    Logical,
    /// [`Plan::Physical`]
    Physical,
    /// [`Plan::Insert`]
    Insert,
    /// [`Plan::Simple`]
    Simple,
}

impl PlanKind {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            PlanKind::Execute => "execute",
            PlanKind::Logical => "logical",
            PlanKind::Physical => "physical",
            PlanKind::Insert => "insert",
            PlanKind::Simple => "simple",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved INSERT.
#[derive(Clone, Debug)]
pub struct InsertPlan {
    /// Database the table lives in.
    pub db: String,
    /// Target table.
    pub table: Arc<TableInfo>,
    /// Target columns, matching each row's value order.
    pub columns: Vec<ColumnInfo>,
    /// Constant rows.
    pub rows: Vec<Vec<ScalarExpr>>,
}

/// Statements the session applies itself.
#[derive(Clone, Debug, PartialEq)]
pub enum SimplePlan {
    /// System variable assignments, already validated.
    Set(Vec<VariableAssignment>),
    /// Switch the current database.
    Use {
        /// Existing database.
        db: String,
    },
    /// List tables of a database.
    ShowTables {
        /// Existing database.
        db: String,
    },
    /// Register a prepared statement.
    Prepare {
        /// Statement name.
        name: String,
        /// Body with placeholders.
        stmt: Statement,
        /// Number of placeholders.
        param_count: usize,
    },
    /// Drop a prepared statement.
    Deallocate {
        /// Statement name.
        name: String,
    },
}

/// A previously produced plan handed back to the dispatcher together with
/// what its original build recorded.
#[derive(Clone, Debug)]
pub struct ReusedPlan {
    /// The plan.
    pub plan: Plan,
    /// Visit info recorded when the plan was built.
    pub visit_info: Vec<VisitInfo>,
    /// Optimization flags recorded when the plan was built.
    pub opt_flags: OptFlags,
}

impl From<Plan> for ReusedPlan {
    /// Wraps a plan that was never built by this crate's builder; it carries
    /// no visit info.
    fn from(plan: Plan) -> Self {
        Self {
            plan,
            visit_info: Vec::new(),
            opt_flags: OptFlags::empty(),
        }
    }
}

/// Dispatcher output with the records needed to reuse it later.
#[derive(Clone, Debug)]
pub struct OptimizedPlan {
    /// The plan.
    pub plan: Plan,
    /// Visit info the privilege gate checked.
    pub visit_info: Vec<VisitInfo>,
    /// Optimization flags collected by the build.
    pub opt_flags: OptFlags,
}

impl From<OptimizedPlan> for ReusedPlan {
    fn from(value: OptimizedPlan) -> Self {
        Self {
            plan: value.plan,
            visit_info: value.visit_info,
            opt_flags: value.opt_flags,
        }
    }
}
