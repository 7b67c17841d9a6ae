#![forbid(unsafe_code)]

//! Statement planning.
//!
//! [`dispatch::PlanDispatcher`] is the entry point: it routes a statement
//! through the fast path, the plan builder, the privilege gate, prepared
//! statement re-optimization, and the rule-based optimizer.

/// Statement nodes produced upstream by the parser.
pub mod ast;

/// Fluent construction of statement nodes.
pub mod builder;

/// The plan dispatcher and the [`StatementPlanner`] trait.
pub mod dispatch;

/// Planner errors and their machine-readable codes.
pub mod errors;

/// Explain trees and deterministic plan hashes.
pub mod explain;

/// Resolved scalar expressions and plan columns.
pub mod expression;

/// Shortcut planning for point lookups.
pub mod fast_path;

/// Logical operator trees.
pub mod logical;

/// Logical rewrite rules and physical lowering.
pub mod optimizer;

/// Physical operator trees.
pub mod physical;

/// The closed set of plan kinds.
pub mod plan;

/// Name resolution and logical plan construction.
pub mod plan_builder;

/// Prepared statement execution plans.
pub mod prepared;

/// Env-gated dispatch counters.
pub mod profile;

pub use dispatch::{PlanDispatcher, StatementPlanner};
pub use errors::{PlanError, PlanErrorWithCode, Result};
pub use explain::{explain, ExplainNode, ExplainProp, PlanExplain};
pub use fast_path::{FastPathDetector, NoFastPath, PointGetDetector};
pub use optimizer::{OptFlags, Optimizer, RuleBasedOptimizer};
pub use plan::{InsertPlan, OptimizedPlan, Plan, PlanKind, ReusedPlan, SimplePlan};
pub use plan_builder::PlanBuilder;
pub use prepared::{ExecutePlan, PreparedTarget};
