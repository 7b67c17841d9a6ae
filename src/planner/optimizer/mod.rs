//! Standard rule-based optimizer: logical rewrites followed by physical
//! lowering with access-path selection.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tracing::{debug, trace};

use crate::planner::errors::Result;
use crate::planner::logical::LogicalPlan;
use crate::planner::physical::PhysicalPlan;
use crate::planner::plan::Plan;

mod lowering;
mod rules;

pub use rules::{ColumnPruner, LogicalRule, PredicatePushDown, ProjectionEliminator, TopNPushDown};

/// Set of logical rewrites a build asked for.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct OptFlags(u32);

impl OptFlags {
    /// Push filters towards the scans.
    pub const PREDICATE_PUSH_DOWN: OptFlags = OptFlags(1 << 0);
    /// Drop columns no ancestor reads.
    pub const COLUMN_PRUNING: OptFlags = OptFlags(1 << 1);
    /// Remove projections that pass their input through unchanged.
    pub const ELIMINATE_PROJECTION: OptFlags = OptFlags(1 << 2);
    /// Fuse limits over sorts into top-N.
    pub const TOPN_PUSH_DOWN: OptFlags = OptFlags(1 << 3);

    const NAMES: [(OptFlags, &'static str); 4] = [
        (Self::PREDICATE_PUSH_DOWN, "predicate_push_down"),
        (Self::COLUMN_PRUNING, "column_pruning"),
        (Self::ELIMINATE_PROJECTION, "eliminate_projection"),
        (Self::TOPN_PUSH_DOWN, "topn_push_down"),
    ];

    /// No rewrites.
    pub const fn empty() -> Self {
        OptFlags(0)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: OptFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets every flag in `other`.
    pub fn insert(&mut self, other: OptFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for OptFlags {
    type Output = OptFlags;

    fn bitor(self, rhs: OptFlags) -> OptFlags {
        OptFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OptFlags {
    fn bitor_assign(&mut self, rhs: OptFlags) {
        self.insert(rhs);
    }
}

impl fmt::Debug for OptFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptFlags({self})")
    }
}

impl fmt::Display for OptFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Turns a logical plan into an executable one.
pub trait Optimizer: Send + Sync {
    /// Optimizes `plan` using the rewrites named by `flags`.
    fn optimize(&self, flags: OptFlags, plan: LogicalPlan) -> Result<Plan>;
}

/// Runs the flagged logical rules in a fixed order and lowers the result.
pub struct RuleBasedOptimizer {
    rules: Vec<Box<dyn LogicalRule>>,
}

impl RuleBasedOptimizer {
    /// Optimizer with the standard rule list.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ColumnPruner),
                Box::new(ProjectionEliminator),
                Box::new(PredicatePushDown),
                Box::new(TopNPushDown),
            ],
        }
    }

    /// Optimizer with a custom rule list, applied in order.
    pub fn with_rules(rules: Vec<Box<dyn LogicalRule>>) -> Self {
        Self { rules }
    }

    /// Applies the flagged logical rules without lowering.
    pub fn rewrite(&self, flags: OptFlags, mut plan: LogicalPlan) -> Result<LogicalPlan> {
        for rule in &self.rules {
            if !flags.contains(rule.flag()) {
                continue;
            }
            plan = rule.optimize(plan)?;
            trace!(rule = rule.name(), "planner.optimizer.rule_applied");
        }
        Ok(plan)
    }
}

impl Default for RuleBasedOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RuleBasedOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("RuleBasedOptimizer")
            .field("rules", &names)
            .finish()
    }
}

impl Optimizer for RuleBasedOptimizer {
    fn optimize(&self, flags: OptFlags, plan: LogicalPlan) -> Result<Plan> {
        let plan = self.rewrite(flags, plan)?;
        let root = lowering::lower(&plan.root)?;
        debug!(
            %flags,
            root = root.op.name(),
            est_rows = root.est_rows,
            "planner.optimizer.lowered"
        );
        Ok(Plan::Physical(PhysicalPlan::new(root)))
    }
}
