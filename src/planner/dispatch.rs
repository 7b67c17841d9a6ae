//! The plan dispatcher: decides which planning path a statement takes.
//!
//! For every statement the dispatcher, in order:
//!
//! 1. asks the fast-path detector for a ready plan and returns it as is;
//! 2. builds a plan, resetting the session's plan id counters first, or
//!    takes the plan the caller supplied;
//! 3. checks the recorded visit info against the session's privilege
//!    manager, when one is configured;
//! 4. hands prepared executions to [`ExecutePlan::reoptimize_prepared_plan`];
//! 5. returns non-logical plans unchanged;
//! 6. optimizes logical plans, unless the cascades planner is requested.
//!
//! Nothing is retried. Errors reach the caller unchanged, except that
//! re-optimization failures gain a trace frame.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::planner::ast::Statement;
use crate::planner::errors::{PlanError, Result};
use crate::planner::fast_path::{FastPathDetector, PointGetDetector};
use crate::planner::optimizer::{OptFlags, Optimizer, RuleBasedOptimizer};
use crate::planner::plan::{OptimizedPlan, Plan, ReusedPlan};
use crate::planner::plan_builder::PlanBuilder;
#[cfg(doc)]
use crate::planner::prepared::ExecutePlan;
use crate::planner::profile::{profile_timer, record_dispatch, DispatchExit};
use crate::privilege::check_privilege;
use crate::schema::InfoSchema;
use crate::session::SessionContext;

/// Entry point the statement-execution driver plans through.
pub trait StatementPlanner: Send + Sync {
    /// Plans `stmt`, returning the plan together with the visit info and
    /// optimization flags it was checked and optimized with.
    ///
    /// With `existing`, building is skipped and the supplied plan and its
    /// records are used instead.
    fn optimize_traced(
        &self,
        ctx: &mut SessionContext,
        stmt: &Statement,
        schema: &Arc<InfoSchema>,
        existing: Option<ReusedPlan>,
    ) -> Result<OptimizedPlan>;

    /// Plans `stmt`, returning only the plan.
    fn optimize(
        &self,
        ctx: &mut SessionContext,
        stmt: &Statement,
        schema: &Arc<InfoSchema>,
        existing: Option<ReusedPlan>,
    ) -> Result<Plan> {
        self.optimize_traced(ctx, stmt, schema, existing)
            .map(|optimized| optimized.plan)
    }
}

/// Default [`StatementPlanner`].
#[derive(Clone)]
pub struct PlanDispatcher {
    fast_path: Arc<dyn FastPathDetector>,
    optimizer: Arc<dyn Optimizer>,
}

impl PlanDispatcher {
    /// Dispatcher using `optimizer` and the point-get fast path.
    pub fn new(optimizer: Arc<dyn Optimizer>) -> Self {
        Self {
            fast_path: Arc::new(PointGetDetector),
            optimizer,
        }
    }

    /// Replaces the fast-path detector.
    pub fn with_fast_path(mut self, fast_path: Arc<dyn FastPathDetector>) -> Self {
        self.fast_path = fast_path;
        self
    }

    fn dispatch(
        &self,
        ctx: &mut SessionContext,
        stmt: &Statement,
        schema: &Arc<InfoSchema>,
        existing: Option<ReusedPlan>,
    ) -> (DispatchExit, Result<OptimizedPlan>) {
        if let Some(plan) = self.fast_path.try_fast_plan(ctx, stmt) {
            debug!(kind = %plan.kind(), stmt = stmt.kind_name(), "planner.dispatch.fast_path");
            return (
                DispatchExit::FastPath,
                Ok(OptimizedPlan {
                    plan,
                    visit_info: Vec::new(),
                    opt_flags: OptFlags::empty(),
                }),
            );
        }

        let ReusedPlan {
            plan,
            visit_info,
            opt_flags,
        } = match existing {
            Some(reused) => {
                trace!(kind = %reused.plan.kind(), "planner.dispatch.reuse");
                reused
            }
            None => {
                ctx.vars_mut().reset_plan_ids();
                let mut builder = PlanBuilder::new(ctx, schema);
                let plan = match builder.build(stmt) {
                    Ok(plan) => plan,
                    Err(err) => {
                        debug!(stmt = stmt.kind_name(), error = %err, "planner.dispatch.build_failed");
                        return (DispatchExit::BuildError, Err(err));
                    }
                };
                let (visit_info, opt_flags) = builder.finish();
                ReusedPlan {
                    plan,
                    visit_info,
                    opt_flags,
                }
            }
        };

        if let Some(manager) = ctx.privilege_manager() {
            if !check_privilege(manager.as_ref(), &ctx.vars().user, &visit_info) {
                debug!(
                    user = %ctx.vars().user,
                    visits = visit_info.len(),
                    "planner.dispatch.privilege_denied"
                );
                return (DispatchExit::PrivilegeDenied, Err(PlanError::PrivilegeCheckFail));
            }
        }

        match plan {
            Plan::Execute(execute) => {
                let result = match execute.reoptimize_prepared_plan(ctx, schema, self) {
                    Ok(plan) => Ok(OptimizedPlan {
                        plan,
                        visit_info,
                        opt_flags,
                    }),
                    Err(err) => Err(PlanError::reoptimize(err)),
                };
                (DispatchExit::Prepared, result)
            }
            Plan::Logical(logical) => {
                if ctx.vars().enable_cascades_planner {
                    debug!("planner.dispatch.cascades_rejected");
                    return (
                        DispatchExit::CascadesRejected,
                        Err(PlanError::CascadesNotImplemented),
                    );
                }
                trace!(flags = %opt_flags, root = logical.root.op_name(), "planner.dispatch.optimize");
                let result = self
                    .optimizer
                    .optimize(opt_flags, logical)
                    .map(|plan| OptimizedPlan {
                        plan,
                        visit_info,
                        opt_flags,
                    });
                (DispatchExit::Optimized, result)
            }
            plan @ (Plan::Physical(_) | Plan::Insert(_) | Plan::Simple(_)) => (
                DispatchExit::Passthrough,
                Ok(OptimizedPlan {
                    plan,
                    visit_info,
                    opt_flags,
                }),
            ),
        }
    }
}

impl Default for PlanDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(RuleBasedOptimizer::new()))
    }
}

impl fmt::Debug for PlanDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanDispatcher").finish_non_exhaustive()
    }
}

impl StatementPlanner for PlanDispatcher {
    fn optimize_traced(
        &self,
        ctx: &mut SessionContext,
        stmt: &Statement,
        schema: &Arc<InfoSchema>,
        existing: Option<ReusedPlan>,
    ) -> Result<OptimizedPlan> {
        let start = profile_timer();
        let (exit, result) = self.dispatch(ctx, stmt, schema, existing);
        record_dispatch(exit, start);
        trace!(exit = ?exit, ok = result.is_ok(), "planner.dispatch.exit");
        result
    }
}
