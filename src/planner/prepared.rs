//! Execution of prepared statements.
//!
//! An [`ExecutePlan`] names a prepared statement and carries its parameter
//! values. The dispatcher never optimizes it directly; it calls
//! [`ExecutePlan::reoptimize_prepared_plan`], which plans the bound
//! statement by re-entering the dispatcher.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::planner::ast::Datum;
use crate::planner::dispatch::StatementPlanner;
use crate::planner::errors::{PlanError, Result};
use crate::planner::plan::{Plan, ReusedPlan};
use crate::schema::InfoSchema;
use crate::session::{PlanCacheKey, SessionContext};
use crate::types::StmtId;

/// How an execution refers to its prepared statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreparedTarget {
    /// `EXECUTE name`
    Name(String),
    /// Binary-protocol statement id.
    Id(StmtId),
}

impl PreparedTarget {
    fn statement_context(&self) -> &'static str {
        match self {
            PreparedTarget::Name(_) => "EXECUTE",
            PreparedTarget::Id(_) => "STMT_EXECUTE",
        }
    }
}

impl fmt::Display for PreparedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreparedTarget::Name(name) => f.write_str(name),
            PreparedTarget::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Plan executing a prepared statement with concrete parameters.
#[derive(Clone, Debug)]
pub struct ExecutePlan {
    /// Statement to execute.
    pub target: PreparedTarget,
    /// Parameter values in placeholder order.
    pub params: Vec<Datum>,
    /// Resolved statement id, set by re-optimization.
    pub stmt_id: Option<StmtId>,
    /// Plan of the bound statement, set by re-optimization.
    pub plan: Option<Box<Plan>>,
}

impl ExecutePlan {
    /// Execution of the statement prepared under `name`.
    pub fn by_name(name: impl Into<String>, params: Vec<Datum>) -> Self {
        Self {
            target: PreparedTarget::Name(name.into()),
            params,
            stmt_id: None,
            plan: None,
        }
    }

    /// Execution of the statement with id `id`.
    pub fn by_id(id: StmtId, params: Vec<Datum>) -> Self {
        Self {
            target: PreparedTarget::Id(id),
            params,
            stmt_id: None,
            plan: None,
        }
    }

    /// Plans the prepared statement for these parameters against `schema`.
    ///
    /// Cached plans are reused when the statement, schema version, current
    /// database and parameter values match. They still pass through
    /// `planner`, so the privileges recorded when the plan was built are
    /// checked again. The cache is bypassed while the cascades planner is
    /// requested.
    pub fn reoptimize_prepared_plan(
        mut self,
        ctx: &mut SessionContext,
        schema: &Arc<InfoSchema>,
        planner: &dyn StatementPlanner,
    ) -> Result<Plan> {
        let prepared = match &self.target {
            PreparedTarget::Name(name) => ctx.prepared().get_by_name(name),
            PreparedTarget::Id(id) => ctx.prepared().get(*id),
        }
        .ok_or_else(|| PlanError::UnknownPreparedStatement {
            name: self.target.to_string(),
            context: self.target.statement_context(),
        })?;
        let stmt_id = prepared.id;
        let param_count = prepared.param_count;
        let prepared_version = prepared.schema_version;
        let stmt = prepared.stmt.clone();
        if self.params.len() != param_count {
            return Err(PlanError::ParamCountMismatch {
                expected: param_count,
                got: self.params.len(),
            });
        }

        let version = schema.version();
        if prepared_version != version {
            let dropped = ctx.plan_cache_mut().invalidate_stmt(stmt_id);
            if let Some(prepared) = ctx.prepared_mut().get_mut(stmt_id) {
                prepared.schema_version = version;
            }
            info!(
                stmt_id = %stmt_id,
                from = prepared_version,
                to = version,
                dropped,
                "planner.prepared.schema_changed"
            );
        }

        let bound = stmt.bind_params(&self.params)?;
        // Cached plans are physical and would skip the cascades check.
        let use_cache = ctx.vars().enable_plan_cache && !ctx.vars().enable_cascades_planner;
        let key = PlanCacheKey::new(
            stmt_id,
            version,
            ctx.vars().current_db.as_deref(),
            &self.params,
        );
        let cached = if use_cache {
            ctx.plan_cache_mut().get(&key)
        } else {
            None
        };
        let plan = match cached {
            Some(cached) => {
                debug!(stmt_id = %stmt_id, "planner.prepared.cache_hit");
                planner.optimize(ctx, &bound, schema, Some(cached))?
            }
            None => {
                let optimized = planner.optimize_traced(ctx, &bound, schema, None)?;
                if use_cache && optimized.plan.as_physical().is_some() {
                    ctx.plan_cache_mut()
                        .put(key, ReusedPlan::from(optimized.clone()));
                    debug!(stmt_id = %stmt_id, "planner.prepared.cached");
                }
                optimized.plan
            }
        };
        self.stmt_id = Some(stmt_id);
        self.plan = Some(Box::new(plan));
        Ok(Plan::Execute(self))
    }
}
