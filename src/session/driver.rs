//! Statement-execution driver.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::config::SessionConfig;
use super::context::SessionContext;
use super::vars::SessionVars;
use crate::planner::ast::{Datum, ExecuteStmt, Expr, PrepareStmt, Statement};
use crate::planner::dispatch::StatementPlanner;
use crate::planner::errors::{PlanError, Result};
use crate::planner::plan::{Plan, ReusedPlan, SimplePlan};
use crate::planner::prepared::ExecutePlan;
use crate::privilege::PrivilegeManager;
use crate::schema::{Domain, InfoSchema};
use crate::types::StmtId;

/// What running a statement produced.
#[derive(Clone, Debug)]
pub enum StmtOutcome {
    /// A statement was registered by PREPARE.
    Prepared {
        /// Id for binary-protocol execution.
        stmt_id: StmtId,
        /// Number of placeholders.
        param_count: usize,
    },
    /// A prepared statement was dropped.
    Deallocated {
        /// Name it was prepared under.
        name: String,
    },
    /// System variables were assigned.
    VariableSet {
        /// Number of assignments applied.
        count: usize,
    },
    /// The current database changed.
    DatabaseChanged {
        /// New current database.
        db: String,
    },
    /// Table names from SHOW TABLES, sorted.
    Tables(Vec<String>),
    /// A plan for the executor.
    Plan(Plan),
}

/// One client connection.
///
/// The planner is injected at construction; every statement is planned
/// against the snapshot the [`Domain`] serves when it starts.
pub struct Session {
    domain: Arc<Domain>,
    planner: Arc<dyn StatementPlanner>,
    ctx: SessionContext,
}

impl Session {
    /// Opens a session with the defaults from `config`.
    pub fn new(
        domain: Arc<Domain>,
        planner: Arc<dyn StatementPlanner>,
        config: &SessionConfig,
    ) -> Self {
        let mut vars = SessionVars::default();
        vars.enable_cascades_planner = config.planner.enable_cascades_planner;
        vars.enable_plan_cache = config.planner.enable_plan_cache;
        vars.current_db = config.session.default_database.clone();
        vars.user = config.user_identity();
        info!(
            user = %vars.user,
            db = vars.current_db.as_deref().unwrap_or(""),
            plan_cache = config.planner.plan_cache_capacity,
            "session.open"
        );
        let ctx =
            SessionContext::with_plan_cache_capacity(vars, config.planner.plan_cache_capacity);
        Self {
            domain,
            planner,
            ctx,
        }
    }

    /// Enforces `manager` on every statement.
    pub fn with_privileges(mut self, manager: Arc<dyn PrivilegeManager>) -> Self {
        self.ctx.set_privilege_manager(Some(manager));
        self
    }

    /// Session state.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Mutable session state.
    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.ctx
    }

    fn bind_snapshot(&mut self) -> Arc<InfoSchema> {
        let schema = self.domain.snapshot();
        self.ctx.bind_info_schema(Arc::clone(&schema));
        schema
    }

    /// Plans `stmt` against the current snapshot without applying it.
    pub fn compile(&mut self, stmt: &Statement) -> Result<Plan> {
        let schema = self.bind_snapshot();
        debug!(stmt = stmt.kind_name(), version = schema.version(), "session.compile");
        self.planner.optimize(&mut self.ctx, stmt, &schema, None)
    }

    /// Plans `stmt` and applies it when the session handles it itself.
    pub fn run(&mut self, stmt: &Statement) -> Result<StmtOutcome> {
        let plan = self.compile(stmt)?;
        match plan {
            Plan::Simple(simple) => self.apply(simple),
            plan => Ok(StmtOutcome::Plan(plan)),
        }
    }

    /// Registers `stmt` under `name`, as `PREPARE name FROM stmt` would.
    pub fn prepare(&mut self, name: &str, stmt: Statement) -> Result<(StmtId, usize)> {
        let prepare = Statement::Prepare(PrepareStmt {
            name: name.to_owned(),
            stmt: Box::new(stmt),
        });
        match self.run(&prepare)? {
            StmtOutcome::Prepared {
                stmt_id,
                param_count,
            } => Ok((stmt_id, param_count)),
            _ => Err(PlanError::Invalid("PREPARE produced no statement")),
        }
    }

    /// Executes a prepared statement by id.
    ///
    /// The execute plan is handed to the planner as an existing plan, so no
    /// EXECUTE statement is built and the plan id counters are left alone
    /// unless the statement itself has to be re-planned.
    pub fn execute_prepared(&mut self, stmt_id: StmtId, params: Vec<Datum>) -> Result<Plan> {
        let schema = self.bind_snapshot();
        let name = self
            .ctx
            .prepared()
            .get(stmt_id)
            .map_or_else(|| stmt_id.to_string(), |p| p.name.clone());
        let stmt = Statement::Execute(ExecuteStmt {
            name,
            params: params.iter().cloned().map(Expr::Literal).collect(),
        });
        let existing = ReusedPlan::from(Plan::Execute(ExecutePlan::by_id(stmt_id, params)));
        debug!(stmt_id = %stmt_id, "session.execute_prepared");
        self.planner
            .optimize(&mut self.ctx, &stmt, &schema, Some(existing))
    }

    fn apply(&mut self, plan: SimplePlan) -> Result<StmtOutcome> {
        match plan {
            SimplePlan::Set(assignments) => {
                for assignment in &assignments {
                    self.ctx
                        .vars_mut()
                        .set_system_var(&assignment.name, &assignment.value)?;
                    debug!(name = %assignment.name, value = %assignment.value, "session.set");
                }
                Ok(StmtOutcome::VariableSet {
                    count: assignments.len(),
                })
            }
            SimplePlan::Use { db } => {
                self.ctx.vars_mut().current_db = Some(db.clone());
                debug!(db = %db, "session.use");
                Ok(StmtOutcome::DatabaseChanged { db })
            }
            SimplePlan::ShowTables { db } => {
                let tables = self
                    .ctx
                    .info_schema()
                    .and_then(|schema| schema.tables(&db))
                    .ok_or(PlanError::UnknownDatabase { db })?;
                Ok(StmtOutcome::Tables(tables))
            }
            SimplePlan::Prepare {
                name,
                stmt,
                param_count,
            } => {
                let version = match self.ctx.info_schema() {
                    Some(schema) => schema.version(),
                    None => self.domain.snapshot().version(),
                };
                if let Some(old) = self.ctx.prepared().id_of(&name) {
                    self.ctx.plan_cache_mut().invalidate_stmt(old);
                }
                let stmt_id = self.ctx.prepared_mut().insert(&name, stmt, version);
                info!(name = %name, stmt_id = %stmt_id, param_count, "session.prepared");
                Ok(StmtOutcome::Prepared {
                    stmt_id,
                    param_count,
                })
            }
            SimplePlan::Deallocate { name } => {
                let removed = self.ctx.prepared_mut().remove_by_name(&name).ok_or_else(|| {
                    PlanError::UnknownPreparedStatement {
                        name: name.clone(),
                        context: "DEALLOCATE PREPARE",
                    }
                })?;
                let dropped = self.ctx.plan_cache_mut().invalidate_stmt(removed.id);
                info!(name = %name, stmt_id = %removed.id, dropped, "session.deallocated");
                Ok(StmtOutcome::Deallocated { name })
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}
