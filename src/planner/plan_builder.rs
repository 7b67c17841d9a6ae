//! Builds plans from statements, resolving names against a schema snapshot.
//!
//! The builder records a [`VisitInfo`] for every object the statement
//! touches and the [`OptFlags`] the optimizer should honour; both are read
//! back with [`PlanBuilder::finish`] once [`PlanBuilder::build`] succeeds.

use std::sync::Arc;

use tracing::trace;

use crate::planner::ast::{
    ColumnName, DeleteStmt, Expr, InsertStmt, SelectField, SelectStmt, Statement, TableName,
    UpdateStmt, VariableAssignment,
};
use crate::planner::errors::{PlanError, Result};
use crate::planner::expression::{split_conjuncts, PlanColumn, ScalarExpr};
use crate::planner::logical::{LogicalNode, LogicalOp, LogicalPlan, SortItem};
use crate::planner::optimizer::OptFlags;
use crate::planner::plan::{InsertPlan, Plan, SimplePlan};
use crate::planner::prepared::ExecutePlan;
use crate::privilege::{Privilege, VisitInfo};
use crate::schema::{ColumnInfo, InfoSchema, TableInfo};
use crate::session::{SessionContext, SessionVars};
use crate::types::PlanId;

const FIELD_LIST: &str = "field list";
const WHERE_CLAUSE: &str = "where clause";
const ORDER_CLAUSE: &str = "order clause";

/// Single-use plan builder.
pub struct PlanBuilder<'a> {
    ctx: &'a mut SessionContext,
    schema: &'a InfoSchema,
    visit_info: Vec<VisitInfo>,
    opt_flags: OptFlags,
}

/// A FROM-list table resolved against the snapshot.
struct ResolvedTable {
    db: String,
    table: Arc<TableInfo>,
    alias: Option<String>,
}

impl ResolvedTable {
    fn visible_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table.name)
    }
}

/// Columns visible to expressions.
struct Scope<'s> {
    columns: &'s [PlanColumn],
}

impl Scope<'_> {
    fn empty() -> Scope<'static> {
        Scope { columns: &[] }
    }

    fn lookup(&self, name: &ColumnName, context: &'static str) -> Result<&PlanColumn> {
        let mut matches = self.columns.iter().filter(|col| {
            col.name.eq_ignore_ascii_case(&name.name)
                && match (&name.table, &col.table) {
                    (Some(qualifier), Some(table)) => qualifier.eq_ignore_ascii_case(table),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        });
        let first = matches.next().ok_or_else(|| PlanError::UnknownColumn {
            column: name.to_string(),
            context,
        })?;
        if matches.next().is_some() {
            return Err(PlanError::AmbiguousColumn {
                column: name.to_string(),
                context,
            });
        }
        Ok(first)
    }
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder allocating ids from `ctx`'s counters.
    pub fn new(ctx: &'a mut SessionContext, schema: &'a InfoSchema) -> Self {
        Self {
            ctx,
            schema,
            visit_info: Vec::new(),
            opt_flags: OptFlags::empty(),
        }
    }

    /// Visit info recorded so far.
    pub fn visit_info(&self) -> &[VisitInfo] {
        &self.visit_info
    }

    /// Optimization flags recorded so far.
    pub fn opt_flags(&self) -> OptFlags {
        self.opt_flags
    }

    /// Consumes the builder, returning what the build recorded.
    pub fn finish(self) -> (Vec<VisitInfo>, OptFlags) {
        (self.visit_info, self.opt_flags)
    }

    /// Builds a plan for `stmt`.
    pub fn build(&mut self, stmt: &Statement) -> Result<Plan> {
        let plan = match stmt {
            Statement::Select(select) => self.build_select(select)?,
            Statement::Insert(insert) => self.build_insert(insert)?,
            Statement::Update(update) => self.build_update(update)?,
            Statement::Delete(delete) => self.build_delete(delete)?,
            Statement::Prepare(prepare) => {
                match prepare.stmt.as_ref() {
                    inner @ (Statement::Prepare(_)
                    | Statement::Execute(_)
                    | Statement::Deallocate { .. }) => {
                        return Err(PlanError::UnpreparableStatement {
                            kind: inner.kind_name(),
                        })
                    }
                    _ => {}
                }
                Plan::Simple(SimplePlan::Prepare {
                    name: prepare.name.clone(),
                    stmt: prepare.stmt.as_ref().clone(),
                    param_count: prepare.stmt.param_count(),
                })
            }
            Statement::Execute(execute) => {
                let params = execute
                    .params
                    .iter()
                    .enumerate()
                    .map(|(index, expr)| match expr {
                        Expr::Literal(value) => Ok(value.clone()),
                        _ => Err(PlanError::NonConstantParameter { index }),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Plan::Execute(ExecutePlan::by_name(execute.name.clone(), params))
            }
            Statement::Deallocate { name } => {
                if self.ctx.prepared().id_of(name).is_none() {
                    return Err(PlanError::UnknownPreparedStatement {
                        name: name.clone(),
                        context: "DEALLOCATE PREPARE",
                    });
                }
                Plan::Simple(SimplePlan::Deallocate { name: name.clone() })
            }
            Statement::Set(assignments) => {
                for VariableAssignment { name, value } in assignments {
                    SessionVars::validate_system_var(name, value)?;
                }
                Plan::Simple(SimplePlan::Set(assignments.clone()))
            }
            Statement::Use { db } => {
                let info = self
                    .schema
                    .database(db)
                    .ok_or_else(|| PlanError::UnknownDatabase { db: db.clone() })?;
                Plan::Simple(SimplePlan::Use {
                    db: info.name.clone(),
                })
            }
            Statement::ShowTables { db } => {
                let db = self.resolve_db(db.as_deref())?;
                Plan::Simple(SimplePlan::ShowTables { db })
            }
        };
        trace!(
            kind = stmt.kind_name(),
            plan = plan.kind().as_str(),
            visits = self.visit_info.len(),
            "planner.builder.built"
        );
        Ok(plan)
    }

    fn last_plan_id(&self) -> PlanId {
        PlanId(self.ctx.vars().plan_id())
    }

    fn resolve_db(&self, db: Option<&str>) -> Result<String> {
        let name = match db {
            Some(db) => db.to_owned(),
            None => self
                .ctx
                .vars()
                .current_db
                .clone()
                .ok_or(PlanError::NoDatabaseSelected)?,
        };
        self.schema
            .database(&name)
            .map(|info| info.name.clone())
            .ok_or(PlanError::UnknownDatabase { db: name })
    }

    fn resolve_table(&self, name: &TableName) -> Result<(String, Arc<TableInfo>)> {
        let db = self.resolve_db(name.db.as_deref())?;
        let table = self
            .schema
            .table(&db, &name.name)
            .cloned()
            .ok_or_else(|| PlanError::UnknownTable {
                db: db.clone(),
                table: name.name.clone(),
            })?;
        Ok((db, table))
    }

    fn record(&mut self, privilege: Privilege, db: &str, table: &TableInfo) {
        self.visit_info
            .push(VisitInfo::table(privilege, db, table.name.clone()));
    }

    fn data_source(&mut self, source: &ResolvedTable) -> LogicalNode {
        let id = self.ctx.vars_mut().alloc_plan_id();
        let visible = source.visible_name().to_owned();
        let schema = source
            .table
            .columns
            .iter()
            .map(|col| self.source_column(&visible, col))
            .collect();
        let op = LogicalOp::DataSource {
            db: source.db.clone(),
            table: Arc::clone(&source.table),
            alias: source.alias.clone(),
            pushed_conditions: Vec::new(),
        };
        LogicalNode::new(id, op, schema)
    }

    fn source_column(&mut self, visible: &str, col: &ColumnInfo) -> PlanColumn {
        PlanColumn {
            id: self.ctx.vars_mut().alloc_plan_column_id(),
            name: col.name.clone(),
            table: Some(visible.to_owned()),
            origin: Some(col.id),
            ty: Some(col.ty),
        }
    }

    fn selection(&mut self, filter: &Expr, input: LogicalNode) -> Result<LogicalNode> {
        let condition = resolve(filter, &Scope { columns: &input.schema }, WHERE_CLAUSE)?;
        self.opt_flags |= OptFlags::PREDICATE_PUSH_DOWN;
        let id = self.ctx.vars_mut().alloc_plan_id();
        Ok(LogicalNode::unary(
            id,
            LogicalOp::Selection {
                conditions: split_conjuncts(condition),
            },
            input,
        ))
    }

    fn build_select(&mut self, select: &SelectStmt) -> Result<Plan> {
        if select.from.is_empty() {
            return Err(PlanError::MissingFrom);
        }
        let mut tables: Vec<ResolvedTable> = Vec::with_capacity(select.from.len());
        for table_ref in &select.from {
            let (db, table) = self.resolve_table(&table_ref.table)?;
            let resolved = ResolvedTable {
                db,
                table,
                alias: table_ref.alias.clone(),
            };
            if tables
                .iter()
                .any(|t| t.visible_name().eq_ignore_ascii_case(resolved.visible_name()))
            {
                return Err(PlanError::DuplicateTableAlias {
                    name: resolved.visible_name().to_owned(),
                });
            }
            tables.push(resolved);
        }

        let mut root: Option<LogicalNode> = None;
        for table in &tables {
            self.record(Privilege::Select, &table.db, &table.table);
            let source = self.data_source(table);
            root = Some(match root {
                None => source,
                Some(left) => {
                    let id = self.ctx.vars_mut().alloc_plan_id();
                    let schema = left.schema.iter().chain(&source.schema).cloned().collect();
                    let op = LogicalOp::Join {
                        eq_conditions: Vec::new(),
                        other_conditions: Vec::new(),
                    };
                    LogicalNode::with_inputs(id, op, schema, vec![left, source])
                }
            });
        }
        let mut root = root.ok_or(PlanError::MissingFrom)?;

        if let Some(filter) = &select.filter {
            root = self.selection(filter, root)?;
        }

        if !select.order_by.is_empty() {
            let scope = Scope {
                columns: &root.schema,
            };
            let by = select
                .order_by
                .iter()
                .map(|item| {
                    Ok(SortItem {
                        expr: resolve(&item.expr, &scope, ORDER_CLAUSE)?,
                        desc: item.desc,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let id = self.ctx.vars_mut().alloc_plan_id();
            root = LogicalNode::unary(id, LogicalOp::Sort { by }, root);
        }

        if let Some(limit) = select.limit {
            if !select.order_by.is_empty() {
                self.opt_flags |= OptFlags::TOPN_PUSH_DOWN;
            }
            let id = self.ctx.vars_mut().alloc_plan_id();
            root = LogicalNode::unary(
                id,
                LogicalOp::Limit {
                    offset: limit.offset,
                    count: limit.count,
                },
                root,
            );
        }

        let mut exprs = Vec::new();
        let mut schema = Vec::new();
        for field in &select.fields {
            match field {
                SelectField::Wildcard => {
                    for col in &root.schema {
                        exprs.push(ScalarExpr::Column(col.clone()));
                        schema.push(col.clone());
                    }
                }
                SelectField::Expr { expr, alias } => {
                    let resolved = resolve(
                        expr,
                        &Scope {
                            columns: &root.schema,
                        },
                        FIELD_LIST,
                    )?;
                    let output = match (&resolved, alias) {
                        (ScalarExpr::Column(col), None) => col.clone(),
                        (ScalarExpr::Column(col), Some(alias)) => PlanColumn {
                            id: self.ctx.vars_mut().alloc_plan_column_id(),
                            name: alias.clone(),
                            table: None,
                            origin: col.origin,
                            ty: col.ty,
                        },
                        (_, alias) => PlanColumn {
                            id: self.ctx.vars_mut().alloc_plan_column_id(),
                            name: alias.clone().unwrap_or_else(|| resolved.to_string()),
                            table: None,
                            origin: None,
                            ty: None,
                        },
                    };
                    exprs.push(resolved);
                    schema.push(output);
                }
            }
        }
        let id = self.ctx.vars_mut().alloc_plan_id();
        let root = LogicalNode::with_inputs(id, LogicalOp::Projection { exprs }, schema, vec![root]);
        self.opt_flags |= OptFlags::COLUMN_PRUNING | OptFlags::ELIMINATE_PROJECTION;
        Ok(Plan::Logical(LogicalPlan::new(root, self.last_plan_id())))
    }

    fn build_insert(&mut self, insert: &InsertStmt) -> Result<Plan> {
        let (db, table) = self.resolve_table(&insert.table)?;
        self.record(Privilege::Insert, &db, &table);
        let columns: Vec<ColumnInfo> = if insert.columns.is_empty() {
            table.columns.clone()
        } else {
            insert
                .columns
                .iter()
                .map(|name| {
                    table
                        .column(name)
                        .cloned()
                        .ok_or_else(|| PlanError::UnknownColumn {
                            column: name.clone(),
                            context: FIELD_LIST,
                        })
                })
                .collect::<Result<_>>()?
        };
        let mut rows = Vec::with_capacity(insert.rows.len());
        for (idx, row) in insert.rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PlanError::ColumnCountMismatch { row: idx + 1 });
            }
            let values = row
                .iter()
                .map(|expr| resolve(expr, &Scope::empty(), FIELD_LIST))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(Plan::Insert(InsertPlan {
            db,
            table,
            columns,
            rows,
        }))
    }

    fn build_update(&mut self, update: &UpdateStmt) -> Result<Plan> {
        let (db, table) = self.resolve_table(&update.table)?;
        let source = ResolvedTable {
            db: db.clone(),
            table: Arc::clone(&table),
            alias: None,
        };
        let mut root = self.data_source(&source);
        let mut assignments = Vec::with_capacity(update.assignments.len());
        {
            let scope = Scope {
                columns: &root.schema,
            };
            for assignment in &update.assignments {
                let target = scope.lookup(
                    &ColumnName {
                        table: None,
                        name: assignment.column.clone(),
                    },
                    FIELD_LIST,
                )?;
                let value = resolve(&assignment.value, &scope, FIELD_LIST)?;
                self.visit_info.push(VisitInfo::column(
                    Privilege::Update,
                    db.clone(),
                    table.name.clone(),
                    target.name.clone(),
                ));
                assignments.push((target.clone(), value));
            }
        }
        if let Some(filter) = &update.filter {
            self.record(Privilege::Select, &db, &table);
            root = self.selection(filter, root)?;
        }
        let id = self.ctx.vars_mut().alloc_plan_id();
        let op = LogicalOp::Update {
            db,
            table,
            assignments,
        };
        let root = LogicalNode::with_inputs(id, op, Vec::new(), vec![root]);
        self.opt_flags |= OptFlags::COLUMN_PRUNING | OptFlags::ELIMINATE_PROJECTION;
        Ok(Plan::Logical(LogicalPlan::new(root, self.last_plan_id())))
    }

    fn build_delete(&mut self, delete: &DeleteStmt) -> Result<Plan> {
        let (db, table) = self.resolve_table(&delete.table)?;
        self.record(Privilege::Delete, &db, &table);
        let source = ResolvedTable {
            db: db.clone(),
            table: Arc::clone(&table),
            alias: None,
        };
        let mut root = self.data_source(&source);
        if let Some(filter) = &delete.filter {
            self.record(Privilege::Select, &db, &table);
            root = self.selection(filter, root)?;
        }
        let id = self.ctx.vars_mut().alloc_plan_id();
        let root = LogicalNode::with_inputs(id, LogicalOp::Delete { db, table }, Vec::new(), vec![root]);
        self.opt_flags |= OptFlags::COLUMN_PRUNING | OptFlags::ELIMINATE_PROJECTION;
        Ok(Plan::Logical(LogicalPlan::new(root, self.last_plan_id())))
    }
}

fn resolve(expr: &Expr, scope: &Scope<'_>, context: &'static str) -> Result<ScalarExpr> {
    Ok(match expr {
        Expr::Column(name) => ScalarExpr::Column(scope.lookup(name, context)?.clone()),
        Expr::Literal(value) => ScalarExpr::Constant(value.clone()),
        Expr::Param(index) => return Err(PlanError::UnboundParameter { index: *index }),
        Expr::Binary { op, lhs, rhs } => ScalarExpr::binary(
            *op,
            resolve(lhs, scope, context)?,
            resolve(rhs, scope, context)?,
        ),
    })
}
