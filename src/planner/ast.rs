//! Parsed statement nodes handed to the planner.
//!
//! Parsing SQL text happens upstream; these structures are what the parser
//! produces. They derive serde so tooling can feed statements as JSON.

use std::fmt;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::planner::errors::PlanError;

/// Constant value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    /// SQL NULL.
    Null,
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Boolean.
    Bool(bool),
}

impl Datum {
    /// Feeds a type-tagged encoding of the value into `hasher`.
    pub fn hash_into(&self, hasher: &mut Xxh64) {
        match self {
            Datum::Null => hasher.write_u8(0),
            Datum::Int(v) => {
                hasher.write_u8(1);
                hasher.write_i64(*v);
            }
            Datum::Float(v) => {
                hasher.write_u8(2);
                hasher.write_u64(v.to_bits());
            }
            Datum::String(v) => {
                hasher.write_u8(3);
                hasher.write_u64(v.len() as u64);
                hasher.write(v.as_bytes());
            }
            Datum::Bool(v) => {
                hasher.write_u8(4);
                hasher.write_u8(*v as u8);
            }
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::String(v) => write!(f, "'{v}'"),
            Datum::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Int(value)
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Datum::Int(value.into())
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Float(value)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Bool(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_owned())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

/// Possibly qualified table name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableName {
    /// Database qualifier; the session's current database when absent.
    #[serde(default)]
    pub db: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableName {
    /// Unqualified table name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            db: None,
            name: name.into(),
        }
    }

    /// Database-qualified table name.
    pub fn qualified(db: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            db: Some(db.into()),
            name: name.into(),
        }
    }
}

/// Table reference in a FROM clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    /// Referenced table.
    pub table: TableName,
    /// Optional alias.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Possibly qualified column name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnName {
    /// Table name or alias qualifier.
    #[serde(default)]
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Binary operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOp {
    /// SQL spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Scalar expression as written in the statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column reference.
    Column(ColumnName),
    /// Constant.
    Literal(Datum),
    /// Positional `?` placeholder of a prepared statement.
    Param(usize),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        if let Expr::Binary { lhs, rhs, .. } = self {
            lhs.visit(f);
            rhs.visit(f);
        }
    }

    fn bind(&mut self, params: &[Datum]) {
        match self {
            Expr::Param(idx) => {
                if let Some(value) = params.get(*idx) {
                    *self = Expr::Literal(value.clone());
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.bind(params);
                rhs.bind(params);
            }
            Expr::Column(_) | Expr::Literal(_) => {}
        }
    }
}

/// Output field of a SELECT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectField {
    /// `*`
    Wildcard,
    /// Expression with optional alias.
    Expr {
        /// Projected expression.
        expr: Expr,
        /// Output name.
        #[serde(default)]
        alias: Option<String>,
    },
}

/// ORDER BY item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    /// Sort key.
    pub expr: Expr,
    /// Descending order when set.
    #[serde(default)]
    pub desc: bool,
}

/// LIMIT clause.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Maximum number of rows.
    pub count: u64,
    /// Rows to skip first.
    #[serde(default)]
    pub offset: u64,
}

/// SELECT statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectStmt {
    /// Output fields.
    pub fields: Vec<SelectField>,
    /// FROM list; multiple entries form an inner join.
    pub from: Vec<TableRef>,
    /// WHERE clause.
    #[serde(default)]
    pub filter: Option<Expr>,
    /// ORDER BY items.
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    /// LIMIT clause.
    #[serde(default)]
    pub limit: Option<Limit>,
}

/// INSERT statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertStmt {
    /// Target table.
    pub table: TableName,
    /// Target columns; every column in row order when empty.
    #[serde(default)]
    pub columns: Vec<String>,
    /// VALUES rows.
    pub rows: Vec<Vec<Expr>>,
}

/// `column = value` assignment of an UPDATE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assigned column.
    pub column: String,
    /// New value.
    pub value: Expr,
}

/// UPDATE statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateStmt {
    /// Target table.
    pub table: TableName,
    /// SET list.
    pub assignments: Vec<Assignment>,
    /// WHERE clause.
    #[serde(default)]
    pub filter: Option<Expr>,
}

/// DELETE statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteStmt {
    /// Target table.
    pub table: TableName,
    /// WHERE clause.
    #[serde(default)]
    pub filter: Option<Expr>,
}

/// `PREPARE name FROM ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrepareStmt {
    /// Statement name.
    pub name: String,
    /// Statement body with `?` placeholders.
    pub stmt: Box<Statement>,
}

/// `EXECUTE name USING ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteStmt {
    /// Prepared statement name.
    pub name: String,
    /// Parameter values; must be constants.
    #[serde(default)]
    pub params: Vec<Expr>,
}

/// `SET name = value`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableAssignment {
    /// System variable name.
    pub name: String,
    /// New value.
    pub value: Datum,
}

/// Statement node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Query.
    Select(SelectStmt),
    /// Row insertion.
    Insert(InsertStmt),
    /// Row modification.
    Update(UpdateStmt),
    /// Row removal.
    Delete(DeleteStmt),
    /// Prepared statement registration.
    Prepare(PrepareStmt),
    /// Prepared statement execution.
    Execute(ExecuteStmt),
    /// Prepared statement removal.
    Deallocate {
        /// Prepared statement name.
        name: String,
    },
    /// System variable assignment.
    Set(Vec<VariableAssignment>),
    /// Current database change.
    Use {
        /// Database name.
        db: String,
    },
    /// Table listing.
    ShowTables {
        /// Database to list; the current database when absent.
        #[serde(default)]
        db: Option<String>,
    },
}

impl Statement {
    /// Short statement kind used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
            Statement::Prepare(_) => "prepare",
            Statement::Execute(_) => "execute",
            Statement::Deallocate { .. } => "deallocate",
            Statement::Set(_) => "set",
            Statement::Use { .. } => "use",
            Statement::ShowTables { .. } => "show_tables",
        }
    }

    fn for_each_expr(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Statement::Select(select) => {
                for field in &select.fields {
                    if let SelectField::Expr { expr, .. } = field {
                        expr.visit(f);
                    }
                }
                if let Some(filter) = &select.filter {
                    filter.visit(f);
                }
                for item in &select.order_by {
                    item.expr.visit(f);
                }
            }
            Statement::Insert(insert) => {
                for expr in insert.rows.iter().flatten() {
                    expr.visit(f);
                }
            }
            Statement::Update(update) => {
                for assignment in &update.assignments {
                    assignment.value.visit(f);
                }
                if let Some(filter) = &update.filter {
                    filter.visit(f);
                }
            }
            Statement::Delete(delete) => {
                if let Some(filter) = &delete.filter {
                    filter.visit(f);
                }
            }
            Statement::Execute(execute) => {
                for expr in &execute.params {
                    expr.visit(f);
                }
            }
            Statement::Prepare(_)
            | Statement::Deallocate { .. }
            | Statement::Set(_)
            | Statement::Use { .. }
            | Statement::ShowTables { .. } => {}
        }
    }

    fn for_each_expr_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Statement::Select(select) => {
                for field in &mut select.fields {
                    if let SelectField::Expr { expr, .. } = field {
                        f(expr);
                    }
                }
                if let Some(filter) = &mut select.filter {
                    f(filter);
                }
                for item in &mut select.order_by {
                    f(&mut item.expr);
                }
            }
            Statement::Insert(insert) => {
                for expr in insert.rows.iter_mut().flatten() {
                    f(expr);
                }
            }
            Statement::Update(update) => {
                for assignment in &mut update.assignments {
                    f(&mut assignment.value);
                }
                if let Some(filter) = &mut update.filter {
                    f(filter);
                }
            }
            Statement::Delete(delete) => {
                if let Some(filter) = &mut delete.filter {
                    f(filter);
                }
            }
            Statement::Execute(execute) => {
                for expr in &mut execute.params {
                    f(expr);
                }
            }
            Statement::Prepare(_)
            | Statement::Deallocate { .. }
            | Statement::Set(_)
            | Statement::Use { .. }
            | Statement::ShowTables { .. } => {}
        }
    }

    /// Number of positional parameters, i.e. the highest `?` index plus one.
    pub fn param_count(&self) -> usize {
        let mut count = 0;
        self.for_each_expr(&mut |expr| {
            if let Expr::Param(idx) = expr {
                count = count.max(idx + 1);
            }
        });
        count
    }

    /// Returns a copy with every placeholder replaced by its value.
    pub fn bind_params(&self, params: &[Datum]) -> Result<Statement, PlanError> {
        let expected = self.param_count();
        if params.len() != expected {
            return Err(PlanError::ParamCountMismatch {
                expected,
                got: params.len(),
            });
        }
        let mut bound = self.clone();
        bound.for_each_expr_mut(&mut |expr| expr.bind(params));
        Ok(bound)
    }
}
