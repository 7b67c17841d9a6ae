//! Fluent construction of statement nodes.
//!
//! Mostly used by tests, benches, and embedders that assemble statements
//! programmatically instead of going through a SQL parser.

use crate::planner::ast::{
    Assignment, BinaryOp, ColumnName, Datum, DeleteStmt, ExecuteStmt, Expr, InsertStmt, Limit,
    OrderByItem, PrepareStmt, SelectField, SelectStmt, Statement, TableName, TableRef, UpdateStmt,
    VariableAssignment,
};

impl From<&str> for TableName {
    /// Accepts `table` or `db.table`.
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((db, name)) => TableName::qualified(db, name),
            None => TableName::new(value),
        }
    }
}

impl From<&str> for TableRef {
    fn from(value: &str) -> Self {
        TableRef {
            table: value.into(),
            alias: None,
        }
    }
}

/// Column reference; `table.column` yields a qualified name.
pub fn col(name: &str) -> Expr {
    let column = match name.split_once('.') {
        Some((table, name)) => ColumnName {
            table: Some(table.to_owned()),
            name: name.to_owned(),
        },
        None => ColumnName {
            table: None,
            name: name.to_owned(),
        },
    };
    Expr::Column(column)
}

/// Constant.
pub fn lit(value: impl Into<Datum>) -> Expr {
    Expr::Literal(value.into())
}

/// Positional placeholder.
pub fn param(idx: usize) -> Expr {
    Expr::Param(idx)
}

/// Binary operation.
pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// `lhs = rhs`
pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs)
}

/// `lhs <> rhs`
pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ne, lhs, rhs)
}

/// `lhs < rhs`
pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Lt, lhs, rhs)
}

/// `lhs > rhs`
pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Gt, lhs, rhs)
}

/// `lhs AND rhs`
pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::And, lhs, rhs)
}

/// `lhs OR rhs`
pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Or, lhs, rhs)
}

/// `lhs + rhs`
pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

/// Unaliased select field.
pub fn field(expr: Expr) -> SelectField {
    SelectField::Expr { expr, alias: None }
}

/// Aliased select field.
pub fn field_as(expr: Expr, alias: &str) -> SelectField {
    SelectField::Expr {
        expr,
        alias: Some(alias.to_owned()),
    }
}

/// Entry points for the statement builders.
pub struct StatementBuilder;

impl StatementBuilder {
    /// `SELECT <fields>`
    pub fn select<I>(fields: I) -> SelectBuilder
    where
        I: IntoIterator<Item = SelectField>,
    {
        SelectBuilder {
            stmt: SelectStmt {
                fields: fields.into_iter().collect(),
                from: Vec::new(),
                filter: None,
                order_by: Vec::new(),
                limit: None,
            },
        }
    }

    /// `SELECT *`
    pub fn select_all() -> SelectBuilder {
        Self::select([SelectField::Wildcard])
    }

    /// `INSERT INTO <table>`
    pub fn insert_into(table: &str) -> InsertBuilder {
        InsertBuilder {
            stmt: InsertStmt {
                table: table.into(),
                columns: Vec::new(),
                rows: Vec::new(),
            },
        }
    }

    /// `UPDATE <table>`
    pub fn update(table: &str) -> UpdateBuilder {
        UpdateBuilder {
            stmt: UpdateStmt {
                table: table.into(),
                assignments: Vec::new(),
                filter: None,
            },
        }
    }

    /// `DELETE FROM <table>`
    pub fn delete_from(table: &str) -> DeleteBuilder {
        DeleteBuilder {
            stmt: DeleteStmt {
                table: table.into(),
                filter: None,
            },
        }
    }

    /// `PREPARE <name> FROM <stmt>`
    pub fn prepare(name: &str, stmt: Statement) -> Statement {
        Statement::Prepare(PrepareStmt {
            name: name.to_owned(),
            stmt: Box::new(stmt),
        })
    }

    /// `EXECUTE <name> USING <params>`
    pub fn execute<I>(name: &str, params: I) -> Statement
    where
        I: IntoIterator<Item = Datum>,
    {
        Statement::Execute(ExecuteStmt {
            name: name.to_owned(),
            params: params.into_iter().map(Expr::Literal).collect(),
        })
    }

    /// `SET <name> = <value>`
    pub fn set(name: &str, value: impl Into<Datum>) -> Statement {
        Statement::Set(vec![VariableAssignment {
            name: name.to_owned(),
            value: value.into(),
        }])
    }

    /// `USE <db>`
    pub fn use_db(db: &str) -> Statement {
        Statement::Use { db: db.to_owned() }
    }
}

/// Builder for SELECT statements.
#[derive(Debug)]
pub struct SelectBuilder {
    stmt: SelectStmt,
}

impl SelectBuilder {
    /// Adds a table to the FROM list.
    pub fn from(mut self, table: &str) -> Self {
        self.stmt.from.push(table.into());
        self
    }

    /// Adds an aliased table to the FROM list.
    pub fn from_as(mut self, table: &str, alias: &str) -> Self {
        self.stmt.from.push(TableRef {
            table: table.into(),
            alias: Some(alias.to_owned()),
        });
        self
    }

    /// Sets the WHERE clause, AND-ing onto any previous one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.stmt.filter = Some(match self.stmt.filter.take() {
            Some(prev) => and(prev, expr),
            None => expr,
        });
        self
    }

    /// Appends an ORDER BY item.
    pub fn order_by(mut self, expr: Expr, desc: bool) -> Self {
        self.stmt.order_by.push(OrderByItem { expr, desc });
        self
    }

    /// Sets `LIMIT count`.
    pub fn limit(self, count: u64) -> Self {
        self.limit_offset(count, 0)
    }

    /// Sets `LIMIT offset, count`.
    pub fn limit_offset(mut self, count: u64, offset: u64) -> Self {
        self.stmt.limit = Some(Limit { count, offset });
        self
    }

    /// Finishes the statement.
    pub fn build(self) -> Statement {
        Statement::Select(self.stmt)
    }
}

/// Builder for INSERT statements.
#[derive(Debug)]
pub struct InsertBuilder {
    stmt: InsertStmt,
}

impl InsertBuilder {
    /// Sets the target column list.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stmt.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a VALUES row.
    pub fn values<I>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = Expr>,
    {
        self.stmt.rows.push(row.into_iter().collect());
        self
    }

    /// Finishes the statement.
    pub fn build(self) -> Statement {
        Statement::Insert(self.stmt)
    }
}

/// Builder for UPDATE statements.
#[derive(Debug)]
pub struct UpdateBuilder {
    stmt: UpdateStmt,
}

impl UpdateBuilder {
    /// Appends `column = value` to the SET list.
    pub fn set(mut self, column: &str, value: Expr) -> Self {
        self.stmt.assignments.push(Assignment {
            column: column.to_owned(),
            value,
        });
        self
    }

    /// Sets the WHERE clause.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.stmt.filter = Some(expr);
        self
    }

    /// Finishes the statement.
    pub fn build(self) -> Statement {
        Statement::Update(self.stmt)
    }
}

/// Builder for DELETE statements.
#[derive(Debug)]
pub struct DeleteBuilder {
    stmt: DeleteStmt,
}

impl DeleteBuilder {
    /// Sets the WHERE clause.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.stmt.filter = Some(expr);
        self
    }

    /// Finishes the statement.
    pub fn build(self) -> Statement {
        Statement::Delete(self.stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_split_on_dot() {
        assert_eq!(
            TableName::from("shop.orders"),
            TableName::qualified("shop", "orders")
        );
        assert_eq!(
            col("o.id"),
            Expr::Column(ColumnName {
                table: Some("o".into()),
                name: "id".into()
            })
        );
    }

    #[test]
    fn repeated_filters_are_conjoined() {
        let stmt = StatementBuilder::select_all()
            .from("t")
            .filter(eq(col("a"), lit(1)))
            .filter(eq(col("b"), lit(2)))
            .build();
        let Statement::Select(select) = stmt else {
            panic!("expected select");
        };
        assert_eq!(
            select.filter,
            Some(and(eq(col("a"), lit(1)), eq(col("b"), lit(2))))
        );
    }
}
