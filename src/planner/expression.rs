//! Resolved scalar expressions referenced by logical and physical plans.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::planner::ast::{BinaryOp, Datum};
use crate::schema::ColumnType;
use crate::types::{ColumnId, PlanColumnId};

/// Output column of a plan node.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanColumn {
    /// Identifier unique within one build.
    pub id: PlanColumnId,
    /// Output name.
    pub name: String,
    /// Table name or alias the column is qualified by.
    pub table: Option<String>,
    /// Source table column, for columns read straight from storage.
    pub origin: Option<ColumnId>,
    /// Storage type, when known.
    pub ty: Option<ColumnType>,
}

impl fmt::Display for PlanColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Scalar expression with column references resolved to plan columns.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarExpr {
    /// Reference to an input column.
    Column(PlanColumn),
    /// Constant.
    Constant(Datum),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<ScalarExpr>,
        /// Right operand.
        rhs: Box<ScalarExpr>,
    },
}

impl ScalarExpr {
    /// Builds a binary expression.
    pub fn binary(op: BinaryOp, lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        ScalarExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Adds every referenced column id to `out`.
    pub fn collect_columns(&self, out: &mut FxHashSet<PlanColumnId>) {
        match self {
            ScalarExpr::Column(col) => {
                out.insert(col.id);
            }
            ScalarExpr::Constant(_) => {}
            ScalarExpr::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
        }
    }

    /// Referenced column ids.
    pub fn columns(&self) -> FxHashSet<PlanColumnId> {
        let mut out = FxHashSet::default();
        self.collect_columns(&mut out);
        out
    }

    /// Matches `column = constant` in either operand order.
    pub fn as_column_eq_constant(&self) -> Option<(&PlanColumn, &Datum)> {
        let ScalarExpr::Binary {
            op: BinaryOp::Eq,
            lhs,
            rhs,
        } = self
        else {
            return None;
        };
        match (lhs.as_ref(), rhs.as_ref()) {
            (ScalarExpr::Column(col), ScalarExpr::Constant(value))
            | (ScalarExpr::Constant(value), ScalarExpr::Column(col)) => Some((col, value)),
            _ => None,
        }
    }

    /// Matches `column = column`.
    pub fn as_column_eq_column(&self) -> Option<(&PlanColumn, &PlanColumn)> {
        match self {
            ScalarExpr::Binary {
                op: BinaryOp::Eq,
                lhs,
                rhs,
            } => match (lhs.as_ref(), rhs.as_ref()) {
                (ScalarExpr::Column(l), ScalarExpr::Column(r)) => Some((l, r)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Splits an AND tree into its conjuncts.
pub fn split_conjuncts(expr: ScalarExpr) -> Vec<ScalarExpr> {
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(expr) = stack.pop() {
        match expr {
            ScalarExpr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                stack.push(*rhs);
                stack.push(*lhs);
            }
            other => out.push(other),
        }
    }
    out
}

/// Whether every column referenced by `expr` is in `available`.
pub fn covered_by(expr: &ScalarExpr, available: &FxHashSet<PlanColumnId>) -> bool {
    expr.columns().is_subset(available)
}

/// Column id set of a schema.
pub fn schema_ids(schema: &[PlanColumn]) -> FxHashSet<PlanColumnId> {
    schema.iter().map(|col| col.id).collect()
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarExpr::Column(col) => write!(f, "{col}"),
            ScalarExpr::Constant(value) => write!(f, "{value}"),
            ScalarExpr::Binary { op, lhs, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &ScalarExpr) -> fmt::Result {
    match expr {
        ScalarExpr::Binary { .. } => write!(f, "({expr})"),
        _ => write!(f, "{expr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: u64, name: &str) -> ScalarExpr {
        ScalarExpr::Column(PlanColumn {
            id: PlanColumnId(id),
            name: name.into(),
            table: Some("t".into()),
            origin: None,
            ty: None,
        })
    }

    #[test]
    fn split_conjuncts_flattens_in_order() {
        let a = ScalarExpr::binary(BinaryOp::Eq, column(1, "a"), ScalarExpr::Constant(Datum::Int(1)));
        let b = ScalarExpr::binary(BinaryOp::Gt, column(2, "b"), ScalarExpr::Constant(Datum::Int(2)));
        let c = ScalarExpr::binary(BinaryOp::Or, column(3, "c"), column(1, "a"));
        let tree = ScalarExpr::binary(
            BinaryOp::And,
            ScalarExpr::binary(BinaryOp::And, a.clone(), b.clone()),
            c.clone(),
        );
        assert_eq!(split_conjuncts(tree), vec![a, b, c]);
    }

    #[test]
    fn matches_column_equalities_in_either_order() {
        let expr = ScalarExpr::binary(BinaryOp::Eq, ScalarExpr::Constant(Datum::Int(5)), column(1, "a"));
        let (col, value) = expr.as_column_eq_constant().expect("matches");
        assert_eq!(col.name, "a");
        assert_eq!(value, &Datum::Int(5));
        assert!(expr.as_column_eq_column().is_none());
    }

    #[test]
    fn display_parenthesizes_nested_operands() {
        let expr = ScalarExpr::binary(
            BinaryOp::And,
            ScalarExpr::binary(BinaryOp::Eq, column(1, "a"), ScalarExpr::Constant(Datum::Int(1))),
            ScalarExpr::binary(BinaryOp::Lt, column(2, "b"), ScalarExpr::Constant(Datum::String("x".into()))),
        );
        assert_eq!(expr.to_string(), "(t.a = 1) AND (t.b < 'x')");
    }
}
