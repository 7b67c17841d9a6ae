#![forbid(unsafe_code)]

//! Strongly typed identifiers shared by the schema, session, and planner layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a table within a schema snapshot.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct TableId(pub u64);
/// Identifier of a column within its table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct ColumnId(pub u64);
/// Identifier of an index within its table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct IndexId(pub u64);
/// Identifier assigned to a logical plan node during a build.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PlanId(pub u64);
/// Identifier assigned to an output column of a logical plan node.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PlanColumnId(pub u64);
/// Identifier of a prepared statement within its session.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct StmtId(pub u32);

macro_rules! impl_id {
    ($name:ident, $inner:ty) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                $name(value)
            }
        }

        impl From<$name> for $inner {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

impl_id!(TableId, u64);
impl_id!(ColumnId, u64);
impl_id!(IndexId, u64);
impl_id!(PlanId, u64);
impl_id!(PlanColumnId, u64);
impl_id!(StmtId, u32);
