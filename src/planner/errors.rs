#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Result alias used throughout the planner.
pub type Result<T> = std::result::Result<T, PlanError>;

/// Errors surfaced while planning a statement.
///
/// Name-resolution variants come from the plan builder; `PrivilegeCheckFail`
/// and `CascadesNotImplemented` are raised by the dispatcher itself, and
/// `Reoptimize` wraps whatever prepared-plan re-optimization returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A table was referenced without a database and none is selected.
    #[error("no database selected")]
    NoDatabaseSelected,
    #[error("unknown database '{db}'")]
    UnknownDatabase { db: String },
    #[error("table '{db}.{table}' doesn't exist")]
    UnknownTable { db: String, table: String },
    #[error("unknown column '{column}' in {context}")]
    UnknownColumn { column: String, context: &'static str },
    #[error("column '{column}' in {context} is ambiguous")]
    AmbiguousColumn { column: String, context: &'static str },
    #[error("SELECT requires a FROM clause")]
    MissingFrom,
    /// The same table name or alias appears twice in one FROM list.
    #[error("not unique table/alias: '{name}'")]
    DuplicateTableAlias { name: String },
    #[error("column count doesn't match value count at row {row}")]
    ColumnCountMismatch { row: usize },
    #[error("statement contains an unbound parameter ?{index}")]
    UnboundParameter { index: usize },
    #[error("incorrect arguments to EXECUTE: expected {expected}, got {got}")]
    ParamCountMismatch { expected: usize, got: usize },
    #[error("EXECUTE parameter {index} must be a constant")]
    NonConstantParameter { index: usize },
    #[error("unknown prepared statement handler ({name}) given to {context}")]
    UnknownPreparedStatement { name: String, context: &'static str },
    /// PREPARE bodies cannot themselves be PREPARE/EXECUTE/DEALLOCATE.
    #[error("{kind} statements cannot be prepared")]
    UnpreparableStatement { kind: &'static str },
    #[error("unknown system variable '{name}'")]
    UnknownSystemVariable { name: String },
    #[error("variable '{name}' can't be set to the value of '{value}'")]
    InvalidSystemVariableValue { name: String, value: String },
    /// Raised by the dispatcher when the configured privilege manager rejects
    /// the statement's visit info.
    #[error("privilege check fail")]
    PrivilegeCheckFail,
    /// Raised by the dispatcher when the session requests the cascades optimizer.
    #[error("the cascades planner is not implemented yet")]
    CascadesNotImplemented,
    /// Internal invariant violation inside a planning stage.
    #[error("invalid plan: {0}")]
    Invalid(&'static str),
    /// Error returned by prepared-plan re-optimization, annotated with the
    /// place it crossed back into the dispatcher.
    #[error("{source}")]
    Reoptimize {
        source: Box<PlanError>,
        location: &'static Location<'static>,
    },
}

impl PlanError {
    /// Wraps `err` with the caller's source location.
    #[track_caller]
    pub fn reoptimize(err: PlanError) -> Self {
        PlanError::Reoptimize {
            source: Box::new(err),
            location: Location::caller(),
        }
    }

    /// Returns the innermost error, looking through trace wrappers.
    pub fn root_cause(&self) -> &PlanError {
        match self {
            PlanError::Reoptimize { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Source locations recorded by trace wrappers, outermost first.
    pub fn trace(&self) -> Vec<&'static Location<'static>> {
        let mut frames = Vec::new();
        let mut current = self;
        while let PlanError::Reoptimize { source, location } = current {
            frames.push(*location);
            current = source;
        }
        frames
    }

    /// Returns a machine-readable code for the error variant.
    ///
    /// Trace wrappers report the code of the error they carry.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::NoDatabaseSelected => "NoDatabaseSelected",
            PlanError::UnknownDatabase { .. } => "UnknownDatabase",
            PlanError::UnknownTable { .. } => "UnknownTable",
            PlanError::UnknownColumn { .. } => "UnknownColumn",
            PlanError::AmbiguousColumn { .. } => "AmbiguousColumn",
            PlanError::MissingFrom => "MissingFrom",
            PlanError::DuplicateTableAlias { .. } => "DuplicateTableAlias",
            PlanError::ColumnCountMismatch { .. } => "ColumnCountMismatch",
            PlanError::UnboundParameter { .. } => "UnboundParameter",
            PlanError::ParamCountMismatch { .. } => "ParamCountMismatch",
            PlanError::NonConstantParameter { .. } => "NonConstantParameter",
            PlanError::UnknownPreparedStatement { .. } => "UnknownPreparedStatement",
            PlanError::UnpreparableStatement { .. } => "UnpreparableStatement",
            PlanError::UnknownSystemVariable { .. } => "UnknownSystemVariable",
            PlanError::InvalidSystemVariableValue { .. } => "InvalidSystemVariableValue",
            PlanError::PrivilegeCheckFail => "PrivilegeCheckFail",
            PlanError::CascadesNotImplemented => "CascadesNotImplemented",
            PlanError::Invalid(_) => "InvalidPlan",
            PlanError::Reoptimize { source, .. } => source.code(),
        }
    }
}

/// Convenience wrapper that formats planner errors with their codes.
pub struct PlanErrorWithCode<'a>(pub &'a PlanError);

impl fmt::Display for PlanErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
