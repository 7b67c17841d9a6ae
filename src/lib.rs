//! Query-plan dispatch for a SQL execution pipeline.
//!
//! A [`session::Session`] plans each statement through an injected
//! [`planner::StatementPlanner`], normally a [`planner::PlanDispatcher`],
//! against the schema snapshot its [`schema::Domain`] currently serves.

#![warn(missing_docs)]

pub mod logging;
pub mod planner;
pub mod privilege;
pub mod schema;
pub mod session;
pub mod types;

pub use planner::{Plan, PlanDispatcher, PlanError, StatementPlanner};
pub use schema::{Domain, InfoSchema};
pub use session::{Session, SessionConfig, SessionContext};
