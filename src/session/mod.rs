#![forbid(unsafe_code)]

//! Per-connection state and the statement-execution driver.

/// TOML session configuration.
pub mod config;

/// State handed to the planner.
pub mod context;

/// The statement-execution driver.
pub mod driver;

/// Per-session LRU of prepared-statement plans.
pub mod plan_cache;

/// Prepared statement registry.
pub mod prepared;

/// Session variables and plan id counters.
pub mod vars;

pub use config::{default_config_path, ConfigError, SessionConfig};
pub use context::SessionContext;
pub use driver::{Session, StmtOutcome};
pub use plan_cache::{PlanCache, PlanCacheKey, DEFAULT_PLAN_CACHE_CAPACITY};
pub use prepared::{PreparedStatement, PreparedStatements};
pub use vars::SessionVars;
