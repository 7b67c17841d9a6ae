use std::fmt;
use std::sync::Arc;

use super::plan_cache::{PlanCache, DEFAULT_PLAN_CACHE_CAPACITY};
use super::prepared::PreparedStatements;
use super::vars::SessionVars;
use crate::privilege::PrivilegeManager;
use crate::schema::InfoSchema;

/// Mutable per-connection state handed to the planner by `&mut`.
pub struct SessionContext {
    vars: SessionVars,
    privileges: Option<Arc<dyn PrivilegeManager>>,
    info_schema: Option<Arc<InfoSchema>>,
    prepared: PreparedStatements,
    plan_cache: PlanCache,
}

impl SessionContext {
    /// Context with no privilege manager and the default plan cache size.
    pub fn new(vars: SessionVars) -> Self {
        Self::with_plan_cache_capacity(vars, DEFAULT_PLAN_CACHE_CAPACITY)
    }

    /// Context whose plan cache holds up to `capacity` plans.
    pub fn with_plan_cache_capacity(vars: SessionVars, capacity: usize) -> Self {
        Self {
            vars,
            privileges: None,
            info_schema: None,
            prepared: PreparedStatements::new(),
            plan_cache: PlanCache::new(capacity),
        }
    }

    /// Installs the privilege manager consulted by the dispatcher.
    pub fn with_privilege_manager(mut self, manager: Arc<dyn PrivilegeManager>) -> Self {
        self.privileges = Some(manager);
        self
    }

    /// Replaces or removes the privilege manager.
    pub fn set_privilege_manager(&mut self, manager: Option<Arc<dyn PrivilegeManager>>) {
        self.privileges = manager;
    }

    /// Privilege manager, if one is configured.
    pub fn privilege_manager(&self) -> Option<&Arc<dyn PrivilegeManager>> {
        self.privileges.as_ref()
    }

    /// Session variables.
    pub fn vars(&self) -> &SessionVars {
        &self.vars
    }

    /// Mutable session variables.
    pub fn vars_mut(&mut self) -> &mut SessionVars {
        &mut self.vars
    }

    /// Binds the snapshot the current statement runs against.
    pub fn bind_info_schema(&mut self, schema: Arc<InfoSchema>) {
        self.info_schema = Some(schema);
    }

    /// Snapshot bound by [`SessionContext::bind_info_schema`].
    pub fn info_schema(&self) -> Option<&Arc<InfoSchema>> {
        self.info_schema.as_ref()
    }

    /// Prepared statements.
    pub fn prepared(&self) -> &PreparedStatements {
        &self.prepared
    }

    /// Mutable prepared statements.
    pub fn prepared_mut(&mut self) -> &mut PreparedStatements {
        &mut self.prepared
    }

    /// Cached prepared-statement plans.
    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    /// Mutable cached prepared-statement plans.
    pub fn plan_cache_mut(&mut self) -> &mut PlanCache {
        &mut self.plan_cache
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(SessionVars::default())
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("vars", &self.vars)
            .field("privileges", &self.privileges.is_some())
            .field("schema_version", &self.info_schema.as_ref().map(|s| s.version()))
            .field("prepared", &self.prepared.len())
            .field("plan_cache", &self.plan_cache)
            .finish()
    }
}
