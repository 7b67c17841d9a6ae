use crate::planner::ast::Datum;
use crate::planner::errors::{PlanError, Result};
use crate::privilege::UserIdentity;
use crate::types::{PlanColumnId, PlanId};

/// `SET enable_cascades_planner = ...`
pub const ENABLE_CASCADES_PLANNER: &str = "enable_cascades_planner";
/// `SET enable_plan_cache = ...`
pub const ENABLE_PLAN_CACHE: &str = "enable_plan_cache";

/// Per-session variables and plan identifier counters.
#[derive(Clone, Debug)]
pub struct SessionVars {
    plan_id: u64,
    plan_column_id: u64,
    /// Route logical plans to the cascades optimizer.
    pub enable_cascades_planner: bool,
    /// Cache optimized plans of prepared statements.
    pub enable_plan_cache: bool,
    /// Database unqualified table names resolve against.
    pub current_db: Option<String>,
    /// Account the session runs as.
    pub user: UserIdentity,
}

impl Default for SessionVars {
    fn default() -> Self {
        Self {
            plan_id: 0,
            plan_column_id: 0,
            enable_cascades_planner: false,
            enable_plan_cache: true,
            current_db: None,
            user: UserIdentity::default(),
        }
    }
}

impl SessionVars {
    /// Allocates the next plan node id.
    pub fn alloc_plan_id(&mut self) -> PlanId {
        self.plan_id += 1;
        PlanId(self.plan_id)
    }

    /// Allocates the next plan column id.
    pub fn alloc_plan_column_id(&mut self) -> PlanColumnId {
        self.plan_column_id += 1;
        PlanColumnId(self.plan_column_id)
    }

    /// Last allocated plan node id, zero right after a reset.
    pub fn plan_id(&self) -> u64 {
        self.plan_id
    }

    /// Last allocated plan column id, zero right after a reset.
    pub fn plan_column_id(&self) -> u64 {
        self.plan_column_id
    }

    /// Returns both counters to zero before a fresh build.
    pub fn reset_plan_ids(&mut self) {
        self.plan_id = 0;
        self.plan_column_id = 0;
    }

    /// Validates and applies a system variable assignment.
    pub fn set_system_var(&mut self, name: &str, value: &Datum) -> Result<()> {
        let slot = match name.to_ascii_lowercase().as_str() {
            ENABLE_CASCADES_PLANNER => &mut self.enable_cascades_planner,
            ENABLE_PLAN_CACHE => &mut self.enable_plan_cache,
            _ => {
                return Err(PlanError::UnknownSystemVariable {
                    name: name.to_owned(),
                })
            }
        };
        *slot = parse_switch(name, value)?;
        Ok(())
    }

    /// Checks an assignment without applying it.
    pub fn validate_system_var(name: &str, value: &Datum) -> Result<()> {
        SessionVars::default().set_system_var(name, value)
    }

    /// Current value of a system variable.
    pub fn system_var(&self, name: &str) -> Option<Datum> {
        match name.to_ascii_lowercase().as_str() {
            ENABLE_CASCADES_PLANNER => Some(Datum::Bool(self.enable_cascades_planner)),
            ENABLE_PLAN_CACHE => Some(Datum::Bool(self.enable_plan_cache)),
            _ => None,
        }
    }
}

/// Accepts booleans, `0`/`1`, and `ON`/`OFF`/`TRUE`/`FALSE` strings.
fn parse_switch(name: &str, value: &Datum) -> Result<bool> {
    let parsed = match value {
        Datum::Bool(v) => Some(*v),
        Datum::Int(0) => Some(false),
        Datum::Int(1) => Some(true),
        Datum::String(s) => match s.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Some(true),
            "off" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| PlanError::InvalidSystemVariableValue {
        name: name.to_owned(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_allocate_from_one_and_reset() {
        let mut vars = SessionVars::default();
        assert_eq!(vars.alloc_plan_id(), PlanId(1));
        assert_eq!(vars.alloc_plan_id(), PlanId(2));
        assert_eq!(vars.alloc_plan_column_id(), PlanColumnId(1));
        vars.reset_plan_ids();
        assert_eq!((vars.plan_id(), vars.plan_column_id()), (0, 0));
        assert_eq!(vars.alloc_plan_id(), PlanId(1));
    }

    #[test]
    fn switches_accept_common_spellings() {
        let mut vars = SessionVars::default();
        vars.set_system_var("ENABLE_CASCADES_PLANNER", &Datum::from("ON"))
            .expect("valid");
        assert!(vars.enable_cascades_planner);
        vars.set_system_var("enable_plan_cache", &Datum::Int(0))
            .expect("valid");
        assert_eq!(vars.system_var("enable_plan_cache"), Some(Datum::Bool(false)));
    }

    #[test]
    fn unknown_names_and_bad_values_are_rejected() {
        let mut vars = SessionVars::default();
        assert_eq!(
            vars.set_system_var("sql_mode", &Datum::Int(1)),
            Err(PlanError::UnknownSystemVariable {
                name: "sql_mode".into()
            })
        );
        assert!(matches!(
            vars.set_system_var(ENABLE_PLAN_CACHE, &Datum::Int(7)),
            Err(PlanError::InvalidSystemVariableValue { .. })
        ));
        assert!(vars.enable_plan_cache);
    }
}
