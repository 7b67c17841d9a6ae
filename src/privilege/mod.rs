#![forbid(unsafe_code)]

//! Access-control policy consulted by the plan dispatcher.
//!
//! The plan builder records a [`VisitInfo`] for every schema object a
//! statement touches; the dispatcher hands the full list to the session's
//! [`PrivilegeManager`] once planning has collected it.

use std::fmt;

use serde::{Deserialize, Serialize};

mod grants;

pub use grants::{GrantScope, GrantTable};

/// Privilege required to touch a schema object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Read rows.
    Select,
    /// Add rows.
    Insert,
    /// Modify rows.
    Update,
    /// Remove rows.
    Delete,
    /// Create objects.
    Create,
    /// Drop objects.
    Drop,
    /// Every privilege.
    All,
}

impl Privilege {
    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::Create => "CREATE",
            Privilege::Drop => "DROP",
            Privilege::All => "ALL",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account a session runs as.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User name.
    pub user: String,
    /// Host the user connected from.
    pub host: String,
}

impl UserIdentity {
    /// Creates an identity for `user@host`.
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }
}

impl Default for UserIdentity {
    fn default() -> Self {
        Self::new("root", "%")
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// One schema object touched while building a plan.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct VisitInfo {
    /// Privilege the statement needs on the object.
    pub privilege: Privilege,
    /// Database name.
    pub db: String,
    /// Table name.
    pub table: String,
    /// Column name, when the requirement is column-scoped.
    pub column: Option<String>,
}

impl VisitInfo {
    /// Creates a table-scoped record.
    pub fn table(privilege: Privilege, db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            privilege,
            db: db.into(),
            table: table.into(),
            column: None,
        }
    }

    /// Creates a column-scoped record.
    pub fn column(
        privilege: Privilege,
        db: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            privilege,
            db: db.into(),
            table: table.into(),
            column: Some(column.into()),
        }
    }
}

/// Policy deciding whether a user may perform an access.
pub trait PrivilegeManager: Send + Sync {
    /// Returns whether `user` holds `privilege` on the given object.
    fn request_verification(
        &self,
        user: &UserIdentity,
        db: &str,
        table: &str,
        column: Option<&str>,
        privilege: Privilege,
    ) -> bool;
}

/// Verifies every record in `visit_info`; an empty list always passes.
pub fn check_privilege(
    pm: &dyn PrivilegeManager,
    user: &UserIdentity,
    visit_info: &[VisitInfo],
) -> bool {
    visit_info.iter().all(|v| {
        pm.request_verification(user, &v.db, &v.table, v.column.as_deref(), v.privilege)
    })
}
