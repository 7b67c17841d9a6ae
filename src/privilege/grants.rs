use std::collections::HashSet;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{Privilege, PrivilegeManager, UserIdentity};

/// Object a grant applies to.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum GrantScope {
    /// Every database and table.
    Global,
    /// Every table in one database.
    Database(String),
    /// One table.
    Table {
        /// Database name.
        db: String,
        /// Table name.
        table: String,
    },
}

impl GrantScope {
    /// Scope covering one table.
    pub fn table(db: impl Into<String>, table: impl Into<String>) -> Self {
        GrantScope::Table {
            db: db.into(),
            table: table.into(),
        }
    }

    fn normalized(self) -> Self {
        match self {
            GrantScope::Global => GrantScope::Global,
            GrantScope::Database(db) => GrantScope::Database(db.to_ascii_lowercase()),
            GrantScope::Table { db, table } => GrantScope::Table {
                db: db.to_ascii_lowercase(),
                table: table.to_ascii_lowercase(),
            },
        }
    }
}

type Grants = FxHashMap<GrantScope, HashSet<Privilege>>;

/// In-memory grant table keyed by user name.
///
/// Column-scoped requests are satisfied by table-level grants; there are no
/// column-level grants.
#[derive(Debug, Default)]
pub struct GrantTable {
    users: RwLock<FxHashMap<String, Grants>>,
}

impl GrantTable {
    /// Creates an empty grant table; every request is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `privileges` on `scope` to `user`.
    pub fn grant<I>(&self, user: &str, scope: GrantScope, privileges: I)
    where
        I: IntoIterator<Item = Privilege>,
    {
        let mut users = self.users.write();
        users
            .entry(user.to_owned())
            .or_default()
            .entry(scope.normalized())
            .or_default()
            .extend(privileges);
    }

    /// Revokes `privilege` on `scope` from `user`.
    pub fn revoke(&self, user: &str, scope: GrantScope, privilege: Privilege) {
        let mut users = self.users.write();
        if let Some(grants) = users.get_mut(user) {
            if let Some(set) = grants.get_mut(&scope.normalized()) {
                set.remove(&privilege);
            }
        }
    }

    /// Builder-style variant of [`GrantTable::grant`].
    pub fn with_grant<I>(self, user: &str, scope: GrantScope, privileges: I) -> Self
    where
        I: IntoIterator<Item = Privilege>,
    {
        self.grant(user, scope, privileges);
        self
    }
}

fn holds(grants: &Grants, scope: &GrantScope, privilege: Privilege) -> bool {
    grants
        .get(scope)
        .is_some_and(|set| set.contains(&privilege) || set.contains(&Privilege::All))
}

impl PrivilegeManager for GrantTable {
    fn request_verification(
        &self,
        user: &UserIdentity,
        db: &str,
        table: &str,
        column: Option<&str>,
        privilege: Privilege,
    ) -> bool {
        let users = self.users.read();
        let Some(grants) = users.get(&user.user) else {
            debug!(%user, db, table, %privilege, "privilege.grants.unknown_user");
            return false;
        };
        let db = db.to_ascii_lowercase();
        let table_scope = GrantScope::Table {
            db: db.clone(),
            table: table.to_ascii_lowercase(),
        };
        let allowed = holds(grants, &GrantScope::Global, privilege)
            || holds(grants, &GrantScope::Database(db), privilege)
            || holds(grants, &table_scope, privilege);
        if !allowed {
            debug!(%user, table, ?column, %privilege, "privilege.grants.denied");
        }
        allowed
    }
}
