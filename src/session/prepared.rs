use rustc_hash::FxHashMap;

use crate::planner::ast::Statement;
use crate::types::StmtId;

/// A statement registered by PREPARE or the binary protocol.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedStatement {
    /// Session-local identifier.
    pub id: StmtId,
    /// Name given at PREPARE time.
    pub name: String,
    /// Body with `?` placeholders.
    pub stmt: Statement,
    /// Number of placeholders.
    pub param_count: usize,
    /// Schema version the statement was last planned against.
    pub schema_version: i64,
}

/// Prepared statements of one session, addressable by id or name.
///
/// Names are case-insensitive. Preparing a name that is already taken
/// replaces the old statement, which also retires its id.
#[derive(Debug, Default)]
pub struct PreparedStatements {
    next_id: u32,
    by_id: FxHashMap<StmtId, PreparedStatement>,
    by_name: FxHashMap<String, StmtId>,
}

impl PreparedStatements {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `stmt` under `name` and returns its new id.
    pub fn insert(&mut self, name: &str, stmt: Statement, schema_version: i64) -> StmtId {
        let key = name.to_ascii_lowercase();
        if let Some(old) = self.by_name.remove(&key) {
            self.by_id.remove(&old);
        }
        self.next_id += 1;
        let id = StmtId(self.next_id);
        let param_count = stmt.param_count();
        self.by_id.insert(
            id,
            PreparedStatement {
                id,
                name: name.to_owned(),
                stmt,
                param_count,
                schema_version,
            },
        );
        self.by_name.insert(key, id);
        id
    }

    /// Looks up a statement by id.
    pub fn get(&self, id: StmtId) -> Option<&PreparedStatement> {
        self.by_id.get(&id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: StmtId) -> Option<&mut PreparedStatement> {
        self.by_id.get_mut(&id)
    }

    /// Resolves a name to its current id.
    pub fn id_of(&self, name: &str) -> Option<StmtId> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Looks up a statement by name.
    pub fn get_by_name(&self, name: &str) -> Option<&PreparedStatement> {
        self.id_of(name).and_then(|id| self.by_id.get(&id))
    }

    /// Removes a statement by name.
    pub fn remove_by_name(&mut self, name: &str) -> Option<PreparedStatement> {
        let id = self.by_name.remove(&name.to_ascii_lowercase())?;
        self.by_id.remove(&id)
    }

    /// Number of registered statements.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no statement is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::builder::{col, eq, param, StatementBuilder};

    fn by_id() -> Statement {
        StatementBuilder::select_all()
            .from("orders")
            .filter(eq(col("id"), param(0)))
            .build()
    }

    #[test]
    fn insert_records_param_count_and_version() {
        let mut stmts = PreparedStatements::new();
        let id = stmts.insert("ById", by_id(), 4);
        let stored = stmts.get_by_name("byid").expect("registered");
        assert_eq!(stored.id, id);
        assert_eq!(stored.param_count, 1);
        assert_eq!(stored.schema_version, 4);
    }

    #[test]
    fn reprepare_retires_the_old_id() {
        let mut stmts = PreparedStatements::new();
        let first = stmts.insert("q", by_id(), 1);
        let second = stmts.insert("Q", by_id(), 1);
        assert_ne!(first, second);
        assert!(stmts.get(first).is_none());
        assert_eq!(stmts.len(), 1);
        assert!(stmts.remove_by_name("q").is_some());
        assert!(stmts.is_empty());
    }
}
