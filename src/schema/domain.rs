use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{InfoSchema, InfoSchemaBuilder, SchemaError};

/// Process-wide holder of the current schema snapshot.
///
/// Sessions take a snapshot per statement; publishing a new version only
/// affects statements that start afterwards.
#[derive(Debug)]
pub struct Domain {
    current: RwLock<Arc<InfoSchema>>,
}

impl Domain {
    /// Creates a domain serving `schema` as the current snapshot.
    pub fn new(schema: InfoSchema) -> Self {
        Self {
            current: RwLock::new(Arc::new(schema)),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<InfoSchema> {
        Arc::clone(&self.current.read())
    }

    /// Publishes a new snapshot derived from the current one.
    ///
    /// The new snapshot's version is the current version plus one.
    pub fn apply<F>(&self, change: F) -> Result<Arc<InfoSchema>, SchemaError>
    where
        F: FnOnce(InfoSchemaBuilder) -> InfoSchemaBuilder,
    {
        let mut guard = self.current.write();
        let next_version = guard.version() + 1;
        let next = Arc::new(change(guard.to_builder(next_version)).build()?);
        *guard = Arc::clone(&next);
        info!(version = next_version, "schema.domain.published");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, TableDef};

    #[test]
    fn apply_bumps_version_and_keeps_old_snapshots() {
        let domain = Domain::new(InfoSchema::builder(7).database("db").build().unwrap());
        let before = domain.snapshot();
        let after = domain
            .apply(|b| b.table("db", TableDef::new("t").column("a", ColumnType::Int)))
            .expect("apply succeeds");
        assert_eq!(after.version(), 8);
        assert!(before.table("db", "t").is_none());
        assert!(domain.snapshot().table("db", "t").is_some());
    }

    #[test]
    fn failed_apply_keeps_current_snapshot() {
        let domain = Domain::new(InfoSchema::builder(1).database("db").build().unwrap());
        let err = domain
            .apply(|b| b.table("missing", TableDef::new("t")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownDatabase { .. }));
        assert_eq!(domain.snapshot().version(), 1);
    }
}
