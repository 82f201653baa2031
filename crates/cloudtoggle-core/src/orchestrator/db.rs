//! Persistent storage for action records using redb.
//!
//! # Table design
//!
//! A single `ACTIONS` table keyed by the 16 raw bytes of the action's UUID.
//! Values are JSON-encoded `Action` records. Every mutation rewrites the
//! whole record under the same key inside one write transaction.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{Result, ToggleError};

use super::action::Action;
use super::tracker::ActionStore;

/// Key: 16-byte uuid. Value: JSON-encoded Action.
const ACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");

fn store_err(e: impl std::fmt::Display) -> ToggleError {
    ToggleError::Store(e.to_string())
}

/// redb-backed `ActionStore`.
pub struct ActionDb {
    db: Database,
}

impl ActionDb {
    /// Open or create the redb database at `path`.
    ///
    /// Creates the `ACTIONS` table if it doesn't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACTIONS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    fn put(&self, action: &Action) -> Result<()> {
        let value = serde_json::to_vec(action)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ACTIONS).map_err(store_err)?;
            table
                .insert(action.id.as_bytes().as_slice(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

impl ActionStore for ActionDb {
    fn insert(&self, action: &Action) -> Result<()> {
        self.put(action)
    }

    fn update(&self, action: &Action) -> Result<()> {
        self.put(action)
    }

    fn get(&self, id: Uuid) -> Result<Action> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;
        let entry = table
            .get(id.as_bytes().as_slice())
            .map_err(store_err)?
            .ok_or_else(|| ToggleError::ActionNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(entry.value())?)
    }

    /// All actions, sorted by `created_at` descending (newest first).
    fn list_all(&self) -> Result<Vec<Action>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let action: Action = serde_json::from_slice(v.value())?;
            result.push(action);
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::action::{ActionStatus, ActionTrigger};
    use crate::types::ActionKind;
    use chrono::{Duration as CDur, Utc};
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, ActionDb) {
        let dir = TempDir::new().unwrap();
        let db = ActionDb::open(&dir.path().join("actions.redb")).unwrap();
        (dir, db)
    }

    #[test]
    fn insert_then_get_round_trips_status() {
        let (_dir, db) = open_tmp();
        let mut action = Action::new("7", ActionKind::Stop, ActionTrigger::Scheduled);
        db.insert(&action).unwrap();

        action.status = ActionStatus::Running;
        db.update(&action).unwrap();

        let loaded = db.get(action.id).unwrap();
        assert_eq!(loaded.group_id, "7");
        assert_eq!(loaded.status, ActionStatus::Running);
        assert_eq!(loaded.trigger, ActionTrigger::Scheduled);
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let (_dir, db) = open_tmp();
        let err = db.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ToggleError::ActionNotFound(_)));
    }

    #[test]
    fn list_all_is_newest_first() {
        let (_dir, db) = open_tmp();
        let mut older = Action::new("1", ActionKind::Start, ActionTrigger::Manual);
        older.created_at = Utc::now() - CDur::minutes(5);
        let newer = Action::new("1", ActionKind::Stop, ActionTrigger::Manual);
        db.insert(&older).unwrap();
        db.insert(&newer).unwrap();

        let all = db.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);
        assert_eq!(all[1].id, older.id);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("actions.redb");
        let action = Action::new("3", ActionKind::Start, ActionTrigger::Manual);
        {
            let db = ActionDb::open(&path).unwrap();
            db.insert(&action).unwrap();
        }
        let db = ActionDb::open(&path).unwrap();
        assert_eq!(db.get(action.id).unwrap().group_id, "3");
    }

    #[test]
    fn empty_db_lists_nothing() {
        let (_dir, db) = open_tmp();
        assert!(db.list_all().unwrap().is_empty());
    }
}
