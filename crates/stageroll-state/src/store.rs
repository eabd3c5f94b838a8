//! StateStore — redb-backed state persistence for stageroll.
//!
//! Provides stage registration, read-only lookups, and the transactional
//! [`StageRepository`] implementation used by the schedule lifecycle. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use stageroll_core::StageRef;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::repo::{EnvironmentBindingStore, ScheduleStore, StageRepository, StageTxn};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(STAGES).map_err(map_err!(Table))?;
        txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Stages ─────────────────────────────────────────────────────

    /// Register an environment stage. Existing registrations are returned
    /// unchanged, including their schedule binding.
    pub fn register_stage(&self, stage: &StageRef) -> StateResult<StageBinding> {
        let key = stage.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let binding = {
            let mut table = txn.open_table(STAGES).map_err(map_err!(Table))?;
            let existing = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode::<StageBinding>(guard.value())?),
                None => None,
            };
            match existing {
                Some(binding) => binding,
                None => {
                    let binding = StageBinding::new(stage);
                    let value = encode(&binding)?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    binding
                }
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "stage registered");
        Ok(binding)
    }

    /// List all registered stage bindings.
    pub fn list_bindings(&self) -> StateResult<Vec<StageBinding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STAGES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Schedules ──────────────────────────────────────────────────

    /// List all stored schedules.
    pub fn list_schedules(&self) -> StateResult<Vec<Schedule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    fn read<T: DeserializeOwned>(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }
}

impl StageRepository for StateStore {
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<StateError>,
        F: FnOnce(&mut dyn StageTxn) -> Result<T, E>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = op(&mut RedbStageTxn { txn: &txn });
        match outcome {
            Ok(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort state transaction");
                }
                Err(e)
            }
        }
    }

    fn schedule(&self, id: &str) -> StateResult<Option<Schedule>> {
        self.read(SCHEDULES, id)
    }

    fn binding(&self, stage: &StageRef) -> StateResult<Option<StageBinding>> {
        self.read(STAGES, &stage.table_key())
    }
}

/// One open write transaction, viewed through the store traits.
struct RedbStageTxn<'a> {
    txn: &'a WriteTransaction,
}

impl RedbStageTxn<'_> {
    fn get<T: DeserializeOwned>(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn contains(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StateResult<bool> {
        let table = self.txn.open_table(def).map_err(map_err!(Table))?;
        let found = table.get(key).map_err(map_err!(Read))?.is_some();
        Ok(found)
    }

    fn put<T: Serialize>(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let value = encode(value)?;
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        table
            .insert(key, value.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }
}

impl ScheduleStore for RedbStageTxn<'_> {
    fn get_schedule(&self, id: &str) -> StateResult<Option<Schedule>> {
        self.get(SCHEDULES, id)
    }

    fn insert_schedule(&mut self, schedule: &Schedule) -> StateResult<()> {
        if self.contains(SCHEDULES, &schedule.id)? {
            return Err(StateError::Conflict(format!("schedule {} exists", schedule.id)));
        }
        self.put(SCHEDULES, &schedule.id, schedule)?;
        debug!(schedule = %schedule.id, "schedule inserted");
        Ok(())
    }

    fn update_schedule(&mut self, schedule: &Schedule, id: &str) -> StateResult<()> {
        if schedule.id != id {
            return Err(StateError::Conflict(format!(
                "schedule {} written under id {id}",
                schedule.id
            )));
        }
        if !self.contains(SCHEDULES, id)? {
            return Err(StateError::NotFound(format!("schedule {id}")));
        }
        self.put(SCHEDULES, id, schedule)?;
        debug!(schedule = %id, "schedule updated");
        Ok(())
    }

    fn delete_schedule(&mut self, id: &str) -> StateResult<bool> {
        let mut table = self.txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        let existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        debug!(schedule = %id, existed, "schedule deleted");
        Ok(existed)
    }
}

impl EnvironmentBindingStore for RedbStageTxn<'_> {
    fn get_binding(&self, stage: &StageRef) -> StateResult<Option<StageBinding>> {
        self.get(STAGES, &stage.table_key())
    }

    fn update_binding(&mut self, binding: &StageBinding) -> StateResult<()> {
        let key = binding.table_key();
        if !self.contains(STAGES, &key)? {
            return Err(StateError::NotFound(format!("stage {key}")));
        }
        self.put(STAGES, &key, binding)?;
        debug!(%key, schedule = ?binding.schedule_id, "stage binding updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(env: &str, name: &str) -> StageRef {
        StageRef::parse(env, name).unwrap()
    }

    fn schedule(id: &str, total: u32) -> Schedule {
        Schedule::new(id.to_string(), "5m,10m".to_string(), "10,20".to_string(), total, 1000)
    }

    // ── Stage registration ─────────────────────────────────────────

    #[test]
    fn register_stage_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        let prod = stage("payments", "prod");

        let first = store.register_stage(&prod).unwrap();
        assert!(first.schedule_id.is_none());

        store
            .atomically(|txn| txn.update_binding(&first.bound_to("sch-1".into())))
            .unwrap();

        // Re-registering keeps the existing binding.
        let again = store.register_stage(&prod).unwrap();
        assert_eq!(again.schedule_id.as_deref(), Some("sch-1"));
        assert_eq!(store.list_bindings().unwrap().len(), 1);
    }

    #[test]
    fn binding_of_unknown_stage_is_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.binding(&stage("nope", "nothing")).unwrap().is_none());
    }

    #[test]
    fn update_binding_requires_registration() {
        let store = StateStore::open_in_memory().unwrap();
        let binding = StageBinding::new(&stage("payments", "prod"));

        let err = store
            .atomically(|txn| txn.update_binding(&binding))
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    // ── Schedule CRUD ──────────────────────────────────────────────

    #[test]
    fn schedule_insert_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let s = schedule("sch-1", 3);

        store.atomically(|txn| txn.insert_schedule(&s)).unwrap();

        assert_eq!(store.schedule("sch-1").unwrap(), Some(s));
        assert_eq!(store.list_schedules().unwrap().len(), 1);
    }

    #[test]
    fn schedule_insert_duplicate_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let s = schedule("sch-1", 3);
        store.atomically(|txn| txn.insert_schedule(&s)).unwrap();

        let err = store.atomically(|txn| txn.insert_schedule(&s)).unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
    }

    #[test]
    fn schedule_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let s = schedule("sch-1", 3);
        store.atomically(|txn| txn.insert_schedule(&s)).unwrap();

        let next = s.reconfigured("1m".into(), "5".into(), 6, 2000);
        store
            .atomically(|txn| txn.update_schedule(&next, "sch-1"))
            .unwrap();

        let stored = store.schedule("sch-1").unwrap().unwrap();
        assert_eq!(stored.total_sessions, 6);
        assert_eq!(stored.state_start_time, 2000);
    }

    #[test]
    fn schedule_update_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let s = schedule("ghost", 3);

        let err = store
            .atomically(|txn| txn.update_schedule(&s, "ghost"))
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn schedule_update_under_other_id_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let s = schedule("sch-1", 3);
        store.atomically(|txn| txn.insert_schedule(&s)).unwrap();

        let err = store
            .atomically(|txn| txn.update_schedule(&s, "sch-2"))
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
    }

    #[test]
    fn schedule_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .atomically(|txn| txn.insert_schedule(&schedule("sch-1", 2)))
            .unwrap();

        assert!(store.atomically(|txn| txn.delete_schedule("sch-1")).unwrap());
        assert!(!store.atomically(|txn| txn.delete_schedule("sch-1")).unwrap());
        assert!(store.schedule("sch-1").unwrap().is_none());
    }

    // ── Transactions ───────────────────────────────────────────────

    #[test]
    fn failed_unit_leaves_no_partial_writes() {
        let store = StateStore::open_in_memory().unwrap();
        let prod = stage("payments", "prod");
        let binding = store.register_stage(&prod).unwrap();

        let result: StateResult<()> = store.atomically(|txn| {
            txn.update_binding(&binding.bound_to("sch-1".into()))?;
            txn.insert_schedule(&schedule("sch-1", 3))?;
            Err(StateError::Write("disk full".into()))
        });
        assert!(result.is_err());

        assert!(store.binding(&prod).unwrap().unwrap().schedule_id.is_none());
        assert!(store.schedule("sch-1").unwrap().is_none());
    }

    #[test]
    fn unit_reads_its_own_writes() {
        let store = StateStore::open_in_memory().unwrap();
        let found = store
            .atomically(|txn| {
                txn.insert_schedule(&schedule("sch-1", 3))?;
                txn.get_schedule("sch-1")
            })
            .unwrap();
        assert!(found.is_some());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let prod = stage("payments", "prod");

        {
            let store = StateStore::open(&db_path).unwrap();
            let binding = store.register_stage(&prod).unwrap();
            store
                .atomically(|txn| {
                    txn.update_binding(&binding.bound_to("sch-1".into()))?;
                    txn.insert_schedule(&schedule("sch-1", 4))
                })
                .unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let binding = store.binding(&prod).unwrap().unwrap();
        assert_eq!(binding.schedule_id.as_deref(), Some("sch-1"));
        assert_eq!(store.schedule("sch-1").unwrap().unwrap().total_sessions, 4);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_bindings().unwrap().is_empty());
        assert!(store.list_schedules().unwrap().is_empty());
        assert!(store.schedule("nope").unwrap().is_none());
    }
}
