//! Снимок последнего удачного результата для мгновенного восстановления.
//!
//! Снимок используется только целиком: при несовпадении версии схемы,
//! истёкшем TTL или битом JSON он стирается и считается отсутствующим.

use chrono::{DateTime, Duration, Utc};
use contracts::domain::a025_mp_returns::{AccountSelection, FilterCriteria, ReturnRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::shared::clock::Clock;
use crate::shared::storage::KeyValueStore;

pub const SNAPSHOT_KEY: &str = "mp_returns.snapshot";
/// Версия схемы снимка. Поднимать при несовместимых изменениях полей
pub const SCHEMA_VERSION: u32 = 1;
pub const SNAPSHOT_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub version: u32,
    pub records: Vec<ReturnRecord>,
    pub total: usize,
    pub current_page: usize,
    pub filters: FilterCriteria,
    pub account_selection: AccountSelection,
    pub timestamp: DateTime<Utc>,
}

/// Частичное обновление снимка: `Some` заменяет поле
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotPatch {
    pub records: Option<Vec<ReturnRecord>>,
    pub total: Option<usize>,
    pub current_page: Option<usize>,
    pub filters: Option<FilterCriteria>,
    pub account_selection: Option<AccountSelection>,
}

impl PersistedSnapshot {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            records: Vec::new(),
            total: 0,
            current_page: 1,
            filters: FilterCriteria::default(),
            account_selection: AccountSelection::default(),
            timestamp: now,
        }
    }

    fn apply(&mut self, patch: SnapshotPatch) {
        if let Some(records) = patch.records {
            self.records = records;
        }
        if let Some(total) = patch.total {
            self.total = total;
        }
        if let Some(page) = patch.current_page {
            self.current_page = page.max(1);
        }
        if let Some(filters) = patch.filters {
            self.filters = filters;
        }
        if let Some(selection) = patch.account_selection {
            self.account_selection = selection;
        }
    }
}

pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::minutes(SNAPSHOT_TTL_MINUTES),
        }
    }

    /// Влить поля в сохранённый снимок, проставить `timestamp` и `version`.
    /// Ошибки записи только логируются.
    pub fn save(&self, patch: SnapshotPatch) {
        let now = self.clock.now();
        let mut snapshot = self.load().unwrap_or_else(|| PersistedSnapshot::empty(now));
        snapshot.apply(patch);
        snapshot.version = SCHEMA_VERSION;
        snapshot.timestamp = now;

        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize returns snapshot: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(SNAPSHOT_KEY, &json) {
            tracing::warn!("Failed to persist returns snapshot: {}", e);
        }
    }

    /// Снимок, если он валиден; иначе стирается и возвращается `None`
    pub fn load(&self) -> Option<PersistedSnapshot> {
        let raw = match self.store.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read returns snapshot: {}", e);
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Corrupt returns snapshot discarded: {}", e);
                self.clear();
                return None;
            }
        };

        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(SCHEMA_VERSION as u64) {
            tracing::info!(
                "Returns snapshot version {:?} does not match {}, discarded",
                version,
                SCHEMA_VERSION
            );
            self.clear();
            return None;
        }

        let snapshot: PersistedSnapshot = match serde_json::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Corrupt returns snapshot discarded: {}", e);
                self.clear();
                return None;
            }
        };

        if self.clock.now() - snapshot.timestamp >= self.ttl {
            tracing::debug!("Returns snapshot expired (saved at {})", snapshot.timestamp);
            self.clear();
            return None;
        }

        Some(snapshot)
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(SNAPSHOT_KEY) {
            tracing::warn!("Failed to remove returns snapshot: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::ManualClock;
    use crate::shared::storage::{MemoryStore, StorageError};

    fn setup() -> (Arc<MemoryStore>, ManualClock, SnapshotStore) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let snapshots = SnapshotStore::new(store.clone(), Arc::new(clock.clone()));
        (store, clock, snapshots)
    }

    fn records() -> Vec<ReturnRecord> {
        vec![ReturnRecord {
            id: "r-1".into(),
            sku: Some("ABC-P".into()),
            ..Default::default()
        }]
    }

    #[test]
    fn test_save_then_load_within_ttl() {
        let (_, clock, snapshots) = setup();
        let filters = FilterCriteria {
            search: Some("abc".into()),
            ..Default::default()
        };

        snapshots.save(SnapshotPatch {
            records: Some(records()),
            total: Some(1),
            current_page: Some(2),
            filters: Some(filters.clone()),
            account_selection: Some(AccountSelection::Single("acc-1".into())),
        });
        clock.advance(Duration::minutes(59));

        let loaded = snapshots.load().unwrap();
        assert_eq!(loaded.version, SCHEMA_VERSION);
        assert_eq!(loaded.records, records());
        assert_eq!(loaded.total, 1);
        assert_eq!(loaded.current_page, 2);
        assert_eq!(loaded.filters, filters);
        assert_eq!(loaded.account_selection, AccountSelection::Single("acc-1".into()));
    }

    #[test]
    fn test_partial_save_merges_fields() {
        let (_, _, snapshots) = setup();
        snapshots.save(SnapshotPatch {
            records: Some(records()),
            total: Some(1),
            ..Default::default()
        });
        snapshots.save(SnapshotPatch {
            current_page: Some(3),
            ..Default::default()
        });

        let loaded = snapshots.load().unwrap();
        assert_eq!(loaded.records, records());
        assert_eq!(loaded.current_page, 3);
    }

    #[test]
    fn test_expired_snapshot_is_erased() {
        let (store, clock, snapshots) = setup();
        snapshots.save(SnapshotPatch {
            total: Some(5),
            ..Default::default()
        });
        clock.advance(Duration::minutes(61));

        assert!(snapshots.load().is_none());
        assert!(store.get(SNAPSHOT_KEY).unwrap().is_none());
    }

    #[test]
    fn test_version_mismatch_is_erased() {
        let (store, _, snapshots) = setup();
        store
            .set(
                SNAPSHOT_KEY,
                &format!(
                    r#"{{"version":0,"records":[],"total":0,"currentPage":1,
                    "filters":{{}},"accountSelection":{{"mode":"multi","ids":[]}},
                    "timestamp":"{}"}}"#,
                    Utc::now().to_rfc3339()
                ),
            )
            .unwrap();

        assert!(snapshots.load().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_treated_as_missing() {
        let (store, _, snapshots) = setup();
        store.set(SNAPSHOT_KEY, "{not json").unwrap();
        assert!(snapshots.load().is_none());
        assert!(store.is_empty());

        store.set(SNAPSHOT_KEY, r#"{"version":1,"records":"oops"}"#).unwrap();
        assert!(snapshots.load().is_none());
        assert!(store.is_empty());
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disk gone".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk gone".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk gone".into()))
        }
    }

    #[test]
    fn test_storage_failures_never_escape() {
        let snapshots = SnapshotStore::new(Arc::new(BrokenStore), Arc::new(ManualClock::new(Utc::now())));
        snapshots.save(SnapshotPatch::default());
        assert!(snapshots.load().is_none());
        snapshots.clear();
    }
}
