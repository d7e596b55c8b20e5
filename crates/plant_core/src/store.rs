use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::blob::BlobBackend;
use crate::error::StoreError;
use crate::model::{PlantId, PlantRecord};
use crate::notifications::NotificationHandle;

pub const DEFAULT_STORAGE_KEY: &str = "@plantmanager/plants";

/// A saved plant together with the one trigger that reminds about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub record: PlantRecord,
    pub notification_handle: NotificationHandle,
}

impl StoreEntry {
    pub fn id(&self) -> &PlantId {
        self.record.id()
    }
}

/// Durable mapping from plant id to its entry.
///
/// `put` replaces any entry with the same id wholesale. A failed write leaves
/// the previously persisted state intact.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &PlantId) -> Result<Option<StoreEntry>, StoreError>;
    async fn put(&self, entry: StoreEntry) -> Result<(), StoreError>;
    /// Returns whether anything was removed.
    async fn delete(&self, id: &PlantId) -> Result<bool, StoreError>;
    async fn all(&self) -> Result<Vec<StoreEntry>, StoreError>;
    /// Records written before triggers were tracked. They carry no handle.
    async fn unscheduled(&self) -> Result<Vec<PlantRecord>, StoreError>;
}

/// Decoded contents of the plant blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlantBook {
    pub entries: BTreeMap<PlantId, StoreEntry>,
    pub unscheduled: BTreeMap<PlantId, PlantRecord>,
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    data: PlantRecord,
    #[serde(
        rename = "notificationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    notification_id: Option<NotificationHandle>,
}

impl PlantBook {
    pub fn decode(raw: &str) -> Result<Self, StoreError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|err| StoreError::malformed(format!("expected an object of plants: {err}")))?;

        let mut book = Self::default();
        let mut handles = HashSet::new();
        for (key, value) in map {
            let wire: WireEntry = serde_json::from_value(value)
                .map_err(|err| StoreError::malformed(format!("entry `{key}`: {err}")))?;
            let id = wire.data.id().clone();
            if id.as_str() != key {
                return Err(StoreError::malformed(format!(
                    "entry `{key}` holds plant `{id}`"
                )));
            }
            if !wire.data.plant.frequency.is_valid() {
                return Err(StoreError::malformed(format!(
                    "entry `{key}` waters zero times per cycle"
                )));
            }
            match wire.notification_id {
                Some(handle) => {
                    if !handles.insert(handle.clone()) {
                        return Err(StoreError::malformed(format!(
                            "notification `{handle}` is shared by several plants"
                        )));
                    }
                    book.entries.insert(
                        id,
                        StoreEntry {
                            record: wire.data,
                            notification_handle: handle,
                        },
                    );
                }
                None => {
                    book.unscheduled.insert(id, wire.data);
                }
            }
        }
        Ok(book)
    }

    pub fn encode(&self) -> Result<String, StoreError> {
        let mut map: BTreeMap<&str, WireEntry> = BTreeMap::new();
        for (id, record) in &self.unscheduled {
            map.insert(
                id.as_str(),
                WireEntry {
                    data: record.clone(),
                    notification_id: None,
                },
            );
        }
        for (id, entry) in &self.entries {
            map.insert(
                id.as_str(),
                WireEntry {
                    data: entry.record.clone(),
                    notification_id: Some(entry.notification_handle.clone()),
                },
            );
        }
        serde_json::to_string(&map).map_err(StoreError::Encode)
    }
}

/// [`RecordStore`] that keeps every plant in a single JSON blob.
pub struct BlobRecordStore<B> {
    backend: B,
    key: String,
    write_lock: Mutex<()>,
}

impl<B: BlobBackend> BlobRecordStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(backend: B, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn load(&self) -> Result<PlantBook, StoreError> {
        match self.backend.read(&self.key).await? {
            Some(raw) => PlantBook::decode(&raw),
            None => Ok(PlantBook::default()),
        }
    }

    async fn commit(&self, book: &PlantBook) -> Result<(), StoreError> {
        let raw = book.encode()?;
        self.backend.write(&self.key, &raw).await?;
        tracing::debug!(
            key = %self.key,
            entries = book.entries.len(),
            unscheduled = book.unscheduled.len(),
            "plants persisted"
        );
        Ok(())
    }
}

#[async_trait]
impl<B: BlobBackend> RecordStore for BlobRecordStore<B> {
    async fn get(&self, id: &PlantId) -> Result<Option<StoreEntry>, StoreError> {
        Ok(self.load().await?.entries.remove(id))
    }

    async fn put(&self, entry: StoreEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut book = self.load().await?;
        let id = entry.id().clone();
        if let Some(owner) = book.entries.values().find(|existing| {
            existing.notification_handle == entry.notification_handle && existing.id() != &id
        }) {
            return Err(StoreError::HandleInUse {
                handle: entry.notification_handle.clone(),
                owner: owner.id().clone(),
            });
        }
        book.unscheduled.remove(&id);
        book.entries.insert(id, entry);
        self.commit(&book).await
    }

    async fn delete(&self, id: &PlantId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut book = self.load().await?;
        let removed = book.entries.remove(id).is_some() | book.unscheduled.remove(id).is_some();
        if removed {
            self.commit(&book).await?;
        }
        Ok(removed)
    }

    async fn all(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(self.load().await?.entries.into_values().collect())
    }

    async fn unscheduled(&self) -> Result<Vec<PlantRecord>, StoreError> {
        Ok(self.load().await?.unscheduled.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlob;
    use crate::model::{Frequency, Plant};
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, handle: &str) -> StoreEntry {
        let plant = Plant {
            id: PlantId::new(id),
            name: format!("plant {id}"),
            about: String::new(),
            water_tips: String::new(),
            photo: String::new(),
            environments: vec![],
            frequency: Frequency::weekly(1),
        };
        StoreEntry {
            record: PlantRecord::new(plant, Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap()),
            notification_handle: NotificationHandle::new(handle),
        }
    }

    #[tokio::test]
    async fn put_replaces_entry_for_same_id() {
        let store = BlobRecordStore::new(MemoryBlob::new());
        store.put(entry("1", "a")).await.expect("put");
        store.put(entry("1", "b")).await.expect("put again");

        let all = store.all().await.expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].notification_handle.as_str(), "b");
    }

    #[tokio::test]
    async fn put_refuses_handle_owned_by_another_plant() {
        let store = BlobRecordStore::new(MemoryBlob::new());
        store.put(entry("1", "a")).await.expect("put");
        let before = store.backend().raw(DEFAULT_STORAGE_KEY);

        let err = store.put(entry("2", "a")).await.expect_err("shared handle");
        assert!(matches!(
            err,
            StoreError::HandleInUse { ref owner, .. } if owner.as_str() == "1"
        ));
        assert_eq!(store.backend().raw(DEFAULT_STORAGE_KEY), before);
        assert_eq!(store.all().await.expect("still readable").len(), 1);
    }

    #[tokio::test]
    async fn failed_write_keeps_prior_state() {
        let store = BlobRecordStore::new(MemoryBlob::new());
        store.put(entry("1", "a")).await.expect("put");
        store.backend().fail_writes(true);

        assert!(store.put(entry("2", "b")).await.is_err());
        assert!(store.delete(&PlantId::new("1")).await.is_err());

        let ids: Vec<String> = store
            .all()
            .await
            .expect("all")
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let store = BlobRecordStore::new(MemoryBlob::new());
        assert!(!store.delete(&PlantId::new("9")).await.expect("delete"));
        assert!(store.backend().raw(DEFAULT_STORAGE_KEY).is_none());
    }

    #[test]
    fn decodes_on_disk_layout_with_legacy_entries() {
        let raw = r#"{
            "1": {
                "data": {
                    "id": 1, "name": "Aningapara", "about": "", "water_tips": "",
                    "photo": "", "environments": ["living_room"],
                    "frequency": { "times": 2, "repeat_every": "week" },
                    "dateTimeNotification": "2021-04-20T11:00:00.000Z"
                },
                "notificationId": "abc"
            },
            "2": {
                "data": {
                    "id": "2", "name": "Peperomia",
                    "frequency": { "times": 1, "repeat_every": "day" },
                    "dateTimeNotification": "2021-04-21T09:30:00.000Z"
                }
            }
        }"#;
        let book = PlantBook::decode(raw).expect("decode");
        assert_eq!(book.entries.len(), 1);
        assert_eq!(
            book.entries[&PlantId::new("1")].notification_handle.as_str(),
            "abc"
        );
        assert!(book.unscheduled.contains_key(&PlantId::new("2")));

        let again = PlantBook::decode(&book.encode().expect("encode")).expect("decode again");
        assert_eq!(again, book);
    }

    #[test]
    fn rejects_key_that_disagrees_with_plant_id() {
        let raw = r#"{ "5": { "data": {
            "id": "6", "name": "x",
            "frequency": { "times": 1, "repeat_every": "day" },
            "dateTimeNotification": "2021-04-20T11:00:00Z"
        }, "notificationId": "h" } }"#;
        assert!(matches!(
            PlantBook::decode(raw),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_shared_handles_and_garbage() {
        let mut book = PlantBook::default();
        for id in ["1", "2"] {
            let e = entry(id, "same");
            book.entries.insert(e.id().clone(), e);
        }
        let raw = book.encode().expect("encode");
        assert!(matches!(
            PlantBook::decode(&raw),
            Err(StoreError::Malformed { .. })
        ));
        assert!(matches!(
            PlantBook::decode("[1, 2, 3]"),
            Err(StoreError::Malformed { .. })
        ));
        assert_eq!(PlantBook::decode("").expect("empty"), PlantBook::default());
    }
}
