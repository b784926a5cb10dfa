use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::record::{EnrichedRecord, PersistedRow};
use crate::store::{
    Column, ColumnValue, PageRequest, PartialUpdate, RecordId, RecordStore, StoreError,
};

#[derive(Default)]
struct Rows {
    next_id: RecordId,
    rows: BTreeMap<RecordId, PersistedRow>,
}

/// An in-process `RecordStore`, for tests and local runs without a database.
///
/// Clones share the same rows. Inserts can be made to fail to exercise the
/// pipeline's retry path.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Rows>>,
    fail_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// A snapshot of every stored row, in id order.
    pub fn rows(&self) -> Vec<PersistedRow> {
        self.lock().rows.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Rows> {
        // A panicking test thread must not take the other tests' store down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert(&self, record: &EnrichedRecord) -> Result<RecordId, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout { command: "INSERT" });
        }

        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(id, PersistedRow::new(id, record.clone()));
        Ok(id)
    }

    async fn select_page(
        &self,
        gender: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<PersistedRow>, StoreError> {
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(page.limit()).unwrap_or(usize::MAX);

        Ok(self
            .lock()
            .rows
            .values()
            .filter(|row| gender.map_or(true, |gender| row.gender == gender))
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), StoreError> {
        self.lock().rows.remove(&id);
        Ok(())
    }

    async fn update_by_id(&self, id: RecordId, record: &EnrichedRecord) -> Result<(), StoreError> {
        if let Some(row) = self.lock().rows.get_mut(&id) {
            *row = PersistedRow::new(id, record.clone());
        }
        Ok(())
    }

    async fn partial_update_by_id(
        &self,
        id: RecordId,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let update = PartialUpdate::parse(fields)?;

        let mut inner = self.lock();
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(());
        };
        for (column, value) in update.assignments() {
            match (column, value.clone()) {
                (Column::Age, ColumnValue::Integer(age)) => row.age = age,
                (Column::Name, ColumnValue::Text(text)) => row.name = text,
                (Column::Surname, ColumnValue::Text(text)) => row.surname = text,
                (Column::Patronymic, ColumnValue::Text(text)) => row.patronymic = text,
                (Column::Gender, ColumnValue::Text(text)) => row.gender = text,
                (Column::Nationality, ColumnValue::Text(text)) => row.nationality = text,
                (column, _) => {
                    return Err(StoreError::InvalidValue {
                        column: *column,
                        expected: "a matching type",
                    })
                }
            }
        }
        Ok(())
    }
}
