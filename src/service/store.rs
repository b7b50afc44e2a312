//! Person persistence.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::person::Person;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate email: {0}")]
    DuplicateEmail(String),

    #[error("insert requires a new record, got id {0}")]
    AlreadyPersisted(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Which persons [`PersonStore::find`] returns.
#[derive(Debug, Clone, Default)]
pub struct PersonFilter {
    pub include_deleted: bool,
    pub email: Option<String>,
}

/// Reads and writes persons. Writes touch only the listed columns.
pub trait PersonStore: Send + Sync {
    fn find_by_id(&self, id: u64) -> Result<Option<Person>, StoreError>;

    /// Matches in ascending id order.
    fn find(&self, filter: &PersonFilter) -> Result<Vec<Person>, StoreError>;

    /// Assigns `id` and `created_at` on success.
    fn insert(&self, person: &mut Person, columns: &[&str]) -> Result<(), StoreError>;

    /// Returns the number of rows changed: 0 when `person.id` is unknown.
    fn update(&self, person: &mut Person, columns: &[&str]) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct Table {
    rows: BTreeMap<u64, Person>,
    last_id: u64,
}

/// Process-local [`PersonStore`] with a unique index on email.
#[derive(Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn email_taken(table: &Table, email: &str, except: u64) -> bool {
    table.rows.values().any(|p| p.id != except && p.email == email)
}

impl PersonStore for MemoryStore {
    fn find_by_id(&self, id: u64) -> Result<Option<Person>, StoreError> {
        Ok(self.lock().rows.get(&id).cloned())
    }

    fn find(&self, filter: &PersonFilter) -> Result<Vec<Person>, StoreError> {
        Ok(self
            .lock()
            .rows
            .values()
            .filter(|p| filter.include_deleted || !p.is_deleted)
            .filter(|p| filter.email.as_ref().is_none_or(|e| *e == p.email))
            .cloned()
            .collect())
    }

    fn insert(&self, person: &mut Person, columns: &[&str]) -> Result<(), StoreError> {
        if person.id != 0 {
            return Err(StoreError::AlreadyPersisted(person.id));
        }
        let mut table = self.lock();
        if columns.contains(&"email") && email_taken(&table, &person.email, 0) {
            return Err(StoreError::DuplicateEmail(person.email.clone()));
        }

        table.last_id += 1;
        let mut row = Person {
            id: table.last_id,
            created_at: Utc::now(),
            ..Person::default()
        };
        row.assign_columns(person, columns);

        *person = row.clone();
        table.rows.insert(row.id, row);
        tracing::debug!(id = person.id, "person inserted");
        Ok(())
    }

    fn update(&self, person: &mut Person, columns: &[&str]) -> Result<u64, StoreError> {
        let mut table = self.lock();
        if columns.contains(&"email") && email_taken(&table, &person.email, person.id) {
            return Err(StoreError::DuplicateEmail(person.email.clone()));
        }
        let Some(row) = table.rows.get_mut(&person.id) else {
            return Ok(0);
        };

        row.assign_columns(person, columns);
        row.modified_at = Some(Utc::now());
        *person = row.clone();
        tracing::debug!(id = person.id, ?columns, "person updated");
        Ok(1)
    }
}
