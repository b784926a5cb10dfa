use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{EnrichedRecord, PersistedRow};

/// Store-assigned, monotonically increasing row identifier.
pub type RecordId = i64;

/// Enumeration of errors for operations against a `RecordStore`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    Connection { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    Query {
        command: &'static str,
        error: sqlx::Error,
    },
    #[error("{command} did not complete before its deadline")]
    Timeout { command: &'static str },
    #[error("{0} is not an updatable field")]
    UnknownColumn(String),
    #[error("invalid value for {column}: expected {expected}")]
    InvalidValue {
        column: Column,
        expected: &'static str,
    },
    #[error("no fields to update")]
    EmptyUpdate,
}

impl StoreError {
    /// Errors caused by the caller's input rather than the store itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownColumn(_) | StoreError::InvalidValue { .. } | StoreError::EmptyUpdate
        )
    }
}

/// The columns a caller may set, in table order. Anything else is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Surname,
    Patronymic,
    Age,
    Gender,
    Nationality,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Name,
        Column::Surname,
        Column::Patronymic,
        Column::Age,
        Column::Gender,
        Column::Nationality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Name => "name",
            Column::Surname => "surname",
            Column::Patronymic => "patronymic",
            Column::Age => "age",
            Column::Gender => "gender",
            Column::Nationality => "nationality",
        }
    }

    pub fn lookup(field: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.as_str() == field)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Integer(i32),
}

/// A checked partial update: only allowlisted columns, each with a value of the right type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialUpdate {
    assignments: Vec<(Column, ColumnValue)>,
}

impl PartialUpdate {
    /// Check every key of `fields` against the column allowlist before anything else.
    /// An unknown key fails the whole update, nothing is applied.
    pub fn parse(fields: &Map<String, Value>) -> Result<Self, StoreError> {
        if let Some(unknown) = fields.keys().find(|key| Column::lookup(key).is_none()) {
            return Err(StoreError::UnknownColumn(unknown.clone()));
        }

        let mut assignments = Vec::with_capacity(fields.len());
        for column in Column::ALL {
            let Some(value) = fields.get(column.as_str()) else {
                continue;
            };
            let value = match column {
                Column::Age => value
                    .as_i64()
                    .and_then(|age| i32::try_from(age).ok())
                    .map(ColumnValue::Integer)
                    .ok_or(StoreError::InvalidValue {
                        column,
                        expected: "an integer",
                    })?,
                _ => value
                    .as_str()
                    .map(|text| ColumnValue::Text(text.to_owned()))
                    .ok_or(StoreError::InvalidValue {
                        column,
                        expected: "a string",
                    })?,
            };
            assignments.push((column, value));
        }

        if assignments.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }
        Ok(Self { assignments })
    }

    pub fn assignments(&self) -> &[(Column, ColumnValue)] {
        &self.assignments
    }
}

/// One page of an offset-paginated listing. Both numbers are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    page_size: i64,
}

impl PageRequest {
    /// Values below 1 are raised to 1.
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Persistence for enriched records, consumed by the pipeline (`ensure_schema`, `insert`)
/// and the records API (everything else).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the backing table if it does not exist. Idempotent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    async fn insert(&self, record: &EnrichedRecord) -> Result<RecordId, StoreError>;

    /// Rows in id order, filtered by exact `gender` when given.
    async fn select_page(
        &self,
        gender: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<PersistedRow>, StoreError>;

    /// Succeeds whether or not the row existed.
    async fn delete_by_id(&self, id: RecordId) -> Result<(), StoreError>;

    /// Replace every updatable field of the row.
    async fn update_by_id(&self, id: RecordId, record: &EnrichedRecord) -> Result<(), StoreError>;

    /// Set only the fields present in `fields`, after checking them with `PartialUpdate::parse`.
    async fn partial_update_by_id(
        &self,
        id: RecordId,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError>;
}
