use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use crate::record::{EnrichedRecord, PersistedRow};
use crate::store::{ColumnValue, PageRequest, PartialUpdate, RecordId, RecordStore, StoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS service_data (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL DEFAULT '',
    surname VARCHAR(255) NOT NULL DEFAULT '',
    patronymic VARCHAR(255) NOT NULL DEFAULT '',
    age INTEGER NOT NULL DEFAULT 0,
    gender VARCHAR(255) NOT NULL DEFAULT '',
    nationality VARCHAR(255) NOT NULL DEFAULT ''
)
"#;

/// A `RecordStore` backed by the `service_data` table in PostgreSQL.
///
/// All values reach the database as bound parameters. The only identifiers ever
/// interpolated into SQL come from the `Column` allowlist.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|error| StoreError::Connection { error })?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "CREATE TABLE",
                error,
            })?;

        Ok(())
    }

    async fn insert(&self, record: &EnrichedRecord) -> Result<RecordId, StoreError> {
        let id: RecordId = sqlx::query_scalar(
            r#"
INSERT INTO service_data
    (name, surname, patronymic, age, gender, nationality)
VALUES
    ($1, $2, $3, $4, $5, $6)
RETURNING id
            "#,
        )
        .bind(&record.name)
        .bind(&record.surname)
        .bind(&record.patronymic)
        .bind(record.age)
        .bind(&record.gender)
        .bind(&record.nationality)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            command: "INSERT",
            error,
        })?;

        debug!(id, "inserted record");
        Ok(id)
    }

    async fn select_page(
        &self,
        gender: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<PersistedRow>, StoreError> {
        let rows: Vec<PersistedRow> = sqlx::query_as(
            r#"
SELECT
    id, name, surname, patronymic, age, gender, nationality
FROM
    service_data
WHERE
    ($1::text IS NULL OR gender = $1)
ORDER BY
    id
LIMIT $2
OFFSET $3
            "#,
        )
        .bind(gender)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            command: "SELECT",
            error,
        })?;

        Ok(rows)
    }

    async fn delete_by_id(&self, id: RecordId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM service_data WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "DELETE",
                error,
            })?;

        Ok(())
    }

    async fn update_by_id(&self, id: RecordId, record: &EnrichedRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
UPDATE
    service_data
SET
    name = $2,
    surname = $3,
    patronymic = $4,
    age = $5,
    gender = $6,
    nationality = $7
WHERE
    id = $1
            "#,
        )
        .bind(id)
        .bind(&record.name)
        .bind(&record.surname)
        .bind(&record.patronymic)
        .bind(record.age)
        .bind(&record.gender)
        .bind(&record.nationality)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            command: "UPDATE",
            error,
        })?;

        Ok(())
    }

    async fn partial_update_by_id(
        &self,
        id: RecordId,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let update = PartialUpdate::parse(fields)?;
        let mut query = build_partial_update(id, &update);

        query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "UPDATE",
                error,
            })?;

        Ok(())
    }
}

fn build_partial_update(id: RecordId, update: &PartialUpdate) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE service_data SET ");

    let mut assignments = query.separated(", ");
    for (column, value) in update.assignments() {
        assignments.push(column.as_str());
        assignments.push_unseparated(" = ");
        match value {
            ColumnValue::Text(text) => assignments.push_bind_unseparated(text.clone()),
            ColumnValue::Integer(number) => assignments.push_bind_unseparated(*number),
        };
    }

    query.push(" WHERE id = ").push_bind(id);
    query
}
