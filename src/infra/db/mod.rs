//! Postgres-backed document store.
//!
//! Every collection lives in the single `records` table; documents are stored
//! as `jsonb` and keyed by `(collection, id)`.

mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
    types::Json,
};
use uuid::Uuid;

use crate::application::repos::{CollectionStore, RepoError, record_id};

#[derive(sqlx::FromRow)]
struct RecordRow {
    body: Json<Value>,
}

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

#[async_trait]
impl CollectionStore for PostgresRepositories {
    async fn insert(&self, collection: &str, record: Value) -> Result<Value, RepoError> {
        let id = record_id(&record)?;
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            INSERT INTO records (collection, id, body)
            VALUES ($1, $2, $3)
            RETURNING body
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&record))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.body.0)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Value) -> Result<Value, RepoError> {
        if !patch.is_object() {
            return Err(RepoError::invalid_input("patch must be a JSON object"));
        }
        if patch.get("id").is_some() && record_id(&patch).ok() != Some(id) {
            return Err(RepoError::invalid_input("record `id` cannot be changed"));
        }

        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            UPDATE records
            SET body = body || $3
            WHERE collection = $1 AND id = $2
            RETURNING body
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&patch))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.body.0)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, RepoError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT body
            FROM records
            WHERE collection = $1 AND body -> $2 = $3
            ORDER BY seq
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|row| row.body.0).collect())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), RepoError> {
        let result = query("DELETE FROM records WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
