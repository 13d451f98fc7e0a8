// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Document Store
//!
//! Production document store backed by two tables:
//!
//! - `fleet_documents`: JSONB bodies keyed by `(doc_type, id)`; agents,
//!   action saved objects and API key records live here.
//! - `fleet_actions`: indexed action documents. `seq_no` is a `BIGSERIAL`,
//!   so insertion order defines dispatch order.
//!
//! Postgres commits are visible on return, so refresh options need no
//! extra round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::domain::action::ActionDoc;
use crate::domain::agent::Fields;
use crate::domain::repository::{
    ActionSearch, BulkIndexer, BulkOp, DocumentStore, FindQuery, Hit, PendingActionsQuery,
    RepositoryError, UpdateOp, WriteOptions,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS fleet_documents (
        doc_type   TEXT        NOT NULL,
        id         TEXT        NOT NULL,
        body       JSONB       NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (doc_type, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fleet_actions (
        seq_no     BIGSERIAL   PRIMARY KEY,
        doc_id     TEXT        NOT NULL UNIQUE,
        agents     TEXT[]      NOT NULL,
        expiration TIMESTAMPTZ,
        body       JSONB       NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS fleet_actions_agents_idx ON fleet_actions USING GIN (agents)",
];

#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(format!("Failed to apply schema: {}", e)))?;
        }
        Ok(())
    }

    /// Append an action document; returns it with its assigned sequence
    /// number and document id.
    pub async fn index_action(&self, mut doc: ActionDoc) -> Result<ActionDoc, RepositoryError> {
        if doc.doc_id.is_empty() {
            doc.doc_id = uuid::Uuid::new_v4().to_string();
        }
        let body = serde_json::to_value(&doc)?;

        let row = sqlx::query(
            r#"
            INSERT INTO fleet_actions (doc_id, agents, expiration, body)
            VALUES ($1, $2, $3, $4)
            RETURNING seq_no
            "#,
        )
        .bind(&doc.doc_id)
        .bind(&doc.agents)
        .bind(doc.expiration)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        doc.seq_no = row.get("seq_no");
        Ok(doc)
    }

    pub async fn max_seq_no(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COALESCE(MAX(seq_no), 0) AS max_seq_no FROM fleet_actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("max_seq_no"))
    }
}

fn action_from_row(row: &sqlx::postgres::PgRow) -> Result<ActionDoc, RepositoryError> {
    let body: Value = row.get("body");
    let mut doc: ActionDoc = serde_json::from_value(body)?;
    doc.seq_no = row.get("seq_no");
    doc.doc_id = row.get("doc_id");
    Ok(doc)
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn read(&self, doc_type: &str, id: &str) -> Result<Value, RepositoryError> {
        let row = sqlx::query("SELECT body FROM fleet_documents WHERE doc_type = $1 AND id = $2")
            .bind(doc_type)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.get("body")),
            None => Err(RepositoryError::NotFound(format!("{}/{}", doc_type, id))),
        }
    }

    async fn update(
        &self,
        doc_type: &str,
        id: &str,
        fields: Fields,
        _opts: WriteOptions,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE fleet_documents
            SET body = body || $3, updated_at = NOW()
            WHERE doc_type = $1 AND id = $2
            "#,
        )
        .bind(doc_type)
        .bind(id)
        .bind(Value::Object(fields))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("{}/{}", doc_type, id)));
        }
        Ok(())
    }

    async fn m_update(&self, updates: Vec<UpdateOp>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for op in updates {
            sqlx::query(
                r#"
                UPDATE fleet_documents
                SET body = body || $3, updated_at = NOW()
                WHERE doc_type = $1 AND id = $2
                "#,
            )
            .bind(&op.doc_type)
            .bind(&op.id)
            .bind(Value::Object(op.fields))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn create(
        &self,
        doc_type: &str,
        doc: Value,
        opts: WriteOptions,
    ) -> Result<String, RepositoryError> {
        let id = opts
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let sql = if opts.overwrite {
            r#"
            INSERT INTO fleet_documents (doc_type, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (doc_type, id) DO UPDATE SET
                body = EXCLUDED.body,
                updated_at = NOW()
            "#
        } else {
            "INSERT INTO fleet_documents (doc_type, id, body) VALUES ($1, $2, $3)"
        };

        sqlx::query(sql)
            .bind(doc_type)
            .bind(&id)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    RepositoryError::Conflict(format!("{}/{}", doc_type, id))
                }
                _ => RepositoryError::from(e),
            })?;

        Ok(id)
    }

    async fn find_raw(&self, query: &FindQuery) -> Result<Vec<Hit>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, body FROM fleet_documents
            WHERE doc_type = $1 AND body -> $2 = $3
            ORDER BY id
            "#,
        )
        .bind(&query.doc_type)
        .bind(&query.field)
        .bind(&query.value)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Hit {
                id: row.get("id"),
                data: row.get("body"),
            })
            .collect())
    }
}

#[async_trait]
impl BulkIndexer for PostgresDocumentStore {
    async fn bulk_update(&self, ops: Vec<BulkOp>, _opts: WriteOptions) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for op in ops {
            let Some(partial @ Value::Object(_)) = op.body.get("doc").cloned() else {
                return Err(RepositoryError::Serialization(format!(
                    "bulk op for {} has no doc body",
                    op.id
                )));
            };
            sqlx::query(
                r#"
                UPDATE fleet_documents
                SET body = body || $3, updated_at = NOW()
                WHERE doc_type = $1 AND id = $2
                "#,
            )
            .bind(&op.index)
            .bind(&op.id)
            .bind(partial)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ActionSearch for PostgresDocumentStore {
    async fn search_pending(&self, query: &PendingActionsQuery) -> Result<Vec<ActionDoc>, RepositoryError> {
        let now: DateTime<Utc> = query.now;
        let rows = sqlx::query(
            r#"
            SELECT seq_no, doc_id, body FROM fleet_actions
            WHERE seq_no > $1
              AND seq_no <= $2
              AND $3 = ANY(agents)
              AND (expiration IS NULL OR expiration > $4)
            ORDER BY seq_no ASC
            "#,
        )
        .bind(query.since_seq_no)
        .bind(query.max_seq_no)
        .bind(&query.agent_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }

    async fn find_action_doc(&self, doc_id: &str) -> Result<ActionDoc, RepositoryError> {
        let row = sqlx::query("SELECT seq_no, doc_id, body FROM fleet_actions WHERE doc_id = $1")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => action_from_row(&row),
            None => Err(RepositoryError::NotFound(doc_id.to_string())),
        }
    }

    async fn search_since(&self, since_seq_no: i64, limit: usize) -> Result<Vec<ActionDoc>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT seq_no, doc_id, body FROM fleet_actions
            WHERE seq_no > $1
            ORDER BY seq_no ASC
            LIMIT $2
            "#,
        )
        .bind(since_seq_no)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }
}
