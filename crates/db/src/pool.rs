//! SQLite connection pool and schema bootstrap.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::DbError;

/// Type alias for the shared SQLite pool used across the whole application.
pub type DbPool = SqlitePool;

/// DDL for the `workflow_node_executions` table and its indexes.
///
/// Every statement is idempotent so `init_schema` can run on each start.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS workflow_node_executions (
        id                  BLOB PRIMARY KEY NOT NULL,
        tenant_id           TEXT NOT NULL CHECK (tenant_id <> ''),
        app_id              TEXT,
        workflow_id         TEXT NOT NULL,
        triggered_from      TEXT NOT NULL,
        workflow_run_id     TEXT,
        "index"             INTEGER NOT NULL,
        predecessor_node_id TEXT,
        node_execution_id   TEXT NOT NULL,
        node_id             TEXT NOT NULL,
        node_type           TEXT NOT NULL,
        title               TEXT NOT NULL,
        inputs              TEXT,
        process_data        TEXT,
        outputs             TEXT,
        status              TEXT NOT NULL,
        error               TEXT,
        elapsed_time        REAL NOT NULL DEFAULT 0,
        execution_metadata  TEXT,
        created_at          TEXT NOT NULL,
        created_by_role     TEXT NOT NULL,
        created_by          TEXT NOT NULL,
        finished_at         TEXT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS workflow_node_execution_id_idx
    ON workflow_node_executions (tenant_id, node_execution_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS workflow_node_execution_workflow_run_idx
    ON workflow_node_executions (tenant_id, app_id, workflow_id, triggered_from, workflow_run_id)
    "#,
];

/// Create a new connection pool from the given `database_url`.
///
/// `max_connections` controls the pool ceiling.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!("Connecting to database (max_connections={})", max_connections);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory pool with the schema already applied.
///
/// One connection only: every `sqlite::memory:` connection is its own database.
#[cfg(test)]
pub(crate) async fn in_memory_pool() -> Result<DbPool, DbError> {
    let pool = create_pool("sqlite::memory:", 1).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create the node-execution table and indexes if they do not exist yet.
pub async fn init_schema(pool: &DbPool) -> Result<(), DbError> {
    info!("Ensuring node execution schema");
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }
    debug!("Schema ready ({} statements)", SCHEMA.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_schema_is_idempotent() {
        let pool = in_memory_pool().await.expect("pool");
        init_schema(&pool).await.expect("second run should be a no-op");

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE tbl_name = 'workflow_node_executions'",
        )
        .fetch_one(&pool)
        .await
        .expect("sqlite_master query");

        // table + two explicit indexes + the primary key's autoindex
        assert!(count >= 3, "expected table and indexes, got {count}");
    }

    #[tokio::test]
    async fn empty_tenant_is_rejected_by_the_schema() {
        let pool = in_memory_pool().await.expect("pool");
        let err = sqlx::query(
            r#"INSERT INTO workflow_node_executions
               (id, tenant_id, workflow_id, triggered_from, "index", node_execution_id,
                node_id, node_type, title, status, created_at, created_by_role, created_by)
               VALUES (x'00', '', 'wf', 'workflow-run', 1, 'ne', 'n', 't', 'T', 'running',
                       '2026-01-01T00:00:00Z', 'account', 'u')"#,
        )
        .execute(&pool)
        .await
        .map_err(DbError::from)
        .expect_err("empty tenant must violate the check constraint");

        assert!(err.is_constraint_violation());
    }
}
