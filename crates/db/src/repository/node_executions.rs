//! SQLite-backed node-execution repository.

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    DbError,
    models::{NodeExecutionRecord, NodeExecutionStatus, OrderConfig, TriggeredFrom},
};

use super::NodeExecutionRepository;

/// Column list shared by every statement, in bind order.
macro_rules! node_execution_columns {
    () => {
        r#"id, tenant_id, app_id, workflow_id, triggered_from, workflow_run_id, "index",
           predecessor_node_id, node_execution_id, node_id, node_type, title,
           inputs, process_data, outputs, status, error, elapsed_time,
           execution_metadata, created_at, created_by_role, created_by, finished_at"#
    };
}

const SELECT_SQL: &str = concat!(
    "SELECT ",
    node_execution_columns!(),
    " FROM workflow_node_executions WHERE tenant_id = "
);

const INSERT_SQL: &str = concat!(
    "INSERT INTO workflow_node_executions (",
    node_execution_columns!(),
    r#") VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"#
);

/// `INSERT_SQL` plus a merge on primary key. `?24`/`?25` carry the store's
/// scope so a row belonging to another tenant or app is never overwritten.
const UPSERT_SQL: &str = concat!(
    "INSERT INTO workflow_node_executions (",
    node_execution_columns!(),
    r#") VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
    ON CONFLICT (id) DO UPDATE SET
        tenant_id           = excluded.tenant_id,
        app_id              = excluded.app_id,
        workflow_id         = excluded.workflow_id,
        triggered_from      = excluded.triggered_from,
        workflow_run_id     = excluded.workflow_run_id,
        "index"             = excluded."index",
        predecessor_node_id = excluded.predecessor_node_id,
        node_execution_id   = excluded.node_execution_id,
        node_id             = excluded.node_id,
        node_type           = excluded.node_type,
        title               = excluded.title,
        inputs              = excluded.inputs,
        process_data        = excluded.process_data,
        outputs             = excluded.outputs,
        status              = excluded.status,
        error               = excluded.error,
        elapsed_time        = excluded.elapsed_time,
        execution_metadata  = excluded.execution_metadata,
        created_at          = excluded.created_at,
        created_by_role     = excluded.created_by_role,
        created_by          = excluded.created_by,
        finished_at         = excluded.finished_at
    WHERE workflow_node_executions.tenant_id = ?24
      AND (?25 IS NULL OR workflow_node_executions.app_id = ?25)"#
);

/// Node-execution persistence for one tenant (and optionally one app).
///
/// The store borrows a connection the caller owns for as long as it lives.
/// Pass `&mut *tx` to work inside a transaction: writes become visible
/// within it immediately, and committing or rolling back is left to the caller.
pub struct NodeExecutionStore<'c> {
    conn: &'c mut SqliteConnection,
    tenant_id: String,
    app_id: Option<String>,
}

impl<'c> NodeExecutionStore<'c> {
    /// Bind a store to `conn` and a tenant. An empty `app_id` counts as none.
    pub fn new(
        conn: &'c mut SqliteConnection,
        tenant_id: impl Into<String>,
        app_id: Option<String>,
    ) -> Self {
        Self {
            conn,
            tenant_id: tenant_id.into(),
            app_id: app_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Fill in tenant and app from the store's scope where the record has none.
    fn apply_scope(&self, execution: &mut NodeExecutionRecord) {
        if execution.tenant_id.is_empty() {
            execution.tenant_id = self.tenant_id.clone();
        }

        if let Some(app_id) = &self.app_id {
            if execution.app_id.as_deref().map_or(true, str::is_empty) {
                execution.app_id = Some(app_id.clone());
            }
        }
    }
}

/// `SELECT … WHERE tenant_id = ? [AND app_id = ?]`, ready for more predicates.
fn scoped_select<'a>(tenant_id: &'a str, app_id: Option<&'a str>) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new(SELECT_SQL);
    builder.push_bind(tenant_id);

    if let Some(app_id) = app_id {
        builder.push(" AND app_id = ");
        builder.push_bind(app_id);
    }

    builder
}

/// Bind all 23 columns of `execution` in `node_execution_columns!` order.
fn bind_record<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    execution: &'q NodeExecutionRecord,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(execution.id)
        .bind(&execution.tenant_id)
        .bind(&execution.app_id)
        .bind(&execution.workflow_id)
        .bind(execution.triggered_from)
        .bind(&execution.workflow_run_id)
        .bind(execution.index)
        .bind(&execution.predecessor_node_id)
        .bind(&execution.node_execution_id)
        .bind(&execution.node_id)
        .bind(&execution.node_type)
        .bind(&execution.title)
        .bind(execution.inputs.as_ref().map(Json))
        .bind(execution.process_data.as_ref().map(Json))
        .bind(execution.outputs.as_ref().map(Json))
        .bind(execution.status)
        .bind(&execution.error)
        .bind(execution.elapsed_time)
        .bind(execution.execution_metadata.as_ref().map(Json))
        .bind(execution.created_at)
        .bind(execution.created_by_role)
        .bind(&execution.created_by)
        .bind(execution.finished_at)
}

#[async_trait]
impl<'c> NodeExecutionRepository for NodeExecutionStore<'c> {
    #[instrument(skip_all, fields(id = %execution.id, node_execution_id = %execution.node_execution_id))]
    async fn save(&mut self, execution: &mut NodeExecutionRecord) -> Result<(), DbError> {
        self.apply_scope(execution);

        bind_record(sqlx::query(INSERT_SQL), execution)
            .execute(&mut *self.conn)
            .await?;

        debug!(
            "saved node execution {} for tenant '{}'",
            execution.id, execution.tenant_id
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_node_execution_id(
        &mut self,
        node_execution_id: &str,
    ) -> Result<Option<NodeExecutionRecord>, DbError> {
        let mut builder = scoped_select(&self.tenant_id, self.app_id.as_deref());
        builder.push(" AND node_execution_id = ");
        builder.push_bind(node_execution_id);

        let execution = builder
            .build_query_as::<NodeExecutionRecord>()
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(execution)
    }

    #[instrument(skip(self, order_config))]
    async fn get_by_workflow_run(
        &mut self,
        workflow_run_id: &str,
        order_config: Option<&OrderConfig>,
    ) -> Result<Vec<NodeExecutionRecord>, DbError> {
        let mut builder = scoped_select(&self.tenant_id, self.app_id.as_deref());
        builder.push(" AND workflow_run_id = ");
        builder.push_bind(workflow_run_id);
        builder.push(" AND triggered_from = ");
        builder.push_bind(TriggeredFrom::WorkflowRun);

        if let Some(config) = order_config.filter(|config| !config.is_empty()) {
            let direction = config.direction().as_sql();
            builder.push(" ORDER BY ");
            let mut terms = builder.separated(", ");
            for field in config.fields() {
                terms.push(format!("{} {}", field.column(), direction));
            }
        }

        let executions = builder
            .build_query_as::<NodeExecutionRecord>()
            .fetch_all(&mut *self.conn)
            .await?;

        debug!(
            "found {} node executions for run '{}'",
            executions.len(),
            workflow_run_id
        );
        Ok(executions)
    }

    #[instrument(skip(self))]
    async fn get_running_executions(
        &mut self,
        workflow_run_id: &str,
    ) -> Result<Vec<NodeExecutionRecord>, DbError> {
        let mut builder = scoped_select(&self.tenant_id, self.app_id.as_deref());
        builder.push(" AND workflow_run_id = ");
        builder.push_bind(workflow_run_id);
        builder.push(" AND status = ");
        builder.push_bind(NodeExecutionStatus::Running);
        builder.push(" AND triggered_from = ");
        builder.push_bind(TriggeredFrom::WorkflowRun);

        let executions = builder
            .build_query_as::<NodeExecutionRecord>()
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(executions)
    }

    #[instrument(skip_all, fields(id = %execution.id, node_execution_id = %execution.node_execution_id))]
    async fn update(&mut self, execution: &mut NodeExecutionRecord) -> Result<(), DbError> {
        self.apply_scope(execution);

        let result = bind_record(sqlx::query(UPSERT_SQL), execution)
            .bind(&self.tenant_id)
            .bind(&self.app_id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            match &self.app_id {
                Some(app_id) => warn!(
                    "node execution {} exists outside tenant '{}' app '{}'; left unchanged",
                    execution.id, self.tenant_id, app_id
                ),
                None => warn!(
                    "node execution {} exists outside tenant '{}'; left unchanged",
                    execution.id, self.tenant_id
                ),
            }
        } else {
            debug!("merged node execution {}", execution.id);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&mut self, execution_id: Uuid) -> Result<(), DbError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("DELETE FROM workflow_node_executions WHERE id = ");
        builder.push_bind(execution_id);
        builder.push(" AND tenant_id = ");
        builder.push_bind(&self.tenant_id);
        if let Some(app_id) = &self.app_id {
            builder.push(" AND app_id = ");
            builder.push_bind(app_id);
        }

        let result = builder.build().execute(&mut *self.conn).await?;

        if result.rows_affected() == 0 {
            debug!("node execution {} not in scope; nothing to delete", execution_id);
        }
        Ok(())
    }
}
