//! Repositories — one trait per persisted entity, plus its SQLite implementation.
//!
//! Implementations borrow a connection that the caller owns, usually the one
//! inside an open `sqlx::Transaction`. They execute statements on it (which
//! makes the writes visible inside that transaction) but never begin, commit
//! or roll back. No business logic lives here.

pub mod node_executions;


use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError,
    models::{NodeExecutionRecord, OrderConfig},
};

pub use node_executions::NodeExecutionStore;

/// Tenant-scoped persistence for [`NodeExecutionRecord`]s.
///
/// Every read is limited to the implementation's tenant (and app, when it has
/// one). Nothing outside that scope is returned, updated or deleted.
#[async_trait]
pub trait NodeExecutionRepository: Send {
    /// Insert a new record.
    ///
    /// An empty `tenant_id` is replaced by the repository's tenant, and a
    /// missing `app_id` by its app (if any). An `app_id` already on the
    /// record is kept.
    async fn save(&mut self, execution: &mut NodeExecutionRecord) -> Result<(), DbError>;

    /// The record with this business id, if one is in scope.
    async fn get_by_node_execution_id(
        &mut self,
        node_execution_id: &str,
    ) -> Result<Option<NodeExecutionRecord>, DbError>;

    /// All `workflow-run` executions of one run, ordered by `order_config`
    /// when given (otherwise in whatever order the store returns them).
    async fn get_by_workflow_run(
        &mut self,
        workflow_run_id: &str,
        order_config: Option<&OrderConfig>,
    ) -> Result<Vec<NodeExecutionRecord>, DbError>;

    /// The `running` executions of one run.
    async fn get_running_executions(
        &mut self,
        workflow_run_id: &str,
    ) -> Result<Vec<NodeExecutionRecord>, DbError>;

    /// Insert or overwrite by primary key, with the same defaulting as `save`.
    async fn update(&mut self, execution: &mut NodeExecutionRecord) -> Result<(), DbError>;

    /// Remove the record with this primary key. Unknown ids are a no-op.
    async fn delete(&mut self, execution_id: Uuid) -> Result<(), DbError>;
}
