//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — the store only owns their durability.
//! Status transitions belong to whichever engine produces the executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use tracing::debug;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enumerations persisted as text
// ---------------------------------------------------------------------------

/// Where a node execution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum TriggeredFrom {
    /// Part of a full workflow run.
    WorkflowRun,
    /// A single node run on its own, e.g. while debugging.
    SingleStep,
}

impl TriggeredFrom {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowRun => "workflow-run",
            Self::SingleStep => "single-step",
        }
    }
}

impl std::fmt::Display for TriggeredFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Possible statuses for a node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NodeExecutionStatus {
    Running,
    Succeeded,
    Failed,
    /// Failed, but the workflow's error strategy let the run continue.
    Exception,
    Retry,
}

impl NodeExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Exception => "exception",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for NodeExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of principal that started the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CreatedByRole {
    Account,
    EndUser,
}

impl CreatedByRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::EndUser => "end_user",
        }
    }
}

impl std::fmt::Display for CreatedByRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// workflow_node_executions
// ---------------------------------------------------------------------------

/// One execution of a single node within a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    pub id: Uuid,
    /// Empty until the record is saved through a store, which fills it in.
    pub tenant_id: String,
    pub app_id: Option<String>,
    pub workflow_id: String,
    pub triggered_from: TriggeredFrom,
    /// Absent for single-step executions.
    pub workflow_run_id: Option<String>,
    pub index: i64,
    pub predecessor_node_id: Option<String>,
    /// Business identifier handed out by the engine; unique per tenant.
    pub node_execution_id: String,
    pub node_id: String,
    pub node_type: String,
    pub title: String,
    pub inputs: Option<Value>,
    pub process_data: Option<Value>,
    pub outputs: Option<Value>,
    pub status: NodeExecutionStatus,
    pub error: Option<String>,
    /// Seconds.
    pub elapsed_time: f64,
    pub execution_metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub created_by_role: CreatedByRole,
    pub created_by: String,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeExecutionRecord {
    /// A `running` execution of `node_id` triggered as part of a workflow run.
    ///
    /// The primary key is generated here; tenant and app are left for the
    /// store to fill in. Everything else can be adjusted through the public
    /// fields before saving.
    pub fn new(
        node_execution_id: impl Into<String>,
        node_id: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        let node_id = node_id.into();
        Self {
            id: Uuid::new_v4(),
            tenant_id: String::new(),
            app_id: None,
            workflow_id: String::new(),
            triggered_from: TriggeredFrom::WorkflowRun,
            workflow_run_id: None,
            index: 1,
            predecessor_node_id: None,
            node_execution_id: node_execution_id.into(),
            title: node_id.clone(),
            node_id,
            node_type: node_type.into(),
            inputs: None,
            process_data: None,
            outputs: None,
            status: NodeExecutionStatus::Running,
            error: None,
            elapsed_time: 0.0,
            execution_metadata: None,
            created_at: Utc::now(),
            created_by_role: CreatedByRole::Account,
            created_by: String::new(),
            finished_at: None,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for NodeExecutionRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let json = |column: &str| -> Result<Option<Value>, sqlx::Error> {
            Ok(row.try_get::<Option<Json<Value>>, _>(column)?.map(|Json(v)| v))
        };

        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            app_id: row.try_get("app_id")?,
            workflow_id: row.try_get("workflow_id")?,
            triggered_from: row.try_get("triggered_from")?,
            workflow_run_id: row.try_get("workflow_run_id")?,
            index: row.try_get("index")?,
            predecessor_node_id: row.try_get("predecessor_node_id")?,
            node_execution_id: row.try_get("node_execution_id")?,
            node_id: row.try_get("node_id")?,
            node_type: row.try_get("node_type")?,
            title: row.try_get("title")?,
            inputs: json("inputs")?,
            process_data: json("process_data")?,
            outputs: json("outputs")?,
            status: row.try_get("status")?,
            error: row.try_get("error")?,
            elapsed_time: row.try_get("elapsed_time")?,
            execution_metadata: json("execution_metadata")?,
            created_at: row.try_get("created_at")?,
            created_by_role: row.try_get("created_by_role")?,
            created_by: row.try_get("created_by")?,
            finished_at: row.try_get("finished_at")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Sort direction for [`OrderConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// `"desc"` (any case) is descending; every other value is ascending.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// The closed set of record fields a query may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Id,
    TenantId,
    AppId,
    WorkflowId,
    TriggeredFrom,
    WorkflowRunId,
    Index,
    PredecessorNodeId,
    NodeExecutionId,
    NodeId,
    NodeType,
    Title,
    Inputs,
    ProcessData,
    Outputs,
    Status,
    Error,
    ElapsedTime,
    ExecutionMetadata,
    CreatedAt,
    CreatedByRole,
    CreatedBy,
    FinishedAt,
}

impl OrderField {
    /// Resolve a record field name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "id" => Self::Id,
            "tenant_id" => Self::TenantId,
            "app_id" => Self::AppId,
            "workflow_id" => Self::WorkflowId,
            "triggered_from" => Self::TriggeredFrom,
            "workflow_run_id" => Self::WorkflowRunId,
            "index" => Self::Index,
            "predecessor_node_id" => Self::PredecessorNodeId,
            "node_execution_id" => Self::NodeExecutionId,
            "node_id" => Self::NodeId,
            "node_type" => Self::NodeType,
            "title" => Self::Title,
            "inputs" => Self::Inputs,
            "process_data" => Self::ProcessData,
            "outputs" => Self::Outputs,
            "status" => Self::Status,
            "error" => Self::Error,
            "elapsed_time" => Self::ElapsedTime,
            "execution_metadata" => Self::ExecutionMetadata,
            "created_at" => Self::CreatedAt,
            "created_by_role" => Self::CreatedByRole,
            "created_by" => Self::CreatedBy,
            "finished_at" => Self::FinishedAt,
            _ => return None,
        };
        Some(field)
    }

    /// Quoted column reference, safe to splice into SQL.
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::TenantId => "tenant_id",
            Self::AppId => "app_id",
            Self::WorkflowId => "workflow_id",
            Self::TriggeredFrom => "triggered_from",
            Self::WorkflowRunId => "workflow_run_id",
            Self::Index => "\"index\"",
            Self::PredecessorNodeId => "predecessor_node_id",
            Self::NodeExecutionId => "node_execution_id",
            Self::NodeId => "node_id",
            Self::NodeType => "node_type",
            Self::Title => "title",
            Self::Inputs => "inputs",
            Self::ProcessData => "process_data",
            Self::Outputs => "outputs",
            Self::Status => "status",
            Self::Error => "error",
            Self::ElapsedTime => "elapsed_time",
            Self::ExecutionMetadata => "execution_metadata",
            Self::CreatedAt => "created_at",
            Self::CreatedByRole => "created_by_role",
            Self::CreatedBy => "created_by",
            Self::FinishedAt => "finished_at",
        }
    }
}

/// Ordering applied by `get_by_workflow_run`.
///
/// Field names are resolved when the config is built; names that are not
/// record fields are dropped, so a config can end up empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderConfig {
    fields: Vec<OrderField>,
    direction: OrderDirection,
}

impl OrderConfig {
    pub fn new<I, S>(order_by: I, direction: OrderDirection) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = order_by
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let field = OrderField::from_name(name);
                if field.is_none() {
                    debug!("ignoring unknown order field '{}'", name);
                }
                field
            })
            .collect();

        Self { fields, direction }
    }

    /// Primary sort key first.
    pub fn fields(&self) -> &[OrderField] {
        &self.fields
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parsing_is_lenient() {
        assert_eq!(OrderDirection::parse("desc"), OrderDirection::Desc);
        assert_eq!(OrderDirection::parse("DESC"), OrderDirection::Desc);
        assert_eq!(OrderDirection::parse("asc"), OrderDirection::Asc);
        assert_eq!(OrderDirection::parse("sideways"), OrderDirection::Asc);
        assert_eq!(OrderDirection::default(), OrderDirection::Asc);
    }

    #[test]
    fn order_config_keeps_known_fields_in_order() {
        let config = OrderConfig::new(["index", "bogus", "created_at"], OrderDirection::Desc);
        assert_eq!(config.fields(), &[OrderField::Index, OrderField::CreatedAt]);
        assert_eq!(config.direction(), OrderDirection::Desc);
    }

    #[test]
    fn order_config_of_unknown_fields_is_empty() {
        let config = OrderConfig::new(vec!["nope".to_string()], OrderDirection::Asc);
        assert!(config.is_empty());
    }

    #[test]
    fn index_column_is_quoted() {
        assert_eq!(OrderField::Index.column(), "\"index\"");
        assert_eq!(OrderField::from_name("index"), Some(OrderField::Index));
    }

    #[test]
    fn new_record_defaults() {
        let record = NodeExecutionRecord::new("ne-1", "llm", "llm");
        assert!(record.tenant_id.is_empty());
        assert_eq!(record.app_id, None);
        assert_eq!(record.status, NodeExecutionStatus::Running);
        assert_eq!(record.triggered_from, TriggeredFrom::WorkflowRun);
        assert_eq!(record.title, "llm");
        assert_ne!(record.id, NodeExecutionRecord::new("ne-2", "llm", "llm").id);
    }

    #[test]
    fn enums_serialise_like_the_stored_text() {
        assert_eq!(
            serde_json::to_value(TriggeredFrom::SingleStep).unwrap(),
            serde_json::json!("single-step")
        );
        assert_eq!(
            serde_json::to_value(CreatedByRole::EndUser).unwrap(),
            serde_json::json!(CreatedByRole::EndUser.as_str())
        );
        assert_eq!(NodeExecutionStatus::Exception.to_string(), "exception");
    }
}
