//! `node-executions` CLI entry-point.
//!
//! Available sub-commands:
//! - `init-schema` — create the node execution table if it is missing.
//! - `show`        — print one execution by its node execution id.
//! - `list`        — print every execution of a workflow run.
//! - `running`     — print the running executions of a workflow run.
//! - `delete`      — delete one execution by primary key.
//!
//! Every command runs inside a single transaction. Only `delete` commits it.

use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::{Sqlite, Transaction};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{NodeExecutionRepository, NodeExecutionStore, OrderConfig, OrderDirection};

#[derive(Parser)]
#[command(
    name = "node-executions",
    about = "Inspect and maintain tenant-scoped workflow node executions",
    version
)]
struct Cli {
    /// sqlx SQLite connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:node_executions.db?mode=rwc")]
    database_url: String,

    /// Pool ceiling.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Tenant every command is scoped to.
    #[arg(long, env = "TENANT_ID", global = true)]
    tenant: Option<String>,

    /// Optional application scope within the tenant.
    #[arg(long, env = "APP_ID", global = true)]
    app: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the node execution table and indexes if they do not exist.
    InitSchema,
    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that run against a tenant-scoped store.
#[derive(Subcommand)]
enum StoreCommand {
    /// Print one execution by its node execution id.
    Show { node_execution_id: String },
    /// Print every execution of a workflow run.
    List {
        workflow_run_id: String,
        /// Comma-separated record fields, primary key first. Unknown names are ignored.
        #[arg(long, value_delimiter = ',')]
        order_by: Vec<String>,
        /// `asc` or `desc`.
        #[arg(long, default_value = "asc")]
        direction: String,
    },
    /// Print the running executions of a workflow run.
    Running { workflow_run_id: String },
    /// Delete one execution by primary key. Unknown ids are ignored.
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let pool = db::pool::create_pool(&cli.database_url, cli.max_connections)
        .await
        .context("failed to connect to database")?;

    let command = match cli.command {
        Command::InitSchema => {
            db::pool::init_schema(&pool).await.context("schema setup failed")?;
            info!("Schema ready at {}", cli.database_url);
            return Ok(());
        }
        Command::Store(command) => command,
    };

    let tenant = cli
        .tenant
        .filter(|tenant| !tenant.is_empty())
        .context("--tenant (or TENANT_ID) is required")?;

    let tx = pool.begin().await?;
    run(tx, &tenant, cli.app, command, &mut std::io::stdout()).await
}

/// Run one store command inside `tx`, writing JSON results to `out`.
///
/// `delete` commits `tx`; every other command drops it, which rolls back.
async fn run(
    mut tx: Transaction<'_, Sqlite>,
    tenant: &str,
    app: Option<String>,
    command: StoreCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut store = NodeExecutionStore::new(&mut *tx, tenant, app);

    match command {
        StoreCommand::Show { node_execution_id } => {
            let execution = store.get_by_node_execution_id(&node_execution_id).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&execution)?)?;
        }
        StoreCommand::List { workflow_run_id, order_by, direction } => {
            let order = OrderConfig::new(order_by, OrderDirection::parse(&direction));
            let executions = store.get_by_workflow_run(&workflow_run_id, Some(&order)).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&executions)?)?;
        }
        StoreCommand::Running { workflow_run_id } => {
            let executions = store.get_running_executions(&workflow_run_id).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&executions)?)?;
        }
        StoreCommand::Delete { id } => {
            store.delete(id).await?;
            tx.commit().await?;
            info!("Delete of {id} committed for tenant '{tenant}'");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use db::NodeExecutionRecord;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn list_parses_order_fields_and_direction() {
        let cli = Cli::parse_from([
            "node-executions",
            "--tenant",
            "t-1",
            "list",
            "run-1",
            "--order-by",
            "index,created_at",
            "--direction",
            "desc",
        ]);

        assert_eq!(cli.tenant.as_deref(), Some("t-1"));
        match cli.command {
            Command::Store(StoreCommand::List { workflow_run_id, order_by, direction }) => {
                assert_eq!(workflow_run_id, "run-1");
                assert_eq!(order_by, vec!["index", "created_at"]);
                assert_eq!(OrderDirection::parse(&direction), OrderDirection::Desc);
            }
            _ => panic!("expected the list command"),
        }
    }

    #[test]
    fn tenant_flag_is_accepted_after_the_subcommand() {
        let cli = Cli::parse_from(["node-executions", "running", "run-9", "--tenant", "t-2", "--app", "a-1"]);

        assert_eq!(cli.tenant.as_deref(), Some("t-2"));
        assert_eq!(cli.app.as_deref(), Some("a-1"));
        assert!(matches!(
            cli.command,
            Command::Store(StoreCommand::Running { ref workflow_run_id }) if workflow_run_id == "run-9"
        ));
    }

    async fn pool_with_schema() -> db::DbPool {
        let pool = db::pool::create_pool("sqlite::memory:", 1).await.expect("pool");
        db::pool::init_schema(&pool).await.expect("schema");
        pool
    }

    fn running(node_execution_id: &str) -> NodeExecutionRecord {
        let mut execution = NodeExecutionRecord::new(node_execution_id, "llm", "llm");
        execution.workflow_id = "wf-1".into();
        execution.workflow_run_id = Some("run-1".into());
        execution.created_by = "user-1".into();
        execution
    }

    async fn find(pool: &db::DbPool, node_execution_id: &str) -> Option<NodeExecutionRecord> {
        let mut conn = pool.acquire().await.unwrap();
        NodeExecutionStore::new(&mut *conn, "t-1", None)
            .get_by_node_execution_id(node_execution_id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn read_commands_roll_back_their_transaction() {
        let pool = pool_with_schema().await;

        let mut tx = pool.begin().await.unwrap();
        NodeExecutionStore::new(&mut *tx, "t-1", None)
            .save(&mut running("ne-1"))
            .await
            .unwrap();

        let mut out = Vec::new();
        let show = StoreCommand::Show { node_execution_id: "ne-1".into() };
        run(tx, "t-1", None, show, &mut out).await.unwrap();

        // visible while the command ran, gone once its transaction was dropped
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("\"node_execution_id\": \"ne-1\""), "{printed}");
        assert!(find(&pool, "ne-1").await.is_none());
    }

    #[tokio::test]
    async fn delete_commits_its_transaction() {
        let pool = pool_with_schema().await;

        let mut doomed = running("ne-1");
        let mut tx = pool.begin().await.unwrap();
        NodeExecutionStore::new(&mut *tx, "t-1", None)
            .save(&mut doomed)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        NodeExecutionStore::new(&mut *tx, "t-1", None)
            .save(&mut running("ne-2"))
            .await
            .unwrap();

        let mut out = Vec::new();
        run(tx, "t-1", None, StoreCommand::Delete { id: doomed.id }, &mut out)
            .await
            .unwrap();

        assert!(out.is_empty());
        assert!(find(&pool, "ne-1").await.is_none());
        // the rest of the transaction was committed with the delete
        assert!(find(&pool, "ne-2").await.is_some());
    }
}
