//! `db` crate — tenant-scoped persistence for workflow node executions.
//!
//! Provides a connection pool, the persisted record type, and the
//! [`NodeExecutionRepository`] with its SQLite implementation. Transactions
//! are owned by callers; the store only executes statements on the
//! connection it is handed.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;

pub use pool::DbPool;
pub use error::DbError;
pub use models::{
    CreatedByRole, NodeExecutionRecord, NodeExecutionStatus, OrderConfig, OrderDirection,
    OrderField, TriggeredFrom,
};
pub use repository::{NodeExecutionRepository, NodeExecutionStore};
