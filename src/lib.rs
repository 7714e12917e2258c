//! Attractor - Convergence-Driven Parallel Task Execution Engine
//!
//! Attractor takes a batch of independent work items, runs each inside an
//! isolated git worktree, iteratively evaluates quality metrics against a
//! per-item goal, and decides per item whether the work has converged,
//! diverged, must be escalated, or has timed out, all while bounding how
//! many items execute concurrently.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layering:
//!
//! - **Domain Layer** (`domain`): pure models, ports, and typed errors
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging,
//!   and the JSON file-backed entity store
//! - **Service Layer** (`services`): workspace manager, goal store,
//!   convergence loop controller, and the parallel scheduler
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use attractor::{ConfigLoader, ParallelScheduler, Task};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let scheduler = ParallelScheduler::from_config(".", &config, Arc::new(MyCollector))?;
//!
//!     let report = scheduler
//!         .execute_batch(vec![Task::new("title", "description")])
//!         .await?;
//!     println!("success rate: {:.1}%", report.summary.success_rate);
//!     scheduler.cleanup().await;
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    EngineConfig, ExecutionReport, ExecutionStatus, ExecutionTask, FeedbackLoop, Goal,
    LoopSettings, LoopStatus, MetricsSnapshot, SuccessCriteria, Task, TaskPriority, Workspace,
    WorkspaceStatus,
};
pub use domain::ports::MetricsCollector;
pub use infrastructure::{ConfigError, ConfigLoader};
pub use services::{
    ExecutionEvent, GoalStore, LoopController, ParallelScheduler, WorkspaceManager,
};
