//! Metrics collector port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{MetricsSnapshot, Workspace};

/// Collaborator boundary for quality measurement.
///
/// Implementations read a workspace and produce a [`MetricsSnapshot`]. The
/// engine calls `collect` repeatedly between executor passes, so collection
/// must be repeatable and must never mutate the workspace.
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Produce a metrics snapshot for the given workspace.
    async fn collect(&self, workspace: &Workspace) -> DomainResult<MetricsSnapshot>;
}
