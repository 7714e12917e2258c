//! Task domain model.
//!
//! Tasks are the immutable work items submitted to the scheduler in a batch.
//! The caller guarantees ids are unique within one batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A unit of work submitted to the engine.
///
/// Immutable once submitted. Declared dependencies are carried through to the
/// report for the caller's benefit; admission order within a batch is strictly
/// FIFO and never reordered by dependency or priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (caller-guaranteed unique within a batch)
    pub id: Uuid,
    /// Short human-readable title
    pub title: String,
    /// Detailed description of the work
    pub description: String,
    /// Ids of tasks this task declares a dependency on
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Priority level
    #[serde(default)]
    pub priority: TaskPriority,
    /// When this task was submitted
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with a fresh id.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            dependencies: Vec::new(),
            priority: TaskPriority::default(),
            submitted_at: Utc::now(),
        }
    }

    /// Use a caller-supplied id instead of a generated one.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the priority of this task.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Declare a dependency on another task.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        self.dependencies.push(task_id);
        self
    }

    /// Short id used in branch and directory names.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    /// Validate this task.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.title.len() > 255 {
            return Err("Task title cannot exceed 255 characters".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("Fix the parser", "Handle empty input");
        assert_eq!(task.title, "Fix the parser");
        assert_eq!(task.priority, TaskPriority::Normal);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_task_builder_chain() {
        let dep = Uuid::new_v4();
        let task = Task::new("Title", "Description")
            .with_priority(TaskPriority::High)
            .with_dependency(dep);
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.dependencies, vec![dep]);
    }

    #[test]
    fn test_short_id_length() {
        let task = Task::new("T", "D");
        assert_eq!(task.short_id().len(), 8);
    }

    #[test]
    fn test_task_validation() {
        assert!(Task::new("", "empty title").validate().is_err());
        assert!(Task::new("Valid", "ok").validate().is_ok());
    }

    #[test]
    fn test_priority_round_trip() {
        assert_eq!(TaskPriority::from_str("critical"), Some(TaskPriority::Critical));
        assert_eq!(TaskPriority::from_str("bogus"), None);
        assert_eq!(TaskPriority::High.as_str(), "high");
    }
}
