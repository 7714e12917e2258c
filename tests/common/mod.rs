//! Shared fixtures for integration tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use attractor::domain::models::{MetricsSnapshot, Workspace};
use attractor::{DomainError, DomainResult, MetricsCollector};

/// Run a git command in `repo`, asserting success.
pub fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .current_dir(repo)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("git invocation");
    assert!(status.success(), "git {args:?} failed");
}

/// Initialize a throwaway git repository with one commit on `main`.
pub fn init_test_repo() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let repo = dir.path();
    git(repo, &["init", "-b", "main"]);
    git(repo, &["config", "user.email", "test@example.com"]);
    git(repo, &["config", "user.name", "Test"]);
    std::fs::write(repo.join("README.md"), "# fixture\n").unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-m", "initial"]);
    dir
}

/// A snapshot that clears the default success criteria.
pub fn passing_metrics() -> MetricsSnapshot {
    MetricsSnapshot {
        lint_errors: 0,
        type_errors: 0,
        security_issues: 0,
        quality_score: 92.0,
        test_coverage: 88.0,
        tests_passed: 7,
    }
}

/// Collector that improves per task on every call and converges after
/// `calls_to_pass` collections, while recording the peak number of
/// concurrent `collect` calls it observed.
pub struct ImprovingCollector {
    calls_to_pass: u32,
    delay: Duration,
    current: AtomicUsize,
    max_observed: AtomicUsize,
    calls: Mutex<HashMap<Uuid, u32>>,
}

impl ImprovingCollector {
    pub fn new(calls_to_pass: u32, delay: Duration) -> Self {
        Self {
            calls_to_pass,
            delay,
            current: AtomicUsize::new(0),
            max_observed: AtomicUsize::new(0),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Peak number of concurrent collections observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsCollector for ImprovingCollector {
    async fn collect(&self, workspace: &Workspace) -> DomainResult<MetricsSnapshot> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(workspace.task_id).or_insert(0);
            *entry += 1;
            *entry
        };

        if call >= self.calls_to_pass {
            Ok(passing_metrics())
        } else {
            // Below the bar, but improving every call so the loop never
            // diagnoses divergence.
            Ok(MetricsSnapshot {
                lint_errors: 3_u32.saturating_sub(call),
                type_errors: 0,
                security_issues: 0,
                quality_score: 40.0 + 15.0 * f64::from(call),
                test_coverage: 30.0 + 10.0 * f64::from(call),
                tests_passed: call,
            })
        }
    }
}

/// Collector that blocks far past any test deadline.
pub struct StalledCollector;

#[async_trait]
impl MetricsCollector for StalledCollector {
    async fn collect(&self, _workspace: &Workspace) -> DomainResult<MetricsSnapshot> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(DomainError::CollectionFailed("unreachable".to_string()))
    }
}
