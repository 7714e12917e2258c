//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::EngineConfig;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid max_concurrency: {0}. Must be between 1 and 100")]
    InvalidMaxConcurrency(usize),

    #[error("Invalid task_timeout_secs: {0}. Must be positive")]
    InvalidTaskTimeout(u64),

    #[error("Invalid iteration bounds: min_iterations ({min}) must not exceed max_iterations ({max})")]
    InvalidIterationBounds { min: u32, max: u32 },

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Invalid convergence_threshold: {0}. Must be at least 1")]
    InvalidConvergenceThreshold(u32),

    #[error("Invalid min_improvement: {0}. Must be a finite, non-negative number")]
    InvalidMinImprovement(f64),

    #[error("Invalid wall_clock_budget_secs: {0}. Must be positive")]
    InvalidWallClockBudget(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Workspace branch_prefix cannot be empty")]
    EmptyBranchPrefix,

    #[error("Workspace base_ref cannot be empty")]
    EmptyBaseRef,

    #[error("Invalid percentage bound: {name} is {value}. Must be between 0 and 100")]
    InvalidPercentage { name: &'static str, value: f64 },
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `.attractor/config.yaml` (project config)
    /// 3. `.attractor/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (`ATTRACTOR_*` prefix, highest priority)
    ///
    /// Configuration is always project-local (`pwd/.attractor/`) so multiple
    /// engines per machine can run against different projects.
    pub fn load() -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(".attractor/config.yaml"))
            .merge(Yaml::file(".attractor/local.yaml"))
            .merge(Env::prefixed("ATTRACTOR_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
        if config.scheduler.max_concurrency == 0 || config.scheduler.max_concurrency > 100 {
            return Err(ConfigError::InvalidMaxConcurrency(
                config.scheduler.max_concurrency,
            ));
        }

        if config.scheduler.task_timeout_secs == 0 {
            return Err(ConfigError::InvalidTaskTimeout(
                config.scheduler.task_timeout_secs,
            ));
        }

        let convergence = &config.convergence;
        if convergence.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(convergence.max_iterations));
        }
        if convergence.min_iterations > convergence.max_iterations {
            return Err(ConfigError::InvalidIterationBounds {
                min: convergence.min_iterations,
                max: convergence.max_iterations,
            });
        }
        if convergence.convergence_threshold == 0 {
            return Err(ConfigError::InvalidConvergenceThreshold(
                convergence.convergence_threshold,
            ));
        }
        if !convergence.min_improvement.is_finite() || convergence.min_improvement < 0.0 {
            return Err(ConfigError::InvalidMinImprovement(
                convergence.min_improvement,
            ));
        }
        if convergence.wall_clock_budget_secs == 0 {
            return Err(ConfigError::InvalidWallClockBudget(
                convergence.wall_clock_budget_secs,
            ));
        }

        for (name, value) in [
            (
                "default_criteria.min_quality_score",
                config.default_criteria.min_quality_score,
            ),
            (
                "default_criteria.min_test_coverage",
                config.default_criteria.min_test_coverage,
            ),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::InvalidPercentage { name, value });
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.workspace.branch_prefix.is_empty() {
            return Err(ConfigError::EmptyBranchPrefix);
        }
        if config.workspace.base_ref.is_empty() {
            return Err(ConfigError::EmptyBaseRef);
        }

        Ok(())
    }
}
