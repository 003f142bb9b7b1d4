// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vimg check` command implementation.
//!
//! Runs diagnostic checks against the loaded configuration: API keys,
//! artifact storage, adapter health and the transfer settings.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use vimg_agent::build_orchestrator;
use vimg_config::model::VimgConfig;
use vimg_core::{Destination, FilterMode, HealthStatus, VimgError};
use vimg_storage::ArtifactStore;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Usable, but something will degrade at runtime.
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    /// Human-readable message.
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `vimg check` command. With `--plain`, disables colored output.
pub async fn run_check(config: &VimgConfig, plain: bool) -> Result<ExitCode, VimgError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = run_checks(config).await;

    println!();
    println!("  vimg check");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Pass => {}
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
        }
        println!("{}", format_line(result, use_color));
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(if fail_count > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal().to_string()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow().to_string()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

async fn run_checks(config: &VimgConfig) -> Vec<CheckResult> {
    let mut results = vec![
        check_guard(config),
        check_storage(&config.storage.artifact_dir).await,
        check_listen_address(&config.transfer.listen_address),
    ];
    results.extend(check_adapters(config).await);
    results
}

/// Summarizes the filter and rate limit so surprises show up before deploy.
fn check_guard(config: &VimgConfig) -> CheckResult {
    let start = Instant::now();
    let guard = &config.guard;
    let filter = match guard.group_filter_mode {
        FilterMode::None => "no filter".to_string(),
        mode => format!("{mode} of {} origin(s)", guard.group_filter_list.len()),
    };
    let limit = if guard.rate_limit_max_calls_per_group == 0 {
        "rate limiting disabled".to_string()
    } else {
        format!(
            "{} call(s) per {}s",
            guard.rate_limit_max_calls_per_group, guard.rate_limit_period_seconds
        )
    };

    let status = if guard.group_filter_mode == FilterMode::Whitelist
        && guard.group_filter_list.is_empty()
    {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    };
    CheckResult::new("Guard", status, format!("{filter}, {limit}"), start)
}

/// Check the artifact directory can be created and written.
async fn check_storage(artifact_dir: &str) -> CheckResult {
    let start = Instant::now();
    let store = ArtifactStore::new(artifact_dir);
    let probe = match store.ensure_root().await {
        Ok(()) => store.probe_writable().await,
        Err(e) => Err(e),
    };
    match probe {
        Ok(()) => CheckResult::new("Artifact storage", CheckStatus::Pass, artifact_dir, start),
        Err(e) => CheckResult::new("Artifact storage", CheckStatus::Fail, e.to_string(), start),
    }
}

fn check_listen_address(address: &str) -> CheckResult {
    let start = Instant::now();
    match address.parse::<SocketAddr>() {
        Ok(_) => CheckResult::new("Peer listen address", CheckStatus::Pass, address, start),
        Err(e) => CheckResult::new(
            "Peer listen address",
            CheckStatus::Warn,
            format!("{address} is not a socket address ({e}); `vimg peer` may fail to bind"),
            start,
        ),
    }
}

/// Builds the production adapters and runs their health checks.
async fn check_adapters(config: &VimgConfig) -> Vec<CheckResult> {
    let start = Instant::now();
    let orchestrator = match build_orchestrator(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => return vec![CheckResult::new("Vertex AI", CheckStatus::Fail, e.to_string(), start)],
    };

    let destination = match orchestrator.destination() {
        Destination::Local => "local delivery".to_string(),
        Destination::Remote { host, port } => format!("remote peer {host}:{port}"),
    };
    let mut results = vec![CheckResult::new(
        "Vertex AI",
        CheckStatus::Pass,
        format!(
            "{} key(s), model {}, {destination}",
            config.vertex.api_keys.len(),
            orchestrator.model()
        ),
        start,
    )];

    for (name, health) in orchestrator.health_checks().await {
        let (status, message) = match health {
            Ok(HealthStatus::Healthy) => (CheckStatus::Pass, "healthy".to_string()),
            Ok(HealthStatus::Degraded(reason)) => (CheckStatus::Warn, reason),
            Ok(HealthStatus::Unhealthy(reason)) => (CheckStatus::Fail, reason),
            Err(e) => (CheckStatus::Fail, e.to_string()),
        };
        results.push(CheckResult::new(&name, status, message, start));
    }
    results
}
