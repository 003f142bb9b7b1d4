// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vimg sweep` command implementation.

use std::process::ExitCode;
use std::time::Duration;

use vimg_config::model::VimgConfig;
use vimg_core::VimgError;
use vimg_storage::{RETENTION, RetentionJanitor, SweepReport};

pub async fn run_sweep(config: &VimgConfig) -> Result<ExitCode, VimgError> {
    let report = sweep_once(config).await;
    println!(
        "swept {}: {} scanned, {} removed, {} kept, {} failed (retention {}m)",
        config.storage.artifact_dir,
        report.scanned,
        report.removed,
        report.kept,
        report.failed,
        RETENTION.as_secs() / 60
    );
    Ok(if report.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn sweep_once(config: &VimgConfig) -> SweepReport {
    RetentionJanitor::new(
        &config.storage.artifact_dir,
        Duration::from_secs(config.storage.sweep_interval_secs),
    )
    .sweep()
    .await
}
