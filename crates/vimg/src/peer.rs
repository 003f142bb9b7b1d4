// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vimg peer` command implementation.
//!
//! Runs the companion side of the transfer channel until SIGINT/SIGTERM.
//! Received artifacts land in `transfer.peer_storage_dir` and expire under
//! the same retention rule as generated ones.

use std::process::ExitCode;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use vimg_agent::shutdown;
use vimg_config::model::VimgConfig;
use vimg_core::VimgError;
use vimg_storage::RetentionJanitor;
use vimg_transfer::TransferPeer;

/// How long shutdown waits for the janitor.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_peer(config: &VimgConfig) -> Result<ExitCode, VimgError> {
    let cancel = shutdown::install_signal_handler();
    serve_until(config, cancel).await?;
    Ok(ExitCode::SUCCESS)
}

/// Binds `transfer.listen_address` and serves until `cancel` fires.
pub async fn serve_until(config: &VimgConfig, cancel: CancellationToken) -> Result<(), VimgError> {
    let listener = TransferPeer::bind(&config.transfer.listen_address).await?;
    let peer = TransferPeer::from_config(&config.transfer);
    info!(
        address = %config.transfer.listen_address,
        storage_dir = %peer.storage_dir().display(),
        "starting vimg peer"
    );

    let janitor = RetentionJanitor::new(
        peer.storage_dir(),
        Duration::from_secs(config.storage.sweep_interval_secs),
    )
    .spawn(cancel.child_token());

    let served = peer.serve(listener, cancel.clone()).await;
    cancel.cancel();
    shutdown::drain_tasks(vec![janitor], DRAIN_TIMEOUT).await;
    served?;
    info!("vimg peer stopped");
    Ok(())
}
