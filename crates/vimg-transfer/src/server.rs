// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Companion peer: receives artifacts and exposes them on its own filesystem.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vimg_config::model::TransferConfig;
use vimg_core::VimgError;

use crate::frame::{self, Ack, PROTOCOL_VERSION, TransferHeader, TransferMode};

/// Accepts one artifact per connection and acknowledges it.
#[derive(Debug, Clone)]
pub struct TransferPeer {
    storage_dir: PathBuf,
    io_timeout: Duration,
    shared_root: Option<PathBuf>,
}

impl TransferPeer {
    pub fn new(storage_dir: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            io_timeout,
            shared_root: None,
        }
    }

    /// Accepts path-mode transfers whose path resolves under `root`.
    pub fn with_shared_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.shared_root = Some(root.into());
        self
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        let peer = Self::new(
            &config.peer_storage_dir,
            Duration::from_secs(config.io_timeout_secs),
        );
        match &config.shared_root {
            Some(root) => peer.with_shared_root(root),
            None => peer,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Binds the listening socket.
    pub async fn bind(address: &str) -> Result<TcpListener, VimgError> {
        TcpListener::bind(address)
            .await
            .map_err(|e| VimgError::transfer(format!("failed to bind peer to {address}"), e))
    }

    /// Serves connections until `cancel` fires. Each connection runs on its own task.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), VimgError> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| {
                VimgError::transfer(
                    format!("failed to create {}", self.storage_dir.display()),
                    e,
                )
            })?;

        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        info!(address = %local, storage_dir = %self.storage_dir.display(), "transfer peer listening");

        let peer = Arc::new(self);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            let peer = peer.clone();
                            tokio::spawn(async move { peer.handle_connection(stream, remote).await });
                        }
                        Err(e) => warn!(error = %e, "failed to accept transfer connection"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("transfer peer received shutdown signal");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, remote: SocketAddr) {
        debug!(remote = %remote, "transfer connection accepted");
        let mut framed = Framed::new(stream, frame::codec());

        let ack = match tokio::time::timeout(self.io_timeout, self.receive(&mut framed)).await {
            Ok(Ok(path)) => {
                info!(remote = %remote, path = %path.display(), "artifact received");
                Ack::Ok {
                    path: path.display().to_string(),
                }
            }
            Ok(Err(message)) => {
                warn!(remote = %remote, error = %message, "transfer rejected");
                Ack::Error { message }
            }
            Err(_) => {
                warn!(remote = %remote, "transfer timed out");
                Ack::error("timed out waiting for the transfer")
            }
        };

        let reply = match frame::encode_json(&ack) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "failed to encode acknowledgement");
                return;
            }
        };
        let sent = tokio::time::timeout(self.io_timeout, async {
            framed.send(reply).await?;
            SinkExt::<Bytes>::flush(&mut framed).await
        })
        .await;
        if !matches!(sent, Ok(Ok(()))) {
            debug!(remote = %remote, "client went away before the acknowledgement");
        }
    }

    /// Reads one transfer and returns where the file now lives.
    async fn receive(
        &self,
        framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
    ) -> Result<PathBuf, String> {
        let header_frame = next_frame(framed, "header").await?;
        let header: TransferHeader =
            frame::decode_json(&header_frame).map_err(|e| format!("invalid header: {e}"))?;
        if header.version != PROTOCOL_VERSION {
            return Err(format!("unsupported protocol version {}", header.version));
        }

        match header.mode {
            TransferMode::Path => {
                let path = PathBuf::from(header.path.ok_or("path mode requires a path")?);
                self.resolve_shared(&path).await
            }
            TransferMode::Bytes => {
                let name = sanitize_file_name(&header.file_name)?;
                let payload = next_frame(framed, "payload").await?;
                if payload.len() as u64 != header.size {
                    return Err(format!(
                        "payload is {} bytes but header declared {}",
                        payload.len(),
                        header.size
                    ));
                }
                self.store(&name, &payload.freeze())
                    .await
                    .map_err(|e| format!("failed to store {name}: {e}"))
            }
        }
    }

    /// Resolves a path-mode path, refusing anything outside the shared root.
    ///
    /// Paths outside the root get the same answer whether or not they exist.
    async fn resolve_shared(&self, path: &Path) -> Result<PathBuf, String> {
        let root = self
            .shared_root
            .as_ref()
            .ok_or("path mode is disabled on this peer")?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|_| "shared root is not accessible".to_string())?;
        let outside = || format!("{} is outside the shared root", path.display());

        let resolved = tokio::fs::canonicalize(path).await.map_err(|_| outside())?;
        if !resolved.starts_with(&root) {
            return Err(outside());
        }
        match tokio::fs::metadata(&resolved).await {
            Ok(m) if m.is_file() => Ok(resolved),
            _ => Err(format!("{} is not a regular file", path.display())),
        }
    }

    async fn store(&self, name: &str, payload: &Bytes) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let final_path = self.storage_dir.join(name);
        let partial = self.storage_dir.join(format!(
            ".{name}.{}.partial",
            uuid::Uuid::new_v4().simple()
        ));

        let written = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            file.write_all(payload).await?;
            file.sync_all().await?;
            tokio::fs::rename(&partial, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        Ok(final_path)
    }
}

async fn next_frame(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
    what: &str,
) -> Result<bytes::BytesMut, String> {
    match framed.next().await {
        Some(Ok(frame)) => Ok(frame),
        Some(Err(e)) => Err(format!("failed to read {what}: {e}")),
        None => Err(format!("connection closed before {what}")),
    }
}

/// Reduces a client-supplied name to a safe basename.
///
/// Both `/` and `\` count as separators; empty, dot and hidden names are rejected.
pub fn sanitize_file_name(name: &str) -> Result<String, String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base.starts_with('.') || base.contains('\0') {
        return Err(format!("invalid file name `{name}`"));
    }
    Ok(base.to_string())
}
