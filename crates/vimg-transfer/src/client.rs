// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the file-transfer channel.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use vimg_config::model::TransferConfig;
use vimg_core::{
    AdapterType, ArtifactDelivery, ArtifactFile, DeliveryResult, Destination, HealthStatus,
    PluginAdapter, TransferStage, VimgError,
};

use crate::frame::{self, Ack, MAX_FRAME_LENGTH, PROTOCOL_VERSION, TransferHeader, TransferMode};

/// Delivers artifacts locally or to a companion peer.
///
/// Delivery never retries; each failure mode maps to its own
/// [`DeliveryResult`] variant and the caller decides how to degrade.
#[derive(Debug, Clone)]
pub struct TransferClient {
    destination: Destination,
    connect_timeout: Duration,
    io_timeout: Duration,
    send_path_only: bool,
}

impl TransferClient {
    pub fn new(
        destination: Destination,
        connect_timeout: Duration,
        io_timeout: Duration,
        send_path_only: bool,
    ) -> Self {
        Self {
            destination,
            connect_timeout,
            io_timeout,
            send_path_only,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(
            Destination::from_remote(config.remote_host.as_deref(), config.remote_port),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.io_timeout_secs),
            config.send_path_only,
        )
    }

    /// The destination this client was configured with.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn send_remote(&self, artifact: &ArtifactFile, host: &str, port: u16) -> DeliveryResult {
        let address = format!("{host}:{port}");

        let (header, payload) = match self.prepare(artifact).await {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };
        let header = match frame::encode_json(&header) {
            Ok(bytes) => bytes,
            Err(e) => {
                return DeliveryResult::Protocol {
                    message: format!("failed to encode header: {e}"),
                }
            }
        };

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return DeliveryResult::ConnectionRefused {
                    address,
                    message: e.to_string(),
                }
            }
            Err(_) => {
                return DeliveryResult::TimedOut {
                    address,
                    stage: TransferStage::Connect,
                }
            }
        };
        debug!(address = %address, "connected to transfer peer");

        let mut framed = Framed::new(stream, frame::codec());

        let sent = tokio::time::timeout(self.io_timeout, async {
            framed.send(header).await?;
            if let Some(payload) = payload {
                framed.send(payload).await?;
            }
            SinkExt::<Bytes>::flush(&mut framed).await
        })
        .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return DeliveryResult::Disconnected {
                    address,
                    stage: TransferStage::Send,
                    message: e.to_string(),
                }
            }
            Err(_) => {
                return DeliveryResult::TimedOut {
                    address,
                    stage: TransferStage::Send,
                }
            }
        }

        let reply = match tokio::time::timeout(self.io_timeout, framed.next()).await {
            Ok(Some(Ok(reply))) => reply,
            Ok(Some(Err(e))) => {
                return DeliveryResult::Disconnected {
                    address,
                    stage: TransferStage::Acknowledge,
                    message: e.to_string(),
                }
            }
            Ok(None) => {
                return DeliveryResult::Disconnected {
                    address,
                    stage: TransferStage::Acknowledge,
                    message: "peer closed the connection without acknowledging".into(),
                }
            }
            Err(_) => {
                return DeliveryResult::TimedOut {
                    address,
                    stage: TransferStage::Acknowledge,
                }
            }
        };

        match frame::decode_json::<Ack>(&reply) {
            Ok(Ack::Ok { path }) => {
                info!(address = %address, remote_path = %path, "artifact delivered to peer");
                DeliveryResult::Remote { remote_path: path }
            }
            Ok(Ack::Error { message }) => DeliveryResult::PeerWriteFailed { message },
            Err(e) => DeliveryResult::Protocol {
                message: format!("unreadable acknowledgement: {e}"),
            },
        }
    }

    /// Builds the header and, in bytes mode, reads the payload.
    async fn prepare(
        &self,
        artifact: &ArtifactFile,
    ) -> Result<(TransferHeader, Option<Bytes>), DeliveryResult> {
        let unreadable = |message: String| DeliveryResult::LocalUnreadable {
            path: artifact.path.clone(),
            message,
        };

        if self.send_path_only {
            let metadata = tokio::fs::metadata(&artifact.path)
                .await
                .map_err(|e| unreadable(e.to_string()))?;
            let header = TransferHeader {
                version: PROTOCOL_VERSION,
                file_name: artifact.file_name(),
                mime_type: artifact.mime_type.clone(),
                mode: TransferMode::Path,
                size: metadata.len(),
                path: Some(artifact.path.display().to_string()),
            };
            return Ok((header, None));
        }

        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if bytes.len() > MAX_FRAME_LENGTH {
            return Err(DeliveryResult::Protocol {
                message: format!(
                    "artifact is {} bytes, larger than the {MAX_FRAME_LENGTH} byte frame limit",
                    bytes.len()
                ),
            });
        }
        let header = TransferHeader {
            version: PROTOCOL_VERSION,
            file_name: artifact.file_name(),
            mime_type: artifact.mime_type.clone(),
            mode: TransferMode::Bytes,
            size: bytes.len() as u64,
            path: None,
        };
        Ok((header, Some(Bytes::from(bytes))))
    }
}

/// Confirms the artifact can be opened for reading.
async fn check_readable(artifact: &ArtifactFile) -> Result<(), String> {
    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| e.to_string())?;
    let metadata = file.metadata().await.map_err(|e| e.to_string())?;
    if !metadata.is_file() {
        return Err("not a regular file".into());
    }
    Ok(())
}

#[async_trait]
impl PluginAdapter for TransferClient {
    fn name(&self) -> &str {
        "transfer"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Delivery
    }

    async fn health_check(&self) -> Result<HealthStatus, VimgError> {
        let Destination::Remote { host, port } = &self.destination else {
            return Ok(HealthStatus::Healthy);
        };
        let address = format!("{host}:{port}");
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_)) => Ok(HealthStatus::Healthy),
            Ok(Err(e)) => Ok(HealthStatus::Degraded(format!(
                "peer {address} unreachable: {e}"
            ))),
            Err(_) => Ok(HealthStatus::Degraded(format!(
                "peer {address} did not accept a connection within {:?}",
                self.connect_timeout
            ))),
        }
    }
}

#[async_trait]
impl ArtifactDelivery for TransferClient {
    async fn deliver(&self, artifact: &ArtifactFile, destination: &Destination) -> DeliveryResult {
        if let Err(message) = check_readable(artifact).await {
            warn!(path = %artifact.path.display(), error = %message, "artifact is not readable");
            return DeliveryResult::LocalUnreadable {
                path: artifact.path.clone(),
                message,
            };
        }

        let result = match destination {
            Destination::Local => DeliveryResult::Local {
                path: artifact.path.clone(),
            },
            Destination::Remote { host, port } => self.send_remote(artifact, host, *port).await,
        };

        if let Some(warning) = result.warning() {
            warn!(path = %artifact.path.display(), warning = %warning, "remote delivery failed");
        }
        result
    }
}
