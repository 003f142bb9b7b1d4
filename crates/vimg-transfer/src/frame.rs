// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire format shared by the transfer client and the peer server.
//!
//! Every frame is a 4-byte big-endian length followed by the payload. A
//! transfer is one JSON [`TransferHeader`] frame, then (in bytes mode) one raw
//! payload frame; the peer answers with one JSON [`Ack`] frame.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame either side will send or accept.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Length-prefixed codec used on both ends.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// How the artifact travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// The raw bytes follow in a second frame.
    Bytes,
    /// Only the path is sent; the peer shares the filesystem namespace.
    Path,
}

/// First frame of every transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    pub version: u32,
    pub file_name: String,
    pub mime_type: String,
    pub mode: TransferMode,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// The peer's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Ok { path: String },
    Error { message: String },
}

impl Ack {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

pub fn encode_json<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(value).map(Bytes::from)
}

pub fn decode_json<T: DeserializeOwned>(frame: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(frame)
}
