// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request data model shared across the vimg workspace.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::error::VimgError;

/// Maximum number of reference images a single request may carry.
pub const MAX_REFERENCE_IMAGES: usize = 9;

/// Identifier of the chat group or channel a request originates from.
///
/// The origin is the unit of rate limiting and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginId(pub String);

impl OriginId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OriginId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OriginId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Generator,
    Delivery,
}

/// How an origin identifier is checked against the configured list.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FilterMode {
    /// No filtering; every origin is allowed.
    #[default]
    None,
    /// Only listed origins are allowed.
    Whitelist,
    /// Listed origins are denied.
    Blacklist,
}

impl<'de> Deserialize<'de> for FilterMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse().map_err(|_| {
            serde::de::Error::unknown_variant(&raw, &["none", "whitelist", "blacklist"])
        })
    }
}

// --- Generation ---

/// A reference image attached to a generation or edit request.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// An immutable generation request.
///
/// Construction through [`GenerationRequest::new`] enforces the reference
/// image ceiling, so a value of this type is always safe to send.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    prompt: String,
    reference_images: Vec<ReferenceImage>,
    model: String,
    origin: Option<OriginId>,
}

impl GenerationRequest {
    /// Builds a request, rejecting more than [`MAX_REFERENCE_IMAGES`] images.
    ///
    /// The prompt may be empty for pure image-to-image edits.
    pub fn new(
        prompt: impl Into<String>,
        reference_images: Vec<ReferenceImage>,
        model: impl Into<String>,
        origin: Option<OriginId>,
    ) -> Result<Self, VimgError> {
        if reference_images.len() > MAX_REFERENCE_IMAGES {
            return Err(VimgError::InvalidRequest(format!(
                "at most {MAX_REFERENCE_IMAGES} reference images are allowed, got {}",
                reference_images.len()
            )));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(VimgError::InvalidRequest("model must not be empty".into()));
        }
        Ok(Self {
            prompt: prompt.into(),
            reference_images,
            model,
            origin,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn reference_images(&self) -> &[ReferenceImage] {
        &self.reference_images
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn origin(&self) -> Option<&OriginId> {
        self.origin.as_ref()
    }
}

/// Classification of a request that did not produce an image.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum FailureKind {
    FilteredOut,
    RateLimited,
    InvalidRequest,
    ApiError,
    SafetyBlocked,
    DecodeError,
    Timeout,
    StorageFailed,
    DeliveryFailed,
}

impl FailureKind {
    /// Whether another attempt could change the outcome.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ApiError | Self::DecodeError | Self::Timeout)
    }

    /// Short message suitable for showing to a chat user.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::FilteredOut => "This command is not enabled in this group.",
            Self::RateLimited => "This group has reached its usage limit, please try again later.",
            Self::InvalidRequest => "The request could not be processed, please check its images.",
            Self::ApiError => "Image generation failed, please check the API configuration and network.",
            Self::SafetyBlocked => "The request was blocked by the content safety policy.",
            Self::DecodeError => "The generated image could not be decoded, please try again.",
            Self::Timeout => "Image generation timed out, please try again later.",
            Self::StorageFailed => "The generated image could not be saved.",
            Self::DeliveryFailed => "The generated image could not be delivered.",
        }
    }
}

/// A terminal failure with its classification and diagnostic message.
///
/// `message` is diagnostic detail for logs; use
/// [`FailureKind::user_message`] for anything shown to end users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Number of API attempts made before giving up (0 when rejected upfront).
    pub attempts: u32,
}

impl GenerationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// A generated image persisted under the artifact storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl ArtifactFile {
    /// File name component of the artifact path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A successful generation: the decoded image and the artifact it was written to.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub artifact: ArtifactFile,
    pub attempts: u32,
}

/// Outcome of a generation call.
pub type GenerationResult = Result<GeneratedImage, GenerationFailure>;

// --- Delivery ---

/// Where a finished artifact should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The chat client reads the artifact straight from local disk.
    Local,
    /// A companion process at `host:port` receives the artifact.
    Remote { host: String, port: u16 },
}

impl Destination {
    /// Builds a destination from an optional remote host.
    ///
    /// An unset, blank, or `localhost` host means local delivery.
    pub fn from_remote(host: Option<&str>, port: u16) -> Self {
        match host.map(str::trim) {
            Some(h) if !h.is_empty() && !h.eq_ignore_ascii_case("localhost") => Self::Remote {
                host: h.to_string(),
                port,
            },
            _ => Self::Local,
        }
    }
}

/// The step of a remote transfer that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransferStage {
    Connect,
    Send,
    Acknowledge,
}

/// Outcome of handing an artifact to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The artifact is readable at its local path.
    Local { path: PathBuf },
    /// The peer acknowledged the artifact and reported where it lives.
    Remote { remote_path: String },
    /// The peer refused or could not be reached.
    ConnectionRefused { address: String, message: String },
    /// The transfer exceeded its deadline.
    TimedOut { address: String, stage: TransferStage },
    /// The connection dropped after it was established.
    Disconnected {
        address: String,
        stage: TransferStage,
        message: String,
    },
    /// The peer received the artifact but failed to store it.
    PeerWriteFailed { message: String },
    /// The local artifact could not be read.
    LocalUnreadable { path: PathBuf, message: String },
    /// The peer answered with something that is not a valid acknowledgement.
    Protocol { message: String },
}

impl DeliveryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Local { .. } | Self::Remote { .. })
    }

    /// Short human-readable description of a failed delivery, `None` on success.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Local { .. } | Self::Remote { .. } => None,
            Self::ConnectionRefused { address, message } => {
                Some(format!("could not connect to {address}: {message}"))
            }
            Self::TimedOut { address, stage } => {
                Some(format!("transfer to {address} timed out during {stage}"))
            }
            Self::Disconnected {
                address,
                stage,
                message,
            } => Some(format!("connection to {address} lost during {stage}: {message}")),
            Self::PeerWriteFailed { message } => Some(format!("peer failed to store file: {message}")),
            Self::LocalUnreadable { path, message } => {
                Some(format!("{} is not readable: {message}", path.display()))
            }
            Self::Protocol { message } => Some(format!("invalid peer response: {message}")),
        }
    }
}

// --- Host boundary ---

/// A parsed chat command handed to the core by the host framework.
///
/// `images` may be empty even when the user replied to an image; some chat
/// adapters do not forward quoted media.
#[derive(Debug, Clone, Default)]
pub struct HostRequest {
    /// `None` for direct messages, which skip filtering and rate limiting.
    pub origin: Option<OriginId>,
    pub prompt: String,
    pub images: Vec<ReferenceImage>,
    /// Overrides the configured model when set.
    pub model: Option<String>,
    /// Caption posted alongside the image on success.
    pub caption: Option<String>,
}

/// What the host should post back to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResponse {
    /// Post the image found at `reply_path`.
    Image {
        local_path: PathBuf,
        /// Remote path when delivery succeeded, the local path otherwise.
        reply_path: String,
        caption: Option<String>,
        /// Set when remote delivery failed and the reply degraded to the local path.
        delivery_warning: Option<String>,
    },
    /// Post a plain text reply (help output, usage hints).
    Text(String),
    /// Post a user-facing failure message.
    Failure { kind: FailureKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ReferenceImage {
        ReferenceImage::new(vec![1, 2, 3], "image/png")
    }

    #[test]
    fn request_accepts_nine_images() {
        let req = GenerationRequest::new("cat", vec![image(); 9], "model", None).unwrap();
        assert_eq!(req.reference_images().len(), 9);
    }

    #[test]
    fn request_rejects_ten_images() {
        let err = GenerationRequest::new("cat", vec![image(); 10], "model", None).unwrap_err();
        assert!(matches!(err, VimgError::InvalidRequest(_)));
    }

    #[test]
    fn request_allows_empty_prompt_for_edits() {
        let req = GenerationRequest::new("", vec![image()], "model", None).unwrap();
        assert!(req.prompt().is_empty());
    }

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::ApiError.is_retryable());
        assert!(FailureKind::DecodeError.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::SafetyBlocked.is_retryable());
        assert!(!FailureKind::FilteredOut.is_retryable());
        assert!(!FailureKind::RateLimited.is_retryable());
    }

    #[test]
    fn destination_localhost_is_local() {
        assert_eq!(Destination::from_remote(None, 3658), Destination::Local);
        assert_eq!(Destination::from_remote(Some("localhost"), 3658), Destination::Local);
        assert_eq!(Destination::from_remote(Some("  "), 3658), Destination::Local);
        assert_eq!(
            Destination::from_remote(Some("10.0.0.2"), 3658),
            Destination::Remote {
                host: "10.0.0.2".into(),
                port: 3658
            }
        );
    }

    #[test]
    fn filter_mode_parses_case_insensitively() {
        use std::str::FromStr;
        assert_eq!(FilterMode::from_str("Whitelist").unwrap(), FilterMode::Whitelist);
        assert_eq!(FilterMode::from_str("blacklist").unwrap(), FilterMode::Blacklist);
        let json = serde_json::to_string(&FilterMode::None).unwrap();
        assert_eq!(json, "\"none\"");
    }

    #[test]
    fn filter_mode_deserializes_like_it_parses() {
        let mode: FilterMode = serde_json::from_str("\"Whitelist\"").unwrap();
        assert_eq!(mode, FilterMode::Whitelist);
        let mode: FilterMode = serde_json::from_str("\" BLACKLIST \"").unwrap();
        assert_eq!(mode, FilterMode::Blacklist);
        let err = serde_json::from_str::<FilterMode>("\"greylist\"").unwrap_err();
        assert!(err.to_string().contains("unknown variant"), "got: {err}");
    }

    #[test]
    fn delivery_warning_only_on_failure() {
        let ok = DeliveryResult::Remote {
            remote_path: "/tmp/a.png".into(),
        };
        assert!(ok.is_success());
        assert!(ok.warning().is_none());

        let refused = DeliveryResult::ConnectionRefused {
            address: "peer:3658".into(),
            message: "refused".into(),
        };
        assert!(!refused.is_success());
        assert!(refused.warning().unwrap().contains("peer:3658"));
    }

    #[test]
    fn reference_image_debug_hides_bytes() {
        let debug = format!("{:?}", image());
        assert!(debug.contains("bytes: 3"));
    }
}
