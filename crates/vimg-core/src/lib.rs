// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for vimg.
//!
//! This crate provides the request data model, the shared error type, and the
//! adapter traits that the generator, delivery channel, and host boundary
//! implement.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::VimgError;
pub use types::{
    AdapterType, ArtifactFile, DeliveryResult, Destination, FailureKind, FilterMode,
    GeneratedImage, GenerationFailure, GenerationRequest, GenerationResult, HealthStatus,
    HostRequest, HostResponse, OriginId, ReferenceImage, TransferStage, MAX_REFERENCE_IMAGES,
};

pub use traits::{ArtifactDelivery, CommandHandler, ImageGenerator, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vimg_error_variants_render() {
        let config = VimgError::Config("no keys".into());
        assert_eq!(config.to_string(), "configuration error: no keys");

        let storage = VimgError::storage("write failed", std::io::Error::other("disk full"));
        assert_eq!(storage.to_string(), "storage error: write failed");

        let timeout = VimgError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        assert!(timeout.to_string().contains("30s"));
    }

    #[test]
    fn failure_kind_display_round_trip() {
        use std::str::FromStr;

        let kinds = [
            FailureKind::FilteredOut,
            FailureKind::RateLimited,
            FailureKind::InvalidRequest,
            FailureKind::ApiError,
            FailureKind::SafetyBlocked,
            FailureKind::DecodeError,
            FailureKind::Timeout,
            FailureKind::StorageFailed,
            FailureKind::DeliveryFailed,
        ];
        for kind in kinds {
            let parsed = FailureKind::from_str(&kind.to_string()).expect("should parse back");
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn generation_failure_message_includes_kind() {
        let failure = GenerationFailure::new(FailureKind::SafetyBlocked, "IMAGE_SAFETY").with_attempts(1);
        assert_eq!(failure.to_string(), "SafetyBlocked: IMAGE_SAFETY");
        assert_eq!(failure.attempts, 1);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_generator<T: ImageGenerator>() {}
        fn _assert_delivery<T: ArtifactDelivery>() {}
        fn _assert_handler<T: CommandHandler>() {}
    }
}
