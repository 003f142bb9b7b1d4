// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Artifact storage for generated images.
//!
//! [`ArtifactStore`] persists images with write-then-rename so a file is only
//! visible under its final name once complete. [`RetentionJanitor`] reclaims
//! artifacts older than [`RETENTION`] on a fixed interval.

pub mod janitor;
pub mod store;

pub use janitor::{RetentionJanitor, SweepReport, RETENTION};
pub use store::{extension_for_mime, ArtifactStore, ARTIFACT_PREFIX, PARTIAL_SUFFIX};
