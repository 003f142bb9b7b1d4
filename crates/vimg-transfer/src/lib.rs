// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-transfer channel for vimg.
//!
//! [`TransferClient`] implements [`ArtifactDelivery`](vimg_core::ArtifactDelivery)
//! for local and remote destinations; [`TransferPeer`] is the companion
//! process that receives remote transfers.

pub mod client;
pub mod frame;
pub mod server;

pub use client::TransferClient;
pub use frame::{Ack, TransferHeader, TransferMode};
pub use server::{TransferPeer, sanitize_file_name};
