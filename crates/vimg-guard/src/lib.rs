// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control for vimg requests.
//!
//! [`allowed`] decides whether an origin may use the service at all;
//! [`RateLimiter`] decides whether it may do so right now.

pub mod filter;
pub mod rate_limit;

pub use filter::{FilterPolicy, allowed};
pub use rate_limit::RateLimiter;
