// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared API key rotation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use vimg_core::VimgError;

/// A fixed set of API keys with a shared cursor.
///
/// Every attempt uses the key under the cursor; a failed attempt advances it.
/// Concurrent failures observed against the same key advance the cursor once.
pub struct ApiKeyRing {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

/// The key chosen for one attempt, remembered so the ring can rotate past it.
#[derive(Clone, Copy)]
pub struct KeyLease<'a> {
    index: usize,
    key: &'a str,
}

impl KeyLease<'_> {
    pub fn key(&self) -> &str {
        self.key
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl ApiKeyRing {
    /// Builds a ring from configured keys, dropping blank entries.
    pub fn new<I, S>(keys: I) -> Result<Self, VimgError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(VimgError::Config(
                "no Vertex AI API key configured (set vertex.api_keys or VIMG_VERTEX_API_KEYS)"
                    .into(),
            ));
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key to use for the next attempt.
    pub fn current(&self) -> KeyLease<'_> {
        let index = self.cursor.load(Ordering::Acquire) % self.keys.len();
        KeyLease {
            index,
            key: &self.keys[index],
        }
    }

    /// Moves past `lease` unless another caller already did.
    pub fn rotate_past(&self, lease: KeyLease<'_>) {
        if self.keys.len() < 2 {
            return;
        }
        let next = (lease.index + 1) % self.keys.len();
        let _ = self
            .cursor
            .compare_exchange(lease.index, next, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl fmt::Debug for ApiKeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyRing")
            .field("keys", &self.keys.len())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}
