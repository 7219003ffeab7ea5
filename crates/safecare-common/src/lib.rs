//! SafeCare Common - Shared types for the SafeCare platform core
//!
//! This crate provides the primitives every engine crate builds on:
//! - Principal identifiers
//! - The engine error taxonomy
//! - Lock-free counters for observability

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::*;

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Opaque handle for the acting principal (account, practice, device group)
///
/// Collaborators hold this handle and nothing else; entitlement and usage
/// state behind it is owned exclusively by the engine.
pub type PrincipalId = Uuid;

/// High-performance counter for lock-free metrics
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
