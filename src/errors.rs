//! Error Types
//!
//! This module defines the error type shared by the animation and skeleton
//! modules.
//!
//! # Overview
//!
//! [`AnimationError`] distinguishes four failure classes:
//! - duplicate names or handles on creation
//! - lookups that find nothing (names, handles, indices)
//! - structurally invalid arguments (limits, incompatible skeletons)
//! - internal inconsistencies
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, AnimationError>`.
//!
//! ```rust,ignore
//! use sinew::errors::{AnimationError, Result};
//!
//! fn find(skeleton: &sinew::Skeleton) -> Result<u16> {
//!     Ok(skeleton.bone_by_name("Spine")?.handle())
//! }
//! ```

use thiserror::Error;

/// The error type for animation, skeleton and state-set operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnimationError {
    // ========================================================================
    // Creation Errors
    // ========================================================================
    /// An item with the same name or handle already exists.
    #[error("Duplicate item: {0}")]
    DuplicateItem(String),

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// The requested name, handle or index does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    // ========================================================================
    // Argument Errors
    // ========================================================================
    /// An argument violates a structural constraint.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    // ========================================================================
    // Internal Errors
    // ========================================================================
    /// Internal state is inconsistent.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Alias for `Result<T, AnimationError>`.
pub type Result<T> = std::result::Result<T, AnimationError>;
