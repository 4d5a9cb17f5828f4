//! SFS Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, and utilities
//! used across all SFS components.

pub mod config;
pub mod digest;
pub mod error;
pub mod types;

pub use digest::{DigestAlgorithm, DigestCalculator, DigestError};
pub use error::{Error, Result};
pub use types::*;
