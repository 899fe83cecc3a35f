//! Common types, traits, and utilities for convcheck
//!
//! This crate provides the vocabulary shared by the tester and the code it
//! drives: convolution geometry, algorithm/activation selectors, the provider
//! traits for the implementation under test and the reference, error types,
//! and environment configuration.

pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::*;
pub use error::*;
pub use provider::*;
pub use types::*;
