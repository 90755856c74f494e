#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![deny(unknown_lints)]
//! # Embedtor Test Utilities
//!
//! Commonly useful helpers for testing the embedtor codebase.
//!
//! ## Modules
//!
//! - `enums` - Unpack enum variants in assertions
//! - `paths` - Temporary paths for tests involving files
//! - `streams` - Collect from channels with timeouts

pub mod enums;
pub mod paths;
pub mod streams;
