//! # txscope Testkit
//!
//! Test utilities for txscope.
//!
//! This crate provides:
//! - Test fixtures over the in-memory store
//! - Property-based test generators using proptest
//! - A sample hero domain with a repository and a service layer
//!
//! ## Usage
//!
//! ```rust
//! use txscope_testkit::prelude::*;
//!
//! with_env(|env| {
//!     let outer = env.scopes.create().unwrap();
//!     let inner = env.scopes.create().unwrap();
//!     env.put("heroes", "1", "Batman");
//!     inner.complete().unwrap();
//!     inner.dispose().unwrap();
//!     outer.complete().unwrap();
//!     outer.dispose().unwrap();
//!     assert_eq!(env.count("heroes"), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod sample;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::sample::*;
}

pub use fixtures::*;
pub use generators::*;
pub use sample::*;
