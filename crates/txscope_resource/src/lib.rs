//! # txscope Resource
//!
//! The transactional resource contract consumed by `txscope_core`, plus an
//! in-memory implementation.
//!
//! A resource is a connection with at most one open transaction. The scoping
//! layer creates resources through a [`ResourceFactory`], drives
//! begin/commit/rollback/dispose, and installs a [`WriteGuard`] so that
//! direct calls to the native persist path can be refused.
//!
//! ## Design Principles
//!
//! - Resources know nothing about scopes or nesting
//! - All methods take `&self`; one resource is shared by a whole call chain
//! - Must be `Send + Sync` so a flow can resume on another worker
//!
//! ## Available Implementations
//!
//! - [`InMemoryResource`] - For testing and demonstrations
//!
//! ## Example
//!
//! ```rust
//! use txscope_resource::{
//!     InMemoryResourceFactory, IsolationLevel, ResourceFactory, TransactionalResource,
//! };
//!
//! let factory = InMemoryResourceFactory::default();
//! let resource = factory.create_resource().unwrap();
//! resource.begin_transaction(IsolationLevel::ReadCommitted).unwrap();
//! resource.put("heroes", "1", b"Superman".to_vec()).unwrap();
//! resource.save_changes().unwrap();
//! resource.commit().unwrap();
//! assert_eq!(factory.store().count("heroes"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod resource;

pub use error::{ResourceError, ResourceResult, WriteRejected};
pub use memory::{InMemoryResource, InMemoryResourceFactory, InMemoryStore, StoreStats};
pub use resource::{IsolationLevel, ResourceFactory, TransactionalResource, WriteGuard};
