//! # txscope Core
//!
//! Ambient, nestable transaction scopes.
//!
//! This crate provides:
//! - Flow-local storage that follows one logical call chain across `.await`
//! - A persistent per-flow stack of active scopes
//! - The scope state machine: join or become root, complete, dispose
//! - A guard refusing persists that bypass completion
//! - Ambient resource lookup for repositories and services
//!
//! ## Example
//!
//! ```rust
//! use txscope_core::{flow, ResourceAccessor, ScopeError, ScopeFactory, ScopeOptions};
//! use txscope_resource::{InMemoryResource, InMemoryResourceFactory};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let resources = InMemoryResourceFactory::default();
//! let store = resources.store().clone();
//! let scopes = ScopeFactory::new(resources);
//!
//! scopes
//!     .execute(ScopeOptions::default(), || async {
//!         let resource = ResourceAccessor::current::<InMemoryResource>()?;
//!         resource.put("heroes", "1", b"Superman".to_vec())?;
//!         Ok::<_, ScopeError>(())
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(store.count("heroes"), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod ambient;
mod config;
mod error;
mod factory;
pub mod flow;
mod scope;
mod stats;
mod types;

pub use accessor::ResourceAccessor;
pub use config::ScopeOptions;
pub use error::{DirectWriteViolation, ScopeError, ScopeResult};
pub use factory::ScopeFactory;
pub use scope::ScopeHandle;
pub use stats::{ScopeStats, ScopeStatsSnapshot};
pub use types::{FlowToken, ScopeId, ScopeState};

pub use txscope_resource::{IsolationLevel, ResourceFactory, TransactionalResource};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
