//! Nestable transaction scopes.
//!
//! Scopes created in the same flow form a stack. The first one becomes the
//! root: it acquires a resource, begins the only real transaction and is
//! the only scope that commits, rolls back or releases it. Every scope
//! created while another is active joins it and shares its resource.
//!
//! Disposal runs in two halves. [`state`] decides, under the scope's own
//! lock, what the disposal means for the transaction; [`handle`] then
//! drives the resource synchronously or asynchronously.

mod handle;
mod state;

pub use handle::ScopeHandle;
pub(crate) use state::Scope;
