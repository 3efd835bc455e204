//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use txscope_core::{flow, ScopeFactory, ScopeHandle, ScopeResult};
use txscope_resource::{InMemoryResource, InMemoryResourceFactory};

/// Generates a payload of the specified size.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Opens `depth` nested writable scopes in the current flow, writes
/// `writes` entries through the innermost one, then completes and disposes
/// them all. Returns the number of scopes opened.
///
/// # Errors
///
/// Returns the first scope error.
pub fn nested_commit(
    scopes: &ScopeFactory<InMemoryResourceFactory>,
    depth: usize,
    writes: usize,
    value: &[u8],
) -> ScopeResult<usize> {
    let mut handles: Vec<ScopeHandle<InMemoryResource>> = Vec::with_capacity(depth);
    for _ in 0..depth {
        handles.push(scopes.create()?);
    }
    if let Some(innermost) = handles.last() {
        let resource = innermost.resource()?;
        for i in 0..writes {
            resource.put("bench", i.to_string(), value.to_vec())?;
        }
    }
    let opened = handles.len();
    while let Some(handle) = handles.pop() {
        handle.complete()?;
        handle.dispose()?;
    }
    Ok(opened)
}

/// Runs [`nested_commit`] in a fresh flow.
///
/// # Errors
///
/// Returns the first scope error.
pub fn nested_commit_in_flow(
    scopes: &ScopeFactory<InMemoryResourceFactory>,
    depth: usize,
    writes: usize,
    value: &[u8],
) -> ScopeResult<usize> {
    flow::scope_sync(|| nested_commit(scopes, depth, writes, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_commit_persists_writes() {
        let resources = InMemoryResourceFactory::default();
        let store = resources.store().clone();
        let scopes = ScopeFactory::new(resources);

        let opened = nested_commit_in_flow(&scopes, 4, 3, &payload(8)).unwrap();
        assert_eq!(opened, 4);
        assert_eq!(store.count("bench"), 3);
        assert_eq!(scopes.stats().snapshot().joined_created, 3);
    }
}
