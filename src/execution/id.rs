//! Invocation identifier type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for invocation ID generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of a single running invocation.
///
/// Every [`Process`](super::Process) gets a fresh ID, unique within the
/// process lifetime. It tags log lines and names worker threads, and is
/// displayed as `cmd-XXXXXXXX` in hexadecimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationId(u64);

impl InvocationId {
    /// Create a new unique invocation ID.
    pub fn new() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{:08x}", self.0)
    }
}
