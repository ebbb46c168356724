//=========================================================================
// Context Identity
//=========================================================================
//
// Every context instance gets a process-unique id. Handles produced by a
// context carry that id so they can be validated against the context
// they are handed back to.
//
//=========================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

//=== ContextId ===========================================================

/// Process-unique identifier of a context instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates the next unused id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//=== ContextBound ========================================================

/// Implemented by resources that belong to one specific context.
pub trait ContextBound {
    /// The id of the context that produced this resource.
    fn context_id(&self) -> ContextId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
