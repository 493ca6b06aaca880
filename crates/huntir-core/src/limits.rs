//! # Bounded Constants
//!
//! The engine performs no I/O and has no internal timer, but several of its
//! recursive operations must still be bounded so that a malformed or
//! adversarial graph cannot exhaust memory or the stack. These are the
//! engine's only "configuration" — there is no config loader; that is a
//! collaborator's concern.

/// Maximum recursion depth for the evaluator and for ancestor/descendant
/// walks in the graph store. A real hunt graph is tens to low hundreds of
/// nodes deep at most; this bound exists to turn a cyclic or pathologically
/// deep graph into a surfaced error instead of a stack overflow.
pub const MAX_TRAVERSAL_DEPTH: usize = 10_000;

/// Maximum number of nodes accepted by [`crate::record::from_record`] in a
/// single document. Prevents memory exhaustion from a malicious or
/// corrupted transport document before any node is constructed.
pub const MAX_IMPORT_NODE_COUNT: usize = 1_000_000;

/// Maximum number of links accepted by [`crate::record::from_record`] in a
/// single document.
pub const MAX_IMPORT_LINK_COUNT: usize = 10_000_000;
