//! # Backend Interface (C6)
//!
//! The engine never talks to a data source or a dataframe library itself —
//! it only knows how to walk the graph. Materializing a `SourceInstruction`
//! or a `TransformingInstruction` is delegated to a [`Backend`] supplied by
//! the caller.

use crate::error::IrError;
use crate::id::NodeId;
use crate::instruction::{SourceInstruction, TransformingInstruction};

/// A `Backend` implementation should recognize
/// [`crate::segmenter::CACHE_INTERFACE`]: a bucket tagged `CACHE` carries no
/// `SourceInstruction` to evaluate, only already-cached boundary nodes the
/// evaluator short-circuits on before ever calling `evaluate_source`.
///
/// What a collaborator must provide so the evaluator can turn IR nodes into
/// actual query results.
///
/// `Artifact` is left abstract: the engine does not know or care whether it
/// is a dataframe, a STIX bundle, or a row count — only that artifacts can
/// be produced from sources, combined by transforms, and handed back out.
pub trait Backend {
    /// Cloning an artifact must be cheap (a dataframe handle, an `Arc`, a
    /// row count) — the evaluator clones cached artifacts out to callers
    /// rather than handing out borrows tied to its own lifetime.
    type Artifact: Clone;

    /// Materialize a `SourceInstruction`: pull from the named data source
    /// through the given interface.
    fn evaluate_source(
        &mut self,
        node_id: NodeId,
        instruction: &SourceInstruction,
    ) -> Result<Self::Artifact, IrError>;

    /// Apply a `TransformingInstruction` to its (already-evaluated)
    /// predecessor artifact.
    fn evaluate_transform(
        &mut self,
        node_id: NodeId,
        instruction: &TransformingInstruction,
        input: &Self::Artifact,
    ) -> Result<Self::Artifact, IrError>;
}
