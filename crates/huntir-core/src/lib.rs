//! # huntir-core
//!
//! An intermediate-representation engine for a threat-hunting query
//! language: a graph algebra over typed instructions, a segmenter that
//! splits a graph into per-interface evaluable pieces respecting a cache,
//! and a backend-agnostic recursive evaluator.
//!
//! This crate owns none of the surrounding system: no data-source clients,
//! no persistence, no query-language parser. A collaborator builds an
//! [`algebra::IrGraph`] node by node (or loads one with [`record`]), asks
//! [`segmenter::segment`] how to evaluate it against whatever it already
//! has cached, and supplies a [`backend::Backend`] so [`evaluator::Evaluator`]
//! can actually run each piece.

// =============================================================================
// MODULES
// =============================================================================

pub mod algebra;
pub mod backend;
pub mod error;
pub mod evaluator;
pub mod id;
pub mod instruction;
pub mod limits;
pub mod record;
pub mod segmenter;
pub mod store;

// =============================================================================
// RE-EXPORTS: Identity and Instructions
// =============================================================================

pub use id::NodeId;
pub use instruction::{
    Category, Instruction, IntermediateInstruction, Node, SourceInstruction,
    TransformingInstruction,
};

// =============================================================================
// RE-EXPORTS: Graph Store and Algebra
// =============================================================================

pub use algebra::IrGraph;
pub use store::{DiGraph, Store};

// =============================================================================
// RE-EXPORTS: Segmentation and Evaluation
// =============================================================================

pub use backend::Backend;
pub use evaluator::Evaluator;
pub use segmenter::{CacheProbe, EvaluableGraph, segment, CACHE_INTERFACE};

// =============================================================================
// RE-EXPORTS: Errors and Serialization
// =============================================================================

pub use error::IrError;
pub use record::{GraphRecord, LinkRecord, NodeRecord, from_json, from_record, to_json, to_record};
