//! # Error Taxonomy
//!
//! One kind per row of the error table in the design document. The engine
//! never retries and never silently drops work; every variant carries the
//! node-id or name that triggered it.

use crate::id::NodeId;
use thiserror::Error;

/// Errors raised by the IR engine. The CORE never panics; all errors must
/// be recoverable by the caller.
#[derive(Debug, Error)]
pub enum IrError {
    /// Lookup by id or name failed.
    #[error("instruction not found: {0}")]
    InstructionNotFound(NodeId),

    /// Symbol-table lookup for a variable missed.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// Symbol-table lookup for a reference missed (no variable with this
    /// name exists).
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// No `DataSource` with this `(interface, datasource)` pair exists.
    #[error("data source not found: {interface}://{datasource}")]
    DataSourceNotFound { interface: String, datasource: String },

    /// Invariant (4) violated: two variables share a version.
    #[error("duplicated variable: {name} (version {version})")]
    DuplicatedVariable { name: String, version: u64 },

    /// Two references with the same name coexist where only one should.
    #[error("duplicated reference: {0}")]
    DuplicatedReference(String),

    /// Two `DataSource` nodes share `(interface, datasource)`.
    #[error("duplicated data source: {interface}://{datasource}")]
    DuplicatedDataSource { interface: String, datasource: String },

    /// Invariant (3) violated: more than one zero-in-degree node shares a
    /// content-equality class.
    #[error("duplicated singleton instruction matching {0:?}")]
    DuplicatedSingletonInstruction(NodeId),

    /// A requested operation is structurally invalid for this instruction
    /// (e.g. a transform with the wrong number of predecessors).
    #[error("invalid instruction {0}: {1}")]
    InvalidInstruction(NodeId, String),

    /// `from_record` on a single instruction hit an unknown kind tag or a
    /// missing/malformed attribute.
    #[error("invalid serialized instruction (kind {kind}): {reason}")]
    InvalidSerializedInstruction { kind: String, reason: String },

    /// `from_record` on a graph document referenced a node that was never
    /// defined, or the document was otherwise malformed.
    #[error("invalid serialized graph: {0}")]
    InvalidSerializedGraph(String),

    /// An `EvaluableGraph` was constructed spanning more than one source
    /// interface — the segmenter must have mis-partitioned.
    #[error("multiple interfaces in evaluable graph: {0:?}")]
    MultiInterfacesInGraph(Vec<String>),

    /// An `EvaluableGraph` still contains an `IntermediateInstruction`.
    #[error("inevaluable instruction: {0}")]
    InevaluableInstruction(NodeId),

    /// No backend registered for the interface an `EvaluableGraph` needs.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    /// A backend's source fetch or transform failed.
    #[error("data source error: {0}")]
    DataSourceError(String),

    /// The evaluator encountered a node kind or shape it deliberately does
    /// not support (e.g. a multi-predecessor transform / join).
    #[error("not implemented: {0}")]
    NotImplemented(String),
}
