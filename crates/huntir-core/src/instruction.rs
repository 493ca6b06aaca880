//! # Instruction Model (C1)
//!
//! A tagged sum of IR node kinds. Equality between nodes is always by
//! [`NodeId`]; `has_same_content_as` is a separate, kind-specific predicate
//! used only for singleton deduplication in the graph algebra.
//!
//! Per the two-level-sum design note, the outer tag is the node's
//! [`Category`] (for fast bucketing in the segmenter), the inner tag is the
//! concrete kind.

use crate::error::IrError;
use crate::id::NodeId;
use crate::record::NodeRecord;
use serde_json::{Map, Value};

// =============================================================================
// CATEGORY
// =============================================================================

/// Coarse classification of an [`Instruction`], used by the segmenter for
/// fast bucketing without matching on the full variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Source,
    Transforming,
    Intermediate,
}

// =============================================================================
// SOURCE INSTRUCTIONS
// =============================================================================

/// A pull from an external interface. Singleton: at most one per
/// `(interface, datasource)` with no predecessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInstruction {
    /// URI form `<interface>://<datasource>`.
    DataSource { interface: String, datasource: String },
}

impl SourceInstruction {
    #[must_use]
    pub fn interface(&self) -> &str {
        match self {
            Self::DataSource { interface, .. } => interface,
        }
    }

    #[must_use]
    pub fn datasource(&self) -> &str {
        match self {
            Self::DataSource { datasource, .. } => datasource,
        }
    }
}

// =============================================================================
// TRANSFORMING INSTRUCTIONS
// =============================================================================

/// A pure transform over one upstream artifact. Must have exactly one
/// predecessor at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformingInstruction {
    /// Named, versioned handle to a transform's output. The version with the
    /// highest value for a given name is the live one.
    Variable { name: String, version: u64 },
    /// Sink marking a user-visible result, `sequence` assigned monotonically
    /// within a graph.
    Return { sequence: u64 },
    Filter { predicate: String },
    Project { columns: Vec<String> },
    /// Join-by-key; the join key is a row-level equality condition, not a
    /// second graph edge — multi-predecessor wiring is a separate concern
    /// handled by the graph store (see [`crate::algebra`]).
    Join { key: String },
    Limit { count: u64 },
    Sort { by: String, descending: bool },
}

impl TransformingInstruction {
    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }

    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return { .. })
    }

    #[must_use]
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Self::Variable { name, .. } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn variable_version(&self) -> Option<u64> {
        match self {
            Self::Variable { version, .. } => Some(*version),
            _ => None,
        }
    }

    #[must_use]
    pub fn return_sequence(&self) -> Option<u64> {
        match self {
            Self::Return { sequence } => Some(*sequence),
            _ => None,
        }
    }
}

// =============================================================================
// INTERMEDIATE INSTRUCTIONS
// =============================================================================

/// Placeholders that must be resolved before evaluation. The only variant is
/// `Reference`, which resolves to the most recent `Variable` of the same
/// name in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntermediateInstruction {
    Reference { name: String },
}

impl IntermediateInstruction {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Reference { name } => name,
        }
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

/// The closed sum of all IR node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Source(SourceInstruction),
    Transforming(TransformingInstruction),
    Intermediate(IntermediateInstruction),
}

impl Instruction {
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Source(_) => Category::Source,
            Self::Transforming(_) => Category::Transforming,
            Self::Intermediate(_) => Category::Intermediate,
        }
    }

    /// Zero-in-degree singleton candidates: `SourceInstruction`s and
    /// `Reference`s. Everything else requires a predecessor at evaluation
    /// time (invariant 7) and is never singleton-guarded.
    #[must_use]
    pub fn is_singleton_candidate(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Intermediate(_))
    }

    /// Content equality, used only for singleton deduplication. Per the
    /// design note this additionally requires kind-equality: two different
    /// kinds are never content-equal even if their string/number fields
    /// happen to coincide.
    #[must_use]
    pub fn has_same_content_as(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Source(SourceInstruction::DataSource {
                    interface: i1,
                    datasource: d1,
                }),
                Self::Source(SourceInstruction::DataSource {
                    interface: i2,
                    datasource: d2,
                }),
            ) => i1 == i2 && d1 == d2,
            (
                Self::Intermediate(IntermediateInstruction::Reference { name: n1 }),
                Self::Intermediate(IntermediateInstruction::Reference { name: n2 }),
            ) => n1 == n2,
            (
                Self::Transforming(TransformingInstruction::Variable {
                    name: n1,
                    version: v1,
                }),
                Self::Transforming(TransformingInstruction::Variable {
                    name: n2,
                    version: v2,
                }),
            ) => n1 == n2 && v1 == v2,
            (
                Self::Transforming(TransformingInstruction::Return { sequence: s1 }),
                Self::Transforming(TransformingInstruction::Return { sequence: s2 }),
            ) => s1 == s2,
            (Self::Transforming(a), Self::Transforming(b)) => a == b,
            _ => false,
        }
    }

    /// A deep copy: same attrs, no id (the caller assigns a fresh one when
    /// inserting into a graph).
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    fn kind_tag(&self) -> &'static str {
        match self {
            Self::Source(SourceInstruction::DataSource { .. }) => "DataSource",
            Self::Transforming(TransformingInstruction::Variable { .. }) => "Variable",
            Self::Transforming(TransformingInstruction::Return { .. }) => "Return",
            Self::Transforming(TransformingInstruction::Filter { .. }) => "Filter",
            Self::Transforming(TransformingInstruction::Project { .. }) => "Project",
            Self::Transforming(TransformingInstruction::Join { .. }) => "Join",
            Self::Transforming(TransformingInstruction::Limit { .. }) => "Limit",
            Self::Transforming(TransformingInstruction::Sort { .. }) => "Sort",
            Self::Intermediate(IntermediateInstruction::Reference { .. }) => "Reference",
        }
    }

    fn attrs(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        match self {
            Self::Source(SourceInstruction::DataSource { interface, datasource }) => {
                attrs.insert("interface".into(), Value::String(interface.clone()));
                attrs.insert("datasource".into(), Value::String(datasource.clone()));
            }
            Self::Transforming(TransformingInstruction::Variable { name, version }) => {
                attrs.insert("name".into(), Value::String(name.clone()));
                attrs.insert("version".into(), Value::from(*version));
            }
            Self::Transforming(TransformingInstruction::Return { sequence }) => {
                attrs.insert("sequence".into(), Value::from(*sequence));
            }
            Self::Transforming(TransformingInstruction::Filter { predicate }) => {
                attrs.insert("predicate".into(), Value::String(predicate.clone()));
            }
            Self::Transforming(TransformingInstruction::Project { columns }) => {
                attrs.insert(
                    "columns".into(),
                    Value::Array(columns.iter().cloned().map(Value::String).collect()),
                );
            }
            Self::Transforming(TransformingInstruction::Join { key }) => {
                attrs.insert("key".into(), Value::String(key.clone()));
            }
            Self::Transforming(TransformingInstruction::Limit { count }) => {
                attrs.insert("count".into(), Value::from(*count));
            }
            Self::Transforming(TransformingInstruction::Sort { by, descending }) => {
                attrs.insert("by".into(), Value::String(by.clone()));
                attrs.insert("descending".into(), Value::Bool(*descending));
            }
            Self::Intermediate(IntermediateInstruction::Reference { name }) => {
                attrs.insert("name".into(), Value::String(name.clone()));
            }
        }
        attrs
    }

    /// Serialize this instruction's kind tag and attributes into a
    /// transport record (paired with its [`NodeId`] by the caller).
    #[must_use]
    pub fn to_record(&self) -> (String, Map<String, Value>) {
        (self.kind_tag().to_string(), self.attrs())
    }

    /// Reconstruct an instruction from a kind tag and attribute map.
    /// Fails with `InvalidSerializedInstruction` when the tag is unknown or
    /// a required attribute is missing or the wrong type.
    pub fn from_record(kind: &str, attrs: &Map<String, Value>) -> Result<Self, IrError> {
        fn str_attr(attrs: &Map<String, Value>, key: &str, kind: &str) -> Result<String, IrError> {
            attrs
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| IrError::InvalidSerializedInstruction {
                    kind: kind.to_string(),
                    reason: format!("missing or non-string attribute `{key}`"),
                })
        }
        fn u64_attr(attrs: &Map<String, Value>, key: &str, kind: &str) -> Result<u64, IrError> {
            attrs
                .get(key)
                .and_then(Value::as_u64)
                .ok_or_else(|| IrError::InvalidSerializedInstruction {
                    kind: kind.to_string(),
                    reason: format!("missing or non-integer attribute `{key}`"),
                })
        }

        match kind {
            "DataSource" => Ok(Self::Source(SourceInstruction::DataSource {
                interface: str_attr(attrs, "interface", kind)?,
                datasource: str_attr(attrs, "datasource", kind)?,
            })),
            "Variable" => Ok(Self::Transforming(TransformingInstruction::Variable {
                name: str_attr(attrs, "name", kind)?,
                version: u64_attr(attrs, "version", kind)?,
            })),
            "Return" => Ok(Self::Transforming(TransformingInstruction::Return {
                sequence: u64_attr(attrs, "sequence", kind)?,
            })),
            "Filter" => Ok(Self::Transforming(TransformingInstruction::Filter {
                predicate: str_attr(attrs, "predicate", kind)?,
            })),
            "Project" => {
                let columns = attrs
                    .get("columns")
                    .and_then(Value::as_array)
                    .ok_or_else(|| IrError::InvalidSerializedInstruction {
                        kind: kind.to_string(),
                        reason: "missing or non-array attribute `columns`".to_string(),
                    })?
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| IrError::InvalidSerializedInstruction {
                        kind: kind.to_string(),
                        reason: "`columns` must be an array of strings".to_string(),
                    })?;
                Ok(Self::Transforming(TransformingInstruction::Project { columns }))
            }
            "Join" => Ok(Self::Transforming(TransformingInstruction::Join {
                key: str_attr(attrs, "key", kind)?,
            })),
            "Limit" => Ok(Self::Transforming(TransformingInstruction::Limit {
                count: u64_attr(attrs, "count", kind)?,
            })),
            "Sort" => Ok(Self::Transforming(TransformingInstruction::Sort {
                by: str_attr(attrs, "by", kind)?,
                descending: attrs
                    .get("descending")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| IrError::InvalidSerializedInstruction {
                        kind: kind.to_string(),
                        reason: "missing or non-bool attribute `descending`".to_string(),
                    })?,
            })),
            "Reference" => Ok(Self::Intermediate(IntermediateInstruction::Reference {
                name: str_attr(attrs, "name", kind)?,
            })),
            other => Err(IrError::InvalidSerializedInstruction {
                kind: other.to_string(),
                reason: "unknown instruction kind tag".to_string(),
            }),
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

/// A node in the graph: an immutable identity paired with its instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    instruction: Instruction,
}

impl Node {
    /// Construct a detached node with a fresh identity. Not yet part of any
    /// graph — see [`crate::algebra::IrGraph::add`].
    #[must_use]
    pub fn new(instruction: Instruction) -> Self {
        Self {
            id: NodeId::new(),
            instruction,
        }
    }

    /// Reconstruct a node with an explicit id, used when deserializing or
    /// when the graph algebra needs to finalize versioning before
    /// insertion.
    #[must_use]
    pub const fn with_id(id: NodeId, instruction: Instruction) -> Self {
        Self { id, instruction }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub const fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.instruction.category()
    }

    #[must_use]
    pub fn has_same_content_as(&self, other: &Self) -> bool {
        self.instruction.has_same_content_as(&other.instruction)
    }

    /// Re-assign this node's instruction in place — used only by the
    /// algebra when finalizing a `Variable`'s version or a `Return`'s
    /// sequence immediately before insertion.
    pub(crate) fn set_instruction(&mut self, instruction: Instruction) {
        self.instruction = instruction;
    }

    /// A deep copy with a fresh id and identical attrs.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self::new(self.instruction.deep_copy())
    }

    #[must_use]
    pub fn to_record(&self) -> NodeRecord {
        let (kind, attrs) = self.instruction.to_record();
        NodeRecord {
            id: self.id,
            kind,
            attrs,
        }
    }

    pub fn from_record(record: &NodeRecord) -> Result<Self, IrError> {
        let instruction = Instruction::from_record(&record.kind, &record.attrs)?;
        Ok(Self::with_id(record.id, instruction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(interface: &str, datasource: &str) -> Instruction {
        Instruction::Source(SourceInstruction::DataSource {
            interface: interface.to_string(),
            datasource: datasource.to_string(),
        })
    }

    #[test]
    fn content_equality_requires_kind_equality() {
        let a = ds("A", "t1");
        let b = Instruction::Intermediate(IntermediateInstruction::Reference {
            name: "A".to_string(),
        });
        assert!(!a.has_same_content_as(&b));
    }

    #[test]
    fn datasource_content_equality_by_interface_and_name() {
        let a = ds("A", "t1");
        let b = ds("A", "t1");
        let c = ds("A", "t2");
        assert!(a.has_same_content_as(&b));
        assert!(!a.has_same_content_as(&c));
    }

    #[test]
    fn deep_copy_assigns_a_fresh_id() {
        let node = Node::new(ds("A", "t1"));
        let copy = node.deep_copy();
        assert_ne!(node.id(), copy.id());
        assert!(node.has_same_content_as(&copy));
    }

    #[test]
    fn record_roundtrip_preserves_attrs() {
        let node = Node::new(Instruction::Transforming(TransformingInstruction::Variable {
            name: "x".to_string(),
            version: 2,
        }));
        let record = node.to_record();
        let restored = Node::from_record(&record).expect("from_record");
        assert_eq!(node, restored);
    }

    #[test]
    fn from_record_rejects_unknown_kind() {
        let record = NodeRecord {
            id: NodeId::new(),
            kind: "Bogus".to_string(),
            attrs: Map::new(),
        };
        assert!(matches!(
            Node::from_record(&record),
            Err(IrError::InvalidSerializedInstruction { .. })
        ));
    }

    #[test]
    fn from_record_rejects_missing_attribute() {
        let record = NodeRecord {
            id: NodeId::new(),
            kind: "Variable".to_string(),
            attrs: Map::new(),
        };
        assert!(matches!(
            Node::from_record(&record),
            Err(IrError::InvalidSerializedInstruction { .. })
        ));
    }
}
