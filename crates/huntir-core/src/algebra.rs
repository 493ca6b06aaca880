//! # Graph Algebra (C3)
//!
//! Layers symbol-table semantics — singleton dedup, variable versioning,
//! reference dereferencing, and graph union — on top of the raw [`Store`]
//! primitives from [`crate::store`].

use crate::error::IrError;
use crate::id::NodeId;
use crate::instruction::{Category, IntermediateInstruction, Instruction, Node, TransformingInstruction};
use crate::record::{self, GraphRecord};
use crate::store::{DiGraph, Store};
use std::collections::BTreeMap;

/// A canonical IR graph: a [`DiGraph`] plus the symbol-table rules that
/// keep it a valid SSA-like program fragment.
#[derive(Debug, Clone, Default)]
pub struct IrGraph {
    store: DiGraph,
}

impl IrGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying graph store, for callers (segmenter, evaluator) that
    /// only need the raw graph primitives.
    #[must_use]
    pub const fn store(&self) -> &DiGraph {
        &self.store
    }

    // -------------------------------------------------------------------
    // add
    // -------------------------------------------------------------------

    /// Add a freshly-constructed instruction to the graph. Dispatches by
    /// kind:
    /// - a `TransformingInstruction` with a `predecessor` has its version
    ///   (`Variable`) or sequence (`Return`) finalized, then is wired to
    ///   `predecessor`;
    /// - a `Reference` with `deref` set resolves against the live symbol
    ///   table, returning the existing variable instead of inserting;
    /// - a `SourceInstruction` or un-deref'd `Reference` goes through the
    ///   singleton guard;
    /// - anything else (a root transform, pre-wiring) is inserted plainly.
    ///
    /// Returns the id of the node that now represents `instruction` in the
    /// graph — which may be a pre-existing node, not a new one.
    pub fn add(
        &mut self,
        instruction: Instruction,
        predecessor: Option<NodeId>,
        deref: bool,
    ) -> Result<NodeId, IrError> {
        self.add_node(Node::new(instruction), predecessor, deref)
    }

    fn add_node(
        &mut self,
        mut node: Node,
        predecessor: Option<NodeId>,
        deref: bool,
    ) -> Result<NodeId, IrError> {
        if self.store.contains_node(node.id()) {
            return Ok(node.id());
        }

        match (node.category(), predecessor) {
            (Category::Transforming, Some(pred)) => {
                if !self.store.contains_node(pred) {
                    return Err(IrError::InstructionNotFound(pred));
                }
                match node.instruction() {
                    Instruction::Transforming(TransformingInstruction::Variable { name, .. }) => {
                        let name = name.clone();
                        let version = self.live_version(&name).map_or(0, |v| v.saturating_add(1));
                        node.set_instruction(Instruction::Transforming(
                            TransformingInstruction::Variable { name, version },
                        ));
                    }
                    Instruction::Transforming(TransformingInstruction::Return { .. }) => {
                        let sequence =
                            self.max_return_sequence().map_or(0, |s| s.saturating_add(1));
                        node.set_instruction(Instruction::Transforming(
                            TransformingInstruction::Return { sequence },
                        ));
                    }
                    _ => {}
                }
                let id = node.id();
                self.store.add_node(node);
                self.store.add_edge(pred, id)?;
                Ok(id)
            }
            (Category::Intermediate, _) if deref => {
                let name = match node.instruction() {
                    Instruction::Intermediate(IntermediateInstruction::Reference { name }) => {
                        name.clone()
                    }
                    _ => unreachable!("Intermediate category is always Reference"),
                };
                if let Some(live_id) = self.live_variable_id(&name) {
                    Ok(live_id)
                } else {
                    self.add_singleton(node)
                }
            }
            (Category::Source | Category::Intermediate, _) => self.add_singleton(node),
            _ => {
                let id = node.id();
                self.store.add_node(node);
                Ok(id)
            }
        }
    }

    /// Wire an additional predecessor onto an already-inserted
    /// `TransformingInstruction` — the second (and further) input edges of a
    /// `Join`, which `add` itself only ever wires singly. The data model
    /// permits multi-predecessor transforms; only the evaluator declines to
    /// run them.
    pub fn add_join_predecessor(&mut self, predecessor: NodeId, node: NodeId) -> Result<(), IrError> {
        self.store.add_edge(predecessor, node)
    }

    fn add_singleton(&mut self, node: Node) -> Result<NodeId, IrError> {
        let matches: Vec<NodeId> = self
            .store
            .nodes()
            .into_iter()
            .filter(|existing| {
                self.store.in_degree(existing.id()) == 0 && existing.has_same_content_as(&node)
            })
            .map(Node::id)
            .collect();

        match matches.as_slice() {
            [] => {
                let id = node.id();
                self.store.add_node(node);
                Ok(id)
            }
            [only] => Ok(*only),
            _ => Err(IrError::DuplicatedSingletonInstruction(node.id())),
        }
    }

    // -------------------------------------------------------------------
    // union
    // -------------------------------------------------------------------

    /// Merge `other` into `self`. `other` is left unmodified.
    ///
    /// Left-biased: references in `other` deref against `self`'s symbol
    /// table *as it stood before the merge*, so variables imported later
    /// from `other` never retroactively capture them.
    pub fn union(&mut self, other: &Self) -> Result<(), IrError> {
        let live_versions = self.all_live_versions();
        let sequence_shift = self.max_return_sequence().map_or(0, |s| s.saturating_add(1));

        let mut shifted: BTreeMap<NodeId, Node> = BTreeMap::new();
        for node in other.store.nodes() {
            let mut node = node.clone();
            match node.instruction().clone() {
                Instruction::Transforming(TransformingInstruction::Variable { name, version }) => {
                    if let Some(&live) = live_versions.get(&name) {
                        let shifted_version = version.saturating_add(live).saturating_add(1);
                        node.set_instruction(Instruction::Transforming(
                            TransformingInstruction::Variable {
                                name,
                                version: shifted_version,
                            },
                        ));
                    }
                }
                Instruction::Transforming(TransformingInstruction::Return { sequence }) => {
                    node.set_instruction(Instruction::Transforming(TransformingInstruction::Return {
                        sequence: sequence.saturating_add(sequence_shift),
                    }));
                }
                _ => {}
            }
            shifted.insert(node.id(), node);
        }

        let mut old_to_new: BTreeMap<NodeId, NodeId> = BTreeMap::new();

        // References first, against self's pre-merge symbol table.
        let (references, rest): (Vec<_>, Vec<_>) = shifted
            .keys()
            .copied()
            .partition(|id| matches!(shifted[id].instruction(), Instruction::Intermediate(_)));

        for old_id in references {
            let node = shifted[&old_id].clone();
            let new_id = self.add_node(node, None, true)?;
            old_to_new.insert(old_id, new_id);
        }
        for old_id in rest {
            let node = shifted[&old_id].clone();
            let new_id = self.add_node(node, None, true)?;
            old_to_new.insert(old_id, new_id);
        }

        for (from, to) in other.store.edges() {
            let new_from = old_to_new[&from];
            let new_to = old_to_new[&to];
            self.store.add_edge(new_from, new_to)?;
        }

        Ok(())
    }

    // -------------------------------------------------------------------
    // symbol table queries
    // -------------------------------------------------------------------

    fn variables(&self) -> impl Iterator<Item = (&str, u64, NodeId)> {
        self.store.nodes().into_iter().filter_map(|n| match n.instruction() {
            Instruction::Transforming(TransformingInstruction::Variable { name, version }) => {
                Some((name.as_str(), *version, n.id()))
            }
            _ => None,
        })
    }

    fn live_version(&self, name: &str) -> Option<u64> {
        self.variables()
            .filter(|(n, ..)| *n == name)
            .map(|(_, v, _)| v)
            .max()
    }

    fn live_variable_id(&self, name: &str) -> Option<NodeId> {
        self.variables()
            .filter(|(n, ..)| *n == name)
            .max_by_key(|(_, v, _)| *v)
            .map(|(_, _, id)| id)
    }

    fn all_live_versions(&self) -> BTreeMap<String, u64> {
        let mut versions: BTreeMap<String, u64> = BTreeMap::new();
        for (name, version, _) in self.variables() {
            let entry = versions.entry(name.to_string()).or_insert(version);
            if version > *entry {
                *entry = version;
            }
        }
        versions
    }

    /// The live (highest-version) node for `name`. Fails `VariableNotFound`
    /// if absent, `DuplicatedVariable` if two nodes share the live version
    /// (an invariant (4) violation — possible only after a hand-authored
    /// `from_record` document, never after `add`/`union`).
    pub fn get_variable(&self, name: &str) -> Result<NodeId, IrError> {
        let max_version = self
            .live_version(name)
            .ok_or_else(|| IrError::VariableNotFound(name.to_string()))?;
        let mut at_max = self
            .variables()
            .filter(|(n, v, _)| *n == name && *v == max_version)
            .map(|(_, _, id)| id);
        let id = at_max
            .next()
            .ok_or_else(|| IrError::VariableNotFound(name.to_string()))?;
        if at_max.next().is_some() {
            return Err(IrError::DuplicatedVariable {
                name: name.to_string(),
                version: max_version,
            });
        }
        Ok(id)
    }

    /// One entry per distinct variable name: the live variable's id.
    #[must_use]
    pub fn get_variables(&self) -> BTreeMap<String, NodeId> {
        let mut live: BTreeMap<String, (u64, NodeId)> = BTreeMap::new();
        for (name, version, id) in self.variables() {
            live.entry(name.to_string())
                .and_modify(|(best_version, best_id)| {
                    if version > *best_version {
                        *best_version = version;
                        *best_id = id;
                    }
                })
                .or_insert((version, id));
        }
        live.into_iter().map(|(name, (_, id))| (name, id)).collect()
    }

    /// All `Reference` nodes currently in the graph (transient survivors —
    /// invariant (6) means these exist only where no variable of the same
    /// name has since been added).
    #[must_use]
    pub fn get_references(&self) -> Vec<(String, NodeId)> {
        self.store
            .nodes()
            .into_iter()
            .filter_map(|n| match n.instruction() {
                Instruction::Intermediate(IntermediateInstruction::Reference { name }) => {
                    Some((name.clone(), n.id()))
                }
                _ => None,
            })
            .collect()
    }

    /// Fails `ReferenceNotFound` if no `Reference` of this name exists,
    /// `DuplicatedReference` if more than one does (an invariant (3)
    /// violation — possible only after a hand-authored `from_record`
    /// document, never after `add`/`union`).
    pub fn get_reference(&self, name: &str) -> Result<NodeId, IrError> {
        let mut matches = self
            .get_references()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, id)| id);
        let id = matches
            .next()
            .ok_or_else(|| IrError::ReferenceNotFound(name.to_string()))?;
        if matches.next().is_some() {
            return Err(IrError::DuplicatedReference(name.to_string()));
        }
        Ok(id)
    }

    /// All `DataSource` nodes currently in the graph.
    #[must_use]
    pub fn get_datasources(&self) -> Vec<(String, String, NodeId)> {
        self.store
            .nodes()
            .into_iter()
            .filter_map(|n| match n.instruction() {
                Instruction::Source(crate::instruction::SourceInstruction::DataSource {
                    interface,
                    datasource,
                }) => Some((interface.clone(), datasource.clone(), n.id())),
                _ => None,
            })
            .collect()
    }

    /// Fails `DataSourceNotFound` if no `DataSource` with this
    /// `(interface, datasource)` pair exists, `DuplicatedDataSource` if
    /// more than one does (an invariant (3) violation — possible only
    /// after a hand-authored `from_record` document, never after
    /// `add`/`union`).
    pub fn get_datasource(&self, interface: &str, datasource: &str) -> Result<NodeId, IrError> {
        let mut matches = self
            .get_datasources()
            .into_iter()
            .filter(|(i, d, _)| i == interface && d == datasource)
            .map(|(_, _, id)| id);
        let id = matches.next().ok_or_else(|| IrError::DataSourceNotFound {
            interface: interface.to_string(),
            datasource: datasource.to_string(),
        })?;
        if matches.next().is_some() {
            return Err(IrError::DuplicatedDataSource {
                interface: interface.to_string(),
                datasource: datasource.to_string(),
            });
        }
        Ok(id)
    }

    /// All `Return` nodes, ordered by `sequence`.
    #[must_use]
    pub fn get_returns(&self) -> Vec<NodeId> {
        let mut returns: Vec<(u64, NodeId)> = self
            .store
            .nodes()
            .into_iter()
            .filter_map(|n| match n.instruction() {
                Instruction::Transforming(TransformingInstruction::Return { sequence }) => {
                    Some((*sequence, n.id()))
                }
                _ => None,
            })
            .collect();
        returns.sort_by_key(|(seq, _)| *seq);
        returns.into_iter().map(|(_, id)| id).collect()
    }

    #[must_use]
    pub fn max_return_sequence(&self) -> Option<u64> {
        self.store
            .nodes()
            .into_iter()
            .filter_map(|n| match n.instruction() {
                Instruction::Transforming(TransformingInstruction::Return { sequence }) => {
                    Some(*sequence)
                }
                _ => None,
            })
            .max()
    }

    /// Nodes with no outgoing edges.
    #[must_use]
    pub fn get_sink_nodes(&self) -> Vec<NodeId> {
        self.store
            .nodes()
            .into_iter()
            .map(Node::id)
            .filter(|&id| self.store.out_degree(id) == 0)
            .collect()
    }

    // -------------------------------------------------------------------
    // copy semantics
    // -------------------------------------------------------------------

    /// Shares nodes by identity: a fresh graph container, same node ids and
    /// edges. Cheap because `Instruction` is plain data, not a shared
    /// pointer — an ordinary clone already gives the same observable
    /// sharing semantics a node-for-node merge into an empty graph would.
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }

    /// A fresh graph, isomorphic to `self`, with every node re-assigned a
    /// new id (identity disjoint from `self`).
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut id_map: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut new_store = DiGraph::new();
        for node in self.store.nodes() {
            let new_node = node.deep_copy();
            id_map.insert(node.id(), new_node.id());
            new_store.add_node(new_node);
        }
        for (from, to) in self.store.edges() {
            let _ = new_store.add_edge(id_map[&from], id_map[&to]);
        }
        Self { store: new_store }
    }

    // -------------------------------------------------------------------
    // serialization
    // -------------------------------------------------------------------

    #[must_use]
    pub fn to_record(&self) -> GraphRecord {
        record::to_record(&self.store)
    }

    pub fn from_record(graph_record: &GraphRecord) -> Result<Self, IrError> {
        Ok(Self {
            store: record::from_record(graph_record)?,
        })
    }
}
