//! # Cache-Aware Evaluator (C5)
//!
//! Recursively turns an [`EvaluableGraph`] into artifacts via a caller's
//! [`Backend`], memoizing every artifact it produces under the node's id
//! ([`Evaluator::artifacts`]) with an alias table for callers that need to
//! redirect a lookup without recomputing it ([`Evaluator::catalog`]).
//! A transform with more than one predecessor (a join) is deliberately
//! rejected at materialization time with [`IrError::NotImplemented`]
//! rather than silently picked down to one input.

use crate::backend::Backend;
use crate::error::IrError;
use crate::id::NodeId;
use crate::instruction::{Instruction, TransformingInstruction};
use crate::segmenter::{CacheProbe, EvaluableGraph};
use crate::store::{DiGraph, Store};
use std::collections::{BTreeMap, BTreeSet};

/// Drives repeated `segment` + `evaluate` rounds against one `Backend`,
/// remembering every artifact it has already produced so a later round
/// never recomputes a node it has seen.
pub struct Evaluator<B: Backend> {
    /// `node_id -> artifact`, keyed by the node that actually produced it.
    artifacts: BTreeMap<NodeId, B::Artifact>,
    /// `node_id -> node_id`: lets a caller declare that one node's result is
    /// identical to an already-cached node's, without recomputing it. Not
    /// populated by the evaluator itself — `add`/`union`'s singleton and
    /// deref rules already make semantically-identical nodes share one
    /// `NodeId`, so the common case needs no aliasing. This exists for a
    /// collaborator that bridges artifact identity across graphs it built
    /// independently (see `register_alias`).
    catalog: BTreeMap<NodeId, NodeId>,
}

impl<B: Backend> Default for Evaluator<B> {
    fn default() -> Self {
        Self {
            artifacts: BTreeMap::new(),
            catalog: BTreeMap::new(),
        }
    }
}

impl<B: Backend> Evaluator<B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `alias` should resolve to whatever artifact
    /// `canonical` produces or has produced.
    pub fn register_alias(&mut self, alias: NodeId, canonical: NodeId) {
        self.catalog.insert(alias, canonical);
    }

    fn canonical(&self, id: NodeId) -> NodeId {
        let mut current = id;
        let mut seen = BTreeSet::new();
        while let Some(&next) = self.catalog.get(&current) {
            if !seen.insert(current) {
                break;
            }
            current = next;
        }
        current
    }

    #[must_use]
    pub fn is_cached(&self, id: NodeId) -> bool {
        self.artifacts.contains_key(&self.canonical(id))
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&B::Artifact> {
        self.artifacts.get(&self.canonical(id))
    }

    /// Evaluate `targets` (and, transitively, everything they depend on),
    /// returning the artifact produced for each target. When `targets` is
    /// `None`, the targets are every sink node of `graph` (out-degree 0).
    /// Non-target dependencies are still materialized and memoized — a
    /// later call that targets one of them directly hits the cache — but
    /// only target nodes appear as keys in the returned map. Nodes already
    /// cached from a previous round are never re-dispatched to `backend`.
    pub fn evaluate(
        &mut self,
        graph: &EvaluableGraph,
        backend: &mut B,
        targets: Option<&[NodeId]>,
    ) -> Result<BTreeMap<NodeId, B::Artifact>, IrError> {
        let store = graph.graph();
        let owned_sinks;
        let targets: &[NodeId] = match targets {
            Some(targets) => targets,
            None => {
                owned_sinks = store
                    .nodes()
                    .into_iter()
                    .map(crate::instruction::Node::id)
                    .filter(|&id| store.out_degree(id) == 0)
                    .collect::<Vec<_>>();
                &owned_sinks
            }
        };

        let mut results = BTreeMap::new();
        for &id in targets {
            let artifact = self.evaluate_node(store, id, backend)?;
            results.insert(id, artifact);
        }
        Ok(results)
    }

    /// Evaluate a single node and every dependency it needs, memoizing as
    /// it goes.
    fn evaluate_node(
        &mut self,
        store: &DiGraph,
        id: NodeId,
        backend: &mut B,
    ) -> Result<B::Artifact, IrError> {
        let canonical = self.canonical(id);
        if let Some(artifact) = self.artifacts.get(&canonical) {
            return Ok(artifact.clone());
        }

        let node = store
            .get_node(id)
            .ok_or(IrError::InstructionNotFound(id))?;

        let artifact = match node.instruction() {
            Instruction::Transforming(TransformingInstruction::Return { .. })
            | Instruction::Transforming(TransformingInstruction::Variable { .. }) => {
                self.evaluate_single_predecessor(store, id, backend, |_backend, _id, input| {
                    Ok(input)
                })?
            }
            Instruction::Source(source) => backend.evaluate_source(id, source)?,
            Instruction::Transforming(transform) => {
                let transform = transform.clone();
                self.evaluate_single_predecessor(store, id, backend, move |backend, id, input| {
                    backend.evaluate_transform(id, &transform, &input)
                })?
            }
            Instruction::Intermediate(_) => return Err(IrError::InevaluableInstruction(id)),
        };

        self.artifacts.insert(canonical, artifact.clone());
        Ok(artifact)
    }

    /// Dispatch a node that requires exactly one already-evaluated
    /// predecessor, applying `apply` to that predecessor's artifact.
    /// Zero predecessors is an unevaluable graph shape; more than one is a
    /// join, which this evaluator does not support.
    fn evaluate_single_predecessor(
        &mut self,
        store: &DiGraph,
        id: NodeId,
        backend: &mut B,
        apply: impl FnOnce(&mut B, NodeId, B::Artifact) -> Result<B::Artifact, IrError>,
    ) -> Result<B::Artifact, IrError> {
        let mut preds = store.predecessors(id).into_iter();
        let (Some(pred_id), None) = (preds.next(), preds.next()) else {
            return match store.predecessors(id).len() {
                0 => Err(IrError::InevaluableInstruction(id)),
                _ => Err(IrError::NotImplemented(format!(
                    "node {id} has multiple predecessors; joins are not evaluated"
                ))),
            };
        };
        let input = self.evaluate_node(store, pred_id, backend)?;
        apply(backend, id, input)
    }
}

impl<B: Backend> CacheProbe for Evaluator<B> {
    fn contains(&self, id: NodeId) -> bool {
        self.is_cached(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::IrGraph;
    use crate::backend::tests::CountingBackend;
    use crate::instruction::SourceInstruction;
    use crate::segmenter::segment;

    fn linear_graph() -> (IrGraph, NodeId) {
        let mut g = IrGraph::new();
        let ds = g
            .add(
                Instruction::Source(SourceInstruction::DataSource {
                    interface: "A".to_string(),
                    datasource: "t1".to_string(),
                }),
                None,
                true,
            )
            .expect("add ds");
        let limit = g
            .add(
                Instruction::Transforming(TransformingInstruction::Limit { count: 10 }),
                Some(ds),
                true,
            )
            .expect("add limit");
        let r = g
            .add(
                Instruction::Transforming(TransformingInstruction::Return { sequence: 0 }),
                Some(limit),
                true,
            )
            .expect("add return");
        (g, r)
    }

    #[test]
    fn evaluates_a_linear_pipeline_end_to_end() {
        let (graph, target) = linear_graph();
        let empty = BTreeSet::new();
        let subgraphs = segment(&graph, target, &empty).expect("segment");
        assert_eq!(subgraphs.len(), 1);

        let mut evaluator: Evaluator<CountingBackend> = Evaluator::new();
        let mut backend = CountingBackend::default();
        let results = evaluator
            .evaluate(&subgraphs[0], &mut backend, None)
            .expect("evaluate");

        assert_eq!(results.len(), 1);
        assert_eq!(results[&target], 10);
    }

    #[test]
    fn second_round_skips_already_cached_nodes() {
        let (graph, target) = linear_graph();
        let mut evaluator: Evaluator<CountingBackend> = Evaluator::new();
        let mut backend = CountingBackend::default();

        let empty = BTreeSet::new();
        let first = segment(&graph, target, &empty).expect("segment");
        evaluator
            .evaluate(&first[0], &mut backend, None)
            .expect("evaluate");

        let second = segment(&graph, target, &evaluator).expect("segment");
        evaluator
            .evaluate(&second[0], &mut backend, None)
            .expect("evaluate");

        let ds_id = graph
            .get_datasources()
            .into_iter()
            .next()
            .expect("one datasource")
            .2;
        assert_eq!(backend.source_calls.get(&ds_id).copied().unwrap_or(0), 1);
    }

    #[test]
    fn rejects_multi_predecessor_transform_as_not_implemented() {
        let mut g = IrGraph::new();
        let ds_a = g
            .add(
                Instruction::Source(SourceInstruction::DataSource {
                    interface: "A".to_string(),
                    datasource: "t1".to_string(),
                }),
                None,
                true,
            )
            .expect("add ds a");
        let ds_b = g
            .add(
                Instruction::Source(SourceInstruction::DataSource {
                    interface: "A".to_string(),
                    datasource: "t2".to_string(),
                }),
                None,
                true,
            )
            .expect("add ds b");
        let join = g
            .add(
                Instruction::Transforming(TransformingInstruction::Join {
                    key: "id".to_string(),
                }),
                Some(ds_a),
                true,
            )
            .expect("add join");
        g.add_join_predecessor(ds_b, join).expect("wire second predecessor");

        let empty = BTreeSet::new();
        let subgraphs = segment(&g, join, &empty).expect("segment");
        let mut evaluator: Evaluator<CountingBackend> = Evaluator::new();
        let mut backend = CountingBackend::default();

        let result = evaluator.evaluate(&subgraphs[0], &mut backend, None);
        assert!(matches!(result, Err(IrError::NotImplemented(_))));
    }

    #[test]
    fn default_targets_are_sinks_only_not_every_node() {
        let (graph, target) = linear_graph();
        let empty = BTreeSet::new();
        let subgraphs = segment(&graph, target, &empty).expect("segment");
        assert_eq!(subgraphs[0].graph().node_count(), 3);

        let mut evaluator: Evaluator<CountingBackend> = Evaluator::new();
        let mut backend = CountingBackend::default();
        let results = evaluator
            .evaluate(&subgraphs[0], &mut backend, None)
            .expect("evaluate");

        assert_eq!(results, BTreeMap::from([(target, 10)]));
    }

    #[test]
    fn explicit_targets_return_exactly_those_keys() {
        let (graph, target) = linear_graph();
        let empty = BTreeSet::new();
        let subgraphs = segment(&graph, target, &empty).expect("segment");
        let ds_id = graph
            .get_datasources()
            .into_iter()
            .next()
            .expect("one datasource")
            .2;

        let mut evaluator: Evaluator<CountingBackend> = Evaluator::new();
        let mut backend = CountingBackend::default();
        let results = evaluator
            .evaluate(&subgraphs[0], &mut backend, Some(&[ds_id]))
            .expect("evaluate");

        assert_eq!(results, BTreeMap::from([(ds_id, 100)]));
    }
}
