//! # Segmenter (C4)
//!
//! Cache-aware subgraph extraction and interface-based partitioning.

use crate::algebra::IrGraph;
use crate::error::IrError;
use crate::id::NodeId;
use crate::instruction::{Category, Instruction, SourceInstruction};
use crate::store::{DiGraph, Store};
use std::collections::{BTreeMap, BTreeSet};

/// Reserved interface identifier: every source has already been
/// materialized and is retrievable from the cache by node-id.
pub const CACHE_INTERFACE: &str = "CACHE";

/// A read-only membership probe over node-ids, standing in for a
/// controller's cache of already-materialized nodes.
pub trait CacheProbe {
    fn contains(&self, id: NodeId) -> bool;
}

impl CacheProbe for BTreeSet<NodeId> {
    fn contains(&self, id: NodeId) -> bool {
        BTreeSet::contains(self, &id)
    }
}

impl<F: Fn(NodeId) -> bool> CacheProbe for F {
    fn contains(&self, id: NodeId) -> bool {
        self(id)
    }
}

/// A dependency subgraph that targets exactly one data-source interface
/// (or the reserved `CACHE` interface) and contains no unresolved
/// references.
#[derive(Debug, Clone)]
pub struct EvaluableGraph {
    graph: DiGraph,
    interface: String,
}

impl EvaluableGraph {
    fn try_new(graph: DiGraph) -> Result<Self, IrError> {
        if let Some(node) = graph
            .nodes()
            .into_iter()
            .find(|n| n.category() == Category::Intermediate)
        {
            return Err(IrError::InevaluableInstruction(node.id()));
        }

        let mut interfaces: BTreeSet<String> = BTreeSet::new();
        for node in graph.nodes() {
            if let Instruction::Source(SourceInstruction::DataSource { interface, .. }) =
                node.instruction()
            {
                interfaces.insert(interface.clone());
            }
        }

        let mut iter = interfaces.into_iter();
        let interface = match (iter.next(), iter.next()) {
            (None, _) => CACHE_INTERFACE.to_string(),
            (Some(only), None) => only,
            (Some(first), Some(second)) => {
                let mut all = vec![first, second];
                all.extend(iter);
                return Err(IrError::MultiInterfacesInGraph(all));
            }
        };

        Ok(Self { graph, interface })
    }

    #[must_use]
    pub const fn graph(&self) -> &DiGraph {
        &self.graph
    }

    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }
}

/// Prune incoming edges of every cached node in `g0`, then recompute the
/// ancestor-subgraph of `target` within the pruned result — whatever led
/// to a cached node need not be recomputed, so components left
/// disconnected by the prune are dropped.
fn prune_and_recompute(g0: &DiGraph, target: NodeId, cache: &impl CacheProbe) -> DiGraph {
    let mut working = g0.clone();

    let mut edges_to_remove: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
    for node in working.nodes() {
        let id = node.id();
        if cache.contains(id) {
            for pred in working.predecessors(id) {
                edges_to_remove.insert((pred, id));
            }
        }
    }
    working.remove_edges(&edges_to_remove);

    let mut reachable = working.ancestors(target);
    reachable.insert(target);
    working.subgraph(&reachable)
}

/// Partition `graph` into interface buckets:
/// - for each `SourceInstruction` `s` with interface `I`, bucket `I` gets
///   `{s} ∪ descendants(s) ∪ cached_predecessors_of_descendants(s)`;
/// - every node not claimed by a source bucket goes to `CACHE`.
///
/// Then any node claimed by two or more buckets is excluded from all of
/// them (it needs coordination this round and is left for a later one).
fn partition_by_interface(
    graph: &DiGraph,
    cache: &impl CacheProbe,
) -> BTreeMap<String, BTreeSet<NodeId>> {
    let mut buckets: BTreeMap<String, BTreeSet<NodeId>> = BTreeMap::new();

    for node in graph.nodes() {
        if let Instruction::Source(SourceInstruction::DataSource { interface, .. }) =
            node.instruction()
        {
            let bucket = buckets.entry(interface.clone()).or_default();
            bucket.insert(node.id());
            let descendants = graph.descendants(node.id());
            for &d in &descendants {
                bucket.insert(d);
                for pred in graph.predecessors(d) {
                    if cache.contains(pred) {
                        bucket.insert(pred);
                    }
                }
            }
        }
    }

    let claimed: BTreeSet<NodeId> = buckets.values().flatten().copied().collect();
    let mut cache_bucket: BTreeSet<NodeId> = BTreeSet::new();
    for node in graph.nodes() {
        if !claimed.contains(&node.id()) {
            cache_bucket.insert(node.id());
        }
    }
    if !cache_bucket.is_empty() {
        buckets.insert(CACHE_INTERFACE.to_string(), cache_bucket);
    }

    let mut membership_count: BTreeMap<NodeId, usize> = BTreeMap::new();
    for bucket in buckets.values() {
        for &id in bucket {
            *membership_count.entry(id).or_insert(0) += 1;
        }
    }
    let shared: BTreeSet<NodeId> = membership_count
        .into_iter()
        .filter(|&(_, count)| count > 1)
        .map(|(id, _)| id)
        .collect();
    for bucket in buckets.values_mut() {
        for id in &shared {
            bucket.remove(id);
        }
    }

    buckets
}

/// Segment `graph` with respect to `target` and `cache`: zero or more
/// `EvaluableGraph`s whose evaluation materializes every cache-missing
/// dependency of `target`, up to the first cut where `target` itself
/// becomes evaluable.
pub fn segment(
    graph: &IrGraph,
    target: NodeId,
    cache: &impl CacheProbe,
) -> Result<Vec<EvaluableGraph>, IrError> {
    let store = graph.store();
    if !store.contains_node(target) {
        return Err(IrError::InstructionNotFound(target));
    }

    let mut ancestors = store.ancestors(target);
    ancestors.insert(target);
    let g0 = store.subgraph(&ancestors);

    let pruned = prune_and_recompute(&g0, target, cache);
    let buckets = partition_by_interface(&pruned, cache);

    let mut result = Vec::new();
    for node_ids in buckets.values() {
        if node_ids.is_empty() {
            continue;
        }
        let subgraph = pruned.subgraph(node_ids);
        result.push(EvaluableGraph::try_new(subgraph)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::TransformingInstruction;

    fn ds(g: &mut IrGraph, interface: &str, datasource: &str) -> NodeId {
        g.add(
            Instruction::Source(SourceInstruction::DataSource {
                interface: interface.to_string(),
                datasource: datasource.to_string(),
            }),
            None,
            true,
        )
        .expect("add datasource")
    }

    fn filter(g: &mut IrGraph, pred: NodeId, predicate: &str) -> NodeId {
        g.add(
            Instruction::Transforming(TransformingInstruction::Filter {
                predicate: predicate.to_string(),
            }),
            Some(pred),
            true,
        )
        .expect("add filter")
    }

    fn var(g: &mut IrGraph, pred: NodeId, name: &str) -> NodeId {
        g.add(
            Instruction::Transforming(TransformingInstruction::Variable {
                name: name.to_string(),
                version: 0,
            }),
            Some(pred),
            true,
        )
        .expect("add variable")
    }

    fn ret(g: &mut IrGraph, pred: NodeId) -> NodeId {
        g.add(
            Instruction::Transforming(TransformingInstruction::Return { sequence: 0 }),
            Some(pred),
            true,
        )
        .expect("add return")
    }

    fn empty_cache() -> BTreeSet<NodeId> {
        BTreeSet::new()
    }

    #[test]
    fn pure_pipeline_emits_one_subgraph_with_single_interface() {
        // S1
        let mut g = IrGraph::new();
        let ds_id = ds(&mut g, "A", "t1");
        let f = filter(&mut g, ds_id, "P");
        let v = var(&mut g, f, "x");
        let r = ret(&mut g, v);

        let subgraphs = segment(&g, r, &empty_cache()).expect("segment");
        assert_eq!(subgraphs.len(), 1);
        assert_eq!(subgraphs[0].interface(), "A");
        assert_eq!(subgraphs[0].graph().node_count(), 4);
    }

    #[test]
    fn two_interface_split_then_single_cache_round() {
        // S4
        let mut g = IrGraph::new();
        let ds_a = ds(&mut g, "A", "t1");
        let v1 = var(&mut g, ds_a, "v1");
        let ds_b = ds(&mut g, "B", "t2");
        let v2 = var(&mut g, ds_b, "v2");
        let join = g
            .add(
                Instruction::Transforming(TransformingInstruction::Join {
                    key: "id".to_string(),
                }),
                Some(v1),
                true,
            )
            .expect("add join");
        // The algebra's `add` only wires a single predecessor edge per
        // call; join's second input is wired directly on the store to
        // model the data model's permitted (if unevaluated) multi-pred
        // transform shape.
        g.add_join_predecessor(v2, join).expect("wire second join predecessor");
        let r = ret(&mut g, join);

        let empty = empty_cache();
        let first_round = segment(&g, r, &empty).expect("segment");
        assert_eq!(first_round.len(), 2);
        let interfaces: BTreeSet<&str> =
            first_round.iter().map(EvaluableGraph::interface).collect();
        assert_eq!(interfaces, BTreeSet::from(["A", "B"]));

        let mut cache = BTreeSet::new();
        cache.insert(v1);
        cache.insert(v2);
        let second_round = segment(&g, r, &cache).expect("segment");
        assert_eq!(second_round.len(), 1);
        assert_eq!(second_round[0].interface(), CACHE_INTERFACE);
    }

    #[test]
    fn cache_pruning_excludes_upstream_of_cached_node() {
        // S5
        let mut g = IrGraph::new();
        let ds_id = ds(&mut g, "A", "t1");
        let t1 = filter(&mut g, ds_id, "f1");
        let t2 = filter(&mut g, t1, "f2");
        let t3 = filter(&mut g, t2, "f3");
        let r = ret(&mut g, t3);

        let mut cache = BTreeSet::new();
        cache.insert(t2);

        let subgraphs = segment(&g, r, &cache).expect("segment");
        assert_eq!(subgraphs.len(), 1);
        let nodes: BTreeSet<NodeId> = subgraphs[0]
            .graph()
            .nodes()
            .into_iter()
            .map(crate::instruction::Node::id)
            .collect();
        assert!(nodes.contains(&t2));
        assert!(nodes.contains(&t3));
        assert!(nodes.contains(&r));
        assert!(!nodes.contains(&ds_id));
        assert!(!nodes.contains(&t1));
    }

    #[test]
    fn emitted_graph_has_no_intermediate_instructions() {
        let mut g = IrGraph::new();
        let ds_id = ds(&mut g, "A", "t1");
        let v = var(&mut g, ds_id, "x");
        let r = ret(&mut g, v);

        let subgraphs = segment(&g, r, &empty_cache()).expect("segment");
        for sub in &subgraphs {
            assert!(sub
                .graph()
                .nodes()
                .into_iter()
                .all(|n| n.category() != Category::Intermediate));
        }
    }
}
