//! This module contains the distance heuristics used by goal-directed search
//! to rank states by how close they are to the locations they are trying to
//! reach.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
};

use parking_lot::RwLock;
use petgraph::{
    algo::dijkstra,
    graph::{DiGraph, NodeIndex},
};

use crate::program::{Instruction, Location, Program};

/// A pluggable estimate of the distance between two program locations.
///
/// Implementations need not be exact, but they must never report a location
/// as unreachable when it is in fact reachable, as targets that are deemed
/// unreachable are abandoned without being searched for.
pub trait DistanceHeuristic
where
    Self: Debug + Send + Sync,
{
    /// Estimates the distance from `from` to `to`, returning [`None`] if `to`
    /// cannot be reached from `from`.
    fn distance(&self, from: Location, to: Location) -> Option<usize>;

    /// Checks whether `to` may be reachable from `from`.
    fn reachable(&self, from: Location, to: Location) -> bool {
        self.distance(from, to).is_some()
    }
}

/// The kind of an edge in the inter-procedural control-flow graph.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// Control passes to another instruction in the same method.
    Intra,

    /// Control passes from a call site to the entry of the callee.
    Call,

    /// Control passes from a call site to the instruction after it, which
    /// summarises the callee.
    CallToReturn,

    /// Control passes from a return to the instruction after a call site of
    /// the returning method.
    Return,
}

/// A [`DistanceHeuristic`] that measures the number of edges on a shortest
/// path in the inter-procedural control-flow graph.
///
/// The graph is context-insensitive: a return flows back to every call site of
/// the returning method. This over-approximates the set of feasible paths, so
/// the heuristic never wrongly reports a location as unreachable.
///
/// Distances to each target are computed once, on first request, and cached.
#[derive(Debug)]
pub struct ControlFlowDistance {
    /// The graph with every edge reversed, so that a single shortest-path
    /// search from a target yields the distance to it from every location.
    reversed: DiGraph<Location, EdgeKind>,

    /// The node for each location in the program.
    nodes: HashMap<Location, NodeIndex>,

    /// Distances from every node to each target that has been queried.
    cache: RwLock<HashMap<Location, Arc<HashMap<NodeIndex, usize>>>>,
}

impl ControlFlowDistance {
    /// Builds the inter-procedural control-flow graph of `program`.
    #[must_use]
    pub fn new(program: &Program) -> Self {
        let mut reversed = DiGraph::new();
        let mut nodes = HashMap::new();

        for (id, method) in program.methods() {
            for offset in 0..method.len() {
                let location = Location::new(id, offset);
                nodes.insert(location, reversed.add_node(location));
            }
        }

        let mut add_edge = |from: Location, to: Location, kind: EdgeKind| {
            if let (Some(f), Some(t)) = (nodes.get(&from), nodes.get(&to)) {
                reversed.add_edge(*t, *f, kind);
            }
        };

        for (id, method) in program.methods() {
            let call_sites = program.call_sites_of(id);
            for (offset, instruction) in (0..method.len()).zip(&method.body) {
                let here = Location::new(id, offset);
                if instruction.falls_through() {
                    let kind = match instruction {
                        Instruction::Call { .. } => EdgeKind::CallToReturn,
                        _ => EdgeKind::Intra,
                    };
                    add_edge(here, here.next(), kind);
                }
                for target in instruction.jump_targets() {
                    add_edge(here, here.with_offset(target), EdgeKind::Intra);
                }
                match instruction {
                    Instruction::Call { callee, .. } => {
                        add_edge(here, Location::entry_of(*callee), EdgeKind::Call);
                    }
                    Instruction::Return { .. } => {
                        for site in &call_sites {
                            add_edge(here, site.next(), EdgeKind::Return);
                        }
                    }
                    _ => (),
                }
            }
        }

        let cache = RwLock::new(HashMap::new());
        Self {
            reversed,
            nodes,
            cache,
        }
    }

    /// Gets the number of locations in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.reversed.node_count()
    }

    /// Gets the number of control-flow edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.reversed.edge_count()
    }

    fn distances_to(&self, target: Location) -> Option<Arc<HashMap<NodeIndex, usize>>> {
        if let Some(distances) = self.cache.read().get(&target) {
            return Some(distances.clone());
        }

        let start = *self.nodes.get(&target)?;
        let distances = Arc::new(dijkstra(&self.reversed, start, None, |_| 1usize));
        self.cache.write().insert(target, distances.clone());

        Some(distances)
    }
}

impl DistanceHeuristic for ControlFlowDistance {
    fn distance(&self, from: Location, to: Location) -> Option<usize> {
        let from = *self.nodes.get(&from)?;
        self.distances_to(to)?.get(&from).copied()
    }
}
