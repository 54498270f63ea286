//! The on-the-fly constructed call graph. Nodes are (context-sensitive)
//! methods; edges carry the call site and the call kind. Newly added nodes
//! enter an append-only reachable queue which the solver drains through a
//! resumable reader.

use petgraph::graph::{DefaultIx, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Graph;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use crate::ir::program::{CSMethod, CallSiteId, MethodId};
use crate::ir::stmt::{CSCallSite, CallKind};
use crate::util::shared_queue::{QueueReader, SharedQueue};

/// Unique identifiers for call graph nodes.
pub type CGNodeId = NodeIndex<DefaultIx>;
/// Unique identifiers for call graph edges.
pub type CGEdgeId = EdgeIndex<DefaultIx>;
/// The context-sensitive call graph built by the solver.
pub type CSCallGraph = CallGraph<CSMethod, CSCallSite>;
/// The context-insensitive projection exposed by the result.
pub type CICallGraph = CallGraph<MethodId, CallSiteId>;

pub trait CGFunction: Copy + Clone + PartialEq + Eq + Ord + Hash + Debug {}

impl CGFunction for MethodId {}
impl CGFunction for CSMethod {}

pub trait CGCallSite: Copy + Clone + PartialEq + Eq + Ord + Hash + Debug {}

impl CGCallSite for CallSiteId {}
impl CGCallSite for CSCallSite {}

#[derive(Debug)]
pub struct CallGraphNode<F: CGFunction> {
    pub(crate) func: F,
}

#[derive(Debug)]
pub struct CallGraphEdge<S: CGCallSite> {
    pub(crate) callsite: S,
    pub(crate) kind: CallKind,
}

pub struct CallGraph<F: CGFunction, S: CGCallSite> {
    /// The graph structure capturing call relationships.
    pub graph: Graph<CallGraphNode<F>, CallGraphEdge<S>>,
    /// A map from functions to their corresponding call graph nodes.
    pub func_nodes: HashMap<F, CGNodeId>,
    /// A map from call sites to call graph edges.
    pub callsite_to_edges: HashMap<S, BTreeSet<CGEdgeId>>,
    /// A queue of reachable methods, in discovery order.
    pub(crate) reach_funcs: SharedQueue<F>,
}

impl<F: CGFunction, S: CGCallSite> Default for CallGraph<F, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: CGFunction, S: CGCallSite> CallGraph<F, S> {
    pub fn new() -> Self {
        CallGraph {
            graph: Graph::new(),
            func_nodes: HashMap::new(),
            callsite_to_edges: HashMap::new(),
            reach_funcs: SharedQueue::new(),
        }
    }

    /// Declares a method reachable without a call edge (entry points,
    /// implicit calls injected by plugins).
    pub fn add_node(&mut self, func: F) {
        self.get_or_insert_node(func);
    }

    /// Helper function to get a node or insert a new node if it does not
    /// exist in the map. Insertion enqueues the method as newly reachable.
    fn get_or_insert_node(&mut self, func: F) -> CGNodeId {
        match self.func_nodes.entry(func) {
            Entry::Occupied(o) => o.get().to_owned(),
            Entry::Vacant(v) => {
                self.reach_funcs.push(func);
                let node_id = self.graph.add_node(CallGraphNode { func });
                *v.insert(node_id)
            }
        }
    }

    pub fn contains(&self, func: F) -> bool {
        self.func_nodes.contains_key(&func)
    }

    /// All callees recorded for a call site, in ascending order.
    pub fn get_callees(&self, callsite: &S) -> Vec<F> {
        let mut callees: Vec<F> = self
            .callsite_to_edges
            .get(callsite)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| {
                let (_, target) = self.graph.edge_endpoints(*edge_id)?;
                Some(self.graph.node_weight(target).unwrap().func)
            })
            .collect();
        callees.sort();
        callees
    }

    /// Returns true if an edge to the callee already exists for the
    /// callsite.
    pub fn has_edge(&self, callsite: &S, callee: F) -> bool {
        self.get_callees(callsite).contains(&callee)
    }

    /// Adds a new edge to the call graph.
    /// Returns false if the edge already existed, and true otherwise.
    pub fn add_edge(&mut self, callsite: S, caller: F, callee: F, kind: CallKind) -> bool {
        if self.has_edge(&callsite, callee) {
            return false;
        }
        let caller_node = self.get_or_insert_node(caller);
        let callee_node = self.get_or_insert_node(callee);
        let edge_id = self
            .graph
            .add_edge(caller_node, callee_node, CallGraphEdge { callsite, kind });
        self.callsite_to_edges.entry(callsite).or_default().insert(edge_id);
        true
    }

    /// Returns a reader over the reachable-method queue.
    pub fn reach_funcs_reader(&self) -> QueueReader<F> {
        self.reach_funcs.reader()
    }

    /// Iterates reachable methods in discovery order.
    pub fn iter_reachable(&self) -> impl Iterator<Item = F> + '_ {
        self.graph.node_indices().map(|n| self.graph.node_weight(n).unwrap().func)
    }

    /// Iterates all edges as (caller, callsite, kind, callee).
    pub fn iter_edges(&self) -> impl Iterator<Item = (F, S, CallKind, F)> + '_ {
        self.graph.edge_references().map(|e| {
            let caller = self.graph.node_weight(e.source()).unwrap().func;
            let callee = self.graph.node_weight(e.target()).unwrap().func;
            (caller, e.weight().callsite, e.weight().kind, callee)
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }
}
