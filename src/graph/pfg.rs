//! The pointer flow graph (PFG): pointers as nodes, assignment relations as
//! labeled edges. The graph doubles as the interner of context-sensitive
//! pointers; the dense node ids it hands out key the points-to data and the
//! solver worklist.

use petgraph::graph::{DefaultIx, EdgeIndex, NodeIndex};
use petgraph::Graph;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use super::method_pfg::MethodPFG;
use crate::ir::context::ContextId;
use crate::ir::program::{FieldId, MethodId, Program, TypeId, VarId};
use crate::pta::heap::ObjId;
use crate::util::index::Idx;
use crate::util::shared_queue::{QueueReader, SharedQueue};

// Unique identifiers for graph nodes and edges.
pub type NodeId = NodeIndex<DefaultIx>;
pub type EdgeId = EdgeIndex<DefaultIx>;

impl Idx for NodeId {
    #[inline]
    fn new(idx: usize) -> Self {
        NodeIndex::new(idx)
    }

    #[inline]
    fn index(self) -> usize {
        self.index()
    }
}

/// An abstract pointer. Every kind owns a points-to set; variables exist per
/// analysis context, while field, array and static pointers are
/// context-free (objects already carry their heap context).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Pointer {
    /// A local variable under a context (parameters and return values
    /// included).
    Var { cid: ContextId, var: VarId },
    /// An instance field of an abstract object.
    InstanceField { obj: ObjId, field: FieldId },
    /// The single pointer conflating all indices of one abstract array.
    ArrayIndex { obj: ObjId },
    /// A static field.
    StaticField { field: FieldId },
    /// The exceptional exit of a context-sensitive method; only the
    /// exception model creates these.
    ExceptionExit { cid: ContextId, method: MethodId },
}

impl Pointer {
    pub fn var(cid: ContextId, var: VarId) -> Self {
        Pointer::Var { cid, var }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PFGEdgeKind {
    /// Local assignment, parameter passing, return flow, static field
    /// access.
    Copy,
    /// Assignment filtered by a cast: only objects whose type is a subtype
    /// of the filter pass.
    Cast(TypeId),
    /// `dst = src.f`; materialized per receiver object.
    Load(FieldId),
    /// `dst.f = src`; the edge targets the base pointer, materialized per
    /// receiver object.
    Store(FieldId),
    /// `dst = src[*]`
    ArrayLoad,
    /// `dst[*] = src`
    ArrayStore,
}

pub struct PFGNode {
    pointer: Pointer,
}

impl PFGNode {
    pub fn new(pointer: Pointer) -> Self {
        PFGNode { pointer }
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }
}

pub struct PFGEdge {
    pub kind: PFGEdgeKind,
}

type EdgeMap = HashMap<NodeId, BTreeSet<EdgeId>>;

pub struct PFG {
    /// The graph structure capturing assignment relations between pointers.
    pub(crate) graph: Graph<PFGNode, PFGEdge>,
    /// A map from pointers to node ids.
    pub(crate) values: HashMap<Pointer, NodeId>,
    /// One constraint template per method, so that a context-sensitive
    /// analysis processes each method body only once.
    pub(crate) method_pfgs: HashMap<MethodId, Option<MethodPFG>>,
    /// Allocation facts discovered while instantiating method templates,
    /// drained by the propagator as initial constraints.
    alloc_queue: SharedQueue<(NodeId, ObjId)>,
    /// Newly added edges whose source already has points-to information,
    /// drained by the propagator so that edge insertion and propagation
    /// commute.
    flush_queue: SharedQueue<EdgeId>,

    pub(crate) copy_out_edges: EdgeMap,
    pub(crate) cast_out_edges: EdgeMap,
    pub(crate) load_out_edges: EdgeMap,
    pub(crate) store_in_edges: EdgeMap,
    pub(crate) array_load_out_edges: EdgeMap,
    pub(crate) array_store_in_edges: EdgeMap,
}

impl Default for PFG {
    fn default() -> Self {
        Self::new()
    }
}

impl PFG {
    pub fn new() -> Self {
        PFG {
            graph: Graph::new(),
            values: HashMap::new(),
            method_pfgs: HashMap::new(),
            alloc_queue: SharedQueue::new(),
            flush_queue: SharedQueue::new(),
            copy_out_edges: EdgeMap::new(),
            cast_out_edges: EdgeMap::new(),
            load_out_edges: EdgeMap::new(),
            store_in_edges: EdgeMap::new(),
            array_load_out_edges: EdgeMap::new(),
            array_store_in_edges: EdgeMap::new(),
        }
    }

    /// Returns the pointer interned at the given node id.
    pub fn pointer(&self, node_id: NodeId) -> &Pointer {
        self.graph.node_weight(node_id).unwrap().pointer()
    }

    /// Returns the node id for the given pointer, if it has been interned.
    pub fn get_node_id(&self, pointer: &Pointer) -> Option<NodeId> {
        self.values.get(pointer).copied()
    }

    /// Helper function to get a node or insert a new node if it does not
    /// exist in the map.
    pub fn get_or_insert_node(&mut self, pointer: &Pointer) -> NodeId {
        match self.values.entry(*pointer) {
            Entry::Occupied(o) => o.get().to_owned(),
            Entry::Vacant(v) => {
                let node_id = self.graph.add_node(PFGNode::new(*pointer));
                *v.insert(node_id)
            }
        }
    }

    /// Returns the edge weight for the given edge id.
    pub fn get_edge(&self, edge_id: EdgeId) -> &PFGEdge {
        self.graph.edge_weight(edge_id).unwrap()
    }

    pub fn edge_endpoints(&self, edge_id: EdgeId) -> (NodeId, NodeId) {
        self.graph.edge_endpoints(edge_id).unwrap()
    }

    /// Returns true if an edge of this exact kind (filter included) already
    /// connects the two nodes.
    pub fn contains_edge(&self, src: NodeId, dst: NodeId, kind: &PFGEdgeKind) -> bool {
        self.graph
            .edges_connecting(src, dst)
            .any(|edge| &edge.weight().kind == kind)
    }

    /// Adds an edge between two pointers, interning them as needed.
    /// Returns the edge id if the edge is new.
    pub fn add_edge(&mut self, src: &Pointer, dst: &Pointer, kind: PFGEdgeKind) -> Option<EdgeId> {
        let src_id = self.get_or_insert_node(src);
        let dst_id = self.get_or_insert_node(dst);
        if self.contains_edge(src_id, dst_id, &kind) {
            return None;
        }
        let register = match kind {
            PFGEdgeKind::Copy => (&mut self.copy_out_edges, src_id),
            PFGEdgeKind::Cast(_) => (&mut self.cast_out_edges, src_id),
            PFGEdgeKind::Load(_) => (&mut self.load_out_edges, src_id),
            PFGEdgeKind::Store(_) => (&mut self.store_in_edges, dst_id),
            PFGEdgeKind::ArrayLoad => (&mut self.array_load_out_edges, src_id),
            PFGEdgeKind::ArrayStore => (&mut self.array_store_in_edges, dst_id),
        };
        let (map, key) = register;
        let edge_id = self.graph.add_edge(src_id, dst_id, PFGEdge { kind });
        map.entry(key).or_default().insert(edge_id);
        Some(edge_id)
    }

    /// Records an allocation fact to be picked up by the propagator.
    pub fn push_alloc(&mut self, node: NodeId, obj: ObjId) {
        self.alloc_queue.push((node, obj));
    }

    /// Returns a reader over the allocation facts.
    pub fn alloc_reader(&self) -> QueueReader<(NodeId, ObjId)> {
        self.alloc_queue.reader()
    }

    /// Queues an edge whose current source points-to set must be flushed
    /// through it.
    pub fn push_flush_edge(&mut self, edge: EdgeId) {
        self.flush_queue.push(edge);
    }

    /// Returns a reader over the edges queued for flushing.
    pub fn flush_reader(&self) -> QueueReader<EdgeId> {
        self.flush_queue.reader()
    }

    /// Builds (or reuses) the constraint template of a method. Returns false
    /// if the method has no body to process.
    pub fn build_method_pfg(&mut self, program: &Program, method: MethodId) -> bool {
        self.method_pfgs
            .entry(method)
            .or_insert_with(|| MethodPFG::build(program, method))
            .is_some()
    }

    pub fn get_method_pfg(&self, method: MethodId) -> Option<&MethodPFG> {
        self.method_pfgs.get(&method).and_then(|m| m.as_ref())
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates all interned pointers in node-id order.
    pub fn iter_pointers(&self) -> impl Iterator<Item = (NodeId, &Pointer)> {
        self.graph
            .node_indices()
            .map(move |id| (id, self.graph.node_weight(id).unwrap().pointer()))
    }
}
