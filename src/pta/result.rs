//! The frozen, read-only view over the finished analysis.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::heap::{HeapModel, ObjData, ObjId};
use super::{DiffPTDataTy, NodeId, PointsTo};
use crate::graph::call_graph::{CICallGraph, CSCallGraph};
use crate::graph::pfg::{Pointer, PFG};
use crate::ir::context::ContextId;
use crate::ir::program::{CSMethod, CallSiteId, FieldId, MethodId, VarId};
use crate::ir::stmt::{CSCallSite, CallKind};
use crate::pts_set::points_to::PointsToSet;
use crate::pts_set::pt_data::BasePTData;

/// The immutable result of a solver run: every interned pointer with its
/// final points-to set, the reachable methods and the call graph. Because
/// `solve` consumes the solver, nothing can mutate the analysis state after
/// this view exists.
pub struct PTAResult {
    /// All interned pointers, in node-id order.
    pointers: Vec<Pointer>,
    pointer_nodes: HashMap<Pointer, NodeId>,
    /// Final points-to sets, with the reverse (object to pointers) map.
    pts: BasePTData<NodeId, ObjId, PointsTo<ObjId>>,
    call_graph: CSCallGraph,
    heap: HeapModel,
    /// Printable renditions of the interned contexts, indexed by context id.
    ctx_descriptions: Vec<String>,
}

impl PTAResult {
    pub(crate) fn new(
        pfg: PFG,
        pt_data: DiffPTDataTy,
        call_graph: CSCallGraph,
        heap: HeapModel,
        ctx_descriptions: Vec<String>,
    ) -> Self {
        let mut pointers = Vec::with_capacity(pfg.num_nodes());
        let mut pointer_nodes = HashMap::with_capacity(pfg.num_nodes());
        for (node, pointer) in pfg.iter_pointers() {
            debug_assert_eq!(pointers.len(), crate::util::index::Idx::index(node));
            pointers.push(*pointer);
            pointer_nodes.insert(*pointer, node);
        }

        let mut pts = BasePTData::new();
        for (&node, set) in &pt_data.propa_pts_map {
            pts.union_pts_to(node, set);
        }
        // A drained worklist leaves no pending deltas behind, but a frozen
        // result must reflect every fact either way.
        for (&node, set) in &pt_data.diff_pts_map {
            pts.union_pts_to(node, set);
        }

        PTAResult {
            pointers,
            pointer_nodes,
            pts,
            call_graph,
            heap,
            ctx_descriptions,
        }
    }

    /// The points-to set of a pointer, if the pointer was ever interned and
    /// received any objects.
    pub fn pts_of(&self, pointer: &Pointer) -> Option<&PointsTo<ObjId>> {
        let node = self.pointer_nodes.get(pointer)?;
        self.pts.get_pts(*node)
    }

    /// The objects a context-sensitive variable may point to.
    pub fn points_to(&self, cid: ContextId, var: VarId) -> Vec<ObjId> {
        self.pts_of(&Pointer::Var { cid, var })
            .map(|pts| pts.iter().collect())
            .unwrap_or_default()
    }

    /// The context-insensitive projection: the union of a variable's
    /// points-to sets over all contexts.
    pub fn ci_points_to(&self, var: VarId) -> PointsTo<ObjId> {
        let mut merged = PointsTo::new();
        for (node, pointer) in self.iter_pointers() {
            if let Pointer::Var { var: v, .. } = pointer {
                if *v == var {
                    if let Some(pts) = self.pts.get_pts(node) {
                        merged.union(pts);
                    }
                }
            }
        }
        merged
    }

    /// All pointers that may reference `obj`.
    pub fn pointed_by(&self, obj: ObjId) -> Option<&HashSet<NodeId>> {
        self.pts.get_rev_pts(obj)
    }

    pub fn pointer_at(&self, node: NodeId) -> &Pointer {
        &self.pointers[crate::util::index::Idx::index(node)]
    }

    fn iter_pointers(&self) -> impl Iterator<Item = (NodeId, &Pointer)> {
        self.pointers
            .iter()
            .enumerate()
            .map(|(i, p)| (<NodeId as crate::util::index::Idx>::new(i), p))
    }

    /// Context-sensitive variables with their points-to sets.
    pub fn iter_vars(&self) -> impl Iterator<Item = (ContextId, VarId, &PointsTo<ObjId>)> {
        self.iter_pointers().filter_map(move |(node, pointer)| match pointer {
            Pointer::Var { cid, var } => Some((*cid, *var, self.pts.get_pts(node)?)),
            _ => None,
        })
    }

    /// Instance-field pointers with their points-to sets.
    pub fn iter_instance_fields(&self) -> impl Iterator<Item = (ObjId, FieldId, &PointsTo<ObjId>)> {
        self.iter_pointers().filter_map(move |(node, pointer)| match pointer {
            Pointer::InstanceField { obj, field } => Some((*obj, *field, self.pts.get_pts(node)?)),
            _ => None,
        })
    }

    /// Array-index pointers with their points-to sets.
    pub fn iter_array_indices(&self) -> impl Iterator<Item = (ObjId, &PointsTo<ObjId>)> {
        self.iter_pointers().filter_map(move |(node, pointer)| match pointer {
            Pointer::ArrayIndex { obj } => Some((*obj, self.pts.get_pts(node)?)),
            _ => None,
        })
    }

    /// Static-field pointers with their points-to sets.
    pub fn iter_static_fields(&self) -> impl Iterator<Item = (FieldId, &PointsTo<ObjId>)> {
        self.iter_pointers().filter_map(move |(node, pointer)| match pointer {
            Pointer::StaticField { field } => Some((*field, self.pts.get_pts(node)?)),
            _ => None,
        })
    }

    /// The context-sensitive call graph.
    pub fn call_graph(&self) -> &CSCallGraph {
        &self.call_graph
    }

    /// Reachable context-sensitive methods, in discovery order.
    pub fn reachable_methods(&self) -> impl Iterator<Item = CSMethod> + '_ {
        self.call_graph.iter_reachable()
    }

    /// Reachable methods irrespective of context.
    pub fn reachable_method_ids(&self) -> BTreeSet<MethodId> {
        self.call_graph.iter_reachable().map(|csm| csm.method).collect()
    }

    pub fn is_reachable(&self, method: MethodId) -> bool {
        self.call_graph.iter_reachable().any(|csm| csm.method == method)
    }

    /// Call targets recorded for a call site, irrespective of context.
    pub fn callees_at(&self, site: CallSiteId) -> BTreeSet<MethodId> {
        self.call_graph
            .iter_edges()
            .filter(|(_, callsite, _, _)| callsite.site == site)
            .map(|(_, _, _, callee)| callee.method)
            .collect()
    }

    /// All context-sensitive call edges.
    pub fn call_edges(&self) -> impl Iterator<Item = (CSMethod, CSCallSite, CallKind, CSMethod)> + '_ {
        self.call_graph.iter_edges()
    }

    /// Projects the call graph onto context-insensitive methods.
    pub fn ci_call_graph(&self) -> CICallGraph {
        let mut graph = CICallGraph::new();
        for csm in self.call_graph.iter_reachable() {
            graph.add_node(csm.method);
        }
        for (caller, callsite, kind, callee) in self.call_graph.iter_edges() {
            graph.add_edge(callsite.site, caller.method, callee.method, kind);
        }
        graph
    }

    pub fn heap(&self) -> &HeapModel {
        &self.heap
    }

    pub fn obj(&self, obj: ObjId) -> &ObjData {
        self.heap.obj(obj)
    }

    pub fn describe_context(&self, cid: ContextId) -> &str {
        self.ctx_descriptions
            .get(cid.index())
            .map(|s| s.as_str())
            .unwrap_or("[]")
    }

    pub fn num_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// The total number of (pointer, object) relations.
    pub fn num_pts_relations(&self) -> usize {
        self.pts.get_pts_map().values().map(|pts| pts.count()).sum()
    }
}
