//! The key component of the pointer analysis: drains the worklist,
//! propagating points-to deltas along PFG edges, materializing per-object
//! field and array edges, and collecting receiver objects for pending calls.

use std::collections::VecDeque;
use std::time::Instant;

use super::context_strategy::ContextStrategy;
use super::heap::{HeapModel, ObjId};
use super::plugins::{drain_events, CompositePlugin, PluginEvent};
use super::solver::{add_pfg_edge, PendingCalls, SolverView};
use super::{CancelToken, DiffPTDataTy, EdgeId, NodeId, PointsTo};
use crate::error::AnalysisError;
use crate::graph::call_graph::CSCallGraph;
use crate::graph::pfg::{PFGEdgeKind, Pointer, PFG};
use crate::ir::program::Program;
use crate::ir::stmt::CSCallSite;
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::AnalysisOptions;
use crate::util::shared_queue::QueueReader;

/// Propagates points-to information along the PFG edges until the worklist
/// is empty. Receiver objects reaching pending call sites are handed back to
/// the solver through `new_calls`.
pub struct Propagator<'pta> {
    program: &'pta Program,
    options: &'pta AnalysisOptions,
    heap: &'pta mut HeapModel,
    strategy: &'pta mut dyn ContextStrategy,
    pt_data: &'pta mut DiffPTDataTy,
    pfg: &'pta mut PFG,
    call_graph: &'pta mut CSCallGraph,
    worklist: &'pta mut VecDeque<NodeId>,
    pending_calls: &'pta mut PendingCalls,
    events: &'pta mut VecDeque<PluginEvent>,

    /// Reader over allocation facts queued in the PFG.
    alloc_reader: &'pta mut QueueReader<(NodeId, ObjId)>,
    /// Reader over edges whose current source set must be flushed.
    flush_reader: &'pta mut QueueReader<EdgeId>,

    plugins: &'pta mut CompositePlugin,

    /// Receiver objects newly reaching pending call sites.
    new_calls: &'pta mut Vec<(CSCallSite, ObjId)>,

    /// Incremental (delta) propagation; disabled by the `simple` solver,
    /// which re-propagates full sets on every pop.
    use_diff: bool,

    cancel: &'pta CancelToken,
    deadline: Option<Instant>,
}

impl<'pta> Propagator<'pta> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        program: &'pta Program,
        options: &'pta AnalysisOptions,
        heap: &'pta mut HeapModel,
        strategy: &'pta mut dyn ContextStrategy,
        pt_data: &'pta mut DiffPTDataTy,
        pfg: &'pta mut PFG,
        call_graph: &'pta mut CSCallGraph,
        worklist: &'pta mut VecDeque<NodeId>,
        pending_calls: &'pta mut PendingCalls,
        events: &'pta mut VecDeque<PluginEvent>,
        alloc_reader: &'pta mut QueueReader<(NodeId, ObjId)>,
        flush_reader: &'pta mut QueueReader<EdgeId>,
        plugins: &'pta mut CompositePlugin,
        new_calls: &'pta mut Vec<(CSCallSite, ObjId)>,
        use_diff: bool,
        cancel: &'pta CancelToken,
        deadline: Option<Instant>,
    ) -> Self {
        Propagator {
            program,
            options,
            heap,
            strategy,
            pt_data,
            pfg,
            call_graph,
            worklist,
            pending_calls,
            events,
            alloc_reader,
            flush_reader,
            plugins,
            new_calls,
            use_diff,
            cancel,
            deadline,
        }
    }

    /// Propagate points-to data until the worklist is empty.
    pub fn solve_worklist(&mut self) -> Result<(), AnalysisError> {
        loop {
            self.init_constraints();
            let Some(node) = self.worklist.pop_front() else {
                break;
            };
            self.check_cancelled()?;
            self.process_node(node)?;
        }
        Ok(())
    }

    /// Activate constraints that accumulated since the last drain:
    /// allocation facts and edges requiring a flush of their current source
    /// set.
    fn init_constraints(&mut self) {
        while let Some((node, obj)) = self.alloc_reader.next() {
            if self.pt_data.add_pts(node, obj) {
                self.worklist.push_back(node);
            }
        }
        while let Some(edge) = self.flush_reader.next() {
            self.flush_edge(edge);
        }
    }

    fn check_cancelled(&self) -> Result<(), AnalysisError> {
        if self.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AnalysisError::Cancelled);
            }
        }
        Ok(())
    }

    /// Processes one popped pointer: applies its delta to every outgoing
    /// constraint, feeds pending calls, notifies the plugins, then retires
    /// the delta.
    fn process_node(&mut self, node: NodeId) -> Result<(), AnalysisError> {
        let delta = match self.pt_data.get_diff_pts(node) {
            Some(diff) if !diff.is_empty() => diff.clone(),
            _ => return Ok(()),
        };
        // The reference mode re-propagates the full set each pop; results
        // must not differ, only the amount of redundant work does.
        let prop = if self.use_diff {
            delta.clone()
        } else {
            self.full_pts(node)
        };

        for edge in self.collect_edges(&self.pfg.copy_out_edges, node) {
            self.apply_edge(edge, &prop);
        }
        for edge in self.collect_edges(&self.pfg.cast_out_edges, node) {
            self.apply_edge(edge, &prop);
        }
        for edge in self.collect_edges(&self.pfg.load_out_edges, node) {
            self.apply_edge(edge, &prop);
        }
        for edge in self.collect_edges(&self.pfg.store_in_edges, node) {
            self.apply_edge(edge, &prop);
        }
        for edge in self.collect_edges(&self.pfg.array_load_out_edges, node) {
            self.apply_edge(edge, &prop);
        }
        for edge in self.collect_edges(&self.pfg.array_store_in_edges, node) {
            self.apply_edge(edge, &prop);
        }

        // Receiver objects reaching pending virtual/interface/special calls.
        if let Some(callsites) = self.pending_calls.get(&node) {
            let callsites: Vec<CSCallSite> = callsites.iter().copied().collect();
            for obj in prop.iter() {
                for callsite in &callsites {
                    self.new_calls.push((*callsite, obj));
                }
            }
        }

        // Retire the delta before notifying the plugins: anything a hook
        // adds to this pointer lands in a fresh delta and is re-queued
        // instead of being swallowed by the flush.
        self.pt_data.flush(node);

        {
            // Split the field borrows so the plugins can receive a view of
            // everything except themselves.
            let plugins = &mut *self.plugins;
            let mut view = SolverView {
                program: self.program,
                options: self.options,
                heap: &mut *self.heap,
                strategy: &mut *self.strategy,
                pfg: &mut *self.pfg,
                call_graph: &mut *self.call_graph,
                pt_data: &mut *self.pt_data,
                worklist: &mut *self.worklist,
                pending_calls: &mut *self.pending_calls,
                events: &mut *self.events,
            };
            plugins.on_new_pts(&mut view, node, &delta);
            drain_events(plugins, &mut view)?;
        }
        if let Some(fatal) = self.plugins.take_fatal() {
            return Err(fatal.into());
        }
        Ok(())
    }

    fn collect_edges(
        &self,
        map: &std::collections::HashMap<NodeId, std::collections::BTreeSet<EdgeId>>,
        node: NodeId,
    ) -> Vec<EdgeId> {
        map.get(&node).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// Applies one edge to a set of objects flowing through its driving
    /// endpoint.
    fn apply_edge(&mut self, edge: EdgeId, pts: &PointsTo<ObjId>) {
        let kind = self.pfg.get_edge(edge).kind.clone();
        let (src, dst) = self.pfg.edge_endpoints(edge);
        match kind {
            PFGEdgeKind::Copy => {
                if self.pt_data.union_pts_to(dst, pts) {
                    self.worklist.push_back(dst);
                }
            }
            PFGEdgeKind::Cast(ty) => {
                let filtered = self.filter_subtypes(pts, ty);
                if !filtered.is_empty() && self.pt_data.union_pts_to(dst, &filtered) {
                    self.worklist.push_back(dst);
                }
            }
            PFGEdgeKind::Load(field) => {
                // dst = src.f: for each receiver object, connect the
                // object's field pointer to dst.
                let dst_ptr = *self.pfg.pointer(dst);
                for obj in pts.iter() {
                    self.add_materialized_edge(Pointer::InstanceField { obj, field }, dst_ptr);
                }
            }
            PFGEdgeKind::Store(field) => {
                // dst.f = src: the edge targets the base pointer; connect
                // src to each receiver object's field pointer.
                let src_ptr = *self.pfg.pointer(src);
                for obj in pts.iter() {
                    self.add_materialized_edge(src_ptr, Pointer::InstanceField { obj, field });
                }
            }
            PFGEdgeKind::ArrayLoad => {
                let dst_ptr = *self.pfg.pointer(dst);
                for obj in pts.iter() {
                    self.add_materialized_edge(Pointer::ArrayIndex { obj }, dst_ptr);
                }
            }
            PFGEdgeKind::ArrayStore => {
                let src_ptr = *self.pfg.pointer(src);
                for obj in pts.iter() {
                    self.add_materialized_edge(src_ptr, Pointer::ArrayIndex { obj });
                }
            }
        }
    }

    /// Adds a materialized copy edge; its current source set is flushed via
    /// the edge queue before the next pop.
    fn add_materialized_edge(&mut self, src: Pointer, dst: Pointer) {
        add_pfg_edge(self.pfg, self.pt_data, &src, &dst, PFGEdgeKind::Copy);
    }

    /// Flushes the full current source set of a newly added edge.
    fn flush_edge(&mut self, edge: EdgeId) {
        let kind = self.pfg.get_edge(edge).kind.clone();
        let (src, dst) = self.pfg.edge_endpoints(edge);
        let driver = match kind {
            PFGEdgeKind::Store(_) | PFGEdgeKind::ArrayStore => dst,
            _ => src,
        };
        let pts = self.full_pts(driver);
        if !pts.is_empty() {
            self.apply_edge(edge, &pts);
        }
    }

    fn filter_subtypes(&self, pts: &PointsTo<ObjId>, ty: crate::ir::program::TypeId) -> PointsTo<ObjId> {
        let mut filtered = PointsTo::new();
        for obj in pts.iter() {
            if self.program.is_subtype(self.heap.obj_type(obj), ty) {
                filtered.insert(obj);
            }
        }
        filtered
    }

    /// Returns a node's points-to set cloned from both the pending and the
    /// propagated parts.
    fn full_pts(&self, node: NodeId) -> PointsTo<ObjId> {
        let mut pts = match self.pt_data.get_propa_pts(node) {
            Some(propa) => propa.clone(),
            None => PointsTo::new(),
        };
        if let Some(diff) = self.pt_data.get_diff_pts(node) {
            pts.union(diff);
        }
        pts
    }
}
