//! The context-sensitive solver: reachability, on-the-fly call-graph
//! construction, method-template instantiation and plugin wiring. The
//! worklist mechanics live in [`super::propagator`].

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use log::*;

use super::context_strategy::ContextStrategy;
use super::heap::{HeapModel, ObjId};
use super::plugins::{drain_events, CompositePlugin, Plugin, PluginEvent};
use super::propagator::Propagator;
use super::result::PTAResult;
use super::{CancelToken, DiffPTDataTy, NodeId, PointsTo};
use crate::error::AnalysisError;
use crate::graph::call_graph::CSCallGraph;
use crate::graph::method_pfg::IrNode;
use crate::graph::pfg::{PFGEdgeKind, Pointer, PFG};
use crate::ir::context::{ContextId, EMPTY_CONTEXT};
use crate::ir::program::{CSMethod, MethodId, Program, VarId};
use crate::ir::stmt::{CSCallSite, CallKind};
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::{AnalysisOptions, SolverKind};
use crate::util::shared_queue::QueueReader;

/// Virtual, interface and special call sites waiting for receiver objects,
/// keyed by the receiver's PFG node.
#[derive(Default)]
pub struct PendingCalls {
    map: HashMap<NodeId, BTreeSet<CSCallSite>>,
}

impl PendingCalls {
    /// Registers a call site; returns false if it was already registered.
    pub fn add(&mut self, recv: NodeId, callsite: CSCallSite) -> bool {
        self.map.entry(recv).or_default().insert(callsite)
    }

    pub fn get(&self, recv: &NodeId) -> Option<&BTreeSet<CSCallSite>> {
        self.map.get(recv)
    }
}

/// The mutable solver state handed to call-processing code and plugin hooks.
///
/// Everything a plugin is allowed to do goes through this view: adding
/// pointer-flow edges, points-to facts, call edges, reachable methods and
/// synthetic objects. Hook notifications triggered by these operations are
/// queued on `events` and delivered once the current operation completes.
pub struct SolverView<'a> {
    pub program: &'a Program,
    pub options: &'a AnalysisOptions,
    pub heap: &'a mut HeapModel,
    pub strategy: &'a mut dyn ContextStrategy,
    pub pfg: &'a mut PFG,
    pub call_graph: &'a mut CSCallGraph,
    pub pt_data: &'a mut DiffPTDataTy,
    pub worklist: &'a mut VecDeque<NodeId>,
    pub pending_calls: &'a mut PendingCalls,
    pub events: &'a mut VecDeque<PluginEvent>,
}

/// Inserts a PFG edge, and queues it for flushing when its driving pointer
/// already has points-to information, so that edge insertion and delta
/// propagation commute.
pub(crate) fn add_pfg_edge(
    pfg: &mut PFG,
    pt_data: &DiffPTDataTy,
    src: &Pointer,
    dst: &Pointer,
    kind: PFGEdgeKind,
) {
    let driven_by_dst = matches!(kind, PFGEdgeKind::Store(_) | PFGEdgeKind::ArrayStore);
    if let Some(edge) = pfg.add_edge(src, dst, kind) {
        let (src_id, dst_id) = pfg.edge_endpoints(edge);
        let driver = if driven_by_dst { dst_id } else { src_id };
        if pt_data.has_pts(driver) {
            pfg.push_flush_edge(edge);
        }
    }
}

impl<'a> SolverView<'a> {
    /// Interns a pointer as a PFG node.
    pub fn node(&mut self, pointer: &Pointer) -> NodeId {
        self.pfg.get_or_insert_node(pointer)
    }

    /// Adds one object to a pointer's points-to set; enqueues the pointer if
    /// the set grew.
    pub fn add_points_to(&mut self, pointer: &Pointer, obj: ObjId) -> bool {
        let node = self.node(pointer);
        self.add_points_to_node(node, obj)
    }

    pub fn add_points_to_node(&mut self, node: NodeId, obj: ObjId) -> bool {
        if self.pt_data.add_pts(node, obj) {
            self.worklist.push_back(node);
            true
        } else {
            false
        }
    }

    /// Adds a pointer-flow edge of the given kind.
    pub fn add_pfg_edge(&mut self, src: &Pointer, dst: &Pointer, kind: PFGEdgeKind) {
        add_pfg_edge(self.pfg, self.pt_data, src, dst, kind);
    }

    /// Declares a context-sensitive method reachable (an implicit call); its
    /// body is processed by the solver's next reachability pass.
    pub fn mark_reachable(&mut self, csm: CSMethod) {
        self.call_graph.add_node(csm);
    }

    /// The whole points-to set of a pointer (propagated and pending parts).
    pub fn full_pts(&mut self, pointer: &Pointer) -> PointsTo<ObjId> {
        let node = self.node(pointer);
        self.full_pts_node(node)
    }

    pub fn full_pts_node(&self, node: NodeId) -> PointsTo<ObjId> {
        let mut pts = match self.pt_data.get_propa_pts(node) {
            Some(propa) => propa.clone(),
            None => PointsTo::new(),
        };
        if let Some(diff) = self.pt_data.get_diff_pts(node) {
            pts.union(diff);
        }
        pts
    }

    /// Registers a receiver-pending call site and resolves it against the
    /// objects the receiver already points to.
    pub fn add_pending_call(&mut self, recv: &Pointer, callsite: CSCallSite) {
        let node = self.node(recv);
        if self.pending_calls.add(node, callsite) {
            let existing = self.full_pts_node(node);
            for obj in existing.iter() {
                self.process_instance_call(callsite, obj);
            }
        }
    }

    /// Resolves an instance call for one receiver object: dynamic dispatch
    /// (or static binding for special calls), callee-context selection, call
    /// edge plus parameter/return wiring, and `this` seeding.
    pub fn process_instance_call(&mut self, callsite: CSCallSite, recv: ObjId) {
        let program = self.program;
        let data = program.call_site(callsite.site);
        let target = match data.kind {
            CallKind::Special => program
                .resolve_method(data.target.class, &data.target)
                .filter(|&m| !program.method(m).is_abstract),
            _ => program.dispatch(self.heap.obj_type(recv), &data.target),
        };
        match target {
            Some(method) => {
                self.bind_instance_call(callsite, data.kind, recv, method);
            }
            None => {
                warn!(
                    "could not resolve call to {}.{} on {}",
                    program.class(data.target.class).name,
                    data.target.name,
                    self.heap.describe(program, recv),
                );
                self.events.push_back(PluginEvent::UnresolvedCall {
                    recv,
                    callsite,
                });
            }
        }
    }

    /// Connects a resolved instance call to a concrete target: selects the
    /// callee context, seeds `this` with the receiver object and wires the
    /// call edge. Plugins dispatching implicit calls (thread starts) use
    /// this directly.
    pub fn bind_instance_call(
        &mut self,
        callsite: CSCallSite,
        kind: CallKind,
        recv: ObjId,
        method: MethodId,
    ) {
        let cid = self.strategy.instance_call_context(callsite, recv, self.heap);
        let callee = CSMethod::new(cid, method);
        if let Some(body) = &self.program.method(method).body {
            if let Some(this_var) = body.this_var {
                self.add_points_to(&Pointer::var(cid, this_var), recv);
            }
        }
        self.connect_call(callsite, kind, callee);
    }

    /// Resolves a receiverless, statically bound call when its enclosing
    /// method becomes reachable.
    pub fn process_static_call(&mut self, callsite: CSCallSite) -> Result<(), AnalysisError> {
        let program = self.program;
        let data = program.call_site(callsite.site);
        let target = program
            .resolve_method(data.target.class, &data.target)
            .ok_or_else(|| {
                AnalysisError::FrontEnd(format!(
                    "unresolved static call target {}.{} in {}",
                    program.class(data.target.class).name,
                    data.target.name,
                    program.method_sig(data.method),
                ))
            })?;
        let cid = self.strategy.static_call_context(callsite);
        self.connect_call(callsite, data.kind, CSMethod::new(cid, target));
        Ok(())
    }

    /// Records a call-graph edge without wiring arguments; returns false if
    /// the edge already existed. Plugins wiring unusual argument shapes use
    /// this directly.
    pub fn add_call_edge_raw(&mut self, callsite: CSCallSite, kind: CallKind, callee: CSMethod) -> bool {
        if self.call_graph.add_edge(callsite, callsite.caller, callee, kind) {
            self.events.push_back(PluginEvent::NewCallEdge { callsite, callee });
            true
        } else {
            false
        }
    }

    /// Records a call edge and adds the standard argument-to-parameter and
    /// return-to-result copy edges.
    pub fn connect_call(&mut self, callsite: CSCallSite, kind: CallKind, callee: CSMethod) {
        if !self.add_call_edge_raw(callsite, kind, callee) {
            return;
        }
        let program = self.program;
        let data = program.call_site(callsite.site);
        if let Some(body) = &program.method(callee.method).body {
            for (arg, param) in data.args.iter().zip(&body.params) {
                self.add_pfg_edge(
                    &Pointer::var(callsite.cid(), *arg),
                    &Pointer::var(callee.cid, *param),
                    PFGEdgeKind::Copy,
                );
            }
            if let Some(result) = data.result {
                for ret in &body.ret_vars {
                    self.add_pfg_edge(
                        &Pointer::var(callee.cid, *ret),
                        &Pointer::var(callsite.cid(), result),
                        PFGEdgeKind::Copy,
                    );
                }
            }
        }
    }

    /// Instantiates one allocation of a method template: picks the heap
    /// context, interns the object and queues the allocation fact.
    pub fn register_alloc(&mut self, cid: ContextId, lhs: VarId, site: crate::ir::program::AllocSiteId) {
        let heap_ctx = self.strategy.heap_context(cid);
        let obj = self.heap.get_alloc_obj(self.program, site, heap_ctx);
        let node = self.pfg.get_or_insert_node(&Pointer::var(cid, lhs));
        self.pfg.push_alloc(node, obj);
    }
}

/// The context-sensitive, subset-based pointer analysis.
///
/// The solver is single-use: configure it, then call
/// [`ContextSensitivePTA::solve`], which consumes it and returns the frozen
/// result. With [`SolverKind::Simple`] the propagator re-propagates full
/// points-to sets instead of deltas; the fixpoint is identical.
pub struct ContextSensitivePTA<'pta, S: ContextStrategy> {
    /// The program under analysis.
    pub(crate) program: &'pta Program,
    pub(crate) options: &'pta AnalysisOptions,
    /// The heap abstraction.
    pub(crate) heap: HeapModel,
    /// Points-to data.
    pub(crate) pt_data: DiffPTDataTy,
    /// The pointer flow graph.
    pub(crate) pfg: PFG,
    /// The call graph.
    pub call_graph: CSCallGraph,

    /// Records the context-sensitive methods that have been processed.
    processed_funcs: HashSet<CSMethod>,
    /// Methods seen under at least one context.
    reached_methods: HashSet<MethodId>,

    /// Reader over the reachable-method queue.
    rf_reader: QueueReader<CSMethod>,
    /// Reader over the allocation facts queued in the PFG.
    alloc_reader: QueueReader<(NodeId, ObjId)>,
    /// Reader over edges queued for flushing.
    flush_reader: QueueReader<super::EdgeId>,

    pending_calls: PendingCalls,
    worklist: VecDeque<NodeId>,
    events: VecDeque<PluginEvent>,

    ctx_strategy: S,
    plugins: CompositePlugin,

    cancel: CancelToken,
    deadline: Option<Instant>,
}

impl<'pta, S: ContextStrategy> ContextSensitivePTA<'pta, S> {
    pub fn new(
        program: &'pta Program,
        options: &'pta AnalysisOptions,
        heap: HeapModel,
        ctx_strategy: S,
        cancel: CancelToken,
    ) -> Self {
        let call_graph = CSCallGraph::new();
        let rf_reader = call_graph.reach_funcs_reader();
        let pfg = PFG::new();
        let alloc_reader = pfg.alloc_reader();
        let flush_reader = pfg.flush_reader();
        ContextSensitivePTA {
            program,
            options,
            heap,
            pt_data: DiffPTDataTy::new(),
            pfg,
            call_graph,
            processed_funcs: HashSet::new(),
            reached_methods: HashSet::new(),
            rf_reader,
            alloc_reader,
            flush_reader,
            pending_calls: PendingCalls::default(),
            worklist: VecDeque::new(),
            events: VecDeque::new(),
            ctx_strategy,
            plugins: CompositePlugin::new(),
            cancel,
            deadline: None,
        }
    }

    /// Registers a plugin; only allowed before [`ContextSensitivePTA::solve`].
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.register(plugin);
    }

    fn view(&mut self) -> SolverView<'_> {
        SolverView {
            program: self.program,
            options: self.options,
            heap: &mut self.heap,
            strategy: &mut self.ctx_strategy,
            pfg: &mut self.pfg,
            call_graph: &mut self.call_graph,
            pt_data: &mut self.pt_data,
            worklist: &mut self.worklist,
            pending_calls: &mut self.pending_calls,
            events: &mut self.events,
        }
    }

    /// Runs `f` against the plugin set, then drains the event queue.
    fn with_plugins<R>(
        &mut self,
        f: impl FnOnce(&mut CompositePlugin, &mut SolverView<'_>) -> R,
    ) -> Result<R, AnalysisError> {
        let mut plugins = std::mem::take(&mut self.plugins);
        let mut view = self.view();
        let result = f(&mut plugins, &mut view);
        let drained = drain_events(&mut plugins, &mut view);
        drop(view);
        let fatal = plugins.take_fatal();
        self.plugins = plugins;
        drained?;
        if let Some(fatal) = fatal {
            return Err(fatal.into());
        }
        Ok(result)
    }

    /// Runs the analysis to its fixpoint and freezes the result.
    pub fn solve(mut self) -> Result<PTAResult, AnalysisError> {
        self.deadline = self
            .options
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        self.initialize()?;
        self.propagate()?;
        self.finalize()
    }

    /// Marks the entry points reachable and notifies the plugins.
    fn initialize(&mut self) -> Result<(), AnalysisError> {
        self.with_plugins(|plugins, view| plugins.on_start(view))?;
        if self.program.entry_points().is_empty() {
            warn!("no entry points; the analysis result will be empty");
        }
        for &entry in self.program.entry_points() {
            self.call_graph.add_node(CSMethod::new(EMPTY_CONTEXT, entry));
        }
        Ok(())
    }

    /// Process statements of newly reachable methods.
    fn process_reach_funcs(&mut self) -> Result<(), AnalysisError> {
        while let Some(csm) = self.rf_reader.next() {
            if !self.processed_funcs.insert(csm) {
                continue;
            }
            debug!(
                "processing {} under {}",
                self.program.method_sig(csm.method),
                self.ctx_strategy.describe(csm.cid),
            );
            if self.reached_methods.insert(csm.method) {
                self.events.push_back(PluginEvent::NewMethod(csm.method));
            }
            self.events.push_back(PluginEvent::NewCSMethod(csm));

            let class = self.program.method(csm.method).class;
            let process_body = !self.options.only_app || self.program.class(class).is_application;
            if process_body && self.pfg.build_method_pfg(self.program, csm.method) {
                self.instantiate_method(csm)?;
            }
            self.with_plugins(|_, _| ())?;
        }
        Ok(())
    }

    /// Instantiates a method's constraint template under a context: internal
    /// edges, allocations, and call-site registration.
    fn instantiate_method(&mut self, csm: CSMethod) -> Result<(), AnalysisError> {
        let mpfg = self.pfg.get_method_pfg(csm.method).unwrap();
        debug_assert_eq!(mpfg.method, csm.method);
        let internal_edges = mpfg.internal_edges.clone();
        let allocs = mpfg.allocs.clone();
        let static_callsites = mpfg.static_callsites.clone();
        let instance_callsites = mpfg.instance_callsites.clone();

        let cid = csm.cid;
        let mut result = Ok(());
        let mut view = self.view();
        for (src, dst, kind) in internal_edges {
            view.add_pfg_edge(&mk_pointer(src, cid), &mk_pointer(dst, cid), kind);
        }
        for (lhs, site) in allocs {
            view.register_alloc(cid, lhs, site);
        }
        for site in static_callsites {
            if let Err(e) = view.process_static_call(CSCallSite::new(csm, site)) {
                result = Err(e);
                break;
            }
        }
        if result.is_ok() {
            for site in instance_callsites {
                let recv = view.program.call_site(site).recv.ok_or_else(|| {
                    AnalysisError::FrontEnd(format!(
                        "instance call without receiver in {}",
                        view.program.method_sig(csm.method)
                    ))
                });
                match recv {
                    Ok(recv) => {
                        view.add_pending_call(&Pointer::var(cid, recv), CSCallSite::new(csm, site))
                    }
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
        }
        drop(view);
        result
    }

    /// Alternates worklist drains with call-graph growth until neither
    /// produces new work.
    fn propagate(&mut self) -> Result<(), AnalysisError> {
        loop {
            self.process_reach_funcs()?;

            let mut new_calls: Vec<(CSCallSite, ObjId)> = Vec::new();
            {
                let mut plugins = std::mem::take(&mut self.plugins);
                let mut propagator = Propagator::new(
                    self.program,
                    self.options,
                    &mut self.heap,
                    &mut self.ctx_strategy,
                    &mut self.pt_data,
                    &mut self.pfg,
                    &mut self.call_graph,
                    &mut self.worklist,
                    &mut self.pending_calls,
                    &mut self.events,
                    &mut self.alloc_reader,
                    &mut self.flush_reader,
                    &mut plugins,
                    &mut new_calls,
                    self.options.solver == SolverKind::Default,
                    &self.cancel,
                    self.deadline,
                );
                let solved = propagator.solve_worklist();
                drop(propagator);
                let fatal = plugins.take_fatal();
                self.plugins = plugins;
                solved?;
                if let Some(fatal) = fatal {
                    return Err(fatal.into());
                }
            }

            let produced_calls = !new_calls.is_empty();
            if produced_calls {
                let mut view = self.view();
                for (callsite, recv) in &new_calls {
                    view.process_instance_call(*callsite, *recv);
                }
                drop(view);
                self.with_plugins(|_, _| ())?;
            }

            let mut peek = self.rf_reader.clone();
            if !produced_calls && peek.next().is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Notifies the plugins and freezes the result.
    fn finalize(mut self) -> Result<PTAResult, AnalysisError> {
        self.with_plugins(|plugins, view| plugins.on_finish(view))?;
        if !self.worklist.is_empty() {
            return Err(AnalysisError::Invariant(
                "constraints added after the fixpoint was reached".to_string(),
            ));
        }
        info!(
            "analysis finished: {} pointers, {} reachable methods, {} call edges",
            self.pfg.num_nodes(),
            self.call_graph.num_nodes(),
            self.call_graph.num_edges(),
        );
        let ctx_descriptions = (0..self.ctx_strategy.num_contexts())
            .map(|i| self.ctx_strategy.describe(ContextId::new(i)))
            .collect();
        Ok(PTAResult::new(
            self.pfg,
            self.pt_data,
            self.call_graph,
            self.heap,
            ctx_descriptions,
        ))
    }
}

fn mk_pointer(node: IrNode, cid: ContextId) -> Pointer {
    match node {
        IrNode::Var(var) => Pointer::Var { cid, var },
        // Static fields are context-free.
        IrNode::Static(field) => Pointer::StaticField { field },
    }
}
