//! Thread modeling: `Thread.start()` dispatches to the receiver's `run()`
//! method, and `Thread.currentThread()` returns the mock main-thread object.

use std::collections::HashMap;
use std::sync::Arc;

use log::*;

use super::super::heap::ObjId;
use super::super::solver::SolverView;
use super::super::{NodeId, PointsTo};
use super::Plugin;
use crate::error::PluginResult;
use crate::graph::pfg::Pointer;
use crate::ir::known_names;
use crate::ir::program::CSMethod;
use crate::ir::stmt::{CSCallSite, CallKind, MethodRef, Stmt};
use crate::pts_set::points_to::PointsToSet;

#[derive(Default)]
pub struct ThreadHandler {
    /// Receiver nodes of `Thread.start()` call sites.
    start_callsites: HashMap<NodeId, Vec<CSCallSite>>,
    main_thread: Option<ObjId>,
}

impl ThreadHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn dispatch_run(&self, view: &mut SolverView<'_>, callsite: CSCallSite, recv: ObjId) {
        let program = view.program;
        let Some(thread_class) = program.class_by_name(known_names::THREAD) else {
            return;
        };
        let run_ref = MethodRef {
            class: thread_class,
            name: Arc::from(known_names::THREAD_RUN),
            descriptor: Arc::from("()"),
        };
        match program.dispatch(view.heap.obj_type(recv), &run_ref) {
            Some(run) => view.bind_instance_call(callsite, CallKind::Virtual, recv, run),
            None => debug!(
                "no run() implementation for {}",
                view.heap.describe(program, recv)
            ),
        }
    }
}

impl Plugin for ThreadHandler {
    fn name(&self) -> &'static str {
        "thread-handler"
    }

    /// Seeds the abstract main thread.
    fn on_start(&mut self, view: &mut SolverView<'_>) -> PluginResult {
        if let Some(thread_class) = view.program.class_by_name(known_names::THREAD) {
            if let Some(ty) = view.program.get_reference_type(thread_class) {
                self.main_thread = Some(view.heap.get_mock_obj("main-thread", ty));
            }
        }
        Ok(())
    }

    fn on_new_cs_method(&mut self, view: &mut SolverView<'_>, csm: CSMethod) -> PluginResult {
        let program = view.program;
        let Some(body) = &program.method(csm.method).body else {
            return Ok(());
        };
        for stmt in &body.stmts {
            let Stmt::Call(site) = stmt else { continue };
            let data = program.call_site(*site);
            if data.kind != CallKind::Virtual
                || &*data.target.name != known_names::THREAD_START
                || !known_names::is_thread(program, data.target.class)
            {
                continue;
            }
            let Some(recv) = data.recv else { continue };
            let callsite = CSCallSite::new(csm, *site);
            let node = view.node(&Pointer::var(csm.cid, recv));
            self.start_callsites.entry(node).or_default().push(callsite);
            // Threads the receiver already points to start as well.
            let existing = view.full_pts_node(node);
            for obj in existing.iter() {
                self.dispatch_run(view, callsite, obj);
            }
        }
        Ok(())
    }

    fn on_new_pts(
        &mut self,
        view: &mut SolverView<'_>,
        node: NodeId,
        delta: &PointsTo<ObjId>,
    ) -> PluginResult {
        let Some(callsites) = self.start_callsites.get(&node) else {
            return Ok(());
        };
        let callsites = callsites.clone();
        for obj in delta.iter() {
            for callsite in &callsites {
                self.dispatch_run(view, *callsite, obj);
            }
        }
        Ok(())
    }

    /// `Thread.currentThread()` returns the main-thread object.
    fn on_new_call_edge(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        callee: CSMethod,
    ) -> PluginResult {
        let Some(main_thread) = self.main_thread else {
            return Ok(());
        };
        let program = view.program;
        let md = program.method(callee.method);
        if &*md.name == "currentThread" && known_names::is_thread(program, md.class) {
            if let Some(result) = program.call_site(callsite.site).result {
                view.add_points_to(&Pointer::var(callsite.cid(), result), main_thread);
            }
        }
        Ok(())
    }
}
