//! The plugin bus.
//!
//! Plugins observe the analysis through lifecycle hooks and may inject new
//! constraints through the [`SolverView`] passed to every hook. The solver
//! aggregates all registered plugins into one [`CompositePlugin`] and fans
//! events out in registration order. A hook returning an error does not mask
//! the other plugins: the error is logged and the analysis continues, unless
//! the plugin flags it fatal, in which case the solver rethrows it after the
//! current worklist pop completes.

use log::*;

use super::heap::ObjId;
use super::solver::SolverView;
use super::{NodeId, PointsTo};
use crate::error::{PluginError, PluginResult};
use crate::ir::program::{CSMethod, MethodId};
use crate::ir::stmt::CSCallSite;

pub mod class_initializer;
pub mod exception;
pub mod invoke_dynamic;
pub mod reflection;
pub mod taint;
pub mod thread_handler;
pub mod timer;

/// Events queued by [`SolverView`] operations and delivered to the plugins
/// in emission order.
#[derive(Clone, Debug)]
pub enum PluginEvent {
    /// A method became reachable in some context for the first time.
    NewMethod(MethodId),
    /// A context-sensitive method became reachable.
    NewCSMethod(CSMethod),
    /// A call-graph edge was added.
    NewCallEdge { callsite: CSCallSite, callee: CSMethod },
    /// Dynamic dispatch found no target for a receiver object.
    UnresolvedCall { recv: ObjId, callsite: CSCallSite },
}

/// The hook contract between the solver and auxiliary semantic models.
///
/// All hooks default to no-ops; a plugin implements only the events it cares
/// about. Hooks may call back into the solver through the view to add
/// pointer-flow edges, points-to facts, call edges, reachable methods and
/// synthetic objects.
pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Invoked once before the fixpoint iteration starts.
    fn on_start(&mut self, _view: &mut SolverView<'_>) -> PluginResult {
        Ok(())
    }

    /// Invoked once after the worklist has been drained.
    fn on_finish(&mut self, _view: &mut SolverView<'_>) -> PluginResult {
        Ok(())
    }

    /// Invoked when a method becomes reachable under its first context.
    fn on_new_method(&mut self, _view: &mut SolverView<'_>, _method: MethodId) -> PluginResult {
        Ok(())
    }

    /// Invoked for every context a method becomes reachable under.
    fn on_new_cs_method(&mut self, _view: &mut SolverView<'_>, _csm: CSMethod) -> PluginResult {
        Ok(())
    }

    /// Invoked when a new call-graph edge is recorded.
    fn on_new_call_edge(
        &mut self,
        _view: &mut SolverView<'_>,
        _callsite: CSCallSite,
        _callee: CSMethod,
    ) -> PluginResult {
        Ok(())
    }

    /// Invoked after a pointer's points-to set grew by `delta`.
    fn on_new_pts(
        &mut self,
        _view: &mut SolverView<'_>,
        _node: NodeId,
        _delta: &PointsTo<ObjId>,
    ) -> PluginResult {
        Ok(())
    }

    /// Invoked when dynamic dispatch cannot resolve a target for a receiver
    /// object.
    fn on_unresolved_call(
        &mut self,
        _view: &mut SolverView<'_>,
        _recv: ObjId,
        _callsite: CSCallSite,
    ) -> PluginResult {
        Ok(())
    }
}

/// Aggregates the registered plugins and fans every hook out in
/// registration order.
#[derive(Default)]
pub struct CompositePlugin {
    plugins: Vec<Box<dyn Plugin>>,
    pending_fatal: Option<PluginError>,
}

impl CompositePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin. Delivery order is registration order; register
    /// the timer first so its measurement brackets the other plugins.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!("registering plugin `{}`", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Returns the first fatal plugin error recorded since the last call.
    pub fn take_fatal(&mut self) -> Option<PluginError> {
        self.pending_fatal.take()
    }

    fn deliver(&mut self, mut hook: impl FnMut(&mut Box<dyn Plugin>) -> PluginResult) {
        for plugin in &mut self.plugins {
            if let Err(e) = hook(plugin) {
                error!("plugin `{}` failed: {}", e.plugin, e.message);
                if e.fatal && self.pending_fatal.is_none() {
                    self.pending_fatal = Some(e);
                }
            }
        }
    }

    pub fn on_start(&mut self, view: &mut SolverView<'_>) {
        self.deliver(|p| p.on_start(view));
    }

    pub fn on_finish(&mut self, view: &mut SolverView<'_>) {
        self.deliver(|p| p.on_finish(view));
    }

    pub fn on_new_pts(&mut self, view: &mut SolverView<'_>, node: NodeId, delta: &PointsTo<ObjId>) {
        self.deliver(|p| p.on_new_pts(view, node, delta));
    }

    pub fn dispatch(&mut self, view: &mut SolverView<'_>, event: &PluginEvent) {
        match event {
            PluginEvent::NewMethod(method) => self.deliver(|p| p.on_new_method(view, *method)),
            PluginEvent::NewCSMethod(csm) => self.deliver(|p| p.on_new_cs_method(view, *csm)),
            PluginEvent::NewCallEdge { callsite, callee } => {
                self.deliver(|p| p.on_new_call_edge(view, *callsite, *callee))
            }
            PluginEvent::UnresolvedCall { recv, callsite } => {
                self.deliver(|p| p.on_unresolved_call(view, *recv, *callsite))
            }
        }
    }
}

/// Drains the event queue carried by `view`, delivering each event to the
/// plugins. Events emitted while handling an event are processed in turn.
/// Returns the first fatal plugin error, if any.
pub(crate) fn drain_events(
    plugins: &mut CompositePlugin,
    view: &mut SolverView<'_>,
) -> Result<(), crate::error::AnalysisError> {
    while let Some(event) = view.events.pop_front() {
        plugins.dispatch(view, &event);
        if let Some(fatal) = plugins.take_fatal() {
            return Err(fatal.into());
        }
    }
    Ok(())
}
