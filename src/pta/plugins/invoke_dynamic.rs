//! Desugars `invokedynamic`-style call sites.
//!
//! A dynamic call site denotes the creation of a function object: its target
//! reference names the implementation method and its arguments are the
//! captured values. The plugin mints a synthetic closure object into the
//! result variable; when an interface invocation on that object later fails
//! to dispatch (the functional interface has no concrete implementation),
//! the invocation is routed to the implementation method with the captured
//! arguments prepended.

use std::collections::{HashMap, HashSet};

use log::*;

use super::super::heap::ObjId;
use super::super::solver::SolverView;
use super::Plugin;
use crate::error::PluginResult;
use crate::graph::pfg::{PFGEdgeKind, Pointer};
use crate::ir::context::ContextId;
use crate::ir::program::{CSMethod, MethodId, VarId};
use crate::ir::stmt::{CSCallSite, CallKind, Stmt};

struct LambdaInfo {
    target: MethodId,
    /// Captured argument variables, in the context that created the lambda.
    captured: Vec<VarId>,
    capture_cid: ContextId,
}

#[derive(Default)]
pub struct InvokeDynamicAnalysis {
    lambdas: HashMap<ObjId, LambdaInfo>,
    wired: HashSet<(CSCallSite, ObjId)>,
}

impl InvokeDynamicAnalysis {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for InvokeDynamicAnalysis {
    fn name(&self) -> &'static str {
        "invoke-dynamic"
    }

    /// Mints closure objects for the dynamic call sites of a newly
    /// reachable method.
    fn on_new_cs_method(&mut self, view: &mut SolverView<'_>, csm: CSMethod) -> PluginResult {
        let program = view.program;
        let Some(body) = &program.method(csm.method).body else {
            return Ok(());
        };
        for stmt in &body.stmts {
            let Stmt::Call(site) = stmt else { continue };
            let data = program.call_site(*site);
            if data.kind != CallKind::Dynamic {
                continue;
            }
            let Some(target) = program.resolve_method(data.target.class, &data.target) else {
                warn!(
                    "unresolved invokedynamic implementation {}.{}",
                    program.class(data.target.class).name,
                    data.target.name
                );
                continue;
            };
            let Some(result) = data.result else { continue };
            let iface_ty = program
                .var(result)
                .ty
                .unwrap_or_else(|| view.heap.object_type());
            let obj = view
                .heap
                .get_mock_obj(&format!("lambda/{}", site.index()), iface_ty);
            self.lambdas.entry(obj).or_insert(LambdaInfo {
                target,
                captured: data.args.clone(),
                capture_cid: csm.cid,
            });
            view.add_points_to(&Pointer::var(csm.cid, result), obj);
        }
        Ok(())
    }

    /// Routes interface invocations on closure objects to the
    /// implementation method.
    fn on_unresolved_call(
        &mut self,
        view: &mut SolverView<'_>,
        recv: ObjId,
        callsite: CSCallSite,
    ) -> PluginResult {
        if !self.lambdas.contains_key(&recv) {
            return Ok(());
        }
        if !self.wired.insert((callsite, recv)) {
            return Ok(());
        }
        let info = &self.lambdas[&recv];
        let program = view.program;
        let data = program.call_site(callsite.site);
        let cid = view.strategy.static_call_context(callsite);
        let callee = CSMethod::new(cid, info.target);
        view.add_call_edge_raw(callsite, CallKind::Dynamic, callee);

        let Some(target_body) = &program.method(info.target).body else {
            return Ok(());
        };
        // Formals: an implicit receiver (if any) followed by the declared
        // parameters; actuals: captured values, then the invocation's own
        // arguments.
        let mut formals: Vec<Pointer> = Vec::new();
        if let Some(this_var) = target_body.this_var {
            formals.push(Pointer::var(cid, this_var));
        }
        formals.extend(target_body.params.iter().map(|&p| Pointer::var(cid, p)));
        let actuals: Vec<Pointer> = info
            .captured
            .iter()
            .map(|&v| Pointer::var(info.capture_cid, v))
            .chain(data.args.iter().map(|&v| Pointer::var(callsite.cid(), v)))
            .collect();
        for (actual, formal) in actuals.iter().zip(&formals) {
            view.add_pfg_edge(actual, formal, PFGEdgeKind::Copy);
        }
        if let Some(result) = data.result {
            for ret in &target_body.ret_vars {
                view.add_pfg_edge(
                    &Pointer::var(cid, *ret),
                    &Pointer::var(callsite.cid(), result),
                    PFGEdgeKind::Copy,
                );
            }
        }
        Ok(())
    }
}
