//! Exception modeling: thrown objects flow into the type-matching catch
//! handlers of the throwing method and, through per-method exceptional-exit
//! pointers, into the handlers of (transitive) callers. Handler matching
//! reuses the PFG's cast filtering; objects also reach the exceptional exit
//! unconditionally, a deliberate over-approximation.

use super::super::solver::SolverView;
use super::Plugin;
use crate::error::PluginResult;
use crate::graph::pfg::{PFGEdgeKind, Pointer};
use crate::ir::program::CSMethod;
use crate::ir::stmt::{CSCallSite, Stmt};

pub struct ExceptionAnalysis;

impl ExceptionAnalysis {
    pub fn new() -> Self {
        ExceptionAnalysis
    }
}

impl Default for ExceptionAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ExceptionAnalysis {
    fn name(&self) -> &'static str {
        "exception-analysis"
    }

    /// Wires each `throw` to the method's handlers and exceptional exit.
    fn on_new_cs_method(&mut self, view: &mut SolverView<'_>, csm: CSMethod) -> PluginResult {
        let program = view.program;
        let Some(body) = &program.method(csm.method).body else {
            return Ok(());
        };
        let handlers = body.handlers.clone();
        let throws: Vec<_> = body
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Throw { var } => Some(*var),
                _ => None,
            })
            .collect();
        let exit = Pointer::ExceptionExit {
            cid: csm.cid,
            method: csm.method,
        };
        for var in throws {
            let thrown = Pointer::var(csm.cid, var);
            for handler in &handlers {
                view.add_pfg_edge(
                    &thrown,
                    &Pointer::var(csm.cid, handler.catch_var),
                    PFGEdgeKind::Cast(handler.ty),
                );
            }
            view.add_pfg_edge(&thrown, &exit, PFGEdgeKind::Copy);
        }
        Ok(())
    }

    /// Threads the callee's uncaught exceptions into the caller's handler
    /// chain.
    fn on_new_call_edge(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        callee: CSMethod,
    ) -> PluginResult {
        let program = view.program;
        if program.method(callee.method).body.is_none() {
            return Ok(());
        }
        let callee_exit = Pointer::ExceptionExit {
            cid: callee.cid,
            method: callee.method,
        };
        let caller = callsite.caller;
        if let Some(caller_body) = &program.method(caller.method).body {
            for handler in caller_body.handlers.clone() {
                view.add_pfg_edge(
                    &callee_exit,
                    &Pointer::var(caller.cid, handler.catch_var),
                    PFGEdgeKind::Cast(handler.ty),
                );
            }
        }
        let caller_exit = Pointer::ExceptionExit {
            cid: caller.cid,
            method: caller.method,
        };
        view.add_pfg_edge(&callee_exit, &caller_exit, PFGEdgeKind::Copy);
        Ok(())
    }
}
