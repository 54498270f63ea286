//! Per-method constraint templates.
//!
//! A `MethodPFG` is the context-free digest of one method body: its internal
//! pointer-flow edges, its allocations, and its call sites classified by how
//! they resolve. It is built once per method; the solver instantiates it for
//! every context the method becomes reachable under.

use crate::ir::program::{AllocSiteId, CallSiteId, FieldId, MethodId, Program, VarId};
use crate::ir::stmt::{CallKind, Stmt};

use super::pfg::PFGEdgeKind;

/// A context-free pointer-flow endpoint inside a method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum IrNode {
    Var(VarId),
    Static(FieldId),
}

/// A tuple of source endpoint, destination endpoint and edge kind.
pub type InternalEdge = (IrNode, IrNode, PFGEdgeKind);

pub struct MethodPFG {
    pub(crate) method: MethodId,
    pub(crate) internal_edges: Vec<InternalEdge>,
    pub(crate) allocs: Vec<(VarId, AllocSiteId)>,

    /// Receiverless call sites, bound when the method becomes reachable.
    pub(crate) static_callsites: Vec<CallSiteId>,
    /// Virtual, interface and special call sites, resolved per receiver
    /// object as points-to information arrives.
    pub(crate) instance_callsites: Vec<CallSiteId>,
    /// `invokedynamic`-style call sites, left to the plugins.
    pub(crate) dynamic_callsites: Vec<CallSiteId>,
}

impl MethodPFG {
    /// Digests a method body into a template. Returns None for methods
    /// without a body (abstract or native).
    pub fn build(program: &Program, method: MethodId) -> Option<MethodPFG> {
        let body = program.method(method).body.as_ref()?;
        let mut mpfg = MethodPFG {
            method,
            internal_edges: Vec::new(),
            allocs: Vec::new(),
            static_callsites: Vec::new(),
            instance_callsites: Vec::new(),
            dynamic_callsites: Vec::new(),
        };

        for stmt in &body.stmts {
            match stmt {
                Stmt::New { lhs, site } => {
                    mpfg.allocs.push((*lhs, *site));
                }
                Stmt::Copy { lhs, rhs } => {
                    mpfg.add_edge(IrNode::Var(*rhs), IrNode::Var(*lhs), PFGEdgeKind::Copy);
                }
                Stmt::Cast { lhs, rhs, ty } => {
                    mpfg.add_edge(IrNode::Var(*rhs), IrNode::Var(*lhs), PFGEdgeKind::Cast(*ty));
                }
                Stmt::LoadField { lhs, base, field } => {
                    mpfg.add_edge(IrNode::Var(*base), IrNode::Var(*lhs), PFGEdgeKind::Load(*field));
                }
                Stmt::StoreField { base, field, rhs } => {
                    mpfg.add_edge(IrNode::Var(*rhs), IrNode::Var(*base), PFGEdgeKind::Store(*field));
                }
                Stmt::LoadStatic { lhs, field } => {
                    mpfg.add_edge(IrNode::Static(*field), IrNode::Var(*lhs), PFGEdgeKind::Copy);
                }
                Stmt::StoreStatic { field, rhs } => {
                    mpfg.add_edge(IrNode::Var(*rhs), IrNode::Static(*field), PFGEdgeKind::Copy);
                }
                Stmt::LoadArray { lhs, base } => {
                    mpfg.add_edge(IrNode::Var(*base), IrNode::Var(*lhs), PFGEdgeKind::ArrayLoad);
                }
                Stmt::StoreArray { base, rhs } => {
                    mpfg.add_edge(IrNode::Var(*rhs), IrNode::Var(*base), PFGEdgeKind::ArrayStore);
                }
                Stmt::Call(site) => match program.call_site(*site).kind {
                    CallKind::Static => mpfg.static_callsites.push(*site),
                    CallKind::Virtual | CallKind::Interface | CallKind::Special => {
                        mpfg.instance_callsites.push(*site)
                    }
                    CallKind::Dynamic => mpfg.dynamic_callsites.push(*site),
                },
                // Return flow is wired per call edge from `ret_vars`; thrown
                // objects are the exception model's concern.
                Stmt::Throw { .. } | Stmt::Return { .. } => {}
            }
        }
        Some(mpfg)
    }

    fn add_edge(&mut self, src: IrNode, dst: IrNode, kind: PFGEdgeKind) {
        self.internal_edges.push((src, dst, kind));
    }

    pub fn internal_edges(&self) -> &[InternalEdge] {
        &self.internal_edges
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::program::{MethodBody, Program};
    use crate::ir::stmt::{CallKind, CallSiteData, MethodRef};

    #[test]
    fn call_sites_are_classified_by_kind() {
        let mut p = Program::new();
        let object = p.class_by_name(crate::ir::known_names::OBJECT).unwrap();
        let a = p.add_class("A", Some(object), false);
        let callee = p.add_method(a, "callee", "()", true);
        let caller = p.add_method(a, "caller", "()", true);
        let recv = p.new_var(caller, "r", None);

        let mref = |p: &Program| MethodRef {
            class: a,
            name: p.method(callee).name.clone(),
            descriptor: p.method(callee).descriptor.clone(),
        };
        let static_site = p.add_call_site(CallSiteData {
            method: caller,
            kind: CallKind::Static,
            recv: None,
            target: mref(&p),
            args: vec![],
            result: None,
        });
        let virtual_site = p.add_call_site(CallSiteData {
            method: caller,
            kind: CallKind::Virtual,
            recv: Some(recv),
            target: mref(&p),
            args: vec![],
            result: None,
        });
        let ty = p.reference_type(a);
        let site = p.add_alloc_site(caller, ty);
        p.set_body(
            caller,
            MethodBody {
                this_var: None,
                params: vec![],
                ret_vars: vec![],
                stmts: vec![
                    Stmt::New { lhs: recv, site },
                    Stmt::Call(static_site),
                    Stmt::Call(virtual_site),
                ],
                handlers: vec![],
            },
        );

        let mpfg = MethodPFG::build(&p, caller).unwrap();
        assert_eq!(mpfg.allocs, vec![(recv, site)]);
        assert_eq!(mpfg.static_callsites, vec![static_site]);
        assert_eq!(mpfg.instance_callsites, vec![virtual_site]);
        assert!(mpfg.dynamic_callsites.is_empty());

        // Methods without a body yield no template.
        assert!(MethodPFG::build(&p, callee).is_none());
    }
}
