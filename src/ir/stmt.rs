//! The statement and call-site model: the fixed interface through which a
//! front end describes method bodies to the analysis.

use std::sync::Arc;

use super::context::ContextId;
use super::program::{CSMethod, CallSiteId, ClassId, FieldId, MethodId, TypeId, VarId};

/// Pointer-affecting statements of a method body. Statements with no effect
/// on points-to information are simply not reified.
#[derive(Clone, Debug)]
pub enum Stmt {
    /// `x = new T()` / `x = "literal"`
    New { lhs: VarId, site: super::program::AllocSiteId },
    /// `x = y`
    Copy { lhs: VarId, rhs: VarId },
    /// `x = (T) y`
    Cast { lhs: VarId, rhs: VarId, ty: TypeId },
    /// `x = y.f`
    LoadField { lhs: VarId, base: VarId, field: FieldId },
    /// `x.f = y`
    StoreField { base: VarId, field: FieldId, rhs: VarId },
    /// `x = C.f`
    LoadStatic { lhs: VarId, field: FieldId },
    /// `C.f = y`
    StoreStatic { field: FieldId, rhs: VarId },
    /// `x = y[*]`; all indices of an array are conflated.
    LoadArray { lhs: VarId, base: VarId },
    /// `x[*] = y`
    StoreArray { base: VarId, rhs: VarId },
    /// Any invoke; the payload indexes the program's call-site table.
    Call(CallSiteId),
    /// `throw x`
    Throw { var: VarId },
    /// `return x`
    Return { var: VarId },
}

/// How a call site binds its target.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CallKind {
    /// Receiverless, statically bound.
    Static,
    /// Dispatched on the receiver's dynamic type.
    Virtual,
    /// Like `Virtual`, through an interface reference.
    Interface,
    /// Receiver-carrying but statically bound (constructors, private and
    /// super calls).
    Special,
    /// An `invokedynamic`-style site; desugared by a plugin.
    Dynamic,
}

/// A symbolic method reference as it appears at a call site, resolved
/// against the class hierarchy during the analysis.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub class: ClassId,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
}

pub struct CallSiteData {
    /// The enclosing method.
    pub method: MethodId,
    pub kind: CallKind,
    pub recv: Option<VarId>,
    pub target: MethodRef,
    pub args: Vec<VarId>,
    pub result: Option<VarId>,
}

/// A call site paired with the calling context of its enclosing method.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CSCallSite {
    pub caller: CSMethod,
    pub site: CallSiteId,
}

impl CSCallSite {
    pub fn new(caller: CSMethod, site: CallSiteId) -> Self {
        CSCallSite { caller, site }
    }

    #[inline]
    pub fn cid(&self) -> ContextId {
        self.caller.cid
    }
}

/// A catch handler of a method; thrown objects of a matching type flow into
/// `catch_var`.
#[derive(Clone, Debug)]
pub struct ExceptionHandler {
    pub catch_var: VarId,
    pub ty: TypeId,
}

/// An object-creation site as recorded by the front end.
pub struct AllocSiteData {
    pub method: MethodId,
    pub ty: TypeId,
    /// Set for string-constant sites; the heap model interns one object per
    /// distinct literal (or one overall, depending on options).
    pub string_literal: Option<Arc<str>>,
}
