//! Context selector variants.
//!
//! A strategy decides the callee context at each resolved call and the heap
//! context attached to new objects. All variants speak in interned
//! [`ContextId`]s, which keeps the trait object-safe; the element kind
//! (call sites, objects, types) is private to each variant.

use std::rc::Rc;

use super::heap::{HeapModel, ObjId};
use crate::ir::context::{Context, ContextCache, ContextElement, ContextId, EMPTY_CONTEXT};
use crate::ir::program::{CallSiteId, TypeId};
use crate::ir::stmt::CSCallSite;

impl ContextElement for CallSiteId {}
impl ContextElement for ObjId {}
impl ContextElement for TypeId {}

pub trait ContextStrategy {
    fn name(&self) -> &'static str;

    /// The distinguished insensitive context.
    fn empty_context(&mut self) -> ContextId {
        EMPTY_CONTEXT
    }

    /// The callee context of a receiverless, statically bound call.
    fn static_call_context(&mut self, callsite: CSCallSite) -> ContextId;

    /// The callee context of an instance call resolved for one receiver
    /// object.
    fn instance_call_context(&mut self, callsite: CSCallSite, recv: ObjId, heap: &HeapModel) -> ContextId;

    /// The heap context for allocations performed under `method_ctx`.
    fn heap_context(&mut self, method_ctx: ContextId) -> ContextId;

    /// The number of contexts interned so far.
    fn num_contexts(&self) -> usize;

    /// Printable rendition of an interned context, for result dumping.
    fn describe(&self, ctx: ContextId) -> String;
}

/// `ci`: every entity lives in the empty context.
pub struct ContextInsensitive;

impl ContextStrategy for ContextInsensitive {
    fn name(&self) -> &'static str {
        "ci"
    }

    fn static_call_context(&mut self, _callsite: CSCallSite) -> ContextId {
        EMPTY_CONTEXT
    }

    fn instance_call_context(&mut self, _callsite: CSCallSite, _recv: ObjId, _heap: &HeapModel) -> ContextId {
        EMPTY_CONTEXT
    }

    fn heap_context(&mut self, _method_ctx: ContextId) -> ContextId {
        EMPTY_CONTEXT
    }

    fn num_contexts(&self) -> usize {
        1
    }

    fn describe(&self, _ctx: ContextId) -> String {
        "[]".to_string()
    }
}

/// `k-call`: contexts are the `k` most recent call sites; heap contexts are
/// the allocating method's context truncated to `k - 1`.
pub struct KCallSiteSensitive {
    k: usize,
    cache: ContextCache<CallSiteId>,
}

impl KCallSiteSensitive {
    pub fn new(k: usize) -> Self {
        KCallSiteSensitive {
            k,
            cache: ContextCache::new(),
        }
    }

    fn ctx(&self, id: ContextId) -> Rc<Context<CallSiteId>> {
        self.cache.get_context(id).expect("context interned by this strategy")
    }
}

impl ContextStrategy for KCallSiteSensitive {
    fn name(&self) -> &'static str {
        "k-call"
    }

    fn static_call_context(&mut self, callsite: CSCallSite) -> ContextId {
        let caller_ctx = self.ctx(callsite.cid());
        let callee_ctx = Context::new_k_limited_context(&caller_ctx, callsite.site, self.k);
        self.cache.get_context_id(&callee_ctx)
    }

    fn instance_call_context(&mut self, callsite: CSCallSite, _recv: ObjId, _heap: &HeapModel) -> ContextId {
        // Call-site sensitivity does not look at the receiver.
        self.static_call_context(callsite)
    }

    fn heap_context(&mut self, method_ctx: ContextId) -> ContextId {
        let ctx = self.ctx(method_ctx);
        let heap_ctx = Context::k_limited_context(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&heap_ctx)
    }

    fn num_contexts(&self) -> usize {
        self.cache.len()
    }

    fn describe(&self, ctx: ContextId) -> String {
        format!("{:?}", self.ctx(ctx))
    }
}

/// `k-obj`: contexts are the receiver object prepended to its own heap
/// context; static calls fall back to the caller's context.
pub struct KObjectSensitive {
    k: usize,
    cache: ContextCache<ObjId>,
}

impl KObjectSensitive {
    pub fn new(k: usize) -> Self {
        KObjectSensitive {
            k,
            cache: ContextCache::new(),
        }
    }

    fn ctx(&self, id: ContextId) -> Rc<Context<ObjId>> {
        self.cache.get_context(id).expect("context interned by this strategy")
    }
}

impl ContextStrategy for KObjectSensitive {
    fn name(&self) -> &'static str {
        "k-obj"
    }

    fn static_call_context(&mut self, callsite: CSCallSite) -> ContextId {
        let caller_ctx = self.ctx(callsite.cid());
        let callee_ctx = Context::k_limited_context(&caller_ctx, self.k);
        self.cache.get_context_id(&callee_ctx)
    }

    fn instance_call_context(&mut self, _callsite: CSCallSite, recv: ObjId, heap: &HeapModel) -> ContextId {
        let alloc_ctx = self.ctx(heap.obj(recv).heap_ctx);
        let callee_ctx = Context::new_k_limited_context(&alloc_ctx, recv, self.k);
        self.cache.get_context_id(&callee_ctx)
    }

    fn heap_context(&mut self, method_ctx: ContextId) -> ContextId {
        let ctx = self.ctx(method_ctx);
        let heap_ctx = Context::k_limited_context(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&heap_ctx)
    }

    fn num_contexts(&self) -> usize {
        self.cache.len()
    }

    fn describe(&self, ctx: ContextId) -> String {
        format!("{:?}", self.ctx(ctx))
    }
}

/// `k-type`: like `k-obj` with the receiver object's type standing in for
/// its identity.
pub struct KTypeSensitive {
    k: usize,
    cache: ContextCache<TypeId>,
}

impl KTypeSensitive {
    pub fn new(k: usize) -> Self {
        KTypeSensitive {
            k,
            cache: ContextCache::new(),
        }
    }

    fn ctx(&self, id: ContextId) -> Rc<Context<TypeId>> {
        self.cache.get_context(id).expect("context interned by this strategy")
    }
}

impl ContextStrategy for KTypeSensitive {
    fn name(&self) -> &'static str {
        "k-type"
    }

    fn static_call_context(&mut self, callsite: CSCallSite) -> ContextId {
        let caller_ctx = self.ctx(callsite.cid());
        let callee_ctx = Context::k_limited_context(&caller_ctx, self.k);
        self.cache.get_context_id(&callee_ctx)
    }

    fn instance_call_context(&mut self, _callsite: CSCallSite, recv: ObjId, heap: &HeapModel) -> ContextId {
        let alloc_ctx = self.ctx(heap.obj(recv).heap_ctx);
        let callee_ctx = Context::new_k_limited_context(&alloc_ctx, heap.obj_type(recv), self.k);
        self.cache.get_context_id(&callee_ctx)
    }

    fn heap_context(&mut self, method_ctx: ContextId) -> ContextId {
        let ctx = self.ctx(method_ctx);
        let heap_ctx = Context::k_limited_context(&ctx, self.k.saturating_sub(1));
        self.cache.get_context_id(&heap_ctx)
    }

    fn num_contexts(&self) -> usize {
        self.cache.len()
    }

    fn describe(&self, ctx: ContextId) -> String {
        format!("{:?}", self.ctx(ctx))
    }
}
