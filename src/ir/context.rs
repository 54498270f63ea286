//! Interned analysis contexts.
//!
//! A context is an ordered tuple of elements; what the elements are (call
//! sites, heap objects, types) is decided by the context strategy. Contexts
//! are interned by value in a [`ContextCache`] so that identity comparison
//! and hashing reduce to comparing a dense [`ContextId`]. Id 0 is always the
//! empty (insensitive) context.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::hash::Hash;
use std::rc::Rc;

use crate::util::index::{new_index, IndexVec};

new_index! {
    /// The unique identifier for each interned context.
    pub struct ContextId
}

/// The id of the distinguished empty context, shared by every cache.
pub const EMPTY_CONTEXT: ContextId = ContextId::ZERO;

pub trait ContextElement: Clone + Eq + PartialEq + Debug + Hash {}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Context<E: ContextElement> {
    pub(crate) context_elems: Vec<E>,
}

impl<E: ContextElement> Debug for Context<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.context_elems.fmt(f)
    }
}

impl<E: ContextElement> Context<E> {
    pub fn new_empty() -> Rc<Self> {
        Rc::new(Context {
            context_elems: Vec::new(),
        })
    }

    pub fn new(context_elems: Vec<E>) -> Rc<Self> {
        Rc::new(Context { context_elems })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.context_elems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.context_elems.is_empty()
    }

    /// Compose a new context from a given context and a new context element.
    /// The most recent element comes first; older elements beyond the depth
    /// limit `k` are discarded.
    pub fn new_k_limited_context(old_ctx: &Rc<Context<E>>, elem: E, k: usize) -> Rc<Self> {
        let mut elems = Vec::with_capacity(k);
        if k > 0 {
            elems.push(elem);
            if old_ctx.len() < k {
                elems.extend_from_slice(&old_ctx.context_elems[..])
            } else {
                elems.extend_from_slice(&old_ctx.context_elems[..k - 1])
            }
        }
        Rc::new(Context { context_elems: elems })
    }

    /// Truncates a context to its `k` most recent elements.
    pub fn k_limited_context(ctx: &Rc<Context<E>>, k: usize) -> Rc<Self> {
        if ctx.len() <= k {
            ctx.clone()
        } else {
            let elems = ctx.context_elems[..k].to_vec();
            Rc::new(Context { context_elems: elems })
        }
    }

    pub fn first_context_element(&self) -> Option<&E> {
        self.context_elems.first()
    }
}

/// Canonicalizing pool for contexts of one element kind.
pub struct ContextCache<E: ContextElement> {
    context_list: IndexVec<ContextId, Rc<Context<E>>>,
    context_to_index_map: HashMap<Rc<Context<E>>, ContextId>,
}

impl<E: ContextElement> Debug for ContextCache<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.context_list.fmt(f)
    }
}

impl<E: ContextElement> Default for ContextCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ContextElement> ContextCache<E> {
    /// Creates a cache with the empty context pre-interned at id 0.
    pub fn new() -> ContextCache<E> {
        let mut cache = ContextCache {
            context_list: IndexVec::new(),
            context_to_index_map: HashMap::new(),
        };
        let empty_id = cache.get_context_id(&Context::new_empty());
        debug_assert_eq!(empty_id, EMPTY_CONTEXT);
        cache
    }

    /// Returns the id of this context, interning it on first encounter.
    pub fn get_context_id(&mut self, context: &Rc<Context<E>>) -> ContextId {
        if let Some(id) = self.context_to_index_map.get(context) {
            *id
        } else {
            let id = self.context_list.push(context.clone());
            self.context_to_index_map.insert(context.clone(), id);
            id
        }
    }

    /// Returns the context that was interned at this id, or None if the id
    /// stems from a different cache.
    pub fn get_context(&self, id: ContextId) -> Option<Rc<Context<E>>> {
        self.context_list.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.context_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.context_list.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    impl ContextElement for u32 {}

    #[test]
    fn interning_is_by_value() {
        let mut cache: ContextCache<u32> = ContextCache::new();
        assert_eq!(cache.get_context_id(&Context::new_empty()), EMPTY_CONTEXT);

        let a = cache.get_context_id(&Context::new(vec![1, 2]));
        let b = cache.get_context_id(&Context::new(vec![1, 2]));
        let c = cache.get_context_id(&Context::new(vec![2, 1]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.get_context(a).unwrap().len(), 2);
    }

    #[test]
    fn k_limiting_keeps_most_recent_elements() {
        let ctx = Context::new(vec![3, 2, 1]);
        let pushed = Context::new_k_limited_context(&ctx, 4, 3);
        assert_eq!(pushed.context_elems, vec![4, 3, 2]);

        let truncated = Context::k_limited_context(&ctx, 2);
        assert_eq!(truncated.context_elems, vec![3, 2]);

        let zero = Context::new_k_limited_context(&ctx, 4, 0);
        assert!(zero.is_empty());
    }
}
