//! The heap abstraction: maps allocation sites (optionally refined by a heap
//! context) to abstract objects, and interns the synthetic objects plugins
//! introduce. Objects are immutable after interning and carry their concrete
//! type, so cast filtering and dispatch never need the program text again.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ir::context::{ContextId, EMPTY_CONTEXT};
use crate::ir::known_names;
use crate::ir::program::{AllocSiteId, CallSiteId, ClassId, MethodId, Program, Type, TypeId};
use crate::util::index::{new_index, IndexVec};
use crate::util::options::AnalysisOptions;

new_index! {
    /// The unique identifier for each abstract heap object.
    pub struct ObjId
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ObjKind {
    /// A regular allocation site.
    Alloc(AllocSiteId),
    /// A string constant; one object per distinct literal.
    StringConstant(Arc<str>),
    /// Coalesced allocations, one object per type.
    Merged(TypeId),
    /// A `java.lang.Class` metaobject.
    Class(ClassId),
    /// A `java.lang.reflect.Method` metaobject.
    MethodMeta(MethodId),
    /// A named synthetic object registered by a plugin.
    Mock(Arc<str>),
    /// A taint object, keyed by the source call site that produced it.
    Taint(CallSiteId),
}

pub struct ObjData {
    pub kind: ObjKind,
    pub ty: TypeId,
    pub heap_ctx: ContextId,
}

pub struct HeapModel {
    objs: IndexVec<ObjId, ObjData>,
    obj_map: HashMap<(ObjKind, ContextId), ObjId>,

    merge_string_objects: bool,
    merge_string_builders: bool,
    merge_exception_objects: bool,

    object_ty: TypeId,
    string_ty: TypeId,
    class_ty: Option<TypeId>,
    method_ty: Option<TypeId>,
}

impl HeapModel {
    /// Pre-interns the reference type of every declared class (plugins
    /// resolve types immutably during the run); after this the program is
    /// only read.
    pub fn new(program: &mut Program, options: &AnalysisOptions) -> Self {
        for class in program.class_ids() {
            program.reference_type(class);
        }
        let object = program
            .class_by_name(known_names::OBJECT)
            .expect("object class is pre-registered");
        let string = program
            .class_by_name(known_names::STRING)
            .expect("string class is pre-registered");
        let object_ty = program.reference_type(object);
        let string_ty = program.reference_type(string);
        let class_ty = program
            .class_by_name(known_names::CLASS)
            .map(|c| program.reference_type(c));
        let method_ty = program
            .class_by_name(known_names::REFLECT_METHOD)
            .map(|c| program.reference_type(c));
        HeapModel {
            objs: IndexVec::new(),
            obj_map: HashMap::new(),
            merge_string_objects: options.merge_string_objects || !options.distinguish_string_constants,
            merge_string_builders: options.merge_string_builders,
            merge_exception_objects: options.merge_exception_objects,
            object_ty,
            string_ty,
            class_ty,
            method_ty,
        }
    }

    fn intern(&mut self, kind: ObjKind, ty: TypeId, heap_ctx: ContextId) -> ObjId {
        let key = (kind, heap_ctx);
        if let Some(obj) = self.obj_map.get(&key) {
            return *obj;
        }
        let obj = self.objs.push(ObjData {
            kind: key.0.clone(),
            ty,
            heap_ctx,
        });
        self.obj_map.insert(key, obj);
        obj
    }

    /// The abstract object for an allocation site under `heap_ctx`.
    ///
    /// String constants are interned per literal, and the coalescing toggles
    /// redirect string-builder and throwable allocations to one merged
    /// object per type; coalesced objects always live in the empty heap
    /// context.
    pub fn get_alloc_obj(&mut self, program: &Program, site: AllocSiteId, heap_ctx: ContextId) -> ObjId {
        let data = program.alloc_site(site);
        if let Some(literal) = &data.string_literal {
            if self.merge_string_objects {
                return self.intern(ObjKind::Merged(self.string_ty), self.string_ty, EMPTY_CONTEXT);
            }
            return self.intern(ObjKind::StringConstant(literal.clone()), self.string_ty, EMPTY_CONTEXT);
        }
        if let Type::Reference(class) = program.type_of(data.ty) {
            if self.merge_string_builders && known_names::is_string_builder(program, class) {
                return self.intern(ObjKind::Merged(data.ty), data.ty, EMPTY_CONTEXT);
            }
            if self.merge_exception_objects && known_names::is_throwable(program, class) {
                return self.intern(ObjKind::Merged(data.ty), data.ty, EMPTY_CONTEXT);
            }
        }
        self.intern(ObjKind::Alloc(site), data.ty, heap_ctx)
    }

    /// The `java.lang.Class` metaobject of a class.
    pub fn get_class_obj(&mut self, class: ClassId) -> ObjId {
        let ty = self.class_ty.unwrap_or(self.object_ty);
        self.intern(ObjKind::Class(class), ty, EMPTY_CONTEXT)
    }

    /// The `java.lang.reflect.Method` metaobject of a method.
    pub fn get_method_obj(&mut self, method: MethodId) -> ObjId {
        let ty = self.method_ty.unwrap_or(self.object_ty);
        self.intern(ObjKind::MethodMeta(method), ty, EMPTY_CONTEXT)
    }

    /// A named synthetic object, e.g. the main thread.
    pub fn get_mock_obj(&mut self, name: &str, ty: TypeId) -> ObjId {
        self.intern(ObjKind::Mock(Arc::from(name)), ty, EMPTY_CONTEXT)
    }

    /// A taint object originating from a source call site.
    pub fn get_taint_obj(&mut self, source: CallSiteId, ty: Option<TypeId>) -> ObjId {
        let ty = ty.unwrap_or(self.object_ty);
        self.intern(ObjKind::Taint(source), ty, EMPTY_CONTEXT)
    }

    /// The reference type of `java.lang.Object`.
    pub fn object_type(&self) -> TypeId {
        self.object_ty
    }

    #[inline]
    pub fn obj(&self, obj: ObjId) -> &ObjData {
        &self.objs[obj]
    }

    #[inline]
    pub fn obj_type(&self, obj: ObjId) -> TypeId {
        self.objs[obj].ty
    }

    #[inline]
    pub fn is_taint_obj(&self, obj: ObjId) -> bool {
        matches!(self.objs[obj].kind, ObjKind::Taint(_))
    }

    pub fn num_objs(&self) -> usize {
        self.objs.len()
    }

    pub fn iter_objs(&self) -> impl Iterator<Item = (ObjId, &ObjData)> {
        self.objs.iter_enumerated()
    }

    /// A short printable description of an object.
    pub fn describe(&self, program: &Program, obj: ObjId) -> String {
        let data = &self.objs[obj];
        match &data.kind {
            ObjKind::Alloc(site) => format!(
                "new {}@{}",
                program.type_name(data.ty),
                program.method_sig(program.alloc_site(*site).method)
            ),
            ObjKind::StringConstant(lit) => format!("\"{lit}\""),
            ObjKind::Merged(ty) => format!("<merged {}>", program.type_name(*ty)),
            ObjKind::Class(class) => format!("<class {}>", program.class(*class).name),
            ObjKind::MethodMeta(method) => format!("<method {}>", program.method_sig(*method)),
            ObjKind::Mock(name) => format!("<{name}>"),
            ObjKind::Taint(site) => format!(
                "<taint from {}>",
                program.method_sig(program.call_site(*site).method)
            ),
        }
    }
}
