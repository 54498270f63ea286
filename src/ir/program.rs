//! The reified program model handed to the analysis by a front end.
//!
//! A [`Program`] holds classes, fields, methods with their statement lists,
//! and entry-point designations. Everything is addressed through dense ids;
//! the structures are append-only, so ids remain stable once handed out.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::context::ContextId;
use super::stmt::{AllocSiteData, CallSiteData, ExceptionHandler, MethodRef, Stmt};
use crate::util::index::{new_index, IndexVec};

new_index! {
    /// The unique identifier for each reference type.
    pub struct TypeId
}

new_index! {
    /// The unique identifier for each class or interface.
    pub struct ClassId
}

new_index! {
    /// The unique identifier for each method.
    pub struct MethodId
}

new_index! {
    /// The unique identifier for each field.
    pub struct FieldId
}

new_index! {
    /// The unique identifier for each local variable, unique program-wide.
    pub struct VarId
}

new_index! {
    /// The unique identifier for each object-creation site.
    pub struct AllocSiteId
}

new_index! {
    /// The unique identifier for each call site.
    pub struct CallSiteId
}

/// A method paired with an analysis context. Reachability of a `CSMethod` is
/// monotone: once it enters the call graph it never leaves.
#[derive(Copy, Clone, Debug, Eq, PartialOrd, PartialEq, Hash, Ord)]
pub struct CSMethod {
    pub cid: ContextId,
    pub method: MethodId,
}

impl CSMethod {
    pub fn new(cid: ContextId, method: MethodId) -> Self {
        Self { cid, method }
    }
}

impl From<CSMethod> for MethodId {
    fn from(m: CSMethod) -> Self {
        m.method
    }
}

/// A reference type: a class/interface or an array over another reference
/// type. Primitive-typed values never carry points-to information and are
/// not registered here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Reference(ClassId),
    Array(TypeId),
}

pub struct ClassData {
    pub name: Arc<str>,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
    /// Application (as opposed to library) classes; the `only-app` option
    /// confines body processing to these.
    pub is_application: bool,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub clinit: Option<MethodId>,
}

pub struct FieldData {
    pub class: ClassId,
    pub name: Arc<str>,
    pub ty: Option<TypeId>,
    pub is_static: bool,
}

pub struct MethodData {
    pub class: ClassId,
    pub name: Arc<str>,
    /// Parameter signature; overriding is keyed on (name, descriptor).
    pub descriptor: Arc<str>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub body: Option<MethodBody>,
}

pub struct MethodBody {
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    pub ret_vars: Vec<VarId>,
    pub stmts: Vec<Stmt>,
    pub handlers: Vec<ExceptionHandler>,
}

pub struct VarData {
    pub method: MethodId,
    pub name: Arc<str>,
    pub ty: Option<TypeId>,
}

pub struct Program {
    pub(crate) classes: IndexVec<ClassId, ClassData>,
    pub(crate) types: IndexVec<TypeId, Type>,
    pub(crate) fields: IndexVec<FieldId, FieldData>,
    pub(crate) methods: IndexVec<MethodId, MethodData>,
    pub(crate) vars: IndexVec<VarId, VarData>,
    pub(crate) alloc_sites: IndexVec<AllocSiteId, AllocSiteData>,
    pub(crate) call_sites: IndexVec<CallSiteId, CallSiteData>,

    type_map: HashMap<Type, TypeId>,
    class_names: HashMap<Arc<str>, ClassId>,
    entry_points: Vec<MethodId>,

    /// Dynamic-dispatch resolution cache. Plugins may consult it lazily and
    /// the front end may warm it from several threads; insertion is
    /// idempotent compute-if-absent.
    dispatch_cache: DashMap<(TypeId, MethodRef), Option<MethodId>>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Creates a program with the root class `java.lang.Object` and
    /// `java.lang.String` pre-registered.
    pub fn new() -> Self {
        let mut program = Program {
            classes: IndexVec::new(),
            types: IndexVec::new(),
            fields: IndexVec::new(),
            methods: IndexVec::new(),
            vars: IndexVec::new(),
            alloc_sites: IndexVec::new(),
            call_sites: IndexVec::new(),
            type_map: HashMap::new(),
            class_names: HashMap::new(),
            entry_points: Vec::new(),
            dispatch_cache: DashMap::new(),
        };
        let object = program.add_class(super::known_names::OBJECT, None, false);
        program.classes[object].is_application = false;
        let string = program.add_class(super::known_names::STRING, Some(object), false);
        program.classes[string].is_application = false;
        program
    }

    /// Registers a class. The name must be unique within the program.
    pub fn add_class(&mut self, name: &str, superclass: Option<ClassId>, is_interface: bool) -> ClassId {
        let name: Arc<str> = Arc::from(name);
        debug_assert!(
            !self.class_names.contains_key(&name),
            "duplicate class {name}"
        );
        let class = self.classes.push(ClassData {
            name: name.clone(),
            superclass,
            interfaces: Vec::new(),
            is_interface,
            is_application: true,
            fields: Vec::new(),
            methods: Vec::new(),
            clinit: None,
        });
        self.class_names.insert(name, class);
        class
    }

    pub fn set_application(&mut self, class: ClassId, is_application: bool) {
        self.classes[class].is_application = is_application;
    }

    /// Patches the superclass link; used by loaders that register classes
    /// before the hierarchy is fully known.
    pub fn set_superclass(&mut self, class: ClassId, superclass: Option<ClassId>) {
        self.classes[class].superclass = superclass;
    }

    pub fn add_interface_impl(&mut self, class: ClassId, iface: ClassId) {
        self.classes[class].interfaces.push(iface);
    }

    /// Interns the reference type of a class.
    pub fn reference_type(&mut self, class: ClassId) -> TypeId {
        self.intern_type(Type::Reference(class))
    }

    /// Interns the array type over an element type.
    pub fn array_type(&mut self, elem: TypeId) -> TypeId {
        self.intern_type(Type::Array(elem))
    }

    fn intern_type(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.type_map.get(&ty) {
            *id
        } else {
            let id = self.types.push(ty);
            self.type_map.insert(ty, id);
            id
        }
    }

    pub fn add_field(&mut self, class: ClassId, name: &str, ty: Option<TypeId>, is_static: bool) -> FieldId {
        let field = self.fields.push(FieldData {
            class,
            name: Arc::from(name),
            ty,
            is_static,
        });
        self.classes[class].fields.push(field);
        field
    }

    /// Registers a method. A body can be attached later with [`Program::set_body`];
    /// methods that never receive one are treated as abstract or native.
    pub fn add_method(&mut self, class: ClassId, name: &str, descriptor: &str, is_static: bool) -> MethodId {
        let method = self.methods.push(MethodData {
            class,
            name: Arc::from(name),
            descriptor: Arc::from(descriptor),
            is_static,
            is_abstract: false,
            body: None,
        });
        self.classes[class].methods.push(method);
        if name == super::known_names::CLINIT {
            self.classes[class].clinit = Some(method);
        }
        method
    }

    pub fn set_abstract(&mut self, method: MethodId) {
        self.methods[method].is_abstract = true;
    }

    pub fn set_body(&mut self, method: MethodId, body: MethodBody) {
        self.methods[method].body = Some(body);
    }

    pub fn new_var(&mut self, method: MethodId, name: &str, ty: Option<TypeId>) -> VarId {
        self.vars.push(VarData {
            method,
            name: Arc::from(name),
            ty,
        })
    }

    pub fn add_alloc_site(&mut self, method: MethodId, ty: TypeId) -> AllocSiteId {
        self.alloc_sites.push(AllocSiteData {
            method,
            ty,
            string_literal: None,
        })
    }

    /// Registers the allocation site of a string literal; the heap model
    /// interns one object per distinct literal.
    pub fn add_string_literal_site(&mut self, method: MethodId, literal: &str) -> AllocSiteId {
        let string_class = self
            .class_by_name(super::known_names::STRING)
            .expect("string class is pre-registered");
        let ty = self.reference_type(string_class);
        self.alloc_sites.push(AllocSiteData {
            method,
            ty,
            string_literal: Some(Arc::from(literal)),
        })
    }

    pub fn add_call_site(&mut self, data: CallSiteData) -> CallSiteId {
        self.call_sites.push(data)
    }

    pub fn add_entry_point(&mut self, method: MethodId) {
        self.entry_points.push(method);
    }

    pub fn entry_points(&self) -> &[MethodId] {
        &self.entry_points
    }

    // Accessors

    #[inline]
    pub fn class(&self, class: ClassId) -> &ClassData {
        &self.classes[class]
    }

    #[inline]
    pub fn type_of(&self, ty: TypeId) -> Type {
        self.types[ty]
    }

    #[inline]
    pub fn field(&self, field: FieldId) -> &FieldData {
        &self.fields[field]
    }

    #[inline]
    pub fn method(&self, method: MethodId) -> &MethodData {
        &self.methods[method]
    }

    #[inline]
    pub fn var(&self, var: VarId) -> &VarData {
        &self.vars[var]
    }

    #[inline]
    pub fn alloc_site(&self, site: AllocSiteId) -> &AllocSiteData {
        &self.alloc_sites[site]
    }

    #[inline]
    pub fn call_site(&self, site: CallSiteId) -> &CallSiteData {
        &self.call_sites[site]
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    pub fn class_ids(&self) -> Vec<ClassId> {
        self.classes.indices().collect()
    }

    /// The reference type of a class, if it has been interned.
    pub fn get_reference_type(&self, class: ClassId) -> Option<TypeId> {
        self.type_map.get(&Type::Reference(class)).copied()
    }

    /// Looks a local variable of a method up by name.
    pub fn var_by_name(&self, method: MethodId, name: &str) -> Option<VarId> {
        self.vars
            .iter_enumerated()
            .find(|(_, v)| v.method == method && &*v.name == name)
            .map(|(id, _)| id)
    }

    /// The call sites of a method, in declaration order.
    pub fn call_sites_in(&self, method: MethodId) -> Vec<CallSiteId> {
        self.call_sites
            .iter_enumerated()
            .filter(|(_, data)| data.method == method)
            .map(|(id, _)| id)
            .collect()
    }

    /// Looks a method up by its `declaring.Class.name` signature; the first
    /// declared overload wins.
    pub fn method_by_sig(&self, sig: &str) -> Option<MethodId> {
        let (class_name, method_name) = sig.rsplit_once('.')?;
        let class = self.class_by_name(class_name)?;
        self.classes[class]
            .methods
            .iter()
            .copied()
            .find(|&m| &*self.methods[m].name == method_name)
    }

    /// The class a reference type dispatches on; array types dispatch on
    /// `java.lang.Object`.
    pub fn dispatch_class(&self, ty: TypeId) -> ClassId {
        match self.types[ty] {
            Type::Reference(class) => class,
            Type::Array(_) => self
                .class_by_name(super::known_names::OBJECT)
                .expect("object class is pre-registered"),
        }
    }

    /// Human-readable method signature, e.g. `com.example.A.foo`.
    pub fn method_sig(&self, method: MethodId) -> String {
        let m = &self.methods[method];
        format!("{}.{}", self.classes[m.class].name, m.name)
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        match self.types[ty] {
            Type::Reference(class) => self.classes[class].name.to_string(),
            Type::Array(elem) => format!("{}[]", self.type_name(elem)),
        }
    }

    /// Whether `sub` is a subtype of `sup`: reflexive class/interface
    /// subtyping, array covariance, and every reference type is a subtype of
    /// `java.lang.Object`.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        match (self.types[sub], self.types[sup]) {
            (_, Type::Reference(sup_class)) if self.is_object_class(sup_class) => true,
            (Type::Reference(sub_class), Type::Reference(sup_class)) => {
                self.is_subclass(sub_class, sup_class)
            }
            (Type::Array(sub_elem), Type::Array(sup_elem)) => self.is_subtype(sub_elem, sup_elem),
            _ => false,
        }
    }

    /// Reflexive, transitive subclass/implements relation.
    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup {
            return true;
        }
        let data = &self.classes[sub];
        if let Some(superclass) = data.superclass {
            if self.is_subclass(superclass, sup) {
                return true;
            }
        }
        data.interfaces.iter().any(|&iface| self.is_subclass(iface, sup))
    }

    fn is_object_class(&self, class: ClassId) -> bool {
        self.classes[class].superclass.is_none() && !self.classes[class].is_interface
    }

    /// Finds the method matching `mref`'s subsignature for `class`. This is
    /// the static resolution step shared by every call kind: the superclass
    /// chain wins, and a class that declares no match inherits a non-abstract
    /// default from its (transitive) superinterfaces, mirroring the
    /// subtyping walk of [`Program::is_subclass`]. Interfaces are searched
    /// in declaration order; the first default found wins.
    pub fn resolve_method(&self, class: ClassId, mref: &MethodRef) -> Option<MethodId> {
        let mut cursor = Some(class);
        while let Some(c) = cursor {
            if let Some(m) = self.declared_method(c, mref) {
                return Some(m);
            }
            cursor = self.classes[c].superclass;
        }
        let mut cursor = Some(class);
        while let Some(c) = cursor {
            for &iface in &self.classes[c].interfaces {
                if let Some(m) = self.default_interface_method(iface, mref) {
                    return Some(m);
                }
            }
            cursor = self.classes[c].superclass;
        }
        None
    }

    /// The matching method declared directly on `class`, if any.
    fn declared_method(&self, class: ClassId, mref: &MethodRef) -> Option<MethodId> {
        self.classes[class].methods.iter().copied().find(|&m| {
            let md = &self.methods[m];
            md.name == mref.name && md.descriptor == mref.descriptor
        })
    }

    /// A non-abstract (default) match declared on `iface` or one of its
    /// superinterfaces.
    fn default_interface_method(&self, iface: ClassId, mref: &MethodRef) -> Option<MethodId> {
        if let Some(m) = self.declared_method(iface, mref) {
            if !self.methods[m].is_abstract {
                return Some(m);
            }
        }
        for &sup in &self.classes[iface].interfaces {
            if let Some(m) = self.default_interface_method(sup, mref) {
                return Some(m);
            }
        }
        None
    }

    /// Dynamic dispatch: resolves the concrete target of `mref` for a
    /// receiver of type `recv_ty`. Abstract targets do not resolve. Results
    /// are cached; the cache tolerates concurrent callers.
    pub fn dispatch(&self, recv_ty: TypeId, mref: &MethodRef) -> Option<MethodId> {
        let key = (recv_ty, mref.clone());
        if let Some(cached) = self.dispatch_cache.get(&key) {
            return *cached;
        }
        let resolved = self
            .resolve_method(self.dispatch_class(recv_ty), mref)
            .filter(|&m| !self.methods[m].is_abstract);
        *self.dispatch_cache.entry(key).or_insert(resolved)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subtyping_follows_hierarchy_and_arrays() {
        let mut p = Program::new();
        let object = p.class_by_name(crate::ir::known_names::OBJECT).unwrap();
        let a = p.add_class("A", Some(object), false);
        let b = p.add_class("B", Some(a), false);
        let i = p.add_class("I", None, true);
        p.add_interface_impl(a, i);

        let t_obj = p.reference_type(object);
        let t_a = p.reference_type(a);
        let t_b = p.reference_type(b);
        let t_i = p.reference_type(i);
        assert!(p.is_subtype(t_b, t_a));
        assert!(p.is_subtype(t_b, t_i));
        assert!(p.is_subtype(t_a, t_obj));
        assert!(!p.is_subtype(t_a, t_b));

        let arr_a = p.array_type(t_a);
        let arr_b = p.array_type(t_b);
        assert!(p.is_subtype(arr_b, arr_a));
        assert!(p.is_subtype(arr_a, t_obj));
    }

    #[test]
    fn dispatch_resolves_overrides() {
        let mut p = Program::new();
        let object = p.class_by_name(crate::ir::known_names::OBJECT).unwrap();
        let i = p.add_class("I", None, true);
        let c = p.add_class("C", Some(object), false);
        p.add_interface_impl(c, i);
        let d = p.add_class("D", Some(c), false);

        let i_m = p.add_method(i, "m", "()", false);
        p.set_abstract(i_m);
        let c_m = p.add_method(c, "m", "()", false);

        let mref = MethodRef {
            class: i,
            name: Arc::from("m"),
            descriptor: Arc::from("()"),
        };
        let t_c = p.reference_type(c);
        let t_d = p.reference_type(d);
        assert_eq!(p.dispatch(t_c, &mref), Some(c_m));
        // D inherits C.m; the abstract interface method never wins.
        assert_eq!(p.dispatch(t_d, &mref), Some(c_m));
    }

    #[test]
    fn dispatch_inherits_interface_defaults() {
        let mut p = Program::new();
        let object = p.class_by_name(crate::ir::known_names::OBJECT).unwrap();
        // J declares the default; I extends J; C implements I without
        // overriding it, D overrides.
        let j = p.add_class("J", None, true);
        let i = p.add_class("I", None, true);
        p.add_interface_impl(i, j);
        let j_m = p.add_method(j, "m", "()", false);
        let c = p.add_class("C", Some(object), false);
        p.add_interface_impl(c, i);
        let d = p.add_class("D", Some(c), false);
        let d_m = p.add_method(d, "m", "()", false);

        let mref = MethodRef {
            class: j,
            name: Arc::from("m"),
            descriptor: Arc::from("()"),
        };
        let t_c = p.reference_type(c);
        let t_d = p.reference_type(d);
        // Resolution walks the interfaces consistently with `is_subclass`:
        // the superinterface default is inherited, and a class override
        // still takes precedence.
        assert!(p.is_subclass(c, j));
        assert_eq!(p.dispatch(t_c, &mref), Some(j_m));
        assert_eq!(p.dispatch(t_d, &mref), Some(d_m));
    }
}
