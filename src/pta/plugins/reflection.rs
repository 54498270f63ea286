//! Reflection resolution.
//!
//! Two complementary strategies, both driven by the options:
//!
//! - **Log replay**: an externally recorded log names the targets of
//!   reflective calls per calling method; matching call sites are resolved
//!   when their enclosing method becomes reachable.
//! - **String-constant inference** (`string-constant` and `solar` modes):
//!   `Class.forName` arguments, `Class`/`Method` metaobjects and method-name
//!   constants are tracked through the points-to sets, and reflective
//!   allocations and invocations are materialized as they become known.
//!   `solar` additionally reports the call sites left unresolved.
//!
//! Resolution order depends on string-constant propagation order; all
//! registrations are idempotent, so late or repeated passes over the same
//! reachable method are harmless.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::*;
use regex::Regex;

use super::super::heap::{ObjId, ObjKind};
use super::super::solver::SolverView;
use super::super::{NodeId, PointsTo};
use super::Plugin;
use crate::error::{AnalysisError, PluginResult};
use crate::graph::pfg::{PFGEdgeKind, Pointer};
use crate::ir::context::EMPTY_CONTEXT;
use crate::ir::known_names;
use crate::ir::program::{CSMethod, ClassId, MethodId};
use crate::ir::stmt::{CSCallSite, CallKind, MethodRef, Stmt};
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::{AnalysisOptions, ReflectionInference};

/// The reflective APIs the handler models.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
enum ReflectiveApi {
    ForName,
    NewInstance,
    GetMethod,
    Invoke,
}

impl ReflectiveApi {
    fn log_key(self) -> &'static str {
        match self {
            ReflectiveApi::ForName => "Class.forName",
            ReflectiveApi::NewInstance => "Class.newInstance",
            ReflectiveApi::GetMethod => "Class.getMethod",
            ReflectiveApi::Invoke => "Method.invoke",
        }
    }
}

struct GetMethodSite {
    callsite: CSCallSite,
    recv_node: NodeId,
    name_node: NodeId,
}

pub struct ReflectionHandler {
    mode: ReflectionInference,
    /// (api, calling-method signature) -> recorded targets.
    log_entries: HashMap<(String, String), Vec<String>>,

    for_name_sites: HashMap<NodeId, Vec<CSCallSite>>,
    new_instance_sites: HashMap<NodeId, Vec<CSCallSite>>,
    get_method_sites: Vec<GetMethodSite>,
    get_method_index: HashMap<NodeId, Vec<usize>>,
    invoke_sites: HashMap<NodeId, Vec<CSCallSite>>,

    wired_invokes: HashSet<(CSCallSite, MethodId)>,
    initialized: HashSet<ClassId>,
    watched: HashSet<CSCallSite>,
    resolved: HashSet<CSCallSite>,
}

impl ReflectionHandler {
    pub fn from_options(options: &AnalysisOptions) -> Result<Self, AnalysisError> {
        let mut log_entries: HashMap<(String, String), Vec<String>> = HashMap::new();
        if let Some(path) = &options.reflection_log {
            let text = std::fs::read_to_string(path).map_err(|e| {
                AnalysisError::Config(format!("cannot read reflection log {}: {e}", path.display()))
            })?;
            let line_re = Regex::new(r"^([A-Za-z.]+);([^;]+);([^;]+)$").unwrap();
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let Some(caps) = line_re.captures(line) else {
                    return Err(AnalysisError::Config(format!(
                        "malformed reflection log line: `{line}`"
                    )));
                };
                log_entries
                    .entry((caps[1].to_string(), caps[2].to_string()))
                    .or_default()
                    .push(caps[3].to_string());
            }
        }
        Ok(ReflectionHandler {
            mode: options.reflection_inference,
            log_entries,
            for_name_sites: HashMap::new(),
            new_instance_sites: HashMap::new(),
            get_method_sites: Vec::new(),
            get_method_index: HashMap::new(),
            invoke_sites: HashMap::new(),
            wired_invokes: HashSet::new(),
            initialized: HashSet::new(),
            watched: HashSet::new(),
            resolved: HashSet::new(),
        })
    }

    fn classify(view: &SolverView<'_>, target: &MethodRef) -> Option<ReflectiveApi> {
        let class_name = &*view.program.class(target.class).name;
        match (class_name, &*target.name) {
            (known_names::CLASS, known_names::FOR_NAME) => Some(ReflectiveApi::ForName),
            (known_names::CLASS, known_names::NEW_INSTANCE) => Some(ReflectiveApi::NewInstance),
            (known_names::CLASS, known_names::GET_METHOD) => Some(ReflectiveApi::GetMethod),
            (known_names::REFLECT_METHOD, known_names::INVOKE) => Some(ReflectiveApi::Invoke),
            _ => None,
        }
    }

    /// Marks a class (superclasses first) as initialized.
    fn initialize_class(&mut self, view: &mut SolverView<'_>, class: ClassId) {
        if !self.initialized.insert(class) {
            return;
        }
        if let Some(superclass) = view.program.class(class).superclass {
            self.initialize_class(view, superclass);
        }
        if let Some(clinit) = view.program.class(class).clinit {
            view.mark_reachable(CSMethod::new(EMPTY_CONTEXT, clinit));
        }
    }

    /// `Class.forName(name)`: initializes the named class and delivers its
    /// class object into the result variable.
    fn resolve_for_name(&mut self, view: &mut SolverView<'_>, callsite: CSCallSite, name: &str) {
        let Some(class) = view.program.class_by_name(name) else {
            warn!("Class.forName of unknown class `{name}`");
            return;
        };
        self.resolved.insert(callsite);
        self.initialize_class(view, class);
        let class_obj = view.heap.get_class_obj(class);
        if let Some(result) = view.program.call_site(callsite.site).result {
            view.add_points_to(&Pointer::var(callsite.cid(), result), class_obj);
        }
    }

    /// `clazz.newInstance()`: mints a reflective allocation of the class and
    /// routes its nullary constructor.
    fn resolve_new_instance(&mut self, view: &mut SolverView<'_>, callsite: CSCallSite, class: ClassId) {
        let program = view.program;
        let Some(ty) = program.get_reference_type(class) else {
            return;
        };
        self.resolved.insert(callsite);
        let obj = view
            .heap
            .get_mock_obj(&format!("reflective/{}", program.class(class).name), ty);
        if let Some(result) = program.call_site(callsite.site).result {
            view.add_points_to(&Pointer::var(callsite.cid(), result), obj);
        }
        let init_ref = MethodRef {
            class,
            name: Arc::from(known_names::INIT),
            descriptor: Arc::from("()"),
        };
        if let Some(init) = program.resolve_method(class, &init_ref) {
            view.bind_instance_call(callsite, CallKind::Special, obj, init);
        }
    }

    /// `clazz.getMethod(name)`: method metaobjects for the matching declared
    /// methods.
    fn resolve_get_method(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        class: ClassId,
        name: &str,
    ) {
        let program = view.program;
        let methods: Vec<MethodId> = program
            .class(class)
            .methods
            .iter()
            .copied()
            .filter(|&m| &*program.method(m).name == name)
            .collect();
        let Some(result) = program.call_site(callsite.site).result else {
            return;
        };
        for method in methods {
            self.resolved.insert(callsite);
            let meta = view.heap.get_method_obj(method);
            view.add_points_to(&Pointer::var(callsite.cid(), result), meta);
        }
    }

    /// `method.invoke(recv, args)`: a synthetic call edge to the reflected
    /// method; the receiver flows into `this` and every element of the
    /// argument array into every parameter.
    fn wire_invoke(&mut self, view: &mut SolverView<'_>, callsite: CSCallSite, method: MethodId) {
        if !self.wired_invokes.insert((callsite, method)) {
            return;
        }
        self.resolved.insert(callsite);
        let program = view.program;
        let data = program.call_site(callsite.site);
        let md = program.method(method);
        let kind = if md.is_static { CallKind::Static } else { CallKind::Virtual };
        let cid = view.strategy.static_call_context(callsite);
        let callee = CSMethod::new(cid, method);
        view.add_call_edge_raw(callsite, kind, callee);
        let Some(body) = &program.method(method).body else {
            return;
        };
        if let (Some(this_var), Some(recv_arg)) = (body.this_var, data.args.first()) {
            view.add_pfg_edge(
                &Pointer::var(callsite.cid(), *recv_arg),
                &Pointer::var(cid, this_var),
                PFGEdgeKind::Copy,
            );
        }
        if let Some(args_array) = data.args.get(1) {
            for param in &body.params {
                view.add_pfg_edge(
                    &Pointer::var(callsite.cid(), *args_array),
                    &Pointer::var(cid, *param),
                    PFGEdgeKind::ArrayLoad,
                );
            }
        }
        if let Some(result) = data.result {
            for ret in &body.ret_vars {
                view.add_pfg_edge(
                    &Pointer::var(cid, *ret),
                    &Pointer::var(callsite.cid(), result),
                    PFGEdgeKind::Copy,
                );
            }
        }
    }

    fn replay_log(&mut self, view: &mut SolverView<'_>, api: ReflectiveApi, callsite: CSCallSite) {
        let caller_sig = view.program.method_sig(callsite.caller.method);
        let key = (api.log_key().to_string(), caller_sig);
        let Some(targets) = self.log_entries.get(&key) else {
            return;
        };
        let targets = targets.clone();
        for target in targets {
            match api {
                ReflectiveApi::ForName => self.resolve_for_name(view, callsite, &target),
                ReflectiveApi::NewInstance => {
                    if let Some(class) = view.program.class_by_name(&target) {
                        self.resolve_new_instance(view, callsite, class);
                    }
                }
                ReflectiveApi::GetMethod | ReflectiveApi::Invoke => {
                    if let Some(method) = view.program.method_by_sig(&target) {
                        match api {
                            ReflectiveApi::GetMethod => {
                                if let Some(result) = view.program.call_site(callsite.site).result {
                                    self.resolved.insert(callsite);
                                    let meta = view.heap.get_method_obj(method);
                                    view.add_points_to(&Pointer::var(callsite.cid(), result), meta);
                                }
                            }
                            _ => self.wire_invoke(view, callsite, method),
                        }
                    } else {
                        warn!("reflection log names unknown method `{target}`");
                    }
                }
            }
        }
    }

    fn infer_by_strings(&self) -> bool {
        matches!(
            self.mode,
            ReflectionInference::StringConstant | ReflectionInference::Solar
        )
    }

    /// Resolves a get-method site against the current class and name sets.
    fn update_get_method_site(&mut self, view: &mut SolverView<'_>, index: usize) {
        let site = &self.get_method_sites[index];
        let callsite = site.callsite;
        let classes: Vec<ClassId> = view
            .full_pts_node(site.recv_node)
            .iter()
            .filter_map(|obj| match &view.heap.obj(obj).kind {
                ObjKind::Class(class) => Some(*class),
                _ => None,
            })
            .collect();
        let names: Vec<Arc<str>> = view
            .full_pts_node(site.name_node)
            .iter()
            .filter_map(|obj| match &view.heap.obj(obj).kind {
                ObjKind::StringConstant(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        for class in classes {
            for name in &names {
                self.resolve_get_method(view, callsite, class, name);
            }
        }
    }
}

impl Plugin for ReflectionHandler {
    fn name(&self) -> &'static str {
        "reflection-handler"
    }

    /// Registers watches for the reflective call sites of a newly reachable
    /// method, and replays any matching log entries.
    fn on_new_cs_method(&mut self, view: &mut SolverView<'_>, csm: CSMethod) -> PluginResult {
        let program = view.program;
        let Some(body) = &program.method(csm.method).body else {
            return Ok(());
        };
        let calls: Vec<_> = body
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Call(site) => Some(*site),
                _ => None,
            })
            .collect();
        for site in calls {
            let data = program.call_site(site);
            let Some(api) = Self::classify(view, &data.target) else {
                continue;
            };
            let callsite = CSCallSite::new(csm, site);
            self.watched.insert(callsite);
            self.replay_log(view, api, callsite);
            if !self.infer_by_strings() {
                continue;
            }
            match api {
                ReflectiveApi::ForName => {
                    let Some(arg) = data.args.first() else { continue };
                    let node = view.node(&Pointer::var(csm.cid, *arg));
                    self.for_name_sites.entry(node).or_default().push(callsite);
                    let known = view.full_pts_node(node);
                    self.resolve_string_objs(view, callsite, &known);
                }
                ReflectiveApi::NewInstance => {
                    let Some(recv) = data.recv else { continue };
                    let node = view.node(&Pointer::var(csm.cid, recv));
                    self.new_instance_sites.entry(node).or_default().push(callsite);
                    let known = view.full_pts_node(node);
                    self.resolve_class_objs(view, callsite, &known);
                }
                ReflectiveApi::GetMethod => {
                    let (Some(recv), Some(arg)) = (data.recv, data.args.first().copied()) else {
                        continue;
                    };
                    let recv_node = view.node(&Pointer::var(csm.cid, recv));
                    let name_node = view.node(&Pointer::var(csm.cid, arg));
                    let index = self.get_method_sites.len();
                    self.get_method_sites.push(GetMethodSite {
                        callsite,
                        recv_node,
                        name_node,
                    });
                    self.get_method_index.entry(recv_node).or_default().push(index);
                    self.get_method_index.entry(name_node).or_default().push(index);
                    self.update_get_method_site(view, index);
                }
                ReflectiveApi::Invoke => {
                    let Some(recv) = data.recv else { continue };
                    let node = view.node(&Pointer::var(csm.cid, recv));
                    self.invoke_sites.entry(node).or_default().push(callsite);
                    let known = view.full_pts_node(node);
                    self.resolve_method_objs(view, callsite, &known);
                }
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
        if !self.infer_by_strings() {
            return Ok(());
        }
        if let Some(callsites) = self.for_name_sites.get(&node).cloned() {
            for callsite in callsites {
                self.resolve_string_objs(view, callsite, delta);
            }
        }
        if let Some(callsites) = self.new_instance_sites.get(&node).cloned() {
            for callsite in callsites {
                self.resolve_class_objs(view, callsite, delta);
            }
        }
        if let Some(indices) = self.get_method_index.get(&node).cloned() {
            for index in indices {
                self.update_get_method_site(view, index);
            }
        }
        if let Some(callsites) = self.invoke_sites.get(&node).cloned() {
            for callsite in callsites {
                self.resolve_method_objs(view, callsite, delta);
            }
        }
        Ok(())
    }

    /// In `solar` mode, reports the reflective call sites that stayed
    /// unresolved.
    fn on_finish(&mut self, view: &mut SolverView<'_>) -> PluginResult {
        if self.mode != ReflectionInference::Solar {
            return Ok(());
        }
        let mut unresolved = 0;
        for callsite in &self.watched {
            if !self.resolved.contains(callsite) {
                unresolved += 1;
                warn!(
                    "unresolved reflective call in {}",
                    view.program.method_sig(callsite.caller.method)
                );
            }
        }
        if unresolved > 0 {
            warn!("{unresolved} reflective call site(s) could not be resolved");
        }
        Ok(())
    }
}

impl ReflectionHandler {
    fn resolve_string_objs(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        objs: &PointsTo<ObjId>,
    ) {
        let names: Vec<Arc<str>> = objs
            .iter()
            .filter_map(|obj| match &view.heap.obj(obj).kind {
                ObjKind::StringConstant(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        for name in names {
            self.resolve_for_name(view, callsite, &name);
        }
    }

    fn resolve_class_objs(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        objs: &PointsTo<ObjId>,
    ) {
        let classes: Vec<ClassId> = objs
            .iter()
            .filter_map(|obj| match &view.heap.obj(obj).kind {
                ObjKind::Class(class) => Some(*class),
                _ => None,
            })
            .collect();
        for class in classes {
            self.resolve_new_instance(view, callsite, class);
        }
    }

    fn resolve_method_objs(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        objs: &PointsTo<ObjId>,
    ) {
        let methods: Vec<MethodId> = objs
            .iter()
            .filter_map(|obj| match &view.heap.obj(obj).kind {
                ObjKind::MethodMeta(method) => Some(*method),
                _ => None,
            })
            .collect();
        for method in methods {
            self.wire_invoke(view, callsite, method);
        }
    }
}
