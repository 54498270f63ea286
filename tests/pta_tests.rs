//! End-to-end checks of the core solver semantics on small programs.

mod common;

use common::*;
use oopta::error::PluginResult;
use oopta::graph::pfg::Pointer;
use oopta::ir::context::EMPTY_CONTEXT;
use oopta::ir::program::MethodId;
use oopta::pta::context_strategy::ContextInsensitive;
use oopta::pta::heap::HeapModel;
use oopta::pta::plugins::Plugin;
use oopta::pta::solver::{ContextSensitivePTA, SolverView};
use oopta::pta::CancelToken;
use oopta::pts_set::points_to::PointsToSet;
use oopta::util::options::AnalysisOptions;

#[test]
fn alias_via_assignment() {
    let program = r#"{"classes": [
        {"name": "A", "methods": [
            {"name": "<init>", "descriptor": "()", "this": "this", "stmts": []}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "a", "type": "A"},
                {"op": "invoke", "kind": "special", "recv": "a",
                 "class": "A", "name": "<init>", "descriptor": "()"},
                {"op": "copy", "lhs": "b", "rhs": "a"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(program, "ci");

    let expected = descs(&["new A@Main.main"]);
    assert_eq!(pts_descs(&program, &result, "Main.main", "a"), expected);
    assert_eq!(pts_descs(&program, &result, "Main.main", "b"), expected);

    assert!(result.is_reachable(method(&program, "Main.main")));
    assert!(result.is_reachable(method(&program, "A.<init>")));
    assert_eq!(callees(&program, &result, "Main.main", 0), descs(&["A.<init>"]));

    // The receiver object reaches the constructor's `this`.
    assert_eq!(pts_descs(&program, &result, "A.<init>", "this"), expected);
}

#[test]
fn virtual_dispatch_discovers_override() {
    let program = r#"{"classes": [
        {"name": "I", "interface": true, "methods": [
            {"name": "m", "descriptor": "()", "abstract": true}
        ]},
        {"name": "C", "interfaces": ["I"], "methods": [
            {"name": "m", "descriptor": "()", "this": "this", "stmts": []}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "x", "type": "C"},
                {"op": "invoke", "kind": "interface", "recv": "x",
                 "class": "I", "name": "m", "descriptor": "()"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(program, "ci");

    assert_eq!(callees(&program, &result, "Main.main", 0), descs(&["C.m"]));
    assert!(!result.is_reachable(method(&program, "I.m")));
    assert_eq!(
        pts_descs(&program, &result, "C.m", "this"),
        descs(&["new C@Main.main"])
    );
}

#[test]
fn virtual_dispatch_falls_back_to_interface_default() {
    let program = r#"{"classes": [
        {"name": "A"},
        {"name": "I", "interface": true, "methods": [
            {"name": "m", "descriptor": "()", "this": "this", "stmts": [
                {"op": "new", "lhs": "v", "type": "A"},
                {"op": "return", "var": "v"}
            ]}
        ]},
        {"name": "C", "interfaces": ["I"], "methods": []},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "x", "type": "C"},
                {"op": "invoke", "kind": "interface", "recv": "x",
                 "class": "I", "name": "m", "descriptor": "()", "result": "r"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(program, "ci");

    // C declares no override, so the call resolves to the interface's
    // default method.
    assert_eq!(callees(&program, &result, "Main.main", 0), descs(&["I.m"]));
    assert_eq!(
        pts_descs(&program, &result, "I.m", "this"),
        descs(&["new C@Main.main"])
    );
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "r"),
        descs(&["new A@I.m"])
    );
}

#[test]
fn field_store_then_load() {
    let program = r#"{"classes": [
        {"name": "A", "fields": [{"name": "f"}]},
        {"name": "B"},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "a", "type": "A"},
                {"op": "new", "lhs": "b", "type": "B"},
                {"op": "store-field", "base": "a", "field": "A.f", "rhs": "b"},
                {"op": "load-field", "lhs": "c", "base": "a", "field": "A.f"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(program, "ci");

    assert_eq!(
        pts_descs(&program, &result, "Main.main", "c"),
        descs(&["new B@Main.main"])
    );

    // The instance-field pointer of the A object holds the B object.
    let fields: Vec<_> = result.iter_instance_fields().collect();
    assert_eq!(fields.len(), 1);
    let (_obj, field, pts) = &fields[0];
    assert_eq!(&*program.field(*field).name, "f");
    assert_eq!(pts.count(), 1);
}

#[test]
fn cast_filters_incompatible_objects() {
    let program = r#"{"classes": [
        {"name": "A"},
        {"name": "B"},
        {"name": "C"},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "x", "type": "A"},
                {"op": "new", "lhs": "y", "type": "B"},
                {"op": "copy", "lhs": "z", "rhs": "x"},
                {"op": "copy", "lhs": "z", "rhs": "y"},
                {"op": "cast", "lhs": "c", "rhs": "z", "type": "C"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(program, "ci");

    assert_eq!(pts_descs(&program, &result, "Main.main", "z").len(), 2);
    assert!(pts_descs(&program, &result, "Main.main", "c").is_empty());
}

#[test]
fn cast_passes_subtypes() {
    let program = r#"{"classes": [
        {"name": "A"},
        {"name": "B", "super": "A"},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "x", "type": "B"},
                {"op": "copy", "lhs": "z", "rhs": "x"},
                {"op": "cast", "lhs": "c", "rhs": "z", "type": "A"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(program, "ci");
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "c"),
        descs(&["new B@Main.main"])
    );
}

const ID_PROGRAM: &str = r#"{"classes": [
    {"name": "A"},
    {"name": "B"},
    {"name": "Id", "methods": [
        {"name": "id", "descriptor": "(Object)", "static": true,
         "params": ["t"], "stmts": [{"op": "return", "var": "t"}]}
    ]},
    {"name": "Main", "methods": [
        {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
            {"op": "new", "lhs": "a", "type": "A"},
            {"op": "invoke", "kind": "static", "class": "Id", "name": "id",
             "descriptor": "(Object)", "args": ["a"], "result": "r1"},
            {"op": "new", "lhs": "b", "type": "B"},
            {"op": "invoke", "kind": "static", "class": "Id", "name": "id",
             "descriptor": "(Object)", "args": ["b"], "result": "r2"}
        ]}
    ]}
]}"#;

#[test]
fn one_call_sensitivity_distinguishes_call_sites() {
    let (program, result) = analyze(ID_PROGRAM, "1-call");
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "r1"),
        descs(&["new A@Main.main"])
    );
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "r2"),
        descs(&["new B@Main.main"])
    );
}

#[test]
fn insensitive_analysis_conflates_call_sites() {
    let (program, result) = analyze(ID_PROGRAM, "ci");
    let both = descs(&["new A@Main.main", "new B@Main.main"]);
    assert_eq!(pts_descs(&program, &result, "Main.main", "r1"), both);
    assert_eq!(pts_descs(&program, &result, "Main.main", "r2"), both);
}

/// A plugin that injects a synthetic object into `Main.main`'s `x` when the
/// method becomes reachable, as an implicit-allocation model would.
struct InjectObj {
    entry: MethodId,
    done: bool,
}

impl Plugin for InjectObj {
    fn name(&self) -> &'static str {
        "inject-obj"
    }

    fn on_new_method(&mut self, view: &mut SolverView<'_>, method: MethodId) -> PluginResult {
        if method != self.entry || self.done {
            return Ok(());
        }
        self.done = true;
        let class = view.program.class_by_name("A").unwrap();
        let ty = view.program.get_reference_type(class).unwrap();
        let obj = view.heap.get_mock_obj("synth", ty);
        let x = view.program.var_by_name(method, "x").unwrap();
        view.add_points_to(&Pointer::var(EMPTY_CONTEXT, x), obj);
        Ok(())
    }
}

#[test]
fn plugin_injected_points_to_triggers_dispatch() {
    let json = r#"{"classes": [
        {"name": "A", "methods": [
            {"name": "m", "descriptor": "()", "this": "this", "stmts": []}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true,
             "vars": [{"name": "x", "type": "A"}],
             "stmts": [
                {"op": "invoke", "kind": "virtual", "recv": "x",
                 "class": "A", "name": "m", "descriptor": "()"}
            ]}
        ]}
    ]}"#;
    let mut program = load(json);
    let options = AnalysisOptions::default();
    let heap = HeapModel::new(&mut program, &options);
    let entry = method(&program, "Main.main");

    let mut pta = ContextSensitivePTA::new(&program, &options, heap, ContextInsensitive, CancelToken::new());
    pta.register_plugin(Box::new(InjectObj { entry, done: false }));
    let result = pta.solve().expect("analysis reaches its fixpoint");

    assert_eq!(pts_descs(&program, &result, "Main.main", "x"), descs(&["<synth>"]));
    assert!(result.is_reachable(method(&program, "A.m")));
    assert_eq!(callees(&program, &result, "Main.main", 0), descs(&["A.m"]));
}
