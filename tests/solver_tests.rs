//! Solver-mode cross-checks, cancellation, configuration errors and
//! heap-model toggles.

mod common;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common::*;
use oopta::error::AnalysisError;
use oopta::ir::program::Program;
use oopta::pta::result::PTAResult;
use oopta::pta::{run_pta_with_cancel, CancelToken};
use oopta::util::options::{AnalysisOptions, SolverKind};

const CROSS_CHECK_PROGRAM: &str = r#"{"classes": [
    {"name": "A"},
    {"name": "B"},
    {"name": "I", "interface": true, "methods": [
        {"name": "put", "descriptor": "(Object)", "abstract": true}
    ]},
    {"name": "Cell", "interfaces": ["I"],
     "fields": [{"name": "f"}],
     "methods": [
        {"name": "put", "descriptor": "(Object)", "this": "this", "params": ["v"],
         "stmts": [{"op": "store-field", "base": "this", "field": "Cell.f", "rhs": "v"}]},
        {"name": "take", "descriptor": "()", "this": "this",
         "stmts": [{"op": "load-field", "lhs": "r", "base": "this", "field": "Cell.f"},
                   {"op": "return", "var": "r"}]}
    ]},
    {"name": "Main", "methods": [
        {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
            {"op": "new", "lhs": "c1", "type": "Cell"},
            {"op": "new", "lhs": "c2", "type": "Cell"},
            {"op": "new", "lhs": "a", "type": "A"},
            {"op": "new", "lhs": "b", "type": "B"},
            {"op": "invoke", "kind": "interface", "recv": "c1", "class": "I",
             "name": "put", "descriptor": "(Object)", "args": ["a"]},
            {"op": "invoke", "kind": "interface", "recv": "c2", "class": "I",
             "name": "put", "descriptor": "(Object)", "args": ["b"]},
            {"op": "invoke", "kind": "virtual", "recv": "c1", "class": "Cell",
             "name": "take", "descriptor": "()", "result": "x"},
            {"op": "copy", "lhs": "arr", "rhs": "c1"},
            {"op": "store-array", "base": "arr", "rhs": "b"},
            {"op": "load-array", "lhs": "e", "base": "arr"}
        ]}
    ]}
]}"#;

/// A stable digest of a result: every variable's context-insensitive
/// points-to set plus the reachable methods and edge count.
fn digest(program: &Program, result: &PTAResult) -> (BTreeMap<String, BTreeSet<String>>, BTreeSet<String>, usize) {
    use oopta::pts_set::points_to::PointsToSet;
    let mut pts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (_cid, var, set) in result.iter_vars() {
        let var_data = program.var(var);
        let name = format!("{}/{}", program.method_sig(var_data.method), var_data.name);
        let objs = pts.entry(name).or_default();
        for obj in set.iter() {
            objs.insert(result.heap().describe(program, obj));
        }
    }
    let reachable = result
        .reachable_method_ids()
        .into_iter()
        .map(|m| program.method_sig(m))
        .collect();
    (pts, reachable, result.call_graph().num_edges())
}

#[test]
fn default_and_simple_solver_agree() {
    for cs in ["ci", "1-call", "1-obj"] {
        let mut default_options = options_with_cs(cs);
        default_options.solver = SolverKind::Default;
        let (p1, r1) = analyze_with(CROSS_CHECK_PROGRAM, default_options);

        let mut simple_options = options_with_cs(cs);
        simple_options.solver = SolverKind::Simple;
        let (p2, r2) = analyze_with(CROSS_CHECK_PROGRAM, simple_options);

        assert_eq!(digest(&p1, &r1), digest(&p2, &r2), "divergence under {cs}");
    }
}

#[test]
fn insensitive_result_is_a_superset_of_sensitive_results() {
    for cs in ["1-call", "2-call", "1-obj", "1-type"] {
        let (pi, ri) = analyze(CROSS_CHECK_PROGRAM, "ci");
        let (ps, rs) = analyze(CROSS_CHECK_PROGRAM, cs);
        let (ci_pts, ci_reach, _) = digest(&pi, &ri);
        let (cs_pts, cs_reach, _) = digest(&ps, &rs);
        for (var, objs) in &cs_pts {
            let ci_objs = ci_pts.get(var).cloned().unwrap_or_default();
            assert!(
                objs.is_subset(&ci_objs),
                "{var} under {cs}: {objs:?} not within {ci_objs:?}"
            );
        }
        assert!(cs_reach.is_subset(&ci_reach));
    }
}

#[test]
fn repeated_runs_are_deterministic() {
    let (p1, r1) = analyze(CROSS_CHECK_PROGRAM, "2-call");
    let (p2, r2) = analyze(CROSS_CHECK_PROGRAM, "2-call");
    assert_eq!(digest(&p1, &r1), digest(&p2, &r2));
}

#[test]
fn array_elements_are_conflated_per_array() {
    let (program, result) = analyze(CROSS_CHECK_PROGRAM, "ci");
    // arr aliases c1; the array store makes the B object visible through
    // the array load.
    let e = pts_descs(&program, &result, "Main.main", "e");
    assert!(e.contains("new B@Main.main"), "e points to {e:?}");
}

#[test]
fn cancellation_aborts_the_run() {
    let mut program = load(CROSS_CHECK_PROGRAM);
    let options = AnalysisOptions::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = run_pta_with_cancel(&mut program, &options, cancel);
    assert!(matches!(result, Err(AnalysisError::Cancelled)));
}

#[test]
fn expired_budget_cancels() {
    let mut program = load(CROSS_CHECK_PROGRAM);
    let mut options = AnalysisOptions::default();
    options.timeout_secs = Some(0);
    let result = run_pta_with_cancel(&mut program, &options, CancelToken::new());
    assert!(matches!(result, Err(AnalysisError::Cancelled)));
}

#[test]
fn unknown_option_values_fail_before_analysis() {
    assert!(matches!(
        "3-flow".parse::<oopta::util::options::ContextSensitivity>(),
        Err(AnalysisError::Config(_))
    ));
    assert!(matches!(
        "fast".parse::<oopta::util::options::SolverKind>(),
        Err(AnalysisError::Config(_))
    ));
}

#[test]
fn only_app_skips_library_bodies() {
    let json = r#"{"classes": [
        {"name": "A"},
        {"name": "Lib", "application": false, "methods": [
            {"name": "make", "descriptor": "()", "static": true, "stmts": [
                {"op": "new", "lhs": "v", "type": "A"},
                {"op": "return", "var": "v"}
            ]}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "invoke", "kind": "static", "class": "Lib", "name": "make",
                 "descriptor": "()", "result": "x"}
            ]}
        ]}
    ]}"#;

    let (program, result) = analyze(json, "ci");
    assert_eq!(pts_descs(&program, &result, "Main.main", "x").len(), 1);

    let mut options = AnalysisOptions::default();
    options.only_app = true;
    let (program, result) = analyze_with(json, options);
    // The library method stays in the call graph, but its body is not
    // processed.
    assert!(result.is_reachable(method(&program, "Lib.make")));
    assert!(pts_descs(&program, &result, "Main.main", "x").is_empty());
}

#[test]
fn merged_exception_objects_share_one_abstraction() {
    let json = r#"{"classes": [
        {"name": "java.lang.Throwable", "application": false},
        {"name": "MyError", "super": "java.lang.Throwable"},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "e1", "type": "MyError"},
                {"op": "new", "lhs": "e2", "type": "MyError"}
            ]}
        ]}
    ]}"#;

    use oopta::pts_set::points_to::PointsToSet;
    let objs = |program: &oopta::ir::program::Program, result: &PTAResult, name: &str| {
        result
            .ci_points_to(var(program, "Main.main", name))
            .iter()
            .collect::<Vec<_>>()
    };

    let (program, result) = analyze(json, "ci");
    // Two allocation sites, two distinct abstract objects.
    assert_ne!(objs(&program, &result, "e1"), objs(&program, &result, "e2"));

    let mut options = AnalysisOptions::default();
    options.merge_exception_objects = true;
    let (program, result) = analyze_with(json, options);
    assert_eq!(objs(&program, &result, "e1"), objs(&program, &result, "e2"));
    let merged = descs(&["<merged MyError>"]);
    assert_eq!(pts_descs(&program, &result, "Main.main", "e1"), merged);
}

#[test]
fn string_constants_can_be_merged() {
    let json = r#"{"classes": [
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "const-string", "lhs": "s1", "value": "left"},
                {"op": "const-string", "lhs": "s2", "value": "right"}
            ]}
        ]}
    ]}"#;

    let (program, result) = analyze(json, "ci");
    assert_eq!(pts_descs(&program, &result, "Main.main", "s1"), descs(&["\"left\""]));
    assert_eq!(pts_descs(&program, &result, "Main.main", "s2"), descs(&["\"right\""]));

    let mut options = AnalysisOptions::default();
    options.distinguish_string_constants = false;
    let (program, result) = analyze_with(json, options);
    let merged = descs(&["<merged java.lang.String>"]);
    assert_eq!(pts_descs(&program, &result, "Main.main", "s1"), merged);
    assert_eq!(pts_descs(&program, &result, "Main.main", "s2"), merged);
}
