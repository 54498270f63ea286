//! Behavior of the bundled plugins: class initialization, threads,
//! exceptions, invokedynamic desugaring, taint and reflection.

mod common;

use std::fs;
use std::path::PathBuf;

use common::*;
use oopta::pts_set::points_to::PointsToSet;
use oopta::util::options::{AnalysisOptions, ReflectionInference};

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("oopta-{}-{name}", std::process::id()));
    fs::write(&path, contents).expect("write temp file");
    path
}

#[test]
fn class_initializer_runs_on_first_use() {
    let json = r#"{"classes": [
        {"name": "A"},
        {"name": "S",
         "fields": [{"name": "g", "static": true}],
         "methods": [
            {"name": "<clinit>", "descriptor": "()", "static": true, "stmts": [
                {"op": "new", "lhs": "v", "type": "A"},
                {"op": "store-static", "field": "S.g", "rhs": "v"}
            ]}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "s", "type": "S"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(json, "ci");

    assert!(result.is_reachable(method(&program, "S.<clinit>")));
    let statics: Vec<_> = result.iter_static_fields().collect();
    assert_eq!(statics.len(), 1);
    assert_eq!(statics[0].1.count(), 1);
}

#[test]
fn thread_start_dispatches_to_run() {
    let json = r#"{"classes": [
        {"name": "java.lang.Thread", "application": false, "methods": [
            {"name": "start", "descriptor": "()"},
            {"name": "run", "descriptor": "()"}
        ]},
        {"name": "MyThread", "super": "java.lang.Thread", "methods": [
            {"name": "run", "descriptor": "()", "this": "this", "stmts": []}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "t", "type": "MyThread"},
                {"op": "invoke", "kind": "virtual", "recv": "t",
                 "class": "java.lang.Thread", "name": "start", "descriptor": "()"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(json, "ci");

    assert!(result.is_reachable(method(&program, "MyThread.run")));
    assert_eq!(
        pts_descs(&program, &result, "MyThread.run", "this"),
        descs(&["new MyThread@Main.main"])
    );
}

#[test]
fn thrown_objects_reach_matching_handlers() {
    let json = r#"{"classes": [
        {"name": "java.lang.Throwable", "application": false},
        {"name": "E", "super": "java.lang.Throwable"},
        {"name": "F", "super": "java.lang.Throwable"},
        {"name": "M", "methods": [
            {"name": "m", "descriptor": "()", "static": true, "stmts": [
                {"op": "new", "lhs": "x", "type": "E"},
                {"op": "throw", "var": "x"}
            ]}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true,
             "handlers": [{"var": "e", "type": "E"}, {"var": "f", "type": "F"}],
             "stmts": [
                {"op": "invoke", "kind": "static", "class": "M", "name": "m", "descriptor": "()"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(json, "ci");

    assert_eq!(
        pts_descs(&program, &result, "Main.main", "e"),
        descs(&["new E@M.m"])
    );
    // The F handler never matches the thrown E object.
    assert!(pts_descs(&program, &result, "Main.main", "f").is_empty());
}

#[test]
fn handlers_catch_within_the_throwing_method() {
    let json = r#"{"classes": [
        {"name": "java.lang.Throwable", "application": false},
        {"name": "E", "super": "java.lang.Throwable"},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true,
             "handlers": [{"var": "e", "type": "java.lang.Throwable"}],
             "stmts": [
                {"op": "new", "lhs": "x", "type": "E"},
                {"op": "throw", "var": "x"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(json, "ci");
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "e"),
        descs(&["new E@Main.main"])
    );
}

#[test]
fn invoke_dynamic_desugars_to_the_implementation_method() {
    let json = r#"{"classes": [
        {"name": "A"},
        {"name": "F", "interface": true, "methods": [
            {"name": "apply", "descriptor": "(Object)", "abstract": true}
        ]},
        {"name": "Impl", "methods": [
            {"name": "call", "descriptor": "(Object)", "static": true, "params": ["t"],
             "stmts": [{"op": "return", "var": "t"}]}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true,
             "vars": [{"name": "l", "type": "F"}],
             "stmts": [
                {"op": "invoke", "kind": "dynamic", "class": "Impl", "name": "call",
                 "descriptor": "(Object)", "result": "l"},
                {"op": "new", "lhs": "a", "type": "A"},
                {"op": "invoke", "kind": "interface", "recv": "l", "class": "F",
                 "name": "apply", "descriptor": "(Object)", "args": ["a"], "result": "r"}
            ]}
        ]}
    ]}"#;
    let (program, result) = analyze(json, "ci");

    assert!(result.is_reachable(method(&program, "Impl.call")));
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "r"),
        descs(&["new A@Main.main"])
    );
}

#[test]
fn taint_flows_from_source_to_sink_argument() {
    let config = temp_file(
        "taint.json",
        r#"{"sources": [{"method": "Src.get"}],
            "sinks": [{"method": "Snk.run", "index": 0}]}"#,
    );
    let json = r#"{"classes": [
        {"name": "Src", "methods": [
            {"name": "get", "descriptor": "()", "static": true, "stmts": []}
        ]},
        {"name": "Snk", "methods": [
            {"name": "run", "descriptor": "(Object)", "static": true, "params": ["p"], "stmts": []}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "invoke", "kind": "static", "class": "Src", "name": "get",
                 "descriptor": "()", "result": "s"},
                {"op": "invoke", "kind": "static", "class": "Snk", "name": "run",
                 "descriptor": "(Object)", "args": ["s"]}
            ]}
        ]}
    ]}"#;

    let mut options = AnalysisOptions::default();
    options.taint_config = Some(config.clone());
    let (program, result) = analyze_with(json, options);
    fs::remove_file(config).ok();

    let taint = descs(&["<taint from Main.main>"]);
    assert_eq!(pts_descs(&program, &result, "Main.main", "s"), taint);
    assert_eq!(pts_descs(&program, &result, "Snk.run", "p"), taint);
}

const REFLECTIVE_PROGRAM: &str = r#"{"classes": [
    {"name": "java.lang.Class", "application": false, "methods": [
        {"name": "forName", "descriptor": "(String)", "static": true},
        {"name": "newInstance", "descriptor": "()"}
    ]},
    {"name": "R", "methods": [
        {"name": "<clinit>", "descriptor": "()", "static": true, "stmts": []},
        {"name": "<init>", "descriptor": "()", "this": "this", "stmts": []}
    ]},
    {"name": "Main", "methods": [
        {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
            {"op": "const-string", "lhs": "n", "value": "R"},
            {"op": "invoke", "kind": "static", "class": "java.lang.Class", "name": "forName",
             "descriptor": "(String)", "args": ["n"], "result": "c"},
            {"op": "invoke", "kind": "virtual", "recv": "c", "class": "java.lang.Class",
             "name": "newInstance", "descriptor": "()", "result": "o"}
        ]}
    ]}
]}"#;

#[test]
fn reflection_resolves_string_constants() {
    let mut options = AnalysisOptions::default();
    options.reflection_inference = ReflectionInference::StringConstant;
    let (program, result) = analyze_with(REFLECTIVE_PROGRAM, options);

    assert!(result.is_reachable(method(&program, "R.<clinit>")));
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "c"),
        descs(&["<class R>"])
    );
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "o"),
        descs(&["<reflective/R>"])
    );
    assert!(result.is_reachable(method(&program, "R.<init>")));
}

#[test]
fn reflection_replays_a_resolution_log() {
    let log = temp_file(
        "reflection.log",
        "Class.forName;Main.main;R\nClass.newInstance;Main.main;R\n",
    );
    let mut options = AnalysisOptions::default();
    options.reflection_log = Some(log.clone());
    let (program, result) = analyze_with(REFLECTIVE_PROGRAM, options);
    fs::remove_file(log).ok();

    assert!(result.is_reachable(method(&program, "R.<clinit>")));
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "o"),
        descs(&["<reflective/R>"])
    );
}
