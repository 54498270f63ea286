//! Precision checks for the object- and type-sensitive selector variants.

mod common;

use common::*;

/// Two holders of the same class, each storing a different object through a
/// shared setter.
const HOLDER_PROGRAM: &str = r#"{"classes": [
    {"name": "A"},
    {"name": "B"},
    {"name": "Holder",
     "fields": [{"name": "f"}],
     "methods": [
        {"name": "set", "descriptor": "(Object)", "this": "this", "params": ["v"],
         "stmts": [{"op": "store-field", "base": "this", "field": "Holder.f", "rhs": "v"}]},
        {"name": "get", "descriptor": "()", "this": "this",
         "stmts": [{"op": "load-field", "lhs": "r", "base": "this", "field": "Holder.f"},
                   {"op": "return", "var": "r"}]}
    ]},
    {"name": "Main", "methods": [
        {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
            {"op": "new", "lhs": "h1", "type": "Holder"},
            {"op": "new", "lhs": "h2", "type": "Holder"},
            {"op": "new", "lhs": "a", "type": "A"},
            {"op": "new", "lhs": "b", "type": "B"},
            {"op": "invoke", "kind": "virtual", "recv": "h1", "class": "Holder",
             "name": "set", "descriptor": "(Object)", "args": ["a"]},
            {"op": "invoke", "kind": "virtual", "recv": "h2", "class": "Holder",
             "name": "set", "descriptor": "(Object)", "args": ["b"]},
            {"op": "invoke", "kind": "virtual", "recv": "h1", "class": "Holder",
             "name": "get", "descriptor": "()", "result": "x"},
            {"op": "invoke", "kind": "virtual", "recv": "h2", "class": "Holder",
             "name": "get", "descriptor": "()", "result": "y"}
        ]}
    ]}
]}"#;

/// Like `HOLDER_PROGRAM`, with the two holders instantiating different
/// subclasses of the holder class.
const TWO_CLASS_HOLDER_PROGRAM: &str = r#"{"classes": [
    {"name": "A"},
    {"name": "B"},
    {"name": "Holder",
     "fields": [{"name": "f"}],
     "methods": [
        {"name": "set", "descriptor": "(Object)", "this": "this", "params": ["v"],
         "stmts": [{"op": "store-field", "base": "this", "field": "Holder.f", "rhs": "v"}]},
        {"name": "get", "descriptor": "()", "this": "this",
         "stmts": [{"op": "load-field", "lhs": "r", "base": "this", "field": "Holder.f"},
                   {"op": "return", "var": "r"}]}
    ]},
    {"name": "H1", "super": "Holder"},
    {"name": "H2", "super": "Holder"},
    {"name": "Main", "methods": [
        {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
            {"op": "new", "lhs": "h1", "type": "H1"},
            {"op": "new", "lhs": "h2", "type": "H2"},
            {"op": "new", "lhs": "a", "type": "A"},
            {"op": "new", "lhs": "b", "type": "B"},
            {"op": "invoke", "kind": "virtual", "recv": "h1", "class": "Holder",
             "name": "set", "descriptor": "(Object)", "args": ["a"]},
            {"op": "invoke", "kind": "virtual", "recv": "h2", "class": "Holder",
             "name": "set", "descriptor": "(Object)", "args": ["b"]},
            {"op": "invoke", "kind": "virtual", "recv": "h1", "class": "Holder",
             "name": "get", "descriptor": "()", "result": "x"},
            {"op": "invoke", "kind": "virtual", "recv": "h2", "class": "Holder",
             "name": "get", "descriptor": "()", "result": "y"}
        ]}
    ]}
]}"#;

#[test]
fn insensitive_analysis_conflates_holders() {
    let (program, result) = analyze(HOLDER_PROGRAM, "ci");
    assert_eq!(pts_descs(&program, &result, "Main.main", "x").len(), 2);
    assert_eq!(pts_descs(&program, &result, "Main.main", "y").len(), 2);
}

#[test]
fn object_sensitivity_distinguishes_receivers() {
    let (program, result) = analyze(HOLDER_PROGRAM, "1-obj");
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "x"),
        descs(&["new A@Main.main"])
    );
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "y"),
        descs(&["new B@Main.main"])
    );
}

#[test]
fn type_sensitivity_conflates_receivers_of_one_class() {
    // Both holders have the same dynamic type, so a type context cannot
    // separate them.
    let (program, result) = analyze(HOLDER_PROGRAM, "1-type");
    assert_eq!(pts_descs(&program, &result, "Main.main", "x").len(), 2);
    assert_eq!(pts_descs(&program, &result, "Main.main", "y").len(), 2);
}

#[test]
fn type_sensitivity_distinguishes_receiver_classes() {
    let (program, result) = analyze(TWO_CLASS_HOLDER_PROGRAM, "1-type");
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "x"),
        descs(&["new A@Main.main"])
    );
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "y"),
        descs(&["new B@Main.main"])
    );
}

#[test]
fn object_sensitivity_distinguishes_receiver_classes_too() {
    let (program, result) = analyze(TWO_CLASS_HOLDER_PROGRAM, "2-obj");
    assert_eq!(
        pts_descs(&program, &result, "Main.main", "x"),
        descs(&["new A@Main.main"])
    );
}

#[test]
fn two_call_sensitivity_remains_precise_through_a_wrapper() {
    // The wrapper adds one call-site layer; k = 2 still separates the two
    // chains, k = 1 does not.
    let program = r#"{"classes": [
        {"name": "A"},
        {"name": "B"},
        {"name": "Id", "methods": [
            {"name": "id", "descriptor": "(Object)", "static": true, "params": ["t"],
             "stmts": [{"op": "return", "var": "t"}]},
            {"name": "wrap", "descriptor": "(Object)", "static": true, "params": ["u"],
             "stmts": [
                {"op": "invoke", "kind": "static", "class": "Id", "name": "id",
                 "descriptor": "(Object)", "args": ["u"], "result": "w"},
                {"op": "return", "var": "w"}
            ]}
        ]},
        {"name": "Main", "methods": [
            {"name": "main", "descriptor": "()", "static": true, "entry": true, "stmts": [
                {"op": "new", "lhs": "a", "type": "A"},
                {"op": "invoke", "kind": "static", "class": "Id", "name": "wrap",
                 "descriptor": "(Object)", "args": ["a"], "result": "r1"},
                {"op": "new", "lhs": "b", "type": "B"},
                {"op": "invoke", "kind": "static", "class": "Id", "name": "wrap",
                 "descriptor": "(Object)", "args": ["b"], "result": "r2"}
            ]}
        ]}
    ]}"#;

    let (p1, r1) = analyze(program, "1-call");
    assert_eq!(pts_descs(&p1, &r1, "Main.main", "r1").len(), 2);

    let (p2, r2) = analyze(program, "2-call");
    assert_eq!(pts_descs(&p2, &r2, "Main.main", "r1"), descs(&["new A@Main.main"]));
    assert_eq!(pts_descs(&p2, &r2, "Main.main", "r2"), descs(&["new B@Main.main"]));
}
