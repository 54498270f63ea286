#![allow(dead_code)]

//! Shared helpers for the integration tests: programs are written in the
//! JSON IR form and checked through the frozen result's accessors.

use std::collections::BTreeSet;

use oopta::front::json;
use oopta::ir::program::{MethodId, Program, VarId};
use oopta::pta::result::PTAResult;
use oopta::pta::run_pta;
use oopta::pts_set::points_to::PointsToSet;
use oopta::util::options::AnalysisOptions;

pub fn load(json_text: &str) -> Program {
    json::parse_program(json_text).expect("well-formed test program")
}

pub fn options_with_cs(cs: &str) -> AnalysisOptions {
    let mut options = AnalysisOptions::default();
    options.context_sensitivity = cs.parse().expect("valid context sensitivity");
    options
}

/// Loads and analyzes a program under the given context sensitivity.
pub fn analyze(json_text: &str, cs: &str) -> (Program, PTAResult) {
    analyze_with(json_text, options_with_cs(cs))
}

pub fn analyze_with(json_text: &str, options: AnalysisOptions) -> (Program, PTAResult) {
    let mut program = load(json_text);
    let result = run_pta(&mut program, &options).expect("analysis reaches its fixpoint");
    (program, result)
}

pub fn method(program: &Program, sig: &str) -> MethodId {
    program
        .method_by_sig(sig)
        .unwrap_or_else(|| panic!("no method {sig}"))
}

pub fn var(program: &Program, sig: &str, name: &str) -> VarId {
    let m = method(program, sig);
    program
        .var_by_name(m, name)
        .unwrap_or_else(|| panic!("no var {name} in {sig}"))
}

/// The context-insensitive points-to set of a variable, as printable object
/// descriptions.
pub fn pts_descs(program: &Program, result: &PTAResult, sig: &str, name: &str) -> BTreeSet<String> {
    let v = var(program, sig, name);
    result
        .ci_points_to(v)
        .iter()
        .map(|obj| result.heap().describe(program, obj))
        .collect()
}

/// The methods the `index`-th call site of `sig` was resolved to.
pub fn callees(program: &Program, result: &PTAResult, sig: &str, index: usize) -> BTreeSet<String> {
    let m = method(program, sig);
    let site = program.call_sites_in(m)[index];
    result
        .callees_at(site)
        .into_iter()
        .map(|callee| program.method_sig(callee))
        .collect()
}

pub fn descs(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
