//! Dumps analysis results (context-insensitive points-to sets, a DOT call
//! graph) according to the output options.

use itertools::Itertools;
use log::*;
use petgraph::dot::{Config, Dot};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::ir::program::Program;
use crate::pta::result::PTAResult;
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::AnalysisOptions;

pub fn dump_results(program: &Program, result: &PTAResult, options: &AnalysisOptions) {
    if let Some(pts_output) = &options.pts_output {
        info!("Dumping points-to results...");
        dump_ci_pts(program, result, pts_output);
    }
    if let Some(cg_output) = &options.call_graph_output {
        info!("Dumping call graph...");
        dump_call_graph(program, result, cg_output);
    }
}

/// Writes the context-insensitive points-to sets of variables and static
/// fields, one pointer per line, in a stable order.
fn dump_ci_pts(program: &Program, result: &PTAResult, path: &str) {
    let mut lines: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (_cid, var, pts) in result.iter_vars() {
        let var_data = program.var(var);
        let key = format!("{}/{}", program.method_sig(var_data.method), var_data.name);
        let objs = lines.entry(key).or_default();
        for obj in pts.iter() {
            objs.insert(result.heap().describe(program, obj));
        }
    }
    for (field, pts) in result.iter_static_fields() {
        let field_data = program.field(field);
        let key = format!(
            "{}.{}",
            program.class(field_data.class).name,
            field_data.name
        );
        let objs = lines.entry(key).or_default();
        for obj in pts.iter() {
            objs.insert(result.heap().describe(program, obj));
        }
    }

    let file = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to create points-to output file {path}: {e}");
            return;
        }
    };
    let mut writer = BufWriter::new(file);
    for (pointer, objs) in lines {
        writeln!(writer, "{pointer} -> {{{}}}", objs.iter().join(", ")).expect("Unable to write data");
    }
}

/// Produces a DOT rendition of the context-insensitive call graph for
/// displaying with Graphviz.
fn dump_call_graph(program: &Program, result: &PTAResult, path: &str) {
    let ci_graph = result.ci_call_graph();
    let display = ci_graph.graph.map(
        |_, node| program.method_sig(node.func),
        |_, edge| format!("{:?}", edge.kind),
    );
    let output = format!("{:?}", Dot::with_config(&display, &[Config::GraphContentOnly]));
    let output = format!("digraph CallGraph {{\n{output}}}\n");
    if let Err(e) = std::fs::write(path, output) {
        error!("Failed to write dot file output: {e}");
    }
}
