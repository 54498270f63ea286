//! Taint tracking driven by a JSON specification: calls to source methods
//! mint taint objects into their results, transfer methods forward taint
//! between arguments and results, and sink arguments are checked for taint
//! objects when the analysis finishes.

use std::collections::BTreeSet;
use std::path::Path;

use log::*;
use serde::Deserialize;

use super::super::solver::SolverView;
use super::super::NodeId;
use super::Plugin;
use crate::error::{AnalysisError, PluginResult};
use crate::graph::pfg::{PFGEdgeKind, Pointer};
use crate::ir::program::{CSMethod, CallSiteId};
use crate::ir::stmt::CSCallSite;
use crate::pta::heap::ObjKind;
use crate::pts_set::points_to::PointsToSet;

#[derive(Debug, Deserialize)]
pub struct TaintConfig {
    #[serde(default)]
    sources: Vec<SourceSpec>,
    #[serde(default)]
    sinks: Vec<SinkSpec>,
    #[serde(default)]
    transfers: Vec<TransferSpec>,
}

/// A method whose result is tainted.
#[derive(Debug, Deserialize)]
struct SourceSpec {
    method: String,
}

/// A method whose `index`-th argument must not be tainted.
#[derive(Debug, Deserialize)]
struct SinkSpec {
    method: String,
    index: usize,
}

/// A method propagating taint from the `from`-th argument (or the receiver,
/// for `"base"`) to its result.
#[derive(Debug, Deserialize)]
struct TransferSpec {
    method: String,
    from: TransferEndpoint,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TransferEndpoint {
    Arg(usize),
    Base(String),
}

/// A detected source-to-sink flow.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaintFlow {
    pub source: CallSiteId,
    pub sink: CallSiteId,
    pub index: usize,
}

pub struct TaintAnalysis {
    config: TaintConfig,
    /// Sink arguments to check at the end: (sink callsite, argument node,
    /// argument index).
    sink_args: Vec<(CSCallSite, NodeId, usize)>,
    flows: BTreeSet<TaintFlow>,
}

impl TaintAnalysis {
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("cannot read taint config {}: {e}", path.display()))
        })?;
        let config: TaintConfig = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::Config(format!("malformed taint config {}: {e}", path.display()))
        })?;
        Ok(TaintAnalysis {
            config,
            sink_args: Vec::new(),
            flows: BTreeSet::new(),
        })
    }

    pub fn flows(&self) -> &BTreeSet<TaintFlow> {
        &self.flows
    }
}

impl Plugin for TaintAnalysis {
    fn name(&self) -> &'static str {
        "taint-analysis"
    }

    fn on_new_call_edge(
        &mut self,
        view: &mut SolverView<'_>,
        callsite: CSCallSite,
        callee: CSMethod,
    ) -> PluginResult {
        let program = view.program;
        let sig = program.method_sig(callee.method);
        let data = program.call_site(callsite.site);

        if self.config.sources.iter().any(|s| s.method == sig) {
            if let Some(result) = data.result {
                let obj = view
                    .heap
                    .get_taint_obj(callsite.site, program.var(result).ty);
                view.add_points_to(&Pointer::var(callsite.cid(), result), obj);
            }
        }

        for transfer in self.config.transfers.iter().filter(|t| t.method == sig) {
            let from = match &transfer.from {
                TransferEndpoint::Arg(index) => data.args.get(*index).copied(),
                TransferEndpoint::Base(_) => data.recv,
            };
            if let (Some(from), Some(result)) = (from, data.result) {
                view.add_pfg_edge(
                    &Pointer::var(callsite.cid(), from),
                    &Pointer::var(callsite.cid(), result),
                    PFGEdgeKind::Copy,
                );
            }
        }

        for sink in self.config.sinks.iter().filter(|s| s.method == sig) {
            if let Some(arg) = data.args.get(sink.index) {
                let node = view.node(&Pointer::var(callsite.cid(), *arg));
                self.sink_args.push((callsite, node, sink.index));
            }
        }
        Ok(())
    }

    /// Checks every recorded sink argument for taint objects.
    fn on_finish(&mut self, view: &mut SolverView<'_>) -> PluginResult {
        for (callsite, node, index) in &self.sink_args {
            let pts = view.full_pts_node(*node);
            for obj in pts.iter() {
                if let ObjKind::Taint(source) = &view.heap.obj(obj).kind {
                    self.flows.insert(TaintFlow {
                        source: *source,
                        sink: callsite.site,
                        index: *index,
                    });
                }
            }
        }
        for flow in &self.flows {
            warn!(
                "taint flow: source at {} reaches sink {} (argument {})",
                view.program.method_sig(view.program.call_site(flow.source).method),
                view.program.method_sig(view.program.call_site(flow.sink).method),
                flow.index,
            );
        }
        info!("taint analysis found {} flow(s)", self.flows.len());
        Ok(())
    }
}
