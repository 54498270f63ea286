//! The context-sensitive, subset-based pointer analysis core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::*;

use self::context_strategy::{
    ContextInsensitive, ContextStrategy, KCallSiteSensitive, KObjectSensitive, KTypeSensitive,
};
use self::heap::{HeapModel, ObjId};
use self::plugins::timer::AnalysisTimer;
use self::result::PTAResult;
use self::solver::ContextSensitivePTA;
use crate::error::AnalysisError;
use crate::ir::program::Program;
use crate::pts_set::points_to::HybridPointsToSet;
use crate::pts_set::pt_data::DiffPTData;
use crate::util::mem_watcher::MemoryWatcher;
use crate::util::options::{AnalysisOptions, ContextSensitivity, ReflectionInference};

pub mod context_strategy;
pub mod heap;
pub mod plugins;
pub mod propagator;
pub mod result;
pub mod solver;

pub type NodeId = crate::graph::pfg::NodeId;
pub type EdgeId = crate::graph::pfg::EdgeId;
pub type PointsTo<T> = HybridPointsToSet<T>;
pub type DiffPTDataTy = DiffPTData<NodeId, ObjId, PointsTo<ObjId>>;

/// Cooperative cancellation flag, checked by the solver between worklist
/// pops.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs the pointer analysis configured by `options` on `program`.
pub fn run_pta(program: &mut Program, options: &AnalysisOptions) -> Result<PTAResult, AnalysisError> {
    run_pta_with_cancel(program, options, CancelToken::new())
}

/// Like [`run_pta`] with an externally owned cancellation token.
pub fn run_pta_with_cancel(
    program: &mut Program,
    options: &AnalysisOptions,
    cancel: CancelToken,
) -> Result<PTAResult, AnalysisError> {
    let heap = HeapModel::new(program, options);
    match options.context_sensitivity {
        ContextSensitivity::Insensitive => {
            run_with_strategy(program, options, heap, ContextInsensitive, cancel)
        }
        ContextSensitivity::KCallSite(k) => {
            run_with_strategy(program, options, heap, KCallSiteSensitive::new(k), cancel)
        }
        ContextSensitivity::KObject(k) => {
            run_with_strategy(program, options, heap, KObjectSensitive::new(k), cancel)
        }
        ContextSensitivity::KType(k) => {
            run_with_strategy(program, options, heap, KTypeSensitive::new(k), cancel)
        }
    }
}

fn run_with_strategy<S: ContextStrategy>(
    program: &Program,
    options: &AnalysisOptions,
    heap: HeapModel,
    strategy: S,
    cancel: CancelToken,
) -> Result<PTAResult, AnalysisError> {
    info!(
        "running {:?} solver with {} context sensitivity",
        options.solver,
        strategy.name(),
    );
    let mut mem_watcher = MemoryWatcher::new();
    mem_watcher.start();

    let mut pta = ContextSensitivePTA::new(program, options, heap, strategy, cancel);
    register_default_plugins(&mut pta, options)?;
    let result = pta.solve();

    mem_watcher.stop();
    result
}

/// Registers the bundled plugins according to the options. The timer goes
/// first so that its measurement brackets every other plugin.
fn register_default_plugins<S: ContextStrategy>(
    pta: &mut ContextSensitivePTA<'_, S>,
    options: &AnalysisOptions,
) -> Result<(), AnalysisError> {
    pta.register_plugin(Box::new(AnalysisTimer::new()));
    pta.register_plugin(Box::new(plugins::class_initializer::ClassInitializer::new()));
    pta.register_plugin(Box::new(plugins::thread_handler::ThreadHandler::new()));
    pta.register_plugin(Box::new(plugins::exception::ExceptionAnalysis::new()));
    pta.register_plugin(Box::new(plugins::invoke_dynamic::InvokeDynamicAnalysis::new()));
    if options.reflection_inference != ReflectionInference::Off || options.reflection_log.is_some() {
        pta.register_plugin(Box::new(plugins::reflection::ReflectionHandler::from_options(options)?));
    }
    if let Some(path) = &options.taint_config {
        pta.register_plugin(Box::new(plugins::taint::TaintAnalysis::from_file(path)?));
    }
    Ok(())
}
