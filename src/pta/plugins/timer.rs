//! Wall-time measurement. Registered before every other plugin so that its
//! measurement brackets their work.

use std::time::{Duration, Instant};

use log::*;

use super::super::solver::SolverView;
use super::Plugin;
use crate::error::PluginResult;

#[derive(Default)]
pub struct AnalysisTimer {
    start: Option<Instant>,
}

impl AnalysisTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Plugin for AnalysisTimer {
    fn name(&self) -> &'static str {
        "analysis-timer"
    }

    fn on_start(&mut self, _view: &mut SolverView<'_>) -> PluginResult {
        self.start = Some(Instant::now());
        Ok(())
    }

    fn on_finish(&mut self, _view: &mut SolverView<'_>) -> PluginResult {
        if let Some(start) = self.start {
            let elapsed = Duration::from_millis(start.elapsed().as_millis() as u64);
            info!(
                "pointer analysis elapsed time: {}",
                humantime::format_duration(elapsed)
            );
        }
        Ok(())
    }
}
