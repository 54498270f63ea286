//! The error taxonomy surfaced at the analysis boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Invalid or unknown option value; raised before any analysis work.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The front end produced an inconsistent program (e.g. a call whose
    /// declaring class is unknown). Fatal to the analysis.
    #[error("inconsistent input program: {0}")]
    FrontEnd(String),

    /// A plugin failed and flagged the failure fatal.
    #[error("plugin `{plugin}` failed: {message}")]
    Plugin { plugin: &'static str, message: String },

    /// Cooperative termination via the cancellation flag or the wall-clock
    /// budget.
    #[error("analysis cancelled")]
    Cancelled,

    /// A solver invariant was violated; always indicates a bug.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// An error raised inside a plugin hook. Non-fatal errors are logged and the
/// analysis continues; a fatal error is rethrown by the solver after the
/// current worklist pop completes.
#[derive(Debug)]
pub struct PluginError {
    pub plugin: &'static str,
    pub message: String,
    pub fatal: bool,
}

impl PluginError {
    pub fn recoverable(plugin: &'static str, message: impl Into<String>) -> Self {
        PluginError {
            plugin,
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(plugin: &'static str, message: impl Into<String>) -> Self {
        PluginError {
            plugin,
            message: message.into(),
            fatal: true,
        }
    }
}

impl From<PluginError> for AnalysisError {
    fn from(e: PluginError) -> Self {
        AnalysisError::Plugin {
            plugin: e.plugin,
            message: e.message,
        }
    }
}

pub type PluginResult = Result<(), PluginError>;
