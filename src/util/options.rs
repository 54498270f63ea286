//! Analysis options.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Arg, Command};

use crate::error::AnalysisError;

const OOPTA_USAGE: &str = r#"oopta [OPTIONS] INPUT"#;

/// Creates the clap::Command metadata for argument parsing.
fn make_options_parser() -> Command<'static> {
    Command::new("oopta")
        .no_binary_name(true)
        .override_usage(OOPTA_USAGE)
        .arg(Arg::new("solver")
            .long("solver")
            .takes_value(true)
            .default_value("default")
            .help("The solver implementation: `default` (incremental) or `simple` (reference)."))
        .arg(Arg::new("cs")
            .long("cs")
            .takes_value(true)
            .default_value("ci")
            .help("Context sensitivity variant.")
            .long_help("One of: ci, 1-call/1-cfa, 2-call/2-cfa, 1-obj/1-object, \
                        2-obj/2-object, 1-type, 2-type."))
        .arg(Arg::new("only-app")
            .long("only-app")
            .takes_value(false)
            .help("Confine body processing to application classes."))
        .arg(Arg::new("no-distinguish-string-constants")
            .long("no-distinguish-string-constants")
            .takes_value(false)
            .help("Merge all string constants into a single abstract object."))
        .arg(Arg::new("merge-string-objects")
            .long("merge-string-objects")
            .takes_value(false)
            .help("Merge all string allocations into one object."))
        .arg(Arg::new("merge-string-builders")
            .long("merge-string-builders")
            .takes_value(false)
            .help("Merge StringBuilder/StringBuffer allocations per type."))
        .arg(Arg::new("merge-exception-objects")
            .long("merge-exception-objects")
            .takes_value(false)
            .help("Merge throwable allocations per type."))
        .arg(Arg::new("taint-config")
            .long("taint-config")
            .takes_value(true)
            .help("Path to a taint specification; enables the taint plugin."))
        .arg(Arg::new("reflection-inference")
            .long("reflection-inference")
            .takes_value(true)
            .default_value("off")
            .help("Reflection resolution strategy: off, string-constant or solar."))
        .arg(Arg::new("reflection-log")
            .long("reflection-log")
            .takes_value(true)
            .help("Path to an externally supplied reflection-resolution log."))
        .arg(Arg::new("timeout")
            .long("timeout")
            .takes_value(true)
            .value_parser(clap::value_parser!(u64))
            .help("Wall-clock budget in seconds; expiry cancels the analysis."))
        .arg(Arg::new("dump-stats")
            .long("dump-stats")
            .takes_value(false)
            .help("Dump the statistics of the analysis results."))
        .arg(Arg::new("call-graph-output")
            .long("dump-call-graph")
            .takes_value(true)
            .help("Dump the call graph in DOT format to the output file."))
        .arg(Arg::new("pts-output")
            .long("dump-pts")
            .takes_value(true)
            .help("Dump points-to results to the output file."))
        .arg(Arg::new("INPUT")
            .help("The JSON program file to be analyzed."))
}

/// Which solver implementation to run. Both must compute the same result;
/// `Simple` re-propagates full sets and exists to cross-check the
/// incremental solver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolverKind {
    Default,
    Simple,
}

impl FromStr for SolverKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(SolverKind::Default),
            "simple" => Ok(SolverKind::Simple),
            _ => Err(AnalysisError::Config(format!("unknown solver `{s}`"))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContextSensitivity {
    Insensitive,
    KCallSite(usize),
    KObject(usize),
    KType(usize),
}

impl FromStr for ContextSensitivity {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "ci" {
            return Ok(ContextSensitivity::Insensitive);
        }
        if let Some((k, kind)) = s.split_once('-') {
            if let Ok(k) = k.parse::<usize>() {
                if k >= 1 {
                    match kind {
                        "call" | "cfa" => return Ok(ContextSensitivity::KCallSite(k)),
                        "obj" | "object" => return Ok(ContextSensitivity::KObject(k)),
                        "type" => return Ok(ContextSensitivity::KType(k)),
                        _ => {}
                    }
                }
            }
        }
        Err(AnalysisError::Config(format!("unknown context sensitivity `{s}`")))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReflectionInference {
    Off,
    StringConstant,
    /// String-constant inference plus reporting of the reflective calls it
    /// could not resolve.
    Solar,
}

impl FromStr for ReflectionInference {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ReflectionInference::Off),
            "string-constant" => Ok(ReflectionInference::StringConstant),
            "solar" => Ok(ReflectionInference::Solar),
            _ => Err(AnalysisError::Config(format!("unknown reflection inference `{s}`"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub solver: SolverKind,
    pub context_sensitivity: ContextSensitivity,
    /// Confine body processing to application classes.
    pub only_app: bool,

    // heap-model tuning
    pub distinguish_string_constants: bool,
    pub merge_string_objects: bool,
    pub merge_string_builders: bool,
    pub merge_exception_objects: bool,

    pub taint_config: Option<PathBuf>,
    pub reflection_inference: ReflectionInference,
    pub reflection_log: Option<PathBuf>,

    pub timeout_secs: Option<u64>,

    pub dump_stats: bool,
    pub call_graph_output: Option<String>,
    pub pts_output: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            solver: SolverKind::Default,
            context_sensitivity: ContextSensitivity::Insensitive,
            only_app: false,
            distinguish_string_constants: true,
            merge_string_objects: false,
            merge_string_builders: false,
            merge_exception_objects: false,
            taint_config: None,
            reflection_inference: ReflectionInference::Off,
            reflection_log: None,
            timeout_secs: None,
            dump_stats: false,
            call_graph_output: None,
            pts_output: None,
        }
    }
}

impl AnalysisOptions {
    /// Parses options from a list of strings. Returns the input program
    /// path, if one was given. Malformed or unknown option values produce a
    /// configuration error before any analysis work starts.
    pub fn parse_from_args(&mut self, args: &[String]) -> Result<Option<String>, AnalysisError> {
        let matches = make_options_parser()
            .try_get_matches_from(args.iter())
            .map_err(|e| AnalysisError::Config(e.to_string()))?;

        if let Some(s) = matches.get_one::<String>("solver") {
            self.solver = s.parse()?;
        }
        if let Some(s) = matches.get_one::<String>("cs") {
            self.context_sensitivity = s.parse()?;
        }
        self.only_app = matches.contains_id("only-app");
        self.distinguish_string_constants = !matches.contains_id("no-distinguish-string-constants");
        self.merge_string_objects = matches.contains_id("merge-string-objects");
        self.merge_string_builders = matches.contains_id("merge-string-builders");
        self.merge_exception_objects = matches.contains_id("merge-exception-objects");
        self.taint_config = matches.get_one::<String>("taint-config").map(PathBuf::from);
        if let Some(s) = matches.get_one::<String>("reflection-inference") {
            self.reflection_inference = s.parse()?;
        }
        self.reflection_log = matches.get_one::<String>("reflection-log").map(PathBuf::from);
        self.timeout_secs = matches.get_one::<u64>("timeout").copied();
        self.dump_stats = matches.contains_id("dump-stats");
        self.call_graph_output = matches.get_one::<String>("call-graph-output").cloned();
        self.pts_output = matches.get_one::<String>("pts-output").cloned();

        Ok(matches.get_one::<String>("INPUT").cloned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn context_sensitivity_aliases() {
        assert_eq!("ci".parse::<ContextSensitivity>().unwrap(), ContextSensitivity::Insensitive);
        assert_eq!(
            "1-cfa".parse::<ContextSensitivity>().unwrap(),
            ContextSensitivity::KCallSite(1)
        );
        assert_eq!(
            "2-object".parse::<ContextSensitivity>().unwrap(),
            ContextSensitivity::KObject(2)
        );
        assert_eq!(
            "1-type".parse::<ContextSensitivity>().unwrap(),
            ContextSensitivity::KType(1)
        );
        assert!("3-flow".parse::<ContextSensitivity>().is_err());
        assert!("0-call".parse::<ContextSensitivity>().is_err());
    }

    #[test]
    fn unknown_option_values_are_config_errors() {
        let mut options = AnalysisOptions::default();
        let args: Vec<String> = vec!["--cs".into(), "banana".into()];
        assert!(matches!(
            options.parse_from_args(&args),
            Err(AnalysisError::Config(_))
        ));
    }
}
