//! The main routine of `oopta`: parses options, loads the JSON program,
//! runs the pointer analysis and dumps the requested outputs.

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use log::*;

use oopta::front::json;
use oopta::pta;
use oopta::util::options::AnalysisOptions;
use oopta::util::pta_statistics::PTAStat;
use oopta::util::results_dumper;

fn main() -> ExitCode {
    if env::var("PTA_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PTA_LOG")
            .write_style("PTA_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("oopta: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = AnalysisOptions::default();
    let input = options
        .parse_from_args(&args)?
        .context("no input program given")?;
    info!("PTA Options: {:?}", options);

    let mut program = json::load_program(Path::new(&input))
        .with_context(|| format!("failed to load {input}"))?;
    let result = pta::run_pta(&mut program, &options)?;

    results_dumper::dump_results(&program, &result, &options);
    if options.dump_stats {
        PTAStat::new(&program, &result).dump_stats();
    }
    Ok(())
}
