//! Memory usage monitoring. Currently only supported on Linux.

use std::io::{Error, ErrorKind, Read, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::{fs::File, time::Duration};

use libc::pid_t;
use log::*;
use nom::bytes::streaming::tag;
use nom::character::complete::digit1;
use nom::combinator::map_res;
use nom::multi::count;
use nom::sequence::{terminated, tuple};
use nom::IResult;

/// Memory usage information processed from `/proc/[pid]/statm`.
///
/// All values are in units of pages.
///
/// See `man 5 proc` and `Linux/fs/proc/array.c`.
#[derive(Debug, Default, PartialEq, Eq, Hash)]
pub struct Statm {
    /// Total virtual memory size.
    pub size: usize,
    /// Resident non-swapped memory.
    pub resident: usize,
    /// Shared memory.
    pub share: usize,
    /// Resident executable memory.
    pub text: usize,
    /// Resident data and stack memory.
    pub data: usize,
}

/// Samples the resident set size on a background thread while the analysis
/// runs, reporting the peak at the end.
pub struct MemoryWatcher {
    init_resident: usize,
    max_resident: Arc<Mutex<usize>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Default for MemoryWatcher {
    fn default() -> Self {
        MemoryWatcher {
            init_resident: 0,
            max_resident: Arc::new(Mutex::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl MemoryWatcher {
    pub fn new() -> Self {
        if let Ok(statm) = statm_self() {
            MemoryWatcher {
                init_resident: statm.resident,
                ..Default::default()
            }
        } else {
            debug!("unable to read the statm file; memory watching disabled");
            MemoryWatcher::default()
        }
    }

    pub fn start(&mut self) {
        let max_resident = self.max_resident.clone();
        let running = self.running.clone();
        running.store(true, Ordering::Relaxed);
        self.handle = Some(thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                if let Ok(statm) = statm_self() {
                    let mut max_rss = max_resident.lock().unwrap();
                    if statm.resident > *max_rss {
                        *max_rss = statm.resident;
                    }
                }
                thread::sleep(Duration::from_millis(100));
            }
        }));
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        let max_rss = *self.max_resident.lock().unwrap();
        if max_rss > 0 {
            info!(
                "memory: {} MB before analysis, {} MB peak",
                rss_in_megabytes(self.init_resident),
                rss_in_megabytes(max_rss),
            );
        }
    }
}

fn rss_in_megabytes(rss_pages: usize) -> usize {
    rss_pages * 4 / 1024
}

/// Transforms a `nom` parse result into an io result.
/// The parser must completely consume the input.
fn map_result<T>(result: IResult<&str, T>) -> Result<T> {
    match result {
        IResult::Ok((remaining, val)) => {
            if remaining.is_empty() {
                Result::Ok(val)
            } else {
                Result::Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("unable to parse whole input, remaining: {:?}", remaining),
                ))
            }
        }
        IResult::Err(err) => Result::Err(Error::new(
            ErrorKind::InvalidInput,
            format!("unable to parse input: {:?}", err),
        )),
    }
}

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

/// Parses the statm file format.
///
/// The columns in the statm file include: size resident shared text lib data dt
fn parse_statm(input: &str) -> IResult<&str, Statm> {
    tuple((count(terminated(parse_usize, tag(" ")), 6), parse_usize))(input).map(
        |(next_input, res)| {
            let statm = Statm {
                size: res.0[0],
                resident: res.0[1],
                share: res.0[2],
                text: res.0[3],
                data: res.0[5],
            };
            (next_input, statm)
        },
    )
}

/// Parses the provided statm file.
fn statm_file(file: &mut File) -> Result<Statm> {
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    map_result(parse_statm(buf.trim()))
}

/// Returns memory status information for the process with the provided pid.
pub fn statm(pid: pid_t) -> Result<Statm> {
    statm_file(&mut File::open(format!("/proc/{}/statm", pid))?)
}

/// Returns memory status information for the current process.
pub fn statm_self() -> Result<Statm> {
    statm_file(&mut File::open("/proc/self/statm")?)
}
