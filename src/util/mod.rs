pub mod index;
pub mod mem_watcher;
pub mod options;
pub mod pta_statistics;
pub mod results_dumper;
pub mod shared_queue;
