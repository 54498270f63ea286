//! `oopta`: a whole-program, context-sensitive, subset-based pointer
//! analysis for an object-oriented, bytecode-like intermediate
//! representation.
//!
//! A front end hands the analysis a reified [`ir::program::Program`]
//! (classes, methods, typed statements, entry points); the solver computes,
//! for every abstract pointer, the set of abstract heap objects it may
//! reference, together with the call graph reachable from the entry points,
//! and freezes them into a [`pta::result::PTAResult`].

pub mod error;
pub mod front;
pub mod graph;
pub mod ir;
pub mod pta;
pub mod pts_set;
pub mod util;
