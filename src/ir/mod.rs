//! The object-oriented intermediate representation consumed by the analysis,
//! plus the interned analysis contexts layered over it.

pub mod context;
pub mod known_names;
pub mod program;
pub mod stmt;
