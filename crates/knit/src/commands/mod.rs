//! Command implementations for knit CLI.
//!
//! Each submodule implements the logic for one command.

pub mod compile;
pub mod compilers;
pub mod doctor;
pub mod generate;
pub mod scan;
