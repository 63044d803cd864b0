//! User-facing surface: the command line.

pub mod cli;
