//! The netemu command line simulator: argument parsing, logging setup and
//! the default simulation built on [`netemu_core`].

pub mod cli;
pub mod simulation;
