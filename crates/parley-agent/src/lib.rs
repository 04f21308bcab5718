//! # parley-agent
//!
//! Command-line front end for the Parley context engine.
//!
//! - [`cli`]: argument parsing
//! - [`commands`]: subcommand implementations writing to any [`std::io::Write`]

#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
