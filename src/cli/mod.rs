//! CLI command handlers

pub mod commands;

pub use commands::{columns, map, open_session, parse_input, rules, run, sheets, RunOptions, SessionArgs};
