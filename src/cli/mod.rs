//! CLI module for pacer - command-line interface and subcommands.
//!
//! Provides one-shot window and capacity queries plus a foreground `watch`
//! mode that runs the capacity monitor.

pub mod commands;

pub use commands::Cli;
