//! Core library for shellpipe
//!
//! This crate contains the command execution engine (spawn a shell, stream
//! its stdout through a bounded queue, track the run's lifecycle) together
//! with configuration loading, logging and error handling.

pub mod config;
pub mod errors;
pub mod logging;
pub mod shell;
