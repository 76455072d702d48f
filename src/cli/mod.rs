//! CLI Module
//!
//! Provides command-line support shared by both binaries:
//! - Exit codes for automation
//! - Tracing subscriber setup

pub mod exit_codes;
pub mod logging;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use logging::init_tracing;
