//! Scenario tests for the interactive session and the refresh engine
//!
//! Sessions are driven directly through `Session`, without a terminal.

#[path = "../helpers.rs"]
mod helpers;

mod concurrency;
mod failure_handling;
mod session_flow;
mod shutdown;
