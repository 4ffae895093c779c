//! Agent task loop over a flat JSON task file.
//!
//! This crate implements a task-loop execution model where CLI coding agents
//! iteratively work through a shared task file until every task is resolved.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, scheduling, merge,
//!   summary extraction, wire decoding). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, process execution,
//!   schema validation, prompt rendering). Isolated to enable doubles in tests.
//!
//! Orchestration modules ([`step`], [`looping`], [`validate`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
