//! Pure loop logic: models, wire decoding, merge rules, scheduling.
//!
//! Nothing in here spawns processes or touches the filesystem; the modules
//! are fully testable in isolation.

pub mod checks;
pub mod event;
pub mod extract;
pub mod merge;
pub mod protocol;
pub mod schedule;
pub mod summary;
pub mod task;
