//! Shared plumbing for the UGM workspace.

pub mod logging;

pub use logging::{init_logging, init_test_logging};
