//! Integration test suite for dockspec
//!
//! End-to-end checks of resolution, emission and the command-line interface.
//! None of these tests need a container engine.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **cli**: `generate`, `list` and `show` through the built binary
//! - **resolve_emit**: specification chains resolved and emitted through the library

mod cli;
mod resolve_emit;
