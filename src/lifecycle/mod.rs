//! Application lifecycle: building an [`App`], driving it with a [`Runner`], and
//! installing the log subscriber.
//!
//! - [`App`] - a container whose module table already holds the builtin features
//! - [`Runner`] - start, run a worker, stop
//! - [`start_worker`] - the one-call entry point for worker binaries
//! - [`setup_tracing`] - initializes the tracing/logging infrastructure

pub mod app;
pub mod runner;
pub mod tracing;

pub use app::*;
pub use runner::*;
pub use tracing::*;
