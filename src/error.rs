//! Errors surfaced by the application facade.

use stagehand_core::{BoxError, ContainerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Starting or stopping the container failed.
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("worker failed: {0}")]
    Worker(#[source] BoxError),

    /// Waiting for the shutdown signal failed.
    #[error("unable to listen for the shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}
