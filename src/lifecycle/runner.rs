//! # Runner
//!
//! Drives a container through one full lifecycle around a piece of work:
//!
//! | Method | Sequence |
//! |--------|----------|
//! | [`Runner::run`] | `start` → worker → `stop` (stop runs even if the worker fails) |
//! | [`Runner::run_until_shutdown`] | `start` → wait for Ctrl-C → `stop` |
//!
//! [`start_worker`] builds an [`App`] from a working directory and a config name and hands it
//! to [`Runner::run`].

use crate::error::AppError;
use crate::lifecycle::App;
use stagehand_core::{BoxError, ContainerOptions, ServiceContainer};
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, info_span, Instrument};

/// Name given to apps started through [`start_worker`] without an explicit one.
pub const DEFAULT_WORKER_NAME: &str = "Worker";

#[derive(Debug, Clone)]
pub struct Runner {
    container: ServiceContainer,
}

impl Runner {
    pub fn new(container: ServiceContainer) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    /// Start the container, run `worker` against it, then stop it.
    ///
    /// A worker failure takes precedence over a stop failure; the latter is only logged.
    pub async fn run<F, Fut, T>(&self, worker: F) -> Result<T, AppError>
    where
        F: FnOnce(ServiceContainer) -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.container.start().await?;

        let span = info_span!("worker", app = %self.container.name());
        let outcome = worker(self.container.clone()).instrument(span).await;
        let stopped = self.container.stop().await;

        match outcome {
            Ok(value) => {
                stopped?;
                Ok(value)
            }
            Err(e) => {
                if let Err(stop_err) = stopped {
                    self.container.log_error(&stop_err);
                }
                Err(AppError::Worker(e))
            }
        }
    }

    /// Start the container and keep it running until Ctrl-C.
    pub async fn run_until_shutdown(&self) -> Result<(), AppError> {
        self.container.start().await?;
        info!(app = %self.container.name(), "Running, press Ctrl-C to stop");

        let signal = tokio::signal::ctrl_c().await;
        info!(app = %self.container.name(), "Shutdown requested");
        self.container.stop().await?;
        signal.map_err(AppError::Signal)
    }
}

impl From<App> for Runner {
    fn from(app: App) -> Self {
        Self::new(app.container().clone())
    }
}

/// Create an app rooted at `working_path` that reads `<working_path>/conf/<config_name>*.json`,
/// then [`Runner::run`] `worker` in it.
///
/// `worker_name` defaults to [`DEFAULT_WORKER_NAME`] and becomes the app name.
pub async fn start_worker<F, Fut, T>(
    working_path: impl Into<PathBuf>,
    config_name: impl Into<String>,
    worker_name: Option<&str>,
    worker: F,
) -> Result<T, AppError>
where
    F: FnOnce(ServiceContainer) -> Fut,
    Fut: Future<Output = Result<T, BoxError>>,
{
    let app = App::new(
        worker_name.unwrap_or(DEFAULT_WORKER_NAME),
        ContainerOptions::default()
            .with_working_path(working_path)
            .with_config_name(config_name),
    );
    Runner::from(app).run(worker).await
}
