//! # Observability & Tracing
//!
//! [`setup_tracing`] installs the process-wide subscriber. Library crates only emit events;
//! binaries call this once at startup.
//!
//! Lines are compact and omit the module path (`with_target(false)`). Container events
//! carry an `app` field, loader events carry `stage` and `feature`, and worker output is
//! nested in the `worker` span:
//!
//! ```text
//! INFO Starting app="demo" env="development"
//! INFO Stage loaded stage=INIT features=1
//! INFO Stage loaded stage=SERVICE features=1
//! INFO worker: Greeting cached app="demo" target="world"
//! ```
//!
//! Levels come from `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=info cargo run
//! # config resolution, event emission, cleanup counts
//! RUST_LOG=debug cargo run
//! RUST_LOG=stagehand_core=debug cargo run
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
