//! Environment probes shared by the configuration overlay features.

use serde::Deserialize;
use stagehand_core::BoxError;

/// Options of the probing CONF features.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProbeOptions {
    /// Use this value instead of asking the environment.
    #[serde(default)]
    pub alt_user_for_test: Option<String>,
}

/// Run a command and return its trimmed stdout.
pub(crate) async fn command_output(program: &str, args: &[&str]) -> Result<String, BoxError> {
    let output = tokio::process::Command::new(program).args(args).output().await?;
    if !output.status.success() {
        return Err(format!("`{program}` exited with {}", output.status).into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
