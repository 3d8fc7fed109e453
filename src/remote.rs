//! Non-interactive capture triggering.
//!
//! A design already on disk can be executed by name, with completion
//! signalled only through the run's filesystem artifacts. This is the
//! surface scripted and remote callers use; nothing here talks back to the
//! requester.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::CaptureConfig;
use crate::design::io::load_design;
use crate::engine::CaptureEngine;
use crate::error::Result;
use crate::reconcile::RunSummary;

/// Resolve a design name to its file in the configured design directory.
/// A bare name gets the `.json` extension appended.
fn design_path(config: &CaptureConfig, name: &str) -> PathBuf {
    let mut path = PathBuf::from(&config.design_path).join(name);
    if path.extension().is_none() {
        path.set_extension("json");
    }
    path
}

/// Load a named design and capture it. The design's artifacts land in the
/// configured output directory.
pub async fn capture_design_by_name(
    engine: &CaptureEngine,
    config: &CaptureConfig,
    name: &str,
) -> Result<RunSummary> {
    let path = design_path(config, name);
    info!("remote capture requested for design '{}'", name);
    let design = load_design(&path).await?;
    engine.capture(&design).await
}

/// Fire-and-forget variant: the capture runs on its own task and reports
/// only through logs and the filesystem.
pub fn spawn_capture(
    engine: Arc<CaptureEngine>,
    config: CaptureConfig,
    name: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match capture_design_by_name(&engine, &config, &name).await {
            Ok(summary) => info!(
                design = summary.design_name.as_str(),
                saved = summary.saved.len(),
                failed = summary.failed,
                "remote capture finished"
            ),
            Err(e) => error!("remote capture of '{}' failed: {}", name, e),
        }
    })
}
