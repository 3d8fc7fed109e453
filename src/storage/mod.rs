//! Capture artifact persistence.
//!
//! Matched frames are written by a dedicated saver task so file I/O never
//! blocks the camera callback lanes. Alongside the image files, each run
//! produces a metadata JSON file keyed by filename and a plain-text report
//! of the originally requested design, so delivered parameters can be
//! compared with requested ones after the fact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::design::CaptureDesign;
use crate::device::PixelFormat;
use crate::error::{Result, StorageError};
use crate::reconcile::{RunSummary, SaveJob};


/// Handle to the background frame-saver task.
pub struct FrameSaver {
    tx: mpsc::UnboundedSender<SaveJob>,
    cancel: CancellationToken,
    handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FrameSaver {
    /// Spawn the saver worker. It runs until every sender is dropped or
    /// [`FrameSaver::close`] is called.
    pub fn spawn(output_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SaveJob>();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Queued jobs take priority so a close drains the
                    // backlog instead of dropping it.
                    biased;
                    job = rx.recv() => match job {
                        Some(job) => {
                            if let Err(e) = write_frame(&output_dir, &job).await {
                                error!("failed to save {}: {}", job.filename, e);
                            }
                        }
                        None => break,
                    },
                    _ = worker_cancel.cancelled() => break,
                }
            }
            debug!("frame saver stopped");
        });

        Self {
            tx,
            cancel,
            handle: parking_lot::Mutex::new(Some(handle)),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<SaveJob> {
        self.tx.clone()
    }

    /// Drain queued jobs and stop the worker.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Write one matched frame to disk in the container its pixel format
/// selects. JPEG and raw-sensor buffers are container data already; planar
/// YUV gets a 16-byte header of width, height, pixel stride and row stride
/// (little-endian u32 each) so readers can interpret the planes.
pub async fn write_frame(output_dir: &Path, job: &SaveJob) -> Result<PathBuf> {
    ensure_dir(output_dir).await?;
    let path = output_dir.join(&job.filename);

    let result = match job.frame.format {
        PixelFormat::Jpeg | PixelFormat::RawSensor => fs::write(&path, &job.frame.data).await,
        PixelFormat::Yuv420 => {
            let mut buffer = Vec::with_capacity(16 + job.frame.data.len());
            buffer.extend_from_slice(&job.frame.width.to_le_bytes());
            buffer.extend_from_slice(&job.frame.height.to_le_bytes());
            buffer.extend_from_slice(&job.frame.pixel_stride.to_le_bytes());
            buffer.extend_from_slice(&job.frame.row_stride.to_le_bytes());
            buffer.extend_from_slice(&job.frame.data);
            fs::write(&path, buffer).await
        }
    };

    result.map_err(|e| StorageError::WriteFailed {
        path: path.clone(),
        source: e,
    })?;
    info!("saved {}", path.display());
    Ok(path)
}

#[derive(Debug, Serialize)]
struct CaptureMetadataFile<'a> {
    design_name: &'a str,
    captured_at: DateTime<Utc>,
    expected_frames: usize,
    failed_frames: usize,
    frames: &'a [crate::reconcile::SavedFrame],
}

/// Write the per-run metadata JSON: every captured frame's delivered
/// parameter set, keyed by its assigned filename.
pub async fn write_capture_metadata(output_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    ensure_dir(output_dir).await?;
    let path = output_dir.join(format!("{}_capture_metadata.json", summary.design_name));

    let file = CaptureMetadataFile {
        design_name: &summary.design_name,
        captured_at: Utc::now(),
        expected_frames: summary.expected,
        failed_frames: summary.failed,
        frames: &summary.saved,
    };
    let rendered =
        serde_json::to_string_pretty(&file).map_err(StorageError::Serialization)?;

    fs::write(&path, rendered).await.map_err(|e| StorageError::WriteFailed {
        path: path.clone(),
        source: e,
    })?;
    debug!("wrote capture metadata to {}", path.display());
    Ok(path)
}

/// Write the plain-text report of what was requested. The camera does not
/// always deliver exactly what was asked for, and sometimes you simply
/// forget what it was you were trying to do.
pub async fn write_design_report(
    output_dir: &Path,
    requested: &CaptureDesign,
    summary: &RunSummary,
) -> Result<PathBuf> {
    ensure_dir(output_dir).await?;
    let path = output_dir.join(format!("{}_capture_report.txt", summary.design_name));

    let mut report = String::new();
    report.push_str(&format!("Design name: {}\n", summary.design_name));
    report.push_str(&format!(
        "Capture time: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    report.push_str(&format!("Processing setting: {}\n", requested.processing()));
    report.push_str(&format!(
        "Frames: {} captured, {} failed, {} expected\n",
        summary.saved.len(),
        summary.failed,
        summary.expected
    ));
    report.push_str("\nAperture | Exposure Time | Sensitivity | Focal Length | Focus Distance\n");
    for exposure in requested.exposures() {
        report.push_str(&format!("{}\n", exposure));
    }

    fs::write(&path, report).await.map_err(|e| StorageError::WriteFailed {
        path: path.clone(),
        source: e,
    })?;
    debug!("wrote design report to {}", path.display());
    Ok(path)
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await.map_err(|e| StorageError::DirectoryCreation {
        path: dir.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
