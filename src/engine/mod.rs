//! Capture orchestration.
//!
//! The [`CaptureEngine`] executes one capture design at a time against a
//! live session: it stops the preview, runs the auto-convergence machine
//! when the design needs it, resolves the design's variable parameters,
//! issues the burst, reconciles the two completion streams into matched
//! frames, writes the run's artifacts and restores the preview.
//!
//! A single capture-in-progress flag gates admission; there is no queue of
//! pending captures and no mid-burst cancellation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::burst;
use crate::config::CaptureConfig;
use crate::convergence;
use crate::design::CaptureDesign;
use crate::device::{FrameEvent, SessionStreams};
use crate::error::{DeviceError, Result};
use crate::reconcile::{RunLedger, RunSummary};
use crate::session::SessionController;
use crate::storage;


/// Shared slot holding the ledger of the run in flight, if any. The stream
/// pumps route arrivals through it; frames arriving while it is empty
/// belong to no run and are dropped.
type RunSlot = Arc<Mutex<Option<Arc<RunLedger>>>>;

pub struct CaptureEngine {
    controller: Arc<SessionController>,
    capture_config: CaptureConfig,
    capture_in_progress: AtomicBool,
    current_run: RunSlot,
    saver: storage::FrameSaver,
}

impl CaptureEngine {
    /// Build the engine and spawn its persistence worker. File I/O runs on
    /// the worker's own task so the device callback lanes never block on
    /// disk.
    pub fn new(controller: Arc<SessionController>, capture_config: CaptureConfig) -> Self {
        let output_dir = PathBuf::from(&capture_config.output_path);
        let saver = storage::FrameSaver::spawn(output_dir);
        Self {
            controller,
            capture_config,
            capture_in_progress: AtomicBool::new(false),
            current_run: Arc::new(Mutex::new(None)),
            saver,
        }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Drain and stop the persistence worker. Call before exiting so
    /// queued writes reach disk.
    pub async fn close(&self) {
        self.saver.close().await;
    }

    /// Execute a capture design. The caller's design is never mutated: the
    /// run works on a clone, so its variable parameters stay symbolic and
    /// a later run re-resolves them against that scene.
    pub async fn capture(&self, design: &CaptureDesign) -> Result<RunSummary> {
        if self
            .capture_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::CaptureInProgress.into());
        }

        let result = self.run_capture(design).await;
        // Whatever happened, the admission flag is released so the caller
        // can retry.
        self.capture_in_progress.store(false, Ordering::SeqCst);
        if result.is_err() {
            *self.current_run.lock() = None;
        }
        result
    }

    async fn run_capture(&self, requested: &CaptureDesign) -> Result<RunSummary> {
        if requested.is_empty() {
            return Err(DeviceError::EmptyDesign.into());
        }

        let session = self.controller.session().await?;
        let caps = self.controller.capabilities().await?;
        let preview_surfaces = self.controller.preview_surfaces().await;
        let output_surfaces = self.controller.output_surfaces().await;
        if output_surfaces.is_empty() {
            return Err(DeviceError::NoOutputSurface.into());
        }

        // A fresh session brings fresh completion streams; route them into
        // the run slot.
        if let Some(streams) = self.controller.take_streams().await {
            self.spawn_stream_router(streams);
        }

        let mut design = requested.clone();
        let needs_af = design.needs_auto_focus();
        let needs_ae = design.needs_auto_exposure();
        info!(
            design = design.name(),
            frames = design.len(),
            needs_af,
            needs_ae,
            "starting design capture"
        );

        session.stop_repeating().await?;

        if needs_af || needs_ae {
            let auto = convergence::run_convergence(
                session.as_ref(),
                needs_af,
                needs_ae,
                preview_surfaces.clone(),
            )
            .await?;
            design.resolve_all(&caps, &auto)?;
        } else {
            debug!("no auto values requested, capturing burst directly");
        }

        let (ledger, finished_rx) = RunLedger::new(
            design.name().to_string(),
            design.len(),
            self.saver.sender(),
        );
        let ledger = Arc::new(ledger);
        *self.current_run.lock() = Some(ledger.clone());

        // Burst frames go to the output surface and keep feeding the
        // preview so the capture is visible as it happens.
        let mut targets = output_surfaces;
        targets.extend(preview_surfaces.iter().copied());
        burst::capture_burst(session.as_ref(), &design, &caps, &targets).await?;

        let summary = finished_rx
            .await
            .map_err(|_| DeviceError::CaptureFailed {
                details: "reconciliation ended without a summary".to_string(),
            })?;
        *self.current_run.lock() = None;

        info!(
            design = summary.design_name.as_str(),
            saved = summary.saved.len(),
            failed = summary.failed,
            "design capture complete"
        );

        self.write_artifacts(requested, &summary).await;

        self.controller.restore_preview().await?;
        Ok(summary)
    }

    /// Write the per-run artifacts. Failures here are logged, not fatal:
    /// the frames themselves are already on their way to disk.
    async fn write_artifacts(&self, requested: &CaptureDesign, summary: &RunSummary) {
        let output_dir = PathBuf::from(&self.capture_config.output_path);

        if self.capture_config.save_metadata {
            if let Err(e) = storage::write_capture_metadata(&output_dir, summary).await {
                error!("failed to write capture metadata: {}", e);
            }
        }
        if self.capture_config.write_report {
            if let Err(e) = storage::write_design_report(&output_dir, requested, summary).await {
                error!("failed to write design report: {}", e);
            }
        }
    }

    /// Route the session's completion streams into whatever run is in
    /// flight. A single routing task serializes the device lane; the
    /// `biased` select drains queued frame events before touching buffers,
    /// preserving the device's started-before-buffer delivery order so
    /// membership is always recorded before the buffer shows up. The task
    /// ends when the session is torn down.
    fn spawn_stream_router(&self, streams: SessionStreams) {
        let SessionStreams {
            mut events,
            mut frames,
        } = streams;
        let run_slot = self.current_run.clone();

        tokio::spawn(async move {
            let mut events_open = true;
            let mut frames_open = true;
            while events_open || frames_open {
                tokio::select! {
                    biased;
                    event = events.recv(), if events_open => match event {
                        Some(event) => route_event(&run_slot, event),
                        None => events_open = false,
                    },
                    frame = frames.recv(), if frames_open => match frame {
                        Some(frame) => route_frame(&run_slot, frame),
                        None => frames_open = false,
                    },
                }
            }
            debug!("session streams ended");
        });
    }
}

fn route_event(run_slot: &RunSlot, event: FrameEvent) {
    let ledger = run_slot.lock().clone();
    match (ledger, event) {
        (Some(ledger), FrameEvent::Started { timestamp }) => {
            ledger.record_capture_started(timestamp);
        }
        (Some(ledger), FrameEvent::Completed { metadata }) => {
            ledger.record_metadata(metadata);
        }
        (Some(ledger), FrameEvent::Failed { reason }) => {
            ledger.record_failure(&reason);
        }
        (None, event) => {
            debug!(?event, "frame event outside any capture run, ignoring");
        }
    }
}

fn route_frame(run_slot: &RunSlot, frame: crate::device::RawFrame) {
    let ledger = run_slot.lock().clone();
    match ledger {
        Some(ledger) => ledger.record_frame(frame),
        None => {
            // A leftover of a retired design. Dropping it releases the
            // buffer immediately.
            warn!(
                timestamp = %frame.timestamp,
                "discarding image outside any capture run"
            );
        }
    }
}
