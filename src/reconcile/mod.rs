//! Result reconciliation.
//!
//! A burst produces two independent completion streams: per-frame metadata
//! results and per-frame raw buffers. Both carry the frame's hardware
//! timestamp, which is the only key correlating them; their relative order
//! is unspecified. A [`RunLedger`] joins the streams for one capture run:
//! each arrival scans the opposite pool for its partner and either
//! dispatches the matched pair to the persistence lane or parks itself to
//! wait.
//!
//! Both arrival paths may run concurrently, so the whole
//! scan-remove-or-insert step executes under one mutex; splitting the scan
//! from the removal would let a pair match twice.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::device::{FrameMetadata, FrameTimestamp, RawFrame};

#[cfg(test)]
mod tests;

/// One matched frame handed to the persistence lane.
#[derive(Debug)]
pub struct SaveJob {
    pub frame: RawFrame,
    pub metadata: FrameMetadata,
    pub filename: String,
}

/// A frame that was matched and dispatched, in output-numbering order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SavedFrame {
    pub filename: String,
    pub metadata: FrameMetadata,
}

/// Outcome of one capture run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub design_name: String,
    pub expected: usize,
    pub saved: Vec<SavedFrame>,
    pub failed: usize,
}

struct LedgerInner {
    /// Timestamps of frames submitted as part of this run's burst. Buffers
    /// outside this set are leftovers from convergence probing or an
    /// earlier run and are discarded on arrival.
    timestamps: HashSet<FrameTimestamp>,
    /// Metadata results still waiting for their buffer.
    pending_metadata: Vec<FrameMetadata>,
    /// Buffers still waiting for their metadata result.
    pending_frames: Vec<RawFrame>,
    /// Matched frames in filename-assignment order.
    saved: Vec<SavedFrame>,
    failed: usize,
    /// Taken exactly once, when the run completes.
    finished_tx: Option<oneshot::Sender<RunSummary>>,
}

/// Per-run reconciliation ledger. Created when a burst begins, fed by the
/// two completion streams, retired when every expected frame is accounted
/// for.
pub struct RunLedger {
    design_name: String,
    expected: usize,
    save_tx: mpsc::UnboundedSender<SaveJob>,
    inner: Mutex<LedgerInner>,
}

impl RunLedger {
    /// Returns the ledger and a receiver resolving to the run summary when
    /// the final expected frame is matched or failed.
    pub fn new(
        design_name: String,
        expected: usize,
        save_tx: mpsc::UnboundedSender<SaveJob>,
    ) -> (Self, oneshot::Receiver<RunSummary>) {
        let (finished_tx, finished_rx) = oneshot::channel();
        let ledger = Self {
            design_name,
            expected,
            save_tx,
            inner: Mutex::new(LedgerInner {
                timestamps: HashSet::new(),
                pending_metadata: Vec::new(),
                pending_frames: Vec::new(),
                saved: Vec::new(),
                failed: 0,
                finished_tx: Some(finished_tx),
            }),
        };
        (ledger, finished_rx)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Record that a burst frame started integrating. The timestamp marks
    /// every later artifact of this frame as belonging to the run.
    pub fn record_capture_started(&self, timestamp: FrameTimestamp) {
        self.inner.lock().timestamps.insert(timestamp);
    }

    /// Metadata-completion arrival path.
    pub fn record_metadata(&self, metadata: FrameMetadata) {
        let mut inner = self.inner.lock();

        if let Some(index) = inner
            .pending_frames
            .iter()
            .position(|frame| frame.timestamp == metadata.timestamp)
        {
            let frame = inner.pending_frames.swap_remove(index);
            self.dispatch(&mut inner, frame, metadata);
        } else {
            debug!(
                timestamp = %metadata.timestamp,
                "no buffer yet for metadata result, parking it"
            );
            inner.pending_metadata.push(metadata);
        }
    }

    /// Buffer arrival path.
    pub fn record_frame(&self, frame: RawFrame) {
        let mut inner = self.inner.lock();

        if !inner.timestamps.contains(&frame.timestamp) {
            // Convergence-probe leftovers and frames of an already-retired
            // run must not enter the pool: they would pin buffer capacity
            // and risk false matches.
            debug!(
                timestamp = %frame.timestamp,
                "discarding buffer that is not part of this run"
            );
            return;
        }

        if let Some(index) = inner
            .pending_metadata
            .iter()
            .position(|metadata| metadata.timestamp == frame.timestamp)
        {
            let metadata = inner.pending_metadata.swap_remove(index);
            self.dispatch(&mut inner, frame, metadata);
        } else {
            debug!(
                timestamp = %frame.timestamp,
                "no metadata yet for buffer, parking it"
            );
            inner.pending_frames.push(frame);
        }
    }

    /// A frame of this run failed outright: no metadata result or buffer
    /// will ever arrive for it. It still counts toward completion so the
    /// run cannot hang waiting for it.
    pub fn record_failure(&self, reason: &str) {
        warn!(design = %self.design_name, "frame capture failed: {}", reason);
        let mut inner = self.inner.lock();
        inner.failed += 1;
        self.check_complete(&mut inner);
    }

    /// Assign the next output filename and hand the matched pair to the
    /// persistence lane. Runs inside the arrival critical section.
    fn dispatch(&self, inner: &mut LedgerInner, frame: RawFrame, metadata: FrameMetadata) {
        let filename = format!(
            "{}-{}.{}",
            self.design_name,
            inner.saved.len() + 1,
            frame.format.extension()
        );
        inner.saved.push(SavedFrame {
            filename: filename.clone(),
            metadata: metadata.clone(),
        });

        if self
            .save_tx
            .send(SaveJob {
                frame,
                metadata,
                filename,
            })
            .is_err()
        {
            warn!("persistence lane is gone, dropping matched frame");
        }

        self.check_complete(inner);
    }

    fn check_complete(&self, inner: &mut LedgerInner) {
        if inner.saved.len() + inner.failed == self.expected {
            if let Some(tx) = inner.finished_tx.take() {
                debug!(design = %self.design_name, "capture sequence complete");
                let _ = tx.send(RunSummary {
                    design_name: self.design_name.clone(),
                    expected: self.expected,
                    saved: inner.saved.clone(),
                    failed: inner.failed,
                });
            }
        }
    }

    /// Number of entries still parked in either pool; zero once every
    /// expected frame has been matched.
    pub fn pending(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.pending_metadata.len(), inner.pending_frames.len())
    }
}
