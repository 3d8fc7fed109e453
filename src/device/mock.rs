//! Synthetic camera backend.
//!
//! Plays back scripted auto-focus/auto-exposure convergence sequences and
//! delivers burst completions with a configurable ordering between the
//! metadata and frame streams, so the capture pipeline can be exercised
//! end to end without hardware. Used by the test suite and by the CLI.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    AeMode, AeState, AfMode, AfState, CameraBackend, CameraCapabilities, CameraDevice,
    CaptureRequest, CaptureSession, FrameEvent, FrameMetadata, FrameTimestamp, PixelFormat,
    RawFrame, SessionStreams, Surface, SurfaceRole,
};
use crate::error::{DeviceError, Result};

/// Relative ordering of the two completion streams for burst frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOrder {
    /// Every metadata result arrives before any image buffer.
    MetadataThenFrames,
    /// Every image buffer arrives before any metadata result.
    FramesThenMetadata,
    /// Buffers arrive in reverse frame order, interleaved with in-order
    /// metadata results.
    Interleaved,
}

/// Deterministic behavior script for the synthetic camera.
#[derive(Debug, Clone)]
pub struct MockScript {
    /// AF states reported on successive probes while AF is engaged; the
    /// last entry repeats.
    pub af_states: Vec<AfState>,
    /// AE states reported on successive probes while AE is engaged; the
    /// last entry repeats.
    pub ae_states: Vec<AeState>,
    pub auto_exposure_time_ns: Option<i64>,
    pub auto_sensitivity: Option<i32>,
    pub auto_aperture: Option<f32>,
    pub auto_focal_length: Option<f32>,
    pub auto_focus_distance: Option<f32>,
    pub delivery: DeliveryOrder,
    /// Extra buffers delivered during a burst with timestamps that belong
    /// to no submitted frame.
    pub stray_frames: usize,
    /// Burst indices whose capture fails instead of completing.
    pub failed_frames: HashSet<usize>,
    pub frame_format: PixelFormat,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            af_states: vec![AfState::PassiveScan, AfState::PassiveFocused, AfState::FocusedLocked],
            ae_states: vec![AeState::Searching, AeState::Converged],
            auto_exposure_time_ns: Some(20_000_000),
            auto_sensitivity: Some(400),
            auto_aperture: Some(2.0),
            auto_focal_length: Some(4.5),
            auto_focus_distance: Some(2.5),
            delivery: DeliveryOrder::Interleaved,
            stray_frames: 0,
            failed_frames: HashSet::new(),
            frame_format: PixelFormat::Jpeg,
        }
    }
}

struct MockShared {
    capabilities: CameraCapabilities,
    script: MockScript,
    next_timestamp: AtomicI64,
    next_stray: AtomicI64,
    submitted: Mutex<Vec<CaptureRequest>>,
    repeating: Mutex<Option<CaptureRequest>>,
}

/// Backend producing [`MockCamera`] devices. Clones share state, so a test
/// can keep one clone and inspect what the engine submitted.
#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<MockShared>,
    fail_open: bool,
}

impl MockBackend {
    pub fn new(script: MockScript) -> Self {
        Self::with_capabilities(script, Self::default_capabilities())
    }

    pub fn with_capabilities(script: MockScript, capabilities: CameraCapabilities) -> Self {
        Self {
            shared: Arc::new(MockShared {
                capabilities,
                script,
                next_timestamp: AtomicI64::new(1_000),
                next_stray: AtomicI64::new(-1),
                submitted: Mutex::new(Vec::new()),
                repeating: Mutex::new(None),
            }),
            fail_open: false,
        }
    }

    /// A backend whose `open` fails, for exercising the error path.
    pub fn failing() -> Self {
        let mut backend = Self::new(MockScript::default());
        backend.fail_open = true;
        backend
    }

    pub fn default_capabilities() -> CameraCapabilities {
        CameraCapabilities {
            exposure_time_range: Some((1_000, 1_000_000_000)),
            sensitivity_range: Some((100, 3_200)),
            apertures: vec![2.0],
            focal_lengths: vec![4.5],
            min_focus_distance: Some(10.0),
            has_manual_sensor: true,
            has_post_processing_control: true,
        }
    }

    /// Every request submitted through any session of this backend, in
    /// submission order.
    pub fn submitted_requests(&self) -> Vec<CaptureRequest> {
        self.shared.submitted.lock().clone()
    }

    pub fn repeating_request(&self) -> Option<CaptureRequest> {
        self.shared.repeating.lock().clone()
    }
}

#[async_trait]
impl CameraBackend for MockBackend {
    async fn open(&self, camera_id: &str) -> Result<Arc<dyn CameraDevice>> {
        if self.fail_open {
            return Err(DeviceError::DeviceOpen {
                details: format!("no such camera: {}", camera_id),
            }
            .into());
        }
        debug!("Opening synthetic camera {}", camera_id);
        Ok(Arc::new(MockCamera {
            shared: self.shared.clone(),
        }))
    }
}

pub struct MockCamera {
    shared: Arc<MockShared>,
}

#[async_trait]
impl CameraDevice for MockCamera {
    fn capabilities(&self) -> CameraCapabilities {
        self.shared.capabilities.clone()
    }

    async fn create_session(
        &self,
        surfaces: Vec<Surface>,
    ) -> Result<(Arc<dyn CaptureSession>, SessionStreams)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let session = Arc::new(MockSession {
            shared: self.shared.clone(),
            surfaces,
            probe_positions: Mutex::new(ProbePositions::default()),
            events_tx,
            frames_tx,
        });
        Ok((
            session,
            SessionStreams {
                events: events_rx,
                frames: frames_rx,
            },
        ))
    }
}

#[derive(Default)]
struct ProbePositions {
    af: usize,
    ae: usize,
}

struct MockSession {
    shared: Arc<MockShared>,
    surfaces: Vec<Surface>,
    probe_positions: Mutex<ProbePositions>,
    events_tx: mpsc::UnboundedSender<FrameEvent>,
    frames_tx: mpsc::UnboundedSender<RawFrame>,
}

impl MockSession {
    fn next_timestamp(&self) -> FrameTimestamp {
        FrameTimestamp(self.shared.next_timestamp.fetch_add(1, Ordering::SeqCst))
    }

    fn check_targets(&self, request: &CaptureRequest) -> Result<()> {
        if request.targets.iter().all(|t| self.surfaces.contains(t)) {
            Ok(())
        } else {
            Err(DeviceError::CaptureFailed {
                details: "request targets a surface the session was not configured with"
                    .to_string(),
            }
            .into())
        }
    }

    fn targets_output(&self, request: &CaptureRequest) -> bool {
        request
            .targets
            .iter()
            .any(|s| s.role == SurfaceRole::Output)
    }

    fn metadata_for(&self, request: &CaptureRequest, timestamp: FrameTimestamp) -> FrameMetadata {
        let script = &self.shared.script;
        let mut metadata = FrameMetadata::new(timestamp);

        match &request.manual {
            Some(values) => {
                metadata.exposure_time_ns = Some(values.exposure_time_ns);
                metadata.sensitivity = Some(values.sensitivity);
                metadata.aperture = Some(values.aperture);
                metadata.focal_length = Some(values.focal_length);
                metadata.focus_distance = Some(values.focus_distance);
            }
            None => {
                metadata.exposure_time_ns = script.auto_exposure_time_ns;
                metadata.sensitivity = script.auto_sensitivity;
                metadata.aperture = script.auto_aperture;
                metadata.focal_length = script.auto_focal_length;
                metadata.focus_distance = script.auto_focus_distance;
            }
        }

        let mut positions = self.probe_positions.lock();
        if request.af_mode == AfMode::ContinuousPicture && !script.af_states.is_empty() {
            let index = positions.af.min(script.af_states.len() - 1);
            metadata.af_state = Some(script.af_states[index]);
            positions.af += 1;
        }
        if request.ae_mode == AeMode::On && !script.ae_states.is_empty() {
            let index = positions.ae.min(script.ae_states.len() - 1);
            metadata.ae_state = Some(script.ae_states[index]);
            positions.ae += 1;
        }

        metadata
    }

    fn frame_for(&self, metadata: &FrameMetadata) -> RawFrame {
        let format = self.shared.script.frame_format;
        RawFrame {
            timestamp: metadata.timestamp,
            format,
            width: 64,
            height: 48,
            pixel_stride: 1,
            row_stride: 64,
            data: vec![0u8; 64 * 48],
        }
    }

    fn stray_frame(&self) -> RawFrame {
        let ts = self.shared.next_stray.fetch_sub(1, Ordering::SeqCst);
        RawFrame {
            timestamp: FrameTimestamp(ts),
            format: self.shared.script.frame_format,
            width: 64,
            height: 48,
            pixel_stride: 1,
            row_stride: 64,
            data: vec![0u8; 64 * 48],
        }
    }
}

#[async_trait]
impl CaptureSession for MockSession {
    async fn submit(&self, request: CaptureRequest) -> Result<FrameMetadata> {
        self.check_targets(&request)?;
        self.shared.submitted.lock().push(request.clone());
        let timestamp = self.next_timestamp();
        let metadata = self.metadata_for(&request, timestamp);
        if self.targets_output(&request) {
            let _ = self.frames_tx.send(self.frame_for(&metadata));
        }
        Ok(metadata)
    }

    async fn submit_burst(&self, requests: Vec<CaptureRequest>) -> Result<()> {
        if requests.is_empty() {
            return Err(DeviceError::CaptureFailed {
                details: "empty burst".to_string(),
            }
            .into());
        }
        for request in &requests {
            self.check_targets(request)?;
        }

        let script = self.shared.script.clone();
        let mut completions = Vec::with_capacity(requests.len());
        let mut frames = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            self.shared.submitted.lock().push(request.clone());
            let timestamp = self.next_timestamp();
            let _ = self.events_tx.send(FrameEvent::Started { timestamp });

            if script.failed_frames.contains(&index) {
                completions.push(FrameEvent::Failed {
                    reason: format!("scripted failure for frame {}", index),
                });
                continue;
            }

            let metadata = self.metadata_for(request, timestamp);
            if self.targets_output(request) {
                frames.push(self.frame_for(&metadata));
            }
            completions.push(FrameEvent::Completed { metadata });
        }

        for _ in 0..script.stray_frames {
            let _ = self.frames_tx.send(self.stray_frame());
        }

        match script.delivery {
            DeliveryOrder::MetadataThenFrames => {
                for event in completions {
                    let _ = self.events_tx.send(event);
                }
                for frame in frames {
                    let _ = self.frames_tx.send(frame);
                }
            }
            DeliveryOrder::FramesThenMetadata => {
                for frame in frames {
                    let _ = self.frames_tx.send(frame);
                }
                for event in completions {
                    let _ = self.events_tx.send(event);
                }
            }
            DeliveryOrder::Interleaved => {
                frames.reverse();
                let mut frames = frames.into_iter();
                for event in completions {
                    if let Some(frame) = frames.next() {
                        let _ = self.frames_tx.send(frame);
                    }
                    let _ = self.events_tx.send(event);
                }
                for frame in frames {
                    let _ = self.frames_tx.send(frame);
                }
            }
        }

        Ok(())
    }

    async fn set_repeating(&self, request: CaptureRequest) -> Result<()> {
        *self.shared.repeating.lock() = Some(request);
        Ok(())
    }

    async fn stop_repeating(&self) -> Result<()> {
        *self.shared.repeating.lock() = None;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.shared.repeating.lock() = None;
        Ok(())
    }
}
