//! Camera device abstraction.
//!
//! The engine never talks to hardware directly; it drives a
//! [`CaptureSession`] obtained from a [`CameraDevice`], which a backend
//! opens through [`CameraBackend`]. Frame completions come back on two
//! independent streams: per-frame metadata events (delivered in submission
//! order) and raw image buffers (no ordering guarantee relative to the
//! events or to each other). The reconciliation engine joins the two.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::exposure::ResolvedExposure;

pub mod mock;

pub use mock::{DeliveryOrder, MockBackend, MockScript};

/// Hardware timestamp: an opaque monotonically increasing per-frame
/// identifier, the only reliable key correlating a metadata result with its
/// image buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FrameTimestamp(pub i64);

impl std::fmt::Display for FrameTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auto-focus routine state as reported per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    PassiveUnfocused,
    FocusedLocked,
    NotFocusedLocked,
}

/// Auto-exposure routine state as reported per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeState {
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    Off,
    ContinuousPicture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeMode {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AePrecaptureTrigger {
    Idle,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    Off,
    Fast,
    HighQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseReductionMode {
    Off,
    Fast,
    HighQuality,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TonemapMode {
    /// Explicit response curve; devcam only ever programs the linear one.
    ContrastCurve { curve: Vec<(f32, f32)> },
    Fast,
    HighQuality,
}

impl TonemapMode {
    /// Identity response curve, for captures that must bypass the device's
    /// tone mapping entirely.
    pub fn linear() -> Self {
        TonemapMode::ContrastCurve {
            curve: vec![(0.0, 0.0), (1.0, 1.0)],
        }
    }
}

/// Post-processing settings held fixed for a whole design.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingProfile {
    pub edge_mode: EdgeMode,
    pub noise_reduction: NoiseReductionMode,
    pub tonemap: TonemapMode,
}

impl ProcessingProfile {
    pub fn off() -> Self {
        Self {
            edge_mode: EdgeMode::Off,
            noise_reduction: NoiseReductionMode::Off,
            tonemap: TonemapMode::linear(),
        }
    }

    pub fn fast() -> Self {
        Self {
            edge_mode: EdgeMode::Fast,
            noise_reduction: NoiseReductionMode::Fast,
            tonemap: TonemapMode::Fast,
        }
    }

    pub fn high_quality() -> Self {
        Self {
            edge_mode: EdgeMode::HighQuality,
            noise_reduction: NoiseReductionMode::HighQuality,
            tonemap: TonemapMode::HighQuality,
        }
    }
}

/// Where a request routes its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceRole {
    /// Live view; frames here are displayed, never persisted.
    Preview,
    /// Image reader; frames here come back as [`RawFrame`]s.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface {
    pub id: u32,
    pub role: SurfaceRole,
}

impl Surface {
    pub fn preview(id: u32) -> Self {
        Self {
            id,
            role: SurfaceRole::Preview,
        }
    }

    pub fn output(id: u32) -> Self {
        Self {
            id,
            role: SurfaceRole::Output,
        }
    }
}

/// One device-level capture command.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub af_mode: AfMode,
    pub ae_mode: AeMode,
    pub af_trigger: AfTrigger,
    pub ae_precapture_trigger: AePrecaptureTrigger,
    /// Unlock AE explicitly; only meaningful when restoring a preview after
    /// a capture sequence may have left it locked.
    pub ae_lock: bool,
    /// Manual sensor/lens values. Present iff both control modes are Off.
    pub manual: Option<ResolvedExposure>,
    pub processing: Option<ProcessingProfile>,
    pub targets: Vec<Surface>,
}

impl CaptureRequest {
    /// A fully-automatic request, the base for previews and convergence
    /// probes.
    pub fn automatic(targets: Vec<Surface>) -> Self {
        Self {
            af_mode: AfMode::ContinuousPicture,
            ae_mode: AeMode::On,
            af_trigger: AfTrigger::Idle,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
            ae_lock: false,
            manual: None,
            processing: None,
            targets,
        }
    }

    /// A fully-manual request carrying explicit exposure values.
    pub fn manual(values: ResolvedExposure, targets: Vec<Surface>) -> Self {
        Self {
            af_mode: AfMode::Off,
            ae_mode: AeMode::Off,
            af_trigger: AfTrigger::Idle,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
            ae_lock: false,
            manual: Some(values),
            processing: None,
            targets,
        }
    }
}

/// Per-frame capture outcome reported by the metadata channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub timestamp: FrameTimestamp,
    pub exposure_time_ns: Option<i64>,
    pub sensitivity: Option<i32>,
    pub aperture: Option<f32>,
    pub focal_length: Option<f32>,
    pub focus_distance: Option<f32>,
    pub af_state: Option<AfState>,
    pub ae_state: Option<AeState>,
}

impl FrameMetadata {
    pub fn new(timestamp: FrameTimestamp) -> Self {
        Self {
            timestamp,
            exposure_time_ns: None,
            sensitivity: None,
            aperture: None,
            focal_length: None,
            focus_distance: None,
            af_state: None,
            ae_state: None,
        }
    }
}

/// Pixel layout of a delivered buffer; selects the on-disk container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Jpeg,
    RawSensor,
    Yuv420,
}

impl PixelFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PixelFormat::Jpeg => "jpg",
            PixelFormat::RawSensor => "dng",
            PixelFormat::Yuv420 => "yuv",
        }
    }
}

/// A raw image buffer from the output surface.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub timestamp: FrameTimestamp,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub pixel_stride: u32,
    pub row_stride: u32,
    pub data: Vec<u8>,
}

/// Completion events for burst frames, delivered in submission order.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// The exposure started integrating; the timestamp identifies every
    /// later artifact of this frame.
    Started { timestamp: FrameTimestamp },
    Completed { metadata: FrameMetadata },
    Failed { reason: String },
}

/// The two completion streams of a capture session.
pub struct SessionStreams {
    pub events: mpsc::UnboundedReceiver<FrameEvent>,
    pub frames: mpsc::UnboundedReceiver<RawFrame>,
}

/// Static description of what the device can do.
#[derive(Debug, Clone, Default)]
pub struct CameraCapabilities {
    /// Supported exposure time range in nanoseconds.
    pub exposure_time_range: Option<(i64, i64)>,
    /// Supported ISO range.
    pub sensitivity_range: Option<(i32, i32)>,
    /// Available apertures (f-numbers), ascending.
    pub apertures: Vec<f32>,
    /// Available focal lengths in millimeters, ascending.
    pub focal_lengths: Vec<f32>,
    /// Closest focusable distance, in diopters. `None` if not reported.
    pub min_focus_distance: Option<f32>,
    pub has_manual_sensor: bool,
    pub has_post_processing_control: bool,
}

/// An opened camera device.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    fn capabilities(&self) -> CameraCapabilities;

    /// Configure a capture session over the given surface set. Returns the
    /// session handle and its two completion streams. Creating a new
    /// session invalidates any previous one.
    async fn create_session(
        &self,
        surfaces: Vec<Surface>,
    ) -> Result<(Arc<dyn CaptureSession>, SessionStreams)>;
}

/// A configured capture session.
#[async_trait]
pub trait CaptureSession: Send + Sync {
    /// Single-shot capture. The frame's metadata result is returned inline;
    /// frames targeted at an output surface still arrive on the frame
    /// stream.
    async fn submit(&self, request: CaptureRequest) -> Result<FrameMetadata>;

    /// Submit a sequence of requests as one atomic burst, in order.
    /// Completions are delivered on the session's event stream.
    async fn submit_burst(&self, requests: Vec<CaptureRequest>) -> Result<()>;

    async fn set_repeating(&self, request: CaptureRequest) -> Result<()>;

    async fn stop_repeating(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Entry point a backend implements to expose its cameras.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    async fn open(&self, camera_id: &str) -> Result<Arc<dyn CameraDevice>>;
}
