pub mod burst;
pub mod config;
pub mod convergence;
pub mod design;
pub mod device;
pub mod engine;
pub mod error;
pub mod exposure;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod storage;

pub use burst::{build_burst, capture_burst};
pub use config::{CaptureConfig, DevcamConfig, DeviceConfig, SystemConfig};
pub use convergence::{advance, initial_phase, run_convergence, Phase, StepAction};
pub use design::{io::load_design, io::save_design, CaptureDesign, ProcessingChoice};
pub use device::{
    AeState, AfState, CameraBackend, CameraCapabilities, CameraDevice, CaptureRequest,
    CaptureSession, FrameEvent, FrameMetadata, FrameTimestamp, MockBackend, MockScript,
    PixelFormat, RawFrame, SessionStreams, Surface, SurfaceRole,
};
pub use engine::CaptureEngine;
pub use error::{DesignError, DevcamError, DeviceError, Result, StorageError};
pub use exposure::{Exposure, ParamValue, ResolvedExposure};
pub use reconcile::{RunLedger, RunSummary, SaveJob, SavedFrame};
pub use remote::{capture_design_by_name, spawn_capture};
pub use session::{SessionController, SessionState};
pub use storage::FrameSaver;
