use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Design error: {0}")]
    Design(#[from] DesignError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Errors around capture designs: loading them from files, generating them
/// from templates, and resolving their variable parameters.
#[derive(Error, Debug)]
pub enum DesignError {
    /// A string field in a design file did not match the `<factor>*AUTO` form.
    #[error("bad parameter form for '{field}': {value:?}")]
    Parse { field: String, value: String },

    #[error("design file is not valid JSON: {0}")]
    MalformedFile(#[from] serde_json::Error),

    #[error("design file root must be an array of exposure objects")]
    NotAnArray,

    /// The auto-convergence result lacks a field a variable parameter needs.
    /// The device does not support that control; the caller decides fallback.
    #[error("auto result carries no value for {parameter}")]
    MissingAutoValue { parameter: &'static str },

    /// A parameter that must already be literal still holds a variable value.
    /// This is a contract violation in the capture flow, not a user error.
    #[error("{parameter} is still variable, expected a literal value")]
    UnresolvedParameter { parameter: &'static str },

    /// Bracket generators interpolate across n-1 steps and need n >= 2.
    #[error("bracket generators need at least 2 exposures, got {requested}")]
    InvalidExposureCount { requested: usize },
}

/// Device and session failures, one variant per error kind so callers can
/// phrase recovery without string matching.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open camera device: {details}")]
    DeviceOpen { details: String },

    #[error("camera does not support manual sensor control")]
    InadequateCamera,

    #[error("capture session configuration failed: {details}")]
    SessionConfiguration { details: String },

    #[error("capture failed: {details}")]
    CaptureFailed { details: String },

    #[error("camera device disconnected")]
    Disconnected,

    #[error("device is not ready for capture")]
    NotReady,

    #[error("a capture is already in progress")]
    CaptureInProgress,

    #[error("capture design contains no exposures")]
    EmptyDesign,

    #[error("no output surface registered for capture")]
    NoOutputSurface,

    #[error("timed out waiting for exclusive device access")]
    OpenTimeout,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize capture metadata: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DevcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DevcamError>;
