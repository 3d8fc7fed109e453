//! Device and session lifecycle.
//!
//! The [`SessionController`] is the only component that opens or closes the
//! camera device and (re)builds its capture session. Open and close run
//! under a bounded-wait lock so overlapping calls cannot double-open or
//! double-close the device. Whenever the registered surface set changes the
//! session is rebuilt; a change arriving while a session request is already
//! outstanding is coalesced into a single re-request once the pending one
//! resolves, so two session creations never race against the device.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::device::{
    AfTrigger, CameraBackend, CameraCapabilities, CameraDevice, CaptureRequest, CaptureSession,
    SessionStreams, Surface, SurfaceRole,
};
use crate::error::{DeviceError, DevcamError, Result};

#[cfg(test)]
mod tests;

/// Lifecycle of the device and its capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    SessionPending,
    SessionReady,
}

struct ControllerInner {
    state: SessionState,
    device: Option<Arc<dyn CameraDevice>>,
    session: Option<Arc<dyn CaptureSession>>,
    /// Streams of the most recently configured session, waiting for the
    /// engine to take them.
    streams: Option<SessionStreams>,
    preview_surfaces: Vec<Surface>,
    output_surfaces: Vec<Surface>,
    /// Surfaces changed while a session request was in flight; rebuild once
    /// it resolves.
    outstanding_session_request: bool,
}

pub struct SessionController {
    backend: Arc<dyn CameraBackend>,
    camera_id: String,
    open_timeout: Duration,
    /// Guards open/close against concurrent callers.
    open_lock: Mutex<()>,
    inner: Mutex<ControllerInner>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn CameraBackend>, camera_id: String, open_timeout: Duration) -> Self {
        Self {
            backend,
            camera_id,
            open_timeout,
            open_lock: Mutex::new(()),
            inner: Mutex::new(ControllerInner {
                state: SessionState::Closed,
                device: None,
                session: None,
                streams: None,
                preview_surfaces: Vec::new(),
                output_surfaces: Vec::new(),
                outstanding_session_request: false,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Open the device. A no-op when it is already open. Refuses cameras
    /// without manual sensor control, since devcam cannot do its job on
    /// them.
    pub async fn start(&self) -> Result<()> {
        let _guard = timeout(self.open_timeout, self.open_lock.lock())
            .await
            .map_err(|_| DevcamError::from(DeviceError::OpenTimeout))?;

        {
            let mut inner = self.inner.lock().await;
            if inner.device.is_some() {
                debug!("Camera already acquired, ignoring start");
                return Ok(());
            }
            inner.state = SessionState::Opening;
        }

        let device = match self.backend.open(&self.camera_id).await {
            Ok(device) => device,
            Err(e) => {
                self.inner.lock().await.state = SessionState::Closed;
                return Err(e);
            }
        };

        if !device.capabilities().has_manual_sensor {
            self.inner.lock().await.state = SessionState::Closed;
            return Err(DeviceError::InadequateCamera.into());
        }

        info!("Camera {} opened", self.camera_id);
        {
            let mut inner = self.inner.lock().await;
            inner.device = Some(device);
            inner.state = SessionState::Open;
        }

        self.update_capture_session().await
    }

    /// Close the session and release the device. Surfaces are dropped too;
    /// re-register them before the next start.
    pub async fn stop(&self) -> Result<()> {
        let _guard = timeout(self.open_timeout, self.open_lock.lock())
            .await
            .map_err(|_| DevcamError::from(DeviceError::OpenTimeout))?;

        let session = {
            let mut inner = self.inner.lock().await;
            inner.device = None;
            inner.streams = None;
            inner.preview_surfaces.clear();
            inner.output_surfaces.clear();
            inner.outstanding_session_request = false;
            inner.state = SessionState::Closed;
            inner.session.take()
        };

        if let Some(session) = session {
            session.close().await?;
        }
        info!("Camera released");
        Ok(())
    }

    pub async fn register_preview_surfaces(&self, surfaces: Vec<Surface>) -> Result<()> {
        debug_assert!(surfaces.iter().all(|s| s.role == SurfaceRole::Preview));
        let rebuild = {
            let mut inner = self.inner.lock().await;
            inner.preview_surfaces = surfaces;
            self.note_surface_change(&mut inner)
        };
        if rebuild {
            self.update_capture_session().await?;
        }
        Ok(())
    }

    pub async fn register_output_surfaces(&self, surfaces: Vec<Surface>) -> Result<()> {
        debug_assert!(surfaces.iter().all(|s| s.role == SurfaceRole::Output));
        let rebuild = {
            let mut inner = self.inner.lock().await;
            inner.output_surfaces = surfaces;
            self.note_surface_change(&mut inner)
        };
        if rebuild {
            self.update_capture_session().await?;
        }
        Ok(())
    }

    /// Decide how a surface change propagates: rebuild now, or flag it for
    /// the in-flight session request to pick up.
    fn note_surface_change(&self, inner: &mut ControllerInner) -> bool {
        match inner.state {
            SessionState::SessionPending => {
                debug!("Session request outstanding, coalescing surface update");
                inner.outstanding_session_request = true;
                false
            }
            _ => inner.device.is_some(),
        }
    }

    /// (Re)build the capture session over the current surface set.
    async fn update_capture_session(&self) -> Result<()> {
        loop {
            let (device, surfaces) = {
                let mut inner = self.inner.lock().await;
                let device = match &inner.device {
                    Some(device) => device.clone(),
                    None => {
                        debug!("No device yet, session creation deferred");
                        return Ok(());
                    }
                };
                if inner.preview_surfaces.is_empty() {
                    debug!("No preview surface registered, session creation deferred");
                    return Ok(());
                }
                let mut surfaces = inner.preview_surfaces.clone();
                surfaces.extend(inner.output_surfaces.iter().copied());
                inner.state = SessionState::SessionPending;
                (device, surfaces)
            };

            debug!("Requesting capture session over {} surfaces", surfaces.len());
            let result = device.create_session(surfaces).await;

            let mut inner = self.inner.lock().await;
            if inner.outstanding_session_request {
                // Surfaces changed while this request was in flight; the
                // session just built is already stale. Rebuild once.
                warn!("Surfaces changed during session creation, re-requesting");
                inner.outstanding_session_request = false;
                drop(inner);
                continue;
            }

            return match result {
                Ok((session, streams)) => {
                    inner.session = Some(session.clone());
                    inner.streams = Some(streams);
                    inner.state = SessionState::SessionReady;
                    drop(inner);
                    self.start_preview(&session).await
                }
                Err(e) => {
                    inner.state = SessionState::Open;
                    Err(DeviceError::SessionConfiguration {
                        details: e.to_string(),
                    }
                    .into())
                }
            };
        }
    }

    /// The configured session, once ready.
    pub async fn session(&self) -> Result<Arc<dyn CaptureSession>> {
        let inner = self.inner.lock().await;
        match (&inner.session, inner.state) {
            (Some(session), SessionState::SessionReady) => Ok(session.clone()),
            _ => Err(DeviceError::NotReady.into()),
        }
    }

    /// Take the completion streams of the current session. Returns `None`
    /// if they were already taken and no new session was built since.
    pub async fn take_streams(&self) -> Option<SessionStreams> {
        self.inner.lock().await.streams.take()
    }

    pub async fn capabilities(&self) -> Result<CameraCapabilities> {
        let inner = self.inner.lock().await;
        inner
            .device
            .as_ref()
            .map(|device| device.capabilities())
            .ok_or_else(|| DeviceError::NotReady.into())
    }

    pub async fn preview_surfaces(&self) -> Vec<Surface> {
        self.inner.lock().await.preview_surfaces.clone()
    }

    pub async fn output_surfaces(&self) -> Vec<Surface> {
        self.inner.lock().await.output_surfaces.clone()
    }

    fn preview_request(surfaces: Vec<Surface>) -> CaptureRequest {
        CaptureRequest::automatic(surfaces)
    }

    /// Start the repeating preview request.
    async fn start_preview(&self, session: &Arc<dyn CaptureSession>) -> Result<()> {
        let surfaces = self.preview_surfaces().await;
        session
            .set_repeating(Self::preview_request(surfaces))
            .await
    }

    /// Restore the steady-state preview after a capture sequence. The
    /// sequence may have left an AF trigger or AE lock behind, so one
    /// clearing single-shot goes out before the repeating request resumes.
    pub async fn restore_preview(&self) -> Result<()> {
        let session = self.session().await?;
        let surfaces = self.preview_surfaces().await;

        session.stop_repeating().await?;

        let mut clearing = Self::preview_request(surfaces.clone());
        clearing.af_trigger = AfTrigger::Cancel;
        clearing.ae_lock = false;
        session.submit(clearing).await?;

        session
            .set_repeating(Self::preview_request(surfaces))
            .await?;
        debug!("Preview restored");
        Ok(())
    }
}
