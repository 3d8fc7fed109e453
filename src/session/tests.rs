use super::*;
use crate::device::{FrameMetadata, MockBackend, MockScript};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, Notify};

const OPEN_TIMEOUT: Duration = Duration::from_millis(500);

fn controller_with(backend: MockBackend) -> SessionController {
    SessionController::new(Arc::new(backend), "0".to_string(), OPEN_TIMEOUT)
}

#[tokio::test]
async fn start_builds_session_once_surfaces_are_registered() {
    let backend = MockBackend::new(MockScript::default());
    let controller = controller_with(backend.clone());

    controller
        .register_preview_surfaces(vec![Surface::preview(0)])
        .await
        .unwrap();
    controller
        .register_output_surfaces(vec![Surface::output(1)])
        .await
        .unwrap();
    assert_eq!(controller.state().await, SessionState::Closed);

    controller.start().await.unwrap();
    assert_eq!(controller.state().await, SessionState::SessionReady);
    assert!(controller.session().await.is_ok());
    assert!(controller.take_streams().await.is_some());
    assert!(controller.take_streams().await.is_none(), "streams taken once");

    // A repeating preview request is running.
    let repeating = backend.repeating_request().expect("preview repeating");
    assert!(repeating.manual.is_none());
}

#[tokio::test]
async fn start_without_preview_surface_defers_session_creation() {
    let backend = MockBackend::new(MockScript::default());
    let controller = controller_with(backend);

    controller.start().await.unwrap();
    assert_eq!(controller.state().await, SessionState::Open);
    assert!(matches!(
        controller.session().await,
        Err(DevcamError::Device(DeviceError::NotReady))
    ));

    // Registering the surface now triggers the deferred build.
    controller
        .register_preview_surfaces(vec![Surface::preview(0)])
        .await
        .unwrap();
    assert_eq!(controller.state().await, SessionState::SessionReady);
}

#[tokio::test]
async fn open_failure_returns_to_closed() {
    let controller = controller_with(MockBackend::failing());
    let err = controller.start().await.unwrap_err();
    assert!(matches!(
        err,
        DevcamError::Device(DeviceError::DeviceOpen { .. })
    ));
    assert_eq!(controller.state().await, SessionState::Closed);
}

#[tokio::test]
async fn cameras_without_manual_sensor_are_rejected() {
    let mut caps = MockBackend::default_capabilities();
    caps.has_manual_sensor = false;
    let backend = MockBackend::with_capabilities(MockScript::default(), caps);
    let controller = controller_with(backend);

    let err = controller.start().await.unwrap_err();
    assert!(matches!(
        err,
        DevcamError::Device(DeviceError::InadequateCamera)
    ));
}

#[tokio::test]
async fn stop_releases_everything() {
    let backend = MockBackend::new(MockScript::default());
    let controller = controller_with(backend);

    controller
        .register_preview_surfaces(vec![Surface::preview(0)])
        .await
        .unwrap();
    controller.start().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(controller.state().await, SessionState::Closed);
    assert!(controller.preview_surfaces().await.is_empty());
    assert!(controller.session().await.is_err());
}

#[tokio::test]
async fn restore_preview_clears_stale_focus_trigger() {
    let backend = MockBackend::new(MockScript::default());
    let controller = controller_with(backend.clone());

    controller
        .register_preview_surfaces(vec![Surface::preview(0)])
        .await
        .unwrap();
    controller.start().await.unwrap();

    controller.restore_preview().await.unwrap();

    let submitted = backend.submitted_requests();
    let clearing = submitted.last().expect("clearing single-shot submitted");
    assert_eq!(clearing.af_trigger, AfTrigger::Cancel);
    assert!(!clearing.ae_lock);
    assert!(backend.repeating_request().is_some(), "preview resumed");
}

// Test double whose session creation blocks until released, to exercise the
// surfaces-changed-while-pending coalescing path.
struct GatedDevice {
    gate: Arc<Notify>,
    calls: Arc<AtomicUsize>,
}

struct NullSession;

#[async_trait]
impl CaptureSession for NullSession {
    async fn submit(&self, request: CaptureRequest) -> Result<FrameMetadata> {
        let _ = request;
        Ok(FrameMetadata::new(crate::device::FrameTimestamp(0)))
    }
    async fn submit_burst(&self, _requests: Vec<CaptureRequest>) -> Result<()> {
        Ok(())
    }
    async fn set_repeating(&self, _request: CaptureRequest) -> Result<()> {
        Ok(())
    }
    async fn stop_repeating(&self) -> Result<()> {
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CameraDevice for GatedDevice {
    fn capabilities(&self) -> CameraCapabilities {
        MockBackend::default_capabilities()
    }

    async fn create_session(
        &self,
        _surfaces: Vec<Surface>,
    ) -> Result<(Arc<dyn CaptureSession>, SessionStreams)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        let (_events_tx, events) = mpsc::unbounded_channel();
        let (_frames_tx, frames) = mpsc::unbounded_channel();
        Ok((Arc::new(NullSession), SessionStreams { events, frames }))
    }
}

struct GatedBackend {
    gate: Arc<Notify>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CameraBackend for GatedBackend {
    async fn open(&self, _camera_id: &str) -> Result<Arc<dyn CameraDevice>> {
        Ok(Arc::new(GatedDevice {
            gate: self.gate.clone(),
            calls: self.calls.clone(),
        }))
    }
}

#[tokio::test]
async fn surface_change_during_pending_session_is_coalesced() {
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let controller = Arc::new(SessionController::new(
        Arc::new(GatedBackend {
            gate: gate.clone(),
            calls: calls.clone(),
        }),
        "0".to_string(),
        OPEN_TIMEOUT,
    ));

    controller
        .register_preview_surfaces(vec![Surface::preview(0)])
        .await
        .unwrap();

    let starter = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start().await })
    };

    // Wait until the first session request is in flight.
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.state().await, SessionState::SessionPending);

    // Changing surfaces now must not race a second create_session call.
    controller
        .register_output_surfaces(vec![Surface::output(1)])
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Release the pending request; the stale session is discarded and
    // exactly one re-request goes out.
    gate.notify_one();
    while calls.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }
    gate.notify_one();

    starter.await.unwrap().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(controller.state().await, SessionState::SessionReady);
}
