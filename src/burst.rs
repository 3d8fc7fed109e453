//! Burst issuing.
//!
//! Translates a fully-resolved capture design into device capture
//! commands, one per exposure in design order, all under manual control
//! with the processing profile fixed for the whole design.

use tracing::debug;

use crate::design::{CaptureDesign, ProcessingChoice};
use crate::device::{
    CameraCapabilities, CaptureRequest, CaptureSession, ProcessingProfile, Surface,
};
use crate::error::Result;

/// Map the design's processing choice onto device post-processing settings.
pub fn processing_profile(choice: ProcessingChoice) -> ProcessingProfile {
    match choice {
        ProcessingChoice::None => ProcessingProfile::off(),
        ProcessingChoice::Fast => ProcessingProfile::fast(),
        ProcessingChoice::HighQuality => ProcessingProfile::high_quality(),
    }
}

/// Build the burst command list for a design. Every exposure must already
/// be fully literal; a variable slot here is a contract violation in the
/// capture flow and fails rather than capturing a frame nobody asked for.
pub fn build_burst(
    design: &CaptureDesign,
    caps: &CameraCapabilities,
    targets: &[Surface],
) -> Result<Vec<CaptureRequest>> {
    let profile = caps
        .has_post_processing_control
        .then(|| processing_profile(design.processing()));

    let mut requests = Vec::with_capacity(design.len());
    for exposure in design.exposures() {
        let values = exposure.resolved()?;
        let mut request = CaptureRequest::manual(values, targets.to_vec());
        request.processing = profile.clone();
        requests.push(request);
    }
    Ok(requests)
}

/// Build and submit the burst as one atomic call.
pub async fn capture_burst(
    session: &dyn CaptureSession,
    design: &CaptureDesign,
    caps: &CameraCapabilities,
    targets: &[Surface],
) -> Result<usize> {
    let requests = build_burst(design, caps, targets)?;
    let count = requests.len();
    debug!(
        design = design.name(),
        frames = count,
        "submitting exposure sequence as a burst"
    );
    session.submit_burst(requests).await?;
    Ok(count)
}
