//! Auto-focus / auto-exposure convergence.
//!
//! Before a design with variable parameters can be captured, the device's
//! auto routines must converge so their result can be substituted in. The
//! search runs focus first, then exposure, as a chain of single-shot probe
//! captures: each probe's metadata is inspected and decides the triggers of
//! the next probe. Using single-shots instead of a repeating request keeps
//! errant frames from drifting through the device and perturbing state.
//!
//! The decision logic is a pure transition function over an explicit phase
//! value, so it can be tested by feeding synthetic metadata sequences.

use tracing::debug;

use crate::device::{
    AePrecaptureTrigger, AeState, AfMode, AfState, AfTrigger, CaptureRequest, CaptureSession,
    FrameMetadata, Surface,
};
use crate::error::Result;

#[cfg(test)]
mod tests;

/// Which convergence the machine is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForFocus,
    WaitingForExposure,
    Done,
}

/// What to do after inspecting a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Submit another probe with these triggers.
    Resubmit {
        af_trigger: AfTrigger,
        ae_precapture_trigger: AePrecaptureTrigger,
    },
    /// The probe that produced this result is the auto-convergence result.
    Finish,
}

/// Starting phase for a design's needs, or `None` when the machine is
/// bypassed entirely and the burst can go out immediately.
pub fn initial_phase(needs_af: bool, needs_ae: bool) -> Option<Phase> {
    match (needs_af, needs_ae) {
        (true, _) => Some(Phase::WaitingForFocus),
        (false, true) => Some(Phase::WaitingForExposure),
        (false, false) => None,
    }
}

/// One step of the convergence machine: inspect the latest probe result and
/// decide the next phase and action.
pub fn advance(phase: Phase, needs_ae: bool, metadata: &FrameMetadata) -> (Phase, StepAction) {
    match phase {
        Phase::WaitingForFocus => match metadata.af_state {
            Some(AfState::FocusedLocked) => {
                if needs_ae {
                    // Focus is settled; the same result may already show a
                    // converged exposure, so check it immediately.
                    advance(Phase::WaitingForExposure, needs_ae, metadata)
                } else {
                    (Phase::Done, StepAction::Finish)
                }
            }
            // Search ended without focus; cancel and let it start over.
            Some(AfState::NotFocusedLocked) => (
                Phase::WaitingForFocus,
                StepAction::Resubmit {
                    af_trigger: AfTrigger::Cancel,
                    ae_precapture_trigger: AePrecaptureTrigger::Idle,
                },
            ),
            // Passively focused; trigger a lock and wait for proof of it.
            Some(AfState::PassiveFocused) => (
                Phase::WaitingForFocus,
                StepAction::Resubmit {
                    af_trigger: AfTrigger::Start,
                    ae_precapture_trigger: AePrecaptureTrigger::Idle,
                },
            ),
            // Inactive, scanning or passively unfocused: keep probing
            // without triggers so the search neither restarts nor locks
            // prematurely.
            _ => (
                Phase::WaitingForFocus,
                StepAction::Resubmit {
                    af_trigger: AfTrigger::Idle,
                    ae_precapture_trigger: AePrecaptureTrigger::Idle,
                },
            ),
        },
        Phase::WaitingForExposure => match metadata.ae_state {
            Some(AeState::Converged) | Some(AeState::FlashRequired) => {
                (Phase::Done, StepAction::Finish)
            }
            _ => (
                Phase::WaitingForExposure,
                StepAction::Resubmit {
                    af_trigger: AfTrigger::Idle,
                    ae_precapture_trigger: AePrecaptureTrigger::Idle,
                },
            ),
        },
        Phase::Done => (Phase::Done, StepAction::Finish),
    }
}

/// Build the first probe request. AF runs in continuous-picture mode and is
/// left to self-start its scan; AE gets an explicit precapture trigger.
pub fn initial_request(needs_af: bool, needs_ae: bool, targets: Vec<Surface>) -> CaptureRequest {
    let mut request = CaptureRequest::automatic(targets);
    if !needs_af {
        request.af_mode = AfMode::Off;
    }
    if needs_ae {
        request.ae_precapture_trigger = AePrecaptureTrigger::Start;
    } else {
        request.ae_mode = crate::device::AeMode::Off;
    }
    request
}

/// Drive the convergence machine over a live session until it finishes,
/// returning the auto-convergence result.
///
/// There is no bail-out for a focus search that never converges; the loop
/// keeps probing until the device reports a locked state.
pub async fn run_convergence(
    session: &dyn CaptureSession,
    needs_af: bool,
    needs_ae: bool,
    targets: Vec<Surface>,
) -> Result<FrameMetadata> {
    let mut phase = match initial_phase(needs_af, needs_ae) {
        Some(phase) => phase,
        None => unreachable!("convergence invoked with nothing to converge"),
    };
    let mut request = initial_request(needs_af, needs_ae, targets);
    let mut probes = 0u32;

    loop {
        let metadata = session.submit(request.clone()).await?;
        probes += 1;

        let (next_phase, action) = advance(phase, needs_ae, &metadata);
        debug!(
            probe = probes,
            af_state = ?metadata.af_state,
            ae_state = ?metadata.ae_state,
            ?next_phase,
            "convergence probe completed"
        );
        phase = next_phase;

        match action {
            StepAction::Finish => {
                debug!(probes, "auto convergence finished");
                return Ok(metadata);
            }
            StepAction::Resubmit {
                af_trigger,
                ae_precapture_trigger,
            } => {
                request.af_trigger = af_trigger;
                request.ae_precapture_trigger = ae_precapture_trigger;
            }
        }
    }
}
