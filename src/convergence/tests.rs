use super::*;
use crate::device::{CameraBackend, FrameTimestamp, MockBackend, MockScript};

fn metadata_with(af: Option<AfState>, ae: Option<AeState>) -> FrameMetadata {
    let mut metadata = FrameMetadata::new(FrameTimestamp(0));
    metadata.af_state = af;
    metadata.ae_state = ae;
    metadata
}

#[test]
fn initial_phase_selection() {
    assert_eq!(initial_phase(true, true), Some(Phase::WaitingForFocus));
    assert_eq!(initial_phase(true, false), Some(Phase::WaitingForFocus));
    assert_eq!(initial_phase(false, true), Some(Phase::WaitingForExposure));
    assert_eq!(initial_phase(false, false), None);
}

#[test]
fn focused_locked_without_ae_finishes() {
    let metadata = metadata_with(Some(AfState::FocusedLocked), None);
    let (phase, action) = advance(Phase::WaitingForFocus, false, &metadata);
    assert_eq!(phase, Phase::Done);
    assert_eq!(action, StepAction::Finish);
}

#[test]
fn focused_locked_with_ae_checks_the_same_result() {
    // AE already converged in the result that locked focus: finish now.
    let metadata = metadata_with(Some(AfState::FocusedLocked), Some(AeState::Converged));
    let (phase, action) = advance(Phase::WaitingForFocus, true, &metadata);
    assert_eq!(phase, Phase::Done);
    assert_eq!(action, StepAction::Finish);

    // AE still searching: move to the exposure phase and keep probing.
    let metadata = metadata_with(Some(AfState::FocusedLocked), Some(AeState::Searching));
    let (phase, action) = advance(Phase::WaitingForFocus, true, &metadata);
    assert_eq!(phase, Phase::WaitingForExposure);
    assert_eq!(
        action,
        StepAction::Resubmit {
            af_trigger: AfTrigger::Idle,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
        }
    );
}

#[test]
fn not_focused_locked_cancels_and_restarts() {
    let metadata = metadata_with(Some(AfState::NotFocusedLocked), None);
    let (phase, action) = advance(Phase::WaitingForFocus, false, &metadata);
    assert_eq!(phase, Phase::WaitingForFocus);
    assert_eq!(
        action,
        StepAction::Resubmit {
            af_trigger: AfTrigger::Cancel,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
        }
    );
}

#[test]
fn passive_focused_triggers_a_lock() {
    let metadata = metadata_with(Some(AfState::PassiveFocused), None);
    let (_, action) = advance(Phase::WaitingForFocus, false, &metadata);
    assert_eq!(
        action,
        StepAction::Resubmit {
            af_trigger: AfTrigger::Start,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
        }
    );
}

#[test]
fn searching_states_continue_untriggered() {
    for af in [
        Some(AfState::Inactive),
        Some(AfState::PassiveScan),
        Some(AfState::PassiveUnfocused),
        None,
    ] {
        let metadata = metadata_with(af, None);
        let (phase, action) = advance(Phase::WaitingForFocus, false, &metadata);
        assert_eq!(phase, Phase::WaitingForFocus);
        assert_eq!(
            action,
            StepAction::Resubmit {
                af_trigger: AfTrigger::Idle,
                ae_precapture_trigger: AePrecaptureTrigger::Idle,
            }
        );
    }
}

#[test]
fn flash_required_counts_as_converged() {
    let metadata = metadata_with(None, Some(AeState::FlashRequired));
    let (phase, action) = advance(Phase::WaitingForExposure, true, &metadata);
    assert_eq!(phase, Phase::Done);
    assert_eq!(action, StepAction::Finish);
}

#[test]
fn unconverged_exposure_keeps_probing() {
    for ae in [
        Some(AeState::Inactive),
        Some(AeState::Searching),
        Some(AeState::Precapture),
        Some(AeState::Locked),
        None,
    ] {
        let metadata = metadata_with(None, ae);
        let (phase, action) = advance(Phase::WaitingForExposure, true, &metadata);
        assert_eq!(phase, Phase::WaitingForExposure);
        assert_eq!(
            action,
            StepAction::Resubmit {
                af_trigger: AfTrigger::Idle,
                ae_precapture_trigger: AePrecaptureTrigger::Idle,
            }
        );
    }
}

async fn session_for(script: MockScript) -> (MockBackend, std::sync::Arc<dyn CaptureSession>) {
    let backend = MockBackend::new(script);
    let device = backend.open("0").await.unwrap();
    let (session, _streams) = device
        .create_session(vec![Surface::preview(0)])
        .await
        .unwrap();
    (backend, session)
}

#[tokio::test]
async fn drives_focus_then_exposure_to_convergence() {
    let (backend, session) = session_for(MockScript::default()).await;

    let auto = run_convergence(session.as_ref(), true, true, vec![Surface::preview(0)])
        .await
        .unwrap();

    assert_eq!(auto.af_state, Some(AfState::FocusedLocked));
    assert_eq!(auto.ae_state, Some(AeState::Converged));
    assert_eq!(auto.exposure_time_ns, Some(20_000_000));

    // Default script: scan, passive-focus, lock; three probes total.
    let submitted = backend.submitted_requests();
    assert_eq!(submitted.len(), 3);
    // First probe starts the AE precapture sequence.
    assert_eq!(
        submitted[0].ae_precapture_trigger,
        AePrecaptureTrigger::Start
    );
    // The passive-focused probe is answered with a lock trigger.
    assert_eq!(submitted[2].af_trigger, AfTrigger::Start);
}

#[tokio::test]
async fn failed_focus_search_is_cancelled_and_retried() {
    let script = MockScript {
        af_states: vec![
            AfState::PassiveScan,
            AfState::NotFocusedLocked,
            AfState::PassiveScan,
            AfState::PassiveFocused,
            AfState::FocusedLocked,
        ],
        ..MockScript::default()
    };
    let (backend, session) = session_for(script).await;

    run_convergence(session.as_ref(), true, false, vec![Surface::preview(0)])
        .await
        .unwrap();

    let triggers: Vec<AfTrigger> = backend
        .submitted_requests()
        .iter()
        .map(|r| r.af_trigger)
        .collect();
    assert_eq!(
        triggers,
        vec![
            AfTrigger::Idle,   // initial probe
            AfTrigger::Idle,   // scan continues
            AfTrigger::Cancel, // search gave up; restart it
            AfTrigger::Idle,   // scanning again
            AfTrigger::Start,  // promote passive focus to a lock
        ]
    );
}

#[tokio::test]
async fn exposure_only_designs_skip_the_focus_phase() {
    let (backend, session) = session_for(MockScript::default()).await;

    let auto = run_convergence(session.as_ref(), false, true, vec![Surface::preview(0)])
        .await
        .unwrap();

    assert_eq!(auto.ae_state, Some(AeState::Converged));
    assert_eq!(auto.af_state, None, "AF never engaged");
    // Searching then converged: two probes.
    assert_eq!(backend.submitted_requests().len(), 2);
}
