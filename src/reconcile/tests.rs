use super::*;
use crate::device::PixelFormat;
use tokio::sync::mpsc;

fn metadata(ts: i64) -> FrameMetadata {
    FrameMetadata::new(FrameTimestamp(ts))
}

fn frame(ts: i64) -> RawFrame {
    RawFrame {
        timestamp: FrameTimestamp(ts),
        format: PixelFormat::Jpeg,
        width: 4,
        height: 4,
        pixel_stride: 1,
        row_stride: 4,
        data: vec![0u8; 16],
    }
}

fn ledger(n: usize) -> (RunLedger, oneshot::Receiver<RunSummary>, mpsc::UnboundedReceiver<SaveJob>) {
    let (save_tx, save_rx) = mpsc::unbounded_channel();
    let (ledger, finished_rx) = RunLedger::new("test".to_string(), n, save_tx);
    for ts in 0..n as i64 {
        ledger.record_capture_started(FrameTimestamp(ts));
    }
    (ledger, finished_rx, save_rx)
}

fn drain_jobs(rx: &mut mpsc::UnboundedReceiver<SaveJob>) -> Vec<SaveJob> {
    let mut jobs = Vec::new();
    while let Ok(job) = rx.try_recv() {
        jobs.push(job);
    }
    jobs
}

fn assert_fully_matched(
    ledger: &RunLedger,
    rx: &mut mpsc::UnboundedReceiver<SaveJob>,
    n: usize,
) {
    let jobs = drain_jobs(rx);
    assert_eq!(jobs.len(), n, "every frame dispatched exactly once");
    for job in &jobs {
        assert_eq!(
            job.frame.timestamp, job.metadata.timestamp,
            "matched pair shares a timestamp"
        );
    }
    let mut names: Vec<_> = jobs.iter().map(|j| j.filename.clone()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), n, "no filename assigned twice");
    assert_eq!(ledger.pending(), (0, 0), "no leftovers in either pool");
}

#[test]
fn all_metadata_before_all_buffers() {
    let n = 4;
    let (ledger, mut finished_rx, mut save_rx) = ledger(n);

    for ts in 0..n as i64 {
        ledger.record_metadata(metadata(ts));
    }
    assert!(finished_rx.try_recv().is_err(), "not complete yet");
    for ts in 0..n as i64 {
        ledger.record_frame(frame(ts));
    }

    assert_fully_matched(&ledger, &mut save_rx, n);
    let summary = finished_rx.try_recv().unwrap();
    assert_eq!(summary.saved.len(), n);
    assert_eq!(summary.failed, 0);
}

#[test]
fn all_buffers_before_all_metadata() {
    let n = 4;
    let (ledger, mut finished_rx, mut save_rx) = ledger(n);

    for ts in 0..n as i64 {
        ledger.record_frame(frame(ts));
    }
    assert!(finished_rx.try_recv().is_err());
    for ts in 0..n as i64 {
        ledger.record_metadata(metadata(ts));
    }

    assert_fully_matched(&ledger, &mut save_rx, n);
    assert!(finished_rx.try_recv().is_ok());
}

#[test]
fn shuffled_interleaving_matches_everything() {
    let n = 5;
    let (ledger, mut finished_rx, mut save_rx) = ledger(n);

    // A fixed awkward interleaving: buffers arrive in reverse order,
    // threaded between in-order metadata results.
    ledger.record_frame(frame(4));
    ledger.record_metadata(metadata(0));
    ledger.record_frame(frame(3));
    ledger.record_metadata(metadata(1));
    ledger.record_metadata(metadata(2));
    ledger.record_frame(frame(0));
    ledger.record_frame(frame(1));
    ledger.record_metadata(metadata(3));
    ledger.record_frame(frame(2));
    ledger.record_metadata(metadata(4));

    assert_fully_matched(&ledger, &mut save_rx, n);
    assert!(finished_rx.try_recv().is_ok());
}

#[test]
fn completion_fires_exactly_once_at_the_final_match() {
    let n = 2;
    let (ledger, mut finished_rx, mut save_rx) = ledger(n);

    ledger.record_metadata(metadata(0));
    ledger.record_frame(frame(0));
    assert!(
        finished_rx.try_recv().is_err(),
        "completion must not fire before the count is reached"
    );

    ledger.record_metadata(metadata(1));
    ledger.record_frame(frame(1));
    let summary = finished_rx.try_recv().unwrap();
    assert_eq!(summary.expected, 2);

    // Stray arrivals after completion are discarded, not re-signalled.
    ledger.record_frame(frame(99));
    assert_eq!(ledger.pending(), (0, 0));
    drain_jobs(&mut save_rx);
}

#[test]
fn buffers_outside_the_run_are_discarded() {
    let (ledger, _finished_rx, mut save_rx) = ledger(2);

    // Timestamp 77 was never recorded as part of this run's burst.
    ledger.record_frame(frame(77));
    assert_eq!(ledger.pending(), (0, 0), "stray buffer never enters the pool");

    ledger.record_metadata(metadata(0));
    ledger.record_frame(frame(0));
    let jobs = drain_jobs(&mut save_rx);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].frame.timestamp, FrameTimestamp(0));
}

#[test]
fn failed_frames_count_toward_completion() {
    let n = 3;
    let (ledger, mut finished_rx, mut save_rx) = ledger(n);

    ledger.record_metadata(metadata(0));
    ledger.record_frame(frame(0));
    ledger.record_failure("scripted failure");
    assert!(finished_rx.try_recv().is_err());

    ledger.record_frame(frame(1));
    ledger.record_metadata(metadata(1));

    let summary = finished_rx.try_recv().unwrap();
    assert_eq!(summary.saved.len(), 2);
    assert_eq!(summary.failed, 1);
    assert_fully_matched(&ledger, &mut save_rx, 2);
}

#[test]
fn filenames_are_sequential_in_match_order() {
    let n = 3;
    let (ledger, _finished_rx, mut save_rx) = ledger(n);

    // Frame 2 completes first, so it gets the first filename.
    ledger.record_metadata(metadata(2));
    ledger.record_frame(frame(2));
    ledger.record_metadata(metadata(0));
    ledger.record_frame(frame(0));
    ledger.record_metadata(metadata(1));
    ledger.record_frame(frame(1));

    let jobs = drain_jobs(&mut save_rx);
    let names: Vec<_> = jobs.iter().map(|j| j.filename.as_str()).collect();
    assert_eq!(names, vec!["test-1.jpg", "test-2.jpg", "test-3.jpg"]);
    assert_eq!(jobs[0].frame.timestamp, FrameTimestamp(2));
}
