//! Session-level retry loop behavior, end to end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};

use facegate::{
    BlurGate, CameraSource, CaptureBackend, CaptureOutcome, CaptureSession, DetectionBox,
    FaceBackendRegistry, FilenamePolicy, FilesystemSink, Frame, FrameCache, InMemoryCaptureLog,
    LaplacianBackend, LatestFrameSlot, LumaBlobBackend, MemorySink, Phase, PhotoFormat, Rotation,
    ScriptedCapture, SessionConfig, SourceConfig, StubClassifier, ViewCapture,
};

fn test_frame(seq: u64) -> Frame {
    Frame::new(
        RgbImage::from_pixel(16, 16, Rgb([80, 80, 80])),
        Rotation::Deg0,
        seq,
    )
}

fn face() -> Vec<DetectionBox> {
    vec![DetectionBox::new(2.0, 2.0, 12.0, 12.0)]
}

#[test]
fn three_retries_then_accept_stores_once_and_evicts_thrice() {
    let mut classifier = StubClassifier::new();
    classifier.push_scores(0.3, 0.8);
    classifier.push_scores(0.2, 0.9);
    classifier.push_scores(0.5, 0.5);
    classifier.push_scores(0.8, 0.3);

    let mut capture = ScriptedCapture::new();
    for i in 0..4 {
        capture.push_frame(test_frame(i));
    }

    let cache = Arc::new(FrameCache::new(1 << 20));
    let sink = Arc::new(MemorySink::new());
    let journal = Arc::new(InMemoryCaptureLog::new());
    let session = CaptureSession::new(
        cache.clone(),
        BlurGate::new(Box::new(classifier)),
        Box::new(capture),
        Box::new(sink.clone()),
        Box::new(journal.clone()),
        SessionConfig::default(),
    )
    .unwrap();

    session.start().unwrap();
    for _ in 0..4 {
        session.on_frame(&face()).unwrap();
    }

    let status = session.status();
    assert_eq!(status.phase, Phase::Accepted);
    assert_eq!(status.attempt_count, 3);

    // Exactly one store, exactly three slot evictions; the accept consumed
    // the slot without counting as an eviction.
    assert_eq!(sink.stored_count(), 1);
    assert_eq!(cache.stats().evictions, 3);
    assert_eq!(cache.stats().entries, 0);

    let outcomes: Vec<CaptureOutcome> = journal.all().iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            CaptureOutcome::Retried,
            CaptureOutcome::Retried,
            CaptureOutcome::Retried,
            CaptureOutcome::Accepted,
        ]
    );
}

/// Capture backend that records how many requests overlap.
struct ConcurrencyProbe {
    active: Arc<AtomicU32>,
    max_seen: Arc<AtomicU32>,
}

impl CaptureBackend for ConcurrencyProbe {
    fn capture(&mut self, _faces: &[DetectionBox]) -> anyhow::Result<Frame> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        // Widen the in-flight window so overlapping entries would be seen.
        std::thread::sleep(Duration::from_millis(2));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(test_frame(0))
    }
}

#[test]
fn concurrent_detections_never_overlap_captures() {
    let active = Arc::new(AtomicU32::new(0));
    let max_seen = Arc::new(AtomicU32::new(0));

    // Classifier always retries (empty script defaults to a soft score), so
    // the loop keeps reopening and every thread gets more chances to race.
    let session = Arc::new(
        CaptureSession::new(
            Arc::new(FrameCache::new(1 << 20)),
            BlurGate::new(Box::new(StubClassifier::new())),
            Box::new(ConcurrencyProbe {
                active: active.clone(),
                max_seen: max_seen.clone(),
            }),
            Box::new(MemorySink::new()),
            Box::new(InMemoryCaptureLog::new()),
            SessionConfig {
                max_attempts: 10_000,
                ..SessionConfig::default()
            },
        )
        .unwrap(),
    );
    session.start().unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = session.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..25 {
                let _ = session.on_frame(&face());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        max_seen.load(Ordering::SeqCst),
        1,
        "two capture attempts overlapped"
    );
    // Every capture that ran was accounted for as a retry.
    assert!(session.status().attempt_count >= 1);
}

#[test]
fn capture_failure_then_success_recovers() {
    let mut classifier = StubClassifier::new();
    classifier.push_scores(0.9, 0.1);

    let mut capture = ScriptedCapture::new();
    capture.push_failure("shutter jam");
    capture.push_frame(test_frame(1));

    let sink = Arc::new(MemorySink::new());
    let session = CaptureSession::new(
        Arc::new(FrameCache::new(1 << 20)),
        BlurGate::new(Box::new(classifier)),
        Box::new(capture),
        Box::new(sink.clone()),
        Box::new(InMemoryCaptureLog::new()),
        SessionConfig::default(),
    )
    .unwrap();

    session.start().unwrap();
    assert!(session.on_frame(&face()).is_err());
    assert_eq!(session.status().phase, Phase::AwaitingFaceDetection);

    session.on_frame(&face()).unwrap();
    assert_eq!(session.status().phase, Phase::Accepted);
    assert_eq!(sink.stored_count(), 1);
}

#[test]
fn cancel_during_wait_is_clean_under_concurrency() {
    let session = Arc::new(
        CaptureSession::new(
            Arc::new(FrameCache::new(1 << 20)),
            BlurGate::new(Box::new(StubClassifier::new())),
            Box::new(ScriptedCapture::new()),
            Box::new(MemorySink::new()),
            Box::new(InMemoryCaptureLog::new()),
            SessionConfig::default(),
        )
        .unwrap(),
    );
    session.start().unwrap();

    let canceller = {
        let session = session.clone();
        std::thread::spawn(move || session.cancel())
    };
    let feeder = {
        let session = session.clone();
        std::thread::spawn(move || {
            for _ in 0..50 {
                let _ = session.on_frame(&face());
            }
        })
    };
    canceller.join().unwrap();
    feeder.join().unwrap();

    let status = session.status();
    assert_eq!(status.phase, Phase::Cancelled);
    assert!(!status.in_progress);
}

#[test]
fn synthetic_pipeline_accepts_a_sharp_photo() {
    let dir = tempfile::tempdir().expect("temp dir");

    let mut source = CameraSource::new(SourceConfig {
        width: 320,
        height: 240,
        ..SourceConfig::default()
    })
    .unwrap();
    source.connect().unwrap();

    let mut registry = FaceBackendRegistry::new();
    registry.register(LumaBlobBackend::default());

    let slot = Arc::new(LatestFrameSlot::new());
    let journal = Arc::new(InMemoryCaptureLog::new());
    let session = CaptureSession::new(
        Arc::new(FrameCache::new(1 << 22)),
        BlurGate::new(Box::new(LaplacianBackend::default())),
        Box::new(ViewCapture::new(slot.clone(), true)),
        Box::new(FilesystemSink::open(dir.path()).unwrap()),
        Box::new(journal.clone()),
        SessionConfig {
            filename: FilenamePolicy::new("e2e", PhotoFormat::Png).unwrap(),
            ..SessionConfig::default()
        },
    )
    .unwrap();
    session.start().unwrap();

    for _ in 0..40 {
        let frame = source.next_frame().unwrap();
        slot.publish(frame);
        let Some(frame) = slot.snapshot() else { continue };
        let detections = registry.detect(frame.image()).unwrap();
        session.on_frame(&detections.faces).unwrap();
        if session.status().phase == Phase::Accepted {
            break;
        }
    }

    assert_eq!(session.status().phase, Phase::Accepted);

    let accepted: Vec<_> = journal
        .all()
        .into_iter()
        .filter(|r| r.outcome == CaptureOutcome::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    let path = accepted[0].photo_path.as_deref().expect("photo path");
    assert!(std::path::Path::new(path).exists());
    assert!(path.contains("e2e_"));
    // Soft frames in the synthetic cycle forced at least one retry first.
    assert!(session.status().attempt_count >= 1);
}
