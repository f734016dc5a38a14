//! Capture orchestrator.
//!
//! One session drives the retry loop: wait for a detected face, capture the
//! current view into the pending cache slot, gate the capture on the blur
//! classifier, persist on accept, evict and go around on retry. The session
//! is callback-driven: `on_frame` runs on the frame-analysis worker, blur
//! evaluation runs on whichever thread completed the capture (via the cache's
//! added notification), and a single mutex over the attempt state serializes
//! the state machine.
//!
//! Failure semantics: capture and classifier failures are logged, journaled,
//! and re-enter face-detection wait. Cancellation is idempotent and cleans up
//! synchronously: the slot is evicted and the in-progress flag cleared before
//! `cancel` returns.

use std::sync::{Arc, Mutex, Weak};

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::cache::{CacheObserver, FrameCache};
use crate::capture::CaptureBackend;
use crate::frame::Frame;
use crate::gate::{BlurGate, Decision};
use crate::journal::{CaptureLogStore, CaptureOutcome, CaptureRecord};
use crate::overlay::DetectionBox;
use crate::storage::{FilenamePolicy, PhotoSink};
use crate::{validate_slot_key, CaptureFault, PENDING_SLOT_KEY};

/// Capture session phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingFaceDetection,
    CaptureInFlight,
    AwaitingBlurResult,
    Accepted,
    Cancelled,
}

/// Session tuning knobs.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Cache slot holding the frame pending blur evaluation.
    pub slot_key: String,
    /// Retry budget; exhausting it cancels the session.
    pub max_attempts: u32,
    /// Naming for accepted photos.
    pub filename: FilenamePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot_key: PENDING_SLOT_KEY.to_string(),
            max_attempts: 10,
            filename: FilenamePolicy::default(),
        }
    }
}

/// Snapshot of the session for health logging and tests.
#[derive(Clone, Copy, Debug)]
pub struct SessionStatus {
    pub phase: Phase,
    pub attempt_count: u32,
    pub in_progress: bool,
}

/// Whether a capture attempt is currently active, and how many retries have
/// happened. Guarded by one mutex shared by the frame-analysis callback and
/// the capture-completion path, which is what serializes `CaptureInFlight`.
struct AttemptState {
    phase: Phase,
    in_progress: bool,
    attempt_count: u32,
}

struct SessionInner {
    state: Mutex<AttemptState>,
    cache: Arc<FrameCache>,
    gate: BlurGate,
    capture: Mutex<Box<dyn CaptureBackend>>,
    sink: Mutex<Box<dyn PhotoSink>>,
    journal: Mutex<Box<dyn CaptureLogStore>>,
    cfg: SessionConfig,
}

/// Routes the cache's added notification back into the owning session.
struct GateTrigger {
    session: Weak<SessionInner>,
}

impl CacheObserver for GateTrigger {
    fn on_frame_added(&self, key: &str, frame: &Arc<Frame>) {
        if let Some(inner) = self.session.upgrade() {
            SessionInner::evaluate_slot(&inner, key, frame);
        }
    }
}

pub struct CaptureSession {
    inner: Arc<SessionInner>,
}

impl CaptureSession {
    pub fn new(
        cache: Arc<FrameCache>,
        gate: BlurGate,
        capture: Box<dyn CaptureBackend>,
        sink: Box<dyn PhotoSink>,
        journal: Box<dyn CaptureLogStore>,
        cfg: SessionConfig,
    ) -> Result<Self> {
        validate_slot_key(&cfg.slot_key)?;
        if cfg.max_attempts == 0 {
            return Err(anyhow!("session max_attempts must be >= 1"));
        }

        let inner = Arc::new(SessionInner {
            state: Mutex::new(AttemptState {
                phase: Phase::Idle,
                in_progress: false,
                attempt_count: 0,
            }),
            cache: cache.clone(),
            gate,
            capture: Mutex::new(capture),
            sink: Mutex::new(sink),
            journal: Mutex::new(journal),
            cfg,
        });
        cache.subscribe(Arc::new(GateTrigger {
            session: Arc::downgrade(&inner),
        }));
        Ok(Self { inner })
    }

    /// Begin the capture session.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        if state.phase != Phase::Idle {
            return Err(anyhow!(
                "session already started (phase {:?})",
                state.phase
            ));
        }
        state.phase = Phase::AwaitingFaceDetection;
        log::info!("capture session started");
        Ok(())
    }

    /// Frame-analysis callback: one call per analyzed frame.
    ///
    /// Triggers a capture attempt when at least one face is present and no
    /// attempt is already in flight. Duplicate concurrent detections on rapid
    /// successive frames are suppressed by the in-progress flag.
    pub fn on_frame(&self, faces: &[DetectionBox]) -> Result<()> {
        {
            let mut state = self.inner.lock_state();
            if state.phase != Phase::AwaitingFaceDetection || faces.is_empty() {
                return Ok(());
            }
            if state.in_progress {
                return Ok(());
            }
            state.in_progress = true;
            state.phase = Phase::CaptureInFlight;
        }

        let result = {
            let mut capture = self
                .inner
                .capture
                .lock()
                .map_err(|_| anyhow!("capture backend lock poisoned"))?;
            capture.capture(faces)
        };
        self.inner.on_capture_complete(result)
    }

    /// Cancel the session from any phase. Idempotent; cleans up
    /// synchronously.
    pub fn cancel(&self) {
        let attempt = {
            let mut state = self.inner.lock_state();
            if state.phase == Phase::Cancelled {
                return;
            }
            state.phase = Phase::Cancelled;
            state.in_progress = false;
            self.inner.cache.evict(&self.inner.cfg.slot_key);
            state.attempt_count
        };
        self.inner.journal(
            CaptureOutcome::Cancelled,
            attempt,
            Some("session cancelled"),
            None,
        );
        log::info!("capture session cancelled after {} attempts", attempt);
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.inner.lock_state();
        SessionStatus {
            phase: state.phase,
            attempt_count: state.attempt_count,
            in_progress: state.in_progress,
        }
    }
}

impl SessionInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, AttemptState> {
        self.state.lock().expect("session state lock poisoned")
    }

    /// Capture-completion callback (platform-chosen worker in a real
    /// pipeline; the capturing thread here).
    fn on_capture_complete(&self, result: Result<Frame>) -> Result<()> {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("capture failed: {}", e);
                let attempt = {
                    let mut state = self.lock_state();
                    if state.phase == Phase::Cancelled {
                        return Err(e);
                    }
                    state.phase = Phase::AwaitingFaceDetection;
                    state.in_progress = false;
                    state.attempt_count
                };
                self.journal(
                    CaptureOutcome::CaptureFailed,
                    attempt,
                    Some(&format!("{}", e)),
                    None,
                );
                return Err(e);
            }
        };

        {
            let mut state = self.lock_state();
            if state.phase == Phase::Cancelled {
                state.in_progress = false;
                return Ok(());
            }
            state.phase = Phase::AwaitingBlurResult;
        }

        // The cache fires the added notification synchronously; blur
        // evaluation happens inside this call via GateTrigger.
        let inserted = self.cache.put(&self.cfg.slot_key, frame)?;
        if !inserted {
            // The slot should have been free. Treat like an eviction race:
            // clear it and go back to waiting.
            log::warn!(
                "{}",
                CaptureFault::EvictionRace {
                    key: self.cfg.slot_key.clone()
                }
            );
            self.cache.evict(&self.cfg.slot_key);
            let mut state = self.lock_state();
            if state.phase != Phase::Cancelled {
                state.phase = Phase::AwaitingFaceDetection;
            }
            state.in_progress = false;
        }
        Ok(())
    }

    /// Blur evaluation, driven by the cache's added notification.
    fn evaluate_slot(inner: &Arc<SessionInner>, key: &str, frame: &Arc<Frame>) {
        if key != inner.cfg.slot_key {
            return;
        }
        {
            let state = inner.lock_state();
            if state.phase != Phase::AwaitingBlurResult {
                // Stale notification: a cancel won the race. Make sure the
                // slot is not left holding the orphaned frame.
                if state.phase == Phase::Cancelled {
                    inner.cache.evict(&inner.cfg.slot_key);
                }
                return;
            }
        }

        // Classify without holding the session lock: classification may
        // block, and cancel must stay responsive.
        match inner.gate.evaluate(frame.image()) {
            Ok(Decision::Accept) => inner.accept(frame),
            Ok(Decision::Retry) => inner.retry(),
            Err(e) => {
                log::warn!("blur classification failed: {}", e);
                let attempt = {
                    let mut state = inner.lock_state();
                    if state.phase == Phase::Cancelled {
                        return;
                    }
                    inner.cache.evict(&inner.cfg.slot_key);
                    state.phase = Phase::AwaitingFaceDetection;
                    state.in_progress = false;
                    state.attempt_count
                };
                inner.journal(
                    CaptureOutcome::ClassifierFailed,
                    attempt,
                    Some(&format!("{}", e)),
                    None,
                );
            }
        }
    }

    fn accept(&self, frame: &Arc<Frame>) {
        let attempt = {
            let mut state = self.lock_state();
            if state.phase == Phase::Cancelled {
                return;
            }
            state.phase = Phase::Accepted;
            state.in_progress = false;
            state.attempt_count
        };

        // Consume the slot; the gate has taken ownership of this frame.
        if self.cache.take(&self.cfg.slot_key).is_none() {
            log::warn!(
                "{}",
                CaptureFault::EvictionRace {
                    key: self.cfg.slot_key.clone()
                }
            );
        }

        let stored = self.cfg.filename.next_name().and_then(|filename| {
            let mut sink = self
                .sink
                .lock()
                .map_err(|_| anyhow!("photo sink lock poisoned"))?;
            sink.store(frame.image(), &filename)
        });

        match stored {
            Ok(path) => {
                let digest = Sha256::digest(frame.image().as_raw());
                let content_sha256 = hex::encode(digest);
                log::info!(
                    "photo accepted after {} retries: {} sha256={}",
                    attempt,
                    path.display(),
                    content_sha256
                );
                self.journal(
                    CaptureOutcome::Accepted,
                    attempt,
                    None,
                    Some((path.display().to_string(), content_sha256)),
                );
            }
            Err(e) => {
                // The photo never landed; retrying is the right recovery.
                log::error!("photo store failed: {}", e);
                self.journal(
                    CaptureOutcome::CaptureFailed,
                    attempt,
                    Some(&format!("storage: {}", e)),
                    None,
                );
                let mut state = self.lock_state();
                if state.phase == Phase::Accepted {
                    state.phase = Phase::AwaitingFaceDetection;
                }
            }
        }
    }

    fn retry(&self) {
        let (attempt, exhausted) = {
            let mut state = self.lock_state();
            if state.phase == Phase::Cancelled {
                return;
            }
            // Evict before reopening the loop so the next attempt finds a
            // free slot.
            self.cache.evict(&self.cfg.slot_key);
            state.attempt_count += 1;
            let exhausted = state.attempt_count >= self.cfg.max_attempts;
            state.phase = if exhausted {
                Phase::Cancelled
            } else {
                Phase::AwaitingFaceDetection
            };
            state.in_progress = false;
            (state.attempt_count, exhausted)
        };

        self.journal(CaptureOutcome::Retried, attempt, Some("soft frame"), None);
        if exhausted {
            log::warn!(
                "retry budget exhausted after {} attempts; session cancelled",
                attempt
            );
            self.journal(
                CaptureOutcome::Cancelled,
                attempt,
                Some("retry budget exhausted"),
                None,
            );
        } else {
            log::debug!("soft frame rejected, attempt {} of {}", attempt, self.cfg.max_attempts);
        }
    }

    fn journal(
        &self,
        outcome: CaptureOutcome,
        attempt: u32,
        detail: Option<&str>,
        photo: Option<(String, String)>,
    ) {
        let record = match CaptureRecord::new(outcome, attempt) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("journal record creation failed: {}", e);
                return;
            }
        };
        let record = match detail {
            Some(detail) => record.with_detail(detail),
            None => record,
        };
        let record = match &photo {
            Some((path, sha)) => record.with_photo(path, sha),
            None => record,
        };
        let appended = self
            .journal
            .lock()
            .map_err(|_| anyhow!("journal lock poisoned"))
            .and_then(|mut journal| journal.append(&record));
        if let Err(e) = appended {
            log::warn!("journal append failed: {}", e);
        }
    }
}
