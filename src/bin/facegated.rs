//! facegated - face-gated capture daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured source (synthetic or local stills)
//! 2. Publishes them into a keep-only-latest slot
//! 3. Runs face detection on the analysis cadence
//! 4. Maps detection boxes into view space for the overlay path
//! 5. Drives a capture session: capture on detection, gate on blur, persist
//!    accepted photos, retry soft frames
//! 6. Journals every outcome and enforces journal retention

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use facegate::config::FacegateConfig;
use facegate::{
    map_to_view, BlurGate, CameraSource, CaptureLogStore, CaptureSession, FaceBackendRegistry,
    FilenamePolicy, FilesystemSink, FrameCache, FrameStride, LaplacianBackend, LatestFrameSlot,
    LumaBlobBackend, Phase, SessionConfig, SourceConfig, SqliteCaptureLog, StubFaceBackend,
    Viewport,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = FacegateConfig::load()?;
    log::info!("facegated {} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "source={} view={}x{} mirror={} detector={}",
        cfg.source.url,
        cfg.view.width,
        cfg.view.height,
        cfg.view.mirror,
        cfg.detector_backend
    );

    // Journal handle for retention enforcement; sessions open their own
    // connections to the same database.
    let mut journal = SqliteCaptureLog::open(&cfg.db_path)?;

    let mut source = CameraSource::new(SourceConfig {
        url: cfg.source.url.clone(),
        target_fps: cfg.source.target_fps,
        width: cfg.source.width,
        height: cfg.source.height,
    })?;
    source.connect()?;

    let mut registry = FaceBackendRegistry::new();
    registry.register(LumaBlobBackend::default());
    registry.register(StubFaceBackend::new());
    registry.set_default(&cfg.detector_backend)?;

    let slot = Arc::new(LatestFrameSlot::new());
    let viewport = Viewport::new(cfg.view.width, cfg.view.height, cfg.view.mirror);
    let mut stride = FrameStride::new(cfg.capture.frame_stride);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let (mut session, mut cache) = new_session(&cfg, &slot)?;
    session.start()?;

    let frame_period = Duration::from_millis(1000 / cfg.source.target_fps.max(1) as u64);
    let mut last_health_log = Instant::now();
    let mut last_prune = Instant::now();
    let mut accepted_count = 0u64;

    log::info!("facegated running. journal at {}", cfg.db_path);

    while running.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("frame ingest failed: {}", e);
                std::thread::sleep(frame_period);
                continue;
            }
        };
        let (frame_w, frame_h) = (frame.width(), frame.height());
        slot.publish(frame);

        if stride.admit() {
            if let Some(frame) = slot.snapshot() {
                match registry.detect(frame.image()) {
                    Ok(result) => {
                        for face in &result.faces {
                            // Overlay path: skip boxes the mapper rejects.
                            match map_to_view(&viewport, frame_w, frame_h, face) {
                                Ok(overlay) => log::debug!(
                                    "overlay box: ({:.0},{:.0})-({:.0},{:.0})",
                                    overlay.left,
                                    overlay.top,
                                    overlay.right,
                                    overlay.bottom
                                ),
                                Err(e) => log::warn!("overlay mapping skipped: {}", e),
                            }
                        }
                        if let Err(e) = session.on_frame(&result.faces) {
                            log::warn!("capture attempt failed: {}", e);
                        }
                    }
                    Err(e) => log::warn!("face detection failed: {}", e),
                }
            }
        }

        match session.status().phase {
            Phase::Accepted => {
                accepted_count += 1;
                log::info!("photo #{} accepted; opening a fresh session", accepted_count);
                let (next, next_cache) = new_session(&cfg, &slot)?;
                session = next;
                cache = next_cache;
                session.start()?;
            }
            Phase::Cancelled => {
                log::warn!("session cancelled; opening a fresh session");
                let (next, next_cache) = new_session(&cfg, &slot)?;
                session = next;
                cache = next_cache;
                session.start()?;
            }
            _ => {}
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            let cache_stats = cache.stats();
            let status = session.status();
            log::info!(
                "health: source_ok={} frames={} dropped={} cache={}B/{}B phase={:?} attempts={} accepted={}",
                source.is_healthy(),
                stats.frames_captured,
                slot.dropped(),
                cache_stats.resident_bytes,
                cache_stats.capacity_bytes,
                status.phase,
                status.attempt_count,
                accepted_count
            );
            last_health_log = Instant::now();
        }

        if last_prune.elapsed() > Duration::from_secs(60) {
            match journal.prune_older_than(cfg.retention) {
                Ok(pruned) if pruned > 0 => log::debug!("journal: pruned {} records", pruned),
                Ok(_) => {}
                Err(e) => log::warn!("journal prune failed: {}", e),
            }
            last_prune = Instant::now();
        }

        std::thread::sleep(frame_period);
    }

    log::info!("shutting down; cancelling session");
    session.cancel();
    Ok(())
}

/// Build a fresh session with its own cache and journal connection.
fn new_session(
    cfg: &FacegateConfig,
    slot: &Arc<LatestFrameSlot>,
) -> Result<(CaptureSession, Arc<FrameCache>)> {
    let cache = Arc::new(FrameCache::new(cfg.cache_capacity_bytes));
    let gate = BlurGate::new(Box::new(LaplacianBackend::default()));
    gate.warm_up()?;
    let capture = facegate::ViewCapture::new(slot.clone(), cfg.capture.composite_overlay);
    let sink = FilesystemSink::open(&cfg.storage.dir)?;
    let journal = SqliteCaptureLog::open(&cfg.db_path)?;
    let session_cfg = SessionConfig {
        max_attempts: cfg.capture.max_attempts,
        filename: FilenamePolicy::new(&cfg.storage.prefix, cfg.storage.format)?,
        ..SessionConfig::default()
    };
    let session = CaptureSession::new(
        cache.clone(),
        gate,
        Box::new(capture),
        Box::new(sink),
        Box::new(journal),
        session_cfg,
    )?;
    Ok((session, cache))
}
