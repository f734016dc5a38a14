//! Bounded end-to-end demo over the synthetic scene.
//!
//! Runs the full pipeline (synthetic frames, luma-blob detection, capture,
//! blur gating, persistence) for a fixed number of frames and prints what
//! happened.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use facegate::{
    BlurGate, CameraSource, CaptureLogStore, CaptureSession, FaceBackendRegistry, FilenamePolicy,
    FilesystemSink, FrameCache, InMemoryCaptureLog, LaplacianBackend, LatestFrameSlot,
    LumaBlobBackend, Phase, PhotoFormat, SessionConfig, SourceConfig, ViewCapture,
};

#[derive(Parser, Debug)]
#[command(name = "demo", about = "Run the facegate pipeline over a synthetic scene")]
struct Args {
    /// Number of frames to ingest.
    #[arg(long, default_value_t = 40)]
    frames: u64,

    /// Directory for accepted photos.
    #[arg(long, default_value = "demo_photos")]
    output: PathBuf,

    /// Save the raw frame without the detection overlay burned in.
    #[arg(long)]
    no_composite: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut source = CameraSource::new(SourceConfig {
        width: 320,
        height: 240,
        ..SourceConfig::default()
    })?;
    source.connect()?;

    let mut registry = FaceBackendRegistry::new();
    registry.register(LumaBlobBackend::default());

    let slot = Arc::new(LatestFrameSlot::new());
    let mut journal = Arc::new(InMemoryCaptureLog::new());
    let cache = Arc::new(FrameCache::new(FrameCache::recommended_capacity(
        128 * 1024 * 1024,
    )));

    let session = CaptureSession::new(
        cache,
        BlurGate::new(Box::new(LaplacianBackend::default())),
        Box::new(ViewCapture::new(slot.clone(), !args.no_composite)),
        Box::new(FilesystemSink::open(&args.output)?),
        Box::new(journal.clone()),
        SessionConfig {
            filename: FilenamePolicy::new("demo", PhotoFormat::Png)?,
            ..SessionConfig::default()
        },
    )?;
    session.start()?;

    for _ in 0..args.frames {
        let frame = source.next_frame()?;
        slot.publish(frame);
        let Some(frame) = slot.snapshot() else {
            continue;
        };
        let detections = registry.detect(frame.image())?;
        if let Err(e) = session.on_frame(&detections.faces) {
            log::warn!("capture attempt failed: {}", e);
        }
        if session.status().phase == Phase::Accepted {
            break;
        }
    }

    let status = session.status();
    println!(
        "final phase: {:?} after {} retries",
        status.phase, status.attempt_count
    );
    for record in journal.recent(10)? {
        match &record.photo_path {
            Some(path) => println!("  {:?} -> {}", record.outcome, path),
            None => println!(
                "  {:?} ({})",
                record.outcome,
                record.detail.as_deref().unwrap_or("-")
            ),
        }
    }
    if status.phase != Phase::Accepted {
        session.cancel();
    }
    Ok(())
}
