use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use crate::classify::backend::{BlurClassifierBackend, BlurScorePair};
use crate::CaptureFault;

enum ScriptedOutcome {
    Scores(BlurScorePair),
    Failure(String),
}

/// Scripted blur classifier for tests.
///
/// Replays queued score pairs (or failures) in order; once the script runs
/// dry it keeps returning the last score pair.
pub struct StubClassifier {
    script: VecDeque<ScriptedOutcome>,
    last: BlurScorePair,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            last: BlurScorePair {
                blur_strength: 0.0,
                non_blur_strength: 1.0,
            },
        }
    }

    pub fn push_scores(&mut self, blur_strength: f32, non_blur_strength: f32) {
        self.script.push_back(ScriptedOutcome::Scores(BlurScorePair {
            blur_strength,
            non_blur_strength,
        }));
    }

    pub fn push_failure(&mut self, detail: &str) {
        self.script
            .push_back(ScriptedOutcome::Failure(detail.to_string()));
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BlurClassifierBackend for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _image: &RgbImage) -> Result<BlurScorePair> {
        match self.script.pop_front() {
            Some(ScriptedOutcome::Scores(pair)) => {
                self.last = pair;
                Ok(pair)
            }
            Some(ScriptedOutcome::Failure(detail)) => {
                Err(CaptureFault::Classification(detail).into())
            }
            None => Ok(self.last),
        }
    }
}
