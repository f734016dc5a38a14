//! Accept/retry decision over classifier score pairs.

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::classify::{BlurClassifierBackend, BlurScorePair};

/// Outcome of gating one captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Frame is sharp enough to persist.
    Accept,
    /// Frame is rejected; wait for the next detected frame and recapture.
    Retry,
}

/// Wraps a classifier backend and turns its score pair into a decision.
///
/// The backend sits behind a `Mutex` because `classify` takes `&mut self`
/// and the gate is invoked from callback contexts.
pub struct BlurGate {
    backend: Mutex<Box<dyn BlurClassifierBackend>>,
}

impl BlurGate {
    pub fn new(backend: Box<dyn BlurClassifierBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Decision rule: Accept iff `blur_strength > non_blur_strength`,
    /// strictly. Ties retry; no epsilon is applied.
    pub fn decide(scores: &BlurScorePair) -> Decision {
        if scores.blur_strength > scores.non_blur_strength {
            Decision::Accept
        } else {
            Decision::Retry
        }
    }

    /// Classify one image and decide. Classifier failures propagate to the
    /// caller, which treats them as an implicit retry.
    pub fn evaluate(&self, image: &RgbImage) -> Result<Decision> {
        let scores = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| anyhow!("blur backend lock poisoned"))?;
            backend.classify(image)?
        };
        let decision = Self::decide(&scores);
        log::debug!(
            "blur gate: blur={:.3} non_blur={:.3} -> {:?}",
            scores.blur_strength,
            scores.non_blur_strength,
            decision
        );
        Ok(decision)
    }

    pub fn warm_up(&self) -> Result<()> {
        let mut backend = self
            .backend
            .lock()
            .map_err(|_| anyhow!("blur backend lock poisoned"))?;
        backend.warm_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StubClassifier;

    fn pair(blur: f32, non_blur: f32) -> BlurScorePair {
        BlurScorePair {
            blur_strength: blur,
            non_blur_strength: non_blur,
        }
    }

    #[test]
    fn decision_rule_is_strict_greater_than() {
        assert_eq!(BlurGate::decide(&pair(0.8, 0.3)), Decision::Accept);
        assert_eq!(BlurGate::decide(&pair(0.3, 0.8)), Decision::Retry);
        // Ties favor retry.
        assert_eq!(BlurGate::decide(&pair(0.5, 0.5)), Decision::Retry);
    }

    #[test]
    fn evaluate_propagates_classifier_failure() {
        let mut classifier = StubClassifier::new();
        classifier.push_scores(0.9, 0.1);
        classifier.push_failure("model offline");
        let gate = BlurGate::new(Box::new(classifier));

        let img = RgbImage::new(4, 4);
        assert_eq!(gate.evaluate(&img).unwrap(), Decision::Accept);
        assert!(gate.evaluate(&img).is_err());
    }
}
