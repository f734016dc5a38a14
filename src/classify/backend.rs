use anyhow::Result;
use image::RgbImage;

/// The two raw outputs of the blur classifier for one image.
///
/// Channel ordering follows the pretrained 512x512 blur model these backends
/// stand in for: the first output rises with in-focus frames. The gate
/// contract (accept when `blur_strength` exceeds `non_blur_strength`) encodes
/// that ordering; backends must match it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurScorePair {
    pub blur_strength: f32,
    pub non_blur_strength: f32,
}

/// Blur classifier backend trait.
///
/// Implementations must be safe to invoke repeatedly on the same stream and
/// must fail with a classification error (rather than panic or guess) when
/// the model is unavailable or the input is malformed (zero dimensions, an
/// undecodable buffer). Classification may block; callers keep it off any
/// latency-sensitive path.
pub trait BlurClassifierBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Score one image.
    fn classify(&mut self, image: &RgbImage) -> Result<BlurScorePair>;

    /// Optional warm-up hook (model load, first-inference latency).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
