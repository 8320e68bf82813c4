//! Realtime playback bridge.
//!
//! A [`PlaybackSession`] owns a compiled evaluator and a sample cursor and
//! fills caller-supplied blocks on demand, e.g. from an AudioWorklet's
//! `process()` callback. It uses the same quantization as the offline
//! renderer but applies no fades.

use crate::compiler::Evaluator;
use crate::error::PlaybackError;

use super::quantize::{quantize, EncodingMode};

/// What to do when the expression produces a non-finite sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the failing sample and report it.
    #[default]
    Halt,
    /// Emit silence and keep going, like the offline renderer.
    Silence,
}

#[derive(Debug, Clone)]
pub struct PlaybackSession {
    evaluator: Evaluator,
    mode: EncodingMode,
    position: u64,
    policy: ErrorPolicy,
    halted: bool,
}

impl PlaybackSession {
    pub fn new(evaluator: Evaluator, mode: EncodingMode) -> Self {
        Self {
            evaluator,
            mode,
            position: 0,
            policy: ErrorPolicy::default(),
            halted: false,
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fill `left` and `right` with the next block of samples and advance the
    /// cursor. The block length is the shorter of the two slices; any tail of
    /// the longer one is left untouched.
    ///
    /// Under [`ErrorPolicy::Halt`] the first non-finite sample zeroes the rest
    /// of the block, leaves the cursor on the failing index and returns
    /// [`PlaybackError::Runtime`]. Later calls output silence and return
    /// [`PlaybackError::Halted`] until [`seek`](Self::seek) or
    /// [`reset`](Self::reset).
    pub fn fill(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<usize, PlaybackError> {
        let len = left.len().min(right.len());
        if self.halted {
            left[..len].fill(0.0);
            right[..len].fill(0.0);
            return Err(PlaybackError::Halted);
        }

        for i in 0..len {
            let t = self.position;
            match quantize(self.evaluator.eval(t), self.mode) {
                Some((l, r)) => {
                    left[i] = l as f32;
                    right[i] = r as f32;
                }
                None if self.policy == ErrorPolicy::Silence => {
                    left[i] = 0.0;
                    right[i] = 0.0;
                }
                None => {
                    left[i..len].fill(0.0);
                    right[i..len].fill(0.0);
                    self.halted = true;
                    log::warn!("playback halted at t={t}");
                    return Err(PlaybackError::Runtime {
                        t,
                        message: "expression produced a non-finite value".into(),
                    });
                }
            }
            self.position += 1;
        }
        Ok(len)
    }

    /// Move the cursor to sample `t` and clear a halt.
    pub fn seek(&mut self, t: u64) {
        self.position = t;
        self.halted = false;
    }

    pub fn reset(&mut self) {
        self.seek(0);
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    pub fn sample_rate(&self) -> u32 {
        self.evaluator.sample_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::config::RenderRequest;
    use crate::dsp::renderer::render;

    fn session(source: &str, mode: EncodingMode) -> PlaybackSession {
        PlaybackSession::new(compile(source, 8000).unwrap(), mode)
    }

    #[test]
    fn blocks_match_offline_render() {
        let source = "t*(t>>5|t>>8)>>(t>>16)";
        let offline = render(&RenderRequest::new(source, EncodingMode::Uint8, 8000, 0.5)).unwrap();

        let mut live = session(source, EncodingMode::Uint8);
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut l = [0.0f32; 128];
        let mut r = [0.0f32; 128];
        while left.len() < offline.len() {
            assert_eq!(live.fill(&mut l, &mut r).unwrap(), 128);
            left.extend_from_slice(&l);
            right.extend_from_slice(&r);
        }
        left.truncate(offline.len());
        right.truncate(offline.len());
        assert_eq!(left, offline.left);
        assert_eq!(right, offline.right);
    }

    #[test]
    fn cursor_advances_and_seeks() {
        let mut live = session("t", EncodingMode::Uint8);
        let mut l = [0.0f32; 64];
        let mut r = [0.0f32; 64];
        live.fill(&mut l, &mut r).unwrap();
        assert_eq!(live.position(), 64);

        live.seek(256);
        live.fill(&mut l, &mut r).unwrap();
        assert_eq!(l[0], -1.0);
        assert_eq!(live.position(), 320);

        live.reset();
        assert_eq!(live.position(), 0);
        assert_eq!(live.sample_rate(), 8000);
    }

    #[test]
    fn shorter_slice_bounds_the_block() {
        let mut live = session("0.5", EncodingMode::Float);
        let mut l = [9.0f32; 8];
        let mut r = [9.0f32; 4];
        assert_eq!(live.fill(&mut l, &mut r).unwrap(), 4);
        assert_eq!(&l[..4], &[0.5; 4]);
        assert_eq!(l[4], 9.0);
    }

    #[test]
    fn halt_policy_stops_at_first_failure() {
        // Non-finite from t = 4 onwards.
        let mut live = session("t < 4 ? 0.5 : 1/0", EncodingMode::Float);
        let mut l = [9.0f32; 8];
        let mut r = [9.0f32; 8];
        let err = live.fill(&mut l, &mut r).unwrap_err();
        assert_eq!(
            err,
            PlaybackError::Runtime {
                t: 4,
                message: "expression produced a non-finite value".into()
            }
        );
        assert!(err.to_string().starts_with("runtime error"));
        assert_eq!(l, [0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert!(live.is_halted());
        assert_eq!(live.position(), 4);

        assert_eq!(live.fill(&mut l, &mut r), Err(PlaybackError::Halted));
        assert!(l.iter().all(|&s| s == 0.0));

        live.reset();
        assert!(!live.is_halted());
        assert_eq!(live.fill(&mut l[..4], &mut r[..4]), Ok(4));
    }

    #[test]
    fn silence_policy_keeps_playing() {
        let mut live =
            session("t < 4 ? 0.5 : 1/0", EncodingMode::Float).with_policy(ErrorPolicy::Silence);
        let mut l = [9.0f32; 8];
        let mut r = [9.0f32; 8];
        assert_eq!(live.fill(&mut l, &mut r), Ok(8));
        assert_eq!(l, [0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert!(!live.is_halted());
        assert_eq!(live.position(), 8);
    }
}
