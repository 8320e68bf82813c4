//! Sample renderer: drives a compiled expression across a sample range.
//!
//! Every consumer (WAV export, video export, live playback, preview) goes
//! through [`quantize`] so the sample semantics are identical everywhere.
//! Offline renders never abort on a bad sample: a non-finite result is
//! rendered as silence and the render continues.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::compiler::{compile, Evaluator};
use crate::config::RenderRequest;
use crate::error::RenderError;

use super::quantize::{quantize, EncodingMode};

/// Samples rendered between progress callbacks and cancellation checks.
pub const RENDER_BLOCK: usize = 8192;

/// Two equal-length channels of samples in `[-1, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    pub fn silent(len: usize) -> Self {
        StereoBuffer {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Interleave as `L, R, L, R, ...`.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * 2);
        for (l, r) in self.left.iter().zip(&self.right) {
            out.push(*l);
            out.push(*r);
        }
        out
    }
}

/// Linear fade-in / fade-out gain over a buffer of `total` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FadeEnvelope {
    pub total: usize,
    pub fade_in: usize,
    pub fade_out: usize,
}

impl FadeEnvelope {
    pub fn new(total: usize, fade_in: usize, fade_out: usize) -> Self {
        FadeEnvelope {
            total,
            fade_in,
            fade_out,
        }
    }

    pub fn from_request(request: &RenderRequest) -> Self {
        FadeEnvelope::new(
            request.total_samples(),
            request.fade_in_samples(),
            request.fade_out_samples(),
        )
    }

    /// Gain at sample `i`. The fade-out window wins where both overlap.
    pub fn gain(&self, i: usize) -> f64 {
        let mut gain = 1.0;
        if i < self.fade_in {
            gain = i as f64 / self.fade_in as f64;
        }
        if self.fade_out > 0 && i >= self.total.saturating_sub(self.fade_out) {
            gain = self.total.saturating_sub(i) as f64 / self.fade_out as f64;
        }
        gain
    }
}

/// Shared flag for cooperatively cancelling a long render from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress reported after each rendered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub rendered: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.rendered as f64 / self.total as f64
        }
    }
}

/// Render a full request in one call.
pub fn render(request: &RenderRequest) -> Result<StereoBuffer, RenderError> {
    render_with_progress(request, &CancelToken::new(), |_| {})
}

/// Render a request block by block, reporting progress and honouring
/// cancellation between blocks.
pub fn render_with_progress(
    request: &RenderRequest,
    cancel: &CancelToken,
    progress: impl FnMut(Progress),
) -> Result<StereoBuffer, RenderError> {
    request.validate()?;
    let evaluator = compile(&request.expression, request.sample_rate)?;
    render_evaluator(
        &evaluator,
        request.mode,
        FadeEnvelope::from_request(request),
        cancel,
        progress,
    )
}

/// Render `envelope.total` samples from an already compiled evaluator.
pub fn render_evaluator(
    evaluator: &Evaluator,
    mode: EncodingMode,
    envelope: FadeEnvelope,
    cancel: &CancelToken,
    mut progress: impl FnMut(Progress),
) -> Result<StereoBuffer, RenderError> {
    let total = envelope.total;
    let mut buffer = StereoBuffer::silent(total);
    let mut silenced = 0;
    let mut start = 0;

    log::debug!(
        "rendering {total} samples at {} Hz ({mode})",
        evaluator.sample_rate()
    );

    while start < total {
        if cancel.is_cancelled() {
            log::debug!("render cancelled at {start}/{total}");
            return Err(RenderError::Cancelled { rendered: start });
        }
        let end = (start + RENDER_BLOCK).min(total);
        silenced += render_into(
            evaluator,
            mode,
            &envelope,
            start..end,
            &mut buffer.left[start..end],
            &mut buffer.right[start..end],
        );
        start = end;
        progress(Progress {
            rendered: start,
            total,
        });
    }

    if silenced > 0 {
        log::debug!("{silenced} of {total} samples were non-finite and rendered as silence");
    }
    Ok(buffer)
}

/// Render the sample indices in `range` into `left` / `right`, which must be
/// at least `range.len()` long. Returns how many samples were silenced.
pub fn render_into(
    evaluator: &Evaluator,
    mode: EncodingMode,
    envelope: &FadeEnvelope,
    range: Range<usize>,
    left: &mut [f32],
    right: &mut [f32],
) -> usize {
    let mut silenced = 0;
    for (offset, i) in range.enumerate() {
        let (l, r) = match quantize(evaluator.eval(i as u64), mode) {
            Some(pair) => pair,
            None => {
                silenced += 1;
                (0.0, 0.0)
            }
        };
        let gain = envelope.gain(i);
        left[offset] = (l * gain) as f32;
        right[offset] = (r * gain) as f32;
    }
    silenced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(expr: &str, mode: EncodingMode, sample_rate: u32, duration: f64) -> RenderRequest {
        RenderRequest::new(expr, mode, sample_rate, duration)
    }

    #[test]
    fn uint8_saw_wraps() {
        let buffer = render(&request("t", EncodingMode::Uint8, 8000, 1.0)).unwrap();
        assert_eq!(buffer.left.len(), 8000);
        assert_eq!(buffer.right.len(), 8000);
        assert_eq!(buffer.left[0], -1.0);
        assert!((buffer.left[255] - 0.9921875).abs() < 1e-7);
        assert_eq!(buffer.left[256], -1.0);
        assert_eq!(buffer.left, buffer.right);
    }

    #[test]
    fn float_constant_fills_both_channels() {
        for (sample_rate, duration) in [(8000, 0.5), (44100, 0.1), (22050, 1.0)] {
            let buffer = render(&request("0.5", EncodingMode::Float, sample_rate, duration)).unwrap();
            assert_eq!(buffer.len(), (sample_rate as f64 * duration).floor() as usize);
            assert!(buffer.left.iter().chain(&buffer.right).all(|&s| s == 0.5));
        }
    }

    #[test]
    fn length_is_floored() {
        let buffer = render(&request("t", EncodingMode::Uint8, 1000, 0.0125)).unwrap();
        assert_eq!(buffer.len(), 12);
    }

    #[test]
    fn explicit_stereo() {
        let buffer = render(&request("[0.25, -0.25]", EncodingMode::Float, 8000, 0.01)).unwrap();
        assert!(buffer.left.iter().all(|&s| s == 0.25));
        assert!(buffer.right.iter().all(|&s| s == -0.25));
    }

    #[test]
    fn other_shapes_count_as_zero() {
        let buffer = render(&request("[1, 2, 3]", EncodingMode::Uint8, 8000, 0.01)).unwrap();
        assert!(buffer.left.iter().all(|&s| s == -1.0));
        let buffer = render(&request("[1, 2, 3]", EncodingMode::Float, 8000, 0.01)).unwrap();
        assert!(buffer.left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn fade_in_ramp() {
        let req = request("1", EncodingMode::Float, 8000, 2.0).with_fades(1.0, 0.0);
        let buffer = render(&req).unwrap();
        for i in [0usize, 1, 100, 4000, 7999] {
            assert_eq!(buffer.left[i], (i as f64 / 8000.0) as f32, "sample {i}");
        }
        assert_eq!(buffer.left[8000], 1.0);
        assert_eq!(buffer.left[15999], 1.0);
    }

    #[test]
    fn fade_out_ramp() {
        let req = request("1", EncodingMode::Float, 8000, 2.0).with_fades(0.0, 1.0);
        let buffer = render(&req).unwrap();
        assert_eq!(buffer.left[7999], 1.0);
        assert_eq!(buffer.left[8000], 1.0);
        assert_eq!(buffer.left[12000], 0.5);
        assert_eq!(buffer.left[15999], (1.0f64 / 8000.0) as f32);
    }

    #[test]
    fn fade_out_wins_when_windows_overlap() {
        let envelope = FadeEnvelope::new(100, 80, 80);
        // i = 50 is inside both windows; fade-out gain (100-50)/80 applies.
        assert_eq!(envelope.gain(50), 50.0 / 80.0);
        assert_eq!(envelope.gain(10), 10.0 / 80.0);
        assert_eq!(envelope.gain(99), 1.0 / 80.0);
    }

    #[test]
    fn zero_length_fades_leave_gain_at_one() {
        let envelope = FadeEnvelope::new(100, 0, 0);
        assert!((0..100).all(|i| envelope.gain(i) == 1.0));
    }

    #[test]
    fn non_finite_samples_become_silence() {
        // 1/t is +inf at t = 0 only.
        let buffer = render(&request("1/t", EncodingMode::Float, 8000, 0.01)).unwrap();
        assert_eq!(buffer.left[0], 0.0);
        assert_eq!(buffer.right[0], 0.0);
        assert_eq!(buffer.left[1], 1.0);
        assert_eq!(buffer.left[2], 0.5);

        let buffer = render(&request("t/0 * 0", EncodingMode::Uint8, 8000, 0.01)).unwrap();
        assert_eq!(buffer.len(), 80);
        assert!(buffer.left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn invalid_requests_are_rejected() {
        assert!(matches!(
            render(&request("eval(t)", EncodingMode::Uint8, 8000, 1.0)),
            Err(RenderError::Compile(_))
        ));
        assert!(matches!(
            render(&request("t", EncodingMode::Uint8, 0, 1.0)),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn progress_is_reported_per_block() {
        let req = request("t", EncodingMode::Uint8, 8000, 3.0);
        let mut reports = Vec::new();
        let buffer = render_with_progress(&req, &CancelToken::new(), |p| reports.push(p)).unwrap();
        assert_eq!(buffer.len(), 24000);
        assert_eq!(reports.len(), 24000usize.div_ceil(RENDER_BLOCK));
        assert_eq!(reports.last().map(|p| p.rendered), Some(24000));
        assert_eq!(reports.last().map(|p| p.fraction()), Some(1.0));
    }

    #[test]
    fn cancellation_stops_between_blocks() {
        let req = request("t", EncodingMode::Uint8, 8000, 10.0);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let result = render_with_progress(&req, &cancel, |p| {
            if p.rendered >= RENDER_BLOCK * 2 {
                token.cancel();
            }
        });
        assert_eq!(result, Err(RenderError::Cancelled { rendered: RENDER_BLOCK * 2 }));
    }

    #[test]
    fn renders_are_deterministic_and_parallel_safe() {
        let req = request("t*(t>>5|t>>8)^sin(t)", EncodingMode::Uint8, 8000, 0.5);
        let expected = render(&req).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let req = req.clone();
                std::thread::spawn(move || render(&req).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn interleaves_channels() {
        let buffer = StereoBuffer {
            left: vec![1.0, 2.0],
            right: vec![-1.0, -2.0],
        };
        assert_eq!(buffer.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
    }
}
