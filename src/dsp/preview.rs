//! Static waveform preview: a sparse sampling of the expression for
//! thumbnails. No fades, no resampling.

use crate::compiler::{compile, Evaluator};
use crate::error::CompileError;

use super::quantize::{quantize, EncodingMode};

/// Sample `points` values at `t = 0, stride, 2*stride, ...`, mixing both
/// channels to mono. Non-finite results preview as silence.
pub fn preview(evaluator: &Evaluator, mode: EncodingMode, points: usize, stride: u64) -> Vec<f32> {
    let stride = stride.max(1);
    (0..points as u64)
        .map(|k| match quantize(evaluator.eval(k * stride), mode) {
            Some((l, r)) => ((l + r) * 0.5) as f32,
            None => 0.0,
        })
        .collect()
}

/// Compile and preview in one step.
pub fn preview_source(
    source: &str,
    mode: EncodingMode,
    sample_rate: u32,
    points: usize,
    stride: u64,
) -> Result<Vec<f32>, CompileError> {
    let evaluator = compile(source, sample_rate)?;
    Ok(preview(&evaluator, mode, points, stride))
}
