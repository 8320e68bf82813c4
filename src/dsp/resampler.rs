//! Linear-interpolation sample-rate conversion for export paths.

use std::borrow::Cow;

use super::renderer::StereoBuffer;

/// Resample one channel from `source_rate` to `target_rate`.
///
/// Equal rates return the input borrowed. Output sample `i` reads the
/// source at fractional index `i * source_rate / target_rate`, interpolating
/// between its two neighbours.
pub fn resample(channel: &[f32], source_rate: u32, target_rate: u32) -> Cow<'_, [f32]> {
    if source_rate == target_rate || channel.is_empty() || source_rate == 0 || target_rate == 0 {
        return Cow::Borrowed(channel);
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let new_len = (channel.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    let last = channel.len() - 1;
    let mut out = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let pos = i as f64 * ratio;
        let idx = (pos.floor() as usize).min(last);
        let next = (idx + 1).min(last);
        let frac = pos - idx as f64;
        let a = channel[idx] as f64;
        let b = channel[next] as f64;
        out.push((a + (b - a) * frac) as f32);
    }

    Cow::Owned(out)
}

/// Resample both channels with the same ratio.
pub fn resample_stereo(buffer: &StereoBuffer, source_rate: u32, target_rate: u32) -> StereoBuffer {
    StereoBuffer {
        left: resample(&buffer.left, source_rate, target_rate).into_owned(),
        right: resample(&buffer.right, source_rate, target_rate).into_owned(),
    }
}
