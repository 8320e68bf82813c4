//! WAV exporter: renders a request to a 16-bit stereo PCM RIFF/WAVE file.

use crate::config::RenderRequest;
use crate::error::RenderError;

use super::renderer::{render_with_progress, CancelToken, Progress, StereoBuffer};

const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;

/// Render a request and package it as WAV bytes.
pub fn render_wav(request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
    render_wav_with_progress(request, &CancelToken::new(), |_| {})
}

/// [`render_wav`] with progress reporting and cancellation.
pub fn render_wav_with_progress(
    request: &RenderRequest,
    cancel: &CancelToken,
    progress: impl FnMut(Progress),
) -> Result<Vec<u8>, RenderError> {
    let buffer = render_with_progress(request, cancel, progress)?;
    encode_wav(&buffer, request.sample_rate)
}

/// Encode a stereo buffer as 16-bit PCM WAV bytes.
///
/// Fails when the byte rate or the data chunk would overflow the header's
/// 32-bit size fields.
pub fn encode_wav(buffer: &StereoBuffer, sample_rate: u32) -> Result<Vec<u8>, RenderError> {
    let too_large = || RenderError::WavTooLarge {
        samples: buffer.len(),
        sample_rate,
    };
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or_else(too_large)?;
    let data_size = buffer
        .len()
        .checked_mul(block_align as usize)
        .and_then(|size| u32::try_from(size).ok())
        .ok_or_else(too_large)?;
    let file_size = data_size.checked_add(36).ok_or_else(too_large)?;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&CHANNELS.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for (&l, &r) in buffer.left.iter().zip(&buffer.right) {
        buf.extend_from_slice(&to_pcm16(l).to_le_bytes());
        buf.extend_from_slice(&to_pcm16(r).to_le_bytes());
    }

    Ok(buf)
}

/// Negative samples scale by 0x8000, positive by 0x7FFF; truncates toward zero.
fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0) as f64;
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}
