//! Video export support: per-frame waveform envelopes plus an audio track
//! resampled to a fixed rate for muxing.

use serde::{Deserialize, Serialize};

use crate::config::{RenderRequest, VideoConfig};
use crate::error::RenderError;

use super::renderer::{render_with_progress, CancelToken, Progress, StereoBuffer};
use super::resampler::resample_stereo;

/// Minimum and maximum sample inside one video frame's window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FramePeaks {
    pub min: f32,
    pub max: f32,
}

/// Envelope of both channels for one video frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameWaveform {
    pub left: FramePeaks,
    pub right: FramePeaks,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoAudio {
    /// One entry per video frame, computed at the native sample rate.
    pub waveform: Vec<FrameWaveform>,
    /// Audio at `sample_rate`, ready for muxing.
    pub audio: StereoBuffer,
    pub sample_rate: u32,
}

pub fn prepare_video_audio(
    request: &RenderRequest,
    config: &VideoConfig,
) -> Result<VideoAudio, RenderError> {
    prepare_video_audio_with_progress(request, config, &CancelToken::new(), |_| {})
}

/// Render at the expression's native rate, derive the per-frame envelope and
/// resample the audio track to `config.audio_sample_rate`.
pub fn prepare_video_audio_with_progress(
    request: &RenderRequest,
    config: &VideoConfig,
    cancel: &CancelToken,
    progress: impl FnMut(Progress),
) -> Result<VideoAudio, RenderError> {
    config.validate()?;
    let native = render_with_progress(request, cancel, progress)?;
    let frame_count = (request.duration_seconds * config.fps).ceil() as usize;
    let waveform = frame_waveform(&native, request.sample_rate, config.fps, frame_count);
    let audio = resample_stereo(&native, request.sample_rate, config.audio_sample_rate);
    log::debug!(
        "video audio: {frame_count} frames, {} -> {} Hz ({} samples)",
        request.sample_rate,
        config.audio_sample_rate,
        audio.len()
    );
    Ok(VideoAudio {
        waveform,
        audio,
        sample_rate: config.audio_sample_rate,
    })
}

/// Windowed min/max envelope, one window of `sample_rate / fps` samples per
/// frame. Windows past the end of the buffer are flat zero.
pub fn frame_waveform(
    buffer: &StereoBuffer,
    sample_rate: u32,
    fps: f64,
    frame_count: usize,
) -> Vec<FrameWaveform> {
    let samples_per_frame = sample_rate as f64 / fps;
    (0..frame_count)
        .map(|frame| {
            let start = ((frame as f64 * samples_per_frame).floor() as usize).min(buffer.len());
            let end =
                (((frame + 1) as f64 * samples_per_frame).floor() as usize).min(buffer.len());
            FrameWaveform {
                left: peaks(&buffer.left[start..end]),
                right: peaks(&buffer.right[start..end]),
            }
        })
        .collect()
}

fn peaks(window: &[f32]) -> FramePeaks {
    if window.is_empty() {
        return FramePeaks::default();
    }
    window.iter().fold(
        FramePeaks {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        },
        |acc, &s| FramePeaks {
            min: acc.min.min(s),
            max: acc.max.max(s),
        },
    )
}
