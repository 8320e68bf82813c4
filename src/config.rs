//! Render configuration, loadable from the JSON the web client sends.

use serde::{Deserialize, Serialize};

use crate::dsp::quantize::EncodingMode;
use crate::error::ConfigError;

/// Longest clip any consumer may request.
pub const MAX_DURATION_SECONDS: f64 = 600.0;

/// Native rate of the classic bytebeat sound.
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Highest accepted sample rate, for both rendering and resampling targets.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Audio track rate used by the video exporter.
pub const DEFAULT_VIDEO_AUDIO_RATE: u32 = 48_000;

pub const DEFAULT_VIDEO_FPS: f64 = 30.0;

/// Everything needed to render one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub expression: String,
    pub mode: EncodingMode,
    pub sample_rate: u32,
    pub duration_seconds: f64,
    #[serde(default)]
    pub fade_in_seconds: f64,
    #[serde(default)]
    pub fade_out_seconds: f64,
}

impl RenderRequest {
    pub fn new(
        expression: impl Into<String>,
        mode: EncodingMode,
        sample_rate: u32,
        duration_seconds: f64,
    ) -> Self {
        RenderRequest {
            expression: expression.into(),
            mode,
            sample_rate,
            duration_seconds,
            fade_in_seconds: 0.0,
            fade_out_seconds: 0.0,
        }
    }

    pub fn with_fades(mut self, fade_in_seconds: f64, fade_out_seconds: f64) -> Self {
        self.fade_in_seconds = fade_in_seconds;
        self.fade_out_seconds = fade_out_seconds;
        self
    }

    /// Parse and validate a request from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let request: RenderRequest =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Check numeric fields. The expression itself is checked by the validator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_sample_rate(self.sample_rate)?;
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(ConfigError::BadDuration(self.duration_seconds));
        }
        if self.duration_seconds > MAX_DURATION_SECONDS {
            return Err(ConfigError::DurationTooLong(self.duration_seconds));
        }
        for (field, value) in [
            ("fadeInSeconds", self.fade_in_seconds),
            ("fadeOutSeconds", self.fade_out_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::BadFade { field, value });
            }
        }
        Ok(())
    }

    /// `floor(sample_rate * duration_seconds)`
    pub fn total_samples(&self) -> usize {
        seconds_to_samples(self.sample_rate, self.duration_seconds)
    }

    pub fn fade_in_samples(&self) -> usize {
        seconds_to_samples(self.sample_rate, self.fade_in_seconds)
    }

    pub fn fade_out_samples(&self) -> usize {
        seconds_to_samples(self.sample_rate, self.fade_out_seconds)
    }
}

fn seconds_to_samples(sample_rate: u32, seconds: f64) -> usize {
    (sample_rate as f64 * seconds).floor().max(0.0) as usize
}

/// Video export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConfig {
    /// Video frames per second; one waveform envelope entry per frame.
    pub fps: f64,
    /// Sample rate of the muxed audio track.
    pub audio_sample_rate: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        VideoConfig {
            fps: DEFAULT_VIDEO_FPS,
            audio_sample_rate: DEFAULT_VIDEO_AUDIO_RATE,
        }
    }
}

impl VideoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::BadFrameRate(self.fps));
        }
        check_sample_rate(self.audio_sample_rate)
    }
}

fn check_sample_rate(sample_rate: u32) -> Result<(), ConfigError> {
    match sample_rate {
        0 => Err(ConfigError::ZeroSampleRate),
        rate if rate > MAX_SAMPLE_RATE => Err(ConfigError::SampleRateTooHigh(rate)),
        _ => Ok(()),
    }
}
