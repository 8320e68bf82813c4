//! Quantization modes: how a raw expression result becomes an amplitude.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::compiler::{to_int32, Frame};
use crate::error::ConfigError;

/// How raw expression output maps to a sample in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Low 8 bits of the integer result, unsigned (classic bytebeat).
    #[default]
    Uint8,
    /// Low 8 bits of the integer result, signed.
    Int8,
    /// The result is already an amplitude; clamped to `[-1, 1]`.
    Float,
}

impl EncodingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EncodingMode::Uint8 => "uint8",
            EncodingMode::Int8 => "int8",
            EncodingMode::Float => "float",
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8" => Ok(EncodingMode::Uint8),
            "int8" => Ok(EncodingMode::Int8),
            "float" => Ok(EncodingMode::Float),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

/// Convert one evaluated frame to a pair of channel samples.
///
/// Returns `None` when any channel is non-finite; callers decide whether
/// that means silence (offline render) or a halt (live playback).
pub fn quantize(frame: Frame, mode: EncodingMode) -> Option<(f64, f64)> {
    if !frame.is_finite() {
        return None;
    }
    let (l, r) = frame.channels();
    Some((quantize_channel(l, mode), quantize_channel(r, mode)))
}

fn quantize_channel(raw: f64, mode: EncodingMode) -> f64 {
    match mode {
        EncodingMode::Float => raw.clamp(-1.0, 1.0),
        EncodingMode::Uint8 => byte_to_sample(to_int32(raw) & 0xFF),
        EncodingMode::Int8 => byte_to_sample(to_int32(raw + 128.0) & 0xFF),
    }
}

fn byte_to_sample(byte: i32) -> f64 {
    (byte - 128) as f64 / 128.0
}
