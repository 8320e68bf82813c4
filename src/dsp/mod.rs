//! Sample generation and its consumers.
//!
//! The renderer and quantizer turn a compiled expression into stereo f32
//! samples. The same kernel feeds offline WAV and video export, the live
//! playback bridge and static previews.

pub mod playback;
pub mod preview;
pub mod quantize;
pub mod renderer;
pub mod resampler;
pub mod video;
pub mod wav;
