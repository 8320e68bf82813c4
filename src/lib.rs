pub mod ast;
pub mod compiler;
pub mod config;
pub mod dsp;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod validator;

use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::parser::Parser;
use wasm_bindgen::prelude::*;

pub use crate::compiler::{compile, Evaluator, Frame};
pub use crate::config::{RenderRequest, VideoConfig};
pub use crate::dsp::playback::{ErrorPolicy, PlaybackSession};
pub use crate::dsp::preview::preview;
pub use crate::dsp::quantize::EncodingMode;
pub use crate::dsp::renderer::{render, render_with_progress, CancelToken, Progress, StereoBuffer};
pub use crate::dsp::resampler::resample;
pub use crate::dsp::video::prepare_video_audio;
pub use crate::dsp::wav::render_wav;
pub use crate::error::BytebeatError;
pub use crate::validator::{validate, ValidationIssue, ValidationResult};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the bytebeat_core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Parse an expression into its AST without validating it.
pub fn parse(input: &str) -> Result<ast::Expr, ParseError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse_source()
}

/// Parse a JSON `RenderRequest` and render it to stereo buffers.
pub fn render_json(request_json: &str) -> error::Result<StereoBuffer> {
    let request = RenderRequest::from_json(request_json)?;
    Ok(render(&request)?)
}

/// Parse a JSON `RenderRequest` and render it to WAV bytes.
pub fn render_wav_json(request_json: &str) -> error::Result<Vec<u8>> {
    let request = RenderRequest::from_json(request_json)?;
    Ok(render_wav(&request)?)
}

/// WASM-exposed: route `log` output to the browser console.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init_logging() {
    console_log::init_with_level(log::Level::Debug).ok();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// WASM-exposed: validate an expression, returning
/// `{ valid, issues: [{ message, start, end }] }`.
#[wasm_bindgen]
pub fn validate_expression(source: &str) -> JsValue {
    let result = validate(source);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

/// WASM-exposed: render a JSON `RenderRequest` to interleaved L/R f32
/// samples for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_bytebeat_samples(request_json: &str) -> Result<Vec<f32>, JsValue> {
    let buffer = render_json(request_json).map_err(js_error)?;
    Ok(buffer.interleaved())
}

/// WASM-exposed: render a JSON `RenderRequest` to a WAV byte array.
#[wasm_bindgen]
pub fn render_bytebeat_wav(request_json: &str) -> Result<Vec<u8>, JsValue> {
    render_wav_json(request_json).map_err(js_error)
}

/// WASM-exposed: sparse mono preview of an expression.
#[wasm_bindgen]
pub fn preview_bytebeat(
    source: &str,
    mode: &str,
    sample_rate: u32,
    points: u32,
    stride: u32,
) -> Result<Vec<f32>, JsValue> {
    let mode: EncodingMode = mode.parse().map_err(js_error)?;
    dsp::preview::preview_source(source, mode, sample_rate, points as usize, stride as u64)
        .map_err(js_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn parse_reports_lex_errors() {
        assert!(matches!(parse("t @ 1"), Err(ParseError::Lex(_))));
        assert!(parse("t >> 4 & 7").is_ok());
    }

    #[test]
    fn json_request_renders_interleaved() {
        let samples = render_bytebeat_samples(
            r#"{"expression":"[0.25,-0.25]","mode":"float","sampleRate":8000,"durationSeconds":0.01}"#,
        )
        .unwrap();
        assert_eq!(samples.len(), 160);
        assert_eq!(&samples[..4], &[0.25, -0.25, 0.25, -0.25]);
    }

    #[test]
    fn json_entry_points_report_the_failing_stage() {
        let bad_rate = r#"{"expression":"t","mode":"uint8","sampleRate":0,"durationSeconds":1}"#;
        assert!(matches!(
            render_json(bad_rate),
            Err(BytebeatError::Config(error::ConfigError::ZeroSampleRate))
        ));

        let bad_source = r#"{"expression":"eval('t')","mode":"uint8","sampleRate":8000,"durationSeconds":1}"#;
        let err = render_wav_json(bad_source).unwrap_err();
        assert!(matches!(err, BytebeatError::Render(error::RenderError::Compile(_))));
        assert_eq!(err.to_string(), "invalid expression: Dangerous function call: eval");

        let ok = r#"{"expression":"t","mode":"uint8","sampleRate":8000,"durationSeconds":0.5}"#;
        assert_eq!(render_wav_json(ok).unwrap().len(), 44 + 4000 * 4);
    }

    #[test]
    fn preview_through_the_string_mode() {
        let points = preview_bytebeat("t", "uint8", 8000, 2, 128).unwrap();
        assert_eq!(points, vec![-1.0, 0.0]);
    }
}
