//! Error types for every stage of the pipeline.
//!
//! All offsets carried here are UTF-16 code-unit positions into the source
//! expression, matching what the editor uses for highlighting.

use crate::validator::ValidationResult;

pub type Result<T, E = BytebeatError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum BytebeatError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{ch}'")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated string constant")]
    UnterminatedString { pos: usize },

    #[error("Unterminated comment")]
    UnterminatedComment { pos: usize },

    #[error("Invalid number '{text}'")]
    InvalidNumber { text: String, pos: usize },

    #[error("Legacy octal literals are not supported")]
    LegacyOctal { pos: usize },

    #[error("Identifier directly after number")]
    IdentifierAfterNumber { pos: usize },

    #[error("Bad character escape sequence")]
    BadEscape { pos: usize },
}

impl LexError {
    pub fn pos(&self) -> usize {
        match self {
            LexError::UnexpectedChar { pos, .. }
            | LexError::UnterminatedString { pos }
            | LexError::UnterminatedComment { pos }
            | LexError::InvalidNumber { pos, .. }
            | LexError::LegacyOctal { pos }
            | LexError::IdentifierAfterNumber { pos }
            | LexError::BadEscape { pos } => *pos,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("Unexpected token")]
    UnexpectedToken { found: String, pos: usize },

    #[error("Unexpected keyword '{keyword}'")]
    UnexpectedKeyword { keyword: String, pos: usize },

    #[error("Unexpected end of input")]
    UnexpectedEOF { pos: usize },

    #[error("Expression nested too deeply")]
    TooDeep { pos: usize },
}

impl ParseError {
    /// UTF-16 offset the parser blames for the failure.
    pub fn pos(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.pos(),
            ParseError::UnexpectedToken { pos, .. }
            | ParseError::UnexpectedKeyword { pos, .. }
            | ParseError::UnexpectedEOF { pos }
            | ParseError::TooDeep { pos } => *pos,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The source did not pass validation; the result carries the issues.
    #[error("invalid expression: {}", first_message(.0))]
    Invalid(ValidationResult),
}

fn first_message(result: &ValidationResult) -> &str {
    result
        .first_issue()
        .map(|issue| issue.message.as_str())
        .unwrap_or("rejected")
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,

    #[error("sample rate {0} Hz exceeds the {max} Hz limit", max = crate::config::MAX_SAMPLE_RATE)]
    SampleRateTooHigh(u32),

    #[error("duration must be a positive finite number of seconds, got {0}")]
    BadDuration(f64),

    #[error("duration {0}s exceeds the {max}s limit", max = crate::config::MAX_DURATION_SECONDS)]
    DurationTooLong(f64),

    #[error("{field} must be a non-negative finite number of seconds, got {value}")]
    BadFade { field: &'static str, value: f64 },

    #[error("unknown encoding mode '{0}' (expected uint8, int8 or float)")]
    UnknownMode(String),

    #[error("video frame rate must be a positive finite number, got {0}")]
    BadFrameRate(f64),

    #[error("malformed request: {0}")]
    Json(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("render cancelled after {rendered} samples")]
    Cancelled { rendered: usize },

    #[error("{samples} samples at {sample_rate} Hz do not fit in a WAV file")]
    WavTooLarge { samples: usize, sample_rate: u32 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("runtime error at t={t}: {message}")]
    Runtime { t: u64, message: String },

    #[error("playback halted; reset or seek before resuming")]
    Halted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationIssue;

    #[test]
    fn parse_error_positions_come_from_the_lexer() {
        let err = ParseError::from(LexError::UnexpectedChar { ch: '@', pos: 4 });
        assert_eq!(err.pos(), 4);
        assert_eq!(err.to_string(), "Unexpected character '@'");
    }

    #[test]
    fn compile_error_shows_first_issue() {
        let err = CompileError::Invalid(ValidationResult {
            valid: false,
            issues: vec![ValidationIssue {
                message: "Unknown identifier: x".into(),
                start: 0,
                end: 1,
            }],
        });
        assert_eq!(err.to_string(), "invalid expression: Unknown identifier: x");
    }

    #[test]
    fn display_prefixes_are_stable() {
        assert!(ConfigError::ZeroSampleRate.to_string().contains("sample rate"));
        assert!(
            RenderError::Cancelled { rendered: 10 }
                .to_string()
                .contains("cancelled after 10")
        );
        assert!(
            PlaybackError::Runtime { t: 3, message: "x".into() }
                .to_string()
                .starts_with("runtime error at t=3")
        );
    }
}
