use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    StringLit(String),
    Ident(String),

    // Grouping
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Dot,      // .
    Question, // ?
    Colon,    // :

    // Arithmetic
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    StarStar, // **

    // Bitwise
    Amp,    // &
    Pipe,   // |
    Caret,  // ^
    Tilde,  // ~
    Shl,    // <<
    Shr,    // >>
    UShr,   // >>>

    // Logical
    Bang,     // !
    AmpAmp,   // &&
    PipePipe, // ||
    QuestionQuestion, // ??

    // Comparison
    Lt,          // <
    Gt,          // >
    LtEq,        // <=
    GtEq,        // >=
    EqEq,        // ==
    NotEq,       // !=
    EqEqEq,      // ===
    NotEqEq,     // !==

    /// Assignment, update, arrow and statement punctuation (`=`, `+=`, `++`,
    /// `=>`, `;`, `{`, `}`). Lexed only so the parser can reject them with a
    /// positioned error.
    Forbidden(String),

    EOF,
}

/// A half-open range of UTF-16 code units in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Convert a token back to its approximate source representation.
pub fn token_to_string(token: &Token) -> String {
    match token {
        Token::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Token::StringLit(s) => format!("\"{s}\""),
        Token::Ident(s) => s.clone(),
        Token::LParen => "(".into(),
        Token::RParen => ")".into(),
        Token::LBracket => "[".into(),
        Token::RBracket => "]".into(),
        Token::Comma => ",".into(),
        Token::Dot => ".".into(),
        Token::Question => "?".into(),
        Token::Colon => ":".into(),
        Token::Plus => "+".into(),
        Token::Minus => "-".into(),
        Token::Star => "*".into(),
        Token::Slash => "/".into(),
        Token::Percent => "%".into(),
        Token::StarStar => "**".into(),
        Token::Amp => "&".into(),
        Token::Pipe => "|".into(),
        Token::Caret => "^".into(),
        Token::Tilde => "~".into(),
        Token::Shl => "<<".into(),
        Token::Shr => ">>".into(),
        Token::UShr => ">>>".into(),
        Token::Bang => "!".into(),
        Token::AmpAmp => "&&".into(),
        Token::PipePipe => "||".into(),
        Token::QuestionQuestion => "??".into(),
        Token::Lt => "<".into(),
        Token::Gt => ">".into(),
        Token::LtEq => "<=".into(),
        Token::GtEq => ">=".into(),
        Token::EqEq => "==".into(),
        Token::NotEq => "!=".into(),
        Token::EqEqEq => "===".into(),
        Token::NotEqEq => "!==".into(),
        Token::Forbidden(s) => s.clone(),
        Token::EOF => "".into(),
    }
}

/// Words that begin statements or declarations. None of them can start an
/// expression, so the parser rejects them wherever an operand is expected.
pub const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "export", "extends", "finally", "for", "function", "if", "import",
    "in", "instanceof", "let", "new", "return", "super", "switch", "this", "throw", "try",
    "typeof", "var", "void", "while", "with", "yield",
];

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}
