use crate::error::LexError;
use crate::token::{Span, Spanned, Token};

pub struct Lexer {
    chars: Vec<char>,
    /// Precomputed UTF-16 offset for each char index.
    /// `utf16_offsets[i]` = code-unit offset of `chars[i]` in the source.
    /// `utf16_offsets[chars.len()]` = total UTF-16 length (sentinel for EOF).
    utf16_offsets: Vec<usize>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let mut utf16_offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for ch in &chars {
            utf16_offsets.push(offset);
            offset += ch.len_utf16();
        }
        utf16_offsets.push(offset);
        Lexer {
            chars,
            utf16_offsets,
            pos: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let is_eof = spanned.token == Token::EOF;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Convert a char index to a UTF-16 offset.
    fn utf16_pos_of(&self, char_idx: usize) -> usize {
        self.utf16_offsets[char_idx.min(self.chars.len())]
    }

    fn spanned(&self, token: Token, start: usize) -> Spanned {
        Spanned {
            token,
            span: Span {
                start: self.utf16_pos_of(start),
                end: self.utf16_pos_of(self.pos),
            },
        }
    }

    /// Emit a token of `len` chars starting at the current position.
    fn punct(&mut self, token: Token, len: usize) -> Result<Spanned, LexError> {
        let start = self.pos;
        self.pos += len;
        Ok(self.spanned(token, start))
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_at(0) {
                Some(ch) if ch.is_whitespace() => self.pos += 1,
                Some('/') if self.peek_at(1) == Some('/') => {
                    while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
                        self.pos += 1;
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.advance() {
                            Some('*') if self.peek_at(0) == Some('/') => {
                                self.pos += 1;
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(LexError::UnterminatedComment {
                                    pos: self.utf16_pos_of(start),
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_trivia()?;

        if self.pos >= self.chars.len() {
            let end = self.utf16_pos_of(self.pos);
            return Ok(Spanned {
                token: Token::EOF,
                span: Span { start: end, end },
            });
        }

        let start = self.pos;
        let ch = self.chars[self.pos];
        let next = self.peek_at(1);
        let third = self.peek_at(2);

        match ch {
            '(' => self.punct(Token::LParen, 1),
            ')' => self.punct(Token::RParen, 1),
            '[' => self.punct(Token::LBracket, 1),
            ']' => self.punct(Token::RBracket, 1),
            ',' => self.punct(Token::Comma, 1),
            ':' => self.punct(Token::Colon, 1),
            '~' => self.punct(Token::Tilde, 1),
            '.' if next.is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start),
            '.' => self.punct(Token::Dot, 1),
            '?' if next == Some('?') => self.punct(Token::QuestionQuestion, 2),
            '?' => self.punct(Token::Question, 1),
            '+' if matches!(next, Some('+') | Some('=')) => self.forbidden(2),
            '+' => self.punct(Token::Plus, 1),
            '-' if matches!(next, Some('-') | Some('=')) => self.forbidden(2),
            '-' => self.punct(Token::Minus, 1),
            '*' if next == Some('*') && third == Some('=') => self.forbidden(3),
            '*' if next == Some('*') => self.punct(Token::StarStar, 2),
            '*' if next == Some('=') => self.forbidden(2),
            '*' => self.punct(Token::Star, 1),
            '/' if next == Some('=') => self.forbidden(2),
            '/' => self.punct(Token::Slash, 1),
            '%' if next == Some('=') => self.forbidden(2),
            '%' => self.punct(Token::Percent, 1),
            '^' if next == Some('=') => self.forbidden(2),
            '^' => self.punct(Token::Caret, 1),
            '&' if next == Some('&') => self.punct(Token::AmpAmp, 2),
            '&' if next == Some('=') => self.forbidden(2),
            '&' => self.punct(Token::Amp, 1),
            '|' if next == Some('|') => self.punct(Token::PipePipe, 2),
            '|' if next == Some('=') => self.forbidden(2),
            '|' => self.punct(Token::Pipe, 1),
            '!' if next == Some('=') && third == Some('=') => self.punct(Token::NotEqEq, 3),
            '!' if next == Some('=') => self.punct(Token::NotEq, 2),
            '!' => self.punct(Token::Bang, 1),
            '=' if next == Some('=') && third == Some('=') => self.punct(Token::EqEqEq, 3),
            '=' if next == Some('=') => self.punct(Token::EqEq, 2),
            '=' if next == Some('>') => self.forbidden(2),
            '=' => self.forbidden(1),
            '<' if next == Some('<') && third == Some('=') => self.forbidden(3),
            '<' if next == Some('<') => self.punct(Token::Shl, 2),
            '<' if next == Some('=') => self.punct(Token::LtEq, 2),
            '<' => self.punct(Token::Lt, 1),
            '>' => self.lex_greater(),
            ';' | '{' | '}' => self.forbidden(1),
            '"' | '\'' => self.lex_string(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            c if is_ident_start(c) => self.lex_ident(start),
            _ => Err(LexError::UnexpectedChar {
                ch,
                pos: self.utf16_pos_of(start),
            }),
        }
    }

    fn forbidden(&mut self, len: usize) -> Result<Spanned, LexError> {
        let text: String = self.chars[self.pos..self.pos + len].iter().collect();
        self.punct(Token::Forbidden(text), len)
    }

    fn lex_greater(&mut self) -> Result<Spanned, LexError> {
        // >, >=, >>, >>=, >>>, >>>=
        let rest: String = self.chars[self.pos..(self.pos + 4).min(self.chars.len())]
            .iter()
            .collect();
        if rest.starts_with(">>>=") {
            self.forbidden(4)
        } else if rest.starts_with(">>>") {
            self.punct(Token::UShr, 3)
        } else if rest.starts_with(">>=") {
            self.forbidden(3)
        } else if rest.starts_with(">>") {
            self.punct(Token::Shr, 2)
        } else if rest.starts_with(">=") {
            self.punct(Token::GtEq, 2)
        } else {
            self.punct(Token::Gt, 1)
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Spanned, LexError> {
        let unterminated = LexError::UnterminatedString {
            pos: self.utf16_pos_of(start),
        };
        let Some(quote) = self.advance() else {
            return Err(unterminated);
        };
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => break,
                Some('\n') | Some('\r') | None => return Err(unterminated),
                Some('\\') => {
                    let escape_pos = self.utf16_pos_of(self.pos - 1);
                    match self.advance() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some('0') => s.push('\0'),
                        Some('x') => s.push(self.lex_hex_escape(2, escape_pos)?),
                        Some('u') => s.push(self.lex_hex_escape(4, escape_pos)?),
                        // `\\`, `\'`, `\"` and unknown escapes all yield the char itself.
                        Some(c) => s.push(c),
                        None => return Err(unterminated),
                    }
                }
                Some(c) => s.push(c),
            }
        }
        Ok(self.spanned(Token::StringLit(s), start))
    }

    fn lex_hex_escape(&mut self, digits: usize, pos: usize) -> Result<char, LexError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .advance()
                .and_then(|c| c.to_digit(16))
                .ok_or(LexError::BadEscape { pos })?;
            code = code * 16 + digit;
        }
        // Lone surrogates have no `char`; substitute the replacement character.
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn lex_number(&mut self, start: usize) -> Result<Spanned, LexError> {
        let radix = match (self.peek_at(0), self.peek_at(1)) {
            (Some('0'), Some('x' | 'X')) => Some(16),
            (Some('0'), Some('o' | 'O')) => Some(8),
            (Some('0'), Some('b' | 'B')) => Some(2),
            _ => None,
        };

        let value = if let Some(radix) = radix {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_at(0).is_some_and(|c| c.is_digit(radix)) {
                self.pos += 1;
            }
            let text: String = self.chars[digits_start..self.pos].iter().collect();
            if text.is_empty() {
                return Err(self.invalid_number(start));
            }
            // Digits are validated above; accumulate in f64 so huge literals
            // round the same way JavaScript does instead of overflowing.
            text.chars()
                .filter_map(|c| c.to_digit(radix))
                .fold(0.0f64, |acc, d| acc * radix as f64 + d as f64)
        } else {
            // `010` would be octal in sloppy-mode JavaScript; refuse the ambiguity.
            if self.peek_at(0) == Some('0') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                return Err(LexError::LegacyOctal {
                    pos: self.utf16_pos_of(start),
                });
            }
            self.consume_digits();
            if self.peek_at(0) == Some('.') {
                self.pos += 1;
                self.consume_digits();
            }
            if matches!(self.peek_at(0), Some('e' | 'E')) {
                let signed = matches!(self.peek_at(1), Some('+' | '-'));
                let digit_at = if signed { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += digit_at;
                    self.consume_digits();
                } else {
                    return Err(self.invalid_number(start));
                }
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            text.parse::<f64>().map_err(|_| self.invalid_number(start))?
        };

        if self.peek_at(0).is_some_and(|c| is_ident_start(c) || c.is_ascii_digit()) {
            return Err(LexError::IdentifierAfterNumber {
                pos: self.utf16_pos_of(self.pos),
            });
        }
        Ok(self.spanned(Token::Number(value), start))
    }

    fn consume_digits(&mut self) {
        while self.peek_at(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn invalid_number(&self, start: usize) -> LexError {
        let end = (self.pos + 1).min(self.chars.len());
        LexError::InvalidNumber {
            text: self.chars[start..end].iter().collect(),
            pos: self.utf16_pos_of(start),
        }
    }

    fn lex_ident(&mut self, start: usize) -> Result<Spanned, LexError> {
        while self.peek_at(0).is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(self.spanned(Token::Ident(text), start))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
