use crate::ast::*;
use crate::error::ParseError;
use crate::token::{is_reserved_word, token_to_string, Span, Spanned, Token};

/// Maximum depth of the expression tree. Nesting and every link of an
/// operator or postfix chain count one level, so neither the parser nor the
/// later tree walks can exhaust the stack (wasm stacks are small).
pub const MAX_DEPTH: usize = 128;

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ── Helpers ──────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].span.end
    }

    fn advance(&mut self) -> Spanned {
        let s = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        s
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::EOF)
    }

    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Spanned, ParseError> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected())
        }
    }

    /// Error for the current token, whatever it is.
    fn unexpected(&self) -> ParseError {
        let pos = self.span().start;
        match self.peek() {
            Token::EOF => ParseError::UnexpectedEOF { pos },
            Token::Ident(name) if is_reserved_word(name) => ParseError::UnexpectedKeyword {
                keyword: name.clone(),
                pos,
            },
            other => ParseError::UnexpectedToken {
                found: token_to_string(other),
                pos,
            },
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep {
                pos: self.span().start,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Release the levels taken by a finished chain.
    fn leave_chain(&mut self, links: usize) {
        self.depth -= links;
    }

    // ── Entry point ──────────────────────────────────────────

    /// Parse the whole token stream as exactly one expression.
    ///
    /// Empty input yields `ExprKind::Empty`. Anything left over after a
    /// complete expression is rejected at the first unconsumed token.
    pub fn parse_source(&mut self) -> Result<Expr, ParseError> {
        if self.is_at_end() {
            return Ok(Expr::new(ExprKind::Empty, self.span()));
        }
        let expr = self.parse_sequence()?;
        if !self.is_at_end() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    // ── Expressions, loosest binding first ───────────────────

    fn parse_sequence(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_conditional()?;
        if !self.check(&Token::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            items.push(self.parse_conditional()?);
        }
        let span = Span::new(start.start, self.prev_end());
        Ok(Expr::new(ExprKind::Sequence(items), span))
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let test = self.parse_binary(1)?;
        let result = if self.eat(&Token::Question) {
            let consequent = self.parse_conditional()?;
            self.expect(&Token::Colon)?;
            let alternate = self.parse_conditional()?;
            let span = Span::new(test.span.start, alternate.span.end);
            Ok(Expr::new(
                ExprKind::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                },
                span,
            ))
        } else {
            Ok(test)
        };
        self.leave();
        result
    }

    /// Precedence climbing over the left-associative binary operators.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_exponent()?;
        let mut links = 0;
        while let Some((prec, op)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            self.enter()?;
            links += 1;
            let right = self.parse_binary(prec + 1)?;
            let span = left.span.to(right.span);
            let kind = match op {
                Op::Binary(op) => ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Op::Logical(op) => ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
            left = Expr::new(kind, span);
        }
        self.leave_chain(links);
        Ok(left)
    }

    /// `**` is right-associative and may not take a bare unary expression on
    /// its left (`-2 ** 2` is ambiguous and rejected).
    fn parse_exponent(&mut self) -> Result<Expr, ParseError> {
        if unary_op(self.peek()).is_some() {
            let unary = self.parse_unary()?;
            if self.check(&Token::StarStar) {
                return Err(self.unexpected());
            }
            return Ok(unary);
        }
        let base = self.parse_postfix()?;
        if !self.eat(&Token::StarStar) {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.parse_exponent()?;
        self.leave();
        let span = base.span.to(exponent.span);
        Ok(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            span,
        ))
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let Some(op) = unary_op(self.peek()) else {
            return self.parse_postfix();
        };
        let start = self.advance().span.start;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        let span = Span::new(start, operand.span.end);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), Token::LParen | Token::Dot | Token::LBracket) {
                self.enter()?;
                links += 1;
            }
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let args = self.parse_list(&Token::RParen)?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                Token::Dot => {
                    self.advance();
                    let name_span = self.span();
                    let name = match self.peek() {
                        Token::Ident(name) => name.clone(),
                        _ => return Err(self.unexpected()),
                    };
                    self.advance();
                    let span = Span::new(expr.span.start, name_span.end);
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProperty::Static {
                                name,
                                span: name_span,
                            },
                        },
                        span,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_sequence()?;
                    self.expect(&Token::RBracket)?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProperty::Computed(Box::new(index)),
                        },
                        span,
                    );
                }
                _ => {
                    self.leave_chain(links);
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(n), span))
            }
            Token::StringLit(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::StringLit(s), span))
            }
            Token::Ident(name) if !is_reserved_word(&name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), span))
            }
            Token::LParen => {
                self.advance();
                let mut inner = self.parse_sequence()?;
                self.expect(&Token::RParen)?;
                // Parentheses only group; widen the span so diagnostics cover them.
                inner.span = Span::new(span.start, self.prev_end());
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_list(&Token::RBracket)?;
                Ok(Expr::new(
                    ExprKind::Array(items),
                    Span::new(span.start, self.prev_end()),
                ))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_list(&mut self, close: &Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_conditional()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }
}

enum Op {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn unary_op(token: &Token) -> Option<UnaryOp> {
    match token {
        Token::Plus => Some(UnaryOp::Plus),
        Token::Minus => Some(UnaryOp::Neg),
        Token::Bang => Some(UnaryOp::Not),
        Token::Tilde => Some(UnaryOp::BitNot),
        _ => None,
    }
}

fn binary_op(token: &Token) -> Option<(u8, Op)> {
    let entry = match token {
        Token::PipePipe => (1, Op::Logical(LogicalOp::Or)),
        Token::QuestionQuestion => (1, Op::Logical(LogicalOp::Nullish)),
        Token::AmpAmp => (2, Op::Logical(LogicalOp::And)),
        Token::Pipe => (3, Op::Binary(BinaryOp::BitOr)),
        Token::Caret => (4, Op::Binary(BinaryOp::BitXor)),
        Token::Amp => (5, Op::Binary(BinaryOp::BitAnd)),
        Token::EqEq | Token::EqEqEq => (6, Op::Binary(BinaryOp::Eq)),
        Token::NotEq | Token::NotEqEq => (6, Op::Binary(BinaryOp::NotEq)),
        Token::Lt => (7, Op::Binary(BinaryOp::Lt)),
        Token::Gt => (7, Op::Binary(BinaryOp::Gt)),
        Token::LtEq => (7, Op::Binary(BinaryOp::LtEq)),
        Token::GtEq => (7, Op::Binary(BinaryOp::GtEq)),
        Token::Shl => (8, Op::Binary(BinaryOp::Shl)),
        Token::Shr => (8, Op::Binary(BinaryOp::Shr)),
        Token::UShr => (8, Op::Binary(BinaryOp::UShr)),
        Token::Plus => (9, Op::Binary(BinaryOp::Add)),
        Token::Minus => (9, Op::Binary(BinaryOp::Sub)),
        Token::Star => (10, Op::Binary(BinaryOp::Mul)),
        Token::Slash => (10, Op::Binary(BinaryOp::Div)),
        Token::Percent => (10, Op::Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(entry)
}
