//! Compiler and interpreter for validated expressions.
//!
//! Lowering turns the parsed tree into a resolved [`Node`] tree in which
//! every name is already bound to `t`, the sample rate, a math constant or a
//! builtin helper. Anything outside that table is an error, so the evaluator
//! has no way to reach capabilities beyond numeric arithmetic.

use crate::ast::{BinaryOp, Expr, ExprKind, LogicalOp, MemberProperty, UnaryOp};
use crate::error::CompileError;
use crate::token::Span;
use crate::validator::{analyze, ValidationIssue};

// ── Builtin environment ─────────────────────────────────────

/// Numeric helpers reachable bare (`sin(t)`) or through `Math.sin(t)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
    Atan2,
    Cbrt,
    Ceil,
    Clz32,
    Cos,
    Cosh,
    Exp,
    Expm1,
    Floor,
    Fround,
    Hypot,
    Imul,
    Int,
    Log,
    Log1p,
    Log10,
    Log2,
    Max,
    Min,
    Pow,
    Round,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
    Trunc,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("abs", Builtin::Abs),
    ("acos", Builtin::Acos),
    ("acosh", Builtin::Acosh),
    ("asin", Builtin::Asin),
    ("asinh", Builtin::Asinh),
    ("atan", Builtin::Atan),
    ("atanh", Builtin::Atanh),
    ("atan2", Builtin::Atan2),
    ("cbrt", Builtin::Cbrt),
    ("ceil", Builtin::Ceil),
    ("clz32", Builtin::Clz32),
    ("cos", Builtin::Cos),
    ("cosh", Builtin::Cosh),
    ("exp", Builtin::Exp),
    ("expm1", Builtin::Expm1),
    ("floor", Builtin::Floor),
    ("fround", Builtin::Fround),
    ("hypot", Builtin::Hypot),
    ("imul", Builtin::Imul),
    ("log", Builtin::Log),
    ("log1p", Builtin::Log1p),
    ("log10", Builtin::Log10),
    ("log2", Builtin::Log2),
    ("max", Builtin::Max),
    ("min", Builtin::Min),
    ("pow", Builtin::Pow),
    ("round", Builtin::Round),
    ("sign", Builtin::Sign),
    ("sin", Builtin::Sin),
    ("sinh", Builtin::Sinh),
    ("sqrt", Builtin::Sqrt),
    ("tan", Builtin::Tan),
    ("tanh", Builtin::Tanh),
    ("trunc", Builtin::Trunc),
];

const CONSTANTS: &[(&str, f64)] = &[
    ("E", std::f64::consts::E),
    ("LN2", std::f64::consts::LN_2),
    ("LN10", std::f64::consts::LN_10),
    ("LOG2E", std::f64::consts::LOG2_E),
    ("LOG10E", std::f64::consts::LOG10_E),
    ("PI", std::f64::consts::PI),
    ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ("SQRT2", std::f64::consts::SQRT_2),
];

fn lookup_builtin(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
}

fn lookup_constant(name: &str) -> Option<f64> {
    CONSTANTS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// `int` is a bare-name convenience only; `Math.int` does not exist.
fn lookup_bare_function(name: &str) -> Option<Builtin> {
    if name == "int" {
        Some(Builtin::Int)
    } else {
        lookup_builtin(name)
    }
}

impl Builtin {
    fn apply(self, args: &[f64]) -> f64 {
        let arg = |i: usize| args.get(i).copied().unwrap_or(f64::NAN);
        let x = arg(0);
        match self {
            Builtin::Abs => x.abs(),
            Builtin::Acos => x.acos(),
            Builtin::Acosh => x.acosh(),
            Builtin::Asin => x.asin(),
            Builtin::Asinh => x.asinh(),
            Builtin::Atan => x.atan(),
            Builtin::Atanh => x.atanh(),
            Builtin::Atan2 => x.atan2(arg(1)),
            Builtin::Cbrt => x.cbrt(),
            Builtin::Ceil => x.ceil(),
            Builtin::Clz32 => to_uint32(x).leading_zeros() as f64,
            Builtin::Cos => x.cos(),
            Builtin::Cosh => x.cosh(),
            Builtin::Exp => x.exp(),
            Builtin::Expm1 => x.exp_m1(),
            Builtin::Floor | Builtin::Int => x.floor(),
            Builtin::Fround => x as f32 as f64,
            Builtin::Hypot => hypot(args),
            Builtin::Imul => to_int32(x).wrapping_mul(to_int32(arg(1))) as f64,
            Builtin::Log => x.ln(),
            Builtin::Log1p => x.ln_1p(),
            Builtin::Log10 => x.log10(),
            Builtin::Log2 => x.log2(),
            Builtin::Max => args.iter().fold(f64::NEG_INFINITY, |acc, &v| {
                if acc.is_nan() || v.is_nan() { f64::NAN } else { acc.max(v) }
            }),
            Builtin::Min => args.iter().fold(f64::INFINITY, |acc, &v| {
                if acc.is_nan() || v.is_nan() { f64::NAN } else { acc.min(v) }
            }),
            Builtin::Pow => js_pow(x, arg(1)),
            Builtin::Round => js_round(x),
            Builtin::Sign => {
                if x.is_nan() || x == 0.0 {
                    x
                } else {
                    x.signum()
                }
            }
            Builtin::Sin => x.sin(),
            Builtin::Sinh => x.sinh(),
            Builtin::Sqrt => x.sqrt(),
            Builtin::Tan => x.tan(),
            Builtin::Tanh => x.tanh(),
            Builtin::Trunc => x.trunc(),
        }
    }
}

fn hypot(args: &[f64]) -> f64 {
    if args.iter().any(|v| v.is_infinite()) {
        return f64::INFINITY;
    }
    args.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// `Math.pow` / `**`: IEEE `pow` except that a NaN exponent, or `±1` raised
/// to an infinite power, is NaN.
pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exponent)
    }
}

/// `Math.round`: halves round toward +∞.
fn js_round(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let floor = x.floor();
    if x - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// ECMAScript ToInt32: truncate and wrap modulo 2^32. NaN and ±∞ map to 0.
pub fn to_int32(x: f64) -> i32 {
    to_uint32(x) as i32
}

/// ECMAScript ToUint32.
pub fn to_uint32(x: f64) -> u32 {
    if !x.is_finite() {
        return 0;
    }
    x.trunc().rem_euclid(4_294_967_296.0) as u32
}

// ── Resolved tree ───────────────────────────────────────────

/// An expression with every name resolved. Only produced by [`lower`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Time,
    SampleRate,
    Array(Vec<Node>),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Logical(LogicalOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Sequence(Vec<Node>),
    Call(Builtin, Vec<Node>),
    /// `value[index]`
    Index(Box<Node>, Box<Node>),
    /// `value.length`
    Length(Box<Node>),
    /// `"..."[index]`, string held as UTF-16 code units.
    StrIndex(Box<[u16]>, Box<Node>),
    /// `"...".charCodeAt(index)`
    CharCodeAt(Box<[u16]>, Option<Box<Node>>),
}

/// Resolve a parsed expression against the builtin environment, collecting
/// every allow-list violation.
pub(crate) fn lower(expr: &Expr) -> Result<Node, Vec<ValidationIssue>> {
    let mut lowering = Lowering { issues: Vec::new() };
    let node = lowering.expr(expr);
    if lowering.issues.is_empty() {
        Ok(node)
    } else {
        Err(lowering.issues)
    }
}

struct Lowering {
    issues: Vec<ValidationIssue>,
}

impl Lowering {
    /// Record an issue; the returned placeholder is never evaluated.
    fn reject(&mut self, message: String, span: Span) -> Node {
        self.issues.push(ValidationIssue::new(message, span));
        Node::Number(f64::NAN)
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Vec<Node> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: &Expr) -> Box<Node> {
        Box::new(self.expr(expr))
    }

    fn expr(&mut self, expr: &Expr) -> Node {
        match &expr.kind {
            ExprKind::Empty => Node::Number(0.0),
            ExprKind::Number(n) => Node::Number(*n),
            ExprKind::StringLit(_) => self.reject(
                "String literals are only supported as lookup tables".into(),
                expr.span,
            ),
            ExprKind::Identifier(name) => self.identifier(name, expr.span),
            ExprKind::Array(items) => Node::Array(self.exprs(items)),
            ExprKind::Unary { op, operand } => Node::Unary(*op, self.boxed(operand)),
            ExprKind::Binary { op, left, right } => {
                Node::Binary(*op, self.boxed(left), self.boxed(right))
            }
            ExprKind::Logical { op, left, right } => {
                Node::Logical(*op, self.boxed(left), self.boxed(right))
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => Node::Conditional(self.boxed(test), self.boxed(consequent), self.boxed(alternate)),
            ExprKind::Sequence(items) => Node::Sequence(self.exprs(items)),
            ExprKind::Call { callee, args } => self.call(expr, callee, args),
            ExprKind::Member { object, property } => self.member(expr, object, property),
        }
    }

    fn identifier(&mut self, name: &str, span: Span) -> Node {
        match name {
            "t" => Node::Time,
            "SR" => Node::SampleRate,
            "Math" => self.reject("Helper is not a value: Math".into(), span),
            _ => {
                if let Some(value) = lookup_constant(name) {
                    Node::Number(value)
                } else if lookup_bare_function(name).is_some() {
                    self.reject(format!("Helper is not a value: {name}"), span)
                } else {
                    self.reject(format!("Unknown identifier: {name}"), span)
                }
            }
        }
    }

    fn member(&mut self, expr: &Expr, object: &Expr, property: &MemberProperty) -> Node {
        match property {
            MemberProperty::Computed(index) => {
                if let ExprKind::StringLit(s) = &object.kind {
                    Node::StrIndex(s.encode_utf16().collect(), self.boxed(index))
                } else {
                    Node::Index(self.boxed(object), self.boxed(index))
                }
            }
            MemberProperty::Static { name, .. } => {
                if is_math(object) {
                    return match lookup_constant(name) {
                        Some(value) => Node::Number(value),
                        None if lookup_builtin(name).is_some() => {
                            self.reject(format!("Helper is not a value: Math.{name}"), expr.span)
                        }
                        None => self.reject(format!("Unknown Math member: {name}"), expr.span),
                    };
                }
                match (name.as_str(), &object.kind) {
                    ("length", ExprKind::StringLit(s)) => {
                        Node::Number(s.encode_utf16().count() as f64)
                    }
                    ("length", _) => Node::Length(self.boxed(object)),
                    _ => self.reject(format!("Unsupported property access: {name}"), expr.span),
                }
            }
        }
    }

    fn call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> Node {
        match &callee.kind {
            ExprKind::Identifier(name) => match lookup_bare_function(name) {
                Some(builtin) => Node::Call(builtin, self.exprs(args)),
                None => {
                    let callable_name = name == "t"
                        || name == "SR"
                        || name == "Math"
                        || lookup_constant(name).is_some();
                    let node = if callable_name {
                        self.reject(format!("Not a function: {name}"), callee.span)
                    } else {
                        self.reject(format!("Unknown identifier: {name}"), callee.span)
                    };
                    self.exprs(args);
                    node
                }
            },
            ExprKind::Member {
                object,
                property: MemberProperty::Static { name, .. },
            } => {
                if is_math(object) {
                    return match lookup_builtin(name) {
                        Some(builtin) => Node::Call(builtin, self.exprs(args)),
                        None if lookup_constant(name).is_some() => {
                            self.reject(format!("Not a function: Math.{name}"), callee.span)
                        }
                        None => self.reject(format!("Unknown Math member: {name}"), callee.span),
                    };
                }
                match (&object.kind, name.as_str()) {
                    (ExprKind::StringLit(s), "charCodeAt") => {
                        let mut args = self.exprs(args).into_iter();
                        let index = args.next().map(Box::new);
                        Node::CharCodeAt(s.encode_utf16().collect(), index)
                    }
                    _ => {
                        let before = self.issues.len();
                        let node = self.expr(callee);
                        self.exprs(args);
                        if self.issues.len() == before {
                            self.reject(format!("Not a function: {name}"), callee.span)
                        } else {
                            node
                        }
                    }
                }
            }
            _ => {
                self.expr(callee);
                self.exprs(args);
                self.reject("Expression is not callable".into(), expr.span)
            }
        }
    }
}

fn is_math(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Identifier(name) if name == "Math")
}

// ── Evaluation ──────────────────────────────────────────────

/// Runtime value. Booleans are represented as `1` / `0`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Array(Vec<Value>),
    Undefined,
}

impl Value {
    /// ECMAScript ToNumber for the supported value kinds.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Undefined => f64::NAN,
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Array(_) => true,
            Value::Undefined => false,
        }
    }

    fn bool(b: bool) -> Value {
        Value::Number(if b { 1.0 } else { 0.0 })
    }
}

/// What one evaluation of the expression produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Mono(f64),
    Stereo(f64, f64),
}

impl Frame {
    /// A single number is mono, a two-element array is stereo, anything else
    /// counts as `0`.
    pub fn from_value(value: &Value) -> Frame {
        match value {
            Value::Number(n) => Frame::Mono(*n),
            Value::Array(items) if items.len() == 2 => {
                Frame::Stereo(items[0].to_number(), items[1].to_number())
            }
            _ => Frame::Mono(0.0),
        }
    }

    pub fn channels(self) -> (f64, f64) {
        match self {
            Frame::Mono(v) => (v, v),
            Frame::Stereo(l, r) => (l, r),
        }
    }

    pub fn is_finite(self) -> bool {
        let (l, r) = self.channels();
        l.is_finite() && r.is_finite()
    }
}

/// A compiled, pure per-sample function.
///
/// Holds no interior mutability: evaluating the same `t` always yields the
/// same frame, and one evaluator may be shared across threads.
#[derive(Debug, Clone)]
pub struct Evaluator {
    root: Node,
    sample_rate: u32,
}

/// Compile `source` for rendering at `sample_rate`.
///
/// The source is validated first; invalid source is returned as
/// [`CompileError::Invalid`] and never evaluated.
pub fn compile(source: &str, sample_rate: u32) -> Result<Evaluator, CompileError> {
    let (result, node) = analyze(source);
    match node {
        Some(root) if result.valid => {
            log::debug!("compiled expression ({} chars) at {sample_rate} Hz", source.len());
            Ok(Evaluator { root, sample_rate })
        }
        _ => Err(CompileError::Invalid(result)),
    }
}

impl Evaluator {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Evaluate the expression at sample index `t`.
    pub fn eval(&self, t: u64) -> Frame {
        let value = self.eval_node(&self.root, t as f64);
        Frame::from_value(&value)
    }

    fn eval_node(&self, node: &Node, t: f64) -> Value {
        match node {
            Node::Number(n) => Value::Number(*n),
            Node::Time => Value::Number(t),
            Node::SampleRate => Value::Number(self.sample_rate as f64),
            Node::Array(items) => Value::Array(items.iter().map(|n| self.eval_node(n, t)).collect()),
            Node::Unary(op, operand) => {
                let v = self.eval_node(operand, t);
                match op {
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Not => Value::bool(!v.is_truthy()),
                    UnaryOp::BitNot => Value::Number(!to_int32(v.to_number()) as f64),
                }
            }
            Node::Binary(op, left, right) => {
                let l = self.eval_node(left, t);
                let r = self.eval_node(right, t);
                binary(*op, &l, &r)
            }
            Node::Logical(op, left, right) => {
                let l = self.eval_node(left, t);
                let take_left = match op {
                    LogicalOp::And => !l.is_truthy(),
                    LogicalOp::Or => l.is_truthy(),
                    LogicalOp::Nullish => !matches!(l, Value::Undefined),
                };
                if take_left { l } else { self.eval_node(right, t) }
            }
            Node::Conditional(test, consequent, alternate) => {
                if self.eval_node(test, t).is_truthy() {
                    self.eval_node(consequent, t)
                } else {
                    self.eval_node(alternate, t)
                }
            }
            Node::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval_node(item, t);
                }
                last
            }
            Node::Call(builtin, args) => {
                let args: Vec<f64> = args.iter().map(|a| self.eval_node(a, t).to_number()).collect();
                Value::Number(builtin.apply(&args))
            }
            Node::Index(object, index) => {
                let object = self.eval_node(object, t);
                let index = self.eval_node(index, t).to_number();
                match (object, array_index(index)) {
                    (Value::Array(mut items), Some(i)) if i < items.len() => items.swap_remove(i),
                    _ => Value::Undefined,
                }
            }
            Node::Length(object) => match self.eval_node(object, t) {
                Value::Array(items) => Value::Number(items.len() as f64),
                _ => Value::Undefined,
            },
            Node::StrIndex(units, index) => {
                let index = self.eval_node(index, t).to_number();
                match array_index(index).and_then(|i| units.get(i)) {
                    Some(&unit) => Value::Number(code_unit_to_number(unit)),
                    None => Value::Undefined,
                }
            }
            Node::CharCodeAt(units, index) => {
                let index = match index {
                    Some(node) => self.eval_node(node, t).to_number(),
                    None => 0.0,
                };
                // ToIntegerOrInfinity: NaN becomes 0, fractions truncate.
                let index = if index.is_nan() { 0.0 } else { index.trunc() };
                if index >= 0.0 && index < units.len() as f64 {
                    Value::Number(units[index as usize] as f64)
                } else {
                    Value::Number(f64::NAN)
                }
            }
        }
    }
}

/// `==` / `===`. Only `undefined` equals `undefined`; everything else
/// compares numerically.
fn loosely_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Undefined, _) | (_, Value::Undefined) => false,
        _ => l.to_number() == r.to_number(),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    let a = l.to_number();
    let b = r.to_number();
    let n = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Pow => js_pow(a, b),
        BinaryOp::BitAnd => (to_int32(a) & to_int32(b)) as f64,
        BinaryOp::BitOr => (to_int32(a) | to_int32(b)) as f64,
        BinaryOp::BitXor => (to_int32(a) ^ to_int32(b)) as f64,
        BinaryOp::Shl => to_int32(a).wrapping_shl(to_uint32(b) & 31) as f64,
        BinaryOp::Shr => (to_int32(a) >> (to_uint32(b) & 31)) as f64,
        BinaryOp::UShr => (to_uint32(a) >> (to_uint32(b) & 31)) as f64,
        BinaryOp::Lt => return Value::bool(a < b),
        BinaryOp::Gt => return Value::bool(a > b),
        BinaryOp::LtEq => return Value::bool(a <= b),
        BinaryOp::GtEq => return Value::bool(a >= b),
        BinaryOp::Eq => return Value::bool(loosely_equal(l, r)),
        BinaryOp::NotEq => return Value::bool(!loosely_equal(l, r)),
    };
    Value::Number(n)
}

/// Canonical non-negative integer index, as used for array element lookup.
fn array_index(index: f64) -> Option<usize> {
    if index >= 0.0 && index.fract() == 0.0 && index < usize::MAX as f64 {
        Some(index as usize)
    } else {
        None
    }
}

/// ToNumber of a one-character string: digits map to their value,
/// whitespace to 0, anything else to NaN.
fn code_unit_to_number(unit: u16) -> f64 {
    match char::from_u32(unit as u32) {
        Some(c) if c.is_ascii_digit() => (c as u8 - b'0') as f64,
        Some(c) if c.is_whitespace() => 0.0,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_at(source: &str, t: u64) -> Frame {
        compile(source, 8000).unwrap().eval(t)
    }

    fn mono(source: &str, t: u64) -> f64 {
        match eval_at(source, t) {
            Frame::Mono(v) => v,
            other => panic!("Expected mono, got {other:?}"),
        }
    }

    #[test]
    fn evaluates_time_and_arithmetic() {
        assert_eq!(mono("t", 42), 42.0);
        assert_eq!(mono("t * 2 + 1", 5), 11.0);
        assert_eq!(mono("7 % 3", 0), 1.0);
        assert_eq!(mono("-7 % 3", 0), -1.0);
        assert_eq!(mono("2 ** 10", 0), 1024.0);
        assert_eq!(mono("1, 2, t", 9), 9.0);
    }

    #[test]
    fn empty_source_is_zero() {
        assert_eq!(mono("", 100), 0.0);
        assert_eq!(mono("  ", 100), 0.0);
    }

    #[test]
    fn bitwise_ops_follow_int32_semantics() {
        assert_eq!(mono("t & 0xFF", 300), 44.0);
        assert_eq!(mono("t >> 4", 256), 16.0);
        assert_eq!(mono("-1 >>> 28", 0), 15.0);
        assert_eq!(mono("1 << 31", 0), -2147483648.0);
        assert_eq!(mono("1 << 33", 0), 2.0);
        assert_eq!(mono("~5", 0), -6.0);
        assert_eq!(mono("4294967297 | 0", 0), 1.0);
        assert_eq!(mono("(0/0) | 0", 0), 0.0);
        assert_eq!(mono("2.9 ^ 0", 0), 2.0);
        assert_eq!(mono("-2.9 | 0", 0), -2.0);
    }

    #[test]
    fn classic_bytebeat() {
        // t*(42&t>>10) at t = 5000: 5000>>10 = 4, 42&4 = 0
        assert_eq!(mono("t*(42&t>>10)", 5000), 0.0);
        // t = 2048: 2048>>10 = 2, 42&2 = 2
        assert_eq!(mono("t*(42&t>>10)", 2048), 4096.0);
    }

    #[test]
    fn comparisons_and_logic_produce_numbers() {
        assert_eq!(mono("t > 3", 4), 1.0);
        assert_eq!(mono("t > 3", 2), 0.0);
        assert_eq!(mono("t == 4 && 9", 4), 9.0);
        assert_eq!(mono("0 || t", 6), 6.0);
        assert_eq!(mono("!t", 0), 1.0);
        assert_eq!(mono("t ? 1 : 2", 0), 2.0);
        assert_eq!(mono("[1][5] ?? 3", 0), 3.0);
        assert_eq!(mono("0 ?? 3", 0), 0.0);
        assert_eq!(mono("[1][5] == [2][7]", 0), 1.0);
    }

    #[test]
    fn math_helpers_bare_and_namespaced() {
        assert_eq!(mono("sin(0)", 0), 0.0);
        assert_eq!(mono("Math.sin(0)", 0), 0.0);
        assert_eq!(mono("PI", 0), std::f64::consts::PI);
        assert_eq!(mono("Math.PI", 0), std::f64::consts::PI);
        assert_eq!(mono("int(3.7)", 0), 3.0);
        assert_eq!(mono("int(-3.2)", 0), -4.0);
        assert_eq!(mono("max(1, 5, 3)", 0), 5.0);
        assert_eq!(mono("min()", 0), f64::INFINITY);
        assert!(mono("max(1, 0/0)", 0).is_nan());
        assert_eq!(mono("round(2.5)", 0), 3.0);
        assert_eq!(mono("round(-2.5)", 0), -2.0);
        assert_eq!(mono("sign(-3)", 0), -1.0);
        assert_eq!(mono("clz32(1)", 0), 31.0);
        assert_eq!(mono("imul(65536, 65536)", 0), 0.0);
        assert_eq!(mono("hypot(3, 4)", 0), 5.0);
        assert!(mono("sqrt()", 0).is_nan());
        assert!(mono("pow(1, 1/0)", 0).is_nan());
    }

    #[test]
    fn sample_rate_is_bound() {
        assert_eq!(compile("SR", 44100).unwrap().eval(0), Frame::Mono(44100.0));
        assert_eq!(compile("t / SR", 8000).unwrap().eval(4000), Frame::Mono(0.5));
    }

    #[test]
    fn arrays_give_stereo_frames() {
        assert_eq!(eval_at("[t, -t]", 3), Frame::Stereo(3.0, -3.0));
        assert_eq!(eval_at("[[2], []]", 0), Frame::Stereo(2.0, 0.0));
        assert_eq!(eval_at("[1, 2, 3]", 0), Frame::Mono(0.0));
        assert_eq!(eval_at("[1, 2, 3][t % 3]", 4), Frame::Mono(2.0));
        assert_eq!(eval_at("[1, 2, 3].length", 0), Frame::Mono(3.0));
        assert_eq!(eval_at("[1, 2][1.5]", 0), Frame::Mono(0.0));
        assert_eq!(eval_at("[7] * 2", 0), Frame::Mono(14.0));
    }

    #[test]
    fn string_lookup_tables() {
        assert_eq!(mono("\"36364689\"[t]", 1), 6.0);
        assert!(mono("'ab'[0]", 0).is_nan());
        assert_eq!(mono("'abc'.length", 0), 3.0);
        assert_eq!(mono("'abc'.charCodeAt(t)", 1), 98.0);
        assert_eq!(mono("'abc'.charCodeAt()", 0), 97.0);
        assert!(mono("'abc'.charCodeAt(9)", 0).is_nan());
        assert_eq!(eval_at("'abc'[9]", 0), Frame::Mono(0.0));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let evaluator = compile("sin(t / 10) * (t >> 3 & 7) + [t % 5][0]", 8000).unwrap();
        for t in [0u64, 1, 255, 256, 99_999, 13_000_000] {
            let first = evaluator.eval(t);
            for _ in 0..3 {
                let again = evaluator.eval(t);
                let (a, b) = (first.channels(), again.channels());
                assert_eq!(a.0.to_bits(), b.0.to_bits());
                assert_eq!(a.1.to_bits(), b.1.to_bits());
            }
        }
    }

    #[test]
    fn compile_refuses_invalid_source() {
        match compile("eval('t')", 8000) {
            Err(CompileError::Invalid(result)) => {
                assert!(!result.valid);
                assert_eq!(result.issues[0].message, "Dangerous function call: eval");
            }
            other => panic!("Expected Invalid, got {other:?}"),
        }
        assert!(compile("t +", 8000).is_err());
        assert!(compile("foo(t)", 8000).is_err());
    }

    #[test]
    fn int32_conversion() {
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(to_int32(2147483648.0), -2147483648);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_uint32(-1.0), 4294967295);
    }

    #[test]
    fn evaluator_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Evaluator>();
    }
}
