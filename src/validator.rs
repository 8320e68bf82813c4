//! Static validation of untrusted expressions.
//!
//! Validation runs in three stages: a single-expression parse, a denylist
//! walk that names well-known escape routes, and the allow-list resolution
//! performed by the compiler's lowering pass. Only source that passes all
//! three can ever reach the evaluator.

use ariadne::{Config, Label, Report, ReportKind, Source};
use serde::{Deserialize, Serialize};

use crate::ast::{Expr, ExprKind, MemberProperty};
use crate::compiler::{self, Node};
use crate::token::Span;

const DANGEROUS_CALLS: &[&str] = &["eval", "Function"];
const DANGEROUS_PROPERTIES: &[&str] = &["constructor", "prototype", "__proto__"];

/// One positioned problem. Offsets are UTF-16 code units into the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    pub start: usize,
    pub end: usize,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        ValidationIssue {
            message: message.into(),
            start: span.start,
            // Zero-width spans (end of input) still need one unit to highlight.
            end: span.end.max(span.start + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        ValidationResult {
            valid: issues.is_empty(),
            issues,
        }
    }

    /// The issue callers display first, if any.
    pub fn first_issue(&self) -> Option<&ValidationIssue> {
        self.issues.first()
    }
}

/// Validate `source` as a single bytebeat expression.
pub fn validate(source: &str) -> ValidationResult {
    analyze(source).0
}

/// Validate and, when valid, return the resolved tree ready for evaluation.
pub(crate) fn analyze(source: &str) -> (ValidationResult, Option<Node>) {
    let expr = match crate::parse(source) {
        Ok(expr) => expr,
        Err(e) => {
            let start = e.pos();
            log::trace!("parse error at {start}: {e}");
            let issue = ValidationIssue {
                message: format!("Parse error: {e}"),
                start,
                end: start + 1,
            };
            return (ValidationResult::from_issues(vec![issue]), None);
        }
    };

    let mut issues = Vec::new();
    check_denylist(&expr, &mut issues);
    if !issues.is_empty() {
        log::debug!("expression rejected by denylist: {}", issues[0].message);
        return (ValidationResult::from_issues(issues), None);
    }

    match compiler::lower(&expr) {
        Ok(node) => (ValidationResult::from_issues(Vec::new()), Some(node)),
        Err(issues) => (ValidationResult::from_issues(issues), None),
    }
}

/// Walk every node, recording calls and property accesses that are known
/// sandbox escape routes.
fn check_denylist(expr: &Expr, issues: &mut Vec<ValidationIssue>) {
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            if let ExprKind::Identifier(name) = &callee.kind {
                if DANGEROUS_CALLS.contains(&name.as_str()) {
                    issues.push(ValidationIssue::new(
                        format!("Dangerous function call: {name}"),
                        expr.span,
                    ));
                }
            }
            check_denylist(callee, issues);
            for arg in args {
                check_denylist(arg, issues);
            }
        }
        ExprKind::Member { object, property } => {
            match property {
                MemberProperty::Static { name, .. } => {
                    if DANGEROUS_PROPERTIES.contains(&name.as_str()) {
                        issues.push(ValidationIssue::new(
                            format!("Dangerous property access: {name}"),
                            expr.span,
                        ));
                    }
                }
                MemberProperty::Computed(index) => {
                    if let ExprKind::StringLit(name) = &index.kind {
                        if DANGEROUS_PROPERTIES.contains(&name.as_str()) {
                            issues.push(ValidationIssue::new(
                                format!("Dangerous property access: {name}"),
                                expr.span,
                            ));
                        }
                    }
                    check_denylist(index, issues);
                }
            }
            check_denylist(object, issues);
        }
        _ => {
            for child in expr.children() {
                check_denylist(child, issues);
            }
        }
    }
}

/// Render issues as a plain-text, caret-annotated report for logs and CLIs.
pub fn report(source: &str, result: &ValidationResult) -> String {
    let char_len = source.chars().count();
    let mut out = Vec::new();
    for issue in &result.issues {
        let end = utf16_to_char_index(source, issue.end).min(char_len);
        let mut start = utf16_to_char_index(source, issue.start).min(end);
        if start == end {
            // End-of-input errors point past the last char; blame the last one.
            start = start.saturating_sub(1);
        }
        let mut builder = Report::build(ReportKind::Error, start..end)
            .with_config(Config::default().with_color(false))
            .with_message(&issue.message);
        if start < end {
            builder = builder.with_label(Label::new(start..end).with_message(&issue.message));
        }
        let written = builder.finish().write(Source::from(source), &mut out);
        if let Err(e) = written {
            log::warn!("failed to render diagnostic: {e}");
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Map a UTF-16 offset to the index of the first char starting at or after it.
fn utf16_to_char_index(source: &str, utf16: usize) -> usize {
    let mut units = 0;
    for (idx, ch) in source.chars().enumerate() {
        if units >= utf16 {
            return idx;
        }
        units += ch.len_utf16();
    }
    source.chars().count() + utf16.saturating_sub(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(source: &str) {
        let result = validate(source);
        assert!(result.valid, "{source:?} should be valid: {:?}", result.issues);
        assert!(result.issues.is_empty());
    }

    fn assert_invalid(source: &str) -> ValidationResult {
        let result = validate(source);
        assert!(!result.valid, "{source:?} should be invalid");
        assert!(!result.issues.is_empty(), "{source:?} should carry an issue");
        result
    }

    #[test]
    fn accepts_basic_expressions() {
        assert_valid("t");
        assert_valid("Math.sin(t)");
        assert_valid("sin(t)");
        assert_valid("t*(42&t>>10)");
        assert_valid("(t>>4|t>>8)*SR/8000");
        assert_valid("[t, t>>1]");
        assert_valid("\"36364689\"[t>>13&7]*t");
        assert_valid("int(t/PI) + Math.floor(t / Math.E)");
        assert_valid("");
        assert_valid("   ");
    }

    #[test]
    fn rejects_dangerous_calls() {
        let result = assert_invalid("eval(\"t\")");
        assert_eq!(result.issues[0].message, "Dangerous function call: eval");
        assert_eq!((result.issues[0].start, result.issues[0].end), (0, 9));

        let result = assert_invalid("Function(\"return t\")");
        assert_eq!(result.issues[0].message, "Dangerous function call: Function");
    }

    #[test]
    fn rejects_dangerous_properties() {
        let result = assert_invalid("Math.constructor");
        assert_eq!(result.issues[0].message, "Dangerous property access: constructor");
        assert_eq!((result.issues[0].start, result.issues[0].end), (0, 16));

        let result = assert_invalid("t + [].__proto__.prototype");
        let messages: Vec<_> = result.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Dangerous property access: prototype", "Dangerous property access: __proto__"]
        );

        let result = assert_invalid("[]['constructor']");
        assert_eq!(result.issues[0].message, "Dangerous property access: constructor");
    }

    #[test]
    fn denylist_walks_into_arguments_and_indices() {
        let result = assert_invalid("sin(t + eval(1))");
        assert_eq!(result.issues[0].message, "Dangerous function call: eval");
        assert_eq!((result.issues[0].start, result.issues[0].end), (8, 15));

        let result = assert_invalid("[1][Math.constructor]");
        assert_eq!(result.issues.len(), 1);
        assert_eq!((result.issues[0].start, result.issues[0].end), (4, 20));
    }

    #[test]
    fn rejects_statement_forms() {
        for source in ["var x = t", "let x = 0", "if (t>0) t; else t+1", "t; t", "while(1) t"] {
            let result = assert_invalid(source);
            assert_eq!(result.issues.len(), 1);
            assert!(result.issues[0].message.starts_with("Parse error: "));
        }
    }

    #[test]
    fn parse_error_is_positioned() {
        let result = assert_invalid("t +");
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert!(issue.message.to_lowercase().contains("parse error"));
        assert!(issue.end > issue.start);
        assert_eq!(issue.start, 3);
        assert_eq!(issue.end, 4);
    }

    #[test]
    fn long_chains_are_rejected_without_overflowing() {
        let sum = format!("t{}", "+t".repeat(10_000));
        let result = assert_invalid(&sum);
        assert_eq!(result.issues.len(), 1);
        let issue = result.first_issue().unwrap();
        assert_eq!(issue.message, "Parse error: Expression nested too deeply");
        // The 128th `+` pushes the tree past its limit; blame the operand after it.
        assert_eq!(issue.start, 256);

        let index = format!("[1]{}", "[0]".repeat(100_000));
        assert_eq!(
            assert_invalid(&index).first_issue().unwrap().message,
            "Parse error: Expression nested too deeply"
        );

        assert_valid(&format!("t{}", "+t".repeat(100)));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let result = assert_invalid("t + 1 !!!");
        assert_eq!(result.issues[0].message, "Parse error: Unexpected token");
        assert_eq!(result.issues[0].start, 6);
    }

    #[test]
    fn rejects_names_outside_the_allow_list() {
        let result = assert_invalid("t + window");
        assert_eq!(result.issues[0].message, "Unknown identifier: window");
        assert_eq!((result.issues[0].start, result.issues[0].end), (4, 10));

        let result = assert_invalid("Math.random()");
        assert_eq!(result.issues[0].message, "Unknown Math member: random");

        let result = assert_invalid("t.toString()");
        assert_eq!(result.issues[0].message, "Unsupported property access: toString");

        let result = assert_invalid("\"abc\" + t");
        assert_eq!(result.issues[0].message, "String literals are only supported as lookup tables");

        let result = assert_invalid("sin + 1");
        assert_eq!(result.issues[0].message, "Helper is not a value: sin");

        let result = assert_invalid("t(1)");
        assert_eq!(result.issues[0].message, "Not a function: t");
    }

    #[test]
    fn collects_every_allow_list_issue() {
        let result = assert_invalid("a + b");
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[1].message, "Unknown identifier: b");
    }

    #[test]
    fn offsets_are_utf16_units() {
        // '𝄞' is two UTF-16 code units.
        let result = assert_invalid("'𝄞'.length + x");
        assert_eq!((result.issues[0].start, result.issues[0].end), (14, 15));
    }

    #[test]
    fn validation_result_serializes_for_the_editor() {
        let json = serde_json::to_value(validate("t +")).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["issues"][0]["start"], 3);
        assert_eq!(json["issues"][0]["end"], 4);
    }

    #[test]
    fn report_mentions_each_issue() {
        let source = "a + eval(t)";
        let result = validate(source);
        let text = report(source, &result);
        assert!(text.contains("Dangerous function call: eval"), "{text}");

        let source = "t +";
        let text = report(source, &validate(source));
        assert!(text.contains("Parse error"), "{text}");
    }

    #[test]
    fn utf16_offsets_map_to_char_indices() {
        assert_eq!(utf16_to_char_index("a𝄞b", 0), 0);
        assert_eq!(utf16_to_char_index("a𝄞b", 1), 1);
        assert_eq!(utf16_to_char_index("a𝄞b", 3), 2);
        assert_eq!(utf16_to_char_index("a𝄞b", 4), 3);
        assert_eq!(utf16_to_char_index("a𝄞b", 5), 4);
    }
}
