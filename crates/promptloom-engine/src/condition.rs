//! Safe evaluation of condition-node expressions.
//!
//! The original expression carries `{{var}}` placeholders. Each placeholder
//! is substituted as a quoted, escaped string literal of the variable's
//! value — even numeric values become string literals, a long-standing
//! behavior workflows depend on. The substituted expression is then parsed
//! by a small recursive-descent parser over literals, comparisons and
//! boolean connectives. There is no statement execution, no identifiers,
//! no function calls.
//!
//! Comparison is loose: when both operands are numeric (numbers or numeric
//! strings) they compare numerically, so `'3' > '5'` and `'3' > 5` behave
//! the way authors expect despite the string-literal substitution. Anything
//! else compares as strings, with numbers rendered in their literal form.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use promptloom_core::error::{LoomError, Result};
use promptloom_core::run::Variables;

use crate::template;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder regex is valid"))
}

/// Substitute placeholders as quoted, escaped string literals.
///
/// Missing variables leave the placeholder in place; the parser then rejects
/// the expression, so an unresolvable condition never silently evaluates.
pub fn substitute(expression: &str, context: &Variables) -> String {
    placeholder_re()
        .replace_all(expression, |caps: &Captures| {
            let path = caps[1].trim();
            match template::lookup(context, path) {
                Some(value) => {
                    let s = template::stringify(value);
                    format!("'{}'", escape(&s))
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '\'' | '"' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Substitute and evaluate a condition expression against the context.
pub fn evaluate(expression: &str, context: &Variables) -> Result<bool> {
    evaluate_expr(&substitute(expression, context))
}

/// Evaluate an already-substituted expression.
pub fn evaluate_expr(expression: &str) -> Result<bool> {
    let tokens = lex(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.or_expr()?;
    parser.expect_end()?;
    match value {
        ExprValue::Bool(b) => Ok(b),
        other => Err(LoomError::Evaluation(format!(
            "expression must evaluate to a boolean, got {}",
            other.type_name()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => break,
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => s.push(c),
                    }
                }
                if !closed {
                    return Err(LoomError::Evaluation("unterminated string literal".into()));
                }
                tokens.push(Token::Str(s));
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Eq);
                } else {
                    return Err(LoomError::Evaluation("assignment is not allowed; use ==".into()));
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_some() {
                    tokens.push(Token::And);
                } else {
                    return Err(LoomError::Evaluation("expected && operator".into()));
                }
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_some() {
                    tokens.push(Token::Or);
                } else {
                    return Err(LoomError::Evaluation("expected || operator".into()));
                }
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut num = String::new();
                if c == '-' {
                    num.push(c);
                    chars.next();
                }
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let parsed = num
                    .parse::<f64>()
                    .map_err(|_| LoomError::Evaluation(format!("invalid number: {}", num)))?;
                tokens.push(Token::Num(parsed));
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "null" => tokens.push(Token::Null),
                    other => {
                        // Bare identifiers are typically unresolved {{placeholders}}
                        // stripped of braces or typos; neither is evaluable.
                        return Err(LoomError::Evaluation(format!(
                            "unexpected identifier: {}",
                            other
                        )));
                    }
                }
            }
            other => {
                return Err(LoomError::Evaluation(format!("unexpected character: {}", other)));
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum ExprValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl ExprValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Num(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Null => "null",
        }
    }

    /// Numeric view for loose comparison: numbers directly, strings when
    /// they parse as a number.
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// String view for the ordering fallback: strings verbatim, numbers in
    /// their literal form. Booleans and null have no defined order.
    fn as_ordering_string(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Num(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn require_bool(self, op: &str) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(LoomError::Evaluation(format!(
                "{} requires boolean operands, got {}",
                op,
                other.type_name()
            ))),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_end(&self) -> Result<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(LoomError::Evaluation("trailing tokens after expression".into()))
        }
    }

    fn or_expr(&mut self) -> Result<ExprValue> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let right = self.and_expr()?;
            let l = left.require_bool("||")?;
            let r = right.require_bool("||")?;
            left = ExprValue::Bool(l || r);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<ExprValue> {
        let mut left = self.not_expr()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let right = self.not_expr()?;
            let l = left.require_bool("&&")?;
            let r = right.require_bool("&&")?;
            left = ExprValue::Bool(l && r);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<ExprValue> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.next();
            let value = self.not_expr()?;
            return Ok(ExprValue::Bool(!value.require_bool("!")?));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<ExprValue> {
        let left = self.primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.primary()?;

        let result = match op {
            Token::Eq => loose_eq(&left, &right),
            Token::Ne => !loose_eq(&left, &right),
            Token::Lt => loose_ord(&left, &right)? == std::cmp::Ordering::Less,
            Token::Le => loose_ord(&left, &right)? != std::cmp::Ordering::Greater,
            Token::Gt => loose_ord(&left, &right)? == std::cmp::Ordering::Greater,
            Token::Ge => loose_ord(&left, &right)? != std::cmp::Ordering::Less,
            _ => unreachable!(),
        };
        Ok(ExprValue::Bool(result))
    }

    fn primary(&mut self) -> Result<ExprValue> {
        match self.next() {
            Some(Token::Str(s)) => Ok(ExprValue::Str(s)),
            Some(Token::Num(n)) => Ok(ExprValue::Num(n)),
            Some(Token::Bool(b)) => Ok(ExprValue::Bool(b)),
            Some(Token::Null) => Ok(ExprValue::Null),
            Some(Token::LParen) => {
                let value = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(LoomError::Evaluation("missing closing parenthesis".into())),
                }
            }
            Some(token) => Err(LoomError::Evaluation(format!("unexpected token: {:?}", token))),
            None => Err(LoomError::Evaluation("unexpected end of expression".into())),
        }
    }
}

fn loose_eq(left: &ExprValue, right: &ExprValue) -> bool {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return l == r;
    }
    match (left, right) {
        (ExprValue::Str(l), ExprValue::Str(r)) => l == r,
        (ExprValue::Bool(l), ExprValue::Bool(r)) => l == r,
        (ExprValue::Null, ExprValue::Null) => true,
        _ => false,
    }
}

fn loose_ord(left: &ExprValue, right: &ExprValue) -> Result<std::cmp::Ordering> {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return l.partial_cmp(&r).ok_or_else(|| {
            LoomError::Evaluation("NaN is not comparable".into())
        });
    }
    // Not both numeric: compare as strings, numbers rendered in their
    // literal form.
    match (left.as_ordering_string(), right.as_ordering_string()) {
        (Some(l), Some(r)) => Ok(l.cmp(&r)),
        _ => Err(LoomError::Evaluation(format!(
            "cannot order {} against {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: serde_json::Value) -> Variables {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_substitution_always_quotes() {
        let ctx = context(json!({"x": "yes", "count": 3}));
        assert_eq!(substitute("{{x}} == 'yes'", &ctx), "'yes' == 'yes'");
        // Numeric values are substituted as string literals too
        assert_eq!(substitute("{{count}} > 5", &ctx), "'3' > 5");
    }

    #[test]
    fn test_substitution_escapes_quotes() {
        let ctx = context(json!({"x": "it's"}));
        assert_eq!(substitute("{{x}} == 'a'", &ctx), r"'it\'s' == 'a'");
        assert!(evaluate("{{x}} == 'a'", &ctx).is_ok());
    }

    #[test]
    fn test_equality() {
        let ctx = context(json!({"x": "yes"}));
        assert!(evaluate("{{x}} == 'yes'", &ctx).unwrap());
        assert!(!evaluate("{{x}} == 'no'", &ctx).unwrap());
        assert!(evaluate("{{x}} != 'no'", &ctx).unwrap());
    }

    #[test]
    fn test_numeric_string_comparison() {
        // The quoted-literal substitution makes '3' > 5; loose comparison
        // still orders numerically when both sides are numeric.
        let ctx = context(json!({"count": 3}));
        assert!(!evaluate("{{count}} > 5", &ctx).unwrap());
        assert!(evaluate("{{count}} < 5", &ctx).unwrap());
        assert!(evaluate("{{count}} == 3", &ctx).unwrap());
        assert!(evaluate("{{count}} >= 3", &ctx).unwrap());
    }

    #[test]
    fn test_boolean_connectives() {
        let ctx = context(json!({"a": "1", "b": "2"}));
        assert!(evaluate("{{a}} == 1 && {{b}} == 2", &ctx).unwrap());
        assert!(evaluate("{{a}} == 9 || {{b}} == 2", &ctx).unwrap());
        assert!(evaluate("!({{a}} == 9)", &ctx).unwrap());
        assert!(!evaluate("({{a}} == 1) && ({{b}} == 9)", &ctx).unwrap());
    }

    #[test]
    fn test_non_numeric_string_orders_against_number_as_string() {
        // 'abc' > 5: neither side pair is numeric, so the number renders as
        // "5" and the comparison is lexicographic — not an error.
        let ctx = context(json!({"count": "abc"}));
        assert!(evaluate("{{count}} > 5", &ctx).unwrap());
        assert!(!evaluate("{{count}} < 5", &ctx).unwrap());
    }

    #[test]
    fn test_string_ordering_is_lexicographic() {
        let ctx = context(json!({"a": "apple", "b": "banana"}));
        assert!(evaluate("{{a}} < {{b}}", &ctx).unwrap());
    }

    #[test]
    fn test_unresolved_placeholder_is_an_error() {
        let ctx = Variables::new();
        let err = evaluate("{{missing}} == 'x'", &ctx).unwrap_err();
        assert!(matches!(err, LoomError::Evaluation(_)));
    }

    #[test]
    fn test_malformed_expressions_rejected() {
        assert!(evaluate_expr("'a' ==").is_err());
        assert!(evaluate_expr("('a' == 'a'").is_err());
        assert!(evaluate_expr("'a' = 'a'").is_err());
        assert!(evaluate_expr("system('rm -rf /')").is_err());
        assert!(evaluate_expr("foo == 'bar'").is_err());
    }

    #[test]
    fn test_non_boolean_result_rejected() {
        assert!(evaluate_expr("'hello'").is_err());
        assert!(evaluate_expr("42").is_err());
        assert!(evaluate_expr("true").is_ok());
    }

    #[test]
    fn test_logical_ops_require_booleans() {
        assert!(evaluate_expr("'a' && true").is_err());
        assert!(evaluate_expr("!'a'").is_err());
    }
}
