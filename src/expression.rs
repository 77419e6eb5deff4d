//! Compiler for free-form targeting expressions.
//!
//! Expressions are JavaScript-flavoured boolean formulas over the visitor, which is bound to `_`:
//!
//! ```text
//! _.geo === "US" && _.page in ["buy", "index"]
//! !(_.page === "home" || _["page"] === "about")
//! ```
//!
//! Supported: `||`, `&&`, `!`, parentheses, `===`, `!==`, `==`, `!=`, `<operand> in [...]`,
//! string, number, `true`, `false`, `null` and `undefined` literals. A bare operand is tested for
//! truthiness.
//!
//! An attribute missing from the visitor is `undefined`, one set to null is `null`. As in
//! JavaScript they are loosely equal (`==`) but not strictly equal (`===`).
//!
//! Nesting of parentheses and `!` is limited to [`MAX_DEPTH`] levels.

use std::sync::OnceLock;

use regex::Regex;

use crate::{AttributeValue, Error, Result, Visitor};

/// Deepest nesting of parentheses and `!` accepted by [`compile`].
pub(crate) const MAX_DEPTH: usize = 256;

/// A compiled targeting expression.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    root: Expr,
    features: Vec<String>,
}

impl CompiledExpression {
    /// Evaluate the expression against `visitor`.
    pub fn is_match(&self, visitor: &Visitor) -> bool {
        self.root.test(visitor)
    }

    /// Features referenced by the expression, in order of first appearance.
    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(String::as_str)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl PartialEq for CompiledExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Compile `expression`.
///
/// ```
/// # use pickpick::compile;
/// let expression = compile(r#"_.page in ["buy", "index"]"#).unwrap();
/// assert_eq!(expression.features().collect::<Vec<_>>(), ["page"]);
/// ```
pub fn compile(expression: &str) -> Result<CompiledExpression> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: expression.len(),
        depth: 0,
        features: Vec::new(),
    };
    let root = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(syntax_error(token.position, "unexpected trailing input"));
    }
    Ok(CompiledExpression {
        source: expression.to_owned(),
        root,
        features: parser.features,
    })
}

#[derive(Debug, Clone)]
enum Expr {
    /// `None` is `undefined`.
    Literal(Option<AttributeValue>),
    Attribute(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Equals {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        strict: bool,
        negated: bool,
    },
    In {
        operand: Box<Expr>,
        list: Vec<Option<AttributeValue>>,
    },
}

impl Expr {
    fn test(&self, visitor: &Visitor) -> bool {
        match self {
            Expr::Literal(_) | Expr::Attribute(_) => self
                .value(visitor)
                .is_some_and(|value| value.is_truthy()),
            Expr::Not(inner) => !inner.test(visitor),
            Expr::And(terms) => terms.iter().all(|term| term.test(visitor)),
            Expr::Or(terms) => terms.iter().any(|term| term.test(visitor)),
            Expr::Equals {
                lhs,
                rhs,
                strict,
                negated,
            } => {
                let lhs = lhs.value(visitor);
                let rhs = rhs.value(visitor);
                let equal = if *strict {
                    lhs == rhs
                } else {
                    loose_equals(lhs.as_ref(), rhs.as_ref())
                };
                equal != *negated
            }
            Expr::In { operand, list } => list.contains(&operand.value(visitor)),
        }
    }

    /// Value of an operand. `None` stands for `undefined`, a missing attribute.
    fn value(&self, visitor: &Visitor) -> Option<AttributeValue> {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Attribute(feature) => visitor.get(feature).cloned(),
            other => Some(AttributeValue::Boolean(other.test(visitor))),
        }
    }
}

fn loose_equals(lhs: Option<&AttributeValue>, rhs: Option<&AttributeValue>) -> bool {
    fn as_number(value: &AttributeValue) -> Option<f64> {
        match value {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::String(s) if s.trim().is_empty() => Some(0.0),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null => None,
        }
    }

    let nullish = |value: Option<&AttributeValue>| value.map_or(true, AttributeValue::is_null);

    if nullish(lhs) || nullish(rhs) {
        return nullish(lhs) && nullish(rhs);
    }
    match (lhs, rhs) {
        (Some(AttributeValue::String(a)), Some(AttributeValue::String(b))) => a == b,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Punct(&'static str),
    Str(String),
    Num(f64),
    Ident(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

const PUNCTUATION: [&str; 12] = [
    "===", "!==", "==", "!=", "&&", "||", "!", "(", ")", "[", "]", ",",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"^(?:(?P<punct>===|!==|==|!=|&&|\|\||[!()\[\],.])|(?P<str>"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')|(?P<num>-?[0-9]+(?:\.[0-9]+)?)|(?P<ident>[A-Za-z_$][A-Za-z0-9_$]*))"#,
        )
        .expect("token pattern is valid")
    })
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let pattern = token_pattern();
    let mut tokens = Vec::new();
    let mut position = 0;

    loop {
        let rest = &source[position..];
        let trimmed = rest.trim_start();
        position += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return Ok(tokens);
        }

        let captures = pattern
            .captures(trimmed)
            .ok_or_else(|| syntax_error(position, "unexpected character"))?;
        let (kind, len) = if let Some(m) = captures.name("punct") {
            let punct = match m.as_str() {
                "." => ".",
                text => PUNCTUATION
                    .into_iter()
                    .find(|p| *p == text)
                    .ok_or_else(|| syntax_error(position, "unexpected character"))?,
            };
            (TokenKind::Punct(punct), m.len())
        } else if let Some(m) = captures.name("str") {
            (TokenKind::Str(unquote(m.as_str())), m.len())
        } else if let Some(m) = captures.name("num") {
            let n = m
                .as_str()
                .parse()
                .map_err(|_| syntax_error(position, "invalid number"))?;
            (TokenKind::Num(n), m.len())
        } else if let Some(m) = captures.name("ident") {
            (TokenKind::Ident(m.as_str().to_owned()), m.len())
        } else {
            return Err(syntax_error(position, "unexpected character"));
        };

        tokens.push(Token { kind, position });
        position += len;
    }
}

fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => result.push(other),
            None => {}
        }
    }
    result
}

fn syntax_error(position: usize, message: impl Into<String>) -> Error {
    Error::Expression {
        position,
        message: message.into(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Position reported for errors at the end of input.
    end: usize,
    /// Current nesting of parentheses and `!`.
    depth: usize,
    features: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.index)
            .cloned()
            .ok_or_else(|| syntax_error(self.end, "unexpected end of expression"))?;
        self.index += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token { kind: TokenKind::Punct(p), .. }) if *p == punct) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<()> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Punct(p) if p == punct => Ok(()),
            _ => Err(syntax_error(token.position, format!("expected `{punct}`"))),
        }
    }

    /// Enter one nesting level at `position`, failing past [`MAX_DEPTH`].
    fn descend(&mut self, position: usize) -> Result<()> {
        if self.depth == MAX_DEPTH {
            return Err(syntax_error(position, "expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_and()?];
        while self.eat("||") {
            terms.push(self.parse_and()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Expr::Or(terms),
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat("&&") {
            terms.push(self.parse_unary()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Expr::And(terms),
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let Some(position) = self.peek().map(|token| token.position) else {
            return self.parse_comparison();
        };
        if !self.eat("!") {
            return self.parse_comparison();
        }
        self.descend(position)?;
        let inner = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Not(Box::new(inner)))
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;

        for (punct, strict, negated) in [
            ("===", true, false),
            ("!==", true, true),
            ("==", false, false),
            ("!=", false, true),
        ] {
            if self.eat(punct) {
                let rhs = self.parse_primary()?;
                return Ok(Expr::Equals {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    strict,
                    negated,
                });
            }
        }

        if matches!(self.peek(), Some(Token { kind: TokenKind::Ident(word), .. }) if word == "in") {
            self.index += 1;
            let list = self.parse_list()?;
            return Ok(Expr::In {
                operand: Box::new(lhs),
                list,
            });
        }

        Ok(lhs)
    }

    fn parse_list(&mut self) -> Result<Vec<Option<AttributeValue>>> {
        self.expect("[")?;
        let mut list = Vec::new();
        if self.eat("]") {
            return Ok(list);
        }
        loop {
            let token = self.next()?;
            match self.literal(&token) {
                Some(value) => list.push(value),
                None => return Err(syntax_error(token.position, "expected a literal")),
            }
            if self.eat("]") {
                return Ok(list);
            }
            self.expect(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.next()?;
        if let Some(value) = self.literal(&token) {
            return Ok(Expr::Literal(value));
        }
        match &token.kind {
            TokenKind::Punct("(") => {
                self.descend(token.position)?;
                let inner = self.parse_or()?;
                self.expect(")")?;
                self.depth -= 1;
                Ok(inner)
            }
            TokenKind::Ident(word) if word == "_" => self.parse_attribute(),
            TokenKind::Ident(word) => Err(syntax_error(
                token.position,
                format!("unknown identifier `{word}`"),
            )),
            _ => Err(syntax_error(token.position, "expected an operand")),
        }
    }

    fn parse_attribute(&mut self) -> Result<Expr> {
        let feature = if self.eat(".") {
            let token = self.next()?;
            match token.kind {
                TokenKind::Ident(name) => name,
                _ => return Err(syntax_error(token.position, "expected a feature name")),
            }
        } else if self.eat("[") {
            let token = self.next()?;
            let TokenKind::Str(name) = token.kind else {
                return Err(syntax_error(token.position, "expected a quoted feature name"));
            };
            self.expect("]")?;
            name
        } else {
            let position = self.peek().map_or(self.end, |token| token.position);
            return Err(syntax_error(position, "expected `.` or `[` after `_`"));
        };

        if !self.features.contains(&feature) {
            self.features.push(feature.clone());
        }
        Ok(Expr::Attribute(feature))
    }

    /// Literal value of `token`, if it is one. `Some(None)` is `undefined`.
    fn literal(&self, token: &Token) -> Option<Option<AttributeValue>> {
        match &token.kind {
            TokenKind::Str(s) => Some(Some(AttributeValue::String(s.clone()))),
            TokenKind::Num(n) => Some(Some(AttributeValue::Number(*n))),
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Some(Some(AttributeValue::Boolean(true))),
                "false" => Some(Some(AttributeValue::Boolean(false))),
                "null" => Some(Some(AttributeValue::Null)),
                "undefined" => Some(None),
                _ => None,
            },
            TokenKind::Punct(_) => None,
        }
    }
}
