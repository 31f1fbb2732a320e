//! A CEL-style boolean expression language.
//!
//! Expressions are compiled against a fixed set of declared root variables
//! and evaluated over a JSON context. The dialect covers what policy rules
//! need and nothing more:
//! - literals: strings (single or double quoted), integers, `true`, `false`, `null`
//! - member access `tool.name`, index access `tool.arguments["mode"]`
//! - comparisons `==` `!=` `<` `<=` `>` `>=`, membership `in`
//! - boolean `&&` `||` `!` with short-circuit evaluation
//! - string methods `startsWith`, `endsWith`, `contains`, `matches`
//! - `size(x)` for strings, lists, and maps
//!
//! References to undeclared roots and unknown methods are compile errors;
//! type mismatches and missing-key accesses are evaluation errors, which the
//! policy engine treats as deny.

use std::collections::HashSet;

use serde_json::Value;

/// Compilation or evaluation failure.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("evaluation error: {0}")]
    Eval(String),
}

// ============================================================
// Lexer
// ============================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    Bang,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

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
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(ExprError::Parse("'=' is not an operator; use '=='".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(ExprError::Parse("'&' is not an operator; use '&&'".to_string()));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::OrOr);
                } else {
                    return Err(ExprError::Parse("'|' is not an operator; use '||'".to_string()));
                }
            }
            '\'' | '"' => {
                tokens.push(Token::Str(lex_string(&mut chars)?));
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(d) if d.is_ascii_digit() => {
                        let n = lex_int(&mut chars)?;
                        tokens.push(Token::Int(-n));
                    }
                    _ => {
                        return Err(ExprError::Parse(
                            "'-' is only supported as part of an integer literal".to_string(),
                        ));
                    }
                }
            }
            d if d.is_ascii_digit() => {
                tokens.push(Token::Int(lex_int(&mut chars)?));
            }
            a if a.is_ascii_alphabetic() || a == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "in" => Token::In,
                    _ => Token::Ident(ident),
                });
            }
            other => {
                return Err(ExprError::Parse(format!("unexpected character {other:?}")));
            }
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<String, ExprError> {
    let quote = chars.next().expect("caller checked quote");
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(ExprError::Parse("unterminated string literal".to_string())),
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(c) if c == quote => out.push(c),
                Some(c) => {
                    return Err(ExprError::Parse(format!("unknown escape sequence \\{c}")));
                }
                None => return Err(ExprError::Parse("unterminated string literal".to_string())),
            },
            Some(c) => out.push(c),
        }
    }
}

fn lex_int(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<i64, ExprError> {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    digits
        .parse()
        .map_err(|e| ExprError::Parse(format!("invalid integer literal {digits:?}: {e}")))
}

// ============================================================
// Parser
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Method {
        recv: Box<Expr>,
        name: String,
        arg: Box<Expr>,
    },
    Size(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

/// String methods the dialect understands, each taking one argument.
const STRING_METHODS: [&str; 4] = ["startsWith", "endsWith", "contains", "matches"];

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    roots: HashSet<&'a str>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: &Token, context: &str) -> Result<(), ExprError> {
        match self.next() {
            Some(ref tok) if tok == want => Ok(()),
            other => Err(ExprError::Parse(format!(
                "expected {want:?} {context}, found {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::Bin(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_relation()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.next();
            let rhs = self.parse_relation()?;
            lhs = Expr::Bin(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relation(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::In) => BinOp::In,
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_unary()?;
        Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Bang) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        other => {
                            return Err(ExprError::Parse(format!(
                                "expected field or method name after '.', found {other:?}"
                            )));
                        }
                    };
                    if self.peek() == Some(&Token::LParen) {
                        if !STRING_METHODS.contains(&name.as_str()) {
                            return Err(ExprError::Parse(format!(
                                "unknown method {name:?}"
                            )));
                        }
                        self.next();
                        let arg = self.parse_or()?;
                        self.expect(&Token::RParen, "after method argument")?;
                        expr = Expr::Method {
                            recv: Box::new(expr),
                            name,
                            arg: Box::new(arg),
                        };
                    } else {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                }
                Some(Token::LBracket) => {
                    self.next();
                    let index = self.parse_or()?;
                    self.expect(&Token::RBracket, "after index expression")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Int(n)) => Ok(Expr::Lit(Value::from(n))),
            Some(Token::True) => Ok(Expr::Lit(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Lit(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Lit(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "to close group")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    if name != "size" {
                        return Err(ExprError::Parse(format!("unknown function {name:?}")));
                    }
                    self.next();
                    let arg = self.parse_or()?;
                    self.expect(&Token::RParen, "after size() argument")?;
                    return Ok(Expr::Size(Box::new(arg)));
                }
                if !self.roots.contains(name.as_str()) {
                    return Err(ExprError::Parse(format!(
                        "unknown identifier {name:?} (declared: method, server, tool, resource)"
                    )));
                }
                Ok(Expr::Var(name))
            }
            other => Err(ExprError::Parse(format!(
                "expected expression, found {other:?}"
            ))),
        }
    }
}

// ============================================================
// Evaluation
// ============================================================

impl Expr {
    fn eval(&self, ctx: &Value) -> Result<Value, ExprError> {
        match self {
            Expr::Lit(v) => Ok(v.clone()),
            Expr::Var(name) => ctx
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::Eval(format!("unbound variable {name:?}"))),
            Expr::Member(obj, key) => match obj.eval(ctx)? {
                Value::Object(map) => map
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ExprError::Eval(format!("no such key {key:?}"))),
                other => Err(ExprError::Eval(format!(
                    "cannot access field {key:?} on {}",
                    type_name(&other)
                ))),
            },
            Expr::Index(obj, index) => {
                let container = obj.eval(ctx)?;
                let key = index.eval(ctx)?;
                match (&container, &key) {
                    (Value::Object(map), Value::String(k)) => map
                        .get(k)
                        .cloned()
                        .ok_or_else(|| ExprError::Eval(format!("no such key {k:?}"))),
                    (Value::Array(items), Value::Number(n)) => {
                        let i = n
                            .as_i64()
                            .ok_or_else(|| ExprError::Eval("non-integer index".to_string()))?;
                        usize::try_from(i)
                            .ok()
                            .and_then(|i| items.get(i))
                            .cloned()
                            .ok_or_else(|| ExprError::Eval(format!("index {i} out of range")))
                    }
                    _ => Err(ExprError::Eval(format!(
                        "cannot index {} with {}",
                        type_name(&container),
                        type_name(&key)
                    ))),
                }
            }
            Expr::Method { recv, name, arg } => {
                let recv = as_string(&recv.eval(ctx)?, "method receiver")?;
                let arg = as_string(&arg.eval(ctx)?, "method argument")?;
                let result = match name.as_str() {
                    "startsWith" => recv.starts_with(&arg),
                    "endsWith" => recv.ends_with(&arg),
                    "contains" => recv.contains(&arg),
                    "matches" => {
                        let re = regex::Regex::new(&arg).map_err(|e| {
                            ExprError::Eval(format!("matches: invalid regex {arg:?}: {e}"))
                        })?;
                        re.is_match(&recv)
                    }
                    // Parser only admits the four known methods.
                    other => return Err(ExprError::Eval(format!("unknown method {other:?}"))),
                };
                Ok(Value::Bool(result))
            }
            Expr::Size(inner) => match inner.eval(ctx)? {
                Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
                Value::Array(items) => Ok(Value::from(items.len() as i64)),
                Value::Object(map) => Ok(Value::from(map.len() as i64)),
                other => Err(ExprError::Eval(format!(
                    "size() expects a string, list, or map, got {}",
                    type_name(&other)
                ))),
            },
            Expr::Not(inner) => {
                let v = inner.eval(ctx)?;
                Ok(Value::Bool(!as_bool(&v, "operand of '!'")?))
            }
            Expr::Bin(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &Value) -> Result<Value, ExprError> {
    // Short-circuit logical operators first.
    match op {
        BinOp::And => {
            if !as_bool(&lhs.eval(ctx)?, "operand of '&&'")? {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(as_bool(&rhs.eval(ctx)?, "operand of '&&'")?));
        }
        BinOp::Or => {
            if as_bool(&lhs.eval(ctx)?, "operand of '||'")? {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(as_bool(&rhs.eval(ctx)?, "operand of '||'")?));
        }
        _ => {}
    }

    let left = lhs.eval(ctx)?;
    let right = rhs.eval(ctx)?;

    let result = match op {
        BinOp::Eq => left == right,
        BinOp::Ne => left != right,
        BinOp::In => return eval_in(&left, &right),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(&left, &right)?;
            match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    Ok(Value::Bool(result))
}

fn eval_in(needle: &Value, haystack: &Value) -> Result<Value, ExprError> {
    match haystack {
        Value::Array(items) => Ok(Value::Bool(items.contains(needle))),
        Value::Object(map) => {
            let key = as_string(needle, "left operand of 'in'")?;
            Ok(Value::Bool(map.contains_key(&key)))
        }
        other => Err(ExprError::Eval(format!(
            "'in' expects a list or map on the right, got {}",
            type_name(other)
        ))),
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, ExprError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (
                a.as_f64().unwrap_or(f64::NAN),
                b.as_f64().unwrap_or(f64::NAN),
            );
            a.partial_cmp(&b)
                .ok_or_else(|| ExprError::Eval("numbers are not comparable".to_string()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::Eval(format!(
            "cannot compare {} with {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn as_bool(v: &Value, what: &str) -> Result<bool, ExprError> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(ExprError::Eval(format!(
            "{what} must be a bool, got {}",
            type_name(other)
        ))),
    }
}

fn as_string(v: &Value, what: &str) -> Result<String, ExprError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(ExprError::Eval(format!(
            "{what} must be a string, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

// ============================================================
// Public API
// ============================================================

/// A compiled expression, reusable across evaluations.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    ast: Expr,
}

impl CompiledExpr {
    /// Evaluate against a JSON context object binding the declared roots.
    pub fn eval(&self, ctx: &Value) -> Result<Value, ExprError> {
        self.ast.eval(ctx)
    }
}

/// Compile an expression against a set of declared root variable names.
pub fn compile(src: &str, roots: &[&str]) -> Result<CompiledExpr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::Parse("empty expression".to_string()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        roots: roots.iter().copied().collect(),
    };
    let ast = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Parse(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    Ok(CompiledExpr { ast })
}

// ============================================================
// Tests
// ============================================================
