//! Sandboxed evaluator for format bodies and global `let` blocks.
//!
//! A format's code literal is compiled once, at definition time, into a
//! small statement program: assignments whose right-hand sides may use
//! string/integer/list literals, `+` concatenation, and a fixed, enumerated
//! helper set (`CodeBlock(...)`, `InstObjParams(...)`, and
//! `Template.subst(...)`). Nothing else is callable, and the only bindings
//! a format instantiation exports are the four output channels.

use std::rc::Rc;

use ahash::AHashMap;

use crate::codeblock::{CodeBlock, InstObjParams};
use crate::compiler::IsaCompiler;
use crate::error::IsaError;
use crate::template::Template;

/// Runtime value inside the evaluator and in declarative table entries.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Int(u64),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    None,
    Code(Rc<CodeBlock>),
    Inst(Rc<InstObjParams>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::None => "None",
            Value::Code(_) => "code block",
            Value::Inst(_) => "instruction parameters",
        }
    }

    pub fn as_str(&self) -> Result<&str, IsaError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(IsaError::declaration(format!(
                "expected string, found {}",
                other.type_name()
            ))),
        }
    }

    /// Coerces a flag argument to a list of strings: a bare string becomes
    /// a singleton, `None` becomes empty.
    pub fn into_string_list(self) -> Result<Vec<String>, IsaError> {
        match self {
            Value::None => Ok(Vec::new()),
            Value::Str(s) => Ok(vec![s]),
            Value::List(items) | Value::Tuple(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s),
                    other => Err(IsaError::declaration(format!(
                        "expected string in flag list, found {}",
                        other.type_name()
                    ))),
                })
                .collect(),
            other => Err(IsaError::declaration(format!(
                "expected flag list, found {}",
                other.type_name()
            ))),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::None => write!(f, "None"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Code(_) => write!(f, "<code block>"),
            Value::Inst(_) => write!(f, "<inst params>"),
        }
    }
}

pub type Env = AHashMap<String, Value>;

// ---------------------------------------------------------------------------
// Tokenizer shared with the declarative operand-table parsers.

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CodeTok {
    Id(String),
    Str(String),
    Int(u64),
    Plus,
    Comma,
    Dot,
    Colon,
    Equals,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Newline,
    Semi,
    Eof,
}

pub(crate) struct CodeStream<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
    peeked: Option<CodeTok>,
}

impl<'s> CodeStream<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            peeked: None,
        }
    }

    pub(crate) fn line(&self) -> usize {
        self.line
    }

    pub(crate) fn peek(&mut self) -> Result<&CodeTok, IsaError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.as_ref().expect("just filled"))
    }

    pub(crate) fn next(&mut self) -> Result<CodeTok, IsaError> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.lex()
    }

    pub(crate) fn skip_newlines(&mut self) -> Result<(), IsaError> {
        while *self.peek()? == CodeTok::Newline {
            self.next()?;
        }
        Ok(())
    }

    fn lex(&mut self) -> Result<CodeTok, IsaError> {
        loop {
            let rest = &self.src[self.pos..];
            let Some(ch) = rest.chars().next() else {
                return Ok(CodeTok::Eof);
            };
            match ch {
                ' ' | '\t' | '\r' => self.pos += 1,
                '\n' => {
                    self.pos += 1;
                    self.line += 1;
                    return Ok(CodeTok::Newline);
                }
                '#' => {
                    let len = rest.find('\n').unwrap_or(rest.len());
                    self.pos += len;
                }
                '\'' | '"' => return self.lex_string(ch),
                '0'..='9' => return Ok(self.lex_int()),
                'A'..='Z' | 'a'..='z' | '_' => {
                    let len = rest
                        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                        .unwrap_or(rest.len());
                    let ident = rest[..len].to_string();
                    self.pos += len;
                    return Ok(CodeTok::Id(ident));
                }
                '+' => return Ok(self.punct(CodeTok::Plus)),
                ',' => return Ok(self.punct(CodeTok::Comma)),
                '.' => return Ok(self.punct(CodeTok::Dot)),
                ':' => return Ok(self.punct(CodeTok::Colon)),
                '=' => return Ok(self.punct(CodeTok::Equals)),
                '(' => return Ok(self.punct(CodeTok::LParen)),
                ')' => return Ok(self.punct(CodeTok::RParen)),
                '[' => return Ok(self.punct(CodeTok::LBracket)),
                ']' => return Ok(self.punct(CodeTok::RBracket)),
                ';' => return Ok(self.punct(CodeTok::Semi)),
                other => {
                    return Err(IsaError::declaration(format!(
                        "unexpected character '{other}' at line {} of code block",
                        self.line
                    )));
                }
            }
        }
    }

    fn punct(&mut self, tok: CodeTok) -> CodeTok {
        self.pos += 1;
        tok
    }

    fn lex_string(&mut self, quote: char) -> Result<CodeTok, IsaError> {
        let mut out = String::new();
        let mut chars = self.src[self.pos + 1..].char_indices();
        while let Some((i, ch)) = chars.next() {
            if ch == quote {
                self.pos += 1 + i + 1;
                self.line += out.bytes().filter(|&b| b == b'\n').count();
                return Ok(CodeTok::Str(out));
            }
            if ch == '\\' {
                match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '\'')) => out.push('\''),
                    Some((_, '"')) => out.push('"'),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                }
            } else {
                out.push(ch);
            }
        }
        Err(IsaError::declaration(format!(
            "unterminated string in code block at line {}",
            self.line
        )))
    }

    fn lex_int(&mut self) -> CodeTok {
        let rest = &self.src[self.pos..];
        let bytes = rest.as_bytes();
        let (digits, radix, len) = if (rest.starts_with("0x") || rest.starts_with("0X"))
            && bytes.get(2).is_some_and(|b| b.is_ascii_hexdigit())
        {
            let end = 2 + rest[2..]
                .find(|c: char| !c.is_ascii_hexdigit())
                .unwrap_or(rest.len() - 2);
            (&rest[2..end], 16, end)
        } else {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            (&rest[..end], 10, end)
        };
        self.pos += len;
        CodeTok::Int(u64::from_str_radix(digits, radix).unwrap_or(0))
    }
}

/// Parses one literal value: string, integer, `None`, a `(...)` tuple, or a
/// `[...]` list. Used by the declarative operand-table blocks.
pub(crate) fn parse_literal(ts: &mut CodeStream<'_>) -> Result<Value, IsaError> {
    ts.skip_newlines()?;
    match ts.next()? {
        CodeTok::Str(s) => Ok(Value::Str(s)),
        CodeTok::Int(v) => Ok(Value::Int(v)),
        CodeTok::Id(name) if name == "None" => Ok(Value::None),
        CodeTok::LParen => {
            let items = parse_literal_list(ts, CodeTok::RParen)?;
            Ok(Value::Tuple(items))
        }
        CodeTok::LBracket => {
            let items = parse_literal_list(ts, CodeTok::RBracket)?;
            Ok(Value::List(items))
        }
        other => Err(IsaError::declaration(format!(
            "unexpected token {other:?} in declaration block at line {}",
            ts.line()
        ))),
    }
}

fn parse_literal_list(ts: &mut CodeStream<'_>, close: CodeTok) -> Result<Vec<Value>, IsaError> {
    let mut items = Vec::new();
    loop {
        ts.skip_newlines()?;
        if *ts.peek()? == close {
            ts.next()?;
            return Ok(items);
        }
        items.push(parse_literal(ts)?);
        ts.skip_newlines()?;
        match ts.peek()? {
            CodeTok::Comma => {
                ts.next()?;
            }
            tok if *tok == close => {}
            other => {
                return Err(IsaError::declaration(format!(
                    "expected ',' or closing delimiter, found {other:?}"
                )));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Statement programs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    CodeBlock,
    InstObjParams,
}

#[derive(Debug, Clone)]
enum Expr {
    Str(String),
    Int(u64),
    NoneLit,
    Ident(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Concat(Box<Expr>, Box<Expr>),
    Call { helper: Helper, args: Vec<Expr> },
    Subst { template: String, arg: Box<Expr> },
}

#[derive(Debug, Clone)]
struct Stmt {
    target: String,
    expr: Expr,
}

/// A compiled format body or `let` block.
#[derive(Debug, Clone, Default)]
pub struct Program {
    stmts: Vec<Stmt>,
}

impl Program {
    /// Compiles `src` into a statement program, rejecting anything outside
    /// the sandbox: the only callables are the enumerated helpers and
    /// `Template.subst`, and every statement must be an assignment.
    pub fn compile(src: &str) -> Result<Program, IsaError> {
        let mut ts = CodeStream::new(src);
        let mut stmts = Vec::new();
        loop {
            ts.skip_newlines()?;
            match ts.next()? {
                CodeTok::Eof => break,
                CodeTok::Id(target) => {
                    if ts.next()? != CodeTok::Equals {
                        return Err(IsaError::declaration(format!(
                            "expected '=' after '{target}' at line {}; only assignment \
                             statements are allowed in code blocks",
                            ts.line()
                        )));
                    }
                    let expr = parse_expr(&mut ts)?;
                    match ts.next()? {
                        CodeTok::Newline | CodeTok::Semi | CodeTok::Eof => {}
                        other => {
                            return Err(IsaError::declaration(format!(
                                "unexpected token {other:?} after assignment at line {}",
                                ts.line()
                            )));
                        }
                    }
                    stmts.push(Stmt { target, expr });
                }
                other => {
                    return Err(IsaError::declaration(format!(
                        "unexpected token {other:?} at line {}; only assignment \
                         statements are allowed in code blocks",
                        ts.line()
                    )));
                }
            }
        }
        Ok(Program { stmts })
    }

    /// Runs the program, inserting each assignment's result into `env`.
    pub fn execute(&self, ctx: &IsaCompiler, env: &mut Env) -> Result<(), IsaError> {
        for stmt in &self.stmts {
            let value = eval_expr(&stmt.expr, ctx, env)?;
            env.insert(stmt.target.clone(), value);
        }
        Ok(())
    }
}

fn parse_expr(ts: &mut CodeStream<'_>) -> Result<Expr, IsaError> {
    let mut expr = parse_term(ts)?;
    while *ts.peek()? == CodeTok::Plus {
        ts.next()?;
        ts.skip_newlines()?;
        let rhs = parse_term(ts)?;
        expr = Expr::Concat(Box::new(expr), Box::new(rhs));
    }
    Ok(expr)
}

fn parse_term(ts: &mut CodeStream<'_>) -> Result<Expr, IsaError> {
    let base = parse_primary(ts)?;
    if *ts.peek()? != CodeTok::Dot {
        return Ok(base);
    }
    ts.next()?;
    let Expr::Ident(template) = base else {
        return Err(IsaError::declaration(
            "method calls are only allowed on template names",
        ));
    };
    match ts.next()? {
        CodeTok::Id(method) if method == "subst" => {}
        other => {
            return Err(IsaError::declaration(format!(
                "unknown method {other:?}; only 'subst' is callable on templates"
            )));
        }
    }
    if ts.next()? != CodeTok::LParen {
        return Err(IsaError::declaration("expected '(' after 'subst'"));
    }
    ts.skip_newlines()?;
    let arg = parse_expr(ts)?;
    ts.skip_newlines()?;
    if ts.next()? != CodeTok::RParen {
        return Err(IsaError::declaration("expected ')' closing 'subst' call"));
    }
    Ok(Expr::Subst {
        template,
        arg: Box::new(arg),
    })
}

fn parse_primary(ts: &mut CodeStream<'_>) -> Result<Expr, IsaError> {
    ts.skip_newlines()?;
    match ts.next()? {
        CodeTok::Str(s) => Ok(Expr::Str(s)),
        CodeTok::Int(v) => Ok(Expr::Int(v)),
        CodeTok::LBracket => {
            let items = parse_expr_list(ts, CodeTok::RBracket)?;
            Ok(Expr::List(items))
        }
        CodeTok::LParen => {
            ts.skip_newlines()?;
            let first = parse_expr(ts)?;
            ts.skip_newlines()?;
            match ts.next()? {
                CodeTok::RParen => Ok(first),
                CodeTok::Comma => {
                    let mut items = vec![first];
                    items.extend(parse_expr_list(ts, CodeTok::RParen)?);
                    Ok(Expr::Tuple(items))
                }
                other => Err(IsaError::declaration(format!(
                    "expected ')' or ',', found {other:?}"
                ))),
            }
        }
        CodeTok::Id(name) if name == "None" => Ok(Expr::NoneLit),
        CodeTok::Id(name) => {
            if *ts.peek()? == CodeTok::LParen {
                ts.next()?;
                let helper = match name.as_str() {
                    "CodeBlock" => Helper::CodeBlock,
                    "InstObjParams" => Helper::InstObjParams,
                    other => {
                        return Err(IsaError::declaration(format!(
                            "unknown helper function '{other}'; only CodeBlock and \
                             InstObjParams are callable"
                        )));
                    }
                };
                let args = parse_expr_list(ts, CodeTok::RParen)?;
                return Ok(Expr::Call { helper, args });
            }
            Ok(Expr::Ident(name))
        }
        other => Err(IsaError::declaration(format!(
            "unexpected token {other:?} in expression at line {}",
            ts.line()
        ))),
    }
}

fn parse_expr_list(ts: &mut CodeStream<'_>, close: CodeTok) -> Result<Vec<Expr>, IsaError> {
    let mut items = Vec::new();
    loop {
        ts.skip_newlines()?;
        if *ts.peek()? == close {
            ts.next()?;
            return Ok(items);
        }
        items.push(parse_expr(ts)?);
        ts.skip_newlines()?;
        match ts.peek()? {
            CodeTok::Comma => {
                ts.next()?;
            }
            tok if *tok == close => {}
            other => {
                return Err(IsaError::declaration(format!(
                    "expected ',' or closing delimiter, found {other:?}"
                )));
            }
        }
    }
}

fn eval_expr(expr: &Expr, ctx: &IsaCompiler, env: &Env) -> Result<Value, IsaError> {
    match expr {
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Int(v) => Ok(Value::Int(*v)),
        Expr::NoneLit => Ok(Value::None),
        Expr::Ident(name) => {
            if let Some(value) = env.get(name) {
                return Ok(value.clone());
            }
            if let Some(template) = ctx.templates.get(name) {
                return Ok(Value::Str(template.text().to_string()));
            }
            Err(IsaError::declaration(format!("name '{name}' is not defined")))
        }
        Expr::List(items) => Ok(Value::List(eval_items(items, ctx, env)?)),
        Expr::Tuple(items) => Ok(Value::Tuple(eval_items(items, ctx, env)?)),
        Expr::Concat(lhs, rhs) => {
            let left = eval_expr(lhs, ctx, env)?;
            let right = eval_expr(rhs, ctx, env)?;
            match (left, right) {
                (Value::Str(mut a), Value::Str(b)) => {
                    a.push_str(&b);
                    Ok(Value::Str(a))
                }
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
                (left, right) => Err(IsaError::declaration(format!(
                    "cannot concatenate {} and {}",
                    left.type_name(),
                    right.type_name()
                ))),
            }
        }
        Expr::Call { helper, args } => eval_call(*helper, args, ctx, env),
        Expr::Subst { template, arg } => {
            let template = if let Some(t) = ctx.templates.get(template) {
                t.clone()
            } else if let Some(Value::Str(text)) = env.get(template) {
                Template::new(text.clone())
            } else {
                return Err(IsaError::declaration(format!(
                    "'{template}' is not a template"
                )));
            };
            let value = eval_expr(arg, ctx, env)?;
            let Value::Inst(iop) = value else {
                return Err(IsaError::declaration(format!(
                    "subst() expects instruction parameters, found {}",
                    value.type_name()
                )));
            };
            let text = template.subst(&iop.symbols(), &ctx.templates)?;
            Ok(Value::Str(text))
        }
    }
}

fn eval_items(items: &[Expr], ctx: &IsaCompiler, env: &Env) -> Result<Vec<Value>, IsaError> {
    items.iter().map(|e| eval_expr(e, ctx, env)).collect()
}

fn eval_call(
    helper: Helper,
    args: &[Expr],
    ctx: &IsaCompiler,
    env: &Env,
) -> Result<Value, IsaError> {
    match helper {
        Helper::CodeBlock => {
            let [arg] = args else {
                return Err(IsaError::declaration(
                    "CodeBlock() takes exactly one argument",
                ));
            };
            let code = eval_expr(arg, ctx, env)?;
            let block = CodeBlock::new(code.as_str()?, &ctx.operands)?;
            Ok(Value::Code(Rc::new(block)))
        }
        Helper::InstObjParams => {
            if args.len() < 2 || args.len() > 5 {
                return Err(IsaError::declaration(
                    "InstObjParams() takes two to five arguments",
                ));
            }
            let values = eval_items(args, ctx, env)?;
            let mut values = values.into_iter();
            let mnemonic = values.next().expect("arity checked").as_str()?.to_string();
            let class_name = values.next().expect("arity checked").as_str()?.to_string();
            let base_class = match values.next() {
                Some(v) => v.as_str()?.to_string(),
                None => String::new(),
            };
            let code_block = match values.next() {
                Some(Value::Code(block)) => Some(block),
                Some(Value::None) | None => None,
                Some(other) => {
                    return Err(IsaError::declaration(format!(
                        "InstObjParams() code argument must be a CodeBlock, found {}",
                        other.type_name()
                    )));
                }
            };
            let opt_args = match values.next() {
                Some(v) => v.into_string_list()?,
                None => Vec::new(),
            };
            let iop = InstObjParams::new(mnemonic, class_name, base_class, code_block, opt_args)?;
            Ok(Value::Inst(Rc::new(iop)))
        }
    }
}
