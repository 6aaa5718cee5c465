//! Streaming tokenizer for ISA description source.
//!
//! The input is the include-expanded text produced by
//! [`preprocess`](crate::preprocess::preprocess): `##newfile`/`##endfile`
//! marker pairs drive the file-inclusion stack so diagnostics report the
//! correct filename and line. Illegal characters are the one recoverable
//! error class; they are recorded as diagnostics and skipped so several can
//! surface in a single run.

use crate::diagnostic::{DiagnosticPhase, IsaDiagnostic};
use crate::error::{IsaError, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Reserved words, matched case-insensitively.
    Bitfield,
    Decode,
    Decoder,
    Default,
    Def,
    Exec,
    Format,
    Header,
    Let,
    Namespace,
    OperandTypes,
    Operands,
    Output,
    Signed,
    Template,

    Id(String),
    IntLit(u64),
    /// Single-quoted, possibly multi-line string literal (quotes stripped).
    StrLit(String),
    /// `{{ ... }}` code literal (delimiters stripped).
    CodeLit(String),
    /// Line-leading `#...` directive, trailing newline retained.
    CppDirective(String),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Less,
    Greater,
    Equals,
    Comma,
    Semi,
    Colon,
    DblColon,
    Asterisk,

    Eof,
}

impl TokenKind {
    /// Short human-readable name used in syntax error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Id(name) => format!("identifier '{name}'"),
            TokenKind::IntLit(v) => format!("integer {v}"),
            TokenKind::StrLit(_) => "string literal".into(),
            TokenKind::CodeLit(_) => "code literal".into(),
            TokenKind::CppDirective(_) => "preprocessor directive".into(),
            TokenKind::Eof => "end of input".into(),
            other => format!("'{}'", keyword_or_punct(other)),
        }
    }
}

fn keyword_or_punct(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Bitfield => "bitfield",
        TokenKind::Decode => "decode",
        TokenKind::Decoder => "decoder",
        TokenKind::Default => "default",
        TokenKind::Def => "def",
        TokenKind::Exec => "exec",
        TokenKind::Format => "format",
        TokenKind::Header => "header",
        TokenKind::Let => "let",
        TokenKind::Namespace => "namespace",
        TokenKind::OperandTypes => "operand_types",
        TokenKind::Operands => "operands",
        TokenKind::Output => "output",
        TokenKind::Signed => "signed",
        TokenKind::Template => "template",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::Less => "<",
        TokenKind::Greater => ">",
        TokenKind::Equals => "=",
        TokenKind::Comma => ",",
        TokenKind::Semi => ";",
        TokenKind::Colon => ":",
        TokenKind::DblColon => "::",
        TokenKind::Asterisk => "*",
        _ => "?",
    }
}

fn keyword(ident: &str) -> Option<TokenKind> {
    match ident.to_ascii_lowercase().as_str() {
        "bitfield" => Some(TokenKind::Bitfield),
        "decode" => Some(TokenKind::Decode),
        "decoder" => Some(TokenKind::Decoder),
        "default" => Some(TokenKind::Default),
        "def" => Some(TokenKind::Def),
        "exec" => Some(TokenKind::Exec),
        "format" => Some(TokenKind::Format),
        "header" => Some(TokenKind::Header),
        "let" => Some(TokenKind::Let),
        "namespace" => Some(TokenKind::Namespace),
        "operand_types" => Some(TokenKind::OperandTypes),
        "operands" => Some(TokenKind::Operands),
        "output" => Some(TokenKind::Output),
        "signed" => Some(TokenKind::Signed),
        "template" => Some(TokenKind::Template),
        _ => None,
    }
}

struct FileFrame {
    file: String,
    resume_line: usize,
}

pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: usize,
    file: String,
    stack: Vec<FileFrame>,
    diagnostics: Vec<IsaDiagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str, filename: impl Into<String>) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            file: filename.into(),
            stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Current position as a full location, including the include trail.
    pub fn location(&self) -> SourceLocation {
        self.location_at(self.line)
    }

    pub fn location_at(&self, line: usize) -> SourceLocation {
        SourceLocation {
            included_from: self.stack.iter().map(|f| f.file.clone()).collect(),
            file: self.file.clone(),
            line,
        }
    }

    pub fn take_diagnostics(&mut self) -> Vec<IsaDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn rest(&self) -> &'src str {
        &self.src[self.pos..]
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src.as_bytes()[self.pos - 1] == b'\n'
    }

    fn bump_lines(&mut self, text: &str) {
        self.line += text.bytes().filter(|&b| b == b'\n').count();
    }

    fn push_diag(&mut self, code: &'static str, message: String) {
        self.diagnostics.push(IsaDiagnostic::new(
            DiagnosticPhase::Lexical,
            code,
            message,
            self.file.clone(),
            self.line,
        ));
    }

    fn token(&self, kind: TokenKind, line: usize) -> Token {
        Token { kind, line }
    }

    pub fn next_token(&mut self) -> Result<Token, IsaError> {
        loop {
            let rest = self.rest();
            let Some(ch) = rest.chars().next() else {
                return Ok(self.token(TokenKind::Eof, self.line));
            };
            match ch {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                ' ' | '\t' | '\x0c' | '\r' => {
                    self.pos += 1;
                }
                '/' if rest.starts_with("//") => {
                    let len = rest.find('\n').unwrap_or(rest.len());
                    self.pos += len;
                }
                '#' if self.at_line_start() => {
                    if rest.starts_with("##newfile") {
                        self.handle_newfile()?;
                    } else if rest.starts_with("##endfile") {
                        self.handle_endfile();
                    } else if rest.starts_with("##") {
                        self.push_diag("lex.illegal-char", "illegal character '#'".into());
                        self.pos += 1;
                    } else {
                        return Ok(self.lex_cpp_directive());
                    }
                }
                '{' if rest.starts_with("{{") => return self.lex_code_literal(),
                '{' => return Ok(self.punct(TokenKind::LBrace)),
                '\'' => return self.lex_string_literal(),
                '0'..='9' => return Ok(self.lex_int_literal()),
                'A'..='Z' | 'a'..='z' | '_' => return Ok(self.lex_identifier()),
                ':' => {
                    if rest.starts_with("::") {
                        let line = self.line;
                        self.pos += 2;
                        return Ok(self.token(TokenKind::DblColon, line));
                    }
                    return Ok(self.punct(TokenKind::Colon));
                }
                '(' => return Ok(self.punct(TokenKind::LParen)),
                ')' => return Ok(self.punct(TokenKind::RParen)),
                '[' => return Ok(self.punct(TokenKind::LBracket)),
                ']' => return Ok(self.punct(TokenKind::RBracket)),
                '}' => return Ok(self.punct(TokenKind::RBrace)),
                '<' => return Ok(self.punct(TokenKind::Less)),
                '>' => return Ok(self.punct(TokenKind::Greater)),
                '=' => return Ok(self.punct(TokenKind::Equals)),
                ',' => return Ok(self.punct(TokenKind::Comma)),
                ';' => return Ok(self.punct(TokenKind::Semi)),
                '*' => return Ok(self.punct(TokenKind::Asterisk)),
                other => {
                    self.push_diag(
                        "lex.illegal-char",
                        format!("illegal character '{other}'"),
                    );
                    self.pos += other.len_utf8();
                }
            }
        }
    }

    fn punct(&mut self, kind: TokenKind) -> Token {
        let line = self.line;
        self.pos += 1;
        self.token(kind, line)
    }

    fn lex_identifier(&mut self) -> Token {
        let line = self.line;
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let ident = &rest[..len];
        self.pos += len;
        let kind = keyword(ident).unwrap_or_else(|| TokenKind::Id(ident.to_string()));
        self.token(kind, line)
    }

    fn lex_int_literal(&mut self) -> Token {
        let line = self.line;
        let rest = self.rest();
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
        let value = match u64::from_str_radix(digits, radix) {
            Ok(v) => v,
            Err(_) => {
                self.push_diag(
                    "lex.int-overflow",
                    format!("integer value \"{}\" too large", &rest[..len]),
                );
                0
            }
        };
        self.token(TokenKind::IntLit(value), line)
    }

    fn lex_string_literal(&mut self) -> Result<Token, IsaError> {
        let line = self.line;
        let body = &self.rest()[1..];
        let Some(end) = body.find('\'') else {
            return Err(IsaError::Parse {
                message: "unterminated string literal".into(),
                location: Some(self.location()),
            });
        };
        let value = &body[..end];
        self.pos += end + 2;
        self.bump_lines(value);
        Ok(self.token(TokenKind::StrLit(value.to_string()), line))
    }

    fn lex_code_literal(&mut self) -> Result<Token, IsaError> {
        let line = self.line;
        let body = &self.rest()[2..];
        // A lone '}' does not terminate the block; only the first '}}' does.
        let Some(end) = body.find("}}") else {
            return Err(IsaError::Parse {
                message: "unterminated code literal".into(),
                location: Some(self.location()),
            });
        };
        let value = &body[..end];
        self.pos += end + 4;
        self.bump_lines(value);
        Ok(self.token(TokenKind::CodeLit(value.to_string()), line))
    }

    fn lex_cpp_directive(&mut self) -> Token {
        let line = self.line;
        let rest = self.rest();
        let len = match rest.find('\n') {
            Some(i) => i + 1,
            None => rest.len(),
        };
        let text = &rest[..len];
        self.pos += len;
        self.bump_lines(text);
        self.token(TokenKind::CppDirective(text.to_string()), line)
    }

    fn handle_newfile(&mut self) -> Result<(), IsaError> {
        let rest = &self.rest()["##newfile".len()..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        let skipped = rest.len() - trimmed.len();
        let Some(stripped) = trimmed.strip_prefix('"') else {
            return Err(IsaError::Parse {
                message: "malformed ##newfile directive".into(),
                location: Some(self.location()),
            });
        };
        let Some(end) = stripped.find('"') else {
            return Err(IsaError::Parse {
                message: "malformed ##newfile directive".into(),
                location: Some(self.location()),
            });
        };
        let filename = stripped[..end].to_string();
        self.pos += "##newfile".len() + skipped + end + 2;
        let outer = std::mem::replace(&mut self.file, filename);
        self.stack.push(FileFrame {
            file: outer,
            resume_line: self.line,
        });
        // The newline terminating the marker brings this back to 1.
        self.line = 0;
        Ok(())
    }

    fn handle_endfile(&mut self) {
        self.pos += "##endfile".len();
        if let Some(frame) = self.stack.pop() {
            self.file = frame.file;
            self.line = frame.resume_line;
        } else {
            self.push_diag(
                "lex.endfile",
                "##endfile with no matching ##newfile".into(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(src: &str) -> (Vec<TokenKind>, Vec<IsaDiagnostic>) {
        let mut lexer = Lexer::new(src, "test.isa");
        let mut kinds = Vec::new();
        loop {
            let tok = lexer.next_token().expect("lex");
            let done = tok.kind == TokenKind::Eof;
            kinds.push(tok.kind);
            if done {
                break;
            }
        }
        let diags = lexer.take_diagnostics();
        (kinds, diags)
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let (kinds, diags) = all_tokens("decode DECODE Decode");
        assert!(diags.is_empty());
        assert_eq!(
            kinds,
            vec![
                TokenKind::Decode,
                TokenKind::Decode,
                TokenKind::Decode,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn integer_literals_decimal_and_hex() {
        let (kinds, diags) = all_tokens("12 0x1f 0");
        assert!(diags.is_empty());
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLit(12),
                TokenKind::IntLit(0x1f),
                TokenKind::IntLit(0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn oversized_integer_recovers_to_zero() {
        let (kinds, diags) = all_tokens("99999999999999999999999");
        assert_eq!(kinds[0], TokenKind::IntLit(0));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("too large"));
    }

    #[test]
    fn code_literal_allows_single_closing_brace() {
        let (kinds, _) = all_tokens("{{ if (x) { y; } }}");
        assert_eq!(
            kinds[0],
            TokenKind::CodeLit(" if (x) { y; } ".to_string())
        );
    }

    #[test]
    fn string_literal_spans_lines() {
        let mut lexer = Lexer::new("'a\nb' decode", "test.isa");
        let tok = lexer.next_token().expect("lex");
        assert_eq!(tok.kind, TokenKind::StrLit("a\nb".into()));
        let tok = lexer.next_token().expect("lex");
        assert_eq!(tok.line, 2);
    }

    #[test]
    fn cpp_directive_only_at_line_start() {
        let (kinds, _) = all_tokens("#ifdef FOO\ndecode");
        assert_eq!(
            kinds[0],
            TokenKind::CppDirective("#ifdef FOO\n".to_string())
        );
        assert_eq!(kinds[1], TokenKind::Decode);
    }

    #[test]
    fn illegal_character_is_skipped_with_diagnostic() {
        let (kinds, diags) = all_tokens("decode $ decoder ` exec");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Decode,
                TokenKind::Decoder,
                TokenKind::Exec,
                TokenKind::Eof
            ]
        );
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn file_stack_tracks_includes() {
        let src = "decode\n##newfile \"inner.isa\"\nexec\n##endfile\nformat";
        let mut lexer = Lexer::new(src, "outer.isa");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Decode);
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::Exec);
        assert_eq!(tok.line, 1);
        let loc = lexer.location();
        assert_eq!(loc.file, "inner.isa");
        assert_eq!(loc.included_from, vec!["outer.isa".to_string()]);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Format);
        assert_eq!(lexer.location().file, "outer.isa");
    }

    #[test]
    fn comments_are_ignored() {
        let (kinds, diags) = all_tokens("decode // trailing $ junk\nexec");
        assert!(diags.is_empty());
        assert_eq!(
            kinds,
            vec![TokenKind::Decode, TokenKind::Exec, TokenKind::Eof]
        );
    }

    #[test]
    fn double_colon_lexes_as_one_token() {
        let (kinds, _) = all_tokens("a::b:c");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Id("a".into()),
                TokenKind::DblColon,
                TokenKind::Id("b".into()),
                TokenKind::Colon,
                TokenKind::Id("c".into()),
                TokenKind::Eof
            ]
        );
    }
}
