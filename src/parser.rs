//! Recursive-descent parser for ISA descriptions.
//!
//! A description is a sequence of definition/output statements, exactly one
//! `namespace` declaration, more definitions, and one top-level `decode`
//! block. Declarations update the [`IsaCompiler`] context as they are seen;
//! decode statements compose [`GenCode`] values bottom-up into the nested
//! switch of the decode function.
//!
//! Two stacks live here. The default stack carries the inherited `default`
//! case into nested decode blocks that don't declare their own. The format
//! stack tracks the enclosing `format X { ... }` blocks so implicit-format
//! instruction definitions know which format to run.

use std::rc::Rc;

use ahash::AHashSet;
use log::info;

use crate::bitops::subst_bit_ops;
use crate::compiler::{CompiledIsa, IsaCompiler};
use crate::diagnostic::DiagnosticPhase;
use crate::error::{IsaError, SourceLocation};
use crate::eval::{Program, Value};
use crate::format::{Format, FormatParam, InstArgs};
use crate::gencode::GenCode;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::template::SymbolMap;

/// Parses one complete description against the given context.
pub fn parse_spec(
    ctx: &mut IsaCompiler,
    src: &str,
    filename: &str,
) -> Result<CompiledIsa, IsaError> {
    let mut parser = Parser::new(ctx, src, filename)?;
    let result = parser.specification();
    let diagnostics = parser.lexer.take_diagnostics();
    // A fatal error outranks the accumulated diagnostics; they only fail
    // an otherwise clean run.
    let compiled = result?;
    if !diagnostics.is_empty() {
        return Err(IsaError::Diagnostics {
            phase: DiagnosticPhase::Lexical,
            diagnostics,
        });
    }
    Ok(compiled)
}

struct Parser<'a, 'src> {
    ctx: &'a mut IsaCompiler,
    lexer: Lexer<'src>,
    tok: Token,
    /// Inherited `default` cases for nested decode blocks.
    default_stack: Vec<Option<GenCode>>,
    /// Enclosing `format X { ... }` blocks; `None` at the bottom so an
    /// implicit-format definition outside any block is caught.
    format_stack: Vec<Option<Rc<Format>>>,
}

impl<'a, 'src> Parser<'a, 'src> {
    fn new(ctx: &'a mut IsaCompiler, src: &'src str, filename: &str) -> Result<Self, IsaError> {
        let mut lexer = Lexer::new(src, filename);
        let tok = lexer.next_token()?;
        Ok(Parser {
            ctx,
            lexer,
            tok,
            default_stack: vec![None],
            format_stack: vec![None],
        })
    }

    fn location(&self) -> SourceLocation {
        self.lexer.location_at(self.tok.line)
    }

    fn advance(&mut self) -> Result<Token, IsaError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.tok, next))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, IsaError> {
        if self.tok.kind == kind {
            self.advance()
        } else {
            Err(self.syntax_error(what))
        }
    }

    fn expect_id(&mut self, what: &str) -> Result<String, IsaError> {
        match &self.tok.kind {
            TokenKind::Id(_) => {
                let tok = self.advance()?;
                match tok.kind {
                    TokenKind::Id(name) => Ok(name),
                    _ => unreachable!("kind checked before advance"),
                }
            }
            _ => Err(self.syntax_error(what)),
        }
    }

    fn expect_code(&mut self, what: &str) -> Result<String, IsaError> {
        match &self.tok.kind {
            TokenKind::CodeLit(_) => {
                let tok = self.advance()?;
                match tok.kind {
                    TokenKind::CodeLit(code) => Ok(code),
                    _ => unreachable!("kind checked before advance"),
                }
            }
            _ => Err(self.syntax_error(what)),
        }
    }

    fn expect_int(&mut self, what: &str) -> Result<u64, IsaError> {
        match self.tok.kind {
            TokenKind::IntLit(v) => {
                self.advance()?;
                Ok(v)
            }
            _ => Err(self.syntax_error(what)),
        }
    }

    fn syntax_error(&self, expected: &str) -> IsaError {
        IsaError::Parse {
            message: format!("expected {expected}, found {}", self.tok.kind.describe()),
            location: Some(self.location()),
        }
    }

    fn located(&self, err: IsaError, line: usize) -> IsaError {
        err.at(self.lexer.location_at(line))
    }

    // -----------------------------------------------------------------
    // Top level.

    fn specification(&mut self) -> Result<CompiledIsa, IsaError> {
        let global_code = self.defs_and_outputs()?;
        self.expect(TokenKind::Namespace, "'namespace' declaration")?;
        let isa_name = self.expect_id("ISA name")?;
        self.expect(TokenKind::Semi, "';'")?;
        let namespace = format!("{isa_name}Inst");
        info!("compiling ISA description for namespace {namespace}");

        let mut namespace_code = self.defs_and_outputs()?;
        let mut decode = self.decode_block()?;
        self.expect(TokenKind::Eof, "end of input")?;

        // The top-level decode block becomes the decode function body.
        decode.wrap_decode_block(
            &format!(
                "\nStaticInstPtr<{isa_name}>\n{isa_name}::decodeInst({isa_name}::MachInst \
                 machInst)\n{{\n    using namespace {namespace};\n"
            ),
            "}",
        );
        namespace_code.append(decode);
        Ok(CompiledIsa {
            isa_name,
            namespace,
            input_filename: self.lexer.location().file,
            global_code,
            namespace_code,
        })
    }

    /// A possibly empty run of def/output statements, stopped by whatever
    /// follows them (`namespace` or `decode`).
    fn defs_and_outputs(&mut self) -> Result<GenCode, IsaError> {
        let mut code = GenCode::empty(&self.ctx.variants);
        loop {
            match self.tok.kind {
                TokenKind::Def => code.append(self.def_statement()?),
                TokenKind::Output => code.append(self.output_statement()?),
                TokenKind::Let => self.global_let()?,
                _ => return Ok(code),
            }
        }
    }

    fn def_statement(&mut self) -> Result<GenCode, IsaError> {
        let line = self.tok.line;
        self.expect(TokenKind::Def, "'def'")?;
        match self.tok.kind {
            TokenKind::Format => self.def_format().map_err(|e| self.located(e, line)),
            TokenKind::Template => self.def_template(),
            TokenKind::Bitfield | TokenKind::Signed => self.def_bitfield(),
            TokenKind::OperandTypes => {
                self.advance()?;
                let code = self.expect_code("operand type table")?;
                self.expect(TokenKind::Semi, "';'")?;
                self.ctx
                    .operands
                    .define_types(&code)
                    .map_err(|e| self.located(e, line))?;
                Ok(GenCode::empty(&self.ctx.variants))
            }
            TokenKind::Operands => {
                self.advance()?;
                let code = self.expect_code("operand table")?;
                self.expect(TokenKind::Semi, "';'")?;
                self.ctx
                    .operands
                    .define_classes(&code)
                    .map_err(|e| self.located(e, line))?;
                Ok(GenCode::empty(&self.ctx.variants))
            }
            _ => Err(self.syntax_error(
                "'format', 'template', 'bitfield', 'operand_types', or 'operands'",
            )),
        }
    }

    fn def_template(&mut self) -> Result<GenCode, IsaError> {
        self.expect(TokenKind::Template, "'template'")?;
        let name = self.expect_id("template name")?;
        let code = self.expect_code("template body")?;
        self.expect(TokenKind::Semi, "';'")?;
        self.ctx.define_template(name, code);
        Ok(GenCode::empty(&self.ctx.variants))
    }

    /// `def [signed] bitfield NAME <hi:lo>;` or `<bit>;` - emits a macro
    /// that extracts the field from `machInst`.
    fn def_bitfield(&mut self) -> Result<GenCode, IsaError> {
        let signed = if self.tok.kind == TokenKind::Signed {
            self.advance()?;
            true
        } else {
            false
        };
        self.expect(TokenKind::Bitfield, "'bitfield'")?;
        let name = self.expect_id("bitfield name")?;
        self.expect(TokenKind::Less, "'<'")?;
        let hi = self.expect_int("bit index")?;
        let lo = if self.tok.kind == TokenKind::Colon {
            self.advance()?;
            self.expect_int("low bit index")?
        } else {
            hi
        };
        self.expect(TokenKind::Greater, "'>'")?;
        self.expect(TokenKind::Semi, "';'")?;
        if lo > hi {
            return Err(IsaError::Declaration {
                message: format!("bitfield {name}: low bit {lo} above high bit {hi}"),
                location: Some(self.location()),
            });
        }
        let mut expr = format!("bits(machInst, {hi:2}, {lo:2})");
        if signed {
            expr = format!("sext<{}>({expr})", hi - lo + 1);
        }
        let hash_define = format!("#undef {name}\n#define {name}\t{expr}\n");
        GenCode::with_header(&self.ctx.variants, &hash_define)
    }

    fn def_format(&mut self) -> Result<GenCode, IsaError> {
        self.expect(TokenKind::Format, "'format'")?;
        let name = self.expect_id("format name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let params = self.param_list()?;
        self.expect(TokenKind::RParen, "')'")?;
        let code = self.expect_code("format body")?;
        self.expect(TokenKind::Semi, "';'")?;
        self.ctx.define_format(Format::new(name, params, &code)?)?;
        Ok(GenCode::empty(&self.ctx.variants))
    }

    /// Positional parameters, then keyword parameters with defaults, then
    /// an optional trailing `*rest`.
    fn param_list(&mut self) -> Result<Vec<FormatParam>, IsaError> {
        let mut params = Vec::new();
        let mut seen_keyword = false;
        if self.tok.kind == TokenKind::RParen {
            return Ok(params);
        }
        loop {
            if self.tok.kind == TokenKind::Asterisk {
                self.advance()?;
                params.push(FormatParam::Rest(self.expect_id("parameter name")?));
            } else {
                let name = self.expect_id("parameter name")?;
                if self.tok.kind == TokenKind::Equals {
                    self.advance()?;
                    let default = self.dsl_expr()?;
                    seen_keyword = true;
                    params.push(FormatParam::Keyword { name, default });
                } else if seen_keyword {
                    return Err(IsaError::Parse {
                        message: format!(
                            "positional parameter '{name}' after keyword parameter"
                        ),
                        location: Some(self.location()),
                    });
                } else {
                    params.push(FormatParam::Positional(name));
                }
            }
            if self.tok.kind != TokenKind::Comma {
                return Ok(params);
            }
            self.advance()?;
        }
    }

    /// Argument values: bare identifiers and string/code literals are
    /// strings, integer literals are integers, and brackets build lists.
    fn dsl_expr(&mut self) -> Result<Value, IsaError> {
        match &self.tok.kind {
            TokenKind::Id(_) | TokenKind::StrLit(_) | TokenKind::CodeLit(_) => {
                let tok = self.advance()?;
                let text = match tok.kind {
                    TokenKind::Id(s) | TokenKind::StrLit(s) | TokenKind::CodeLit(s) => s,
                    _ => unreachable!("kind checked before advance"),
                };
                Ok(Value::Str(text))
            }
            TokenKind::IntLit(v) => {
                let v = *v;
                self.advance()?;
                Ok(Value::Int(v))
            }
            TokenKind::LBracket => {
                self.advance()?;
                let mut items = Vec::new();
                if self.tok.kind != TokenKind::RBracket {
                    loop {
                        items.push(self.dsl_expr()?);
                        if self.tok.kind != TokenKind::Comma {
                            break;
                        }
                        self.advance()?;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Value::List(items))
            }
            _ => Err(self.syntax_error("argument value")),
        }
    }

    fn global_let(&mut self) -> Result<(), IsaError> {
        let line = self.tok.line;
        self.expect(TokenKind::Let, "'let'")?;
        let code = self.expect_code("let body")?;
        self.expect(TokenKind::Semi, "';'")?;
        let program = Program::compile(&code).map_err(|e| self.located(e, line))?;
        let mut env = std::mem::take(&mut self.ctx.let_bindings);
        let result = program.execute(self.ctx, &mut env);
        self.ctx.let_bindings = env;
        result.map_err(|err| match err {
            IsaError::Declaration { message, location } => self.located(
                IsaError::Declaration {
                    message: format!("in global let block: {message}"),
                    location,
                },
                line,
            ),
            other => other,
        })
    }

    fn output_statement(&mut self) -> Result<GenCode, IsaError> {
        let line = self.tok.line;
        self.expect(TokenKind::Output, "'output'")?;
        let channel = self.advance()?;
        let code = self.expect_code("output body")?;
        self.expect(TokenKind::Semi, "';'")?;
        let processed = self.process_output(&code).map_err(|e| self.located(e, line))?;
        match channel.kind {
            TokenKind::Header => GenCode::with_header(&self.ctx.variants, &processed),
            TokenKind::Decoder => GenCode::with_decoder(&self.ctx.variants, &processed),
            TokenKind::Exec => GenCode::with_exec(&self.ctx.variants, &processed),
            _ => Err(IsaError::Parse {
                message: format!(
                    "expected 'header', 'decoder', or 'exec', found {}",
                    channel.kind.describe()
                ),
                location: Some(self.lexer.location_at(channel.line)),
            }),
        }
    }

    /// Output blocks get template interpolation and bit-selector rewriting;
    /// CPU-specific symbols stay put for per-variant expansion.
    fn process_output(&self, code: &str) -> Result<String, IsaError> {
        let interpolated =
            crate::template::Template::new(code).subst(&SymbolMap::new(), &self.ctx.templates)?;
        subst_bit_ops(&interpolated)
    }

    // -----------------------------------------------------------------
    // Decode blocks.

    /// `decode FIELD [default inst] { stmts }`
    fn decode_block(&mut self) -> Result<GenCode, IsaError> {
        self.expect(TokenKind::Decode, "'decode'")?;
        let field = self.expect_id("decode field")?;
        if self.tok.kind == TokenKind::Default {
            self.advance()?;
            let mut inst = self.inst()?;
            inst.wrap_decode_block("\ndefault:\n", "break;\n");
            self.default_stack.push(Some(inst));
        } else {
            // Inherit the enclosing block's default.
            let top = self.default_stack.last().cloned().unwrap_or(None);
            self.default_stack.push(top);
        }
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut seen_labels = AHashSet::new();
        let mut code = self.decode_stmt_list(&mut seen_labels)?;
        self.expect(TokenKind::RBrace, "'}'")?;

        let inherited = self.default_stack.pop().expect("pushed above");
        if !code.has_decode_default {
            if let Some(default) = inherited {
                code.append(default);
            }
        }
        code.wrap_decode_block(&format!("switch ({field}) {{\n"), "}\n");
        Ok(code)
    }

    /// Statements until the closing brace. `seen_labels` spans format
    /// blocks, which share the enclosing switch's case space.
    fn decode_stmt_list(&mut self, seen_labels: &mut AHashSet<u64>) -> Result<GenCode, IsaError> {
        let mut code = GenCode::empty(&self.ctx.variants);
        while self.tok.kind != TokenKind::RBrace {
            let line = self.tok.line;
            let stmt = self.decode_stmt(seen_labels)?;
            if code.has_decode_default && stmt.has_decode_default {
                return Err(IsaError::Declaration {
                    message: "two default cases in decode block".into(),
                    location: Some(self.lexer.location_at(line)),
                });
            }
            code.append(stmt);
        }
        Ok(code)
    }

    fn decode_stmt(&mut self, seen_labels: &mut AHashSet<u64>) -> Result<GenCode, IsaError> {
        match &self.tok.kind {
            // Directives replicate to every channel so an #ifdef guards
            // both the declarations and the decode case.
            TokenKind::CppDirective(_) => {
                let tok = self.advance()?;
                let text = match tok.kind {
                    TokenKind::CppDirective(text) => text,
                    _ => unreachable!("kind checked before advance"),
                };
                GenCode::from_parts(&self.ctx.variants, &text, &text, &text, &text)
            }
            TokenKind::Format => self.format_block(seen_labels),
            _ => self.labeled_stmt(seen_labels),
        }
    }

    /// `format NAME { stmts }` - pushes the format for the enclosed
    /// statements.
    fn format_block(&mut self, seen_labels: &mut AHashSet<u64>) -> Result<GenCode, IsaError> {
        self.expect(TokenKind::Format, "'format'")?;
        let line = self.tok.line;
        let name = self.expect_id("format name")?;
        let format = self.lookup_format(&name, line)?;
        self.format_stack.push(Some(format));
        self.expect(TokenKind::LBrace, "'{'")?;
        let result = self.decode_stmt_list(seen_labels);
        self.format_stack.pop();
        let code = result?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(code)
    }

    fn lookup_format(&self, name: &str, line: usize) -> Result<Rc<Format>, IsaError> {
        self.ctx.formats.get(name).cloned().ok_or_else(|| {
            IsaError::Declaration {
                message: format!("instruction format \"{name}\" not defined"),
                location: Some(self.lexer.location_at(line)),
            }
        })
    }

    /// `label : inst ;` or `label : decode ... { ... }`
    fn labeled_stmt(&mut self, seen_labels: &mut AHashSet<u64>) -> Result<GenCode, IsaError> {
        let line = self.tok.line;
        let label = self.case_label(seen_labels)?;
        let is_default = label == "default";
        self.expect(TokenKind::Colon, "':'")?;
        let mut code = if self.tok.kind == TokenKind::Decode {
            let mut block = self.decode_block()?;
            block.wrap_decode_block(&format!("\n{label}:\n"), "");
            block
        } else {
            let mut inst = self.inst().map_err(|e| self.located(e, line))?;
            self.expect(TokenKind::Semi, "';'")?;
            inst.wrap_decode_block(&format!("\n{label}:"), "break;\n");
            inst
        };
        code.has_decode_default = is_default;
        Ok(code)
    }

    /// Either `default` or one or more integer constants; repeated
    /// constants within one decode block are a defect in the description.
    fn case_label(&mut self, seen_labels: &mut AHashSet<u64>) -> Result<String, IsaError> {
        if self.tok.kind == TokenKind::Default {
            self.advance()?;
            return Ok("default".to_string());
        }
        let mut values = Vec::new();
        loop {
            let line = self.tok.line;
            let value = self.expect_int("case constant or 'default'")?;
            if !seen_labels.insert(value) {
                return Err(IsaError::Declaration {
                    message: format!("duplicate case value {value:#x} in decode block"),
                    location: Some(self.lexer.location_at(line)),
                });
            }
            values.push(value);
            if self.tok.kind != TokenKind::Comma {
                break;
            }
            self.advance()?;
        }
        Ok(values
            .iter()
            .map(|v| format!("case {v:#x}"))
            .collect::<Vec<_>>()
            .join(": "))
    }

    /// `name(args)` using the enclosing format, or `Fmt::name(args)`.
    fn inst(&mut self) -> Result<GenCode, IsaError> {
        let line = self.tok.line;
        let first = self.expect_id("instruction mnemonic")?;
        let (format, name) = if self.tok.kind == TokenKind::DblColon {
            self.advance()?;
            let name = self.expect_id("instruction mnemonic")?;
            (self.lookup_format(&first, line)?, name)
        } else {
            let current = self
                .format_stack
                .last()
                .cloned()
                .unwrap_or(None)
                .ok_or_else(|| IsaError::Declaration {
                    message: format!(
                        "instruction definition \"{first}\" with no active format"
                    ),
                    location: Some(self.lexer.location_at(line)),
                })?;
            (current, first)
        };
        self.expect(TokenKind::LParen, "'('")?;
        let args = self.arg_list()?;
        self.expect(TokenKind::RParen, "')'")?;

        let mut code = format
            .define_inst(self.ctx, &name, &args)
            .map_err(|e| self.located(e, line))?;
        // Tracing comment ahead of everything this definition generated;
        // multi-line argument values stay inside the comment.
        let args_text = args.describe().replace('\n', "\n//");
        code.prepend_all(&format!("\n// {}::{name}({args_text})\n", format.name));
        Ok(code)
    }

    /// Positional argument values followed by `key=value` pairs.
    fn arg_list(&mut self) -> Result<InstArgs, IsaError> {
        let mut args = InstArgs::default();
        if self.tok.kind == TokenKind::RParen {
            return Ok(args);
        }
        loop {
            match &self.tok.kind {
                TokenKind::Id(_) => {
                    let name = self.expect_id("argument")?;
                    if self.tok.kind == TokenKind::Equals {
                        self.advance()?;
                        let value = self.dsl_expr()?;
                        args.keyword.push((name, value));
                    } else if args.keyword.is_empty() {
                        args.positional.push(Value::Str(name));
                    } else {
                        return Err(IsaError::Parse {
                            message: "positional argument after keyword argument".into(),
                            location: Some(self.location()),
                        });
                    }
                }
                _ => {
                    let value = self.dsl_expr()?;
                    if !args.keyword.is_empty() {
                        return Err(IsaError::Parse {
                            message: "positional argument after keyword argument".into(),
                            location: Some(self.location()),
                        });
                    }
                    args.positional.push(value);
                }
            }
            if self.tok.kind != TokenKind::Comma {
                return Ok(args);
            }
            self.advance()?;
        }
    }
}
