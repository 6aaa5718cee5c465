//! Instruction formats.
//!
//! A `def format` statement declares a parameterized body that turns one
//! instruction definition (`name(args)` inside a decode block) into
//! generated code. Parameters are positional names, keyword names with
//! default values, and optionally a trailing `*rest` collector for excess
//! positional arguments. The body is compiled into a statement
//! [`Program`] at definition time, so a malformed body is reported where
//! the format is defined rather than where it is first used.

use crate::compiler::IsaCompiler;
use crate::error::IsaError;
use crate::eval::{Env, Program, Value};
use crate::gencode::GenCode;

#[derive(Debug, Clone)]
pub enum FormatParam {
    Positional(String),
    Keyword { name: String, default: Value },
    /// `*name`: collects excess positional arguments into a list.
    Rest(String),
}

impl FormatParam {
    fn name(&self) -> &str {
        match self {
            FormatParam::Positional(name) => name,
            FormatParam::Keyword { name, .. } => name,
            FormatParam::Rest(name) => name,
        }
    }
}

/// Arguments of one instruction definition inside a decode block.
#[derive(Debug, Clone, Default)]
pub struct InstArgs {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl InstArgs {
    /// Rendering used in the tracing comment prepended to each
    /// instruction's generated code.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.positional.iter().map(|v| v.to_string()).collect();
        parts.extend(self.keyword.iter().map(|(k, v)| format!("{k}={v}")));
        parts.join(", ")
    }
}

#[derive(Debug)]
pub struct Format {
    pub name: String,
    params: Vec<FormatParam>,
    body: Program,
}

/// First character upper-cased, the rest lower-cased; `addq` and `ADDQ`
/// both yield `Addq`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}

impl Format {
    pub fn new(
        name: impl Into<String>,
        params: Vec<FormatParam>,
        code: &str,
    ) -> Result<Self, IsaError> {
        let name = name.into();
        for (i, param) in params.iter().enumerate() {
            if matches!(param, FormatParam::Rest(_)) && i + 1 != params.len() {
                return Err(IsaError::declaration(format!(
                    "format '{name}': '*{}' must be the last parameter",
                    param.name()
                )));
            }
            if params[..i].iter().any(|p| p.name() == param.name()) {
                return Err(IsaError::declaration(format!(
                    "format '{name}': duplicate parameter '{}'",
                    param.name()
                )));
            }
        }
        let body = Program::compile(code)
            .map_err(|err| match err {
                IsaError::Declaration { message, location } => IsaError::Declaration {
                    message: format!("in format '{name}': {message}"),
                    location,
                },
                other => other,
            })?;
        Ok(Format { name, params, body })
    }

    /// Binds call arguments to parameters with function-call semantics:
    /// positional arguments fill parameters in order (keyword parameters
    /// included), excess positionals go to the `*rest` collector, keyword
    /// arguments match parameters by name, and unfilled keyword parameters
    /// fall back to their defaults.
    fn bind(&self, args: &InstArgs, env: &mut Env) -> Result<(), IsaError> {
        let named: Vec<&FormatParam> = self
            .params
            .iter()
            .filter(|p| !matches!(p, FormatParam::Rest(_)))
            .collect();
        let rest = self.params.iter().find_map(|p| match p {
            FormatParam::Rest(name) => Some(name.as_str()),
            _ => None,
        });

        let mut bound: Vec<Option<Value>> = vec![None; named.len()];
        let mut positional = args.positional.iter();
        for slot in bound.iter_mut() {
            match positional.next() {
                Some(value) => *slot = Some(value.clone()),
                None => break,
            }
        }
        let excess: Vec<Value> = positional.cloned().collect();
        match rest {
            Some(rest) => {
                env.insert(rest.to_string(), Value::List(excess));
            }
            None if !excess.is_empty() => {
                return Err(IsaError::declaration(format!(
                    "format '{}' takes at most {} argument(s), {} given",
                    self.name,
                    named.len(),
                    args.positional.len()
                )));
            }
            None => {}
        }

        for (key, value) in &args.keyword {
            let Some(idx) = named.iter().position(|p| p.name() == key) else {
                return Err(IsaError::declaration(format!(
                    "format '{}' has no parameter '{key}'",
                    self.name
                )));
            };
            if bound[idx].is_some() {
                return Err(IsaError::declaration(format!(
                    "format '{}': multiple values for parameter '{key}'",
                    self.name
                )));
            }
            bound[idx] = Some(value.clone());
        }

        for (param, value) in named.iter().zip(bound) {
            let value = match (value, param) {
                (Some(v), _) => v,
                (None, FormatParam::Keyword { default, .. }) => default.clone(),
                (None, _) => {
                    return Err(IsaError::declaration(format!(
                        "format '{}': missing argument '{}'",
                        self.name,
                        param.name()
                    )));
                }
            };
            env.insert(param.name().to_string(), value);
        }
        Ok(())
    }

    /// Runs the format body for one instruction definition and harvests the
    /// four output channels. Anything else the body assigned stays local.
    pub fn define_inst(
        &self,
        ctx: &IsaCompiler,
        name: &str,
        args: &InstArgs,
    ) -> Result<GenCode, IsaError> {
        let mut env = ctx.let_bindings.clone();
        env.insert("name".to_string(), Value::Str(name.to_string()));
        env.insert("Name".to_string(), Value::Str(capitalize(name)));
        self.bind(args, &mut env)?;
        self.body.execute(ctx, &mut env).map_err(|err| match err {
            IsaError::Declaration { message, location } => IsaError::Declaration {
                message: format!("error defining \"{name}\": {message}"),
                location,
            },
            other => other,
        })?;

        let channel = |key: &str| -> Result<String, IsaError> {
            match env.get(key) {
                None => Ok(String::new()),
                Some(Value::Str(s)) => Ok(s.clone()),
                Some(other) => Err(IsaError::declaration(format!(
                    "format '{}' produced {} for '{key}'; channels must be strings",
                    self.name,
                    other.type_name()
                ))),
            }
        };
        GenCode::from_parts(
            &ctx.variants,
            &channel("header_output")?,
            &channel("decoder_output")?,
            &channel("exec_output")?,
            &channel("decode_block")?,
        )
    }
}
