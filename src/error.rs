use std::fmt;

use crate::diagnostic::{DiagnosticPhase, IsaDiagnostic};

/// Source position for an error, including the trail of files the offending
/// line was included from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Enclosing files, outermost first, that `##include`d the current file.
    pub included_from: Vec<String>,
    pub file: String,
    pub line: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            included_from: Vec::new(),
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pad = String::new();
        for outer in &self.included_from {
            writeln!(f, "{pad}In file included from {outer}")?;
            pad.push_str("  ");
        }
        write!(f, "{pad}{}:{}", self.file, self.line)
    }
}

/// Represents any failure that can occur while lexing, parsing, or
/// generating code from an ISA description.
#[derive(Debug)]
pub enum IsaError {
    Io(std::io::Error),
    /// Missing or unreadable `##include` target.
    Include { path: String },
    /// Grammar violation or unexpected token.
    Parse {
        message: String,
        location: Option<SourceLocation>,
    },
    /// Malformed declaration content: redefinition, unknown symbol,
    /// inconsistent operand usage, duplicate default case, and so on.
    Declaration {
        message: String,
        location: Option<SourceLocation>,
    },
    /// A defect in the description or the compiler itself (e.g. an
    /// unmatched parenthesis uncovered during bit-slice rewriting).
    Internal(String),
    /// Accumulated non-fatal diagnostics that ultimately failed the run.
    Diagnostics {
        phase: DiagnosticPhase,
        diagnostics: Vec<IsaDiagnostic>,
    },
}

impl IsaError {
    pub fn declaration(message: impl Into<String>) -> Self {
        IsaError::Declaration {
            message: message.into(),
            location: None,
        }
    }

    /// Attaches a source location to errors raised below the grammar layer,
    /// leaving already-located errors untouched.
    pub fn at(self, loc: SourceLocation) -> Self {
        match self {
            IsaError::Parse {
                message,
                location: None,
            } => IsaError::Parse {
                message,
                location: Some(loc),
            },
            IsaError::Declaration {
                message,
                location: None,
            } => IsaError::Declaration {
                message,
                location: Some(loc),
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for IsaError {
    fn from(err: std::io::Error) -> Self {
        IsaError::Io(err)
    }
}

fn write_located(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    message: &str,
    location: &Option<SourceLocation>,
) -> fmt::Result {
    match location {
        Some(loc) => write!(f, "{loc}: {kind}: {message}"),
        None => write!(f, "{kind}: {message}"),
    }
}

impl fmt::Display for IsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsaError::Io(err) => write!(f, "I/O error: {err}"),
            IsaError::Include { path } => write!(f, "error including file \"{path}\""),
            IsaError::Parse { message, location } => {
                write_located(f, "syntax error", message, location)
            }
            IsaError::Declaration { message, location } => {
                write_located(f, "error", message, location)
            }
            IsaError::Internal(msg) => write!(f, "internal error: {msg}"),
            IsaError::Diagnostics { phase, diagnostics } => {
                write!(f, "{} error(s) during {phase}", diagnostics.len())?;
                for diag in diagnostics {
                    write!(f, "\n  {diag}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for IsaError {}
