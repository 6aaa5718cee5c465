//! Non-fatal diagnostic records collected while a compilation proceeds.
//!
//! Only lexical problems are recoverable; everything else aborts with an
//! [`IsaError`](crate::error::IsaError) as soon as it is detected.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticPhase {
    Lexical,
    Parse,
    Declaration,
}

impl fmt::Display for DiagnosticPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticPhase::Lexical => write!(f, "lexical analysis"),
            DiagnosticPhase::Parse => write!(f, "parsing"),
            DiagnosticPhase::Declaration => write!(f, "declaration processing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsaDiagnostic {
    pub phase: DiagnosticPhase,
    pub code: &'static str,
    pub message: String,
    pub file: String,
    pub line: usize,
}

impl IsaDiagnostic {
    pub fn new(
        phase: DiagnosticPhase,
        code: &'static str,
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            phase,
            code,
            message: message.into(),
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for IsaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}]",
            self.file, self.line, self.message, self.code
        )
    }
}
