//! Compiler for declarative ISA descriptions.
//!
//! A description declares operand types and classes, instruction formats,
//! text templates, bitfield macros, and a nested `decode` tree. Compiling
//! it yields decoder source text (a declaration header plus the decode
//! function) and one execution unit per configured engine variant.
//!
//! The pipeline: [`preprocess`](preprocess::preprocess) splices
//! `##include`s, [`Lexer`](lexer::Lexer) tokenizes,
//! [`parse_spec`](parser::parse_spec) drives the grammar against an
//! [`IsaCompiler`] context, and [`CompiledIsa`] renders and writes the
//! output files.

pub mod bitops;
pub mod codeblock;
pub mod compiler;
pub mod diagnostic;
pub mod error;
pub mod eval;
pub mod format;
pub mod gencode;
pub mod lexer;
pub mod operand;
pub mod output;
pub mod parser;
pub mod preprocess;
pub mod template;

pub use compiler::{CompiledIsa, IsaCompiler};
pub use error::IsaError;
pub use gencode::{CpuVariant, GenCode};

/// The stock engine variants. A variant's `strings` table is the only
/// engine-specific information anywhere; descriptions themselves stay
/// engine-neutral.
pub fn default_variants() -> Vec<CpuVariant> {
    vec![
        CpuVariant::new(
            "SimpleCPU",
            "simple_cpu_exec.cc",
            "#include \"cpu/simple/cpu.hh\"",
            [("CPU_exec_context".to_string(), "SimpleCPU".to_string())],
        ),
        CpuVariant::new(
            "FastCPU",
            "fast_cpu_exec.cc",
            "#include \"cpu/fast/cpu.hh\"",
            [("CPU_exec_context".to_string(), "FastCPU".to_string())],
        ),
        CpuVariant::new(
            "FullCPU",
            "full_cpu_exec.cc",
            "#include \"encumbered/cpu/full/dyn_inst.hh\"",
            [("CPU_exec_context".to_string(), "DynInst".to_string())],
        ),
    ]
}
