//! Compilation context and entry points.
//!
//! An [`IsaCompiler`] owns everything a description accumulates as it is
//! parsed: the engine variants to generate for, the template and format
//! registries, the operand model, and the bindings established by global
//! `let` blocks. One context compiles one description; the parser threads
//! it through every declaration.

use std::path::Path;

use ahash::AHashMap;
use indexmap::IndexMap;
use log::debug;
use std::rc::Rc;

use crate::error::IsaError;
use crate::eval::Env;
use crate::format::Format;
use crate::gencode::{CpuVariant, GenCode};
use crate::parser;
use crate::preprocess::preprocess;
use crate::template::Template;

pub struct IsaCompiler {
    pub variants: Vec<CpuVariant>,
    pub templates: IndexMap<String, Template>,
    pub formats: AHashMap<String, Rc<Format>>,
    pub operands: crate::operand::OperandModel,
    /// Bindings accumulated by global `let` blocks, visible to every
    /// format body.
    pub let_bindings: Env,
}

/// The parsed and generated result of one description: code outside the
/// ISA namespace, code inside it, and the names needed to frame the
/// output files.
#[derive(Debug)]
pub struct CompiledIsa {
    pub isa_name: String,
    pub namespace: String,
    /// Description filename recorded in the generated-file banner.
    pub input_filename: String,
    pub global_code: GenCode,
    pub namespace_code: GenCode,
}

impl IsaCompiler {
    pub fn new(variants: Vec<CpuVariant>) -> Self {
        Self {
            variants,
            templates: IndexMap::new(),
            formats: AHashMap::new(),
            operands: crate::operand::OperandModel::new(),
            let_bindings: Env::default(),
        }
    }

    /// Registers a template. Redefinition silently replaces the previous
    /// text, which lets a description refine shared templates per subtree.
    pub fn define_template(&mut self, name: impl Into<String>, text: impl Into<String>) {
        let name = name.into();
        debug!("template '{name}' defined");
        self.templates.insert(name, Template::new(text.into()));
    }

    /// Registers a format. Formats may not be redefined.
    pub fn define_format(&mut self, format: Format) -> Result<(), IsaError> {
        if self.formats.contains_key(&format.name) {
            return Err(IsaError::declaration(format!(
                "format {} redefined",
                format.name
            )));
        }
        debug!("format '{}' defined", format.name);
        self.formats.insert(format.name.clone(), Rc::new(format));
        Ok(())
    }

    /// Compiles an already include-expanded description.
    pub fn compile_str(&mut self, src: &str, filename: &str) -> Result<CompiledIsa, IsaError> {
        parser::parse_spec(self, src, filename)
    }

    /// Reads, include-expands, and compiles a description file. Include
    /// paths resolve against the file's directory.
    pub fn compile_file(&mut self, path: &Path) -> Result<CompiledIsa, IsaError> {
        let src = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let expanded = preprocess(&src, base_dir)?;
        self.compile_str(&expanded, &short_filename(path))
    }
}

/// Last three path components, matching what the generated-file banner
/// shows for descriptions living under an arch tree.
fn short_filename(path: &Path) -> String {
    let parts: Vec<&str> = path
        .iter()
        .filter_map(|c| c.to_str())
        .collect();
    let start = parts.len().saturating_sub(3);
    parts[start..].join("/")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_variants() -> Vec<CpuVariant> {
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
        ]
    }

    pub(crate) fn test_compiler() -> IsaCompiler {
        IsaCompiler::new(test_variants())
    }

    #[test]
    fn short_filename_keeps_three_components() {
        assert_eq!(
            short_filename(Path::new("/src/arch/alpha/isa_desc")),
            "arch/alpha/isa_desc"
        );
        assert_eq!(short_filename(Path::new("isa_desc")), "isa_desc");
    }

    #[test]
    fn format_redefinition_is_rejected() {
        let mut ctx = test_compiler();
        ctx.define_format(Format::new("Foo", Vec::new(), "decode_block = name").unwrap())
            .expect("first definition");
        let err = ctx
            .define_format(Format::new("Foo", Vec::new(), "decode_block = name").unwrap())
            .unwrap_err();
        match err {
            IsaError::Declaration { message, .. } => {
                assert!(message.contains("format Foo redefined"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn template_redefinition_replaces() {
        let mut ctx = test_compiler();
        ctx.define_template("T", "first");
        ctx.define_template("T", "second");
        assert_eq!(ctx.templates["T"].text(), "second");
    }
}
