//! Multi-channel accumulation of generated text.
//!
//! Every grammar production yields a [`GenCode`] carrying four output
//! channels: declarations, decoder body, the decode dispatch block, and one
//! execution body per registered engine variant. Productions compose
//! bottom-up by channel-wise concatenation.

use indexmap::IndexMap;

use crate::error::IsaError;

/// One execution-engine consumer of the ISA description. The list of
/// variants is configuration supplied by the caller, never discovered from
/// the DSL source.
#[derive(Debug, Clone)]
pub struct CpuVariant {
    pub name: String,
    /// Output filename for this variant's execution unit.
    pub filename: String,
    /// Extra `#include` lines for the execution unit.
    pub includes: String,
    /// Per-variant symbols substitutable as `%(CPU_foo)s`.
    pub strings: IndexMap<String, String>,
}

impl CpuVariant {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        includes: impl Into<String>,
        strings: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            includes: includes.into(),
            strings: strings.into_iter().collect(),
        }
    }
}

/// Substitutes every `%(CPU_key)s` reference in `text` using one variant's
/// symbol table. Non-CPU substitutions are left untouched.
fn expand_for_variant(text: &str, variant: &CpuVariant) -> Result<String, IsaError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(i) = rest.find("%(CPU_") {
        out.push_str(&rest[..i]);
        let after = &rest[i + 2..]; // past "%("
        let Some(close) = after.find(')') else {
            return Err(IsaError::declaration(format!(
                "malformed CPU-specific reference in \"{text}\""
            )));
        };
        let key = &after[..close];
        if !after[close + 1..].starts_with('s') {
            return Err(IsaError::declaration(format!(
                "malformed CPU-specific reference %({key})"
            )));
        }
        let Some(value) = variant.strings.get(key) else {
            return Err(IsaError::declaration(format!(
                "unknown CPU-specific symbol '{key}' for engine variant '{}'",
                variant.name
            )));
        };
        out.push_str(value);
        rest = &rest[i + 2 + close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn has_cpu_refs(text: &str) -> bool {
    text.contains("%(CPU_")
}

/// If `text` carries CPU-specific references, concatenates one expanded
/// copy per variant; otherwise returns it unchanged.
fn expand_to_string(text: &str, variants: &[CpuVariant]) -> Result<String, IsaError> {
    if !has_cpu_refs(text) {
        return Ok(text.to_string());
    }
    let mut out = String::new();
    for variant in variants {
        out.push_str(&expand_for_variant(text, variant)?);
    }
    Ok(out)
}

fn expand_to_map(
    text: &str,
    variants: &[CpuVariant],
) -> Result<IndexMap<String, String>, IsaError> {
    let mut map = IndexMap::with_capacity(variants.len());
    for variant in variants {
        map.insert(variant.name.clone(), expand_for_variant(text, variant)?);
    }
    Ok(map)
}

/// Indents every line by two spaces, except preprocessor directive lines.
/// The position after a trailing newline counts as a line start, which is
/// what aligns the closing brace of a wrapped block.
pub fn indent(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    let mut rest = s;
    loop {
        if !rest.starts_with('#') {
            out.push_str("  ");
        }
        match rest.find('\n') {
            Some(i) => {
                out.push_str(&rest[..=i]);
                rest = &rest[i + 1..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Generated code destined for the output files: declaration text, decoder
/// body text, decode dispatch text, and per-variant execution body text.
/// Every value carries an entry for every registered variant, so channel
/// concatenation always lines up.
#[derive(Debug, Clone)]
pub struct GenCode {
    pub header_output: String,
    pub decoder_output: String,
    pub decode_block: String,
    pub exec_output: IndexMap<String, String>,
    /// Whether this code contains an explicit decode `default:` case. Used
    /// to let explicit defaults override inherited ones.
    pub has_decode_default: bool,
}

impl GenCode {
    pub fn empty(variants: &[CpuVariant]) -> Self {
        Self {
            header_output: String::new(),
            decoder_output: String::new(),
            decode_block: String::new(),
            exec_output: variants
                .iter()
                .map(|v| (v.name.clone(), String::new()))
                .collect(),
            has_decode_default: false,
        }
    }

    /// Builds a value from raw channel text, expanding CPU-specific symbols:
    /// per-variant for the exec channel, collapsed to a single string for
    /// the others.
    pub fn from_parts(
        variants: &[CpuVariant],
        header: &str,
        decoder: &str,
        exec: &str,
        decode: &str,
    ) -> Result<Self, IsaError> {
        Ok(Self {
            header_output: expand_to_string(header, variants)?,
            decoder_output: expand_to_string(decoder, variants)?,
            decode_block: expand_to_string(decode, variants)?,
            exec_output: expand_to_map(exec, variants)?,
            has_decode_default: false,
        })
    }

    pub fn with_header(variants: &[CpuVariant], header: &str) -> Result<Self, IsaError> {
        Self::from_parts(variants, header, "", "", "")
    }

    pub fn with_decoder(variants: &[CpuVariant], decoder: &str) -> Result<Self, IsaError> {
        Self::from_parts(variants, "", decoder, "", "")
    }

    pub fn with_exec(variants: &[CpuVariant], exec: &str) -> Result<Self, IsaError> {
        Self::from_parts(variants, "", "", exec, "")
    }

    /// Channel-wise concatenation. Both operands always carry the same
    /// variant set since every value is built from the same registry.
    pub fn append(&mut self, other: GenCode) {
        debug_assert_eq!(
            self.exec_output.keys().collect::<Vec<_>>(),
            other.exec_output.keys().collect::<Vec<_>>(),
            "GenCode variant sets must line up"
        );
        self.header_output.push_str(&other.header_output);
        self.decoder_output.push_str(&other.decoder_output);
        self.decode_block.push_str(&other.decode_block);
        for (name, text) in other.exec_output {
            self.exec_output.entry(name).or_default().push_str(&text);
        }
        self.has_decode_default |= other.has_decode_default;
    }

    /// Prefixes every channel with `pre` (typically a comment).
    pub fn prepend_all(&mut self, pre: &str) {
        self.header_output.insert_str(0, pre);
        self.decoder_output.insert_str(0, pre);
        self.decode_block.insert_str(0, pre);
        for text in self.exec_output.values_mut() {
            text.insert_str(0, pre);
        }
    }

    /// Wraps the decode channel only, indenting the existing text; used to
    /// build the nested switch statement.
    pub fn wrap_decode_block(&mut self, pre: &str, post: &str) {
        let body = indent(&self.decode_block);
        self.decode_block = format!("{pre}{body}{post}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants() -> Vec<CpuVariant> {
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

    #[test]
    fn exec_channel_expands_per_variant() {
        let v = variants();
        let code = GenCode::with_exec(&v, "%(CPU_exec_context)s::go();\n").expect("build");
        assert_eq!(code.exec_output["SimpleCPU"], "SimpleCPU::go();\n");
        assert_eq!(code.exec_output["FastCPU"], "FastCPU::go();\n");
    }

    #[test]
    fn header_collapses_cpu_refs_across_variants() {
        let v = variants();
        let code = GenCode::with_header(&v, "class %(CPU_exec_context)s;\n").expect("build");
        assert_eq!(
            code.header_output,
            "class SimpleCPU;\nclass FastCPU;\n"
        );
    }

    #[test]
    fn unknown_cpu_symbol_is_an_error() {
        let v = variants();
        let err = GenCode::with_exec(&v, "%(CPU_missing)s").unwrap_err();
        assert!(matches!(err, IsaError::Declaration { .. }));
    }

    #[test]
    fn append_concatenates_every_channel() {
        let v = variants();
        let mut a = GenCode::from_parts(&v, "h1", "d1", "e1", "b1").expect("build");
        let b = GenCode::from_parts(&v, "h2", "d2", "e2", "b2").expect("build");
        a.append(b);
        assert_eq!(a.header_output, "h1h2");
        assert_eq!(a.decoder_output, "d1d2");
        assert_eq!(a.decode_block, "b1b2");
        assert_eq!(a.exec_output["SimpleCPU"], "e1e2");
        assert_eq!(a.exec_output["FastCPU"], "e1e2");
    }

    #[test]
    fn wrap_indents_all_but_directive_lines() {
        let v = variants();
        let mut code = GenCode::empty(&v);
        code.decode_block = "case 0x1: x();\n#ifdef FOO\ncase 0x2: y();\n#endif\n".into();
        code.wrap_decode_block("switch (OP) {\n", "}\n");
        assert_eq!(
            code.decode_block,
            "switch (OP) {\n  case 0x1: x();\n#ifdef FOO\n  case 0x2: y();\n#endif\n  }\n"
        );
    }

    #[test]
    fn indent_treats_trailing_newline_as_line_start() {
        assert_eq!(indent("a\n"), "  a\n  ");
    }
}
