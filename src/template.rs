//! Named text templates with `%(name)s` substitution.
//!
//! Templates are registered by `def template` statements and expanded by
//! format bodies (via `Name.subst(iop)`) or interpolated into `output`
//! blocks. CPU-specific references (`%(CPU_foo)s`) are deliberately left in
//! place here; they are resolved per engine variant when the text enters a
//! [`GenCode`](crate::gencode::GenCode).

use indexmap::IndexMap;

use crate::error::IsaError;

/// Symbol table supplied to a substitution: attribute name to text.
pub type SymbolMap = IndexMap<String, String>;

#[derive(Debug, Clone)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Expands every `%(name)s` reference from `symbols`, falling back to
    /// `templates` so templates can interpolate each other. A `%` not
    /// followed by `(` is literal text. Unknown names are an error: a
    /// template referencing a symbol its instruction never produced is a
    /// defect in the description.
    pub fn subst(
        &self,
        symbols: &SymbolMap,
        templates: &IndexMap<String, Template>,
    ) -> Result<String, IsaError> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(i) = rest.find("%(") {
            out.push_str(&rest[..i]);
            let after = &rest[i + 2..];
            let Some(close) = after.find(')') else {
                return Err(IsaError::declaration(
                    "unterminated %(...)s reference in template",
                ));
            };
            let name = &after[..close];
            let tail = &after[close + 1..];
            if !tail.starts_with('s') {
                return Err(IsaError::declaration(format!(
                    "malformed template reference %({name})"
                )));
            }
            if name.starts_with("CPU_") {
                // Deferred to per-variant expansion.
                out.push_str(&rest[i..i + 2 + close + 2]);
            } else if let Some(value) = symbols.get(name) {
                out.push_str(value);
            } else if let Some(template) = templates.get(name) {
                out.push_str(&template.text);
            } else {
                return Err(IsaError::declaration(format!(
                    "template reference to undefined symbol '{name}'"
                )));
            }
            rest = &rest[i + 2 + close + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_templates() -> IndexMap<String, Template> {
        IndexMap::new()
    }

    fn symbols(pairs: &[(&str, &str)]) -> SymbolMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_named_symbols() {
        let t = Template::new("class %(class_name)s : public %(base_class)s {};");
        let out = t
            .subst(
                &symbols(&[("class_name", "Addq"), ("base_class", "AlphaStaticInst")]),
                &no_templates(),
            )
            .expect("subst");
        assert_eq!(out, "class Addq : public AlphaStaticInst {};");
    }

    #[test]
    fn bare_percent_is_literal() {
        let t = Template::new("printf(\"%d\\n\", x);");
        let out = t.subst(&symbols(&[]), &no_templates()).expect("subst");
        assert_eq!(out, "printf(\"%d\\n\", x);");
    }

    #[test]
    fn cpu_references_are_deferred() {
        let t = Template::new("%(CPU_exec_context)s *xc");
        let out = t.subst(&symbols(&[]), &no_templates()).expect("subst");
        assert_eq!(out, "%(CPU_exec_context)s *xc");
    }

    #[test]
    fn templates_interpolate_into_each_other() {
        let mut templates = IndexMap::new();
        templates.insert("Epilogue".to_string(), Template::new("return fault;"));
        let t = Template::new("{ %(Epilogue)s }");
        let out = t.subst(&symbols(&[]), &templates).expect("subst");
        assert_eq!(out, "{ return fault; }");
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let t = Template::new("%(nope)s");
        let err = t.subst(&symbols(&[]), &no_templates()).unwrap_err();
        assert!(matches!(err, IsaError::Declaration { .. }));
    }
}
