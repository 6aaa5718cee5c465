//! Bit-slice selector rewriting.
//!
//! Pseudocode fragments may select bits with `expr<hi:lo>` or `expr<bit>`.
//! Both forms are rewritten into explicit `bits(expr, hi, lo)` calls before
//! the fragment text is emitted. A selector applied to a parenthesized
//! expression requires a backward scan to find the matching open paren,
//! since the expression may itself contain nested parens.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::IsaError;

fn single_bit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\s*(\w+)\s*>").expect("valid pattern"))
}

fn word_slice_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([\w.]+)<\s*(\w+)\s*:\s*(\w+)\s*>").expect("valid pattern")
    })
}

fn expr_slice_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\)<\s*(\w+)\s*:\s*(\w+)\s*>").expect("valid pattern"))
}

/// Normalizes `expr<n>` to `expr<n:n>`. Only a selector directly following
/// an identifier or ')' counts, and `name<n>(` is left alone so template
/// calls like `sext<12>(x)` and includes like `<vector>` survive untouched.
fn normalize_single_bit(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut pos = 0;
    while let Some(m) = single_bit_re().find_at(code, pos) {
        let preceded = code[..m.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == ')');
        let called = code[m.end()..].starts_with('(');
        out.push_str(&code[pos..m.start()]);
        if preceded && !called {
            let caps = single_bit_re()
                .captures_at(code, m.start())
                .expect("find and captures agree");
            let bit = caps.get(1).expect("bit index").as_str();
            out.push_str(&format!("<{bit}:{bit}>"));
        } else {
            out.push_str(m.as_str());
        }
        pos = m.end();
    }
    out.push_str(&code[pos..]);
    out
}

/// Rewrites every bit-slice selector in `code` into a `bits(...)` call.
/// Idempotent on text that contains no selectors.
pub fn subst_bit_ops(code: &str) -> Result<String, IsaError> {
    // Single-bit form first: expr<n> becomes expr<n:n>.
    let code = normalize_single_bit(code);
    // Selector applied directly to a (possibly dotted) name.
    let mut code = word_slice_re()
        .replace_all(&code, "bits($1, $2, $3)")
        .into_owned();
    // Selector applied to a parenthesized expression: scan backward from
    // the ')' for the matching '(' to find the expression span. Rewriting
    // can reveal further matches, so repeat until none remain.
    while let Some(caps) = expr_slice_re().captures(&code) {
        let whole = caps.get(0).expect("whole match");
        let expr_end = whole.start(); // index of ')'
        let hi = caps.get(1).expect("hi").as_str().to_string();
        let lo = caps.get(2).expect("lo").as_str().to_string();
        let bytes = code.as_bytes();
        let mut nest = 1usize;
        let mut here = expr_end;
        let expr_start = loop {
            if here == 0 {
                return Err(IsaError::Internal(format!(
                    "no matching '(' for bit selector in \"{code}\""
                )));
            }
            here -= 1;
            match bytes[here] {
                b'(' => {
                    nest -= 1;
                    if nest == 0 {
                        break here;
                    }
                }
                b')' => nest += 1,
                _ => {}
            }
        };
        let replacement = format!(
            "bits({}, {}, {})",
            &code[expr_start..=expr_end],
            hi,
            lo
        );
        code.replace_range(expr_start..whole.end(), &replacement);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_named_slice() {
        let out = subst_bit_ops("x = Ra<7:0>;").expect("rewrite");
        assert_eq!(out, "x = bits(Ra, 7, 0);");
    }

    #[test]
    fn rewrites_dotted_name() {
        let out = subst_bit_ops("machInst.imm<11:0>").expect("rewrite");
        assert_eq!(out, "bits(machInst.imm, 11, 0)");
    }

    #[test]
    fn single_bit_matches_two_index_form() {
        let a = subst_bit_ops("x<5>").expect("rewrite");
        let b = subst_bit_ops("x<5:5>").expect("rewrite");
        assert_eq!(a, b);
        assert_eq!(a, "bits(x, 5, 5)");
    }

    #[test]
    fn parenthesized_expression_with_nesting() {
        let out = subst_bit_ops("(a+(b*c))<7:0>").expect("rewrite");
        assert_eq!(out, "bits((a+(b*c)), 7, 0)");
    }

    #[test]
    fn repeated_expression_selectors() {
        let out = subst_bit_ops("(x)<3:2> + (y)<1:0>").expect("rewrite");
        assert_eq!(out, "bits((x), 3, 2) + bits((y), 1, 0)");
    }

    #[test]
    fn idempotent_on_expanded_text() {
        let once = subst_bit_ops("Ra<3:0>").expect("rewrite");
        let twice = subst_bit_ops(&once).expect("rewrite");
        assert_eq!(once, "bits(Ra, 3, 0)");
        assert_eq!(once, twice);
    }

    #[test]
    fn symbolic_bounds_are_preserved() {
        let out = subst_bit_ops("machInst<HI:LO>").expect("rewrite");
        assert_eq!(out, "bits(machInst, HI, LO)");
    }

    #[test]
    fn template_calls_and_includes_survive() {
        let out = subst_bit_ops("sext<12>(x); #include <vector>").expect("rewrite");
        assert_eq!(out, "sext<12>(x); #include <vector>");
    }

    #[test]
    fn unmatched_paren_is_fatal() {
        let err = subst_bit_ops("a)<3:0>").unwrap_err();
        assert!(matches!(err, IsaError::Internal(_)));
    }
}
