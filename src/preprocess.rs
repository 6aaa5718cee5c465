//! `##include` expansion.
//!
//! Includes are spliced textually before lexing. Each spliced file is
//! bracketed by `##newfile "path"` / `##endfile` markers that the lexer uses
//! to keep filename and line numbers accurate across file boundaries.

use std::path::Path;
use std::sync::OnceLock;

use log::info;
use regex::Regex;

use crate::error::IsaError;

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*##include\s+"(?P<filename>[\w/.\-]*)".*$"#)
            .expect("include pattern is valid")
    })
}

/// Expands every `##include "path"` directive in `src`, recursively, with
/// paths resolved against `base_dir`. Returns the fully spliced text.
pub fn preprocess(src: &str, base_dir: &Path) -> Result<String, IsaError> {
    let mut text = src.to_string();
    let mut pos = 0;
    // Restart the scan at the start of each replacement so nested includes
    // inside the spliced text are expanded too.
    while let Some(caps) = include_re().captures_at(&text, pos) {
        let range = caps.get(0).expect("whole match").range();
        let filename = caps.name("filename").expect("named group").as_str().to_string();
        info!("including file \"{filename}\"");
        let contents =
            std::fs::read_to_string(base_dir.join(&filename)).map_err(|_| IsaError::Include {
                path: filename.clone(),
            })?;
        let replacement = format!("##newfile \"{filename}\"\n{contents}##endfile\n");
        let start = range.start;
        text.replace_range(range, &replacement);
        pos = start;
    }
    Ok(text)
}
