//! Pseudocode scanning: finds every operand reference in an instruction
//! body, classifies each as source or destination, assigns register
//! indices, and finalizes the per-operand code fragments.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::IsaError;
use crate::operand::{Operand, OperandModel};

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//[^\n]*").expect("valid pattern"))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// A reference is a destination iff it is followed by a plain assignment:
/// optional whitespace, then `=` not followed by another `=`.
fn followed_by_assignment(code: &str, pos: usize) -> bool {
    let rest = code[pos..].trim_start();
    rest.starts_with('=') && !rest.starts_with("==")
}

/// The operands referenced by one pseudocode fragment, in sort-priority
/// order, with register indices assigned.
#[derive(Debug, Default)]
pub struct OperandList {
    items: Vec<Operand>,
    pub num_src_regs: usize,
    pub num_dest_regs: usize,
    pub num_fp_dest_regs: usize,
    pub num_int_dest_regs: usize,
    mem_index: Option<usize>,
}

impl OperandList {
    pub fn scan(code: &str, model: &OperandModel) -> Result<Self, IsaError> {
        let mut list = OperandList::default();
        let Some(operand_re) = model.operand_re() else {
            // No operands defined yet; nothing can match.
            return Ok(list);
        };
        // Strip comments so register specifiers mentioned there don't count.
        let code = comment_re().replace_all(code, "");
        let bytes = code.as_bytes();
        let mut pos = 0;
        while let Some(caps) = operand_re.captures_at(&code, pos) {
            let whole = caps.get(0).expect("whole match");
            let bounded = (whole.start() == 0 || !is_word_byte(bytes[whole.start() - 1]))
                && (whole.end() == code.len() || !is_word_byte(bytes[whole.end()]));
            if !bounded {
                pos = whole.start() + 1;
                continue;
            }
            pos = whole.end();
            let base = caps.get(1).expect("base group").as_str();
            let ext = caps.get(2).map(|m| m.as_str());
            let is_dest = followed_by_assignment(&code, whole.end());
            let is_src = !is_dest;
            if let Some(existing) = list.items.iter_mut().find(|op| op.base_name() == base) {
                if existing.ext_conflicts(ext) {
                    return Err(IsaError::declaration(format!(
                        "inconsistent extensions for operand '{base}'"
                    )));
                }
                existing.is_src |= is_src;
                existing.is_dest |= is_dest;
            } else {
                list.items.push(model.instantiate(base, ext, is_src, is_dest)?);
            }
        }
        list.items.sort_by_key(|op| op.class.sort_pri);
        list.assign_indices()?;
        for op in &mut list.items {
            op.finalize()?;
        }
        Ok(list)
    }

    fn assign_indices(&mut self) -> Result<(), IsaError> {
        for (i, op) in self.items.iter_mut().enumerate() {
            if op.is_reg() {
                if op.is_src {
                    op.src_reg_idx = self.num_src_regs;
                    self.num_src_regs += 1;
                }
                if op.is_dest {
                    op.dest_reg_idx = self.num_dest_regs;
                    self.num_dest_regs += 1;
                    if op.is_float_reg() {
                        self.num_fp_dest_regs += 1;
                    } else if op.is_int_reg() {
                        self.num_int_dest_regs += 1;
                    }
                }
            } else if op.is_mem() {
                if self.mem_index.is_some() {
                    return Err(IsaError::declaration(
                        "code block has more than one memory operand",
                    ));
                }
                self.mem_index = Some(i);
            }
        }
        Ok(())
    }

    pub fn items(&self) -> &[Operand] {
        &self.items
    }

    pub fn mem_operand(&self) -> Option<&Operand> {
        self.mem_index.map(|i| &self.items[i])
    }

    /// Concatenation of one fragment across all operands.
    pub fn concat<'a>(&'a self, attr: impl Fn(&'a Operand) -> &'a str) -> String {
        self.items.iter().map(attr).collect()
    }

    /// All instruction flags contributed by the operands, in order.
    pub fn flag_list(&self) -> Vec<String> {
        self.items
            .iter()
            .flat_map(|op| op.flags.iter().cloned())
            .collect()
    }
}

impl Operand {
    /// True when a later reference's extension disagrees with the first
    /// sighting (including explicit vs. absent).
    fn ext_conflicts(&self, ext: Option<&str>) -> bool {
        match ext {
            Some(ext) => self.full_name != format!("{}.{ext}", self.base_name()),
            None => self.full_name != *self.base_name(),
        }
    }
}
