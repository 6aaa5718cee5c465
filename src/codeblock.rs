//! Instruction code blocks and the parameter bundles handed to templates.
//!
//! A [`CodeBlock`] digests one pseudocode fragment: it scans the operand
//! references, rewrites bit selectors and extension references, and derives
//! the constructor, declaration, read, and writeback fragments plus the
//! instruction flags. An [`InstObjParams`] packages a code block (or none)
//! with the mnemonic and class names into the symbol table that templates
//! substitute from.

use std::rc::Rc;

use crate::bitops::subst_bit_ops;
use crate::error::IsaError;
use crate::operand::scanner::OperandList;
use crate::operand::OperandModel;
use crate::template::SymbolMap;

/// Digested pseudocode for one instruction body.
#[derive(Debug)]
pub struct CodeBlock {
    pub orig_code: String,
    /// Pseudocode with bit selectors expanded and extension references
    /// munged down to the bare operand names.
    pub code: String,
    pub operands: OperandList,
    pub constructor: String,
    pub op_decl: String,
    pub op_rd: String,
    pub op_wb: String,
    pub flags: Vec<String>,
    pub mem_acc_size: Option<u32>,
    /// Functional-unit guess derived from the flags; an explicit OpClass
    /// argument to `InstObjParams` overrides it.
    pub op_class: &'static str,
}

impl CodeBlock {
    pub fn new(code: &str, model: &OperandModel) -> Result<Self, IsaError> {
        let operands = OperandList::scan(code, model)?;
        let munged = model.munge_ext_refs(&subst_bit_ops(code)?);

        let mut constructor = operands.concat(|op| op.constructor.as_str());
        constructor.push_str(&format!("\n\t_numSrcRegs = {};", operands.num_src_regs));
        constructor.push_str(&format!("\n\t_numDestRegs = {};", operands.num_dest_regs));
        constructor.push_str(&format!("\n\t_numFPDestRegs = {};", operands.num_fp_dest_regs));
        constructor.push_str(&format!("\n\t_numIntDestRegs = {};", operands.num_int_dest_regs));

        let op_decl = operands.concat(|op| op.op_decl.as_str());
        let op_rd = operands.concat(|op| op.op_rd.as_str());
        let op_wb = operands.concat(|op| op.op_wb.as_str());
        let flags = operands.flag_list();
        let mem_acc_size = operands.mem_operand().and_then(|op| op.mem_acc_size);

        let has = |f: &str| flags.iter().any(|g| g == f);
        let op_class = if has("IsStore") {
            "MemWriteOp"
        } else if has("IsLoad") || has("IsPrefetch") {
            "MemReadOp"
        } else if has("IsFloating") {
            "FloatAddOp"
        } else {
            "IntAluOp"
        };

        Ok(CodeBlock {
            orig_code: code.to_string(),
            code: munged,
            operands,
            constructor,
            op_decl,
            op_rd,
            op_wb,
            flags,
            mem_acc_size,
            op_class,
        })
    }
}

/// Builds the flag-setting tail of an instruction constructor. Flags are
/// sorted and deduplicated first so repeated operand contributions set each
/// flag once.
fn make_flag_constructor(flags: &[String]) -> String {
    if flags.is_empty() {
        return String::new();
    }
    let mut flags: Vec<&str> = flags.iter().map(String::as_str).collect();
    flags.sort_unstable();
    flags.dedup();
    let mut out = String::new();
    for flag in flags {
        out.push_str(&format!("\n\tflags[{flag}] = true;"));
    }
    out
}

/// Everything a template can reference about one instruction definition.
#[derive(Debug)]
pub struct InstObjParams {
    pub mnemonic: String,
    pub class_name: String,
    pub base_class: String,
    pub code_block: Option<Rc<CodeBlock>>,
    pub flags: Vec<String>,
    pub op_class: Option<String>,
    pub constructor: String,
    pub fp_enable_check: String,
}

impl InstObjParams {
    /// Optional arguments are either instruction flags or an OpClass value,
    /// told apart by shape: flags start with `Is`, OpClass constants end in
    /// `Op` (plus `No_OpClass`).
    pub fn new(
        mnemonic: String,
        class_name: String,
        base_class: String,
        code_block: Option<Rc<CodeBlock>>,
        opt_args: Vec<String>,
    ) -> Result<Self, IsaError> {
        let (mut flags, mut op_class, mut constructor) = match &code_block {
            Some(block) => (
                block.flags.clone(),
                Some(block.op_class.to_string()),
                block.constructor.clone(),
            ),
            None => (Vec::new(), None, String::new()),
        };
        for oa in opt_args {
            if oa.starts_with("Is") {
                flags.push(oa);
            } else if oa.ends_with("Op") || oa == "No_OpClass" {
                op_class = Some(oa);
            } else {
                return Err(IsaError::declaration(format!(
                    "InstObjParams: optional arg \"{oa}\" not recognized as an \
                     instruction flag or OpClass"
                )));
            }
        }
        constructor.push_str(&make_flag_constructor(&flags));
        let fp_enable_check = if flags.iter().any(|f| f == "IsFloating") {
            "fault = checkFpEnableFault(xc);".to_string()
        } else {
            String::new()
        };
        Ok(InstObjParams {
            mnemonic,
            class_name,
            base_class,
            code_block,
            flags,
            op_class,
            constructor,
            fp_enable_check,
        })
    }

    /// The substitution table templates draw from. Attributes that only
    /// exist with a code block are simply absent without one, so a template
    /// referencing them then fails loudly.
    pub fn symbols(&self) -> SymbolMap {
        let mut map = SymbolMap::new();
        map.insert("mnemonic".to_string(), self.mnemonic.clone());
        map.insert("class_name".to_string(), self.class_name.clone());
        map.insert("base_class".to_string(), self.base_class.clone());
        map.insert("constructor".to_string(), self.constructor.clone());
        map.insert("fp_enable_check".to_string(), self.fp_enable_check.clone());
        if let Some(op_class) = &self.op_class {
            map.insert("op_class".to_string(), op_class.clone());
        }
        if let Some(block) = &self.code_block {
            map.insert("code".to_string(), block.code.clone());
            map.insert("orig_code".to_string(), block.orig_code.clone());
            map.insert("op_decl".to_string(), block.op_decl.clone());
            map.insert("op_rd".to_string(), block.op_rd.clone());
            map.insert("op_wb".to_string(), block.op_wb.clone());
            if let Some(size) = block.mem_acc_size {
                map.insert("mem_acc_size".to_string(), size.to_string());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::tests::model;

    #[test]
    fn code_block_collects_counters_and_fragments() {
        let m = model();
        let block = CodeBlock::new("Rc = Ra + Rb;", &m).expect("block");
        assert!(block.constructor.contains("\n\t_srcRegIdx[0] = RA;"));
        assert!(block.constructor.contains("\n\t_srcRegIdx[1] = RB;"));
        assert!(block.constructor.contains("\n\t_destRegIdx[0] = RC;"));
        assert!(block.constructor.ends_with(
            "\n\t_numSrcRegs = 2;\n\t_numDestRegs = 1;\n\t_numFPDestRegs = 0;\n\t_numIntDestRegs = 1;"
        ));
        assert_eq!(
            block.op_decl,
            "uint64_t Ra = 0;\nuint64_t Rb = 0;\nuint64_t Rc = 0;\n"
        );
        assert_eq!(
            block.op_rd,
            "Ra = xc->readIntReg(this, 0);\nRb = xc->readIntReg(this, 1);\n"
        );
        assert_eq!(block.op_class, "IntAluOp");
    }

    #[test]
    fn extension_references_are_munged_in_code() {
        let m = model();
        let block = CodeBlock::new("Ra.sw = Rb.sw + immediate<7:0>;", &m).expect("block");
        assert_eq!(block.code, "Ra = Rb + bits(immediate, 7, 0);");
        assert_eq!(block.orig_code, "Ra.sw = Rb.sw + immediate<7:0>;");
    }

    #[test]
    fn load_guesses_mem_read_op() {
        let m = model();
        let block = CodeBlock::new("Ra = Mem.sw;", &m).expect("block");
        assert_eq!(block.op_class, "MemReadOp");
        assert_eq!(block.mem_acc_size, Some(32));
        // Both locals come out zero-initialized, the memory one included.
        assert_eq!(block.op_decl, "uint64_t Ra = 0;\nint32_t Mem = 0;\n");
        assert!(block.flags.iter().any(|f| f == "IsLoad"));
        assert!(!block.flags.iter().any(|f| f == "IsStore"));
    }

    #[test]
    fn flag_constructor_sorts_and_dedups() {
        let flags = vec![
            "IsInteger".to_string(),
            "IsControl".to_string(),
            "IsInteger".to_string(),
        ];
        assert_eq!(
            make_flag_constructor(&flags),
            "\n\tflags[IsControl] = true;\n\tflags[IsInteger] = true;"
        );
        assert_eq!(make_flag_constructor(&[]), "");
    }

    #[test]
    fn opt_args_classify_as_flag_or_op_class() {
        let m = model();
        let block = Rc::new(CodeBlock::new("Rc = Ra + Rb;", &m).expect("block"));
        let iop = InstObjParams::new(
            "addq".into(),
            "Addq".into(),
            "AlphaStaticInst".into(),
            Some(block),
            vec!["IsSerializing".to_string(), "IntMultOp".to_string()],
        )
        .expect("iop");
        assert_eq!(iop.op_class.as_deref(), Some("IntMultOp"));
        assert!(iop.flags.iter().any(|f| f == "IsSerializing"));
        assert!(iop.constructor.contains("\n\tflags[IsSerializing] = true;"));
    }

    #[test]
    fn unrecognized_opt_arg_is_rejected() {
        let err = InstObjParams::new(
            "nop".into(),
            "Nop".into(),
            String::new(),
            None,
            vec!["Bogus".to_string()],
        )
        .unwrap_err();
        match err {
            IsaError::Declaration { message, .. } => assert!(message.contains("\"Bogus\"")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn floating_flag_enables_fp_check() {
        let m = model();
        let block = Rc::new(CodeBlock::new("Fa = Fa + Fa;", &m).expect("block"));
        let iop = InstObjParams::new(
            "addf".into(),
            "Addf".into(),
            String::new(),
            Some(block),
            Vec::new(),
        )
        .expect("iop");
        assert_eq!(iop.fp_enable_check, "fault = checkFpEnableFault(xc);");
        assert_eq!(iop.op_class.as_deref(), Some("FloatAddOp"));
    }

    #[test]
    fn symbols_omit_code_attrs_without_a_block() {
        let iop = InstObjParams::new(
            "nop".into(),
            "Nop".into(),
            "AlphaStaticInst".into(),
            None,
            Vec::new(),
        )
        .expect("iop");
        let map = iop.symbols();
        assert_eq!(map["mnemonic"], "nop");
        assert!(!map.contains_key("code"));
        assert!(!map.contains_key("op_class"));
        assert_eq!(map["constructor"], "");
    }
}
