//! Operand types, operand classes, and per-operand code emission.
//!
//! `def operand_types` establishes the extension table (size, C type,
//! signedness per extension like `uq` or `sf`). `def operands` then binds
//! operand names (`Ra`, `Mem`, `NPC`, ...) to a register kind, a default
//! extension, a register-specifier expression, instruction flags, and a
//! sort priority. Instruction pseudocode references these names; each
//! reference becomes an [`Operand`] instance that knows how to emit its
//! constructor, declaration, read, and writeback fragments.

use ahash::AHashMap;
use indexmap::IndexMap;
use regex::Regex;
use smallvec::SmallVec;

use crate::error::IsaError;
use crate::eval::{parse_literal, CodeStream, CodeTok, Value};

pub mod scanner;

/// One entry of the extension table: `'uq' : ('unsigned int', 64)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandType {
    pub size: u32,
    pub ctype: String,
    pub is_signed: bool,
}

impl OperandType {
    fn from_desc(ext: &str, desc: &str, size: u32) -> Result<Self, IsaError> {
        let (ctype, is_signed) = match desc {
            "signed int" => (format!("int{size}_t"), true),
            "unsigned int" => (format!("uint{size}_t"), false),
            "float" => match size {
                32 => ("float".to_string(), true),
                64 => ("double".to_string(), true),
                _ => {
                    return Err(IsaError::declaration(format!(
                        "no floating-point type of size {size} for extension '{ext}'"
                    )));
                }
            },
            other => {
                return Err(IsaError::declaration(format!(
                    "unrecognized type description \"{other}\" for extension '{ext}'"
                )));
            }
        };
        Ok(Self {
            size,
            ctype,
            is_signed,
        })
    }
}

/// The closed set of operand kinds the generator knows how to emit code for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    IntReg,
    FloatReg,
    ControlReg,
    Mem,
    Npc,
}

impl OperandKind {
    fn from_name(name: &str) -> Result<Self, IsaError> {
        match name {
            "IntReg" => Ok(OperandKind::IntReg),
            "FloatReg" => Ok(OperandKind::FloatReg),
            "ControlReg" => Ok(OperandKind::ControlReg),
            "Mem" => Ok(OperandKind::Mem),
            "NPC" => Ok(OperandKind::Npc),
            other => Err(IsaError::declaration(format!(
                "unknown operand base class '{other}'"
            ))),
        }
    }

    pub fn is_reg(self) -> bool {
        matches!(
            self,
            OperandKind::IntReg | OperandKind::FloatReg | OperandKind::ControlReg
        )
    }
}

/// Instruction flags contributed by an operand: unconditionally, only when
/// the operand is a source, and only when it is a destination.
#[derive(Debug, Clone, Default)]
pub struct OperandFlags {
    pub uncond: SmallVec<[String; 2]>,
    pub src: SmallVec<[String; 2]>,
    pub dest: SmallVec<[String; 2]>,
}

impl OperandFlags {
    fn from_value(value: Value) -> Result<Self, IsaError> {
        fn part(value: Value) -> Result<SmallVec<[String; 2]>, IsaError> {
            Ok(value.into_string_list()?.into())
        }
        match value {
            Value::None | Value::Str(_) | Value::List(_) => Ok(Self {
                uncond: part(value)?,
                src: SmallVec::new(),
                dest: SmallVec::new(),
            }),
            Value::Tuple(items) if items.len() == 3 => {
                let mut items = items.into_iter();
                Ok(Self {
                    uncond: part(items.next().expect("len checked"))?,
                    src: part(items.next().expect("len checked"))?,
                    dest: part(items.next().expect("len checked"))?,
                })
            }
            other => Err(IsaError::declaration(format!(
                "operand flags must be a string, a list, or a (uncond, src, dest) \
                 triple, found {}",
                other.type_name()
            ))),
        }
    }
}

/// A named operand class from `def operands`.
#[derive(Debug, Clone)]
pub struct OperandClass {
    pub name: String,
    pub kind: OperandKind,
    pub dflt_ext: String,
    /// Register specifier expression, e.g. `RA` (a bitfield reference).
    pub reg_spec: String,
    pub flags: OperandFlags,
    pub sort_pri: i64,
    pub dflt_size: u32,
    pub dflt_ctype: String,
    pub dflt_is_signed: bool,
}

/// Holds the extension table, the operand classes, and the compiled scanner
/// patterns derived from the class names.
#[derive(Debug, Default)]
pub struct OperandModel {
    types: AHashMap<String, OperandType>,
    classes: IndexMap<String, OperandClass>,
    operand_re: Option<Regex>,
    operand_with_ext_re: Option<Regex>,
}

impl OperandModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn operand_re(&self) -> Option<&Regex> {
        self.operand_re.as_ref()
    }

    /// Processes a `def operand_types` block.
    pub fn define_types(&mut self, src: &str) -> Result<(), IsaError> {
        for (ext, value) in parse_table(src)? {
            let Value::Tuple(items) = value else {
                return Err(IsaError::declaration(format!(
                    "operand type '{ext}' must be a (description, size) pair"
                )));
            };
            let [desc, size] = items.as_slice() else {
                return Err(IsaError::declaration(format!(
                    "operand type '{ext}' must be a (description, size) pair"
                )));
            };
            let desc = desc.as_str()?;
            let &Value::Int(size) = size else {
                return Err(IsaError::declaration(format!(
                    "operand type '{ext}' size must be an integer"
                )));
            };
            let ty = OperandType::from_desc(&ext, desc, size as u32)?;
            self.types.insert(ext, ty);
        }
        Ok(())
    }

    /// Processes a `def operands` block. The extension table must already be
    /// in place since each class resolves its default extension here.
    pub fn define_classes(&mut self, src: &str) -> Result<(), IsaError> {
        if self.types.is_empty() {
            return Err(IsaError::declaration(
                "operand types must be defined before operands",
            ));
        }
        for (name, value) in parse_table(src)? {
            let Value::Tuple(mut items) = value else {
                return Err(IsaError::declaration(format!(
                    "operand '{name}' must be a (class, ext, spec, flags, pri) tuple"
                )));
            };
            if items.len() != 5 {
                return Err(IsaError::declaration(format!(
                    "operand '{name}' must be a (class, ext, spec, flags, pri) tuple"
                )));
            }
            let sort_pri = match items.pop().expect("len checked") {
                Value::Int(v) => v as i64,
                other => {
                    return Err(IsaError::declaration(format!(
                        "operand '{name}' sort priority must be an integer, found {}",
                        other.type_name()
                    )));
                }
            };
            let flags = OperandFlags::from_value(items.pop().expect("len checked"))?;
            let reg_spec = match items.pop().expect("len checked") {
                Value::None => String::new(),
                Value::Str(s) => s,
                other => {
                    return Err(IsaError::declaration(format!(
                        "operand '{name}' register specifier must be a string or None, \
                         found {}",
                        other.type_name()
                    )));
                }
            };
            let dflt_ext = items.pop().expect("len checked").as_str()?.to_string();
            let kind = OperandKind::from_name(items.pop().expect("len checked").as_str()?)?;
            let dflt = self.lookup_type(&dflt_ext, &name)?.clone();
            self.classes.insert(
                name.clone(),
                OperandClass {
                    name,
                    kind,
                    dflt_ext,
                    reg_spec,
                    flags,
                    sort_pri,
                    dflt_size: dflt.size,
                    dflt_ctype: dflt.ctype,
                    dflt_is_signed: dflt.is_signed,
                },
            );
        }
        self.rebuild_scanner();
        Ok(())
    }

    fn lookup_type(&self, ext: &str, operand: &str) -> Result<&OperandType, IsaError> {
        self.types.get(ext).ok_or_else(|| {
            IsaError::declaration(format!(
                "unknown operand type extension '{ext}' for operand '{operand}'"
            ))
        })
    }

    /// Rebuilds the scanning pattern: longest names first so `Rab` wins over
    /// `Ra` wherever both could match.
    fn rebuild_scanner(&mut self) {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"({alternation})(?:\.(\w+))?");
        self.operand_re = Some(Regex::new(&pattern).expect("escaped names form a valid pattern"));
        let pattern = format!(r"({alternation})\.(\w+)");
        self.operand_with_ext_re =
            Some(Regex::new(&pattern).expect("escaped names form a valid pattern"));
    }

    /// Rewrites extension references (`Ra.sq`) down to the bare operand
    /// name so the emitted code uses the declared local variable.
    pub(crate) fn munge_ext_refs(&self, code: &str) -> String {
        let Some(re) = self.operand_with_ext_re.as_ref() else {
            return code.to_string();
        };
        let bytes = code.as_bytes();
        let mut out = String::with_capacity(code.len());
        let mut copied = 0;
        let mut pos = 0;
        while let Some(caps) = re.captures_at(code, pos) {
            let whole = caps.get(0).expect("whole match");
            let bounded = (whole.start() == 0
                || !matches!(bytes[whole.start() - 1], b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.'))
                && (whole.end() == code.len()
                    || !matches!(bytes[whole.end()], b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.'));
            if !bounded {
                pos = whole.start() + 1;
                continue;
            }
            out.push_str(&code[copied..whole.start()]);
            out.push_str(caps.get(1).expect("base group").as_str());
            copied = whole.end();
            pos = whole.end();
        }
        out.push_str(&code[copied..]);
        out
    }

    /// Instantiates an operand reference found in pseudocode.
    pub fn instantiate(
        &self,
        base: &str,
        ext: Option<&str>,
        is_src: bool,
        is_dest: bool,
    ) -> Result<Operand, IsaError> {
        let class = self
            .classes
            .get(base)
            .ok_or_else(|| IsaError::declaration(format!("unknown operand '{base}'")))?;
        let full_name = match ext {
            Some(ext) => format!("{base}.{ext}"),
            None => base.to_string(),
        };
        let eff_ext = ext.unwrap_or(&class.dflt_ext).to_string();
        let ty = self.lookup_type(&eff_ext, &full_name)?;
        Ok(Operand {
            class: class.clone(),
            full_name,
            eff_ext,
            size: ty.size,
            ctype: ty.ctype.clone(),
            is_signed: ty.is_signed,
            is_src,
            is_dest,
            mem_acc_size: (class.kind == OperandKind::Mem).then_some(ty.size),
            src_reg_idx: 0,
            dest_reg_idx: 0,
            flags: Vec::new(),
            constructor: String::new(),
            op_decl: String::new(),
            op_rd: String::new(),
            op_wb: String::new(),
        })
    }
}

/// Parses a declarative table block: `'key' : literal, ...` with optional
/// trailing comma, newlines insignificant.
fn parse_table(src: &str) -> Result<Vec<(String, Value)>, IsaError> {
    let mut ts = CodeStream::new(src);
    let mut entries = Vec::new();
    loop {
        ts.skip_newlines()?;
        match ts.next()? {
            CodeTok::Eof => return Ok(entries),
            CodeTok::Str(key) => {
                ts.skip_newlines()?;
                if ts.next()? != CodeTok::Colon {
                    return Err(IsaError::declaration(format!(
                        "expected ':' after table key '{key}'"
                    )));
                }
                let value = parse_literal(&mut ts)?;
                entries.push((key, value));
                ts.skip_newlines()?;
                match ts.peek()? {
                    CodeTok::Comma => {
                        ts.next()?;
                    }
                    CodeTok::Eof => {}
                    other => {
                        return Err(IsaError::declaration(format!(
                            "expected ',' between table entries, found {other:?}"
                        )));
                    }
                }
            }
            other => {
                return Err(IsaError::declaration(format!(
                    "expected quoted table key, found {other:?}"
                )));
            }
        }
    }
}

/// One operand reference within an instruction's pseudocode, with its
/// emitted code fragments filled in by [`finalize`](Operand::finalize).
#[derive(Debug, Clone)]
pub struct Operand {
    pub class: OperandClass,
    pub full_name: String,
    pub eff_ext: String,
    pub size: u32,
    pub ctype: String,
    pub is_signed: bool,
    pub is_src: bool,
    pub is_dest: bool,
    /// For memory operands, the access size in bits.
    pub mem_acc_size: Option<u32>,
    pub src_reg_idx: usize,
    pub dest_reg_idx: usize,
    pub flags: Vec<String>,
    pub constructor: String,
    pub op_decl: String,
    pub op_rd: String,
    pub op_wb: String,
}

impl Operand {
    pub fn base_name(&self) -> &str {
        &self.class.name
    }

    pub fn is_reg(&self) -> bool {
        self.class.kind.is_reg()
    }

    pub fn is_mem(&self) -> bool {
        self.class.kind == OperandKind::Mem
    }

    pub fn is_float_reg(&self) -> bool {
        self.class.kind == OperandKind::FloatReg
    }

    pub fn is_int_reg(&self) -> bool {
        self.class.kind == OperandKind::IntReg
    }

    /// Computes the emitted fragments. Must run after the register indices
    /// are assigned, since the constructor and access code embed them.
    pub fn finalize(&mut self) -> Result<(), IsaError> {
        self.flags = self.gather_flags();
        self.constructor = self.make_constructor();
        self.op_decl = self.make_decl();
        self.op_rd = if self.is_src {
            self.make_read()?
        } else {
            String::new()
        };
        self.op_wb = if self.is_dest {
            self.make_write()?
        } else {
            String::new()
        };
        Ok(())
    }

    fn gather_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self.class.flags.uncond.to_vec();
        if self.is_src {
            flags.extend(self.class.flags.src.iter().cloned());
        }
        if self.is_dest {
            flags.extend(self.class.flags.dest.iter().cloned());
        }
        flags
    }

    fn make_constructor(&self) -> String {
        let spec = &self.class.reg_spec;
        let suffix = match self.class.kind {
            OperandKind::IntReg => "",
            OperandKind::FloatReg => " + FP_Base_DepTag",
            OperandKind::ControlReg => "_DepTag",
            OperandKind::Mem | OperandKind::Npc => return String::new(),
        };
        let mut c = String::new();
        if self.is_src {
            c.push_str(&format!(
                "\n\t_srcRegIdx[{}] = {spec}{suffix};",
                self.src_reg_idx
            ));
        }
        if self.is_dest {
            c.push_str(&format!(
                "\n\t_destRegIdx[{}] = {spec}{suffix};",
                self.dest_reg_idx
            ));
        }
        c
    }

    fn make_decl(&self) -> String {
        // Initialized solely to quiet 'uninitialized variable' warnings in
        // the generated code.
        format!("{} {} = 0;\n", self.ctype, self.base_name())
    }

    fn is_fp_ctype(&self) -> bool {
        self.ctype == "float" || self.ctype == "double"
    }

    fn make_read(&self) -> Result<String, IsaError> {
        match self.class.kind {
            OperandKind::IntReg => {
                if self.is_fp_ctype() {
                    return Err(IsaError::declaration(
                        "attempt to read integer register as FP",
                    ));
                }
                let name = self.base_name();
                let idx = self.src_reg_idx;
                if self.size == self.class.dflt_size {
                    Ok(format!("{name} = xc->readIntReg(this, {idx});\n"))
                } else {
                    Ok(format!(
                        "{name} = bits(xc->readIntReg(this, {idx}), {}, 0);\n",
                        self.size - 1
                    ))
                }
            }
            OperandKind::FloatReg => {
                let (func, bit_select) = match self.ctype.as_str() {
                    "float" => ("readFloatRegSingle", false),
                    "double" => ("readFloatRegDouble", false),
                    _ => ("readFloatRegInt", self.size != self.class.dflt_size),
                };
                let name = self.base_name();
                let base = format!("xc->{func}(this, {})", self.src_reg_idx);
                if bit_select {
                    Ok(format!("{name} = bits({base}, {}, 0);\n", self.size - 1))
                } else {
                    Ok(format!("{name} = {base};\n"))
                }
            }
            OperandKind::ControlReg => {
                if self.is_fp_ctype() {
                    return Err(IsaError::declaration(
                        "attempt to read control register as FP",
                    ));
                }
                let name = self.base_name();
                let base = format!("xc->read{}()", self.class.reg_spec);
                if self.size == self.class.dflt_size {
                    Ok(format!("{name} = {base};\n"))
                } else {
                    Ok(format!("{name} = bits({base}, {}, 0);\n", self.size - 1))
                }
            }
            OperandKind::Mem => Ok(String::new()),
            OperandKind::Npc => Ok(format!("{} = xc->readPC() + 4;\n", self.base_name())),
        }
    }

    fn make_write(&self) -> Result<String, IsaError> {
        match self.class.kind {
            OperandKind::IntReg => {
                if self.is_fp_ctype() {
                    return Err(IsaError::declaration(
                        "attempt to write integer register as FP",
                    ));
                }
                let final_val = self.sext_final_val();
                Ok(format!(
                    "\n        {{\n            {} final_val = {final_val};\n            \
                     xc->setIntReg(this, {}, final_val);\n\n            \
                     if (traceData) {{ traceData->setData(final_val); }}\n        }}",
                    self.class.dflt_ctype, self.dest_reg_idx
                ))
            }
            OperandKind::FloatReg => {
                let (func, final_ctype, final_val) = match self.ctype.as_str() {
                    "float" => ("setFloatRegSingle", self.ctype.clone(), self.base_name().to_string()),
                    "double" => ("setFloatRegDouble", self.ctype.clone(), self.base_name().to_string()),
                    _ => (
                        "setFloatRegInt",
                        format!("uint{}_t", self.class.dflt_size),
                        self.sext_final_val(),
                    ),
                };
                Ok(format!(
                    "\n        {{\n            {final_ctype} final_val = {final_val};\n            \
                     xc->{func}(this, {}, final_val);\n\n            \
                     if (traceData) {{ traceData->setData(final_val); }}\n        }}",
                    self.dest_reg_idx
                ))
            }
            OperandKind::ControlReg => {
                if self.is_fp_ctype() {
                    return Err(IsaError::declaration(
                        "attempt to write control register as FP",
                    ));
                }
                let name = self.base_name();
                Ok(format!(
                    "xc->set{}({name});\nif (traceData) {{ traceData->setData({name}); }}",
                    self.class.reg_spec
                ))
            }
            OperandKind::Mem => Ok(String::new()),
            OperandKind::Npc => Ok(format!("xc->setNextPC({});\n", self.base_name())),
        }
    }

    /// Undersized signed values are sign-extended before writeback.
    fn sext_final_val(&self) -> String {
        if self.size != self.class.dflt_size && self.is_signed {
            format!("sext<{}>({})", self.size, self.base_name())
        } else {
            self.base_name().to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TYPES: &str = "
        'sb' : ('signed int', 8),
        'sw' : ('signed int', 32),
        'sq' : ('signed int', 64),
        'uq' : ('unsigned int', 64),
        'sf' : ('float', 32),
        'df' : ('float', 64),
    ";

    pub(crate) const OPERANDS: &str = "
        'Ra' : ('IntReg', 'uq', 'RA', 'IsInteger', 1),
        'Rb' : ('IntReg', 'uq', 'RB', 'IsInteger', 2),
        'Rc' : ('IntReg', 'uq', 'RC', 'IsInteger', 3),
        'Fa' : ('FloatReg', 'df', 'FA', 'IsFloating', 1),
        'Mem' : ('Mem', 'uq', None, ('IsMemRef', 'IsLoad', 'IsStore'), 4),
        'NPC' : ('NPC', 'uq', None, (None, None, 'IsControl'), 4),
        'Fpcr' : ('ControlReg', 'uq', 'Fpcr', None, 1),
    ";

    pub(crate) fn model() -> OperandModel {
        let mut m = OperandModel::new();
        m.define_types(TYPES).expect("types");
        m.define_classes(OPERANDS).expect("operands");
        m
    }

    #[test]
    fn operands_require_types_first() {
        let mut m = OperandModel::new();
        let err = m.define_classes(OPERANDS).unwrap_err();
        assert!(matches!(err, IsaError::Declaration { .. }));
    }

    #[test]
    fn type_descriptions_resolve_to_ctypes() {
        let m = model();
        assert_eq!(m.types["sb"].ctype, "int8_t");
        assert_eq!(m.types["uq"].ctype, "uint64_t");
        assert_eq!(m.types["sf"].ctype, "float");
        assert!(m.types["sq"].is_signed);
        assert!(!m.types["uq"].is_signed);
    }

    #[test]
    fn unknown_base_class_is_rejected() {
        let mut m = OperandModel::new();
        m.define_types(TYPES).expect("types");
        let err = m
            .define_classes("'Xa' : ('VecReg', 'uq', 'XA', None, 1),")
            .unwrap_err();
        match err {
            IsaError::Declaration { message, .. } => {
                assert!(message.contains("unknown operand base class 'VecReg'"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn int_reg_source_emits_read_and_index() {
        let m = model();
        let mut op = m.instantiate("Ra", None, true, false).expect("operand");
        op.src_reg_idx = 2;
        op.finalize().expect("finalize");
        assert_eq!(op.constructor, "\n\t_srcRegIdx[2] = RA;");
        assert_eq!(op.op_rd, "Ra = xc->readIntReg(this, 2);\n");
        assert_eq!(op.op_wb, "");
        assert_eq!(op.op_decl, "uint64_t Ra = 0;\n");
        assert_eq!(op.flags, vec!["IsInteger".to_string()]);
    }

    #[test]
    fn undersized_read_truncates_with_bits() {
        let m = model();
        let mut op = m.instantiate("Rb", Some("sw"), true, false).expect("operand");
        op.finalize().expect("finalize");
        assert_eq!(op.op_rd, "Rb = bits(xc->readIntReg(this, 0), 31, 0);\n");
        assert_eq!(op.op_decl, "int32_t Rb = 0;\n");
    }

    #[test]
    fn signed_undersized_write_sign_extends() {
        let m = model();
        let mut op = m.instantiate("Rc", Some("sw"), false, true).expect("operand");
        op.dest_reg_idx = 1;
        op.finalize().expect("finalize");
        assert!(op.op_wb.contains("uint64_t final_val = sext<32>(Rc);"));
        assert!(op.op_wb.contains("xc->setIntReg(this, 1, final_val);"));
        assert!(op.op_wb.contains("if (traceData) { traceData->setData(final_val); }"));
    }

    #[test]
    fn float_reg_uses_fp_base_dep_tag() {
        let m = model();
        let mut op = m.instantiate("Fa", None, true, true).expect("operand");
        op.src_reg_idx = 0;
        op.dest_reg_idx = 0;
        op.finalize().expect("finalize");
        assert_eq!(
            op.constructor,
            "\n\t_srcRegIdx[0] = FA + FP_Base_DepTag;\n\t_destRegIdx[0] = FA + FP_Base_DepTag;"
        );
        assert_eq!(op.op_rd, "Fa = xc->readFloatRegDouble(this, 0);\n");
        assert!(op.op_wb.contains("xc->setFloatRegDouble(this, 0, final_val);"));
    }

    #[test]
    fn int_view_of_float_reg_selects_bits() {
        let m = model();
        let mut op = m.instantiate("Fa", Some("sw"), true, false).expect("operand");
        op.finalize().expect("finalize");
        assert_eq!(op.op_rd, "Fa = bits(xc->readFloatRegInt(this, 0), 31, 0);\n");
    }

    #[test]
    fn reading_integer_register_as_fp_is_an_error() {
        let m = model();
        let mut op = m.instantiate("Ra", Some("df"), true, false).expect("operand");
        let err = op.finalize().unwrap_err();
        match err {
            IsaError::Declaration { message, .. } => {
                assert!(message.contains("read integer register as FP"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn control_reg_reads_through_accessor() {
        let m = model();
        let mut op = m.instantiate("Fpcr", None, true, true).expect("operand");
        op.finalize().expect("finalize");
        assert_eq!(op.constructor, "\n\t_srcRegIdx[0] = Fpcr_DepTag;\n\t_destRegIdx[0] = Fpcr_DepTag;");
        assert_eq!(op.op_rd, "Fpcr = xc->readFpcr();\n");
        assert_eq!(
            op.op_wb,
            "xc->setFpcr(Fpcr);\nif (traceData) { traceData->setData(Fpcr); }"
        );
    }

    #[test]
    fn mem_operand_declares_a_zeroed_local() {
        let m = model();
        let mut op = m.instantiate("Mem", Some("sb"), true, false).expect("operand");
        op.finalize().expect("finalize");
        assert_eq!(op.op_decl, "int8_t Mem = 0;\n");
        assert_eq!(op.op_rd, "");
        assert_eq!(op.constructor, "");
        assert_eq!(op.mem_acc_size, Some(8));
        assert_eq!(op.flags, vec!["IsMemRef".to_string(), "IsLoad".to_string()]);
    }

    #[test]
    fn npc_reads_advanced_pc_and_writes_next_pc() {
        let m = model();
        let mut op = m.instantiate("NPC", None, true, true).expect("operand");
        op.finalize().expect("finalize");
        assert_eq!(op.op_rd, "NPC = xc->readPC() + 4;\n");
        assert_eq!(op.op_wb, "xc->setNextPC(NPC);\n");
        assert_eq!(op.flags, vec!["IsControl".to_string()]);
    }

    #[test]
    fn unknown_extension_names_the_operand() {
        let m = model();
        let err = m.instantiate("Ra", Some("zz"), true, false).unwrap_err();
        match err {
            IsaError::Declaration { message, .. } => {
                assert!(message.contains("'zz'"));
                assert!(message.contains("'Ra.zz'"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
