use std::path::PathBuf;

use isagen::{default_variants, CpuVariant, IsaCompiler};

fn compiler() -> (Vec<CpuVariant>, IsaCompiler) {
    let variants = default_variants();
    let compiler = IsaCompiler::new(variants.clone());
    (variants, compiler)
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("isagen-it-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

const TEST_ISA: &str = r#"
////////////////////////////////////////////////////////////////////
//
// Test ISA description
//

def operand_types {{
    'sw' : ('signed int', 32),
    'uq' : ('unsigned int', 64)
}};

def operands {{
    'Ra' : ('IntReg', 'uq', 'RA', 'IsInteger', 1),
    'Rb' : ('IntReg', 'uq', 'RB', 'IsInteger', 2),
    'Rc' : ('IntReg', 'uq', 'RC', 'IsInteger', 3)
}};

output header {{
class TestStaticInst;
}};

def bitfield OPCODE <31:26>;
def bitfield RA     <25:21>;
def bitfield RB     <20:16>;
def bitfield RC     <15:11>;

def template BasicDeclare {{
class %(class_name)s : public TestStaticInst
{
  public:
    %(class_name)s(MachInst machInst);
};
}};

def template BasicConstructor {{
inline %(class_name)s::%(class_name)s(MachInst machInst)
    : TestStaticInst("%(mnemonic)s", machInst, %(op_class)s)
{
    %(constructor)s;
}
}};

def template BasicExecute {{
Fault %(class_name)s::execute(%(CPU_exec_context)s *xc)
{
    Fault fault = No_Fault;
    %(op_decl)s;
    %(op_rd)s;
    %(code)s;
    %(op_wb)s;
    return fault;
}
}};

def template BasicDecode {{
return new %(class_name)s(machInst);
}};

def format BasicOp(code, *opt_flags) {{
    iop = InstObjParams(name, Name, 'TestStaticInst', CodeBlock(code), opt_flags)
    header_output = BasicDeclare.subst(iop)
    decoder_output = BasicConstructor.subst(iop)
    decode_block = BasicDecode.subst(iop)
    exec_output = BasicExecute.subst(iop)
}};

namespace Test;

decode OPCODE default BasicOp::unknown('fault = Unimplemented_Opcode_Fault;') {
  format BasicOp {
    0x01: add('Rc = Ra + Rb;');
    0x02: addw('Rc.sw = Ra.sw + Rb.sw;', IsSerializing);
    0x03: decode RA {
      0x00: clr('Rc = 0;');
    }
  }
}
"#;

#[test]
fn compiles_a_complete_description() {
    let (_, mut compiler) = compiler();
    let compiled = compiler
        .compile_str(TEST_ISA, "arch/test/isa_desc")
        .expect("compile test description");

    assert_eq!(compiled.isa_name, "Test");
    assert_eq!(compiled.namespace, "TestInst");

    // Bitfield macros land in the declaration header, outside the namespace.
    let header = &compiled.global_code.header_output;
    assert!(header.contains("#undef OPCODE\n#define OPCODE\tbits(machInst, 31, 26)\n"));
    assert!(header.contains("class TestStaticInst;"));

    // Per-instruction declarations are namespaced.
    let ns_header = &compiled.namespace_code.header_output;
    assert!(ns_header.contains("class Add : public TestStaticInst"));
    assert!(ns_header.contains("class Addw : public TestStaticInst"));
    assert!(ns_header.contains("class Unknown : public TestStaticInst"));

    // The constructor counts and indexes the scanned register operands.
    let decoder = &compiled.namespace_code.decoder_output;
    assert!(decoder.contains("_srcRegIdx[0] = RA;"));
    assert!(decoder.contains("_srcRegIdx[1] = RB;"));
    assert!(decoder.contains("_destRegIdx[0] = RC;"));
    assert!(decoder.contains("_numSrcRegs = 2;"));
    assert!(decoder.contains("flags[IsInteger] = true;"));
    assert!(decoder.contains("flags[IsSerializing] = true;"));
    assert!(decoder.contains("IntAluOp"));
    assert!(decoder.contains("// BasicOp::add(Rc = Ra + Rb;)"));
}

#[test]
fn decode_tree_nests_and_inherits_defaults() {
    let (_, mut compiler) = compiler();
    let compiled = compiler
        .compile_str(TEST_ISA, "arch/test/isa_desc")
        .expect("compile test description");

    let block = &compiled.namespace_code.decode_block;
    assert!(block.contains("StaticInstPtr<Test>"));
    assert!(block.contains("Test::decodeInst(Test::MachInst machInst)"));
    assert!(block.contains("using namespace TestInst;"));
    assert!(block.contains("switch (OPCODE) {"));
    assert!(block.contains("switch (RA) {"));
    assert!(block.contains("case 0x1:"));
    assert!(block.contains("case 0x3:"));
    assert!(block.contains("return new Clr(machInst);"));

    // The outer default is inherited by the nested block, so the fallback
    // instantiation appears once per switch.
    assert_eq!(block.matches("return new Unknown(machInst);").count(), 2);
    assert_eq!(block.matches("default:").count(), 2);
}

#[test]
fn exec_output_is_specialized_per_variant() {
    let (variants, mut compiler) = compiler();
    let compiled = compiler
        .compile_str(TEST_ISA, "arch/test/isa_desc")
        .expect("compile test description");

    for variant in &variants {
        let exec = &compiled.namespace_code.exec_output[&variant.name];
        let context = &variant.strings["CPU_exec_context"];
        assert!(
            exec.contains(&format!("Fault Add::execute({context} *xc)")),
            "missing specialized execute for {}",
            variant.name
        );
    }

    // Undersized signed views read truncated and write sign-extended.
    let exec = &compiled.namespace_code.exec_output["SimpleCPU"];
    assert!(exec.contains("Ra = bits(xc->readIntReg(this, 0), 31, 0);"));
    assert!(exec.contains("uint64_t final_val = sext<32>(Rc);"));
    // Extension references are munged down to plain names in the body.
    assert!(exec.contains("Rc = Ra + Rb;"));
}

#[test]
fn output_files_are_framed_and_stable() {
    let (variants, mut compiler) = compiler();
    let compiled = compiler
        .compile_str(TEST_ISA, "arch/test/isa_desc")
        .expect("compile test description");

    let dir = scratch_dir("outputs");
    compiled
        .write_outputs(&variants, &dir, "arch/test")
        .expect("write outputs");

    let header = std::fs::read_to_string(dir.join("decoder.hh")).expect("decoder.hh");
    assert!(header.contains("DO NOT EDIT THIS FILE!!!"));
    assert!(header.contains("generated from the ISA description in arch/test/isa_desc"));
    assert!(header.contains("namespace TestInst {"));

    let source = std::fs::read_to_string(dir.join("decoder.cc")).expect("decoder.cc");
    assert!(source.contains("#include \"arch/test/decoder.hh\""));
    assert!(source.contains("switch (OPCODE) {"));

    for variant in &variants {
        let exec = std::fs::read_to_string(dir.join(&variant.filename)).expect("exec unit");
        assert!(exec.contains(&variant.includes));
    }

    // A second pass over unchanged output leaves identical files.
    compiled
        .write_outputs(&variants, &dir, "arch/test")
        .expect("rewrite outputs");
    assert_eq!(
        header,
        std::fs::read_to_string(dir.join("decoder.hh")).expect("decoder.hh again")
    );
}

#[test]
fn includes_splice_across_files() {
    let dir = scratch_dir("includes");
    std::fs::write(
        dir.join("bitfields.isa"),
        "def bitfield OPCODE <31:26>;\ndef bitfield RA <25:21>;\n",
    )
    .expect("write include");
    std::fs::write(
        dir.join("top.isa"),
        "##include \"bitfields.isa\"\nnamespace Test;\n\
         def format F(code) {{ decode_block = code }};\n\
         decode OPCODE { 0x1: F::nop('nop'); }\n",
    )
    .expect("write top");

    let (_, mut compiler) = compiler();
    let compiled = compiler
        .compile_file(&dir.join("top.isa"))
        .expect("compile with include");
    assert!(compiled
        .global_code
        .header_output
        .contains("#define OPCODE\tbits(machInst, 31, 26)"));
    assert!(compiled.namespace_code.decode_block.contains("case 0x1:"));
}

#[test]
fn errors_carry_the_including_file_trail() {
    let dir = scratch_dir("error-trail");
    std::fs::write(dir.join("broken.isa"), "def bitfield BAD <31:z>;\n").expect("write include");
    std::fs::write(
        dir.join("top.isa"),
        "##include \"broken.isa\"\nnamespace Test;\ndecode OPCODE { }\n",
    )
    .expect("write top");

    let (_, mut compiler) = compiler();
    let err = compiler
        .compile_file(&dir.join("top.isa"))
        .expect_err("bad bit index");
    let text = err.to_string();
    assert!(text.contains("In file included from"), "got: {text}");
    assert!(text.contains("top.isa"), "got: {text}");
    assert!(text.contains("broken.isa:1"), "got: {text}");
    assert!(text.contains("expected low bit index"), "got: {text}");
}
