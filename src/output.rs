//! Output file assembly.
//!
//! Every generated file shares one frame: a do-not-edit banner naming the
//! source description, the includes, code outside the ISA namespace, and a
//! namespace block. Files are only rewritten when their content actually
//! changed, so downstream builds rebuild the minimum.

use std::path::Path;

use log::info;

use crate::compiler::CompiledIsa;
use crate::error::IsaError;
use crate::gencode::CpuVariant;

fn file_frame(
    filename: &str,
    includes: &str,
    global_output: &str,
    namespace: &str,
    namespace_output: &str,
) -> String {
    format!(
        "\n/*\n * DO NOT EDIT THIS FILE!!!\n *\n * It was automatically generated from \
         the ISA description in {filename}\n */\n\n{includes}\n\n{global_output}\n\n\
         namespace {namespace} {{\n\n{namespace_output}\n\n}} // namespace {namespace}\n"
    )
}

/// Writes `contents` to `path` only if it differs from what is already
/// there. Returns whether the file was written.
pub fn update_if_needed(path: &Path, contents: &str) -> Result<bool, IsaError> {
    match std::fs::read_to_string(path) {
        Ok(old) if old == contents => {
            info!("file {} is unchanged", path.display());
            return Ok(false);
        }
        Ok(_) => info!("updating {}", path.display()),
        Err(_) => info!("generating {}", path.display()),
    }
    std::fs::write(path, contents)?;
    Ok(true)
}

impl CompiledIsa {
    /// Renders the declaration header (`decoder.hh` content).
    pub fn decoder_header(&self) -> String {
        file_frame(
            &self.input_filename,
            "#include \"base/bitfield.hh\" // for bitfield support",
            &self.global_code.header_output,
            &self.namespace,
            &self.namespace_code.header_output,
        )
    }

    /// Renders the decoder unit (`decoder.cc` content): the decoder output
    /// followed by the decode function itself.
    pub fn decoder_source(&self, include_path: &str) -> String {
        let mut namespace_output = self.namespace_code.decoder_output.clone();
        namespace_output.push_str(&self.namespace_code.decode_block);
        file_frame(
            &self.input_filename,
            &format!("#include \"{include_path}/decoder.hh\""),
            &self.global_code.decoder_output,
            &self.namespace,
            &namespace_output,
        )
    }

    /// Renders one engine variant's execution unit.
    pub fn exec_source(&self, include_path: &str, variant: &CpuVariant) -> String {
        let includes = format!(
            "#include \"{include_path}/decoder.hh\"\n{}",
            variant.includes
        );
        let empty = String::new();
        let global = self
            .global_code
            .exec_output
            .get(&variant.name)
            .unwrap_or(&empty);
        let namespace = self
            .namespace_code
            .exec_output
            .get(&variant.name)
            .unwrap_or(&empty);
        file_frame(
            &self.input_filename,
            &includes,
            global,
            &self.namespace,
            namespace,
        )
    }

    /// Writes `decoder.hh`, `decoder.cc`, and one execution unit per
    /// variant into `output_dir`.
    pub fn write_outputs(
        &self,
        variants: &[CpuVariant],
        output_dir: &Path,
        include_path: &str,
    ) -> Result<(), IsaError> {
        update_if_needed(&output_dir.join("decoder.hh"), &self.decoder_header())?;
        update_if_needed(
            &output_dir.join("decoder.cc"),
            &self.decoder_source(include_path),
        )?;
        for variant in variants {
            update_if_needed(
                &output_dir.join(&variant.filename),
                &self.exec_source(include_path, variant),
            )?;
        }
        Ok(())
    }
}
