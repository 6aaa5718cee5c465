use std::path::Path;
use std::process::ExitCode;

use isagen::{default_variants, IsaCompiler};

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    let [_, isa_desc, output_dir, include_path] = args.as_slice() else {
        eprintln!("usage: isagen <isa-desc> <output-dir> <include-path>");
        return ExitCode::FAILURE;
    };
    let variants = default_variants();
    let mut compiler = IsaCompiler::new(variants.clone());
    let result = compiler
        .compile_file(Path::new(isa_desc))
        .and_then(|compiled| {
            compiled.write_outputs(&variants, Path::new(output_dir), include_path)
        });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
