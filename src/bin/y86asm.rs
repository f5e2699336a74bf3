use std::{env, fs};
use y86sim::assembler;
use y86sim::logging::error;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <input.ys> <output.bin>", args[0]);
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];

    let program = assembler::assemble_from_file(input_path).unwrap_or_else(|e| {
        error(e.to_string());
        std::process::exit(2);
    });

    let image = &program.memory[..program.mem_len as usize];
    fs::write(output_path, image).unwrap_or_else(|e| {
        error(format!("failed to write to output file: {}", e));
        std::process::exit(3);
    });
}
