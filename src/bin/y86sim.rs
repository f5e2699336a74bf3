use std::process;
use y86sim::debugger::Debugger;
use y86sim::io::StdIo;
use y86sim::logging::error;
use y86sim::{assembler, machine};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <source-file>", args[0]);
        process::exit(1);
    }

    let program: machine::AssembledProgram = assembler::assemble_from_file(&args[1]).unwrap_or_else(|e| {
        error(e.to_string());
        process::exit(2);
    });

    let mut machine = program.into_machine();
    let mut io = StdIo::new();
    Debugger::new().run_session(&mut machine, &mut io);
}
