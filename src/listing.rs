//! The `makeyis`-format source-and-bytecode listing.
//!
//! Format grounded on the original `gen_yo_file`: each addressable line
//! is rendered as `0x<addr>: ` followed by its encoded bytes in hex,
//! padded to a fixed 13-character field, then `| ` and the source text.
//! Bare labels and `.pos`/`.align` lines get 13 spaces in place of an
//! address and bytes.

use crate::machine::Machine;
use std::fs;
use std::io;

const BYTES_FIELD_WIDTH: usize = 13;

pub fn render(machine: &Machine) -> String {
    let mut out = String::new();
    for line in &machine.source.lines {
        match line.addr {
            Some(addr) if line.is_addressable() => {
                let size = instruction_size(machine, addr, &line.text);
                let hex: String = (0..size)
                    .map(|i| format!("{:02x} ", machine.memory[addr as usize + i]))
                    .collect();
                out.push_str(&format!(
                    "0x{:03x}: {:<width$}| {}\n",
                    addr,
                    hex,
                    line.text,
                    width = BYTES_FIELD_WIDTH
                ));
            }
            _ => {
                out.push_str(&format!("{:width$}| {}\n", "", line.text, width = BYTES_FIELD_WIDTH));
            }
        }
    }
    out
}

fn instruction_size(machine: &Machine, addr: u16, text: &str) -> usize {
    if text.split_whitespace().next() == Some(".long") {
        4
    } else {
        let opcode = machine.memory[addr as usize];
        crate::instr_table::lookup_opcode(opcode).map(|i| i.size as usize).unwrap_or(1)
    }
}

pub fn write_listing(path: &str, machine: &Machine) -> io::Result<()> {
    fs::write(path, render(machine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTable;
    use crate::source::{SourceLine, SourceModel};

    #[test]
    fn renders_addressable_and_label_lines() {
        let mut memory = [0u8; crate::machine::MEMORY_SIZE];
        memory[0] = 0x10; // halt
        let mut source = SourceModel::new();
        source.push(SourceLine::new("loop:".to_string(), Some(0)));
        source.push(SourceLine::new("halt".to_string(), Some(0)));
        let machine = Machine::new(LabelTable::new(), source, memory, 1);

        let listing = render(&machine);
        assert!(listing.contains("loop:"));
        assert!(listing.contains("0x000: 10"));
        assert!(listing.contains("| halt"));
    }
}
