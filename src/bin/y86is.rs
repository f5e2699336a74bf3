use std::{env, fs};
use y86sim::instr_table::{self, Family};
use y86sim::logging::error;
use y86sim::values::register_name;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <input.bin> <output.ys>", args[0]);
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];

    let image = fs::read(input_path).unwrap_or_else(|e| {
        error(format!("failed to read input file: {}", e));
        std::process::exit(2);
    });

    let asm = disassemble(&image);

    fs::write(output_path, asm).unwrap_or_else(|e| {
        error(format!("failed to write to output file: {}", e));
        std::process::exit(3);
    });
}

fn disassemble(image: &[u8]) -> String {
    let mut result = String::new();
    let mut addr: u16 = 0;

    while (addr as usize) < image.len() {
        let pos = addr as usize;
        let opcode = image[pos];
        let Some(instr) = instr_table::lookup_opcode(opcode) else {
            result.push_str(&format!(".pos 0x{:03x}\n.long 0x{:08x}\n", addr, opcode));
            addr += 1;
            continue;
        };

        let remaining = image.len() - pos;
        if remaining < instr.size as usize {
            result.push_str(&format!(".pos 0x{:03x}\n.byte 0x{:02x}\n", addr, opcode));
            addr += 1;
            continue;
        }

        let line = match instr.family {
            Family::NoOperand => instr.name.to_string(),
            Family::RegReg => {
                let byte2 = image[pos + 1];
                let src = reg(byte2 >> 4);
                let dst = reg(byte2 & 0xF);
                format!("{} %{}, %{}", instr.name, src, dst)
            }
            Family::RegIo => {
                let byte2 = image[pos + 1];
                let r = reg(byte2 >> 4);
                format!("{} %{}", instr.name, r)
            }
            Family::Irmovl => {
                let byte2 = image[pos + 1];
                let dst = reg(byte2 & 0xF);
                let imm = read_u32(image, pos + 2);
                format!("{} ${}, %{}", instr.name, imm as i32, dst)
            }
            Family::RegMem => {
                let byte2 = image[pos + 1];
                let data_reg = reg(byte2 >> 4);
                let base = byte2 & 0xF;
                let value = read_u32(image, pos + 2);
                let operand = if base == 0x8 {
                    format!("0x{:03x}", value)
                } else {
                    format!("{}(%{})", value as i32, reg(base))
                };
                if instr.name == "rmmovl" {
                    format!("rmmovl %{}, {}", data_reg, operand)
                } else {
                    format!("mrmovl {}, %{}", operand, data_reg)
                }
            }
            Family::Jump => {
                let target = read_u32(image, pos + 1);
                format!("{} 0x{:03x}", instr.name, target)
            }
        };

        result.push_str(&format!(".pos 0x{:03x}\n{}\n", addr, line));
        addr += instr.size;
    }

    result
}

fn reg(index: u8) -> &'static str {
    register_name(index).unwrap_or("?")
}

fn read_u32(image: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([image[pos], image[pos + 1], image[pos + 2], image[pos + 3]])
}
