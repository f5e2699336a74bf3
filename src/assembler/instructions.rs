//! Code generation functions for instructions
//!
//! Byte layouts are pinned by the original `assembler.c`'s codegen
//! functions: reg-reg and reg-io instructions share one byte-2 layout per
//! family, so one helper covers every mnemonic in that family rather than
//! one function per mnemonic the way the CHIP-8 dialect needed.

use super::statement::{MemOperand, Statement};
use crate::assembler;
use crate::labels::LabelTable;
use crate::split_u32_le;

pub fn no_operand(statement: &Statement, opcode: u8) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(0)?;
    Ok(vec![opcode])
}

/// `addl`/`subl`/`andl`/`xorl`/`multl`/`divl`/`modl`/`rrmovl`: `OP %src,%dst`.
pub fn reg_reg(statement: &Statement, opcode: u8) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(2)?;
    let src = statement.parse_register(0)?;
    let dst = statement.parse_register(1)?;
    Ok(vec![opcode, (src << 4) | dst])
}

/// `rdch`/`wrch`/`rdint`/`wrint`/`pushl`/`popl`: `OP %reg`.
pub fn reg_io(statement: &Statement, opcode: u8) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(1)?;
    let reg = statement.parse_register(0)?;
    Ok(vec![opcode, (reg << 4) | 0x8])
}

pub fn irmovl(statement: &Statement, labels: &LabelTable) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(2)?;
    let dst = statement.parse_register(0)?;
    let imm = match statement.parse_immediate(1) {
        Ok(value) => {
            if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
                return Err(assembler::Error::ArgumentOverflow {
                    argument: value,
                    argument_span: statement.argument_span(1),
                    line_number: statement.line_number(),
                    line: statement.line(),
                });
            }
            value as u32
        }
        Err(_) => statement.parse_label(1, labels)? as u32,
    };
    let mut bytes = vec![0x30, dst | 0x80];
    bytes.extend(split_u32_le!(imm));
    Ok(bytes)
}

fn encode_mem(opcode: u8, data_reg: u8, mem: MemOperand) -> Vec<u8> {
    let mut bytes = vec![opcode];
    match mem {
        MemOperand::Disp { disp, reg } => {
            bytes.push((data_reg << 4) | reg);
            bytes.extend(split_u32_le!(disp as u32));
        }
        MemOperand::Label(addr) => {
            bytes.push((data_reg << 4) | 0x8);
            bytes.extend(split_u32_le!(addr as u32));
        }
    }
    bytes
}

/// `rmmovl %src,disp(%reg)` / `rmmovl %src,label`: store `%src` into memory.
pub fn rmmovl(statement: &Statement, labels: &LabelTable) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(2)?;
    let src = statement.parse_register(0)?;
    let mem = statement.parse_mem_operand(1, labels)?;
    Ok(encode_mem(0x40, src, mem))
}

/// `mrmovl disp(%reg),%dst` / `mrmovl label,%dst`: load memory into `%dst`.
pub fn mrmovl(statement: &Statement, labels: &LabelTable) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(2)?;
    let mem = statement.parse_mem_operand(0, labels)?;
    let dst = statement.parse_register(1)?;
    Ok(encode_mem(0x50, dst, mem))
}

/// `jmp`/`jle`/`jl`/`je`/`jne`/`jge`/`jg`/`call`: `OP target`.
pub fn jump(statement: &Statement, labels: &LabelTable, opcode: u8) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(1)?;
    let target = statement.parse_number_or_label(0, labels)?;
    let mut bytes = vec![opcode];
    bytes.extend(split_u32_le!(target as u32));
    Ok(bytes)
}
