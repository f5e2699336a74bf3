//! Fetch-decode-execute loop and instruction semantics.
//!
//! Arithmetic and branch semantics are exactly the ones named in the
//! component design: `divl`/`modl` by zero set `OF` and leave the
//! destination register untouched rather than trapping, and all
//! arithmetic is computed without ever panicking on program-supplied
//! values (wrapping/widened intermediates instead of Rust's
//! overflow-checked `+`/`-`/`*`).

use crate::instr_table::{self, Family};
use crate::machine::Machine;
use crate::values;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halted,
}

#[derive(Debug)]
pub enum RuntimeError {
    InvalidOpcode(u8),
    MemoryOutOfBounds(u32),
    Io(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::InvalidOpcode(op) => write!(f, "invalid opcode 0x{:02x}", op),
            RuntimeError::MemoryOutOfBounds(addr) => {
                write!(f, "memory access out of bounds at 0x{:x}", addr)
            }
            RuntimeError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Program-visible I/O: `rdch`/`wrch`/`rdint`/`wrint`. Kept as a trait so
/// the simulator can run headlessly against canned input in tests.
pub trait Io {
    fn read_char(&mut self) -> Result<u8, RuntimeError>;
    fn write_char(&mut self, c: u8) -> Result<(), RuntimeError>;
    fn read_int(&mut self) -> Result<i32, RuntimeError>;
    fn write_int(&mut self, v: i32) -> Result<(), RuntimeError>;
}

/// Execute a single instruction at the machine's current PC.
pub fn step(machine: &mut Machine, io: &mut dyn Io) -> Result<StepOutcome, RuntimeError> {
    let pc = machine.pc;
    let opcode = read_u8(machine, pc)?;
    let instr = instr_table::lookup_opcode(opcode).ok_or(RuntimeError::InvalidOpcode(opcode))?;

    match instr.name {
        "halt" => {
            machine.halted = true;
            return Ok(StepOutcome::Halted);
        }
        "nop" => {
            machine.pc = pc.wrapping_add(instr.size);
        }
        "ret" => {
            let esp = machine.register(values::ESP);
            let retaddr = read_u32(machine, esp as u16)?;
            machine.set_register(values::ESP, esp.wrapping_add(4));
            machine.pop_frame();
            machine.pc = retaddr as u16;
        }
        "addl" | "subl" | "andl" | "xorl" | "multl" | "divl" | "modl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let (src, dst) = (byte2 >> 4, byte2 & 0xF);
            arithmetic(machine, instr.name, src, dst);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "rrmovl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let (src, dst) = (byte2 >> 4, byte2 & 0xF);
            let value = machine.register(src);
            machine.set_register(dst, value);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "rdch" | "rdint" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let reg = byte2 >> 4;
            let value = if instr.name == "rdch" {
                io.read_char()? as u32
            } else {
                io.read_int()? as u32
            };
            machine.set_register(reg, value);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "wrch" | "wrint" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let reg = byte2 >> 4;
            let value = machine.register(reg);
            if instr.name == "wrch" {
                io.write_char(value as u8)?;
            } else {
                io.write_int(value as i32)?;
            }
            machine.pc = pc.wrapping_add(instr.size);
        }
        "pushl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let reg = byte2 >> 4;
            let value = machine.register(reg);
            let esp = machine.register(values::ESP).wrapping_sub(4);
            write_u32(machine, esp as u16, value)?;
            machine.set_register(values::ESP, esp);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "popl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let reg = byte2 >> 4;
            let esp = machine.register(values::ESP);
            let value = read_u32(machine, esp as u16)?;
            machine.set_register(values::ESP, esp.wrapping_add(4));
            machine.set_register(reg, value);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "irmovl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let dst = byte2 & 0x0F;
            let imm = read_u32(machine, pc + 2)?;
            machine.set_register(dst, imm);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "rmmovl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let src = byte2 >> 4;
            let addr = effective_address(machine, byte2, pc + 2)?;
            let value = machine.register(src);
            write_u32(machine, addr, value)?;
            machine.pc = pc.wrapping_add(instr.size);
        }
        "mrmovl" => {
            let byte2 = read_u8(machine, pc + 1)?;
            let dst = byte2 >> 4;
            let addr = effective_address(machine, byte2, pc + 2)?;
            let value = read_u32(machine, addr)?;
            machine.set_register(dst, value);
            machine.pc = pc.wrapping_add(instr.size);
        }
        "jmp" | "jle" | "jl" | "je" | "jne" | "jge" | "jg" => {
            let target = read_u32(machine, pc + 1)?;
            if condition_for(instr.name, machine.flags) {
                machine.pc = target as u16;
            } else {
                machine.pc = pc.wrapping_add(instr.size);
            }
        }
        "call" => {
            let target = read_u32(machine, pc + 1)?;
            let retaddr = pc.wrapping_add(instr.size);
            let esp = machine.register(values::ESP).wrapping_sub(4);
            write_u32(machine, esp as u16, retaddr as u32)?;
            machine.set_register(values::ESP, esp);
            let func_name = machine
                .labels
                .find_by_addr(target as u16)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("0x{:x}", target));
            machine.push_frame(func_name, pc);
            machine.pc = target as u16;
        }
        other => unreachable!("unhandled instruction mnemonic {}", other),
    }

    Ok(StepOutcome::Continue)
}

fn effective_address(machine: &Machine, byte2: u8, disp_addr: u16) -> Result<u16, RuntimeError> {
    let low = byte2 & 0xF;
    if low == 8 {
        // label mode: the 4-byte field holds an absolute address
        Ok(read_u32(machine, disp_addr)? as u16)
    } else {
        let disp = read_u32(machine, disp_addr)? as i32;
        let base = machine.register(low) as i32;
        Ok(base.wrapping_add(disp) as u16)
    }
}

fn condition_for(mnemonic: &str, flags: crate::machine::Flags) -> bool {
    let sign_mismatch = flags.sf != flags.of;
    match mnemonic {
        "jmp" => true,
        "jle" => flags.zf || sign_mismatch,
        "jl" => sign_mismatch,
        "je" => flags.zf,
        "jne" => !flags.zf,
        "jge" => !sign_mismatch,
        "jg" => !flags.zf && !sign_mismatch,
        _ => unreachable!(),
    }
}

fn arithmetic(machine: &mut Machine, mnemonic: &str, src: u8, dst: u8) {
    let a = machine.register(src) as i32;
    let b = machine.register(dst) as i32;
    let (result, of) = match mnemonic {
        "addl" => (b.wrapping_add(a), b.checked_add(a).is_none()),
        "subl" => (b.wrapping_sub(a), b.checked_sub(a).is_none()),
        "andl" => (b & a, false),
        "xorl" => (b ^ a, false),
        "multl" => {
            let wide = (b as i64) * (a as i64);
            (wide as i32, wide < i32::MIN as i64 || wide > i32::MAX as i64)
        }
        "divl" => {
            if a == 0 {
                machine.flags.of = true;
                return;
            }
            (b.wrapping_div(a), false)
        }
        "modl" => {
            if a == 0 {
                machine.flags.of = true;
                return;
            }
            (b.wrapping_rem(a), false)
        }
        _ => unreachable!(),
    };
    machine.set_register(dst, result as u32);
    machine.flags.of = of;
    machine.flags.sf = result < 0;
    machine.flags.zf = result == 0;
}

fn read_u8(machine: &Machine, addr: u16) -> Result<u8, RuntimeError> {
    machine
        .memory
        .get(addr as usize)
        .copied()
        .ok_or(RuntimeError::MemoryOutOfBounds(addr as u32))
}

fn read_u32(machine: &Machine, addr: u16) -> Result<u32, RuntimeError> {
    let bytes = machine
        .read_bytes(addr, 4)
        .ok_or(RuntimeError::MemoryOutOfBounds(addr as u32))?;
    Ok(LittleEndian::read_u32(bytes))
}

fn write_u32(machine: &mut Machine, addr: u16, value: u32) -> Result<(), RuntimeError> {
    let end = addr as usize + 4;
    if end > machine.memory.len() {
        return Err(RuntimeError::MemoryOutOfBounds(addr as u32));
    }
    LittleEndian::write_u32(&mut machine.memory[addr as usize..end], value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr_table::Family;
    use crate::labels::LabelTable;
    use crate::source::SourceModel;

    struct NullIo;
    impl Io for NullIo {
        fn read_char(&mut self) -> Result<u8, RuntimeError> {
            Ok(0)
        }
        fn write_char(&mut self, _c: u8) -> Result<(), RuntimeError> {
            Ok(())
        }
        fn read_int(&mut self) -> Result<i32, RuntimeError> {
            Ok(0)
        }
        fn write_int(&mut self, _v: i32) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn encode_irmovl(dst: u8, imm: u32) -> Vec<u8> {
        let mut bytes = vec![0x30, dst & 0x0F];
        bytes.extend_from_slice(&imm.to_le_bytes());
        bytes
    }

    fn encode_reg_reg(opcode: u8, src: u8, dst: u8) -> Vec<u8> {
        vec![opcode, (src << 4) | dst]
    }

    fn machine_with_program(program: &[u8]) -> Machine {
        let mut memory = [0u8; crate::machine::MEMORY_SIZE];
        memory[..program.len()].copy_from_slice(program);
        Machine::new(LabelTable::new(), SourceModel::new(), memory, program.len() as u16)
    }

    #[test]
    fn scenario_irmovl_addl_halt() {
        // irmovl $3,%eax; irmovl $4,%ebx; addl %eax,%ebx; halt
        let mut program = encode_irmovl(values::EAX, 3);
        program.extend(encode_irmovl(values::EBX, 4));
        program.extend(encode_reg_reg(0x60, values::EAX, values::EBX));
        program.push(0x10);

        let mut machine = machine_with_program(&program);
        let mut io = NullIo;
        loop {
            match step(&mut machine, &mut io).unwrap() {
                StepOutcome::Halted => break,
                StepOutcome::Continue => {}
            }
        }

        assert_eq!(machine.register(values::EAX), 3);
        assert_eq!(machine.register(values::EBX), 7);
        assert_eq!(machine.flags, crate::machine::Flags::default());
    }

    #[test]
    fn division_by_zero_sets_overflow_and_preserves_dest() {
        let mut program = encode_irmovl(values::EAX, 0);
        program.extend(encode_irmovl(values::EBX, 9));
        program.extend(encode_reg_reg(0x65, values::EAX, values::EBX));
        program.push(0x10);

        let mut machine = machine_with_program(&program);
        let mut io = NullIo;
        loop {
            match step(&mut machine, &mut io).unwrap() {
                StepOutcome::Halted => break,
                StepOutcome::Continue => {}
            }
        }

        assert_eq!(machine.register(values::EBX), 9);
        assert!(machine.flags.of);
    }

    #[test]
    fn call_and_ret_maintain_the_frame_ledger() {
        // irmovl $0x100,%esp; call 0x20 ... 0x20: ret
        let mut program = encode_irmovl(values::ESP, 0x100);
        program.push(0x80);
        program.extend_from_slice(&0x20u32.to_le_bytes());
        program.push(0x10); // halt, never reached if ret works
        while program.len() < 0x20 {
            program.push(0x00); // nop padding
        }
        program.push(0x90); // ret at 0x20

        let mut machine = machine_with_program(&program);
        let mut io = NullIo;
        step(&mut machine, &mut io).unwrap(); // irmovl
        step(&mut machine, &mut io).unwrap(); // call
        assert_eq!(machine.frames.len(), 1);
        step(&mut machine, &mut io).unwrap(); // ret
        assert_eq!(machine.frames.len(), 0);
        assert_eq!(machine.pc, 0x0B); // just past the call instruction
    }

    #[test]
    fn family_table_matches_encoding_assumptions() {
        assert_eq!(instr_table::lookup("addl").unwrap().family, Family::RegReg);
        assert_eq!(instr_table::lookup("irmovl").unwrap().family, Family::Irmovl);
    }
}
