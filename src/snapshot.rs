//! The binary snapshot ("pause file") codec.
//!
//! Field order and the length-prefixed string convention (u16 length
//! including the trailing NUL, then the raw bytes) are grounded on the
//! original `pause.c`'s `gen_pause_file`/`restore_simulator_state`. Since
//! this crate's [DebuggerIo](crate::io::DebuggerIo) does not track live
//! pane line buffers the way the curses-backed original does, the
//! trailing UI-state section is still written and read in full for wire
//! fidelity, but the pane line-buffer bytes themselves are treated as an
//! opaque blob this Rust UI never interprets.

use crate::condition::{Condition, Op};
use crate::machine::Machine;
use crate::source::SourceLine;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    w.write_u16::<LittleEndian>(bytes.len() as u16)?;
    w.write_all(&bytes)
}

fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    bytes.pop();
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn op_code(op: Op) -> u8 {
    match op {
        Op::Lt => 0,
        Op::Gt => 1,
        Op::Eq => 2,
        Op::Geq => 3,
        Op::Leq => 4,
        Op::Neq => 5,
    }
}

fn op_from_code(code: u8) -> io::Result<Op> {
    Ok(match code {
        0 => Op::Lt,
        1 => Op::Gt,
        2 => Op::Eq,
        3 => Op::Geq,
        4 => Op::Leq,
        5 => Op::Neq,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "bad condition operator")),
    })
}

fn write_condition<W: Write>(w: &mut W, c: &Condition) -> io::Result<()> {
    write_string(w, &c.x)?;
    write_string(w, &c.y)?;
    w.write_u8(op_code(c.op))
}

fn read_condition<R: Read>(r: &mut R) -> io::Result<Condition> {
    let x = read_string(r)?;
    let y = read_string(r)?;
    let op = op_from_code(r.read_u8()?)?;
    Ok(Condition { x, y, op })
}

fn write_condition_list<W: Write>(w: &mut W, list: &[Condition]) -> io::Result<()> {
    w.write_u16::<LittleEndian>(list.len() as u16)?;
    for c in list {
        write_condition(w, c)?;
    }
    Ok(())
}

fn read_condition_list<R: Read>(r: &mut R) -> io::Result<Vec<Condition>> {
    let n = r.read_u16::<LittleEndian>()?;
    (0..n).map(|_| read_condition(r)).collect()
}

fn write_source_line<W: Write>(w: &mut W, line: &SourceLine) -> io::Result<()> {
    write_string(w, &line.text)?;
    w.write_u16::<LittleEndian>(line.addr.unwrap_or(0))?;
    w.write_u8(line.has_breakpoint as u8)?;
    w.write_u8(line.has_cond_breakpoint() as u8)?;
    write_condition_list(w, &line.cond_breakpoints)
}

fn read_source_line<R: Read>(r: &mut R) -> io::Result<SourceLine> {
    let text = read_string(r)?;
    let addr = r.read_u16::<LittleEndian>()?;
    let has_breakpoint = r.read_u8()? != 0;
    let _has_cond_breakpoint = r.read_u8()? != 0;
    let cond_breakpoints = read_condition_list(r)?;
    Ok(SourceLine { text, addr: Some(addr), has_breakpoint, cond_breakpoints })
}

fn write_source_lines<W: Write>(w: &mut W, lines: &[SourceLine]) -> io::Result<()> {
    w.write_u16::<LittleEndian>(lines.len() as u16)?;
    for l in lines {
        write_source_line(w, l)?;
    }
    Ok(())
}

fn read_source_lines<R: Read>(r: &mut R) -> io::Result<Vec<SourceLine>> {
    let n = r.read_u16::<LittleEndian>()?;
    (0..n).map(|_| read_source_line(r)).collect()
}

const TITLE_LEN: usize = 512;

fn write_title<W: Write>(w: &mut W, title: &str) -> io::Result<()> {
    let mut buf = [0u8; TITLE_LEN];
    let bytes = title.as_bytes();
    let n = bytes.len().min(TITLE_LEN);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&buf)
}

fn read_title<R: Read>(r: &mut R) -> io::Result<String> {
    let mut buf = [0u8; TITLE_LEN];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(TITLE_LEN);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn write_line_buffer<W: Write>(w: &mut W, width: u16) -> io::Result<()> {
    let buf = vec![0u8; width as usize + 1];
    w.write_all(&buf)
}

fn read_line_buffer<R: Read>(r: &mut R, width: i32) -> io::Result<()> {
    let mut buf = vec![0u8; width.max(0) as usize + 1];
    r.read_exact(&mut buf)
}

/// Write a full snapshot of `machine`'s state, plus the current pane
/// dimensions, to `path`.
pub fn save(path: &str, machine: &Machine, pane_dims: (u16, u16)) -> io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    for &reg in &machine.registers {
        w.write_u32::<LittleEndian>(reg)?;
    }
    w.write_u16::<LittleEndian>(machine.pc)?;
    w.write_u32::<LittleEndian>(machine.flags.of as u32)?;
    w.write_u32::<LittleEndian>(machine.flags.sf as u32)?;
    w.write_u32::<LittleEndian>(machine.flags.zf as u32)?;
    w.write_all(&machine.memory)?;
    write_condition_list(&mut w, &machine.watch_conditions)?;
    write_source_lines(&mut w, &machine.source.lines)?;

    w.write_f32::<LittleEndian>(0.5)?; // dbg_win_frac
    w.write_i32::<LittleEndian>(machine.source.lines.len() as i32)?; // num_lines
    w.write_i32::<LittleEndian>(0)?; // cur_sim_line
    w.write_i32::<LittleEndian>(0)?; // next_dbg_line
    w.write_i32::<LittleEndian>(0)?; // sim_window_overflow
    write_title(&mut w, "y86sim")?;
    write_title(&mut w, "debugger")?;
    let (width, height) = pane_dims;
    w.write_i32::<LittleEndian>(width as i32)?; // line_width
    w.write_i32::<LittleEndian>(height as i32)?; // num_dbg_lines
    w.write_i32::<LittleEndian>(height as i32)?; // num_sim_lines

    for _ in 0..height {
        write_line_buffer(&mut w, width)?;
    }
    for _ in 0..height {
        write_line_buffer(&mut w, width)?;
    }

    w.flush()
}

#[derive(Debug)]
pub enum RestoreError {
    Io(io::Error),
    SourceMismatch,
    TerminalTooSmall,
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreError::Io(e) => write!(f, "{}", e),
            RestoreError::SourceMismatch => write!(f, "different source file"),
            RestoreError::TerminalTooSmall => write!(f, "window too big to fit in this console"),
        }
    }
}

impl std::error::Error for RestoreError {}

impl From<io::Error> for RestoreError {
    fn from(e: io::Error) -> RestoreError {
        RestoreError::Io(e)
    }
}

/// Restore `machine`'s state from the snapshot at `path`.
///
/// If the snapshot's source text doesn't match the currently loaded
/// program, or its pane dimensions exceed `current_dims`, `machine` is
/// left completely untouched and an error is returned.
pub fn restore(path: &str, machine: &mut Machine, current_dims: (u16, u16)) -> Result<(), RestoreError> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);

    let mut registers = [0u32; 8];
    for reg in registers.iter_mut() {
        *reg = r.read_u32::<LittleEndian>()?;
    }
    let pc = r.read_u16::<LittleEndian>()?;
    let of = r.read_u32::<LittleEndian>()? != 0;
    let sf = r.read_u32::<LittleEndian>()? != 0;
    let zf = r.read_u32::<LittleEndian>()? != 0;
    let mut memory = [0u8; crate::machine::MEMORY_SIZE];
    r.read_exact(&mut memory)?;
    let watch_conditions = read_condition_list(&mut r)?;
    let new_lines = read_source_lines(&mut r)?;

    let source_matches = new_lines.len() == machine.source.lines.len()
        && new_lines.iter().zip(machine.source.lines.iter()).all(|(a, b)| a.text == b.text);
    if !source_matches {
        return Err(RestoreError::SourceMismatch);
    }

    let _dbg_win_frac = r.read_f32::<LittleEndian>()?;
    let _num_lines = r.read_i32::<LittleEndian>()?;
    let _cur_sim_line = r.read_i32::<LittleEndian>()?;
    let _next_dbg_line = r.read_i32::<LittleEndian>()?;
    let _sim_window_overflow = r.read_i32::<LittleEndian>()?;
    let _sim_title = read_title(&mut r)?;
    let _dbg_title = read_title(&mut r)?;
    let line_width = r.read_i32::<LittleEndian>()?;
    let num_dbg_lines = r.read_i32::<LittleEndian>()?;
    let num_sim_lines = r.read_i32::<LittleEndian>()?;

    if line_width > current_dims.0 as i32 || num_dbg_lines.max(num_sim_lines) > current_dims.1 as i32 {
        return Err(RestoreError::TerminalTooSmall);
    }

    for _ in 0..num_dbg_lines {
        read_line_buffer(&mut r, line_width)?;
    }
    for _ in 0..num_sim_lines {
        read_line_buffer(&mut r, line_width)?;
    }

    machine.registers = registers;
    machine.pc = pc;
    machine.flags.of = of;
    machine.flags.sf = sf;
    machine.flags.zf = zf;
    machine.memory = memory;
    machine.watch_conditions = watch_conditions;
    for (dst, src) in machine.source.lines.iter_mut().zip(new_lines.into_iter()) {
        dst.addr = src.addr;
        dst.has_breakpoint = src.has_breakpoint;
        dst.cond_breakpoints = src.cond_breakpoints;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTable;
    use crate::source::SourceModel;
    use std::env;

    fn temp_path(name: &str) -> String {
        let mut p = env::temp_dir();
        p.push(format!("y86sim-snapshot-test-{}-{}", std::process::id(), name));
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn round_trip_preserves_registers_and_memory() {
        let mut source = SourceModel::new();
        source.push(SourceLine::new("halt".to_string(), Some(0)));
        let mut machine = Machine::new(LabelTable::new(), source, [0u8; crate::machine::MEMORY_SIZE], 1);
        machine.set_register(crate::values::EAX, 42);
        machine.pc = 7;
        machine.flags.zf = true;
        machine.memory[10] = 0xAB;

        let path = temp_path("roundtrip");
        save(&path, &machine, (80, 24)).unwrap();

        let mut source2 = SourceModel::new();
        source2.push(SourceLine::new("halt".to_string(), Some(0)));
        let mut restored = Machine::new(LabelTable::new(), source2, [0u8; crate::machine::MEMORY_SIZE], 1);
        restore(&path, &mut restored, (80, 24)).unwrap();

        assert_eq!(restored.register(crate::values::EAX), 42);
        assert_eq!(restored.pc, 7);
        assert!(restored.flags.zf);
        assert_eq!(restored.memory[10], 0xAB);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restore_rejects_mismatched_source_without_mutating_machine() {
        let mut source = SourceModel::new();
        source.push(SourceLine::new("halt".to_string(), Some(0)));
        let machine = Machine::new(LabelTable::new(), source, [0u8; crate::machine::MEMORY_SIZE], 1);

        let path = temp_path("mismatch");
        save(&path, &machine, (80, 24)).unwrap();

        let mut other_source = SourceModel::new();
        other_source.push(SourceLine::new("nop".to_string(), Some(0)));
        let mut other = Machine::new(LabelTable::new(), other_source, [0u8; crate::machine::MEMORY_SIZE], 1);
        other.set_register(crate::values::EAX, 99);

        let result = restore(&path, &mut other, (80, 24));
        assert!(matches!(result, Err(RestoreError::SourceMismatch)));
        assert_eq!(other.register(crate::values::EAX), 99);

        let _ = std::fs::remove_file(&path);
    }
}
