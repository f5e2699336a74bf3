//! Value-descriptor grammar: `%reg`, signed decimal/hex literals
//! (optionally `$`-prefixed), and bounded `[addr,width]` memory loads.
//!
//! Grounded on the original `calc_value_descriptor`; the `[addr,width]`
//! bounds check is the original's `addr > 4096 - num_bytes` rewritten so
//! it cannot underflow when `width` itself is malformed.

use crate::machine::Machine;
use crate::values;
use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueDescriptorError;

/// Whether `descriptor` is syntactically a valid value descriptor, without
/// requiring a [Machine] to evaluate it against. Used at condition
/// construction time, before any machine state exists to check bounds
/// against beyond the fixed memory size.
pub fn is_valid_syntax(descriptor: &str) -> bool {
    let descriptor = descriptor.trim();
    if let Some(reg) = descriptor.strip_prefix('%') {
        return values::register_index(reg).is_some();
    }
    if let Some(inner) = descriptor.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return is_valid_memory_syntax(inner);
    }
    let literal = descriptor.strip_prefix('$').unwrap_or(descriptor);
    values::parse_integer(literal).is_some()
}

fn is_valid_memory_syntax(inner: &str) -> bool {
    let mut parts = inner.splitn(2, ',');
    let Some(addr_part) = parts.next() else { return false };
    let Some(width_part) = parts.next() else { return false };

    let Some(addr) = values::parse_integer(addr_part.trim()) else { return false };
    let Ok(width) = width_part.trim().parse::<usize>() else { return false };
    if addr < 0 || !matches!(width, 1 | 2 | 4) {
        return false;
    }
    match (addr as usize).checked_add(width) {
        Some(end) => end <= crate::machine::MEMORY_SIZE,
        None => false,
    }
}

pub fn evaluate(descriptor: &str, machine: &Machine) -> Result<i64, ValueDescriptorError> {
    let descriptor = descriptor.trim();
    if let Some(reg) = descriptor.strip_prefix('%') {
        return values::register_index(reg)
            .map(|i| machine.register(i) as i64)
            .ok_or(ValueDescriptorError);
    }
    if let Some(inner) = descriptor.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return evaluate_memory(inner, machine);
    }
    let literal = descriptor.strip_prefix('$').unwrap_or(descriptor);
    values::parse_integer(literal).ok_or(ValueDescriptorError)
}

fn evaluate_memory(inner: &str, machine: &Machine) -> Result<i64, ValueDescriptorError> {
    let mut parts = inner.splitn(2, ',');
    let addr_part = parts.next().ok_or(ValueDescriptorError)?.trim();
    let width_part = parts.next().ok_or(ValueDescriptorError)?.trim();

    let addr = values::parse_integer(addr_part).ok_or(ValueDescriptorError)?;
    let width: usize = width_part.parse().map_err(|_| ValueDescriptorError)?;
    if addr < 0 || !matches!(width, 1 | 2 | 4) {
        return Err(ValueDescriptorError);
    }
    let addr = addr as usize;
    if addr.checked_add(width).ok_or(ValueDescriptorError)? > machine.memory.len() {
        return Err(ValueDescriptorError);
    }
    let bytes = &machine.memory[addr..addr + width];
    Ok(match width {
        1 => bytes[0] as i64,
        2 => LittleEndian::read_u16(bytes) as i64,
        4 => LittleEndian::read_u32(bytes) as i64,
        _ => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTable;
    use crate::source::SourceModel;

    fn blank_machine() -> Machine {
        Machine::new(LabelTable::new(), SourceModel::new(), [0u8; crate::machine::MEMORY_SIZE], 0)
    }

    #[test]
    fn register_descriptor() {
        let mut m = blank_machine();
        m.set_register(values::EAX, 7);
        assert_eq!(evaluate("%eax", &m), Ok(7));
    }

    #[test]
    fn literal_descriptor() {
        let m = blank_machine();
        assert_eq!(evaluate("$5", &m), Ok(5));
        assert_eq!(evaluate("-3", &m), Ok(-3));
        assert_eq!(evaluate("0x10", &m), Ok(16));
    }

    #[test]
    fn memory_descriptor() {
        let mut m = blank_machine();
        m.memory[0..4].copy_from_slice(&42u32.to_le_bytes());
        assert_eq!(evaluate("[0,4]", &m), Ok(42));
        assert_eq!(evaluate("[0,1]", &m), Ok(42));
    }

    #[test]
    fn memory_descriptor_out_of_bounds() {
        let m = blank_machine();
        assert_eq!(evaluate("[4095,4]", &m), Err(ValueDescriptorError));
    }

    #[test]
    fn syntax_validation() {
        assert!(is_valid_syntax("%eax"));
        assert!(is_valid_syntax("$5"));
        assert!(is_valid_syntax("-3"));
        assert!(is_valid_syntax("[0,4]"));
        assert!(!is_valid_syntax("%nope"));
        assert!(!is_valid_syntax("$$$"));
        assert!(!is_valid_syntax("garbage"));
        assert!(!is_valid_syntax("[4095,4]"));
    }
}
