//! `.long`/`.pos`/`.align`: the only directives the Y86 dialect has.
//!
//! `.pos`/`.align` never emit bytes, they reposition the write cursor for
//! everything that follows (grounded on the original's position-tracking
//! loop in `first_pass`); `.long` emits a plain 4-byte little-endian word.

use super::statement::Statement;
use crate::assembler;
use crate::labels::LabelTable;
use crate::split_u32_le;

pub fn long(statement: &Statement, labels: &LabelTable) -> Result<Vec<u8>, assembler::Error> {
    statement.assert_n_arguments(1)?;
    let value = statement.parse_immediate_or_label(0, labels)?;
    Ok(split_u32_le!(value))
}

pub fn pos(statement: &Statement) -> Result<u16, assembler::Error> {
    statement.assert_n_arguments(1)?;
    Ok(statement.parse_plain_number(0)? as u16)
}

pub fn align(statement: &Statement, current_address: u16) -> Result<u16, assembler::Error> {
    statement.assert_n_arguments(1)?;
    let k = (statement.parse_plain_number(0)?.max(1)) as u16;
    Ok(round_up_to_nearest(current_address, k))
}

fn round_up_to_nearest(address: u16, k: u16) -> u16 {
    let rem = address % k;
    if rem == 0 {
        address
    } else {
        address + (k - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_the_next_multiple() {
        assert_eq!(round_up_to_nearest(0x101, 0x100), 0x200);
        assert_eq!(round_up_to_nearest(0x100, 0x100), 0x100);
    }
}
