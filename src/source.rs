//! The normalized source-line model: one entry per physical line of the
//! assembled program, in program order, carrying its assigned address (if
//! any) and any breakpoints the debugger has attached to it.

use crate::condition::Condition;

/// One line of already-normalized source text.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub text: String,
    pub addr: Option<u16>,
    pub has_breakpoint: bool,
    pub cond_breakpoints: Vec<Condition>,
}

impl SourceLine {
    pub fn new(text: String, addr: Option<u16>) -> SourceLine {
        SourceLine { text, addr, has_breakpoint: false, cond_breakpoints: Vec::new() }
    }

    pub fn has_cond_breakpoint(&self) -> bool {
        !self.cond_breakpoints.is_empty()
    }

    /// Whether this line actually occupies bytes in the image: an
    /// instruction or a `.long`, as opposed to a bare label or a
    /// `.pos`/`.align` line that only repositions the write cursor.
    pub fn is_addressable(&self) -> bool {
        is_instruction_line(&self.text) || starts_with_word(&self.text, ".long")
    }
}

fn starts_with_word(line: &str, word: &str) -> bool {
    line.split_whitespace().next() == Some(word)
}

/// A line consisting of nothing but `NAME:` (a label declaration).
///
/// Grounded on the original `is_label_line`: exactly one trailing colon,
/// nothing but whitespace after it, and the name itself alphanumeric or
/// `_` with at least one alphanumeric character.
pub fn is_label_line(line: &str) -> bool {
    let line = line.trim();
    match line.rfind(':') {
        Some(idx) if idx == line.len() - 1 => {
            let name = &line[..idx];
            !name.is_empty()
                && name.chars().all(|c| c.is_alphanumeric() || c == '_')
                && name.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub fn is_instruction_line(line: &str) -> bool {
    let mnemonic = line.split_whitespace().next().unwrap_or("");
    crate::instr_table::lookup(mnemonic).is_some()
}

/// The full ordered list of normalized source lines for an assembled
/// program.
#[derive(Debug, Clone, Default)]
pub struct SourceModel {
    pub lines: Vec<SourceLine>,
}

impl SourceModel {
    pub fn new() -> SourceModel {
        SourceModel { lines: Vec::new() }
    }

    pub fn push(&mut self, line: SourceLine) {
        self.lines.push(line);
    }

    /// The first addressable line at `addr`. Bare labels and `.pos`/
    /// `.align` lines sharing that address are skipped, since they are
    /// not valid breakpoint targets.
    pub fn find_line(&self, addr: u16) -> Option<&SourceLine> {
        self.lines.iter().find(|l| l.addr == Some(addr) && l.is_addressable())
    }

    pub fn find_line_mut(&mut self, addr: u16) -> Option<&mut SourceLine> {
        self.lines.iter_mut().find(|l| l.addr == Some(addr) && l.is_addressable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_line_detection() {
        assert!(is_label_line("loop:"));
        assert!(is_label_line("  loop:  "));
        assert!(!is_label_line("loop: halt"));
        assert!(!is_label_line(":"));
        assert!(!is_label_line("halt"));
    }

    #[test]
    fn find_line_skips_non_addressable() {
        let mut model = SourceModel::new();
        model.push(SourceLine::new("loop:".to_string(), Some(0x10)));
        model.push(SourceLine::new("halt".to_string(), Some(0x10)));
        let found = model.find_line(0x10).unwrap();
        assert_eq!(found.text, "halt");
    }
}
