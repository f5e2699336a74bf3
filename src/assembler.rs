//! Converts Y86-family assembly source into a 4096-byte memory image, in
//! a two-pass manner.
//!
//! The first pass walks the (comment-stripped) source once, assigning
//! every label and every instruction/directive an address; the second
//! pass resolves labels and writes the actual bytes. Because `.pos` and
//! `.align` can reposition the write cursor to any address, the final
//! image is produced as a flat, absolutely-addressed byte array rather
//! than an append-only vector.
//!
//! Comments start with `#` and run to the end of the line. Labels,
//! instructions and directives can be indented as you wish; a label is a
//! line containing nothing but `NAME:`. Instructions are case-sensitive
//! lowercase mnemonics:
//!
//! ```ignore
//! loop:
//!     irmovl $1,%eax
//!     addl %eax,%ebx      # ebx += 1
//!     rmmovl %ebx,result
//!     jl loop
//!     halt
//! result:
//!     .long 0
//! ```
//!
//! The assembler supports the following instructions:
//! - halt, nop, ret: no operands
//! - addl, subl, andl, xorl, multl, divl, modl, rrmovl: `OP %src,%dst`
//! - rdch, wrch, rdint, wrint, pushl, popl: `OP %reg`
//! - irmovl: `irmovl $imm,%dst` or `irmovl label,%dst`
//! - rmmovl: `rmmovl %src,disp(%reg)` or `rmmovl %src,label`
//! - mrmovl: `mrmovl disp(%reg),%dst` or `mrmovl label,%dst`
//! - jmp, jle, jl, je, jne, jge, jg, call: `OP target`
//!
//! And the following directives:
//! - `.long N`: emit a 4-byte little-endian word
//! - `.pos N`: move the write cursor to address `N`
//! - `.align K`: round the write cursor up to the next multiple of `K`

pub mod codegen_utils;
pub mod directives;
pub mod instructions;
pub mod statement;

use crate::instr_table;
use crate::labels::LabelTable;
use crate::machine::{AssembledProgram, MEMORY_SIZE};
use crate::source;
use crate::source::{SourceLine, SourceModel};
use colored::Colorize;
use regex::Regex;
use statement::{Statement, TokenSpan};
use std::fmt;
use std::fs;

/// Assemble a file into a full [AssembledProgram]
pub fn assemble_from_file(path: &str) -> Result<AssembledProgram, Error> {
    let source = fs::read_to_string(path).map_err(|_| Error::ReadError {
        path: path.to_string(),
    })?;
    assemble(&source)
}

/// Assemble source code text into a full [AssembledProgram]
pub fn assemble(source: &str) -> Result<AssembledProgram, Error> {
    let preprocessed = preprocess(source);
    let (labels, parsed) = first_pass(&preprocessed)?;
    second_pass(&labels, &parsed)
}

fn preprocess(source: &str) -> String {
    source
        .lines()
        .map(|line| line.splitn(2, '#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One normalized, already-addressed line produced by the first pass:
/// either a label declaration or an instruction/directive statement.
enum ParsedLine<'a> {
    Label { addr: u16, text: &'a str },
    Stmt { statement: Statement<'a>, addr: u16 },
}

/// What a statement expands to in the second pass: either real bytes, or
/// a repositioning of the write cursor with nothing emitted.
enum Emit {
    Bytes(Vec<u8>),
    SetAddress(u16),
}

fn tokenize(line: &str, line_index: usize) -> Statement<'_> {
    let re = Regex::new(r"[^,\s]+").unwrap();
    let mut lexemes = Vec::new();
    let mut spans = Vec::new();
    for mat in re.find_iter(line) {
        lexemes.push(mat.as_str());
        spans.push(TokenSpan::new(mat.start(), mat.end()));
    }
    Statement::new(
        lexemes[0],
        spans[0],
        lexemes[1..].to_vec(),
        spans[1..].to_vec(),
        line_index + 1,
        line,
    )
}

fn first_pass(source: &str) -> Result<(LabelTable, Vec<ParsedLine>), Error> {
    let mut labels = LabelTable::new();
    let mut parsed = Vec::new();
    let mut address: u16 = 0;

    for (line_index, line) in source.lines().enumerate() {
        if source::is_label_line(line) {
            let name = line.trim().trim_end_matches(':').trim().to_string();
            if !labels.insert(name.clone(), address) {
                return Err(Error::DuplicateLabel {
                    label: name,
                    line_number: line_index + 1,
                    line: line.to_string(),
                });
            }
            parsed.push(ParsedLine::Label { addr: address, text: line });
            continue;
        }

        let statement = tokenize(line, line_index);
        let here = address;

        match statement.instruction() {
            ".long" => address = address.wrapping_add(4),
            ".pos" => address = directives::pos(&statement)?,
            ".align" => address = directives::align(&statement, address)?,
            mnemonic => {
                let instr = instr_table::lookup(mnemonic).ok_or_else(|| Error::UnknownInstruction {
                    instruction: mnemonic.to_string(),
                    instruction_span: statement.instruction_span(),
                    line_number: statement.line_number(),
                    line: statement.line(),
                })?;
                address = address.wrapping_add(instr.size);
            }
        }

        parsed.push(ParsedLine::Stmt { statement, addr: here });
    }

    Ok((labels, parsed))
}

fn second_pass(labels: &LabelTable, parsed: &[ParsedLine]) -> Result<AssembledProgram, Error> {
    let mut memory = [0u8; MEMORY_SIZE];
    let mut mem_len: u16 = 0;
    let mut source = SourceModel::new();

    for line in parsed {
        match line {
            ParsedLine::Label { addr, text } => {
                source.push(SourceLine::new(text.trim().to_string(), Some(*addr)));
            }
            ParsedLine::Stmt { statement, addr } => {
                match parse_statement(statement, labels, *addr)? {
                    Emit::Bytes(bytes) => {
                        let start = *addr as usize;
                        let end = start + bytes.len();
                        if end > memory.len() {
                            return Err(Error::AddressOutOfRange {
                                address: *addr,
                                line_number: statement.line_number(),
                                line: statement.line(),
                            });
                        }
                        memory[start..end].copy_from_slice(&bytes);
                        mem_len = mem_len.max(end as u16);
                    }
                    Emit::SetAddress(_) => {}
                }
                source.push(SourceLine::new(statement.line(), Some(*addr)));
            }
        }
    }

    Ok(AssembledProgram { memory, mem_len, labels: labels.clone(), source })
}

fn parse_statement(statement: &Statement, labels: &LabelTable, address: u16) -> Result<Emit, Error> {
    use instructions::*;
    let emit = match statement.instruction() {
        "halt" => Emit::Bytes(no_operand(statement, 0x10)?),
        "nop" => Emit::Bytes(no_operand(statement, 0x00)?),
        "ret" => Emit::Bytes(no_operand(statement, 0x90)?),
        "addl" => Emit::Bytes(reg_reg(statement, 0x60)?),
        "subl" => Emit::Bytes(reg_reg(statement, 0x61)?),
        "andl" => Emit::Bytes(reg_reg(statement, 0x62)?),
        "xorl" => Emit::Bytes(reg_reg(statement, 0x63)?),
        "multl" => Emit::Bytes(reg_reg(statement, 0x64)?),
        "divl" => Emit::Bytes(reg_reg(statement, 0x65)?),
        "modl" => Emit::Bytes(reg_reg(statement, 0x66)?),
        "rrmovl" => Emit::Bytes(reg_reg(statement, 0x20)?),
        "rdch" => Emit::Bytes(reg_io(statement, 0xF0)?),
        "wrch" => Emit::Bytes(reg_io(statement, 0xF1)?),
        "rdint" => Emit::Bytes(reg_io(statement, 0xF2)?),
        "wrint" => Emit::Bytes(reg_io(statement, 0xF3)?),
        "pushl" => Emit::Bytes(reg_io(statement, 0xA0)?),
        "popl" => Emit::Bytes(reg_io(statement, 0xB0)?),
        "irmovl" => Emit::Bytes(irmovl(statement, labels)?),
        "rmmovl" => Emit::Bytes(rmmovl(statement, labels)?),
        "mrmovl" => Emit::Bytes(mrmovl(statement, labels)?),
        "jmp" => Emit::Bytes(jump(statement, labels, 0x70)?),
        "jle" => Emit::Bytes(jump(statement, labels, 0x71)?),
        "jl" => Emit::Bytes(jump(statement, labels, 0x72)?),
        "je" => Emit::Bytes(jump(statement, labels, 0x73)?),
        "jne" => Emit::Bytes(jump(statement, labels, 0x74)?),
        "jge" => Emit::Bytes(jump(statement, labels, 0x75)?),
        "jg" => Emit::Bytes(jump(statement, labels, 0x76)?),
        "call" => Emit::Bytes(jump(statement, labels, 0x80)?),
        ".long" => Emit::Bytes(directives::long(statement, labels)?),
        ".pos" => Emit::SetAddress(directives::pos(statement)?),
        ".align" => Emit::SetAddress(directives::align(statement, address)?),
        other => {
            return Err(Error::UnknownInstruction {
                instruction: other.to_string(),
                instruction_span: statement.instruction_span(),
                line_number: statement.line_number(),
                line: statement.line(),
            })
        }
    };
    Ok(emit)
}

/// An error that can occur during the assembly process
#[derive(Debug)]
pub enum Error {
    /// An unknown instruction or directive was encountered
    UnknownInstruction {
        instruction: String,
        instruction_span: TokenSpan,
        line_number: usize,
        line: String
    },
    /// An invalid argument was encountered
    InvalidArgument {
        argument: String,
        argument_span: TokenSpan,
        line_number: usize,
        line: String
    },
    /// An invalid number of arguments was passed
    InvalidArgumentCount {
        instruction: String,
        n_arguments: usize,
        expected: Vec<usize>,
        extra_argument_spans: Vec<TokenSpan>,
        line_number: usize,
        line: String
    },
    /// A file could not be read
    ReadError {
        path: String
    },
    /// An immediate literal doesn't fit in 32 bits
    ArgumentOverflow {
        argument: i64,
        argument_span: TokenSpan,
        line_number: usize,
        line: String
    },
    /// A `.pos`/`.align`/instruction placed bytes past the end of memory
    AddressOutOfRange {
        address: u16,
        line_number: usize,
        line: String
    },
    /// A label name was declared more than once
    DuplicateLabel {
        label: String,
        line_number: usize,
        line: String
    },
    /// An internal error. If you see this, this is probably an internal bug
    /// in the assembler itself. Submit a GitHub issue!
    InvalidArgumentIndex {
        requested_index: usize,
        n_arguments: usize
    }
}

impl std::error::Error for Error {}

fn underline_spans(line: &str, spans: Vec<&TokenSpan>) -> String {
    let mut underline = vec![' '; line.len()];
    for span in spans {
        for i in span.start()..span.end() {
            if i < underline.len() {
                underline[i] = '^';
            }
        }
    }
    underline.into_iter().collect()
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (message, line, line_number, underlined_spans) = match self {
            Error::UnknownInstruction { instruction, instruction_span, line_number, line } => (
                format!("unknown instruction \"{}\" at line {}", instruction, line_number),
                Some(line), Some(line_number), vec![instruction_span]
            ),
            Error::InvalidArgument { argument, argument_span, line_number, line } => (
                format!("invalid argument \"{}\" at line {}", argument, line_number),
                Some(line), Some(line_number), vec![argument_span]
            ),
            Error::InvalidArgumentCount {instruction, line_number, n_arguments, expected, extra_argument_spans, line} => (
                format!(
                    "invalid argument count for instruction \"{}\" at line {}: found {}, expected {:?}",
                    instruction, line_number, n_arguments, expected
                ),
                Some(line), Some(line_number), extra_argument_spans.iter().collect()
            ),
            Error::ReadError { path } => (
                format!("failed to read file {}", path),
                None, None, vec![]
            ),
            Error::ArgumentOverflow { line_number, argument, argument_span, line } => (
                format!(
                    "immediate overflow at line {}: {} does not fit in 32 bits",
                    line_number, argument
                ),
                Some(line), Some(line_number), vec![argument_span]
            ),
            Error::AddressOutOfRange { address, line_number, line } => (
                format!(
                    "line {}: address 0x{:x} is past the end of memory", line_number, address
                ),
                Some(line), Some(line_number), vec![]
            ),
            Error::DuplicateLabel { label, line_number, line } => (
                format!("duplicate label \"{}\" at line {}", label, line_number),
                Some(line), Some(line_number), vec![]
            ),
            Error::InvalidArgumentIndex { requested_index, n_arguments } => (
                format!(
                    "invalid argument index {} requested; number of arguments: {}. If you see this, this \
                    is probably an internal bug in the assembler itself. Please, submit a GitHub issue.",
                    requested_index, n_arguments
                ),
                None, None, vec![]
            )
        };
        writeln!(f, "{}", message)?;
        if let (Some(line), Some(line_number)) = (line, line_number) {
            write!(f, "{}\t{}", line_number, line)?;
            if !underlined_spans.is_empty() {
                writeln!(f)?;
                write!(f, "\t{}", underline_spans(line, underlined_spans).green())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values;

    #[test]
    fn assembles_the_irmovl_addl_halt_scenario() {
        let program = assemble("irmovl $3,%eax\nirmovl $4,%ebx\naddl %eax,%ebx\nhalt\n").unwrap();
        assert_eq!(&program.memory[0..2], &[0x30, 0x80]);
        assert_eq!(&program.memory[2..6], &3u32.to_le_bytes());
        assert_eq!(&program.memory[6..8], &[0x30, 0x83]);
        assert_eq!(&program.memory[8..12], &4u32.to_le_bytes());
        assert_eq!(&program.memory[12..14], &[0x60, (values::EAX << 4) | values::EBX]);
        assert_eq!(program.memory[14], 0x10);
        assert_eq!(program.mem_len, 15);
    }

    #[test]
    fn resolves_forward_labels() {
        let program = assemble("jmp done\nhalt\ndone:\n    halt\n").unwrap();
        assert_eq!(program.labels.get("done"), Some(6));
        assert_eq!(&program.memory[1..5], &6u32.to_le_bytes());
    }

    #[test]
    fn pos_repositions_the_write_cursor_without_emitting_bytes() {
        let program = assemble(".pos 0x10\nhalt\n").unwrap();
        assert_eq!(program.memory[0x10], 0x10);
        assert_eq!(program.memory[0], 0);
    }

    #[test]
    fn align_rounds_the_cursor_up() {
        let program = assemble("halt\n.align 4\nhalt\n").unwrap();
        assert_eq!(program.memory[0], 0x10);
        assert_eq!(program.memory[4], 0x10);
    }

    #[test]
    fn rmmovl_with_a_label_uses_the_sentinel_low_nibble() {
        let program = assemble("rmmovl %eax,result\nhalt\nresult:\n    .long 0\n").unwrap();
        assert_eq!(program.memory[1], (values::EAX << 4) | 0x8);
    }

    #[test]
    fn unknown_instruction_is_reported_with_its_span() {
        let err = assemble("bogus %eax\n").unwrap_err();
        assert!(matches!(err, Error::UnknownInstruction { .. }));
    }

    #[test]
    fn duplicate_label_is_a_hard_error() {
        let err = assemble("loop:\n    halt\nloop:\n    halt\n").unwrap_err();
        assert!(matches!(err, Error::DuplicateLabel { .. }));
    }
}
