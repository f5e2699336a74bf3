//! [Statement] struct and its utilities

use crate::*;
use crate::assembler;
use crate::labels::LabelTable;
use regex::Regex;

/// A span of text in the source code. Used to neatly underline errors
#[derive(Debug, Clone, Copy)]
pub struct TokenSpan {
    start: usize,
    end: usize,
}

impl TokenSpan {
    /// Create a new token span
    pub fn new(start: usize, end: usize) -> TokenSpan {
        TokenSpan { start, end }
    }

    /// Get the start index of the token span
    pub fn start(&self) -> usize {
        self.start
    }

    /// Get the end index of the token span
    pub fn end(&self) -> usize {
        self.end
    }
}

/// A memory operand: either `disp(%reg)` or a bare label name, resolved
/// to its address. Both `rmmovl` and `mrmovl` share this grammar.
#[derive(Debug, Clone)]
pub enum MemOperand {
    Disp { disp: i32, reg: u8 },
    Label(u16),
}

/// An instruction or directive parsed from the source code,
/// lexed into separate arguments
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    instruction: &'a str,
    instruction_span: TokenSpan,
    arguments: Vec<&'a str>,
    argument_spans: Vec<TokenSpan>,
    line_number: usize,
    line: &'a str
}

impl<'a> Statement<'a> {
    /// Create a new statement from parsed data
    pub fn new(
        instruction: &'a str,
        instruction_span: TokenSpan,
        arguments: Vec<&'a str>,
        argument_spans: Vec<TokenSpan>,
        line_number: usize,
        line: &'a str
    ) -> Statement<'a> {
        Statement {
            instruction,
            instruction_span,
            arguments,
            argument_spans,
            line_number,
            line
        }
    }

    /// Get the instruction of the statement
    pub fn instruction(&self) -> &str {
        self.instruction
    }

    /// Get the span of the instruction
    pub fn instruction_span(&self) -> TokenSpan {
        self.instruction_span
    }

    /// Get the span of the argument at the given index
    pub fn argument_span(&self, argument_index: usize) -> TokenSpan {
        self.argument_spans[argument_index]
    }

    /// Get the number of arguments of the statement
    pub fn n_arguments(&self) -> usize {
        self.arguments.len()
    }

    /// Get the line number of the statement
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Get this statement's source code line
    pub fn line(&self) -> String {
        self.line.to_string()
    }

    /// Get the argument at the given index
    pub fn argument(&self, argument_index: usize) -> Result<&str, assembler::Error> {
        self.arguments.get(argument_index)
            .ok_or(assembler::Error::InvalidArgumentIndex {
                requested_index: argument_index,
                n_arguments: self.arguments.len()
            })
            .copied()
    }

    /// Assert that the statement has the given number of arguments
    pub fn assert_n_arguments(&self, n: usize) -> Result<(), assembler::Error> {
        let n_arguments = self.arguments.len();
        if n_arguments != n {
            return Err(self.invalid_argument_count(n_arguments, &[n]));
        }
        Ok(())
    }

    /// Parse `%reg` from the argument at the given index
    pub fn parse_register(&self, argument_index: usize) -> Result<u8, assembler::Error> {
        let lexeme = self.argument(argument_index)?;
        values::register_index(lexeme).ok_or_else(|| self.invalid_argument(argument_index))
    }

    /// Parse a `$`-prefixed (or bare) signed immediate from the argument
    /// at the given index.
    pub fn parse_immediate(&self, argument_index: usize) -> Result<i64, assembler::Error> {
        let lexeme = self.argument(argument_index)?;
        let literal = lexeme.strip_prefix('$').unwrap_or(lexeme);
        values::parse_integer(literal).ok_or_else(|| self.invalid_argument(argument_index))
    }

    /// Parse a plain decimal or `0x`-hex number, with no `$` prefix
    /// expected, for directive arguments (`.long`, `.pos`, `.align`).
    pub fn parse_plain_number(&self, argument_index: usize) -> Result<i64, assembler::Error> {
        let lexeme = self.argument(argument_index)?;
        values::parse_integer(lexeme).ok_or_else(|| self.invalid_argument(argument_index))
    }

    /// Parse a bare label name from the argument at the given index,
    /// returning its resolved address.
    pub fn parse_label(&self, argument_index: usize, labels: &LabelTable) -> Result<u16, assembler::Error> {
        let lexeme = self.argument(argument_index)?;
        labels.get(lexeme).ok_or_else(|| self.invalid_argument(argument_index))
    }

    /// Parse an immediate or a label address from the argument at the
    /// given index, as `irmovl`'s second operand allows either.
    pub fn parse_immediate_or_label(
        &self,
        argument_index: usize,
        labels: &LabelTable,
    ) -> Result<u32, assembler::Error> {
        if let Ok(value) = self.parse_immediate(argument_index) {
            Ok(value as u32)
        } else {
            self.parse_label(argument_index, labels).map(|addr| addr as u32)
        }
    }

    /// Parse a number or a label from the argument at the given index,
    /// for `.pos`/`.align`/`jmp`/`call` targets.
    pub fn parse_number_or_label(
        &self,
        argument_index: usize,
        labels: &LabelTable,
    ) -> Result<u16, assembler::Error> {
        if let Ok(value) = self.parse_plain_number(argument_index) {
            Ok(value as u16)
        } else {
            self.parse_label(argument_index, labels)
        }
    }

    /// Parse `disp(%reg)` or a bare label name from the argument at the
    /// given index, as used by `rmmovl`/`mrmovl`.
    pub fn parse_mem_operand(
        &self,
        argument_index: usize,
        labels: &LabelTable,
    ) -> Result<MemOperand, assembler::Error> {
        let lexeme = self.argument(argument_index)?;
        let re = Regex::new(r"^(-?(?:0[xX][0-9A-Fa-f]+|[0-9]+))?\(%([A-Za-z0-9]+)\)$").unwrap();
        if let Some(caps) = re.captures(lexeme) {
            let disp = match caps.get(1) {
                Some(m) => values::parse_integer(m.as_str())
                    .ok_or_else(|| self.invalid_argument(argument_index))?,
                None => 0,
            };
            let reg = values::register_index(caps.get(2).unwrap().as_str())
                .ok_or_else(|| self.invalid_argument(argument_index))?;
            Ok(MemOperand::Disp { disp: disp as i32, reg })
        } else {
            let addr = labels.get(lexeme).ok_or_else(|| self.invalid_argument(argument_index))?;
            Ok(MemOperand::Label(addr))
        }
    }

    /// Generate an error for an invalid argument, given an argument index
    pub fn invalid_argument(&self, argument_index: usize) -> assembler::Error {
        assembler::Error::InvalidArgument {
            argument: self.arguments[argument_index].to_string(),
            argument_span: self.argument_spans[argument_index],
            line_number: self.line_number,
            line: self.line()
        }
    }

    /// Generate an error for an invalid number of arguments, given the number
    /// of arguments and the expected number of arguments
    pub fn invalid_argument_count(
        &self,
        n_arguments: usize,
        expected: &[usize]
    ) -> assembler::Error {
        let max_expected = *expected.iter().max().unwrap_or(&0);
        let extra_argument_spans = self.argument_spans
            .get(max_expected..)
            .unwrap_or(&[])
            .to_vec();

        assembler::Error::InvalidArgumentCount {
            instruction: self.instruction.to_string(),
            n_arguments,
            expected: expected.to_vec(),
            extra_argument_spans,
            line_number: self.line_number,
            line: self.line(),
        }
    }
}
