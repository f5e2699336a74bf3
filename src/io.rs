//! The narrow terminal-UI collaborator contract.
//!
//! The original's full-screen, two-pane curses console is explicitly out
//! of scope for this crate. [DebuggerIo] is the seam a concrete UI plugs
//! into instead, kept narrow enough that the debugger core stays testable
//! headlessly. [StdIo] is a plain stdin/stdout implementation suitable
//! for driving the debugger from an ordinary terminal.

use crate::simulator;
use std::io::{self, Read, Write};

/// Hint for how a prompted value should be parsed back from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFormat {
    String,
    Char,
    Integer,
}

pub trait DebuggerIo {
    /// Write to the simulator's output pane.
    fn write_sim(&mut self, text: &str);
    /// Write to the debugger's output pane.
    fn write_dbg(&mut self, text: &str);
    /// Block for one line of user input, optionally preceded by a prompt.
    fn read_line(&mut self, prompt: Option<&str>, format: PromptFormat) -> io::Result<String>;
    /// The current (width, height) of the debugger's pane, in characters.
    fn pane_dimensions(&self) -> (u16, u16);
    /// Block for a single keypress, then terminate the process.
    fn wait_key_and_exit(&mut self) -> !;
}

pub struct StdIo {
    stdin: io::Stdin,
}

impl StdIo {
    pub fn new() -> StdIo {
        StdIo { stdin: io::stdin() }
    }
}

impl Default for StdIo {
    fn default() -> StdIo {
        StdIo::new()
    }
}

impl DebuggerIo for StdIo {
    fn write_sim(&mut self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    fn write_dbg(&mut self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    fn read_line(&mut self, prompt: Option<&str>, _format: PromptFormat) -> io::Result<String> {
        if let Some(prompt) = prompt {
            print!("{}", prompt);
            io::stdout().flush()?;
        }
        let mut line = String::new();
        self.stdin.read_line(&mut line)?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn pane_dimensions(&self) -> (u16, u16) {
        terminal_size::terminal_size()
            .map(|(w, h)| (w.0, h.0))
            .unwrap_or((80, 24))
    }

    fn wait_key_and_exit(&mut self) -> ! {
        let mut buf = [0u8; 1];
        let _ = self.stdin.read(&mut buf);
        std::process::exit(0);
    }
}

impl simulator::Io for StdIo {
    fn read_char(&mut self) -> Result<u8, simulator::RuntimeError> {
        let mut buf = [0u8; 1];
        self.stdin
            .read_exact(&mut buf)
            .map_err(|e| simulator::RuntimeError::Io(e.to_string()))?;
        Ok(buf[0])
    }

    fn write_char(&mut self, c: u8) -> Result<(), simulator::RuntimeError> {
        print!("{}", c as char);
        io::stdout().flush().map_err(|e| simulator::RuntimeError::Io(e.to_string()))
    }

    fn read_int(&mut self) -> Result<i32, simulator::RuntimeError> {
        let mut line = String::new();
        self.stdin
            .read_line(&mut line)
            .map_err(|e| simulator::RuntimeError::Io(e.to_string()))?;
        line.trim()
            .parse::<i32>()
            .map_err(|_| simulator::RuntimeError::Io(format!("invalid integer input: {:?}", line)))
    }

    fn write_int(&mut self, v: i32) -> Result<(), simulator::RuntimeError> {
        print!("{}", v);
        io::stdout().flush().map_err(|e| simulator::RuntimeError::Io(e.to_string()))
    }
}
