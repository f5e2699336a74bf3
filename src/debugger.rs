//! The suspend policy and REPL command dispatch that couple the
//! simulator to an interactive session.
//!
//! Command dispatch is grounded on the original `switch_to_debugger`'s
//! big command-name match in `debugger.c`; the suspend policy mirrors
//! its pre-fetch check (step counter, unconditional/conditional
//! breakpoints, watch conditions).

use crate::condition::{self, build_condition, Condition};
use crate::io::{DebuggerIo, PromptFormat};
use crate::labels::Address;
use crate::listing;
use crate::machine::Machine;
use crate::simulator::{self, StepOutcome};
use crate::snapshot;
use crate::values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Stay in the REPL and read another command.
    Continue,
    /// Resume the simulator.
    Run,
    /// Terminate the session.
    Exit,
}

pub struct Debugger {
    step_budget: u32,
}

impl Default for Debugger {
    fn default() -> Debugger {
        Debugger::new()
    }
}

impl Debugger {
    pub fn new() -> Debugger {
        Debugger { step_budget: 0 }
    }

    /// Whether the simulator should suspend before fetching at the
    /// current PC. Checked once per instruction, before the fetch.
    fn should_suspend(&mut self, machine: &Machine) -> bool {
        let mut suspend = false;

        if self.step_budget > 0 {
            self.step_budget -= 1;
            if self.step_budget == 0 {
                suspend = true;
            }
        }

        if let Some(line) = machine.source.find_line(machine.pc) {
            if line.has_breakpoint {
                suspend = true;
            }
            if condition::find_true_condition(&line.cond_breakpoints, machine).is_some() {
                suspend = true;
            }
        }

        if condition::find_true_condition(&machine.watch_conditions, machine).is_some() {
            suspend = true;
        }

        suspend
    }

    /// Drive the simulator until it halts or the user exits the session.
    pub fn run_session<IO>(&mut self, machine: &mut Machine, io: &mut IO)
    where
        IO: simulator::Io + DebuggerIo,
    {
        self.print_current_line(machine, io);
        match self.repl(machine, io) {
            DispatchOutcome::Exit => return,
            DispatchOutcome::Run | DispatchOutcome::Continue => {}
        }

        loop {
            if machine.halted {
                return;
            }

            if self.should_suspend(machine) {
                self.print_current_line(machine, io);
                match self.repl(machine, io) {
                    DispatchOutcome::Exit => return,
                    DispatchOutcome::Run | DispatchOutcome::Continue => {}
                }
                if machine.halted {
                    return;
                }
            }

            match simulator::step(machine, io) {
                Ok(StepOutcome::Halted) => return,
                Ok(StepOutcome::Continue) => {}
                Err(e) => {
                    io.write_dbg(&format!("runtime error: {}\n", e));
                    if let DispatchOutcome::Exit = self.repl(machine, io) {
                        return;
                    }
                }
            }
        }
    }

    fn repl<IO>(&mut self, machine: &mut Machine, io: &mut IO) -> DispatchOutcome
    where
        IO: simulator::Io + DebuggerIo,
    {
        loop {
            let line = match io.read_line(Some("(y86db) "), PromptFormat::String) {
                Ok(l) => l,
                Err(_) => return DispatchOutcome::Exit,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            match self.dispatch(&tokens, machine, io) {
                DispatchOutcome::Continue => continue,
                outcome => return outcome,
            }
        }
    }

    fn dispatch<IO>(&mut self, tokens: &[&str], machine: &mut Machine, io: &mut IO) -> DispatchOutcome
    where
        IO: simulator::Io + DebuggerIo,
    {
        match tokens[0] {
            "run" | "r" => DispatchOutcome::Run,
            "step" | "s" => {
                let n: u32 = tokens.get(1).and_then(|s| s.parse().ok()).unwrap_or(1);
                // The suspend check runs before the about-to-execute instruction's
                // fetch, so the budget must be one higher than the requested step
                // count: the first `n` checks let an instruction through, and only
                // the (n+1)th actually suspends.
                self.step_budget = n + 1;
                DispatchOutcome::Run
            }
            "bp" => {
                self.cmd_bp(&tokens[1..], machine, io);
                DispatchOutcome::Continue
            }
            "watch" => {
                self.cmd_watch(&tokens[1..], machine, io);
                DispatchOutcome::Continue
            }
            "view" => {
                self.cmd_view(&tokens[1..], machine, io);
                DispatchOutcome::Continue
            }
            "pause" => {
                self.cmd_pause(&tokens[1..], machine, io);
                DispatchOutcome::Continue
            }
            "restore" => {
                self.cmd_restore(&tokens[1..], machine, io);
                DispatchOutcome::Continue
            }
            "makeyis" => {
                self.cmd_makeyis(&tokens[1..], machine, io);
                DispatchOutcome::Continue
            }
            "help" | "h" => {
                self.cmd_help(&tokens[1..], io);
                DispatchOutcome::Continue
            }
            "exit" => DispatchOutcome::Exit,
            other => {
                io.write_dbg(&format!("unknown command \"{}\"; try \"help\"\n", other));
                DispatchOutcome::Continue
            }
        }
    }

    fn resolve_addr_or_label(token: &str, machine: &Machine) -> Option<Address> {
        let token = token.strip_prefix('@').unwrap_or(token);
        values::parse_integer(token)
            .map(|v| v as Address)
            .or_else(|| machine.labels.get(token))
    }

    fn cmd_bp<IO: DebuggerIo>(&mut self, args: &[&str], machine: &mut Machine, io: &mut IO) {
        let Some(target) = args.first() else {
            io.write_dbg("usage: bp ADDR_OR_LABEL [if EXPR | del]\n");
            return;
        };
        let Some(addr) = Self::resolve_addr_or_label(target, machine) else {
            io.write_dbg(&format!("unknown address or label \"{}\"\n", target));
            return;
        };
        let Some(line) = machine.source.find_line_mut(addr) else {
            io.write_dbg(&format!("0x{:x} is not a valid breakpoint target\n", addr));
            return;
        };

        match args.get(1).copied() {
            None => {
                line.has_breakpoint = true;
                io.write_dbg(&format!("breakpoint set at 0x{:x}\n", addr));
            }
            Some("del") => {
                if line.has_breakpoint {
                    line.has_breakpoint = false;
                    io.write_dbg(&format!("breakpoint at 0x{:x} removed\n", addr));
                } else if line.cond_breakpoints.len() == 1 {
                    let removed = line.cond_breakpoints.remove(0);
                    io.write_dbg(&format!("removed conditional breakpoint: {}\n", removed));
                } else if line.cond_breakpoints.len() > 1 {
                    io.write_dbg("multiple conditional breakpoints here:\n");
                    for (i, c) in line.cond_breakpoints.iter().enumerate() {
                        io.write_dbg(&format!("  [{}] {}\n", i, c));
                    }
                    let choice = io
                        .read_line(Some("which one? "), PromptFormat::Integer)
                        .ok()
                        .and_then(|s| s.trim().parse::<usize>().ok());
                    match choice.filter(|&i| i < line.cond_breakpoints.len()) {
                        Some(i) => {
                            let removed = line.cond_breakpoints.remove(i);
                            io.write_dbg(&format!("removed: {}\n", removed));
                        }
                        None => io.write_dbg("invalid selection\n"),
                    }
                } else {
                    io.write_dbg(&format!("no breakpoint at 0x{:x}\n", addr));
                }
            }
            Some("if") => {
                let expr: String = args[2..].concat();
                match build_condition(&expr) {
                    Ok(cond) => {
                        line.cond_breakpoints.insert(0, cond);
                        io.write_dbg(&format!("conditional breakpoint set at 0x{:x} if {}\n", addr, expr));
                    }
                    Err(_) => io.write_dbg(&format!("invalid condition expression \"{}\"\n", expr)),
                }
            }
            Some(other) => io.write_dbg(&format!("unrecognized bp argument \"{}\"\n", other)),
        }
    }

    fn cmd_watch<IO: DebuggerIo>(&mut self, args: &[&str], machine: &mut Machine, io: &mut IO) {
        if args.is_empty() {
            io.write_dbg("usage: watch EXPR [del]\n");
            return;
        }
        let deleting = args.last() == Some(&"del");
        let expr_tokens = if deleting { &args[..args.len() - 1] } else { args };
        let expr: String = expr_tokens.concat();

        match build_condition(&expr) {
            Ok(cond) => {
                if deleting {
                    let before = machine.watch_conditions.len();
                    machine.watch_conditions.retain(|c| *c != cond);
                    if machine.watch_conditions.len() < before {
                        io.write_dbg(&format!("watch removed: {}\n", cond));
                    } else {
                        io.write_dbg(&format!("no matching watch for {}\n", cond));
                    }
                } else {
                    machine.watch_conditions.insert(0, cond.clone());
                    io.write_dbg(&format!("watching {}\n", cond));
                }
            }
            Err(_) => io.write_dbg(&format!("invalid condition expression \"{}\"\n", expr)),
        }
    }

    fn cmd_view<IO: DebuggerIo>(&mut self, args: &[&str], machine: &Machine, io: &mut IO) {
        match args.first().copied() {
            Some("source") => self.print_source(machine, io),
            Some("labels") => self.print_labels(machine, io),
            Some("registers") => self.print_registers(machine, io),
            Some("bps") => self.print_breakpoints(args.get(1).copied(), machine, io),
            Some("bt") => self.print_backtrace(machine, io),
            Some("mem") => self.print_memory(machine, io),
            Some("watches") => self.print_conditions(&machine.watch_conditions, io),
            _ => io.write_dbg("usage: view source|labels|registers|bps[ ADDR]|bt|mem|watches\n"),
        }
    }

    fn print_current_line<IO: DebuggerIo>(&self, machine: &Machine, io: &mut IO) {
        match machine.source.find_line(machine.pc) {
            Some(line) => io.write_dbg(&format!("0x{:03x}: {}\n", machine.pc, line.text)),
            None => io.write_dbg(&format!("0x{:03x}\n", machine.pc)),
        }
    }

    fn print_source<IO: DebuggerIo>(&self, machine: &Machine, io: &mut IO) {
        for line in &machine.source.lines {
            let marker = if line.has_breakpoint || line.has_cond_breakpoint() { "*" } else { " " };
            match line.addr {
                Some(addr) if line.is_addressable() => {
                    io.write_dbg(&format!("{}0x{:03x}: {}\n", marker, addr, line.text));
                }
                _ => io.write_dbg(&format!("{}         {}\n", marker, line.text)),
            }
        }
    }

    fn print_labels<IO: DebuggerIo>(&self, machine: &Machine, io: &mut IO) {
        let mut labels: Vec<(&str, Address)> = machine.labels.iter().collect();
        labels.sort_by_key(|&(_, addr)| addr);
        for (name, addr) in labels {
            io.write_dbg(&format!("0x{:03x}  {}\n", addr, name));
        }
    }

    fn print_registers<IO: DebuggerIo>(&self, machine: &Machine, io: &mut IO) {
        for (i, name) in values::REGISTER_NAMES.iter().enumerate() {
            io.write_dbg(&format!("%{:<4} = 0x{:08x}\n", name, machine.register(i as u8)));
        }
        io.write_dbg(&format!(
            "OF={} SF={} ZF={}  PC=0x{:03x}\n",
            machine.flags.of as u8, machine.flags.sf as u8, machine.flags.zf as u8, machine.pc
        ));
    }

    fn print_breakpoints<IO: DebuggerIo>(&self, addr_filter: Option<&str>, machine: &Machine, io: &mut IO) {
        let filter = addr_filter.and_then(|s| Self::resolve_addr_or_label(s, machine));
        let mut any = false;
        for line in &machine.source.lines {
            if let Some(addr) = line.addr {
                if let Some(f) = filter {
                    if f != addr {
                        continue;
                    }
                }
                if line.has_breakpoint {
                    any = true;
                    io.write_dbg(&format!("0x{:03x}: {}\n", addr, line.text));
                }
                for cond in &line.cond_breakpoints {
                    any = true;
                    io.write_dbg(&format!("0x{:03x}: {} if {}\n", addr, line.text, cond));
                }
            }
        }
        if !any {
            io.write_dbg("no breakpoints set\n");
        }
    }

    fn print_backtrace<IO: DebuggerIo>(&self, machine: &Machine, io: &mut IO) {
        if machine.frames.is_empty() {
            io.write_dbg("no active calls\n");
            return;
        }
        for frame in machine.frames.iter().rev() {
            io.write_dbg(&format!(
                "{} (called from 0x{:03x}, esp=0x{:x})\n",
                frame.func_name, frame.call_addr, frame.esp_at_call
            ));
        }
    }

    fn print_memory<IO: DebuggerIo>(&self, machine: &Machine, io: &mut IO) {
        let range_input = io.read_line(Some("range (all or [low,high]): "), PromptFormat::String);
        let (low, high) = match range_input.as_deref().map(str::trim) {
            Ok("all") => (0usize, machine.mem_len as usize),
            Ok(spec) => match parse_mem_range(spec) {
                Some(range) => range,
                None => {
                    io.write_dbg("invalid range; expected \"all\" or \"[low,high]\"\n");
                    return;
                }
            },
            Err(_) => return,
        };
        let high = high.min(machine.memory.len());
        for addr in (low..high).step_by(10) {
            let end = (addr + 10).min(high);
            let hex: String = machine.memory[addr..end].iter().map(|b| format!("{:02x} ", b)).collect();
            io.write_dbg(&format!("0x{:03x}: {}\n", addr, hex));
        }
    }

    fn print_conditions<IO: DebuggerIo>(&self, conditions: &[Condition], io: &mut IO) {
        if conditions.is_empty() {
            io.write_dbg("none\n");
            return;
        }
        for cond in conditions {
            io.write_dbg(&format!("{}\n", cond));
        }
    }

    fn cmd_pause<IO: DebuggerIo>(&mut self, args: &[&str], machine: &Machine, io: &mut IO) {
        let Some(path) = args.first() else {
            io.write_dbg("usage: pause FILE\n");
            return;
        };
        match snapshot::save(path, machine, io.pane_dimensions()) {
            Ok(()) => {
                io.write_dbg(&format!("snapshot written to {}\n", path));
                io.wait_key_and_exit();
            }
            Err(e) => io.write_dbg(&format!("failed to write snapshot: {}\n", e)),
        }
    }

    fn cmd_restore<IO: DebuggerIo>(&mut self, args: &[&str], machine: &mut Machine, io: &mut IO) {
        let Some(path) = args.first() else {
            io.write_dbg("usage: restore FILE\n");
            return;
        };
        match snapshot::restore(path, machine, io.pane_dimensions()) {
            Ok(()) => io.write_dbg(&format!("restored from {}\n", path)),
            Err(e) => {
                io.write_dbg(&format!("restore failed: {}\n", e));
                io.wait_key_and_exit();
            }
        }
    }

    fn cmd_makeyis<IO: DebuggerIo>(&mut self, args: &[&str], machine: &Machine, io: &mut IO) {
        let Some(path) = args.first() else {
            io.write_dbg("usage: makeyis FILE\n");
            return;
        };
        match listing::write_listing(path, machine) {
            Ok(()) => io.write_dbg(&format!("listing written to {}\n", path)),
            Err(e) => io.write_dbg(&format!("failed to write listing: {}\n", e)),
        }
    }

    fn cmd_help<IO: DebuggerIo>(&mut self, args: &[&str], io: &mut IO) {
        let general = "\
commands:
  run | r                          resume execution
  step [n] | s [n]                 single-step n instructions (default 1)
  bp ADDR_OR_LABEL [if EXPR|del]    add/delete a breakpoint
  watch EXPR [del]                 add/remove a watch condition
  view source|labels|registers|bps[ ADDR]|bt|mem|watches
  pause FILE                       write a snapshot and exit
  restore FILE                     load a snapshot
  makeyis FILE                     write the assembled listing
  help [CMD]                       show this message
  exit                             terminate the session
";
        match args.first() {
            None => io.write_dbg(general),
            Some(cmd) => io.write_dbg(&format!("{}\nsee above for \"{}\"\n", general, cmd)),
        }
    }
}

fn parse_mem_range(spec: &str) -> Option<(usize, usize)> {
    let inner = spec.strip_prefix('[')?.strip_suffix(']')?;
    let mut parts = inner.splitn(2, ',');
    let low = values::parse_integer(parts.next()?.trim())?;
    let high = values::parse_integer(parts.next()?.trim())?;
    if low < 0 || high < low {
        return None;
    }
    Some((low as usize, high as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelTable;
    use crate::source::{SourceLine, SourceModel};
    use crate::values;
    use std::collections::VecDeque;

    struct ScriptedIo {
        sim_out: String,
        dbg_out: String,
        lines: VecDeque<String>,
    }

    impl ScriptedIo {
        fn new(lines: &[&str]) -> ScriptedIo {
            ScriptedIo {
                sim_out: String::new(),
                dbg_out: String::new(),
                lines: lines.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl DebuggerIo for ScriptedIo {
        fn write_sim(&mut self, text: &str) {
            self.sim_out.push_str(text);
        }
        fn write_dbg(&mut self, text: &str) {
            self.dbg_out.push_str(text);
        }
        fn read_line(&mut self, _prompt: Option<&str>, _format: PromptFormat) -> std::io::Result<String> {
            self.lines.pop_front().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no more scripted input")
            })
        }
        fn pane_dimensions(&self) -> (u16, u16) {
            (80, 24)
        }
        fn wait_key_and_exit(&mut self) -> ! {
            std::process::exit(0);
        }
    }

    impl simulator::Io for ScriptedIo {
        fn read_char(&mut self) -> Result<u8, simulator::RuntimeError> {
            Ok(0)
        }
        fn write_char(&mut self, c: u8) -> Result<(), simulator::RuntimeError> {
            self.sim_out.push(c as char);
            Ok(())
        }
        fn read_int(&mut self) -> Result<i32, simulator::RuntimeError> {
            Ok(0)
        }
        fn write_int(&mut self, v: i32) -> Result<(), simulator::RuntimeError> {
            self.sim_out.push_str(&v.to_string());
            Ok(())
        }
    }

    fn machine_with_program(program: &[u8]) -> Machine {
        let mut memory = [0u8; crate::machine::MEMORY_SIZE];
        memory[..program.len()].copy_from_slice(program);
        let mut source = SourceModel::new();
        source.push(SourceLine::new("halt".to_string(), Some(0)));
        Machine::new(LabelTable::new(), source, memory, program.len() as u16)
    }

    #[test]
    fn step_budget_suspends_for_n_instructions_then_resumes() {
        // irmovl $3,%eax (6 bytes), then halt.
        let mut machine = machine_with_program(&[0x30, 0x80, 3, 0, 0, 0, 0x10]);
        let mut dbg = Debugger::new();
        let mut io = ScriptedIo::new(&["step 1", "view registers", "run"]);
        dbg.run_session(&mut machine, &mut io);
        assert!(machine.halted);
        // The "view registers" snapshot was taken right after the single
        // stepped instruction executed, so it must show its effect.
        assert!(io.dbg_out.contains("PC=0x006"));
        assert!(io.dbg_out.contains("%eax  = 0x00000003"));
    }

    #[test]
    fn unconditional_breakpoint_suspends_at_its_address() {
        let mut machine = machine_with_program(&[0x10]);
        machine.source.lines[0].has_breakpoint = true;
        let mut dbg = Debugger::new();
        let mut io = ScriptedIo::new(&["view registers", "run", "run"]);
        dbg.run_session(&mut machine, &mut io);
        assert!(machine.halted);
        assert!(io.dbg_out.contains("PC=0x000"));
    }

    #[test]
    fn watch_command_adds_a_global_condition() {
        let mut machine = machine_with_program(&[0x10]);
        let mut dbg = Debugger::new();
        let mut io = ScriptedIo::new(&[]);
        dbg.cmd_watch(&["%eax>10"], &mut machine, &mut io);
        assert_eq!(machine.watch_conditions.len(), 1);
        assert_eq!(machine.watch_conditions[0].op, condition::Op::Gt);
    }

    #[test]
    fn bp_with_condition_attaches_to_the_source_line() {
        let mut machine = machine_with_program(&[0x10]);
        let mut dbg = Debugger::new();
        let mut io = ScriptedIo::new(&[]);
        dbg.cmd_bp(&["0", "if", "%eax=3"], &mut machine, &mut io);
        assert_eq!(machine.source.lines[0].cond_breakpoints.len(), 1);
    }

    #[test]
    fn resolve_addr_or_label_accepts_at_prefixed_labels() {
        let mut machine = machine_with_program(&[0x10]);
        machine.labels.insert("loop".to_string(), 0x10);
        assert_eq!(Debugger::resolve_addr_or_label("@loop", &machine), Some(0x10));
        assert_eq!(Debugger::resolve_addr_or_label("0x20", &machine), Some(0x20));
        let _ = values::EAX;
    }
}
