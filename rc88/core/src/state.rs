//! Machine context: user configuration, staged command-line entry, and the
//! one explicitly-owned state value the dispatcher snapshots and rolls back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::callstack::CallStack;
use crate::constants::{
    ALT_REG, FLAG_TRAP, LASTX_REG, LOCAL_REG_BASE, NUM_FLAGS, NUM_GLOBAL_REGISTERS,
    RAM_POOL_UNITS, STACK_REG_BASE,
};
use crate::io::{DisplayPort, NullDisplay};
use crate::program::{ProgramAddress, ProgramSpace};
use crate::registers::RegisterFile;
use crate::value::Value;
use crate::{ExecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrigMode {
    Degrees,
    Radians,
    Gradians,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    All,
    Fix(u8),
    Sci(u8),
    Eng(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackDepth {
    Four,
    Eight,
}

impl StackDepth {
    pub fn levels(self) -> usize {
        match self {
            StackDepth::Four => 4,
            StackDepth::Eight => 8,
        }
    }
}

/// Persistent user configuration. Instructions may mutate it before
/// faulting, so it is part of every dispatch snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub display: DisplayMode,
    pub trig: TrigMode,
    pub base: u8,
    pub stack_depth: StackDepth,
    flags: Vec<bool>,
}

impl Default for UserState {
    fn default() -> Self {
        Self::new()
    }
}

impl UserState {
    pub fn new() -> Self {
        Self {
            display: DisplayMode::All,
            trig: TrigMode::Degrees,
            base: 10,
            stack_depth: StackDepth::Four,
            flags: vec![false; NUM_FLAGS],
        }
    }

    pub fn depth(&self) -> usize {
        self.stack_depth.levels()
    }

    pub fn flag(&self, index: u8) -> bool {
        self.flags.get(index as usize).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, index: u8, value: bool) {
        if let Some(slot) = self.flags.get_mut(index as usize) {
            *slot = value;
        }
    }

    pub fn clear_flags(&mut self) {
        for flag in &mut self.flags {
            *flag = false;
        }
    }

    /// Domain faults signal only while the trap flag is set; otherwise the
    /// handler produces a quiet NaN.
    pub fn trap_enabled(&self) -> bool {
        self.flag(FLAG_TRAP)
    }

    /// Render a value for the digit display under the current mode.
    pub fn format(&self, value: Value) -> String {
        let d = match value {
            Value::Num(d) => d,
            other => return other.to_string(),
        };
        if self.base != 10 {
            if let Some(int) = value.to_i64() {
                return format_in_base(int, self.base);
            }
        }
        match self.display {
            DisplayMode::All => d.normalize().to_string(),
            DisplayMode::Fix(digits) => d.round_dp(digits as u32).to_string(),
            DisplayMode::Sci(digits) => {
                format!("{:.*e}", digits as usize, value.to_f64())
            }
            DisplayMode::Eng(digits) => format_eng(value.to_f64(), digits as usize),
        }
    }
}

fn format_in_base(mut value: i64, base: u8) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEF";
    let negative = value < 0;
    let mut out = Vec::new();
    let base = base as i64;
    if value == 0 {
        out.push(b'0');
    }
    while value != 0 {
        let digit = (value % base).unsigned_abs() as usize;
        out.push(DIGITS[digit]);
        value /= base;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn format_eng(value: f64, digits: usize) -> String {
    if !value.is_finite() || value == 0.0 {
        return format!("{:.*e}", digits, value);
    }
    let exponent = value.abs().log10().floor() as i32;
    let eng_exp = exponent.div_euclid(3) * 3;
    let mantissa = value / 10f64.powi(eng_exp);
    format!("{mantissa:.digits$}e{eng_exp}")
}

/// Staged, not-yet-committed numeric entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandLineBuffer {
    text: String,
}

impl CommandLineBuffer {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn push_digit(&mut self, digit: u8) {
        if digit < 10 {
            self.text.push((b'0' + digit) as char);
        }
    }

    pub fn push_dot(&mut self) {
        if !self.text.contains('.') && !self.text.contains('e') {
            if self.text.is_empty() {
                self.text.push('0');
            }
            self.text.push('.');
        }
    }

    pub fn push_exponent(&mut self) {
        if !self.text.contains('e') {
            if self.text.is_empty() {
                self.text.push('1');
            }
            self.text.push('e');
        }
    }

    /// Toggle the sign of the exponent field; a no-op before EEX.
    pub fn toggle_exponent_sign(&mut self) {
        if let Some(pos) = self.text.find('e') {
            if self.text[pos + 1..].starts_with('-') {
                self.text.remove(pos + 1);
            } else {
                self.text.insert(pos + 1, '-');
            }
        }
    }

    pub fn backspace(&mut self) {
        self.text.pop();
    }

    pub fn parse(&self) -> Result<Value> {
        // A dangling exponent field parses as if it were never typed.
        let text = self.text.trim_end_matches('-').trim_end_matches('e');
        if text.is_empty() {
            return Err(ExecError::BadCommandLine);
        }
        let parsed = if text.contains('e') {
            Decimal::from_scientific(text)
        } else {
            text.parse::<Decimal>()
        };
        parsed.map(Value::Num).map_err(|_| ExecError::BadCommandLine)
    }
}

/// Library-region mutations are staged by handlers and applied only on
/// commit, so a rolled-back instruction leaves flash untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    SaveProgram(u8),
    RecallProgram(u8),
}

/// Everything the rollback snapshot covers. Cloning this value *is* the
/// snapshot; restoring is a plain assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    pub regs: RegisterFile,
    pub calls: CallStack,
    pub user: UserState,
    pub pc: ProgramAddress,
    pub cmdline: CommandLineBuffer,
    pub running: bool,
    /// Code captured for the `ERR?` predicate after an intercepted fault.
    pub last_error: Option<u8>,
    /// Call depth at which `CATCH` armed interception, if armed.
    pub trap_depth: Option<usize>,
    /// Set when the previous instruction returned implicitly from ROM; the
    /// next call then records the ROM-return sentinel instead of a PC.
    pub rom_continuation: bool,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            regs: RegisterFile::new(),
            calls: CallStack::new(),
            user: UserState::new(),
            pc: ProgramAddress::RAM_START,
            cmdline: CommandLineBuffer::default(),
            running: false,
            last_error: None,
            trap_depth: None,
            rom_continuation: false,
        }
    }
}

pub struct Machine {
    pub state: MachineState,
    pub program: ProgramSpace,
    pub display: Box<dyn DisplayPort>,
    pub(crate) staged_flash: Option<FlashOp>,
    pub(crate) pc_dirty: bool,
    pub(crate) pause_ticks: u32,
    stop_requested: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_display(Box::new(NullDisplay))
    }

    pub fn with_display(display: Box<dyn DisplayPort>) -> Self {
        Self {
            state: MachineState::default(),
            program: ProgramSpace::new(),
            display,
            staged_flash: None,
            pc_dirty: false,
            pause_ticks: 0,
            stop_requested: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.state.user.depth()
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub(crate) fn take_stop_request(&mut self) -> bool {
        std::mem::take(&mut self.stop_requested)
    }

    /// RAM-pool units available to the call stack.
    pub fn call_unit_budget(&self) -> usize {
        RAM_POOL_UNITS.saturating_sub(self.program.ram_len() as usize)
    }

    /// RAM-pool cells available to the user program.
    pub fn program_cell_budget(&self) -> usize {
        RAM_POOL_UNITS.saturating_sub(self.state.calls.units())
    }

    /// Move the program counter on behalf of a handler; suppresses the
    /// dispatcher's automatic advance for this cycle.
    pub fn set_pc(&mut self, addr: ProgramAddress) {
        self.state.pc = addr;
        self.pc_dirty = true;
    }

    /// Resolve a register-argument index. Local indices with an active,
    /// large-enough frame hit the frame; everything else degrades into the
    /// global bank modulo its size. Resolution never fails.
    pub fn reg_read(&self, index: u8) -> Value {
        let state = &self.state;
        match index {
            i if (i as usize) < NUM_GLOBAL_REGISTERS => state.regs.global(i as usize),
            i if (STACK_REG_BASE..STACK_REG_BASE + 8).contains(&i) => {
                state.regs.level((i - STACK_REG_BASE) as usize)
            }
            LASTX_REG => state.regs.last_x(),
            ALT_REG => state.regs.alt(),
            i if i >= LOCAL_REG_BASE => {
                let slot = (i - LOCAL_REG_BASE) as usize;
                match state.calls.active_frame() {
                    Some(frame) if slot < frame.slots.len() => frame.slots[slot],
                    _ => state.regs.global(i as usize),
                }
            }
            i => state.regs.global(i as usize),
        }
    }

    pub fn reg_write(&mut self, index: u8, value: Value) {
        match index {
            i if (i as usize) < NUM_GLOBAL_REGISTERS => {
                self.state.regs.set_global(i as usize, value)
            }
            i if (STACK_REG_BASE..STACK_REG_BASE + 8).contains(&i) => {
                self.state.regs.set_level((i - STACK_REG_BASE) as usize, value)
            }
            LASTX_REG => self.state.regs.set_last_x(value),
            ALT_REG => self.state.regs.set_alt(value),
            i if i >= LOCAL_REG_BASE => {
                let slot = (i - LOCAL_REG_BASE) as usize;
                match self.state.calls.active_frame_mut() {
                    Some(frame) if slot < frame.slots.len() => frame.slots[slot] = value,
                    _ => self.state.regs.set_global(i as usize, value),
                }
            }
            i => self.state.regs.set_global(i as usize, value),
        }
    }

    /// Parse and push the staged command line, if any. Runs inside the
    /// dispatcher's protected section so a parse fault rolls back cleanly.
    pub(crate) fn commit_command_line(&mut self) -> Result<()> {
        if self.state.cmdline.is_empty() {
            return Ok(());
        }
        let value = self.state.cmdline.parse()?;
        let depth = self.depth();
        if self.state.regs.lift_enabled() {
            self.state.regs.lift(depth, value);
        } else {
            self.state.regs.set_x(value);
        }
        self.state.regs.set_lift_enabled(true);
        self.state.cmdline.clear();
        Ok(())
    }

    /// Full reset: power-on state with an empty program.
    pub fn reset(&mut self) {
        self.state = MachineState::default();
        self.program.clear_ram();
        self.staged_flash = None;
        self.pc_dirty = false;
        self.pause_ticks = 0;
        self.stop_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_builds_and_parses_scientific_entry() {
        let mut buf = CommandLineBuffer::default();
        for d in [1u8, 2] {
            buf.push_digit(d);
        }
        buf.push_dot();
        buf.push_digit(5);
        buf.push_exponent();
        buf.push_digit(2);
        assert_eq!(buf.as_str(), "12.5e2");
        assert_eq!(buf.parse().unwrap(), Value::Num("1250".parse().unwrap()));
    }

    #[test]
    fn command_line_rejects_dangling_entry() {
        let buf = CommandLineBuffer::default();
        assert_eq!(buf.parse(), Err(ExecError::BadCommandLine));
    }

    #[test]
    fn local_indices_fall_back_to_globals_without_a_frame() {
        let mut machine = Machine::new();
        machine.reg_write(112, Value::from_i64(42));
        // 112 % 100 => R12.
        assert_eq!(machine.state.regs.global(12), Value::from_i64(42));
        assert_eq!(machine.reg_read(112), Value::from_i64(42));
    }

    #[test]
    fn local_indices_hit_the_active_frame() {
        let mut machine = Machine::new();
        let budget = machine.call_unit_budget();
        machine.state.calls.push_frame(2, budget).unwrap();
        machine.reg_write(113, Value::from_i64(7));
        assert_eq!(machine.reg_read(113), Value::from_i64(7));
        assert_eq!(machine.state.regs.global(13), Value::ZERO);
        // Slot index past the frame degrades to the globals.
        machine.reg_write(115, Value::from_i64(9));
        assert_eq!(machine.state.regs.global(15), Value::from_i64(9));
    }

    #[test]
    fn committed_entry_lifts_unless_disabled() {
        let mut machine = Machine::new();
        machine.state.regs.set_x(Value::from_i64(3));
        machine.state.cmdline.push_digit(8);
        machine.commit_command_line().unwrap();
        assert_eq!(machine.state.regs.x(), Value::from_i64(8));
        assert_eq!(machine.state.regs.y(), Value::from_i64(3));

        machine.state.regs.set_lift_enabled(false);
        machine.state.cmdline.push_digit(5);
        machine.commit_command_line().unwrap();
        assert_eq!(machine.state.regs.x(), Value::from_i64(5));
        assert_eq!(machine.state.regs.y(), Value::from_i64(3));
    }

    #[test]
    fn base_formatting_applies_to_integers() {
        let mut user = UserState::new();
        user.base = 16;
        assert_eq!(user.format(Value::from_i64(255)), "FF");
        user.base = 2;
        assert_eq!(user.format(Value::from_i64(5)), "101");
    }
}
