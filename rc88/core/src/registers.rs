//! Value stack and addressable register bank.
//!
//! The stack physically holds eight levels; the visible window (4 or 8) is
//! selected at runtime through [`crate::state::UserState`] and passed into
//! each operation. Two shadow registers sit beside the stack: `last_x`
//! (previous top of stack, written on every value-consuming commit) and the
//! alternate register used by exchange-style operations.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_STACK_DEPTH, NUM_GLOBAL_REGISTERS};
use crate::value::Value;

/// Stack level indices; X is the top.
pub const LEVEL_X: usize = 0;
pub const LEVEL_Y: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterFile {
    stack: [Value; MAX_STACK_DEPTH],
    last_x: Value,
    alt: Value,
    bank: Vec<Value>,
    /// Cleared by ENTER and CLx so the next committed entry overwrites X
    /// instead of lifting the stack.
    lift_enabled: bool,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            stack: [Value::ZERO; MAX_STACK_DEPTH],
            last_x: Value::ZERO,
            alt: Value::ZERO,
            bank: vec![Value::ZERO; NUM_GLOBAL_REGISTERS],
            lift_enabled: true,
        }
    }

    pub fn x(&self) -> Value {
        self.stack[LEVEL_X]
    }

    pub fn y(&self) -> Value {
        self.stack[LEVEL_Y]
    }

    pub fn level(&self, level: usize) -> Value {
        self.stack.get(level).copied().unwrap_or(Value::ZERO)
    }

    pub fn set_level(&mut self, level: usize, value: Value) {
        if let Some(slot) = self.stack.get_mut(level) {
            *slot = value;
        }
    }

    pub fn set_x(&mut self, value: Value) {
        self.stack[LEVEL_X] = value;
    }

    pub fn last_x(&self) -> Value {
        self.last_x
    }

    pub fn set_last_x(&mut self, value: Value) {
        self.last_x = value;
    }

    pub fn alt(&self) -> Value {
        self.alt
    }

    pub fn set_alt(&mut self, value: Value) {
        self.alt = value;
    }

    pub fn lift_enabled(&self) -> bool {
        self.lift_enabled
    }

    pub fn set_lift_enabled(&mut self, enabled: bool) {
        self.lift_enabled = enabled;
    }

    /// Push a value: levels shift up within the visible window, the top
    /// level falls off.
    pub fn lift(&mut self, depth: usize, value: Value) {
        let depth = depth.min(MAX_STACK_DEPTH);
        for level in (1..depth).rev() {
            self.stack[level] = self.stack[level - 1];
        }
        self.stack[LEVEL_X] = value;
    }

    /// Drop `count` levels after an operation consumed them; the top level
    /// of the visible window replicates downward.
    pub fn drop_levels(&mut self, depth: usize, count: usize) {
        let depth = depth.min(MAX_STACK_DEPTH);
        if depth == 0 {
            return;
        }
        for level in 0..depth {
            let source = (level + count).min(depth - 1);
            self.stack[level] = self.stack[source];
        }
    }

    pub fn roll_down(&mut self, depth: usize) {
        let depth = depth.min(MAX_STACK_DEPTH).max(1);
        self.stack[..depth].rotate_left(1);
    }

    pub fn roll_up(&mut self, depth: usize) {
        let depth = depth.min(MAX_STACK_DEPTH).max(1);
        self.stack[..depth].rotate_right(1);
    }

    pub fn swap_xy(&mut self) {
        self.stack.swap(LEVEL_X, LEVEL_Y);
    }

    /// Copy X into every visible level.
    pub fn fill(&mut self, depth: usize) {
        let x = self.x();
        let depth = depth.min(MAX_STACK_DEPTH);
        for level in 1..depth {
            self.stack[level] = x;
        }
    }

    pub fn clear_stack(&mut self, depth: usize) {
        let depth = depth.min(MAX_STACK_DEPTH);
        for level in 0..depth {
            self.stack[level] = Value::ZERO;
        }
    }

    pub fn global(&self, index: usize) -> Value {
        self.bank[index % NUM_GLOBAL_REGISTERS]
    }

    pub fn set_global(&mut self, index: usize, value: Value) {
        let slot = index % NUM_GLOBAL_REGISTERS;
        self.bank[slot] = value;
    }

    pub fn clear_globals(&mut self) {
        for slot in &mut self.bank {
            *slot = Value::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: i64) -> Value {
        Value::from_i64(v)
    }

    #[test]
    fn lift_shifts_within_the_visible_window() {
        let mut regs = RegisterFile::new();
        regs.set_level(3, n(99)); // T at depth 4
        regs.set_level(4, n(55)); // A, outside the 4-level window
        regs.lift(4, n(1));
        assert_eq!(regs.x(), n(1));
        // T fell off; A was untouched.
        assert_eq!(regs.level(4), n(55));
    }

    #[test]
    fn dyadic_drop_replicates_the_top_level() {
        let mut regs = RegisterFile::new();
        for (level, v) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
            regs.set_level(level, n(v));
        }
        regs.drop_levels(4, 1);
        assert_eq!(regs.x(), n(2));
        assert_eq!(regs.level(1), n(3));
        assert_eq!(regs.level(2), n(4));
        assert_eq!(regs.level(3), n(4));
    }

    #[test]
    fn roll_down_cycles_only_the_window() {
        let mut regs = RegisterFile::new();
        for level in 0..8 {
            regs.set_level(level, n(level as i64));
        }
        regs.roll_down(4);
        assert_eq!(regs.x(), n(1));
        assert_eq!(regs.level(3), n(0));
        assert_eq!(regs.level(4), n(4));
    }

    #[test]
    fn global_indices_wrap_modulo_bank_size() {
        let mut regs = RegisterFile::new();
        regs.set_global(105, n(7));
        assert_eq!(regs.global(5), n(7));
    }
}
