//! Return stack with inline local-variable frames.
//!
//! Entries are either plain return addresses or whole local frames (a
//! marker plus its reserved slots, pushed and popped as one unit). Capacity
//! is accounted in RAM-pool units: one per return address, one for a frame
//! marker plus one per slot. The free pool shrinks as the user program
//! grows; callers pass the current unit budget in.

use serde::{Deserialize, Serialize};

use crate::program::ProgramAddress;
use crate::value::Value;
use crate::{ExecError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalFrame {
    pub slots: Vec<Value>,
    pub flags: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEntry {
    Return(ProgramAddress),
    Frame(LocalFrame),
}

impl CallEntry {
    fn units(&self) -> usize {
        match self {
            CallEntry::Return(_) => 1,
            CallEntry::Frame(frame) => 1 + frame.slots.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallStack {
    entries: Vec<CallEntry>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical call depth: return addresses only, frame storage excluded.
    pub fn depth(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, CallEntry::Return(_)))
            .count()
    }

    /// Physical RAM-pool units consumed.
    pub fn units(&self) -> usize {
        self.entries.iter().map(CallEntry::units).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push_return(&mut self, addr: ProgramAddress, unit_budget: usize) -> Result<()> {
        if self.units() + 1 > unit_budget {
            return Err(ExecError::StackFull);
        }
        self.entries.push(CallEntry::Return(addr));
        Ok(())
    }

    /// Reserve a local frame atop the stack. At most one frame per call
    /// level; a second allocation without an intervening call fails.
    pub fn push_frame(&mut self, slot_count: usize, unit_budget: usize) -> Result<()> {
        if matches!(self.entries.last(), Some(CallEntry::Frame(_))) {
            return Err(ExecError::FrameNested);
        }
        if self.units() + 1 + slot_count > unit_budget {
            return Err(ExecError::RamFull);
        }
        self.entries.push(CallEntry::Frame(LocalFrame {
            slots: vec![Value::ZERO; slot_count],
            flags: 0,
        }));
        Ok(())
    }

    /// Remove the active frame; the slot count comes from the marker itself.
    /// No-op when the current level owns no frame.
    pub fn pop_frame(&mut self) {
        if matches!(self.entries.last(), Some(CallEntry::Frame(_))) {
            self.entries.pop();
        }
    }

    /// The frame owned by the current call level, if any.
    pub fn active_frame(&self) -> Option<&LocalFrame> {
        match self.entries.last() {
            Some(CallEntry::Frame(frame)) => Some(frame),
            _ => None,
        }
    }

    pub fn active_frame_mut(&mut self) -> Option<&mut LocalFrame> {
        match self.entries.last_mut() {
            Some(CallEntry::Frame(frame)) => Some(frame),
            _ => None,
        }
    }

    /// Unwind any frames above the topmost return address, pop it, and
    /// return it. `None` when no return address remains.
    pub fn pop_return(&mut self) -> Option<ProgramAddress> {
        while matches!(self.entries.last(), Some(CallEntry::Frame(_))) {
            self.entries.pop();
        }
        match self.entries.pop() {
            Some(CallEntry::Return(addr)) => Some(addr),
            _ => None,
        }
    }

    /// Peek the topmost return address without popping.
    pub fn top_return(&self) -> Option<ProgramAddress> {
        self.entries.iter().rev().find_map(|e| match e {
            CallEntry::Return(addr) => Some(*addr),
            CallEntry::Frame(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramAddress;

    const BUDGET: usize = 16;

    #[test]
    fn frame_balance_restores_depth_and_contents() {
        let mut calls = CallStack::new();
        calls.push_return(ProgramAddress::ram(3), BUDGET).unwrap();
        let before = calls.clone();
        calls.push_frame(4, BUDGET).unwrap();
        assert_eq!(calls.units(), 1 + 1 + 4);
        assert_eq!(calls.depth(), 1);
        calls.pop_frame();
        assert_eq!(calls, before);
    }

    #[test]
    fn nested_frames_without_a_call_are_rejected() {
        let mut calls = CallStack::new();
        calls.push_frame(2, BUDGET).unwrap();
        assert_eq!(calls.push_frame(1, BUDGET), Err(ExecError::FrameNested));
        // After a call the new level may allocate its own frame.
        calls.push_return(ProgramAddress::ram(1), BUDGET).unwrap();
        calls.push_frame(1, BUDGET).unwrap();
    }

    #[test]
    fn pop_return_unwinds_frames_first() {
        let mut calls = CallStack::new();
        calls.push_return(ProgramAddress::ram(5), BUDGET).unwrap();
        calls.push_frame(3, BUDGET).unwrap();
        calls.push_return(ProgramAddress::ram(9), BUDGET).unwrap();
        calls.push_frame(2, BUDGET).unwrap();

        assert_eq!(calls.pop_return(), Some(ProgramAddress::ram(9)));
        // The outer frame is active again.
        assert_eq!(calls.active_frame().unwrap().slots.len(), 3);
        assert_eq!(calls.pop_return(), Some(ProgramAddress::ram(5)));
        assert!(calls.is_empty());
    }

    #[test]
    fn capacity_is_accounted_in_units() {
        let mut calls = CallStack::new();
        calls.push_frame(BUDGET - 1, BUDGET).unwrap();
        assert_eq!(
            calls.push_return(ProgramAddress::ram(1), BUDGET),
            Err(ExecError::StackFull)
        );
        // The failed push left the stack untouched.
        assert_eq!(calls.units(), BUDGET);
        assert_eq!(calls.depth(), 0);
    }
}
