//! Control-flow primitives: call, branch, return, relative skips, label
//! resolution, and the four counted-loop primitives.
//!
//! Handlers that transfer control go through [`Machine::set_pc`], which
//! suppresses the dispatcher's automatic program-counter advance for the
//! cycle. Faults propagate out and the dispatcher rolls back, so these
//! primitives never undo their own partial work.

use std::cmp::Ordering;

use crate::program::{LabelKey, ProgramAddress, Region};
use crate::state::Machine;
use crate::value::Value;
use crate::{ExecError, Result};

/// Transfer control to `target`, recording the current PC as the return
/// point. A call from idle clears the stack and starts execution.
pub fn call(m: &mut Machine, target: ProgramAddress) -> Result<()> {
    let return_addr = if m.state.rom_continuation {
        ProgramAddress::ROM_RETURN
    } else {
        m.state.pc
    };
    if !m.state.running {
        m.state.calls.clear();
        m.state.running = true;
    }
    let budget = m.call_unit_budget();
    m.state.calls.push_return(return_addr, budget)?;
    m.state.rom_continuation = false;
    m.set_pc(target);
    Ok(())
}

/// Tail branch: move the PC without touching the call stack.
pub fn branch(m: &mut Machine, target: ProgramAddress) {
    m.set_pc(target);
}

/// Return to the most recent return address, unwinding any local frames
/// above it. With `advance`, resume at the return point's successor (the
/// normal RTN mapping, since calls record the caller's own PC).
pub fn ret(m: &mut Machine, advance: bool) {
    if !m.state.running {
        // Manual return: reset to the top of the user program.
        m.state.calls.clear();
        m.set_pc(ProgramAddress::RAM_START);
        return;
    }
    match m.state.calls.pop_return() {
        Some(addr) => {
            let resume = if advance {
                m.program.step_forward(addr).0
            } else {
                addr
            };
            m.set_pc(resume);
            if m.state.calls.is_empty() {
                m.state.running = false;
            }
        }
        None => {
            m.state.running = false;
        }
    }
}

/// Move forward over `count` instructions (0 = fall through to the next).
/// Overrunning the region is a range fault, not an implicit wrap.
pub fn skip(m: &mut Machine, count: u16) -> Result<()> {
    let mut addr = m.state.pc;
    for _ in 0..=count {
        let (next, wrapped) = m.program.step_forward(addr);
        if wrapped {
            return Err(ExecError::Range);
        }
        addr = next;
    }
    m.set_pc(addr);
    Ok(())
}

/// Move backward `count` instructions; `back(0)` re-executes the current
/// instruction.
pub fn back(m: &mut Machine, count: u16) -> Result<()> {
    let mut addr = m.state.pc;
    for _ in 0..count {
        let (prev, wrapped) = m.program.step_back(addr);
        if wrapped {
            return Err(ExecError::Range);
        }
        addr = prev;
    }
    m.set_pc(addr);
    Ok(())
}

/// Predicate discipline: do-if-true, i.e. skip the next instruction when
/// the condition is false.
pub fn skip_if(m: &mut Machine, condition: bool) -> Result<()> {
    if condition {
        Ok(())
    } else {
        skip(m, 1)
    }
}

/// Resolve a label key to its address: numeric keys scan the current
/// region from the PC (forward, then wrapped); text keys search the whole
/// catalog (RAM, libraries, ROM).
pub fn locate(m: &Machine, key: LabelKey) -> Option<ProgramAddress> {
    match key {
        LabelKey::Numeric(_) => m.program.find_label(m.state.pc, key),
        LabelKey::Text(_) => m.program.find_label_global(key),
    }
}

/// Loud form of [`locate`]: a missing label is a user-visible fault.
pub fn locate_or_fault(m: &Machine, key: LabelKey) -> Result<ProgramAddress> {
    locate(m, key).ok_or(ExecError::LabelNotFound(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// Subtract 1, skip when the result is <= 0.
    Dsz,
    /// Add 1, skip when the result is >= 0.
    Isz,
    /// Packed `iiiii.fffcc` counter, subtract step, skip when <= limit.
    Dse,
    /// Packed counter, add step, skip when > limit.
    Isg,
}

/// Decrement/increment a loop register and conditionally skip the next
/// instruction. The comparison is against the *new* value.
pub fn loop_step(m: &mut Machine, index: u8, kind: LoopKind) -> Result<()> {
    let value = m.reg_read(index);
    let (new_value, skip_next) = match kind {
        LoopKind::Dsz => {
            let v = value.sub(Value::ONE);
            let skip = matches!(
                v.compare(Value::ZERO),
                Some(Ordering::Less | Ordering::Equal)
            );
            (v, skip)
        }
        LoopKind::Isz => {
            let v = value.add(Value::ONE);
            let skip = matches!(
                v.compare(Value::ZERO),
                Some(Ordering::Greater | Ordering::Equal)
            );
            (v, skip)
        }
        LoopKind::Dse | LoopKind::Isg => {
            let Some((counter, limit, step)) = value.counter_parts() else {
                if m.state.user.trap_enabled() {
                    return Err(ExecError::Domain);
                }
                return Ok(());
            };
            if kind == LoopKind::Dse {
                let counter = counter - step;
                (value.with_counter(counter), counter <= limit)
            } else {
                let counter = counter + step;
                (value.with_counter(counter), counter > limit)
            }
        }
    };
    m.reg_write(index, new_value);
    if skip_next {
        skip(m, 1)?;
    }
    Ok(())
}

/// Cooperative cancellation while inside a built-in routine: unwind the
/// call stack back to the nearest user-level return address, then halt.
pub fn unwind_to_user(m: &mut Machine) {
    while let Some(addr) = m.state.calls.pop_return() {
        if addr.region != Region::Rom {
            m.state.pc = addr;
            break;
        }
    }
    m.state.running = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Instruction;
    use crate::state::Machine;

    fn machine_with_nops(count: usize) -> Machine {
        let mut m = Machine::new();
        for _ in 0..count {
            let budget = m.program_cell_budget();
            m.program
                .append(&Instruction::Niladic(0), budget)
                .unwrap();
        }
        m
    }

    #[test]
    fn call_then_return_restores_the_caller_pc() {
        let mut m = machine_with_nops(5);
        m.state.pc = ProgramAddress::ram(2);
        call(&mut m, ProgramAddress::ram(4)).unwrap();
        assert_eq!(m.state.pc, ProgramAddress::ram(4));
        assert!(m.state.running);

        ret(&mut m, false);
        assert_eq!(m.state.pc, ProgramAddress::ram(2));
        // Advancing form resumes at the logical successor.
        m.state.running = true;
        call(&mut m, ProgramAddress::ram(4)).unwrap();
        ret(&mut m, true);
        assert_eq!(m.state.pc, ProgramAddress::ram(3));
    }

    #[test]
    fn returning_past_the_last_level_halts() {
        let mut m = machine_with_nops(3);
        m.state.pc = ProgramAddress::ram(1);
        call(&mut m, ProgramAddress::ram(2)).unwrap();
        ret(&mut m, true);
        assert!(!m.state.running);
    }

    #[test]
    fn manual_return_resets_to_ram_start() {
        let mut m = machine_with_nops(3);
        m.state.pc = ProgramAddress::ram(3);
        ret(&mut m, false);
        assert_eq!(m.state.pc, ProgramAddress::RAM_START);
        assert!(m.state.calls.is_empty());
    }

    #[test]
    fn skip_overrunning_the_region_is_a_range_fault() {
        let mut m = machine_with_nops(2);
        m.state.pc = ProgramAddress::ram(1);
        skip(&mut m, 0).unwrap();
        assert_eq!(m.state.pc, ProgramAddress::ram(2));
        assert_eq!(skip(&mut m, 5), Err(ExecError::Range));
    }

    #[test]
    fn dsz_skips_at_the_one_to_zero_transition_and_overshoots() {
        let mut m = machine_with_nops(8);
        m.reg_write(5, Value::from_i64(2));

        let mut skips = Vec::new();
        for _ in 0..3 {
            m.state.pc = ProgramAddress::ram(1);
            loop_step(&mut m, 5, LoopKind::Dsz).unwrap();
            skips.push(m.state.pc != ProgramAddress::ram(1));
        }
        assert_eq!(skips, vec![false, true, true]);
        assert_eq!(m.reg_read(5), Value::from_i64(-1));
    }

    #[test]
    fn isg_honors_packed_limit_and_step() {
        let mut m = machine_with_nops(8);
        // Count 0 -> 10 by 2: skips once the counter exceeds 10.
        m.reg_write(0, Value::Num("0.01002".parse().unwrap()));
        let mut fired = 0;
        for _ in 0..6 {
            m.state.pc = ProgramAddress::ram(1);
            loop_step(&mut m, 0, LoopKind::Isg).unwrap();
            if m.state.pc != ProgramAddress::ram(1) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(m.reg_read(0), Value::Num("12.01002".parse().unwrap()));
    }

    #[test]
    fn unwind_stops_at_the_first_user_level_return() {
        let mut m = machine_with_nops(4);
        m.state.running = true;
        let budget = m.call_unit_budget();
        m.state
            .calls
            .push_return(ProgramAddress::ram(2), budget)
            .unwrap();
        m.state
            .calls
            .push_return(ProgramAddress::rom(3), budget)
            .unwrap();
        m.state.pc = ProgramAddress::rom(7);

        unwind_to_user(&mut m);
        assert!(!m.state.running);
        assert_eq!(m.state.pc, ProgramAddress::ram(2));
        assert!(m.state.calls.is_empty());
    }
}
