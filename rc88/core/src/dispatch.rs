//! The instruction dispatcher.
//!
//! One call to [`execute_one`] runs exactly one instruction atomically:
//! fetch and decode, snapshot the visible machine state, invoke the handler
//! for the decoded kind, then either commit (apply stack discipline, staged
//! flash writes, and the program-counter advance) or roll the snapshot back
//! verbatim. Handlers signal faults and never recover; this module is the
//! only recovery point.

use tracing::{debug, trace};

use crate::control;
use crate::io::Annunciator;
use crate::opcode::Instruction;
use crate::ops;
use crate::program::Region;
use crate::state::{FlashOp, Machine, MachineState, UserState};
use crate::value::Value;
use crate::{ExecError, Result};

/// What one dispatch cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    /// Fault with no interception: state restored; a running program has
    /// halted with a cleared call stack and the PC on the failing step.
    RolledBack(ExecError),
    /// Fault intercepted by an armed `CATCH`: state restored, the error
    /// recorded for `ERR?`, and control returned to the arming call level.
    Intercepted(ExecError),
}

/// Execute the instruction at the current program counter.
pub fn execute_one(m: &mut Machine) -> Outcome {
    let instr = m.program.resolve(m.state.pc);
    trace!(pc = %m.state.pc, instr = %instr, "dispatch");

    let snapshot = m.state.clone();
    m.pc_dirty = false;
    m.staged_flash = None;
    m.display.set_annunciator(Annunciator::Error, false);

    match run_instruction(m, &instr) {
        Ok(()) => {
            commit(m);
            Outcome::Committed
        }
        Err(err) => recover(m, snapshot, err),
    }
}

/// A result that is not a finite number is a domain fault while the trap
/// flag is set; otherwise it lands on the stack as-is.
fn guard(user: &UserState, value: Value) -> Result<Value> {
    if !value.is_finite() && user.trap_enabled() {
        Err(ExecError::Domain)
    } else {
        Ok(value)
    }
}

fn run_instruction(m: &mut Machine, instr: &Instruction) -> Result<()> {
    // Staged digit entry commits before anything that is not an entry key,
    // inside the protected section so a parse fault rolls back cleanly.
    if !instr.is_entry_key() {
        m.commit_command_line()?;
    }

    // An index past its table means no handler is registered: an illegal
    // instruction, reported with the offending cell.
    let illegal = || ExecError::IllegalInstruction(crate::opcode::encode(instr).first());

    match *instr {
        Instruction::Niladic(i) => {
            let entry = ops::NILADIC.get(i as usize).ok_or_else(illegal)?;
            (entry.run)(m)
        }
        Instruction::Monadic(i) => {
            let entry = ops::MONADIC.get(i as usize).ok_or_else(illegal)?;
            let x = m.state.regs.x();
            let result = (entry.run)(&m.state.user, x)?;
            let result = guard(&m.state.user, result)?;
            m.state.regs.set_last_x(x);
            m.state.regs.set_x(result);
            m.state.regs.set_lift_enabled(true);
            Ok(())
        }
        Instruction::Dyadic(i) => {
            let entry = ops::DYADIC.get(i as usize).ok_or_else(illegal)?;
            let x = m.state.regs.x();
            let y = m.state.regs.y();
            let result = (entry.run)(&m.state.user, y, x)?;
            let result = guard(&m.state.user, result)?;
            let depth = m.depth();
            m.state.regs.set_last_x(x);
            m.state.regs.drop_levels(depth, 1);
            m.state.regs.set_x(result);
            m.state.regs.set_lift_enabled(true);
            Ok(())
        }
        Instruction::Triadic(i) => {
            let entry = ops::TRIADIC.get(i as usize).ok_or_else(illegal)?;
            let x = m.state.regs.x();
            let y = m.state.regs.y();
            let z = m.state.regs.level(2);
            let result = (entry.run)(&m.state.user, z, y, x)?;
            let result = guard(&m.state.user, result)?;
            let depth = m.depth();
            m.state.regs.set_last_x(x);
            m.state.regs.drop_levels(depth, 2);
            m.state.regs.set_x(result);
            m.state.regs.set_lift_enabled(true);
            Ok(())
        }
        Instruction::ComplexMonadic(i) => {
            let entry = ops::COMPLEX_MONADIC.get(i as usize).ok_or_else(illegal)?;
            let x = m.state.regs.x();
            let y = m.state.regs.y();
            let (re, im) = (entry.run)(&m.state.user, x, y)?;
            let re = guard(&m.state.user, re)?;
            let im = guard(&m.state.user, im)?;
            m.state.regs.set_last_x(x);
            m.state.regs.set_x(re);
            m.state.regs.set_level(1, im);
            m.state.regs.set_lift_enabled(true);
            Ok(())
        }
        Instruction::ComplexDyadic(i) => {
            let entry = ops::COMPLEX_DYADIC.get(i as usize).ok_or_else(illegal)?;
            let x = m.state.regs.x();
            let y = m.state.regs.y();
            let z = m.state.regs.level(2);
            let t = m.state.regs.level(3);
            let (re, im) = (entry.run)(&m.state.user, (z, t), (x, y))?;
            let re = guard(&m.state.user, re)?;
            let im = guard(&m.state.user, im)?;
            let depth = m.depth();
            m.state.regs.set_last_x(x);
            m.state.regs.drop_levels(depth, 2);
            m.state.regs.set_x(re);
            m.state.regs.set_level(1, im);
            m.state.regs.set_lift_enabled(true);
            Ok(())
        }
        Instruction::Special(i) => {
            let entry = ops::SPECIAL.get(i as usize).ok_or_else(illegal)?;
            (entry.run)(m, i)
        }
        Instruction::Arg { cmd, arg, indirect } => {
            let entry = ops::arg_entry(cmd);
            let effective = if indirect {
                resolve_indirect(m, arg)?
            } else {
                arg
            };
            if effective > entry.max {
                return Err(ExecError::ArgRange {
                    arg: effective,
                    max: entry.max,
                });
            }
            (entry.run)(m, effective)
        }
        Instruction::Multi { cmd, text } => {
            let entry = ops::multi_entry(cmd);
            (entry.run)(m, text)
        }
        Instruction::Illegal(word) => Err(ExecError::IllegalInstruction(word)),
    }
}

/// Indirect addressing: the named register holds the effective argument.
fn resolve_indirect(m: &Machine, arg: u8) -> Result<u8> {
    let value = m.reg_read(arg);
    let int = value.to_i64().ok_or(ExecError::BadIndirect)?;
    u8::try_from(int).map_err(|_| ExecError::BadIndirect)
}

fn commit(m: &mut Machine) {
    if let Some(op) = m.staged_flash.take() {
        match op {
            FlashOp::SaveProgram(slot) => m.program.flash_save(slot),
            FlashOp::RecallProgram(slot) => {
                // Validated when staged; an empty slot cannot reach here.
                if let Err(err) = m.program.flash_recall(slot) {
                    debug!(error = %err, "staged flash recall skipped");
                }
            }
        }
    }

    let mut continuation_fired = false;
    if !m.pc_dirty {
        let (next, wrapped) = m.program.step_forward(m.state.pc);
        if wrapped {
            // Running off the end of a region is an implicit return.
            if m.state.running && !m.state.calls.is_empty() {
                let from_rom = m.state.pc.region == Region::Rom;
                control::ret(m, true);
                m.state.rom_continuation = from_rom;
                continuation_fired = from_rom;
            } else {
                m.state.running = false;
                m.state.pc = next;
            }
        } else {
            m.state.pc = next;
        }
    }
    if !continuation_fired && !m.pc_dirty {
        // pc_dirty is only still clear on the plain-advance path; any
        // handler-driven transfer already consumed or set the latch.
        m.state.rom_continuation = false;
    }
    m.pc_dirty = false;
}

fn recover(m: &mut Machine, snapshot: MachineState, err: ExecError) -> Outcome {
    debug!(error = %err, pc = %snapshot.pc, "rollback");
    m.state = snapshot;
    m.staged_flash = None;
    m.pc_dirty = false;

    if !m.state.running {
        report_error(m, &err);
        return Outcome::RolledBack(err);
    }

    if let Some(armed) = m.state.trap_depth {
        if m.state.calls.depth() >= armed {
            // Intercepted: hand control back to the arming call level with
            // the error latched for ERR?.
            let mut resume = m.program.step_forward(m.state.pc).0;
            while m.state.calls.depth() > armed {
                if let Some(addr) = m.state.calls.pop_return() {
                    resume = m.program.step_forward(addr).0;
                } else {
                    break;
                }
            }
            m.state.pc = resume;
            m.state.last_error = Some(err.code());
            m.state.trap_depth = None;
            return Outcome::Intercepted(err);
        }
        m.state.trap_depth = None;
    }

    // Uncaught while running: halt with the PC left on the failing
    // instruction for single-step inspection.
    m.state.calls.clear();
    m.state.running = false;
    report_error(m, &err);
    Outcome::RolledBack(err)
}

fn report_error(m: &mut Machine, err: &ExecError) {
    let message = err.to_string();
    m.display.set_status(&message);
    m.display.set_annunciator(Annunciator::Error, true);
}
