//! The driving loop.
//!
//! Single-threaded and cooperative: one instruction per dispatcher call,
//! repeated while the running flag is set and no key is pending. A pending
//! key observed between instructions stops dispatching; if execution sits
//! inside a built-in ROM routine at that moment, the call stack unwinds to
//! the nearest user-level return address before halting. Timed pauses
//! count down ticks rather than sleeping the loop wholesale.

use tracing::debug;

use crate::control;
use crate::dispatch::execute_one;
use crate::io::{Annunciator, BusyHook, Keypad, TickSource};
use crate::program::Region;
use crate::state::Machine;

/// Why the driving loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReason {
    /// The program halted on its own (STOP, final return, or a fault).
    Halted,
    /// A pending keycode cancelled execution.
    KeyAbort(u8),
    /// The watchdog hook refused further work.
    BusyAbort,
    /// An external stop request arrived.
    StopRequested,
    /// The configured step limit was reached; execution stays resumable.
    StepLimit,
}

pub struct Runner<K, B, T> {
    pub keypad: K,
    pub busy: B,
    pub ticks: T,
    /// Upper bound on dispatched instructions per `run` call; `None` runs
    /// until the machine halts.
    pub step_limit: Option<u64>,
}

impl<K: Keypad, B: BusyHook, T: TickSource> Runner<K, B, T> {
    pub fn new(keypad: K, busy: B, ticks: T) -> Self {
        Self {
            keypad,
            busy,
            ticks,
            step_limit: None,
        }
    }

    pub fn run(&mut self, m: &mut Machine) -> RunReason {
        m.display.set_annunciator(Annunciator::Run, true);
        let reason = self.drive(m);
        m.display.set_annunciator(Annunciator::Run, false);
        debug!(?reason, "driving loop stopped");
        reason
    }

    fn drive(&mut self, m: &mut Machine) -> RunReason {
        let mut steps = 0u64;
        while m.state.running {
            while m.pause_ticks > 0 {
                self.ticks.wait_tick();
                m.pause_ticks -= 1;
                if let Some(key) = self.keypad.pending_key() {
                    m.pause_ticks = 0;
                    return self.cancel(m, key);
                }
            }
            if m.take_stop_request() {
                m.state.running = false;
                return RunReason::StopRequested;
            }
            if let Some(key) = self.keypad.pending_key() {
                return self.cancel(m, key);
            }
            if !self.busy.busy() {
                m.state.running = false;
                return RunReason::BusyAbort;
            }
            execute_one(m);
            steps += 1;
            if let Some(limit) = self.step_limit {
                if steps >= limit && m.state.running {
                    return RunReason::StepLimit;
                }
            }
        }
        RunReason::Halted
    }

    fn cancel(&mut self, m: &mut Machine, key: u8) -> RunReason {
        if m.state.pc.region == Region::Rom {
            control::unwind_to_user(m);
        } else {
            m.state.running = false;
        }
        RunReason::KeyAbort(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{AlwaysReady, KeyQueue, NoKeys, NoWait};
    use crate::opcode::{ArgCmd, Instruction};
    use crate::program::ProgramAddress;
    use crate::state::Machine;

    fn arg(cmd: ArgCmd, arg_value: u8) -> Instruction {
        Instruction::Arg {
            cmd,
            arg: arg_value,
            indirect: false,
        }
    }

    fn load(m: &mut Machine, instrs: &[Instruction]) {
        for instr in instrs {
            let budget = m.program_cell_budget();
            m.program.append(instr, budget).unwrap();
        }
    }

    #[test]
    fn runs_to_a_stop_instruction() {
        let mut m = Machine::new();
        load(
            &mut m,
            &[
                arg(ArgCmd::Lbl, 0),
                Instruction::Special(4), // digit 4
                Instruction::Niladic(crate::ops::NILADIC_STOP),
            ],
        );
        m.state.pc = ProgramAddress::ram(1);
        m.state.running = true;
        let mut runner = Runner::new(NoKeys, AlwaysReady, NoWait);
        assert_eq!(runner.run(&mut m), RunReason::Halted);
        // The digit is still staged entry, committed by the STOP dispatch.
        assert_eq!(m.state.regs.x(), crate::value::Value::from_i64(4));
    }

    #[test]
    fn pending_key_cancels_an_endless_loop() {
        let mut m = Machine::new();
        load(&mut m, &[arg(ArgCmd::Lbl, 0), arg(ArgCmd::Gto, 0)]);
        m.state.pc = ProgramAddress::ram(1);
        m.state.running = true;
        let mut keys = KeyQueue::new();
        keys.press(0x2A);
        let mut runner = Runner::new(keys, AlwaysReady, NoWait);
        assert_eq!(runner.run(&mut m), RunReason::KeyAbort(0x2A));
        assert!(!m.state.running);
    }

    #[test]
    fn key_abort_inside_rom_unwinds_to_user_level() {
        let mut m = Machine::new();
        load(&mut m, &[arg(ArgCmd::Lbl, 0), arg(ArgCmd::Gto, 0)]);
        m.state.running = true;
        let budget = m.call_unit_budget();
        m.state
            .calls
            .push_return(ProgramAddress::ram(1), budget)
            .unwrap();
        m.state.pc = ProgramAddress::rom(2);

        let mut keys = KeyQueue::new();
        keys.press(1);
        let mut runner = Runner::new(keys, AlwaysReady, NoWait);
        assert_eq!(runner.run(&mut m), RunReason::KeyAbort(1));
        assert_eq!(m.state.pc, ProgramAddress::ram(1));
        assert!(m.state.calls.is_empty());
    }

    #[test]
    fn pause_counts_ticks_between_instructions() {
        let mut m = Machine::new();
        load(
            &mut m,
            &[
                arg(ArgCmd::Pause, 3),
                Instruction::Niladic(crate::ops::NILADIC_STOP),
            ],
        );
        m.state.pc = ProgramAddress::ram(1);
        m.state.running = true;

        #[derive(Default)]
        struct CountingTicks(u32);
        impl crate::io::TickSource for CountingTicks {
            fn wait_tick(&mut self) {
                self.0 += 1;
            }
        }

        let mut runner = Runner::new(NoKeys, AlwaysReady, CountingTicks::default());
        assert_eq!(runner.run(&mut m), RunReason::Halted);
        assert_eq!(runner.ticks.0, 3);
    }

    #[test]
    fn step_limit_leaves_the_machine_resumable() {
        let mut m = Machine::new();
        load(&mut m, &[arg(ArgCmd::Lbl, 0), arg(ArgCmd::Gto, 0)]);
        m.state.pc = ProgramAddress::ram(1);
        m.state.running = true;
        let mut runner = Runner::new(NoKeys, AlwaysReady, NoWait);
        runner.step_limit = Some(10);
        assert_eq!(runner.run(&mut m), RunReason::StepLimit);
        assert!(m.state.running);
    }
}
