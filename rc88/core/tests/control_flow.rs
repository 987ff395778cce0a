//! Whole-program control flow: calls, loops, locals, ROM routines.

use rc88_core::dispatch::{execute_one, Outcome};
use rc88_core::io::{AlwaysReady, NoKeys, NoWait};
use rc88_core::opcode::{ArgCmd, Instruction, MultiCmd};
use rc88_core::program::ProgramAddress;
use rc88_core::runner::{RunReason, Runner};
use rc88_core::state::Machine;
use rc88_core::value::Value;
use rc88_core::{control, ops, ExecError};

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

fn run_to_halt(m: &mut Machine) {
    m.state.running = true;
    let mut runner = Runner::new(NoKeys, AlwaysReady, NoWait);
    runner.step_limit = Some(10_000);
    assert_eq!(runner.run(m), RunReason::Halted);
}

#[test]
fn exhausting_call_capacity_leaves_the_stack_at_its_last_good_state() {
    let mut m = Machine::new();
    load(&mut m, &[arg(ArgCmd::Lbl, 0)]);
    m.state.pc = ProgramAddress::ram(1);
    m.state.running = true;

    let mut pushed = 0usize;
    loop {
        let before = m.state.calls.clone();
        match control::call(&mut m, ProgramAddress::ram(1)) {
            Ok(()) => pushed += 1,
            Err(err) => {
                assert_eq!(err, ExecError::StackFull);
                assert_eq!(m.state.calls, before);
                break;
            }
        }
    }
    assert_eq!(pushed, m.call_unit_budget());
}

#[test]
fn dsz_loop_skips_exactly_once_at_the_zero_transition() {
    // R00 = 2; the loop body decrements until the skip fires and the
    // branch back is jumped over.
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0),                      // 1
            arg(ArgCmd::Dsz, 0),                      // 2
            arg(ArgCmd::Gto, 0),                      // 3
            Instruction::Niladic(ops::NILADIC_STOP),  // 4
        ],
    );
    m.reg_write(0, Value::from_i64(2));
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    assert_eq!(m.reg_read(0), Value::ZERO);

    // Driven past zero by hand, the counter overshoots negative.
    m.state.pc = ProgramAddress::ram(2);
    m.state.running = true;
    assert_eq!(execute_one(&mut m), Outcome::Committed);
    assert_eq!(m.reg_read(0), Value::from_i64(-1));
}

#[test]
fn isz_counts_up_to_zero() {
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0),
            arg(ArgCmd::Isz, 0),
            arg(ArgCmd::Gto, 0),
            Instruction::Niladic(ops::NILADIC_STOP),
        ],
    );
    m.reg_write(0, Value::from_i64(-3));
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    assert_eq!(m.reg_read(0), Value::ZERO);
}

#[test]
fn local_frames_shadow_globals_for_the_call_duration() {
    // Caller seeds R12 (the fallback target of local .00 + 0), calls a
    // subroutine that allocates locals and writes .01; the global bank
    // must be untouched afterwards.
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0),                     // 1
            arg(ArgCmd::Xeq, 1),                     // 2
            Instruction::Niladic(ops::NILADIC_STOP), // 3
            arg(ArgCmd::Lbl, 1),                     // 4
            arg(ArgCmd::LocR, 4),                    // 5
            arg(ArgCmd::Sto, 113),                   // 6: STO .01
            arg(ArgCmd::Rcl, 113),                   // 7: RCL .01
            arg(ArgCmd::Sto, 20),                    // 8: copy out to R20
            Instruction::Niladic(ops::NILADIC_RTN),  // 9
        ],
    );
    m.state.regs.set_x(Value::from_i64(77));
    m.state.regs.set_global(13, Value::from_i64(-5));
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);

    // The local held the value inside the call.
    assert_eq!(m.state.regs.global(20), Value::from_i64(77));
    // The global that index 113 would alias without a frame is untouched.
    assert_eq!(m.state.regs.global(13), Value::from_i64(-5));
    // The frame is gone with the return.
    assert!(m.state.calls.is_empty());
}

#[test]
fn running_off_a_region_end_is_an_implicit_return() {
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0),                     // 1
            arg(ArgCmd::Xeq, 1),                     // 2
            Instruction::Niladic(ops::NILADIC_STOP), // 3
            arg(ArgCmd::Lbl, 1),                     // 4
            Instruction::Niladic(ops::NILADIC_NOP),  // 5: last cell, no RTN
        ],
    );
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    // The NOP at the end wrapped and returned to the XEQ's successor;
    // popping the last return address halts execution right there.
    assert_eq!(m.state.pc, ProgramAddress::ram(3));
    assert!(m.state.calls.is_empty());
    assert!(!m.state.running);
}

#[test]
fn rom_routine_called_by_text_label_computes_and_returns() {
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0), // 1
            Instruction::Multi {
                cmd: MultiCmd::XeqText,
                text: *b"HYP",
            }, // 2-3
            Instruction::Niladic(ops::NILADIC_STOP), // 4
        ],
    );
    m.state.regs.set_x(Value::from_i64(3));
    m.state.regs.set_level(1, Value::from_i64(4));
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    assert_eq!(m.state.regs.x(), Value::from_i64(5));
    assert!(m.state.calls.is_empty());
}

#[test]
fn gto_branches_without_consuming_call_capacity() {
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0),                     // 1
            arg(ArgCmd::Gto, 1),                     // 2
            arg(ArgCmd::Skip, 99),                   // 3: never reached
            arg(ArgCmd::Lbl, 1),                     // 4
            Instruction::Niladic(ops::NILADIC_STOP), // 5
        ],
    );
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    assert!(m.state.calls.is_empty());
    assert_eq!(m.state.pc, ProgramAddress::ram(6));
}

#[test]
fn missing_label_is_a_loud_control_fault() {
    let mut m = Machine::new();
    load(&mut m, &[arg(ArgCmd::Gto, 42)]);
    m.state.pc = ProgramAddress::ram(1);
    assert_eq!(
        execute_one(&mut m),
        Outcome::RolledBack(ExecError::LabelNotFound(
            rc88_core::program::LabelKey::Numeric(42)
        ))
    );
}

#[test]
fn label_predicate_skips_quietly_when_absent() {
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Lbl, 0),                     // 1
            arg(ArgCmd::LblTest, 42),                // 2: absent -> skip 3
            arg(ArgCmd::Skip, 99),                   // 3
            arg(ArgCmd::LblTest, 0),                 // 4: present -> fall through
            Instruction::Niladic(ops::NILADIC_STOP), // 5
        ],
    );
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    assert_eq!(m.state.pc, ProgramAddress::ram(6));
}

#[test]
fn flag_tests_follow_the_do_if_true_discipline() {
    let mut m = Machine::new();
    load(
        &mut m,
        &[
            arg(ArgCmd::Sf, 9),                      // 1
            arg(ArgCmd::FsTest, 9),                  // 2: set -> execute 3
            arg(ArgCmd::Cf, 9),                      // 3
            arg(ArgCmd::FsTest, 9),                  // 4: clear -> skip 5
            arg(ArgCmd::Skip, 99),                   // 5
            Instruction::Niladic(ops::NILADIC_STOP), // 6
        ],
    );
    m.state.pc = ProgramAddress::ram(1);
    run_to_halt(&mut m);
    assert!(!m.state.user.flag(9));
}
