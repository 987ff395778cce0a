//! Operation handler tables.
//!
//! One table per instruction kind; the dispatcher owns the lookup, the
//! stack discipline, and fault recovery. Handlers compute and signal —
//! they never try to undo partial work.
//!
//! Value-producing handlers (monadic through complex dyadic) get read
//! access to the user configuration and return the raw result; the
//! dispatcher turns a non-finite result into a domain fault when the trap
//! flag is set. Niladic, entry-key, argument, and text commands get the
//! whole machine.

use std::cmp::Ordering;

use crate::constants::{MAX_LOCAL_SLOTS, MAX_NUMERIC_LABEL, NUM_FLAGS, NUM_LIB_SLOTS, REG_ARG_MAX};
use crate::control::{self, LoopKind};
use crate::opcode::{ArgCmd, Instruction, MultiCmd};
use crate::program::LabelKey;
use crate::state::{DisplayMode, FlashOp, Machine, StackDepth, TrigMode, UserState};
use crate::value::Value;
use crate::{ExecError, Result};

pub struct NiladicEntry {
    pub name: &'static str,
    pub run: fn(&mut Machine) -> Result<()>,
}

pub struct MonadicEntry {
    pub name: &'static str,
    pub run: fn(&UserState, Value) -> Result<Value>,
}

pub struct DyadicEntry {
    pub name: &'static str,
    /// Arguments are (y, x).
    pub run: fn(&UserState, Value, Value) -> Result<Value>,
}

pub struct TriadicEntry {
    pub name: &'static str,
    /// Arguments are (z, y, x).
    pub run: fn(&UserState, Value, Value, Value) -> Result<Value>,
}

pub struct ComplexMonadicEntry {
    pub name: &'static str,
    /// Argument and result are (re, im) pairs held in X and Y.
    pub run: fn(&UserState, Value, Value) -> Result<(Value, Value)>,
}

pub struct ComplexDyadicEntry {
    pub name: &'static str,
    /// Arguments are ((re2, im2), (re1, im1)) from (Z,T) and (X,Y).
    pub run: fn(&UserState, (Value, Value), (Value, Value)) -> Result<(Value, Value)>,
}

pub struct SpecialEntry {
    pub name: &'static str,
    pub run: fn(&mut Machine, u16) -> Result<()>,
}

pub struct ArgEntry {
    pub cmd: ArgCmd,
    pub name: &'static str,
    /// Table-declared argument limit; exceeding it is a range fault.
    pub max: u8,
    pub run: fn(&mut Machine, u8) -> Result<()>,
}

pub struct MultiEntry {
    pub cmd: MultiCmd,
    pub name: &'static str,
    pub run: fn(&mut Machine, [u8; 3]) -> Result<()>,
}

// Indices referenced outside the tables.
pub const NILADIC_NOP: u16 = 0;
pub const NILADIC_ENTER: u16 = 1;
pub const NILADIC_SWAP: u16 = 5;
pub const NILADIC_LASTX: u16 = 8;
pub const NILADIC_RTN: u16 = 11;
pub const NILADIC_STOP: u16 = 13;
pub const NILADIC_CATCH: u16 = 19;
pub const NILADIC_ERRQ: u16 = 20;
pub const MONADIC_SQRT: u16 = 3;
pub const MONADIC_SQUARE: u16 = 4;
pub const DYADIC_ADD: u16 = 0;
pub const DYADIC_MUL: u16 = 2;

// --- niladic ---------------------------------------------------------------

fn push_entry(m: &mut Machine, value: Value) {
    let depth = m.depth();
    if m.state.regs.lift_enabled() {
        m.state.regs.lift(depth, value);
    } else {
        m.state.regs.set_x(value);
    }
    m.state.regs.set_lift_enabled(true);
}

fn nil_nop(_m: &mut Machine) -> Result<()> {
    Ok(())
}

fn nil_enter(m: &mut Machine) -> Result<()> {
    let depth = m.depth();
    let x = m.state.regs.x();
    m.state.regs.lift(depth, x);
    m.state.regs.set_lift_enabled(false);
    Ok(())
}

fn nil_clx(m: &mut Machine) -> Result<()> {
    m.state.regs.set_x(Value::ZERO);
    m.state.regs.set_lift_enabled(false);
    Ok(())
}

fn nil_clstk(m: &mut Machine) -> Result<()> {
    let depth = m.depth();
    m.state.regs.clear_stack(depth);
    Ok(())
}

fn nil_clreg(m: &mut Machine) -> Result<()> {
    m.state.regs.clear_globals();
    Ok(())
}

fn nil_swap(m: &mut Machine) -> Result<()> {
    m.state.regs.swap_xy();
    Ok(())
}

fn nil_roll_down(m: &mut Machine) -> Result<()> {
    let depth = m.depth();
    m.state.regs.roll_down(depth);
    Ok(())
}

fn nil_roll_up(m: &mut Machine) -> Result<()> {
    let depth = m.depth();
    m.state.regs.roll_up(depth);
    Ok(())
}

fn nil_lastx(m: &mut Machine) -> Result<()> {
    let v = m.state.regs.last_x();
    push_entry(m, v);
    Ok(())
}

fn nil_fill(m: &mut Machine) -> Result<()> {
    let depth = m.depth();
    m.state.regs.fill(depth);
    Ok(())
}

fn nil_pi(m: &mut Machine) -> Result<()> {
    push_entry(m, Value::pi());
    Ok(())
}

fn nil_rtn(m: &mut Machine) -> Result<()> {
    control::ret(m, true);
    Ok(())
}

fn nil_rtn_plus_one(m: &mut Machine) -> Result<()> {
    control::ret(m, true);
    if m.state.running {
        // One extra logical step past the normal resume point.
        let (next, wrapped) = m.program.step_forward(m.state.pc);
        if wrapped {
            return Err(ExecError::Range);
        }
        m.set_pc(next);
    }
    Ok(())
}

fn nil_stop(m: &mut Machine) -> Result<()> {
    m.state.running = false;
    Ok(())
}

fn nil_deg(m: &mut Machine) -> Result<()> {
    m.state.user.trig = TrigMode::Degrees;
    Ok(())
}

fn nil_rad(m: &mut Machine) -> Result<()> {
    m.state.user.trig = TrigMode::Radians;
    Ok(())
}

fn nil_grad(m: &mut Machine) -> Result<()> {
    m.state.user.trig = TrigMode::Gradians;
    Ok(())
}

fn nil_ssize4(m: &mut Machine) -> Result<()> {
    m.state.user.stack_depth = StackDepth::Four;
    Ok(())
}

fn nil_ssize8(m: &mut Machine) -> Result<()> {
    m.state.user.stack_depth = StackDepth::Eight;
    Ok(())
}

fn nil_catch(m: &mut Machine) -> Result<()> {
    m.state.trap_depth = Some(m.state.calls.depth());
    Ok(())
}

fn nil_errq(m: &mut Machine) -> Result<()> {
    let seen = m.state.last_error.take().is_some();
    control::skip_if(m, seen)
}

fn nil_x_eq_0(m: &mut Machine) -> Result<()> {
    let cond = m.state.regs.x().is_zero();
    control::skip_if(m, cond)
}

fn nil_x_ne_0(m: &mut Machine) -> Result<()> {
    let x = m.state.regs.x();
    let cond = !x.is_zero();
    control::skip_if(m, cond)
}

fn nil_x_lt_0(m: &mut Machine) -> Result<()> {
    let cond = matches!(
        m.state.regs.x().compare(Value::ZERO),
        Some(Ordering::Less)
    );
    control::skip_if(m, cond)
}

fn nil_x_gt_0(m: &mut Machine) -> Result<()> {
    let cond = matches!(
        m.state.regs.x().compare(Value::ZERO),
        Some(Ordering::Greater)
    );
    control::skip_if(m, cond)
}

pub const NILADIC: &[NiladicEntry] = &[
    NiladicEntry { name: "NOP", run: nil_nop },
    NiladicEntry { name: "ENTER", run: nil_enter },
    NiladicEntry { name: "CLx", run: nil_clx },
    NiladicEntry { name: "CLSTK", run: nil_clstk },
    NiladicEntry { name: "CLREG", run: nil_clreg },
    NiladicEntry { name: "x<>y", run: nil_swap },
    NiladicEntry { name: "RDN", run: nil_roll_down },
    NiladicEntry { name: "RUP", run: nil_roll_up },
    NiladicEntry { name: "LASTx", run: nil_lastx },
    NiladicEntry { name: "FILL", run: nil_fill },
    NiladicEntry { name: "PI", run: nil_pi },
    NiladicEntry { name: "RTN", run: nil_rtn },
    NiladicEntry { name: "RTN+1", run: nil_rtn_plus_one },
    NiladicEntry { name: "STOP", run: nil_stop },
    NiladicEntry { name: "DEG", run: nil_deg },
    NiladicEntry { name: "RAD", run: nil_rad },
    NiladicEntry { name: "GRAD", run: nil_grad },
    NiladicEntry { name: "SSIZE4", run: nil_ssize4 },
    NiladicEntry { name: "SSIZE8", run: nil_ssize8 },
    NiladicEntry { name: "CATCH", run: nil_catch },
    NiladicEntry { name: "ERR?", run: nil_errq },
    NiladicEntry { name: "x=0?", run: nil_x_eq_0 },
    NiladicEntry { name: "x!=0?", run: nil_x_ne_0 },
    NiladicEntry { name: "x<0?", run: nil_x_lt_0 },
    NiladicEntry { name: "x>0?", run: nil_x_gt_0 },
];

// --- monadic ---------------------------------------------------------------

fn map_f64(v: Value, f: impl Fn(f64) -> f64) -> Value {
    Value::from_f64(f(v.to_f64()))
}

fn to_radians(user: &UserState, v: f64) -> f64 {
    match user.trig {
        TrigMode::Degrees => v * std::f64::consts::PI / 180.0,
        TrigMode::Radians => v,
        TrigMode::Gradians => v * std::f64::consts::PI / 200.0,
    }
}

fn mon_abs(_u: &UserState, x: Value) -> Result<Value> {
    Ok(x.abs())
}

fn mon_neg(_u: &UserState, x: Value) -> Result<Value> {
    Ok(x.neg())
}

fn mon_recip(_u: &UserState, x: Value) -> Result<Value> {
    Ok(Value::ONE.div(x))
}

fn mon_sqrt(_u: &UserState, x: Value) -> Result<Value> {
    if x.is_negative() {
        return Ok(Value::NaN);
    }
    Ok(map_f64(x, f64::sqrt))
}

fn mon_square(_u: &UserState, x: Value) -> Result<Value> {
    Ok(x.mul(x))
}

fn mon_ln(_u: &UserState, x: Value) -> Result<Value> {
    Ok(map_f64(x, f64::ln))
}

fn mon_exp(_u: &UserState, x: Value) -> Result<Value> {
    Ok(map_f64(x, f64::exp))
}

fn mon_sin(u: &UserState, x: Value) -> Result<Value> {
    Ok(map_f64(x, |v| to_radians(u, v).sin()))
}

fn mon_cos(u: &UserState, x: Value) -> Result<Value> {
    Ok(map_f64(x, |v| to_radians(u, v).cos()))
}

fn mon_tan(u: &UserState, x: Value) -> Result<Value> {
    Ok(map_f64(x, |v| to_radians(u, v).tan()))
}

fn mon_ip(_u: &UserState, x: Value) -> Result<Value> {
    Ok(x.trunc())
}

fn mon_fp(_u: &UserState, x: Value) -> Result<Value> {
    Ok(x.fract())
}

fn mon_sign(_u: &UserState, x: Value) -> Result<Value> {
    Ok(x.signum())
}

pub const MONADIC: &[MonadicEntry] = &[
    MonadicEntry { name: "ABS", run: mon_abs },
    MonadicEntry { name: "+/-", run: mon_neg },
    MonadicEntry { name: "1/x", run: mon_recip },
    MonadicEntry { name: "SQRT", run: mon_sqrt },
    MonadicEntry { name: "x^2", run: mon_square },
    MonadicEntry { name: "LN", run: mon_ln },
    MonadicEntry { name: "e^x", run: mon_exp },
    MonadicEntry { name: "SIN", run: mon_sin },
    MonadicEntry { name: "COS", run: mon_cos },
    MonadicEntry { name: "TAN", run: mon_tan },
    MonadicEntry { name: "IP", run: mon_ip },
    MonadicEntry { name: "FP", run: mon_fp },
    MonadicEntry { name: "SIGN", run: mon_sign },
];

// --- dyadic ----------------------------------------------------------------

fn dy_add(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    Ok(y.add(x))
}

fn dy_sub(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    Ok(y.sub(x))
}

fn dy_mul(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    Ok(y.mul(x))
}

fn dy_div(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    Ok(y.div(x))
}

fn dy_mod(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    Ok(y.rem(x))
}

fn dy_pow(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    Ok(Value::from_f64(y.to_f64().powf(x.to_f64())))
}

fn dy_min(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    match y.compare(x) {
        Some(Ordering::Greater) => Ok(x),
        Some(_) => Ok(y),
        None => Ok(Value::NaN),
    }
}

fn dy_max(_u: &UserState, y: Value, x: Value) -> Result<Value> {
    match y.compare(x) {
        Some(Ordering::Less) => Ok(x),
        Some(_) => Ok(y),
        None => Ok(Value::NaN),
    }
}

pub const DYADIC: &[DyadicEntry] = &[
    DyadicEntry { name: "+", run: dy_add },
    DyadicEntry { name: "-", run: dy_sub },
    DyadicEntry { name: "*", run: dy_mul },
    DyadicEntry { name: "/", run: dy_div },
    DyadicEntry { name: "MOD", run: dy_mod },
    DyadicEntry { name: "y^x", run: dy_pow },
    DyadicEntry { name: "MIN", run: dy_min },
    DyadicEntry { name: "MAX", run: dy_max },
];

// --- triadic ---------------------------------------------------------------

fn tri_muladd(_u: &UserState, z: Value, y: Value, x: Value) -> Result<Value> {
    Ok(y.mul(x).add(z))
}

fn tri_clamp(_u: &UserState, z: Value, y: Value, x: Value) -> Result<Value> {
    // x clamped into [y, z].
    match (x.compare(y), x.compare(z)) {
        (Some(Ordering::Less), _) => Ok(y),
        (_, Some(Ordering::Greater)) => Ok(z),
        (Some(_), Some(_)) => Ok(x),
        _ => Ok(Value::NaN),
    }
}

pub const TRIADIC: &[TriadicEntry] = &[
    TriadicEntry { name: "*+", run: tri_muladd },
    TriadicEntry { name: "CLAMP", run: tri_clamp },
];

// --- complex ---------------------------------------------------------------

fn cm_neg(_u: &UserState, re: Value, im: Value) -> Result<(Value, Value)> {
    Ok((re.neg(), im.neg()))
}

fn cm_conj(_u: &UserState, re: Value, im: Value) -> Result<(Value, Value)> {
    Ok((re, im.neg()))
}

fn cm_recip(_u: &UserState, re: Value, im: Value) -> Result<(Value, Value)> {
    let denom = re.mul(re).add(im.mul(im));
    Ok((re.div(denom), im.neg().div(denom)))
}

fn cm_sqrt(_u: &UserState, re: Value, im: Value) -> Result<(Value, Value)> {
    let (a, b) = (re.to_f64(), im.to_f64());
    let r = a.hypot(b);
    let out_re = ((r + a) / 2.0).sqrt();
    let out_im = ((r - a) / 2.0).sqrt().copysign(b);
    Ok((Value::from_f64(out_re), Value::from_f64(out_im)))
}

pub const COMPLEX_MONADIC: &[ComplexMonadicEntry] = &[
    ComplexMonadicEntry { name: "c+/-", run: cm_neg },
    ComplexMonadicEntry { name: "cCONJ", run: cm_conj },
    ComplexMonadicEntry { name: "c1/x", run: cm_recip },
    ComplexMonadicEntry { name: "cSQRT", run: cm_sqrt },
];

fn cd_add(
    _u: &UserState,
    (re2, im2): (Value, Value),
    (re1, im1): (Value, Value),
) -> Result<(Value, Value)> {
    Ok((re2.add(re1), im2.add(im1)))
}

fn cd_sub(
    _u: &UserState,
    (re2, im2): (Value, Value),
    (re1, im1): (Value, Value),
) -> Result<(Value, Value)> {
    Ok((re2.sub(re1), im2.sub(im1)))
}

fn cd_mul(
    _u: &UserState,
    (re2, im2): (Value, Value),
    (re1, im1): (Value, Value),
) -> Result<(Value, Value)> {
    let re = re2.mul(re1).sub(im2.mul(im1));
    let im = re2.mul(im1).add(im2.mul(re1));
    Ok((re, im))
}

fn cd_div(
    _u: &UserState,
    (re2, im2): (Value, Value),
    (re1, im1): (Value, Value),
) -> Result<(Value, Value)> {
    let denom = re1.mul(re1).add(im1.mul(im1));
    let re = re2.mul(re1).add(im2.mul(im1)).div(denom);
    let im = im2.mul(re1).sub(re2.mul(im1)).div(denom);
    Ok((re, im))
}

pub const COMPLEX_DYADIC: &[ComplexDyadicEntry] = &[
    ComplexDyadicEntry { name: "c+", run: cd_add },
    ComplexDyadicEntry { name: "c-", run: cd_sub },
    ComplexDyadicEntry { name: "c*", run: cd_mul },
    ComplexDyadicEntry { name: "c/", run: cd_div },
];

// --- entry keys ------------------------------------------------------------

fn sp_digit(m: &mut Machine, index: u16) -> Result<()> {
    m.state.cmdline.push_digit(index as u8);
    Ok(())
}

fn sp_dot(m: &mut Machine, _index: u16) -> Result<()> {
    m.state.cmdline.push_dot();
    Ok(())
}

fn sp_eex(m: &mut Machine, _index: u16) -> Result<()> {
    m.state.cmdline.push_exponent();
    Ok(())
}

fn sp_exponent_sign(m: &mut Machine, _index: u16) -> Result<()> {
    m.state.cmdline.toggle_exponent_sign();
    Ok(())
}

fn sp_backspace(m: &mut Machine, _index: u16) -> Result<()> {
    m.state.cmdline.backspace();
    Ok(())
}

fn sp_cancel(m: &mut Machine, _index: u16) -> Result<()> {
    m.state.cmdline.clear();
    Ok(())
}

pub const SPECIAL: &[SpecialEntry] = &[
    SpecialEntry { name: "0", run: sp_digit },
    SpecialEntry { name: "1", run: sp_digit },
    SpecialEntry { name: "2", run: sp_digit },
    SpecialEntry { name: "3", run: sp_digit },
    SpecialEntry { name: "4", run: sp_digit },
    SpecialEntry { name: "5", run: sp_digit },
    SpecialEntry { name: "6", run: sp_digit },
    SpecialEntry { name: "7", run: sp_digit },
    SpecialEntry { name: "8", run: sp_digit },
    SpecialEntry { name: "9", run: sp_digit },
    SpecialEntry { name: ".", run: sp_dot },
    SpecialEntry { name: "EEX", run: sp_eex },
    SpecialEntry { name: "ESGN", run: sp_exponent_sign },
    SpecialEntry { name: "BSP", run: sp_backspace },
    SpecialEntry { name: "CANCEL", run: sp_cancel },
];

// --- argument commands -----------------------------------------------------

fn arg_sto(m: &mut Machine, arg: u8) -> Result<()> {
    let x = m.state.regs.x();
    m.reg_write(arg, x);
    Ok(())
}

fn arg_rcl(m: &mut Machine, arg: u8) -> Result<()> {
    let v = m.reg_read(arg);
    push_entry(m, v);
    Ok(())
}

fn arg_xchg(m: &mut Machine, arg: u8) -> Result<()> {
    let x = m.state.regs.x();
    let v = m.reg_read(arg);
    m.reg_write(arg, x);
    m.state.regs.set_x(v);
    Ok(())
}

fn arg_view(m: &mut Machine, arg: u8) -> Result<()> {
    let text = m.state.user.format(m.reg_read(arg));
    m.display.set_digits(&text);
    Ok(())
}

fn arg_lbl(_m: &mut Machine, _arg: u8) -> Result<()> {
    Ok(())
}

fn arg_gto(m: &mut Machine, arg: u8) -> Result<()> {
    let target = control::locate_or_fault(m, LabelKey::Numeric(arg))?;
    control::branch(m, target);
    Ok(())
}

fn arg_xeq(m: &mut Machine, arg: u8) -> Result<()> {
    let target = control::locate_or_fault(m, LabelKey::Numeric(arg))?;
    control::call(m, target)
}

fn arg_lbl_test(m: &mut Machine, arg: u8) -> Result<()> {
    let exists = control::locate(m, LabelKey::Numeric(arg)).is_some();
    control::skip_if(m, exists)
}

fn arg_skip(m: &mut Machine, arg: u8) -> Result<()> {
    control::skip(m, arg as u16)
}

fn arg_back(m: &mut Machine, arg: u8) -> Result<()> {
    control::back(m, arg as u16)
}

fn arg_dsz(m: &mut Machine, arg: u8) -> Result<()> {
    control::loop_step(m, arg, LoopKind::Dsz)
}

fn arg_isz(m: &mut Machine, arg: u8) -> Result<()> {
    control::loop_step(m, arg, LoopKind::Isz)
}

fn arg_dse(m: &mut Machine, arg: u8) -> Result<()> {
    control::loop_step(m, arg, LoopKind::Dse)
}

fn arg_isg(m: &mut Machine, arg: u8) -> Result<()> {
    control::loop_step(m, arg, LoopKind::Isg)
}

fn arg_sf(m: &mut Machine, arg: u8) -> Result<()> {
    m.state.user.set_flag(arg, true);
    Ok(())
}

fn arg_cf(m: &mut Machine, arg: u8) -> Result<()> {
    m.state.user.set_flag(arg, false);
    Ok(())
}

fn arg_fs_test(m: &mut Machine, arg: u8) -> Result<()> {
    let cond = m.state.user.flag(arg);
    control::skip_if(m, cond)
}

fn arg_fc_test(m: &mut Machine, arg: u8) -> Result<()> {
    let cond = !m.state.user.flag(arg);
    control::skip_if(m, cond)
}

fn arg_fix(m: &mut Machine, arg: u8) -> Result<()> {
    m.state.user.display = DisplayMode::Fix(arg);
    Ok(())
}

fn arg_sci(m: &mut Machine, arg: u8) -> Result<()> {
    m.state.user.display = DisplayMode::Sci(arg);
    Ok(())
}

fn arg_eng(m: &mut Machine, arg: u8) -> Result<()> {
    m.state.user.display = DisplayMode::Eng(arg);
    Ok(())
}

fn arg_base(m: &mut Machine, arg: u8) -> Result<()> {
    if arg < 2 {
        return Err(ExecError::Range);
    }
    m.state.user.base = arg;
    Ok(())
}

fn arg_locr(m: &mut Machine, arg: u8) -> Result<()> {
    let budget = m.call_unit_budget();
    m.state.calls.push_frame(arg as usize, budget)
}

fn arg_poplr(m: &mut Machine, _arg: u8) -> Result<()> {
    m.state.calls.pop_frame();
    Ok(())
}

fn arg_pause(m: &mut Machine, arg: u8) -> Result<()> {
    m.pause_ticks = arg as u32;
    Ok(())
}

fn arg_psto(m: &mut Machine, arg: u8) -> Result<()> {
    if m.state.running {
        return Err(ExecError::FlashLocked);
    }
    m.staged_flash = Some(FlashOp::SaveProgram(arg));
    Ok(())
}

fn arg_prcl(m: &mut Machine, arg: u8) -> Result<()> {
    if m.state.running {
        return Err(ExecError::FlashLocked);
    }
    if m.program.library_words(arg).is_empty() {
        return Err(ExecError::EmptyLibrary(arg));
    }
    m.staged_flash = Some(FlashOp::RecallProgram(arg));
    Ok(())
}

pub const ARG_COMMANDS: &[ArgEntry] = &[
    ArgEntry { cmd: ArgCmd::Sto, name: "STO", max: REG_ARG_MAX, run: arg_sto },
    ArgEntry { cmd: ArgCmd::Rcl, name: "RCL", max: REG_ARG_MAX, run: arg_rcl },
    ArgEntry { cmd: ArgCmd::Xchg, name: "x<>", max: REG_ARG_MAX, run: arg_xchg },
    ArgEntry { cmd: ArgCmd::View, name: "VIEW", max: REG_ARG_MAX, run: arg_view },
    ArgEntry { cmd: ArgCmd::Lbl, name: "LBL", max: MAX_NUMERIC_LABEL, run: arg_lbl },
    ArgEntry { cmd: ArgCmd::Gto, name: "GTO", max: MAX_NUMERIC_LABEL, run: arg_gto },
    ArgEntry { cmd: ArgCmd::Xeq, name: "XEQ", max: MAX_NUMERIC_LABEL, run: arg_xeq },
    ArgEntry { cmd: ArgCmd::LblTest, name: "LBL?", max: MAX_NUMERIC_LABEL, run: arg_lbl_test },
    ArgEntry { cmd: ArgCmd::Skip, name: "SKIP", max: 0x7F, run: arg_skip },
    ArgEntry { cmd: ArgCmd::Back, name: "BACK", max: 0x7F, run: arg_back },
    ArgEntry { cmd: ArgCmd::Dsz, name: "DSZ", max: REG_ARG_MAX, run: arg_dsz },
    ArgEntry { cmd: ArgCmd::Isz, name: "ISZ", max: REG_ARG_MAX, run: arg_isz },
    ArgEntry { cmd: ArgCmd::Dse, name: "DSE", max: REG_ARG_MAX, run: arg_dse },
    ArgEntry { cmd: ArgCmd::Isg, name: "ISG", max: REG_ARG_MAX, run: arg_isg },
    ArgEntry { cmd: ArgCmd::Sf, name: "SF", max: NUM_FLAGS as u8 - 1, run: arg_sf },
    ArgEntry { cmd: ArgCmd::Cf, name: "CF", max: NUM_FLAGS as u8 - 1, run: arg_cf },
    ArgEntry { cmd: ArgCmd::FsTest, name: "FS?", max: NUM_FLAGS as u8 - 1, run: arg_fs_test },
    ArgEntry { cmd: ArgCmd::FcTest, name: "FC?", max: NUM_FLAGS as u8 - 1, run: arg_fc_test },
    ArgEntry { cmd: ArgCmd::Fix, name: "FIX", max: 11, run: arg_fix },
    ArgEntry { cmd: ArgCmd::Sci, name: "SCI", max: 11, run: arg_sci },
    ArgEntry { cmd: ArgCmd::Eng, name: "ENG", max: 11, run: arg_eng },
    ArgEntry { cmd: ArgCmd::Base, name: "BASE", max: 16, run: arg_base },
    ArgEntry { cmd: ArgCmd::LocR, name: "LOCR", max: MAX_LOCAL_SLOTS, run: arg_locr },
    ArgEntry { cmd: ArgCmd::PopLr, name: "POPLR", max: 0, run: arg_poplr },
    ArgEntry { cmd: ArgCmd::Pause, name: "PAUSE", max: 99, run: arg_pause },
    ArgEntry { cmd: ArgCmd::PSto, name: "PSTO", max: NUM_LIB_SLOTS as u8 - 1, run: arg_psto },
    ArgEntry { cmd: ArgCmd::PRcl, name: "PRCL", max: NUM_LIB_SLOTS as u8 - 1, run: arg_prcl },
];

pub fn arg_entry(cmd: ArgCmd) -> &'static ArgEntry {
    &ARG_COMMANDS[u8::from(cmd) as usize]
}

// --- multi-word commands ---------------------------------------------------

fn multi_lbl(_m: &mut Machine, _text: [u8; 3]) -> Result<()> {
    Ok(())
}

fn multi_gto(m: &mut Machine, text: [u8; 3]) -> Result<()> {
    let target = control::locate_or_fault(m, LabelKey::Text(text))?;
    control::branch(m, target);
    Ok(())
}

fn multi_xeq(m: &mut Machine, text: [u8; 3]) -> Result<()> {
    let target = control::locate_or_fault(m, LabelKey::Text(text))?;
    control::call(m, target)
}

pub const MULTI_COMMANDS: &[MultiEntry] = &[
    MultiEntry { cmd: MultiCmd::LblText, name: "LBL", run: multi_lbl },
    MultiEntry { cmd: MultiCmd::GtoText, name: "GTO", run: multi_gto },
    MultiEntry { cmd: MultiCmd::XeqText, name: "XEQ", run: multi_xeq },
];

pub fn multi_entry(cmd: MultiCmd) -> &'static MultiEntry {
    &MULTI_COMMANDS[u8::from(cmd) as usize]
}

// --- name lookup (assembler / catalog surface) -----------------------------

/// A name resolved against the operation tables.
pub enum NameMatch {
    /// Complete instruction; takes no further argument.
    Plain(Instruction),
    /// Needs a numeric argument (and optional indirection).
    Arg(ArgCmd),
}

/// Text-key commands share their spelling with the numeric forms
/// (`GTO 05` vs `GTO'AB'`); callers pick this lookup when the operand is a
/// quoted key.
pub fn lookup_multi_name(name: &str) -> Option<MultiCmd> {
    MULTI_COMMANDS.iter().find(|e| e.name == name).map(|e| e.cmd)
}

/// Reverse lookup by display name for everything except text-key commands.
pub fn lookup_name(name: &str) -> Option<NameMatch> {
    for (i, e) in NILADIC.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::Niladic(i as u16)));
        }
    }
    for (i, e) in MONADIC.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::Monadic(i as u16)));
        }
    }
    for (i, e) in DYADIC.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::Dyadic(i as u16)));
        }
    }
    for (i, e) in TRIADIC.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::Triadic(i as u16)));
        }
    }
    for (i, e) in COMPLEX_MONADIC.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::ComplexMonadic(i as u16)));
        }
    }
    for (i, e) in COMPLEX_DYADIC.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::ComplexDyadic(i as u16)));
        }
    }
    for (i, e) in SPECIAL.iter().enumerate() {
        if e.name == name {
            return Some(NameMatch::Plain(Instruction::Special(i as u16)));
        }
    }
    for e in ARG_COMMANDS {
        if e.name == name {
            return Some(NameMatch::Arg(e.cmd));
        }
    }
    None
}
