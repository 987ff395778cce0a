//! The fixed built-in routine set.
//!
//! The ROM region is assembled once, at first use, from `Instruction`
//! values run through the codec — its cells therefore always round-trip
//! through decode. Routines carry text labels and are reached through the
//! global catalog search like any other call target.

use once_cell::sync::Lazy;

use crate::opcode::{encode, Encoded, Instruction, MultiCmd, Word};
use crate::ops;

static ROM_IMAGE: Lazy<Vec<Word>> = Lazy::new(build_image);

/// Backing cells of the ROM region.
pub fn image() -> &'static [Word] {
    &ROM_IMAGE
}

fn build_image() -> Vec<Word> {
    let mut words = Vec::new();
    for instr in routines() {
        match encode(&instr) {
            Encoded::One(w) => words.push(w),
            Encoded::Two(w0, w1) => {
                words.push(w0);
                words.push(w1);
            }
        }
    }
    words
}

fn routines() -> Vec<Instruction> {
    let lbl = |text: [u8; 3]| Instruction::Multi {
        cmd: MultiCmd::LblText,
        text,
    };
    vec![
        // HYP: sqrt(x^2 + y^2)
        lbl(*b"HYP"),
        Instruction::Monadic(ops::MONADIC_SQUARE),
        Instruction::Niladic(ops::NILADIC_SWAP),
        Instruction::Monadic(ops::MONADIC_SQUARE),
        Instruction::Dyadic(ops::DYADIC_ADD),
        Instruction::Monadic(ops::MONADIC_SQRT),
        Instruction::Niladic(ops::NILADIC_RTN),
        // CUB: x^3, leaving the original x in last-x
        lbl(*b"CUB"),
        Instruction::Monadic(ops::MONADIC_SQUARE),
        Instruction::Niladic(ops::NILADIC_LASTX),
        Instruction::Dyadic(ops::DYADIC_MUL),
        Instruction::Niladic(ops::NILADIC_RTN),
    ]
}
