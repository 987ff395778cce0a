//! Instruction word codec.
//!
//! Program memory holds 16-bit cells. Most instructions occupy one cell;
//! text-label instructions occupy two, with the second cell carrying opaque
//! character payload. Every bit pattern decodes to *some* variant — reserved
//! or out-of-table patterns map to [`Instruction::Illegal`], never to
//! undefined behavior. All components past this module operate on the decoded
//! enum, never on raw cells.
//!
//! Layout:
//! - bit 15 set: argument command `[1][cmd:7][ind:1][arg:7]`
//! - bits 14..12 = 0..=6: plain kinds, bits 11..0 index
//! - bits 14..12 = 7: two-word form, bits 11..8 command, bits 7..0 first
//!   text byte; the next cell holds text bytes 1 and 2

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ops;

pub type Word = u16;

const KIND_SHIFT: u16 = 12;
const KIND_MULTI: u16 = 7;
const INDEX_MASK: u16 = 0x0FFF;
const ARG_BIT: u16 = 0x8000;
const ARG_CMD_SHIFT: u16 = 8;
const ARG_CMD_MASK: u16 = 0x7F;
const ARG_IND_BIT: u16 = 0x0080;
const ARG_VAL_MASK: u16 = 0x007F;

/// Commands that carry a numeric argument (and optional indirection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ArgCmd {
    Sto,
    Rcl,
    Xchg,
    View,
    Lbl,
    Gto,
    Xeq,
    LblTest,
    Skip,
    Back,
    Dsz,
    Isz,
    Dse,
    Isg,
    Sf,
    Cf,
    FsTest,
    FcTest,
    Fix,
    Sci,
    Eng,
    Base,
    LocR,
    PopLr,
    Pause,
    PSto,
    PRcl,
}

/// Two-word commands; the payload is a short text key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MultiCmd {
    LblText,
    GtoText,
    XeqText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Niladic(u16),
    Monadic(u16),
    Dyadic(u16),
    Triadic(u16),
    ComplexMonadic(u16),
    ComplexDyadic(u16),
    Special(u16),
    Arg { cmd: ArgCmd, arg: u8, indirect: bool },
    Multi { cmd: MultiCmd, text: [u8; 3] },
    Illegal(Word),
}

/// Encoded form of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    One(Word),
    Two(Word, Word),
}

impl Encoded {
    pub fn width(self) -> usize {
        match self {
            Encoded::One(_) => 1,
            Encoded::Two(_, _) => 2,
        }
    }

    pub fn first(self) -> Word {
        match self {
            Encoded::One(w) | Encoded::Two(w, _) => w,
        }
    }
}

/// Number of cells the instruction starting with `word` occupies.
///
/// The second cell of a two-word instruction is opaque payload and is never
/// independently decoded, so this is decidable from the first cell alone.
pub fn width_of(word: Word) -> usize {
    if word & ARG_BIT == 0 && (word >> KIND_SHIFT) == KIND_MULTI {
        let cmd = ((word & INDEX_MASK) >> 8) as u8;
        if MultiCmd::try_from(cmd).is_ok() {
            return 2;
        }
    }
    1
}

/// Decode one instruction. `next` must be the following cell when
/// [`width_of`] reports 2; a missing payload cell decodes as illegal.
pub fn decode(word: Word, next: Option<Word>) -> Instruction {
    if word & ARG_BIT != 0 {
        let cmd_bits = ((word >> ARG_CMD_SHIFT) & ARG_CMD_MASK) as u8;
        let cmd = match ArgCmd::try_from(cmd_bits) {
            Ok(cmd) => cmd,
            Err(_) => return Instruction::Illegal(word),
        };
        let arg = (word & ARG_VAL_MASK) as u8;
        let indirect = word & ARG_IND_BIT != 0;
        // A direct argument is bounded by the command's declared limit; an
        // indirect one names a register and is range-checked only after
        // resolution at dispatch time.
        if !indirect && arg > ops::arg_entry(cmd).max {
            return Instruction::Illegal(word);
        }
        return Instruction::Arg { cmd, arg, indirect };
    }

    let kind = word >> KIND_SHIFT;
    let index = word & INDEX_MASK;
    let in_table = |len: usize| (index as usize) < len;
    match kind {
        0 if in_table(ops::NILADIC.len()) => Instruction::Niladic(index),
        1 if in_table(ops::MONADIC.len()) => Instruction::Monadic(index),
        2 if in_table(ops::DYADIC.len()) => Instruction::Dyadic(index),
        3 if in_table(ops::TRIADIC.len()) => Instruction::Triadic(index),
        4 if in_table(ops::COMPLEX_MONADIC.len()) => Instruction::ComplexMonadic(index),
        5 if in_table(ops::COMPLEX_DYADIC.len()) => Instruction::ComplexDyadic(index),
        6 if in_table(ops::SPECIAL.len()) => Instruction::Special(index),
        KIND_MULTI => {
            let cmd_bits = (index >> 8) as u8;
            let cmd = match MultiCmd::try_from(cmd_bits) {
                Ok(cmd) => cmd,
                Err(_) => return Instruction::Illegal(word),
            };
            let payload = match next {
                Some(cell) => cell,
                None => return Instruction::Illegal(word),
            };
            Instruction::Multi {
                cmd,
                text: [
                    (word & 0x00FF) as u8,
                    (payload & 0x00FF) as u8,
                    (payload >> 8) as u8,
                ],
            }
        }
        _ => Instruction::Illegal(word),
    }
}

/// Encode an instruction. Left inverse of [`decode`] for every value the
/// decoder can produce; `Illegal` round-trips to its original cell.
pub fn encode(instr: &Instruction) -> Encoded {
    let plain = |kind: u16, index: u16| Encoded::One((kind << KIND_SHIFT) | (index & INDEX_MASK));
    match *instr {
        Instruction::Niladic(i) => plain(0, i),
        Instruction::Monadic(i) => plain(1, i),
        Instruction::Dyadic(i) => plain(2, i),
        Instruction::Triadic(i) => plain(3, i),
        Instruction::ComplexMonadic(i) => plain(4, i),
        Instruction::ComplexDyadic(i) => plain(5, i),
        Instruction::Special(i) => plain(6, i),
        Instruction::Arg { cmd, arg, indirect } => {
            let mut word = ARG_BIT | ((u8::from(cmd) as Word) << ARG_CMD_SHIFT);
            if indirect {
                word |= ARG_IND_BIT;
            }
            word |= (arg as Word) & ARG_VAL_MASK;
            Encoded::One(word)
        }
        Instruction::Multi { cmd, text } => {
            let word = (KIND_MULTI << KIND_SHIFT)
                | ((u8::from(cmd) as Word) << 8)
                | text[0] as Word;
            let payload = (text[1] as Word) | ((text[2] as Word) << 8);
            Encoded::Two(word, payload)
        }
        Instruction::Illegal(word) => Encoded::One(word),
    }
}

fn text_key(text: &[u8; 3]) -> String {
    text.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

impl Instruction {
    /// Cells occupied in program memory.
    pub fn width(&self) -> usize {
        match self {
            Instruction::Multi { .. } => 2,
            _ => 1,
        }
    }

    pub fn is_entry_key(&self) -> bool {
        matches!(self, Instruction::Special(_))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn name<T>(table: &'static [T], i: u16, get: fn(&T) -> &'static str) -> &'static str {
            table.get(i as usize).map(get).unwrap_or("???")
        }
        match self {
            Instruction::Niladic(i) => write!(f, "{}", name(ops::NILADIC, *i, |e| e.name)),
            Instruction::Monadic(i) => write!(f, "{}", name(ops::MONADIC, *i, |e| e.name)),
            Instruction::Dyadic(i) => write!(f, "{}", name(ops::DYADIC, *i, |e| e.name)),
            Instruction::Triadic(i) => write!(f, "{}", name(ops::TRIADIC, *i, |e| e.name)),
            Instruction::ComplexMonadic(i) => {
                write!(f, "{}", name(ops::COMPLEX_MONADIC, *i, |e| e.name))
            }
            Instruction::ComplexDyadic(i) => {
                write!(f, "{}", name(ops::COMPLEX_DYADIC, *i, |e| e.name))
            }
            Instruction::Special(i) => write!(f, "{}", name(ops::SPECIAL, *i, |e| e.name)),
            Instruction::Arg { cmd, arg, indirect } => {
                let name = ops::arg_entry(*cmd).name;
                if *indirect {
                    write!(f, "{name} ->{arg:02}")
                } else {
                    write!(f, "{name} {arg:02}")
                }
            }
            Instruction::Multi { cmd, text } => {
                write!(f, "{}'{}'", ops::multi_entry(*cmd).name, text_key(text))
            }
            Instruction::Illegal(word) => write!(f, "DATA #{word:04X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn niladic_nop_round_trips() {
        let instr = Instruction::Niladic(0);
        let encoded = encode(&instr);
        assert_eq!(encoded, Encoded::One(0x0000));
        assert_eq!(decode(encoded.first(), None), instr);
    }

    #[test]
    fn arg_command_carries_indirection_and_argument() {
        let instr = Instruction::Arg {
            cmd: ArgCmd::Sto,
            arg: 0x45,
            indirect: true,
        };
        let encoded = encode(&instr);
        let Encoded::One(word) = encoded else {
            panic!("arg commands are single-word");
        };
        assert_eq!(decode(word, None), instr);
    }

    #[test]
    fn multi_word_needs_its_payload_cell() {
        let instr = Instruction::Multi {
            cmd: MultiCmd::LblText,
            text: *b"AB\0",
        };
        let Encoded::Two(first, second) = encode(&instr) else {
            panic!("text labels are two-word");
        };
        assert_eq!(width_of(first), 2);
        assert_eq!(decode(first, Some(second)), instr);
        assert!(matches!(decode(first, None), Instruction::Illegal(_)));
    }

    #[test]
    fn reserved_patterns_decode_as_illegal() {
        // Kind 6 with an index past the special table.
        let word = (6u16 << 12) | 0x0FFF;
        assert_eq!(decode(word, None), Instruction::Illegal(word));
        // Argument command id past the table.
        let word = 0x8000 | (0x7Eu16 << 8);
        assert_eq!(decode(word, None), Instruction::Illegal(word));
    }

    #[test]
    fn illegal_encodes_back_to_its_word() {
        let word = (6u16 << 12) | 0x0FFF;
        let instr = decode(word, None);
        assert_eq!(encode(&instr), Encoded::One(word));
    }

    #[test]
    fn second_cell_is_never_misread_as_width_two() {
        // A payload cell that happens to look like a one-word instruction
        // still reports width 1; the program space is responsible for never
        // resolving it directly.
        assert_eq!(width_of(0x0000), 1);
    }
}
