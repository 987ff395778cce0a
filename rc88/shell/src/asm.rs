//! Program-listing assembler.
//!
//! One instruction per line, spelled with the operation tables' display
//! names: `STO 05`, `RCL ->12` (indirect), `XEQ'HYP'` (text key), bare
//! names for everything else. A bare number expands into the entry-key
//! sequence that would type it, so listings can carry literals. `#` starts
//! a comment.

use thiserror::Error;

use rc88_core::opcode::{ArgCmd, Instruction};
use rc88_core::ops::{self, NameMatch};
use rc88_core::program::{ProgramAddress, Region};
use rc88_core::state::Machine;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: unknown operation '{name}'")]
    UnknownName { line: usize, name: String },
    #[error("line {line}: '{name}' needs a numeric argument")]
    MissingArgument { line: usize, name: String },
    #[error("line {line}: bad argument '{text}'")]
    BadArgument { line: usize, text: String },
    #[error("line {line}: text key must be 1..=3 ASCII characters")]
    BadTextKey { line: usize },
    #[error("line {line}: bad numeric literal '{text}'")]
    BadLiteral { line: usize, text: String },
    #[error("program does not fit in RAM")]
    NoRoom,
}

/// Assemble a listing into instructions.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, AsmError> {
    let mut out = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        assemble_line(line, text, &mut out)?;
    }
    Ok(out)
}

/// Assemble and load a listing into the machine's user program.
pub fn load_into(m: &mut Machine, source: &str) -> Result<usize, AsmError> {
    let instrs = assemble(source)?;
    let count = instrs.len();
    for instr in &instrs {
        let budget = m.program_cell_budget();
        m.program
            .append(instr, budget)
            .map_err(|_| AsmError::NoRoom)?;
    }
    Ok(count)
}

/// Render the user program back into assemblable listing form (no step
/// numbers; presentation layers add their own).
pub fn disassemble(m: &Machine) -> String {
    let mut out = String::new();
    let mut addr = ProgramAddress::ram(m.program.first_step(Region::Ram));
    if addr.step == 0 {
        return out;
    }
    loop {
        let instr = m.program.resolve(addr);
        out.push_str(&format!("{instr}\n"));
        let (next, wrapped) = m.program.step_forward(addr);
        if wrapped {
            break;
        }
        addr = next;
    }
    out
}

fn assemble_line(line: usize, text: &str, out: &mut Vec<Instruction>) -> Result<(), AsmError> {
    if starts_like_literal(text) {
        return expand_literal(line, text, out);
    }

    // NAME'KEY' — a text-key command.
    if let Some(quote) = text.find('\'') {
        let name = text[..quote].trim();
        let rest = &text[quote + 1..];
        let key = rest.strip_suffix('\'').unwrap_or(rest);
        let cmd = ops::lookup_multi_name(name).ok_or_else(|| AsmError::UnknownName {
            line,
            name: name.to_string(),
        })?;
        out.push(Instruction::Multi {
            cmd,
            text: pack_text_key(line, key)?,
        });
        return Ok(());
    }

    let (name, operand) = match text.split_once(char::is_whitespace) {
        Some((name, operand)) => (name.trim(), Some(operand.trim())),
        None => (text, None),
    };

    match ops::lookup_name(name) {
        Some(NameMatch::Plain(instr)) => {
            if operand.is_some() {
                return Err(AsmError::BadArgument {
                    line,
                    text: text.to_string(),
                });
            }
            out.push(instr);
            Ok(())
        }
        Some(NameMatch::Arg(cmd)) => {
            let operand = operand.ok_or_else(|| AsmError::MissingArgument {
                line,
                name: name.to_string(),
            })?;
            out.push(parse_arg(line, cmd, operand)?);
            Ok(())
        }
        None => Err(AsmError::UnknownName {
            line,
            name: name.to_string(),
        }),
    }
}

fn starts_like_literal(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => true,
        Some('-') => chars.next().map(|c| c.is_ascii_digit() || c == '.').unwrap_or(false),
        _ => false,
    }
}

/// Expand a numeric literal into the entry keys that type it. A leading
/// minus becomes a trailing sign change.
fn expand_literal(line: usize, text: &str, out: &mut Vec<Instruction>) -> Result<(), AsmError> {
    let bad = || AsmError::BadLiteral {
        line,
        text: text.to_string(),
    };
    let (negate, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() {
        return Err(bad());
    }
    let mut prev = '\0';
    for c in digits.chars() {
        match c {
            '0'..='9' => out.push(Instruction::Special(c as u16 - '0' as u16)),
            '.' => out.push(Instruction::Special(10)),
            'e' | 'E' => out.push(Instruction::Special(11)),
            // Exponent sign, as typed: EEX then sign toggle.
            '-' if prev == 'e' || prev == 'E' => out.push(Instruction::Special(12)),
            _ => return Err(bad()),
        }
        prev = c;
    }
    if negate {
        // +/- applies to the committed value, so it follows the digits.
        out.push(Instruction::Monadic(1));
    }
    Ok(())
}

fn parse_arg(line: usize, cmd: ArgCmd, operand: &str) -> Result<Instruction, AsmError> {
    let bad = || AsmError::BadArgument {
        line,
        text: operand.to_string(),
    };
    let (indirect, digits) = match operand.strip_prefix("->") {
        Some(rest) => (true, rest.trim()),
        None => (false, operand),
    };
    let arg: u8 = digits.parse().map_err(|_| bad())?;
    if arg > 0x7F {
        return Err(bad());
    }
    if !indirect && arg > ops::arg_entry(cmd).max {
        return Err(bad());
    }
    Ok(Instruction::Arg { cmd, arg, indirect })
}

fn pack_text_key(line: usize, key: &str) -> Result<[u8; 3], AsmError> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > 3 || !bytes.iter().all(|b| b.is_ascii_graphic()) {
        return Err(AsmError::BadTextKey { line });
    }
    let mut text = [0u8; 3];
    text[..bytes.len()].copy_from_slice(bytes);
    Ok(text)
}
