//! The unified program address space.
//!
//! Three disjoint regions back program memory: the writable user program in
//! RAM, a set of read-only flash library slots, and the fixed built-in ROM
//! image. An address always names exactly one region; stepping never crosses
//! a region boundary implicitly, it wraps within the region and says so.
//!
//! Positions within a region run `0..=len`. Position 0 is the region's start
//! sentinel and resolves to NOP; instructions occupy positions `1..=len`,
//! two-word instructions take two consecutive cells and stepping never lands
//! on the second cell.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::NUM_LIB_SLOTS;
use crate::opcode::{self, Instruction, MultiCmd, Word};
use crate::ops;
use crate::rom;
use crate::{ExecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Ram,
    Lib(u8),
    Rom,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Ram => write!(f, "RAM"),
            Region::Lib(slot) => write!(f, "LIB{slot}"),
            Region::Rom => write!(f, "ROM"),
        }
    }
}

/// A region-tagged program location. Ordering is only meaningful between
/// addresses in the same region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramAddress {
    pub region: Region,
    pub step: u16,
}

impl ProgramAddress {
    pub const RAM_START: ProgramAddress = ProgramAddress {
        region: Region::Ram,
        step: 0,
    };

    /// Sentinel pushed as the return address for calls made from a ROM
    /// continuation rather than a concrete user-program location.
    pub const ROM_RETURN: ProgramAddress = ProgramAddress {
        region: Region::Rom,
        step: 0,
    };

    pub fn ram(step: u16) -> Self {
        ProgramAddress {
            region: Region::Ram,
            step,
        }
    }

    pub fn lib(slot: u8, step: u16) -> Self {
        ProgramAddress {
            region: Region::Lib(slot),
            step,
        }
    }

    pub fn rom(step: u16) -> Self {
        ProgramAddress {
            region: Region::Rom,
            step,
        }
    }
}

impl fmt::Display for ProgramAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:03}", self.region, self.step)
    }
}

/// Key used by label search: a numeric `LBL nn` or a short text `LBL'xyz'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKey {
    Numeric(u8),
    Text([u8; 3]),
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKey::Numeric(n) => write!(f, "{n:02}"),
            LabelKey::Text(text) => {
                let key: String = text
                    .iter()
                    .take_while(|&&b| b != 0)
                    .map(|&b| b as char)
                    .collect();
                write!(f, "'{key}'")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSpace {
    ram: Vec<Word>,
    libs: [Vec<Word>; NUM_LIB_SLOTS],
}

impl Default for ProgramSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramSpace {
    pub fn new() -> Self {
        Self {
            ram: Vec::new(),
            libs: Default::default(),
        }
    }

    fn cells(&self, region: Region) -> &[Word] {
        match region {
            Region::Ram => &self.ram,
            Region::Lib(slot) => self
                .libs
                .get(slot as usize)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            Region::Rom => rom::image(),
        }
    }

    pub fn region_len(&self, region: Region) -> u16 {
        self.cells(region).len() as u16
    }

    pub fn ram_len(&self) -> u16 {
        self.ram.len() as u16
    }

    pub fn ram_words(&self) -> &[Word] {
        &self.ram
    }

    pub fn library_words(&self, slot: u8) -> &[Word] {
        self.cells(Region::Lib(slot))
    }

    fn cell(&self, region: Region, step: u16) -> Option<Word> {
        if step == 0 {
            return None;
        }
        self.cells(region).get(step as usize - 1).copied()
    }

    /// First instruction position of a region: 1, or 0 for an empty region.
    pub fn first_step(&self, region: Region) -> u16 {
        if self.region_len(region) > 0 {
            1
        } else {
            0
        }
    }

    fn width_at(&self, region: Region, step: u16) -> u16 {
        match self.cell(region, step) {
            Some(word) => opcode::width_of(word) as u16,
            None => 1,
        }
    }

    /// Fetch and decode the instruction at `addr`. The start sentinel and
    /// any position outside the region resolve to NOP; a two-word
    /// instruction missing its payload cell resolves to `Illegal`.
    pub fn resolve(&self, addr: ProgramAddress) -> Instruction {
        match self.cell(addr.region, addr.step) {
            Some(word) => {
                let next = self.cell(addr.region, addr.step + 1);
                opcode::decode(word, next)
            }
            None => Instruction::Niladic(ops::NILADIC_NOP),
        }
    }

    /// Step to the next instruction. Wrapping past the region's end resets
    /// to the region's first instruction and reports `true`.
    pub fn step_forward(&self, addr: ProgramAddress) -> (ProgramAddress, bool) {
        let len = self.region_len(addr.region);
        let next = addr.step.saturating_add(self.width_at(addr.region, addr.step));
        if next > len {
            (
                ProgramAddress {
                    region: addr.region,
                    step: self.first_step(addr.region),
                },
                true,
            )
        } else {
            (
                ProgramAddress {
                    region: addr.region,
                    step: next,
                },
                false,
            )
        }
    }

    /// Step to the previous instruction start; never lands on the second
    /// cell of a two-word instruction. Wrapping below the first instruction
    /// resets to the region's last instruction and reports `true`.
    pub fn step_back(&self, addr: ProgramAddress) -> (ProgramAddress, bool) {
        if addr.step <= 1 {
            return (
                ProgramAddress {
                    region: addr.region,
                    step: self.last_start(addr.region),
                },
                true,
            );
        }
        let mut prev = 1u16;
        let mut pos = 1u16;
        while pos < addr.step {
            prev = pos;
            pos += self.width_at(addr.region, pos);
        }
        (
            ProgramAddress {
                region: addr.region,
                step: prev,
            },
            false,
        )
    }

    /// Last instruction start of a region (0 when empty).
    pub fn last_start(&self, region: Region) -> u16 {
        let len = self.region_len(region);
        if len == 0 {
            return 0;
        }
        let mut pos = 1u16;
        loop {
            let next = pos + self.width_at(region, pos);
            if next > len {
                return pos;
            }
            pos = next;
        }
    }

    fn matches_label(instr: &Instruction, key: LabelKey) -> bool {
        match (instr, key) {
            (
                Instruction::Arg {
                    cmd: opcode::ArgCmd::Lbl,
                    arg,
                    indirect: false,
                },
                LabelKey::Numeric(n),
            ) => *arg == n,
            (
                Instruction::Multi {
                    cmd: MultiCmd::LblText,
                    text,
                },
                LabelKey::Text(wanted),
            ) => *text == wanted,
            _ => false,
        }
    }

    /// Forward-then-wrap-around scan for a label within one region's search
    /// space, starting at `from` inclusive. Returns the label's address.
    pub fn find_label(&self, from: ProgramAddress, key: LabelKey) -> Option<ProgramAddress> {
        let region = from.region;
        let len = self.region_len(region);
        if len == 0 {
            return None;
        }
        let origin = if from.step == 0 { 1 } else { from.step };
        let mut pos = origin;
        let mut wrapped = false;
        loop {
            let addr = ProgramAddress { region, step: pos };
            if Self::matches_label(&self.resolve(addr), key) {
                return Some(addr);
            }
            let (next, did_wrap) = self.step_forward(addr);
            if did_wrap {
                if wrapped {
                    return None;
                }
                wrapped = true;
            }
            pos = next.step;
            if wrapped && pos >= origin {
                return None;
            }
        }
    }

    /// Catalog-order search: RAM, then each library slot, then ROM.
    pub fn find_label_global(&self, key: LabelKey) -> Option<ProgramAddress> {
        let mut regions = vec![Region::Ram];
        for slot in 0..NUM_LIB_SLOTS as u8 {
            regions.push(Region::Lib(slot));
        }
        regions.push(Region::Rom);
        regions.into_iter().find_map(|region| {
            self.find_label(
                ProgramAddress {
                    region,
                    step: self.first_step(region),
                },
                key,
            )
        })
    }

    // --- user program editing (host/editor surface, not instructions) ---

    pub fn clear_ram(&mut self) {
        self.ram.clear();
    }

    /// Append an instruction to the user program. `budget` is the number of
    /// free RAM-pool cells (pool minus call stack usage).
    pub fn append(&mut self, instr: &Instruction, budget: usize) -> Result<()> {
        let encoded = opcode::encode(instr);
        if self.ram.len() + encoded.width() > budget {
            return Err(ExecError::RamFull);
        }
        match encoded {
            opcode::Encoded::One(w) => self.ram.push(w),
            opcode::Encoded::Two(w0, w1) => {
                self.ram.push(w0);
                self.ram.push(w1);
            }
        }
        Ok(())
    }

    /// Insert an instruction before the instruction starting at `at_step`
    /// (or at the end when `at_step == len + 1`).
    pub fn insert(&mut self, at_step: u16, instr: &Instruction, budget: usize) -> Result<()> {
        if at_step == 0 || at_step > self.ram_len() + 1 {
            return Err(ExecError::Range);
        }
        let encoded = opcode::encode(instr);
        if self.ram.len() + encoded.width() > budget {
            return Err(ExecError::RamFull);
        }
        let idx = at_step as usize - 1;
        match encoded {
            opcode::Encoded::One(w) => self.ram.insert(idx, w),
            opcode::Encoded::Two(w0, w1) => {
                self.ram.insert(idx, w1);
                self.ram.insert(idx, w0);
            }
        }
        Ok(())
    }

    /// Delete the whole instruction starting at `at_step`.
    pub fn delete(&mut self, at_step: u16) -> Result<()> {
        if at_step == 0 || at_step > self.ram_len() {
            return Err(ExecError::Range);
        }
        let width = self.width_at(Region::Ram, at_step) as usize;
        let idx = at_step as usize - 1;
        self.ram.drain(idx..idx + width);
        Ok(())
    }

    pub fn load_ram(&mut self, words: Vec<Word>) {
        self.ram = words;
    }

    pub fn load_library(&mut self, slot: u8, words: Vec<Word>) {
        if let Some(lib) = self.libs.get_mut(slot as usize) {
            *lib = words;
        }
    }

    /// Copy the user program into a library slot (committed flash write).
    pub fn flash_save(&mut self, slot: u8) {
        if let Some(lib) = self.libs.get_mut(slot as usize) {
            *lib = self.ram.clone();
        }
    }

    /// Replace the user program with a library slot's contents.
    pub fn flash_recall(&mut self, slot: u8) -> Result<()> {
        let words = self
            .libs
            .get(slot as usize)
            .filter(|lib| !lib.is_empty())
            .cloned()
            .ok_or(ExecError::EmptyLibrary(slot))?;
        self.ram = words;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::ArgCmd;

    fn space_with(instrs: &[Instruction]) -> ProgramSpace {
        let mut space = ProgramSpace::new();
        for instr in instrs {
            space.append(instr, 512).unwrap();
        }
        space
    }

    fn lbl(n: u8) -> Instruction {
        Instruction::Arg {
            cmd: ArgCmd::Lbl,
            arg: n,
            indirect: false,
        }
    }

    fn text_lbl(text: &[u8; 3]) -> Instruction {
        Instruction::Multi {
            cmd: MultiCmd::LblText,
            text: *text,
        }
    }

    #[test]
    fn sentinel_resolves_to_nop() {
        let space = space_with(&[lbl(0)]);
        assert_eq!(
            space.resolve(ProgramAddress::RAM_START),
            Instruction::Niladic(ops::NILADIC_NOP)
        );
    }

    #[test]
    fn forward_wrap_resets_to_first_instruction() {
        let space = space_with(&[lbl(0), Instruction::Niladic(0)]);
        let last = ProgramAddress::ram(space.last_start(Region::Ram));
        let (next, wrapped) = space.step_forward(last);
        assert!(wrapped);
        assert_eq!(next, ProgramAddress::ram(1));
    }

    #[test]
    fn stepping_honors_two_word_instructions() {
        let space = space_with(&[lbl(0), text_lbl(b"AB\0"), Instruction::Niladic(0)]);
        // Layout: step 1 = LBL, steps 2-3 = text label, step 4 = NOP.
        let (next, wrapped) = space.step_forward(ProgramAddress::ram(2));
        assert!(!wrapped);
        assert_eq!(next.step, 4);
        let (prev, wrapped) = space.step_back(ProgramAddress::ram(4));
        assert!(!wrapped);
        assert_eq!(prev.step, 2);
    }

    #[test]
    fn back_wrap_resets_to_last_instruction() {
        let space = space_with(&[lbl(0), Instruction::Niladic(0)]);
        let (prev, wrapped) = space.step_back(ProgramAddress::ram(1));
        assert!(wrapped);
        assert_eq!(prev.step, 2);
    }

    #[test]
    fn empty_region_wraps_in_place() {
        let space = ProgramSpace::new();
        let (next, wrapped) = space.step_forward(ProgramAddress::RAM_START);
        assert!(wrapped);
        assert_eq!(next, ProgramAddress::RAM_START);
        assert_eq!(space.region_len(Region::Lib(0)), 0);
        let (next, wrapped) = space.step_forward(ProgramAddress::lib(0, 0));
        assert!(wrapped);
        assert_eq!(next.step, 0);
    }

    #[test]
    fn label_search_wraps_around() {
        let space = space_with(&[lbl(7), Instruction::Niladic(0), lbl(9)]);
        // Start past LBL 07; the scan wraps and still finds it.
        let found = space
            .find_label(ProgramAddress::ram(2), LabelKey::Numeric(7))
            .unwrap();
        assert_eq!(found.step, 1);
        assert!(space
            .find_label(ProgramAddress::ram(1), LabelKey::Numeric(42))
            .is_none());
    }

    #[test]
    fn global_search_prefers_ram_then_libraries() {
        let mut space = space_with(&[lbl(5)]);
        let mut lib_prog = ProgramSpace::new();
        lib_prog.append(&lbl(5), 512).unwrap();
        lib_prog.append(&text_lbl(b"FN\0"), 512).unwrap();
        space.load_library(1, lib_prog.ram_words().to_vec());

        let found = space.find_label_global(LabelKey::Numeric(5)).unwrap();
        assert_eq!(found.region, Region::Ram);
        let found = space.find_label_global(LabelKey::Text(*b"FN\0")).unwrap();
        assert_eq!(found.region, Region::Lib(1));
    }

    #[test]
    fn delete_removes_whole_instruction() {
        let mut space = space_with(&[lbl(0), text_lbl(b"AB\0"), Instruction::Niladic(0)]);
        assert_eq!(space.ram_len(), 4);
        space.delete(2).unwrap();
        assert_eq!(space.ram_len(), 2);
        assert_eq!(
            space.resolve(ProgramAddress::ram(2)),
            Instruction::Niladic(0)
        );
    }

    #[test]
    fn append_respects_the_budget() {
        let mut space = ProgramSpace::new();
        space.append(&Instruction::Niladic(0), 1).unwrap();
        assert_eq!(
            space.append(&Instruction::Niladic(0), 1),
            Err(ExecError::RamFull)
        );
    }
}
