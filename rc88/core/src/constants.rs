//! Machine geometry shared across the core.

/// Addressable global registers R00..R99.
pub const NUM_GLOBAL_REGISTERS: usize = 100;

/// Physical stack storage; the visible window is 4 or 8 levels.
pub const MAX_STACK_DEPTH: usize = 8;

/// User flags 00..99 plus the named system flags below.
pub const NUM_FLAGS: usize = 104;
pub const FLAG_CARRY: u8 = 101;
pub const FLAG_OVERFLOW: u8 = 102;
/// When set, domain faults in operation handlers signal an error instead of
/// producing a quiet NaN.
pub const FLAG_TRAP: u8 = 103;

/// Flash-resident library partitions.
pub const NUM_LIB_SLOTS: usize = 4;

/// RAM cells shared between the user program and the call stack. One unit per
/// program cell, one per return address, one per frame marker or local slot.
pub const RAM_POOL_UNITS: usize = 512;

/// Upper bound on `LOCR` slot counts.
pub const MAX_LOCAL_SLOTS: u8 = 16;

/// Register-argument address space: 0..=99 numbered, 100..=109 stack and
/// shadow names, 112..=127 local slots.
pub const REG_ARG_MAX: u8 = 127;
pub const STACK_REG_BASE: u8 = 100;
pub const LASTX_REG: u8 = 108;
pub const ALT_REG: u8 = 109;
pub const LOCAL_REG_BASE: u8 = 112;

/// Numeric labels run 00..=99.
pub const MAX_NUMERIC_LABEL: u8 = 99;
