//! Static 8085 instruction database.
//!
//! One [`InstructionEntry`] per mnemonic + operand shape, with the opcode
//! synthesis rule, byte length, T-state cost, and affected flags. The
//! mnemonic-keyed view serves the assembler and hover/completion hosts; a
//! flat 256-entry decode table derived from it serves the emulator and the
//! disassembler.

use std::str::FromStr;

use fxhash::FxHashMap;
use lazy_static::lazy_static;

/// 8-bit register operand. Discriminants are the 3-bit opcode fields,
/// with `M` (0b110) standing for the byte addressed by HL.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    M = 6,
    A = 7,
}

impl Reg {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Reg {
        match bits & 0b111 {
            0 => Reg::B,
            1 => Reg::C,
            2 => Reg::D,
            3 => Reg::E,
            4 => Reg::H,
            5 => Reg::L,
            6 => Reg::M,
            _ => Reg::A,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg::B => "B",
            Reg::C => "C",
            Reg::D => "D",
            Reg::E => "E",
            Reg::H => "H",
            Reg::L => "L",
            Reg::M => "M",
            Reg::A => "A",
        }
    }
}

impl FromStr for Reg {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(Reg::B),
            "C" => Ok(Reg::C),
            "D" => Ok(Reg::D),
            "E" => Ok(Reg::E),
            "H" => Ok(Reg::H),
            "L" => Ok(Reg::L),
            "M" => Ok(Reg::M),
            "A" => Ok(Reg::A),
            _ => Err(()),
        }
    }
}

/// Register pair operand. Discriminants are the 2-bit opcode fields;
/// `PSW` shares the `0b11` encoding with `SP` and is only meaningful for
/// PUSH/POP.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegPair {
    BC = 0,
    DE = 1,
    HL = 2,
    SP = 3,
    PSW = 4,
}

impl RegPair {
    pub fn bits(self) -> u8 {
        match self {
            RegPair::PSW => 3,
            other => other as u8,
        }
    }

    /// Assembly-source name: the 8085 names pairs by their high register.
    pub fn name(self) -> &'static str {
        match self {
            RegPair::BC => "B",
            RegPair::DE => "D",
            RegPair::HL => "H",
            RegPair::SP => "SP",
            RegPair::PSW => "PSW",
        }
    }

    /// Pair implied by a bare register letter in a pair operand slot.
    pub fn from_reg(reg: Reg) -> Option<RegPair> {
        match reg {
            Reg::B => Some(RegPair::BC),
            Reg::D => Some(RegPair::DE),
            Reg::H => Some(RegPair::HL),
            _ => None,
        }
    }
}

impl FromStr for RegPair {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BC" => Ok(RegPair::BC),
            "DE" => Ok(RegPair::DE),
            "HL" => Ok(RegPair::HL),
            "SP" => Ok(RegPair::SP),
            "PSW" => Ok(RegPair::PSW),
            _ => Err(()),
        }
    }
}

/// Canonical operand shape of a table entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Shape {
    None,
    Reg,
    RegReg,
    RegImm8,
    Pair,
    PairImm16,
    Imm8,
    Addr16,
    Port8,
}

/// Where folded operand bits land in the base opcode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fold {
    None,
    /// 3-bit register field at bits 5..3 (MVI, INR, DCR).
    Dst,
    /// 3-bit register field at bits 2..0 (ADD, ANA, ...).
    Src,
    /// Both fields (MOV).
    DstSrc,
    /// 2-bit register-pair field at bits 5..4.
    Pair,
    /// As `Pair`, but only BC/DE are encodable (LDAX, STAX).
    PairIndirect,
    /// RST vector at bits 5..3.
    Rst,
}

/// T-state cost; conditional branches carry both outcomes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cycles {
    Fixed(u8),
    Branch { taken: u8, not_taken: u8 },
}

impl Cycles {
    /// Cost when the branch condition is irrelevant or fails.
    pub fn base(self) -> u8 {
        match self {
            Cycles::Fixed(n) => n,
            Cycles::Branch { not_taken, .. } => not_taken,
        }
    }
}

/// Flag-effect masks, in the 8085 PSW bit positions.
pub mod flags {
    pub const S: u8 = 1 << 7;
    pub const Z: u8 = 1 << 6;
    pub const AC: u8 = 1 << 4;
    pub const P: u8 = 1 << 2;
    pub const CY: u8 = 1 << 0;

    pub const NONE: u8 = 0;
    pub const ALL: u8 = S | Z | AC | P | CY;
    /// INR/DCR leave carry untouched.
    pub const NO_CY: u8 = S | Z | AC | P;
    pub const CY_ONLY: u8 = CY;
}

#[derive(Clone, Copy, Debug)]
pub struct InstructionEntry {
    pub mnemonic: &'static str,
    pub shape: Shape,
    /// Base opcode with all folded fields zero.
    pub base: u8,
    pub fold: Fold,
    pub len: u8,
    pub cycles: Cycles,
    /// Override when a folded register field selects M.
    pub cycles_m: Option<u8>,
    /// Mask of flags the instruction may change.
    pub flags: u8,
    pub description: &'static str,
}

const fn op(
    mnemonic: &'static str,
    shape: Shape,
    base: u8,
    fold: Fold,
    len: u8,
    cycles: u8,
    flags: u8,
    description: &'static str,
) -> InstructionEntry {
    InstructionEntry {
        mnemonic,
        shape,
        base,
        fold,
        len,
        cycles: Cycles::Fixed(cycles),
        cycles_m: None,
        flags,
        description,
    }
}

const fn op_m(
    mnemonic: &'static str,
    shape: Shape,
    base: u8,
    fold: Fold,
    len: u8,
    cycles: u8,
    cycles_m: u8,
    flags: u8,
    description: &'static str,
) -> InstructionEntry {
    InstructionEntry {
        mnemonic,
        shape,
        base,
        fold,
        len,
        cycles: Cycles::Fixed(cycles),
        cycles_m: Some(cycles_m),
        flags,
        description,
    }
}

const fn branch(
    mnemonic: &'static str,
    base: u8,
    len: u8,
    taken: u8,
    not_taken: u8,
    description: &'static str,
) -> InstructionEntry {
    InstructionEntry {
        mnemonic,
        shape: if len == 1 { Shape::None } else { Shape::Addr16 },
        base,
        fold: Fold::None,
        len,
        cycles: Cycles::Branch { taken, not_taken },
        cycles_m: None,
        flags: flags::NONE,
        description,
    }
}

pub use table::ENTRIES;

/// The instruction database, one row per mnemonic + operand shape.
/// Lives in its own module so the shape/fold glob imports that keep the
/// rows readable stay out of the rest of the file.
mod table {
    use super::flags::{ALL, CY_ONLY, NONE, NO_CY};
    use super::Fold::{Dst, DstSrc, None as FNone, Pair as FPair, PairIndirect, Rst, Src};
    use super::Shape::*;
    use super::{branch, op, op_m, InstructionEntry};

    pub static ENTRIES: &[InstructionEntry] = &[
        // Data transfer
        op_m("MOV", RegReg, 0x40, DstSrc, 1, 4, 7, NONE, "Copy the source register into the destination register"),
        op_m("MVI", RegImm8, 0x06, Dst, 2, 7, 10, NONE, "Load a register with an immediate byte"),
        op("LXI", PairImm16, 0x01, FPair, 3, 10, NONE, "Load a register pair with an immediate 16-bit value"),
        op("LDA", Addr16, 0x3A, FNone, 3, 13, NONE, "Load the accumulator from a direct address"),
        op("STA", Addr16, 0x32, FNone, 3, 13, NONE, "Store the accumulator to a direct address"),
        op("LHLD", Addr16, 0x2A, FNone, 3, 16, NONE, "Load HL from two consecutive bytes at a direct address"),
        op("SHLD", Addr16, 0x22, FNone, 3, 16, NONE, "Store HL to two consecutive bytes at a direct address"),
        op("LDAX", Pair, 0x0A, PairIndirect, 1, 7, NONE, "Load the accumulator from the address in BC or DE"),
        op("STAX", Pair, 0x02, PairIndirect, 1, 7, NONE, "Store the accumulator to the address in BC or DE"),
        op("XCHG", None, 0xEB, FNone, 1, 4, NONE, "Exchange HL with DE"),
        // Arithmetic
        op_m("ADD", Reg, 0x80, Src, 1, 4, 7, ALL, "Add a register to the accumulator"),
        op_m("ADC", Reg, 0x88, Src, 1, 4, 7, ALL, "Add a register plus the carry flag to the accumulator"),
        op_m("SUB", Reg, 0x90, Src, 1, 4, 7, ALL, "Subtract a register from the accumulator"),
        op_m("SBB", Reg, 0x98, Src, 1, 4, 7, ALL, "Subtract a register and the borrow from the accumulator"),
        op("ADI", Imm8, 0xC6, FNone, 2, 7, ALL, "Add an immediate byte to the accumulator"),
        op("ACI", Imm8, 0xCE, FNone, 2, 7, ALL, "Add an immediate byte plus the carry flag to the accumulator"),
        op("SUI", Imm8, 0xD6, FNone, 2, 7, ALL, "Subtract an immediate byte from the accumulator"),
        op("SBI", Imm8, 0xDE, FNone, 2, 7, ALL, "Subtract an immediate byte and the borrow from the accumulator"),
        op_m("INR", Reg, 0x04, Dst, 1, 4, 10, NO_CY, "Increment a register; carry is unaffected"),
        op_m("DCR", Reg, 0x05, Dst, 1, 4, 10, NO_CY, "Decrement a register; carry is unaffected"),
        op("INX", Pair, 0x03, FPair, 1, 6, NONE, "Increment a register pair; no flags"),
        op("DCX", Pair, 0x0B, FPair, 1, 6, NONE, "Decrement a register pair; no flags"),
        op("DAD", Pair, 0x09, FPair, 1, 10, CY_ONLY, "Add a register pair to HL; only carry is affected"),
        op("DAA", None, 0x27, FNone, 1, 4, ALL, "Decimal-adjust the accumulator after BCD arithmetic"),
        // Logical
        op_m("ANA", Reg, 0xA0, Src, 1, 4, 7, ALL, "AND a register into the accumulator; carry cleared"),
        op_m("XRA", Reg, 0xA8, Src, 1, 4, 7, ALL, "XOR a register into the accumulator; carry cleared"),
        op_m("ORA", Reg, 0xB0, Src, 1, 4, 7, ALL, "OR a register into the accumulator; carry cleared"),
        op_m("CMP", Reg, 0xB8, Src, 1, 4, 7, ALL, "Compare a register with the accumulator; result discarded"),
        op("ANI", Imm8, 0xE6, FNone, 2, 7, ALL, "AND an immediate byte into the accumulator"),
        op("XRI", Imm8, 0xEE, FNone, 2, 7, ALL, "XOR an immediate byte into the accumulator"),
        op("ORI", Imm8, 0xF6, FNone, 2, 7, ALL, "OR an immediate byte into the accumulator"),
        op("CPI", Imm8, 0xFE, FNone, 2, 7, ALL, "Compare an immediate byte with the accumulator"),
        op("RLC", None, 0x07, FNone, 1, 4, CY_ONLY, "Rotate the accumulator left; bit 7 into carry and bit 0"),
        op("RRC", None, 0x0F, FNone, 1, 4, CY_ONLY, "Rotate the accumulator right; bit 0 into carry and bit 7"),
        op("RAL", None, 0x17, FNone, 1, 4, CY_ONLY, "Rotate the accumulator left through the carry flag"),
        op("RAR", None, 0x1F, FNone, 1, 4, CY_ONLY, "Rotate the accumulator right through the carry flag"),
        op("CMA", None, 0x2F, FNone, 1, 4, NONE, "Complement the accumulator; no flags"),
        op("CMC", None, 0x3F, FNone, 1, 4, CY_ONLY, "Complement the carry flag"),
        op("STC", None, 0x37, FNone, 1, 4, CY_ONLY, "Set the carry flag"),
        // Branch
        op("JMP", Addr16, 0xC3, FNone, 3, 10, NONE, "Jump unconditionally to a 16-bit address"),
        branch("JNZ", 0xC2, 3, 10, 7, "Jump if the zero flag is clear"),
        branch("JZ", 0xCA, 3, 10, 7, "Jump if the zero flag is set"),
        branch("JNC", 0xD2, 3, 10, 7, "Jump if the carry flag is clear"),
        branch("JC", 0xDA, 3, 10, 7, "Jump if the carry flag is set"),
        branch("JPO", 0xE2, 3, 10, 7, "Jump if parity is odd"),
        branch("JPE", 0xEA, 3, 10, 7, "Jump if parity is even"),
        branch("JP", 0xF2, 3, 10, 7, "Jump if the sign flag is clear"),
        branch("JM", 0xFA, 3, 10, 7, "Jump if the sign flag is set"),
        op("CALL", Addr16, 0xCD, FNone, 3, 18, NONE, "Push the return address and jump to a subroutine"),
        branch("CNZ", 0xC4, 3, 18, 9, "Call if the zero flag is clear"),
        branch("CZ", 0xCC, 3, 18, 9, "Call if the zero flag is set"),
        branch("CNC", 0xD4, 3, 18, 9, "Call if the carry flag is clear"),
        branch("CC", 0xDC, 3, 18, 9, "Call if the carry flag is set"),
        branch("CPO", 0xE4, 3, 18, 9, "Call if parity is odd"),
        branch("CPE", 0xEC, 3, 18, 9, "Call if parity is even"),
        branch("CP", 0xF4, 3, 18, 9, "Call if the sign flag is clear"),
        branch("CM", 0xFC, 3, 18, 9, "Call if the sign flag is set"),
        op("RET", None, 0xC9, FNone, 1, 10, NONE, "Pop the return address into PC"),
        branch("RNZ", 0xC0, 1, 12, 6, "Return if the zero flag is clear"),
        branch("RZ", 0xC8, 1, 12, 6, "Return if the zero flag is set"),
        branch("RNC", 0xD0, 1, 12, 6, "Return if the carry flag is clear"),
        branch("RC", 0xD8, 1, 12, 6, "Return if the carry flag is set"),
        branch("RPO", 0xE0, 1, 12, 6, "Return if parity is odd"),
        branch("RPE", 0xE8, 1, 12, 6, "Return if parity is even"),
        branch("RP", 0xF0, 1, 12, 6, "Return if the sign flag is clear"),
        branch("RM", 0xF8, 1, 12, 6, "Return if the sign flag is set"),
        op("RST", Imm8, 0xC7, Rst, 1, 12, NONE, "Push PC and jump to one of the eight restart vectors"),
        op("PCHL", None, 0xE9, FNone, 1, 6, NONE, "Copy HL into the program counter"),
        // Stack
        op("PUSH", Pair, 0xC5, FPair, 1, 12, NONE, "Push a register pair (or PSW) onto the stack"),
        op("POP", Pair, 0xC1, FPair, 1, 10, NONE, "Pop a register pair (or PSW) from the stack"),
        op("XTHL", None, 0xE3, FNone, 1, 16, NONE, "Exchange HL with the top of the stack"),
        op("SPHL", None, 0xF9, FNone, 1, 6, NONE, "Copy HL into the stack pointer"),
        // I/O and machine control
        op("IN", Port8, 0xDB, FNone, 2, 10, NONE, "Read a byte from an input port into the accumulator"),
        op("OUT", Port8, 0xD3, FNone, 2, 10, NONE, "Write the accumulator to an output port"),
        op("EI", None, 0xFB, FNone, 1, 4, NONE, "Enable interrupts after the next instruction"),
        op("DI", None, 0xF3, FNone, 1, 4, NONE, "Disable interrupts immediately"),
        op("HLT", None, 0x76, FNone, 1, 7, NONE, "Halt the processor until reset or interrupt"),
        op("NOP", None, 0x00, FNone, 1, 4, NONE, "No operation"),
        op("RIM", None, 0x20, FNone, 1, 4, NONE, "Read the interrupt mask and pending state into the accumulator"),
        op("SIM", None, 0x30, FNone, 1, 4, NONE, "Set the interrupt mask from the accumulator"),
    ];
}

/// One slot of the opcode-indexed decode table.
#[derive(Clone, Copy, Debug)]
pub struct Decode {
    pub entry: &'static InstructionEntry,
    pub len: u8,
    pub cycles: Cycles,
}

lazy_static! {
    /// Fast fetch-time decode, indexed directly by the opcode byte.
    /// `None` marks the ten undocumented holes in the 8085 map.
    pub static ref DECODE: [Option<Decode>; 256] = build_decode();

    static ref BY_MNEMONIC: FxHashMap<&'static str, Vec<&'static InstructionEntry>> = {
        let mut map: FxHashMap<&'static str, Vec<&'static InstructionEntry>> =
            FxHashMap::default();
        for entry in ENTRIES {
            map.entry(entry.mnemonic).or_default().push(entry);
        }
        map
    };
}

fn build_decode() -> [Option<Decode>; 256] {
    let mut table: [Option<Decode>; 256] = [None; 256];
    let mut place = |opcode: u8, entry: &'static InstructionEntry, uses_m: bool| {
        let cycles = match entry.cycles_m {
            Some(m) if uses_m => Cycles::Fixed(m),
            _ => entry.cycles,
        };
        debug_assert!(
            table[opcode as usize].is_none(),
            "opcode {opcode:#04X} synthesised twice"
        );
        table[opcode as usize] = Some(Decode {
            entry,
            len: entry.len,
            cycles,
        });
    };

    for entry in ENTRIES {
        match entry.fold {
            Fold::None => place(entry.base, entry, false),
            Fold::Dst => {
                for r in 0..8u8 {
                    place(entry.base | r << 3, entry, r == 6);
                }
            }
            Fold::Src => {
                for r in 0..8u8 {
                    place(entry.base | r, entry, r == 6);
                }
            }
            Fold::DstSrc => {
                for dst in 0..8u8 {
                    for src in 0..8u8 {
                        // MOV M,M would collide with HLT
                        if dst == 6 && src == 6 {
                            continue;
                        }
                        place(entry.base | dst << 3 | src, entry, dst == 6 || src == 6);
                    }
                }
            }
            Fold::Pair => {
                for rp in 0..4u8 {
                    place(entry.base | rp << 4, entry, false);
                }
            }
            Fold::PairIndirect => {
                for rp in 0..2u8 {
                    place(entry.base | rp << 4, entry, false);
                }
            }
            Fold::Rst => {
                for n in 0..8u8 {
                    place(entry.base | n << 3, entry, false);
                }
            }
        }
    }
    table
}

/// All table rows for a mnemonic, for hover/completion and shape matching.
/// Lookup is case-insensitive.
pub fn instruction_info(mnemonic: &str) -> Vec<&'static InstructionEntry> {
    BY_MNEMONIC
        .get(mnemonic.to_ascii_uppercase().as_str())
        .cloned()
        .unwrap_or_default()
}

pub fn is_mnemonic(word: &str) -> bool {
    BY_MNEMONIC.contains_key(word.to_ascii_uppercase().as_str())
}

/// All mnemonics in table order, for completion hosts.
pub fn mnemonics() -> impl Iterator<Item = &'static str> {
    let mut seen = ENTRIES.iter().map(|e| e.mnemonic).collect::<Vec<_>>();
    seen.dedup();
    seen.into_iter()
}

/// Text, size, and timing of the instruction at `addr`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Disassembly {
    pub text: String,
    pub len: u8,
    pub cycles: Cycles,
    pub description: &'static str,
}

/// Format a byte/word the way the assembler reads them back: hex with an
/// `H` suffix and a leading zero when the first digit is a letter.
pub fn hex8(value: u8) -> String {
    let digits = format!("{value:02X}");
    if digits.as_bytes()[0].is_ascii_alphabetic() {
        format!("0{digits}H")
    } else {
        format!("{digits}H")
    }
}

pub fn hex16(value: u16) -> String {
    let digits = format!("{value:04X}");
    if digits.as_bytes()[0].is_ascii_alphabetic() {
        format!("0{digits}H")
    } else {
        format!("{digits}H")
    }
}

/// Decode the instruction at `addr` into source-shaped text. Returns `None`
/// for the undocumented opcode holes.
pub fn disassemble_at(memory: &[u8; 0x10000], addr: u16) -> Option<Disassembly> {
    let opcode = memory[addr as usize];
    let decode = DECODE[opcode as usize]?;
    let entry = decode.entry;

    let byte_at = |offset: u16| memory[addr.wrapping_add(offset) as usize];
    let imm8 = byte_at(1);
    let imm16 = u16::from_le_bytes([byte_at(1), byte_at(2)]);

    let dst = Reg::from_bits(opcode >> 3);
    let src = Reg::from_bits(opcode);
    let pair = pair_operand(entry, opcode);

    let text = match (entry.shape, entry.fold) {
        (Shape::None, _) => entry.mnemonic.to_string(),
        (Shape::RegReg, _) => format!("{} {},{}", entry.mnemonic, dst.name(), src.name()),
        (Shape::RegImm8, _) => format!("{} {},{}", entry.mnemonic, dst.name(), hex8(imm8)),
        (Shape::Reg, Fold::Dst) => format!("{} {}", entry.mnemonic, dst.name()),
        (Shape::Reg, _) => format!("{} {}", entry.mnemonic, src.name()),
        (Shape::Pair, _) => format!("{} {}", entry.mnemonic, pair.name()),
        (Shape::PairImm16, _) => {
            format!("{} {},{}", entry.mnemonic, pair.name(), hex16(imm16))
        }
        (Shape::Imm8, Fold::Rst) => format!("{} {}", entry.mnemonic, (opcode >> 3) & 0b111),
        (Shape::Imm8, _) | (Shape::Port8, _) => {
            format!("{} {}", entry.mnemonic, hex8(imm8))
        }
        (Shape::Addr16, _) => format!("{} {}", entry.mnemonic, hex16(imm16)),
    };

    Some(Disassembly {
        text,
        len: decode.len,
        cycles: decode.cycles,
        description: entry.description,
    })
}

fn pair_operand(entry: &InstructionEntry, opcode: u8) -> RegPair {
    match (opcode >> 4) & 0b11 {
        0 => RegPair::BC,
        1 => RegPair::DE,
        2 => RegPair::HL,
        // PUSH/POP encode PSW where LXI-family encodes SP
        _ if matches!(entry.mnemonic, "PUSH" | "POP") => RegPair::PSW,
        _ => RegPair::SP,
    }
}
