//! The two-pass assembler.
//!
//! Pass 1 walks the statement list assigning addresses and filling the
//! symbol table. Pass 2 walks it again emitting bytes, resolving symbolic
//! operands, and building the listing and both source maps. Diagnostics
//! accumulate across both passes; assembly always produces a [`Program`],
//! with best-effort memory contents when errors are present.

use fxhash::FxHashMap;

use crate::error::{self, Diagnostic};
use crate::isa::{self, Fold, InstructionEntry, Reg, RegPair, Shape};
use crate::parser::{self, Expr, Operand, Statement, StmtKind};
use crate::span::Span;
use crate::symbol::{Symbol, SymbolTable};
use crate::lexer::DirKind;

pub const MEMORY_SIZE: usize = 0x10000;

/// One row of the human-readable listing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ListingRow {
    pub addr: u16,
    pub bytes: Vec<u8>,
    pub line: u32,
    pub text: String,
}

/// Immutable product of one assembly: the memory image plus everything a
/// host needs to map between source and addresses.
pub struct Program {
    pub memory: Box<[u8; MEMORY_SIZE]>,
    /// First PC, from the first ORG (defaults to 0000H).
    pub origin: u16,
    pub symbols: SymbolTable,
    /// Source line -> (first address, emitted byte count).
    pub line_to_addr: FxHashMap<u32, (u16, u16)>,
    /// First byte of each emitted instruction -> source line.
    pub addr_to_line: FxHashMap<u16, u32>,
    pub listing: Vec<ListingRow>,
    pub diagnostics: Vec<Diagnostic>,
    source: String,
}

impl Program {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render every diagnostic against the source, worst first.
    pub fn reports(&self) -> Vec<miette::Report> {
        self.diagnostics
            .iter()
            .map(|d| d.to_report(&self.source))
            .collect()
    }

    /// Symbols defined or referenced on a source line.
    pub fn symbols_at(&self, line: u32) -> Vec<&Symbol> {
        self.symbols
            .iter()
            .filter(|sym| {
                sym.defined_at.line() == line
                    || sym.references.iter().any(|span| span.line() == line)
            })
            .collect()
    }

    pub fn symbol_for_address(&self, addr: u16) -> Option<&Symbol> {
        self.symbols.iter().find(|sym| sym.value == addr)
    }

    pub fn address_for_label(&self, name: &str) -> Option<u16> {
        self.symbols.get(name).map(|sym| sym.value)
    }

    /// Addresses of emitted instruction first-bytes, for coverage ratios.
    pub fn instruction_addresses(&self) -> impl Iterator<Item = u16> + '_ {
        self.addr_to_line.keys().copied()
    }
}

/// Assemble source text. Never fails: all problems land in
/// [`Program::diagnostics`].
pub fn assemble(source: &str) -> Program {
    let (statements, diagnostics) = parser::parse(source);
    Assembler::new(source, diagnostics).run(&statements)
}

enum LookupError {
    Unknown,
    BadOperand,
}

struct Assembler {
    memory: Box<[u8; MEMORY_SIZE]>,
    written: Box<[bool; MEMORY_SIZE]>,
    symbols: SymbolTable,
    diagnostics: Vec<Diagnostic>,
    line_to_addr: FxHashMap<u32, (u16, u16)>,
    addr_to_line: FxHashMap<u16, u32>,
    listing: Vec<ListingRow>,
    origin: Option<u16>,
    /// Location counter. Kept wider than 16 bits to catch overflow.
    lc: u32,
    overflow_reported: bool,
    source_lines: Vec<String>,
    source: String,
}

impl Assembler {
    fn new(source: &str, diagnostics: Vec<Diagnostic>) -> Self {
        Assembler {
            memory: vec![0u8; MEMORY_SIZE].into_boxed_slice().try_into().unwrap(),
            written: vec![false; MEMORY_SIZE].into_boxed_slice().try_into().unwrap(),
            symbols: SymbolTable::default(),
            diagnostics,
            line_to_addr: FxHashMap::default(),
            addr_to_line: FxHashMap::default(),
            listing: Vec::new(),
            origin: None,
            lc: 0,
            overflow_reported: false,
            source_lines: source.lines().map(str::to_string).collect(),
            source: source.to_string(),
        }
    }

    fn run(mut self, statements: &[Statement]) -> Program {
        self.pass1(statements);
        self.pass2(statements);
        Program {
            memory: self.memory,
            origin: self.origin.unwrap_or(0),
            symbols: self.symbols,
            line_to_addr: self.line_to_addr,
            addr_to_line: self.addr_to_line,
            listing: self.listing,
            diagnostics: self.diagnostics,
            source: self.source,
        }
    }

    fn report(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    fn addr(&self) -> u16 {
        (self.lc & 0xFFFF) as u16
    }

    fn advance(&mut self, bytes: u32, span: Span) {
        self.lc += bytes;
        if self.lc > 0xFFFF + 1 && !self.overflow_reported {
            self.overflow_reported = true;
            self.report(error::asm_location_overflow(span));
        }
    }

    // ------------------------------------------------------------------
    // Pass 1: address assignment and symbol collection

    fn pass1(&mut self, statements: &[Statement]) {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::LabelDef { name } => {
                    let addr = self.addr();
                    self.define(name, addr, stmt.span);
                }
                StmtKind::Equ { name, value } => {
                    // Binds a constant; the location counter does not move
                    let resolved = self.eval(value, true).unwrap_or(0);
                    self.define(name, resolved, stmt.span);
                }
                StmtKind::Directive { kind, operands } => {
                    if self.directive_pass1(*kind, operands, stmt) {
                        break; // END
                    }
                }
                StmtKind::Instruction { mnemonic, operands } => {
                    let size = match match_entry(mnemonic, operands) {
                        Ok(entry) => entry.len as u32,
                        Err(LookupError::Unknown) => {
                            self.report(error::asm_unknown_mnemonic(stmt.span, mnemonic));
                            // Assume 3 bytes so later addresses stay stable
                            3
                        }
                        Err(LookupError::BadOperand) => {
                            self.report(error::asm_bad_operand(stmt.span, mnemonic));
                            3
                        }
                    };
                    self.advance(size, stmt.span);
                }
            }
        }
    }

    /// Returns true on END.
    fn directive_pass1(&mut self, kind: DirKind, operands: &[Operand], stmt: &Statement) -> bool {
        match kind {
            DirKind::Org => {
                if let Some(value) = self.single_value(operands, stmt, true) {
                    self.lc = value as u32;
                    if self.origin.is_none() {
                        self.origin = Some(value);
                    }
                }
            }
            DirKind::Ds => {
                if let Some(value) = self.single_value(operands, stmt, true) {
                    self.advance(value as u32, stmt.span);
                }
            }
            DirKind::Db => match db_size(operands) {
                Some(size) => self.advance(size, stmt.span),
                None => self.report(error::asm_bad_operand(stmt.span, "DB")),
            },
            DirKind::End => return true,
            // EQU is parsed into StmtKind::Equ
            DirKind::Equ => self.report(error::asm_bad_operand(stmt.span, "EQU")),
        }
        false
    }

    // ------------------------------------------------------------------
    // Pass 2: emission

    fn pass2(&mut self, statements: &[Statement]) {
        self.lc = 0;
        self.overflow_reported = true; // already reported in pass 1
        for stmt in statements {
            match &stmt.kind {
                StmtKind::LabelDef { .. } | StmtKind::Equ { .. } => {}
                StmtKind::Directive { kind, operands } => {
                    if self.directive_pass2(*kind, operands, stmt) {
                        break;
                    }
                }
                StmtKind::Instruction { mnemonic, operands } => {
                    self.emit_instruction(mnemonic, operands, stmt);
                }
            }
        }
    }

    fn directive_pass2(&mut self, kind: DirKind, operands: &[Operand], stmt: &Statement) -> bool {
        match kind {
            DirKind::Org => {
                // Diagnosed in pass 1; silently re-applied here
                if let Some(value) = self.single_value(operands, stmt, false) {
                    self.lc = value as u32;
                }
            }
            DirKind::Ds => {
                let start = self.addr();
                if let Some(value) = self.single_value(operands, stmt, false) {
                    self.lc += value as u32;
                }
                // A DS region reserves space without emitting bytes
                self.line_to_addr.insert(stmt.line, (start, 0));
                self.push_listing(start, Vec::new(), stmt.line);
            }
            DirKind::Db => {
                // Malformed operand lists were diagnosed in pass 1 and
                // consumed no space there; mirror that here
                if db_size(operands).is_none() {
                    return false;
                }
                let start = self.addr();
                let mut bytes = Vec::new();
                for operand in operands {
                    match operand {
                        Operand::Str(data, _) => bytes.extend_from_slice(data),
                        Operand::Expr(expr) => {
                            let value = self.eval(expr, true).unwrap_or(0);
                            if value > 0xFF && matches!(expr, Expr::Num(..)) {
                                self.report(error::asm_value_out_of_range(
                                    expr.span(),
                                    value,
                                    0xFF,
                                ));
                            }
                            // Symbols contribute their low byte
                            bytes.push(value as u8);
                        }
                        _ => {}
                    }
                }
                for byte in &bytes {
                    self.write(*byte, stmt.span);
                }
                self.line_to_addr.insert(stmt.line, (start, bytes.len() as u16));
                self.push_listing(start, bytes, stmt.line);
            }
            DirKind::End => return true,
            DirKind::Equ => {}
        }
        false
    }

    fn emit_instruction(&mut self, mnemonic: &str, operands: &[Operand], stmt: &Statement) {
        let entry = match match_entry(mnemonic, operands) {
            Ok(entry) => entry,
            // Diagnosed in pass 1; mirror its 3-byte assumption and move on
            Err(_) => {
                self.lc += 3;
                return;
            }
        };

        let start = self.addr();
        let mut bytes: Vec<u8> = Vec::with_capacity(entry.len as usize);
        bytes.push(self.opcode_for(entry, operands));

        match entry.shape {
            Shape::RegImm8 => {
                let value = self.operand_value(&operands[1], 0xFF);
                bytes.push(value as u8);
            }
            Shape::Imm8 if entry.fold == Fold::Rst => {}
            Shape::Imm8 | Shape::Port8 => {
                let value = self.operand_value(&operands[0], 0xFF);
                bytes.push(value as u8);
            }
            Shape::PairImm16 => {
                let value = self.operand_value(&operands[1], 0xFFFF);
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            Shape::Addr16 => {
                let value = self.operand_value(&operands[0], 0xFFFF);
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            Shape::None | Shape::Reg | Shape::RegReg | Shape::Pair => {}
        }

        debug_assert_eq!(bytes.len(), entry.len as usize);
        for byte in &bytes {
            self.write(*byte, stmt.span);
        }
        self.line_to_addr.insert(stmt.line, (start, bytes.len() as u16));
        self.addr_to_line.insert(start, stmt.line);
        self.push_listing(start, bytes, stmt.line);
    }

    /// Fold register/pair/vector bits into the base opcode.
    fn opcode_for(&mut self, entry: &InstructionEntry, operands: &[Operand]) -> u8 {
        match entry.fold {
            Fold::None => entry.base,
            Fold::Dst => entry.base | reg_of(&operands[0]).bits() << 3,
            Fold::Src => entry.base | reg_of(&operands[0]).bits(),
            Fold::DstSrc => {
                entry.base | reg_of(&operands[0]).bits() << 3 | reg_of(&operands[1]).bits()
            }
            Fold::Pair | Fold::PairIndirect => {
                entry.base | pair_of(&operands[0]).map_or(0, RegPair::bits) << 4
            }
            Fold::Rst => {
                let vector = self.operand_value(&operands[0], 7);
                entry.base | ((vector as u8) & 0b111) << 3
            }
        }
    }

    /// Evaluate an operand expression and range-check it. Out-of-range
    /// values are diagnosed and truncated; unresolved symbols become 0.
    fn operand_value(&mut self, operand: &Operand, limit: u16) -> u16 {
        let Operand::Expr(expr) = operand else {
            return 0;
        };
        let value = self.eval(expr, true).unwrap_or(0);
        if value > limit {
            self.report(error::asm_value_out_of_range(expr.span(), value, limit));
            return value & limit;
        }
        value
    }

    /// `record` controls both reference tracking and undefined-symbol
    /// diagnostics, so pass 2 can re-read pass-1 operands silently.
    fn eval(&mut self, expr: &Expr, record: bool) -> Option<u16> {
        match expr {
            Expr::Num(value, _) => Some(*value),
            Expr::Sym(name, span) => {
                let resolved = if record {
                    self.symbols.resolve(name, *span)
                } else {
                    self.symbols.get(name).map(|sym| sym.value)
                };
                if resolved.is_none() && record {
                    self.report(error::asm_undefined_symbol(*span, name));
                }
                resolved
            }
        }
    }

    fn single_value(&mut self, operands: &[Operand], stmt: &Statement, record: bool) -> Option<u16> {
        match operands {
            [Operand::Expr(expr)] => self.eval(expr, record),
            _ => {
                if record {
                    self.report(error::asm_bad_operand(stmt.span, directive_name(stmt)));
                }
                None
            }
        }
    }

    fn define(&mut self, name: &str, value: u16, span: Span) {
        if let Err(first) = self.symbols.define(name, value, span) {
            self.report(error::asm_duplicate_symbol(span, name, first));
        }
    }

    fn write(&mut self, byte: u8, span: Span) {
        let addr = self.addr();
        // Different-value overlap warns; same-value overlap is silent
        if self.written[addr as usize] && self.memory[addr as usize] != byte {
            self.report(error::asm_origin_overlap(span, addr));
        }
        self.memory[addr as usize] = byte;
        self.written[addr as usize] = true;
        self.lc += 1;
    }

    fn push_listing(&mut self, addr: u16, bytes: Vec<u8>, line: u32) {
        let text = self
            .source_lines
            .get(line as usize - 1)
            .cloned()
            .unwrap_or_default();
        self.listing.push(ListingRow {
            addr,
            bytes,
            line,
            text,
        });
    }
}

fn directive_name(stmt: &Statement) -> &'static str {
    match &stmt.kind {
        StmtKind::Directive { kind, .. } => match kind {
            DirKind::Org => "ORG",
            DirKind::Db => "DB",
            DirKind::Ds => "DS",
            DirKind::Equ => "EQU",
            DirKind::End => "END",
        },
        _ => "directive",
    }
}

fn db_size(operands: &[Operand]) -> Option<u32> {
    if operands.is_empty() {
        return None;
    }
    let mut size = 0u32;
    for operand in operands {
        size += match operand {
            Operand::Str(bytes, _) => bytes.len() as u32,
            Operand::Expr(_) => 1,
            _ => return None,
        };
    }
    Some(size)
}

fn reg_of(operand: &Operand) -> Reg {
    match operand {
        Operand::Reg(reg, _) => *reg,
        _ => Reg::B,
    }
}

/// A bare B/D/H in a pair slot names its pair, matching classic 8085
/// source conventions (`LXI H,...`, `PUSH B`).
fn pair_of(operand: &Operand) -> Option<RegPair> {
    match operand {
        Operand::Pair(pair, _) => Some(*pair),
        Operand::Reg(reg, _) => RegPair::from_reg(*reg),
        _ => None,
    }
}

fn match_entry(
    mnemonic: &str,
    operands: &[Operand],
) -> Result<&'static InstructionEntry, LookupError> {
    let entries = isa::instruction_info(mnemonic);
    if entries.is_empty() {
        return Err(LookupError::Unknown);
    }
    entries
        .into_iter()
        .find(|entry| operands_fit(entry, operands))
        .ok_or(LookupError::BadOperand)
}

fn operands_fit(entry: &InstructionEntry, operands: &[Operand]) -> bool {
    match entry.shape {
        Shape::None => operands.is_empty(),
        Shape::Reg => matches!(operands, [Operand::Reg(..)]),
        Shape::RegReg => match operands {
            // MOV M,M does not exist; its encoding is HLT
            [Operand::Reg(a, _), Operand::Reg(b, _)] => !(*a == Reg::M && *b == Reg::M),
            _ => false,
        },
        Shape::RegImm8 => matches!(operands, [Operand::Reg(..), Operand::Expr(_)]),
        Shape::Pair => match operands {
            [op] => pair_of(op).is_some_and(|pair| pair_allowed(entry, pair)),
            _ => false,
        },
        Shape::PairImm16 => match operands {
            [op, Operand::Expr(_)] => pair_of(op).is_some_and(|pair| pair_allowed(entry, pair)),
            _ => false,
        },
        Shape::Imm8 | Shape::Addr16 | Shape::Port8 => {
            matches!(operands, [Operand::Expr(_)])
        }
    }
}

fn pair_allowed(entry: &InstructionEntry, pair: RegPair) -> bool {
    match entry.fold {
        // LDAX/STAX can only address through BC or DE
        Fold::PairIndirect => matches!(pair, RegPair::BC | RegPair::DE),
        _ if matches!(entry.mnemonic, "PUSH" | "POP") => pair != RegPair::SP,
        _ => pair != RegPair::PSW,
    }
}
