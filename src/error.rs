use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity as MietteSeverity};

use crate::span::Span;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single finding from the lexer, parser, or either assembler pass.
///
/// Assembly never aborts on one of these; they accumulate on the produced
/// [`Program`](crate::assembler::Program) so hosts can render all of them.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable slug in `pass::kind` form, e.g. `asm::undefined_symbol`.
    pub code: &'static str,
    pub message: String,
    /// Short text attached to the span marker.
    pub label: &'static str,
    pub help: &'static str,
    pub span: Span,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render into a miette report against the source it was produced from.
    pub fn to_report(&self, src: &str) -> Report {
        let severity = match self.severity {
            Severity::Error => MietteSeverity::Error,
            Severity::Warning => MietteSeverity::Warning,
            Severity::Info => MietteSeverity::Advice,
        };
        miette!(
            severity = severity,
            code = self.code,
            help = self.help,
            labels = vec![LabeledSpan::at(self.span, self.label)],
            "{}",
            self.message
        )
        .with_source_code(src.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(
            f,
            "{}:{}: {severity}[{}]: {}",
            self.span.line(),
            self.span.col(),
            self.code,
            self.message
        )
    }
}

// Lexer diagnostics

pub fn lex_unterminated_str(span: Span) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "lex::str_lit",
        message: "Encountered an unterminated string literal".into(),
        label: "unterminated literal",
        help: "close string literals with a matching quote character",
        span,
    }
}

pub fn lex_bad_digit(span: Span, lit: &str, radix: u32) -> Diagnostic {
    let base = match radix {
        2 => "binary",
        8 => "octal",
        10 => "decimal",
        _ => "hex",
    };
    Diagnostic {
        severity: Severity::Error,
        code: "lex::bad_lit",
        message: format!("Numeric literal `{lit}` has digits outside its {base} radix"),
        label: "incorrect literal",
        help: "the radix suffix is one of H, O, B, or D; plain digits are decimal",
        span,
    }
}

pub fn lex_value_too_large(span: Span, lit: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "lex::bad_lit",
        message: format!("Numeric literal `{lit}` does not fit in 16 bits"),
        label: "oversized literal",
        help: "values from 0 to 0FFFFH are allowed",
        span,
    }
}

pub fn lex_stray_char(span: Span, ch: char) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "lex::unknown",
        message: format!("Stray `{ch}` in source"),
        label: "unknown token",
        help: "only instructions, directives, labels, registers, and literals are allowed",
        span,
    }
}

// Parser diagnostics

pub fn parse_unexpected(span: Span, expected: &str, found: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "parse::unexpected_token",
        message: format!("Expected {expected}, found {found}"),
        label: "unexpected token",
        help: "check the operands allowed for this instruction",
        span,
    }
}

pub fn parse_missing_operand(span: Span, mnemonic: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "parse::missing_operand",
        message: format!("`{mnemonic}` is missing an operand"),
        label: "operand required here",
        help: "check the operand count for this instruction or directive",
        span,
    }
}

pub fn parse_extra_operand(span: Span) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "parse::extra_operand",
        message: "Trailing tokens after a complete statement".into(),
        label: "extra operand",
        help: "check the operand count for this instruction or directive",
        span,
    }
}

// Assembler diagnostics

pub fn asm_unknown_mnemonic(span: Span, mnemonic: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "asm::unknown_mnemonic",
        message: format!("`{mnemonic}` is not an 8085 instruction or directive"),
        label: "unknown mnemonic",
        help: "see the instruction reference for the full mnemonic list",
        span,
    }
}

pub fn asm_bad_operand(span: Span, mnemonic: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "asm::bad_operand",
        message: format!("Operands do not match any form of `{mnemonic}`"),
        label: "invalid operands",
        help: "check the addressing modes this instruction supports",
        span,
    }
}

pub fn asm_duplicate_symbol(span: Span, name: &str, first: Span) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "asm::duplicate_symbol",
        message: format!(
            "Symbol `{name}` is already defined on line {}",
            first.line()
        ),
        label: "redefinition",
        help: "labels and EQU names may only be defined once per file",
        span,
    }
}

pub fn asm_undefined_symbol(span: Span, name: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "asm::undefined_symbol",
        message: format!("Symbol `{name}` is never defined"),
        label: "undefined symbol",
        help: "define it with a label or an EQU before use",
        span,
    }
}

pub fn asm_value_out_of_range(span: Span, value: u16, limit: u16) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "asm::value_out_of_range",
        message: format!("Value {value:#06X} does not fit (maximum {limit:#06X})"),
        label: "out of range",
        help: "immediate bytes and ports take 0..=0FFH; RST takes 0..=7",
        span,
    }
}

pub fn asm_origin_overlap(span: Span, addr: u16) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        code: "asm::origin_overlap",
        message: format!("Overwriting already-emitted byte at {addr:#06X} with a different value"),
        label: "overlapping emission",
        help: "an earlier ORG region already produced different bytes here",
        span,
    }
}

pub fn asm_location_overflow(span: Span) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        code: "asm::location_overflow",
        message: "Location counter advanced past 0FFFFH".into(),
        label: "overflows memory",
        help: "the 8085 address space ends at 0FFFFH",
        span,
    }
}
