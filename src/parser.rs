use std::iter::Peekable;
use std::vec::IntoIter;

use crate::error::{self, Diagnostic};
use crate::isa::{Reg, RegPair};
use crate::lexer::{self, DirKind, Token, TokenKind};
use crate::span::Span;

/// An operand expression: a literal value or a symbolic reference, resolved
/// against the symbol table during assembly.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expr {
    Num(u16, Span),
    Sym(String, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Num(_, span) | Expr::Sym(_, span) => *span,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Reg, Span),
    Pair(RegPair, Span),
    Expr(Expr),
    /// String bytes; only DB accepts these.
    Str(Vec<u8>, Span),
}

impl Operand {
    pub fn span(&self) -> Span {
        match self {
            Operand::Reg(_, span) | Operand::Pair(_, span) | Operand::Str(_, span) => *span,
            Operand::Expr(expr) => expr.span(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StmtKind {
    LabelDef {
        name: String,
    },
    Directive {
        kind: DirKind,
        operands: Vec<Operand>,
    },
    /// `NAME EQU expr` — binds a constant without advancing the location
    /// counter, so it gets its own statement form.
    Equ {
        name: String,
        value: Expr,
    },
    Instruction {
        mnemonic: String,
        operands: Vec<Operand>,
    },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Statement {
    pub kind: StmtKind,
    pub span: Span,
    pub line: u32,
}

/// Transforms source into a statement list. Lines that fail to lex or parse
/// contribute a diagnostic instead of a statement; parsing always reaches
/// the end of the file.
pub fn parse(src: &str) -> (Vec<Statement>, Vec<Diagnostic>) {
    let (lines, mut diagnostics) = lexer::tokenize(src);
    let mut statements = Vec::new();

    for (idx, tokens) in lines.into_iter().enumerate() {
        let line = idx as u32 + 1;
        match parse_line(tokens, line) {
            Ok(mut stmts) => statements.append(&mut stmts),
            Err(diag) => diagnostics.push(diag),
        }
    }

    (statements, diagnostics)
}

fn line_span(tokens: &[Token]) -> Span {
    tokens
        .iter()
        .fold(Span::dummy(), |acc, tok| acc.join(tok.span))
}

/// A line is `[label:] [directive | instruction] [; comment]`, or an EQU
/// binding `NAME [:] EQU expr`.
fn parse_line(tokens: Vec<Token>, line: u32) -> Result<Vec<Statement>, Diagnostic> {
    if tokens.is_empty() {
        return Ok(vec![]);
    }
    let span = line_span(&tokens);
    let mut stmts = Vec::new();
    let mut toks = tokens.into_iter().peekable();

    // Leading `name:` or `name EQU`
    let mut label: Option<(String, Span)> = None;
    if let Some(TokenKind::Ident(_)) = toks.peek().map(|t| &t.kind) {
        let tok = toks.next().unwrap();
        let name = match tok.kind {
            TokenKind::Ident(name) => name,
            _ => unreachable!(),
        };
        match toks.peek().map(|t| &t.kind) {
            Some(TokenKind::Colon) => {
                toks.next();
                label = Some((name, tok.span));
            }
            Some(TokenKind::Directive(DirKind::Equ)) => {
                toks.next();
                return parse_equ(name, toks, span, line);
            }
            // Unknown mnemonic position: parse it like an instruction and
            // let the assembler report it, keeping later addresses stable
            _ => {
                stmts.push(Statement {
                    kind: StmtKind::Instruction {
                        mnemonic: name,
                        operands: parse_operands(&mut toks, &tok.span)?,
                    },
                    span,
                    line,
                });
                return Ok(stmts);
            }
        }
    }

    if let Some((name, name_span)) = label {
        // `name: EQU expr` binds the label name instead
        if let Some(TokenKind::Directive(DirKind::Equ)) = toks.peek().map(|t| &t.kind) {
            toks.next();
            return parse_equ(name, toks, span, line);
        }
        stmts.push(Statement {
            kind: StmtKind::LabelDef { name },
            span: name_span,
            line,
        });
    }

    let Some(head) = toks.next() else {
        return Ok(stmts);
    };

    let kind = match head.kind {
        TokenKind::Mnemonic(mnemonic) => StmtKind::Instruction {
            mnemonic,
            operands: parse_operands(&mut toks, &head.span)?,
        },
        // Not a known mnemonic; parse operands anyway so the assembler can
        // diagnose it while keeping later addresses stable
        TokenKind::Ident(mnemonic) => StmtKind::Instruction {
            mnemonic,
            operands: parse_operands(&mut toks, &head.span)?,
        },
        TokenKind::Directive(kind) => StmtKind::Directive {
            kind,
            operands: parse_operands(&mut toks, &head.span)?,
        },
        other => {
            return Err(error::parse_unexpected(
                head.span,
                "an instruction, directive, or label",
                &other.to_string(),
            ))
        }
    };

    stmts.push(Statement { kind, span, line });
    Ok(stmts)
}

fn parse_equ(
    name: String,
    mut toks: Peekable<IntoIter<Token>>,
    span: Span,
    line: u32,
) -> Result<Vec<Statement>, Diagnostic> {
    let value = match toks.next() {
        Some(tok) => match tok.kind {
            TokenKind::Int(val) => Expr::Num(val, tok.span),
            TokenKind::Ident(sym) => Expr::Sym(sym, tok.span),
            other => {
                return Err(error::parse_unexpected(
                    tok.span,
                    "a constant or symbol",
                    &other.to_string(),
                ))
            }
        },
        None => return Err(error::parse_missing_operand(span, "EQU")),
    };
    if let Some(extra) = toks.next() {
        return Err(error::parse_extra_operand(extra.span));
    }
    Ok(vec![Statement {
        kind: StmtKind::Equ { name, value },
        span,
        line,
    }])
}

/// Comma-separated operand list running to end of line.
fn parse_operands(
    toks: &mut Peekable<IntoIter<Token>>,
    head_span: &Span,
) -> Result<Vec<Operand>, Diagnostic> {
    let mut operands = Vec::new();
    if toks.peek().is_none() {
        return Ok(operands);
    }

    loop {
        operands.push(parse_operand(toks, head_span)?);
        match toks.next() {
            None => return Ok(operands),
            Some(tok) if tok.kind == TokenKind::Comma => continue,
            Some(tok) => return Err(error::parse_extra_operand(tok.span)),
        }
    }
}

fn parse_operand(
    toks: &mut Peekable<IntoIter<Token>>,
    head_span: &Span,
) -> Result<Operand, Diagnostic> {
    let Some(tok) = toks.next() else {
        return Err(error::parse_missing_operand(*head_span, "this statement"));
    };
    match tok.kind {
        TokenKind::Reg(reg) => Ok(Operand::Reg(reg, tok.span)),
        TokenKind::Pair(pair) => Ok(Operand::Pair(pair, tok.span)),
        TokenKind::Int(val) => Ok(Operand::Expr(Expr::Num(val, tok.span))),
        TokenKind::Ident(sym) => Ok(Operand::Expr(Expr::Sym(sym, tok.span))),
        TokenKind::Str(bytes) => Ok(Operand::Str(bytes, tok.span)),
        other => Err(error::parse_unexpected(
            tok.span,
            "an operand",
            &other.to_string(),
        )),
    }
}
