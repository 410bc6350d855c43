use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{self, Diagnostic};
use crate::isa::{self, Reg, RegPair};
use crate::lexer::cursor::Cursor;
use crate::span::Span;

mod cursor;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Canonical upper-case instruction mnemonic.
    Mnemonic(String),
    Reg(Reg),
    Pair(RegPair),
    Directive(DirKind),
    /// User identifier, original spelling.
    Ident(String),
    /// Decoded numeric literal.
    Int(u16),
    /// Decoded string literal bytes.
    Str(Vec<u8>),
    Comma,
    Colon,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Mnemonic(m) => write!(f, "mnemonic `{m}`"),
            TokenKind::Reg(r) => write!(f, "register {}", r.name()),
            TokenKind::Pair(rp) => write!(f, "register pair {}", rp.name()),
            TokenKind::Directive(d) => write!(f, "directive {d:?}"),
            TokenKind::Ident(name) => write!(f, "identifier `{name}`"),
            TokenKind::Int(val) => write!(f, "number {val}"),
            TokenKind::Str(_) => write!(f, "string literal"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Colon => write!(f, "`:`"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Org,
    Db,
    Ds,
    Equ,
    End,
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ORG" => Ok(DirKind::Org),
            "DB" => Ok(DirKind::Db),
            "DS" => Ok(DirKind::Ds),
            "EQU" => Ok(DirKind::Equ),
            "END" => Ok(DirKind::End),
            _ => Err(()),
        }
    }
}

lazy_static! {
    // Order is important since some patterns are subpatterns of others.
    static ref WHITESPACE: Regex = Regex::new(r"^[ \t\r]+").unwrap();
    static ref COMMENT: Regex = Regex::new(r"^;.*").unwrap();
    static ref STRING: Regex = Regex::new(r#"^"([^"\\]|\\.)*"|^'([^'\\]|\\.)*'"#).unwrap();
    static ref NUMBER: Regex = Regex::new(r"^[0-9][0-9A-Za-z]*").unwrap();
    static ref IDENT: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

/// Split source into per-line token lists. Whitespace and comments are
/// dropped here; commas and colons survive for the parser.
///
/// Never fails: a malformed token records a diagnostic and abandons the
/// rest of its line, so one bad line cannot take the file down with it.
pub fn tokenize(src: &str) -> (Vec<Vec<Token>>, Vec<Diagnostic>) {
    let mut lines = Vec::new();
    let mut diagnostics = Vec::new();
    let mut offs = 0usize;

    for (idx, line) in src.lines().enumerate() {
        let mut cursor = Cursor::new(line, offs, idx as u32 + 1);
        let mut tokens = Vec::new();

        while !cursor.is_eol() {
            match advance_token(&mut cursor) {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => {}
                Err(diag) => {
                    // Abandon the whole line so the parser does not pile
                    // follow-on errors onto a line already diagnosed here
                    tokens.clear();
                    diagnostics.push(diag);
                    break;
                }
            }
        }

        lines.push(tokens);
        // `str::lines` swallows the terminator; account for it manually
        offs += line.len() + 1;
    }

    (lines, diagnostics)
}

fn advance_token(cursor: &mut Cursor) -> Result<Option<Token>, Diagnostic> {
    let rest = cursor.rest();

    if let Some(m) = WHITESPACE.find(rest) {
        cursor.advance(m.len());
        return Ok(None);
    }
    if let Some(m) = COMMENT.find(rest) {
        cursor.advance(m.len());
        return Ok(None);
    }
    if let Some(m) = STRING.find(rest) {
        let span = cursor.span_here(m.len());
        let bytes = unescape(&m.as_str()[1..m.len() - 1]).into_owned().into_bytes();
        cursor.advance(m.len());
        return Ok(Some(Token {
            kind: TokenKind::Str(bytes),
            span,
        }));
    }
    if let Some(m) = NUMBER.find(rest) {
        let span = cursor.span_here(m.len());
        let value = decode_number(m.as_str(), span)?;
        cursor.advance(m.len());
        return Ok(Some(Token {
            kind: TokenKind::Int(value),
            span,
        }));
    }
    if let Some(m) = IDENT.find(rest) {
        let span = cursor.span_here(m.len());
        let kind = classify_word(m.as_str());
        cursor.advance(m.len());
        return Ok(Some(Token { kind, span }));
    }

    match cursor.first() {
        ',' => {
            let span = cursor.span_here(1);
            cursor.advance(1);
            Ok(Some(Token {
                kind: TokenKind::Comma,
                span,
            }))
        }
        ':' => {
            let span = cursor.span_here(1);
            cursor.advance(1);
            Ok(Some(Token {
                kind: TokenKind::Colon,
                span,
            }))
        }
        '"' | '\'' => Err(error::lex_unterminated_str(cursor.span_rest())),
        stray => Err(error::lex_stray_char(cursor.span_here(stray.len_utf8()), stray)),
    }
}

/// Reserved words win over user identifiers.
fn classify_word(word: &str) -> TokenKind {
    if isa::is_mnemonic(word) {
        return TokenKind::Mnemonic(word.to_ascii_uppercase());
    }
    if word.len() <= 3 {
        if let Ok(pair) = RegPair::from_str(word) {
            return TokenKind::Pair(pair);
        }
        if let Ok(reg) = Reg::from_str(word) {
            return TokenKind::Reg(reg);
        }
    }
    if let Ok(dir) = DirKind::from_str(word) {
        return TokenKind::Directive(dir);
    }
    TokenKind::Ident(word.to_string())
}

/// The radix suffix on the tail of a digit run overrides everything else:
/// `H` hex, `O` octal, `B` binary, `D` or nothing decimal.
fn decode_number(lit: &str, span: Span) -> Result<u16, Diagnostic> {
    let upper = lit.to_ascii_uppercase();
    let (digits, radix) = match upper.as_bytes()[upper.len() - 1] {
        b'H' => (&upper[..upper.len() - 1], 16),
        b'O' => (&upper[..upper.len() - 1], 8),
        b'B' => (&upper[..upper.len() - 1], 2),
        b'D' => (&upper[..upper.len() - 1], 10),
        _ => (upper.as_str(), 10),
    };

    match u32::from_str_radix(digits, radix) {
        Ok(value) if value <= 0xFFFF => Ok(value as u16),
        Ok(_) => Err(error::lex_value_too_large(span, lit)),
        Err(_) => Err(error::lex_bad_digit(span, lit, radix)),
    }
}

fn unescape(s: &str) -> Cow<str> {
    if s.find('\\').is_none() {
        return Cow::Borrowed(s);
    }
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('0') => result.push('\0'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                // Trailing backslash; include it as is
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (lines, diags) = tokenize(src);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        lines.into_iter().flatten().map(|t| t.kind).collect()
    }

    #[test]
    fn radix_suffixes() {
        assert_eq!(
            kinds("10 10H 10O 10B 10D 0FFH"),
            vec![
                TokenKind::Int(10),
                TokenKind::Int(0x10),
                TokenKind::Int(0o10),
                TokenKind::Int(0b10),
                TokenKind::Int(10),
                TokenKind::Int(0xFF),
            ]
        );
    }

    #[test]
    fn bad_digit_for_radix() {
        let (_, diags) = tokenize("MVI A,129B");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "lex::bad_lit");
    }

    #[test]
    fn reserved_words_win() {
        assert_eq!(
            kinds("MOV A,M"),
            vec![
                TokenKind::Mnemonic("MOV".into()),
                TokenKind::Reg(Reg::A),
                TokenKind::Comma,
                TokenKind::Reg(Reg::M),
            ]
        );
        assert_eq!(kinds("PSW"), vec![TokenKind::Pair(RegPair::PSW)]);
        assert_eq!(kinds("org"), vec![TokenKind::Directive(DirKind::Org)]);
    }

    #[test]
    fn comments_and_case() {
        assert_eq!(
            kinds("start: hlt ; stop here"),
            vec![
                TokenKind::Ident("start".into()),
                TokenKind::Colon,
                TokenKind::Mnemonic("HLT".into()),
            ]
        );
    }

    #[test]
    fn strings_decode_escapes() {
        assert_eq!(
            kinds(r#"DB "hi\n",'A'"#),
            vec![
                TokenKind::Directive(DirKind::Db),
                TokenKind::Str(b"hi\n".to_vec()),
                TokenKind::Comma,
                TokenKind::Str(b"A".to_vec()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let (_, diags) = tokenize("DB \"oops");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "lex::str_lit");
    }

    #[test]
    fn stray_punctuation_is_rejected() {
        let (_, diags) = tokenize("MVI A,$");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "lex::unknown");
    }

    #[test]
    fn spans_carry_line_and_col() {
        let (lines, _) = tokenize("NOP\n  HLT");
        let hlt = &lines[1][0];
        assert_eq!(hlt.span.line(), 2);
        assert_eq!(hlt.span.col(), 3);
        assert_eq!(hlt.span.offs(), 6);
    }
}
