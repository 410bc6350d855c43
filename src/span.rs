use std::ops::Range;

use miette::SourceSpan;

/// Byte position relative to start of source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a source, along with the line/column pair that editors
/// and listings report. `line` and `col` are 1-based.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u16,
    line: u32,
    col: u32,
}

impl Span {
    pub fn new(start: Idx, len: u16, line: u32, col: u32) -> Self {
        Span {
            start,
            len,
            line,
            col,
        }
    }

    /// Non-source span.
    pub fn dummy() -> Self {
        Span::default()
    }

    pub fn offs(&self) -> usize {
        self.start.0 as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn end(&self) -> usize {
        self.offs() + self.len()
    }

    /// Returns a range that can be used to index the source.
    pub fn as_range(&self) -> Range<usize> {
        self.offs()..self.end()
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: Span) -> Span {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return other;
        }
        let start = self.offs().min(other.offs());
        let end = self.end().max(other.end());
        let (line, col) = if self.offs() <= other.offs() {
            (self.line, self.col)
        } else {
            (other.line, other.col)
        };
        Span::new(Idx(start as u32), (end - start) as u16, line, col)
    }
}

// Used for miette conversion
impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}
