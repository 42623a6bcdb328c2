/// A span in the source text.
///
/// Designates where in an expression or stylesheet a certain error occurred.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SourceSpan(usize, usize);

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self(start, end)
    }

    pub(crate) fn empty_at(offset: usize) -> Self {
        Self(offset, offset)
    }

    /// Get the range of the span.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.0..self.1
    }

    /// Shift the span, used when an expression is embedded at `offset` in a
    /// larger text such as a stylesheet attribute.
    pub fn offset(&self, offset: usize) -> Self {
        Self(self.0 + offset, self.1 + offset)
    }
}

impl From<std::ops::Range<usize>> for SourceSpan {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self(range.start, range.end)
    }
}
