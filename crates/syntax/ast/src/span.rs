use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub file: FileId,
}

impl Span {
    pub fn new(start: u32, end: u32, file: FileId) -> Self {
        Span { start, end, file }
    }

    /// A zero-width span in `file`, used for synthesized nodes.
    pub fn empty(file: FileId) -> Self {
        Span::new(0, 0, file)
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} in file {}", self.start, self.end, self.file.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub(super) u32);

impl FileId {
    #[cfg(feature = "testing")]
    pub fn from_u32(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_span_is_empty() {
        let span = Span::new(4, 8, FileId(0));
        assert_eq!(span.len(), 4);
        assert!(!span.is_empty());
        assert!(Span::empty(FileId(0)).is_empty());
    }
}
