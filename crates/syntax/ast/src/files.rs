use std::fmt;
use std::path::{Path, PathBuf};

use crate::span::FileId;

/// Owns the source text of every file a compilation refers to, so that diagnostics can be
/// rendered with line and column information.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<File>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> FileId {
        let id = u32::try_from(self.files.len()).unwrap_or(u32::MAX);
        self.files.push(File::new(path, source));
        FileId(id)
    }

    #[inline]
    pub fn get(&self, id: FileId) -> Option<&File> {
        self.files.get(id.0 as usize)
    }
}

#[derive(Debug)]
pub struct File {
    path: PathBuf,
    source: String,
    lines: Vec<u32>,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let source = source.into();
        let lines = source
            .match_indices('\n')
            .map(|(offset, _)| offset as u32 + 1)
            .collect();
        Self {
            path: path.into(),
            source,
            lines,
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup(&self, offset: u32) -> SourceLoc {
        let line = self.lines.partition_point(|&start| start <= offset);
        let line_start = if line == 0 { 0 } else { self.lines[line - 1] };
        let end = (offset as usize).min(self.source.len());
        SourceLoc {
            line,
            col: self
                .source
                .get(line_start as usize..end)
                .map_or(0, |s| s.chars().count()),
        }
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        let start = if idx == 0 {
            0
        } else {
            *self.lines.get(idx - 1)? as usize
        };
        let end = self
            .lines
            .get(idx)
            .map_or(self.source.len(), |&end| end as usize);
        self.source.get(start..end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_line_and_column() {
        let file = File::new("a.vsp", "foo(a,\n  b++)\n");
        assert_eq!(file.lookup(0), SourceLoc { line: 0, col: 0 });
        assert_eq!(file.lookup(9), SourceLoc { line: 1, col: 2 });
        assert_eq!(file.line(1), Some("  b++)\n"));
    }
}
