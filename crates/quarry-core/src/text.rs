//! Zero-based text coordinates shared by dumps and query results.
//!
//! Dumps record positions the way language servers do: zero-based
//! line/character pairs. A position `P` is covered by a range `R` iff
//! `R.start <= P < R.end` in lexicographic `(line, character)` order, so
//! range starts are inclusive and range ends are exclusive.

use serde::{Deserialize, Serialize};

/// A zero-based line/character pair.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open `[start, end)` span of text.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Whether `position` falls inside this range (start inclusive, end
    /// exclusive).
    #[inline]
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }

    /// A comparable extent proxy used to order overlapping ranges
    /// innermost-first: fewer covered lines first, then fewer characters on
    /// the tie-breaking line.
    #[must_use]
    pub fn extent(&self) -> (u32, u32) {
        (
            self.end.line - self.start.line,
            if self.end.line == self.start.line {
                self.end.character - self.start.character
            } else {
                self.end.character
            },
        )
    }
}
