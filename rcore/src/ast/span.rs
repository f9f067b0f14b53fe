//! Source location tracking

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// A span in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// A value with source location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            span: self.span,
        }
    }
}

static NEXT_SITE: AtomicU32 = AtomicU32::new(1);

/// Identity of a syntactic lookup or call position.
///
/// Sites are unique for the whole process, so caches keyed by them never
/// collide between separately parsed sources. Later parses get larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiteId(pub u32);

impl SiteId {
    pub fn fresh() -> Self {
        SiteId(NEXT_SITE.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge_non_overlapping() {
        let merged = Span::new(0, 5).merge(Span::new(10, 15));
        assert_eq!(merged, Span::new(0, 15));
    }

    #[test]
    fn test_span_range_roundtrip() {
        let range: std::ops::Range<usize> = Span::new(3, 7).into();
        assert_eq!(range, 3..7);
        assert_eq!(Span::from(3..7), Span::new(3, 7));
    }

    #[test]
    fn test_spanned_map_keeps_span() {
        let s = Spanned::new(2, Span::new(1, 2)).map(|n| n * 10);
        assert_eq!(s.node, 20);
        assert_eq!(s.span, Span::new(1, 2));
    }

    #[test]
    fn test_site_ids_are_unique() {
        let a = SiteId::fresh();
        let b = SiteId::fresh();
        assert_ne!(a, b);
    }
}
