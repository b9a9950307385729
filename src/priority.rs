//! Load priorities.
//!
//! The variants are ordered most urgent first, so that `a < b` reads as "a is more urgent than b" and the minimum of
//! a set of priorities is the one to serve first.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPriority {
    /// Needed now; the caller is blocked on it.
    Default,
    /// Needed soon, e.g. the next page of a scenario.
    Preload,
    /// Nice to have resident; loaded when nothing more urgent is waiting.
    Background,
    /// Only warm the loader's storage; the decoded payload is not kept.
    DownloadOnly,
}

impl LoadPriority {
    /// Every priority, most urgent first.
    pub const ALL: [LoadPriority; 4] = [
        LoadPriority::Default,
        LoadPriority::Preload,
        LoadPriority::Background,
        LoadPriority::DownloadOnly,
    ];

    pub fn is_more_urgent_than(self, other: LoadPriority) -> bool {
        self < other
    }

    /// The more urgent of the two.
    pub fn most_urgent(self, other: LoadPriority) -> LoadPriority {
        self.min(other)
    }
}
