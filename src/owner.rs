//! Owner tokens.
//!
//! An [OwnerId] stands for "something that needs this asset resident": a sprite, a sound channel, a scenario page.  The
//! cache never looks inside it; it only keeps sets of them per record.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    pub fn raw(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> OwnerId {
        OwnerId(raw)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Hands out owner ids which are unique for the lifetime of one cache.
#[derive(Debug, Default)]
pub(crate) struct OwnerIssuer {
    next: u64,
}

impl OwnerIssuer {
    pub(crate) fn issue(&mut self) -> OwnerId {
        let id = OwnerId(self.next);
        self.next += 1;
        id
    }
}
