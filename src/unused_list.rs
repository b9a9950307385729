//! An [UnusedList] orders released assets by when they became unused, so that eviction can walk them oldest first.
//!
//! This is implemented as a vec-backed linked list plus an auxiliary hash-based index, so that records can leave the
//! middle of the list in O(1) when somebody requests them again.  The head is the most recently released key, the tail
//! the oldest.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;

struct OccupiedEntry<K: ?Sized> {
    key: Arc<K>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct EmptyEntry {
    next_empty: Option<usize>,
}

enum ListEntry<K: ?Sized> {
    /// This entry is empty, possibly with a pointer at the next empty entry.
    Empty(EmptyEntry),
    /// This entry is occupied, and doubly linked to the previous and next entry.
    Occupied(OccupiedEntry<K>),
}

impl<K: ?Sized> ListEntry<K> {
    fn as_occupied_mut(&mut self) -> &mut OccupiedEntry<K> {
        match self {
            Self::Occupied(ref mut x) => x,
            _ => panic!("Entry should be occupied"),
        }
    }

    fn as_occupied(&self) -> &OccupiedEntry<K> {
        match self {
            Self::Occupied(ref x) => x,
            _ => panic!("Entry should be occupied"),
        }
    }

    fn as_empty_mut(&mut self) -> &mut EmptyEntry {
        match self {
            ListEntry::Empty(ref mut x) => x,
            _ => panic!("Entry should be empty"),
        }
    }
}

pub struct UnusedList<K: ?Sized + Hash + Eq> {
    entries: Vec<ListEntry<K>>,
    /// Points at the index of the key.
    index: HashMap<Arc<K>, usize, RandomState>,
    /// Most recently released.
    entries_head: Option<usize>,
    /// Released longest ago; evicted first.
    entries_tail: Option<usize>,
    empty_head: Option<usize>,
}

impl<K: ?Sized + Hash + Eq> Default for UnusedList<K> {
    fn default() -> UnusedList<K> {
        UnusedList::new()
    }
}

impl<K: ?Sized + Hash + Eq> UnusedList<K> {
    pub fn new() -> UnusedList<K> {
        UnusedList {
            entries: Default::default(),
            index: Default::default(),
            entries_head: None,
            entries_tail: None,
            empty_head: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Entirely unlink an occupied index from the list.
    fn unlink_index(&mut self, index: usize) {
        // Easiest to handle the tail first.
        if Some(index) == self.entries_tail {
            self.entries_tail = self.entries[index].as_occupied().prev;
            if let Some(p) = self.entries_tail {
                self.entries[p].as_occupied_mut().next = None;
            }
        }

        if Some(index) == self.entries_head {
            // unlinking the head is special.
            self.entries_head = self.entries[index].as_occupied().next;
            if let Some(n) = self.entries_head {
                self.entries[n].as_occupied_mut().prev = None;
            }
            return;
        }

        let old_prev = self.entries[index].as_occupied().prev;
        let old_next = self.entries[index].as_occupied().next;
        if let Some(p) = old_prev {
            self.entries[p].as_occupied_mut().next = old_next;
        }
        if let Some(n) = old_next {
            self.entries[n].as_occupied_mut().prev = old_prev;
        }
    }

    /// Link an occupied, unlinked index in as the head.
    fn link_as_head(&mut self, index: usize) {
        {
            let entry = self.entries[index].as_occupied_mut();
            entry.prev = None;
            entry.next = self.entries_head;
        }
        if let Some(h) = self.entries_head {
            self.entries[h].as_occupied_mut().prev = Some(index);
        }
        self.entries_head = Some(index);

        // If this is the only entry, it is also the tail.
        if self.entries_tail.is_none() {
            self.entries_tail = Some(index);
        }
    }

    /// Find an available empty index, or make one if necessary.
    fn find_empty(&mut self) -> usize {
        if let Some(e) = self.empty_head {
            self.empty_head = self.entries[e].as_empty_mut().next_empty;
            return e;
        }

        self.entries
            .push(ListEntry::Empty(EmptyEntry { next_empty: None }));
        self.entries.len() - 1
    }

    /// Make a specific index of the list become empty, returning its key.
    fn become_empty(&mut self, index: usize) -> Arc<K> {
        self.unlink_index(index);
        let mut old = ListEntry::Empty(EmptyEntry {
            next_empty: self.empty_head,
        });
        std::mem::swap(&mut old, &mut self.entries[index]);
        self.empty_head = Some(index);
        match old {
            ListEntry::Occupied(OccupiedEntry { key, .. }) => {
                self.index.remove(&key);
                key
            }
            _ => panic!("Should have been occupied"),
        }
    }

    /// Record `key` as the most recently released.  Returns true if it was already in the list, in which case it is
    /// moved to the front.
    pub fn push_newest(&mut self, key: Arc<K>) -> bool {
        if let Some(&ind) = self.index.get(&*key) {
            self.unlink_index(ind);
            self.link_as_head(ind);
            return true;
        }

        let ind = self.find_empty();
        self.entries[ind] = ListEntry::Occupied(OccupiedEntry {
            key: key.clone(),
            prev: None,
            next: None,
        });
        self.index.insert(key, ind);
        self.link_as_head(ind);
        false
    }

    /// Take a key out of the list wherever it is.  Returns whether it was present.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&ind) => {
                self.become_empty(ind);
                true
            }
            None => false,
        }
    }

    pub fn oldest(&self) -> Option<&K> {
        let t = self.entries_tail?;
        Some(&*self.entries[t].as_occupied().key)
    }

    pub fn pop_oldest(&mut self) -> Option<Arc<K>> {
        let t = self.entries_tail?;
        Some(self.become_empty(t))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.entries_head = None;
        self.entries_tail = None;
        self.empty_head = None;
    }

    /// Iterator visiting keys newest first.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        let mut ind = self.entries_head;
        std::iter::from_fn(move || {
            let next = ind?;
            let ret = self.entries[next].as_occupied();
            ind = ret.next;
            Some(&*ret.key)
        })
    }

    /// Iterator visiting keys oldest first, which is eviction order.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &K> {
        let mut ind = self.entries_tail;
        std::iter::from_fn(move || {
            let next = ind?;
            let ret = self.entries[next].as_occupied();
            ind = ret.prev;
            Some(&*ret.key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lru::LruCache;
    use proptest::prelude::*;

    #[derive(Copy, Clone, Debug, Ord, Eq, PartialOrd, PartialEq)]
    enum ListCommand {
        Push(u64),
        Remove(u64),
        PopOldest,
    }

    fn list_command_strat(keys: std::ops::Range<u64>) -> prop::strategy::BoxedStrategy<ListCommand> {
        proptest::prop_oneof![
            keys.clone().prop_map(ListCommand::Push),
            keys.prop_map(ListCommand::Remove),
            Just(ListCommand::PopOldest),
        ]
        .boxed()
    }

    // An unbounded [LruCache] where every push is a `put` behaves exactly like our list: recency order is release
    // order, and `pop_lru` is eviction.
    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..Default::default()
        })]
        #[test]
        fn test_against_lru_cache(
            commands in prop::collection::vec(list_command_strat(0..50), 0..2000)
        ) {
            let mut known_good = LruCache::<u64, ()>::unbounded();
            let mut ours = UnusedList::<u64>::new();

            for c in commands {
                use ListCommand::*;

                match c {
                    Push(k) => prop_assert_eq!(known_good.put(k, ()).is_some(), ours.push_newest(Arc::new(k))),
                    Remove(k) => prop_assert_eq!(known_good.pop(&k).is_some(), ours.remove(&k)),
                    PopOldest => prop_assert_eq!(
                        known_good.pop_lru().map(|(k, _)| k),
                        ours.pop_oldest().map(|k| *k)
                    ),
                }
                prop_assert_eq!(known_good.len(), ours.len());
            }

            let good_state = known_good.iter().map(|(k, _)| *k).collect::<Vec<_>>();
            let our_state = ours.iter().copied().collect::<Vec<_>>();
            prop_assert_eq!(&good_state, &our_state);

            let mut reversed = ours.iter_oldest_first().copied().collect::<Vec<_>>();
            reversed.reverse();
            prop_assert_eq!(&good_state, &reversed);
        }
    }

    #[test]
    fn test_eviction_order() {
        let mut list = UnusedList::<str>::new();
        list.push_newest("a".into());
        list.push_newest("b".into());
        list.push_newest("c".into());
        list.push_newest("d".into());

        // b is requested again, then released again later.
        assert!(list.remove("b"));
        list.push_newest("b".into());

        assert_eq!(list.oldest(), Some("a"));
        let order = list.iter_oldest_first().collect::<Vec<_>>();
        assert_eq!(order, vec!["a", "c", "d", "b"]);

        assert_eq!(list.pop_oldest().as_deref(), Some("a"));
        assert_eq!(list.pop_oldest().as_deref(), Some("c"));
        assert_eq!(list.len(), 2);

        list.clear();
        assert!(list.is_empty());
        assert!(list.pop_oldest().is_none());
    }
}
