use crate::commitlog::{Entry, Index, Log};
use std::collections::VecDeque;
use std::io;

/// Number of most recent entries kept decoded in memory. Recently appended entries are the ones
/// the leader reads back when replicating to followers.
pub(crate) const DEFAULT_LOG_CACHE_SIZE: usize = 512;

/// CachedLog wraps another log and keeps a contiguous suffix of the most recently appended
/// entries in memory.
pub(crate) struct CachedLog<E: Entry, L: Log<E>> {
    inner: L,
    capacity: usize,
    // Index of `cache[0]`. Only meaningful while cache is non-empty.
    first_cached: u64,
    cache: VecDeque<E>,
}

impl<E: Entry, L: Log<E>> CachedLog<E, L> {
    pub(crate) fn new(inner: L, capacity: usize) -> Self {
        CachedLog {
            inner,
            capacity,
            first_cached: 0,
            cache: VecDeque::with_capacity(capacity),
        }
    }

    fn cached(&self, index: Index) -> Option<&E> {
        let index = index.as_u64();
        if self.cache.is_empty() || index < self.first_cached {
            return None;
        }
        self.cache.get((index - self.first_cached) as usize)
    }
}

impl<E: Entry, L: Log<E>> Log<E> for CachedLog<E, L> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        let appended_index = self.inner.append(entry.clone())?;
        if self.capacity == 0 {
            return Ok(appended_index);
        }

        if self.cache.is_empty() {
            self.first_cached = appended_index.as_u64();
        }
        self.cache.push_back(entry);
        if self.cache.len() > self.capacity {
            self.cache.pop_front();
            self.first_cached += 1;
        }

        Ok(appended_index)
    }

    fn get(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.cached(index) {
            Some(entry) => Ok(Some(entry.clone())),
            None => self.inner.get(index),
        }
    }

    fn last_index(&self) -> Option<Index> {
        self.inner.last_index()
    }

    fn truncate_from(&mut self, index: Index) -> Result<(), io::Error> {
        self.inner.truncate_from(index)?;

        let index = index.as_u64();
        if index <= self.first_cached {
            self.cache.clear();
        } else {
            self.cache.truncate((index - self.first_cached) as usize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::in_memory::tests::{entry, TestEntry};
    use crate::commitlog::InMemoryLog;

    fn cached_log(capacity: usize) -> CachedLog<TestEntry, InMemoryLog<TestEntry>> {
        CachedLog::new(InMemoryLog::create(), capacity)
    }

    #[test]
    fn reads_fall_through_to_inner_log_past_capacity() {
        let mut log = cached_log(2);
        for b in 1..=5 {
            log.append(entry(b)).unwrap();
        }

        assert_eq!(log.cache.len(), 2);
        assert_eq!(log.first_cached, 4);
        for b in 1..=5u8 {
            assert_eq!(log.get(Index::new(b as u64)).unwrap(), Some(entry(b)));
        }
        assert_eq!(log.get(Index::new(6)).unwrap(), None);
    }

    #[test]
    fn truncation_invalidates_cached_suffix() {
        let mut log = cached_log(3);
        for b in 1..=5 {
            log.append(entry(b)).unwrap();
        }

        // Cache holds [3, 4, 5]. Drop 4 and 5, then append a replacement at 4.
        log.truncate_from(Index::new(4)).unwrap();
        assert_eq!(log.get(Index::new(4)).unwrap(), None);
        log.append(entry(40)).unwrap();
        assert_eq!(log.get(Index::new(3)).unwrap(), Some(entry(3)));
        assert_eq!(log.get(Index::new(4)).unwrap(), Some(entry(40)));

        // Truncating before the cached window clears it entirely.
        log.truncate_from(Index::new(2)).unwrap();
        assert!(log.cache.is_empty());
        assert_eq!(log.append(entry(20)).unwrap(), Index::new(2));
        assert_eq!(log.first_cached, 2);
        assert_eq!(log.get(Index::new(2)).unwrap(), Some(entry(20)));
        assert_eq!(log.get(Index::new(1)).unwrap(), Some(entry(1)));
    }
}
